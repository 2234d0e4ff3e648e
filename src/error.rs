use std::error::Error as StdError;
use std::fmt;

/// Errors that can occur while registering or rendering tiles.
#[derive(Debug)]
pub enum Error {
    /// Invalid registration or render configuration (for example a bare
    /// relative template path)
    Config(String),
    /// The tile's permission check failed
    Forbidden(Violation),
    /// No tile is registered under the requested key
    Lookup(LookupError),
    /// The registered attribute name is not handled by the tile
    UnknownAttribute {
        /// Name the tile was registered under
        tile: String,
        /// The attribute that could not be dispatched
        attribute: String,
    },
    /// The template engine failed to load or render a template
    Template(minijinja::Error),
    /// A redirect location could not be turned into a header value
    InvalidRedirect(String),
    /// Application render code failed
    Render(String),
    /// Settings could not be parsed
    Settings(String),
}

impl Error {
    /// Creates a render error from application code.
    pub fn render(message: impl Into<String>) -> Self {
        Error::Render(message.into())
    }

    /// Returns the violation if this is a forbidden condition.
    pub fn as_violation(&self) -> Option<&Violation> {
        match self {
            Error::Forbidden(v) => Some(v),
            _ => None,
        }
    }

    /// Converts a template engine error, recovering a forbidden condition or
    /// render failure raised by a nested tile.
    pub(crate) fn from_template(err: minijinja::Error) -> Self {
        let mut source: Option<&(dyn StdError + 'static)> = err.source();
        while let Some(cause) = source {
            match cause.downcast_ref::<Error>() {
                Some(Error::Forbidden(v)) => return Error::Forbidden(v.clone()),
                Some(Error::Render(msg)) => return Error::Render(msg.clone()),
                _ => {}
            }
            source = cause.source();
        }
        Error::Template(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Forbidden(v) => write!(f, "Forbidden: {}", v),
            Error::Lookup(e) => write!(f, "{}", e),
            Error::UnknownAttribute { tile, attribute } => {
                write!(f, "Tile '{}' has no attribute '{}'", tile, attribute)
            }
            Error::Template(e) => write!(f, "Template error: {}", e),
            Error::InvalidRedirect(location) => {
                write!(f, "Invalid redirect location: {}", location)
            }
            Error::Render(msg) => write!(f, "Render error: {}", msg),
            Error::Settings(msg) => write!(f, "Settings error: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Forbidden(v) => Some(v),
            Error::Lookup(e) => Some(e),
            Error::Template(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Violation> for Error {
    fn from(v: Violation) -> Self {
        Error::Forbidden(v)
    }
}

impl From<LookupError> for Error {
    fn from(e: LookupError) -> Self {
        Error::Lookup(e)
    }
}

impl From<minijinja::Error> for Error {
    fn from(e: minijinja::Error) -> Self {
        Error::from_template(e)
    }
}

/// An authorization violation raised by a secured tile.
#[derive(Debug, Clone)]
pub struct Violation {
    /// The kind of violation that occurred
    pub kind: ViolationKind,
    /// Human-readable message explaining the violation
    pub message: String,
}

impl Violation {
    /// Creates a new violation.
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Violation {}

/// The kind of authorization violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Only anonymous principals were effective
    Unauthenticated,
    /// The effective principals lack the permission
    Unauthorized {
        /// The permission that was not granted
        permission: String,
    },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Unauthenticated => write!(f, "Unauthenticated"),
            ViolationKind::Unauthorized { permission } => {
                write!(f, "Unauthorized for '{}'", permission)
            }
        }
    }
}

/// No tile is registered for a (model, request, name) combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupError {
    /// The tile name that was requested
    pub name: String,
    /// Path of the model the lookup ran against
    pub model_path: String,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no tile named '{}' registered for model at '{}'",
            self.name, self.model_path
        )
    }
}

impl StdError for LookupError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_display_names_permission() {
        let v = Violation::new(
            ViolationKind::Unauthorized {
                permission: "edit".to_string(),
            },
            "tile 'toolbar' failed permission check",
        );
        assert_eq!(
            v.to_string(),
            "Unauthorized for 'edit': tile 'toolbar' failed permission check"
        );
    }

    #[test]
    fn forbidden_is_recovered_from_template_error_chain() {
        let violation = Violation::new(ViolationKind::Unauthenticated, "login first");
        let err = minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, "nested tile")
            .with_source(Error::Forbidden(violation));

        let recovered = Error::from_template(err);
        let v = recovered.as_violation().expect("forbidden survives");
        assert_eq!(v.kind, ViolationKind::Unauthenticated);
    }

    #[test]
    fn render_failure_is_recovered_from_template_error_chain() {
        let err = minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, "nested tile")
            .with_source(Error::render("too deep"));
        assert!(matches!(Error::from_template(err), Error::Render(ref msg) if msg == "too deep"));
    }

    #[test]
    fn plain_template_error_stays_template_error() {
        let err = minijinja::Error::new(minijinja::ErrorKind::TemplateNotFound, "missing.html");
        assert!(matches!(Error::from_template(err), Error::Template(_)));
    }

    #[test]
    fn lookup_error_display() {
        let e = LookupError {
            name: "footer".to_string(),
            model_path: "/site".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "no tile named 'footer' registered for model at '/site'"
        );
    }
}
