//! Template paths and the template environment.
//!
//! Templates are addressed either by a package-qualified locator
//! (`"myapp:tiles/listing.html"`) or by an absolute filesystem path. Bare
//! relative paths are rejected: a registration resolves them against its
//! namespace up front (see [`TemplatePath::resolve`]), and direct render calls
//! must not depend on the process working directory.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use minijinja::{Environment, ErrorKind, Value};

use crate::error::Error;

const NAMESPACE_SEPARATOR: char = ':';

/// A validated template locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePath {
    /// `namespace:relative/path`
    Qualified {
        /// Namespace the path is relative to
        namespace: String,
        /// Path inside the namespace directory
        path: String,
    },
    /// An absolute filesystem path
    Absolute(PathBuf),
}

impl TemplatePath {
    /// Parses a qualified or absolute path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a bare relative path.
    ///
    /// # Examples
    ///
    /// ```
    /// use tile_core::TemplatePath;
    ///
    /// assert!(TemplatePath::parse("myapp:listing.html").is_ok());
    /// assert!(TemplatePath::parse("/srv/templates/listing.html").is_ok());
    /// assert!(TemplatePath::parse("listing.html").is_err());
    /// ```
    pub fn parse(locator: &str) -> Result<Self, Error> {
        if is_absolute(locator) {
            return Ok(TemplatePath::Absolute(PathBuf::from(locator)));
        }
        if let Some((namespace, path)) = locator.split_once(NAMESPACE_SEPARATOR) {
            if namespace.is_empty() || path.is_empty() {
                return Err(Error::Config(format!(
                    "Malformed template path: {}",
                    locator
                )));
            }
            return Ok(TemplatePath::Qualified {
                namespace: namespace.to_string(),
                path: path.to_string(),
            });
        }
        Err(Error::Config(format!(
            "Relative path not supported: {}",
            locator
        )))
    }

    /// Parses `locator`, qualifying a bare relative path with `namespace`.
    ///
    /// `namespace` may be a full module path; only its crate segment is used,
    /// so `module_path!()` can be passed as is.
    ///
    /// ```
    /// use tile_core::TemplatePath;
    ///
    /// let path = TemplatePath::resolve("myapp::tiles::nav", "nav.html").unwrap();
    /// assert_eq!(path.to_string(), "myapp:nav.html");
    /// ```
    pub fn resolve(namespace: &str, locator: &str) -> Result<Self, Error> {
        if is_qualified_or_absolute(locator) {
            return Self::parse(locator);
        }
        let crate_name = crate_segment(namespace);
        if crate_name.is_empty() {
            return Err(Error::Config(format!(
                "Relative path not supported without a namespace: {}",
                locator
            )));
        }
        Self::parse(&format!("{}{}{}", crate_name, NAMESPACE_SEPARATOR, locator))
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplatePath::Qualified { namespace, path } => {
                write!(f, "{}{}{}", namespace, NAMESPACE_SEPARATOR, path)
            }
            TemplatePath::Absolute(path) => write!(f, "{}", path.display()),
        }
    }
}

pub(crate) fn is_qualified_or_absolute(locator: &str) -> bool {
    is_absolute(locator) || locator.contains(NAMESPACE_SEPARATOR)
}

// A drive prefix (`C:\` or `C:/`) is absolute on every host, so it is never
// read as a one-letter namespace.
fn is_absolute(locator: &str) -> bool {
    Path::new(locator).is_absolute() || has_drive_prefix(locator)
}

fn has_drive_prefix(locator: &str) -> bool {
    let bytes = locator.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

pub(crate) fn crate_segment(namespace: &str) -> &str {
    namespace.split("::").next().unwrap_or("").trim()
}

/// The template environment tiles render with.
///
/// Inline sources added with [`add_template`](Templates::add_template) take
/// precedence; otherwise qualified paths load from their namespace directory
/// and absolute paths load from disk.
pub struct Templates {
    env: Environment<'static>,
    namespaces: BTreeMap<String, PathBuf>,
}

impl Templates {
    /// Creates an environment with no namespaces.
    pub fn new() -> Self {
        let mut templates = Self {
            env: Environment::new(),
            namespaces: BTreeMap::new(),
        };
        templates.install_loader();
        templates
    }

    /// Maps `namespace` to a template directory.
    pub fn add_namespace(&mut self, namespace: impl Into<String>, dir: impl Into<PathBuf>) {
        self.namespaces.insert(namespace.into(), dir.into());
        self.install_loader();
    }

    /// Directory registered for `namespace`.
    pub fn namespace_dir(&self, namespace: &str) -> Option<&Path> {
        self.namespaces.get(namespace).map(PathBuf::as_path)
    }

    /// Adds an inline template under a qualified or absolute path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a relative path and `Error::Template` if
    /// the source does not parse.
    pub fn add_template(&mut self, path: &str, source: impl Into<String>) -> Result<(), Error> {
        let path = TemplatePath::parse(path)?;
        self.env
            .add_template_owned(path.to_string(), source.into())
            .map_err(Error::from_template)
    }

    /// The underlying minijinja environment, for filters and globals.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }

    pub(crate) fn render(
        &self,
        path: &TemplatePath,
        context: BTreeMap<String, Value>,
    ) -> Result<String, Error> {
        let name = path.to_string();
        let template = self.env.get_template(&name).map_err(Error::from_template)?;
        template.render(context).map_err(Error::from_template)
    }

    fn install_loader(&mut self) {
        let namespaces = Arc::new(self.namespaces.clone());
        self.env
            .set_loader(move |name| load_template(&namespaces, name));
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Templates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Templates")
            .field("namespaces", &self.namespaces)
            .finish()
    }
}

fn load_template(
    namespaces: &BTreeMap<String, PathBuf>,
    name: &str,
) -> Result<Option<String>, minijinja::Error> {
    let file = match TemplatePath::parse(name) {
        Ok(TemplatePath::Qualified { namespace, path }) => match namespaces.get(&namespace) {
            Some(dir) => dir.join(path),
            None => return Ok(None),
        },
        Ok(TemplatePath::Absolute(path)) => path,
        Err(_) => return Ok(None),
    };

    match std::fs::read_to_string(&file) {
        Ok(source) => Ok(Some(source)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("could not read template {}", file.display()),
        )
        .with_source(err)),
    }
}
