//! Render units.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::scope::TileScope;
use crate::template::TemplatePath;

/// A reusable render unit.
///
/// A tile is instantiated once at registration and invoked for every request
/// matching its registry key. It never stores per-request state on itself:
/// the model, the request and any prepared display data live in the
/// [`TileScope`] handed to each method.
///
/// Invocation runs [`prepare`](Tile::prepare) first, then asks
/// [`show`](Tile::show), which can read what `prepare` stored. A hidden tile
/// renders as the empty string. Otherwise either the registered template or
/// the registered [`attribute`](Tile::attribute) renders.
///
/// # Examples
///
/// ```
/// use tile_core::{Error, Tile, TileScope};
///
/// struct Greeting;
///
/// impl Tile for Greeting {
///     fn attribute(&self, name: &str, scope: &TileScope) -> Option<Result<String, Error>> {
///         match name {
///             "say_hi" => Some(Ok("hi".to_string())),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Tile: Send + Sync + 'static {
    /// Whether the tile renders at all. Runs after `prepare`.
    fn show(&self, _scope: &TileScope) -> bool {
        true
    }

    /// Fetches display data into the scope before rendering.
    fn prepare(&self, _scope: &mut TileScope) -> Result<(), Error> {
        Ok(())
    }

    /// Renders the tile when no template path is registered.
    fn render(&self, _scope: &TileScope) -> Result<String, Error> {
        Ok(String::new())
    }

    /// Dispatches the registered attribute name to a render method.
    ///
    /// Returns `None` for names the tile does not handle. Implementations
    /// adding methods should fall back to the default for `"render"`.
    fn attribute(&self, name: &str, scope: &TileScope) -> Option<Result<String, Error>> {
        match name {
            "render" => Some(self.render(scope)),
            _ => None,
        }
    }
}

/// The default render unit. Renders its template, or the empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseTile;

impl Tile for BaseTile {}

/// Adapts a plain function into a tile.
///
/// ```
/// use tile_core::{FnTile, TileScope};
///
/// let tile = FnTile::new(|scope: &TileScope| Ok(format!("<a href=\"{}\">here</a>", scope.nodeurl())));
/// ```
pub struct FnTile<F> {
    f: F,
}

impl<F> FnTile<F>
where
    F: Fn(&TileScope) -> Result<String, Error> + Send + Sync + 'static,
{
    /// Wraps `f` as the tile's `render`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Tile for FnTile<F>
where
    F: Fn(&TileScope) -> Result<String, Error> + Send + Sync + 'static,
{
    fn render(&self, scope: &TileScope) -> Result<String, Error> {
        (self.f)(scope)
    }
}

impl<F> fmt::Debug for FnTile<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnTile")
    }
}

/// Result of invoking a registered tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileOutcome {
    /// The tile produced markup
    Rendered(String),
    /// The tile asked for an HTTP redirect instead of markup
    Redirect(String),
    /// A lenient tile failed its permission check
    Denied,
}

impl TileOutcome {
    /// The markup shown inside a page. Redirects and denials show nothing.
    pub fn into_body(self) -> String {
        match self {
            TileOutcome::Rendered(body) => body,
            TileOutcome::Redirect(_) | TileOutcome::Denied => String::new(),
        }
    }

    /// The redirect location, if any.
    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            TileOutcome::Redirect(location) => Some(location),
            _ => None,
        }
    }
}

/// A registered, callable tile: the render unit and every wrapper around it.
pub trait View: Send + Sync {
    /// Invokes the view for the scope's model and request.
    fn call(&self, scope: &mut TileScope) -> Result<TileOutcome, Error>;
}

/// A tile bound to its registered template path and attribute.
pub(crate) struct TileView {
    tile: Arc<dyn Tile>,
    path: Option<TemplatePath>,
    attribute: String,
}

impl TileView {
    pub(crate) fn new(tile: Arc<dyn Tile>, path: Option<TemplatePath>, attribute: String) -> Self {
        Self {
            tile,
            path,
            attribute,
        }
    }
}

impl View for TileView {
    fn call(&self, scope: &mut TileScope) -> Result<TileOutcome, Error> {
        self.tile.prepare(scope)?;
        if let Some(location) = scope.redirect_target() {
            return Ok(TileOutcome::Redirect(location));
        }
        if !self.tile.show(scope) {
            return Ok(TileOutcome::Rendered(String::new()));
        }

        let body = match &self.path {
            Some(path) => scope.render_template(path)?,
            None => match self.tile.attribute(&self.attribute, scope) {
                Some(result) => result?,
                None => {
                    return Err(Error::UnknownAttribute {
                        tile: scope.tile_name().to_string(),
                        attribute: self.attribute.clone(),
                    })
                }
            },
        };

        match scope.redirect_target() {
            Some(location) => Ok(TileOutcome::Redirect(location)),
            None => Ok(TileOutcome::Rendered(body)),
        }
    }
}
