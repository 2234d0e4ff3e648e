//! Named-tile lookup for a fixed model and request.

use std::fmt;
use std::sync::Arc;

use minijinja::value::{from_args, Object};
use minijinja::{ErrorKind, HtmlEscape, State, Value};

use crate::error::Error;
use crate::logging::TileLog;
use crate::model::Model;
use crate::registry::{RegisteredTile, TileRegistry};
use crate::request::TileRequest;
use crate::scope::RenderPass;

/// Result of looking up a tile by name.
#[derive(Clone)]
pub enum Lookup {
    /// The registered tile, not yet invoked
    Found(Arc<RegisteredTile>),
    /// HTML-safe diagnostic to show in place of the tile
    Missing(String),
}

impl Lookup {
    /// Returns the tile if it was found.
    pub fn tile(&self) -> Option<&Arc<RegisteredTile>> {
        match self {
            Lookup::Found(tile) => Some(tile),
            Lookup::Missing(_) => None,
        }
    }
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Found(tile) => f.debug_tuple("Found").field(&tile.name()).finish(),
            Lookup::Missing(message) => f.debug_tuple("Missing").field(message).finish(),
        }
    }
}

/// Looks up tiles registered for one (model, request) pair.
///
/// This is what templates see as `tile`: `{{ tile("navigation") }}` renders
/// the tile named `navigation` for the same model and request. A name with
/// no registration degrades to a visible diagnostic instead of failing the
/// surrounding page.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tile_core::{Lookup, Model, RenderPass, TileLookup, TileRegistry, TileRequest};
///
/// struct Site;
/// impl Model for Site {}
///
/// let lookup = TileLookup::new(
///     Arc::new(TileRegistry::new()),
///     Arc::new(Site),
///     Arc::new(TileRequest::new("req-1", "http://example.com")),
///     RenderPass::new(),
/// );
///
/// match lookup.get("sidebar") {
///     Lookup::Missing(message) => assert!(message.contains("sidebar")),
///     Lookup::Found(_) => unreachable!(),
/// }
/// ```
#[derive(Clone)]
pub struct TileLookup {
    registry: Arc<TileRegistry>,
    model: Arc<dyn Model>,
    request: Arc<TileRequest>,
    pass: RenderPass,
}

impl TileLookup {
    /// Binds a lookup to a model, request and render pass.
    pub fn new(
        registry: Arc<TileRegistry>,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
        pass: RenderPass,
    ) -> Self {
        Self {
            registry,
            model,
            request,
            pass,
        }
    }

    /// Looks up the tile registered under `name`.
    pub fn get(&self, name: &str) -> Lookup {
        match self
            .registry
            .lookup(self.model.as_ref(), &self.request, name)
        {
            Ok(tile) => Lookup::Found(tile),
            Err(err) => {
                TileLog::new(self.request.request_id(), name)
                    .warn(format_args!("tile lookup failed: {}", err));
                Lookup::Missing(format!(
                    "Tile with name '{}' not found:<br /><pre>{}</pre>",
                    HtmlEscape(name),
                    HtmlEscape(&err.to_string())
                ))
            }
        }
    }

    /// Renders the tile registered under `name` in this lookup's pass.
    ///
    /// A missing tile renders as its diagnostic string.
    ///
    /// # Errors
    ///
    /// Propagates errors raised by the tile itself, including a strict
    /// tile's `Error::Forbidden`.
    pub fn render_tile(&self, name: &str) -> Result<String, Error> {
        match self.get(name) {
            Lookup::Found(tile) => tile
                .invoke(
                    Arc::clone(&self.registry),
                    Arc::clone(&self.model),
                    Arc::clone(&self.request),
                    self.pass.clone(),
                )
                .map(|outcome| outcome.into_body()),
            Lookup::Missing(message) => Ok(message),
        }
    }
}

impl fmt::Debug for TileLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileLookup")
            .field("request_id", &self.request.request_id())
            .field("model", &self.model.display_path())
            .finish()
    }
}

impl Object for TileLookup {
    fn call(self: &Arc<Self>, _state: &State<'_, '_>, args: &[Value]) -> Result<Value, minijinja::Error> {
        let (name,): (&str,) = from_args(args)?;
        match self.render_tile(name) {
            Ok(markup) => Ok(Value::from_safe_string(markup)),
            Err(err) => Err(minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("tile '{}' failed to render", name),
            )
            .with_source(err)),
        }
    }
}
