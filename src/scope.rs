use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use minijinja::Value;
use serde::Serialize;

use crate::error::Error;
use crate::logging::TileLog;
use crate::lookup::TileLookup;
use crate::model::Model;
use crate::registry::TileRegistry;
use crate::request::TileRequest;
use crate::settings::Settings;
use crate::template::TemplatePath;

/// Tile invocations allowed on one render pass's nesting stack.
pub const MAX_NESTING_DEPTH: usize = 32;

/// State shared by every tile rendered within one top-level render.
///
/// A fresh pass carries no redirect. Nested tiles rendered through the
/// `tile` template helper share their parent's pass, so a redirect asked for
/// anywhere in the page is seen by the response-producing render. The pass
/// also counts how deeply tiles are nested, which bounds a tile including
/// itself.
#[derive(Debug, Clone, Default)]
pub struct RenderPass {
    redirect: Arc<Mutex<Option<String>>>,
    depth: Arc<AtomicUsize>,
}

impl RenderPass {
    /// Creates a pass with no pending redirect.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a redirect to `location`. The last request wins.
    pub fn redirect(&self, location: impl Into<String>) {
        let mut slot = self.redirect.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(location.into());
    }

    /// Returns the pending redirect location.
    pub fn redirect_target(&self) -> Option<String> {
        self.redirect
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of tile invocations currently in progress.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Enters one nesting level for `tile`, left when the guard drops.
    pub(crate) fn enter(&self, tile: &str) -> Result<NestingGuard, Error> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = NestingGuard {
            depth: Arc::clone(&self.depth),
        };
        if depth > MAX_NESTING_DEPTH {
            return Err(Error::Render(format!(
                "tile '{}' exceeds the nesting limit of {} levels",
                tile, MAX_NESTING_DEPTH
            )));
        }
        Ok(guard)
    }
}

pub(crate) struct NestingGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Call-scoped state for one tile invocation.
///
/// `TileScope` is created per call and dropped when the call returns, so two
/// requests rendering the same registered tile never share it. It gives
/// tiles their model and request, a place to stash prepared display data,
/// and the helpers to render templates and nested tiles.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tile_core::{Model, TileRegistry, TileRequest, TileScope};
///
/// struct Site;
/// impl Model for Site {
///     fn path(&self) -> Vec<Option<String>> {
///         vec![None, Some("news".to_string())]
///     }
/// }
///
/// let scope = TileScope::new(
///     Arc::new(TileRegistry::new()),
///     Arc::new(Site),
///     Arc::new(TileRequest::new("req-1", "http://example.com")),
///     "demo",
/// );
/// assert_eq!(scope.nodeurl(), "http://example.com/news");
/// ```
pub struct TileScope {
    registry: Arc<TileRegistry>,
    model: Arc<dyn Model>,
    request: Arc<TileRequest>,
    pass: RenderPass,
    tile_name: String,
    values: BTreeMap<String, Value>,
}

impl TileScope {
    /// Creates a scope in a fresh render pass.
    pub fn new(
        registry: Arc<TileRegistry>,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
        tile_name: impl Into<String>,
    ) -> Self {
        Self::in_pass(registry, model, request, RenderPass::new(), tile_name)
    }

    pub(crate) fn in_pass(
        registry: Arc<TileRegistry>,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
        pass: RenderPass,
        tile_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            model,
            request,
            pass,
            tile_name: tile_name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Name of the tile being rendered.
    pub fn tile_name(&self) -> &str {
        &self.tile_name
    }

    /// The model the tile renders for.
    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// The model downcast to its concrete type.
    pub fn model_as<T: Model>(&self) -> Option<&T> {
        self.model.downcast_ref::<T>()
    }

    /// The current request.
    pub fn request(&self) -> &TileRequest {
        &self.request
    }

    /// The registry the tile was looked up in.
    pub fn registry(&self) -> &Arc<TileRegistry> {
        &self.registry
    }

    /// Active settings.
    pub fn settings(&self) -> &Settings {
        self.registry.settings()
    }

    /// The render pass this call belongs to.
    pub fn pass(&self) -> &RenderPass {
        &self.pass
    }

    /// Request-scoped logger for this tile.
    pub fn log(&self) -> TileLog<'_> {
        TileLog::new(self.request.request_id(), &self.tile_name)
    }

    /// Canonical URL of the current model.
    ///
    /// Joins the application URL with the model's non-`None` path segments.
    pub fn nodeurl(&self) -> String {
        let mut parts = vec![self.request.application_url().to_string()];
        parts.extend(self.model.path().into_iter().flatten());
        parts.join("/")
    }

    /// Asks for an HTTP redirect instead of the rendered page.
    pub fn redirect(&self, location: impl Into<String>) {
        self.pass.redirect(location);
    }

    /// The pending redirect of this render pass.
    pub fn redirect_target(&self) -> Option<String> {
        self.pass.redirect_target()
    }

    /// Stores a display value for rendering.
    ///
    /// Values are exposed to the tile's template both at top level and
    /// under `context`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        self.values
            .insert(key.into(), Value::from_serialize(&value));
    }

    /// Reads back a stored display value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Named-tile lookup bound to this scope's model, request and pass.
    pub fn lookup(&self) -> TileLookup {
        TileLookup::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.model),
            Arc::clone(&self.request),
            self.pass.clone(),
        )
    }

    /// Renders the named tile for the same model and request.
    ///
    /// A missing tile renders as a diagnostic string instead of failing.
    pub fn render_tile(&self, name: &str) -> Result<String, Error> {
        self.lookup().render_tile(name)
    }

    /// Renders a template with this scope's context.
    ///
    /// Returns the empty string without rendering when the pass already
    /// carries a redirect.
    pub fn render_template(&self, path: &TemplatePath) -> Result<String, Error> {
        if self.redirect_target().is_some() {
            return Ok(String::new());
        }
        self.registry
            .templates()
            .render(path, self.template_context())
    }

    fn template_context(&self) -> BTreeMap<String, Value> {
        let mut context = self.values.clone();
        context.insert(
            "context".to_string(),
            Value::from_serialize(&self.values),
        );
        context.insert("model".to_string(), self.model.to_value());
        context.insert(
            "request".to_string(),
            Value::from_serialize(self.request.as_ref()),
        );
        context.insert("nodeurl".to_string(), Value::from(self.nodeurl()));
        context.insert("tile".to_string(), Value::from_object(self.lookup()));
        context
    }
}

impl fmt::Debug for TileScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileScope")
            .field("tile", &self.tile_name)
            .field("request_id", &self.request.request_id())
            .field("values", &self.values)
            .finish()
    }
}
