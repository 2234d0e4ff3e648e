//! Tile registration and the render entry points.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Response, StatusCode};
use minijinja::Value;

use crate::error::{Error, LookupError};
use crate::model::{Interface, Model};
use crate::request::TileRequest;
use crate::scope::{RenderPass, TileScope};
use crate::security::{AuthenticationPolicy, AuthorizationPolicy, LenientView, SecuredView};
use crate::settings::Settings;
use crate::template::{is_qualified_or_absolute, TemplatePath, Templates};
use crate::tile::{BaseTile, FnTile, Tile, TileOutcome, TileView, View};

/// Permission checked when a registration does not name one.
pub const DEFAULT_PERMISSION: &str = "view";

/// Attribute dispatched when a registration does not name one.
pub const DEFAULT_ATTRIBUTE: &str = "render";

/// Builds a full response from a rendered body.
pub type ResponseFactory = Arc<dyn Fn(String) -> Response<String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
    model: Interface,
    request: Interface,
    name: String,
}

/// Options for registering one tile.
///
/// # Examples
///
/// ```
/// use tile_core::{Interface, TileRegistration};
///
/// struct Folder;
///
/// let registration = TileRegistration::new("listing")
///     .path("listing.html")
///     .namespace(module_path!())
///     .interface(Interface::of::<Folder>())
///     .permission(Some("view"))
///     .strict(false);
///
/// assert_eq!(registration.name(), "listing");
/// ```
#[derive(Debug, Clone)]
pub struct TileRegistration {
    name: String,
    path: Option<String>,
    attribute: String,
    interface: Interface,
    request_layer: Interface,
    permission: Option<String>,
    strict: bool,
    namespace: Option<String>,
}

impl TileRegistration {
    /// Registration for `name` with the default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            attribute: DEFAULT_ATTRIBUTE.to_string(),
            interface: Interface::Any,
            request_layer: Interface::Any,
            permission: Some(DEFAULT_PERMISSION.to_string()),
            strict: true,
            namespace: None,
        }
    }

    /// Template rendered by the tile; takes precedence over `attribute`.
    ///
    /// A bare relative path is qualified with the registration's namespace.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Name dispatched through [`Tile::attribute`] when no path is set.
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    /// Model interface the tile is registered for.
    pub fn interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    /// Request layer the tile is registered for.
    pub fn request_layer(mut self, layer: Interface) -> Self {
        self.request_layer = layer;
        self
    }

    /// Permission to check; `None` disables security checks.
    pub fn permission(mut self, permission: Option<&str>) -> Self {
        self.permission = permission.map(str::to_string);
        self
    }

    /// Whether a failed permission check propagates (`true`) or renders
    /// as nothing (`false`).
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Namespace relative template paths resolve against, usually
    /// `module_path!()`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The tile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn template_path(&self) -> Result<Option<TemplatePath>, Error> {
        let Some(locator) = self.path.as_deref() else {
            return Ok(None);
        };
        match (&self.namespace, is_qualified_or_absolute(locator)) {
            (_, true) => TemplatePath::parse(locator).map(Some),
            (Some(namespace), false) => TemplatePath::resolve(namespace, locator).map(Some),
            (None, false) => Err(Error::Config(format!(
                "Relative path not supported without a namespace: {}",
                locator
            ))),
        }
    }
}

/// A tile whose registration travels with its type.
///
/// Usually implemented with the [`tile!`](crate::tile!) macro, which records
/// the defining module as the template namespace.
pub trait DeclaredTile: Tile + Sized {
    /// How the tile registers itself.
    fn registration() -> TileRegistration;
}

/// Implements [`DeclaredTile`] for a type.
///
/// Options are [`TileRegistration`] builder methods. The namespace is the
/// crate the macro is invoked in, so relative template paths resolve
/// against that crate's template directory.
///
/// ```
/// use tile_core::{tile, Tile, TileRegistry};
///
/// #[derive(Default)]
/// struct Footer;
/// impl Tile for Footer {}
///
/// tile!(Footer, "footer", path = "footer.html", permission = None);
///
/// let mut registry = TileRegistry::new();
/// registry.install::<Footer>().unwrap();
/// assert!(registry.contains("footer"));
/// ```
#[macro_export]
macro_rules! tile {
    ($ty:ty, $name:expr $(, $option:ident = $value:expr)* $(,)?) => {
        impl $crate::DeclaredTile for $ty {
            fn registration() -> $crate::TileRegistration {
                $crate::TileRegistration::new($name)
                    .namespace(::core::module_path!())
                    $(.$option($value))*
            }
        }
    };
}

/// A tile as stored in the registry, including its security wrappers.
pub struct RegisteredTile {
    name: String,
    view: Arc<dyn View>,
}

impl RegisteredTile {
    /// The name the tile was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the tile for `model` and `request` in a fresh render pass.
    ///
    /// # Errors
    ///
    /// Returns whatever the tile or its permission check raises.
    pub fn call(
        &self,
        registry: &Arc<TileRegistry>,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
    ) -> Result<String, Error> {
        self.invoke(Arc::clone(registry), model, request, RenderPass::new())
            .map(TileOutcome::into_body)
    }

    /// Invokes the tile in `pass`, returning the full outcome.
    ///
    /// # Errors
    ///
    /// Returns `Error::Render` when the pass is already nested
    /// [`MAX_NESTING_DEPTH`](crate::MAX_NESTING_DEPTH) tiles deep.
    pub fn invoke(
        &self,
        registry: Arc<TileRegistry>,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
        pass: RenderPass,
    ) -> Result<TileOutcome, Error> {
        let _level = pass.enter(&self.name)?;
        let mut scope = TileScope::in_pass(registry, model, request, pass, self.name.as_str());
        self.view.call(&mut scope)
    }
}

impl fmt::Debug for RegisteredTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTile")
            .field("name", &self.name)
            .finish()
    }
}

/// The tile registry.
///
/// Built once during application assembly and then shared as
/// `Arc<TileRegistry>`: registration takes `&mut self`, rendering takes
/// `&Arc<Self>`, so there is no registration once requests are served.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tile_core::{Error, Model, Tile, TileRegistration, TileRegistry, TileRequest, TileScope};
///
/// struct Site;
/// impl Model for Site {}
///
/// struct Greeting;
/// impl Tile for Greeting {
///     fn attribute(&self, name: &str, scope: &TileScope) -> Option<Result<String, Error>> {
///         match name {
///             "say_hi" => Some(Ok("hi".to_string())),
///             _ => None,
///         }
///     }
/// }
///
/// let mut registry = TileRegistry::new();
/// registry
///     .register(TileRegistration::new("greeting").attribute("say_hi"), Greeting)
///     .unwrap();
/// let registry = Arc::new(registry);
///
/// let html = registry
///     .render("greeting", Arc::new(Site), Arc::new(TileRequest::new("req-1", "http://localhost")))
///     .unwrap();
/// assert_eq!(html, "hi");
/// ```
pub struct TileRegistry {
    tiles: HashMap<RegistryKey, Arc<RegisteredTile>>,
    templates: Templates,
    settings: Settings,
    authentication: Option<Arc<dyn AuthenticationPolicy>>,
    authorization: Option<Arc<dyn AuthorizationPolicy>>,
    response_factory: ResponseFactory,
}

impl TileRegistry {
    /// Creates an empty registry with default settings.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Creates an empty registry, mapping the configured template
    /// namespaces.
    pub fn with_settings(settings: Settings) -> Self {
        let mut templates = Templates::new();
        for (namespace, dir) in &settings.templates {
            templates.add_namespace(namespace.clone(), dir.clone());
        }
        Self {
            tiles: HashMap::new(),
            templates,
            settings,
            authentication: None,
            authorization: None,
            response_factory: Arc::new(html_response),
        }
    }

    /// Active settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The template environment.
    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// The template environment, for adding namespaces and sources.
    pub fn templates_mut(&mut self) -> &mut Templates {
        &mut self.templates
    }

    /// Sets the authentication policy.
    ///
    /// Permission checks run only while both policies are set. They apply to
    /// every tile registered with a permission, before or after this call.
    pub fn set_authentication_policy(&mut self, policy: impl AuthenticationPolicy + 'static) {
        self.authentication = Some(Arc::new(policy));
    }

    /// Sets the authorization policy.
    pub fn set_authorization_policy(&mut self, policy: impl AuthorizationPolicy + 'static) {
        self.authorization = Some(Arc::new(policy));
    }

    /// The configured authentication policy.
    pub fn authentication_policy(&self) -> Option<&dyn AuthenticationPolicy> {
        self.authentication.as_deref()
    }

    /// The configured authorization policy.
    pub fn authorization_policy(&self) -> Option<&dyn AuthorizationPolicy> {
        self.authorization.as_deref()
    }

    /// Replaces the factory wrapping rendered bodies into responses.
    pub fn set_response_factory<F>(&mut self, factory: F)
    where
        F: Fn(String) -> Response<String> + Send + Sync + 'static,
    {
        self.response_factory = Arc::new(factory);
    }

    /// Registers `tile`, replacing any tile under the same key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the template path is relative and the
    /// registration has no namespace.
    pub fn register(
        &mut self,
        registration: TileRegistration,
        tile: impl Tile,
    ) -> Result<(), Error> {
        self.register_arc(registration, Arc::new(tile))
    }

    /// Registers a template-only tile rendered by [`BaseTile`].
    pub fn register_default(&mut self, registration: TileRegistration) -> Result<(), Error> {
        self.register(registration, BaseTile)
    }

    /// Registers a function as the tile's `render`.
    pub fn register_fn<F>(&mut self, registration: TileRegistration, f: F) -> Result<(), Error>
    where
        F: Fn(&TileScope) -> Result<String, Error> + Send + Sync + 'static,
    {
        self.register(registration, FnTile::new(f))
    }

    /// Registers a [`DeclaredTile`] with its own registration.
    pub fn install<T: DeclaredTile + Default>(&mut self) -> Result<(), Error> {
        self.register(T::registration(), T::default())
    }

    fn register_arc(
        &mut self,
        registration: TileRegistration,
        tile: Arc<dyn Tile>,
    ) -> Result<(), Error> {
        let path = registration.template_path()?;
        let mut view: Arc<dyn View> = Arc::new(TileView::new(
            tile,
            path.clone(),
            registration.attribute.clone(),
        ));

        if let Some(permission) = &registration.permission {
            view = Arc::new(SecuredView::new(view, permission.clone()));
        }
        if !registration.strict {
            view = Arc::new(LenientView::new(view));
        }

        let key = RegistryKey {
            model: registration.interface,
            request: registration.request_layer,
            name: registration.name.clone(),
        };
        tracing::debug!(
            tile = %key.name,
            interface = %key.model,
            request_layer = %key.request,
            path = ?path.as_ref().map(ToString::to_string),
            permission = ?registration.permission,
            strict = registration.strict,
            "registering tile"
        );
        let replaced = self.tiles.insert(
            key,
            Arc::new(RegisteredTile {
                name: registration.name,
                view,
            }),
        );
        if let Some(old) = replaced {
            tracing::debug!(tile = %old.name, "replaced earlier registration");
        }
        Ok(())
    }

    /// Whether any tile is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.tiles.keys().any(|key| key.name == name)
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Finds the most specific tile registered under `name`.
    ///
    /// Model interfaces are tried from most to least specific, each against
    /// the request's layers and then `Interface::Any`.
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if no registration matches.
    pub fn lookup(
        &self,
        model: &dyn Model,
        request: &TileRequest,
        name: &str,
    ) -> Result<Arc<RegisteredTile>, LookupError> {
        let mut request_order = request.layers().to_vec();
        request_order.push(Interface::Any);

        for model_interface in model.lookup_order() {
            for request_interface in &request_order {
                let key = RegistryKey {
                    model: model_interface.clone(),
                    request: request_interface.clone(),
                    name: name.to_string(),
                };
                if let Some(tile) = self.tiles.get(&key) {
                    return Ok(Arc::clone(tile));
                }
            }
        }
        Err(LookupError {
            name: name.to_string(),
            model_path: model.display_path(),
        })
    }

    /// Renders the tile registered under `name` as page markup.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lookup` if no tile matches, otherwise whatever the
    /// tile raises.
    pub fn render(
        self: &Arc<Self>,
        name: &str,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
    ) -> Result<String, Error> {
        let tile = self.lookup(model.as_ref(), &request, name)?;
        tile.call(self, model, request)
    }

    /// Renders the tile registered under `name` as a full response.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lookup` if no tile matches, `Error::InvalidRedirect`
    /// for an unusable redirect location, otherwise whatever the tile raises.
    pub fn respond(
        self: &Arc<Self>,
        name: &str,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
    ) -> Result<Response<String>, Error> {
        let tile = self.lookup(model.as_ref(), &request, name)?;
        let pass = RenderPass::new();
        let outcome = tile.invoke(Arc::clone(self), model, request, pass.clone())?;
        self.outcome_response(outcome, &pass)
    }

    /// Renders a template to a string.
    ///
    /// `values` are exposed at the template's top level alongside `model`,
    /// `request`, `nodeurl` and the `tile` lookup helper.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a bare relative path and
    /// `Error::Template` if loading or rendering fails.
    pub fn render_template(
        self: &Arc<Self>,
        path: &str,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
        values: BTreeMap<String, Value>,
    ) -> Result<String, Error> {
        let path = TemplatePath::parse(path)?;
        self.template_scope(model, request, RenderPass::new(), values)
            .render_template(&path)
    }

    /// Renders a template to a response.
    ///
    /// A redirect requested by any tile rendered in the template turns the
    /// response into `302 Found`.
    ///
    /// # Errors
    ///
    /// As [`render_template`](Self::render_template), plus
    /// `Error::InvalidRedirect`.
    pub fn render_template_to_response(
        self: &Arc<Self>,
        path: &str,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
        values: BTreeMap<String, Value>,
    ) -> Result<Response<String>, Error> {
        let path = TemplatePath::parse(path)?;
        let pass = RenderPass::new();
        let scope = self.template_scope(model, request, pass.clone(), values);
        let body = scope.render_template(&path)?;
        self.outcome_response(TileOutcome::Rendered(body), &pass)
    }

    fn template_scope(
        self: &Arc<Self>,
        model: Arc<dyn Model>,
        request: Arc<TileRequest>,
        pass: RenderPass,
        values: BTreeMap<String, Value>,
    ) -> TileScope {
        let mut scope = TileScope::in_pass(Arc::clone(self), model, request, pass, "");
        for (key, value) in values {
            scope.insert(key, value);
        }
        scope
    }

    fn outcome_response(
        &self,
        outcome: TileOutcome,
        pass: &RenderPass,
    ) -> Result<Response<String>, Error> {
        let location = match &outcome {
            TileOutcome::Redirect(location) => Some(location.clone()),
            _ => pass.redirect_target(),
        };
        match location {
            Some(location) => redirect_response(&location),
            None => Ok((self.response_factory)(outcome.into_body())),
        }
    }
}

impl Default for TileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.tiles.keys().map(|k| k.name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("TileRegistry")
            .field("tiles", &names)
            .field("templates", &self.templates)
            .field("settings", &self.settings)
            .finish()
    }
}

fn html_response(body: String) -> Response<String> {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn redirect_response(location: &str) -> Result<Response<String>, Error> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| Error::InvalidRedirect(location.to_string()))?;
    let mut response = Response::new(String::new());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(LOCATION, value);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Site;
    impl Model for Site {}

    struct Text(&'static str);
    impl Tile for Text {
        fn render(&self, _scope: &TileScope) -> Result<String, Error> {
            Ok(self.0.to_string())
        }
    }

    fn request() -> Arc<TileRequest> {
        Arc::new(TileRequest::new("req-1", "http://localhost"))
    }

    #[test]
    fn relative_path_without_namespace_is_config_error() {
        let mut registry = TileRegistry::new();
        let err = registry
            .register_default(TileRegistration::new("nav").path("nav.html"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn relative_path_is_qualified_with_namespace() {
        let registration = TileRegistration::new("nav")
            .path("nav.html")
            .namespace("myapp::tiles");
        assert_eq!(
            registration.template_path().unwrap(),
            Some(TemplatePath::Qualified {
                namespace: "myapp".to_string(),
                path: "nav.html".to_string()
            })
        );
    }

    #[test]
    fn same_key_overwrites() {
        let mut registry = TileRegistry::new();
        registry
            .register(TileRegistration::new("t"), Text("first"))
            .unwrap();
        registry
            .register(TileRegistration::new("t"), Text("second"))
            .unwrap();
        assert_eq!(registry.len(), 1);

        let registry = Arc::new(registry);
        assert_eq!(
            registry.render("t", Arc::new(Site), request()).unwrap(),
            "second"
        );
    }

    #[test]
    fn lookup_miss_is_lookup_error() {
        let registry = Arc::new(TileRegistry::new());
        let err = registry.render("nope", Arc::new(Site), request()).unwrap_err();
        assert!(matches!(err, Error::Lookup(ref e) if e.name == "nope"));
    }

    #[test]
    fn specific_interface_wins_over_any() {
        let mut registry = TileRegistry::new();
        registry
            .register(TileRegistration::new("t"), Text("generic"))
            .unwrap();
        registry
            .register(
                TileRegistration::new("t").interface(Interface::of::<Site>()),
                Text("site"),
            )
            .unwrap();
        let registry = Arc::new(registry);
        assert_eq!(
            registry.render("t", Arc::new(Site), request()).unwrap(),
            "site"
        );
    }

    #[test]
    fn request_layer_wins_over_any() {
        let mut registry = TileRegistry::new();
        registry
            .register(TileRegistration::new("t"), Text("plain"))
            .unwrap();
        registry
            .register(
                TileRegistration::new("t").request_layer(Interface::named("IMobile")),
                Text("mobile"),
            )
            .unwrap();
        let registry = Arc::new(registry);

        let mobile = Arc::new(
            TileRequest::new("req-2", "http://localhost").with_layer(Interface::named("IMobile")),
        );
        assert_eq!(registry.render("t", Arc::new(Site), mobile).unwrap(), "mobile");
        assert_eq!(registry.render("t", Arc::new(Site), request()).unwrap(), "plain");
    }

    #[test]
    fn default_response_is_html() {
        let response = html_response("<p>ok</p>".to_string());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }

    #[test]
    fn redirect_with_newline_is_rejected() {
        let err = redirect_response("/a\nb").unwrap_err();
        assert!(matches!(err, Error::InvalidRedirect(_)));
    }
}
