use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Interface;

/// The request a tile is rendered for.
///
/// Carries what tiles and security policies read about the current request:
/// an identifier for log correlation, the application root URL used by
/// [`TileScope::nodeurl`](crate::TileScope::nodeurl), the authenticated
/// principal and the request layers that take part in tile lookup.
///
/// # Examples
///
/// ```
/// use tile_core::{Principal, TileRequest};
///
/// let request = TileRequest::new("req-1", "http://example.com")
///     .with_principal(Principal::new("alice", "Alice"))
///     .with_param("page", "2");
///
/// assert_eq!(request.application_url(), "http://example.com");
/// assert_eq!(request.param("page"), Some("2"));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct TileRequest {
    request_id: String,
    application_url: String,
    principal: Option<Principal>,
    params: BTreeMap<String, String>,
    #[serde(skip)]
    layers: Vec<Interface>,
}

impl TileRequest {
    /// Creates a request with no principal, parameters or layers.
    pub fn new(request_id: impl Into<String>, application_url: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            application_url: application_url.into(),
            principal: None,
            params: BTreeMap::new(),
            layers: Vec::new(),
        }
    }

    /// Sets the authenticated principal.
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Adds a request parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Marks the request as providing `layer`.
    ///
    /// Layers are consulted in the order they were added, before the
    /// catch-all [`Interface::Any`].
    pub fn with_layer(mut self, layer: Interface) -> Self {
        self.layers.push(layer);
        self
    }

    /// Returns the request ID.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the application root URL.
    pub fn application_url(&self) -> &str {
        &self.application_url
    }

    /// Returns the principal, if authenticated.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Returns a request parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the request layers in lookup order.
    pub fn layers(&self) -> &[Interface] {
        &self.layers
    }
}

/// An authenticated user or service principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Unique identifier for this principal
    pub id: String,
    /// Display name
    pub name: String,
    /// Groups the principal belongs to
    pub groups: Vec<String>,
}

impl Principal {
    /// Creates a principal without groups.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            groups: Vec::new(),
        }
    }

    /// Adds a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }
}
