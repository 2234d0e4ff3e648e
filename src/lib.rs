//! Page fragments as independently registered render units.
//!
//! A *tile* is a reusable piece of a page registered under a name for a
//! (model interface, request layer) pair. Pages compose tiles by name, either
//! from Rust or from a template through the `tile` helper, and each tile can
//! carry a permission that is checked before it renders.
//!
//! # Core Types
//!
//! - [`Tile`]: The render unit contract (`show`, `prepare`, `render`)
//! - [`TileRegistry`]: Explicit registry built at startup and shared via `Arc`
//! - [`TileRegistration`]: Options for one registration
//! - [`TileScope`]: Call-scoped model, request and display data
//! - [`TileLookup`]: Named-tile lookup bound to a model and request
//! - [`TileOutcome`]: `Rendered`, `Redirect` or `Denied`
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use tile_core::{Model, TileRegistration, TileRegistry, TileRequest};
//!
//! struct Page;
//! impl Model for Page {
//!     fn path(&self) -> Vec<Option<String>> {
//!         vec![None, Some("about".to_string())]
//!     }
//! }
//!
//! let mut registry = TileRegistry::new();
//! registry
//!     .templates_mut()
//!     .add_template("site:page.html", "<h1>{{ tile('title') }}</h1>")
//!     .unwrap();
//! registry
//!     .register_default(TileRegistration::new("page").path("site:page.html"))
//!     .unwrap();
//! registry
//!     .register_fn(TileRegistration::new("title"), |_| Ok("About".to_string()))
//!     .unwrap();
//! let registry = Arc::new(registry);
//!
//! let request = Arc::new(TileRequest::new("req-1", "http://example.com"));
//! let html = registry.render("page", Arc::new(Page), request).unwrap();
//! assert_eq!(html, "<h1>About</h1>");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod logging;
mod lookup;
mod model;
mod registry;
mod request;
mod scope;
mod security;
mod settings;
mod template;
mod tile;

pub use error::{Error, LookupError, Violation, ViolationKind};
pub use logging::TileLog;
pub use lookup::{Lookup, TileLookup};
pub use model::{Interface, Model};
pub use registry::{
    DeclaredTile, RegisteredTile, ResponseFactory, TileRegistration, TileRegistry,
    DEFAULT_ATTRIBUTE, DEFAULT_PERMISSION,
};
pub use request::{Principal, TileRequest};
pub use scope::{RenderPass, TileScope, MAX_NESTING_DEPTH};
pub use security::{
    Ace, AceAction, AclAuthorization, AuthenticationPolicy, AuthorizationPolicy, LenientView,
    PrincipalAuthentication, SecuredView, ALL_PERMISSIONS, AUTHENTICATED, EVERYONE,
};
pub use settings::{Settings, DEBUG_AUTHORIZATION_ENV};
pub use template::{TemplatePath, Templates};
pub use tile::{BaseTile, FnTile, Tile, TileOutcome, View};
