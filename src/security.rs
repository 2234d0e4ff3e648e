//! Permission checks around registered tiles.
//!
//! A tile registered with a permission is wrapped in a [`SecuredView`]. The
//! check runs when both an [`AuthenticationPolicy`] and an
//! [`AuthorizationPolicy`] are configured on the registry at call time. A
//! non-strict registration is further wrapped in a [`LenientView`], which
//! turns a failed check into empty output.
//!
//! ```text
//! LenientView ──> SecuredView ──> TileView
//!  (strict=false)  (permission)    (render unit)
//! ```

use std::sync::Arc;

use crate::error::{Error, Violation, ViolationKind};
use crate::model::Model;
use crate::request::TileRequest;
use crate::scope::TileScope;
use crate::tile::{TileOutcome, View};

/// Principal every request has, authenticated or not.
pub const EVERYONE: &str = "system.Everyone";

/// Principal every request with an authenticated principal has.
pub const AUTHENTICATED: &str = "system.Authenticated";

/// Permission wildcard for access control entries.
pub const ALL_PERMISSIONS: &str = "*";

/// Resolves the principals effective for a request.
pub trait AuthenticationPolicy: Send + Sync {
    /// Principal identifiers, including the `system.*` pseudo principals.
    fn effective_principals(&self, request: &TileRequest) -> Vec<String>;
}

/// Decides whether principals hold a permission on a model.
pub trait AuthorizationPolicy: Send + Sync {
    /// Returns `true` if any of `principals` is granted `permission` on
    /// `model`.
    fn permits(&self, model: &dyn Model, principals: &[String], permission: &str) -> bool;
}

/// Authentication from the request's [`Principal`](crate::Principal).
///
/// ```
/// use tile_core::{AuthenticationPolicy, Principal, PrincipalAuthentication, TileRequest};
///
/// let request = TileRequest::new("req-1", "http://localhost")
///     .with_principal(Principal::new("alice", "Alice").with_group("editors"));
///
/// assert_eq!(
///     PrincipalAuthentication.effective_principals(&request),
///     vec!["system.Everyone", "system.Authenticated", "alice", "editors"]
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalAuthentication;

impl AuthenticationPolicy for PrincipalAuthentication {
    fn effective_principals(&self, request: &TileRequest) -> Vec<String> {
        let mut principals = vec![EVERYONE.to_string()];
        if let Some(principal) = request.principal() {
            principals.push(AUTHENTICATED.to_string());
            principals.push(principal.id.clone());
            principals.extend(principal.groups.iter().cloned());
        }
        principals
    }
}

/// Whether an access control entry grants or refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AceAction {
    /// Grants the permission
    Allow,
    /// Refuses the permission
    Deny,
}

/// One access control entry of a model's ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    /// Grant or refuse
    pub action: AceAction,
    /// Principal the entry applies to
    pub principal: String,
    /// Permission name, or [`ALL_PERMISSIONS`]
    pub permission: String,
}

impl Ace {
    /// An entry granting `permission` to `principal`.
    pub fn allow(principal: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            action: AceAction::Allow,
            principal: principal.into(),
            permission: permission.into(),
        }
    }

    /// An entry refusing `permission` to `principal`.
    pub fn deny(principal: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            action: AceAction::Deny,
            principal: principal.into(),
            permission: permission.into(),
        }
    }

    fn matches(&self, principals: &[String], permission: &str) -> bool {
        (self.permission == permission || self.permission == ALL_PERMISSIONS)
            && principals.iter().any(|p| *p == self.principal)
    }
}

/// Authorization from [`Model::acl`].
///
/// Entries are evaluated in order; the first entry matching an effective
/// principal and the permission decides. No match denies.
#[derive(Debug, Clone, Copy, Default)]
pub struct AclAuthorization;

impl AuthorizationPolicy for AclAuthorization {
    fn permits(&self, model: &dyn Model, principals: &[String], permission: &str) -> bool {
        model
            .acl()
            .iter()
            .find(|ace| ace.matches(principals, permission))
            .is_some_and(|ace| ace.action == AceAction::Allow)
    }
}

/// Runs the permission check before the wrapped view.
///
/// Policies are read from the scope's registry on every call. Without both
/// policies the check passes.
pub struct SecuredView {
    inner: Arc<dyn View>,
    permission: String,
}

impl SecuredView {
    /// Wraps `inner` with a check for `permission`.
    pub fn new(inner: Arc<dyn View>, permission: impl Into<String>) -> Self {
        Self {
            inner,
            permission: permission.into(),
        }
    }

    fn check(&self, scope: &TileScope) -> Result<(), Violation> {
        let registry = scope.registry();
        let (Some(authentication), Some(authorization)) = (
            registry.authentication_policy(),
            registry.authorization_policy(),
        ) else {
            return Ok(());
        };

        let principals = authentication.effective_principals(scope.request());
        if authorization.permits(scope.model(), &principals, &self.permission) {
            return Ok(());
        }

        let anonymous = principals.iter().all(|p| p == EVERYONE);
        let kind = if anonymous {
            ViolationKind::Unauthenticated
        } else {
            ViolationKind::Unauthorized {
                permission: self.permission.clone(),
            }
        };
        Err(Violation::new(
            kind,
            format!("tile '{}' failed permission check", scope.tile_name()),
        ))
    }
}

impl View for SecuredView {
    fn call(&self, scope: &mut TileScope) -> Result<TileOutcome, Error> {
        self.check(scope)?;
        self.inner.call(scope)
    }
}

/// Consumes `Error::Forbidden` from the wrapped view.
///
/// The tile renders as nothing instead. With `debug_authorization` enabled
/// the consumed violation is logged at debug level.
pub struct LenientView {
    inner: Arc<dyn View>,
}

impl LenientView {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn View>) -> Self {
        Self { inner }
    }
}

impl View for LenientView {
    fn call(&self, scope: &mut TileScope) -> Result<TileOutcome, Error> {
        match self.inner.call(scope) {
            Err(Error::Forbidden(violation)) => {
                if scope.settings().debug_authorization {
                    scope.log().debug(format_args!(
                        "forbidden tile called, consumed violation: {}",
                        violation
                    ));
                }
                Ok(TileOutcome::Denied)
            }
            other => other,
        }
    }
}
