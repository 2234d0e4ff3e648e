//! Model side of the tile registry key.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use minijinja::Value;

use crate::security::Ace;

/// A capability marker used as a registry lookup key.
///
/// Models and requests are matched against interfaces rather than concrete
/// types, so a tile registered for [`Interface::Any`] applies everywhere, one
/// registered for [`Interface::of`] applies to a single model type, and one
/// registered for a [`Interface::named`] marker applies to every model that
/// lists that marker in [`Model::provides`].
///
/// # Examples
///
/// ```
/// use tile_core::Interface;
///
/// struct Folder;
///
/// assert_eq!(Interface::of::<Folder>(), Interface::of::<Folder>());
/// assert_ne!(Interface::of::<Folder>(), Interface::Any);
/// assert_eq!(Interface::named("IContainer").to_string(), "IContainer");
/// ```
#[derive(Clone)]
pub enum Interface {
    /// Matches every model or request
    Any,
    /// Matches one concrete type
    Type {
        /// Identity of the type
        id: TypeId,
        /// Type name, for diagnostics only
        name: &'static str,
    },
    /// A structural marker declared by models or requests
    Named(Cow<'static, str>),
}

impl Interface {
    /// Interface matching exactly the type `T`.
    pub fn of<T: Any>() -> Self {
        Interface::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// A named marker interface.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Interface::Named(name.into())
    }

    /// Interface of a model's concrete type, known only by its `TypeId`.
    pub(crate) fn of_model(model: &dyn Model) -> Self {
        let any: &dyn Any = model;
        Interface::Type {
            id: any.type_id(),
            name: "<model>",
        }
    }
}

// Type interfaces compare by identity; the name is diagnostic only.
impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Interface::Any, Interface::Any) => true,
            (Interface::Type { id: a, .. }, Interface::Type { id: b, .. }) => a == b,
            (Interface::Named(a), Interface::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Interface {}

impl Hash for Interface {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Interface::Any => 0u8.hash(state),
            Interface::Type { id, .. } => {
                1u8.hash(state);
                id.hash(state);
            }
            Interface::Named(name) => {
                2u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Any => write!(f, "Interface::Any"),
            Interface::Type { name, .. } => write!(f, "Interface::Type({})", name),
            Interface::Named(name) => write!(f, "Interface::Named({})", name),
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Any => write!(f, "*"),
            Interface::Type { name, .. } => write!(f, "{}", name),
            Interface::Named(name) => write!(f, "{}", name),
        }
    }
}

/// A domain object tiles are rendered in the context of.
///
/// Only [`path`](Model::path) is commonly overridden; the remaining methods
/// have defaults that make a model anonymous to security, visible to
/// templates by its path, and matched by its concrete type and
/// [`Interface::Any`].
pub trait Model: Any + Send + Sync {
    /// Path segments from the application root to this model.
    ///
    /// `None` segments are skipped when building URLs.
    fn path(&self) -> Vec<Option<String>> {
        Vec::new()
    }

    /// Marker interfaces this model provides, most specific first.
    fn provides(&self) -> Vec<Interface> {
        Vec::new()
    }

    /// Access control entries consulted by
    /// [`AclAuthorization`](crate::AclAuthorization).
    fn acl(&self) -> Vec<Ace> {
        Vec::new()
    }

    /// The value exposed to templates as `model`.
    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("path", Value::from_serialize(self.path()));
        Value::from_serialize(map)
    }
}

impl dyn Model {
    /// Downcasts to the concrete model type.
    pub fn downcast_ref<T: Model>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref::<T>()
    }

    /// Interfaces in lookup order: concrete type, provided markers, `Any`.
    pub(crate) fn lookup_order(&self) -> Vec<Interface> {
        let mut order = vec![Interface::of_model(self)];
        order.extend(self.provides());
        order.push(Interface::Any);
        order
    }

    /// The model's path joined with `/`, for diagnostics.
    pub(crate) fn display_path(&self) -> String {
        let segments: Vec<String> = self.path().into_iter().flatten().collect();
        format!("/{}", segments.join("/"))
    }
}
