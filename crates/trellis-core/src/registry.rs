//! Node-type catalogue.
//!
//! Types come from two places: the engine namespace installed when the
//! registry is built, and any number of [`Catalogue::extend`] calls made
//! before reconciliation starts. Lookups try the catalogue first.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard};
use smallvec::SmallVec;

use crate::object::SceneObject;
use crate::value::Value;

bitflags::bitflags! {
    /// What a composite value type supports when a prop is assigned to it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// Accepts an array of numbers, spread over its components.
        const SET_COMPONENTS = 1 << 0;
        /// Accepts another value of the same kind.
        const COPY = 1 << 1;
        /// Accepts a single number written to every component.
        const BROADCAST = 1 << 2;
    }
}

/// A registered composite value type (points, colors).
#[derive(Clone, Debug, PartialEq)]
pub struct ValueType {
    pub capabilities: Capabilities,
    /// Component names, addressable as the last segment of a dashed key.
    pub components: SmallVec<[&'static str; 4]>,
}

impl ValueType {
    pub fn new(capabilities: Capabilities, components: &[&'static str]) -> Self {
        Self {
            capabilities,
            components: SmallVec::from_slice(components),
        }
    }

    pub fn component_index(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| *c == name)
    }
}

pub type Constructor =
    Arc<dyn Fn(&[Value]) -> Result<Box<dyn SceneObject>, String> + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// A constructible node type.
#[derive(Clone)]
pub struct NodeType {
    constructor: Constructor,
    defaults: IndexMap<String, DefaultFn>,
}

impl NodeType {
    pub fn new(
        constructor: impl Fn(&[Value]) -> Result<Box<dyn SceneObject>, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            constructor: Arc::new(constructor),
            defaults: IndexMap::new(),
        }
    }

    /// Registers the value a prop falls back to once it is no longer set.
    pub fn with_default(
        mut self,
        key: impl Into<String>,
        default: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.defaults.insert(key.into(), Arc::new(default));
        self
    }

    pub fn default_for(&self, key: &str) -> Option<Value> {
        self.defaults.get(key).map(|f| f())
    }

    pub fn constructor(&self) -> Constructor {
        self.constructor.clone()
    }
}

impl std::fmt::Debug for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeType")
            .field("defaults", &self.defaults.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    catalogue: IndexMap<String, NodeType>,
    namespace: IndexMap<String, NodeType>,
    prefix: String,
    values: IndexMap<String, ValueType>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry around an engine namespace. Descriptor types may
    /// carry `prefix` (`"pixiSprite"`), which is stripped before lookup.
    pub fn with_namespace(
        prefix: impl Into<String>,
        types: impl IntoIterator<Item = (String, NodeType)>,
    ) -> Self {
        Self {
            namespace: types.into_iter().collect(),
            prefix: capitalize(&prefix.into()),
            ..Self::default()
        }
    }

    pub fn extend(&mut self, types: impl IntoIterator<Item = (String, NodeType)>) {
        self.catalogue.extend(types);
    }

    pub fn register_value(&mut self, kind: impl Into<String>, value_type: ValueType) {
        self.values.insert(kind.into(), value_type);
    }

    /// Resolves a descriptor type name (`"sprite"`) to its node type.
    pub fn resolve(&self, type_name: &str) -> Option<&NodeType> {
        let name = capitalize(type_name);
        if let Some(t) = self.catalogue.get(&name) {
            return Some(t);
        }
        let bare = if self.prefix.is_empty() {
            name.as_str()
        } else {
            name.strip_prefix(&self.prefix).unwrap_or(&name)
        };
        self.namespace.get(bare)
    }

    /// Finds a node type by its registered name, as reported by
    /// [`SceneObject::type_name`].
    pub fn node_type(&self, name: &str) -> Option<&NodeType> {
        self.catalogue.get(name).or_else(|| self.namespace.get(name))
    }

    pub fn value_type(&self, kind: &str) -> Option<&ValueType> {
        self.values.get(kind)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.catalogue
            .keys()
            .chain(self.namespace.keys())
            .map(String::as_str)
    }
}

pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Shared handle to a [`Registry`], injected into each reconciler.
///
/// The registry is read-only while reconciling; extend it up front.
#[derive(Clone, Debug, Default)]
pub struct Catalogue(Arc<RwLock<Registry>>);

impl Catalogue {
    pub fn new(registry: Registry) -> Self {
        Self(Arc::new(RwLock::new(registry)))
    }

    pub fn extend(&self, types: impl IntoIterator<Item = (String, NodeType)>) {
        self.0.write().extend(types);
    }

    pub fn register_value(&self, kind: impl Into<String>, value_type: ValueType) {
        self.0.write().register_value(kind, value_type);
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.0.read()
    }

    pub fn resolve(&self, type_name: &str) -> Option<NodeType> {
        self.0.read().resolve(type_name).cloned()
    }

    pub fn node_type(&self, name: &str) -> Option<NodeType> {
        self.0.read().node_type(name).cloned()
    }

    pub fn value_type(&self, kind: &str) -> Option<ValueType> {
        self.0.read().value_type(kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Group;

    fn group() -> NodeType {
        NodeType::new(|_| Ok(Box::new(Group::new())))
    }

    #[test]
    fn catalogue_shadows_namespace() {
        let mut registry = Registry::with_namespace("pixi", [("Container".to_string(), group())]);
        assert!(registry.resolve("container").is_some());
        assert!(registry.resolve("pixiContainer").is_some());
        assert!(registry.resolve("sprite").is_none());

        registry.extend([(
            "Container".to_string(),
            group().with_default("alpha", || 1.0.into()),
        )]);
        let resolved = registry.resolve("container").map(|t| t.default_for("alpha"));
        assert_eq!(resolved, Some(Some(Value::Number(1.0))));
    }

    #[test]
    fn components_are_addressable() {
        let point = ValueType::new(Capabilities::SET_COMPONENTS | Capabilities::COPY, &["x", "y"]);
        assert_eq!(point.component_index("y"), Some(1));
        assert_eq!(point.component_index("z"), None);
    }

    #[test]
    fn handles_share_one_registry() {
        let catalogue = Catalogue::default();
        let other = catalogue.clone();
        other.extend([("Widget".to_string(), group())]);
        assert!(catalogue.resolve("widget").is_some());
    }
}
