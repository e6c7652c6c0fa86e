//! The object contract the reconciler drives.
//!
//! A rendering engine plugs in by implementing [`SceneObject`] for its node
//! types. The reconciler never downcasts; everything it needs goes through
//! named properties, listeners, named methods and `dispose`.

use std::any::Any;

use indexmap::IndexMap;

use crate::error::{DisposeError, PropertyError};
use crate::value::{Handler, PointerEvent, Value};

pub trait SceneObject: Any {
    /// Registered type name, used to find defaults and constructors.
    fn type_name(&self) -> &str;

    fn get(&self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError>;

    /// A nested object reachable through a dashed path segment.
    fn field(&self, _key: &str) -> Option<&dyn SceneObject> {
        None
    }

    fn field_mut(&mut self, _key: &str) -> Option<&mut dyn SceneObject> {
        None
    }

    /// Whether this object takes part in the native parent/child relation.
    fn is_display_object(&self) -> bool {
        false
    }

    fn add_event_listener(&mut self, _event: &str, _handler: Handler) {}

    fn remove_event_listener(&mut self, _event: &str, _handler: &Handler) {}

    /// Calls a named method. `None` means the object has no such method.
    fn invoke(&mut self, _method: &str, _args: &[Value]) -> Option<Result<Value, PropertyError>> {
        None
    }

    fn is_disposable(&self) -> bool {
        false
    }

    fn dispose(&mut self) -> Result<(), DisposeError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl std::fmt::Debug for dyn SceneObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.type_name())
    }
}

/// Arbitrary properties an object accepts without declaring them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyBag(IndexMap<String, Value>);

impl PropertyBag {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }

    /// Stores `value`; assigning `Null` clears the slot.
    pub fn set(&mut self, key: &str, value: Value) {
        if value.is_null() {
            self.0.shift_remove(key);
        } else {
            self.0.insert(key.to_string(), value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Per-object listener table keyed by engine event name.
#[derive(Clone, Debug, Default)]
pub struct Listeners(IndexMap<String, Vec<Handler>>);

impl Listeners {
    pub fn add(&mut self, event: &str, handler: Handler) {
        self.0.entry(event.to_string()).or_default().push(handler);
    }

    pub fn remove(&mut self, event: &str, handler: &Handler) {
        if let Some(list) = self.0.get_mut(event) {
            list.retain(|h| h != handler);
            if list.is_empty() {
                self.0.shift_remove(event);
            }
        }
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.get(event).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn emit(&self, event: &PointerEvent) {
        // Handlers may re-enter the object table, so call a copy.
        let handlers = self.0.get(event.name).cloned().unwrap_or_default();
        for h in &handlers {
            h.call(event);
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// A plain display node with free-form properties.
///
/// Used for root stages when the engine does not register its own
/// container type, and as a lightweight node in tests.
#[derive(Debug, Default)]
pub struct Group {
    pub props: PropertyBag,
    pub listeners: Listeners,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SceneObject for Group {
    fn type_name(&self) -> &str {
        "Group"
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.props.get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), PropertyError> {
        self.props.set(key, value);
        Ok(())
    }

    fn is_display_object(&self) -> bool {
        true
    }

    fn add_event_listener(&mut self, event: &str, handler: Handler) {
        self.listeners.add(event, handler);
    }

    fn remove_event_listener(&mut self, event: &str, handler: &Handler) {
        self.listeners.remove(event, handler);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::geometry::Vec2;

    #[test]
    fn null_clears_bag_slot() {
        let mut bag = PropertyBag::default();
        bag.set("name", "stage".into());
        assert_eq!(bag.get("name"), Some(Value::from("stage")));
        bag.set("name", Value::Null);
        assert_eq!(bag.get("name"), None);
    }

    #[test]
    fn listeners_remove_by_identity() {
        let hits = Rc::new(Cell::new(0));
        let h = {
            let hits = hits.clone();
            Handler::new(move |_| hits.set(hits.get() + 1))
        };
        let mut listeners = Listeners::default();
        listeners.add("click", h.clone());
        listeners.add("click", Handler::new(|_| {}));

        let event = PointerEvent {
            name: "click",
            position: Vec2::default(),
            target: None,
        };
        listeners.emit(&event);
        assert_eq!(hits.get(), 1);

        listeners.remove("click", &h);
        listeners.emit(&event);
        assert_eq!(hits.get(), 1);
        assert_eq!(listeners.count("click"), 1);
    }
}
