//! Dynamically typed prop values.
//!
//! Props cross the boundary between the declarative description and the
//! retained objects, so they are carried as [`Value`]s. Equality follows the
//! diffing rule: arrays compare element-wise, callables compare by identity,
//! everything else by value.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::geometry::Vec2;
use crate::{NodeId, SceneObject};

/// Payload delivered to event listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct PointerEvent {
    /// Engine event name, e.g. `"pointerdown"`.
    pub name: &'static str,
    pub position: Vec2,
    pub target: Option<NodeId>,
}

/// Event listener. Two handlers are equal only if they are the same `Rc`.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&PointerEvent)>);

impl Handler {
    pub fn new(f: impl Fn(&PointerEvent) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, event: &PointerEvent) {
        (self.0)(event)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0))
    }
}

/// Callback that receives the live object (`draw`, `onUpdate`).
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&mut dyn SceneObject)>);

impl Callback {
    pub fn new(f: impl Fn(&mut dyn SceneObject) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, object: &mut dyn SceneObject) {
        (self.0)(object)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0))
    }
}

/// One half of an `attachFns` pair, called as `(child, parent)`.
#[derive(Clone)]
pub struct AttachCallback(Rc<dyn Fn(&mut dyn SceneObject, &mut dyn SceneObject)>);

impl AttachCallback {
    pub fn new(f: impl Fn(&mut dyn SceneObject, &mut dyn SceneObject) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, child: &mut dyn SceneObject, parent: &mut dyn SceneObject) {
        (self.0)(child, parent)
    }
}

impl PartialEq for AttachCallback {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AttachCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttachCallback({:p})", Rc::as_ptr(&self.0))
    }
}

/// A small fixed-arity value type such as a point or a color.
#[derive(Clone, Debug, PartialEq)]
pub struct Composite {
    /// Registered type name of the value (`"Point"`, `"Color"`).
    pub kind: String,
    pub components: SmallVec<[f64; 4]>,
}

impl Composite {
    pub fn new(kind: impl Into<String>, components: &[f64]) -> Self {
        Self {
            kind: kind.into(),
            components: SmallVec::from_slice(components),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    Composite(Composite),
    Node(NodeId),
    Handler(Handler),
    Callback(Callback),
    AttachFn(AttachCallback),
}

impl Value {
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Composite(_) => "composite",
            Value::Node(_) => "node",
            Value::Handler(_) => "handler",
            Value::Callback(_) => "callback",
            Value::AttachFn(_) => "attach function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Numeric components of an array value, if every element is a number.
    pub fn as_components(&self) -> Option<SmallVec<[f64; 4]>> {
        self.as_array()?.iter().map(Value::as_f64).collect()
    }
}

/// Shallow comparison used to skip redundant changes.
///
/// Absent and present values never compare equal.
pub fn shallow_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Value::Node(v)
    }
}

impl From<Composite> for Value {
    fn from(v: Composite) -> Self {
        Value::Composite(v)
    }
}

impl From<Handler> for Value {
    fn from(v: Handler) -> Self {
        Value::Handler(v)
    }
}

impl From<Callback> for Value {
    fn from(v: Callback) -> Self {
        Value::Callback(v)
    }
}

impl From<AttachCallback> for Value {
    fn from(v: AttachCallback) -> Self {
        Value::AttachFn(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::Array(v.into_iter().map(Value::Number).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_compare_element_wise() {
        let a = Value::from([1.0, 2.0]);
        let b = Value::from([1.0, 2.0]);
        assert!(shallow_eq(Some(&a), Some(&b)));
        assert!(!shallow_eq(Some(&a), Some(&Value::from([1.0, 3.0]))));
    }

    #[test]
    fn callables_compare_by_identity() {
        let h = Handler::new(|_| {});
        let same = h.clone();
        let other = Handler::new(|_| {});
        assert_eq!(Value::Handler(h.clone()), Value::Handler(same));
        assert_ne!(Value::Handler(h), Value::Handler(other));
    }

    #[test]
    fn absent_is_not_null() {
        assert!(!shallow_eq(Some(&Value::Null), None));
        assert!(shallow_eq(None, None));
    }

    #[test]
    fn components_require_numbers() {
        assert_eq!(
            Value::from([1.0, 2.0]).as_components().map(|c| c.to_vec()),
            Some(vec![1.0, 2.0])
        );
        let mixed = Value::Array(vec![Value::Number(1.0), Value::from("x")]);
        assert!(mixed.as_components().is_none());
    }
}
