use indexmap::IndexMap;

use crate::value::{AttachCallback, Value};

/// Reserved prop names interpreted by the reconciler rather than the object.
pub mod keys {
    pub const ARGS: &str = "args";
    pub const OBJECT: &str = "object";
    pub const ATTACH: &str = "attach";
    pub const ATTACH_ARRAY: &str = "attachArray";
    pub const ATTACH_OBJECT: &str = "attachObject";
    pub const ATTACH_FNS: &str = "attachFns";
    pub const DISPOSE: &str = "dispose";
    pub const ON_UPDATE: &str = "onUpdate";
    pub const DRAW: &str = "draw";
    pub const VISIBLE: &str = "visible";

    /// Attachment directives, set at creation and carried across updates.
    pub const DIRECTIVES: [&str; 4] = [ATTACH, ATTACH_ARRAY, ATTACH_OBJECT, ATTACH_FNS];

    pub fn is_reserved(key: &str) -> bool {
        key == ARGS || key == OBJECT || DIRECTIVES.contains(&key)
    }
}

/// Insertion-ordered property map of one node descriptor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Props(IndexMap<String, Value>);

impl Props {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// A copy without the given keys.
    pub fn without(&self, omit: &[&str]) -> Props {
        self.iter()
            .filter(|(k, _)| !omit.contains(k))
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Constructor arguments; an absent `args` reads as an empty list.
    pub fn args(&self) -> Option<&Value> {
        self.get(keys::ARGS)
    }

    pub fn attach(&self) -> Option<Attach> {
        attach_directive(self)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One half of an `attachFns` directive.
#[derive(Clone, Debug, PartialEq)]
pub enum AttachFnRef {
    /// Call a method of that name on the parent with the child as argument.
    Method(String),
    Callback(AttachCallback),
}

impl AttachFnRef {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(name) => Some(AttachFnRef::Method(name.clone())),
            Value::AttachFn(f) => Some(AttachFnRef::Callback(f.clone())),
            _ => None,
        }
    }
}

/// How a node is held by its logical parent when it is not a native child.
#[derive(Clone, Debug, PartialEq)]
pub enum Attach {
    Array(String),
    Object { target: String, name: String },
    Property(String),
    Fns {
        attach: AttachFnRef,
        detach: AttachFnRef,
    },
}

/// Reads the attachment directive in priority order:
/// `attachArray`, `attachObject`, `attach`, `attachFns`.
pub fn attach_directive(props: &Props) -> Option<Attach> {
    if let Some(Value::Str(name)) = props.get(keys::ATTACH_ARRAY) {
        return Some(Attach::Array(name.clone()));
    }
    if let Some(Value::Array(pair)) = props.get(keys::ATTACH_OBJECT)
        && let [Value::Str(target), Value::Str(name)] = pair.as_slice()
    {
        return Some(Attach::Object {
            target: target.clone(),
            name: name.clone(),
        });
    }
    if let Some(Value::Str(name)) = props.get(keys::ATTACH) {
        return Some(Attach::Property(name.clone()));
    }
    if let Some(Value::Array(pair)) = props.get(keys::ATTACH_FNS)
        && let [attach, detach] = pair.as_slice()
    {
        let attach = AttachFnRef::from_value(attach)?;
        let detach = AttachFnRef::from_value(detach)?;
        return Some(Attach::Fns { attach, detach });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_directive_wins() {
        let props = Props::new()
            .with(keys::ATTACH, "texture")
            .with(keys::ATTACH_ARRAY, "filters");
        assert_eq!(props.attach(), Some(Attach::Array("filters".into())));
    }

    #[test]
    fn object_directive_needs_two_names() {
        let ok = Props::new().with(
            keys::ATTACH_OBJECT,
            Value::Array(vec!["slots".into(), "main".into()]),
        );
        assert_eq!(
            ok.attach(),
            Some(Attach::Object {
                target: "slots".into(),
                name: "main".into()
            })
        );
        let bad = Props::new().with(keys::ATTACH_OBJECT, Value::Array(vec!["slots".into()]));
        assert_eq!(bad.attach(), None);
    }

    #[test]
    fn fns_directive_accepts_methods_and_callbacks() {
        let detach = AttachCallback::new(|_, _| {});
        let props = Props::new().with(
            keys::ATTACH_FNS,
            Value::Array(vec!["addFilter".into(), detach.clone().into()]),
        );
        assert_eq!(
            props.attach(),
            Some(Attach::Fns {
                attach: AttachFnRef::Method("addFilter".into()),
                detach: AttachFnRef::Callback(detach),
            })
        );
    }

    #[test]
    fn without_keeps_order() {
        let props = Props::new().with("a", 1).with(keys::ARGS, [1.0]).with("b", 2);
        let keys: Vec<_> = props.without(&[keys::ARGS]).keys().map(String::from).collect();
        assert_eq!(keys, ["a", "b"]);
    }
}
