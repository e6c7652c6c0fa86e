//! Props diffing.
//!
//! [`diff_props`] compares two prop maps of one node and returns the changes
//! [`apply_props`](crate::apply::apply_props) will perform. It is pure: it
//! reads the node's [`LocalState`] but never writes it.

use smallvec::SmallVec;

use crate::props::{Props, keys};
use crate::state::LocalState;
use crate::value::{Value, shallow_eq};

/// Key prefixes that mark an event handler prop.
const EVENT_PREFIXES: [&str; 4] = ["onPointer", "onClick", "onRightClick", "onWheel"];

pub fn is_event_key(key: &str) -> bool {
    EVENT_PREFIXES.iter().any(|p| key.starts_with(p))
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChangeValue {
    Set(Value),
    /// The key was dropped since the previous render.
    Remove,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub key: String,
    pub value: ChangeValue,
    pub is_event: bool,
    /// Segments of a dashed key (`"material-color"`); empty otherwise.
    pub path: SmallVec<[String; 2]>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiffSet {
    pub accumulative: bool,
    /// What becomes the node's memoized props once applied.
    pub memoized: Props,
    pub changes: Vec<Change>,
}

impl DiffSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.key.as_str())
    }
}

/// Computes the changes that turn `previous` into `props`.
///
/// With `accumulative` set, keys only present in `previous` come first, in
/// their previous order, as [`ChangeValue::Remove`].
pub fn diff_props(
    state: Option<&LocalState>,
    props: &Props,
    previous: Option<&Props>,
    accumulative: bool,
) -> DiffSet {
    let empty = Props::new();
    let previous = previous.unwrap_or(&empty);
    let primitive = state.is_some_and(LocalState::is_primitive);

    let removed = previous
        .keys()
        .filter(|k| accumulative && !props.contains_key(k))
        .map(|k| (k, None));
    let present = props.iter().map(|(k, v)| (k, Some(v)));

    let mut changes = Vec::new();
    for (key, value) in removed.chain(present) {
        if primitive && key == keys::OBJECT {
            continue;
        }
        if value.is_some() && shallow_eq(value, previous.get(key)) {
            continue;
        }
        let value = match value {
            Some(v) => ChangeValue::Set(v.clone()),
            None => ChangeValue::Remove,
        };
        if is_event_key(key) {
            changes.push(Change {
                key: key.to_string(),
                value,
                is_event: true,
                path: SmallVec::new(),
            });
            continue;
        }
        let path = if key.contains('-') {
            key.split('-').map(String::from).collect()
        } else {
            SmallVec::new()
        };
        changes.push(Change {
            key: key.to_string(),
            value,
            is_event: false,
            path,
        });
    }

    let mut memoized = props.clone();
    if let Some(prev) = state.map(|s| &s.memoized_props) {
        for key in std::iter::once(keys::ARGS).chain(keys::DIRECTIVES) {
            if !memoized.contains_key(key)
                && let Some(v) = prev.get(key)
            {
                memoized.insert(key, v.clone());
            }
        }
    }

    DiffSet {
        accumulative,
        memoized,
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateFlags;
    use crate::value::Handler;

    fn props() -> Props {
        Props::new()
            .with("alpha", 0.5)
            .with("position", [1.0, 2.0])
            .with("onClick", Handler::new(|_| {}))
    }

    #[test]
    fn diffing_against_itself_is_empty() {
        let p = props();
        assert!(diff_props(None, &p, Some(&p), true).is_empty());
        assert!(diff_props(None, &p, Some(&p.clone()), false).is_empty());
    }

    #[test]
    fn removed_keys_come_first_in_previous_order() {
        let previous = Props::new().with("a", 1).with("b", 2).with("c", 3);
        let next = Props::new().with("b", 5);
        let diff = diff_props(None, &next, Some(&previous), true);
        let keys: Vec<_> = diff.keys().collect();
        assert_eq!(keys, ["a", "c", "b"]);
        assert_eq!(diff.changes[0].value, ChangeValue::Remove);
        assert_eq!(diff.changes[2].value, ChangeValue::Set(Value::Number(5.0)));
    }

    #[test]
    fn removals_need_accumulative() {
        let previous = Props::new().with("a", 1);
        let diff = diff_props(None, &Props::new(), Some(&previous), false);
        assert!(diff.is_empty());
    }

    #[test]
    fn dashed_keys_split_into_paths() {
        let previous = Props::new().with("material-color", "red");
        let next = Props::new().with("material-color", "blue");
        let diff = diff_props(None, &next, Some(&previous), true);
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].path.as_slice(), ["material", "color"]);
        assert!(!diff.changes[0].is_event);
    }

    #[test]
    fn event_keys_are_never_split() {
        let next = Props::new().with("onPointer-down", Handler::new(|_| {}));
        let diff = diff_props(None, &next, None, false);
        assert!(diff.changes[0].is_event);
        assert!(diff.changes[0].path.is_empty());
    }

    #[test]
    fn primitives_skip_object_key() {
        let state = LocalState {
            flags: StateFlags::PRIMITIVE,
            ..LocalState::default()
        };
        let next = Props::new().with("object", 1).with("x", 3);
        let diff = diff_props(Some(&state), &next, None, false);
        let keys: Vec<_> = diff.keys().collect();
        assert_eq!(keys, ["x"]);
    }

    #[test]
    fn memoized_keeps_creation_time_keys() {
        let state = LocalState {
            memoized_props: Props::new()
                .with(keys::ARGS, [1.0])
                .with(keys::ATTACH_ARRAY, "items"),
            ..LocalState::default()
        };
        let diff = diff_props(Some(&state), &Props::new().with("x", 1), None, true);
        assert_eq!(diff.memoized.args(), Some(&Value::from([1.0])));
        assert_eq!(diff.memoized.get(keys::ATTACH_ARRAY), Some(&Value::from("items")));
    }
}
