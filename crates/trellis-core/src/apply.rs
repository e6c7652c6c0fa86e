//! Property application.
//!
//! Consumes a [`DiffSet`] and writes it into the live object. Composite
//! values (points, colors) are updated through a [`SetStrategy`] chosen from
//! the capabilities their type registered; everything else is assigned.

use std::borrow::Cow;

use crate::diff::{Change, ChangeValue, DiffSet, diff_props};
use crate::disposal::dispose_guarded;
use crate::error::{Error, PropertyError, Result};
use crate::object::SceneObject;
use crate::props::{Props, keys};
use crate::registry::{Capabilities, Catalogue, ValueType};
use crate::scene::{NodeId, Scene};
use crate::state::{LocalState, StateFlags};
use crate::store::Store;
use crate::value::{Composite, Value};

/// Engine event name for an event prop key.
pub fn event_name(key: &str) -> Cow<'static, str> {
    match key {
        "onClick" => "click".into(),
        "onRightClick" => "rightclick".into(),
        "onWheel" => "wheel".into(),
        "onPointerUp" => "pointerup".into(),
        "onPointerDown" => "pointerdown".into(),
        "onPointerOver" => "pointerover".into(),
        "onPointerOut" => "pointerout".into(),
        "onPointerEnter" => "pointerenter".into(),
        "onPointerLeave" => "pointerleave".into(),
        "onPointerMove" => "pointermove".into(),
        other => other
            .strip_prefix("on")
            .unwrap_or(other)
            .to_lowercase()
            .into(),
    }
}

/// How a value reaches its target property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetStrategy {
    DirectAssign,
    ComponentwiseSet,
    CopyFromSame,
    Broadcast,
}

impl SetStrategy {
    pub fn select(current: Option<&Value>, incoming: &Value, value_type: Option<&ValueType>) -> Self {
        let (Some(Value::Composite(current)), Some(ty)) = (current, value_type) else {
            return SetStrategy::DirectAssign;
        };
        let caps = ty.capabilities;
        match incoming {
            Value::Array(_)
                if caps.contains(Capabilities::SET_COMPONENTS) && incoming.as_components().is_some() =>
            {
                SetStrategy::ComponentwiseSet
            }
            Value::Composite(other) if other.kind == current.kind && caps.contains(Capabilities::COPY) => {
                SetStrategy::CopyFromSame
            }
            Value::Number(_) if caps.contains(Capabilities::BROADCAST) => SetStrategy::Broadcast,
            _ => SetStrategy::DirectAssign,
        }
    }

    /// The value to store, given the current one.
    pub fn resolve(self, current: Option<Value>, incoming: Value) -> Value {
        let Some(Value::Composite(mut target)) = current else {
            return incoming;
        };
        match (self, &incoming) {
            (SetStrategy::ComponentwiseSet, Value::Array(_)) => {
                for (slot, v) in target
                    .components
                    .iter_mut()
                    .zip(incoming.as_components().unwrap_or_default())
                {
                    *slot = v;
                }
                Value::Composite(target)
            }
            (SetStrategy::CopyFromSame, Value::Composite(other)) => {
                target.components = other.components.clone();
                Value::Composite(target)
            }
            (SetStrategy::Broadcast, Value::Number(n)) => {
                target.components.iter_mut().for_each(|c| *c = *n);
                Value::Composite(target)
            }
            _ => incoming,
        }
    }
}

/// Diffs `props` against nothing and applies the result. Used at creation.
pub fn apply_initial_props(
    scene: &mut Scene,
    catalogue: &Catalogue,
    node: NodeId,
    props: &Props,
) -> Result<()> {
    let diff = diff_props(scene.state(node), props, None, false);
    apply_props(scene, catalogue, node, diff)
}

pub fn apply_props(scene: &mut Scene, catalogue: &Catalogue, node: NodeId, diff: DiffSet) -> Result<()> {
    let inst = scene.get_mut(node).ok_or(Error::StaleNode(node))?;
    let store = inst.state.as_ref().and_then(LocalState::store);
    if let Some(state) = inst.state.as_mut() {
        state.memoized_props = diff.memoized;
    }

    for change in &diff.changes {
        apply_change(scene, catalogue, node, change)?;
        if let Some(store) = &store {
            invalidate_instance(store);
        }
    }

    if !diff.changes.is_empty() {
        update_instance(scene, node);
    }
    Ok(())
}

/// Marks the root dirty unless a frame is already pending.
pub(crate) fn invalidate_instance(store: &Store) {
    if store.pending_frames() == 0 {
        store.invalidate();
    }
}

/// Runs `onUpdate` for a node that is linked to a parent.
pub(crate) fn update_instance(scene: &mut Scene, node: NodeId) {
    let Some(inst) = scene.get_mut(node) else {
        return;
    };
    let hook = inst
        .state
        .as_ref()
        .filter(|s| s.parent.is_some())
        .and_then(|s| s.on_update.clone());
    if let Some(hook) = hook {
        hook.call(inst.object.as_mut());
    }
}

fn apply_change(scene: &mut Scene, catalogue: &Catalogue, node: NodeId, change: &Change) -> Result<()> {
    let key = change.key.as_str();
    if keys::is_reserved(key) {
        return Ok(());
    }

    let inst = scene.get_mut(node).ok_or(Error::StaleNode(node))?;
    match key {
        keys::DISPOSE => {
            let opt_out = matches!(
                change.value,
                ChangeValue::Set(Value::Null) | ChangeValue::Set(Value::Bool(false))
            );
            let state = inst.state.get_or_insert_with(LocalState::default);
            state.flags.set(StateFlags::NO_DISPOSE, opt_out);
            return Ok(());
        }
        keys::ON_UPDATE => {
            let hook = match &change.value {
                ChangeValue::Set(Value::Callback(cb)) => Some(cb.clone()),
                _ => None,
            };
            inst.state.get_or_insert_with(LocalState::default).on_update = hook;
            return Ok(());
        }
        keys::DRAW => {
            match &change.value {
                ChangeValue::Set(Value::Callback(draw)) => draw.call(inst.object.as_mut()),
                _ => {
                    if let Some(Err(err)) = inst.object.invoke("clear", &[]) {
                        log::warn!("{}: clear failed: {err}", inst.object.type_name());
                    }
                }
            }
            return Ok(());
        }
        _ => {}
    }

    if change.is_event {
        apply_event(inst.object.as_mut(), &mut inst.state, key, &change.value);
        return Ok(());
    }

    let value = match &change.value {
        ChangeValue::Set(v) => v.clone(),
        ChangeValue::Remove => match removed_default(scene, catalogue, node, change) {
            Some(v) => v,
            None => {
                log::warn!("no default for removed prop `{key}`; leaving it as is");
                return Ok(());
            }
        },
    };

    let object = scene.object_mut(node).ok_or(Error::StaleNode(node))?;
    assign(object, key, &change.path, value, catalogue).map_err(|source| Error::InvalidProperty {
        type_name: object_type(scene, node),
        key: key.to_string(),
        source,
    })
}

fn object_type(scene: &Scene, node: NodeId) -> String {
    scene
        .object(node)
        .map_or_else(String::new, |o| o.type_name().to_string())
}

fn apply_event(object: &mut dyn SceneObject, state: &mut Option<LocalState>, key: &str, value: &ChangeValue) {
    let name = event_name(key);
    let state = state.get_or_insert_with(LocalState::default);
    let incoming = match value {
        ChangeValue::Set(Value::Handler(h)) => Some(h),
        _ => None,
    };
    if let Some(existing) = state.handlers.get(key) {
        if Some(existing) == incoming {
            return;
        }
        object.remove_event_listener(&name, existing);
        state.handlers.shift_remove(key);
    }
    if let Some(h) = incoming {
        object.add_event_listener(&name, h.clone());
        state.handlers.insert(key.to_string(), h.clone());
    }
}

/// Writes `value` to `key`, following dashed `path` segments.
///
/// Segments resolve through nested objects first. If what remains is
/// `owner-component` on a composite value, that component is updated and
/// the composite written back to its owner.
pub fn assign(
    object: &mut dyn SceneObject,
    key: &str,
    path: &[String],
    value: Value,
    catalogue: &Catalogue,
) -> std::result::Result<(), PropertyError> {
    let Some((leaf, owners)) = path.split_last() else {
        return assign_leaf(object, key, value, catalogue);
    };

    let depth = field_depth(object, owners);
    let mut target: &mut dyn SceneObject = object;
    for seg in &owners[..depth] {
        target = target
            .field_mut(seg)
            .ok_or_else(|| PropertyError::Unresolved(seg.clone()))?;
    }

    match &owners[depth..] {
        [] => assign_leaf(target, leaf, value, catalogue),
        [owner] => {
            let Some(Value::Composite(mut composite)) = target.get(owner) else {
                return Err(PropertyError::Unresolved(owner.clone()));
            };
            let index = catalogue
                .value_type(&composite.kind)
                .and_then(|ty| ty.component_index(leaf))
                .ok_or_else(|| PropertyError::Unresolved(leaf.clone()))?;
            let n = value.as_f64().ok_or(PropertyError::Type {
                expected: "number",
                got: value.type_label(),
            })?;
            composite.components[index] = n;
            target.set(owner, Value::Composite(composite))
        }
        [first, ..] => Err(PropertyError::Unresolved(first.clone())),
    }
}

fn assign_leaf(
    target: &mut dyn SceneObject,
    key: &str,
    value: Value,
    catalogue: &Catalogue,
) -> std::result::Result<(), PropertyError> {
    let current = target.get(key);
    let value_type = match &current {
        Some(Value::Composite(c)) => catalogue.value_type(&c.kind),
        _ => None,
    };
    let strategy = SetStrategy::select(current.as_ref(), &value, value_type.as_ref());
    target.set(key, strategy.resolve(current, value))
}

/// How many leading segments name nested objects.
fn field_depth(object: &dyn SceneObject, segments: &[String]) -> usize {
    let mut probe = object;
    let mut depth = 0;
    for seg in segments {
        match probe.field(seg) {
            Some(next) => {
                probe = next;
                depth += 1;
            }
            None => break,
        }
    }
    depth
}

/// Reads the value `key` (or its dashed `path`) currently has.
pub fn read(object: &dyn SceneObject, key: &str, path: &[String], catalogue: &Catalogue) -> Option<Value> {
    let Some((leaf, owners)) = path.split_last() else {
        return object.get(key);
    };
    let mut target = object;
    let mut rest = owners;
    while let Some((seg, tail)) = rest.split_first() {
        match target.field(seg) {
            Some(next) => {
                target = next;
                rest = tail;
            }
            None => break,
        }
    }
    match rest {
        [] => target.get(leaf),
        [owner] => {
            let Value::Composite(Composite { kind, components }) = target.get(owner)? else {
                return None;
            };
            let index = catalogue.value_type(&kind)?.component_index(leaf)?;
            components.get(index).copied().map(Value::Number)
        }
        _ => None,
    }
}

/// Resolves the value a dropped prop returns to: the registered default,
/// else whatever a freshly constructed object of the same type holds.
fn removed_default(scene: &Scene, catalogue: &Catalogue, node: NodeId, change: &Change) -> Option<Value> {
    let inst = scene.get(node)?;
    let node_type = catalogue.node_type(inst.object.type_name())?;
    if let Some(v) = node_type.default_for(&change.key) {
        return Some(v);
    }

    let args = inst
        .state
        .as_ref()
        .and_then(|s| s.memoized_props.args())
        .and_then(Value::as_array)
        .map(<[Value]>::to_vec)
        .unwrap_or_default();
    let mut blank = match (node_type.constructor())(&args) {
        Ok(blank) => blank,
        Err(reason) => {
            log::debug!("cannot build a blank {}: {reason}", inst.object.type_name());
            return None;
        }
    };
    let value = read(blank.as_ref(), &change.key, &change.path, catalogue);
    if blank.is_disposable() {
        dispose_guarded(blank.as_mut());
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ValueType;

    fn point() -> ValueType {
        ValueType::new(
            Capabilities::SET_COMPONENTS | Capabilities::COPY | Capabilities::BROADCAST,
            &["x", "y"],
        )
    }

    fn current() -> Value {
        Value::Composite(Composite::new("Point", &[1.0, 2.0]))
    }

    #[test]
    fn strategy_follows_capabilities() {
        let ty = point();
        let cur = current();
        let select = |incoming: &Value, ty| SetStrategy::select(Some(&cur), incoming, ty);
        assert_eq!(select(&Value::from([3.0, 4.0]), Some(&ty)), SetStrategy::ComponentwiseSet);
        assert_eq!(select(&current(), Some(&ty)), SetStrategy::CopyFromSame);
        assert_eq!(select(&Value::Number(5.0), Some(&ty)), SetStrategy::Broadcast);
        assert_eq!(select(&Value::from("x"), Some(&ty)), SetStrategy::DirectAssign);
        assert_eq!(select(&Value::Number(5.0), None), SetStrategy::DirectAssign);

        let copy_only = ValueType::new(Capabilities::COPY, &["x", "y"]);
        assert_eq!(select(&Value::Number(5.0), Some(&copy_only)), SetStrategy::DirectAssign);
    }

    #[test]
    fn componentwise_keeps_missing_components() {
        let out = SetStrategy::ComponentwiseSet.resolve(Some(current()), Value::from([9.0]));
        assert_eq!(out, Value::Composite(Composite::new("Point", &[9.0, 2.0])));
    }

    #[test]
    fn broadcast_fills_every_component() {
        let out = SetStrategy::Broadcast.resolve(Some(current()), Value::Number(0.5));
        assert_eq!(out, Value::Composite(Composite::new("Point", &[0.5, 0.5])));
    }

    #[test]
    fn event_names() {
        assert_eq!(event_name("onPointerDown"), "pointerdown");
        assert_eq!(event_name("onRightClick"), "rightclick");
        assert_eq!(event_name("onPointerTap"), "pointertap");
    }
}
