//! Instance lifecycle.
//!
//! [`Reconciler`] implements [`HostConfig`] on top of a [`Scene`]: it builds
//! objects from the catalogue, links them to their logical parent through
//! the attachment directive (or the native child list), tears subtrees down
//! with deferred disposal, and rebuilds nodes whose constructor arguments
//! changed.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use web_time::Duration;

use crate::apply::{apply_initial_props, apply_props, event_name, invalidate_instance, update_instance};
use crate::diff::diff_props;
use crate::disposal::{DisposalTask, dispose_guarded};
use crate::error::{Error, Result};
use crate::frameloop::{FrameLoop, TimerId};
use crate::host::{HostConfig, HostContainer, NodeRef, UpdatePayload};
use crate::props::{Attach, AttachFnRef, Props, keys};
use crate::registry::{Catalogue, NodeType, capitalize};
use crate::render_api::{BackendFactory, SurfaceId};
use crate::root::WeakRoot;
use crate::scene::{NodeId, Scene};
use crate::state::{LocalState, StateFlags};
use crate::store::Store;
use crate::value::Value;

/// Descriptor type that adopts an existing object instead of building one.
pub const PRIMITIVE: &str = "primitive";

#[derive(Clone)]
pub struct Reconciler {
    pub(crate) catalogue: Catalogue,
    pub(crate) frame_loop: FrameLoop,
    pub(crate) backends: Option<Rc<dyn BackendFactory>>,
    pub(crate) roots: Rc<RefCell<IndexMap<SurfaceId, WeakRoot>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("frame_loop", &self.frame_loop)
            .field("roots", &self.roots.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(catalogue: Catalogue, frame_loop: FrameLoop) -> Self {
        Self {
            catalogue,
            frame_loop,
            backends: None,
            roots: Rc::default(),
        }
    }

    /// Creates backends for roots configured without one.
    pub fn with_backends(mut self, factory: impl BackendFactory + 'static) -> Self {
        self.backends = Some(Rc::new(factory));
        self
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }

    /// Registers third-party node types.
    pub fn extend(&self, types: impl IntoIterator<Item = (String, NodeType)>) {
        self.catalogue.extend(types);
    }

    /// Links `child` to `parent`, at `before`'s position where the
    /// attachment kind has an order.
    fn link(&self, scene: &mut Scene, parent: NodeId, child: NodeId, before: Option<NodeId>) -> Result<()> {
        for id in [parent, child] {
            if !scene.contains(id) {
                return Err(Error::StaleNode(id));
            }
        }

        let directive = scene.state(child).and_then(|s| s.memoized_props.attach());
        let native = match &directive {
            Some(Attach::Array(name)) => {
                attach_to_array(scene, parent, child, name, before)?;
                false
            }
            Some(Attach::Object { target, name }) => {
                let mut slots = match property(scene, parent, target) {
                    Some(Value::Map(slots)) => slots,
                    _ => IndexMap::new(),
                };
                slots.insert(name.clone(), Value::Node(child));
                set_property(scene, parent, target, Value::Map(slots))?;
                false
            }
            Some(Attach::Property(name)) => {
                set_property(scene, parent, name, Value::Node(child))?;
                false
            }
            Some(Attach::Fns { attach, .. }) => {
                call_attach_fn(scene, attach, parent, child)?;
                false
            }
            None if is_display(scene, parent) && is_display(scene, child) => {
                let index = match before {
                    Some(before) => {
                        scene.remove_child(parent, child);
                        scene.child_index(parent, before)
                    }
                    None => None,
                };
                match index {
                    Some(i) => scene.add_child_at(parent, child, i)?,
                    None => scene.add_child(parent, child)?,
                }
                true
            }
            None => false,
        };

        if !native {
            let objects = &mut scene.ensure_state(parent)?.objects;
            if !objects.contains(&child) {
                objects.push(child);
            }
        }
        scene.ensure_state(child)?.parent = Some(parent);
        update_instance(scene, child);
        invalidate_node(scene, child);
        Ok(())
    }

    fn unlink(&self, scene: &mut Scene, parent: NodeId, child: NodeId, directive: Option<&Attach>) -> Result<()> {
        match directive {
            Some(Attach::Array(name)) => {
                if let Some(Value::Array(mut items)) = property(scene, parent, name) {
                    items.retain(|v| v.as_node() != Some(child));
                    set_property(scene, parent, name, Value::Array(items))?;
                }
            }
            Some(Attach::Object { target, name }) => {
                if let Some(Value::Map(mut slots)) = property(scene, parent, target)
                    && slots.get(name).and_then(Value::as_node) == Some(child)
                {
                    slots.shift_remove(name);
                    set_property(scene, parent, target, Value::Map(slots))?;
                }
            }
            Some(Attach::Property(name)) => {
                if property(scene, parent, name).and_then(|v| v.as_node()) == Some(child) {
                    set_property(scene, parent, name, Value::Null)?;
                }
            }
            Some(Attach::Fns { detach, .. }) => call_attach_fn(scene, detach, parent, child)?,
            None => {
                if scene.parent(child) == Some(parent) {
                    scene.remove_child(parent, child);
                }
            }
        }
        Ok(())
    }

    /// Removes `child` and everything that depends on it.
    ///
    /// `destroy` overrides the disposal policy: by default a node is
    /// disposed unless it is a primitive or opted out with `dispose: null`.
    /// Disposal is queued on the owning root and runs when the loop is idle.
    pub fn remove_child_with(
        &self,
        scene: &mut Scene,
        parent: NodeId,
        child: NodeId,
        destroy: Option<bool>,
    ) -> Result<()> {
        let inst = scene.get(child).ok_or(Error::StaleNode(child))?;
        let state = inst.state.as_ref();
        let primitive = state.is_some_and(LocalState::is_primitive);
        let container = state.is_some_and(LocalState::is_container);
        let opted_out = state.is_some_and(|s| s.flags.contains(StateFlags::NO_DISPOSE));
        let directive = state.and_then(|s| s.memoized_props.attach());
        let root = state.and_then(LocalState::store);
        let mut dependents = state.map(|s| s.objects.clone()).unwrap_or_default();

        if let Some(s) = scene.state_mut(child) {
            s.parent = None;
        }
        if let Some(p) = scene.state_mut(parent) {
            p.objects.retain(|o| *o != child);
        }
        if let Err(err) = self.unlink(scene, parent, child, directive.as_ref()) {
            log::warn!("detaching {child:?} from {parent:?} failed: {err}");
        }

        let should_destroy = destroy.unwrap_or(!opted_out && !primitive);
        if !primitive {
            // An opted-out node keeps its whole subtree alive.
            let nested = if should_destroy { None } else { Some(false) };
            dependents.extend_from_slice(scene.children(child));
            for dependent in dependents {
                if scene.contains(dependent) {
                    self.remove_child_with(scene, child, dependent, nested)?;
                }
            }
        }

        let object = if primitive {
            if let Some(s) = scene.state_mut(child) {
                s.sever();
            }
            None
        } else {
            scene.take(child).map(|inst| inst.object)
        };

        if should_destroy && !container {
            let task = match object {
                Some(object) if object.is_disposable() => Some(DisposalTask::Owned(object)),
                None if primitive && scene.object(child).is_some_and(|o| o.is_disposable()) => {
                    Some(DisposalTask::InScene(child))
                }
                _ => None,
            };
            if let Some(task) = task {
                match root.or_else(|| root_of(scene, parent)) {
                    Some(store) => {
                        store.with(|s| s.disposals.clone()).schedule(task);
                    }
                    None => dispose_now(scene, task),
                }
            }
        }

        invalidate_node(scene, parent);
        Ok(())
    }

    /// Replaces `node` with a fresh instance of `kind` built from `props`.
    ///
    /// Native children, attached dependents and listeners move to the new
    /// instance, which takes the old one's place under the same parent.
    /// Nothing changes if construction fails. A node without a parent is
    /// left alone.
    pub fn switch_instance(
        &self,
        scene: &mut Scene,
        node: NodeId,
        kind: &str,
        props: &Props,
        node_ref: Option<&NodeRef>,
    ) -> Result<NodeId> {
        let Some(state) = scene.state(node) else {
            return Ok(node);
        };
        let Some(parent) = state.parent else {
            return Ok(node);
        };
        let store = state.store().ok_or_else(|| Error::NoRoot(capitalize(kind)))?;
        let primitive = state.is_primitive();

        let fresh = self.create_instance(scene, kind, props, &HostContainer::Root(store))?;
        if fresh == node {
            return Ok(node);
        }
        let successor = successor(scene, parent, node);

        if !primitive {
            for child in scene.children(node).to_vec() {
                self.append_child(scene, fresh, child)?;
            }
        }
        let objects = scene
            .state_mut(node)
            .map(|s| std::mem::take(&mut s.objects))
            .unwrap_or_default();
        for dependent in objects {
            self.append_child(scene, fresh, dependent)?;
        }

        let handlers = scene.state(node).map(|s| s.handlers.clone()).unwrap_or_default();
        for (key, handler) in handlers {
            let name = event_name(&key);
            if let Some(old) = scene.object_mut(node) {
                old.remove_event_listener(&name, &handler);
            }
            let Some(inst) = scene.get_mut(fresh) else {
                continue;
            };
            let state = inst.state.get_or_insert_with(LocalState::default);
            if state.handlers.contains_key(&key) {
                continue;
            }
            inst.object.add_event_listener(&name, handler.clone());
            state.handlers.insert(key, handler);
        }

        self.remove_child(scene, parent, node)?;
        match successor {
            Some(before) if scene.contains(before) => self.insert_before(scene, parent, fresh, before)?,
            _ => self.append_child(scene, parent, fresh)?,
        }

        if let Some(r) = node_ref {
            r.set(Some(fresh));
        }
        log::debug!("reconstructed {} as {fresh:?}", capitalize(kind));
        Ok(fresh)
    }
}

impl HostConfig for Reconciler {
    fn create_instance(&self, scene: &mut Scene, kind: &str, props: &Props, root: &HostContainer) -> Result<NodeId> {
        let name = capitalize(kind);
        let store = root.store(scene).ok_or_else(|| Error::NoRoot(name.clone()))?;
        let props_without_args = props.without(&[keys::ARGS]);

        if kind == PRIMITIVE {
            let object = props
                .get(keys::OBJECT)
                .and_then(Value::as_node)
                .ok_or(Error::MissingObject)?;
            let inst = scene.get_mut(object).ok_or(Error::StaleNode(object))?;
            let mut state = LocalState::new(Some(store.downgrade()));
            state.flags |= StateFlags::PRIMITIVE;
            inst.state = Some(state);
            apply_initial_props(scene, &self.catalogue, object, &props_without_args)?;
            return Ok(object);
        }

        let node_type = self
            .catalogue
            .resolve(kind)
            .ok_or_else(|| Error::UnknownType(name.clone()))?;
        let args = args_of(props).ok_or_else(|| Error::InvalidArgs(name.clone()))?;
        let object = (node_type.constructor())(args).map_err(|reason| Error::Construct {
            type_name: name.clone(),
            reason,
        })?;

        let node = scene.insert(object);
        let mut state = LocalState::new(Some(store.downgrade()));
        if !args.is_empty() {
            state.memoized_props.insert(keys::ARGS, args.to_vec());
        }
        if let Some(inst) = scene.get_mut(node) {
            inst.state = Some(state);
        }
        if let Err(err) = apply_initial_props(scene, &self.catalogue, node, &props_without_args) {
            scene.take(node);
            return Err(err);
        }
        log::trace!("created {name} {node:?}");
        Ok(node)
    }

    fn append_child(&self, scene: &mut Scene, parent: NodeId, child: NodeId) -> Result<()> {
        self.link(scene, parent, child, None)
    }

    fn insert_before(&self, scene: &mut Scene, parent: NodeId, child: NodeId, before: NodeId) -> Result<()> {
        self.link(scene, parent, child, Some(before))
    }

    fn remove_child(&self, scene: &mut Scene, parent: NodeId, child: NodeId) -> Result<()> {
        self.remove_child_with(scene, parent, child, None)
    }

    fn append_child_to_container(&self, scene: &mut Scene, container: &HostContainer, child: NodeId) -> Result<()> {
        let target = container.node();
        let root = container.store(scene).or_else(|| root_of(scene, child));
        let state = scene.ensure_state(target)?;
        if state.store().is_none() {
            state.root = root.map(|s| s.downgrade());
        }
        self.append_child(scene, target, child)
    }

    fn insert_in_container_before(
        &self,
        scene: &mut Scene,
        container: &HostContainer,
        child: NodeId,
        before: NodeId,
    ) -> Result<()> {
        self.insert_before(scene, container.node(), child, before)
    }

    fn remove_child_from_container(&self, scene: &mut Scene, container: &HostContainer, child: NodeId) -> Result<()> {
        self.remove_child(scene, container.node(), child)
    }

    fn prepare_update(
        &self,
        scene: &mut Scene,
        node: NodeId,
        kind: &str,
        old_props: &Props,
        new_props: &Props,
    ) -> Result<UpdatePayload> {
        let state = scene.state(node);
        let replaced = new_props
            .get(keys::OBJECT)
            .and_then(Value::as_node)
            .is_some_and(|object| object != node);
        if state.is_some_and(LocalState::is_primitive) && replaced {
            return Ok(UpdatePayload::Reconstruct);
        }

        let new_args = args_of(new_props).ok_or_else(|| Error::InvalidArgs(capitalize(kind)))?;
        let old_args = args_of(old_props).unwrap_or_default();
        if new_args != old_args {
            return Ok(UpdatePayload::Reconstruct);
        }

        let diff = diff_props(
            state,
            &new_props.without(&[keys::ARGS]),
            Some(&old_props.without(&[keys::ARGS])),
            true,
        );
        if !diff.is_empty() {
            return Ok(UpdatePayload::Patch(diff));
        }

        // Created but never linked to the property it attaches to.
        if let Some(Attach::Property(name)) = state.and_then(|s| s.memoized_props.attach())
            && let Some(parent) = state.and_then(|s| s.parent)
            && property(scene, parent, &name).and_then(|v| v.as_node()) != Some(node)
        {
            self.append_child(scene, parent, node)?;
        }
        Ok(UpdatePayload::None)
    }

    fn commit_update(
        &self,
        scene: &mut Scene,
        node: NodeId,
        payload: UpdatePayload,
        kind: &str,
        new_props: &Props,
        node_ref: Option<&NodeRef>,
    ) -> Result<NodeId> {
        match payload {
            UpdatePayload::Reconstruct => self.switch_instance(scene, node, kind, new_props, node_ref),
            UpdatePayload::Patch(diff) => {
                apply_props(scene, &self.catalogue, node, diff)?;
                Ok(node)
            }
            UpdatePayload::None => Ok(node),
        }
    }

    fn hide_instance(&self, scene: &mut Scene, node: NodeId) {
        if !is_display(scene, node) {
            return;
        }
        if let Err(err) = set_property(scene, node, keys::VISIBLE, Value::Bool(false)) {
            log::warn!("{err}");
        }
        if let Some(s) = scene.state_mut(node) {
            s.flags.insert(StateFlags::HIDDEN);
        }
        invalidate_node(scene, node);
    }

    fn unhide_instance(&self, scene: &mut Scene, node: NodeId, props: &Props) {
        let visible = props.get(keys::VISIBLE);
        let unset = visible.is_none_or(Value::is_null);
        if !((is_display(scene, node) && unset) || visible == Some(&Value::Bool(true))) {
            return;
        }
        if let Err(err) = set_property(scene, node, keys::VISIBLE, Value::Bool(true)) {
            log::warn!("{err}");
        }
        if let Some(s) = scene.state_mut(node) {
            s.flags.remove(StateFlags::HIDDEN);
        }
        invalidate_node(scene, node);
    }

    fn schedule_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        self.frame_loop.schedule_timeout(delay, callback)
    }

    fn cancel_timeout(&self, id: TimerId) {
        self.frame_loop.cancel_timeout(id);
    }

    fn now(&self) -> f64 {
        self.frame_loop.now_ms()
    }
}

/// Constructor arguments; `None` when `args` is present but not an array.
fn args_of(props: &Props) -> Option<&[Value]> {
    match props.args() {
        None => Some(&[]),
        Some(Value::Array(args)) => Some(args),
        Some(_) => None,
    }
}

fn root_of(scene: &Scene, node: NodeId) -> Option<Store> {
    scene.state(node)?.store()
}

fn invalidate_node(scene: &Scene, node: NodeId) {
    if let Some(store) = root_of(scene, node) {
        invalidate_instance(&store);
    }
}

fn is_display(scene: &Scene, node: NodeId) -> bool {
    scene.object(node).is_some_and(|o| o.is_display_object())
}

fn property(scene: &Scene, node: NodeId, key: &str) -> Option<Value> {
    scene.object(node)?.get(key)
}

fn set_property(scene: &mut Scene, node: NodeId, key: &str, value: Value) -> Result<()> {
    let object = scene.object_mut(node).ok_or(Error::StaleNode(node))?;
    object.set(key, value).map_err(|source| Error::InvalidProperty {
        type_name: object.type_name().to_string(),
        key: key.to_string(),
        source,
    })
}

fn attach_to_array(scene: &mut Scene, parent: NodeId, child: NodeId, name: &str, before: Option<NodeId>) -> Result<()> {
    let mut items = match property(scene, parent, name) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    items.retain(|v| v.as_node() != Some(child));
    let at = before
        .and_then(|b| items.iter().position(|v| v.as_node() == Some(b)))
        .unwrap_or(items.len());
    items.insert(at, Value::Node(child));
    set_property(scene, parent, name, Value::Array(items))
}

fn call_attach_fn(scene: &mut Scene, f: &AttachFnRef, parent: NodeId, child: NodeId) -> Result<()> {
    match f {
        AttachFnRef::Method(method) => {
            let object = scene.object_mut(parent).ok_or(Error::StaleNode(parent))?;
            match object.invoke(method, &[Value::Node(child)]) {
                Some(Ok(_)) => Ok(()),
                Some(Err(source)) => Err(Error::InvalidProperty {
                    type_name: object.type_name().to_string(),
                    key: method.clone(),
                    source,
                }),
                None => {
                    log::debug!("{} has no method `{method}`", object.type_name());
                    Ok(())
                }
            }
        }
        AttachFnRef::Callback(callback) => {
            let (child, parent) = scene.pair_mut(child, parent).ok_or(Error::StaleNode(child))?;
            callback.call(child, parent);
            Ok(())
        }
    }
}

/// The node that follows `node` in its parent's ordered relation.
fn successor(scene: &Scene, parent: NodeId, node: NodeId) -> Option<NodeId> {
    if scene.parent(node) == Some(parent) {
        let siblings = scene.children(parent);
        let i = siblings.iter().position(|c| *c == node)?;
        return siblings.get(i + 1).copied();
    }
    if let Some(Attach::Array(name)) = scene.state(node).and_then(|s| s.memoized_props.attach()) {
        let items = property(scene, parent, &name)?;
        let items = items.as_array()?;
        let i = items.iter().position(|v| v.as_node() == Some(node))?;
        return items.get(i + 1).and_then(Value::as_node);
    }
    None
}

fn dispose_now(scene: &mut Scene, task: DisposalTask) {
    match task {
        DisposalTask::Owned(mut object) => {
            dispose_guarded(object.as_mut());
        }
        DisposalTask::InScene(id) => {
            if let Some(object) = scene.object_mut(id) {
                dispose_guarded(object);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Group;
    use crate::registry::Registry;

    fn reconciler() -> (Reconciler, Store) {
        let registry = Registry::with_namespace(
            "",
            [(
                "Group".to_string(),
                NodeType::new(|_| Ok(Box::new(Group::new()) as Box<dyn crate::SceneObject>)),
            )],
        );
        let frame_loop = FrameLoop::new();
        let store = Store::new(&frame_loop);
        (Reconciler::new(Catalogue::new(registry), frame_loop), store)
    }

    fn group(r: &Reconciler, scene: &mut Scene, store: &Store, props: Props) -> NodeId {
        r.create_instance(scene, "group", &props, &HostContainer::Root(store.clone()))
            .unwrap()
    }

    #[test]
    fn unknown_types_and_bad_args_are_rejected() {
        let (r, store) = reconciler();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        let root = HostContainer::Root(store.clone());

        let err = r.create_instance(&mut scene, "mesh", &Props::new(), &root).unwrap_err();
        assert!(matches!(err, Error::UnknownType(name) if name == "Mesh"));

        let props = Props::new().with(keys::ARGS, 1.0);
        let err = r.create_instance(&mut scene, "group", &props, &root).unwrap_err();
        assert!(matches!(err, Error::InvalidArgs(_)));

        let err = r.create_instance(&mut scene, PRIMITIVE, &Props::new(), &root).unwrap_err();
        assert!(matches!(err, Error::MissingObject));

        let orphan = scene.insert(Box::new(Group::new()));
        let err = r
            .create_instance(&mut scene, "group", &Props::new(), &HostContainer::Node(orphan))
            .unwrap_err();
        assert!(matches!(err, Error::NoRoot(_)));
    }

    #[test]
    fn text_is_unsupported() {
        let (r, store) = reconciler();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        assert!(matches!(
            r.create_text_instance(&mut scene, "hello"),
            Err(Error::UnsupportedNode(_))
        ));
        assert!(r.hide_text_instance().is_err());
    }

    #[test]
    fn insert_before_uses_sibling_index() {
        let (r, store) = reconciler();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        let parent = group(&r, &mut scene, &store, Props::new());
        let a = group(&r, &mut scene, &store, Props::new());
        let b = group(&r, &mut scene, &store, Props::new());
        let c = group(&r, &mut scene, &store, Props::new());
        r.append_child(&mut scene, parent, a).unwrap();
        r.append_child(&mut scene, parent, b).unwrap();
        r.insert_before(&mut scene, parent, c, a).unwrap();
        assert_eq!(scene.children(parent), [c, a, b]);

        // Moving an existing child re-reads the index after detaching.
        r.insert_before(&mut scene, parent, b, a).unwrap();
        assert_eq!(scene.children(parent), [c, b, a]);
        assert_eq!(scene.state(b).unwrap().parent, Some(parent));
    }

    #[test]
    fn attach_property_is_cleared_only_while_held() {
        let (r, store) = reconciler();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        let parent = group(&r, &mut scene, &store, Props::new());
        let first = group(&r, &mut scene, &store, Props::new().with(keys::ATTACH, "mask"));
        let second = group(&r, &mut scene, &store, Props::new().with(keys::ATTACH, "mask"));

        r.append_child(&mut scene, parent, first).unwrap();
        r.append_child(&mut scene, parent, second).unwrap();
        assert_eq!(property(&scene, parent, "mask"), Some(Value::Node(second)));
        assert!(scene.children(parent).is_empty());

        r.remove_child(&mut scene, parent, first).unwrap();
        assert_eq!(property(&scene, parent, "mask"), Some(Value::Node(second)));
        r.remove_child(&mut scene, parent, second).unwrap();
        assert_eq!(property(&scene, parent, "mask"), None);
        assert!(scene.state(parent).unwrap().objects.is_empty());
    }

    #[test]
    fn attach_object_fills_a_named_slot() {
        let (r, store) = reconciler();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        let parent = group(&r, &mut scene, &store, Props::new());
        let pair = vec![Value::from("uniforms"), Value::from("tint")];
        let child = group(&r, &mut scene, &store, Props::new().with(keys::ATTACH_OBJECT, pair));
        r.append_child(&mut scene, parent, child).unwrap();
        let Some(Value::Map(slots)) = property(&scene, parent, "uniforms") else {
            panic!("no slot map");
        };
        assert_eq!(slots.get("tint"), Some(&Value::Node(child)));

        r.remove_child(&mut scene, parent, child).unwrap();
        let Some(Value::Map(slots)) = property(&scene, parent, "uniforms") else {
            panic!("no slot map");
        };
        assert!(slots.is_empty());
    }

    #[test]
    fn hide_and_unhide_toggle_visibility() {
        let (r, store) = reconciler();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        let node = group(&r, &mut scene, &store, Props::new());
        r.hide_instance(&mut scene, node);
        assert_eq!(property(&scene, node, keys::VISIBLE), Some(Value::Bool(false)));
        assert!(scene.state(node).unwrap().flags.contains(StateFlags::HIDDEN));

        // An explicit `visible: false` keeps it hidden.
        r.unhide_instance(&mut scene, node, &Props::new().with(keys::VISIBLE, false));
        assert_eq!(property(&scene, node, keys::VISIBLE), Some(Value::Bool(false)));

        r.unhide_instance(&mut scene, node, &Props::new());
        assert_eq!(property(&scene, node, keys::VISIBLE), Some(Value::Bool(true)));
    }

    #[test]
    fn unchanged_update_reattaches_a_dropped_property() {
        let (r, store) = reconciler();
        let scene = store.scene();
        let mut scene = scene.borrow_mut();
        let parent = group(&r, &mut scene, &store, Props::new());
        let props = Props::new().with(keys::ATTACH, "mask");
        let child = group(&r, &mut scene, &store, props.clone());
        r.append_child(&mut scene, parent, child).unwrap();
        scene.object_mut(parent).unwrap().set("mask", Value::Null).unwrap();

        let payload = r.prepare_update(&mut scene, child, "group", &props, &props).unwrap();
        assert_eq!(payload, UpdatePayload::None);
        assert_eq!(property(&scene, parent, "mask"), Some(Value::Node(child)));
    }
}
