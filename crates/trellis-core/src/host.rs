//! The host adapter contract and a small synchronous tree walker.
//!
//! [`HostConfig`] is the fixed set of mutations a declarative runtime
//! performs against the scene. [`HostTree`] is the minimal runtime this
//! crate ships: it keeps the last rendered [`Element`] tree, matches new
//! children by key (or position) and type, and issues the mutations.
//! There is no work loop, no scheduling and no suspension.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use web_time::Duration;

use crate::diff::DiffSet;
use crate::error::{Error, Result};
use crate::frameloop::TimerId;
use crate::portal::{InjectState, Portal};
use crate::props::{AttachFnRef, Props, keys};
use crate::scene::{NodeId, Scene};
use crate::store::Store;
use crate::value::Value;

/// What [`HostConfig::prepare_update`] decided.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum UpdatePayload {
    /// Nothing changed.
    #[default]
    None,
    /// Apply this diff in place.
    Patch(DiffSet),
    /// Build a new object and move everything over.
    Reconstruct,
}

/// Where top-level children are mounted.
#[derive(Clone, Debug)]
pub enum HostContainer {
    /// The stage of a root (or portal) store.
    Root(Store),
    /// An existing node, such as a portal target.
    Node(NodeId),
}

impl HostContainer {
    /// The node children are appended to.
    pub fn node(&self) -> NodeId {
        match self {
            HostContainer::Root(store) => store.stage(),
            HostContainer::Node(node) => *node,
        }
    }

    /// The store instances created under this container belong to.
    pub fn store(&self, scene: &Scene) -> Option<Store> {
        match self {
            HostContainer::Root(store) => Some(store.clone()),
            HostContainer::Node(node) => scene.state(*node)?.store(),
        }
    }
}

/// Mutations a declarative runtime drives.
pub trait HostConfig {
    fn create_instance(&self, scene: &mut Scene, kind: &str, props: &Props, root: &HostContainer) -> Result<NodeId>;

    /// Text is not representable in the scene.
    fn create_text_instance(&self, _scene: &mut Scene, text: &str) -> Result<NodeId> {
        Err(Error::UnsupportedNode(format!("text \"{text}\"")))
    }

    fn append_initial_child(&self, scene: &mut Scene, parent: NodeId, child: NodeId) -> Result<()> {
        self.append_child(scene, parent, child)
    }

    fn append_child(&self, scene: &mut Scene, parent: NodeId, child: NodeId) -> Result<()>;

    fn insert_before(&self, scene: &mut Scene, parent: NodeId, child: NodeId, before: NodeId) -> Result<()>;

    fn remove_child(&self, scene: &mut Scene, parent: NodeId, child: NodeId) -> Result<()>;

    fn append_child_to_container(&self, scene: &mut Scene, container: &HostContainer, child: NodeId) -> Result<()>;

    fn insert_in_container_before(
        &self,
        scene: &mut Scene,
        container: &HostContainer,
        child: NodeId,
        before: NodeId,
    ) -> Result<()>;

    fn remove_child_from_container(&self, scene: &mut Scene, container: &HostContainer, child: NodeId) -> Result<()>;

    fn prepare_update(
        &self,
        scene: &mut Scene,
        node: NodeId,
        kind: &str,
        old_props: &Props,
        new_props: &Props,
    ) -> Result<UpdatePayload>;

    /// Returns the node that now stands for the element, which differs from
    /// `node` after a reconstruction.
    fn commit_update(
        &self,
        scene: &mut Scene,
        node: NodeId,
        payload: UpdatePayload,
        kind: &str,
        new_props: &Props,
        node_ref: Option<&NodeRef>,
    ) -> Result<NodeId>;

    fn hide_instance(&self, scene: &mut Scene, node: NodeId);

    fn unhide_instance(&self, scene: &mut Scene, node: NodeId, props: &Props);

    fn hide_text_instance(&self) -> Result<()> {
        Err(Error::UnsupportedNode("text".into()))
    }

    fn unhide_text_instance(&self) -> Result<()> {
        Err(Error::UnsupportedNode("text".into()))
    }

    fn get_public_instance(&self, node: NodeId) -> NodeId {
        node
    }

    fn schedule_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;

    fn cancel_timeout(&self, id: TimerId);

    /// Milliseconds on the host's clock.
    fn now(&self) -> f64;
}

/// Holds the node an element currently renders to. Redirected when the
/// node is reconstructed and cleared when it is removed.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<Cell<Option<NodeId>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NodeId> {
        self.0.get()
    }

    pub fn set(&self, node: Option<NodeId>) {
        self.0.set(node);
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.get()).finish()
    }
}

#[derive(Clone, Debug)]
pub enum ElementKind {
    /// A catalogue type (`"sprite"`) or `"primitive"`.
    Host(String),
    Text(String),
    Portal { container: NodeId, inject: InjectState },
}

/// Declarative description of one node.
#[derive(Clone, Debug)]
pub struct Element {
    kind: ElementKind,
    key: Option<String>,
    props: Props,
    children: Vec<Element>,
    node_ref: Option<NodeRef>,
}

/// A node of a catalogue type.
pub fn element(kind: impl Into<String>) -> Element {
    Element::new(ElementKind::Host(kind.into()))
}

/// Mounts an object already adopted into the root's scene.
pub fn primitive(object: NodeId) -> Element {
    element("primitive").prop(keys::OBJECT, object)
}

pub fn text(content: impl Into<String>) -> Element {
    Element::new(ElementKind::Text(content.into()))
}

/// Renders `children` under `container` with a store of its own.
pub fn create_portal(children: impl IntoIterator<Item = Element>, container: NodeId, inject: InjectState) -> Element {
    Element::new(ElementKind::Portal { container, inject }).children(children)
}

impl Element {
    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
            children: Vec::new(),
            node_ref: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key, value);
        self
    }

    pub fn props(mut self, props: Props) -> Self {
        for (k, v) in props.iter() {
            self.props.insert(k, v.clone());
        }
        self
    }

    pub fn args(self, args: impl IntoIterator<Item = Value>) -> Self {
        self.prop(keys::ARGS, Value::Array(args.into_iter().collect()))
    }

    pub fn attach(self, name: impl Into<String>) -> Self {
        self.prop(keys::ATTACH, name.into())
    }

    pub fn attach_array(self, name: impl Into<String>) -> Self {
        self.prop(keys::ATTACH_ARRAY, name.into())
    }

    pub fn attach_object(self, target: impl Into<String>, name: impl Into<String>) -> Self {
        let pair = vec![Value::Str(target.into()), Value::Str(name.into())];
        self.prop(keys::ATTACH_OBJECT, pair)
    }

    pub fn attach_fns(self, attach: AttachFnRef, detach: AttachFnRef) -> Self {
        fn value(f: AttachFnRef) -> Value {
            match f {
                AttachFnRef::Method(name) => Value::Str(name),
                AttachFnRef::Callback(cb) => Value::AttachFn(cb),
            }
        }
        self.prop(keys::ATTACH_FNS, vec![value(attach), value(detach)])
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn get_props(&self) -> &Props {
        &self.props
    }

    pub fn get_children(&self) -> &[Element] {
        &self.children
    }
}

enum FiberKind {
    Host {
        type_name: String,
        props: Props,
        node: NodeId,
        node_ref: Option<NodeRef>,
    },
    Portal(Portal),
}

/// One rendered element.
struct Fiber {
    key: Option<String>,
    kind: FiberKind,
    children: Vec<Fiber>,
}

impl Fiber {
    fn node(&self) -> Option<NodeId> {
        match &self.kind {
            FiberKind::Host { node, .. } => Some(*node),
            FiberKind::Portal(_) => None,
        }
    }

    fn matches(&self, element: &Element) -> bool {
        if self.key != element.key {
            return false;
        }
        match (&self.kind, &element.kind) {
            (FiberKind::Host { type_name, .. }, ElementKind::Host(kind)) => type_name == kind,
            (FiberKind::Portal(portal), ElementKind::Portal { container, .. }) => portal.container() == *container,
            _ => false,
        }
    }
}

#[derive(Clone)]
enum Parent {
    Container(HostContainer),
    Node(NodeId),
}

impl Parent {
    fn append(&self, host: &impl HostConfig, scene: &mut Scene, child: NodeId) -> Result<()> {
        match self {
            Parent::Container(c) => host.append_child_to_container(scene, c, child),
            Parent::Node(p) => host.append_child(scene, *p, child),
        }
    }

    fn insert(&self, host: &impl HostConfig, scene: &mut Scene, child: NodeId, before: NodeId) -> Result<()> {
        match self {
            Parent::Container(c) => host.insert_in_container_before(scene, c, child, before),
            Parent::Node(p) => host.insert_before(scene, *p, child, before),
        }
    }

    fn remove(&self, host: &impl HostConfig, scene: &mut Scene, child: NodeId) -> Result<()> {
        match self {
            Parent::Container(c) => host.remove_child_from_container(scene, c, child),
            Parent::Node(p) => host.remove_child(scene, *p, child),
        }
    }
}

/// The last rendered tree of one root.
#[derive(Default)]
pub struct HostTree {
    fibers: Vec<Fiber>,
}

impl fmt::Debug for HostTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTree")
            .field("top_level", &self.fibers.len())
            .finish()
    }
}

impl HostTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Brings the scene under `store`'s stage in line with `elements`.
    ///
    /// Errors abort the commit where they occur; the root should be
    /// unmounted afterwards.
    pub fn render(
        &mut self,
        host: &impl HostConfig,
        scene: &mut Scene,
        store: &Store,
        elements: Vec<Element>,
    ) -> Result<()> {
        let container = HostContainer::Root(store.clone());
        let old = std::mem::take(&mut self.fibers);
        self.fibers = reconcile_children(host, scene, &Parent::Container(container.clone()), &container, old, elements)?;
        Ok(())
    }

    /// Removes everything that was rendered.
    pub fn clear(&mut self, host: &impl HostConfig, scene: &mut Scene, store: &Store) -> Result<()> {
        let parent = Parent::Container(HostContainer::Root(store.clone()));
        for fiber in std::mem::take(&mut self.fibers) {
            delete_fiber(host, scene, &parent, fiber)?;
        }
        Ok(())
    }
}

fn reconcile_children(
    host: &impl HostConfig,
    scene: &mut Scene,
    parent: &Parent,
    root: &HostContainer,
    old: Vec<Fiber>,
    elements: Vec<Element>,
) -> Result<Vec<Fiber>> {
    let mut keyed: IndexMap<String, usize> = IndexMap::new();
    let mut unkeyed: Vec<usize> = Vec::new();
    for (i, fiber) in old.iter().enumerate() {
        match &fiber.key {
            Some(key) => {
                keyed.insert(key.clone(), i);
            }
            None => unkeyed.push(i),
        }
    }

    let mut unkeyed = unkeyed.into_iter();
    let matched: Vec<Option<usize>> = elements
        .iter()
        .map(|element| {
            let candidate = match &element.key {
                Some(key) => keyed.get(key).copied(),
                None => unkeyed.next(),
            };
            candidate.filter(|&i| old[i].matches(element))
        })
        .collect();

    let mut old: Vec<Option<Fiber>> = old.into_iter().map(Some).collect();
    for (i, slot) in old.iter_mut().enumerate() {
        if !matched.contains(&Some(i))
            && let Some(fiber) = slot.take()
        {
            delete_fiber(host, scene, parent, fiber)?;
        }
    }

    let mut next: Vec<(Fiber, Option<usize>)> = Vec::with_capacity(elements.len());
    for (element, old_index) in elements.into_iter().zip(matched) {
        let fiber = match old_index.and_then(|i| old[i].take()) {
            Some(fiber) => update_fiber(host, scene, root, fiber, element)?,
            None => create_fiber(host, scene, root, element)?,
        };
        next.push((fiber, old_index));
    }

    // Walk right to left; fibers whose old order is preserved stay put and
    // everything else is placed before its successor.
    let mut successor: Option<NodeId> = None;
    let mut lowest_stable = usize::MAX;
    for (fiber, old_index) in next.iter().rev() {
        let Some(node) = fiber.node() else {
            continue;
        };
        match old_index {
            Some(i) if *i < lowest_stable => lowest_stable = *i,
            _ => match successor {
                Some(before) => parent.insert(host, scene, node, before)?,
                None => parent.append(host, scene, node)?,
            },
        }
        successor = Some(node);
    }

    Ok(next.into_iter().map(|(fiber, _)| fiber).collect())
}

fn create_fiber(host: &impl HostConfig, scene: &mut Scene, root: &HostContainer, element: Element) -> Result<Fiber> {
    let Element {
        kind,
        key,
        props,
        children,
        node_ref,
    } = element;
    match kind {
        ElementKind::Host(type_name) => {
            let node = host.create_instance(scene, &type_name, &props, root)?;
            let mut fibers = Vec::with_capacity(children.len());
            for child in children {
                let fiber = create_fiber(host, scene, root, child)?;
                if let Some(child) = fiber.node() {
                    host.append_initial_child(scene, node, child)?;
                }
                fibers.push(fiber);
            }
            if let Some(r) = &node_ref {
                r.set(Some(host.get_public_instance(node)));
            }
            Ok(Fiber {
                key,
                kind: FiberKind::Host {
                    type_name,
                    props,
                    node,
                    node_ref,
                },
                children: fibers,
            })
        }
        ElementKind::Text(content) => {
            let node = host.create_text_instance(scene, &content)?;
            Ok(Fiber {
                key,
                kind: FiberKind::Host {
                    type_name: "#text".into(),
                    props,
                    node,
                    node_ref,
                },
                children: Vec::new(),
            })
        }
        ElementKind::Portal { container, inject } => {
            let store = root
                .store(scene)
                .ok_or_else(|| Error::NoRoot(format!("portal into {container:?}")))?;
            let portal = Portal::new(scene, &store, container, inject)?;
            let target = Parent::Container(HostContainer::Node(container));
            let portal_root = HostContainer::Root(portal.store().clone());
            let mut fibers = Vec::with_capacity(children.len());
            for child in children {
                let fiber = create_fiber(host, scene, &portal_root, child)?;
                if let Some(child) = fiber.node() {
                    target.append(host, scene, child)?;
                }
                fibers.push(fiber);
            }
            Ok(Fiber {
                key,
                kind: FiberKind::Portal(portal),
                children: fibers,
            })
        }
    }
}

fn update_fiber(
    host: &impl HostConfig,
    scene: &mut Scene,
    root: &HostContainer,
    fiber: Fiber,
    element: Element,
) -> Result<Fiber> {
    let Fiber { key, kind, children } = fiber;
    match (kind, element.kind) {
        (
            FiberKind::Host {
                type_name,
                props: old_props,
                node,
                node_ref: old_ref,
            },
            ElementKind::Host(_),
        ) => {
            let payload = host.prepare_update(scene, node, &type_name, &old_props, &element.props)?;
            let node = host.commit_update(
                scene,
                node,
                payload,
                &type_name,
                &element.props,
                element.node_ref.as_ref(),
            )?;
            if let Some(old) = old_ref
                && element.node_ref.as_ref() != Some(&old)
            {
                old.set(None);
            }
            if let Some(r) = &element.node_ref {
                r.set(Some(host.get_public_instance(node)));
            }
            let children = reconcile_children(host, scene, &Parent::Node(node), root, children, element.children)?;
            Ok(Fiber {
                key,
                kind: FiberKind::Host {
                    type_name,
                    props: element.props,
                    node,
                    node_ref: element.node_ref,
                },
                children,
            })
        }
        (FiberKind::Portal(portal), ElementKind::Portal { inject, .. }) => {
            portal.set_inject(inject);
            let target = Parent::Container(HostContainer::Node(portal.container()));
            let portal_root = HostContainer::Root(portal.store().clone());
            let children = reconcile_children(host, scene, &target, &portal_root, children, element.children)?;
            Ok(Fiber {
                key,
                kind: FiberKind::Portal(portal),
                children,
            })
        }
        _ => Err(Error::UnsupportedNode("an element that changed kind in place".into())),
    }
}

fn delete_fiber(host: &impl HostConfig, scene: &mut Scene, parent: &Parent, fiber: Fiber) -> Result<()> {
    match fiber.kind {
        FiberKind::Host { node, node_ref, .. } => {
            release_detached(host, scene, fiber.children)?;
            parent.remove(host, scene, node)?;
            if let Some(r) = node_ref {
                r.set(None);
            }
        }
        FiberKind::Portal(portal) => {
            let target = Parent::Container(HostContainer::Node(portal.container()));
            for child in fiber.children {
                delete_fiber(host, scene, &target, child)?;
            }
            log::debug!("portal on {:?} closed", portal.container());
        }
    }
    Ok(())
}

/// Removal of a node takes its scene subtree along, but portals below it
/// live elsewhere and refs below it would dangle.
fn release_detached(host: &impl HostConfig, scene: &mut Scene, fibers: Vec<Fiber>) -> Result<()> {
    for fiber in fibers {
        match fiber.kind {
            FiberKind::Host { node_ref, .. } => {
                if let Some(r) = node_ref {
                    r.set(None);
                }
                release_detached(host, scene, fiber.children)?;
            }
            FiberKind::Portal(portal) => {
                let target = Parent::Container(HostContainer::Node(portal.container()));
                for child in fiber.children {
                    delete_fiber(host, scene, &target, child)?;
                }
            }
        }
    }
    Ok(())
}
