//! Per-root instance arena.
//!
//! Instances live in a [`SlotMap`] and refer to each other by [`NodeId`].
//! The native parent/child relation of display objects is kept here rather
//! than inside the objects, so the engine never owns references back into
//! the tree.

use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::object::SceneObject;
use crate::state::LocalState;

slotmap::new_key_type! {
    /// Stable handle to an instance in a [`Scene`].
    pub struct NodeId;
}

#[derive(Debug)]
pub struct Instance {
    pub object: Box<dyn SceneObject>,
    pub state: Option<LocalState>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Instance {
    pub fn new(object: Box<dyn SceneObject>) -> Self {
        Self {
            object,
            state: None,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    nodes: SlotMap<NodeId, Instance>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: Box<dyn SceneObject>) -> NodeId {
        self.nodes.insert(Instance::new(object))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Instance> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Instance> {
        self.nodes.get_mut(id)
    }

    pub fn object(&self, id: NodeId) -> Option<&dyn SceneObject> {
        self.nodes.get(id).map(|i| i.object.as_ref())
    }

    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut (dyn SceneObject + 'static)> {
        self.nodes.get_mut(id).map(|i| i.object.as_mut())
    }

    pub fn downcast_ref<T: SceneObject>(&self, id: NodeId) -> Option<&T> {
        self.object(id)?.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: SceneObject>(&mut self, id: NodeId) -> Option<&mut T> {
        self.object_mut(id)?.as_any_mut().downcast_mut()
    }

    pub fn state(&self, id: NodeId) -> Option<&LocalState> {
        self.nodes.get(id)?.state.as_ref()
    }

    pub fn state_mut(&mut self, id: NodeId) -> Option<&mut LocalState> {
        self.nodes.get_mut(id)?.state.as_mut()
    }

    /// Returns the node's state, creating an empty one if it has none.
    pub fn ensure_state(&mut self, id: NodeId) -> Result<&mut LocalState> {
        let inst = self.nodes.get_mut(id).ok_or(Error::StaleNode(id))?;
        Ok(inst.state.get_or_insert_with(LocalState::default))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[], |i| &i.children)
    }

    /// Native parent.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.parent
    }

    pub fn child_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|c| *c == child)
    }

    /// Appends `child` to `parent`'s native children, detaching it from any
    /// previous parent first.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let len = self.children(parent).len();
        self.add_child_at(parent, child, len)
    }

    pub fn add_child_at(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<()> {
        if parent == child {
            return Err(Error::UnsupportedNode("a node as its own child".into()));
        }
        if !self.nodes.contains_key(child) {
            return Err(Error::StaleNode(child));
        }
        if !self.nodes.contains_key(parent) {
            return Err(Error::StaleNode(parent));
        }
        if let Some(old) = self.nodes[child].parent {
            self.remove_child(old, child);
        }
        let children = &mut self.nodes[parent].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child].parent = Some(parent);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(p) = self.nodes.get_mut(parent) else {
            return false;
        };
        let before = p.children.len();
        p.children.retain(|c| *c != child);
        let removed = p.children.len() != before;
        if removed && let Some(c) = self.nodes.get_mut(child) {
            c.parent = None;
        }
        removed
    }

    /// Removes an instance from the arena, unlinking it from its native
    /// parent and orphaning its native children.
    pub fn take(&mut self, id: NodeId) -> Option<Instance> {
        let parent = self.nodes.get(id)?.parent;
        if let Some(parent) = parent {
            self.remove_child(parent, id);
        }
        let mut inst = self.nodes.remove(id)?;
        for child in inst.children.drain(..) {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent = None;
            }
        }
        Some(inst)
    }

    /// Borrows two distinct objects mutably.
    pub fn pair_mut(
        &mut self,
        a: NodeId,
        b: NodeId,
    ) -> Option<(&mut (dyn SceneObject + 'static), &mut (dyn SceneObject + 'static))> {
        let [x, y] = self.nodes.get_disjoint_mut([a, b])?;
        Some((x.object.as_mut(), y.object.as_mut()))
    }

    /// `root` and its native descendants, depth first.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !self.nodes.contains_key(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Instance)> {
        self.nodes.iter()
    }
}
