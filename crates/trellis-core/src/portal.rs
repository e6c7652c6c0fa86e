//! Portals mount a subtree under an arbitrary node of an existing root.
//!
//! Each portal gets its own [`Store`] whose stage is the portal container.
//! Sizing, viewport, loop bookkeeping and performance counters always come
//! from the enclosing store; everything else follows the enclosing store
//! until the portal diverges from it, and [`InjectState`] wins over both.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::effects::Dispose;
use crate::error::{Error, Result};
use crate::render_api::SharedBackend;
use crate::scene::{NodeId, Scene};
use crate::store::{Frameloop, RootState, Store, WeakStore};

/// Fields a portal overrides on top of its enclosing store.
#[derive(Clone, Default)]
pub struct InjectState {
    pub frameloop: Option<Frameloop>,
    pub gl: Option<SharedBackend>,
}

impl fmt::Debug for InjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectState")
            .field("frameloop", &self.frameloop)
            .field("gl", &self.gl.is_some())
            .finish()
    }
}

pub struct Portal {
    store: Store,
    container: NodeId,
    parent: WeakStore,
    inject: Rc<RefCell<InjectState>>,
    subscription: Dispose,
}

impl fmt::Debug for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Portal")
            .field("container", &self.container)
            .field("inject", &*self.inject.borrow())
            .finish_non_exhaustive()
    }
}

impl Portal {
    /// Creates the portal store for `container`, which must live in
    /// `parent`'s scene.
    pub fn new(scene: &mut Scene, parent: &Store, container: NodeId, inject: InjectState) -> Result<Self> {
        if !scene.contains(container) {
            return Err(Error::NoRoot(format!("portal container {container:?}")));
        }
        // Linked to a root once the first child is appended.
        scene.ensure_state(container)?;

        let previous = parent.downgrade();
        let inject = Rc::new(RefCell::new(inject));
        let state = parent.with(|p| inject_state(p, None, &inject.borrow(), &previous, container));
        let store = Store::from_state(state);

        let subscription = {
            let portal = store.downgrade();
            let previous = previous.clone();
            let inject = inject.clone();
            parent.subscribe_state(move |state| {
                let Some(portal) = portal.upgrade() else {
                    return;
                };
                portal.patch(|current| {
                    *current = inject_state(state, Some(current), &inject.borrow(), &previous, container);
                });
            })
        };
        log::debug!("portal opened on {container:?}");

        Ok(Self {
            store,
            container,
            parent: previous,
            inject,
            subscription,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn parent(&self) -> Option<Store> {
        self.parent.upgrade()
    }

    /// Replaces the overrides and re-injects from the enclosing store.
    pub fn set_inject(&self, inject: InjectState) {
        *self.inject.borrow_mut() = inject;
        let Some(parent) = self.parent.upgrade() else {
            return;
        };
        let snapshot = parent.get();
        self.store.patch(|current| {
            *current = inject_state(
                &snapshot,
                Some(current),
                &self.inject.borrow(),
                &self.parent,
                self.container,
            );
        });
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        self.subscription.run();
    }
}

fn inject_state(
    parent: &RootState,
    current: Option<&RootState>,
    inject: &InjectState,
    previous: &WeakStore,
    container: NodeId,
) -> RootState {
    let mut next = parent.clone();
    if let Some(current) = current {
        if !same_backend(parent.gl.as_ref(), current.gl.as_ref()) {
            next.gl = current.gl.clone();
        }
        if parent.frameloop != current.frameloop {
            next.frameloop = current.frameloop;
        }
        if parent.clock != current.clock {
            next.clock = current.clock;
        }
        if !Rc::ptr_eq(&parent.scene, &current.scene) {
            next.scene = current.scene.clone();
        }
    }
    next.previous_root = Some(previous.clone());
    if let Some(frameloop) = inject.frameloop {
        next.frameloop = frameloop;
    }
    if let Some(gl) = &inject.gl {
        next.gl = Some(gl.clone());
    }
    next.stage = container;
    next
}

fn same_backend(a: Option<&SharedBackend>, b: Option<&SharedBackend>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frameloop::FrameLoop;
    use crate::geometry::Size;
    use crate::object::Group;

    fn open(parent: &Store, inject: InjectState) -> (NodeId, Portal) {
        let scene = parent.scene();
        let mut scene = scene.borrow_mut();
        let container = scene.insert(Box::new(Group::new()));
        let portal = Portal::new(&mut scene, parent, container, inject).unwrap();
        (container, portal)
    }

    #[test]
    fn mirrors_size_and_keeps_overrides() {
        let frame_loop = FrameLoop::new();
        let parent = Store::new(&frame_loop);
        let (container, portal) = open(
            &parent,
            InjectState {
                frameloop: Some(Frameloop::Demand),
                ..Default::default()
            },
        );

        assert_eq!(portal.store().stage(), container);
        let previous = portal
            .store()
            .with(|s| s.previous_root.as_ref().and_then(WeakStore::upgrade))
            .unwrap();
        assert!(previous.ptr_eq(&parent));

        parent.set_size(640.0, 480.0);
        let state = portal.store().get();
        assert_eq!(state.size, Size::new(640.0, 480.0));
        assert_eq!(state.viewport.aspect, 640.0 / 480.0);
        assert_eq!(state.frameloop, Frameloop::Demand);
        assert!(Rc::ptr_eq(&state.internal, &parent.internal()));
        assert!(Rc::ptr_eq(&state.scene, &parent.scene()));
    }

    #[test]
    fn set_inject_reapplies_overrides() {
        let frame_loop = FrameLoop::new();
        let parent = Store::new(&frame_loop);
        let (_, portal) = open(&parent, InjectState::default());
        assert_eq!(portal.store().with(|s| s.frameloop), Frameloop::Always);

        portal.set_inject(InjectState {
            frameloop: Some(Frameloop::Never),
            ..Default::default()
        });
        assert_eq!(portal.store().with(|s| s.frameloop), Frameloop::Never);
    }

    #[test]
    fn dropping_unsubscribes() {
        let frame_loop = FrameLoop::new();
        let parent = Store::new(&frame_loop);
        let (_, portal) = open(&parent, InjectState::default());
        let weak = portal.store().downgrade();
        drop(portal);
        assert!(weak.upgrade().is_none());
        parent.set_size(10.0, 10.0);
    }

    #[test]
    fn missing_container_has_no_root() {
        let frame_loop = FrameLoop::new();
        let parent = Store::new(&frame_loop);
        let scene = parent.scene();
        let mut scene = scene.borrow_mut();
        let gone = scene.insert(Box::new(Group::new()));
        scene.take(gone);
        let err = Portal::new(&mut scene, &parent, gone, InjectState::default()).unwrap_err();
        assert!(matches!(err, Error::NoRoot(_)));
    }
}
