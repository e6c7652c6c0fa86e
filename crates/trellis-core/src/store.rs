//! Per-root reactive state.
//!
//! A [`Store`] holds everything one mounted surface needs: the backend, the
//! instance arena, the stage node, sizing, and the frame subscribers. All
//! reads and writes go through the store; listeners see every write.
//!
//! ```rust
//! use trellis_core::{FrameLoop, Store, Frameloop};
//!
//! let frame_loop = FrameLoop::new();
//! let store = Store::new(&frame_loop);
//! store.set_frameloop(Frameloop::Demand);
//! store.set_size(800.0, 600.0);
//! assert_eq!(store.get().viewport.aspect, 800.0 / 600.0);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::disposal::DisposalQueue;
use crate::effects::Dispose;
use crate::frameloop::{FrameLoop, WeakFrameLoop};
use crate::geometry::{Size, Viewport};
use crate::object::{Group, SceneObject};
use crate::render_api::SharedBackend;
use crate::scene::{NodeId, Scene};
use crate::state::{LocalState, StateFlags};

/// When a root renders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Frameloop {
    /// Every tick, unless a positive-priority subscriber renders by itself.
    #[default]
    Always,
    /// Only after an invalidation.
    Demand,
    /// Only through an explicit advance.
    Never,
}

pub type FrameCallback = Rc<RefCell<dyn FnMut(&Store, f64)>>;

/// A registered per-frame callback.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    callback: FrameCallback,
    pub priority: i32,
    store: WeakStore,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Loop bookkeeping, shared between a root and its portals.
#[derive(Debug, Default)]
pub struct InternalState {
    /// Cleared on unmount; inactive roots are never rendered.
    pub active: bool,
    /// Number of subscribers with a positive priority.
    pub priority: u32,
    /// Frames still owed to invalidations.
    pub frames: u32,
    subscribers: Vec<Subscription>,
    next_id: u64,
}

impl InternalState {
    /// Subscribers, ascending by priority.
    pub fn subscribers(&self) -> &[Subscription] {
        &self.subscribers
    }
}

/// Frame statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Performance {
    pub frame_count: u64,
    /// Smoothed frames per second.
    pub fps: f32,
    last_timestamp: Option<f64>,
}

impl Performance {
    fn record(&mut self, timestamp: f64) {
        self.frame_count += 1;
        if let Some(prev) = self.last_timestamp.replace(timestamp) {
            let dt = ((timestamp - prev) / 1000.0) as f32;
            if dt > 0.0 {
                let fps = 1.0 / dt;
                // simple EMA
                let a = 0.2;
                self.fps = if self.fps == 0.0 {
                    fps
                } else {
                    (1.0 - a) * self.fps + a * fps
                };
            }
        }
    }
}

/// Per-root frame timing; timestamps are in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameClock {
    /// Seconds since the first rendered frame.
    pub elapsed: f64,
    /// Seconds since the previous rendered frame.
    pub delta: f64,
    last: Option<f64>,
}

impl FrameClock {
    fn advance(&mut self, timestamp: f64) -> f64 {
        self.delta = match self.last.replace(timestamp) {
            Some(prev) => ((timestamp - prev) / 1000.0).max(0.0),
            None => 0.0,
        };
        self.elapsed += self.delta;
        self.delta
    }
}

#[derive(Clone)]
pub struct RootState {
    pub gl: Option<SharedBackend>,
    pub scene: Rc<RefCell<Scene>>,
    /// Top-level container everything mounts under.
    pub stage: NodeId,
    pub frameloop: Frameloop,
    pub size: Size,
    pub viewport: Viewport,
    pub performance: Performance,
    pub clock: FrameClock,
    pub internal: Rc<RefCell<InternalState>>,
    /// The enclosing root, for portal stores.
    pub previous_root: Option<WeakStore>,
    pub disposals: DisposalQueue,
    pub frame_loop: WeakFrameLoop,
}

impl fmt::Debug for RootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootState")
            .field("gl", &self.gl.is_some())
            .field("stage", &self.stage)
            .field("frameloop", &self.frameloop)
            .field("size", &self.size)
            .field("viewport", &self.viewport)
            .field("performance", &self.performance)
            .field("internal", &self.internal)
            .finish_non_exhaustive()
    }
}

type Listener = Rc<dyn Fn(&RootState)>;

struct StoreInner {
    state: RefCell<RootState>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_listener: Cell<u64>,
}

/// Cheap, clonable handle to one root's state.
#[derive(Clone)]
pub struct Store(Rc<StoreInner>);

/// Non-owning store handle, held by instances and subscriptions.
#[derive(Clone, Default)]
pub struct WeakStore(Weak<StoreInner>);

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.0.upgrade().map(Store)
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakStore({:p})", self.0.as_ptr())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.state.try_borrow() {
            Ok(state) => f.debug_tuple("Store").field(&*state).finish(),
            Err(_) => f.write_str("Store(<borrowed>)"),
        }
    }
}

impl Store {
    /// A store with a fresh arena and a plain [`Group`] stage.
    pub fn new(frame_loop: &FrameLoop) -> Self {
        Self::with_stage(frame_loop, Box::new(Group::new()))
    }

    pub fn with_stage(frame_loop: &FrameLoop, stage: Box<dyn SceneObject>) -> Self {
        let mut scene = Scene::new();
        let stage = scene.insert(stage);
        let state = RootState {
            gl: None,
            scene: Rc::new(RefCell::new(scene)),
            stage,
            frameloop: Frameloop::Always,
            size: Size::default(),
            viewport: Viewport::default(),
            performance: Performance::default(),
            clock: FrameClock::default(),
            internal: Rc::new(RefCell::new(InternalState::default())),
            previous_root: None,
            disposals: DisposalQueue::new(),
            frame_loop: frame_loop.downgrade(),
        };
        let store = Self::from_state(state);

        let mut link = LocalState::new(Some(store.downgrade()));
        link.flags |= StateFlags::CONTAINER;
        if let Some(inst) = store.scene().borrow_mut().get_mut(stage) {
            inst.state = Some(link);
        }
        store
    }

    pub(crate) fn from_state(state: RootState) -> Self {
        Self(Rc::new(StoreInner {
            state: RefCell::new(state),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        }))
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A snapshot of the current state.
    pub fn get(&self) -> RootState {
        self.0.state.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&RootState) -> R) -> R {
        f(&self.0.state.borrow())
    }

    pub fn scene(&self) -> Rc<RefCell<Scene>> {
        self.with(|s| s.scene.clone())
    }

    pub fn stage(&self) -> NodeId {
        self.with(|s| s.stage)
    }

    pub fn internal(&self) -> Rc<RefCell<InternalState>> {
        self.with(|s| s.internal.clone())
    }

    pub fn frame_loop(&self) -> Option<FrameLoop> {
        self.with(|s| s.frame_loop.upgrade())
    }

    pub fn is_active(&self) -> bool {
        self.internal().borrow().active
    }

    pub fn pending_frames(&self) -> u32 {
        self.internal().borrow().frames
    }

    /// Writes state, resizes the backend if the size or pixel ratio changed,
    /// notifies listeners and invalidates.
    pub fn set(&self, f: impl FnOnce(&mut RootState)) {
        let resize = {
            let mut state = self.0.state.borrow_mut();
            let (size, dpr) = (state.size, state.viewport.dpr);
            f(&mut state);
            if state.size != size || state.viewport.dpr != dpr {
                state.viewport = Viewport::from_size(state.size, state.viewport.dpr);
                state.gl.clone().map(|gl| (gl, state.viewport.physical()))
            } else {
                None
            }
        };
        if let Some((gl, (width, height))) = resize {
            gl.borrow_mut().resize(width, height);
        }
        self.notify();
        self.invalidate();
    }

    /// Writes state and notifies listeners, without side effects.
    pub(crate) fn patch(&self, f: impl FnOnce(&mut RootState)) {
        f(&mut self.0.state.borrow_mut());
        self.notify();
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .0
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        if listeners.is_empty() {
            return;
        }
        let snapshot = self.get();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    /// Calls `f` after every write.
    pub fn subscribe_state(&self, f: impl Fn(&RootState) + 'static) -> Dispose {
        let id = self.0.next_listener.get();
        self.0.next_listener.set(id + 1);
        self.0.listeners.borrow_mut().push((id, Rc::new(f)));
        let weak = Rc::downgrade(&self.0);
        Dispose::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(l, _)| *l != id);
            }
        })
    }

    pub fn set_size(&self, width: f32, height: f32) {
        self.set(|s| s.size = Size::new(width, height));
    }

    pub fn set_dpr(&self, dpr: f32) {
        self.set(|s| s.viewport.dpr = dpr);
    }

    pub fn set_frameloop(&self, frameloop: Frameloop) {
        self.set(|s| s.frameloop = frameloop);
    }

    /// Requests one more frame.
    pub fn invalidate(&self) {
        self.invalidate_frames(1);
    }

    pub fn invalidate_frames(&self, frames: u32) {
        match self.frame_loop() {
            Some(frame_loop) => frame_loop.invalidate(Some(self), frames),
            None => {
                self.request_frames(frames);
            }
        }
    }

    /// Adds owed frames. Returns false when the root cannot be invalidated.
    pub(crate) fn request_frames(&self, frames: u32) -> bool {
        let (internal, mode) = self.with(|s| (s.internal.clone(), s.frameloop));
        let mut internal = internal.borrow_mut();
        if !internal.active || mode == Frameloop::Never {
            return false;
        }
        internal.frames = (internal.frames + frames).min(60);
        true
    }

    /// Renders this root right away, for `never` and tests.
    pub fn advance(&self, timestamp: f64, run_global_effects: bool) {
        if let Some(frame_loop) = self.frame_loop() {
            frame_loop.advance(timestamp, run_global_effects, Some(self));
        } else {
            self.render_frame(timestamp);
        }
    }

    /// Registers a per-frame callback. A positive priority takes over
    /// rendering for this root until the returned handle runs.
    pub fn subscribe_frame(&self, callback: impl FnMut(&Store, f64) + 'static, priority: i32) -> Dispose {
        let internal = self.internal();
        let id = {
            let mut i = internal.borrow_mut();
            i.next_id += 1;
            let id = i.next_id;
            if priority > 0 {
                i.priority += 1;
            }
            let at = i.subscribers.partition_point(|s| s.priority <= priority);
            i.subscribers.insert(
                at,
                Subscription {
                    id,
                    callback: Rc::new(RefCell::new(callback)),
                    priority,
                    store: self.downgrade(),
                },
            );
            id
        };
        let weak = Rc::downgrade(&internal);
        Dispose::new(move || {
            let Some(internal) = weak.upgrade() else {
                return;
            };
            let mut i = internal.borrow_mut();
            if let Some(pos) = i.subscribers.iter().position(|s| s.id == id) {
                let removed = i.subscribers.remove(pos);
                if removed.priority > 0 {
                    i.priority = i.priority.saturating_sub(1);
                }
            }
        })
    }

    /// Renders one frame: subscribers in priority order, then the backend
    /// unless a subscriber claimed rendering. Returns how many more frames
    /// this root wants.
    pub(crate) fn render_frame(&self, timestamp: f64) -> u32 {
        let (internal, gl, scene, stage, mode) =
            self.with(|s| (s.internal.clone(), s.gl.clone(), s.scene.clone(), s.stage, s.frameloop));
        let delta = self.0.state.borrow_mut().clock.advance(timestamp);

        let subscribers = internal.borrow().subscribers.clone();
        for sub in &subscribers {
            let Some(store) = sub.store.upgrade() else {
                continue;
            };
            match sub.callback.try_borrow_mut() {
                Ok(mut callback) => (&mut *callback)(&store, delta),
                Err(_) => log::trace!("frame callback {} re-entered; skipped", sub.id),
            }
        }

        let manual = internal.borrow().priority > 0;
        if !manual && let Some(gl) = gl {
            match scene.try_borrow() {
                Ok(scene) => gl.borrow_mut().render(&scene, stage),
                Err(_) => log::warn!("scene is mid-commit; skipping render"),
            }
        }

        let frames = {
            let mut i = internal.borrow_mut();
            i.frames = i.frames.saturating_sub(1);
            i.frames
        };
        self.0.state.borrow_mut().performance.record(timestamp);

        if mode == Frameloop::Always { 1 } else { frames }
    }

    /// Runs queued disposals now. Returns how many ran.
    pub fn flush_disposals(&self) -> usize {
        let (queue, scene) = self.with(|s| (s.disposals.clone(), s.scene.clone()));
        if queue.is_empty() {
            return 0;
        }
        match scene.try_borrow_mut() {
            Ok(mut scene) => queue.flush(&mut scene),
            Err(_) => 0,
        }
    }

    /// Inserts an author-built object so it can be mounted as a primitive.
    pub fn adopt(&self, object: Box<dyn SceneObject>) -> NodeId {
        self.scene().borrow_mut().insert(object)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn active_store() -> (FrameLoop, Store) {
        let frame_loop = FrameLoop::new();
        let store = Store::new(&frame_loop);
        store.internal().borrow_mut().active = true;
        (frame_loop, store)
    }

    #[test]
    fn stage_is_linked_to_its_store() {
        let (_loop, store) = active_store();
        let scene = store.scene();
        let scene = scene.borrow();
        let state = scene.state(store.stage()).unwrap();
        assert!(state.is_container());
        assert!(state.store().unwrap().ptr_eq(&store));
    }

    #[test]
    fn set_notifies_and_invalidates() {
        let (_loop, store) = active_store();
        let seen = Rc::new(Cell::new(0.0));
        let _sub = {
            let seen = seen.clone();
            store.subscribe_state(move |s| seen.set(s.size.width))
        };
        store.set_size(320.0, 200.0);
        assert_eq!(seen.get(), 320.0);
        assert_eq!(store.pending_frames(), 1);
    }

    #[test]
    fn frames_cap_at_sixty() {
        let (_loop, store) = active_store();
        store.invalidate_frames(100);
        assert_eq!(store.pending_frames(), 60);
    }

    #[test]
    fn inactive_or_never_roots_ignore_invalidate() {
        let (_loop, store) = active_store();
        store.set_frameloop(Frameloop::Never);
        let before = store.pending_frames();
        store.invalidate();
        assert_eq!(store.pending_frames(), before);

        store.internal().borrow_mut().active = false;
        store.set_frameloop(Frameloop::Demand);
        store.invalidate();
        assert_eq!(store.pending_frames(), before);
    }

    #[test]
    fn subscribers_stay_sorted_and_unsubscribe_once() {
        let (_loop, store) = active_store();
        let a = store.subscribe_frame(|_, _| {}, 2);
        let _b = store.subscribe_frame(|_, _| {}, 0);
        let c = store.subscribe_frame(|_, _| {}, 1);
        {
            let internal = store.internal();
            let internal = internal.borrow();
            let order: Vec<_> = internal.subscribers().iter().map(|s| s.priority).collect();
            assert_eq!(order, [0, 1, 2]);
            assert_eq!(internal.priority, 2);
        }
        a.run();
        a.run();
        c.run();
        assert_eq!(store.internal().borrow().priority, 0);
        assert_eq!(store.internal().borrow().subscribers().len(), 1);
    }
}
