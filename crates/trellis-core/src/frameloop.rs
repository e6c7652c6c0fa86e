//! The frame loop shared by every root.
//!
//! The platform calls [`FrameLoop::tick`] once per display frame while
//! [`FrameLoop::wants_tick`] is true. Each tick renders the roots that are
//! active and either run continuously or are owed frames; when no root wants
//! another frame the loop goes idle until something invalidates.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use web_time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::effects::Dispose;
use crate::render_api::SurfaceId;
use crate::store::{Frameloop, Store};

pub type EffectCallback = Rc<RefCell<dyn FnMut(f64)>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Timer {
    id: TimerId,
    deadline: Instant,
    callback: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct EffectList(Vec<(u64, EffectCallback)>);

impl EffectList {
    fn run(list: &RefCell<EffectList>, timestamp: f64) {
        let effects: Vec<EffectCallback> = list.borrow().0.iter().map(|(_, e)| e.clone()).collect();
        for effect in effects {
            if let Ok(mut f) = effect.try_borrow_mut() {
                (&mut *f)(timestamp);
            }
        }
    }
}

struct LoopInner {
    roots: RefCell<IndexMap<SurfaceId, Store>>,
    running: Cell<bool>,
    effects: RefCell<EffectList>,
    after_effects: RefCell<EffectList>,
    tail_effects: RefCell<EffectList>,
    timers: RefCell<Vec<Timer>>,
    next_id: Cell<u64>,
    clock: Box<dyn Clock>,
    origin: Instant,
}

#[derive(Clone, Copy)]
enum Phase {
    Before,
    After,
    Tail,
}

impl LoopInner {
    fn effects(&self, phase: Phase) -> &RefCell<EffectList> {
        match phase {
            Phase::Before => &self.effects,
            Phase::After => &self.after_effects,
            Phase::Tail => &self.tail_effects,
        }
    }
}

#[derive(Clone)]
pub struct FrameLoop(Rc<LoopInner>);

#[derive(Clone, Default)]
pub struct WeakFrameLoop(Weak<LoopInner>);

impl WeakFrameLoop {
    pub fn upgrade(&self) -> Option<FrameLoop> {
        self.0.upgrade().map(FrameLoop)
    }
}

impl fmt::Debug for WeakFrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakFrameLoop({:p})", self.0.as_ptr())
    }
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoop")
            .field("roots", &self.0.roots.borrow().len())
            .field("running", &self.0.running.get())
            .field("timers", &self.0.timers.borrow().len())
            .finish()
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock) -> Self {
        let origin = clock.now();
        Self(Rc::new(LoopInner {
            roots: RefCell::new(IndexMap::new()),
            running: Cell::new(false),
            effects: RefCell::default(),
            after_effects: RefCell::default(),
            tail_effects: RefCell::default(),
            timers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            clock: Box::new(clock),
            origin,
        }))
    }

    pub fn downgrade(&self) -> WeakFrameLoop {
        WeakFrameLoop(Rc::downgrade(&self.0))
    }

    fn next_id(&self) -> u64 {
        let id = self.0.next_id.get() + 1;
        self.0.next_id.set(id);
        id
    }

    /// Milliseconds since the loop was created.
    pub fn now_ms(&self) -> f64 {
        (self.0.clock.now() - self.0.origin).as_secs_f64() * 1000.0
    }

    pub(crate) fn insert_root(&self, surface: SurfaceId, store: Store) {
        self.0.roots.borrow_mut().insert(surface, store);
    }

    pub(crate) fn remove_root(&self, surface: SurfaceId) -> Option<Store> {
        self.0.roots.borrow_mut().shift_remove(&surface)
    }

    pub fn root(&self, surface: SurfaceId) -> Option<Store> {
        self.0.roots.borrow().get(&surface).cloned()
    }

    pub fn roots(&self) -> Vec<Store> {
        self.0.roots.borrow().values().cloned().collect()
    }

    fn add_to(&self, phase: Phase, callback: impl FnMut(f64) + 'static) -> Dispose {
        let id = self.next_id();
        self.0.effects(phase).borrow_mut().0.push((id, Rc::new(RefCell::new(callback))));
        let weak = Rc::downgrade(&self.0);
        Dispose::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.effects(phase).borrow_mut().0.retain(|(e, _)| *e != id);
            }
        })
    }

    /// Runs before every tick.
    pub fn add_effect(&self, callback: impl FnMut(f64) + 'static) -> Dispose {
        self.add_to(Phase::Before, callback)
    }

    /// Runs after every tick.
    pub fn add_after_effect(&self, callback: impl FnMut(f64) + 'static) -> Dispose {
        self.add_to(Phase::After, callback)
    }

    /// Runs when the loop goes idle.
    pub fn add_tail(&self, callback: impl FnMut(f64) + 'static) -> Dispose {
        self.add_to(Phase::Tail, callback)
    }

    /// Requests `frames` more frames for one root, or for every root.
    pub fn invalidate(&self, store: Option<&Store>, frames: u32) {
        match store {
            Some(store) => {
                if !store.request_frames(frames) {
                    return;
                }
            }
            None => {
                for root in self.roots() {
                    root.request_frames(frames);
                }
            }
        }
        if !self.0.running.replace(true) {
            log::trace!("frame loop started");
        }
    }

    /// Renders immediately, outside the regular tick.
    pub fn advance(&self, timestamp: f64, run_global_effects: bool, store: Option<&Store>) {
        if run_global_effects {
            EffectList::run(&self.0.effects, timestamp);
        }
        let targets = match store {
            Some(store) => vec![store.clone()],
            None => self.roots(),
        };
        for root in &targets {
            root.render_frame(timestamp);
            root.flush_disposals();
        }
        if run_global_effects {
            EffectList::run(&self.0.after_effects, timestamp);
        }
    }

    /// One display frame. Returns whether another tick is wanted.
    pub fn tick(&self, timestamp: f64) -> bool {
        self.0.running.set(true);
        EffectList::run(&self.0.effects, timestamp);

        let mut repeat = 0;
        for root in self.roots() {
            let (active, mode, frames) = {
                let internal = root.internal();
                let internal = internal.borrow();
                (internal.active, root.with(|s| s.frameloop), internal.frames)
            };
            if active && (mode == Frameloop::Always || frames > 0) {
                repeat += root.render_frame(timestamp);
            }
            root.flush_disposals();
        }

        EffectList::run(&self.0.after_effects, timestamp);

        if repeat == 0 {
            EffectList::run(&self.0.tail_effects, timestamp);
            self.0.running.set(false);
            log::trace!("frame loop idle");
        }
        self.run_timers();
        self.0.running.get()
    }

    pub fn tick_now(&self) -> bool {
        self.tick(self.now_ms())
    }

    pub fn is_running(&self) -> bool {
        self.0.running.get()
    }

    /// Whether the platform should keep calling [`tick`](Self::tick).
    pub fn wants_tick(&self) -> bool {
        self.is_running() || !self.0.timers.borrow().is_empty()
    }

    pub fn schedule_timeout(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let id = TimerId(self.next_id());
        self.0.timers.borrow_mut().push(Timer {
            id,
            deadline: self.0.clock.now() + delay,
            callback: Box::new(callback),
        });
        id
    }

    pub fn cancel_timeout(&self, id: TimerId) -> bool {
        let mut timers = self.0.timers.borrow_mut();
        let before = timers.len();
        timers.retain(|t| t.id != id);
        timers.len() != before
    }

    /// Fires every timer whose deadline has passed. Returns how many fired.
    pub fn run_timers(&self) -> usize {
        let now = self.0.clock.now();
        let due: Vec<Timer> = {
            let mut timers = self.0.timers.borrow_mut();
            let (due, pending) = std::mem::take(&mut *timers)
                .into_iter()
                .partition(|t| t.deadline <= now);
            *timers = pending;
            due
        };
        let fired = due.len();
        for timer in due {
            (timer.callback)();
        }
        fired
    }
}
