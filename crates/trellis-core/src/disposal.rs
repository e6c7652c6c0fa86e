//! Deferred disposal.
//!
//! Removal only unlinks; the actual `dispose` call is queued on the root
//! and runs later, when the frame loop is idle or the root is torn down.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use crate::object::SceneObject;
use crate::scene::{NodeId, Scene};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

pub enum DisposalTask {
    /// An instance already taken out of the arena.
    Owned(Box<dyn SceneObject>),
    /// An instance that stays in the arena, such as a primitive or a stage.
    InScene(NodeId),
}

#[derive(Default)]
struct QueueInner {
    next: u64,
    tasks: VecDeque<(TaskId, DisposalTask)>,
}

/// Cancellable low-priority queue of pending disposals, owned by one root.
#[derive(Clone, Default)]
pub struct DisposalQueue(Rc<RefCell<QueueInner>>);

impl DisposalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, task: DisposalTask) -> TaskId {
        let mut inner = self.0.borrow_mut();
        inner.next += 1;
        let id = TaskId(inner.next);
        inner.tasks.push_back((id, task));
        id
    }

    /// Drops a pending task without disposing. Returns whether it was queued.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut inner = self.0.borrow_mut();
        let before = inner.tasks.len();
        inner.tasks.retain(|(t, _)| *t != id);
        inner.tasks.len() != before
    }

    pub fn len(&self) -> usize {
        self.0.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().tasks.is_empty()
    }

    /// Runs every queued disposal. Tasks queued while flushing run too.
    pub fn flush(&self, scene: &mut Scene) -> usize {
        let mut ran = 0;
        loop {
            // The borrow ends before `dispose` runs; it may queue more work.
            let next = self.0.borrow_mut().tasks.pop_front();
            let Some((_, task)) = next else {
                break;
            };
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
            ran += 1;
        }
        if ran > 0 {
            log::trace!("disposed {ran} instance(s)");
        }
        ran
    }
}

impl std::fmt::Debug for DisposalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalQueue")
            .field("pending", &self.len())
            .finish()
    }
}

/// Calls `dispose`, logging failures and panics instead of propagating them.
pub fn dispose_guarded(object: &mut dyn SceneObject) -> bool {
    let type_name = object.type_name().to_string();
    match catch_unwind(AssertUnwindSafe(|| object.dispose())) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            log::warn!("{type_name}: {err}");
            false
        }
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "unknown panic".to_string()
            };
            log::warn!("{type_name}: dispose panicked: {message}");
            false
        }
    }
}
