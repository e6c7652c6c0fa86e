use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Cleanup handle returned by every subscription.
#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// A handle with nothing to clean up.
    pub fn noop() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Runs at most once (safe to call multiple times, including from inside
    /// the callback it unsubscribes).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn is_spent(&self) -> bool {
        self.0.borrow().is_none()
    }
}

impl fmt::Debug for Dispose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispose")
            .field("spent", &self.is_spent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn runs_once() {
        let count = Rc::new(Cell::new(0));
        let d = {
            let count = count.clone();
            Dispose::new(move || count.set(count.get() + 1))
        };
        let copy = d.clone();
        d.run();
        copy.run();
        assert_eq!(count.get(), 1);
        assert!(d.is_spent());
    }
}
