use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Key identifying a task observer. Re-using a key replaces the observer.
pub type ObserverKey = isize;

/// Callbacks fired on the loop thread after every executed task.
///
/// Observers are meant for tracing and instrumentation hooks; they run on
/// every task, so they must be cheap and must not block.
#[derive(Default)]
pub(crate) struct TaskObservers {
    entries: RefCell<BTreeMap<ObserverKey, Rc<dyn Fn()>>>,
}

impl TaskObservers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, key: ObserverKey, callback: Rc<dyn Fn()>) {
        self.entries.borrow_mut().insert(key, callback);
    }

    pub(crate) fn remove(&self, key: ObserverKey) {
        self.entries.borrow_mut().remove(&key);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Fires every registered observer once.
    ///
    /// Works on a snapshot, so an observer may add or remove observers
    /// (including itself); changes apply from the next notification.
    pub(crate) fn notify(&self) {
        let snapshot: Vec<Rc<dyn Fn()>> = {
            let entries = self.entries.borrow();
            if entries.is_empty() {
                return;
            }
            entries.values().cloned().collect()
        };

        for observer in snapshot {
            observer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    #[test]
    fn same_key_replaces_observer() {
        let observers = TaskObservers::new();
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let counter = first.clone();
        observers.add(7, Rc::new(move || counter.set(counter.get() + 1)));
        let counter = second.clone();
        observers.add(7, Rc::new(move || counter.set(counter.get() + 1)));

        observers.notify();
        assert_eq!(observers.len(), 1);
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn removing_unknown_key_is_a_no_op() {
        let observers = TaskObservers::new();
        observers.add(1, Rc::new(|| {}));
        observers.remove(2);
        assert_eq!(observers.len(), 1);
        observers.remove(1);
        assert_eq!(observers.len(), 0);
    }

    #[test]
    fn observer_can_remove_itself() {
        let observers = Rc::new(TaskObservers::new());
        let fired = Rc::new(Cell::new(0));

        let registry = Rc::downgrade(&observers);
        let count = fired.clone();
        observers.add(
            3,
            Rc::new(move || {
                count.set(count.get() + 1);
                if let Some(registry) = registry.upgrade() {
                    registry.remove(3);
                }
            }),
        );

        observers.notify();
        observers.notify();
        assert_eq!(fired.get(), 1);
    }
}
