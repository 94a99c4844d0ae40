//! Transactions
//!
//! A transaction defers box writes until its closure finishes, then replays
//! them as ordinary writes. Subscribers of a box written several times inside
//! one transaction are notified once, and only ever see the final value.
//!
//! # How Transactions Work
//!
//! 1. `Runtime::transaction` opens a fresh batch, shadowing any outer one.
//! 2. Every write while the batch is open is staged instead of stored. A
//!    later write to the same box replaces the staged value but keeps the
//!    box's position, so commits happen in first-write order.
//! 3. When the closure finishes the outer batch is restored first.
//! 4. On success each staged write is committed through the box's ordinary
//!    write path. If an outer transaction is open the commit is simply staged
//!    there, which is what makes nesting compose.
//! 5. On failure the staged writes are dropped unseen.

use indexmap::IndexMap;
use tracing::trace;

use super::rx_box::RxBox;
use crate::graph::BoxId;
use crate::Result;

/// A write waiting for its transaction to close.
pub(crate) trait PendingWrite {
    fn box_id(&self) -> BoxId;

    /// Perform the write for real.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// The staged value for one box.
pub(crate) struct PendingValue<T: Clone + 'static> {
    target: RxBox<T>,
    value: T,
}

impl<T: Clone + 'static> PendingValue<T> {
    pub(crate) fn new(target: RxBox<T>, value: T) -> Self {
        Self { target, value }
    }
}

impl<T: Clone + 'static> PendingWrite for PendingValue<T> {
    fn box_id(&self) -> BoxId {
        self.target.id()
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let Self { target, value } = *self;
        target.write(value)
    }
}

/// Writes collected by one transaction scope, keyed by box.
#[derive(Default)]
pub(crate) struct Batch {
    writes: IndexMap<BoxId, Box<dyn PendingWrite>>,
}

impl Batch {
    /// Stage a write, returning the value it replaced, if any.
    pub(crate) fn stage(
        &mut self,
        box_id: BoxId,
        write: Box<dyn PendingWrite>,
    ) -> Option<Box<dyn PendingWrite>> {
        self.writes.insert(box_id, write)
    }

    pub(crate) fn len(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commit every staged write in first-write order.
    ///
    /// Stops at the first write whose notification pass fails; writes after
    /// it are dropped.
    pub(crate) fn commit(self) -> Result<()> {
        for (box_id, write) in self.writes {
            debug_assert_eq!(box_id, write.box_id());
            trace!(box_id = %box_id, "committing staged write");
            write.commit()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::{ReactiveError, Runtime};

    #[test]
    fn writes_are_deferred_until_close() {
        let rt = Runtime::new();
        let count = rt.create_box(0);

        let seen_inside = rt
            .transaction(|| {
                count.write(5)?;
                count.read()
            })
            .unwrap();

        assert_eq!(seen_inside, 0);
        assert_eq!(count.read().unwrap(), 5);
    }

    #[test]
    fn subscribers_see_one_pass_with_last_value() {
        let rt = Runtime::new();
        let count = rt.create_box(0);
        let observed = Rc::new(RefCell::new(Vec::new()));

        let log = observed.clone();
        let c = count.clone();
        let reaction = rt
            .create_reaction(move |s| {
                log.borrow_mut().push(s.read(&c)?);
                Ok(())
            })
            .unwrap();

        rt.transaction(|| {
            count.write(1)?;
            count.write(2)
        })
        .unwrap();

        assert_eq!(reaction.runs(), 2);
        assert_eq!(*observed.borrow(), vec![0, 2]);
    }

    #[test]
    fn failed_transaction_commits_nothing() {
        let rt = Runtime::new();
        let count = rt.create_box(1);
        let runs = Rc::new(Cell::new(0));

        let r = runs.clone();
        let c = count.clone();
        let _reaction = rt
            .create_reaction(move |s| {
                s.read(&c)?;
                r.set(r.get() + 1);
                Ok(())
            })
            .unwrap();

        let result: crate::Result<()> = rt.transaction(|| {
            count.write(99)?;
            Err(ReactiveError::body("abort"))
        });

        assert!(matches!(result, Err(ReactiveError::Body(_))));
        assert_eq!(count.read().unwrap(), 1);
        assert_eq!(runs.get(), 1);
        assert!(!rt.in_transaction());
    }

    #[test]
    fn commits_follow_first_write_order() {
        let rt = Runtime::new();
        let a = rt.create_box(0);
        let b = rt.create_box(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        for (name, cell) in [("a", a.clone()), ("b", b.clone())] {
            let order = order.clone();
            rt.create_reaction(move |s| {
                s.read(&cell)?;
                order.borrow_mut().push(name);
                Ok(())
            })
            .unwrap();
        }
        order.borrow_mut().clear();

        rt.transaction(|| {
            b.write(1)?;
            a.write(1)?;
            b.write(2)
        })
        .unwrap();

        assert_eq!(*order.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn inner_commit_lands_in_outer_batch() {
        let rt = Runtime::new();
        let count = rt.create_box(0);
        let runs = Rc::new(Cell::new(0));

        let r = runs.clone();
        let c = count.clone();
        let _reaction = rt
            .create_reaction(move |s| {
                s.read(&c)?;
                r.set(r.get() + 1);
                Ok(())
            })
            .unwrap();

        rt.transaction(|| {
            rt.transaction(|| count.write(1))?;
            // Still staged in the outer scope.
            assert_eq!(count.read()?, 0);
            count.write(2)
        })
        .unwrap();

        assert_eq!(runs.get(), 2);
        assert_eq!(count.read().unwrap(), 2);
    }

    #[test]
    fn failed_inner_transaction_keeps_outer_writes() {
        let rt = Runtime::new();
        let count = rt.create_box(0);

        rt.transaction(|| {
            count.write(1)?;
            let inner: crate::Result<()> = rt.transaction(|| {
                count.write(50)?;
                Err(ReactiveError::body("inner abort"))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

        assert_eq!(count.read().unwrap(), 1);
    }

    #[test]
    fn transaction_returns_closure_value() {
        let rt = Runtime::new();
        let value = rt.transaction(|| Ok("done")).unwrap();
        assert_eq!(value, "done");
    }
}
