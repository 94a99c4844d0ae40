//! Reactive Context
//!
//! The context holds the three dynamically scoped values of a runtime:
//!
//! - the *active* reaction, whose body is executing right now and which
//!   receives pass-read bookkeeping;
//! - the *owner*, which becomes the parent of any reaction created now;
//! - the open transaction *batch*, if any.
//!
//! # Implementation
//!
//! Each value is swapped in by a guard and swapped back when the guard drops,
//! so the previous value comes back on every exit path: normal return, `?`
//! propagation, or unwinding. Nesting is ordinary stack discipline.
//!
//! Running a reaction sets both the active reaction and the owner. `adopt`
//! sets only the owner, so reads made inside an adopted scope still belong to
//! the reaction that is actually executing.

use std::cell::{Cell, RefCell};

use super::transaction::{Batch, PendingWrite};
use crate::graph::{BoxId, ReactionId, ReactionState, ReactionStatus};

#[derive(Default)]
pub(crate) struct Context {
    active: Cell<Option<ReactionId>>,
    owner: Cell<Option<ReactionId>>,
    batch: RefCell<Option<Batch>>,
}

impl Context {
    pub(crate) fn active(&self) -> Option<ReactionId> {
        self.active.get()
    }

    pub(crate) fn owner(&self) -> Option<ReactionId> {
        self.owner.get()
    }

    /// Make `status`'s reaction the active reaction and the owner until the
    /// returned guard drops.
    pub(crate) fn enter_run<'a>(&'a self, status: &'a ReactionStatus) -> RunScope<'a> {
        RunScope {
            ctx: self,
            status,
            prev_active: self.active.replace(Some(status.id)),
            prev_owner: self.owner.replace(Some(status.id)),
        }
    }

    /// Make `owner` the parent for new reactions until the guard drops.
    pub(crate) fn enter_owner(&self, owner: ReactionId) -> OwnerScope<'_> {
        OwnerScope {
            ctx: self,
            prev_owner: self.owner.replace(Some(owner)),
        }
    }

    /// Open a fresh batch, shadowing any batch that is already open.
    pub(crate) fn open_batch(&self) -> BatchScope<'_> {
        let prev = self.batch.replace(Some(Batch::default()));
        BatchScope {
            ctx: self,
            prev,
            closed: false,
        }
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.batch.borrow().is_some()
    }

    /// Stage a write in the open batch. Returns `false` when no batch is open.
    pub(crate) fn stage(&self, box_id: BoxId, write: Box<dyn PendingWrite>) -> bool {
        // Take the previous entry out so it drops after the borrow ends.
        let replaced = match self.batch.borrow_mut().as_mut() {
            Some(batch) => batch.stage(box_id, write),
            None => return false,
        };
        drop(replaced);
        true
    }
}

/// Guard returned by [`Context::enter_run`].
///
/// Besides restoring the context it clears the `Running` state if the body
/// unwound, so a panicking reaction is not mistaken for a cycle later.
pub(crate) struct RunScope<'a> {
    ctx: &'a Context,
    status: &'a ReactionStatus,
    prev_active: Option<ReactionId>,
    prev_owner: Option<ReactionId>,
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        self.ctx.active.set(self.prev_active);
        self.ctx.owner.set(self.prev_owner);
        if self.status.state() == ReactionState::Running {
            self.status.set_state(ReactionState::Off);
        }
    }
}

pub(crate) struct OwnerScope<'a> {
    ctx: &'a Context,
    prev_owner: Option<ReactionId>,
}

impl Drop for OwnerScope<'_> {
    fn drop(&mut self) {
        self.ctx.owner.set(self.prev_owner);
    }
}

/// Guard returned by [`Context::open_batch`].
pub(crate) struct BatchScope<'a> {
    ctx: &'a Context,
    prev: Option<Batch>,
    closed: bool,
}

impl BatchScope<'_> {
    /// Restore the outer batch and hand back the one this scope collected.
    pub(crate) fn close(mut self) -> Batch {
        self.closed = true;
        self.ctx
            .batch
            .replace(self.prev.take())
            .unwrap_or_default()
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            // Unwinding: the collected writes are discarded.
            let abandoned = self.ctx.batch.replace(self.prev.take());
            drop(abandoned);
        }
    }
}
