//! The subscribe capability handed to every reaction body.
//!
//! A reaction body receives `&Subscribe` for the duration of one run. Reading
//! a box through it records a dependency: the box will re-run the reaction
//! on its next write. The capability cannot be stored past the run because it
//! borrows from the runtime frame that created it.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::runtime::{Runtime, RuntimeInner};
use super::rx_box::RxBox;
use crate::graph::ReactionId;
use crate::{ReactiveError, Result};

/// Subscribe-read capability bound to one running reaction.
pub struct Subscribe<'a> {
    runtime: &'a Rc<RuntimeInner>,
    reaction: ReactionId,
}

impl<'a> Subscribe<'a> {
    pub(crate) fn new(runtime: &'a Rc<RuntimeInner>, reaction: ReactionId) -> Self {
        Self { runtime, reaction }
    }

    /// The reaction this capability belongs to.
    pub fn reaction(&self) -> ReactionId {
        self.reaction
    }

    /// A handle to the runtime the reaction runs in.
    ///
    /// Use this instead of capturing a `Runtime` in the body, which would
    /// keep the runtime alive through its own arena.
    pub fn runtime(&self) -> Runtime {
        Runtime::from_inner(Rc::clone(self.runtime))
    }

    /// Read a box and subscribe the running reaction to it.
    ///
    /// Fails with `MixedRead` if the box was already pass-read this run, and
    /// with `InvalidUsage` if the capability is used while a different
    /// reaction is executing or the box belongs to another runtime.
    pub fn read<T: Clone + 'static>(&self, target: &RxBox<T>) -> Result<T> {
        if !target.belongs_to(self.runtime) {
            return Err(ReactiveError::invalid(format!(
                "{} belongs to a different runtime than {}",
                target.id(),
                self.reaction
            )));
        }
        if self.runtime.context.active() != Some(self.reaction) {
            return Err(ReactiveError::invalid(format!(
                "subscribe capability of {} used outside its own run",
                self.reaction
            )));
        }

        let linked = self
            .runtime
            .graph
            .borrow_mut()
            .record_subscribe(self.reaction, target.id())?;
        if !linked {
            debug!(
                reaction = %self.reaction,
                box_id = %target.id(),
                "reaction disposed during its run; read not recorded"
            );
        }
        Ok(target.get_untracked())
    }
}

impl fmt::Debug for Subscribe<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribe")
            .field("reaction", &self.reaction)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::graph::ReadMode;

    #[test]
    fn subscribe_read_creates_edge() {
        let rt = Runtime::new();
        let count = rt.create_box(1);

        let c = count.clone();
        let reaction = rt
            .create_reaction(move |s| {
                s.read(&c)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(count.subscribers(), vec![reaction.id()]);
        assert_eq!(reaction.subscribed_reads(), vec![count.id()]);
    }

    #[test]
    fn repeated_subscribe_reads_are_fine() {
        let rt = Runtime::new();
        let count = rt.create_box(3);
        let total = Rc::new(Cell::new(0));

        let c = count.clone();
        let t = total.clone();
        rt.create_reaction(move |s| {
            t.set(s.read(&c)? + s.read(&c)?);
            Ok(())
        })
        .unwrap();

        assert_eq!(total.get(), 6);
        assert_eq!(count.subscriber_count(), 1);
    }

    #[test]
    fn subscribe_after_pass_read_is_mixed() {
        let rt = Runtime::new();
        let count = rt.create_box(0);

        let c = count.clone();
        let err = rt
            .create_reaction(move |s| {
                c.read()?;
                s.read(&c)?;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(
            err,
            ReactiveError::MixedRead {
                existing: ReadMode::Pass,
                ..
            }
        ));
        assert_eq!(count.subscriber_count(), 0);
        assert_eq!(rt.reaction_count(), 0);
    }

    #[test]
    fn outer_capability_works_after_creating_a_child() {
        let rt = Runtime::new();
        let count = rt.create_box(0);
        let outcome = Rc::new(RefCell::new(None));

        let c = count.clone();
        let o = outcome.clone();
        rt.create_reaction(move |outer| {
            let rt = outer.runtime();
            let outer_id = outer.reaction();
            rt.create_reaction(move |inner| {
                assert_ne!(inner.reaction(), outer_id);
                Ok(())
            })?;
            *o.borrow_mut() = Some(outer.read(&c).is_ok());
            Ok(())
        })
        .unwrap();

        assert_eq!(*outcome.borrow(), Some(true));
    }

    #[test]
    fn box_from_other_runtime_is_rejected() {
        let rt = Runtime::new();
        let other = Runtime::new();
        let foreign = other.create_box(0);

        let err = rt
            .create_reaction(move |s| {
                s.read(&foreign)?;
                Ok(())
            })
            .unwrap_err();

        assert!(err.is_invalid_usage());
    }
}
