//! Reaction Implementation
//!
//! A reaction is a side-effecting computation that re-runs whenever a box it
//! subscribed to is written.
//!
//! # How Reactions Work
//!
//! 1. When created, the reaction runs its body immediately to establish its
//!    initial subscriptions.
//!
//! 2. Before every run the previous run's subscriptions, read sets and child
//!    reactions are torn down. The body rebuilds whatever it still needs, so
//!    a dependency that is no longer read stops triggering the reaction.
//!
//! 3. After a run the reaction is `On` if it subscribed to anything and `Off`
//!    otherwise. An `Off` reaction can still be run by hand.
//!
//! # Pausing
//!
//! `pause()` keeps a reaction's edges but stops it from running. A write that
//! reaches a paused reaction only marks it stale. `run()` resumes it: a stale
//! reaction gets one full run that sees the latest values, a reaction that
//! missed nothing simply switches back on.
//!
//! # Handles
//!
//! `Reaction` is a cheap, clonable handle. Dropping it does not dispose the
//! reaction; only `unsubscribe()` or a parent's teardown does.

use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime::RuntimeInner;
use crate::graph::{BoxId, ReactionId, ReactionState, ReactionStatus};
use crate::{ReactiveError, Result};

/// Handle to a reaction.
#[derive(Clone)]
pub struct Reaction {
    runtime: Weak<RuntimeInner>,
    status: Rc<ReactionStatus>,
}

impl Reaction {
    pub(crate) fn new(runtime: Weak<RuntimeInner>, status: Rc<ReactionStatus>) -> Self {
        Self { runtime, status }
    }

    /// Get the reaction's unique ID.
    pub fn id(&self) -> ReactionId {
        self.status.id
    }

    pub fn label(&self) -> Option<&str> {
        self.status.label.as_deref()
    }

    /// Number of runs that completed successfully.
    pub fn runs(&self) -> u64 {
        self.status.runs()
    }

    pub fn state(&self) -> ReactionState {
        self.status.state()
    }

    /// Whether the reaction was unsubscribed, directly or through its parent.
    pub fn is_disposed(&self) -> bool {
        self.status.is_disposed()
    }

    /// Run the reaction now, or resume it if it is paused.
    ///
    /// # Errors
    ///
    /// - `Cycle` if the reaction is already running.
    /// - `InvalidUsage` if it was unsubscribed or its runtime is gone.
    /// - Whatever the body returns.
    pub fn run(&self) -> Result<()> {
        if self.status.is_disposed() {
            return Err(ReactiveError::invalid(format!(
                "{} has been unsubscribed and cannot run",
                self.id()
            )));
        }
        self.upgrade()?.run(self.id())
    }

    /// Dispose the reaction and all of its descendants.
    ///
    /// Every subscription they hold is removed. Does nothing if the reaction
    /// is already disposed.
    pub fn unsubscribe(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.unsubscribe(self.id());
        }
    }

    /// Pause the reaction and its descendants.
    ///
    /// Only reactions that are `On` change state; subscriptions are kept.
    pub fn pause(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.pause(self.id());
        }
    }

    /// The reaction that owned this one when it was created, if still live.
    pub fn parent(&self) -> Option<ReactionId> {
        let runtime = self.runtime.upgrade()?;
        let graph = runtime.graph.borrow();
        graph.parent_of(self.id())
    }

    /// Reactions created by this one's current run, in creation order.
    pub fn children(&self) -> Vec<ReactionId> {
        self.runtime
            .upgrade()
            .map(|runtime| runtime.graph.borrow().children_of(self.id()).into_vec())
            .unwrap_or_default()
    }

    /// Boxes this reaction subscribed to in its current run.
    pub fn subscribed_reads(&self) -> Vec<BoxId> {
        self.reads(|node| node.sub_reads.iter().copied().collect())
    }

    /// Boxes this reaction read without subscribing in its current run.
    pub fn pass_reads(&self) -> Vec<BoxId> {
        self.reads(|node| node.pass_reads.iter().copied().collect())
    }

    pub(crate) fn belongs_to(&self, runtime: &Rc<RuntimeInner>) -> bool {
        std::ptr::eq(self.runtime.as_ptr(), Rc::as_ptr(runtime))
    }

    fn reads<F>(&self, collect: F) -> Vec<BoxId>
    where
        F: FnOnce(&crate::graph::ReactionNode) -> Vec<BoxId>,
    {
        let Some(runtime) = self.runtime.upgrade() else {
            return Vec::new();
        };
        let graph = runtime.graph.borrow();
        graph.reaction(self.id()).map(collect).unwrap_or_default()
    }

    fn upgrade(&self) -> Result<Rc<RuntimeInner>> {
        self.runtime.upgrade().ok_or_else(|| {
            ReactiveError::invalid(format!("the runtime of {} has been dropped", self.id()))
        })
    }
}

impl PartialEq for Reaction {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.status, &other.status)
    }
}

impl Eq for Reaction {}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.status.id)
            .field("label", &self.status.label)
            .field("state", &self.status.state())
            .field("runs", &self.status.runs())
            .finish()
    }
}

/// Formats as `R<n>` or `R<n>=<label>`.
impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status.label {
            Some(label) => write!(f, "{}={}", self.status.id, label),
            None => write!(f, "{}", self.status.id),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
