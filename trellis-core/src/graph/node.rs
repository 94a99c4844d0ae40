//! Graph Nodes
//!
//! This module defines the identifiers, lifecycle states and node records
//! that live in the dependency arena.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::reactive::Subscribe;
use crate::Result;

/// Identifier of a box within one runtime. Displays as `B<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoxId(u64);

impl BoxId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for BoxId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Identifier of a reaction within one runtime. Displays as `R<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReactionId(u64);

impl ReactionId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ReactionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Lifecycle state of a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionState {
    /// Not subscribed to anything. Still runnable by hand.
    Off,

    /// Subscribed to at least one box and up to date.
    On,

    /// The body is executing right now.
    Running,

    /// Linked to its boxes but not executing. Nothing changed since the pause.
    Paused,

    /// Paused, and at least one subscribed box was written since.
    PausedStale,
}

impl fmt::Display for ReactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::PausedStale => "paused-stale",
        };
        f.write_str(name)
    }
}

/// How a box was read by the executing reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadMode {
    /// Read through the subscribe capability; creates a dependency edge.
    Subscribe,
    /// Plain read; observes the value without creating a dependency.
    Pass,
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe => f.write_str("subscribe-read"),
            Self::Pass => f.write_str("pass-read"),
        }
    }
}

/// The user function wrapped by a reaction.
pub(crate) type Body = Rc<dyn Fn(&Subscribe<'_>) -> Result<()>>;

/// Lifecycle fields shared between the arena and every `Reaction` handle.
///
/// Handles keep this alive after disposal so callers can still see which run
/// a reaction ended on.
#[derive(Debug)]
pub(crate) struct ReactionStatus {
    pub(crate) id: ReactionId,
    pub(crate) label: Option<String>,
    state: Cell<ReactionState>,
    runs: Cell<u64>,
    disposed: Cell<bool>,
}

impl ReactionStatus {
    pub(crate) fn new(id: ReactionId, label: Option<String>) -> Self {
        Self {
            id,
            label,
            state: Cell::new(ReactionState::Off),
            runs: Cell::new(0),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn state(&self) -> ReactionState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: ReactionState) {
        self.state.set(state);
    }

    pub(crate) fn runs(&self) -> u64 {
        self.runs.get()
    }

    pub(crate) fn record_run(&self) {
        self.runs.set(self.runs.get() + 1);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn mark_disposed(&self) {
        self.state.set(ReactionState::Off);
        self.disposed.set(true);
    }
}

/// A box's entry in the arena. The value itself lives in the typed handle.
#[derive(Debug, Default)]
pub(crate) struct BoxNode {
    pub(crate) label: Option<String>,
    /// Reactions that subscribe-read this box, in subscription order.
    pub(crate) subscribers: IndexSet<ReactionId>,
}

impl BoxNode {
    pub(crate) fn new(label: Option<String>) -> Self {
        Self {
            label,
            subscribers: IndexSet::new(),
        }
    }
}

/// A reaction's entry in the arena.
pub(crate) struct ReactionNode {
    pub(crate) status: Rc<ReactionStatus>,
    pub(crate) body: Body,
    /// Boxes read through the subscribe capability this run.
    pub(crate) sub_reads: IndexSet<BoxId>,
    /// Boxes read without the capability this run.
    pub(crate) pass_reads: IndexSet<BoxId>,
    pub(crate) parent: Option<ReactionId>,
    /// Reactions created while this one was the owner.
    pub(crate) children: IndexSet<ReactionId>,
}

impl ReactionNode {
    pub(crate) fn new(status: Rc<ReactionStatus>, body: Body, parent: Option<ReactionId>) -> Self {
        Self {
            status,
            body,
            sub_reads: IndexSet::new(),
            pass_reads: IndexSet::new(),
            parent,
            children: IndexSet::new(),
        }
    }

    pub(crate) fn id(&self) -> ReactionId {
        self.status.id
    }
}

impl fmt::Debug for ReactionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionNode")
            .field("id", &self.status.id)
            .field("state", &self.status.state())
            .field("sub_reads", &self.sub_reads)
            .field("pass_reads", &self.pass_reads)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish()
    }
}
