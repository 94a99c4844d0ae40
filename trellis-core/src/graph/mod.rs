//! Dependency Graph
//!
//! This module holds the bookkeeping side of the reactive engine: who
//! subscribes to what, who owns whom, and which reactions a write must run.
//!
//! # Overview
//!
//! The graph is bipartite between boxes and reactions:
//!
//! - A subscription edge joins a box and a reaction that read it through the
//!   subscribe capability. It is stored on both ends.
//! - An ownership edge joins a reaction to each reaction created while it was
//!   the owner. Ownership edges form a forest.
//!
//! # Design Decisions
//!
//! 1. The graph is an arena indexed by integer IDs rather than a web of
//!    reference-counted nodes. Parent pointers are plain IDs, so there are no
//!    reference cycles to leak and disposed entries are simply removed.
//!
//! 2. The arena never calls user code. Everything that runs a reaction lives
//!    in the runtime, which borrows the arena only between calls into user
//!    code.
//!
//! 3. Dispatch planning is a pure function of the arena, which keeps diamond
//!    resolution testable without running anything.

mod arena;
mod node;
mod scheduler;
mod snapshot;

pub(crate) use arena::Graph;
pub(crate) use node::{Body, ReactionNode, ReactionStatus};
pub use node::{BoxId, ReactionId, ReactionState, ReadMode};
pub(crate) use scheduler::UpdateScheduler;
pub use snapshot::{BoxSnapshot, GraphSnapshot, ReactionSnapshot, SymmetryViolation};
