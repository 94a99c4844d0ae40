//! Update Scheduler
//!
//! The scheduler decides which reactions a box write must run, and in what
//! order.
//!
//! # Algorithm
//!
//! 1. Snapshot the box's subscriber set. Runs triggered later in the pass can
//!    add or remove subscribers, but the pass only ever looks at the snapshot.
//! 2. For every subscriber, walk its ownership chain and pick the outermost
//!    ancestor that is itself in the snapshot (or the subscriber, if none is).
//!    Re-running that ancestor tears down and recreates the subscriber
//!    anyway, so running the subscriber on its own would be wasted work on a
//!    reaction that is about to be destroyed.
//! 3. Deduplicate, keeping first-seen order, so each resolved reaction runs at
//!    most once per write.
//!
//! The plan is computed up front. While executing it the runtime skips any
//! entry that an earlier run in the same pass has already disposed.

use indexmap::IndexSet;

use super::arena::Graph;
use super::node::{BoxId, ReactionId};

/// Reactions to dispatch for one write, in dispatch order.
pub(crate) type DispatchPlan = IndexSet<ReactionId>;

pub(crate) struct UpdateScheduler;

impl UpdateScheduler {
    /// Plan the notification pass for a write to `box_id`.
    pub(crate) fn plan(graph: &Graph, box_id: BoxId) -> DispatchPlan {
        let Some(node) = graph.box_node(box_id) else {
            return DispatchPlan::new();
        };
        let snapshot = &node.subscribers;

        snapshot
            .iter()
            .map(|&subscriber| Self::resolve(graph, subscriber, snapshot))
            .collect()
    }

    /// The outermost ancestor of `reaction` that is also in `snapshot`.
    ///
    /// Outermost rather than nearest on purpose: rerunning the outermost
    /// subscribed ancestor recreates every subscribed reaction below it.
    fn resolve(graph: &Graph, reaction: ReactionId, snapshot: &IndexSet<ReactionId>) -> ReactionId {
        let mut target = reaction;
        let mut cursor = graph.parent_of(reaction);
        while let Some(ancestor) = cursor {
            if snapshot.contains(&ancestor) {
                target = ancestor;
            }
            cursor = graph.parent_of(ancestor);
        }
        target
    }
}
