//! Dependency Arena
//!
//! The arena owns the bookkeeping half of every box and reaction: the
//! subscriber sets, the read sets, and the ownership tree. Nodes are indexed
//! by integer IDs for O(1) lookups, and every edge is stored on both ends so
//! that `reaction ∈ box.subscribers ⇔ box ∈ reaction.sub_reads` holds after
//! each operation here.
//!
//! Nothing in this module calls user code. Operations that remove reactions
//! hand the removed nodes back to the caller, which must drop them only after
//! releasing its borrow of the arena: a node's body may own box handles, and
//! dropping a box handle calls back into the arena.

use std::collections::HashMap;

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::trace;

use super::node::{BoxId, BoxNode, ReactionId, ReactionNode, ReactionState, ReadMode};
use crate::{ReactiveError, Result};

#[derive(Debug, Default)]
pub(crate) struct Graph {
    boxes: HashMap<BoxId, BoxNode>,
    reactions: HashMap<ReactionId, ReactionNode>,
}

impl Graph {
    // ------------------------------------------------------------------
    // Boxes
    // ------------------------------------------------------------------

    pub(crate) fn insert_box(&mut self, id: BoxId, label: Option<String>) {
        self.boxes.insert(id, BoxNode::new(label));
    }

    /// Forget a box whose last handle was dropped, along with every edge and
    /// read record that mentions it.
    pub(crate) fn remove_box(&mut self, id: BoxId) {
        let Some(node) = self.boxes.remove(&id) else {
            return;
        };
        for reaction in &node.subscribers {
            if let Some(rx) = self.reactions.get_mut(reaction) {
                rx.sub_reads.shift_remove(&id);
                // Paused reactions keep their state and settle on resume.
                if rx.sub_reads.is_empty() && rx.status.state() == ReactionState::On {
                    rx.status.set_state(ReactionState::Off);
                    trace!(reaction = %reaction, box_id = %id, "last subscription released");
                }
            }
        }
        for rx in self.reactions.values_mut() {
            rx.pass_reads.shift_remove(&id);
        }
    }

    pub(crate) fn box_node(&self, id: BoxId) -> Option<&BoxNode> {
        self.boxes.get(&id)
    }

    pub(crate) fn boxes(&self) -> impl Iterator<Item = (&BoxId, &BoxNode)> {
        self.boxes.iter()
    }

    pub(crate) fn box_count(&self) -> usize {
        self.boxes.len()
    }

    // ------------------------------------------------------------------
    // Reactions and ownership
    // ------------------------------------------------------------------

    /// Add a reaction and, when its parent is still live, register it as
    /// that parent's child.
    pub(crate) fn insert_reaction(&mut self, mut node: ReactionNode) {
        let id = node.id();
        if let Some(parent) = node.parent {
            match self.reactions.get_mut(&parent) {
                Some(owner) => {
                    owner.children.insert(id);
                }
                None => node.parent = None,
            }
        }
        self.reactions.insert(id, node);
    }

    pub(crate) fn reaction(&self, id: ReactionId) -> Option<&ReactionNode> {
        self.reactions.get(&id)
    }

    pub(crate) fn reactions(&self) -> impl Iterator<Item = (&ReactionId, &ReactionNode)> {
        self.reactions.iter()
    }

    pub(crate) fn reaction_count(&self) -> usize {
        self.reactions.len()
    }

    pub(crate) fn contains_reaction(&self, id: ReactionId) -> bool {
        self.reactions.contains_key(&id)
    }

    pub(crate) fn parent_of(&self, id: ReactionId) -> Option<ReactionId> {
        self.reactions.get(&id).and_then(|node| node.parent)
    }

    pub(crate) fn children_of(&self, id: ReactionId) -> SmallVec<[ReactionId; 8]> {
        self.reactions
            .get(&id)
            .map(|node| node.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The reaction and all of its live descendants, parents first.
    pub(crate) fn subtree(&self, id: ReactionId) -> Vec<ReactionId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.reactions.get(&next) {
                order.push(next);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Record a subscribe-read, establishing the edge on both ends.
    ///
    /// Returns `Ok(false)` without touching anything when the reaction is no
    /// longer in the arena.
    pub(crate) fn record_subscribe(&mut self, reaction: ReactionId, box_id: BoxId) -> Result<bool> {
        let Some(rx) = self.reactions.get_mut(&reaction) else {
            return Ok(false);
        };
        if rx.pass_reads.contains(&box_id) {
            return Err(ReactiveError::MixedRead {
                reaction,
                box_id,
                existing: ReadMode::Pass,
            });
        }
        let Some(target) = self.boxes.get_mut(&box_id) else {
            return Err(ReactiveError::invalid(format!(
                "{box_id} is not registered with this runtime"
            )));
        };
        if rx.sub_reads.insert(box_id) {
            trace!(reaction = %reaction, box_id = %box_id, "subscribed");
        }
        target.subscribers.insert(reaction);
        Ok(true)
    }

    /// Record a pass-read for the executing reaction.
    pub(crate) fn record_pass_read(&mut self, reaction: ReactionId, box_id: BoxId) -> Result<()> {
        let Some(rx) = self.reactions.get_mut(&reaction) else {
            return Ok(());
        };
        if rx.sub_reads.contains(&box_id) {
            return Err(ReactiveError::MixedRead {
                reaction,
                box_id,
                existing: ReadMode::Subscribe,
            });
        }
        rx.pass_reads.insert(box_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Clear a reaction ahead of a run: dispose its children, drop its
    /// subscriptions and forget its reads. The reaction itself stays.
    #[must_use = "removed nodes must be dropped after the arena borrow ends"]
    pub(crate) fn reset(&mut self, id: ReactionId) -> Vec<ReactionNode> {
        let Some(node) = self.reactions.get_mut(&id) else {
            return Vec::new();
        };
        let children = std::mem::take(&mut node.children);
        let reads = std::mem::take(&mut node.sub_reads);
        node.pass_reads.clear();

        self.unlink(id, &reads);

        let mut removed = Vec::new();
        for child in children {
            removed.extend(self.dispose(child));
        }
        removed
    }

    /// Remove a reaction and its whole subtree from the arena.
    #[must_use = "removed nodes must be dropped after the arena borrow ends"]
    pub(crate) fn dispose(&mut self, id: ReactionId) -> Vec<ReactionNode> {
        if let Some(parent) = self.parent_of(id) {
            if let Some(owner) = self.reactions.get_mut(&parent) {
                owner.children.shift_remove(&id);
            }
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(mut node) = self.reactions.remove(&next) else {
                continue;
            };
            let reads = std::mem::take(&mut node.sub_reads);
            node.pass_reads.clear();
            self.unlink(next, &reads);

            stack.extend(node.children.drain(..));
            node.status.mark_disposed();
            trace!(reaction = %next, runs = node.status.runs(), "disposed");
            removed.push(node);
        }
        removed
    }

    fn unlink(&mut self, reaction: ReactionId, reads: &IndexSet<BoxId>) {
        for box_id in reads {
            if let Some(node) = self.boxes.get_mut(box_id) {
                node.subscribers.shift_remove(&reaction);
            }
        }
    }
}
