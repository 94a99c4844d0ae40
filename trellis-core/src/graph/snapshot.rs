//! Graph Snapshots
//!
//! A snapshot is a plain, serialisable copy of the dependency arena at one
//! instant. It is the supported way to inspect the graph from outside the
//! crate: tests use it to check the edge symmetry invariant, and tools can
//! dump it as JSON to see why a reaction did or did not run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::arena::Graph;
use super::node::{BoxId, ReactionId, ReactionState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSnapshot {
    pub id: BoxId,
    pub label: Option<String>,
    pub subscribers: Vec<ReactionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSnapshot {
    pub id: ReactionId,
    pub label: Option<String>,
    pub state: ReactionState,
    pub runs: u64,
    pub parent: Option<ReactionId>,
    pub children: Vec<ReactionId>,
    pub subscribed_reads: Vec<BoxId>,
    pub pass_reads: Vec<BoxId>,
}

/// Boxes and live reactions of one runtime, each sorted by ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub boxes: Vec<BoxSnapshot>,
    pub reactions: Vec<ReactionSnapshot>,
}

/// An edge recorded on only one of its two ends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymmetryViolation {
    #[error("{box_id} lists {reaction} as a subscriber, but {reaction} does not subscribe to it")]
    DanglingSubscriber { box_id: BoxId, reaction: ReactionId },

    #[error("{reaction} subscribes to {box_id}, but {box_id} does not list it")]
    DanglingRead { reaction: ReactionId, box_id: BoxId },
}

impl GraphSnapshot {
    pub(crate) fn capture(graph: &Graph) -> Self {
        let mut boxes: Vec<BoxSnapshot> = graph
            .boxes()
            .map(|(&id, node)| BoxSnapshot {
                id,
                label: node.label.clone(),
                subscribers: node.subscribers.iter().copied().collect(),
            })
            .collect();
        boxes.sort_by_key(|b| b.id);

        let mut reactions: Vec<ReactionSnapshot> = graph
            .reactions()
            .map(|(&id, node)| ReactionSnapshot {
                id,
                label: node.status.label.clone(),
                state: node.status.state(),
                runs: node.status.runs(),
                parent: node.parent,
                children: node.children.iter().copied().collect(),
                subscribed_reads: node.sub_reads.iter().copied().collect(),
                pass_reads: node.pass_reads.iter().copied().collect(),
            })
            .collect();
        reactions.sort_by_key(|r| r.id);

        Self { boxes, reactions }
    }

    pub fn box_(&self, id: BoxId) -> Option<&BoxSnapshot> {
        self.boxes.iter().find(|b| b.id == id)
    }

    pub fn reaction(&self, id: ReactionId) -> Option<&ReactionSnapshot> {
        self.reactions.iter().find(|r| r.id == id)
    }

    /// Check that every subscription edge is recorded on both ends.
    pub fn check_symmetry(&self) -> Result<(), SymmetryViolation> {
        for b in &self.boxes {
            for &reaction in &b.subscribers {
                let linked = self
                    .reaction(reaction)
                    .is_some_and(|r| r.subscribed_reads.contains(&b.id));
                if !linked {
                    return Err(SymmetryViolation::DanglingSubscriber {
                        box_id: b.id,
                        reaction,
                    });
                }
            }
        }
        for r in &self.reactions {
            for &box_id in &r.subscribed_reads {
                let linked = self
                    .box_(box_id)
                    .is_some_and(|b| b.subscribers.contains(&r.id));
                if !linked {
                    return Err(SymmetryViolation::DanglingRead {
                        reaction: r.id,
                        box_id,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(id: u64, reads: &[u64]) -> ReactionSnapshot {
        ReactionSnapshot {
            id: ReactionId::from(id),
            label: None,
            state: ReactionState::On,
            runs: 1,
            parent: None,
            children: Vec::new(),
            subscribed_reads: reads.iter().copied().map(BoxId::from).collect(),
            pass_reads: Vec::new(),
        }
    }

    fn cell(id: u64, subscribers: &[u64]) -> BoxSnapshot {
        BoxSnapshot {
            id: BoxId::from(id),
            label: None,
            subscribers: subscribers.iter().copied().map(ReactionId::from).collect(),
        }
    }

    #[test]
    fn symmetric_snapshot_passes() {
        let snapshot = GraphSnapshot {
            boxes: vec![cell(0, &[0])],
            reactions: vec![reaction(0, &[0])],
        };
        assert_eq!(snapshot.check_symmetry(), Ok(()));
    }

    #[test]
    fn one_sided_edges_are_reported() {
        let snapshot = GraphSnapshot {
            boxes: vec![cell(0, &[0]), cell(1, &[])],
            reactions: vec![reaction(0, &[0, 1])],
        };
        assert_eq!(
            snapshot.check_symmetry(),
            Err(SymmetryViolation::DanglingRead {
                reaction: ReactionId::from(0),
                box_id: BoxId::from(1),
            })
        );

        let snapshot = GraphSnapshot {
            boxes: vec![cell(0, &[3])],
            reactions: Vec::new(),
        };
        assert!(matches!(
            snapshot.check_symmetry(),
            Err(SymmetryViolation::DanglingSubscriber { .. })
        ));
    }
}
