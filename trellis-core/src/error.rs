//! Error types for the reactive engine.
//!
//! Every failure is reported synchronously to whoever triggered the work:
//! the creator of a reaction for its first run, or the writer of a box for
//! any rerun the write caused. Nothing is swallowed or retried.

use thiserror::Error;

use crate::graph::{BoxId, ReactionId, ReadMode};

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A box was read both through the subscribe capability and as a plain
    /// read within one run of the same reaction.
    #[error("mixed read of {box_id} in {reaction}: it was already a {existing} this run")]
    MixedRead {
        reaction: ReactionId,
        box_id: BoxId,
        existing: ReadMode,
    },

    /// A reaction was asked to run while it was already running.
    #[error("cycle detected: {reaction} was triggered while it was running")]
    Cycle { reaction: ReactionId },

    #[error("invalid usage: {reason}")]
    InvalidUsage { reason: String },

    /// An error raised by user code inside a reaction body.
    #[error("reaction body failed: {0}")]
    Body(#[source] Box<dyn std::error::Error + 'static>),
}

impl ReactiveError {
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidUsage {
            reason: reason.into(),
        }
    }

    /// Wrap an application error so it can be returned from a reaction body.
    #[must_use]
    pub fn body(err: impl Into<Box<dyn std::error::Error + 'static>>) -> Self {
        Self::Body(err.into())
    }

    pub fn is_mixed_read(&self) -> bool {
        matches!(self, Self::MixedRead { .. })
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    pub fn is_invalid_usage(&self) -> bool {
        matches!(self, Self::InvalidUsage { .. })
    }
}
