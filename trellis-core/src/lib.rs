//! Trellis Core
//!
//! This crate provides a small push-based reactive engine. It implements:
//!
//! - Boxes: reactive cells that re-run their subscribers on every write
//! - Reactions: side-effecting functions with explicit subscriptions
//! - Ownership: reactions created inside a reaction are torn down with it
//! - Transactions: batched writes with one notification pass per box
//! - Diagnostics: serialisable graph snapshots
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the runtime and the user-facing handles
//! - `graph`: the dependency arena, dispatch planning and snapshots
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use trellis_core::Runtime;
//!
//! let rt = Runtime::new();
//! let first = rt.create_named_box("first", String::from("Ada"));
//! let last = rt.create_named_box("last", String::from("Lovelace"));
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let (f, l, out) = (first.clone(), last.clone(), log.clone());
//! rt.create_named_reaction("greeting", move |s| {
//!     // Only `first` is a dependency; `last` is peeked at.
//!     let line = format!("{} {}", s.read(&f)?, l.read()?);
//!     out.borrow_mut().push(line);
//!     Ok(())
//! })?;
//!
//! last.write(String::from("Byron"))?;
//! first.write(String::from("Augusta"))?;
//!
//! assert_eq!(*log.borrow(), ["Ada Lovelace", "Augusta Byron"]);
//! # Ok::<(), trellis_core::ReactiveError>(())
//! ```

pub mod graph;
pub mod reactive;

mod error;

pub use error::{ReactiveError, Result};
pub use graph::{
    BoxId, BoxSnapshot, GraphSnapshot, ReactionId, ReactionSnapshot, ReactionState, ReadMode,
    SymmetryViolation,
};
pub use reactive::{Reaction, Runtime, RxBox, Subscribe};
