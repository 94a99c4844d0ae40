//! Reactive Primitives
//!
//! This module implements the user-facing half of the engine: boxes,
//! reactions, the subscribe capability, transactions and the runtime that
//! ties them together.
//!
//! # Concepts
//!
//! ## Boxes
//!
//! A box is a container for mutable state. Writing it re-runs every reaction
//! subscribed to it, synchronously, whether or not the value changed.
//!
//! ## Reactions
//!
//! A reaction is a side-effecting function that runs once when created and
//! again whenever a box it subscribed to is written. Reactions created while
//! another reaction runs become its children and are torn down with it.
//!
//! ## Subscribe-reads and pass-reads
//!
//! Dependencies are explicit. A reaction body receives a `&Subscribe`, and
//! only reads made through it create dependencies. A plain `read()` inside a
//! reaction is a pass-read: it sees the value without subscribing. Reading
//! the same box both ways in one run is a `MixedRead` error.
//!
//! ## Transactions
//!
//! `Runtime::transaction` defers writes until its closure returns, so
//! subscribers run once per box and observe only the final values.
//!
//! # Implementation Notes
//!
//! All state is per `Runtime`: there are no globals or thread-locals. The
//! active reaction, the owner for new reactions and the open batch are
//! swapped in and out by guards, so nested runs restore them on every exit
//! path.

mod context;
mod reaction;
mod runtime;
mod rx_box;
mod subscriber;
mod transaction;

pub use reaction::Reaction;
pub use runtime::Runtime;
pub use rx_box::RxBox;
pub use subscriber::Subscribe;
