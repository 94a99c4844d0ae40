//! Box Implementation
//!
//! A box is the fundamental reactive storage cell. It holds a value and is
//! the target of subscriptions.
//!
//! # How Boxes Work
//!
//! 1. A plain `read()` inside a running reaction is recorded as a pass-read:
//!    the reaction sees the value but does not depend on it.
//!
//! 2. Reading through the subscribe capability (`s.read(&rx_box)`) records a
//!    subscribe-read and links the box and the reaction in both directions.
//!
//! 3. `write()` stores the value and re-runs the subscribers, every time,
//!    whether or not the value changed. Inside a transaction the value is
//!    staged instead.
//!
//! Writes return nothing. Callers who want the new value read it explicitly,
//! which keeps a write from silently doubling as a read inside a reaction.
//!
//! # Memory Layout
//!
//! The handle is an `Rc` around the value and a weak pointer to the runtime.
//! Subscriber bookkeeping lives in the runtime's arena, keyed by the box ID,
//! and is released when the last handle drops.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use tracing::trace;

use super::runtime::RuntimeInner;
use super::transaction::PendingValue;
use crate::graph::{BoxId, ReactionId};
use crate::Result;

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use trellis_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_box(0);
///
/// count.write(5)?;
/// assert_eq!(count.read()?, 5);
/// # Ok::<(), trellis_core::ReactiveError>(())
/// ```
pub struct RxBox<T: Clone + 'static> {
    inner: Rc<BoxInner<T>>,
}

struct BoxInner<T> {
    id: BoxId,
    label: Option<String>,
    runtime: Weak<RuntimeInner>,
    value: RefCell<T>,
}

impl<T> Drop for BoxInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.release_box(self.id);
        }
    }
}

impl<T: Clone + 'static> RxBox<T> {
    pub(crate) fn new(
        runtime: &Rc<RuntimeInner>,
        id: BoxId,
        label: Option<String>,
        value: T,
    ) -> Self {
        Self {
            inner: Rc::new(BoxInner {
                id,
                label,
                runtime: Rc::downgrade(runtime),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the box's unique ID.
    pub fn id(&self) -> BoxId {
        self.inner.id
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Get the current value.
    ///
    /// Inside a running reaction this is a pass-read. It fails with
    /// `MixedRead` if the same reaction already subscribe-read this box in
    /// the current run.
    pub fn read(&self) -> Result<T> {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.record_pass_read(self.inner.id)?;
        }
        Ok(self.get_untracked())
    }

    /// Store a new value and run the subscribers.
    ///
    /// Any error raised while re-running a subscriber is returned here, after
    /// the value has been stored.
    pub fn write(&self, value: T) -> Result<()> {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            self.store(value);
            return Ok(());
        };

        if runtime.context.in_transaction() {
            trace!(box_id = %self.inner.id, "write staged");
            let pending = Box::new(PendingValue::new(self.clone(), value));
            let staged = runtime.context.stage(self.inner.id, pending);
            debug_assert!(staged);
            return Ok(());
        }

        self.store(value);
        runtime.notify(self.inner.id)
    }

    /// Write a value computed from the current one.
    ///
    /// The current value is taken with an ordinary `read()`.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.read()?;
        self.write(f(&current))
    }

    /// Get the number of subscribed reactions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Reactions subscribed to this box, in subscription order.
    pub fn subscribers(&self) -> Vec<ReactionId> {
        self.inner
            .runtime
            .upgrade()
            .map(|runtime| runtime.subscribers_of(self.inner.id))
            .unwrap_or_default()
    }

    pub fn is_subscribed_by(&self, reaction: ReactionId) -> bool {
        self.subscribers().contains(&reaction)
    }

    /// Clone the value without any read bookkeeping.
    pub(crate) fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    pub(crate) fn belongs_to(&self, runtime: &Rc<RuntimeInner>) -> bool {
        std::ptr::eq(self.inner.runtime.as_ptr(), Rc::as_ptr(runtime))
    }

    fn store(&self, value: T) {
        let previous = self.inner.value.replace(value);
        drop(previous);
    }
}

impl<T: Clone + 'static> Clone for RxBox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for RxBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxBox")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Formats as `B<n>` or `B<n>=<label>`, never the value.
impl<T: Clone + 'static> fmt::Display for RxBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.label {
            Some(label) => write!(f, "{}={}", self.inner.id, label),
            None => write!(f, "{}", self.inner.id),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
