//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects boxes and reactions.
//! It owns the dependency arena and the dynamically scoped context, and it is
//! the only place that calls user code.
//!
//! # How It Works
//!
//! 1. Creating a box allocates an ID and an arena entry. The value lives in
//!    the returned handle.
//!
//! 2. Creating a reaction allocates an ID, records the current owner as its
//!    parent, and runs it once. A failed first run removes it again.
//!
//! 3. Running a reaction tears down what the previous run built (children,
//!    subscriptions, read sets), then calls the body with a subscribe
//!    capability while the reaction is the active one.
//!
//! 4. Writing a box plans a notification pass (see the scheduler) and
//!    dispatches each planned reaction inline, on the writer's stack.
//!
//! # Borrowing
//!
//! The arena sits in a `RefCell` and is never borrowed across a call into
//! user code. Removed nodes are dropped only after the borrow ends, because a
//! reaction body can own box handles whose drop calls back into the arena.
//!
//! # Threading
//!
//! A runtime and all its handles are `Rc`-based and stay on one thread.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::Context;
use super::reaction::Reaction;
use super::rx_box::RxBox;
use super::subscriber::Subscribe;
use crate::graph::{
    BoxId, Graph, GraphSnapshot, ReactionId, ReactionNode, ReactionState, ReactionStatus,
    UpdateScheduler,
};
use crate::{ReactiveError, Result};

/// Handle to one reactive runtime.
///
/// Cloning is cheap and every clone refers to the same runtime. Boxes and
/// reactions created here hold only weak references back, so dropping the
/// last `Runtime` drops the arena and everything the reaction bodies own.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use trellis_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_box(1);
/// let total = Rc::new(Cell::new(0));
///
/// let c = count.clone();
/// let t = total.clone();
/// let reaction = rt.create_reaction(move |s| {
///     t.set(s.read(&c)? * 2);
///     Ok(())
/// })?;
///
/// count.write(5)?;
/// assert_eq!(total.get(), 10);
/// assert_eq!(reaction.runs(), 2);
/// # Ok::<(), trellis_core::ReactiveError>(())
/// ```
#[derive(Clone, Default)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

#[derive(Default)]
pub(crate) struct RuntimeInner {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) context: Context,
    next_box: Cell<u64>,
    next_reaction: Cell<u64>,
}

impl Runtime {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a box holding `value`.
    pub fn create_box<T: Clone + 'static>(&self, value: T) -> RxBox<T> {
        self.inner.allocate_box(None, value)
    }

    /// Create a box with a label used in diagnostics.
    pub fn create_named_box<T: Clone + 'static>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> RxBox<T> {
        self.inner.allocate_box(Some(name.into()), value)
    }

    /// Create a reaction and run it once.
    ///
    /// The reaction becomes a child of the current owner: the running
    /// reaction, or the target of an enclosing `adopt`. If the first run
    /// fails the reaction is removed and the error is returned.
    pub fn create_reaction<F>(&self, body: F) -> Result<Reaction>
    where
        F: Fn(&Subscribe<'_>) -> Result<()> + 'static,
    {
        self.inner.spawn(None, Rc::new(body))
    }

    /// Create a labelled reaction and run it once.
    pub fn create_named_reaction<F>(&self, name: impl Into<String>, body: F) -> Result<Reaction>
    where
        F: Fn(&Subscribe<'_>) -> Result<()> + 'static,
    {
        self.inner.spawn(Some(name.into()), Rc::new(body))
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Run `f` with box writes deferred until it returns.
    ///
    /// On success every box written inside `f` is committed once, with its
    /// last written value, in the order the boxes were first written. On
    /// error nothing is committed and the error is returned unchanged.
    pub fn transaction<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let scope = self.inner.context.open_batch();
        let outcome = f();
        let batch = scope.close();

        match outcome {
            Ok(value) => {
                if !batch.is_empty() {
                    debug!(writes = batch.len(), "committing transaction");
                }
                batch.commit()?;
                Ok(value)
            }
            Err(err) => {
                debug!(discarded = batch.len(), "transaction failed; staged writes dropped");
                drop(batch);
                Err(err)
            }
        }
    }

    /// Run `f` with `parent` as the owner of any reaction it creates.
    ///
    /// Only ownership changes. Reads made inside `f` still belong to the
    /// reaction that is actually executing, if any.
    pub fn adopt<R, F>(&self, parent: &Reaction, f: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        if !parent.belongs_to(&self.inner) {
            return Err(ReactiveError::invalid(format!(
                "cannot adopt into {}: it belongs to a different runtime",
                parent.id()
            )));
        }
        if parent.is_disposed() || !self.inner.graph.borrow().contains_reaction(parent.id()) {
            return Err(ReactiveError::invalid(format!(
                "cannot adopt into {}: it has been unsubscribed",
                parent.id()
            )));
        }

        let _owner = self.inner.context.enter_owner(parent.id());
        f()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The reaction whose body is executing right now.
    pub fn active_reaction(&self) -> Option<ReactionId> {
        self.inner.context.active()
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.context.in_transaction()
    }

    /// Look up a live reaction by ID.
    pub fn reaction(&self, id: ReactionId) -> Option<Reaction> {
        let status = self.inner.status(id)?;
        Some(Reaction::new(Rc::downgrade(&self.inner), status))
    }

    /// Copy the dependency graph for inspection.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(&self.inner.graph.borrow())
    }

    /// Number of live reactions.
    pub fn reaction_count(&self) -> usize {
        self.inner.graph.borrow().reaction_count()
    }

    /// Number of boxes that still have a handle somewhere.
    pub fn box_count(&self) -> usize {
        self.inner.graph.borrow().box_count()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.inner.graph.borrow();
        f.debug_struct("Runtime")
            .field("boxes", &graph.box_count())
            .field("reactions", &graph.reaction_count())
            .field("active", &self.inner.context.active())
            .field("in_transaction", &self.inner.context.in_transaction())
            .finish()
    }
}

impl RuntimeInner {
    fn allocate_box<T: Clone + 'static>(self: &Rc<Self>, label: Option<String>, value: T) -> RxBox<T> {
        let id = BoxId::from(self.next_box.get());
        self.next_box.set(id.raw() + 1);
        self.graph.borrow_mut().insert_box(id, label.clone());
        trace!(box_id = %id, label = ?label, "box created");
        RxBox::new(self, id, label, value)
    }

    fn spawn(self: &Rc<Self>, label: Option<String>, body: crate::graph::Body) -> Result<Reaction> {
        let parent = self.context.owner();
        if let Some(owner) = parent {
            if !self.graph.borrow().contains_reaction(owner) {
                return Err(ReactiveError::invalid(format!(
                    "cannot create a reaction owned by {owner}: it has been unsubscribed"
                )));
            }
        }

        let id = ReactionId::from(self.next_reaction.get());
        self.next_reaction.set(id.raw() + 1);

        let status = Rc::new(ReactionStatus::new(id, label));
        self.graph
            .borrow_mut()
            .insert_reaction(ReactionNode::new(Rc::clone(&status), body, parent));
        debug!(reaction = %id, parent = ?parent, "reaction created");

        let reaction = Reaction::new(Rc::downgrade(self), status);
        if let Err(err) = self.execute(id) {
            debug!(reaction = %id, error = %err, "first run failed; reaction removed");
            self.unsubscribe(id);
            return Err(err);
        }
        Ok(reaction)
    }

    pub(crate) fn status(&self, id: ReactionId) -> Option<Rc<ReactionStatus>> {
        self.graph
            .borrow()
            .reaction(id)
            .map(|node| Rc::clone(&node.status))
    }

    pub(crate) fn subscribers_of(&self, box_id: BoxId) -> Vec<ReactionId> {
        self.graph
            .borrow()
            .box_node(box_id)
            .map(|node| node.subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Record a plain read of `box_id` against the executing reaction.
    pub(crate) fn record_pass_read(&self, box_id: BoxId) -> Result<()> {
        match self.context.active() {
            Some(reaction) => self.graph.borrow_mut().record_pass_read(reaction, box_id),
            None => Ok(()),
        }
    }

    /// Forget a box whose last handle was dropped.
    pub(crate) fn release_box(&self, box_id: BoxId) {
        match self.graph.try_borrow_mut() {
            Ok(mut graph) => {
                graph.remove_box(box_id);
                trace!(box_id = %box_id, "box released");
            }
            Err(_) => warn!(box_id = %box_id, "arena busy; box entry not released"),
        }
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Run the notification pass for a write to `box_id`.
    pub(crate) fn notify(self: &Rc<Self>, box_id: BoxId) -> Result<()> {
        let plan = UpdateScheduler::plan(&self.graph.borrow(), box_id);
        if plan.is_empty() {
            trace!(box_id = %box_id, "write with no subscribers");
            return Ok(());
        }

        debug!(box_id = %box_id, targets = plan.len(), "box written");
        for reaction in plan {
            self.dispatch(reaction)?;
        }
        Ok(())
    }

    /// Deliver one planned notification.
    fn dispatch(self: &Rc<Self>, id: ReactionId) -> Result<()> {
        let Some(status) = self.status(id) else {
            trace!(reaction = %id, "disposed earlier in the pass; skipped");
            return Ok(());
        };

        match status.state() {
            ReactionState::Paused => {
                status.set_state(ReactionState::PausedStale);
                debug!(reaction = %id, state = %ReactionState::PausedStale, "marked stale");
                Ok(())
            }
            ReactionState::PausedStale => Ok(()),
            _ => self.run(id),
        }
    }

    /// Run or resume a reaction.
    pub(crate) fn run(self: &Rc<Self>, id: ReactionId) -> Result<()> {
        let Some(status) = self.status(id) else {
            return Err(ReactiveError::invalid(format!(
                "{id} has been unsubscribed and cannot run"
            )));
        };

        match status.state() {
            ReactionState::Running => Err(ReactiveError::Cycle { reaction: id }),
            ReactionState::Paused => {
                status.set_state(self.settled_state(id));
                debug!(reaction = %id, "resumed without rerun");
                self.resume_children(id)
            }
            _ => self.execute(id),
        }
    }

    /// Tear down the previous run and call the body once.
    fn execute(self: &Rc<Self>, id: ReactionId) -> Result<()> {
        let (status, body, removed) = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.reaction(id) else {
                return Err(ReactiveError::invalid(format!(
                    "{id} has been unsubscribed and cannot run"
                )));
            };
            let status = Rc::clone(&node.status);
            let body = Rc::clone(&node.body);
            (status, body, graph.reset(id))
        };
        drop(removed);

        status.set_state(ReactionState::Running);
        trace!(reaction = %id, run = status.runs() + 1, "running");

        let outcome = {
            let _scope = self.context.enter_run(&status);
            let capability = Subscribe::new(self, id);
            body(&capability)
        };

        if status.is_disposed() {
            debug!(reaction = %id, "unsubscribed during its own run");
            return outcome;
        }

        match outcome {
            Ok(()) => {
                status.record_run();
                let state = self.settled_state(id);
                status.set_state(state);
                trace!(reaction = %id, runs = status.runs(), state = %state, "run finished");
                Ok(())
            }
            Err(err) => {
                let removed = self.graph.borrow_mut().reset(id);
                drop(removed);
                status.set_state(ReactionState::Off);
                debug!(reaction = %id, error = %err, "run failed; edges cleared");
                Err(err)
            }
        }
    }

    /// `On` while the reaction holds a subscription, `Off` otherwise.
    fn settled_state(&self, id: ReactionId) -> ReactionState {
        let subscribed = self
            .graph
            .borrow()
            .reaction(id)
            .is_some_and(|node| !node.sub_reads.is_empty());
        if subscribed {
            ReactionState::On
        } else {
            ReactionState::Off
        }
    }

    /// Resume the children of a reaction that was resumed without a rerun.
    ///
    /// Paused children come back on and cascade further. Children that went
    /// stale while paused get a full run, which rebuilds their own subtree.
    fn resume_children(self: &Rc<Self>, id: ReactionId) -> Result<()> {
        let children: SmallVec<[ReactionId; 8]> = self.graph.borrow().children_of(id);
        for child in children {
            let Some(status) = self.status(child) else {
                continue;
            };
            match status.state() {
                ReactionState::Paused => {
                    status.set_state(self.settled_state(child));
                    self.resume_children(child)?;
                }
                ReactionState::PausedStale => self.execute(child)?,
                _ => {}
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Pause a reaction and its descendants, keeping their edges.
    pub(crate) fn pause(&self, id: ReactionId) {
        let statuses: Vec<Rc<ReactionStatus>> = {
            let graph = self.graph.borrow();
            graph
                .subtree(id)
                .into_iter()
                .filter_map(|r| graph.reaction(r).map(|node| Rc::clone(&node.status)))
                .collect()
        };
        for status in statuses {
            if status.state() == ReactionState::On {
                status.set_state(ReactionState::Paused);
                debug!(reaction = %status.id, "paused");
            }
        }
    }

    /// Dispose a reaction and its descendants.
    pub(crate) fn unsubscribe(&self, id: ReactionId) {
        let removed = self.graph.borrow_mut().dispose(id);
        if !removed.is_empty() {
            debug!(reaction = %id, disposed = removed.len(), "unsubscribed");
        }
        drop(removed);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
