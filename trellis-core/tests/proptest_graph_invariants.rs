//! Property-based invariant tests for the dependency graph.
//!
//! Random reaction shapes are driven through random sequences of writes,
//! transactions, pauses, resumes, unsubscribes and dropped boxes. After
//! every step:
//!
//! 1. Every subscription edge is recorded on both ends.
//! 2. No reaction holds a box in both read sets.
//! 3. Ownership links agree on both ends and never point at a dead reaction.
//! 4. Lifecycle states agree with the read sets (ON has subscriptions, OFF
//!    has none, nothing is left RUNNING).
//! 5. Disposed handles are absent from the graph.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use proptest::prelude::*;
use trellis_core::{Reaction, ReactionState, Runtime, RxBox};

const BOXES: usize = 4;

// ── Strategies ────────────────────────────────────────────────────────────

/// Which boxes a reaction subscribes to, peeks at, and whether it owns a
/// child that subscribes to its own set.
#[derive(Debug, Clone, Copy)]
struct Shape {
    subscribe: u8,
    peek: u8,
    child: u8,
}

#[derive(Debug, Clone)]
enum Op {
    Write(usize, u32),
    Transaction(Vec<(usize, u32)>),
    Pause(usize),
    Resume(usize),
    Unsubscribe(usize),
    DropBox(usize),
}

/// Box handles shared with reaction bodies. Bodies look boxes up by index
/// and own no handle themselves, so taking one out releases the box.
type Slots = Rc<RefCell<Vec<Option<RxBox<u32>>>>>;

fn mask() -> impl Strategy<Value = u8> {
    0u8..(1 << BOXES)
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    (mask(), mask(), mask()).prop_map(|(subscribe, peek, child)| Shape {
        subscribe,
        // A box read both ways is a MixedRead; keep the sets disjoint.
        peek: peek & !subscribe,
        child,
    })
}

fn write_strategy() -> impl Strategy<Value = (usize, u32)> {
    (0..BOXES, 0u32..100)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => write_strategy().prop_map(|(b, v)| Op::Write(b, v)),
        2 => proptest::collection::vec(write_strategy(), 0..6).prop_map(Op::Transaction),
        2 => any::<usize>().prop_map(Op::Pause),
        2 => any::<usize>().prop_map(Op::Resume),
        1 => any::<usize>().prop_map(Op::Unsubscribe),
        1 => (0..BOXES).prop_map(Op::DropBox),
    ]
}

// ── Fixture ───────────────────────────────────────────────────────────────

fn live(slots: &Slots, i: usize) -> Option<RxBox<u32>> {
    slots.borrow()[i].clone()
}

fn spawn(rt: &Runtime, slots: &Slots, shape: Shape) -> Reaction {
    let slots = slots.clone();
    rt.create_reaction(move |s| {
        for i in 0..BOXES {
            let Some(target) = live(&slots, i) else {
                continue;
            };
            if shape.subscribe & (1 << i) != 0 {
                s.read(&target)?;
            } else if shape.peek & (1 << i) != 0 {
                target.read()?;
            }
        }
        if shape.child != 0 {
            let slots = slots.clone();
            s.runtime().create_reaction(move |s| {
                for i in (0..BOXES).filter(|&i| shape.child & (1 << i) != 0) {
                    if let Some(target) = live(&slots, i) {
                        s.read(&target)?;
                    }
                }
                Ok(())
            })?;
        }
        Ok(())
    })
    .expect("reaction shapes never fail")
}

fn write(slots: &Slots, b: usize, v: u32) -> trellis_core::Result<()> {
    match live(slots, b) {
        Some(target) => target.write(v),
        None => Ok(()),
    }
}

fn apply(rt: &Runtime, slots: &Slots, handles: &[Reaction], op: &Op) {
    let pick = |i: usize| &handles[i % handles.len()];
    match op {
        Op::Write(b, v) => write(slots, *b, *v).expect("write failed"),
        Op::Transaction(writes) => rt
            .transaction(|| {
                for (b, v) in writes {
                    write(slots, *b, *v)?;
                }
                Ok(())
            })
            .expect("transaction failed"),
        Op::Pause(i) => pick(*i).pause(),
        Op::Resume(i) => {
            let handle = pick(*i);
            if !handle.is_disposed() {
                handle.run().expect("resume failed");
            }
        }
        Op::Unsubscribe(i) => pick(*i).unsubscribe(),
        Op::DropBox(b) => {
            let released = slots.borrow_mut()[*b].take();
            drop(released);
        }
    }
}

fn check_graph(rt: &Runtime, handles: &[Reaction]) -> Result<(), TestCaseError> {
    let snapshot = rt.snapshot();
    prop_assert_eq!(snapshot.check_symmetry(), Ok(()));

    let by_id: HashMap<_, _> = snapshot.reactions.iter().map(|r| (r.id, r)).collect();
    for r in &snapshot.reactions {
        for b in &r.subscribed_reads {
            prop_assert!(!r.pass_reads.contains(b), "{} read {} both ways", r.id, b);
        }

        if let Some(parent) = r.parent {
            let owner = by_id.get(&parent);
            prop_assert!(owner.is_some(), "{} points at dead parent {}", r.id, parent);
            prop_assert!(owner.is_some_and(|p| p.children.contains(&r.id)));
        }
        for child in &r.children {
            prop_assert_eq!(by_id.get(child).and_then(|c| c.parent), Some(r.id));
        }

        match r.state {
            ReactionState::On => {
                prop_assert!(!r.subscribed_reads.is_empty(), "{} is on without subscriptions", r.id);
            }
            ReactionState::Off => {
                prop_assert!(r.subscribed_reads.is_empty(), "{} is off but subscribed", r.id);
            }
            ReactionState::Running => {
                prop_assert!(false, "{} left running", r.id);
            }
            ReactionState::Paused | ReactionState::PausedStale => {}
        }
    }

    for handle in handles {
        prop_assert_eq!(handle.is_disposed(), !by_id.contains_key(&handle.id()));
    }
    prop_assert!(rt.active_reaction().is_none());
    prop_assert!(!rt.in_transaction());
    Ok(())
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Graph invariants hold across random operation sequences
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn graph_invariants_survive_random_ops(
        shapes in proptest::collection::vec(shape_strategy(), 1..6),
        ops in proptest::collection::vec(op_strategy(), 0..40),
    ) {
        let rt = Runtime::new();
        let slots: Slots = Rc::new(RefCell::new(
            (0..BOXES).map(|_| Some(rt.create_box(0))).collect(),
        ));
        let handles: Vec<Reaction> = shapes
            .iter()
            .map(|shape| spawn(&rt, &slots, *shape))
            .collect();
        check_graph(&rt, &handles)?;

        for op in &ops {
            apply(&rt, &slots, &handles, op);
            check_graph(&rt, &handles)?;
        }
        let live_boxes = slots.borrow().iter().flatten().count();
        prop_assert_eq!(rt.box_count(), live_boxes);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Transactions commit the last write per box, once
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn transaction_commits_last_write_once(
        writes in proptest::collection::vec(write_strategy(), 1..20),
    ) {
        let rt = Runtime::new();
        let boxes: Vec<RxBox<u32>> = (0..BOXES).map(|_| rt.create_box(u32::MAX)).collect();
        let seen: Rc<RefCell<Vec<(usize, u32)>>> = Rc::new(RefCell::new(Vec::new()));

        for (i, target) in boxes.iter().enumerate() {
            let (target, seen) = (target.clone(), seen.clone());
            rt.create_reaction(move |s| {
                seen.borrow_mut().push((i, s.read(&target)?));
                Ok(())
            })
            .expect("watcher failed");
        }
        seen.borrow_mut().clear();

        rt.transaction(|| {
            for (b, v) in &writes {
                boxes[*b].write(*v)?;
            }
            Ok(())
        })
        .expect("transaction failed");

        let mut expected: Vec<(usize, u32)> = Vec::new();
        for &(b, v) in &writes {
            match expected.iter_mut().find(|(seen_b, _)| *seen_b == b) {
                Some(entry) => entry.1 = v,
                None => expected.push((b, v)),
            }
        }
        prop_assert_eq!(&*seen.borrow(), &expected);
        for &(b, v) in &expected {
            prop_assert_eq!(boxes[b].read().unwrap(), v);
        }
    }
}
