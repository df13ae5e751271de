use crate::goal::Goal;
use crate::goal_stack::GoalStack;
use lyra_model::{Fact, SetOfFacts};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};

pub type SubscriptionId = usize;

/// Callback slots owned by the producer of a notification.
///
/// Slots are deliberately not cloned with the owning problem: a plan
/// simulation must not replay notifications into live observers.
pub struct Signal<A: ?Sized> {
    slots: Vec<(SubscriptionId, Box<dyn FnMut(&A)>)>,
    next_id: SubscriptionId,
}

impl<A: ?Sized> Default for Signal<A> {
    fn default() -> Self {
        Signal {
            slots: Vec::new(),
            next_id: 0,
        }
    }
}

impl<A: ?Sized> Debug for Signal<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signal({} slots)", self.slots.len())
    }
}

impl<A: ?Sized> Clone for Signal<A> {
    fn clone(&self) -> Self {
        Default::default()
    }
}

impl<A: ?Sized> Signal<A> {
    pub fn connect(&mut self, callback: impl FnMut(&A) + 'static) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push((id, Box::new(callback)));
        id
    }

    pub fn disconnect(&mut self, id: SubscriptionId) {
        self.slots.retain(|(sid, _)| *sid != id);
    }

    pub fn emit(&mut self, arg: &A) {
        for (_, callback) in &mut self.slots {
            callback(arg);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// The notification surface of a problem, fired synchronously after each
/// consistent mutation, in this order.
#[derive(Debug, Default, Clone)]
pub struct Observers {
    pub on_facts_added: Signal<BTreeSet<Fact>>,
    pub on_facts_removed: Signal<BTreeSet<Fact>>,
    pub on_punctual_facts: Signal<BTreeSet<Fact>>,
    /// Full post-image of the fact store.
    pub on_facts_changed: Signal<SetOfFacts>,
    pub on_goals_changed: Signal<BTreeMap<i32, Vec<Goal>>>,
}

/// Bridges "goals changed" to "goals removed" by comparing snapshots of
/// the goals' textual forms.
#[derive(Debug, Clone)]
pub struct GoalsRemovedTracker {
    existing: BTreeSet<String>,
}

impl GoalsRemovedTracker {
    pub fn new(stack: &GoalStack) -> Self {
        GoalsRemovedTracker {
            existing: Self::snapshot(stack),
        }
    }

    fn snapshot(stack: &GoalStack) -> BTreeSet<String> {
        stack
            .goals()
            .values()
            .flat_map(|goals| goals.iter().map(|g| g.to_string()))
            .collect()
    }

    /// Goals gone since the last snapshot; updates the snapshot.
    pub fn removed_goals(&mut self, stack: &GoalStack) -> BTreeSet<String> {
        let current = Self::snapshot(stack);
        let removed = self.existing.difference(&current).cloned().collect();
        self.existing = current;
        removed
    }
}
