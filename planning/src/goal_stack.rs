use crate::goal::Goal;
use lyra_model::{SetOfFacts, SetOfTypes};
use std::collections::BTreeMap;
use std::time::Instant;

/// Priority given to goals stacked without an explicit one.
pub const DEFAULT_PRIORITY: i32 = 10;

/// What a goal-stack operation changed, for notification purposes.
#[derive(Debug, Default)]
pub struct GoalChanges {
    pub changed: bool,
    pub removed: Vec<Goal>,
}

impl GoalChanges {
    pub fn merge(&mut self, other: GoalChanges) {
        self.changed |= other.changed;
        self.removed.extend(other.removed);
    }
}

/// Priority-ordered goals: higher priority first, front-to-back within a
/// priority.
///
/// A goal is *active* when it is considered by the planner; it is
/// *inactive* while a more important goal keeps it waiting, and *gated*
/// (neither) while its condition fact does not hold. Only inactive time is
/// accounted against `max_time_to_keep_inactive`.
#[derive(Debug, Clone, Default)]
pub struct GoalStack {
    goals: BTreeMap<i32, Vec<Goal>>,
}

impl GoalStack {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn goals(&self) -> &BTreeMap<i32, Vec<Goal>> {
        &self.goals
    }

    /// The goal the planner would consider first, ignoring gating.
    pub fn current_goal(&self) -> Option<(&Goal, i32)> {
        self.goals
            .iter()
            .rev()
            .find_map(|(p, goals)| goals.first().map(|g| (g, *p)))
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Walks goals from the highest priority down, front-to-back within a
    /// priority, handing each non-gated goal to `manage_goal` until it
    /// returns true (the planner committed to acting on that goal).
    ///
    /// Along the way: gated goals are skipped with no inactivity
    /// accounting; the first active goal is exempt from its inactivity
    /// budget; any other goal over its budget is removed without being
    /// handed out; a goal handed out without commitment is removed unless
    /// persistent.
    pub fn iterate_on_goals_and_remove_non_persistent(
        &mut self,
        mut manage_goal: impl FnMut(&mut Goal, i32) -> bool,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        let mut changes = GoalChanges::default();
        let mut first_active = true;
        let priorities: Vec<i32> = self.goals.keys().rev().cloned().collect();
        'outer: for priority in priorities {
            let Some(goals) = self.goals.get_mut(&priority) else {
                continue;
            };
            let mut i = 0;
            while i < goals.len() {
                let gated = goals[i]
                    .condition_fact()
                    .is_some_and(|cf| !facts.satisfies(cf, types));
                if gated {
                    i += 1;
                    continue;
                }
                let over_budget = if first_active {
                    false
                } else {
                    goals[i].is_inactive_for_too_long(now)
                };
                first_active = false;
                if !over_budget && manage_goal(&mut goals[i], priority) {
                    break 'outer;
                }
                if goals[i].is_persistent() && !over_budget {
                    goals[i].set_inactive_since_if_not_set(now);
                    i += 1;
                } else {
                    changes.removed.push(goals.remove(i));
                    changes.changed = true;
                }
            }
        }
        self.prune_empty_groups();
        changes
    }

    /// Marks newly inactive goals and removes the ones already over their
    /// inactivity budget. Run after every fact or goal mutation.
    pub fn remove_no_stackable_goals(
        &mut self,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        self.sweep(facts, types, now)
    }

    fn sweep(&mut self, facts: &SetOfFacts, types: &SetOfTypes, now: Option<Instant>) -> GoalChanges {
        let mut changes = GoalChanges::default();
        let mut first_active = true;
        let priorities: Vec<i32> = self.goals.keys().rev().cloned().collect();
        for priority in priorities {
            let Some(goals) = self.goals.get_mut(&priority) else {
                continue;
            };
            let mut i = 0;
            while i < goals.len() {
                let gated = goals[i]
                    .condition_fact()
                    .is_some_and(|cf| !facts.satisfies(cf, types));
                if gated {
                    i += 1;
                    continue;
                }
                if first_active {
                    first_active = false;
                    i += 1;
                    continue;
                }
                if goals[i].is_inactive_for_too_long(now) {
                    changes.removed.push(goals.remove(i));
                    changes.changed = true;
                } else {
                    goals[i].set_inactive_since_if_not_set(now);
                    i += 1;
                }
            }
        }
        self.prune_empty_groups();
        changes
    }

    pub fn set_goals(
        &mut self,
        goals: BTreeMap<i32, Vec<Goal>>,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        if self.goals == goals {
            return GoalChanges::default();
        }
        self.goals = goals;
        let mut changes = GoalChanges {
            changed: true,
            removed: Vec::new(),
        };
        changes.merge(self.sweep(facts, types, now));
        changes
    }

    pub fn set_goals_for_priority(
        &mut self,
        priority: i32,
        goals: Vec<Goal>,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        self.set_goals(BTreeMap::from([(priority, goals)]), facts, types, now)
    }

    /// Stacks goals in front of their priority groups.
    pub fn add_goals(
        &mut self,
        goals: BTreeMap<i32, Vec<Goal>>,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        let mut changes = GoalChanges::default();
        for (priority, new_goals) in goals {
            if new_goals.is_empty() {
                continue;
            }
            let group = self.goals.entry(priority).or_default();
            for (i, goal) in new_goals.into_iter().enumerate() {
                group.insert(i, goal);
            }
            changes.changed = true;
        }
        if changes.changed {
            changes.merge(self.sweep(facts, types, now));
        }
        changes
    }

    pub fn push_front_goal(
        &mut self,
        goal: Goal,
        priority: i32,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        self.goals.entry(priority).or_default().insert(0, goal);
        let mut changes = GoalChanges {
            changed: true,
            removed: Vec::new(),
        };
        changes.merge(self.sweep(facts, types, now));
        changes
    }

    pub fn push_back_goal(
        &mut self,
        goal: Goal,
        priority: i32,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        self.goals.entry(priority).or_default().push(goal);
        let mut changes = GoalChanges {
            changed: true,
            removed: Vec::new(),
        };
        changes.merge(self.sweep(facts, types, now));
        changes
    }

    /// Moves the first goal whose textual form equals `goal_str` to another
    /// priority, in front of or behind the goals already there.
    pub fn change_goal_priority(
        &mut self,
        goal_str: &str,
        new_priority: i32,
        push_front: bool,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        let mut moved: Option<Goal> = None;
        for goals in self.goals.values_mut() {
            if let Some(pos) = goals.iter().position(|g| g.to_string() == goal_str) {
                moved = Some(goals.remove(pos));
                break;
            }
        }
        let mut changes = GoalChanges::default();
        if let Some(goal) = moved {
            let group = self.goals.entry(new_priority).or_default();
            if push_front {
                group.insert(0, goal);
            } else {
                group.push(goal);
            }
            changes.changed = true;
        }
        self.prune_empty_groups();
        if changes.changed {
            changes.merge(self.sweep(facts, types, now));
        }
        changes
    }

    /// Removes every goal carrying the given group identifier.
    pub fn remove_goals(
        &mut self,
        goal_group_id: &str,
        facts: &SetOfFacts,
        types: &SetOfTypes,
        now: Option<Instant>,
    ) -> GoalChanges {
        let mut changes = GoalChanges::default();
        for goals in self.goals.values_mut() {
            let mut i = 0;
            while i < goals.len() {
                if goals[i].goal_group_id() == Some(goal_group_id) {
                    changes.removed.push(goals.remove(i));
                    changes.changed = true;
                } else {
                    i += 1;
                }
            }
        }
        self.prune_empty_groups();
        if changes.changed {
            changes.merge(self.sweep(facts, types, now));
        }
        changes
    }

    /// Removes the first goal whose textual form equals `goal_str`,
    /// looking at the given priority first.
    pub fn remove_first_matching(&mut self, goal_str: &str, priority: i32) -> Option<Goal> {
        if let Some(goals) = self.goals.get_mut(&priority) {
            if let Some(pos) = goals.iter().position(|g| g.to_string() == goal_str) {
                let goal = goals.remove(pos);
                self.prune_empty_groups();
                return Some(goal);
            }
        }
        for goals in self.goals.values_mut() {
            if let Some(pos) = goals.iter().position(|g| g.to_string() == goal_str) {
                let goal = goals.remove(pos);
                self.prune_empty_groups();
                return Some(goal);
            }
        }
        None
    }

    fn prune_empty_groups(&mut self) {
        self.goals.retain(|_, goals| !goals.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra_model::{Condition, Fact, FactOptional, Predicate, SetOfPredicates};
    use std::time::Duration;

    struct Fixture {
        types: SetOfTypes,
        predicates: SetOfPredicates,
    }

    fn fixture() -> Fixture {
        let types = SetOfTypes::new();
        let mut predicates = SetOfPredicates::new();
        for name in ["a", "b", "c", "gate"] {
            predicates.add(Predicate::relation(name, vec![]));
        }
        Fixture { types, predicates }
    }

    fn fact(fx: &Fixture, name: &str) -> Fact {
        Fact::new(&fx.types, fx.predicates.get(name).unwrap(), vec![], None).unwrap()
    }

    fn goal(fx: &Fixture, name: &str) -> Goal {
        Goal::new(Condition::fact(fact(fx, name)))
    }

    #[test]
    fn iteration_is_priority_then_front_to_back() {
        let fx = fixture();
        let facts = SetOfFacts::new();
        let mut stack = GoalStack::new();
        stack.push_back_goal(goal(&fx, "a"), 10, &facts, &fx.types, None);
        stack.push_back_goal(goal(&fx, "b"), 10, &facts, &fx.types, None);
        stack.push_back_goal(goal(&fx, "c"), 20, &facts, &fx.types, None);

        let mut seen = Vec::new();
        stack.iterate_on_goals_and_remove_non_persistent(
            |g, p| {
                seen.push((g.to_string(), p));
                false
            },
            &facts,
            &fx.types,
            None,
        );
        assert_eq!(
            seen,
            vec![("c".to_string(), 20), ("a".to_string(), 10), ("b".to_string(), 10)]
        );
        // nothing was persistent and nothing was committed to
        assert!(stack.is_empty());
    }

    #[test]
    fn committing_stops_the_iteration_and_keeps_the_rest() {
        let fx = fixture();
        let facts = SetOfFacts::new();
        let mut stack = GoalStack::new();
        stack.push_back_goal(goal(&fx, "a"), 10, &facts, &fx.types, None);
        stack.push_back_goal(goal(&fx, "b"), 10, &facts, &fx.types, None);

        stack.iterate_on_goals_and_remove_non_persistent(|_, _| true, &facts, &fx.types, None);
        assert_eq!(stack.goals()[&10].len(), 2);
    }

    #[test]
    fn gated_goals_are_skipped_without_accounting() {
        let fx = fixture();
        let facts = SetOfFacts::new();
        let mut stack = GoalStack::new();
        let gated = goal(&fx, "a")
            .with_condition(FactOptional::positive(fact(&fx, "gate")))
            .with_max_time_to_keep_inactive(0);
        stack.push_back_goal(gated, 20, &facts, &fx.types, None);
        stack.push_back_goal(goal(&fx, "b"), 10, &facts, &fx.types, None);

        let mut seen = Vec::new();
        stack.iterate_on_goals_and_remove_non_persistent(
            |g, _| {
                seen.push(g.to_string());
                true
            },
            &facts,
            &fx.types,
            None,
        );
        // the gated goal was neither handed out nor removed
        assert_eq!(seen, vec!["b".to_string()]);
        assert!(stack.goals().contains_key(&20));
        // its zero inactivity budget did not start running
        assert_eq!(stack.goals()[&20][0].inactive_since(), None);
    }

    #[test]
    fn inactivity_expiry_removes_waiting_goals() {
        let fx = fixture();
        let facts = SetOfFacts::new();
        let t0 = Instant::now();
        let mut stack = GoalStack::new();
        stack.push_back_goal(goal(&fx, "a").persistent(), 10, &facts, &fx.types, Some(t0));
        stack.push_back_goal(
            goal(&fx, "b").with_max_time_to_keep_inactive(60),
            10,
            &facts,
            &fx.types,
            Some(t0),
        );
        // the sweep stamped b as inactive behind a
        assert_eq!(stack.goals()[&10][1].inactive_since(), Some(t0));

        let t100 = t0 + Duration::from_secs(100);
        let mut seen = Vec::new();
        stack.iterate_on_goals_and_remove_non_persistent(
            |g, _| {
                seen.push(g.to_string());
                false
            },
            &facts,
            &fx.types,
            Some(t100),
        );
        // b expired without being handed out
        assert_eq!(seen, vec!["persist(a)".to_string()]);
        assert_eq!(stack.goals()[&10].len(), 1);
    }

    #[test]
    fn group_removal() {
        let fx = fixture();
        let facts = SetOfFacts::new();
        let mut stack = GoalStack::new();
        stack.push_back_goal(goal(&fx, "a").with_group_id("grp"), 10, &facts, &fx.types, None);
        stack.push_back_goal(goal(&fx, "b"), 10, &facts, &fx.types, None);
        stack.push_back_goal(goal(&fx, "c").with_group_id("grp"), 20, &facts, &fx.types, None);

        let changes = stack.remove_goals("grp", &facts, &fx.types, None);
        assert_eq!(changes.removed.len(), 2);
        assert_eq!(stack.goals().len(), 1);
        assert_eq!(stack.goals()[&10][0].to_string(), "b");
    }

    #[test]
    fn priority_change_moves_the_goal() {
        let fx = fixture();
        let facts = SetOfFacts::new();
        let mut stack = GoalStack::new();
        stack.push_back_goal(goal(&fx, "a"), 10, &facts, &fx.types, None);
        stack.push_back_goal(goal(&fx, "b"), 10, &facts, &fx.types, None);

        stack.change_goal_priority("b", 30, true, &facts, &fx.types, None);
        assert_eq!(stack.current_goal().map(|(g, p)| (g.to_string(), p)), Some(("b".to_string(), 30)));
    }
}
