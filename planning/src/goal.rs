use crate::action::ActionId;
use crate::domain::Domain;
use crate::event::FullEventId;
use lyra_model::{Condition, Entity, FactOptional, Parameter};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// A characteristic the world should have: the motivation for acting.
#[derive(Debug, Clone)]
pub struct Goal {
    objective: Condition,
    /// Kept on the stack when satisfied or skipped, instead of being popped.
    is_persistent: bool,
    /// Dropped after the first productive step taken toward it.
    one_step_towards: bool,
    /// Gate: while this fact does not hold, the goal is ignored without any
    /// inactivity accounting.
    condition_fact: Option<FactOptional>,
    /// Maximum continuous inactivity in seconds; negative means infinite.
    max_time_to_keep_inactive: i32,
    goal_group_id: Option<String>,
    inactive_since: Option<Instant>,
    cache: GoalCache,
}

/// Per-goal satisfier and predecessor sets, valid for a single domain uuid.
#[derive(Debug, Clone, Default)]
struct GoalCache {
    domain_uuid: Option<String>,
    satisfier_actions: BTreeSet<ActionId>,
    satisfier_events: BTreeSet<FullEventId>,
    action_predecessors: BTreeSet<ActionId>,
    event_predecessors: BTreeSet<FullEventId>,
}

impl Goal {
    pub fn new(objective: Condition) -> Goal {
        Goal {
            objective,
            is_persistent: false,
            one_step_towards: false,
            condition_fact: None,
            max_time_to_keep_inactive: -1,
            goal_group_id: None,
            inactive_since: None,
            cache: Default::default(),
        }
    }

    /// `persist(g)`: keep the goal after it is satisfied or skipped.
    pub fn persistent(mut self) -> Goal {
        self.is_persistent = true;
        self
    }

    /// `oneStepTowards(g)`: drop the goal after one productive step.
    pub fn one_step_towards(mut self) -> Goal {
        self.one_step_towards = true;
        self
    }

    /// `imply(c, g)`: only consider the goal while `c` holds.
    pub fn with_condition(mut self, condition_fact: FactOptional) -> Goal {
        self.condition_fact = Some(condition_fact);
        self
    }

    pub fn with_max_time_to_keep_inactive(mut self, seconds: i32) -> Goal {
        self.max_time_to_keep_inactive = seconds;
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Goal {
        self.goal_group_id = Some(group_id.into());
        self
    }

    /// Clone with parameter occurrences substituted in the objective and in
    /// the gating fact.
    pub fn substitute(&self, substitution: &BTreeMap<Parameter, Entity>) -> Goal {
        Goal {
            objective: self.objective.substitute(substitution),
            condition_fact: self
                .condition_fact
                .as_ref()
                .map(|fo| fo.replace_arguments(substitution)),
            cache: Default::default(),
            ..self.clone()
        }
    }

    pub fn objective(&self) -> &Condition {
        &self.objective
    }

    pub fn is_persistent(&self) -> bool {
        self.is_persistent
    }

    pub fn is_one_step_towards(&self) -> bool {
        self.one_step_towards
    }

    pub fn condition_fact(&self) -> Option<&FactOptional> {
        self.condition_fact.as_ref()
    }

    pub fn goal_group_id(&self) -> Option<&str> {
        self.goal_group_id.as_deref()
    }

    pub fn max_time_to_keep_inactive(&self) -> i32 {
        self.max_time_to_keep_inactive
    }

    pub fn inactive_since(&self) -> Option<Instant> {
        self.inactive_since
    }

    /// Stamps the start of an inactivity stretch; an existing stamp is
    /// preserved.
    pub fn set_inactive_since_if_not_set(&mut self, now: Option<Instant>) {
        if self.inactive_since.is_none() {
            self.inactive_since = now;
        }
    }

    /// Clears the inactivity stamp.
    pub fn notify_activity(&mut self) {
        self.inactive_since = None;
    }

    /// Whether the goal has spent more than its inactivity budget
    /// continuously inactive.
    pub fn is_inactive_for_too_long(&self, now: Option<Instant>) -> bool {
        if self.max_time_to_keep_inactive < 0 {
            return false;
        }
        match (self.inactive_since, now) {
            (Some(since), Some(now)) => {
                now.saturating_duration_since(since).as_secs() > self.max_time_to_keep_inactive as u64
            }
            _ => false,
        }
    }

    /// Rebuilds the satisfier and predecessor caches when the domain
    /// changed since they were last computed.
    pub fn refresh_if_needed(&mut self, domain: &Domain) {
        if self.cache.domain_uuid.as_deref() == Some(domain.uuid()) {
            return;
        }
        let (satisfier_actions, satisfier_events) = domain.satisfiers_of(&self.objective);
        let (action_predecessors, event_predecessors) =
            domain.predecessor_closure(&satisfier_actions, &satisfier_events);
        self.cache = GoalCache {
            domain_uuid: Some(domain.uuid().to_string()),
            satisfier_actions,
            satisfier_events,
            action_predecessors,
            event_predecessors,
        };
    }

    /// Whether the action's effect can directly satisfy this goal.
    pub fn can_action_satisfy(&self, action_id: &str) -> bool {
        self.cache.satisfier_actions.contains(action_id)
    }

    /// Whether the event's modification can directly satisfy this goal.
    pub fn can_event_satisfy(&self, full_event_id: &str) -> bool {
        self.cache.satisfier_events.contains(full_event_id)
    }

    /// Actions that can contribute to this goal, directly or transitively.
    pub fn actions_predecessors(&self) -> &BTreeSet<ActionId> {
        &self.cache.action_predecessors
    }

    /// Events that can contribute to this goal, directly or transitively.
    pub fn events_predecessors(&self) -> &BTreeSet<FullEventId> {
        &self.cache.event_predecessors
    }
}

impl PartialEq for Goal {
    fn eq(&self, other: &Self) -> bool {
        self.objective == other.objective
            && self.is_persistent == other.is_persistent
            && self.one_step_towards == other.one_step_towards
            && self.condition_fact == other.condition_fact
            && self.max_time_to_keep_inactive == other.max_time_to_keep_inactive
            && self.goal_group_id == other.goal_group_id
    }
}
impl Eq for Goal {}

impl Display for Goal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut inner = self.objective.to_string();
        if let Some(cond) = &self.condition_fact {
            inner = format!("imply({cond}, {inner})");
        }
        if self.one_step_towards {
            inner = format!("oneStepTowards({inner})");
        }
        if self.is_persistent {
            inner = format!("persist({inner})");
        }
        write!(f, "{inner}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra_model::{Fact, Predicate, SetOfPredicates, SetOfTypes};
    use std::time::Duration;

    fn simple_goal() -> Goal {
        let types = SetOfTypes::new();
        let mut predicates = SetOfPredicates::new();
        let p = predicates.add(Predicate::relation("checked_in", vec![]));
        Goal::new(Condition::fact(Fact::new(&types, p, vec![], None).unwrap()))
    }

    #[test]
    fn inactivity_budget() {
        let t0 = Instant::now();
        let mut goal = simple_goal().with_max_time_to_keep_inactive(60);
        assert!(!goal.is_inactive_for_too_long(Some(t0)));

        goal.set_inactive_since_if_not_set(Some(t0));
        assert!(!goal.is_inactive_for_too_long(Some(t0 + Duration::from_secs(60))));
        assert!(goal.is_inactive_for_too_long(Some(t0 + Duration::from_secs(100))));

        // the first stamp is preserved
        goal.set_inactive_since_if_not_set(Some(t0 + Duration::from_secs(90)));
        assert_eq!(goal.inactive_since(), Some(t0));

        goal.notify_activity();
        assert!(!goal.is_inactive_for_too_long(Some(t0 + Duration::from_secs(100))));
    }

    #[test]
    fn negative_budget_means_infinite_patience() {
        let t0 = Instant::now();
        let mut goal = simple_goal();
        goal.set_inactive_since_if_not_set(Some(t0));
        assert!(!goal.is_inactive_for_too_long(Some(t0 + Duration::from_secs(1_000_000))));
    }

    #[test]
    fn textual_form_carries_the_wrappers() {
        let goal = simple_goal().persistent().one_step_towards();
        assert_eq!(goal.to_string(), "persist(oneStepTowards(checked_in))");
    }
}
