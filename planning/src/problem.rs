use crate::domain::Domain;
use crate::event::full_event_id;
use crate::goal::Goal;
use crate::goal_stack::GoalStack;
use crate::historical::Historical;
use crate::observer::Observers;
use crate::world_state::{WhatChanged, WorldState};
use lyra_model::{Bindings, Entity, Fact, FactOp, Modification, Parameter, SetOfEntities, SetOfFacts};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// A planning situation: the world state, the goals motivating the agent,
/// the problem-local entities and the invocation historical.
///
/// Every mutation funnels through the same pipeline: apply the fact
/// operations, fire the domain events to a fixed point, sweep the goal
/// stack, then emit notifications. Cloning a problem (plan simulation)
/// resets the observers and detaches the historical mirror.
#[derive(Debug, Default, Clone)]
pub struct Problem {
    pub world_state: WorldState,
    pub goal_stack: GoalStack,
    pub historical: Historical,
    pub entities: SetOfEntities,
    pub observers: Observers,
}

fn binding_key(assignment: &BTreeMap<Parameter, Entity>) -> String {
    assignment
        .iter()
        .map(|(p, e)| format!("{p}={e}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether applying the operations would actually change the store.
pub(crate) fn ops_would_change(facts: &SetOfFacts, ops: &[FactOp]) -> bool {
    ops.iter().any(|op| match op {
        FactOp::Add(fact) => !fact.is_punctual() && !facts.contains(fact),
        FactOp::Remove(fact) => {
            if fact.is_complete_with_any_value() {
                facts.find_with_arguments(fact).is_some()
            } else {
                facts.contains(fact)
            }
        }
    })
}

impl Problem {
    pub fn new() -> Self {
        Problem {
            world_state: WorldState::new(),
            ..Default::default()
        }
    }

    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.add(entity);
    }

    /* ------------------------------ facts -------------------------------- */

    pub fn add_fact(&mut self, fact: Fact, domain: &Domain, now: Option<Instant>) -> bool {
        self.add_facts(std::iter::once(fact), domain, now)
    }

    pub fn add_facts(
        &mut self,
        facts: impl IntoIterator<Item = Fact>,
        domain: &Domain,
        now: Option<Instant>,
    ) -> bool {
        let mut wc = WhatChanged::default();
        for fact in facts {
            self.world_state.add_fact_raw(fact, &mut wc);
        }
        self.finish_mutation(domain, now, &mut wc);
        wc.has_fact_changes()
    }

    pub fn remove_fact(&mut self, fact: &Fact, domain: &Domain, now: Option<Instant>) -> bool {
        let mut wc = WhatChanged::default();
        self.world_state.remove_fact_raw(fact, &mut wc);
        self.finish_mutation(domain, now, &mut wc);
        wc.has_fact_changes()
    }

    pub fn set_facts(&mut self, facts: SetOfFacts, domain: &Domain, now: Option<Instant>) {
        let mut wc = WhatChanged::default();
        self.world_state.set_facts(facts, &mut wc);
        self.finish_mutation(domain, now, &mut wc);
    }

    /// Applies a world-state modification to the problem.
    pub fn modify(&mut self, modification: &Modification, domain: &Domain, now: Option<Instant>) -> bool {
        self.modify_with_substitution(modification, &BTreeMap::new(), domain, now)
    }

    pub fn modify_with_substitution(
        &mut self,
        modification: &Modification,
        substitution: &BTreeMap<Parameter, Entity>,
        domain: &Domain,
        now: Option<Instant>,
    ) -> bool {
        let ops = {
            let ctx = self.world_state.eval_ctx(domain, &self.entities, None);
            modification.evaluate(&ctx, substitution)
        };
        let mut wc = WhatChanged::default();
        self.world_state.apply_ops(&ops, &mut wc);
        self.finish_mutation(domain, now, &mut wc);
        wc.has_fact_changes()
    }

    /* ------------------------------ goals -------------------------------- */

    pub fn set_goals(
        &mut self,
        goals: BTreeMap<i32, Vec<Goal>>,
        domain: &Domain,
        now: Option<Instant>,
    ) {
        let changes =
            self.goal_stack
                .set_goals(goals, self.world_state.facts(), &domain.ontology().types, now);
        self.notify_goal_changes(changes.changed, now);
    }

    pub fn set_goals_for_priority(
        &mut self,
        priority: i32,
        goals: Vec<Goal>,
        domain: &Domain,
        now: Option<Instant>,
    ) {
        self.set_goals(BTreeMap::from([(priority, goals)]), domain, now);
    }

    pub fn add_goals(&mut self, goals: BTreeMap<i32, Vec<Goal>>, domain: &Domain, now: Option<Instant>) {
        let changes =
            self.goal_stack
                .add_goals(goals, self.world_state.facts(), &domain.ontology().types, now);
        self.notify_goal_changes(changes.changed, now);
    }

    pub fn push_front_goal(&mut self, goal: Goal, priority: i32, domain: &Domain, now: Option<Instant>) {
        let changes = self.goal_stack.push_front_goal(
            goal,
            priority,
            self.world_state.facts(),
            &domain.ontology().types,
            now,
        );
        self.notify_goal_changes(changes.changed, now);
    }

    pub fn push_back_goal(&mut self, goal: Goal, priority: i32, domain: &Domain, now: Option<Instant>) {
        let changes = self.goal_stack.push_back_goal(
            goal,
            priority,
            self.world_state.facts(),
            &domain.ontology().types,
            now,
        );
        self.notify_goal_changes(changes.changed, now);
    }

    pub fn change_goal_priority(
        &mut self,
        goal_str: &str,
        new_priority: i32,
        push_front: bool,
        domain: &Domain,
        now: Option<Instant>,
    ) {
        let changes = self.goal_stack.change_goal_priority(
            goal_str,
            new_priority,
            push_front,
            self.world_state.facts(),
            &domain.ontology().types,
            now,
        );
        self.notify_goal_changes(changes.changed, now);
    }

    pub fn remove_goals(&mut self, goal_group_id: &str, domain: &Domain, now: Option<Instant>) {
        let changes = self.goal_stack.remove_goals(
            goal_group_id,
            self.world_state.facts(),
            &domain.ontology().types,
            now,
        );
        self.notify_goal_changes(changes.changed, now);
    }

    /// Drops satisfied goals from the top of the stack until the first
    /// unsatisfied one.
    pub fn remove_first_goals_that_are_already_satisfied(&mut self, domain: &Domain, now: Option<Instant>) {
        let world_state = &self.world_state;
        let entities = &self.entities;
        let changes = self.goal_stack.iterate_on_goals_and_remove_non_persistent(
            |goal, _| {
                let ctx = world_state.eval_ctx(domain, entities, None);
                !goal.objective().is_true(&ctx, None)
            },
            world_state.facts(),
            &domain.ontology().types,
            now,
        );
        self.notify_goal_changes(changes.changed, now);
    }

    /* --------------------------- change pipeline -------------------------- */

    /// Fires events to a fixed point, sweeps the goal stack and emits the
    /// notifications for an already-applied mutation.
    pub(crate) fn finish_mutation(&mut self, domain: &Domain, now: Option<Instant>, wc: &mut WhatChanged) {
        if wc.has_fact_changes() || !wc.punctual.is_empty() {
            self.fire_events(domain, now, wc);
            let changes = self.goal_stack.remove_no_stackable_goals(
                self.world_state.facts(),
                &domain.ontology().types,
                now,
            );
            wc.merge_goal_changes(changes);
        }
        self.notify(wc);
    }

    /// Runs the forward-chaining loop: every event whose precondition
    /// holds fires at most once per parameter binding per outer call,
    /// sets iterated in identifier order for determinism.
    fn fire_events(&mut self, domain: &Domain, now: Option<Instant>, wc: &mut WhatChanged) {
        let mut fired: BTreeSet<(String, String)> = BTreeSet::new();
        loop {
            let mut fired_this_round = false;
            let punctual_snapshot = wc.punctual.clone();

            let mut candidates: Vec<String> = Vec::new();
            for (set_id, set) in domain.set_of_events() {
                let mut event_ids: BTreeSet<String> = BTreeSet::new();
                for fact in punctual_snapshot.iter().chain(&wc.added) {
                    event_ids.extend(set.events_triggered_by(fact).into_iter().cloned());
                }
                for fact in &wc.removed {
                    event_ids.extend(set.events_triggered_by_removal(fact).into_iter().cloned());
                }
                candidates.extend(event_ids.into_iter().map(|id| full_event_id(set_id, &id)));
            }

            for full_id in candidates {
                let Some(event) = domain.event(&full_id) else {
                    continue;
                };
                let assignments = {
                    let ctx = self
                        .world_state
                        .eval_ctx(domain, &self.entities, Some(&punctual_snapshot));
                    let mut bindings = Bindings::from_parameters(&event.parameters);
                    if !event.precondition.is_true(&ctx, Some(&mut bindings)) {
                        continue;
                    }
                    if event.parameters.is_empty() {
                        vec![BTreeMap::new()]
                    } else {
                        // only fully grounded, re-verified assignments fire
                        bindings
                            .unfold()
                            .into_iter()
                            .filter(|a| event.parameters.iter().all(|p| a.contains_key(p)))
                            .filter(|a| event.precondition.substitute(a).is_true(&ctx, None))
                            .collect()
                    }
                };
                for assignment in assignments {
                    let key = (full_id.clone(), binding_key(&assignment));
                    let ops = {
                        let ctx = self
                            .world_state
                            .eval_ctx(domain, &self.entities, Some(&punctual_snapshot));
                        event
                            .facts_to_modify
                            .as_ref()
                            .map(|m| m.evaluate(&ctx, &assignment))
                            .unwrap_or_default()
                    };
                    if fired.contains(&key) {
                        if ops_would_change(self.world_state.facts(), &ops) {
                            tracing::warn!(event = %full_id, "event loop divergence detected, breaking the cycle");
                        }
                        continue;
                    }
                    fired.insert(key);
                    fired_this_round = true;
                    self.world_state.apply_ops(&ops, wc);
                    if !event.goals_to_add.is_empty() {
                        let goals: BTreeMap<i32, Vec<Goal>> = event
                            .goals_to_add
                            .iter()
                            .map(|(p, gs)| (*p, gs.iter().map(|g| g.substitute(&assignment)).collect()))
                            .collect();
                        let changes = self.goal_stack.add_goals(
                            goals,
                            self.world_state.facts(),
                            &domain.ontology().types,
                            now,
                        );
                        wc.goals_changed = true;
                        wc.merge_goal_changes(changes);
                    }
                }
            }

            if !fired_this_round {
                break;
            }
        }
    }

    fn notify_goal_changes(&mut self, changed: bool, _now: Option<Instant>) {
        if changed {
            let goals_image = self.goal_stack.goals().clone();
            self.observers.on_goals_changed.emit(&goals_image);
        }
    }

    /// Emits the change set, in the documented order.
    fn notify(&mut self, wc: &WhatChanged) {
        if !wc.something_changed() {
            return;
        }
        if !wc.added.is_empty() {
            self.observers.on_facts_added.emit(&wc.added);
        }
        if !wc.removed.is_empty() {
            self.observers.on_facts_removed.emit(&wc.removed);
        }
        if !wc.punctual.is_empty() {
            self.observers.on_punctual_facts.emit(&wc.punctual);
        }
        if wc.has_fact_changes() {
            let facts_image = self.world_state.facts().clone();
            self.observers.on_facts_changed.emit(&facts_image);
        }
        if wc.goals_changed {
            let goals_image = self.goal_stack.goals().clone();
            self.observers.on_goals_changed.emit(&goals_image);
        }
    }
}
