use crate::domain::Domain;
use crate::goal::Goal;
use crate::goal_stack::GoalChanges;
use lyra_model::{Condition, EvalContext, Fact, FactOp, SetOfEntities, SetOfFacts, SetOfTypes};
use std::collections::BTreeSet;

/* ========================================================================== */
/*                                 Change set                                 */
/* ========================================================================== */

/// Everything a mutation changed, accumulated through the event-firing
/// fixed point and handed to the notification sinks afterwards.
#[derive(Debug, Default)]
pub struct WhatChanged {
    pub added: BTreeSet<Fact>,
    pub removed: BTreeSet<Fact>,
    /// Observed during this cycle only, never stored.
    pub punctual: BTreeSet<Fact>,
    pub goals_changed: bool,
    pub removed_goals: Vec<Goal>,
}

impl WhatChanged {
    pub fn has_fact_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn something_changed(&self) -> bool {
        self.has_fact_changes() || !self.punctual.is_empty() || self.goals_changed
    }

    pub fn merge_goal_changes(&mut self, changes: GoalChanges) {
        self.goals_changed |= changes.changed;
        self.removed_goals.extend(changes.removed);
    }
}

/* ========================================================================== */
/*                                World state                                 */
/* ========================================================================== */

/// The fact store plus the reachability caches built lazily from a domain:
/// which facts could become true (or false) through some action or event
/// sequence starting from the current state.
///
/// Any mutation of the fact set invalidates the caches coarsely.
#[derive(Debug, Clone)]
pub struct WorldState {
    facts: SetOfFacts,
    accessible_facts: BTreeSet<Fact>,
    accessible_facts_with_any: Vec<Fact>,
    removable_facts: BTreeSet<Fact>,
    removable_facts_with_any: Vec<Fact>,
    needs_refresh: bool,
}

impl Default for WorldState {
    fn default() -> Self {
        WorldState {
            facts: SetOfFacts::new(),
            accessible_facts: BTreeSet::new(),
            accessible_facts_with_any: Vec::new(),
            removable_facts: BTreeSet::new(),
            removable_facts_with_any: Vec::new(),
            needs_refresh: true,
        }
    }
}

/// Every parameter occurrence replaced by the any-value wildcard.
/// Returns the widened fact and whether anything was widened.
fn widen_all_parameters(fact: &Fact) -> (Fact, bool) {
    let parameters: Vec<_> = fact
        .arguments()
        .iter()
        .chain(fact.value())
        .filter(|e| e.is_parameter())
        .map(|e| e.to_parameter())
        .collect();
    let mut widened = fact.clone();
    let changed = widened.widen_parameters_to_any(&parameters);
    (widened, changed)
}

impl WorldState {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn facts(&self) -> &SetOfFacts {
        &self.facts
    }

    pub fn has_fact(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    /// Adds a fact, maintaining the functional-fluent invariant: a bound
    /// value for the same argument tuple is removed first. Punctual facts
    /// are routed to the change set without being stored. Returns false
    /// when the store was left untouched.
    pub fn add_fact_raw(&mut self, fact: Fact, what_changed: &mut WhatChanged) -> bool {
        if fact.is_punctual() {
            what_changed.punctual.insert(fact);
            return true;
        }
        if self.facts.contains(&fact) {
            return false;
        }
        if let Some(conflict) = self.facts.fluent_conflict(&fact) {
            self.facts.remove(&conflict);
            what_changed.removed.insert(conflict);
        }
        self.facts.insert(fact.clone());
        what_changed.added.insert(fact);
        self.invalidate_reachable();
        true
    }

    /// Removes a fact. A fact whose fluent slot is the wildcard removes
    /// whatever value is bound for its argument tuple.
    pub fn remove_fact_raw(&mut self, fact: &Fact, what_changed: &mut WhatChanged) -> bool {
        let target = if fact.is_complete_with_any_value() {
            match self.facts.find_with_arguments(fact) {
                Some(stored) => stored.clone(),
                None => return false,
            }
        } else {
            fact.clone()
        };
        if !self.facts.remove(&target) {
            return false;
        }
        what_changed.removed.insert(target);
        self.invalidate_reachable();
        true
    }

    pub fn apply_op(&mut self, op: &FactOp, what_changed: &mut WhatChanged) -> bool {
        match op {
            FactOp::Add(fact) => self.add_fact_raw(fact.clone(), what_changed),
            FactOp::Remove(fact) => self.remove_fact_raw(fact, what_changed),
        }
    }

    pub fn apply_ops(&mut self, ops: &[FactOp], what_changed: &mut WhatChanged) -> bool {
        let mut changed = false;
        for op in ops {
            changed |= self.apply_op(op, what_changed);
        }
        changed
    }

    /// Replaces the whole fact store, reporting the differences.
    pub fn set_facts(&mut self, facts: SetOfFacts, what_changed: &mut WhatChanged) {
        if self.facts == facts {
            return;
        }
        for fact in self.facts.iter() {
            if !facts.contains(fact) {
                what_changed.removed.insert(fact.clone());
            }
        }
        for fact in facts.iter() {
            if !self.facts.contains(fact) {
                what_changed.added.insert(fact.clone());
            }
        }
        self.facts = facts;
        self.invalidate_reachable();
    }

    pub fn invalidate_reachable(&mut self) {
        self.needs_refresh = true;
        self.accessible_facts.clear();
        self.accessible_facts_with_any.clear();
        self.removable_facts.clear();
        self.removable_facts_with_any.clear();
    }

    /* ------------------------------ reachability ------------------------- */

    /// Saturates the reachability caches: starting from the currently true
    /// facts, repeatedly folds in the effect templates of every action and
    /// event whose precondition could become true.
    pub fn refresh_reachable_if_needed(&mut self, domain: &Domain, entities: &SetOfEntities) {
        if !self.needs_refresh {
            return;
        }
        self.needs_refresh = false;

        let seeds: Vec<Fact> = self.facts.iter().cloned().collect();
        for fact in &seeds {
            let action_ids: Vec<String> = domain
                .precondition_to_actions()
                .find(fact, true)
                .into_iter()
                .cloned()
                .collect();
            for id in action_ids {
                self.feed_from_action(&id, domain, entities);
            }
            let event_ids: Vec<String> = domain
                .set_of_events()
                .iter()
                .flat_map(|(set_id, set)| {
                    set.events_triggered_by(fact)
                        .into_iter()
                        .map(move |eid| crate::event::full_event_id(set_id, eid))
                })
                .collect();
            for id in event_ids {
                self.feed_from_event(&id, domain, entities);
            }
        }
        let no_precondition: Vec<String> = domain.actions_without_precondition().to_vec();
        for id in no_precondition {
            self.feed_from_action(&id, domain, entities);
        }
    }

    fn feed_from_action(&mut self, action_id: &str, domain: &Domain, entities: &SetOfEntities) {
        let Some(action) = domain.get_action(action_id) else {
            return;
        };
        if let Some(pre) = &action.precondition {
            if !self.condition_can_become_true(pre, domain, entities) {
                return;
            }
        }
        let templates = action.effect.fact_templates();
        self.absorb_templates(templates, domain, entities);
    }

    fn feed_from_event(&mut self, full_id: &str, domain: &Domain, entities: &SetOfEntities) {
        let Some(event) = domain.event(full_id) else {
            return;
        };
        if !self.condition_can_become_true(&event.precondition, domain, entities) {
            return;
        }
        if let Some(m) = &event.facts_to_modify {
            self.absorb_templates(m.fact_templates(), domain, entities);
        }
    }

    fn absorb_templates(
        &mut self,
        templates: lyra_model::FactTemplates,
        domain: &Domain,
        entities: &SetOfEntities,
    ) {
        let mut newly_accessible = Vec::new();
        let mut newly_removable = Vec::new();
        for template in &templates.added {
            let (widened, has_any) = widen_all_parameters(template);
            let has_any = has_any || widened.is_complete_with_any_value();
            if has_any {
                if !self.accessible_facts_with_any.contains(&widened) {
                    self.accessible_facts_with_any.push(widened.clone());
                    newly_accessible.push(widened);
                }
            } else if !self.facts.contains(&widened) && self.accessible_facts.insert(widened.clone()) {
                newly_accessible.push(widened);
            }
        }
        for template in &templates.removed {
            let (widened, has_any) = widen_all_parameters(template);
            let has_any = has_any || widened.is_complete_with_any_value();
            if has_any {
                if !self.removable_facts_with_any.contains(&widened) {
                    self.removable_facts_with_any.push(widened.clone());
                    newly_removable.push(widened);
                }
            } else if self.removable_facts.insert(widened.clone()) {
                newly_removable.push(widened);
            }
        }

        // monotone propagation from every newly reachable fact
        for fact in newly_accessible {
            let action_ids: Vec<String> = domain
                .precondition_to_actions()
                .find(&fact, true)
                .into_iter()
                .cloned()
                .collect();
            for id in action_ids {
                self.feed_from_action(&id, domain, entities);
            }
            let event_ids: Vec<String> = domain
                .set_of_events()
                .iter()
                .flat_map(|(set_id, set)| {
                    set.events_triggered_by(&fact)
                        .into_iter()
                        .map(move |eid| crate::event::full_event_id(set_id, eid))
                })
                .collect();
            for id in event_ids {
                self.feed_from_event(&id, domain, entities);
            }
        }
        for fact in newly_removable {
            let action_ids: Vec<String> = domain
                .not_precondition_to_actions()
                .find(&fact, true)
                .into_iter()
                .cloned()
                .collect();
            for id in action_ids {
                self.feed_from_action(&id, domain, entities);
            }
            let event_ids: Vec<String> = domain
                .set_of_events()
                .iter()
                .flat_map(|(set_id, set)| {
                    set.events_triggered_by_removal(&fact)
                        .into_iter()
                        .map(move |eid| crate::event::full_event_id(set_id, eid))
                })
                .collect();
            for id in event_ids {
                self.feed_from_event(&id, domain, entities);
            }
        }
    }

    /// Whether a fact could become true: it already is, or some reachable
    /// effect produces it.
    pub fn can_fact_become_true(&self, fact: &Fact, types: &SetOfTypes) -> bool {
        let (widened, _) = widen_all_parameters(fact);
        if widened
            .is_in_facts(self.facts.facts_with_name(widened.name()), types, None, false)
            .is_some()
        {
            return true;
        }
        if widened
            .is_in_facts(
                self.accessible_facts.iter().filter(|f| f.name() == widened.name()),
                types,
                None,
                false,
            )
            .is_some()
        {
            return true;
        }
        widened
            .is_in_facts(
                self.accessible_facts_with_any.iter().filter(|f| f.name() == widened.name()),
                types,
                None,
                false,
            )
            .is_some()
    }

    /// Whether a fact could stop being true.
    pub fn can_fact_become_false(&self, fact: &Fact, types: &SetOfTypes) -> bool {
        let (widened, _) = widen_all_parameters(fact);
        if widened
            .is_in_facts(self.facts.facts_with_name(widened.name()), types, None, false)
            .is_none()
        {
            return true;
        }
        if widened
            .is_in_facts(
                self.removable_facts.iter().filter(|f| f.name() == widened.name()),
                types,
                None,
                false,
            )
            .is_some()
        {
            return true;
        }
        widened
            .is_in_facts(
                self.removable_facts_with_any.iter().filter(|f| f.name() == widened.name()),
                types,
                None,
                false,
            )
            .is_some()
    }

    /// Conservative reachability of a whole condition. The caches must be
    /// refreshed first.
    pub fn condition_can_become_true(
        &self,
        condition: &Condition,
        domain: &Domain,
        entities: &SetOfEntities,
    ) -> bool {
        let types = &domain.ontology().types;
        match condition {
            Condition::Fact(fo) => {
                if fo.is_negated {
                    self.can_fact_become_false(&fo.fact, types)
                } else {
                    self.can_fact_become_true(&fo.fact, types)
                }
            }
            Condition::Not(inner) => match inner.as_ref() {
                Condition::Fact(fo) => {
                    if fo.is_negated {
                        self.can_fact_become_true(&fo.fact, types)
                    } else {
                        self.can_fact_become_false(&fo.fact, types)
                    }
                }
                // no cheap refutation for deeper negations
                _ => true,
            },
            Condition::And(items) => items
                .iter()
                .all(|c| self.condition_can_become_true(c, domain, entities)),
            Condition::Or(items) => items
                .iter()
                .any(|c| self.condition_can_become_true(c, domain, entities)),
            Condition::Exists(_, inner) => self.condition_can_become_true(inner, domain, entities),
            Condition::Equality(_, _, _) => {
                let mut reachable = true;
                condition.for_each_fact(&mut |fact, positive| {
                    if positive && !self.can_fact_become_true(fact, types) {
                        reachable = false;
                    }
                });
                reachable
            }
        }
    }

    /// Evaluation context over this world state.
    pub fn eval_ctx<'a>(
        &'a self,
        domain: &'a Domain,
        entities: &'a SetOfEntities,
        punctual: Option<&'a BTreeSet<Fact>>,
    ) -> EvalContext<'a> {
        EvalContext {
            types: &domain.ontology().types,
            facts: &self.facts,
            constants: &domain.ontology().constants,
            entities,
            punctual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use lyra_model::{Entity, Modification, Ontology, Predicate};

    fn relation(ontology: &mut Ontology, name: &str) -> Fact {
        let predicate = ontology.predicates.add(Predicate::relation(name, vec![]));
        Fact::new(&ontology.types, predicate, vec![], None).unwrap()
    }

    #[test]
    fn functional_fluents_stay_single_valued() {
        let mut ontology = Ontology::new();
        let location = ontology.types.add("location", None).unwrap();
        let at = ontology
            .predicates
            .add(Predicate::fluent("at", vec![], location));
        let at_fact = |l: &str| {
            Fact::new(
                &ontology.types,
                at.clone(),
                vec![],
                Some(Entity::new(l, location)),
            )
            .unwrap()
        };

        let mut ws = WorldState::new();
        let mut wc = WhatChanged::default();
        assert!(ws.add_fact_raw(at_fact("kitchen"), &mut wc));
        assert!(ws.add_fact_raw(at_fact("bedroom"), &mut wc));
        assert_eq!(ws.facts().count_of("at"), 1);
        assert!(ws.has_fact(&at_fact("bedroom")));
        assert!(wc.removed.contains(&at_fact("kitchen")));
    }

    #[test]
    fn punctual_facts_are_routed_and_never_stored() {
        let mut ontology = Ontology::new();
        let punctual = relation(&mut ontology, "~user_spoke");

        let mut ws = WorldState::new();
        let mut wc = WhatChanged::default();
        assert!(ws.add_fact_raw(punctual.clone(), &mut wc));
        assert!(ws.facts().is_empty());
        assert!(wc.punctual.contains(&punctual));
    }

    #[test]
    fn wildcard_removal_unbinds_the_fluent() {
        let mut ontology = Ontology::new();
        let location = ontology.types.add("location", None).unwrap();
        let at = ontology
            .predicates
            .add(Predicate::fluent("at", vec![], location));
        let bound = Fact::new(
            &ontology.types,
            at.clone(),
            vec![],
            Some(Entity::new("kitchen", location)),
        )
        .unwrap();
        let any = bound.clone().with_value(Some(Entity::any_value(location)));

        let mut ws = WorldState::new();
        let mut wc = WhatChanged::default();
        ws.add_fact_raw(bound.clone(), &mut wc);
        assert!(ws.remove_fact_raw(&any, &mut wc));
        assert!(ws.facts().is_empty());
        assert!(wc.removed.contains(&bound));
    }

    #[test]
    fn reachability_follows_action_chains() {
        let mut ontology = Ontology::new();
        let greeted = relation(&mut ontology, "greeted");
        let checked_in = relation(&mut ontology, "checked_in");
        let unreachable = relation(&mut ontology, "never_true");

        let domain = Domain::with_actions(
            "reception",
            ontology,
            [
                (
                    "greet".to_string(),
                    Action::new(None, Modification::add(greeted.clone())),
                ),
                (
                    "check_in".to_string(),
                    Action::new(
                        Some(Condition::fact(greeted.clone())),
                        Modification::add(checked_in.clone()),
                    ),
                ),
            ],
        )
        .unwrap();

        let entities = SetOfEntities::new();
        let mut ws = WorldState::new();
        ws.refresh_reachable_if_needed(&domain, &entities);
        let types = &domain.ontology().types;
        assert!(ws.can_fact_become_true(&greeted, types));
        assert!(ws.can_fact_become_true(&checked_in, types));
        assert!(!ws.can_fact_become_true(&unreachable, types));
    }
}
