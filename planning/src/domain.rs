use crate::action::{Action, ActionId};
use crate::event::{full_event_id, Axiom, Event, FullEventId, SetOfEvents, SetOfEventsId};
use crate::fact_index::FactIndex;
use anyhow::Result;
use lyra_model::{Condition, Fact, Ontology};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

static UUID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_uuid(name: &str) -> String {
    format!("{name}-{}", UUID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Producers able to enable a consumer: actions and events whose effect
/// can feed one of its precondition facts.
#[derive(Debug, Clone, Default)]
pub struct Predecessors {
    pub actions: BTreeSet<ActionId>,
    pub events: BTreeSet<FullEventId>,
}

/// Everything the agent can do and infer, with the indices and succession
/// caches the planner searches through.
///
/// Every structural mutation regenerates the uuid; per-goal caches keyed on
/// it rebuild themselves lazily on the next access.
#[derive(Debug, Clone)]
pub struct Domain {
    name: String,
    uuid: String,
    ontology: Ontology,
    actions: BTreeMap<ActionId, Action>,
    set_of_events: BTreeMap<SetOfEventsId, SetOfEvents>,
    requirements: BTreeSet<String>,

    precondition_to_actions: FactIndex<ActionId>,
    not_precondition_to_actions: FactIndex<ActionId>,
    actions_without_precondition: Vec<ActionId>,
    effect_to_actions: FactIndex<ActionId>,
    not_effect_to_actions: FactIndex<ActionId>,
    effect_to_events: FactIndex<FullEventId>,
    not_effect_to_events: FactIndex<FullEventId>,
    action_predecessors: BTreeMap<ActionId, Predecessors>,
    event_predecessors: BTreeMap<FullEventId, Predecessors>,
}

impl Domain {
    pub fn new(name: impl Into<String>, ontology: Ontology) -> Domain {
        let name = name.into();
        let mut domain = Domain {
            uuid: next_uuid(&name),
            name,
            ontology,
            actions: BTreeMap::new(),
            set_of_events: BTreeMap::new(),
            requirements: BTreeSet::new(),
            precondition_to_actions: FactIndex::new(),
            not_precondition_to_actions: FactIndex::new(),
            actions_without_precondition: Vec::new(),
            effect_to_actions: FactIndex::new(),
            not_effect_to_actions: FactIndex::new(),
            effect_to_events: FactIndex::new(),
            not_effect_to_events: FactIndex::new(),
            action_predecessors: BTreeMap::new(),
            event_predecessors: BTreeMap::new(),
        };
        domain.rebuild();
        domain
    }

    pub fn with_actions(
        name: impl Into<String>,
        ontology: Ontology,
        actions: impl IntoIterator<Item = (ActionId, Action)>,
    ) -> Result<Domain> {
        let mut domain = Domain::new(name, ontology);
        for (id, action) in actions {
            domain.add_action(id, action)?;
        }
        Ok(domain)
    }

    /// Adds an action. An already-used identifier leaves the domain
    /// unchanged.
    pub fn add_action(&mut self, action_id: impl Into<ActionId>, action: Action) -> Result<()> {
        let action_id = action_id.into();
        action.check_parameters(&action_id)?;
        if self.actions.contains_key(&action_id) {
            return Ok(());
        }
        self.actions.insert(action_id, action);
        self.rebuild();
        Ok(())
    }

    /// Removes an action. Unknown identifiers are ignored.
    pub fn remove_action(&mut self, action_id: &str) {
        if self.actions.remove(action_id).is_some() {
            self.rebuild();
        }
    }

    /// Adds a set of events under the given identifier, suffixing it when
    /// taken. Returns the identifier actually used.
    pub fn add_set_of_events(&mut self, set: SetOfEvents, set_id: &str) -> SetOfEventsId {
        let mut id = set_id.to_string();
        let mut suffix = 1;
        while self.set_of_events.contains_key(&id) {
            suffix += 1;
            id = format!("{set_id}-{suffix}");
        }
        self.set_of_events.insert(id.clone(), set);
        self.rebuild();
        id
    }

    pub fn remove_set_of_events(&mut self, set_id: &str) {
        if self.set_of_events.remove(set_id).is_some() {
            self.rebuild();
        }
    }

    pub fn clear_events(&mut self) {
        if !self.set_of_events.is_empty() {
            self.set_of_events.clear();
            self.rebuild();
        }
    }

    /// Compiles axioms into their derive/retract event pairs, grouped under
    /// one set of events.
    pub fn add_axioms(&mut self, axioms: impl IntoIterator<Item = Axiom>, set_id: &str) -> SetOfEventsId {
        let mut set = SetOfEvents::new();
        for (i, axiom) in axioms.into_iter().enumerate() {
            for event in axiom.compile() {
                set.add(event, &format!("axiom-{i}"));
            }
        }
        self.add_set_of_events(set, set_id)
    }

    /// Records an opaque requirement flag used by external serializers.
    pub fn add_requirement(&mut self, requirement: impl Into<String>) {
        self.requirements.insert(requirement.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn actions(&self) -> &BTreeMap<ActionId, Action> {
        &self.actions
    }

    pub fn get_action(&self, action_id: &str) -> Option<&Action> {
        self.actions.get(action_id)
    }

    pub fn set_of_events(&self) -> &BTreeMap<SetOfEventsId, SetOfEvents> {
        &self.set_of_events
    }

    pub fn requirements(&self) -> &BTreeSet<String> {
        &self.requirements
    }

    pub fn precondition_to_actions(&self) -> &FactIndex<ActionId> {
        &self.precondition_to_actions
    }

    pub fn not_precondition_to_actions(&self) -> &FactIndex<ActionId> {
        &self.not_precondition_to_actions
    }

    /// Actions whose precondition is satisfied in the empty world.
    pub fn actions_without_precondition(&self) -> &[ActionId] {
        &self.actions_without_precondition
    }

    pub fn event(&self, full_id: &str) -> Option<&Event> {
        let (set_id, event_id) = full_id.split_once('|')?;
        self.set_of_events.get(set_id)?.events().get(event_id)
    }

    /// Actions whose effect could make `fact` true (or false with
    /// `positive == false`), verified by unification against their
    /// effect templates.
    pub fn actions_achieving(&self, fact: &Fact, positive: bool) -> Vec<ActionId> {
        let index = if positive {
            &self.effect_to_actions
        } else {
            &self.not_effect_to_actions
        };
        index
            .find(fact, false)
            .into_iter()
            .filter(|id| {
                self.actions
                    .get(*id)
                    .is_some_and(|a| Self::templates_achieve(&a.effect.fact_templates(), fact, positive, &self.ontology))
            })
            .cloned()
            .collect()
    }

    /// Events whose modification could make `fact` true (or false).
    pub fn events_achieving(&self, fact: &Fact, positive: bool) -> Vec<FullEventId> {
        let index = if positive {
            &self.effect_to_events
        } else {
            &self.not_effect_to_events
        };
        index
            .find(fact, false)
            .into_iter()
            .filter(|id| {
                self.event(id).is_some_and(|e| {
                    e.facts_to_modify
                        .as_ref()
                        .is_some_and(|m| Self::templates_achieve(&m.fact_templates(), fact, positive, &self.ontology))
                })
            })
            .cloned()
            .collect()
    }

    fn templates_achieve(
        templates: &lyra_model::FactTemplates,
        fact: &Fact,
        positive: bool,
        ontology: &Ontology,
    ) -> bool {
        let candidates = if positive { &templates.added } else { &templates.removed };
        candidates
            .iter()
            .any(|t| t.unify_with(fact, &ontology.types, None, false).is_some())
    }

    /// Like [`Domain::actions_achieving`] but with the looser successor
    /// interest check (fluent values ignored), used to build the
    /// succession caches.
    fn actions_feeding(&self, fact: &Fact, positive: bool) -> Vec<ActionId> {
        let index = if positive {
            &self.effect_to_actions
        } else {
            &self.not_effect_to_actions
        };
        index
            .find(fact, true)
            .into_iter()
            .filter(|id| {
                self.actions.get(*id).is_some_and(|a| {
                    let templates = a.effect.fact_templates();
                    let candidates = if positive { &templates.added } else { &templates.removed };
                    candidates
                        .iter()
                        .any(|t| t.gives_interest_for_successor(fact, &self.ontology.types))
                })
            })
            .cloned()
            .collect()
    }

    fn events_feeding(&self, fact: &Fact, positive: bool) -> Vec<FullEventId> {
        let index = if positive {
            &self.effect_to_events
        } else {
            &self.not_effect_to_events
        };
        index
            .find(fact, true)
            .into_iter()
            .filter(|id| {
                self.event(id).is_some_and(|e| {
                    e.facts_to_modify.as_ref().is_some_and(|m| {
                        let templates = m.fact_templates();
                        let candidates = if positive { &templates.added } else { &templates.removed };
                        candidates
                            .iter()
                            .any(|t| t.gives_interest_for_successor(fact, &self.ontology.types))
                    })
                })
            })
            .cloned()
            .collect()
    }

    /// Direct satisfiers of an objective: producers whose effect unifies
    /// with one of its fact leaves, with the right polarity.
    pub fn satisfiers_of(&self, objective: &Condition) -> (BTreeSet<ActionId>, BTreeSet<FullEventId>) {
        let mut actions = BTreeSet::new();
        let mut events = BTreeSet::new();
        objective.for_each_fact(&mut |fact, positive| {
            actions.extend(self.actions_achieving(fact, positive));
            events.extend(self.events_achieving(fact, positive));
        });
        (actions, events)
    }

    pub fn predecessors_of_action(&self, action_id: &str) -> Option<&Predecessors> {
        self.action_predecessors.get(action_id)
    }

    pub fn predecessors_of_event(&self, full_id: &str) -> Option<&Predecessors> {
        self.event_predecessors.get(full_id)
    }

    /// Transitive closure of the predecessor relation from seed producers,
    /// seeds included.
    pub fn predecessor_closure(
        &self,
        seed_actions: &BTreeSet<ActionId>,
        seed_events: &BTreeSet<FullEventId>,
    ) -> (BTreeSet<ActionId>, BTreeSet<FullEventId>) {
        let mut actions = seed_actions.clone();
        let mut events = seed_events.clone();
        let mut action_frontier: Vec<ActionId> = seed_actions.iter().cloned().collect();
        let mut event_frontier: Vec<FullEventId> = seed_events.iter().cloned().collect();
        while !action_frontier.is_empty() || !event_frontier.is_empty() {
            let mut next_actions = Vec::new();
            let mut next_events = Vec::new();
            let mut absorb = |preds: &Predecessors,
                              actions: &mut BTreeSet<ActionId>,
                              events: &mut BTreeSet<FullEventId>,
                              next_actions: &mut Vec<ActionId>,
                              next_events: &mut Vec<FullEventId>| {
                for a in &preds.actions {
                    if actions.insert(a.clone()) {
                        next_actions.push(a.clone());
                    }
                }
                for e in &preds.events {
                    if events.insert(e.clone()) {
                        next_events.push(e.clone());
                    }
                }
            };
            for id in action_frontier.drain(..) {
                if let Some(preds) = self.action_predecessors.get(&id) {
                    absorb(preds, &mut actions, &mut events, &mut next_actions, &mut next_events);
                }
            }
            for id in event_frontier.drain(..) {
                if let Some(preds) = self.event_predecessors.get(&id) {
                    absorb(preds, &mut actions, &mut events, &mut next_actions, &mut next_events);
                }
            }
            action_frontier = next_actions;
            event_frontier = next_events;
        }
        (actions, events)
    }

    fn rebuild(&mut self) {
        self.uuid = next_uuid(&self.name);

        let mut precondition_to_actions = FactIndex::new();
        let mut not_precondition_to_actions = FactIndex::new();
        let mut actions_without_precondition = Vec::new();
        let mut effect_to_actions = FactIndex::new();
        let mut not_effect_to_actions = FactIndex::new();
        for (id, action) in &self.actions {
            let mut has_positive_leaf = false;
            if let Some(pre) = &action.precondition {
                pre.for_each_fact(&mut |fact, positive| {
                    if positive {
                        has_positive_leaf = true;
                        precondition_to_actions.add(fact, id.clone());
                    } else {
                        not_precondition_to_actions.add(fact, id.clone());
                    }
                });
            }
            if !has_positive_leaf {
                actions_without_precondition.push(id.clone());
            }
            let templates = action.effect.fact_templates();
            for fact in &templates.added {
                effect_to_actions.add(fact, id.clone());
            }
            for fact in &templates.removed {
                not_effect_to_actions.add(fact, id.clone());
            }
        }

        let mut effect_to_events = FactIndex::new();
        let mut not_effect_to_events = FactIndex::new();
        for (set_id, set) in &self.set_of_events {
            for (event_id, event) in set.events() {
                let full_id = full_event_id(set_id, event_id);
                if let Some(m) = &event.facts_to_modify {
                    let templates = m.fact_templates();
                    for fact in &templates.added {
                        effect_to_events.add(fact, full_id.clone());
                    }
                    for fact in &templates.removed {
                        not_effect_to_events.add(fact, full_id.clone());
                    }
                }
            }
        }

        self.precondition_to_actions = precondition_to_actions;
        self.not_precondition_to_actions = not_precondition_to_actions;
        self.actions_without_precondition = actions_without_precondition;
        self.effect_to_actions = effect_to_actions;
        self.not_effect_to_actions = not_effect_to_actions;
        self.effect_to_events = effect_to_events;
        self.not_effect_to_events = not_effect_to_events;

        // succession caches: who can enable whom
        let mut action_predecessors = BTreeMap::new();
        for (id, action) in &self.actions {
            let mut preds = Predecessors::default();
            if let Some(pre) = &action.precondition {
                pre.for_each_fact(&mut |fact, positive| {
                    preds
                        .actions
                        .extend(self.actions_feeding(fact, positive).into_iter().filter(|a| a != id));
                    preds.events.extend(self.events_feeding(fact, positive));
                });
            }
            action_predecessors.insert(id.clone(), preds);
        }
        let mut event_predecessors = BTreeMap::new();
        for (set_id, set) in &self.set_of_events {
            for (event_id, event) in set.events() {
                let full_id = full_event_id(set_id, event_id);
                let mut preds = Predecessors::default();
                event.precondition.for_each_fact(&mut |fact, positive| {
                    preds.actions.extend(self.actions_feeding(fact, positive));
                    preds
                        .events
                        .extend(self.events_feeding(fact, positive).into_iter().filter(|e| *e != full_id));
                });
                event_predecessors.insert(full_id, preds);
            }
        }
        self.action_predecessors = action_predecessors;
        self.event_predecessors = event_predecessors;
    }
}
