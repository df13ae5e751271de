use crate::fact_index::FactIndex;
use crate::goal::Goal;
use anyhow::{ensure, Result};
use lyra_model::{Condition, Fact, Modification, Parameter};
use std::collections::BTreeMap;

pub type EventId = String;
pub type SetOfEventsId = String;
/// `<set id>|<event id>`, unique across the domain.
pub type FullEventId = String;

pub fn full_event_id(set_id: &str, event_id: &str) -> FullEventId {
    format!("{set_id}|{event_id}")
}

/// A forward-chained rule: whenever the precondition becomes true, the
/// modification is applied and the goals are stacked.
#[derive(Debug, Clone)]
pub struct Event {
    pub parameters: Vec<Parameter>,
    pub precondition: Condition,
    pub facts_to_modify: Option<Modification>,
    pub goals_to_add: BTreeMap<i32, Vec<Goal>>,
}

impl Event {
    pub fn new(precondition: Condition, facts_to_modify: Modification) -> Event {
        Event {
            parameters: Vec::new(),
            precondition,
            facts_to_modify: Some(facts_to_modify),
            goals_to_add: BTreeMap::new(),
        }
    }

    /// An event that only stacks goals.
    pub fn goal_event(precondition: Condition, goals_to_add: BTreeMap<i32, Vec<Goal>>) -> Event {
        Event {
            parameters: Vec::new(),
            precondition,
            facts_to_modify: None,
            goals_to_add,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Event {
        self.parameters = parameters;
        self
    }

    pub fn with_goals_to_add(mut self, goals: BTreeMap<i32, Vec<Goal>>) -> Event {
        self.goals_to_add = goals;
        self
    }

    pub fn check(&self, event_id: &str) -> Result<()> {
        ensure!(
            self.facts_to_modify.is_some() || !self.goals_to_add.is_empty(),
            "event `{event_id}` modifies nothing and adds no goal"
        );
        Ok(())
    }
}

/// A derived predicate: the head holds exactly while the body does.
///
/// Compiled into a pair of events preserving the closure property: one
/// derives the head whenever the body holds, the other retracts it as soon
/// as the body stops holding.
#[derive(Debug, Clone)]
pub struct Axiom {
    pub parameters: Vec<Parameter>,
    pub head: Fact,
    pub body: Condition,
}

impl Axiom {
    pub fn new(head: Fact, body: Condition) -> Axiom {
        Axiom {
            parameters: Vec::new(),
            head,
            body,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Axiom {
        self.parameters = parameters;
        self
    }

    pub fn compile(&self) -> Vec<Event> {
        let derive = Event::new(self.body.clone(), Modification::add(self.head.clone()))
            .with_parameters(self.parameters.clone());
        let retract = Event::new(self.body.inverted(), Modification::delete(self.head.clone()))
            .with_parameters(self.parameters.clone());
        vec![derive, retract]
    }
}

/// A keyed group of events with condition indices for efficient firing.
#[derive(Debug, Clone, Default)]
pub struct SetOfEvents {
    events: BTreeMap<EventId, Event>,
    condition_to_events: FactIndex<EventId>,
    not_condition_to_events: FactIndex<EventId>,
}

impl SetOfEvents {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_event(event: Event) -> Self {
        let mut set = Self::new();
        set.add(event, "event");
        set
    }

    /// Adds an event under the given identifier, suffixing it when taken.
    /// Returns the identifier actually used.
    pub fn add(&mut self, event: Event, event_id: &str) -> EventId {
        let mut id = event_id.to_string();
        let mut suffix = 1;
        while self.events.contains_key(&id) {
            suffix += 1;
            id = format!("{event_id}-{suffix}");
        }
        self.index_event(&id, &event);
        self.events.insert(id.clone(), event);
        id
    }

    pub fn remove(&mut self, event_id: &str) {
        if self.events.remove(event_id).is_some() {
            self.condition_to_events.remove_value(&event_id.to_string());
            self.not_condition_to_events.remove_value(&event_id.to_string());
        }
    }

    fn index_event(&mut self, id: &EventId, event: &Event) {
        event.precondition.for_each_fact(&mut |fact, positive| {
            if positive {
                self.condition_to_events.add(fact, id.clone());
            } else {
                self.not_condition_to_events.add(fact, id.clone());
            }
        });
    }

    pub fn events(&self) -> &BTreeMap<EventId, Event> {
        &self.events
    }

    /// Events whose precondition references the fact positively.
    pub fn events_triggered_by(&self, fact: &Fact) -> Vec<&EventId> {
        self.condition_to_events.find(fact, true)
    }

    /// Events whose precondition references the fact negatively.
    pub fn events_triggered_by_removal(&self, fact: &Fact) -> Vec<&EventId> {
        self.not_condition_to_events.find(fact, true)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
