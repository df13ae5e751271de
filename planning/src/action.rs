use crate::goal::Goal;
use anyhow::{ensure, Result};
use lyra_model::modification::FactTemplates;
use lyra_model::{Condition, Modification, Parameter};
use std::collections::BTreeMap;

/// Identifier of an action inside a domain.
pub type ActionId = String;

/// Everything applying an action does to a problem: world-state changes at
/// start and at end, potential changes left to an external hook, and goals
/// pushed onto the stack.
#[derive(Debug, Clone, Default)]
pub struct ProblemModification {
    /// Applied when the action is notified started.
    pub at_start: Option<Modification>,
    /// Applied when the action is notified done.
    pub at_end: Option<Modification>,
    /// Contributes to accessibility and candidate reasoning but is never
    /// applied automatically.
    pub potential: Option<Modification>,
    pub goals_to_add: BTreeMap<i32, Vec<Goal>>,
    pub goals_to_add_in_current_priority: Vec<Goal>,
}

impl ProblemModification {
    pub fn new(at_end: Modification) -> Self {
        ProblemModification {
            at_end: Some(at_end),
            ..Default::default()
        }
    }

    pub fn with_at_start(mut self, at_start: Modification) -> Self {
        self.at_start = Some(at_start);
        self
    }

    pub fn with_potential(mut self, potential: Modification) -> Self {
        self.potential = Some(potential);
        self
    }

    pub fn with_goals_to_add(mut self, goals: BTreeMap<i32, Vec<Goal>>) -> Self {
        self.goals_to_add = goals;
        self
    }

    pub fn with_goals_in_current_priority(mut self, goals: Vec<Goal>) -> Self {
        self.goals_to_add_in_current_priority = goals;
        self
    }

    /// Fact templates of every effect part, potential included: what this
    /// action could make true or false.
    pub fn fact_templates(&self) -> FactTemplates {
        let mut out = FactTemplates::default();
        for m in [&self.at_start, &self.at_end, &self.potential].into_iter().flatten() {
            let t = m.fact_templates();
            out.added.extend(t.added);
            out.removed.extend(t.removed);
        }
        out
    }

    /// Fact templates of the parts applied automatically (start and end),
    /// the ones that matter for conflict analysis between parallel actions.
    pub fn applied_templates(&self) -> FactTemplates {
        let mut out = FactTemplates::default();
        for m in [&self.at_start, &self.at_end].into_iter().flatten() {
            let t = m.fact_templates();
            out.added.extend(t.added);
            out.removed.extend(t.removed);
        }
        out
    }

    fn parameters(&self) -> std::collections::BTreeSet<Parameter> {
        let mut out = std::collections::BTreeSet::new();
        for m in [&self.at_start, &self.at_end, &self.potential].into_iter().flatten() {
            out.extend(m.parameters());
        }
        out
    }
}

/// What the agent can do, and when it is worth doing.
#[derive(Debug, Clone, Default)]
pub struct Action {
    pub parameters: Vec<Parameter>,
    pub precondition: Option<Condition>,
    /// Soft condition tilting selection toward this action without gating it.
    pub prefer_in_context: Option<Condition>,
    pub effect: ProblemModification,
    /// When set, the historical count of this action weighs heavily against
    /// selecting it again.
    pub high_importance_of_not_repeating: bool,
}

impl Action {
    pub fn new(precondition: Option<Condition>, effect: Modification) -> Action {
        Action {
            precondition,
            effect: ProblemModification::new(effect),
            ..Default::default()
        }
    }

    pub fn from_effect(effect: ProblemModification) -> Action {
        Action {
            effect,
            ..Default::default()
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Action {
        self.parameters = parameters;
        self
    }

    pub fn with_precondition(mut self, precondition: Condition) -> Action {
        self.precondition = Some(precondition);
        self
    }

    pub fn with_preference(mut self, prefer_in_context: Condition) -> Action {
        self.prefer_in_context = Some(prefer_in_context);
        self
    }

    pub fn with_high_importance_of_not_repeating(mut self) -> Action {
        self.high_importance_of_not_repeating = true;
        self
    }

    /// Checks that every parameter used by the condition and the effect is
    /// declared on the action.
    pub fn check_parameters(&self, action_id: &str) -> Result<()> {
        let mut used = self.effect.parameters();
        if let Some(c) = &self.precondition {
            used.extend(c.parameters());
        }
        if let Some(c) = &self.prefer_in_context {
            used.extend(c.parameters());
        }
        for p in used {
            ensure!(
                self.parameters.contains(&p),
                "action `{action_id}` uses the undeclared parameter `{p}`"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra_model::{Entity, Fact, Predicate, SetOfPredicates, SetOfTypes};

    #[test]
    fn undeclared_parameters_are_rejected() {
        let mut types = SetOfTypes::new();
        let robot = types.add("robot", None).unwrap();
        let mut predicates = SetOfPredicates::new();
        let greeted = predicates.add(Predicate::relation("greeted", vec![Parameter::new("?r", robot)]));

        let fact = Fact::new(&types, greeted, vec![Entity::new("?r", robot)], None).unwrap();
        let action = Action::new(None, Modification::add(fact));
        assert!(action.check_parameters("greet").is_err());

        let action = action.with_parameters(vec![Parameter::new("?r", robot)]);
        assert!(action.check_parameters("greet").is_ok());
    }
}
