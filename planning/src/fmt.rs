//! Functions related to printing plans and goals.

use crate::goal::Goal;
use crate::planner::{ActionInvocationWithGoal, ActionsToDoInParallel};
use itertools::Itertools;
use std::fmt::Write;

/// `action1(?p1 -> v1, ?p2 -> v2), action2(...)` with a configurable
/// separator.
pub fn plan_to_string(plan: &[ActionInvocationWithGoal], separator: &str) -> String {
    plan.iter().map(|step| step.to_string()).join(separator)
}

/// One line per parallel wave, actions of a wave separated by `, `.
pub fn parallel_plan_to_string(plan: &[ActionsToDoInParallel]) -> String {
    plan.iter()
        .map(|wave| wave.actions.iter().map(|step| step.to_string()).join(", "))
        .join("\n")
}

/// PDDL-compatible rendering: `NN: (action v1 v2) [1]` lines with a
/// monotonic step number.
pub fn plan_to_pddl(plan: &[ActionInvocationWithGoal]) -> String {
    let mut out = String::new();
    for (i, step) in plan.iter().enumerate() {
        write!(out, "{i:02}: ({}", step.action_id).unwrap();
        for value in step.parameters.values() {
            write!(out, " {value}").unwrap();
        }
        out.push_str(") [1]\n");
    }
    out
}

/// Goals joined by a configurable separator, wrappers included.
pub fn goals_to_string<'a>(goals: impl IntoIterator<Item = &'a Goal>, separator: &str) -> String {
    goals.into_iter().map(|g| g.to_string()).join(separator)
}
