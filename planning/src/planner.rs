//! Action selection: single steps, full plans and parallel schedules.
//!
//! Selection is deterministic: candidates are scored with a lexicographic
//! cost tuple (distance to the goal, unsatisfied preferences, invocation
//! counts, action identifier) and ties always fall back to the identifier.

use crate::action::{Action, ActionId};
use crate::domain::Domain;
use crate::event::FullEventId;
use crate::goal::Goal;
use crate::goal_stack::DEFAULT_PRIORITY;
use crate::historical::Historical;
use crate::problem::{ops_would_change, Problem};
use crate::world_state::{WhatChanged, WorldState};
use lyra_model::{
    Bindings, Condition, Entity, EvalContext, Fact, FactOptional, Parameter, SetOfEntities,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Bound on the recursive expansion along the predecessor caches.
const MAX_SEARCH_DEPTH: usize = 10;
/// Bound on the number of steps a full plan may take.
const MAX_PLAN_STEPS: usize = 500;
/// Bound on the look-ahead used by the optimal single-step search.
const LOOKAHEAD_MAX_STEPS: usize = 12;

/* ========================================================================== */
/*                               Public types                                 */
/* ========================================================================== */

/// One planner step: an action, its ground parameters and the goal that
/// motivated it.
#[derive(Debug, Clone)]
pub struct ActionInvocationWithGoal {
    pub action_id: ActionId,
    pub parameters: BTreeMap<Parameter, Entity>,
    pub from_goal: Option<Goal>,
    pub from_goal_priority: i32,
}

impl Display for ActionInvocationWithGoal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action_id)?;
        if !self.parameters.is_empty() {
            write!(f, "(")?;
            for (i, (p, e)) in self.parameters.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{p} -> {e}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Actions whose preconditions all hold now and whose effects commute.
#[derive(Debug, Clone, Default)]
pub struct ActionsToDoInParallel {
    pub actions: Vec<ActionInvocationWithGoal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerStepKind {
    InProgress,
    FinishedOnSuccess,
    FinishedOnFailure,
}

/// What a planner invocation found out about the goal stack.
#[derive(Debug, Clone)]
pub struct PlanOutputInfos {
    pub kind: PlannerStepKind,
    pub satisfied_goals: Vec<Goal>,
    pub not_satisfied_goals: usize,
    pub first_goal_in_success: Option<bool>,
}

impl Default for PlanOutputInfos {
    fn default() -> Self {
        PlanOutputInfos {
            kind: PlannerStepKind::InProgress,
            satisfied_goals: Vec::new(),
            not_satisfied_goals: 0,
            first_goal_in_success: None,
        }
    }
}

/* ========================================================================== */
/*                             Candidate search                               */
/* ========================================================================== */

#[derive(Debug, Clone)]
struct ScoredStep {
    distance: usize,
    prefer_deficit: i64,
    repeat_penalty: u64,
    problem_uses: u64,
    global_uses: u64,
    action_id: ActionId,
    assignment: BTreeMap<Parameter, Entity>,
}

impl ScoredStep {
    fn cost_key(&self) -> (usize, i64, u64, u64, u64, &str) {
        (
            self.distance,
            self.prefer_deficit,
            self.repeat_penalty,
            self.problem_uses,
            self.global_uses,
            &self.action_id,
        )
    }
}

struct SearchEnv<'a> {
    domain: &'a Domain,
    world_state: &'a WorldState,
    entities: &'a SetOfEntities,
    historical: &'a Historical,
    global_historical: Option<&'a Historical>,
    allowed_actions: &'a BTreeSet<ActionId>,
    allowed_events: &'a BTreeSet<FullEventId>,
}

struct TargetLeaf {
    fact: Fact,
    positive: bool,
}

fn target_leaves(condition: &Condition) -> Vec<TargetLeaf> {
    let mut leaves = Vec::new();
    condition.for_each_fact(&mut |fact, positive| {
        leaves.push(TargetLeaf {
            fact: fact.clone(),
            positive,
        });
    });
    leaves
}

/// A leaf is worth working on while it does not hold. A fluent leaf whose
/// value slot is unresolved (from an equality or a pattern) always is: the
/// equality it came from was false, whatever value is currently bound.
fn leaf_needs_work(leaf: &TargetLeaf, ctx: &EvalContext) -> bool {
    if leaf.positive
        && leaf
            .fact
            .value()
            .is_some_and(|v| v.is_any_value() || v.is_parameter())
    {
        return true;
    }
    let fo = FactOptional {
        is_negated: !leaf.positive,
        fact: leaf.fact.clone(),
    };
    !ctx.facts.satisfies(&fo, ctx.types)
}

fn steps_for_condition(
    env: &SearchEnv,
    ctx: &EvalContext,
    condition: &Condition,
    depth: usize,
    path_actions: &mut Vec<ActionId>,
    path_events: &mut Vec<FullEventId>,
    out: &mut Vec<ScoredStep>,
) {
    if depth > MAX_SEARCH_DEPTH {
        return;
    }
    let types = &env.domain.ontology().types;
    for leaf in target_leaves(condition) {
        if !leaf_needs_work(&leaf, ctx) {
            continue;
        }
        for action_id in env.domain.actions_achieving(&leaf.fact, leaf.positive) {
            if !env.allowed_actions.contains(&action_id) || path_actions.contains(&action_id) {
                continue;
            }
            try_action(env, ctx, &action_id, &leaf, depth, path_actions, path_events, out);
        }
        // events recurse transparently: forward chaining costs no step
        for event_id in env.domain.events_achieving(&leaf.fact, leaf.positive) {
            if !env.allowed_events.contains(&event_id) || path_events.contains(&event_id) {
                continue;
            }
            let Some(event) = env.domain.event(&event_id) else {
                continue;
            };
            let Some(modification) = &event.facts_to_modify else {
                continue;
            };
            let templates = modification.fact_templates();
            let relevant = if leaf.positive {
                &templates.added
            } else {
                &templates.removed
            };
            for template in relevant {
                if let Some(bound) = template.unify_with(&leaf.fact, types, None, false) {
                    let substitution = bound.single_assignments();
                    let precondition = event.precondition.substitute(&substitution);
                    path_events.push(event_id.clone());
                    steps_for_condition(env, ctx, &precondition, depth, path_actions, path_events, out);
                    path_events.pop();
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn try_action(
    env: &SearchEnv,
    ctx: &EvalContext,
    action_id: &str,
    leaf: &TargetLeaf,
    depth: usize,
    path_actions: &mut Vec<ActionId>,
    path_events: &mut Vec<FullEventId>,
    out: &mut Vec<ScoredStep>,
) {
    let Some(action) = env.domain.get_action(action_id) else {
        return;
    };
    let types = &env.domain.ontology().types;
    let mut bindings = Bindings::from_parameters(&action.parameters);
    let templates = action.effect.fact_templates();
    let relevant = if leaf.positive {
        &templates.added
    } else {
        &templates.removed
    };
    let mut unified = false;
    for template in relevant {
        if let Some(found) = template.unify_with(&leaf.fact, types, Some(&bindings), false) {
            if bindings.restrict_with(&found) {
                unified = true;
                break;
            }
        }
    }
    if !unified {
        return;
    }

    match &action.precondition {
        None => push_step(env, ctx, action, action_id, bindings, depth, out),
        Some(precondition) => {
            let mut refined = bindings.clone();
            if precondition.is_true(ctx, Some(&mut refined)) {
                push_step(env, ctx, action, action_id, refined, depth, out);
            } else if depth < MAX_SEARCH_DEPTH
                && env
                    .world_state
                    .condition_can_become_true(precondition, env.domain, env.entities)
            {
                let grounded = precondition.substitute(&bindings.single_assignments());
                path_actions.push(action_id.to_string());
                steps_for_condition(env, ctx, &grounded, depth + 1, path_actions, path_events, out);
                path_actions.pop();
            }
        }
    }
}

fn push_step(
    env: &SearchEnv,
    ctx: &EvalContext,
    action: &Action,
    action_id: &str,
    bindings: Bindings,
    distance: usize,
    out: &mut Vec<ScoredStep>,
) {
    // ground every parameter: constrained ones take their first
    // possibility, free ones any declared instance of their type
    let mut assignment = bindings.first_assignment();
    for parameter in &action.parameters {
        if !assignment.contains_key(parameter) {
            match ctx.instances_of(parameter.tpe).into_iter().next() {
                Some(instance) => {
                    assignment.insert(parameter.clone(), instance);
                }
                None => return,
            }
        }
    }
    if !invocation_would_change(env, ctx, action, &assignment) {
        return;
    }
    let satisfied_preferences = action
        .prefer_in_context
        .as_ref()
        .map_or(0, |c| c.count_satisfied_clauses(ctx) as i64);
    let problem_uses = env.historical.count_for(action_id) as u64;
    let global_uses = env.global_historical.map_or(0, |h| h.count_for(action_id) as u64);
    out.push(ScoredStep {
        distance,
        prefer_deficit: -satisfied_preferences,
        repeat_penalty: if action.high_importance_of_not_repeating {
            problem_uses
        } else {
            0
        },
        problem_uses,
        global_uses,
        action_id: action_id.to_string(),
        assignment,
    });
}

/// An action achieving nothing (its applied and potential effects leave
/// the world as it is) is not a valid candidate.
fn invocation_would_change(
    env: &SearchEnv,
    ctx: &EvalContext,
    action: &Action,
    assignment: &BTreeMap<Parameter, Entity>,
) -> bool {
    for part in [&action.effect.at_start, &action.effect.at_end, &action.effect.potential]
        .into_iter()
        .flatten()
    {
        if ops_would_change(env.world_state.facts(), &part.evaluate(ctx, assignment)) {
            return true;
        }
    }
    false
}

/// Applying the step must not break a strictly more important goal that is
/// currently satisfied, unless the action stacks an equivalent goal back.
fn step_is_safe(
    env: &SearchEnv,
    ctx: &EvalContext,
    step: &ScoredStep,
    higher_satisfied_goals: &[(Goal, i32)],
) -> bool {
    if higher_satisfied_goals.is_empty() {
        return true;
    }
    let Some(action) = env.domain.get_action(&step.action_id) else {
        return false;
    };
    let mut simulated = env.world_state.clone();
    let mut scratch = WhatChanged::default();
    for part in [&action.effect.at_start, &action.effect.at_end].into_iter().flatten() {
        let ops = part.evaluate(ctx, &step.assignment);
        simulated.apply_ops(&ops, &mut scratch);
    }
    for (goal, _) in higher_satisfied_goals {
        let simulated_ctx = simulated.eval_ctx(env.domain, env.entities, None);
        if !goal.objective().is_true(&simulated_ctx, None) {
            let readded = action
                .effect
                .goals_to_add
                .values()
                .flatten()
                .chain(&action.effect.goals_to_add_in_current_priority)
                .any(|g| g.objective() == goal.objective());
            if !readded {
                return false;
            }
        }
    }
    true
}

/// Greedy projection of the plan length from a candidate first step to the
/// satisfaction of `objective`. Used by the optimal single-step search.
fn projected_plan_length(
    step: &ScoredStep,
    objective: &Condition,
    env: &SearchEnv,
    domain: &Domain,
    now: Option<Instant>,
) -> usize {
    let mut simulation = Problem {
        world_state: env.world_state.clone(),
        goal_stack: Default::default(),
        historical: env.historical.clone(),
        entities: env.entities.clone(),
        observers: Default::default(),
    };
    let mut current = step.clone();
    let mut length = 0;
    loop {
        let invocation = ActionInvocationWithGoal {
            action_id: current.action_id.clone(),
            parameters: current.assignment.clone(),
            from_goal: None,
            from_goal_priority: DEFAULT_PRIORITY,
        };
        notify_action_started(&mut simulation, domain, &invocation, now);
        notify_action_done(&mut simulation, domain, &invocation, now);
        length += 1;
        let satisfied = {
            let ctx = simulation.world_state.eval_ctx(domain, &simulation.entities, None);
            objective.is_true(&ctx, None)
        };
        if satisfied {
            return length;
        }
        if length >= LOOKAHEAD_MAX_STEPS {
            return usize::MAX / 2;
        }
        simulation
            .world_state
            .refresh_reachable_if_needed(domain, &simulation.entities);
        let next = {
            let ctx = simulation.world_state.eval_ctx(domain, &simulation.entities, None);
            let step_env = SearchEnv {
                domain,
                world_state: &simulation.world_state,
                entities: &simulation.entities,
                historical: &simulation.historical,
                global_historical: env.global_historical,
                allowed_actions: env.allowed_actions,
                allowed_events: env.allowed_events,
            };
            let mut steps = Vec::new();
            steps_for_condition(&step_env, &ctx, objective, 0, &mut Vec::new(), &mut Vec::new(), &mut steps);
            steps.sort_by(|a, b| a.cost_key().cmp(&b.cost_key()));
            steps.into_iter().next()
        };
        match next {
            Some(step) => current = step,
            None => return usize::MAX / 2,
        }
    }
}

/* ========================================================================== */
/*                            Single-step selection                           */
/* ========================================================================== */

fn look_for_an_action_to_do(
    problem: &mut Problem,
    domain: &Domain,
    try_optimal: bool,
    now: Option<Instant>,
    global_historical: Option<&Historical>,
    mut infos: Option<&mut PlanOutputInfos>,
) -> Option<ActionInvocationWithGoal> {
    problem
        .world_state
        .refresh_reachable_if_needed(domain, &problem.entities);

    // snapshot of the satisfied active goals, for the priority safety rule
    let satisfied_snapshot: Vec<(Goal, i32)> = {
        let ctx = problem.world_state.eval_ctx(domain, &problem.entities, None);
        problem
            .goal_stack
            .goals()
            .iter()
            .rev()
            .flat_map(|(p, goals)| goals.iter().map(move |g| (g, *p)))
            .filter(|(g, _)| {
                g.condition_fact()
                    .map_or(true, |cf| ctx.facts.satisfies(cf, ctx.types))
                    && g.objective().is_true(&ctx, None)
            })
            .map(|(g, p)| (g.clone(), p))
            .collect()
    };

    let mut result: Option<ActionInvocationWithGoal> = None;
    let mut first_goal_in_success: Option<bool> = None;
    let mut satisfied_goals: Vec<Goal> = Vec::new();
    let mut not_satisfied_goals = 0usize;

    let world_state = &problem.world_state;
    let entities = &problem.entities;
    let historical = &problem.historical;
    let goal_changes = problem.goal_stack.iterate_on_goals_and_remove_non_persistent(
        |goal, priority| {
            let ctx = world_state.eval_ctx(domain, entities, None);
            if goal.objective().is_true(&ctx, None) {
                first_goal_in_success.get_or_insert(true);
                satisfied_goals.push(goal.clone());
                return false;
            }
            goal.refresh_if_needed(domain);
            let env = SearchEnv {
                domain,
                world_state,
                entities,
                historical,
                global_historical,
                allowed_actions: goal.actions_predecessors(),
                allowed_events: goal.events_predecessors(),
            };
            let mut steps = Vec::new();
            steps_for_condition(
                &env,
                &ctx,
                goal.objective(),
                0,
                &mut Vec::new(),
                &mut Vec::new(),
                &mut steps,
            );
            steps.sort_by(|a, b| a.cost_key().cmp(&b.cost_key()));
            steps.dedup_by(|a, b| a.action_id == b.action_id && a.assignment == b.assignment);

            let higher: Vec<(Goal, i32)> = satisfied_snapshot
                .iter()
                .filter(|(_, p)| *p > priority)
                .cloned()
                .collect();
            let mut safe_steps = steps.into_iter().filter(|s| step_is_safe(&env, &ctx, s, &higher));
            let chosen = if try_optimal {
                let candidates: Vec<ScoredStep> = safe_steps.by_ref().take(5).collect();
                candidates
                    .into_iter()
                    .enumerate()
                    .min_by_key(|(i, s)| (projected_plan_length(s, goal.objective(), &env, domain, now), *i))
                    .map(|(_, s)| s)
            } else {
                safe_steps.next()
            };
            match chosen {
                Some(step) => {
                    first_goal_in_success.get_or_insert(false);
                    result = Some(ActionInvocationWithGoal {
                        action_id: step.action_id,
                        parameters: step.assignment,
                        from_goal: Some(goal.clone()),
                        from_goal_priority: priority,
                    });
                    true
                }
                None => {
                    first_goal_in_success.get_or_insert(false);
                    not_satisfied_goals += 1;
                    false
                }
            }
        },
        problem.world_state.facts(),
        &domain.ontology().types,
        now,
    );
    if goal_changes.changed {
        let goals_image = problem.goal_stack.goals().clone();
        problem.observers.on_goals_changed.emit(&goals_image);
    }

    if let Some(infos) = infos.as_deref_mut() {
        infos.first_goal_in_success = first_goal_in_success;
        infos.satisfied_goals.extend(satisfied_goals);
        infos.not_satisfied_goals += not_satisfied_goals;
        infos.kind = if result.is_some() {
            PlannerStepKind::InProgress
        } else if not_satisfied_goals == 0 {
            PlannerStepKind::FinishedOnSuccess
        } else {
            PlannerStepKind::FinishedOnFailure
        };
    }
    result
}

/* ========================================================================== */
/*                                Public API                                  */
/* ========================================================================== */

/// Returns at most one action: the first step toward the most important
/// goal something can be done for. With `try_optimal` a bounded look-ahead
/// picks the step minimizing the projected plan length.
pub fn plan_for_more_important_goal_possible(
    problem: &mut Problem,
    domain: &Domain,
    try_optimal: bool,
    now: Option<Instant>,
    global_historical: Option<&Historical>,
    infos: Option<&mut PlanOutputInfos>,
) -> Vec<ActionInvocationWithGoal> {
    look_for_an_action_to_do(problem, domain, try_optimal, now, global_historical, infos)
        .into_iter()
        .collect()
}

/// Applies the at-start part of the action's effect.
pub fn notify_action_started(
    problem: &mut Problem,
    domain: &Domain,
    invocation: &ActionInvocationWithGoal,
    now: Option<Instant>,
) {
    problem.historical.notify_action_done(&invocation.action_id);
    let Some(action) = domain.get_action(&invocation.action_id) else {
        return;
    };
    if let Some(at_start) = &action.effect.at_start {
        problem.modify_with_substitution(at_start, &invocation.parameters, domain, now);
    }
}

/// Applies the main part of the action's effect and stacks its goals.
pub fn notify_action_done(
    problem: &mut Problem,
    domain: &Domain,
    invocation: &ActionInvocationWithGoal,
    now: Option<Instant>,
) {
    problem.historical.notify_action_done(&invocation.action_id);
    let Some(action) = domain.get_action(&invocation.action_id) else {
        return;
    };
    if let Some(at_end) = &action.effect.at_end {
        problem.modify_with_substitution(at_end, &invocation.parameters, domain, now);
    }
    if !action.effect.goals_to_add.is_empty() {
        let goals: BTreeMap<i32, Vec<Goal>> = action
            .effect
            .goals_to_add
            .iter()
            .map(|(p, gs)| (*p, gs.iter().map(|g| g.substitute(&invocation.parameters)).collect()))
            .collect();
        problem.add_goals(goals, domain, now);
    }
    if !action.effect.goals_to_add_in_current_priority.is_empty() {
        let priority = if problem.goal_stack.is_empty() {
            DEFAULT_PRIORITY
        } else {
            invocation.from_goal_priority
        };
        for goal in &action.effect.goals_to_add_in_current_priority {
            problem.push_back_goal(goal.substitute(&invocation.parameters), priority, domain, now);
        }
    }
    // one-step-towards goals are dropped after their productive step
    if let Some(goal) = &invocation.from_goal {
        if goal.is_one_step_towards() {
            if problem
                .goal_stack
                .remove_first_matching(&goal.to_string(), invocation.from_goal_priority)
                .is_some()
            {
                let goals_image = problem.goal_stack.goals().clone();
                problem.observers.on_goals_changed.emit(&goals_image);
            }
        }
    }
}

/// Iterates single steps, committing each on the problem, until no goal
/// can make further progress. Satisfied goals are reported through
/// `goals_done`.
pub fn plan_for_every_goals(
    problem: &mut Problem,
    domain: &Domain,
    now: Option<Instant>,
    mut global_historical: Option<&mut Historical>,
    mut goals_done: Option<&mut Vec<Goal>>,
) -> Vec<ActionInvocationWithGoal> {
    let mut plan = Vec::new();
    let mut reported: BTreeSet<String> = BTreeSet::new();
    for _ in 0..MAX_PLAN_STEPS {
        let mut infos = PlanOutputInfos::default();
        let step = look_for_an_action_to_do(
            problem,
            domain,
            false,
            now,
            global_historical.as_deref(),
            Some(&mut infos),
        );
        if let Some(done) = goals_done.as_deref_mut() {
            for goal in &infos.satisfied_goals {
                if reported.insert(goal.to_string()) {
                    done.push(goal.clone());
                }
            }
        }
        let Some(invocation) = step else {
            break;
        };
        notify_action_started(problem, domain, &invocation, now);
        notify_action_done(problem, domain, &invocation, now);
        if let Some(h) = global_historical.as_deref_mut() {
            h.notify_action_done(&invocation.action_id);
        }
        plan.push(invocation);
    }
    plan
}

/* ========================================================================== */
/*                              Parallel planning                             */
/* ========================================================================== */

/// Key identifying the world atoms an invocation reads or writes:
/// predicate name and argument values, `*` standing for any value.
type AtomKey = Vec<String>;

fn atom_key(fact: &Fact) -> AtomKey {
    let mut key = vec![fact.name().to_string()];
    for arg in fact.arguments() {
        if arg.is_parameter() || arg.is_any_value() {
            key.push("*".to_string());
        } else {
            key.push(arg.value().to_string());
        }
    }
    key
}

fn atoms_overlap(a: &AtomKey, b: &AtomKey) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x == "*" || y == "*" || x == y)
}

fn written_atoms(action: &Action, assignment: &BTreeMap<Parameter, Entity>, ctx: &EvalContext) -> Vec<AtomKey> {
    let mut atoms = Vec::new();
    for part in [&action.effect.at_start, &action.effect.at_end].into_iter().flatten() {
        for op in part.evaluate(ctx, assignment) {
            let fact = match &op {
                lyra_model::FactOp::Add(f) | lyra_model::FactOp::Remove(f) => f,
            };
            atoms.push(atom_key(fact));
        }
    }
    atoms
}

fn read_atoms(action: &Action, assignment: &BTreeMap<Parameter, Entity>) -> Vec<AtomKey> {
    let mut atoms = Vec::new();
    if let Some(pre) = &action.precondition {
        pre.for_each_fact(&mut |fact, _| {
            atoms.push(atom_key(&fact.replace_arguments(assignment)));
        });
    }
    atoms
}

/// Two invocations conflict when one writes an atom the other reads or
/// writes.
fn invocations_conflict(
    a: &ActionInvocationWithGoal,
    b: &ActionInvocationWithGoal,
    domain: &Domain,
    ctx: &EvalContext,
) -> bool {
    let (Some(action_a), Some(action_b)) = (domain.get_action(&a.action_id), domain.get_action(&b.action_id))
    else {
        return true;
    };
    let writes_a = written_atoms(action_a, &a.parameters, ctx);
    let writes_b = written_atoms(action_b, &b.parameters, ctx);
    let touches_b: Vec<AtomKey> = writes_b
        .iter()
        .cloned()
        .chain(read_atoms(action_b, &b.parameters))
        .collect();
    let touches_a: Vec<AtomKey> = writes_a
        .iter()
        .cloned()
        .chain(read_atoms(action_a, &a.parameters))
        .collect();
    writes_a.iter().any(|w| touches_b.iter().any(|t| atoms_overlap(w, t)))
        || writes_b.iter().any(|w| touches_a.iter().any(|t| atoms_overlap(w, t)))
}

/// One selected step plus every independent action that can run beside it:
/// preconditions all hold now and effects are mutually commuting.
pub fn actions_to_do_in_parallel_now(
    problem: &mut Problem,
    domain: &Domain,
    now: Option<Instant>,
    global_historical: Option<&mut Historical>,
) -> ActionsToDoInParallel {
    let global_historical = global_historical.map(|h| &*h);
    let Some(first) = look_for_an_action_to_do(problem, domain, false, now, global_historical, None) else {
        return ActionsToDoInParallel::default();
    };
    let mut selected = vec![first];

    problem
        .world_state
        .refresh_reachable_if_needed(domain, &problem.entities);
    let goals_snapshot: Vec<(Goal, i32)> = problem
        .goal_stack
        .goals()
        .iter()
        .rev()
        .flat_map(|(p, goals)| goals.iter().map(move |g| (g.clone(), *p)))
        .collect();

    let world_state = &problem.world_state;
    let entities = &problem.entities;
    let historical = &problem.historical;
    let ctx = world_state.eval_ctx(domain, entities, None);
    for (mut goal, priority) in goals_snapshot {
        let motivating = selected[0]
            .from_goal
            .as_ref()
            .is_some_and(|g| g.to_string() == goal.to_string() && selected[0].from_goal_priority == priority);
        if motivating {
            continue;
        }
        let gated = goal
            .condition_fact()
            .is_some_and(|cf| !ctx.facts.satisfies(cf, ctx.types));
        if gated || goal.objective().is_true(&ctx, None) {
            continue;
        }
        goal.refresh_if_needed(domain);
        let env = SearchEnv {
            domain,
            world_state,
            entities,
            historical,
            global_historical,
            allowed_actions: goal.actions_predecessors(),
            allowed_events: goal.events_predecessors(),
        };
        let mut steps = Vec::new();
        steps_for_condition(&env, &ctx, goal.objective(), 0, &mut Vec::new(), &mut Vec::new(), &mut steps);
        steps.retain(|s| s.distance == 0);
        steps.sort_by(|a, b| a.cost_key().cmp(&b.cost_key()));
        for step in steps {
            let candidate = ActionInvocationWithGoal {
                action_id: step.action_id.clone(),
                parameters: step.assignment.clone(),
                from_goal: Some(goal.clone()),
                from_goal_priority: priority,
            };
            let independent = selected
                .iter()
                .all(|chosen| !invocations_conflict(chosen, &candidate, domain, &ctx));
            if independent {
                selected.push(candidate);
                break;
            }
        }
    }
    ActionsToDoInParallel { actions: selected }
}

/// Iterates the parallel-step selection, committing each wave in sequence.
pub fn parallel_plan_for_every_goals(
    problem: &mut Problem,
    domain: &Domain,
    now: Option<Instant>,
    mut global_historical: Option<&mut Historical>,
) -> Vec<ActionsToDoInParallel> {
    let mut out = Vec::new();
    for _ in 0..MAX_PLAN_STEPS {
        let batch = actions_to_do_in_parallel_now(problem, domain, now, global_historical.as_deref_mut());
        if batch.actions.is_empty() {
            break;
        }
        for invocation in &batch.actions {
            notify_action_started(problem, domain, invocation, now);
        }
        for invocation in &batch.actions {
            notify_action_done(problem, domain, invocation, now);
            if let Some(h) = global_historical.as_deref_mut() {
                h.notify_action_done(&invocation.action_id);
            }
        }
        out.push(batch);
    }
    out
}
