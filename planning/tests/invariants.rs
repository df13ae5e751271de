//! Tests for the documented invariants: determinism, cache coherence,
//! priority safety, punctual transience and goal persistence.

mod common;

use common::*;
use lyra_planning::model::{Condition, Modification};
use lyra_planning::*;
use std::collections::BTreeMap;

fn reception_domain() -> (lyra_planning::model::Ontology, Domain) {
    let ontology = ontology_with_relations(&["greeted", "checked_in", "be_happy"]);
    let domain = Domain::with_actions(
        "reception",
        ontology.clone(),
        [
            (
                "greet".to_string(),
                Action::new(None, Modification::add(fact(&ontology, "greeted"))),
            ),
            (
                "check_in".to_string(),
                Action::new(
                    Some(cond(&ontology, "greeted")),
                    Modification::add(fact(&ontology, "checked_in")),
                ),
            ),
            (
                "good_boy".to_string(),
                Action::new(
                    Some(cond(&ontology, "checked_in")),
                    Modification::add(fact(&ontology, "be_happy")),
                ),
            ),
        ],
    )
    .unwrap();
    (ontology, domain)
}

/// Identical inputs produce identical plans.
#[test]
fn planner_output_is_deterministic() {
    init_logging();
    let (ontology, domain) = reception_domain();
    let build = || {
        let mut problem = Problem::new();
        problem.set_goals_for_priority(10, vec![Goal::new(cond(&ontology, "be_happy"))], &domain, None);
        problem
    };
    let mut first = build();
    let mut second = build();
    let plan_a = plan_for_every_goals(&mut first, &domain, None, None, None);
    let plan_b = plan_for_every_goals(&mut second, &domain, None, None, None);
    assert_eq!(plan_to_string(&plan_a, ", "), plan_to_string(&plan_b, ", "));
}

/// A satisfied non-persistent goal is dropped by the next planner call; a
/// persistent one stays.
#[test]
fn goal_satisfaction_implies_removal_unless_persistent() {
    let (ontology, domain) = reception_domain();
    let mut problem = Problem::new();
    problem.add_fact(fact(&ontology, "greeted"), &domain, None);
    problem.set_goals_for_priority(
        10,
        vec![
            Goal::new(cond(&ontology, "greeted")),
            Goal::new(cond(&ontology, "greeted")).persistent(),
        ],
        &domain,
        None,
    );
    let mut infos = PlanOutputInfos::default();
    let step =
        plan_for_more_important_goal_possible(&mut problem, &domain, false, None, None, Some(&mut infos));
    assert!(step.is_empty());
    assert_eq!(infos.kind, PlannerStepKind::FinishedOnSuccess);
    assert_eq!(infos.first_goal_in_success, Some(true));
    assert_eq!(infos.satisfied_goals.len(), 2);
    // only the persistent copy survived
    assert_eq!(problem.goal_stack.goals()[&10].len(), 1);
    assert!(problem.goal_stack.goals()[&10][0].is_persistent());
}

/// Per-goal caches follow the domain uuid: an action added after the first
/// plan is picked up by the next one.
#[test]
fn goal_caches_track_domain_mutations() {
    let ontology = ontology_with_relations(&["step_a", "goal_fact"]);
    let mut domain = Domain::with_actions(
        "evolving",
        ontology.clone(),
        [
            (
                "make_step_a".to_string(),
                Action::new(None, Modification::add(fact(&ontology, "step_a"))),
            ),
            (
                "slow_path".to_string(),
                Action::new(
                    Some(cond(&ontology, "step_a")),
                    Modification::add(fact(&ontology, "goal_fact")),
                ),
            ),
        ],
    )
    .unwrap();

    let mut problem = Problem::new();
    problem.set_goals_for_priority(
        10,
        vec![Goal::new(cond(&ontology, "goal_fact")).persistent()],
        &domain,
        None,
    );
    let step = plan_for_more_important_goal_possible(&mut problem, &domain, false, None, None, None);
    assert_eq!(plan_ids(&step), ["make_step_a"]);

    // a shortcut action appears: the cached predecessor sets are stale and
    // must be recomputed against the new uuid
    domain
        .add_action(
            "direct",
            Action::new(None, Modification::add(fact(&ontology, "goal_fact"))),
        )
        .unwrap();
    let step = plan_for_more_important_goal_possible(&mut problem, &domain, false, None, None, None);
    assert_eq!(plan_ids(&step), ["direct"]);
}

/// No action is selected that would break a strictly more important goal
/// that currently holds.
#[test]
fn priority_monotonicity() {
    let ontology = ontology_with_relations(&["quiet", "task_done"]);
    let domain = Domain::with_actions(
        "careful",
        ontology.clone(),
        [
            (
                // lexicographically first, but it wakes everyone up
                "blast".to_string(),
                Action::new(
                    None,
                    Modification::and([
                        Modification::add(fact(&ontology, "task_done")),
                        Modification::delete(fact(&ontology, "quiet")),
                    ]),
                ),
            ),
            (
                "tiptoe".to_string(),
                Action::new(
                    Some(cond(&ontology, "quiet")),
                    Modification::add(fact(&ontology, "task_done")),
                ),
            ),
        ],
    )
    .unwrap();

    // with the quiet goal satisfied above, only tiptoe is safe
    let mut problem = Problem::new();
    problem.add_fact(fact(&ontology, "quiet"), &domain, None);
    problem.set_goals(
        BTreeMap::from([
            (20, vec![Goal::new(cond(&ontology, "quiet")).persistent()]),
            (10, vec![Goal::new(cond(&ontology, "task_done"))]),
        ]),
        &domain,
        None,
    );
    let step = plan_for_more_important_goal_possible(&mut problem, &domain, false, None, None, None);
    assert_eq!(plan_ids(&step), ["tiptoe"]);

    // without the protecting goal, the identifier order wins
    let mut problem = Problem::new();
    problem.add_fact(fact(&ontology, "quiet"), &domain, None);
    problem.set_goals_for_priority(10, vec![Goal::new(cond(&ontology, "task_done"))], &domain, None);
    let step = plan_for_more_important_goal_possible(&mut problem, &domain, false, None, None, None);
    assert_eq!(plan_ids(&step), ["blast"]);
}

/// The problem historical outweighs the global one, which still breaks
/// remaining ties.
#[test]
fn global_historical_breaks_ties() {
    let ontology = ontology_with_relations(&["done"]);
    let domain = Domain::with_actions(
        "repetitive",
        ontology.clone(),
        [
            (
                "way_a".to_string(),
                Action::new(None, Modification::add(fact(&ontology, "done"))),
            ),
            (
                "way_b".to_string(),
                Action::new(None, Modification::add(fact(&ontology, "done"))),
            ),
        ],
    )
    .unwrap();

    let mut global = Historical::new();
    global.notify_action_done("way_a");

    let mut problem = Problem::new();
    problem.set_goals_for_priority(10, vec![Goal::new(cond(&ontology, "done"))], &domain, None);
    let step =
        plan_for_more_important_goal_possible(&mut problem, &domain, false, None, Some(&global), None);
    assert_eq!(plan_ids(&step), ["way_b"]);
}

/// An unreachable goal fails without stalling the planner, and the output
/// infos say so.
#[test]
fn unreachable_goal_reports_failure() {
    let ontology = ontology_with_relations(&["impossible"]);
    let domain = Domain::new("empty", ontology.clone());
    let mut problem = Problem::new();
    problem.set_goals_for_priority(10, vec![Goal::new(cond(&ontology, "impossible"))], &domain, None);

    let mut infos = PlanOutputInfos::default();
    let step =
        plan_for_more_important_goal_possible(&mut problem, &domain, false, None, None, Some(&mut infos));
    assert!(step.is_empty());
    assert_eq!(infos.kind, PlannerStepKind::FinishedOnFailure);
    assert_eq!(infos.first_goal_in_success, Some(false));
    assert_eq!(infos.not_satisfied_goals, 1);
}

/// The convenience sweep drops satisfied goals from the top of the stack
/// and stops at the first unsatisfied one.
#[test]
fn satisfied_top_goals_can_be_swept() {
    let (ontology, domain) = reception_domain();
    let mut problem = Problem::new();
    problem.add_fact(fact(&ontology, "greeted"), &domain, None);
    problem.set_goals_for_priority(
        10,
        vec![
            Goal::new(cond(&ontology, "greeted")),
            Goal::new(cond(&ontology, "be_happy")),
            Goal::new(cond(&ontology, "greeted")),
        ],
        &domain,
        None,
    );
    problem.remove_first_goals_that_are_already_satisfied(&domain, None);
    let remaining = goals_to_string(problem.goal_stack.goals().values().flatten(), ", ");
    assert_eq!(remaining, "be_happy, greeted");
}

/// The removed-goals tracker reports goals gone since its last snapshot.
#[test]
fn goals_removed_tracker_diffs_snapshots() {
    let (ontology, domain) = reception_domain();
    let mut problem = Problem::new();
    problem.set_goals_for_priority(
        10,
        vec![
            Goal::new(cond(&ontology, "be_happy")).with_group_id("visit"),
            Goal::new(cond(&ontology, "checked_in")),
        ],
        &domain,
        None,
    );
    let mut tracker = GoalsRemovedTracker::new(&problem.goal_stack);

    problem.remove_goals("visit", &domain, None);
    let removed = tracker.removed_goals(&problem.goal_stack);
    assert_eq!(removed.len(), 1);
    assert!(removed.contains("be_happy"));
    // a second diff without further changes is empty
    assert!(tracker.removed_goals(&problem.goal_stack).is_empty());
}

/// Punctual facts can chain into stored consequences but never persist,
/// whatever the sequence of operations.
#[test]
fn punctual_facts_never_persist() {
    let mut ontology = ontology_with_relations(&["engaged"]);
    ontology
        .predicates
        .add(lyra_planning::model::Predicate::relation("~user_spoke", vec![]));
    let mut domain = Domain::new("dialog", ontology.clone());
    domain.add_set_of_events(
        SetOfEvents::from_event(Event::new(
            Condition::fact(fact(&ontology, "~user_spoke")),
            Modification::add(fact(&ontology, "engaged")),
        )),
        "soe",
    );

    let mut problem = Problem::new();
    problem.add_fact(fact(&ontology, "~user_spoke"), &domain, None);
    problem.add_fact(fact(&ontology, "~user_spoke"), &domain, None);
    assert!(problem.world_state.has_fact(&fact(&ontology, "engaged")));
    for stored in problem.world_state.facts().iter() {
        assert!(!stored.is_punctual());
    }
    assert_eq!(problem.world_state.facts().len(), 1);
}

/// An axiom-derived predicate follows its body through additions and
/// retractions.
#[test]
fn axioms_keep_the_derived_predicate_closed() {
    let ontology = ontology_with_relations(&["raining", "cloudy", "gloomy"]);
    let mut domain = Domain::new("weather", ontology.clone());
    domain.add_axioms(
        [Axiom::new(
            fact(&ontology, "gloomy"),
            Condition::and([cond(&ontology, "raining"), cond(&ontology, "cloudy")]),
        )],
        "axioms",
    );

    let mut problem = Problem::new();
    problem.add_fact(fact(&ontology, "raining"), &domain, None);
    assert!(!problem.world_state.has_fact(&fact(&ontology, "gloomy")));
    problem.add_fact(fact(&ontology, "cloudy"), &domain, None);
    assert!(problem.world_state.has_fact(&fact(&ontology, "gloomy")));
    problem.remove_fact(&fact(&ontology, "raining"), &domain, None);
    assert!(!problem.world_state.has_fact(&fact(&ontology, "gloomy")));
}
