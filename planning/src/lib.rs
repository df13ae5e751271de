//! Prioritized-goals planner.
//!
//! Given a domain (typed actions, forward-chained events and axioms) and a
//! problem (a world state plus a priority-ordered stack of goals), the
//! planner decides what to do next: the single most valuable action, a set
//! of actions executable in parallel, or a complete plan reaching as many
//! goals as possible in priority order.
//!
//! The symbolic vocabulary (types, entities, facts, conditions and
//! world-state modifications) lives in the `lyra_model` crate, re-exported
//! here as [`model`].

pub mod action;
pub mod domain;
pub mod event;
pub mod fact_index;
pub mod fmt;
pub mod goal;
pub mod goal_stack;
pub mod historical;
pub mod observer;
pub mod planner;
pub mod problem;
pub mod world_state;

pub use lyra_model as model;

pub use action::{Action, ActionId, ProblemModification};
pub use domain::Domain;
pub use event::{Axiom, Event, EventId, FullEventId, SetOfEvents, SetOfEventsId};
pub use fmt::{goals_to_string, parallel_plan_to_string, plan_to_pddl, plan_to_string};
pub use goal::Goal;
pub use goal_stack::{GoalStack, DEFAULT_PRIORITY};
pub use historical::Historical;
pub use observer::{GoalsRemovedTracker, Observers, Signal};
pub use planner::{
    actions_to_do_in_parallel_now, notify_action_done, notify_action_started,
    parallel_plan_for_every_goals, plan_for_every_goals, plan_for_more_important_goal_possible,
    ActionInvocationWithGoal, ActionsToDoInParallel, PlanOutputInfos, PlannerStepKind,
};
pub use problem::Problem;
pub use world_state::{WhatChanged, WorldState};
