//! Shared builders for the integration suites.

#![allow(dead_code)]

use lyra_planning::model::{
    Condition, Entity, Fact, Ontology, Parameter, Predicate, TypeId,
};
use lyra_planning::ActionInvocationWithGoal;

/// Opt-in log output for a failing scenario:
/// `RUST_LOG=debug cargo test -- --nocapture`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Ontology with zero-argument relations, a convenient base for most
/// scenarios.
pub fn ontology_with_relations(names: &[&str]) -> Ontology {
    let mut ontology = Ontology::new();
    for name in names {
        ontology.predicates.add(Predicate::relation(*name, vec![]));
    }
    ontology
}

pub fn add_numeric_fluent(ontology: &mut Ontology, name: &str) {
    ontology
        .predicates
        .add(Predicate::fluent(name, vec![], TypeId::NUMBER));
}

/// Zero-argument relation fact.
pub fn fact(ontology: &Ontology, name: &str) -> Fact {
    Fact::new(
        &ontology.types,
        ontology.predicates.get(name).unwrap(),
        vec![],
        None,
    )
    .unwrap()
}

/// Fact over a predicate with arguments, each resolved against the
/// ontology (constants, numbers, `?`-parameters from `params`, `*`).
pub fn fact_args(ontology: &Ontology, name: &str, args: &[&str], params: &[Parameter]) -> Fact {
    let predicate = ontology.predicates.get(name).unwrap();
    let arguments: Vec<Entity> = args
        .iter()
        .zip(&predicate.parameters)
        .map(|(arg, p)| ontology.resolve(arg, p.tpe, None, params).unwrap())
        .collect();
    Fact::new(&ontology.types, predicate, arguments, None).unwrap()
}

/// Zero-argument fluent fact with a resolved value.
pub fn fluent_fact(ontology: &Ontology, name: &str, value: &str, params: &[Parameter]) -> Fact {
    let predicate = ontology.predicates.get(name).unwrap();
    let value_type = predicate.value_type.unwrap();
    let value = ontology.resolve(value, value_type, None, params).unwrap();
    Fact::new(&ontology.types, predicate, vec![], Some(value)).unwrap()
}

pub fn cond(ontology: &Ontology, name: &str) -> Condition {
    Condition::fact(fact(ontology, name))
}

pub fn not_cond(ontology: &Ontology, name: &str) -> Condition {
    Condition::not_fact(fact(ontology, name))
}

/// Action identifiers of a plan, in order.
pub fn plan_ids(plan: &[ActionInvocationWithGoal]) -> Vec<String> {
    plan.iter().map(|step| step.action_id.clone()).collect()
}
