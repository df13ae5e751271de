use crate::condition::{ArithExpr, Condition, EvalContext};
use crate::entity::{Entity, Parameter};
use crate::errors::{ModelError, Result};
use crate::fact::{Fact, FactOptional};
use crate::types::TypeId;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// A ground operation on the fact store, produced by evaluating a
/// world-state modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactOp {
    Add(Fact),
    Remove(Fact),
}

/// Right-hand side of an assignment to a functional fluent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FluentValue {
    /// Removes the fact: the fluent becomes unbound.
    Undefined,
    Entity(Entity),
    /// Copies the current bound value of another fluent at evaluation time.
    Fluent(Fact),
    Expr(ArithExpr),
}

/// The effect language: what an action or an event does to the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Add(FactOptional),
    Delete(FactOptional),
    And(Vec<Modification>),
    Assign(Fact, FluentValue),
    Increase(Fact, ArithExpr),
    Decrease(Fact, ArithExpr),
    /// Expands the inner modification over every grounding of the
    /// parameter satisfying the optional condition.
    ForAll(Parameter, Option<Box<Condition>>, Box<Modification>),
    /// Conditional effect.
    When(Box<Condition>, Box<Modification>),
}

/// The facts a modification could add or remove, before evaluation.
/// Templates may still hold parameter occurrences and wildcards.
#[derive(Debug, Clone, Default)]
pub struct FactTemplates {
    pub added: Vec<Fact>,
    pub removed: Vec<Fact>,
}

impl Modification {
    pub fn add(fact: Fact) -> Modification {
        Modification::Add(FactOptional::positive(fact))
    }

    pub fn delete(fact: Fact) -> Modification {
        Modification::Delete(FactOptional::positive(fact))
    }

    pub fn and(mods: impl IntoIterator<Item = Modification>) -> Modification {
        Modification::And(mods.into_iter().collect())
    }

    /// Assignment to a functional fluent. The value slot of `fact` is
    /// ignored; the assigned value comes from `value`.
    pub fn assign(fact: Fact, value: FluentValue) -> Result<Modification> {
        if !fact.predicate().is_functional() {
            return Err(ModelError::MalformedInput(format!(
                "cannot assign to `{}`: not a functional predicate",
                fact.name()
            )));
        }
        Ok(Modification::Assign(fact, value))
    }

    pub fn increase(fact: Fact, amount: ArithExpr) -> Result<Modification> {
        Self::ensure_numeric(&fact)?;
        Ok(Modification::Increase(unbind(fact), amount))
    }

    pub fn decrease(fact: Fact, amount: ArithExpr) -> Result<Modification> {
        Self::ensure_numeric(&fact)?;
        Ok(Modification::Decrease(unbind(fact), amount))
    }

    fn ensure_numeric(fact: &Fact) -> Result<()> {
        match fact.predicate().value_type {
            Some(TypeId::NUMBER) => Ok(()),
            _ => Err(ModelError::MalformedInput(format!(
                "cannot increase or decrease `{}`: not a numeric fluent",
                fact.name()
            ))),
        }
    }

    pub fn for_all(parameter: Parameter, condition: Option<Condition>, inner: Modification) -> Modification {
        Modification::ForAll(parameter, condition.map(Box::new), Box::new(inner))
    }

    pub fn when(condition: Condition, inner: Modification) -> Modification {
        Modification::When(Box::new(condition), Box::new(inner))
    }

    /// Evaluates the modification into ground fact operations, reading the
    /// current world through `ctx` and substituting `substitution` for
    /// parameter occurrences.
    pub fn evaluate(&self, ctx: &EvalContext, substitution: &BTreeMap<Parameter, Entity>) -> Vec<FactOp> {
        let mut ops = Vec::new();
        self.evaluate_into(ctx, substitution, &mut ops);
        ops
    }

    fn evaluate_into(&self, ctx: &EvalContext, substitution: &BTreeMap<Parameter, Entity>, ops: &mut Vec<FactOp>) {
        match self {
            Modification::Add(fo) => {
                let fact = fo.fact.replace_arguments(substitution);
                if fo.is_negated {
                    ops.push(FactOp::Remove(fact));
                } else {
                    ops.push(FactOp::Add(fact));
                }
            }
            Modification::Delete(fo) => {
                let fact = fo.fact.replace_arguments(substitution);
                if fo.is_negated {
                    ops.push(FactOp::Add(fact));
                } else {
                    ops.push(FactOp::Remove(fact));
                }
            }
            Modification::And(mods) => {
                for m in mods {
                    m.evaluate_into(ctx, substitution, ops);
                }
            }
            Modification::Assign(fact, value) => {
                let fact = fact.replace_arguments(substitution);
                match value {
                    FluentValue::Undefined => ops.push(FactOp::Remove(unbind(fact))),
                    FluentValue::Entity(e) => {
                        let mut e = e.clone();
                        if e.is_parameter() {
                            if let Some(replacement) = substitution.get(&e.to_parameter()) {
                                e = replacement.clone();
                            }
                        }
                        ops.push(FactOp::Add(fact.with_value(Some(e))));
                    }
                    FluentValue::Fluent(rhs) => {
                        let rhs = rhs.replace_arguments(substitution);
                        match ctx.fluent_value(&rhs) {
                            Some(v) => ops.push(FactOp::Add(fact.with_value(Some(v)))),
                            None => ops.push(FactOp::Remove(unbind(fact))),
                        }
                    }
                    FluentValue::Expr(expr) => {
                        if let Some(n) = expr.evaluate(ctx, substitution) {
                            ops.push(FactOp::Add(fact.with_value(Some(Entity::number(n)))));
                        }
                    }
                }
            }
            Modification::Increase(fact, amount) => {
                Self::numeric_delta(fact, amount, ctx, substitution, ops, true);
            }
            Modification::Decrease(fact, amount) => {
                Self::numeric_delta(fact, amount, ctx, substitution, ops, false);
            }
            Modification::ForAll(parameter, condition, inner) => {
                for entity in ctx.instances_of(parameter.tpe) {
                    let mut grounded = substitution.clone();
                    grounded.insert(parameter.clone(), entity);
                    let holds = condition
                        .as_ref()
                        .map_or(true, |c| c.substitute(&grounded).is_true(ctx, None));
                    if holds {
                        inner.evaluate_into(ctx, &grounded, ops);
                    }
                }
            }
            Modification::When(condition, inner) => {
                if condition.substitute(substitution).is_true(ctx, None) {
                    inner.evaluate_into(ctx, substitution, ops);
                }
            }
        }
    }

    fn numeric_delta(
        fact: &Fact,
        amount: &ArithExpr,
        ctx: &EvalContext,
        substitution: &BTreeMap<Parameter, Entity>,
        ops: &mut Vec<FactOp>,
        increase: bool,
    ) {
        let fact = fact.replace_arguments(substitution);
        let current = ctx.fluent_value(&fact).and_then(|v| v.as_number());
        let delta = amount.evaluate(ctx, substitution);
        if let (Some(current), Some(delta)) = (current, delta) {
            let updated = if increase { current + delta } else { current - delta };
            ops.push(FactOp::Add(fact.with_value(Some(Entity::number(updated)))));
        }
    }

    /// Collects the fact templates this modification could add or remove.
    /// Conditional bodies are included: they are potential effects.
    pub fn fact_templates(&self) -> FactTemplates {
        let mut templates = FactTemplates::default();
        self.collect_templates(&mut templates);
        templates
    }

    fn collect_templates(&self, out: &mut FactTemplates) {
        match self {
            Modification::Add(fo) => {
                if fo.is_negated {
                    out.removed.push(fo.fact.clone());
                } else {
                    out.added.push(fo.fact.clone());
                }
            }
            Modification::Delete(fo) => {
                if fo.is_negated {
                    out.added.push(fo.fact.clone());
                } else {
                    out.removed.push(fo.fact.clone());
                }
            }
            Modification::And(mods) => {
                for m in mods {
                    m.collect_templates(out);
                }
            }
            Modification::Assign(fact, value) => match value {
                FluentValue::Undefined => out.removed.push(unbind(fact.clone())),
                FluentValue::Entity(e) => out.added.push(fact.clone().with_value(Some(e.clone()))),
                FluentValue::Fluent(_) | FluentValue::Expr(_) => out.added.push(unbind(fact.clone())),
            },
            Modification::Increase(fact, _) | Modification::Decrease(fact, _) => {
                out.added.push(unbind(fact.clone()));
            }
            Modification::ForAll(_, _, inner) => inner.collect_templates(out),
            Modification::When(_, inner) => inner.collect_templates(out),
        }
    }

    /// All parameters occurring in the modification.
    pub fn parameters(&self) -> std::collections::BTreeSet<Parameter> {
        let mut out = std::collections::BTreeSet::new();
        let templates = self.fact_templates();
        for fact in templates.added.iter().chain(&templates.removed) {
            for e in fact.arguments().iter().chain(fact.value()) {
                if e.is_parameter() {
                    out.insert(e.to_parameter());
                }
            }
        }
        self.collect_condition_parameters(&mut out);
        out
    }

    fn collect_condition_parameters(&self, out: &mut std::collections::BTreeSet<Parameter>) {
        match self {
            Modification::And(mods) => {
                for m in mods {
                    m.collect_condition_parameters(out);
                }
            }
            Modification::ForAll(parameter, condition, inner) => {
                if let Some(c) = condition {
                    out.extend(c.parameters());
                }
                inner.collect_condition_parameters(out);
                // the quantified parameter is locally scoped
                out.remove(parameter);
            }
            Modification::When(condition, inner) => {
                out.extend(condition.parameters());
                inner.collect_condition_parameters(out);
            }
            _ => {}
        }
    }
}

/// Fluent slot widened to the wildcard, matching whatever value is bound.
fn unbind(fact: Fact) -> Fact {
    let tpe = fact
        .predicate()
        .value_type
        .unwrap_or(TypeId::NUMBER);
    fact.with_value(Some(Entity::any_value(tpe)))
}

impl Display for Modification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Modification::Add(fo) => write!(f, "{fo}"),
            Modification::Delete(fo) => write!(f, "!{fo}"),
            Modification::And(mods) => write!(f, "{}", mods.iter().join(" & ")),
            Modification::Assign(fact, value) => match value {
                FluentValue::Undefined => write!(f, "assign({fact}, undefined)"),
                FluentValue::Entity(e) => write!(f, "assign({fact}, {e})"),
                FluentValue::Fluent(rhs) => write!(f, "assign({fact}, {rhs})"),
                FluentValue::Expr(expr) => write!(f, "assign({fact}, {expr})"),
            },
            Modification::Increase(fact, amount) => write!(f, "increase({fact}, {amount})"),
            Modification::Decrease(fact, amount) => write!(f, "decrease({fact}, {amount})"),
            Modification::ForAll(p, Some(c), inner) => write!(f, "forall({p}, {c}, {inner})"),
            Modification::ForAll(p, None, inner) => write!(f, "forall({p}, {inner})"),
            Modification::When(c, inner) => write!(f, "when({c}, {inner})"),
        }
    }
}
