use crate::bindings::Bindings;
use crate::entities::SetOfEntities;
use crate::entity::{Entity, Parameter};
use crate::fact::{Fact, FactOptional};
use crate::numeric::NumberValue;
use crate::state::SetOfFacts;
use crate::types::SetOfTypes;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Everything needed to evaluate a condition: the fact store, the type
/// forest and the entities available to quantifiers, plus the punctual
/// facts visible during the current notification cycle.
#[derive(Copy, Clone)]
pub struct EvalContext<'a> {
    pub types: &'a SetOfTypes,
    pub facts: &'a SetOfFacts,
    pub constants: &'a SetOfEntities,
    pub entities: &'a SetOfEntities,
    pub punctual: Option<&'a BTreeSet<Fact>>,
}

impl<'a> EvalContext<'a> {
    /// Ground entities of a compatible type, ontology constants first then
    /// problem entities, deduplicated, in value order within each origin.
    pub fn instances_of(&self, tpe: crate::types::TypeId) -> Vec<Entity> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for e in self
            .constants
            .instances_of_type(self.types, tpe)
            .chain(self.entities.instances_of_type(self.types, tpe))
        {
            if seen.insert(e.value().to_string()) {
                out.push(e.clone());
            }
        }
        out
    }

    pub fn fluent_value(&self, fact: &Fact) -> Option<Entity> {
        self.facts.value_of(fact).cloned()
    }
}

/// Comparison operator of an equality condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqOp {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
}

impl Display for EqOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EqOp::Equal => "=",
            EqOp::NotEqual => "!=",
            EqOp::LessThan => "<",
            EqOp::GreaterThan => ">",
        };
        write!(f, "{s}")
    }
}

/// Arithmetic over numeric fluents and literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArithExpr {
    Number(NumberValue),
    Fluent(Fact),
    Add(Box<ArithExpr>, Box<ArithExpr>),
    Sub(Box<ArithExpr>, Box<ArithExpr>),
    Mul(Box<ArithExpr>, Box<ArithExpr>),
}

impl ArithExpr {
    pub fn evaluate(&self, ctx: &EvalContext, substitution: &BTreeMap<Parameter, Entity>) -> Option<NumberValue> {
        match self {
            ArithExpr::Number(n) => Some(*n),
            ArithExpr::Fluent(fact) => {
                let fact = fact.replace_arguments(substitution);
                ctx.fluent_value(&fact).and_then(|v| v.as_number())
            }
            ArithExpr::Add(a, b) => Some(a.evaluate(ctx, substitution)? + b.evaluate(ctx, substitution)?),
            ArithExpr::Sub(a, b) => Some(a.evaluate(ctx, substitution)? - b.evaluate(ctx, substitution)?),
            ArithExpr::Mul(a, b) => Some(a.evaluate(ctx, substitution)? * b.evaluate(ctx, substitution)?),
        }
    }

    fn for_each_fluent(&self, f: &mut dyn FnMut(&Fact)) {
        match self {
            ArithExpr::Number(_) => {}
            ArithExpr::Fluent(fact) => f(fact),
            ArithExpr::Add(a, b) | ArithExpr::Sub(a, b) | ArithExpr::Mul(a, b) => {
                a.for_each_fluent(f);
                b.for_each_fluent(f);
            }
        }
    }

    fn substitute(&self, substitution: &BTreeMap<Parameter, Entity>) -> ArithExpr {
        match self {
            ArithExpr::Number(n) => ArithExpr::Number(*n),
            ArithExpr::Fluent(fact) => ArithExpr::Fluent(fact.replace_arguments(substitution)),
            ArithExpr::Add(a, b) => ArithExpr::Add(
                Box::new(a.substitute(substitution)),
                Box::new(b.substitute(substitution)),
            ),
            ArithExpr::Sub(a, b) => ArithExpr::Sub(
                Box::new(a.substitute(substitution)),
                Box::new(b.substitute(substitution)),
            ),
            ArithExpr::Mul(a, b) => ArithExpr::Mul(
                Box::new(a.substitute(substitution)),
                Box::new(b.substitute(substitution)),
            ),
        }
    }
}

impl Display for ArithExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ArithExpr::Number(n) => write!(f, "{n}"),
            ArithExpr::Fluent(fact) => write!(f, "{fact}"),
            ArithExpr::Add(a, b) => write!(f, "{a} + {b}"),
            ArithExpr::Sub(a, b) => write!(f, "{a} - {b}"),
            ArithExpr::Mul(a, b) => write!(f, "{a} * {b}"),
        }
    }
}

/// One side of an equality condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Entity(Entity),
    /// The current bound value of a functional fluent.
    Fluent(Fact),
    Arith(ArithExpr),
}

impl Term {
    fn resolve(&self, ctx: &EvalContext, bindings: Option<&Bindings>) -> Option<Entity> {
        let substitution = bindings.map(Bindings::single_assignments).unwrap_or_default();
        match self {
            Term::Entity(e) => {
                if e.is_parameter() {
                    substitution.get(&e.to_parameter()).cloned()
                } else {
                    Some(e.clone())
                }
            }
            Term::Fluent(fact) => ctx.fluent_value(&fact.replace_arguments(&substitution)),
            Term::Arith(expr) => expr.evaluate(ctx, &substitution).map(Entity::number),
        }
    }

    fn for_each_fluent(&self, f: &mut dyn FnMut(&Fact)) {
        match self {
            Term::Entity(_) => {}
            Term::Fluent(fact) => f(fact),
            Term::Arith(expr) => expr.for_each_fluent(f),
        }
    }

    fn substitute(&self, substitution: &BTreeMap<Parameter, Entity>) -> Term {
        match self {
            Term::Entity(e) => {
                if e.is_parameter() {
                    if let Some(replacement) = substitution.get(&e.to_parameter()) {
                        return Term::Entity(replacement.clone());
                    }
                }
                Term::Entity(e.clone())
            }
            Term::Fluent(fact) => Term::Fluent(fact.replace_arguments(substitution)),
            Term::Arith(expr) => Term::Arith(expr.substitute(substitution)),
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Entity(e) => write!(f, "{e}"),
            Term::Fluent(fact) => write!(f, "{fact}"),
            Term::Arith(expr) => write!(f, "{expr}"),
        }
    }
}


/// A first-order formula over facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Fact(FactOptional),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Exists(Parameter, Box<Condition>),
    Equality(EqOp, Term, Term),
}

impl Condition {
    pub fn fact(fact: Fact) -> Condition {
        Condition::Fact(FactOptional::positive(fact))
    }

    pub fn not_fact(fact: Fact) -> Condition {
        Condition::Fact(FactOptional::negative(fact))
    }

    pub fn not(condition: Condition) -> Condition {
        Condition::Not(Box::new(condition))
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        Condition::And(conditions.into_iter().collect())
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        Condition::Or(conditions.into_iter().collect())
    }

    /// `imply(a, b)` is sugar for `or(not(a), b)`.
    pub fn imply(antecedent: Condition, consequent: Condition) -> Condition {
        Condition::Or(vec![Condition::not(antecedent), consequent])
    }

    pub fn exists(parameter: Parameter, condition: Condition) -> Condition {
        Condition::Exists(parameter, Box::new(condition))
    }

    pub fn equals(lhs: Term, rhs: Term) -> Condition {
        Condition::Equality(EqOp::Equal, lhs, rhs)
    }

    /// Whether the formula holds in the current world under the optional
    /// existing bindings, refining them along the way: conjunctions
    /// intersect the possibilities of each parameter, disjunctions union
    /// them.
    pub fn is_true(&self, ctx: &EvalContext, mut bindings: Option<&mut Bindings>) -> bool {
        match self {
            Condition::Fact(fo) => Self::eval_fact_leaf(fo, ctx, bindings),
            Condition::Not(inner) => {
                // refinements made under a negation must not leak
                let mut scratch = bindings.as_deref().cloned();
                !inner.is_true(ctx, scratch.as_mut())
            }
            Condition::And(items) => {
                for item in items {
                    if !item.is_true(ctx, bindings.as_deref_mut()) {
                        return false;
                    }
                }
                true
            }
            Condition::Or(items) => {
                let mut holds = false;
                let mut union: Option<Bindings> = None;
                for item in items {
                    let mut branch = bindings.as_deref().cloned();
                    if item.is_true(ctx, branch.as_mut()) {
                        holds = true;
                        if let Some(b) = branch {
                            match &mut union {
                                Some(acc) => acc.merge_union(&b),
                                None => union = Some(b),
                            }
                        }
                    }
                }
                if holds {
                    if let (Some(out), Some(merged)) = (bindings, union) {
                        *out = merged;
                    }
                }
                holds
            }
            Condition::Exists(parameter, inner) => {
                for entity in ctx.instances_of(parameter.tpe) {
                    let mut substitution = BTreeMap::new();
                    substitution.insert(parameter.clone(), entity);
                    let grounded = inner.substitute(&substitution);
                    let mut branch = bindings.as_deref().cloned();
                    if grounded.is_true(ctx, branch.as_mut()) {
                        if let (Some(out), Some(b)) = (bindings.as_deref_mut(), branch) {
                            *out = b;
                        }
                        return true;
                    }
                }
                false
            }
            Condition::Equality(op, lhs, rhs) => Self::eval_equality(*op, lhs, rhs, ctx, bindings),
        }
    }

    fn eval_fact_leaf(fo: &FactOptional, ctx: &EvalContext, bindings: Option<&mut Bindings>) -> bool {
        let fact = &fo.fact;
        let found = if fact.is_punctual() {
            match ctx.punctual {
                Some(punctual) => fact.is_in_facts(punctual.iter(), ctx.types, bindings.as_deref(), false),
                None => None,
            }
        } else if fact.is_value_negated() {
            // `f(args)!=v` matches every stored fact bound to another value
            let mut result: Option<Bindings> = None;
            for stored in ctx.facts.facts_with_name(fact.name()) {
                if stored.value() == fact.value() {
                    continue;
                }
                if let Some(b) = fact.unify_with(stored, ctx.types, bindings.as_deref(), true) {
                    match &mut result {
                        None => result = Some(b),
                        Some(acc) => acc.merge_union(&b),
                    }
                }
            }
            result
        } else {
            fact.is_in_facts(
                ctx.facts.facts_with_name(fact.name()),
                ctx.types,
                bindings.as_deref(),
                false,
            )
        };
        if fo.is_negated {
            found.is_none()
        } else {
            match found {
                None => false,
                Some(refined) => bindings.map_or(true, |b| b.restrict_with(&refined)),
            }
        }
    }

    fn eval_equality(
        op: EqOp,
        lhs: &Term,
        rhs: &Term,
        ctx: &EvalContext,
        bindings: Option<&mut Bindings>,
    ) -> bool {
        let left = lhs.resolve(ctx, bindings.as_deref());
        let right = rhs.resolve(ctx, bindings.as_deref());
        match op {
            EqOp::Equal => match (left, right) {
                (Some(l), Some(r)) => l == r,
                // bind an unresolved parameter side to the resolved one
                (Some(l), None) => Self::bind_param_term(rhs, l, bindings),
                (None, Some(r)) => Self::bind_param_term(lhs, r, bindings),
                (None, None) => false,
            },
            EqOp::NotEqual => matches!((left, right), (Some(l), Some(r)) if l != r),
            EqOp::LessThan | EqOp::GreaterThan => {
                let (Some(l), Some(r)) = (left, right) else {
                    return false;
                };
                let (Some(l), Some(r)) = (l.as_number(), r.as_number()) else {
                    return false;
                };
                if op == EqOp::LessThan {
                    l < r
                } else {
                    l > r
                }
            }
        }
    }

    fn bind_param_term(term: &Term, value: Entity, bindings: Option<&mut Bindings>) -> bool {
        if let (Term::Entity(e), Some(b)) = (term, bindings) {
            if e.is_parameter() {
                return b.bind(e.to_parameter(), value);
            }
        }
        false
    }

    /// Negation normal form of the inverted formula.
    pub fn inverted(&self) -> Condition {
        match self {
            Condition::Fact(fo) => Condition::Fact(fo.inverted()),
            Condition::Not(inner) => (**inner).clone(),
            Condition::And(items) => Condition::Or(items.iter().map(|c| c.inverted()).collect()),
            Condition::Or(items) => Condition::And(items.iter().map(|c| c.inverted()).collect()),
            Condition::Exists(_, _) => Condition::not(self.clone()),
            Condition::Equality(op, lhs, rhs) => match op {
                EqOp::Equal => Condition::Equality(EqOp::NotEqual, lhs.clone(), rhs.clone()),
                EqOp::NotEqual => Condition::Equality(EqOp::Equal, lhs.clone(), rhs.clone()),
                EqOp::LessThan | EqOp::GreaterThan => Condition::not(self.clone()),
            },
        }
    }

    /// Deep clone with parameter occurrences substituted.
    pub fn substitute(&self, substitution: &BTreeMap<Parameter, Entity>) -> Condition {
        match self {
            Condition::Fact(fo) => Condition::Fact(fo.replace_arguments(substitution)),
            Condition::Not(inner) => Condition::not(inner.substitute(substitution)),
            Condition::And(items) => Condition::And(items.iter().map(|c| c.substitute(substitution)).collect()),
            Condition::Or(items) => Condition::Or(items.iter().map(|c| c.substitute(substitution)).collect()),
            Condition::Exists(parameter, inner) => {
                // the quantified parameter shadows any outer homonym
                let mut inner_subst = substitution.clone();
                inner_subst.remove(parameter);
                Condition::Exists(parameter.clone(), Box::new(inner.substitute(&inner_subst)))
            }
            Condition::Equality(op, lhs, rhs) => {
                Condition::Equality(*op, lhs.substitute(substitution), rhs.substitute(substitution))
            }
        }
    }

    /// Visits every fact leaf with its polarity (true when the fact appears
    /// positively). Fluents referenced by equalities are visited with the
    /// surrounding polarity.
    pub fn for_each_fact(&self, f: &mut dyn FnMut(&Fact, bool)) {
        self.visit_facts(f, true)
    }

    fn visit_facts(&self, f: &mut dyn FnMut(&Fact, bool), positive: bool) {
        match self {
            Condition::Fact(fo) => f(&fo.fact, positive != fo.is_negated),
            Condition::Not(inner) => inner.visit_facts(f, !positive),
            Condition::And(items) | Condition::Or(items) => {
                for item in items {
                    item.visit_facts(f, positive);
                }
            }
            Condition::Exists(_, inner) => inner.visit_facts(f, positive),
            Condition::Equality(_, lhs, rhs) => {
                lhs.for_each_fluent(&mut |fact| f(fact, positive));
                rhs.for_each_fluent(&mut |fact| f(fact, positive));
            }
        }
    }

    /// All parameters occurring free in the formula.
    pub fn parameters(&self) -> BTreeSet<Parameter> {
        let mut out = BTreeSet::new();
        self.collect_parameters(&mut out, &mut BTreeSet::new());
        out
    }

    fn collect_parameters(&self, out: &mut BTreeSet<Parameter>, shadowed: &mut BTreeSet<Parameter>) {
        let mut visit_fact = |fact: &Fact, out: &mut BTreeSet<Parameter>, shadowed: &BTreeSet<Parameter>| {
            for e in fact.arguments().iter().chain(fact.value()) {
                if e.is_parameter() {
                    let p = e.to_parameter();
                    if !shadowed.contains(&p) {
                        out.insert(p);
                    }
                }
            }
        };
        match self {
            Condition::Fact(fo) => visit_fact(&fo.fact, out, shadowed),
            Condition::Not(inner) => inner.collect_parameters(out, shadowed),
            Condition::And(items) | Condition::Or(items) => {
                for item in items {
                    item.collect_parameters(out, shadowed);
                }
            }
            Condition::Exists(parameter, inner) => {
                let newly = shadowed.insert(parameter.clone());
                inner.collect_parameters(out, shadowed);
                if newly {
                    shadowed.remove(parameter);
                }
            }
            Condition::Equality(_, lhs, rhs) => {
                let mut visit_term = |term: &Term| {
                    if let Term::Entity(e) = term {
                        if e.is_parameter() {
                            let p = e.to_parameter();
                            if !shadowed.contains(&p) {
                                out.insert(p);
                            }
                        }
                    }
                    term.for_each_fluent(&mut |fact| visit_fact(fact, out, shadowed));
                };
                visit_term(lhs);
                visit_term(rhs);
            }
        }
    }

    /// Number of clauses individually satisfied: conjunctions count each
    /// member, anything else counts as a single clause.
    pub fn count_satisfied_clauses(&self, ctx: &EvalContext) -> usize {
        match self {
            Condition::And(items) => items.iter().map(|c| c.count_satisfied_clauses(ctx)).sum(),
            other => usize::from(other.is_true(ctx, None)),
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Fact(fo) => write!(f, "{fo}"),
            Condition::Not(inner) => write!(f, "!({inner})"),
            Condition::And(items) => write!(f, "{}", items.iter().join(" & ")),
            Condition::Or(items) => write!(f, "({})", items.iter().join(" | ")),
            Condition::Exists(p, inner) => write!(f, "exists({p}, {inner})"),
            Condition::Equality(op, lhs, rhs) => write!(f, "{lhs}{op}{rhs}"),
        }
    }
}
