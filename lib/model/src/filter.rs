use crate::Solution;
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNodeRef, Term, Variable};
use oxsdatatypes::{Boolean, Double};
use spargebra::algebra::{Expression, Function};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// A filter expression together with the variables it mentions.
///
/// Filters are kept as [Expression]s so that they can be shipped to endpoints that evaluate them
/// remotely. Only a subset of SPARQL can be evaluated locally (see [Filter::evaluate]); any other
/// expression is treated as an evaluation error and rejects the solution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    expression: Expression,
    variables: Arc<[Variable]>,
}

impl Filter {
    /// Creates a new [Filter]. The variables are collected in order of their first appearance.
    pub fn new(expression: Expression) -> Self {
        let mut variables = Vec::new();
        collect_variables(&expression, &mut variables);
        Self {
            expression,
            variables: variables.into(),
        }
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Splits the filter into its top-level conjuncts. A filter that is not a conjunction is its
    /// own single conjunct.
    pub fn conjuncts(&self) -> Vec<Filter> {
        let mut result = Vec::new();
        collect_conjuncts(&self.expression, &mut result);
        result.into_iter().cloned().map(Filter::new).collect()
    }

    /// Returns the sub-clauses of this filter: the operands of a top-level disjunction, or the
    /// filter itself.
    pub fn sub_clauses(&self) -> Vec<Filter> {
        let mut result = Vec::new();
        collect_disjuncts(&self.expression, &mut result);
        result.into_iter().cloned().map(Filter::new).collect()
    }

    /// Substitutes the variables bound in `solution` with their values.
    ///
    /// Blank nodes cannot be written into an expression, hence variables bound to blank nodes
    /// stay as they are.
    #[must_use]
    pub fn bind(&self, solution: &Solution) -> Filter {
        if self.variables.iter().all(|v| solution.get(v).is_none()) {
            return self.clone();
        }
        Filter::new(substitute(&self.expression, solution))
    }

    /// Evaluates this filter over `solution`.
    ///
    /// Returns false if the expression evaluates to false or raises an error (e.g., an unbound
    /// variable or an unsupported function).
    pub fn evaluate(&self, solution: &Solution) -> bool {
        evaluate_boolean(&self.expression, solution).unwrap_or(false)
    }
}

impl From<Expression> for Filter {
    fn from(expression: Expression) -> Self {
        Filter::new(expression)
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", DisplayExpression(&self.expression))
    }
}

fn collect_variables(expression: &Expression, result: &mut Vec<Variable>) {
    match expression {
        Expression::Variable(variable) | Expression::Bound(variable) => {
            if !result.contains(variable) {
                result.push(variable.clone());
            }
        }
        Expression::NamedNode(_) | Expression::Literal(_) | Expression::Exists(_) => {}
        Expression::Or(lhs, rhs)
        | Expression::And(lhs, rhs)
        | Expression::Equal(lhs, rhs)
        | Expression::SameTerm(lhs, rhs)
        | Expression::Greater(lhs, rhs)
        | Expression::GreaterOrEqual(lhs, rhs)
        | Expression::Less(lhs, rhs)
        | Expression::LessOrEqual(lhs, rhs)
        | Expression::Add(lhs, rhs)
        | Expression::Subtract(lhs, rhs)
        | Expression::Multiply(lhs, rhs)
        | Expression::Divide(lhs, rhs) => {
            collect_variables(lhs, result);
            collect_variables(rhs, result);
        }
        Expression::UnaryPlus(inner) | Expression::UnaryMinus(inner) | Expression::Not(inner) => {
            collect_variables(inner, result);
        }
        Expression::In(needle, haystack) => {
            collect_variables(needle, result);
            for candidate in haystack {
                collect_variables(candidate, result);
            }
        }
        Expression::If(test, if_true, if_false) => {
            collect_variables(test, result);
            collect_variables(if_true, result);
            collect_variables(if_false, result);
        }
        Expression::Coalesce(args) | Expression::FunctionCall(_, args) => {
            for arg in args {
                collect_variables(arg, result);
            }
        }
    }
}

fn collect_conjuncts<'e>(expression: &'e Expression, result: &mut Vec<&'e Expression>) {
    match expression {
        Expression::And(lhs, rhs) => {
            collect_conjuncts(lhs, result);
            collect_conjuncts(rhs, result);
        }
        _ => result.push(expression),
    }
}

fn collect_disjuncts<'e>(expression: &'e Expression, result: &mut Vec<&'e Expression>) {
    match expression {
        Expression::Or(lhs, rhs) => {
            collect_disjuncts(lhs, result);
            collect_disjuncts(rhs, result);
        }
        _ => result.push(expression),
    }
}

fn substitute(expression: &Expression, solution: &Solution) -> Expression {
    let binary = |lhs: &Expression, rhs: &Expression| {
        (
            Box::new(substitute(lhs, solution)),
            Box::new(substitute(rhs, solution)),
        )
    };
    let all = |args: &[Expression]| {
        args.iter()
            .map(|arg| substitute(arg, solution))
            .collect::<Vec<_>>()
    };

    match expression {
        Expression::Variable(variable) => match solution.get(variable) {
            Some(Term::NamedNode(node)) => Expression::NamedNode(node.clone()),
            Some(Term::Literal(literal)) => Expression::Literal(literal.clone()),
            _ => expression.clone(),
        },
        Expression::Bound(variable) if solution.get(variable).is_some() => {
            Expression::Literal(Literal::from(true))
        }
        Expression::Bound(_)
        | Expression::NamedNode(_)
        | Expression::Literal(_)
        | Expression::Exists(_) => expression.clone(),
        Expression::Or(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::Or(lhs, rhs)
        }
        Expression::And(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::And(lhs, rhs)
        }
        Expression::Equal(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::Equal(lhs, rhs)
        }
        Expression::SameTerm(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::SameTerm(lhs, rhs)
        }
        Expression::Greater(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::Greater(lhs, rhs)
        }
        Expression::GreaterOrEqual(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::GreaterOrEqual(lhs, rhs)
        }
        Expression::Less(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::Less(lhs, rhs)
        }
        Expression::LessOrEqual(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::LessOrEqual(lhs, rhs)
        }
        Expression::Add(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::Add(lhs, rhs)
        }
        Expression::Subtract(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::Subtract(lhs, rhs)
        }
        Expression::Multiply(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::Multiply(lhs, rhs)
        }
        Expression::Divide(lhs, rhs) => {
            let (lhs, rhs) = binary(lhs, rhs);
            Expression::Divide(lhs, rhs)
        }
        Expression::Not(inner) => Expression::Not(Box::new(substitute(inner, solution))),
        Expression::UnaryPlus(inner) => {
            Expression::UnaryPlus(Box::new(substitute(inner, solution)))
        }
        Expression::UnaryMinus(inner) => {
            Expression::UnaryMinus(Box::new(substitute(inner, solution)))
        }
        Expression::In(needle, haystack) => {
            Expression::In(Box::new(substitute(needle, solution)), all(haystack))
        }
        Expression::If(test, if_true, if_false) => Expression::If(
            Box::new(substitute(test, solution)),
            Box::new(substitute(if_true, solution)),
            Box::new(substitute(if_false, solution)),
        ),
        Expression::Coalesce(args) => Expression::Coalesce(all(args)),
        Expression::FunctionCall(function, args) => {
            Expression::FunctionCall(function.clone(), all(args))
        }
    }
}

/// Evaluates an expression to a boolean. [None] signals an evaluation error.
fn evaluate_boolean(expression: &Expression, solution: &Solution) -> Option<bool> {
    match expression {
        Expression::Bound(variable) => Some(solution.get(variable).is_some()),
        Expression::And(lhs, rhs) => match (
            evaluate_boolean(lhs, solution),
            evaluate_boolean(rhs, solution),
        ) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Expression::Or(lhs, rhs) => match (
            evaluate_boolean(lhs, solution),
            evaluate_boolean(rhs, solution),
        ) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Expression::Not(inner) => evaluate_boolean(inner, solution).map(|value| !value),
        Expression::Equal(lhs, rhs) => equals(
            &evaluate_term(lhs, solution)?,
            &evaluate_term(rhs, solution)?,
        ),
        Expression::SameTerm(lhs, rhs) => {
            Some(evaluate_term(lhs, solution)? == evaluate_term(rhs, solution)?)
        }
        Expression::Less(lhs, rhs) => compare_with(lhs, rhs, solution, Ordering::is_lt),
        Expression::LessOrEqual(lhs, rhs) => compare_with(lhs, rhs, solution, Ordering::is_le),
        Expression::Greater(lhs, rhs) => compare_with(lhs, rhs, solution, Ordering::is_gt),
        Expression::GreaterOrEqual(lhs, rhs) => {
            compare_with(lhs, rhs, solution, Ordering::is_ge)
        }
        Expression::In(needle, haystack) => {
            let needle = evaluate_term(needle, solution)?;
            let mut has_error = false;
            for candidate in haystack {
                match evaluate_term(candidate, solution).and_then(|c| equals(&needle, &c)) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => has_error = true,
                }
            }
            (!has_error).then_some(false)
        }
        Expression::FunctionCall(Function::IsIri, args) => {
            unary_term(args, solution).map(|term| matches!(term, Term::NamedNode(_)))
        }
        Expression::FunctionCall(Function::IsBlank, args) => {
            unary_term(args, solution).map(|term| matches!(term, Term::BlankNode(_)))
        }
        Expression::FunctionCall(Function::IsLiteral, args) => {
            unary_term(args, solution).map(|term| matches!(term, Term::Literal(_)))
        }
        Expression::Variable(_)
        | Expression::NamedNode(_)
        | Expression::Literal(_)
        | Expression::FunctionCall(Function::Str, _) => {
            effective_boolean_value(&evaluate_term(expression, solution)?)
        }
        _ => None,
    }
}

/// Evaluates an expression to a term. [None] signals an evaluation error.
fn evaluate_term(expression: &Expression, solution: &Solution) -> Option<Term> {
    match expression {
        Expression::NamedNode(node) => Some(node.clone().into()),
        Expression::Literal(literal) => Some(literal.clone().into()),
        Expression::Variable(variable) => solution.get(variable).cloned(),
        Expression::FunctionCall(Function::Str, args) => match unary_term(args, solution)? {
            Term::NamedNode(node) => Some(Literal::new_simple_literal(node.as_str()).into()),
            Term::Literal(literal) => Some(Literal::new_simple_literal(literal.value()).into()),
            _ => None,
        },
        _ => evaluate_boolean(expression, solution).map(|value| Literal::from(value).into()),
    }
}

fn unary_term(args: &[Expression], solution: &Solution) -> Option<Term> {
    match args {
        [arg] => evaluate_term(arg, solution),
        _ => None,
    }
}

fn compare_with(
    lhs: &Expression,
    rhs: &Expression,
    solution: &Solution,
    test: impl Fn(Ordering) -> bool,
) -> Option<bool> {
    let lhs = evaluate_term(lhs, solution)?;
    let rhs = evaluate_term(rhs, solution)?;
    compare(&lhs, &rhs).map(test)
}

/// A literal value that supports ordering comparisons.
#[derive(Debug)]
enum Comparable<'t> {
    Numeric(Double),
    Boolean(bool),
    String(&'t str),
}

const NUMERIC_TYPES: [NamedNodeRef<'static>; 16] = [
    xsd::INTEGER,
    xsd::DECIMAL,
    xsd::FLOAT,
    xsd::DOUBLE,
    xsd::INT,
    xsd::LONG,
    xsd::SHORT,
    xsd::BYTE,
    xsd::NON_NEGATIVE_INTEGER,
    xsd::NON_POSITIVE_INTEGER,
    xsd::NEGATIVE_INTEGER,
    xsd::POSITIVE_INTEGER,
    xsd::UNSIGNED_LONG,
    xsd::UNSIGNED_INT,
    xsd::UNSIGNED_SHORT,
    xsd::UNSIGNED_BYTE,
];

fn comparable(term: &Term) -> Option<Comparable<'_>> {
    let Term::Literal(literal) = term else {
        return None;
    };
    let datatype = literal.datatype();
    if NUMERIC_TYPES.contains(&datatype) {
        literal.value().parse::<Double>().ok().map(Comparable::Numeric)
    } else if datatype == xsd::BOOLEAN {
        literal
            .value()
            .parse::<Boolean>()
            .ok()
            .map(|value| Comparable::Boolean(value.into()))
    } else if datatype == xsd::STRING {
        Some(Comparable::String(literal.value()))
    } else {
        None
    }
}

fn compare(lhs: &Term, rhs: &Term) -> Option<Ordering> {
    compare_values(comparable(lhs)?, comparable(rhs)?)
}

fn compare_values(lhs: Comparable<'_>, rhs: Comparable<'_>) -> Option<Ordering> {
    match (lhs, rhs) {
        (Comparable::Numeric(lhs), Comparable::Numeric(rhs)) => lhs.partial_cmp(&rhs),
        (Comparable::Boolean(lhs), Comparable::Boolean(rhs)) => Some(lhs.cmp(&rhs)),
        (Comparable::String(lhs), Comparable::String(rhs)) => Some(lhs.cmp(rhs)),
        _ => None,
    }
}

fn equals(lhs: &Term, rhs: &Term) -> Option<bool> {
    if lhs == rhs {
        return Some(true);
    }
    let (Term::Literal(lhs_literal), Term::Literal(rhs_literal)) = (lhs, rhs) else {
        return Some(false);
    };
    match (comparable(lhs), comparable(rhs)) {
        // NaN is not equal to anything
        (Some(Comparable::Numeric(lhs)), Some(Comparable::Numeric(rhs))) => Some(lhs == rhs),
        (Some(lhs), Some(rhs)) => compare_values(lhs, rhs).map(Ordering::is_eq),
        _ if lhs_literal.language().is_some() || rhs_literal.language().is_some() => Some(false),
        _ => None,
    }
}

fn effective_boolean_value(term: &Term) -> Option<bool> {
    match comparable(term)? {
        Comparable::Boolean(value) => Some(value),
        Comparable::Numeric(value) => Some(
            value
                .partial_cmp(&Double::from(0.0))
                .is_some_and(Ordering::is_ne),
        ),
        Comparable::String(value) => Some(!value.is_empty()),
    }
}

/// Renders the locally supported part of SPARQL with infix operators. Everything else falls back
/// to spargebra's rendering.
struct DisplayExpression<'e>(&'e Expression);

impl DisplayExpression<'_> {
    fn binary(
        f: &mut Formatter<'_>,
        lhs: &Expression,
        operator: &str,
        rhs: &Expression,
    ) -> std::fmt::Result {
        write!(
            f,
            "({} {operator} {})",
            DisplayExpression(lhs),
            DisplayExpression(rhs)
        )
    }

    fn list(f: &mut Formatter<'_>, items: &[Expression]) -> std::fmt::Result {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", DisplayExpression(item))?;
        }
        Ok(())
    }
}

impl Display for DisplayExpression<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Expression::Variable(variable) => write!(f, "{variable}"),
            Expression::NamedNode(node) => write!(f, "{node}"),
            Expression::Literal(literal) => {
                let datatype = literal.datatype();
                if datatype == xsd::INTEGER
                    || datatype == xsd::DECIMAL
                    || datatype == xsd::DOUBLE
                    || datatype == xsd::BOOLEAN
                {
                    f.write_str(literal.value())
                } else {
                    write!(f, "{literal}")
                }
            }
            Expression::Bound(variable) => write!(f, "BOUND({variable})"),
            Expression::And(lhs, rhs) => Self::binary(f, lhs, "&&", rhs),
            Expression::Or(lhs, rhs) => Self::binary(f, lhs, "||", rhs),
            Expression::Equal(lhs, rhs) => Self::binary(f, lhs, "=", rhs),
            Expression::Less(lhs, rhs) => Self::binary(f, lhs, "<", rhs),
            Expression::LessOrEqual(lhs, rhs) => Self::binary(f, lhs, "<=", rhs),
            Expression::Greater(lhs, rhs) => Self::binary(f, lhs, ">", rhs),
            Expression::GreaterOrEqual(lhs, rhs) => Self::binary(f, lhs, ">=", rhs),
            Expression::SameTerm(lhs, rhs) => write!(
                f,
                "sameTerm({}, {})",
                DisplayExpression(lhs),
                DisplayExpression(rhs)
            ),
            Expression::Not(inner) => match inner.as_ref() {
                Expression::Equal(lhs, rhs) => Self::binary(f, lhs, "!=", rhs),
                Expression::In(needle, haystack) => {
                    write!(f, "({} NOT IN (", DisplayExpression(needle))?;
                    Self::list(f, haystack)?;
                    f.write_str("))")
                }
                inner => write!(f, "!{}", DisplayExpression(inner)),
            },
            Expression::In(needle, haystack) => {
                write!(f, "({} IN (", DisplayExpression(needle))?;
                Self::list(f, haystack)?;
                f.write_str("))")
            }
            Expression::FunctionCall(
                function @ (Function::IsIri | Function::IsBlank | Function::IsLiteral | Function::Str),
                args,
            ) => {
                let name = match function {
                    Function::IsIri => "isIRI",
                    Function::IsBlank => "isBlank",
                    Function::IsLiteral => "isLiteral",
                    _ => "STR",
                };
                write!(f, "{name}(")?;
                Self::list(f, args)?;
                f.write_str(")")
            }
            other => write!(f, "{other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::NamedNode;

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn v(name: &str) -> Expression {
        Expression::Variable(var(name))
    }

    fn int(value: i64) -> Expression {
        Expression::Literal(Literal::from(value))
    }

    fn iri(value: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{value}"))
    }

    fn solution(bindings: &[(&str, Term)]) -> Solution {
        bindings
            .iter()
            .map(|(name, term)| (var(name), term.clone()))
            .collect()
    }

    #[test]
    fn conjuncts_and_sub_clauses() {
        let filter = Filter::new(Expression::And(
            Box::new(Expression::Less(Box::new(v("x")), Box::new(int(3)))),
            Box::new(Expression::Or(
                Box::new(Expression::Equal(Box::new(v("y")), Box::new(v("z")))),
                Box::new(Expression::Bound(var("w"))),
            )),
        ));

        assert_eq!(filter.variables(), &[var("x"), var("y"), var("z"), var("w")]);
        let conjuncts = filter.conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[1].sub_clauses().len(), 2);
        insta::assert_snapshot!(filter, @"((?x < 3) && ((?y = ?z) || BOUND(?w)))");
    }

    #[test]
    fn numeric_comparison_uses_values() {
        let filter = Filter::new(Expression::Less(Box::new(v("x")), Box::new(int(10))));

        let small = solution(&[("x", Literal::new_typed_literal("9.5", xsd::DECIMAL).into())]);
        let large = solution(&[("x", Literal::from(11).into())]);
        let text = solution(&[("x", Literal::new_simple_literal("1").into())]);

        assert!(filter.evaluate(&small));
        assert!(!filter.evaluate(&large));
        assert!(!filter.evaluate(&text));
        assert!(!filter.evaluate(&Solution::new()));
    }

    #[test]
    fn not_equal_and_not_in() {
        let not_equal = Filter::new(Expression::Not(Box::new(Expression::Equal(
            Box::new(v("x")),
            Box::new(Expression::NamedNode(iri("alice"))),
        ))));
        let not_in = Filter::new(Expression::Not(Box::new(Expression::In(
            Box::new(v("x")),
            vec![
                Expression::NamedNode(iri("alice")),
                Expression::NamedNode(iri("bob")),
            ],
        ))));

        let alice = solution(&[("x", iri("alice").into())]);
        let dave = solution(&[("x", iri("dave").into())]);

        assert!(!not_equal.evaluate(&alice));
        assert!(not_equal.evaluate(&dave));
        assert!(!not_in.evaluate(&alice));
        assert!(not_in.evaluate(&dave));
        insta::assert_snapshot!(not_in, @"(?x NOT IN (<http://example.com/alice>, <http://example.com/bob>))");
    }

    #[test]
    fn or_tolerates_one_erroneous_branch() {
        let filter = Filter::new(Expression::Or(
            Box::new(Expression::Greater(Box::new(v("unbound")), Box::new(int(1)))),
            Box::new(Expression::FunctionCall(Function::IsIri, vec![v("x")])),
        ));

        assert!(filter.evaluate(&solution(&[("x", iri("alice").into())])));
        assert!(!filter.evaluate(&solution(&[("x", Literal::from(1).into())])));
    }

    #[test]
    fn bind_substitutes_values() {
        let filter = Filter::new(Expression::And(
            Box::new(Expression::Equal(
                Box::new(Expression::FunctionCall(Function::Str, vec![v("x")])),
                Box::new(Expression::Literal(Literal::new_simple_literal(
                    "http://example.com/alice",
                ))),
            )),
            Box::new(Expression::Bound(var("y"))),
        ));

        let bound = filter.bind(&solution(&[("x", iri("alice").into())]));
        assert_eq!(bound.variables(), &[var("y")]);
        assert!(bound.evaluate(&solution(&[("y", Literal::from(true).into())])));
        insta::assert_snapshot!(bound, @r#"((STR(<http://example.com/alice>) = "http://example.com/alice") && BOUND(?y))"#);
    }
}
