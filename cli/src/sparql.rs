//! Translation of SPARQL `SELECT` queries into conjunctive queries.

use anyhow::{bail, Context};
use fedfusion::model::{
    ConjunctiveQuery, Expression, Filter, Modifiers, TermPattern, TriplePattern, Variable,
};
use spargebra::algebra::GraphPattern;
use spargebra::Query;

/// A conjunctive query with the optional blocks that are left-joined onto it.
#[derive(Debug)]
pub struct SelectQuery {
    pub core: ConjunctiveQuery,
    pub optionals: Vec<ConjunctiveQuery>,
}

/// Parses `query` and translates its algebra.
///
/// Blank nodes of the query become variables that are not projected.
pub fn parse_select(query: &str, base_iri: Option<&str>) -> anyhow::Result<SelectQuery> {
    let parsed = Query::parse(query, base_iri).context("Invalid SPARQL query")?;
    let Query::Select {
        dataset, pattern, ..
    } = parsed
    else {
        bail!("Only SELECT queries are supported")
    };
    if dataset.is_some() {
        bail!("FROM and FROM NAMED are not supported")
    }
    translate(&pattern)
}

fn translate(pattern: &GraphPattern) -> anyhow::Result<SelectQuery> {
    let mut modifiers = Modifiers::new();
    let mut pattern = pattern;
    loop {
        pattern = match pattern {
            GraphPattern::Slice {
                inner,
                start,
                length,
            } => {
                if *start > 0 {
                    bail!("OFFSET is not supported")
                }
                modifiers = modifiers.with_limit(*length);
                inner
            }
            GraphPattern::Distinct { inner } | GraphPattern::Reduced { inner } => {
                modifiers = modifiers.with_distinct(true);
                inner
            }
            GraphPattern::Project { inner, variables } => {
                modifiers = modifiers.with_projection(Some(variables.clone()));
                inner
            }
            _ => break,
        };
    }

    let mut body = Body::default();
    body.collect(pattern)?;
    let core = ConjunctiveQuery::new(body.triples)
        .with_modifiers(modifiers.with_filters(body.filters.into_iter().map(Filter::new)));
    Ok(SelectQuery {
        core,
        optionals: body.optionals,
    })
}

#[derive(Default)]
struct Body {
    triples: Vec<TriplePattern>,
    filters: Vec<Expression>,
    optionals: Vec<ConjunctiveQuery>,
}

impl Body {
    fn collect(&mut self, pattern: &GraphPattern) -> anyhow::Result<()> {
        match pattern {
            GraphPattern::Bgp { patterns } => {
                self.triples.extend(patterns.iter().map(without_blank_nodes));
            }
            GraphPattern::Join { left, right } => {
                self.collect(left)?;
                self.collect(right)?;
            }
            GraphPattern::Filter { expr, inner } => {
                self.filters.push(expr.clone());
                self.collect(inner)?;
            }
            GraphPattern::LeftJoin {
                left,
                right,
                expression,
            } => {
                self.collect(left)?;
                let mut block = Body::default();
                block.collect(right)?;
                if !block.optionals.is_empty() {
                    bail!("Nested OPTIONAL blocks are not supported")
                }
                let filters = block.filters.into_iter().chain(expression.clone());
                self.optionals.push(
                    ConjunctiveQuery::new(block.triples)
                        .with_modifiers(Modifiers::new().with_filters(filters.map(Filter::new))),
                );
            }
            _ => bail!("Unsupported graph pattern: {pattern}"),
        }
        Ok(())
    }
}

fn without_blank_nodes(triple: &TriplePattern) -> TriplePattern {
    TriplePattern {
        subject: blank_node_as_variable(&triple.subject),
        predicate: triple.predicate.clone(),
        object: blank_node_as_variable(&triple.object),
    }
}

fn blank_node_as_variable(term: &TermPattern) -> TermPattern {
    if let TermPattern::BlankNode(node) = term {
        Variable::new_unchecked(format!("_{}", node.as_str())).into()
    } else {
        term.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn translates_basic_graph_patterns_with_modifiers() {
        let query = parse_select(
            "PREFIX ex: <http://example.com/>
             SELECT DISTINCT ?x WHERE { ?x ex:knows ?y . ?y ex:age ?a FILTER(?a < 30) } LIMIT 5",
            None,
        )
        .unwrap();

        assert!(query.optionals.is_empty());
        assert_eq!(query.core.len(), 2);
        assert_eq!(query.core.modifiers().filters().len(), 1);
        assert_eq!(query.core.modifiers().limit(), Some(5));
        assert!(query.core.modifiers().is_distinct());
        assert_eq!(
            query.core.modifiers().projection(),
            Some([Variable::new_unchecked("x")].as_slice())
        );
    }

    #[test]
    fn translates_optional_blocks() {
        let query = parse_select(
            "SELECT * WHERE {
               ?x <http://example.com/knows> ?y
               OPTIONAL { ?y <http://example.com/age> ?a FILTER(?a > 18) }
             }",
            None,
        )
        .unwrap();

        assert_eq!(query.optionals.len(), 1);
        assert_eq!(query.optionals[0].modifiers().filters().len(), 1);
        assert!(query.core.modifiers().filters().is_empty());
    }

    #[test]
    fn blank_nodes_become_variables() {
        let query = parse_select(
            "SELECT ?x WHERE { ?x <http://example.com/knows> [ <http://example.com/age> 25 ] }",
            None,
        )
        .unwrap();

        assert_eq!(query.core.variables().len(), 2);
        assert!(query
            .core
            .variables()
            .iter()
            .any(|variable| variable.as_str().starts_with('_')));
    }

    #[test]
    fn resolves_relative_iris() {
        let query = parse_select("SELECT ?o WHERE { <s> <p> ?o }", Some("http://example.com/"))
            .unwrap();

        assert_snapshot!(query.core, @"{ <http://example.com/s> <http://example.com/p> ?o . } [project: ?o]");
    }

    #[test]
    fn rejects_unsupported_queries() {
        for query in [
            "ASK { ?s ?p ?o }",
            "SELECT * WHERE { { ?s ?p ?o } UNION { ?o ?p ?s } }",
            "SELECT * WHERE { ?s ?p ?o } OFFSET 2",
            "SELECT * WHERE { ?s <http://example.com/p>+ ?o }",
        ] {
            assert!(parse_select(query, None).is_err(), "{query}");
        }
    }
}
