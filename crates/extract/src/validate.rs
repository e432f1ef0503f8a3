//! Draft validation.
//!
//! [`ShapeValidator`] checks syntax with the Turtle parser and, when shapes
//! are given, a small subset of SHACL node shapes:
//!
//! - `sh:targetClass` selects focus nodes by `rdf:type`
//! - `sh:property` blank nodes with `sh:path`, `sh:minCount`, `sh:maxCount`
//!   and `sh:datatype`
//!
//! Other SHACL features are ignored.

use anyhow::{Context, Result};
use async_trait::async_trait;
use index::rdf::{RDF_TYPE, Term, Triple, parse_turtle};
use std::collections::BTreeSet;

const SH: &str = "http://www.w3.org/ns/shacl#";

/// Checks a draft against optional shapes.
///
/// `Ok(None)` means the graph conforms, `Ok(Some(report))` carries a
/// human-readable violation or parse error, and `Err` is a failure of the
/// validator itself.
#[async_trait]
pub trait SchemaValidator: Send + Sync {
    async fn validate(&self, graph: &str, shapes: Option<&str>) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct ShapeValidator;

#[derive(Debug, Default)]
struct PropertyShape {
    path: String,
    min_count: Option<usize>,
    max_count: Option<usize>,
    datatype: Option<String>,
}

#[derive(Debug)]
struct NodeShape {
    target_classes: Vec<String>,
    properties: Vec<PropertyShape>,
}

fn sh(local: &str) -> String {
    format!("{SH}{local}")
}

fn objects<'a>(
    triples: &'a [Triple],
    subject: &'a Term,
    predicate: &'a str,
) -> impl Iterator<Item = &'a Term> + 'a {
    triples
        .iter()
        .filter(move |t| &t.subject == subject && t.predicate == predicate)
        .map(|t| &t.object)
}

fn first_count(triples: &[Triple], subject: &Term, predicate: &str) -> Result<Option<usize>> {
    match objects(triples, subject, predicate).next() {
        None => Ok(None),
        Some(Term::Literal(lit)) => lit
            .lexical
            .trim()
            .parse::<usize>()
            .map(Some)
            .with_context(|| format!("Invalid {predicate} value {:?}", lit.lexical)),
        Some(other) => anyhow::bail!("Invalid {predicate} value {other}"),
    }
}

fn load_shapes(shapes: &[Triple]) -> Result<Vec<NodeShape>> {
    let shape_nodes: BTreeSet<&Term> = shapes
        .iter()
        .filter(|t| t.predicate == sh("targetClass"))
        .map(|t| &t.subject)
        .collect();

    let mut out = Vec::new();
    for node in shape_nodes {
        let target_classes = objects(shapes, node, &sh("targetClass"))
            .filter_map(|t| match t {
                Term::Iri(iri) => Some(iri.clone()),
                _ => None,
            })
            .collect();

        let mut properties = Vec::new();
        for property in objects(shapes, node, &sh("property")) {
            let path = match objects(shapes, property, &sh("path")).next() {
                Some(Term::Iri(iri)) => iri.clone(),
                _ => anyhow::bail!("Property shape {property} has no IRI sh:path"),
            };
            let datatype = match objects(shapes, property, &sh("datatype")).next() {
                Some(Term::Iri(iri)) => Some(iri.clone()),
                _ => None,
            };
            properties.push(PropertyShape {
                path,
                min_count: first_count(shapes, property, &sh("minCount"))?,
                max_count: first_count(shapes, property, &sh("maxCount"))?,
                datatype,
            });
        }

        out.push(NodeShape {
            target_classes,
            properties,
        });
    }
    Ok(out)
}

/// All violations of `shapes` in `data`, one line each, sorted.
fn check(data: &[Triple], shapes: &[NodeShape]) -> Vec<String> {
    let mut violations = BTreeSet::new();

    for shape in shapes {
        let focus_nodes: BTreeSet<&Term> = data
            .iter()
            .filter(|t| {
                t.predicate == RDF_TYPE
                    && matches!(&t.object, Term::Iri(class) if shape.target_classes.contains(class))
            })
            .map(|t| &t.subject)
            .collect();

        for focus in focus_nodes {
            for property in &shape.properties {
                let values: Vec<&Term> = objects(data, focus, &property.path).collect();

                if let Some(min) = property.min_count {
                    if values.len() < min {
                        violations.insert(format!(
                            "{focus} <{}>: expected at least {min} value(s), found {}",
                            property.path,
                            values.len()
                        ));
                    }
                }
                if let Some(max) = property.max_count {
                    if values.len() > max {
                        violations.insert(format!(
                            "{focus} <{}>: expected at most {max} value(s), found {}",
                            property.path,
                            values.len()
                        ));
                    }
                }
                if let Some(datatype) = &property.datatype {
                    for value in &values {
                        let conforms = value
                            .as_literal()
                            .is_some_and(|lit| lit.datatype_iri() == datatype);
                        if !conforms {
                            violations.insert(format!(
                                "{focus} <{}>: value {value} is not of datatype <{datatype}>",
                                property.path
                            ));
                        }
                    }
                }
            }
        }
    }

    violations.into_iter().collect()
}

#[async_trait]
impl SchemaValidator for ShapeValidator {
    async fn validate(&self, graph: &str, shapes: Option<&str>) -> Result<Option<String>> {
        let data = match parse_turtle(graph) {
            Ok(data) => data,
            Err(e) => return Ok(Some(e.to_string())),
        };

        let Some(shapes) = shapes else {
            return Ok(None);
        };

        let shape_triples = parse_turtle(shapes).context("Failed to parse shapes")?;
        let node_shapes = load_shapes(&shape_triples)?;
        let violations = check(&data, &node_shapes);

        if violations.is_empty() {
            Ok(None)
        } else {
            Ok(Some(violations.join("\n")))
        }
    }
}
