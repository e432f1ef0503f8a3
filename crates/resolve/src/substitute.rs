use extract::PLACEHOLDER_PREFIX;
use index::{Term, parse_turtle};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::ResolveError;

/// Any IRI reference in the placeholder namespace, whatever the id spelling.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"<{}([^<>\s]*)>", regex::escape(PLACEHOLDER_PREFIX)))
        .expect("placeholder pattern is valid")
});

/// Ids of all placeholder tokens in `content`, in order of appearance.
pub fn placeholder_ids(content: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Turtle form of a resolved subject: blank nodes stay as `_:label`,
/// everything else is written as an IRI reference.
fn subject_term(subject: &str) -> String {
    if subject.starts_with("_:") {
        subject.to_string()
    } else {
        format!("<{subject}>")
    }
}

fn placeholder_in(term: &Term) -> Option<&str> {
    match term {
        Term::Iri(iri) => iri.strip_prefix(PLACEHOLDER_PREFIX),
        _ => None,
    }
}

/// Fails on the first term of the parsed graph still in the placeholder
/// namespace. Catches spellings the token pattern cannot see, such as a
/// prefixed name bound to `urn:placeholder:`.
fn ensure_no_placeholders(graph: &str) -> Result<(), ResolveError> {
    let triples = parse_turtle(graph).map_err(|e| ResolveError::Malformed {
        message: e.to_string(),
    })?;
    for triple in &triples {
        let leftover = placeholder_in(&triple.subject)
            .or_else(|| triple.predicate.strip_prefix(PLACEHOLDER_PREFIX))
            .or_else(|| placeholder_in(&triple.object));
        if let Some(id) = leftover {
            return Err(ResolveError::UnresolvedPlaceholder { id: id.to_string() });
        }
    }
    Ok(())
}

/// Replace every placeholder token in `content` by its resolved subject.
///
/// Fails without rewriting anything when a placeholder has no entry in
/// `subjects`, and fails if the rewritten graph still refers to the
/// placeholder namespace in any form.
pub fn substitute(
    content: &str,
    subjects: &HashMap<String, String>,
) -> Result<String, ResolveError> {
    if let Some(missing) = placeholder_ids(content)
        .into_iter()
        .find(|id| !subjects.contains_key(*id))
    {
        return Err(ResolveError::UnresolvedPlaceholder {
            id: missing.to_string(),
        });
    }

    let replaced = PLACEHOLDER.replace_all(content, |caps: &Captures| {
        // presence checked above
        subjects
            .get(&caps[1])
            .map(|s| subject_term(s))
            .unwrap_or_default()
    });

    ensure_no_placeholders(&replaced)?;
    Ok(replaced.into_owned())
}
