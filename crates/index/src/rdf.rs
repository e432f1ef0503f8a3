//! RDF term model, Turtle parsing and N-Triples serialization.
//!
//! Parsing goes through Sophia's Turtle parser; each parsed term is read back
//! from its N-Triples display form into the small owned model below, which is
//! all the stores, search adapters and validators need.

use serde::{Deserialize, Serialize};
use sophia::api::prelude::*;
// the owned `Triple` below shadows the prelude's trait of the same name
use sophia::api::triple::Triple as _;
use std::fmt;
use std::io::{BufReader, Cursor};

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

#[derive(Debug, thiserror::Error)]
pub enum RdfError {
    /// The text is not well-formed Turtle. The message is the parser's own.
    #[error("{message}")]
    Syntax { message: String },
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct TermError {
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    /// `None` for plain `xsd:string` literals.
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    /// The datatype IRI as RDF 1.1 defines it, including the implicit ones.
    pub fn datatype_iri(&self) -> &str {
        match (&self.datatype, &self.language) {
            (Some(dt), _) => dt,
            (None, Some(_)) => RDF_LANG_STRING,
            (None, None) => XSD_STRING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal(Literal),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn literal(lexical: impl Into<String>) -> Self {
        Term::Literal(Literal::plain(lexical))
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Subject key used by search hits: the IRI itself, or `_:id` for blank nodes.
    pub fn key(&self) -> String {
        match self {
            Term::Iri(iri) => iri.clone(),
            Term::BlankNode(id) => format!("_:{id}"),
            Term::Literal(lit) => lit.lexical.clone(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BlankNode(id) => write!(f, "_:{id}"),
            Term::Literal(lit) => {
                write!(f, "\"{}\"", escape_literal(&lit.lexical))?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = &lit.datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Parse a Turtle document. An empty document is zero triples, not an error.
pub fn parse_turtle(text: &str) -> Result<Vec<Triple>, RdfError> {
    let reader = BufReader::new(Cursor::new(text.as_bytes()));
    let mut out = Vec::new();
    let mut parser = sophia::turtle::parser::turtle::parse_bufread(reader);
    parser
        .try_for_each_triple(|t| -> Result<(), TermError> {
            let subject = parse_term(&t.s().to_string())?;
            let predicate = match parse_term(&t.p().to_string())? {
                Term::Iri(iri) => iri,
                other => {
                    return Err(TermError {
                        message: format!("predicate must be an IRI, got {other}"),
                    });
                }
            };
            let object = parse_term(&t.o().to_string())?;
            out.push(Triple {
                subject,
                predicate,
                object,
            });
            Ok(())
        })
        .map_err(|e| RdfError::Syntax {
            message: e.to_string(),
        })?;
    Ok(out)
}

/// Serialize triples as N-Triples, one statement per line, sorted.
pub fn to_ntriples(triples: &[Triple]) -> String {
    let mut lines: Vec<String> = triples.iter().map(|t| t.to_string()).collect();
    lines.sort();
    lines.dedup();
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Read one term back from its N-Triples display form.
fn parse_term(display: &str) -> Result<Term, TermError> {
    let s = display.trim();

    if let Some(iri) = s.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Ok(Term::Iri(iri.to_string()));
    }

    if let Some(id) = s.strip_prefix("_:") {
        return Ok(Term::BlankNode(id.to_string()));
    }

    if !s.starts_with('"') {
        return Err(TermError {
            message: format!("unsupported term form: {s}"),
        });
    }

    let mut end_quote = None;
    let mut escaped = false;
    for (i, ch) in s.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            end_quote = Some(i);
            break;
        }
    }
    let Some(end) = end_quote else {
        return Err(TermError {
            message: format!("literal is missing its closing quote: {s}"),
        });
    };

    let lexical = unescape_literal(&s[1..end]);
    let rest = s[end + 1..].trim();

    let mut literal = Literal::plain(lexical);
    if let Some(lang) = rest.strip_prefix('@') {
        literal.language = Some(lang.to_string());
    } else if let Some(dt) = rest.strip_prefix("^^") {
        let dt = dt.trim();
        let dt = dt
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .unwrap_or(dt);
        if dt != XSD_STRING && !dt.is_empty() {
            literal.datatype = Some(dt.to_string());
        }
    }

    Ok(Term::Literal(literal))
}
