use index::SearchResponse;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::ResolveError;

/// Namespace for freshly minted subjects, an RDF 1.1 skolem IRI path.
pub const DEFAULT_MINT_NAMESPACE: &str = "https://example.org/.well-known/genid/";

/// Produces a new, unique subject IRI on every call.
pub type IdMinter = Arc<dyn Fn() -> String + Send + Sync>;

/// Mints `<namespace><uuid-v4>`.
pub fn uuid_minter(namespace: impl Into<String>) -> IdMinter {
    let namespace = namespace.into();
    Arc::new(move || format!("{namespace}{}", Uuid::new_v4()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// A subject already in the knowledge graph.
    Existing(String),
    /// A subject created because nothing matched.
    Minted(String),
}

impl Subject {
    pub fn as_str(&self) -> &str {
        match self {
            Subject::Existing(s) | Subject::Minted(s) => s,
        }
    }

    pub fn is_minted(&self) -> bool {
        matches!(self, Subject::Minted(_))
    }

    pub fn into_string(self) -> String {
        match self {
            Subject::Existing(s) | Subject::Minted(s) => s,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks one subject for a ranked candidate list.
pub trait Disambiguator: Send + Sync {
    fn choose(&self, response: &SearchResponse) -> Result<Subject, ResolveError>;
}

/// Takes the top-ranked hit; mints a subject when there is none and a
/// minter is configured.
#[derive(Clone, Default)]
pub struct Greedy {
    minter: Option<IdMinter>,
}

impl Greedy {
    /// Fails with `NoCandidate` on an empty response.
    pub fn strict() -> Self {
        Self { minter: None }
    }

    pub fn with_minter(minter: IdMinter) -> Self {
        Self {
            minter: Some(minter),
        }
    }
}

impl Disambiguator for Greedy {
    fn choose(&self, response: &SearchResponse) -> Result<Subject, ResolveError> {
        if let Some(best) = response.best() {
            return Ok(Subject::Existing(best.subject.clone()));
        }

        match &self.minter {
            Some(mint) => {
                let subject = mint();
                debug!(query = %response.text, subject = %subject, "Minted new subject");
                Ok(Subject::Minted(subject))
            }
            None => Err(ResolveError::NoCandidate {
                text: response.text.clone(),
            }),
        }
    }
}
