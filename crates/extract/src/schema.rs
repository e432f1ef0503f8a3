use serde::{Deserialize, Serialize};

/// Reserved IRI namespace for placeholder subjects in a draft graph.
///
/// A draft refers to a not-yet-resolved entity as `<urn:placeholder:ENTITY_1>`;
/// the variable id is the part after the prefix.
pub const PLACEHOLDER_PREFIX: &str = "urn:placeholder:";

/// The placeholder token for a variable id, as it appears in Turtle.
pub fn placeholder_token(id: &str) -> String {
    format!("<{PLACEHOLDER_PREFIX}{id}>")
}

/// Placeholder ids are non-empty runs of ASCII letters, digits and underscores.
pub fn is_placeholder_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strip an echoed `<urn:placeholder:...>` wrapper down to the bare id.
///
/// Returns `None` when what is left is not a placeholder id.
pub fn normalize_placeholder_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(trimmed);
    let id = trimmed.strip_prefix(PLACEHOLDER_PREFIX).unwrap_or(trimmed);
    is_placeholder_id(id).then(|| id.to_string())
}

/// An entity mention the generator replaced with a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedVariable {
    pub id: String,
    /// Target class IRI or shorthand.
    #[serde(rename = "type", default)]
    pub entity_type: String,
    /// Surface form, e.g. "Ada Lovelace".
    #[serde(default)]
    pub name: String,
    /// Source snippet the mention was taken from.
    #[serde(default)]
    pub text: String,
}

impl ExtractedVariable {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            name: name.into(),
            text: String::new(),
        }
    }

    /// Text used to look the entity up: the name, or the snippet when the
    /// generator left the name empty.
    pub fn search_text(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.text
        } else {
            &self.name
        }
    }
}

/// A candidate graph fragment with placeholder subjects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftGraph {
    /// Turtle text.
    pub content: String,
    pub variables: Vec<ExtractedVariable>,
}

/// JSON object the generator is asked to produce.
#[derive(Serialize, Deserialize)]
struct DraftPayload {
    #[serde(default)]
    turtle: String,
    #[serde(default)]
    variables: Vec<ExtractedVariable>,
}

impl DraftGraph {
    pub fn new(content: impl Into<String>, variables: Vec<ExtractedVariable>) -> Self {
        Self {
            content: content.into(),
            variables,
        }
    }

    /// Read a generator response.
    ///
    /// Anything that is not the expected JSON object, including one whose
    /// variable ids break the placeholder grammar, becomes a draft whose
    /// content is the raw text, so validation rejects it and the retry loop
    /// feeds the parser error back.
    pub fn from_generator_output(raw: &str) -> Self {
        let unreadable = || Self {
            content: raw.to_string(),
            variables: Vec::new(),
        };

        let body = strip_code_fence(raw);
        let Ok(payload) = serde_json::from_str::<DraftPayload>(body) else {
            return unreadable();
        };

        let mut variables = Vec::with_capacity(payload.variables.len());
        for mut v in payload.variables {
            let Some(id) = normalize_placeholder_id(&v.id) else {
                return unreadable();
            };
            v.id = id;
            variables.push(v);
        }

        Self {
            content: payload.turtle,
            variables,
        }
    }

    /// The draft in the generator's own output format.
    pub fn to_generator_output(&self) -> String {
        let payload = DraftPayload {
            turtle: self.content.clone(),
            variables: self.variables.clone(),
        };
        serde_json::to_string(&payload).unwrap_or_else(|_| self.content.clone())
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered message log sent to the generator.
///
/// Never mutated in place: every retry builds a new value from the previous
/// one, so the exact input of each attempt can be inspected afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn seed(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(vec![Message::system(system), Message::user(user)])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// A new conversation with `more` appended.
    pub fn extended(&self, more: impl IntoIterator<Item = Message>) -> Self {
        let mut messages = self.messages.clone();
        messages.extend(more);
        Self { messages }
    }

    /// The rejected draft as the assistant's turn, then the validator report
    /// as the user's reply.
    pub fn with_feedback(&self, draft: &DraftGraph, error: &str) -> Self {
        self.extended([
            Message::assistant(draft.to_generator_output()),
            Message::user(crate::prompt::build_feedback_message(error)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid { message: String },
}

impl From<Option<String>> for ValidationOutcome {
    fn from(report: Option<String>) -> Self {
        match report {
            None => ValidationOutcome::Valid,
            Some(message) => ValidationOutcome::Invalid { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generator_output() {
        let raw = r#"{
            "turtle": "<urn:placeholder:ENTITY_1> <http://schema.org/name> \"Ada\" .",
            "variables": [
                {"id": "urn:placeholder:ENTITY_1", "type": "http://schema.org/Person", "name": "Ada", "text": "Ada wrote notes"}
            ]
        }"#;
        let draft = DraftGraph::from_generator_output(raw);
        assert!(draft.content.contains("<urn:placeholder:ENTITY_1>"));
        assert_eq!(draft.variables.len(), 1);
        assert_eq!(draft.variables[0].id, "ENTITY_1");
        assert_eq!(draft.variables[0].entity_type, "http://schema.org/Person");
    }

    #[test]
    fn test_fenced_output_is_accepted() {
        let raw = "```json\n{\"turtle\": \"\", \"variables\": []}\n```";
        let draft = DraftGraph::from_generator_output(raw);
        assert_eq!(draft, DraftGraph::default());
    }

    #[test]
    fn test_non_json_output_kept_raw() {
        let draft = DraftGraph::from_generator_output("Sorry, I cannot help.");
        assert_eq!(draft.content, "Sorry, I cannot help.");
        assert!(draft.variables.is_empty());
    }

    #[test]
    fn test_generator_output_roundtrip() {
        let draft = DraftGraph::new(
            "<urn:placeholder:ENTITY_1> a <http://schema.org/Person> .",
            vec![ExtractedVariable::new("ENTITY_1", "http://schema.org/Person", "Ada")],
        );
        assert_eq!(
            DraftGraph::from_generator_output(&draft.to_generator_output()),
            draft
        );
    }

    #[test]
    fn test_normalize_placeholder_id() {
        assert_eq!(normalize_placeholder_id("ENTITY_1").as_deref(), Some("ENTITY_1"));
        assert_eq!(
            normalize_placeholder_id("urn:placeholder:ENTITY_2").as_deref(),
            Some("ENTITY_2")
        );
        assert_eq!(
            normalize_placeholder_id("<urn:placeholder:ENTITY_3>").as_deref(),
            Some("ENTITY_3")
        );
        assert_eq!(placeholder_token("ENTITY_1"), "<urn:placeholder:ENTITY_1>");
    }

    #[test]
    fn test_ids_outside_grammar_are_rejected() {
        assert_eq!(normalize_placeholder_id("ENTITY-1"), None);
        assert_eq!(normalize_placeholder_id("<urn:placeholder:>"), None);
        assert_eq!(normalize_placeholder_id("ph:ENTITY_1"), None);
        assert_eq!(normalize_placeholder_id("  "), None);
    }

    #[test]
    fn test_bad_variable_id_makes_output_unreadable() {
        let raw = r#"{"turtle": "<urn:placeholder:ENTITY-1> a <http://schema.org/Person> .", "variables": [{"id": "ENTITY-1", "name": "Ada"}]}"#;
        let draft = DraftGraph::from_generator_output(raw);
        assert_eq!(draft.content, raw);
        assert!(draft.variables.is_empty());
    }

    #[test]
    fn test_search_text_falls_back_to_snippet() {
        let mut v = ExtractedVariable::new("E", "Person", "  ");
        v.text = "the inventor".to_string();
        assert_eq!(v.search_text(), "the inventor");
    }

    #[test]
    fn test_extended_leaves_original_untouched() {
        let base = Conversation::seed("system", "text");
        let next = base.extended([Message::assistant("draft"), Message::user("error")]);
        assert_eq!(base.len(), 2);
        assert_eq!(next.len(), 4);
        assert_eq!(&next.messages()[..2], base.messages());
    }

    #[test]
    fn test_with_feedback_appends_draft_and_error() {
        let base = Conversation::seed("system", "text");
        let draft = DraftGraph::new("<a> <b> ", Vec::new());
        let next = base.with_feedback(&draft, "unexpected end of input");

        assert_eq!(base.len(), 2);
        assert_eq!(next.len(), 4);
        assert_eq!(next.messages()[2].role, Role::Assistant);
        assert_eq!(
            DraftGraph::from_generator_output(&next.messages()[2].content),
            draft
        );
        assert_eq!(next.messages()[3].role, Role::User);
        assert!(next.messages()[3].content.contains("unexpected end of input"));
    }
}
