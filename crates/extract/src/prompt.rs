use crate::schema::PLACEHOLDER_PREFIX;

pub fn build_system_prompt(shapes: Option<&str>) -> String {
    let mut prompt = format!(
        r#"You convert text into an RDF knowledge graph written in Turtle.

INSTRUCTIONS:
1. Identify the entities mentioned in the text (people, organizations, places, works, events, concepts)
2. Describe them and their relationships as Turtle triples, using schema.org terms where possible
3. Never invent IRIs for the entities themselves: refer to each one with a placeholder IRI
   <{PLACEHOLDER_PREFIX}ENTITY_1>, <{PLACEHOLDER_PREFIX}ENTITY_2>, ...
4. Output ONLY valid JSON, nothing else

SCHEMA:
{{
  "turtle": "@prefix schema: <http://schema.org/> . <{PLACEHOLDER_PREFIX}ENTITY_1> a schema:Person ; schema:name \"Ada Lovelace\" .",
  "variables": [
    {{"id": "ENTITY_1", "type": "http://schema.org/Person", "name": "Ada Lovelace", "text": "quote from text"}}
  ]
}}

RULES:
- Every placeholder used in "turtle" must appear exactly once in "variables"
- Placeholder ids are uppercase letters, digits and underscores
- Always write a placeholder as a full IRI in angle brackets, never as a prefixed name
- "type" is the class IRI of the entity, "name" its surface form, "text" the sentence it was found in
- Declare every prefix you use
- Output ONLY the JSON object, no markdown, no explanations"#
    );

    if let Some(shapes) = shapes {
        prompt.push_str(
            "\n\nThe graph must conform to these SHACL shapes:\n",
        );
        prompt.push_str(shapes);
    }

    prompt
}

pub fn build_user_message(text: &str) -> String {
    format!("TEXT:\n{text}\n\nJSON OUTPUT:")
}

/// Message sent back to the generator after a draft failed validation.
pub fn build_feedback_message(error: &str) -> String {
    format!(
        r#"The graph you produced failed validation:

{error}

Fix the problem and return the complete corrected JSON object. Output only valid JSON with no markdown formatting, no code blocks, no explanations."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_mentions_placeholders() {
        let prompt = build_system_prompt(None);
        assert!(prompt.contains("<urn:placeholder:ENTITY_1>"));
        assert!(!prompt.contains("SHACL"));
    }

    #[test]
    fn test_system_prompt_carries_shapes() {
        let prompt = build_system_prompt(Some("ex:PersonShape a sh:NodeShape ."));
        assert!(prompt.ends_with("ex:PersonShape a sh:NodeShape ."));
    }

    #[test]
    fn test_feedback_carries_raw_error() {
        let msg = build_feedback_message("line 3: expected '.'");
        assert!(msg.contains("line 3: expected '.'"));
    }
}
