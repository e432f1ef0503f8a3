use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ExtractError, Result};
use crate::llm::DraftGenerator;
use crate::prompt;
use crate::schema::{Conversation, DraftGraph, ValidationOutcome};
use crate::validate::SchemaValidator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Generation attempts before giving up. Zero is treated as one.
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub draft: DraftGraph,
    /// 1-based attempt that produced the draft.
    pub attempts: usize,
}

/// Drives generate → validate → regenerate-with-feedback.
///
/// Only validation failures are retried. Generator and validator errors
/// end the run immediately.
pub struct RetryCoordinator {
    generator: Arc<dyn DraftGenerator>,
    validator: Arc<dyn SchemaValidator>,
    max_attempts: usize,
}

impl RetryCoordinator {
    pub fn new(
        generator: Arc<dyn DraftGenerator>,
        validator: Arc<dyn SchemaValidator>,
        config: &RetryConfig,
    ) -> Self {
        Self {
            generator,
            validator,
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Seed a conversation for `text` and run the loop.
    pub async fn generate_for_text(&self, text: &str, shapes: Option<&str>) -> Result<Accepted> {
        let context = Conversation::seed(
            prompt::build_system_prompt(shapes),
            prompt::build_user_message(text),
        );
        self.generate(context, shapes).await
    }

    pub async fn generate(&self, mut context: Conversation, shapes: Option<&str>) -> Result<Accepted> {
        let mut last_rejected: Option<(DraftGraph, String)> = None;

        for attempt in 1..=self.max_attempts {
            let draft = self
                .generator
                .generate(&context)
                .await
                .with_context(|| format!("Draft generator failed on attempt {attempt}"))?;

            let report = self
                .validator
                .validate(&draft.content, shapes)
                .await
                .with_context(|| format!("Validator failed on attempt {attempt}"))?;

            match ValidationOutcome::from(report) {
                ValidationOutcome::Valid => {
                    if attempt > 1 {
                        info!(
                            attempts = attempt,
                            variables = draft.variables.len(),
                            "Draft accepted after retries"
                        );
                    }
                    return Ok(Accepted {
                        draft,
                        attempts: attempt,
                    });
                }
                ValidationOutcome::Invalid { message } => {
                    warn!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        error = %message,
                        "Draft failed validation"
                    );
                    if attempt < self.max_attempts {
                        context = context.with_feedback(&draft, &message);
                    }
                    last_rejected = Some((draft, message));
                }
            }
        }

        let (last_draft, message) = last_rejected
            .map(|(draft, message)| (draft.content, message))
            .unwrap_or_default();
        warn!(
            attempts = self.max_attempts,
            error = %message,
            "Draft generation exhausted"
        );
        Err(ExtractError::GenerationExhausted {
            attempts: self.max_attempts,
            last_draft,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Role;
    use crate::testing::{ScriptedGenerator, ScriptedValidator};
    use crate::validate::ShapeValidator;

    const GOOD: &str = "<urn:placeholder:ENTITY_1> <http://schema.org/name> \"Ada\" .";
    const BAD: &str = "<urn:placeholder:ENTITY_1> <http://schema.org/name> ";

    fn coordinator(
        generator: Arc<ScriptedGenerator>,
        validator: Arc<dyn SchemaValidator>,
        max_attempts: usize,
    ) -> RetryCoordinator {
        RetryCoordinator::new(generator, validator, &RetryConfig { max_attempts })
    }

    #[tokio::test]
    async fn test_first_valid_draft_is_returned() {
        let generator = Arc::new(ScriptedGenerator::new().then_content(GOOD).then_content(GOOD));
        let retry = coordinator(generator.clone(), Arc::new(ShapeValidator), 3);

        let accepted = retry.generate_for_text("Ada wrote notes.", None).await.unwrap();
        assert_eq!(accepted.attempts, 1);
        assert_eq!(accepted.draft.content, GOOD);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_calls_after_success() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .then_content(BAD)
                .then_content(GOOD)
                .then_content(GOOD),
        );
        let retry = coordinator(generator.clone(), Arc::new(ShapeValidator), 5);

        let accepted = retry.generate_for_text("text", None).await.unwrap();
        assert_eq!(accepted.attempts, 2);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_after_exactly_max_attempts() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .then_content(BAD)
                .then_content(BAD)
                .then_content(BAD)
                .then_content(GOOD),
        );
        let retry = coordinator(generator.clone(), Arc::new(ShapeValidator), 3);

        let err = retry.generate_for_text("text", None).await.unwrap_err();
        match err {
            ExtractError::GenerationExhausted {
                attempts,
                last_draft,
                message,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_draft, BAD);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_feedback_reaches_next_attempt() {
        let validator = Arc::new(ScriptedValidator::new().rejecting("draft one", "missing schema:name"));
        let generator = Arc::new(
            ScriptedGenerator::new()
                .then_content("draft one")
                .then_content("draft two"),
        );
        let retry = coordinator(generator.clone(), validator, 3);

        retry.generate_for_text("text", None).await.unwrap();

        let contexts = generator.contexts();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].len(), 2);

        let second = contexts[1].messages();
        assert_eq!(second.len(), 4);
        assert_eq!(&second[..2], contexts[0].messages());
        assert_eq!(second[2].role, Role::Assistant);
        assert!(second[2].content.contains("draft one"));
        assert_eq!(second[3].role, Role::User);
        assert!(second[3].content.contains("missing schema:name"));
    }

    #[tokio::test]
    async fn test_feedback_accumulates() {
        let validator = Arc::new(
            ScriptedValidator::new()
                .rejecting("one", "first error")
                .rejecting("two", "second error"),
        );
        let generator = Arc::new(
            ScriptedGenerator::new()
                .then_content("one")
                .then_content("two")
                .then_content("three"),
        );
        let retry = coordinator(generator.clone(), validator, 3);

        let accepted = retry.generate_for_text("text", None).await.unwrap();
        assert_eq!(accepted.attempts, 3);

        let third = generator.contexts()[2].clone();
        assert_eq!(third.len(), 6);
        assert!(third.messages()[3].content.contains("first error"));
        assert!(third.messages()[5].content.contains("second error"));
    }

    #[tokio::test]
    async fn test_empty_draft_is_success() {
        let generator = Arc::new(ScriptedGenerator::new().then_content(""));
        let retry = coordinator(generator.clone(), Arc::new(ShapeValidator), 3);

        let accepted = retry.generate_for_text("nothing here", None).await.unwrap();
        assert_eq!(accepted.draft.content, "");
        assert_eq!(accepted.attempts, 1);
    }

    #[tokio::test]
    async fn test_generator_failure_is_not_retried() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .then_fail("connection refused")
                .then_content(GOOD),
        );
        let retry = coordinator(generator.clone(), Arc::new(ShapeValidator), 3);

        let err = retry.generate_for_text("text", None).await.unwrap_err();
        assert!(matches!(err, ExtractError::Collaborator(_)));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_shapes_are_passed_to_validator() {
        let validator = Arc::new(ScriptedValidator::new());
        let generator = Arc::new(ScriptedGenerator::new().then_content(GOOD));
        let retry = coordinator(generator, validator.clone(), 3);

        retry.generate_for_text("text", Some("SHAPES")).await.unwrap();
        assert_eq!(
            validator.seen(),
            vec![(GOOD.to_string(), Some("SHAPES".to_string()))]
        );
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let retry = coordinator(
            Arc::new(ScriptedGenerator::new()),
            Arc::new(ShapeValidator),
            0,
        );
        assert_eq!(retry.max_attempts(), 1);
    }
}
