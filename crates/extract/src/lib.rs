pub mod error;
pub mod llm;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod testing;
pub mod validate;

pub use error::ExtractError;
pub use llm::{DraftGenerator, OllamaClient, OllamaConfig};
pub use retry::{Accepted, RetryConfig, RetryCoordinator};
pub use schema::{
    Conversation, DraftGraph, ExtractedVariable, Message, Role, ValidationOutcome,
    PLACEHOLDER_PREFIX, is_placeholder_id, normalize_placeholder_id, placeholder_token,
};
pub use validate::{SchemaValidator, ShapeValidator};
