use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Every attempt produced a draft that failed validation.
    #[error("no valid draft after {attempts} attempt(s): {message}")]
    GenerationExhausted {
        attempts: usize,
        /// Content of the last rejected draft.
        last_draft: String,
        /// Validator report for the last rejected draft.
        message: String,
    },

    /// Generator or validator failure. Never retried.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;
