use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Search returned no candidates and no identifier minter is configured.
    #[error("no candidate subject for {text:?}")]
    NoCandidate { text: String },

    /// The draft uses a placeholder with no resolved subject. Always a bug in
    /// the generator output.
    #[error("placeholder {id} has no resolved subject")]
    UnresolvedPlaceholder { id: String },

    /// The graph is not Turtle after substitution.
    #[error("substituted graph does not parse: {message}")]
    Malformed { message: String },

    /// Search collaborator failure. Never retried.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] extract::ExtractError),

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// The store rejected the final graph.
    #[error(transparent)]
    Store(anyhow::Error),
}
