pub mod disambiguate;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod substitute;

pub use disambiguate::{DEFAULT_MINT_NAMESPACE, Disambiguator, Greedy, IdMinter, Subject, uuid_minter};
pub use error::{PipelineError, ResolveError};
pub use pipeline::{Pipeline, PipelineOutput};
pub use resolver::{EntityResolver, ResolvedEntity, ResolverConfig, subject_map};
pub use substitute::{placeholder_ids, substitute};
