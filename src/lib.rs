pub mod directory;
pub mod export;
pub mod lockout;
pub mod pattern;
pub mod probe;
pub mod report;
pub mod spray;
pub mod stats;
pub mod stream;
pub mod vars;

pub mod prelude {
    pub use crate::stats::{AttemptOutcome, OutcomeKind, RunStatistics};
    pub use crate::stream::Credential;
}
