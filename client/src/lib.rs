pub mod backoff;
pub mod dispatch;
pub mod evm;
pub mod ledger;
pub mod orchestrator;
pub mod sequencer;
pub mod watcher;

#[cfg(test)]
pub(crate) mod mocks;

pub use backoff::RetryPolicy;
pub use dispatch::{ActionError, Dispatcher};
pub use evm::{EvmConfig, EvmLedger};
pub use ledger::{Confirmation, EventCursor, Ledger, LedgerCall, LedgerError, PollWindow};
pub use orchestrator::{OrchestrationError, SessionOrchestrator, TerminalOutcome};
pub use sequencer::{Cancellation, Policy, RotatingPolicy, SequenceReport, StageSequencer};
pub use watcher::{Completion, CompletionWatcher};
use thiserror::Error;

/// Error type for constructing a ledger backend.
#[derive(Error, Debug)]
pub enum Error {
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// Result type for backend construction.
pub type Result<T> = std::result::Result<T, Error>;
