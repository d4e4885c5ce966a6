//! # Error Handling
//!
//! Centralized error handling for the subscription merge pipeline. The
//! `Error` enum uses `thiserror` and distinguishes the three failure
//! classes the pipeline cares about:
//!
//! - **Per-item failures** (a single subscription fetch/parse problem) are
//!   *not* represented at the run level; the fetch stage catches them and
//!   records them in the run report so the run can continue.
//! - **Fatal-to-run failures** (sandbox contract violations, structural
//!   errors while composing the document, a run already in flight) abort
//!   the pipeline before anything is written.
//! - **Side-effect failures** (backup copy) are surfaced to the caller but
//!   never abort the main write; they travel in the run report, not here.
//!
//! `Result<T>` is the crate-wide alias used by every stage function.

use thiserror::Error;

/// Main error type for merge pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// A subscription fetch or parse failed.
    ///
    /// Raised by the fetch stage internals; the pipeline catches it per
    /// subscription and records it instead of aborting the run.
    #[error("subscription '{subscription}' failed: {message}")]
    Fetch {
        subscription: String,
        message: String,
    },

    /// A document did not have the structure a stage requires.
    ///
    /// The document model fails closed: a stage that expects a mapping and
    /// finds anything else raises this rather than coercing.
    #[error("document structure error: {context} - {message}")]
    Document { context: String, message: String },

    /// The transform script sandbox violated its contract.
    ///
    /// Covers a missing interpreter, a script that does not define the
    /// entry point, non-zero exit (with the captured stderr as message),
    /// and empty or non-object output.
    #[error("override script error: {message}")]
    Sandbox { message: String },

    /// The transform script subprocess exceeded its wall-clock timeout.
    #[error("override script execution timed out after {timeout_secs}s")]
    SandboxTimeout { timeout_secs: u64 },

    /// A merge run was triggered while another run is in flight.
    ///
    /// Runs are mutually exclusive and a concurrent trigger is rejected
    /// immediately instead of queued.
    #[error("a merge run is already in progress")]
    RunInProgress,

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An error occurred during a network operation.
    #[error("network operation error: {url} - {message}")]
    Network { url: String, message: String },

    /// An error occurred while persisting the final document.
    #[error("persist error for {path}: {message}")]
    Persist { path: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON parsing error, wrapped from `serde_json::Error`.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
