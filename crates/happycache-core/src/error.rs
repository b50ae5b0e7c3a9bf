//! Error taxonomy for happycache-core.
//!
//! A `thiserror`-derived enum plus a crate-local `Result` alias.
//! Per-file probe/prefetch failures are deliberately *not* represented
//! here — they're logged and the file is skipped in place, rather than
//! propagated. `HappycacheError` covers only the fatal and format-error
//! classes, which abort the run.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum HappycacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed map entry: {reason} ({line:?})")]
    Format { line: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, HappycacheError>;
