use thiserror::Error;

/// Errors from the relay runtime.
///
/// The driver itself has no fatal path; everything here comes from the
/// runtime shell (socket setup, accept loop).
#[derive(Debug, Error)]
pub enum RelayError {
    /// Socket operation failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
