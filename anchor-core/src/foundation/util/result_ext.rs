//! Result/Option helper traits.

use crate::foundation::AnchorError;

/// Extension for converting `Result<Option<T>>` into `Result<T>`.
pub trait ResultExt<T> {
    /// Convert `Ok(None)` into an error.
    fn required(self, error: impl FnOnce() -> AnchorError) -> Result<T, AnchorError>;
}

impl<T> ResultExt<T> for Result<Option<T>, AnchorError> {
    fn required(self, error: impl FnOnce() -> AnchorError) -> Result<T, AnchorError> {
        self?.ok_or_else(error)
    }
}
