//! Error conversion helpers for collaborator calls
//!
//! Provides an extension trait for attaching the affected workpiece to I/O errors.

use std::io;

use crate::application::{ApplicationError, ApplicationResult};

/// Extension trait for converting `io::Result` to `ApplicationResult` with context.
pub trait IoResultExt<T> {
    /// Add context naming the action and the object it was applied to.
    ///
    /// # Example
    /// ```ignore
    /// store.load(id).with_context("load workpiece", id)?;
    /// ```
    fn with_context(self, action: &str, subject: &str) -> ApplicationResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_context(self, action: &str, subject: &str) -> ApplicationResult<T> {
        self.map_err(|e| ApplicationError::OperationFailed {
            context: format!("{}: {}", action, subject),
            source: Box::new(e),
        })
    }
}
