//! Per-key outcome of multi-key operations

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::KeyFailure;

/// Outcome of a copy, move or tree delete.
///
/// These operations are not atomic. A report with failures describes a
/// partially applied change; every per-key step is idempotent, so the whole
/// operation can simply be retried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub operation: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<KeyFailure>,
}

impl OperationReport {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn record_ok(&mut self, key: impl Into<String>) {
        self.succeeded.push(key.into());
    }

    pub fn record_failure(&mut self, key: impl Into<String>, error: &Error) {
        self.failed.push(KeyFailure {
            key: key.into(),
            error: error.to_string(),
        });
    }

    /// Append the outcome of a follow-up step
    pub fn absorb(&mut self, other: OperationReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// True when no key failed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn a report with failures into `Error::PartialFailure`
    pub fn into_result(self) -> Result<OperationReport> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::PartialFailure(self))
        }
    }
}

impl fmt::Display for OperationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} partially failed: {} keys succeeded, {} failed",
            self.operation,
            self.succeeded.len(),
            self.failed.len()
        )?;
        if let Some(first) = self.failed.first() {
            write!(f, " (first: {}: {})", first.key, first.error)?;
        }
        Ok(())
    }
}
