use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

use crate::classifier::ErrorInfo;
use crate::context::OperationContext;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Sink for critical failures (pager, chat webhook, ...).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CriticalNotifier: Send + Sync {
    async fn notify(&self, info: &ErrorInfo, context: &OperationContext) -> Result<(), NotifyError>;
}

/// Default sink: a structured error record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl CriticalNotifier for LogNotifier {
    async fn notify(&self, info: &ErrorInfo, context: &OperationContext) -> Result<(), NotifyError> {
        error!(
            alert = true,
            code = %info.code,
            error_type = %info.kind,
            severity = %info.severity,
            error_message = %info.message,
            context = ?context,
            "CRITICAL ERROR ALERT"
        );
        Ok(())
    }
}
