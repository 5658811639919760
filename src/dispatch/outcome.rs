use crate::error::{PushError, RefreshData};

/// Classified result of one delivery attempt.
///
/// Every backend result maps to exactly one variant.
#[derive(Debug, Clone)]
pub enum ClassifiedOutcome {
    /// Delivered; carries the backend message id
    Success(String),
    /// Credentials must be persisted before the result can be judged
    CredentialRefresh(RefreshData),
    /// Transient failure, optionally with the backend-suggested delay in seconds
    Retryable { retry_after: Option<u64> },
    /// The target is gone for good and should be unsubscribed
    PermanentlyUnregistered,
    /// Anything else; terminal
    OtherFailure(PushError),
}

impl ClassifiedOutcome {
    pub fn classify(result: Result<String, PushError>) -> Self {
        match result {
            Ok(message_id) => Self::Success(message_id),
            Err(PushError::RefreshData(refresh)) => Self::CredentialRefresh(refresh),
            Err(PushError::Retry { retry_after }) => Self::Retryable { retry_after },
            Err(PushError::Unregistered) => Self::PermanentlyUnregistered,
            Err(error @ PushError::Other(_)) => Self::OtherFailure(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::CredentialRefresh(_) => "credential_refresh",
            Self::Retryable { .. } => "retry",
            Self::PermanentlyUnregistered => "unregistered",
            Self::OtherFailure(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_each_kind() {
        assert!(matches!(
            ClassifiedOutcome::classify(Ok("m-1".into())),
            ClassifiedOutcome::Success(ref id) if id == "m-1"
        ));
        assert!(matches!(
            ClassifiedOutcome::classify(Err(PushError::Retry { retry_after: Some(10) })),
            ClassifiedOutcome::Retryable { retry_after: Some(10) }
        ));
        assert!(matches!(
            ClassifiedOutcome::classify(Err(PushError::Unregistered)),
            ClassifiedOutcome::PermanentlyUnregistered
        ));
        assert!(matches!(
            ClassifiedOutcome::classify(Err(PushError::other("boom"))),
            ClassifiedOutcome::OtherFailure(PushError::Other(_))
        ));
        assert!(matches!(
            ClassifiedOutcome::classify(Err(PushError::RefreshData(RefreshData::default()))),
            ClassifiedOutcome::CredentialRefresh(_)
        ));
    }

    #[test]
    fn test_labels() {
        assert_eq!(ClassifiedOutcome::PermanentlyUnregistered.label(), "unregistered");
        assert_eq!(ClassifiedOutcome::Retryable { retry_after: None }.label(), "retry");
        assert_eq!(
            ClassifiedOutcome::OtherFailure(PushError::other("boom")).label(),
            "other"
        );
        assert_eq!(
            ClassifiedOutcome::CredentialRefresh(RefreshData::default()).label(),
            "credential_refresh"
        );
        assert!(ClassifiedOutcome::Success(String::new()).is_success());
        assert!(!ClassifiedOutcome::Retryable { retry_after: None }.is_success());
    }
}
