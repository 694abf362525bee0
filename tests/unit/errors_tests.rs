/*!
 * Tests for error classification and messages
 */

use subtide::{ProviderError, SubtitleError, TranslationError};

#[test]
fn test_fromStatus_shouldClassifyAuthAndRateLimit() {
    assert!(matches!(
        ProviderError::from_status(401, "bad key".into()),
        ProviderError::AuthenticationError(_)
    ));
    assert!(matches!(
        ProviderError::from_status(429, "slow down".into()),
        ProviderError::RateLimitExceeded(_)
    ));
    assert!(matches!(
        ProviderError::from_status(503, "busy".into()),
        ProviderError::ApiError { status_code: 503, .. }
    ));
}

#[test]
fn test_translationError_fromConnectionError_shouldBeConnectivityLost() {
    let error: TranslationError = ProviderError::ConnectionError("refused".into()).into();

    assert!(matches!(error, TranslationError::Connectivity(_)));
    assert_eq!(error.to_string(), "connectivity lost");
}

#[test]
fn test_translationError_fromApiError_shouldKeepProviderMessage() {
    let error: TranslationError = ProviderError::ApiError {
        status_code: 500,
        message: "internal".into(),
    }
    .into();

    assert!(matches!(error, TranslationError::Provider(_)));
    assert_eq!(error.to_string(), "Provider error: API responded with error: 500 - internal");
}

#[test]
fn test_validationError_shouldNameSourceText() {
    let error = TranslationError::Validation {
        source_text: "Where is it?".into(),
    };
    assert!(error.to_string().contains("\"Where is it?\""));
}

#[test]
fn test_subtitleError_malformed_shouldNameBlock() {
    let error = SubtitleError::Malformed {
        block: 3,
        message: "missing timestamp line".into(),
    };
    assert_eq!(error.to_string(), "Malformed subtitle block 3: missing timestamp line");
}
