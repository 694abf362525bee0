/*!
 * Tests for configuration loading and validation
 */

use subtide::app_config::{CacheMode, Config, LogLevel, ResponseFormat, TranslationProvider};
use subtide::TranslationError;

const FULL_CONFIG: &str = r#"{
    "target_language": "Brazilian Portuguese",
    "log_level": "debug",
    "translation": {
        "provider": "anthropic",
        "available_providers": [
            {
                "type": "anthropic",
                "model": "claude-3-haiku-20240307",
                "api_key": "sk-ant-test",
                "endpoint": "",
                "rate_limit": 10
            }
        ],
        "common": {
            "batch_size": 25,
            "requests_per_minute": 40,
            "response_format": "json"
        }
    },
    "cache": {
        "mode": "persistent",
        "database_path": "/tmp/subtide-test.db"
    }
}"#;

#[test]
fn test_config_fromJson_shouldReadEverySection() {
    let config: Config = serde_json::from_str(FULL_CONFIG).unwrap();

    assert_eq!(config.target_language, "Brazilian Portuguese");
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.translation.provider, TranslationProvider::Anthropic);
    assert_eq!(config.translation.common.batch_size, 25);
    assert_eq!(config.translation.common.response_format, ResponseFormat::Json);
    assert_eq!(config.cache.mode, CacheMode::Persistent);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_fromJson_withProviderRateLimit_shouldOverrideCommonRate() {
    let config: Config = serde_json::from_str(FULL_CONFIG).unwrap();
    let settings = config.engine_settings();

    assert_eq!(settings.requests_per_minute, 10);
    assert_eq!(settings.batch_size, 25);
    assert_eq!(settings.target_language, "Brazilian Portuguese");
}

#[test]
fn test_config_fromMinimalJson_shouldApplyDefaults() {
    let config: Config = serde_json::from_str(
        r#"{ "target_language": "German", "translation": {} }"#,
    )
    .unwrap();

    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.common.response_format, ResponseFormat::Numbered);
    assert_eq!(config.cache.mode, CacheMode::Volatile);
    assert!(config.cache.database_path.is_none());
    assert_eq!(config.translation.get_model(), "llama3.2:3b");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_defaultSerialization_shouldRoundTrip() {
    let json = serde_json::to_string_pretty(&Config::default()).unwrap();
    let config: Config = serde_json::from_str(&json).unwrap();

    assert_eq!(config.target_language, Config::default().target_language);
    assert_eq!(config.translation.available_providers.len(), 4);
}

#[test]
fn test_validate_withBlankTargetLanguage_shouldReject() {
    let mut config = Config::default();
    config.target_language = "   ".to_string();

    match config.validate() {
        Err(TranslationError::Configuration(message)) => assert!(message.contains("Target language")),
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn test_providerFromStr_shouldAcceptAnyCase() {
    assert_eq!("LMStudio".parse::<TranslationProvider>().unwrap(), TranslationProvider::LMStudio);
    assert_eq!("OPENAI".parse::<TranslationProvider>().unwrap(), TranslationProvider::OpenAI);
    assert!("babelfish".parse::<TranslationProvider>().is_err());
}
