/*!
 * End-to-end tests of the controller: SRT in, SRT out, with sessions and
 * the persistent cache stored in a temporary database.
 */

use std::sync::Arc;

use subtide::app_config::CacheMode;
use subtide::database::Repository;
use subtide::database::models::SessionStatus;
use subtide::providers::mock::MockProvider;
use subtide::subtitle_processor::SubtitleCollection;
use subtide::{Controller, ProviderError, RunOutcome, TranslateOptions};

use crate::common;

#[tokio::test]
async fn test_run_withWorkingProvider_shouldWriteTranslatedFile() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::create_test_subtitle(dir.path(), "movie.srt", &["Hello", "", "World"]).unwrap();
    let config = common::test_config(dir.path(), 2);
    let repository = Repository::open(config.cache.database_path.clone().unwrap()).unwrap();
    let provider = Arc::new(MockProvider::dictionary(&[("Hello", "Bonjour"), ("World", "Monde")]));
    let controller = Controller::with_repository(config, repository).with_provider(provider.clone());

    let outcome = controller.run(&TranslateOptions::new(&input)).await.unwrap();

    let expected_output = dir.path().join("movie.french.srt");
    assert_eq!(outcome, RunOutcome::Completed { output_file: expected_output.clone() });

    let translated = SubtitleCollection::read_srt(&expected_output).unwrap();
    assert_eq!(translated.source_texts(), vec!["Bonjour", "", "Monde"]);
    assert_eq!(translated.entries[2].start_time_ms, 2000);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_run_withExistingOutput_shouldSkipUnlessForced() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::create_test_subtitle(dir.path(), "movie.srt", &["Hello"]).unwrap();
    let output = common::create_test_file(dir.path(), "movie.french.srt", "existing").unwrap();
    let config = common::test_config(dir.path(), 2);
    let repository = Repository::open(config.cache.database_path.clone().unwrap()).unwrap();
    let provider = Arc::new(MockProvider::working());
    let controller = Controller::with_repository(config, repository).with_provider(provider.clone());

    let outcome = controller.run(&TranslateOptions::new(&input)).await.unwrap();
    assert_eq!(outcome, RunOutcome::Skipped { output_file: output.clone() });
    assert_eq!(provider.call_count(), 0);

    let mut options = TranslateOptions::new(&input);
    options.force_overwrite = true;
    let outcome = controller.run(&options).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed { output_file: output.clone() });
    assert!(std::fs::read_to_string(&output).unwrap().contains("[tr] Hello"));
}

#[tokio::test]
async fn test_run_afterConnectivityLoss_shouldResumeWithoutRetranslating() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::create_test_subtitle(dir.path(), "movie.srt", &["a", "b", "c", "d", "e"]).unwrap();
    let mut config = common::test_config(dir.path(), 2);
    config.cache.mode = CacheMode::Disabled;
    let db_path = config.cache.database_path.clone().unwrap();

    let failing = Arc::new(
        MockProvider::working()
            .fail_on_call(2, ProviderError::ConnectionError("connection reset".to_string())),
    );
    let controller = Controller::with_repository(config.clone(), Repository::open(&db_path).unwrap())
        .with_provider(failing);

    let outcome = controller.run(&TranslateOptions::new(&input)).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Interrupted {
            resume_index: 2,
            total_lines: 5,
            reason: Some("connectivity lost".to_string()),
        }
    );
    assert!(!dir.path().join("movie.french.srt").exists());

    let repository = Repository::open(&db_path).unwrap();
    let lines = repository.connection().execute(|conn| {
        let status: String = conn.query_row("SELECT status FROM sessions", [], |row| row.get(0))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM session_lines", [], |row| row.get(0))?;
        Ok((status, count))
    });
    assert_eq!(lines.unwrap(), (SessionStatus::Paused.to_string(), 2));

    let working = Arc::new(MockProvider::working());
    let controller = Controller::with_repository(config, repository).with_provider(working.clone());
    let outcome = controller.run(&TranslateOptions::new(&input)).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(
        working.requested_lines(),
        vec!["c".to_string(), "d".to_string(), "e".to_string()]
    );

    let translated = SubtitleCollection::read_srt(dir.path().join("movie.french.srt")).unwrap();
    assert_eq!(
        translated.source_texts(),
        vec!["[tr] a", "[tr] b", "[tr] c", "[tr] d", "[tr] e"]
    );
}

#[tokio::test]
async fn test_run_withLostSessionLine_shouldTranslateItAgain() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::create_test_subtitle(dir.path(), "movie.srt", &["a", "b", "c", "d", "e"]).unwrap();
    let mut config = common::test_config(dir.path(), 2);
    config.cache.mode = CacheMode::Disabled;
    let db_path = config.cache.database_path.clone().unwrap();

    let failing = Arc::new(
        MockProvider::working().fail_on_call(2, ProviderError::ConnectionError("connection reset".into())),
    );
    Controller::with_repository(config.clone(), Repository::open(&db_path).unwrap())
        .with_provider(failing)
        .run(&TranslateOptions::new(&input))
        .await
        .unwrap();

    let repository = Repository::open(&db_path).unwrap();
    repository
        .connection()
        .execute(|conn| {
            conn.execute("DELETE FROM session_lines WHERE line_index = 1", [])?;
            Ok(())
        })
        .unwrap();

    let working = Arc::new(MockProvider::working());
    let controller = Controller::with_repository(config, repository).with_provider(working.clone());
    let outcome = controller.run(&TranslateOptions::new(&input)).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(working.requested_lines(), vec!["b", "c", "d", "e"]);

    let translated = SubtitleCollection::read_srt(dir.path().join("movie.french.srt")).unwrap();
    assert_eq!(
        translated.source_texts(),
        vec!["[tr] a", "[tr] b", "[tr] c", "[tr] d", "[tr] e"]
    );
}

#[tokio::test]
async fn test_run_withFresh_shouldStartOver() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::create_test_subtitle(dir.path(), "movie.srt", &["a", "b", "c"]).unwrap();
    let mut config = common::test_config(dir.path(), 1);
    config.cache.mode = CacheMode::Disabled;
    let db_path = config.cache.database_path.clone().unwrap();

    let failing = Arc::new(MockProvider::working().fail_on_call(2, ProviderError::ConnectionError("down".into())));
    let controller = Controller::with_repository(config.clone(), Repository::open(&db_path).unwrap())
        .with_provider(failing);
    controller.run(&TranslateOptions::new(&input)).await.unwrap();

    let working = Arc::new(MockProvider::working());
    let controller = Controller::with_repository(config, Repository::open(&db_path).unwrap())
        .with_provider(working.clone());
    let mut options = TranslateOptions::new(&input);
    options.fresh = true;
    let outcome = controller.run(&options).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert_eq!(working.call_count(), 3);
}

#[tokio::test]
async fn test_run_withPersistentCache_shouldReuseTranslationsAcrossFiles() {
    let dir = common::create_temp_dir().unwrap();
    let first = common::create_test_subtitle(dir.path(), "one.srt", &["Hello", "World"]).unwrap();
    let second = common::create_test_subtitle(dir.path(), "two.srt", &["World", "Hello", "Again"]).unwrap();
    let mut config = common::test_config(dir.path(), 5);
    config.cache.mode = CacheMode::Persistent;
    let db_path = config.cache.database_path.clone().unwrap();

    let provider = Arc::new(MockProvider::working());
    Controller::with_repository(config.clone(), Repository::open(&db_path).unwrap())
        .with_provider(provider)
        .run(&TranslateOptions::new(&first))
        .await
        .unwrap();

    let provider = Arc::new(MockProvider::working());
    let controller = Controller::with_repository(config, Repository::open(&db_path).unwrap())
        .with_provider(provider.clone());
    controller.run(&TranslateOptions::new(&second)).await.unwrap();

    assert_eq!(provider.requested_lines(), vec!["Again".to_string()]);

    let removed = controller.clear_cache().await.unwrap();
    assert_eq!(removed, 3);
}

#[tokio::test]
async fn test_run_withInvalidConfig_shouldRejectBeforeAnyCall() {
    let dir = common::create_temp_dir().unwrap();
    let input = common::create_test_subtitle(dir.path(), "movie.srt", &["Hello"]).unwrap();
    let mut config = common::test_config(dir.path(), 2);
    config.translation.common.batch_size = 0;
    let repository = Repository::new_in_memory().unwrap();
    let provider = Arc::new(MockProvider::working());
    let controller = Controller::with_repository(config, repository).with_provider(provider.clone());

    let err = controller.run(&TranslateOptions::new(&input)).await.unwrap_err();

    assert!(err.to_string().contains("batch_size"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_checkProvider_shouldReportReachability() {
    let dir = common::create_temp_dir().unwrap();
    let config = common::test_config(dir.path(), 2);

    let reachable = Controller::with_repository(config.clone(), Repository::new_in_memory().unwrap())
        .with_provider(Arc::new(MockProvider::working()));
    assert!(reachable.check_provider().await.is_ok());

    let unreachable = Controller::with_repository(config, Repository::new_in_memory().unwrap())
        .with_provider(Arc::new(MockProvider::unreachable()));
    assert!(unreachable.check_provider().await.is_err());
}
