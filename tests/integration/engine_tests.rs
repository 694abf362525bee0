/*!
 * Integration tests for the batch translation engine.
 *
 * Every run goes through the mock provider, so provider calls and the
 * lines they carried can be checked exactly.
 */

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use subtide::ProviderError;
use subtide::database::Repository;
use subtide::providers::mock::MockProvider;
use subtide::translation::codec::JsonArrayGrammar;
use subtide::translation::{
    CacheStore, CancelHandle, EngineEvent, EngineState, TranslationCache, TranslationEngine,
};

use crate::common;

#[tokio::test]
async fn test_run_withSeveralBatches_shouldEmitEveryLineOnceInOrder() {
    let provider = Arc::new(MockProvider::working());
    let engine = common::engine_with_volatile_cache(3, provider.clone());
    let sources = common::lines(&["a", "b", "c", "d", "e", "f", "g"]);

    let (state, events) = common::run_collecting(&engine, sources, 0).await;

    assert_eq!(state, EngineState::Finished);
    assert_eq!(engine.state(), EngineState::Finished);
    assert_eq!(events.last(), Some(&EngineEvent::Finished));

    let lines = common::translated_lines(&events);
    let indices: Vec<usize> = lines.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, (0..7).collect::<Vec<_>>());
    assert_eq!(lines[6].1, "[tr] g");

    let progress = common::progress_values(&events);
    assert_eq!(progress, vec![3, 6, 7]);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_run_withRepeatedText_shouldRequestItOnce() {
    let provider = Arc::new(MockProvider::dictionary(&[("Hello", "Bonjour"), ("World", "Monde")]));
    let cache = Arc::new(TranslationCache::volatile());
    let engine = common::engine(common::settings(2), provider.clone(), cache.clone());

    let (state, events) =
        common::run_collecting(&engine, common::lines(&["Hello", "Hello", "World"]), 0).await;

    assert_eq!(state, EngineState::Finished);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(provider.requested_lines(), vec!["Hello".to_string(), "World".to_string()]);

    let texts: Vec<String> = common::translated_lines(&events).into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["Bonjour", "Bonjour", "Monde"]);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_run_overCachedRange_shouldMakeNoProviderCalls() {
    let cache = Arc::new(TranslationCache::volatile());
    let sources = common::lines(&["one", "two", "three", "two"]);

    let first_provider = Arc::new(MockProvider::working());
    let first = common::engine(common::settings(2), first_provider.clone(), cache.clone());
    let (_, first_events) = common::run_collecting(&first, sources.clone(), 0).await;
    assert_eq!(first_provider.call_count(), 2);

    let second_provider = Arc::new(MockProvider::unreachable());
    let second = common::engine(common::settings(2), second_provider.clone(), cache.clone());
    let (state, second_events) = common::run_collecting(&second, sources, 0).await;

    assert_eq!(state, EngineState::Finished);
    assert_eq!(second_provider.call_count(), 0);
    assert_eq!(
        common::translated_lines(&first_events),
        common::translated_lines(&second_events)
    );
}

#[tokio::test]
async fn test_run_withBlankLines_shouldResolveThemWithoutRequest() {
    let provider = Arc::new(MockProvider::working());
    let engine = common::engine_with_volatile_cache(5, provider.clone());

    let (state, events) = common::run_collecting(&engine, common::lines(&["", "Hi", "   "]), 0).await;

    assert_eq!(state, EngineState::Finished);
    assert_eq!(provider.requested_lines(), vec!["Hi".to_string()]);
    assert_eq!(
        common::translated_lines(&events),
        vec![(0, String::new()), (1, "[tr] Hi".to_string()), (2, "   ".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_withSeveralBatches_shouldSpaceDispatchesByMinimumInterval() {
    let dispatches = Arc::new(Mutex::new(Vec::new()));
    let recorder = dispatches.clone();
    let provider = Arc::new(MockProvider::working().on_call(move |_| {
        recorder.lock().push(tokio::time::Instant::now());
    }));

    let mut settings = common::settings(1);
    settings.requests_per_minute = 30;
    let engine = common::engine(settings, provider, Arc::new(TranslationCache::volatile()));

    let (state, _) = common::run_collecting(&engine, common::lines(&["a", "b", "c", "d"]), 0).await;
    assert_eq!(state, EngineState::Finished);

    let dispatches = dispatches.lock();
    assert_eq!(dispatches.len(), 4);
    for pair in dispatches.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(2));
    }
}

#[tokio::test]
async fn test_cancel_duringBatch_shouldStopAtBatchBoundaryAndResume() {
    let cache = Arc::new(TranslationCache::volatile());
    let sources = common::lines(&["a", "b", "c", "d", "e", "f"]);

    let handle: Arc<OnceLock<CancelHandle>> = Arc::new(OnceLock::new());
    let hook_handle = handle.clone();
    let provider = Arc::new(MockProvider::working().on_call(move |call| {
        if call == 2 {
            if let Some(handle) = hook_handle.get() {
                handle.cancel();
            }
        }
    }));
    let engine = common::engine(common::settings(2), provider.clone(), cache.clone());
    handle.set(engine.cancel_handle()).expect("handle set once");

    let (state, events) = common::run_collecting(&engine, sources.clone(), 0).await;

    assert_eq!(state, EngineState::Canceled { resume_index: 4 });
    assert_eq!(events.last(), Some(&EngineEvent::Canceled { resume_index: 4 }));
    let indices: Vec<usize> = common::translated_lines(&events).iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    let resume_provider = Arc::new(MockProvider::working());
    let resumed = common::engine(common::settings(2), resume_provider.clone(), cache);
    let (state, events) = common::run_collecting(&resumed, sources, 4).await;

    assert_eq!(state, EngineState::Finished);
    assert_eq!(resume_provider.requested_lines(), vec!["e".to_string(), "f".to_string()]);
    assert_eq!(
        common::translated_lines(&events),
        vec![(4, "[tr] e".to_string()), (5, "[tr] f".to_string())]
    );
}

#[tokio::test]
async fn test_cancel_beforeStart_shouldReportStartIndex() {
    let provider = Arc::new(MockProvider::working());
    let engine = common::engine_with_volatile_cache(2, provider.clone());
    engine.cancel_handle().cancel();

    let (state, events) = common::run_collecting(&engine, common::lines(&["a", "b", "c"]), 1).await;

    assert_eq!(state, EngineState::Canceled { resume_index: 1 });
    assert_eq!(events, vec![EngineEvent::Canceled { resume_index: 1 }]);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_run_withMissingSecondLine_shouldFailAtBatchStartWithoutCaching() {
    let provider = Arc::new(MockProvider::working().omit_line(2));
    let cache = Arc::new(TranslationCache::volatile());
    let engine = common::engine(common::settings(3), provider, cache.clone());

    let (state, events) =
        common::run_collecting(&engine, common::lines(&["one", "two", "three"]), 0).await;

    assert_eq!(state, EngineState::Failed { resume_index: 0 });
    assert!(common::translated_lines(&events).is_empty());
    assert!(cache.is_empty());
    assert!(cache.lookup("French", "one").await.is_none());

    match events.last() {
        Some(EngineEvent::Failed { message, resume_index }) => {
            assert_eq!(*resume_index, 0);
            assert!(message.contains("two"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_withFailureInSecondBatch_shouldKeepFirstBatch() {
    let provider = Arc::new(
        MockProvider::working()
            .fail_on_call(2, ProviderError::ConnectionError("connection reset".to_string())),
    );
    let cache = Arc::new(TranslationCache::volatile());
    let engine = common::engine(common::settings(2), provider, cache.clone());

    let (state, events) = common::run_collecting(&engine, common::lines(&["a", "b", "c", "d"]), 0).await;

    assert_eq!(state, EngineState::Failed { resume_index: 2 });
    assert_eq!(
        events.last(),
        Some(&EngineEvent::Failed {
            message: "connectivity lost".to_string(),
            resume_index: 2
        })
    );
    assert_eq!(common::translated_lines(&events).len(), 2);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_run_withUnreachableProvider_shouldReportConnectivityLost() {
    let engine = common::engine_with_volatile_cache(2, Arc::new(MockProvider::unreachable()));

    let (state, events) = common::run_collecting(&engine, common::lines(&["a"]), 0).await;

    assert_eq!(state, EngineState::Failed { resume_index: 0 });
    assert_eq!(
        events,
        vec![EngineEvent::Failed {
            message: "connectivity lost".to_string(),
            resume_index: 0
        }]
    );
}

#[tokio::test]
async fn test_run_withApiError_shouldReportProviderError() {
    let provider = Arc::new(MockProvider::working().fail_on_call(
        1,
        ProviderError::ApiError {
            status_code: 500,
            message: "overloaded".to_string(),
        },
    ));
    let engine = common::engine_with_volatile_cache(2, provider);

    let (state, events) = common::run_collecting(&engine, common::lines(&["a", "b"]), 0).await;

    assert_eq!(state, EngineState::Failed { resume_index: 0 });
    match events.last() {
        Some(EngineEvent::Failed { message, .. }) => assert!(message.starts_with("Provider error")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_withBrokenCacheStorage_shouldWarnAndFinish() {
    let repository = Repository::new_in_memory().unwrap();
    repository
        .connection()
        .execute(|conn| Ok(conn.execute_batch("DROP TABLE translation_cache")?))
        .unwrap();
    let cache = Arc::new(TranslationCache::persistent(repository));
    let engine = common::engine(common::settings(2), Arc::new(MockProvider::working()), cache.clone());

    let (state, events) = common::run_collecting(&engine, common::lines(&["a", "b"]), 0).await;

    assert_eq!(state, EngineState::Finished);
    let warnings = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Warning(_)))
        .count();
    assert_eq!(warnings, 2);
    assert_eq!(common::translated_lines(&events).len(), 2);
    assert_eq!(cache.lookup("French", "a").await, Some("[tr] a".to_string()));
}

#[tokio::test]
async fn test_run_fromEndOfRange_shouldOnlyFinish() {
    let provider = Arc::new(MockProvider::working());
    let engine = common::engine_with_volatile_cache(2, provider.clone());

    let (state, events) = common::run_collecting(&engine, common::lines(&["a", "b"]), 2).await;

    assert_eq!(state, EngineState::Finished);
    assert_eq!(events, vec![EngineEvent::Finished]);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_run_withJsonGrammar_shouldDecodeArrayAnswer() {
    let provider = Arc::new(MockProvider::scripted(vec![Ok(
        "Sure! [\"Bonjour\", \"Monde\"]".to_string()
    )]));
    let engine = TranslationEngine::new(
        common::settings(2),
        provider.clone(),
        Arc::new(TranslationCache::volatile()),
        Arc::new(JsonArrayGrammar),
    )
    .unwrap();

    let (state, events) = common::run_collecting(&engine, common::lines(&["Hello", "World"]), 0).await;

    assert_eq!(state, EngineState::Finished);
    assert_eq!(
        common::translated_lines(&events),
        vec![(0, "Bonjour".to_string()), (1, "Monde".to_string())]
    );
    assert!(provider.requests()[0].prompt.contains("\"Hello\""));
}

#[tokio::test]
async fn test_start_shouldRunOnBackgroundTask() {
    let engine = common::engine_with_volatile_cache(2, Arc::new(MockProvider::working()));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let handle = engine.start(common::lines(&["a", "b", "c"]), 0, tx).unwrap();
    let state = handle.await.unwrap();

    assert_eq!(state, EngineState::Finished);
    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    assert_eq!(last, Some(EngineEvent::Finished));
}
