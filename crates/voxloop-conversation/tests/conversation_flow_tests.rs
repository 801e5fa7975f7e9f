mod common;

use common::*;
use voxloop_conversation::{ConversationEngine, ConversationResult};

use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn two_utterance_script(tag1: i16, tag2: i16) -> Vec<Vec<i16>> {
    vec![
        // Utterance 1: two speech frames, then qualifying silence (800 ms
        // minimum is reached on the second 500 ms silence frame)
        speech_block(tag1),
        speech_block(tag1),
        silence_block(),
        silence_block(),
        // Utterance 2
        speech_block(tag2),
        speech_block(tag2),
        silence_block(),
        silence_block(),
    ]
}

#[test]
fn utterance_flows_end_to_end() {
    init_logging();
    let (input, _) = ScriptedInput::new(vec![
        speech_block(1000),
        speech_block(1000),
        silence_block(),
        silence_block(),
    ]);
    let engine = ConversationEngine::new(
        test_config(),
        Box::new(input),
        Box::new(ThresholdClassifier),
        Box::new(TaggingPipeline::new(vec![])),
    )
    .unwrap();

    engine.start().unwrap();
    let results = collect_results(&engine, 1, Duration::from_secs(10));
    engine.stop().unwrap();

    match &results[..] {
        [ConversationResult::Success {
            transcript,
            response_text,
            source_count,
            ..
        }] => {
            assert_eq!(transcript, "tag-1000");
            assert_eq!(response_text, "response to tag-1000");
            assert_eq!(*source_count, 2);
        }
        other => panic!("expected one success, got {other:?}"),
    }

    let snapshot = engine.latest_snapshot();
    assert_eq!(snapshot.transcript, "tag-1000");
    assert!(!snapshot.is_active);

    let metrics = engine.metrics();
    assert_eq!(metrics.utterances_segmented.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.utterances_processed.load(Ordering::Relaxed), 1);
}

#[test]
fn results_preserve_utterance_order() {
    init_logging();
    let (input, _) = ScriptedInput::new(two_utterance_script(1000, 2000));
    let engine = ConversationEngine::new(
        test_config(),
        Box::new(input),
        Box::new(ThresholdClassifier),
        Box::new(TaggingPipeline::new(vec![])),
    )
    .unwrap();

    engine.start().unwrap();
    let results = collect_results(&engine, 2, Duration::from_secs(10));
    engine.stop().unwrap();

    let transcripts: Vec<&str> = results
        .iter()
        .map(|r| match r {
            ConversationResult::Success { transcript, .. } => transcript.as_str(),
            ConversationResult::Failure { .. } => panic!("unexpected failure"),
        })
        .collect();
    assert_eq!(transcripts, vec!["tag-1000", "tag-2000"]);

    // Stream timestamps must be increasing along with the order
    assert!(results[0].captured_at_ms() < results[1].captured_at_ms());
}

#[test]
fn answer_failure_produces_failure_result_and_loop_continues() {
    init_logging();
    let (input, _) = ScriptedInput::new(two_utterance_script(1000, 2000));
    let pipeline = TaggingPipeline::new(vec![0]); // first call fails
    let engine = ConversationEngine::new(
        test_config(),
        Box::new(input),
        Box::new(ThresholdClassifier),
        Box::new(pipeline),
    )
    .unwrap();

    engine.start().unwrap();
    let results = collect_results(&engine, 2, Duration::from_secs(10));
    assert!(engine.is_active(), "a failed answer must not stop the engine");
    engine.stop().unwrap();

    match &results[..] {
        [ConversationResult::Failure { message, .. }, ConversationResult::Success { transcript, .. }] =>
        {
            assert!(message.contains("model overloaded"), "got: {message}");
            assert_eq!(transcript, "tag-2000");
        }
        other => panic!("expected failure then success, got {other:?}"),
    }

    assert_eq!(
        engine.metrics().answers_failed.load(Ordering::Relaxed),
        1
    );
}

#[test]
fn short_blip_is_discarded_as_noise() {
    init_logging();
    let mut config = test_config();
    // Require a full second of speech so a single frame never qualifies
    config.segmenter.min_speech_duration_ms = 1_000;
    let (input, _) = ScriptedInput::new(vec![
        speech_block(1000),
        silence_block(),
        silence_block(),
        silence_block(),
    ]);
    let engine = ConversationEngine::new(
        config,
        Box::new(input),
        Box::new(ThresholdClassifier),
        Box::new(TaggingPipeline::new(vec![])),
    )
    .unwrap();

    engine.start().unwrap();
    let results = collect_results(&engine, 1, Duration::from_secs(3));
    engine.stop().unwrap();

    assert!(results.is_empty(), "noise blip must never reach the pipeline");
    let metrics = engine.metrics();
    assert_eq!(metrics.utterances_segmented.load(Ordering::Relaxed), 0);
    assert_eq!(metrics.utterances_discarded.load(Ordering::Relaxed), 1);
}

#[test]
fn broken_classifier_still_captures_speech() {
    init_logging();
    // With the classifier erroring, every frame counts as speech; the
    // utterance finalizes via the shutdown flush.
    let (input, _) = ScriptedInput::new(vec![speech_block(1000), speech_block(1000)]);
    let engine = ConversationEngine::new(
        test_config(),
        Box::new(input),
        Box::new(BrokenClassifier),
        Box::new(TaggingPipeline::new(vec![])),
    )
    .unwrap();

    engine.start().unwrap();
    // Wait for both frames to pass through the segmenter
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while engine.metrics().chunker_frames.load(Ordering::Relaxed) < 2
        && std::time::Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(20));
    }
    engine.stop().unwrap();

    let metrics = engine.metrics();
    assert!(metrics.classifier_failures.load(Ordering::Relaxed) >= 2);
    assert_eq!(metrics.utterances_segmented.load(Ordering::Relaxed), 1);
}

#[test]
fn callbacks_fire_from_processing_thread() {
    init_logging();
    let (input, _) = ScriptedInput::new(two_utterance_script(1000, 2000));
    let engine = ConversationEngine::new(
        test_config(),
        Box::new(input),
        Box::new(ThresholdClassifier),
        Box::new(TaggingPipeline::new(vec![])),
    )
    .unwrap();

    let transcripts = Arc::new(Mutex::new(Vec::<String>::new()));
    let statuses = Arc::new(Mutex::new(Vec::<String>::new()));
    {
        let transcripts = transcripts.clone();
        engine.set_on_transcript(move |text| transcripts.lock().push(text.to_string()));
    }
    {
        let statuses = statuses.clone();
        engine.set_on_status(move |msg| statuses.lock().push(msg.to_string()));
    }

    engine.start().unwrap();
    let _ = collect_results(&engine, 2, Duration::from_secs(10));
    engine.stop().unwrap();

    assert_eq!(
        *transcripts.lock(),
        vec!["tag-1000".to_string(), "tag-2000".to_string()]
    );
    let statuses = statuses.lock();
    assert!(statuses.iter().any(|s| s == "Speech detected"));
    assert!(statuses.iter().any(|s| s == "Response ready"));
    assert!(statuses.iter().any(|s| s == "Conversation stopped"));
}
