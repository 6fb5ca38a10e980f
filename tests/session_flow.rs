//! Cross-module flows: admission, pipeline, and fan-out wired together
//! the way the WebSocket handlers wire them, using the mock adapters.

use std::sync::Arc;

use chrono::Utc;

use subcast::access::{AccessService, GenerateViewerTokenRequest, MemoryAccessStore};
use subcast::activity::{Activity, ActivityStatus, MemoryActivityStore};
use subcast::broadcast::SubtitleBroadcaster;
use subcast::error::AccessError;
use subcast::pipeline::TranslationPipeline;
use subcast::speech::MockRecognizer;
use subcast::translate::MockTranslator;

struct World {
    activities: Arc<MemoryActivityStore>,
    access: AccessService,
    pipeline: TranslationPipeline,
    broadcaster: SubtitleBroadcaster,
}

fn world() -> World {
    let activities = Arc::new(MemoryActivityStore::new());
    let store = Arc::new(MemoryAccessStore::new());
    let access = AccessService::new(activities.clone(), store, "http://localhost:3000");
    let pipeline = TranslationPipeline::new(
        Arc::new(MockRecognizer::new()),
        Arc::new(MockTranslator::new()),
    );
    let broadcaster = SubtitleBroadcaster::new();
    World {
        activities,
        access,
        pipeline,
        broadcaster,
    }
}

fn publish(activities: &MemoryActivityStore, id: &str, input: &str, targets: &[&str]) {
    let now = Utc::now();
    activities.insert(Activity {
        id: id.to_string(),
        title: "Launch event".to_string(),
        description: String::new(),
        speaker: "Host".to_string(),
        start_time: now,
        end_time: None,
        input_language: input.to_string(),
        target_languages: targets.iter().map(|s| s.to_string()).collect(),
        cover_url: String::new(),
        status: ActivityStatus::Published,
        viewer_url: format!("http://localhost:3000/activity/{id}"),
        created_at: now,
        updated_at: now,
    });
}

#[tokio::test]
async fn happy_path_from_audio_to_viewer_frame() {
    let w = world();
    publish(&w.activities, "a1", "zh-CN", &["en", "ja"]);

    // Speaker side: token, admission, session.
    let speaker_token = w.access.generate_speaker_token("a1").await.unwrap();
    let activity = w
        .access
        .validate_speaker_session("a1", &speaker_token.value, "zh-CN")
        .await
        .unwrap();

    let (session, mut subtitles) = w
        .pipeline
        .start_session(&activity.id, &activity.input_language, &activity.target_languages)
        .unwrap();
    w.broadcaster.register_activity("a1");

    // Viewer side: invite code, admission, registration.
    let code = w
        .access
        .generate_viewer_token("a1", &GenerateViewerTokenRequest {
            ttl_minutes: Some(5),
            max_audience: None,
        })
        .await
        .unwrap();
    w.access
        .validate_viewer_session("a1", &code.value, "en")
        .await
        .unwrap();
    let mut viewer_rx = w.broadcaster.add_viewer("a1", "viewer-1", "en");

    // One audio frame in, one composite subtitle out.
    session.send_audio(vec![0u8; 320]).unwrap();
    let subtitle = subtitles.recv().await.unwrap();
    assert_eq!(subtitle.original, "mock fragment 1");
    assert!(subtitle.translations.len() <= activity.target_languages.len());

    // The speaker handler's forward step, done by hand.
    w.broadcaster.broadcast_subtitle("a1", &subtitle);

    let frame = viewer_rx.recv().await.unwrap();
    assert_eq!(frame.text, "[EN] mock fragment 1");
    assert_eq!(frame.target_lang, "en");
    assert_eq!(frame.source_lang, "zh-CN");

    w.pipeline.stop_session("a1").unwrap();
    w.broadcaster.unregister_activity("a1");
    assert!(viewer_rx.recv().await.is_none());
}

#[tokio::test]
async fn viewer_with_unsupported_language_is_rejected_at_admission() {
    let w = world();
    publish(&w.activities, "a1", "zh-CN", &["en"]);

    let code = w
        .access
        .generate_viewer_token("a1", &GenerateViewerTokenRequest::default())
        .await
        .unwrap();

    // Valid code, but the language is not enabled: no viewer is ever
    // added to the broadcaster.
    let err = w
        .access
        .validate_viewer_session("a1", &code.value, "ja")
        .await
        .unwrap_err();
    assert_eq!(err, AccessError::LanguageNotEnabled("ja".to_string()));
    assert_eq!(w.broadcaster.viewer_count("a1"), 0);
}

#[tokio::test]
async fn per_viewer_delivery_preserves_order() {
    let w = world();
    publish(&w.activities, "a1", "zh-CN", &["en"]);

    let (session, mut subtitles) = w
        .pipeline
        .start_session("a1", "zh-CN", &["en".to_string()])
        .unwrap();
    let mut viewer_rx = w.broadcaster.add_viewer("a1", "viewer-1", "en");

    for _ in 0..5 {
        session.send_audio(vec![0u8; 320]).unwrap();
    }

    let mut last_timestamp = None;
    for i in 1..=5 {
        let subtitle = subtitles.recv().await.unwrap();
        assert_eq!(subtitle.original, format!("mock fragment {i}"));
        w.broadcaster.broadcast_subtitle("a1", &subtitle);

        let frame = viewer_rx.recv().await.unwrap();
        assert_eq!(frame.text, format!("[EN] mock fragment {i}"));
        if let Some(last) = last_timestamp {
            assert!(frame.timestamp >= last);
        }
        last_timestamp = Some(frame.timestamp);
    }

    w.pipeline.stop_session("a1").unwrap();
}

#[tokio::test]
async fn revoked_entry_blocks_viewers_until_regenerated() {
    let w = world();
    publish(&w.activities, "a1", "zh-CN", &["en"]);

    let v1 = w
        .access
        .generate_viewer_token("a1", &GenerateViewerTokenRequest::default())
        .await
        .unwrap();
    w.access
        .validate_viewer_session("a1", &v1.value, "en")
        .await
        .unwrap();

    w.access.revoke_viewer_entry("a1").await.unwrap();
    assert_eq!(
        w.access.validate_viewer_session("a1", &v1.value, "en").await,
        Err(AccessError::ViewerEntryDisabled)
    );

    let v2 = w
        .access
        .generate_viewer_token("a1", &GenerateViewerTokenRequest::default())
        .await
        .unwrap();
    w.access
        .validate_viewer_session("a1", &v2.value, "en")
        .await
        .unwrap();

    // The old code stays dead even though the entry is active again.
    assert_eq!(
        w.access.validate_viewer_session("a1", &v1.value, "en").await,
        Err(AccessError::TokenRevoked)
    );
}

#[tokio::test]
async fn second_speaker_is_turned_away() {
    let w = world();
    publish(&w.activities, "a1", "zh-CN", &["en"]);

    let (_session, _subtitles) = w
        .pipeline
        .start_session("a1", "zh-CN", &["en".to_string()])
        .unwrap();

    let second = w.pipeline.start_session("a1", "zh-CN", &["en".to_string()]);
    assert!(second.is_err());
    assert_eq!(w.pipeline.active_session_count(), 1);

    w.pipeline.stop_session("a1").unwrap();
}
