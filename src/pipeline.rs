//! Per-activity translation pipeline.
//!
//! A session owns the path from raw speaker audio to composite subtitles:
//! audio chunks feed a streaming recognizer that is restarted on a timer
//! (the upstream service caps a single stream at about five minutes),
//! finalized transcripts are deduplicated and translated to every target
//! language, and the resulting subtitle is pushed to the session's output
//! channel. Everything on the hot path is non-blocking: full buffers drop
//! with a warning rather than stall audio ingestion or the translator
//! loop.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::speech::{
    shared_audio, RecognitionResult, RecognizeConfig, RecognizeError, SharedAudio,
    SpeechRecognizer,
};
use crate::subtitle::Subtitle;
use crate::translate::Translator;

/// Buffered audio chunks between the speaker socket and the recognizer.
pub const AUDIO_BUFFER_CAPACITY: usize = 100;
/// Buffered subtitles between the pipeline and the speaker handler.
pub const SUBTITLE_BUFFER_CAPACITY: usize = 50;
/// Buffered recognition results between the recognizer and the consumer.
const RESULTS_BUFFER_CAPACITY: usize = 50;

/// Longest a single recognizer stream may run; must stay under the
/// upstream five-minute cap.
pub const STREAM_RESTART_INTERVAL: Duration = Duration::from_secs(4 * 60 + 30);
/// Pause before retrying after a recognizer transport error.
pub const STREAM_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Handle to one activity's live session.
pub struct PipelineSession {
    pub activity_id: String,
    pub source_language: String,
    pub target_languages: Vec<String>,
    audio_tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
}

impl PipelineSession {
    /// Push one audio chunk toward the recognizer without blocking.
    pub fn send_audio(&self, chunk: Vec<u8>) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::SessionClosed);
        }
        match self.audio_tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PipelineError::AudioBufferFull),
            Err(TrySendError::Closed(_)) => Err(PipelineError::SessionClosed),
        }
    }
}

/// Coordinates recognition and translation sessions, one per activity.
pub struct TranslationPipeline {
    recognizer: Arc<dyn SpeechRecognizer>,
    translator: Arc<dyn Translator>,
    sessions: RwLock<HashMap<String, Arc<PipelineSession>>>,
    restart_interval: Duration,
    error_backoff: Duration,
}

impl TranslationPipeline {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, translator: Arc<dyn Translator>) -> Self {
        Self {
            recognizer,
            translator,
            sessions: RwLock::new(HashMap::new()),
            restart_interval: STREAM_RESTART_INTERVAL,
            error_backoff: STREAM_ERROR_BACKOFF,
        }
    }

    /// Override the restart/backoff timing (short intervals in tests).
    pub fn with_timing(mut self, restart_interval: Duration, error_backoff: Duration) -> Self {
        self.restart_interval = restart_interval;
        self.error_backoff = error_backoff;
        self
    }

    /// Start the session for an activity.
    ///
    /// Returns the session handle plus the receiving end of its subtitle
    /// stream. At most one session exists per activity; a second start is
    /// rejected, which is what enforces the single-speaker rule.
    pub fn start_session(
        &self,
        activity_id: &str,
        source_language: &str,
        target_languages: &[String],
    ) -> Result<(Arc<PipelineSession>, mpsc::Receiver<Subtitle>), PipelineError> {
        if target_languages.is_empty() {
            return Err(PipelineError::NoTargetLanguages);
        }

        let mut sessions = self.sessions.write().unwrap();
        if sessions.contains_key(activity_id) {
            return Err(PipelineError::SessionExists(activity_id.to_string()));
        }

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_BUFFER_CAPACITY);
        let (subtitle_tx, subtitle_rx) = mpsc::channel(SUBTITLE_BUFFER_CAPACITY);
        let cancel = CancellationToken::new();

        let session = Arc::new(PipelineSession {
            activity_id: activity_id.to_string(),
            source_language: source_language.to_string(),
            target_languages: target_languages.to_vec(),
            audio_tx,
            cancel: cancel.clone(),
        });
        sessions.insert(activity_id.to_string(), session.clone());

        let (results_tx, results_rx) = mpsc::channel(RESULTS_BUFFER_CAPACITY);
        tokio::spawn(recognition_loop(
            self.recognizer.clone(),
            cancel.clone(),
            shared_audio(audio_rx),
            RecognizeConfig::new(source_language),
            results_tx,
            activity_id.to_string(),
            self.restart_interval,
            self.error_backoff,
        ));
        tokio::spawn(consume_results(
            self.translator.clone(),
            cancel,
            results_rx,
            subtitle_tx,
            activity_id.to_string(),
            source_language.to_string(),
            target_languages.to_vec(),
        ));

        info!("Started translation session for activity {activity_id}");
        Ok((session, subtitle_rx))
    }

    /// Stop and remove a session. Cancelling the root token unwinds the
    /// recognizer loop and the consumer; the channels close as their
    /// senders drop.
    pub fn stop_session(&self, activity_id: &str) -> Result<(), PipelineError> {
        let session = {
            let mut sessions = self.sessions.write().unwrap();
            sessions
                .remove(activity_id)
                .ok_or_else(|| PipelineError::SessionNotFound(activity_id.to_string()))?
        };
        session.cancel.cancel();
        info!("Stopped translation session for activity {activity_id}");
        Ok(())
    }

    pub fn session(&self, activity_id: &str) -> Option<Arc<PipelineSession>> {
        let sessions = self.sessions.read().unwrap();
        sessions.get(activity_id).cloned()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Stop every session; used on server shutdown.
    pub fn shutdown(&self) {
        let sessions: Vec<Arc<PipelineSession>> = {
            let mut map = self.sessions.write().unwrap();
            map.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.cancel.cancel();
        }
    }
}

/// Keep one recognizer stream alive, restarting it before the upstream
/// duration cap and backing off on transport errors. All iterations feed
/// the same results channel, so the consumer sees a single continuous
/// stream; the audio channel stays open across restarts.
#[allow(clippy::too_many_arguments)]
async fn recognition_loop(
    recognizer: Arc<dyn SpeechRecognizer>,
    cancel: CancellationToken,
    audio: SharedAudio,
    config: RecognizeConfig,
    results_tx: mpsc::Sender<RecognitionResult>,
    activity_id: String,
    restart_interval: Duration,
    error_backoff: Duration,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let stream_cancel = cancel.child_token();
        let mut stream = tokio::spawn({
            let recognizer = recognizer.clone();
            let audio = audio.clone();
            let config = config.clone();
            let results = results_tx.clone();
            let stream_cancel = stream_cancel.clone();
            async move {
                recognizer
                    .streaming_recognize(stream_cancel, audio, config, results)
                    .await
            }
        });

        let restart = tokio::time::sleep(restart_interval);
        tokio::pin!(restart);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                stream_cancel.cancel();
                let _ = (&mut stream).await;
                return;
            }
            outcome = &mut stream => outcome,
            _ = &mut restart => {
                // Hit the per-stream duration cap; force a rotation.
                stream_cancel.cancel();
                (&mut stream).await
            }
        };

        match outcome {
            Ok(Ok(())) => {
                // Natural end: the audio source closed or the upstream
                // service finished. Dropping results_tx ends the consumer.
                return;
            }
            Ok(Err(RecognizeError::Cancelled)) => continue,
            Ok(Err(e)) => {
                warn!("STT stream error for activity {activity_id}: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(error_backoff) => {}
                }
            }
            Err(e) => {
                warn!("STT stream task failed for activity {activity_id}: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(error_backoff) => {}
                }
            }
        }
    }
}

/// Turn finalized transcripts into composite subtitles.
async fn consume_results(
    translator: Arc<dyn Translator>,
    cancel: CancellationToken,
    mut results_rx: mpsc::Receiver<RecognitionResult>,
    subtitle_tx: mpsc::Sender<Subtitle>,
    activity_id: String,
    source_language: String,
    target_languages: Vec<String>,
) {
    let mut last_final_transcript = String::new();

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = results_rx.recv() => match result {
                Some(result) => result,
                None => return,
            },
        };

        if !result.is_final {
            continue;
        }
        // A restarted stream may re-emit its tail; drop empty transcripts
        // and exact repeats of the last emitted one.
        if result.transcript.is_empty() || result.transcript == last_final_transcript {
            continue;
        }
        last_final_transcript = result.transcript.clone();

        let translated = tokio::select! {
            _ = cancel.cancelled() => return,
            translated = translator.translate(
                &result.transcript,
                &source_language,
                &target_languages,
            ) => translated,
        };
        let translations: HashMap<String, String> = match translated {
            Ok(list) => list.into_iter().map(|t| (t.language, t.text)).collect(),
            Err(e) => {
                warn!("Translation error for activity {activity_id}: {e}");
                continue;
            }
        };

        let subtitle = Subtitle {
            id: Uuid::new_v4().to_string(),
            activity_id: activity_id.clone(),
            original: result.transcript,
            source_lang: source_language.clone(),
            translations,
            confidence: result.confidence,
            timestamp: Utc::now(),
        };

        match subtitle_tx.try_send(subtitle) {
            Ok(()) => debug!("Subtitle created for activity {activity_id}"),
            Err(TrySendError::Full(_)) => {
                warn!("Subtitle output buffer full for activity {activity_id}, dropping")
            }
            Err(TrySendError::Closed(_)) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::MockRecognizer;
    use crate::translate::MockTranslator;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn mock_pipeline() -> TranslationPipeline {
        TranslationPipeline::new(
            Arc::new(MockRecognizer::new()),
            Arc::new(MockTranslator::new()),
        )
    }

    fn targets(langs: &[&str]) -> Vec<String> {
        langs.iter().map(|s| s.to_string()).collect()
    }

    /// Emits one final per chunk with the chunk's UTF-8 contents as the
    /// transcript, and re-emits the previous stream's tail when a new
    /// stream starts, the way a restarted upstream recognizer does.
    struct EchoRecognizer {
        tail: Mutex<Option<String>>,
    }

    impl EchoRecognizer {
        fn new() -> Self {
            Self {
                tail: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SpeechRecognizer for EchoRecognizer {
        async fn streaming_recognize(
            &self,
            cancel: CancellationToken,
            audio: SharedAudio,
            _config: RecognizeConfig,
            results: mpsc::Sender<RecognitionResult>,
        ) -> Result<(), RecognizeError> {
            let replay = self.tail.lock().unwrap().clone();
            if let Some(tail) = replay {
                let _ = results
                    .send(RecognitionResult {
                        transcript: tail,
                        is_final: true,
                        confidence: 0.9,
                    })
                    .await;
            }

            loop {
                let chunk = {
                    let mut rx = audio.lock().await;
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RecognizeError::Cancelled),
                        chunk = rx.recv() => chunk,
                    }
                };
                let Some(chunk) = chunk else { return Ok(()) };
                let text = String::from_utf8_lossy(&chunk).to_string();
                if text.is_empty() {
                    continue;
                }
                *self.tail.lock().unwrap() = Some(text.clone());
                let interim = RecognitionResult {
                    transcript: text.clone(),
                    is_final: false,
                    confidence: 0.3,
                };
                let fin = RecognitionResult {
                    transcript: text,
                    is_final: true,
                    confidence: 0.9,
                };
                if results.send(interim).await.is_err() || results.send(fin).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    #[tokio::test]
    async fn one_session_per_activity() {
        let pipeline = mock_pipeline();
        let (_session, _rx) = pipeline
            .start_session("a1", "zh-CN", &targets(&["en"]))
            .unwrap();

        assert!(matches!(
            pipeline.start_session("a1", "zh-CN", &targets(&["en"])),
            Err(PipelineError::SessionExists(_))
        ));
        assert_eq!(pipeline.active_session_count(), 1);

        pipeline.stop_session("a1").unwrap();
        assert!(matches!(
            pipeline.stop_session("a1"),
            Err(PipelineError::SessionNotFound(_))
        ));
        assert_eq!(pipeline.active_session_count(), 0);
    }

    #[tokio::test]
    async fn empty_target_languages_rejected() {
        let pipeline = mock_pipeline();
        assert!(matches!(
            pipeline.start_session("a1", "zh-CN", &[]),
            Err(PipelineError::NoTargetLanguages)
        ));
    }

    #[tokio::test]
    async fn end_to_end_with_mock_adapters() {
        let pipeline = mock_pipeline();
        let (session, mut subtitles) = pipeline
            .start_session("a1", "zh-CN", &targets(&["en", "ja"]))
            .unwrap();

        session.send_audio(vec![0u8; 320]).unwrap();

        let subtitle = subtitles.recv().await.unwrap();
        assert_eq!(subtitle.original, "mock fragment 1");
        assert_eq!(subtitle.source_lang, "zh-CN");
        assert_eq!(subtitle.translations.len(), 2);
        assert_eq!(subtitle.translations["en"], "[EN] mock fragment 1");
        assert_eq!(subtitle.translations["ja"], "[JA] mock fragment 1");
        assert!((subtitle.confidence - 0.85).abs() < f32::EPSILON);
        assert!(!subtitle.id.is_empty());

        pipeline.stop_session("a1").unwrap();
    }

    #[tokio::test]
    async fn adjacent_duplicate_finals_collapse() {
        let pipeline = TranslationPipeline::new(
            Arc::new(EchoRecognizer::new()),
            Arc::new(MockTranslator::new()),
        );
        let (session, mut subtitles) = pipeline
            .start_session("a1", "en", &targets(&["ja"]))
            .unwrap();

        session.send_audio(b"hello".to_vec()).unwrap();
        session.send_audio(b"hello".to_vec()).unwrap();
        session.send_audio(b"world".to_vec()).unwrap();

        let first = subtitles.recv().await.unwrap();
        assert_eq!(first.original, "hello");
        let second = subtitles.recv().await.unwrap();
        assert_eq!(second.original, "world");

        // Nothing further: the repeated "hello" was deduplicated and the
        // interim results never became subtitles.
        pipeline.stop_session("a1").unwrap();
        assert!(subtitles.recv().await.is_none());
    }

    #[tokio::test]
    async fn restart_keeps_the_transcript_stream_continuous() {
        let pipeline = TranslationPipeline::new(
            Arc::new(EchoRecognizer::new()),
            Arc::new(MockTranslator::new()),
        )
        .with_timing(Duration::from_millis(60), Duration::from_millis(10));
        let (session, mut subtitles) = pipeline
            .start_session("a1", "en", &targets(&["ja"]))
            .unwrap();

        session.send_audio(b"one".to_vec()).unwrap();
        assert_eq!(subtitles.recv().await.unwrap().original, "one");

        // Let at least one forced restart happen while audio keeps
        // flowing. The restarted stream replays its tail, which the dedup
        // filter absorbs.
        tokio::time::sleep(Duration::from_millis(150)).await;
        session.send_audio(b"two".to_vec()).unwrap();

        let next = subtitles.recv().await.unwrap();
        assert_eq!(next.original, "two");

        pipeline.stop_session("a1").unwrap();
    }

    #[tokio::test]
    async fn send_audio_reports_full_buffer_and_closed_session() {
        // A recognizer that never consumes audio, so the buffer fills.
        struct StalledRecognizer;

        #[async_trait]
        impl SpeechRecognizer for StalledRecognizer {
            async fn streaming_recognize(
                &self,
                cancel: CancellationToken,
                _audio: SharedAudio,
                _config: RecognizeConfig,
                _results: mpsc::Sender<RecognitionResult>,
            ) -> Result<(), RecognizeError> {
                cancel.cancelled().await;
                Err(RecognizeError::Cancelled)
            }
        }

        let pipeline = TranslationPipeline::new(
            Arc::new(StalledRecognizer),
            Arc::new(MockTranslator::new()),
        );
        let (session, _subtitles) = pipeline
            .start_session("a1", "en", &targets(&["ja"]))
            .unwrap();

        for _ in 0..AUDIO_BUFFER_CAPACITY {
            session.send_audio(vec![1]).unwrap();
        }
        assert_eq!(
            session.send_audio(vec![1]),
            Err(PipelineError::AudioBufferFull)
        );

        pipeline.stop_session("a1").unwrap();
        assert_eq!(session.send_audio(vec![1]), Err(PipelineError::SessionClosed));
    }
}
