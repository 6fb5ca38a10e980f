//! Offline recognizer for local development and tests.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    RecognitionResult, RecognizeConfig, RecognizeError, SharedAudio, SpeechRecognizer,
};

/// Emits one final transcript per non-empty audio chunk.
///
/// Interchangeable with the remote recognizer by configuration, so the
/// whole pipeline can be exercised without any external service.
pub struct MockRecognizer;

impl MockRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn streaming_recognize(
        &self,
        cancel: CancellationToken,
        audio: SharedAudio,
        _config: RecognizeConfig,
        results: mpsc::Sender<RecognitionResult>,
    ) -> Result<(), RecognizeError> {
        let mut counter = 0u64;
        loop {
            let chunk = {
                let mut rx = audio.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RecognizeError::Cancelled),
                    chunk = rx.recv() => chunk,
                }
            };

            let Some(chunk) = chunk else {
                // Audio source closed: natural end of the stream.
                return Ok(());
            };
            if chunk.is_empty() {
                continue;
            }

            counter += 1;
            let result = RecognitionResult {
                transcript: format!("mock fragment {counter}"),
                is_final: true,
                confidence: 0.85,
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(RecognizeError::Cancelled),
                sent = results.send(result) => {
                    if sent.is_err() {
                        // Consumer went away; nothing left to recognize for.
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::shared_audio;

    #[tokio::test]
    async fn yields_one_final_per_chunk() {
        let (audio_tx, audio_rx) = mpsc::channel(8);
        let (results_tx, mut results_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(async move {
            MockRecognizer::new()
                .streaming_recognize(
                    cancel,
                    shared_audio(audio_rx),
                    RecognizeConfig::new("zh-CN"),
                    results_tx,
                )
                .await
        });

        audio_tx.send(vec![0u8; 320]).await.unwrap();
        audio_tx.send(vec![]).await.unwrap();
        audio_tx.send(vec![0u8; 320]).await.unwrap();
        drop(audio_tx);

        let first = results_rx.recv().await.unwrap();
        assert_eq!(first.transcript, "mock fragment 1");
        assert!(first.is_final);
        assert!((first.confidence - 0.85).abs() < f32::EPSILON);

        let second = results_rx.recv().await.unwrap();
        assert_eq!(second.transcript, "mock fragment 2");

        assert!(results_rx.recv().await.is_none());
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_stream() {
        let (_audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(1);
        let (results_tx, _results_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = MockRecognizer::new()
            .streaming_recognize(
                cancel,
                shared_audio(audio_rx),
                RecognizeConfig::new("zh-CN"),
                results_tx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizeError::Cancelled));
    }
}
