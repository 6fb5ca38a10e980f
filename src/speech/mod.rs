//! Streaming speech recognition adapters.
//!
//! The pipeline drives a recognizer through the [`SpeechRecognizer`]
//! contract: raw PCM chunks in, interim and final transcripts out. The
//! remote implementation talks to an external streaming STT server over
//! TCP; the mock implementation makes the whole system runnable offline.
//!
//! Restart policy does not live here: an adapter runs one stream and
//! reports how it ended. The pipeline decides whether to start another.

mod mock;
mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub use mock::MockRecognizer;
pub use remote::RemoteRecognizer;

/// Audio is 16-bit little-endian PCM, mono.
pub const SAMPLE_RATE_HERTZ: u32 = 16000;

/// Audio source shared across recognizer restarts.
///
/// The pipeline keeps feeding the same channel while successive recognizer
/// iterations take turns reading from it, so the receiver sits behind a
/// shared async mutex.
pub type SharedAudio = Arc<Mutex<mpsc::Receiver<Vec<u8>>>>;

/// Configuration for one recognition stream.
#[derive(Debug, Clone)]
pub struct RecognizeConfig {
    /// BCP-47 language code, e.g. "zh-CN".
    pub language_code: String,
    pub sample_rate_hertz: u32,
    pub enable_automatic_punctuation: bool,
}

impl RecognizeConfig {
    pub fn new(language_code: impl Into<String>) -> Self {
        Self {
            language_code: language_code.into(),
            sample_rate_hertz: SAMPLE_RATE_HERTZ,
            enable_automatic_punctuation: true,
        }
    }
}

/// One transcript hypothesis from the recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub transcript: String,
    /// Final results are committed text; interim ones may still change.
    pub is_final: bool,
    /// Confidence in [0, 1].
    pub confidence: f32,
}

/// How a recognition stream can fail.
#[derive(Error, Debug)]
pub enum RecognizeError {
    /// The cancellation token fired; expected during a forced restart.
    #[error("recognition cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),
}

/// A bidirectional streaming recognizer.
///
/// Consumes audio from `audio` until the channel closes, pushing results
/// into `results` as they arrive. Returns `Ok(())` on a natural end (audio
/// source closed or the upstream service finished cleanly),
/// [`RecognizeError::Cancelled`] when `cancel` fires first, and
/// [`RecognizeError::Transport`] otherwise. Implementations never
/// reconnect on their own.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn streaming_recognize(
        &self,
        cancel: CancellationToken,
        audio: SharedAudio,
        config: RecognizeConfig,
        results: mpsc::Sender<RecognitionResult>,
    ) -> Result<(), RecognizeError>;
}

/// Wrap a plain receiver into the shared form the recognizers take.
pub fn shared_audio(rx: mpsc::Receiver<Vec<u8>>) -> SharedAudio {
    Arc::new(Mutex::new(rx))
}
