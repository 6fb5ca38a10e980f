//! TCP client for an external streaming STT server.
//!
//! The server speaks a line-oriented protocol: the client writes raw
//! 16-bit LE PCM and reads one result per line,
//! `partial <confidence> <text>` or `final <confidence> <text>`.
//! Shutting down the write side signals end-of-audio; the server flushes
//! its remaining results and closes.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    RecognitionResult, RecognizeConfig, RecognizeError, SharedAudio, SpeechRecognizer,
};

/// Recognizer backed by a remote streaming STT server.
pub struct RemoteRecognizer {
    addr: String,
    connect_timeout: Duration,
}

impl RemoteRecognizer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Parse a result line: `partial|final <confidence> <text>`.
    fn parse_line(line: &str) -> Option<RecognitionResult> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let mut parts = trimmed.splitn(3, ' ');
        let kind = parts.next()?;
        let is_final = match kind {
            "final" => true,
            "partial" => false,
            _ => return None,
        };
        let confidence = parts.next()?.parse::<f32>().ok()?;
        let transcript = parts.next().unwrap_or("").to_string();

        Some(RecognitionResult {
            transcript,
            is_final,
            confidence,
        })
    }
}

#[async_trait]
impl SpeechRecognizer for RemoteRecognizer {
    async fn streaming_recognize(
        &self,
        cancel: CancellationToken,
        audio: SharedAudio,
        config: RecognizeConfig,
        results: mpsc::Sender<RecognitionResult>,
    ) -> Result<(), RecognizeError> {
        info!(
            "Connecting to STT server at {} ({})",
            self.addr, config.language_code
        );

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| RecognizeError::Transport(format!("connect timeout to {}", self.addr)))?
            .map_err(|e| RecognizeError::Transport(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| RecognizeError::Transport(e.to_string()))?;

        let (read_half, mut write_half) = stream.into_split();

        // Writer: pump audio chunks into the socket until the source closes.
        let writer_cancel = cancel.clone();
        let writer = tokio::spawn(async move {
            loop {
                let chunk = {
                    let mut rx = audio.lock().await;
                    tokio::select! {
                        _ = writer_cancel.cancelled() => return Ok(()),
                        chunk = rx.recv() => chunk,
                    }
                };

                match chunk {
                    None => {
                        // End-of-audio: half-close so the server can flush.
                        let _ = write_half.shutdown().await;
                        return Ok(());
                    }
                    Some(data) => {
                        if let Err(e) = write_half.write_all(&data).await {
                            return Err(e);
                        }
                        debug!("Sent {} audio bytes", data.len());
                    }
                }
            }
        });

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        let outcome = loop {
            line.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => break Err(RecognizeError::Cancelled),
                read = reader.read_line(&mut line) => read,
            };

            match read {
                Ok(0) => break Ok(()),
                Ok(_) => {
                    let Some(result) = Self::parse_line(&line) else {
                        warn!("Unparseable STT line: {}", line.trim_end());
                        continue;
                    };
                    debug!(
                        "STT result (final={}, conf={:.2}): {}",
                        result.is_final, result.confidence, result.transcript
                    );
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => break Err(RecognizeError::Cancelled),
                        sent = results.send(result) => sent,
                    };
                    if sent.is_err() {
                        break Ok(());
                    }
                }
                Err(e) => break Err(RecognizeError::Transport(e.to_string())),
            }
        };

        writer.abort();
        if let Ok(Err(e)) = writer.await {
            // A write failure is only worth surfacing if the read side
            // ended cleanly; otherwise the read error already explains it.
            if outcome.is_ok() {
                return Err(RecognizeError::Transport(e.to_string()));
            }
            warn!("STT writer error: {e}");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_final_line() {
        let result = RemoteRecognizer::parse_line("final 0.91 and so it begins").unwrap();
        assert!(result.is_final);
        assert!((result.confidence - 0.91).abs() < f32::EPSILON);
        assert_eq!(result.transcript, "and so it begins");
    }

    #[test]
    fn parses_partial_line() {
        let result = RemoteRecognizer::parse_line("partial 0.40 and so").unwrap();
        assert!(!result.is_final);
        assert_eq!(result.transcript, "and so");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(RemoteRecognizer::parse_line("").is_none());
        assert!(RemoteRecognizer::parse_line("garbage").is_none());
        assert!(RemoteRecognizer::parse_line("final notanumber text").is_none());
        assert!(RemoteRecognizer::parse_line("hello 0.5 world").is_none());
    }

    #[test]
    fn empty_transcript_is_allowed() {
        let result = RemoteRecognizer::parse_line("final 1.0").unwrap();
        assert_eq!(result.transcript, "");
    }
}
