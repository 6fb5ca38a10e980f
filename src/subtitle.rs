//! Subtitle entities flowing through the pipeline and broadcaster.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One finalized utterance with all of its translations.
///
/// Ephemeral: built by the pipeline, fanned out by the broadcaster, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtitle {
    pub id: String,
    pub activity_id: String,
    /// The final transcript as recognized.
    pub original: String,
    pub source_lang: String,
    /// Target language code -> translated text.
    pub translations: HashMap<String, String>,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl Subtitle {
    /// Project this subtitle down to a single viewer language.
    ///
    /// Returns `None` when the subtitle carries no translation for that
    /// language; the caller skips the viewer in that case.
    pub fn for_language(&self, language: &str) -> Option<SubtitleForViewer> {
        let text = self.translations.get(language)?.clone();
        Some(SubtitleForViewer {
            id: self.id.clone(),
            original: self.original.clone(),
            source_lang: self.source_lang.clone(),
            target_lang: language.to_string(),
            text,
            timestamp: self.timestamp,
            confidence: self.confidence,
        })
    }
}

/// The single-language projection a viewer actually receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleForViewer {
    pub id: String,
    pub original: String,
    pub source_lang: String,
    pub target_lang: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
}
