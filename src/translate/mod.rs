//! Text translation adapters.
//!
//! One finalized transcript fans out to every target language of the
//! activity. The HTTP implementation calls an external translation
//! endpoint; the mock one tags the text with the language code so the
//! full pipeline runs offline.

mod http;
mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpTranslator;
pub use mock::MockTranslator;

/// One translated rendition of the input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub language: String,
    pub text: String,
}

/// Translates a text into several target languages at once.
///
/// Every requested language appears exactly once in the result; a target
/// equal to the source language short-circuits to the original text.
/// Empty input text or an empty target list is an error. Cancellation is
/// the caller's concern: dropping the future aborts any in-flight call.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_langs: &[String],
    ) -> anyhow::Result<Vec<Translation>>;
}

pub(crate) fn check_input(text: &str, target_langs: &[String]) -> anyhow::Result<()> {
    if text.is_empty() {
        anyhow::bail!("text cannot be empty");
    }
    if target_langs.is_empty() {
        anyhow::bail!("target languages cannot be empty");
    }
    Ok(())
}
