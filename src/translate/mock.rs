//! Offline translator for local development and tests.

use async_trait::async_trait;

use super::{check_input, Translation, Translator};

/// Wraps the input as `"[LANG] <text>"` for every target language.
pub struct MockTranslator;

impl MockTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_langs: &[String],
    ) -> anyhow::Result<Vec<Translation>> {
        check_input(text, target_langs)?;

        let mut results = Vec::with_capacity(target_langs.len());
        for lang in target_langs {
            if lang.is_empty() {
                continue;
            }
            if lang == source_lang {
                results.push(Translation {
                    language: lang.clone(),
                    text: text.to_string(),
                });
                continue;
            }
            results.push(Translation {
                language: lang.clone(),
                text: format!("[{}] {}", lang.to_uppercase(), text),
            });
        }
        Ok(results)
    }
}
