//! HTTP client for an external translation endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;

use super::{check_input, Translation, Translator};

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
}

/// Translator backed by a REST endpoint.
///
/// Each target language is one `POST {base_url}/translate` with a JSON
/// body `{q, source, target}`; the response carries the translated text
/// under `"text"`.
pub struct HttpTranslator {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpTranslator {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: {
                let url: String = base_url.into();
                url.trim_end_matches('/').to_string()
            },
            api_key: api_key.into(),
        }
    }

    async fn translate_one(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let url = format!("{}/translate", self.base_url);
        let mut req = self.client.post(&url).json(&TranslateRequest {
            q: text,
            source,
            target,
        });
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let res = req.send().await.context("failed to send request")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("translation API error ({status}): {body}");
        }

        let json: serde_json::Value = res.json().await.context("invalid response body")?;
        let translated = json["text"]
            .as_str()
            .with_context(|| format!("no translation result for {target}"))?
            .to_string();

        debug!("Translated {} chars to {target}", text.len());
        Ok(translated)
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_langs: &[String],
    ) -> Result<Vec<Translation>> {
        check_input(text, target_langs)?;

        let mut results = Vec::with_capacity(target_langs.len());
        for target in target_langs {
            if target == source_lang {
                results.push(Translation {
                    language: target.clone(),
                    text: text.to_string(),
                });
                continue;
            }

            let translated = self
                .translate_one(text, source_lang, target)
                .await
                .with_context(|| format!("failed to translate to {target}"))?;
            results.push(Translation {
                language: target.clone(),
                text: translated,
            });
        }

        Ok(results)
    }
}
