//! Activity read-model.
//!
//! Activities are owned by an external management surface; the streaming
//! core only reads them to drive admission and session configuration. The
//! store trait keeps that boundary explicit, and the in-memory
//! implementation backs development and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AccessError;

/// Lifecycle status of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Draft,
    Published,
    Closed,
}

/// A live event: one speaker, many viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub speaker: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Language the speaker talks in, e.g. "zh-CN".
    pub input_language: String,
    /// Languages subtitles are translated to. Never empty on a valid activity.
    pub target_languages: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cover_url: String,
    pub status: ActivityStatus,
    /// Viewer-facing base link for this activity.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub viewer_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    /// Whether `language` equals the input language or any target language.
    pub fn supports_language(&self, language: &str) -> bool {
        if self.input_language.eq_ignore_ascii_case(language) {
            return true;
        }
        self.target_languages
            .iter()
            .any(|t| t.eq_ignore_ascii_case(language))
    }
}

/// Read access to activities, as seen by the streaming core.
pub trait ActivityStore: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Activity, AccessError>;
}

/// In-memory activity store for development and tests.
pub struct MemoryActivityStore {
    activities: RwLock<HashMap<String, Activity>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self {
            activities: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, activity: Activity) {
        let mut activities = self.activities.write().unwrap();
        activities.insert(activity.id.clone(), activity);
    }

    pub fn set_status(&self, id: &str, status: ActivityStatus) -> Result<(), AccessError> {
        let mut activities = self.activities.write().unwrap();
        let activity = activities
            .get_mut(id)
            .ok_or_else(|| AccessError::ActivityNotFound(id.to_string()))?;
        activity.status = status;
        activity.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for MemoryActivityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityStore for MemoryActivityStore {
    fn find_by_id(&self, id: &str) -> Result<Activity, AccessError> {
        let activities = self.activities.read().unwrap();
        activities
            .get(id)
            .cloned()
            .ok_or_else(|| AccessError::ActivityNotFound(id.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// A published activity with the given languages, for tests.
    pub fn published_activity(id: &str, input: &str, targets: &[&str]) -> Activity {
        let now = Utc::now();
        Activity {
            id: id.to_string(),
            title: "Demo".to_string(),
            description: String::new(),
            speaker: "Tester".to_string(),
            start_time: now,
            end_time: None,
            input_language: input.to_string(),
            target_languages: targets.iter().map(|s| s.to_string()).collect(),
            cover_url: String::new(),
            status: ActivityStatus::Published,
            viewer_url: format!("http://localhost:3000/activity/{id}"),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::published_activity;
    use super::*;

    #[test]
    fn find_by_id_returns_copy() {
        let store = MemoryActivityStore::new();
        store.insert(published_activity("a1", "zh-CN", &["en"]));

        let found = store.find_by_id("a1").unwrap();
        assert_eq!(found.input_language, "zh-CN");
        assert!(matches!(
            store.find_by_id("missing"),
            Err(AccessError::ActivityNotFound(_))
        ));
    }

    #[test]
    fn language_support_is_case_insensitive() {
        let activity = published_activity("a1", "zh-CN", &["en", "ja"]);
        assert!(activity.supports_language("ZH-cn"));
        assert!(activity.supports_language("EN"));
        assert!(!activity.supports_language("es"));
    }
}
