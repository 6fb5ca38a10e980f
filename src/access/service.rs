//! Token and viewer-entry lifecycle, plus session admission checks.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, Utc};
use log::{info, warn};
use rand::Rng;
use uuid::Uuid;

use super::{
    AccessStore, ActivityToken, GenerateViewerTokenRequest, TokenStatus, TokenType, ViewerEntry,
    ViewerEntryStatus,
};
use crate::activity::{Activity, ActivityStatus, ActivityStore};
use crate::error::AccessError;

const SPEAKER_TOKEN_TTL_HOURS: i64 = 24;
const VIEWER_TOKEN_TTL_MINUTES: i64 = 120;
const VIEWER_CODE_LENGTH: usize = 6;
/// Uppercase letters and digits minus the confusables I, O, 0, 1.
const VIEWER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Issues, lists, revokes and validates activity credentials.
pub struct AccessService {
    activities: Arc<dyn ActivityStore>,
    store: Arc<dyn AccessStore>,
    viewer_base: String,
}

impl AccessService {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        store: Arc<dyn AccessStore>,
        viewer_base_url: &str,
    ) -> Self {
        Self {
            activities,
            store,
            viewer_base: viewer_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Issue a speaker token with the default 24 h lifetime. Multiple
    /// active speaker tokens per activity are allowed.
    pub async fn generate_speaker_token(
        &self,
        activity_id: &str,
    ) -> Result<ActivityToken, AccessError> {
        self.activities.find_by_id(activity_id)?;

        let now = Utc::now();
        let token = ActivityToken {
            id: Uuid::new_v4().to_string(),
            activity_id: activity_id.to_string(),
            token_type: TokenType::Speaker,
            value: Uuid::new_v4().to_string(),
            expires_at: now + Duration::hours(SPEAKER_TOKEN_TTL_HOURS),
            max_audience: None,
            created_at: now,
            status: TokenStatus::Active,
        };

        self.store.create_token(&token).await?;
        info!("Issued speaker token {} for activity {activity_id}", token.id);
        Ok(token)
    }

    /// Revoke every active speaker token of the activity.
    pub async fn revoke_speaker_tokens(&self, activity_id: &str) -> Result<(), AccessError> {
        self.activities.find_by_id(activity_id)?;
        self.store
            .revoke_tokens(activity_id, TokenType::Speaker)
            .await
    }

    /// Revoke one speaker token. Idempotent on an already-revoked token;
    /// rejects a missing token, a wrong activity, or a viewer token.
    pub async fn revoke_speaker_token(
        &self,
        activity_id: &str,
        token_id: &str,
    ) -> Result<(), AccessError> {
        if token_id.is_empty() {
            return Err(AccessError::EmptyTokenId);
        }

        let token = self
            .store
            .find_token_by_id(token_id)
            .await?
            .filter(|t| t.activity_id == activity_id)
            .ok_or(AccessError::TokenNotFound)?;
        if token.token_type != TokenType::Speaker {
            return Err(AccessError::TokenTypeMismatch);
        }
        if token.status == TokenStatus::Revoked {
            return Ok(());
        }

        self.store
            .update_token_status(token_id, TokenStatus::Revoked)
            .await
    }

    /// Issue a fresh viewer invite code.
    ///
    /// Revokes every prior active viewer token, persists the new one, and
    /// flips the viewer entry to active with a share URL built from the
    /// new code, as one step from the caller's point of view.
    pub async fn generate_viewer_token(
        &self,
        activity_id: &str,
        req: &GenerateViewerTokenRequest,
    ) -> Result<ActivityToken, AccessError> {
        self.activities.find_by_id(activity_id)?;

        let ttl_minutes = match req.ttl_minutes {
            Some(minutes) if minutes > 0 => minutes as i64,
            _ => VIEWER_TOKEN_TTL_MINUTES,
        };

        let now = Utc::now();
        let code = generate_invite_code(VIEWER_CODE_LENGTH).to_uppercase();
        let token = ActivityToken {
            id: Uuid::new_v4().to_string(),
            activity_id: activity_id.to_string(),
            token_type: TokenType::Viewer,
            value: code.clone(),
            expires_at: now + Duration::minutes(ttl_minutes),
            max_audience: req.max_audience.filter(|&n| n > 0),
            created_at: now,
            status: TokenStatus::Active,
        };

        let share_url = self.build_share_url(activity_id, &code);
        let entry = ViewerEntry {
            activity_id: activity_id.to_string(),
            share_url: share_url.clone(),
            qr_type: "text".to_string(),
            qr_content: encode_text_as_data_url(&share_url),
            status: ViewerEntryStatus::Active,
            updated_at: now,
        };

        self.store
            .revoke_tokens(activity_id, TokenType::Viewer)
            .await?;
        self.store.create_token(&token).await?;
        self.store.upsert_viewer_entry(&entry).await?;

        info!("Issued viewer code for activity {activity_id} (ttl {ttl_minutes}m)");
        Ok(token)
    }

    /// List all tokens of an activity, promoting overdue active tokens to
    /// expired first.
    pub async fn list_tokens(
        &self,
        activity_id: &str,
    ) -> Result<Vec<ActivityToken>, AccessError> {
        self.activities.find_by_id(activity_id)?;

        let mut tokens = self.store.list_tokens(activity_id).await?;
        for token in &mut tokens {
            self.promote_if_expired(token).await;
        }
        Ok(tokens)
    }

    /// The persisted viewer entry, or a synthetic inactive one pointing at
    /// the activity's base viewer URL when none has been generated yet.
    pub async fn get_viewer_entry(
        &self,
        activity_id: &str,
    ) -> Result<ViewerEntry, AccessError> {
        let activity = self.activities.find_by_id(activity_id)?;

        if let Some(entry) = self.store.get_viewer_entry(activity_id).await? {
            return Ok(entry);
        }

        Ok(ViewerEntry {
            activity_id: activity_id.to_string(),
            share_url: activity.viewer_url.clone(),
            qr_type: "text".to_string(),
            qr_content: encode_text_as_data_url(&activity.viewer_url),
            status: ViewerEntryStatus::Inactive,
            updated_at: Utc::now(),
        })
    }

    /// Disable the viewer entry: blanks the QR payload and revokes every
    /// active viewer token. Requires a persisted entry.
    pub async fn revoke_viewer_entry(
        &self,
        activity_id: &str,
    ) -> Result<ViewerEntry, AccessError> {
        self.activities.find_by_id(activity_id)?;

        let mut entry = self
            .store
            .get_viewer_entry(activity_id)
            .await?
            .ok_or(AccessError::ViewerEntryMissing)?;

        entry.status = ViewerEntryStatus::Revoked;
        entry.qr_content = String::new();
        entry.updated_at = Utc::now();

        self.store
            .revoke_tokens(activity_id, TokenType::Viewer)
            .await?;
        self.store.upsert_viewer_entry(&entry).await?;

        info!("Revoked viewer entry for activity {activity_id}");
        Ok(entry)
    }

    /// Re-enable a revoked or inactive entry using the latest viewer
    /// token. Fails when no viewer token exists, or when the latest one
    /// has already expired (which it then promotes).
    pub async fn activate_viewer_entry(
        &self,
        activity_id: &str,
    ) -> Result<ViewerEntry, AccessError> {
        self.activities.find_by_id(activity_id)?;

        let mut entry = self
            .store
            .get_viewer_entry(activity_id)
            .await?
            .ok_or(AccessError::ViewerEntryMissing)?;

        let tokens = self.store.list_tokens(activity_id).await?;
        let latest = tokens
            .into_iter()
            .filter(|t| t.token_type == TokenType::Viewer)
            .max_by_key(|t| t.created_at)
            .ok_or(AccessError::NoViewerToken)?;

        if latest.is_past_expiry(Utc::now()) {
            if let Err(e) = self
                .store
                .update_token_status(&latest.id, TokenStatus::Expired)
                .await
            {
                warn!("Failed to promote expired viewer token {}: {e}", latest.id);
            }
            return Err(AccessError::LatestViewerTokenExpired);
        }

        entry.status = ViewerEntryStatus::Active;
        entry.share_url = self.build_share_url(activity_id, &latest.value);
        entry.qr_type = "text".to_string();
        entry.qr_content = encode_text_as_data_url(&entry.share_url);
        entry.updated_at = Utc::now();

        self.store.upsert_viewer_entry(&entry).await?;
        Ok(entry)
    }

    /// Admission check for a speaker connection. Returns the activity on
    /// success so the caller can start a session from its languages.
    pub async fn validate_speaker_session(
        &self,
        activity_id: &str,
        token_value: &str,
        language: &str,
    ) -> Result<Activity, AccessError> {
        let token_value = token_value.trim();
        if token_value.is_empty() {
            return Err(AccessError::EmptyToken);
        }

        let activity = self.activities.find_by_id(activity_id)?;
        if activity.status == ActivityStatus::Closed {
            return Err(AccessError::ActivityClosed);
        }
        if !language.is_empty() && !language.eq_ignore_ascii_case(&activity.input_language) {
            return Err(AccessError::LanguageMismatch(language.to_string()));
        }

        let mut token = self
            .store
            .find_token(activity_id, TokenType::Speaker, token_value)
            .await?
            .ok_or(AccessError::TokenNotFound)?;
        self.promote_if_expired(&mut token).await;

        match token.status {
            TokenStatus::Active => Ok(activity),
            TokenStatus::Revoked => Err(AccessError::TokenRevoked),
            TokenStatus::Expired => Err(AccessError::TokenExpired),
        }
    }

    /// Admission check for a viewer connection. The language must be the
    /// input language or one of the targets; the viewer entry must be
    /// active; the invite code must still be live.
    pub async fn validate_viewer_session(
        &self,
        activity_id: &str,
        token_value: &str,
        language: &str,
    ) -> Result<Activity, AccessError> {
        let token_value = token_value.trim();
        if token_value.is_empty() {
            return Err(AccessError::EmptyToken);
        }
        if language.is_empty() {
            return Err(AccessError::EmptyLanguage);
        }

        let normalized_code = token_value.to_uppercase();

        let activity = self.activities.find_by_id(activity_id)?;
        if activity.status != ActivityStatus::Published {
            return Err(AccessError::ActivityNotPublished);
        }
        if !activity.supports_language(language) {
            return Err(AccessError::LanguageNotEnabled(language.to_string()));
        }

        let entry = self.store.get_viewer_entry(activity_id).await?;
        if !matches!(
            entry,
            Some(ViewerEntry {
                status: ViewerEntryStatus::Active,
                ..
            })
        ) {
            return Err(AccessError::ViewerEntryDisabled);
        }

        let mut token = self
            .store
            .find_token(activity_id, TokenType::Viewer, &normalized_code)
            .await?
            .ok_or(AccessError::TokenNotFound)?;
        self.promote_if_expired(&mut token).await;

        match token.status {
            TokenStatus::Active => Ok(activity),
            TokenStatus::Revoked => Err(AccessError::TokenRevoked),
            TokenStatus::Expired => Err(AccessError::TokenExpired),
        }
    }

    fn build_share_url(&self, activity_id: &str, code: &str) -> String {
        format!("{}/activity/{}?code={}", self.viewer_base, activity_id, code)
    }

    /// Lazy expiry: promote an overdue active token at read time.
    async fn promote_if_expired(&self, token: &mut ActivityToken) {
        if token.status == TokenStatus::Active && token.is_past_expiry(Utc::now()) {
            if let Err(e) = self
                .store
                .update_token_status(&token.id, TokenStatus::Expired)
                .await
            {
                warn!("Failed to promote expired token {}: {e}", token.id);
            }
            token.status = TokenStatus::Expired;
        }
    }
}

fn generate_invite_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| VIEWER_CODE_ALPHABET[rng.gen_range(0..VIEWER_CODE_ALPHABET.len())] as char)
        .collect()
}

fn encode_text_as_data_url(content: &str) -> String {
    format!("data:text/plain;base64,{}", BASE64.encode(content.as_bytes()))
}
