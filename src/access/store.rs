//! Persistence boundary for tokens and viewer entries.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ActivityToken, TokenStatus, TokenType, ViewerEntry};
use crate::error::AccessError;

/// Storage for tokens and viewer entries.
///
/// Implementations must provide read-your-writes within a single access
/// service operation. Speaker token values match exactly; viewer codes
/// match case-insensitively (the service also uppercases them at both
/// generation and lookup).
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn create_token(&self, token: &ActivityToken) -> Result<(), AccessError>;

    async fn list_tokens(&self, activity_id: &str) -> Result<Vec<ActivityToken>, AccessError>;

    async fn find_token_by_id(&self, id: &str) -> Result<Option<ActivityToken>, AccessError>;

    async fn find_token(
        &self,
        activity_id: &str,
        token_type: TokenType,
        value: &str,
    ) -> Result<Option<ActivityToken>, AccessError>;

    async fn update_token_status(
        &self,
        id: &str,
        status: TokenStatus,
    ) -> Result<(), AccessError>;

    /// Revoke every currently-active token of the given type. Idempotent:
    /// already revoked or expired rows are untouched.
    async fn revoke_tokens(
        &self,
        activity_id: &str,
        token_type: TokenType,
    ) -> Result<(), AccessError>;

    async fn upsert_viewer_entry(&self, entry: &ViewerEntry) -> Result<(), AccessError>;

    async fn get_viewer_entry(
        &self,
        activity_id: &str,
    ) -> Result<Option<ViewerEntry>, AccessError>;
}

#[derive(Default)]
struct MemoryAccessState {
    /// activity id -> tokens, in insertion order.
    tokens: HashMap<String, Vec<ActivityToken>>,
    /// activity id -> viewer entry (at most one per activity).
    entries: HashMap<String, ViewerEntry>,
}

/// In-memory store for development and tests.
pub struct MemoryAccessStore {
    state: Mutex<MemoryAccessState>,
}

impl MemoryAccessStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryAccessState::default()),
        }
    }
}

impl Default for MemoryAccessStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessStore for MemoryAccessStore {
    async fn create_token(&self, token: &ActivityToken) -> Result<(), AccessError> {
        let mut state = self.state.lock().unwrap();
        state
            .tokens
            .entry(token.activity_id.clone())
            .or_default()
            .push(token.clone());
        Ok(())
    }

    async fn list_tokens(&self, activity_id: &str) -> Result<Vec<ActivityToken>, AccessError> {
        let state = self.state.lock().unwrap();
        Ok(state.tokens.get(activity_id).cloned().unwrap_or_default())
    }

    async fn find_token_by_id(&self, id: &str) -> Result<Option<ActivityToken>, AccessError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tokens
            .values()
            .flatten()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn find_token(
        &self,
        activity_id: &str,
        token_type: TokenType,
        value: &str,
    ) -> Result<Option<ActivityToken>, AccessError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tokens
            .get(activity_id)
            .into_iter()
            .flatten()
            .find(|t| {
                t.token_type == token_type
                    && match token_type {
                        TokenType::Speaker => t.value == value,
                        TokenType::Viewer => t.value.eq_ignore_ascii_case(value),
                    }
            })
            .cloned())
    }

    async fn update_token_status(
        &self,
        id: &str,
        status: TokenStatus,
    ) -> Result<(), AccessError> {
        let mut state = self.state.lock().unwrap();
        for tokens in state.tokens.values_mut() {
            if let Some(token) = tokens.iter_mut().find(|t| t.id == id) {
                token.status = status;
                return Ok(());
            }
        }
        Err(AccessError::TokenNotFound)
    }

    async fn revoke_tokens(
        &self,
        activity_id: &str,
        token_type: TokenType,
    ) -> Result<(), AccessError> {
        let mut state = self.state.lock().unwrap();
        if let Some(tokens) = state.tokens.get_mut(activity_id) {
            for token in tokens.iter_mut() {
                if token.token_type == token_type && token.status == TokenStatus::Active {
                    token.status = TokenStatus::Revoked;
                }
            }
        }
        Ok(())
    }

    async fn upsert_viewer_entry(&self, entry: &ViewerEntry) -> Result<(), AccessError> {
        let mut state = self.state.lock().unwrap();
        state
            .entries
            .insert(entry.activity_id.clone(), entry.clone());
        Ok(())
    }

    async fn get_viewer_entry(
        &self,
        activity_id: &str,
    ) -> Result<Option<ViewerEntry>, AccessError> {
        let state = self.state.lock().unwrap();
        Ok(state.entries.get(activity_id).cloned())
    }
}
