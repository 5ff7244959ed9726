//! HandleAuthWebhookHandler - keeps user rows in step with the identity
//! provider.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::application::services::UserService;
use crate::domain::billing::{HeaderScheme, StandardWebhookVerifier, WebhookError, WebhookHeaders};
use crate::domain::foundation::UserId;
use crate::domain::user::AuthEvent;

#[derive(Debug, Clone)]
pub struct HandleAuthWebhookCommand {
    pub headers: HeaderMap,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleAuthWebhookResult {
    Synced(UserId),
    Deleted { user_id: UserId, existed: bool },
    Ignored(String),
}

#[derive(Debug, Error)]
pub enum AuthWebhookError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("No user ID found")]
    MissingUserId,

    #[error("Error syncing user: {0}")]
    SyncFailed(String),

    #[error("Error deleting user: {0}")]
    DeleteFailed(String),
}

impl AuthWebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthWebhookError::Webhook(e) => e.status_code(),
            AuthWebhookError::MissingUserId => StatusCode::BAD_REQUEST,
            AuthWebhookError::SyncFailed(_) | AuthWebhookError::DeleteFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            AuthWebhookError::Webhook(e) => e.public_message(),
            AuthWebhookError::MissingUserId => "No user ID found",
            AuthWebhookError::SyncFailed(_) => "Error syncing user",
            AuthWebhookError::DeleteFailed(_) => "Error deleting user",
        }
    }
}

pub struct HandleAuthWebhookHandler {
    verifier: Option<Arc<StandardWebhookVerifier>>,
    users: Arc<UserService>,
}

impl HandleAuthWebhookHandler {
    pub fn new(verifier: Option<Arc<StandardWebhookVerifier>>, users: Arc<UserService>) -> Self {
        Self { verifier, users }
    }

    pub async fn handle(&self, cmd: HandleAuthWebhookCommand) -> Result<HandleAuthWebhookResult, AuthWebhookError> {
        let verifier = self.verifier.as_ref().ok_or(WebhookError::NotConfigured)?;
        let headers = WebhookHeaders::from_header_map(&cmd.headers, HeaderScheme::Svix)?;
        verifier.verify(&headers, &cmd.payload)?;

        match AuthEvent::parse(&cmd.payload)? {
            AuthEvent::UserUpserted(profile) => {
                let user = self.users.sync_auth_user(&profile).await.map_err(|e| {
                    tracing::error!(user_id = %profile.id, error = %e, "Error syncing user");
                    AuthWebhookError::SyncFailed(e.to_string())
                })?;
                tracing::info!(user_id = %user.id, "User synced from identity provider");
                Ok(HandleAuthWebhookResult::Synced(user.id))
            }
            AuthEvent::UserDeleted(None) => Err(AuthWebhookError::MissingUserId),
            AuthEvent::UserDeleted(Some(user_id)) => {
                let existed = self.users.delete_user(&user_id).await.map_err(|e| {
                    tracing::error!(user_id = %user_id, error = %e, "Error deleting user");
                    AuthWebhookError::DeleteFailed(e.to_string())
                })?;
                Ok(HandleAuthWebhookResult::Deleted { user_id, existed })
            }
            AuthEvent::Other(event_type) => {
                tracing::debug!(event_type = %event_type, "Identity event ignored");
                Ok(HandleAuthWebhookResult::Ignored(event_type))
            }
        }
    }
}
