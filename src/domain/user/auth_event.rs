//! Identity-provider webhook payloads.

use serde::Deserialize;

use crate::domain::billing::WebhookError;
use crate::domain::foundation::UserId;

use super::AuthUserProfile;

/// A verified identity-provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// `user.created` or `user.updated`.
    UserUpserted(AuthUserProfile),
    /// `user.deleted`; the id may be absent on the wire.
    UserDeleted(Option<UserId>),
    Other(String),
}

impl AuthEvent {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawAuthEvent =
            serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))?;

        match raw.event_type.as_str() {
            "user.created" | "user.updated" => {
                let id = raw
                    .data
                    .id
                    .as_deref()
                    .ok_or_else(|| WebhookError::ParseError("user id missing".to_string()))?;
                let id = UserId::new(id).map_err(|e| WebhookError::ParseError(e.to_string()))?;
                Ok(Self::UserUpserted(raw.data.into_profile(id)))
            }
            "user.deleted" => Ok(Self::UserDeleted(
                raw.data.id.and_then(|id| UserId::new(id).ok()),
            )),
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct RawAuthEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: RawAuthUser,
}

#[derive(Deserialize, Default)]
struct RawAuthUser {
    id: Option<String>,
    #[serde(default)]
    email_addresses: Vec<RawEmailAddress>,
    primary_email_address_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct RawEmailAddress {
    id: Option<String>,
    email_address: Option<String>,
}

impl RawAuthUser {
    fn into_profile(self, id: UserId) -> AuthUserProfile {
        let primary = self.primary_email_address_id.as_deref();
        let email = self
            .email_addresses
            .iter()
            .find(|e| primary.is_some() && e.id.as_deref() == primary)
            .or_else(|| self.email_addresses.first())
            .and_then(|e| e.email_address.clone());

        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        AuthUserProfile {
            id,
            email,
            name: Some(name).filter(|n| !n.is_empty()),
            image_url: self.image_url.filter(|u| !u.is_empty()),
        }
    }
}
