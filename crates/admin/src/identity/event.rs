//! Identity webhook payloads.
//!
//! Bodies are an envelope `{"type": "...", "data": {...}}`. The envelope is
//! parsed first and `data` is only interpreted once the type is known, so
//! unrelated event types never fail on an unfamiliar shape.

use serde::Deserialize;

use marketplace_core::{Email, ExternalUserId, Role};

use crate::error::AppError;
use crate::models::IdentityProfile;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    primary_email_address_id: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    private_metadata: Option<PrivateMetadata>,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    id: Option<String>,
    email_address: String,
}

#[derive(Debug, Default, Deserialize)]
struct PrivateMetadata {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeletedData {
    id: String,
}

/// Profile carried by a created or updated event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEvent {
    pub profile: IdentityProfile,
    /// Role already present in the provider's metadata, if recognized.
    pub role_claim: Option<Role>,
}

/// A verified identity event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    Created(ProfileEvent),
    Updated(ProfileEvent),
    Deleted { id: ExternalUserId },
    /// An event type this service does not act on.
    Ignored { event_type: String },
}

impl IdentityEvent {
    /// Parse a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedEvent` if the body is not a well-formed
    /// event of a handled type.
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| AppError::MalformedEvent(format!("invalid envelope: {e}")))?;

        match envelope.event_type.as_str() {
            "user.created" => Ok(Self::Created(profile_event(envelope.data)?)),
            "user.updated" => Ok(Self::Updated(profile_event(envelope.data)?)),
            "user.deleted" => {
                let data: DeletedData = serde_json::from_value(envelope.data)
                    .map_err(|e| AppError::MalformedEvent(format!("invalid user data: {e}")))?;
                Ok(Self::Deleted {
                    id: parse_id(&data.id)?,
                })
            }
            _ => Ok(Self::Ignored {
                event_type: envelope.event_type,
            }),
        }
    }

    /// Webhook type string, for logging.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Created(_) => "user.created",
            Self::Updated(_) => "user.updated",
            Self::Deleted { .. } => "user.deleted",
            Self::Ignored { event_type } => event_type,
        }
    }
}

fn parse_id(raw: &str) -> Result<ExternalUserId, AppError> {
    ExternalUserId::parse(raw).map_err(|e| AppError::MalformedEvent(format!("invalid user id: {e}")))
}

fn profile_event(data: serde_json::Value) -> Result<ProfileEvent, AppError> {
    let data: UserData = serde_json::from_value(data)
        .map_err(|e| AppError::MalformedEvent(format!("invalid user data: {e}")))?;

    let id = parse_id(&data.id)?;
    let email = primary_email(&data)?;

    let full_name = format!(
        "{} {}",
        data.first_name.as_deref().unwrap_or_default(),
        data.last_name.as_deref().unwrap_or_default()
    );
    let name = match full_name.trim() {
        "" => email.local_part().to_owned(),
        trimmed => trimmed.to_owned(),
    };

    let role_claim = data
        .private_metadata
        .and_then(|m| m.role)
        .and_then(|raw| match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!(user_id = %id, error = %e, "Ignoring unrecognized role in event");
                None
            }
        });

    Ok(ProfileEvent {
        profile: IdentityProfile {
            id,
            name,
            email,
            picture: data.image_url.unwrap_or_default(),
        },
        role_claim,
    })
}

/// The address named by `primary_email_address_id`, else the first one.
fn primary_email(data: &UserData) -> Result<Email, AppError> {
    let primary = data
        .primary_email_address_id
        .as_deref()
        .and_then(|primary_id| {
            data.email_addresses
                .iter()
                .find(|address| address.id.as_deref() == Some(primary_id))
        })
        .or_else(|| data.email_addresses.first())
        .ok_or_else(|| AppError::MalformedEvent("user has no email address".to_owned()))?;

    Email::parse(&primary.email_address)
        .map_err(|e| AppError::MalformedEvent(format!("invalid email: {e}")))
}
