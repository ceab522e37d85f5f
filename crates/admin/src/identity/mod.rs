//! Identity-provider webhook ingestion.
//!
//! A delivery is verified, then parsed, then applied, in that order. A
//! delivery that fails verification or parsing never reaches the store.

pub mod event;
pub mod ingestor;
pub mod signature;

use axum::http::HeaderMap;

pub use event::{IdentityEvent, ProfileEvent};
pub use ingestor::{IdentityIngestor, IngestOutcome};
pub use signature::{SignatureError, WebhookVerifier};

use crate::error::AppError;

/// A raw webhook delivery: signature headers plus the unparsed body.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
    pub body: &'a [u8],
}

impl<'a> Delivery<'a> {
    /// Pull the signature headers out of a request.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::MissingHeader` naming the first absent header.
    pub fn from_headers(headers: &'a HeaderMap, body: &'a [u8]) -> Result<Self, SignatureError> {
        let header = |name: &'static str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .ok_or(SignatureError::MissingHeader(name))
        };

        Ok(Self {
            id: header(signature::headers::ID)?,
            timestamp: header(signature::headers::TIMESTAMP)?,
            signature: header(signature::headers::SIGNATURE)?,
            body,
        })
    }

    /// Verify the delivery's signature and parse its body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedEvent` on any verification or parse
    /// failure.
    pub fn open(&self, verifier: &WebhookVerifier) -> Result<IdentityEvent, AppError> {
        verifier
            .verify(self.id, self.timestamp, self.signature, self.body)
            .map_err(|e| {
                tracing::warn!(msg_id = %self.id, error = %e, "Rejected identity webhook");
                AppError::MalformedEvent(e.to_string())
            })?;
        IdentityEvent::parse(self.body)
    }
}

impl IdentityIngestor {
    /// Verify, parse and apply one delivery.
    ///
    /// # Errors
    ///
    /// `AppError::MalformedEvent` for bad signatures or payloads, otherwise
    /// the errors of [`IdentityIngestor::ingest`].
    pub async fn handle_delivery(
        &self,
        verifier: &WebhookVerifier,
        delivery: Delivery<'_>,
    ) -> Result<IngestOutcome, AppError> {
        let event = delivery.open(verifier)?;
        self.ingest(event).await
    }
}
