//! Ticket verification client.
//!
//! One `POST /verify` per distinct code, no client-side retry. Whatever
//! happens on the wire is classified into a [`VerificationOutcome`] before it
//! leaves this module.

use crate::error::{VERIFY_FALLBACK_MESSAGE, VerifyError};
use crate::types::{TicketCode, VerificationOutcome};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// The `error` value that marks a ticket as already redeemed
pub const ALREADY_USED_ERROR: &str = "QR code already used";

/// Future returned by [`TicketVerifier::redeem`]
pub type RedeemFuture = Pin<Box<dyn Future<Output = VerificationOutcome> + Send>>;

/// Redeems ticket codes against the ledger
pub trait TicketVerifier: Send + Sync {
    /// Redeem `code` once and classify the result
    fn redeem(&self, code: TicketCode) -> RedeemFuture;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "qrCode")]
    qr_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Classify a raw verification result
///
/// Blank `error` and `details` fields count as absent.
#[must_use]
pub fn classify(result: Result<String, VerifyError>) -> VerificationOutcome {
    match result {
        Ok(message) => VerificationOutcome::Accepted(message),
        Err(VerifyError::Rejected { error, details, .. }) => {
            let error = error.filter(|e| !e.trim().is_empty());
            let details = details.filter(|d| !d.trim().is_empty());

            if error.as_deref() == Some(ALREADY_USED_ERROR) {
                VerificationOutcome::AlreadyUsed(
                    details.unwrap_or_else(|| ALREADY_USED_ERROR.to_string()),
                )
            } else {
                VerificationOutcome::TransientError(
                    details
                        .or(error)
                        .unwrap_or_else(|| VERIFY_FALLBACK_MESSAGE.to_string()),
                )
            }
        },
        Err(VerifyError::Transport(_) | VerifyError::MalformedBody(_)) => {
            VerificationOutcome::TransientError(VERIFY_FALLBACK_MESSAGE.to_string())
        },
    }
}

// ============================================================================
// HTTP client
// ============================================================================

/// HTTP client for the verification endpoint
#[derive(Clone, Debug)]
pub struct HttpVerificationClient {
    client: Client,
    api_url: String,
}

impl HttpVerificationClient {
    /// Create a client for the service at `api_url`
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Transport`] if the HTTP client cannot be built.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL of the service
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Send one verification request and return the raw result
    ///
    /// # Errors
    ///
    /// - [`VerifyError::Transport`]: no response
    /// - [`VerifyError::Rejected`]: non-success status
    /// - [`VerifyError::MalformedBody`]: success status without a `message`
    pub async fn verify(&self, code: &TicketCode) -> Result<String, VerifyError> {
        let response = self
            .client
            .post(format!("{}/verify", self.api_url))
            .json(&VerifyRequest {
                qr_code: code.as_str(),
            })
            .send()
            .await
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<VerifyResponse>()
                .await
                .map(|body| body.message)
                .map_err(|e| VerifyError::MalformedBody(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let ErrorBody { error, details } = serde_json::from_str(&body).unwrap_or_default();
        Err(VerifyError::Rejected {
            status: status.as_u16(),
            error,
            details,
        })
    }
}

impl TicketVerifier for HttpVerificationClient {
    fn redeem(&self, code: TicketCode) -> RedeemFuture {
        let client = self.clone();
        Box::pin(async move {
            let result = client.verify(&code).await;
            if let Err(error) = &result {
                tracing::warn!(code = %code, %error, "Verification failed");
            }

            let outcome = classify(result);
            let label = match &outcome {
                VerificationOutcome::Accepted(_) => "accepted",
                VerificationOutcome::AlreadyUsed(_) => "already_used",
                VerificationOutcome::TransientError(_) => "transient_error",
            };
            metrics::counter!("scanner.verifications", "outcome" => label).increment(1);
            outcome
        })
    }
}

// ============================================================================
// Scripted verifier
// ============================================================================

#[derive(Debug, Default)]
struct Script {
    responses: HashMap<TicketCode, Vec<VerificationOutcome>>,
    fallback: Option<VerificationOutcome>,
    calls: Vec<TicketCode>,
}

/// Verifier that answers from a script instead of the network
///
/// Responses queued for a code are used in order; once they run out the
/// fallback answers (a transient error unless set). Every call is recorded.
/// Clones share the same script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedVerifier {
    script: Arc<Mutex<Script>>,
    latency: Duration,
}

impl ScriptedVerifier {
    /// An empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every answer by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue `outcome` as the next answer for `code`
    #[must_use]
    pub fn respond(self, code: &str, outcome: VerificationOutcome) -> Self {
        if let Some(code) = TicketCode::parse(code) {
            self.lock().responses.entry(code).or_default().push(outcome);
        }
        self
    }

    /// Answer every unscripted call with `outcome`
    #[must_use]
    pub fn otherwise(self, outcome: VerificationOutcome) -> Self {
        self.lock().fallback = Some(outcome);
        self
    }

    /// Codes redeemed so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<TicketCode> {
        self.lock().calls.clone()
    }

    /// Number of redemptions so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn answer(&self, code: &TicketCode) -> VerificationOutcome {
        let mut script = self.lock();
        script.calls.push(code.clone());

        let queued = script
            .responses
            .get_mut(code)
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.remove(0));

        queued.or_else(|| script.fallback.clone()).unwrap_or_else(|| {
            VerificationOutcome::TransientError(VERIFY_FALLBACK_MESSAGE.to_string())
        })
    }
}

impl TicketVerifier for ScriptedVerifier {
    fn redeem(&self, code: TicketCode) -> RedeemFuture {
        let outcome = self.answer(&code);
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            outcome
        })
    }
}
