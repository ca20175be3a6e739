// Booking backend HTTP client
//
// Wraps `reqwest::Client` with widget-API URL construction and envelope
// unwrapping. All methods return unwrapped `data` payloads -- the
// `{data, error}` envelope is stripped before the caller sees it.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{
    ApiEnvelope, CheckoutRequest, CheckoutResponse, GiftCardValidation, PromoValidation,
    WireActivity, WireSession, WireVenue,
};

/// HTTP client for the booking backend's widget API.
///
/// Handles the `{ data, error }` envelope and versioned path construction.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// The `base_url` should be the backend root (e.g.
    /// `https://api.bookly.example`); the widget API prefix is appended
    /// per request.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// Use this when the shell already holds a configured client (tests
    /// inject a bare one pointed at a mock server).
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for a widget API path: `{base}/widget/v1/{path}`.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/widget/v1/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path
        );
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and unwrap the envelope.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        Self::parse_envelope(resp).await
    }

    /// Send a POST request with JSON body and unwrap the envelope.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::parse_envelope(resp).await
    }

    /// Parse the `{ data, error }` envelope, returning `data` on success
    /// or an `Error::Api` when `error` is present.
    async fn parse_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Err(Error::RateLimited { retry_after_secs });
        }

        let body = resp.text().await.map_err(Error::Transport)?;

        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if let Some(err) = envelope.error {
            return Err(Error::Api {
                message: err.message,
                code: err.code,
                status: Some(status.as_u16()),
            });
        }

        envelope.data.ok_or_else(|| Error::Deserialization {
            message: "envelope carried neither data nor error".into(),
            body,
        })
    }

    // ── Catalog endpoints ────────────────────────────────────────────

    /// Fetch a venue by id.
    pub async fn venue(&self, venue_id: &str) -> Result<WireVenue, Error> {
        let url = self.api_url(&format!("venues/{venue_id}"))?;
        self.get(url).await
    }

    /// List a venue's activities, optionally filtered to active ones.
    pub async fn activities(
        &self,
        venue_id: &str,
        active_only: bool,
    ) -> Result<Vec<WireActivity>, Error> {
        let mut url = self.api_url(&format!("venues/{venue_id}/activities"))?;
        if active_only {
            url.query_pairs_mut().append_pair("active", "true");
        }
        self.get(url).await
    }

    /// List sessions for an activity within a date range (inclusive).
    pub async fn sessions(
        &self,
        activity_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WireSession>, Error> {
        let mut url = self.api_url(&format!("activities/{activity_id}/sessions"))?;
        url.query_pairs_mut()
            .append_pair("from", &from.to_string())
            .append_pair("to", &to.to_string());
        self.get(url).await
    }

    // ── Discount validation ──────────────────────────────────────────

    /// Validate a promo code against the running amount.
    pub async fn validate_promo(
        &self,
        code: &str,
        amount_cents: i64,
    ) -> Result<PromoValidation, Error> {
        let url = self.api_url("discounts/promo/validate")?;
        self.post(url, &json!({ "code": code, "amount_cents": amount_cents }))
            .await
    }

    /// Validate a gift card code, returning its live balance.
    pub async fn validate_gift_card(&self, code: &str) -> Result<GiftCardValidation, Error> {
        let url = self.api_url("discounts/gift-card/validate")?;
        self.post(url, &json!({ "code": code })).await
    }

    // ── Checkout ─────────────────────────────────────────────────────

    /// Create a reservation and obtain the payment redirect URL.
    pub async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResponse, Error> {
        let url = self.api_url("checkouts")?;
        self.post(url, request).await
    }
}
