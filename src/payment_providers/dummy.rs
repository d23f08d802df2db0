//! Dummy payment provider implementation
//!
//! Useful for development: checkout "succeeds" against a fake URL, and
//! webhook deliveries are accepted without a signature. Processing shares the
//! real transactional path, so idempotency behaves exactly as in production.

use axum::http::HeaderMap;
use url::Url;

use crate::{
    config::CreditPackage,
    payment_providers::{lemonsqueezy::parse_payload, PaymentError, PaymentProvider, Result, WebhookEvent},
    types::UserId,
};

pub struct DummyProvider {
    credits: i64,
}

impl DummyProvider {
    pub fn new(credits: i64) -> Self {
        Self { credits }
    }

    /// Credits granted per dummy purchase (unused by the shared processing
    /// path, which resolves packages from config; kept for dev endpoints)
    pub fn credits(&self) -> i64 {
        self.credits
    }
}

impl PaymentProvider for DummyProvider {
    fn checkout_url(&self, package: &CreditPackage, user_id: UserId) -> Result<Url> {
        Url::parse(&format!(
            "https://checkout.invalid/buy/{}?user_id={user_id}",
            package.variant_id
        ))
        .map_err(|e| PaymentError::ProviderApi(format!("build checkout URL: {e}")))
    }

    fn parse_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent> {
        // No signature scheme; anything with the right shape is accepted
        parse_payload(body)
    }
}
