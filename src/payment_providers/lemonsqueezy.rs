//! Lemon Squeezy payment provider.
//!
//! Checkout uses the store's hosted checkout links with the buyer's account
//! id embedded as custom metadata. Webhooks arrive signed with
//! HMAC-SHA256 over the raw request body, hex-encoded in the `X-Signature`
//! header; verification uses a constant-time comparison and happens before
//! the body is parsed.
//!
//! Only `order_created` deliveries whose order status is `paid` trigger
//! crediting. `order_refunded` triggers the refund flow. Every other event
//! name is acknowledged and dropped.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use url::Url;

use crate::{
    config::{CreditPackage, LemonSqueezyConfig},
    payment_providers::{OrderEvent, PaymentError, PaymentProvider, Result, WebhookEvent},
    types::UserId,
};

type HmacSha256 = Hmac<Sha256>;

/// Name of the signature header sent with each delivery
pub const SIGNATURE_HEADER: &str = "X-Signature";

pub struct LemonSqueezyProvider {
    config: LemonSqueezyConfig,
}

impl LemonSqueezyProvider {
    pub fn new(config: LemonSqueezyConfig) -> Self {
        Self { config }
    }
}

/// Verify the hex-encoded HMAC-SHA256 signature over the raw body.
/// `Mac::verify_slice` compares in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> Result<()> {
    let signature = hex::decode(signature_hex.trim()).map_err(|_| PaymentError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&signature).map_err(|_| PaymentError::InvalidSignature)
}

// Wire format of a webhook delivery (JSON:API shaped)

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    meta: WebhookMeta,
    data: OrderData,
}

#[derive(Debug, Deserialize)]
struct WebhookMeta {
    event_name: String,
    #[serde(default)]
    custom_data: Option<CustomData>,
}

#[derive(Debug, Deserialize)]
struct CustomData {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderData {
    id: String,
    attributes: OrderAttributes,
}

#[derive(Debug, Deserialize)]
struct OrderAttributes {
    first_order_item: FirstOrderItem,
    total: i64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct FirstOrderItem {
    variant_id: serde_json::Value,
}

impl WebhookPayload {
    /// Strictly extract the order fields needed for processing. Anything
    /// missing or unparseable is a payload error, not a guess.
    fn into_order_event(self) -> Result<OrderEvent> {
        let user_id: UserId = self
            .meta
            .custom_data
            .ok_or_else(|| PaymentError::InvalidPayload("missing meta.custom_data".to_string()))?
            .user_id
            .parse()
            .map_err(|_| PaymentError::InvalidPayload("custom_data.user_id is not a UUID".to_string()))?;

        // The provider reports variant_id as a JSON number; normalize to text
        let variant_id = match &self.data.attributes.first_order_item.variant_id {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.clone(),
            other => {
                return Err(PaymentError::InvalidPayload(format!(
                    "first_order_item.variant_id has unexpected type: {other}"
                )))
            }
        };

        Ok(OrderEvent {
            user_id,
            external_order_id: self.data.id,
            variant_id,
            total_cents: self.data.attributes.total,
            currency: self.data.attributes.currency,
        })
    }
}

/// Parse a verified body into the event union
pub fn parse_payload(body: &[u8]) -> Result<WebhookEvent> {
    let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

    match payload.meta.event_name.as_str() {
        "order_created" => {
            // Only paid orders grant credits; anything else is acknowledged
            if payload.data.attributes.status != "paid" {
                return Ok(WebhookEvent::Ignored {
                    event_name: format!("order_created[{}]", payload.data.attributes.status),
                });
            }
            Ok(WebhookEvent::OrderPaid(payload.into_order_event()?))
        }
        "order_refunded" => Ok(WebhookEvent::OrderRefunded(payload.into_order_event()?)),
        other => Ok(WebhookEvent::Ignored {
            event_name: other.to_string(),
        }),
    }
}

impl PaymentProvider for LemonSqueezyProvider {
    fn checkout_url(&self, package: &CreditPackage, user_id: UserId) -> Result<Url> {
        let mut url = self
            .config
            .store_url
            .join(&format!("checkout/buy/{}", package.variant_id))
            .map_err(|e| PaymentError::ProviderApi(format!("build checkout URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("checkout[custom][user_id]", &user_id.to_string());

        Ok(url)
    }

    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(PaymentError::InvalidSignature)?;

        verify_signature(&self.config.signing_secret, body, signature)?;

        parse_payload(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, PaymentConfig};
    use crate::db::handlers::{Ledger, Payments};
    use crate::db::models::payments::PaymentStatus;
    use crate::payment_providers::create_provider;
    use crate::test_utils::{create_test_user, test_config_with_packages};
    use sqlx::PgPool;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn order_body(event_name: &str, user_id: UserId, order_id: &str, variant_id: u64, status: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "meta": {
                "event_name": event_name,
                "custom_data": { "user_id": user_id.to_string() }
            },
            "data": {
                "id": order_id,
                "attributes": {
                    "first_order_item": { "variant_id": variant_id },
                    "total": 900,
                    "currency": "USD",
                    "status": status
                }
            }
        }))
        .unwrap()
    }

    fn provider() -> LemonSqueezyProvider {
        LemonSqueezyProvider::new(LemonSqueezyConfig {
            store_url: Url::parse("https://percepta.lemonsqueezy.com").unwrap(),
            signing_secret: "topsecret".to_string(),
        })
    }

    #[test]
    fn test_signature_round_trip() {
        let body = b"payload bytes";
        let signature = sign("topsecret", body);
        assert!(verify_signature("topsecret", body, &signature).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload bytes";
        let signature = sign("othersecret", body);
        let err = verify_signature("topsecret", body, &signature).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign("topsecret", b"original");
        let err = verify_signature("topsecret", b"tampered", &signature).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        let err = verify_signature("topsecret", b"body", "not hex at all!").unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
    }

    #[test]
    fn test_missing_signature_header_rejected() {
        let provider = provider();
        let body = order_body("order_created", uuid::Uuid::new_v4(), "ord_1", 111, "paid");
        let err = provider.parse_webhook(&HeaderMap::new(), &body).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature));
    }

    #[test]
    fn test_parse_paid_order() {
        let user_id = uuid::Uuid::new_v4();
        let body = order_body("order_created", user_id, "ord_42", 111, "paid");
        let event = parse_payload(&body).unwrap();

        match event {
            WebhookEvent::OrderPaid(order) => {
                assert_eq!(order.user_id, user_id);
                assert_eq!(order.external_order_id, "ord_42");
                assert_eq!(order.variant_id, "111");
                assert_eq!(order.total_cents, 900);
            }
            other => panic!("expected OrderPaid, got {other:?}"),
        }
    }

    #[test]
    fn test_unpaid_order_is_ignored() {
        let body = order_body("order_created", uuid::Uuid::new_v4(), "ord_1", 111, "pending");
        let event = parse_payload(&body).unwrap();
        assert!(matches!(event, WebhookEvent::Ignored { .. }));
    }

    #[test]
    fn test_unrecognized_event_name_is_ignored() {
        let body = order_body("subscription_created", uuid::Uuid::new_v4(), "ord_1", 111, "paid");
        let event = parse_payload(&body).unwrap();
        assert!(matches!(event, WebhookEvent::Ignored { event_name } if event_name == "subscription_created"));
    }

    #[test]
    fn test_missing_custom_data_is_invalid() {
        let body = serde_json::to_vec(&serde_json::json!({
            "meta": { "event_name": "order_created" },
            "data": {
                "id": "ord_1",
                "attributes": {
                    "first_order_item": { "variant_id": 111 },
                    "total": 900,
                    "currency": "USD",
                    "status": "paid"
                }
            }
        }))
        .unwrap();

        let err = parse_payload(&body).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPayload(_)));
    }

    #[test]
    fn test_checkout_url_carries_user_attribution() {
        let provider = provider();
        let user_id = uuid::Uuid::new_v4();
        let package = CreditPackage {
            name: "starter".to_string(),
            variant_id: "111".to_string(),
            credits: 50,
            price_cents: 900,
        };

        let url = provider.checkout_url(&package, user_id).unwrap();
        assert!(url.as_str().starts_with("https://percepta.lemonsqueezy.com/checkout/buy/111"));
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "checkout[custom][user_id]" && v == user_id.to_string()));
    }

    fn paid_event(user_id: UserId, order_id: &str, variant_id: &str) -> WebhookEvent {
        WebhookEvent::OrderPaid(OrderEvent {
            user_id,
            external_order_id: order_id.to_string(),
            variant_id: variant_id.to_string(),
            total_cents: 900,
            currency: "USD".to_string(),
        })
    }

    fn refund_event(user_id: UserId, order_id: &str) -> WebhookEvent {
        WebhookEvent::OrderRefunded(OrderEvent {
            user_id,
            external_order_id: order_id.to_string(),
            variant_id: "111".to_string(),
            total_cents: 900,
            currency: "USD".to_string(),
        })
    }

    async fn provider_with_config() -> (std::sync::Arc<dyn PaymentProvider>, Config) {
        let mut config = test_config_with_packages();
        config.payment = Some(PaymentConfig::Lemonsqueezy(LemonSqueezyConfig {
            store_url: Url::parse("https://percepta.lemonsqueezy.com").unwrap(),
            signing_secret: "topsecret".to_string(),
        }));
        let provider = create_provider(&config).unwrap();
        (provider, config)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_paid_order_credits_once(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let (provider, config) = provider_with_config().await;

        let event = paid_event(user.id, "ord_100", "111");
        provider.process_event(&pool, &config, &event).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Ledger::new(&mut conn).balance(user.id).await.unwrap(), 50);

        // Second (duplicate) delivery: success, no further credit
        provider.process_event(&pool, &config, &event).await.unwrap();
        assert_eq!(Ledger::new(&mut conn).balance(user.id).await.unwrap(), 50);

        let records = Payments::new(&mut conn).list_for_user(user.id, 0, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].credits_amount, 50);
        assert_eq!(records[0].package_name, "starter");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_duplicate_deliveries_credit_once(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let (provider, config) = provider_with_config().await;

        let event = paid_event(user.id, "ord_200", "111");
        let (a, b) = tokio::join!(
            provider.process_event(&pool, &config, &event),
            provider.process_event(&pool, &config, &event)
        );
        a.unwrap();
        b.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Ledger::new(&mut conn).balance(user.id).await.unwrap(), 50);
        let entries = Ledger::new(&mut conn).list_user_entries(user.id, 0, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_variant_fails_without_writes(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let (provider, config) = provider_with_config().await;

        let event = paid_event(user.id, "ord_300", "999");
        let err = provider.process_event(&pool, &config, &event).await.unwrap_err();
        assert!(matches!(err, PaymentError::UnknownVariant(v) if v == "999"));

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Ledger::new(&mut conn).balance(user.id).await.unwrap(), 0);
        assert!(Payments::new(&mut conn).list_for_user(user.id, 0, 10).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refund_deducts_granted_credits(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let (provider, config) = provider_with_config().await;

        provider
            .process_event(&pool, &config, &paid_event(user.id, "ord_400", "111"))
            .await
            .unwrap();
        provider
            .process_event(&pool, &config, &refund_event(user.id, "ord_400"))
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Ledger::new(&mut conn).balance(user.id).await.unwrap(), 0);

        let records = Payments::new(&mut conn).list_for_user(user.id, 0, 10).await.unwrap();
        assert_eq!(records[0].status, PaymentStatus::Refunded);
        assert_eq!(records[0].metadata["credits_deducted"], 50);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refund_floor_never_goes_negative(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let (provider, config) = provider_with_config().await;

        provider
            .process_event(&pool, &config, &paid_event(user.id, "ord_500", "111"))
            .await
            .unwrap();

        // User spends most of the purchased credits before the refund lands
        {
            let mut conn = pool.acquire().await.unwrap();
            Ledger::new(&mut conn)
                .debit(
                    user.id,
                    45,
                    &crate::db::models::credits::LedgerEntryOptions::new(
                        crate::db::models::credits::LedgerEntryType::FeedbackSpend,
                    ),
                )
                .await
                .unwrap();
        }

        provider
            .process_event(&pool, &config, &refund_event(user.id, "ord_500"))
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        // Only the remaining 5 credits could be clawed back
        assert_eq!(Ledger::new(&mut conn).balance(user.id).await.unwrap(), 0);
        let records = Payments::new(&mut conn).list_for_user(user.id, 0, 10).await.unwrap();
        assert_eq!(records[0].metadata["credits_deducted"], 5);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refund_for_unknown_or_refunded_order_is_noop(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let (provider, config) = provider_with_config().await;

        // Unknown order: acknowledged, nothing happens
        provider
            .process_event(&pool, &config, &refund_event(user.id, "ord_never_seen"))
            .await
            .unwrap();

        // Double refund: second one is a no-op
        provider
            .process_event(&pool, &config, &paid_event(user.id, "ord_600", "111"))
            .await
            .unwrap();
        provider
            .process_event(&pool, &config, &refund_event(user.id, "ord_600"))
            .await
            .unwrap();
        provider
            .process_event(&pool, &config, &refund_event(user.id, "ord_600"))
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Ledger::new(&mut conn).balance(user.id).await.unwrap(), 0);
        // One purchase credit + one refund debit, nothing more
        let entries = Ledger::new(&mut conn).list_user_entries(user.id, 0, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
