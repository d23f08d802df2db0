//! Payment provider abstraction layer.
//!
//! This module defines the [`PaymentProvider`] trait: hosted-checkout URL
//! issuance plus webhook verification and processing. Webhook processing
//! itself is provider-independent ledger logic and lives here as the trait's
//! default implementation; providers contribute the wire format and the
//! signature scheme.
//!
//! Delivery semantics: the provider delivers at-least-once, including
//! concurrent duplicates. Processing is made exactly-once by a row-locked
//! duplicate check inside one transaction per delivery, backed by the unique
//! constraint on `external_order_id`.

use async_trait::async_trait;
use axum::http::HeaderMap;
use sqlx::PgPool;
use url::Url;

use crate::{
    config::{Config, CreditPackage, PaymentConfig},
    db::{
        errors::DbError,
        handlers::{Ledger, Payments},
        models::{
            credits::{LedgerEntryOptions, LedgerEntryType},
            payments::{PaymentCreateDBRequest, PaymentStatus},
        },
    },
    types::UserId,
};

pub mod dummy;
pub mod lemonsqueezy;

/// Create a payment provider from configuration
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires adding a match arm here.
pub fn create_provider(config: &Config) -> Option<std::sync::Arc<dyn PaymentProvider>> {
    config.payment.as_ref().map(|payment| match payment {
        PaymentConfig::Lemonsqueezy(ls) => {
            std::sync::Arc::new(lemonsqueezy::LemonSqueezyProvider::new(ls.clone())) as std::sync::Arc<dyn PaymentProvider>
        }
        PaymentConfig::Dummy(d) => std::sync::Arc::new(dummy::DummyProvider::new(d.credits)),
    })
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur during payment processing
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Signature header missing, undecodable, or failing verification
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Body is not a recognizable payload
    #[error("malformed webhook payload: {0}")]
    InvalidPayload(String),

    /// The reported product variant has no configured package. Surfaced as a
    /// 4xx so the provider does not endlessly retry an unfixable delivery.
    #[error("webhook references unmapped variant {0}")]
    UnknownVariant(String),

    #[error("payment provider error: {0}")]
    ProviderApi(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<PaymentError> for crate::errors::Error {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature => crate::errors::Error::BadRequest {
                message: "Invalid webhook signature".to_string(),
            },
            PaymentError::InvalidPayload(m) => crate::errors::Error::BadRequest {
                message: format!("Malformed webhook payload: {m}"),
            },
            PaymentError::UnknownVariant(v) => crate::errors::Error::BadRequest {
                message: format!("Unknown product variant {v}"),
            },
            PaymentError::ProviderApi(m) => crate::errors::Error::Internal { operation: m },
            PaymentError::Database(db) => crate::errors::Error::Database(db),
        }
    }
}

/// A parsed order event from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    /// The account the order is attributed to (from checkout custom data)
    pub user_id: UserId,
    /// The provider's order id; idempotency key for processing
    pub external_order_id: String,
    /// Product variant, resolved against the configured package table
    pub variant_id: String,
    /// Total paid, in cents
    pub total_cents: i64,
    pub currency: String,
}

/// Webhook deliveries as a tagged union over the provider's event name.
/// Unrecognized names parse to `Ignored` and are acknowledged without side
/// effects - never guessed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    OrderPaid(OrderEvent),
    OrderRefunded(OrderEvent),
    Ignored { event_name: String },
}

/// Abstract payment provider interface
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Hosted-checkout URL for a package. The user id is embedded as custom
    /// metadata so the later webhook can attribute the order to the account.
    fn checkout_url(&self, package: &CreditPackage, user_id: UserId) -> Result<Url>;

    /// Verify the raw delivery and parse it into an event. Verification runs
    /// before any other processing of the body.
    fn parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent>;

    /// Apply a parsed event. Idempotent: processing the same order twice
    /// (sequentially or concurrently) credits the account exactly once.
    async fn process_event(&self, db: &PgPool, config: &Config, event: &WebhookEvent) -> Result<()> {
        match event {
            WebhookEvent::OrderPaid(order) => process_order_paid(db, config, order).await,
            WebhookEvent::OrderRefunded(order) => process_order_refunded(db, order).await,
            WebhookEvent::Ignored { event_name } => {
                tracing::debug!("Ignoring webhook event {event_name}");
                Ok(())
            }
        }
    }
}

/// Apply a paid order: insert the payment record and credit the ledger, all
/// in one transaction. A record already present under the row lock means a
/// duplicate delivery; the transaction is abandoned and the call reports
/// success so the provider gets its 2xx.
pub(crate) async fn process_order_paid(db: &PgPool, config: &Config, order: &OrderEvent) -> Result<()> {
    let package = config
        .package_for_variant(&order.variant_id)
        .ok_or_else(|| PaymentError::UnknownVariant(order.variant_id.clone()))?;

    let mut tx = db.begin().await.map_err(DbError::from)?;

    if Payments::new(&mut tx)
        .get_by_external_order_id_for_update(&order.external_order_id)
        .await?
        .is_some()
    {
        tracing::info!(
            "Order {} already processed, skipping duplicate delivery (idempotent)",
            order.external_order_id
        );
        return Ok(());
    }

    let record = match Payments::new(&mut tx)
        .create(&PaymentCreateDBRequest {
            user_id: order.user_id,
            external_order_id: order.external_order_id.clone(),
            package_name: package.name.clone(),
            credits_amount: package.credits,
            amount_paid_cents: order.total_cents,
            currency: order.currency.clone(),
            metadata: serde_json::json!({ "variant_id": order.variant_id }),
        })
        .await
    {
        Ok(record) => record,
        // A concurrent delivery that committed first trips the unique
        // constraint here; that is the same duplicate case as above.
        Err(e) if e.is_unique_violation_on("payment_records_external_order_id_unique") => {
            tracing::info!(
                "Order {} processed concurrently, skipping duplicate delivery (idempotent)",
                order.external_order_id
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    Ledger::new(&mut tx)
        .credit(
            order.user_id,
            package.credits,
            &LedgerEntryOptions::for_payment(LedgerEntryType::Purchase, record.id)
                .with_description(format!("Purchase of the {} package", package.name)),
        )
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    tracing::info!(
        "Credited {} credits to user {} for order {}",
        package.credits,
        order.user_id,
        order.external_order_id
    );
    Ok(())
}

/// Apply a refund: deduct up to the originally granted credits - never more
/// than the current balance, even if the purchased credits were already
/// spent - and mark the record refunded, in one transaction.
pub(crate) async fn process_order_refunded(db: &PgPool, order: &OrderEvent) -> Result<()> {
    let mut tx = db.begin().await.map_err(DbError::from)?;

    let Some(record) = Payments::new(&mut tx)
        .get_by_external_order_id_for_update(&order.external_order_id)
        .await?
    else {
        tracing::info!("Refund for unknown order {}, ignoring", order.external_order_id);
        return Ok(());
    };

    if record.status == PaymentStatus::Refunded {
        tracing::info!("Order {} already refunded, ignoring", order.external_order_id);
        return Ok(());
    }

    let entry = Ledger::new(&mut tx)
        .debit_at_most(
            record.user_id,
            record.credits_amount,
            &LedgerEntryOptions::for_payment(LedgerEntryType::PurchaseRefund, record.id)
                .with_description(format!("Refund of the {} package", record.package_name)),
        )
        .await?;
    let deducted = entry.map(|e| -e.amount).unwrap_or(0);

    Payments::new(&mut tx)
        .mark_refunded(
            record.id,
            &serde_json::json!({
                "credits_deducted": deducted,
                "refund_total_cents": order.total_cents,
            }),
        )
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    tracing::info!(
        "Refunded order {}: deducted {} of {} granted credits",
        order.external_order_id,
        deducted,
        record.credits_amount
    );
    Ok(())
}
