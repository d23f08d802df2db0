//! Database repository for payment records.

use crate::db::{
    errors::{DbError, Result},
    models::payments::{PaymentCreateDBRequest, PaymentDBResponse, PaymentStatus},
};
use crate::types::{abbrev_uuid, PaymentId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct PaymentRecord {
    pub id: PaymentId,
    pub user_id: UserId,
    pub external_order_id: String,
    pub package_name: String,
    pub credits_amount: i64,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentRecord> for PaymentDBResponse {
    fn from(p: PaymentRecord) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            external_order_id: p.external_order_id,
            package_name: p.package_name,
            credits_amount: p.credits_amount,
            amount_paid_cents: p.amount_paid_cents,
            currency: p.currency,
            status: p.status,
            metadata: p.metadata,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub struct Payments<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Payments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Look up a record by external order id, taking a row lock if it exists.
    /// Must run inside a transaction: the lock is what keeps two concurrent
    /// deliveries of the same order from both passing the duplicate check.
    #[instrument(skip(self), fields(external_order_id = %external_order_id), err)]
    pub async fn get_by_external_order_id_for_update(&mut self, external_order_id: &str) -> Result<Option<PaymentDBResponse>> {
        let record = sqlx::query_as::<_, PaymentRecord>("SELECT * FROM payment_records WHERE external_order_id = $1 FOR UPDATE")
            .bind(external_order_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(record.map(PaymentDBResponse::from))
    }

    /// Insert the record for a paid order. The unique constraint on
    /// `external_order_id` is the second line of defense against duplicate
    /// webhook deliveries.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), external_order_id = %request.external_order_id), err)]
    pub async fn create(&mut self, request: &PaymentCreateDBRequest) -> Result<PaymentDBResponse> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            INSERT INTO payment_records
                (user_id, external_order_id, package_name, credits_amount, amount_paid_cents, currency, status, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, 'completed', $7)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.external_order_id)
        .bind(&request.package_name)
        .bind(request.credits_amount)
        .bind(request.amount_paid_cents)
        .bind(&request.currency)
        .bind(&request.metadata)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(PaymentDBResponse::from(record))
    }

    /// Transition a record to `refunded`, merging refund context into its metadata
    #[instrument(skip(self, refund_metadata), fields(payment_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_refunded(&mut self, id: PaymentId, refund_metadata: &serde_json::Value) -> Result<PaymentDBResponse> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            UPDATE payment_records
            SET status = 'refunded', metadata = metadata || $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(refund_metadata)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(PaymentDBResponse::from(record))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), skip, limit), err)]
    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<PaymentDBResponse>> {
        let records = sqlx::query_as::<_, PaymentRecord>(
            "SELECT * FROM payment_records WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(records.into_iter().map(PaymentDBResponse::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_user;
    use serde_json::json;
    use sqlx::PgPool;

    fn paid_order(user_id: UserId, order_id: &str) -> PaymentCreateDBRequest {
        PaymentCreateDBRequest {
            user_id,
            external_order_id: order_id.to_string(),
            package_name: "starter".to_string(),
            credits_amount: 50,
            amount_paid_cents: 900,
            currency: "USD".to_string(),
            metadata: json!({"variant_id": "111"}),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_lookup(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;

        let mut tx = pool.begin().await.unwrap();
        let mut repo = Payments::new(&mut tx);

        assert!(repo.get_by_external_order_id_for_update("ord_1").await.unwrap().is_none());

        let record = repo.create(&paid_order(user.id, "ord_1")).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);

        let found = repo.get_by_external_order_id_for_update("ord_1").await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
        tx.commit().await.unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_external_order_id_rejected(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Payments::new(&mut conn);

        repo.create(&paid_order(user.id, "ord_dup")).await.unwrap();
        let err = repo.create(&paid_order(user.id, "ord_dup")).await.unwrap_err();
        assert!(err.is_unique_violation_on("payment_records_external_order_id_unique"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_mark_refunded_merges_metadata(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Payments::new(&mut conn);

        let record = repo.create(&paid_order(user.id, "ord_refund")).await.unwrap();
        let refunded = repo
            .mark_refunded(record.id, &json!({"refund_reason": "chargeback", "credits_deducted": 30}))
            .await
            .unwrap();

        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.metadata["variant_id"], "111");
        assert_eq!(refunded.metadata["refund_reason"], "chargeback");
    }
}
