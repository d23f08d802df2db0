//! Database repository for the credit ledger.
//!
//! This is the only place in the crate that mutates `users.credits`. Both
//! [`Ledger::debit`] and [`Ledger::credit`] take a `FOR UPDATE` lock on the
//! account row before the read-decide-write sequence, so concurrent mutations
//! of the same account serialize at the database. Each mutation appends
//! exactly one `credit_ledger` row in the same transaction: no balance change
//! without an audit record, no audit record without a balance change.
//!
//! Callers that need the mutation to be atomic with other writes (session
//! creation, webhook processing) run the repository on an already-open
//! transaction; the internal `begin` then creates a savepoint and the row
//! lock is held until the outer commit.

use crate::db::{
    errors::{DbError, Result},
    models::credits::{LedgerEntryDBResponse, LedgerEntryOptions, LedgerEntryType},
};
use crate::types::{abbrev_uuid, LedgerEntryId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, PgConnection};
use tracing::instrument;

// Database entity model for a ledger entry
#[derive(Debug, Clone, FromRow)]
struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub entry_type: LedgerEntryType,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryDBResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id,
            entry_type: entry.entry_type,
            amount: entry.amount,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            reference_id: entry.reference_id,
            reference_type: entry.reference_type,
            description: entry.description,
            metadata: entry.metadata,
            created_at: entry.created_at,
        }
    }
}

pub struct Ledger<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Ledger<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Atomically remove `amount` credits from the account and append the
    /// audit entry (with `amount` negated). Fails with
    /// [`DbError::InsufficientCredits`] before any write if the balance
    /// cannot cover the debit.
    #[instrument(skip(self, opts), fields(user_id = %abbrev_uuid(&user_id), amount), err)]
    pub async fn debit(&mut self, user_id: UserId, amount: i64, opts: &LedgerEntryOptions) -> Result<LedgerEntryDBResponse> {
        if amount <= 0 {
            return Err(DbError::Other(anyhow::anyhow!("debit amount must be positive, got {amount}")));
        }
        self.apply(user_id, -amount, opts).await
    }

    /// Atomically add `amount` credits to the account and append the audit
    /// entry. Used for purchases, refunds and admin grants.
    #[instrument(skip(self, opts), fields(user_id = %abbrev_uuid(&user_id), amount), err)]
    pub async fn credit(&mut self, user_id: UserId, amount: i64, opts: &LedgerEntryOptions) -> Result<LedgerEntryDBResponse> {
        if amount <= 0 {
            return Err(DbError::Other(anyhow::anyhow!("credit amount must be positive, got {amount}")));
        }
        self.apply(user_id, amount, opts).await
    }

    /// Debit up to `amount`, clamped to the available balance, so the balance
    /// never goes negative. Used by refunds, where the purchased credits may
    /// already have been spent. Returns `None` when the clamp leaves nothing
    /// to deduct (no balance change, so no ledger entry either).
    #[instrument(skip(self, opts), fields(user_id = %abbrev_uuid(&user_id), amount), err)]
    pub async fn debit_at_most(
        &mut self,
        user_id: UserId,
        amount: i64,
        opts: &LedgerEntryOptions,
    ) -> Result<Option<LedgerEntryDBResponse>> {
        if amount < 0 {
            return Err(DbError::Other(anyhow::anyhow!("debit amount must not be negative, got {amount}")));
        }

        let mut tx = self.db.begin().await?;

        let balance_before: i64 = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        let deduct = amount.min(balance_before);
        if deduct == 0 {
            tx.commit().await?;
            return Ok(None);
        }

        let balance_after = balance_before - deduct;

        sqlx::query("UPDATE users SET credits = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(balance_after)
            .execute(&mut *tx)
            .await?;

        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO credit_ledger
                (user_id, entry_type, amount, balance_before, balance_after,
                 reference_id, reference_type, description, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&opts.entry_type)
        .bind(-deduct)
        .bind(balance_before)
        .bind(balance_after)
        .bind(&opts.reference_id)
        .bind(&opts.reference_type)
        .bind(&opts.description)
        .bind(&opts.metadata)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(LedgerEntryDBResponse::from(entry)))
    }

    /// The single read-decide-write sequence behind both mutations. The
    /// account row is locked first, so the balance read here cannot be
    /// invalidated by a concurrent request.
    async fn apply(&mut self, user_id: UserId, signed_amount: i64, opts: &LedgerEntryOptions) -> Result<LedgerEntryDBResponse> {
        let mut tx = self.db.begin().await?;

        let balance_before: i64 = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        let balance_after = balance_before + signed_amount;
        if balance_after < 0 {
            return Err(DbError::InsufficientCredits {
                available: balance_before,
                requested: -signed_amount,
            });
        }

        sqlx::query("UPDATE users SET credits = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(balance_after)
            .execute(&mut *tx)
            .await?;

        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO credit_ledger
                (user_id, entry_type, amount, balance_before, balance_after,
                 reference_id, reference_type, description, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&opts.entry_type)
        .bind(signed_amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(&opts.reference_id)
        .bind(&opts.reference_type)
        .bind(&opts.description)
        .bind(&opts.metadata)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LedgerEntryDBResponse::from(entry))
    }

    /// Current balance for an account
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn balance(&mut self, user_id: UserId) -> Result<i64> {
        sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Ledger history for an account, newest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), skip, limit), err)]
    pub async fn list_user_entries(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<LedgerEntryDBResponse>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT * FROM credit_ledger
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(entries.into_iter().map(LedgerEntryDBResponse::from).collect())
    }

    /// Ledger history across all accounts (admin view)
    #[instrument(skip(self), fields(skip, limit), err)]
    pub async fn list_all_entries(&mut self, skip: i64, limit: i64) -> Result<Vec<LedgerEntryDBResponse>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT * FROM credit_ledger
            ORDER BY created_at DESC, id DESC
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(entries.into_iter().map(LedgerEntryDBResponse::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_credit_and_debit_update_balance_and_ledger(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut ledger = Ledger::new(&mut conn);

        let entry = ledger
            .credit(user.id, 10, &LedgerEntryOptions::new(LedgerEntryType::AdminGrant))
            .await
            .unwrap();
        assert_eq!(entry.amount, 10);
        assert_eq!(entry.balance_before, 0);
        assert_eq!(entry.balance_after, 10);

        let entry = ledger
            .debit(user.id, 3, &LedgerEntryOptions::new(LedgerEntryType::FeedbackSpend))
            .await
            .unwrap();
        assert_eq!(entry.amount, -3);
        assert_eq!(entry.balance_before, 10);
        assert_eq!(entry.balance_after, 7);

        assert_eq!(ledger.balance(user.id).await.unwrap(), 7);

        // Conservation: balance equals the sum of all entry amounts
        let entries = ledger.list_user_entries(user.id, 0, 100).await.unwrap();
        let total: i64 = entries.iter().map(|e| e.amount).sum();
        assert_eq!(total, 7);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_debit_beyond_balance_fails_without_writes(pool: PgPool) {
        let user = create_test_user(&pool, 2).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut ledger = Ledger::new(&mut conn);

        let err = ledger
            .debit(user.id, 5, &LedgerEntryOptions::new(LedgerEntryType::FeedbackSpend))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InsufficientCredits { available: 2, requested: 5 }));

        // Nothing was written: balance intact, no ledger entry beyond the seed grant
        assert_eq!(ledger.balance(user.id).await.unwrap(), 2);
        let entries = ledger.list_user_entries(user.id, 0, 100).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_debit_unknown_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut ledger = Ledger::new(&mut conn);

        let err = ledger
            .debit(uuid::Uuid::new_v4(), 1, &LedgerEntryOptions::new(LedgerEntryType::FeedbackSpend))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_debits_cannot_double_spend(pool: PgPool) {
        let user = create_test_user(&pool, 5).await;

        // Two tasks race to debit the full balance; the row lock serializes
        // them, so exactly one may win.
        let (a, b) = tokio::join!(
            async {
                let mut conn = pool.acquire().await.unwrap();
                Ledger::new(&mut conn)
                    .debit(user.id, 5, &LedgerEntryOptions::new(LedgerEntryType::FeedbackSpend))
                    .await
            },
            async {
                let mut conn = pool.acquire().await.unwrap();
                Ledger::new(&mut conn)
                    .debit(user.id, 5, &LedgerEntryOptions::new(LedgerEntryType::FeedbackSpend))
                    .await
            }
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one concurrent debit may succeed");

        let failure = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(failure, DbError::InsufficientCredits { .. }));

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Ledger::new(&mut conn).balance(user.id).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_debit_at_most_clamps_to_balance(pool: PgPool) {
        let user = create_test_user(&pool, 3).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut ledger = Ledger::new(&mut conn);

        let entry = ledger
            .debit_at_most(user.id, 50, &LedgerEntryOptions::new(LedgerEntryType::PurchaseRefund))
            .await
            .unwrap()
            .expect("a clamped debit should still write an entry");
        assert_eq!(entry.amount, -3);
        assert_eq!(ledger.balance(user.id).await.unwrap(), 0);

        // Nothing left to deduct: no balance change, so no entry either
        let none = ledger
            .debit_at_most(user.id, 50, &LedgerEntryOptions::new(LedgerEntryType::PurchaseRefund))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rolled_back_transaction_leaves_no_trace(pool: PgPool) {
        let user = create_test_user(&pool, 4).await;

        {
            let mut tx = pool.begin().await.unwrap();
            let mut ledger = Ledger::new(&mut tx);
            ledger
                .debit(user.id, 4, &LedgerEntryOptions::new(LedgerEntryType::FeedbackSpend))
                .await
                .unwrap();
            // dropped without commit
        }

        let mut conn = pool.acquire().await.unwrap();
        let mut ledger = Ledger::new(&mut conn);
        assert_eq!(ledger.balance(user.id).await.unwrap(), 4);
        assert_eq!(ledger.list_user_entries(user.id, 0, 100).await.unwrap().len(), 1);
    }
}
