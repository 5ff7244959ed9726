//! PostgreSQL implementation of CreditTransactionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::credits::{
    CreditTransaction, CreditTransactionKind, NewCreditTransaction, TransactionQuery,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, TransactionId, UserId};
use crate::ports::CreditTransactionRepository;

pub struct PostgresCreditTransactionRepository {
    pool: PgPool,
}

impl PostgresCreditTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CreditTransactionRow {
    id: Uuid,
    user_id: String,
    amount: i64,
    #[sqlx(rename = "type")]
    kind: String,
    description: String,
    reference_id: Option<String>,
    balance_after: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CreditTransactionRow> for CreditTransaction {
    type Error = DomainError;

    fn try_from(row: CreditTransactionRow) -> Result<Self, Self::Error> {
        let kind = row.kind.parse::<CreditTransactionKind>().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid transaction type: {}", e))
        })?;

        Ok(CreditTransaction {
            id: TransactionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            amount: row.amount,
            kind,
            description: row.description,
            reference_id: row.reference_id,
            balance_after: row.balance_after,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

fn db_error(action: &str) -> impl FnOnce(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl CreditTransactionRepository for PostgresCreditTransactionRepository {
    async fn record(&self, entry: NewCreditTransaction) -> Result<CreditTransaction, DomainError> {
        let tx = entry.into_transaction();

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (
                id, user_id, amount, type, description, reference_id, balance_after, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(tx.id.as_uuid())
        .bind(tx.user_id.as_str())
        .bind(tx.amount)
        .bind(tx.kind.as_str())
        .bind(&tx.description)
        .bind(&tx.reference_id)
        .bind(tx.balance_after)
        .bind(tx.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("record credit transaction"))?;

        Ok(tx)
    }

    async fn list(
        &self,
        user_id: &UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>, DomainError> {
        let rows: Vec<CreditTransactionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, amount, type, description, reference_id, balance_after, created_at
            FROM credit_transactions
            WHERE user_id = $1 AND ($2::text IS NULL OR type = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id.as_str())
        .bind(query.kind.map(|k| k.as_str()))
        .bind(i64::from(query.limit))
        .bind(i64::from(query.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list credit transactions"))?;

        rows.into_iter().map(CreditTransaction::try_from).collect()
    }

    async fn find(
        &self,
        id: &TransactionId,
        user_id: &UserId,
    ) -> Result<Option<CreditTransaction>, DomainError> {
        let row: Option<CreditTransactionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, amount, type, description, reference_id, balance_after, created_at
            FROM credit_transactions
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find credit transaction"))?;

        row.map(CreditTransaction::try_from).transpose()
    }

    async fn has_reference(&self, user_id: &UserId, reference_id: &str) -> Result<bool, DomainError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM credit_transactions
                WHERE user_id = $1 AND reference_id = $2
            )
            "#,
        )
        .bind(user_id.as_str())
        .bind(reference_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("check credit transaction reference"))?;

        Ok(exists)
    }

    async fn total_granted(&self, user_id: &UserId) -> Result<i64, DomainError> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM credit_transactions
            WHERE user_id = $1 AND type = 'grant'
            "#,
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("sum granted credits"))?;

        Ok(total)
    }

    async fn total_consumed(&self, user_id: &UserId) -> Result<i64, DomainError> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(ABS(amount)), 0)::BIGINT
            FROM credit_transactions
            WHERE user_id = $1 AND type = 'consume'
            "#,
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("sum consumed credits"))?;

        Ok(total)
    }

    async fn reassign_user(&self, from: &UserId, to: &UserId) -> Result<u64, DomainError> {
        let result = sqlx::query("UPDATE credit_transactions SET user_id = $2 WHERE user_id = $1")
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("reassign credit transactions"))?;

        Ok(result.rows_affected())
    }
}
