//! PostgreSQL implementation of UserRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::user::{AuthUserProfile, OwnedTable, SubscriptionUpdate, UserRecord};
use crate::ports::UserRepository;

const USER_COLUMNS: &str = r#"
    id, legacy_user_id, email, name, image_url, avatar_url,
    subscription_tier, subscription_status, polar_subscription_id, polar_customer_id,
    current_period_start, current_period_end, cancel_at_period_end,
    credits, credits_used, credits_reset_date, created_at, updated_at
"#;

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<UserRecord>, DomainError> {
        // Duplicate emails resolve to the oldest account.
        let sql = format!(
            "SELECT {} FROM users WHERE {} ORDER BY created_at ASC, id ASC LIMIT 1",
            USER_COLUMNS, clause
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Failed to find user: {}", e))
            })?;

        row.map(UserRecord::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    legacy_user_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
    image_url: Option<String>,
    avatar_url: Option<String>,
    subscription_tier: Option<String>,
    subscription_status: Option<String>,
    polar_subscription_id: Option<String>,
    polar_customer_id: Option<String>,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: Option<bool>,
    credits: Option<i64>,
    credits_used: Option<i64>,
    credits_reset_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let parse_id = |raw: String| {
            UserId::new(raw).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user id: {}", e))
            })
        };

        Ok(UserRecord {
            id: parse_id(row.id)?,
            legacy_user_id: row.legacy_user_id.map(parse_id).transpose()?,
            email: row.email,
            name: row.name,
            image_url: row.image_url,
            avatar_url: row.avatar_url,
            subscription_tier: row.subscription_tier,
            subscription_status: row.subscription_status,
            polar_subscription_id: row.polar_subscription_id,
            polar_customer_id: row.polar_customer_id,
            current_period_start: row.current_period_start.map(Timestamp::from_datetime),
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            credits: row.credits,
            credits_used: row.credits_used,
            credits_reset_date: row.credits_reset_date.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, DomainError> {
        self.fetch_one_where("id = $1", id.as_str()).await
    }

    async fn find_by_legacy_id(&self, legacy_id: &UserId) -> Result<Option<UserRecord>, DomainError> {
        self.fetch_one_where("legacy_user_id = $1", legacy_id.as_str()).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DomainError> {
        self.fetch_one_where("LOWER(email) = LOWER($1)", email.trim()).await
    }

    async fn insert(&self, user: &UserRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, legacy_user_id, email, name, image_url, avatar_url,
                subscription_tier, subscription_status, polar_subscription_id, polar_customer_id,
                current_period_start, current_period_end, cancel_at_period_end,
                credits, credits_used, credits_reset_date, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(user.id.as_str())
        .bind(user.legacy_user_id.as_ref().map(UserId::as_str))
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.image_url)
        .bind(&user.avatar_url)
        .bind(&user.subscription_tier)
        .bind(&user.subscription_status)
        .bind(&user.polar_subscription_id)
        .bind(&user.polar_customer_id)
        .bind(user.current_period_start.map(Timestamp::into_datetime))
        .bind(user.current_period_end.map(Timestamp::into_datetime))
        .bind(user.cancel_at_period_end)
        .bind(user.credits)
        .bind(user.credits_used)
        .bind(user.credits_reset_date.map(Timestamp::into_datetime))
        .bind(user.created_at.as_datetime())
        .bind(user.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DomainError::new(
                    ErrorCode::UserAlreadyExists,
                    format!("User {} already exists", user.id),
                );
            }
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to insert user: {}", e))
        })?;

        Ok(())
    }

    async fn update_profile(
        &self,
        id: &UserId,
        profile: &AuthUserProfile,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, name = $3, image_url = $4, avatar_url = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.image_url)
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("update user profile"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_subscription(
        &self,
        id: &UserId,
        update: &SubscriptionUpdate,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = ");
        query_builder.push_bind(now.into_datetime());

        if let Some(v) = &update.polar_subscription_id {
            query_builder.push(", polar_subscription_id = ");
            query_builder.push_bind(v.clone());
        }
        if let Some(v) = &update.polar_customer_id {
            query_builder.push(", polar_customer_id = ");
            query_builder.push_bind(v.clone());
        }
        if let Some(v) = &update.subscription_status {
            query_builder.push(", subscription_status = ");
            query_builder.push_bind(v.clone());
        }
        if let Some(v) = &update.subscription_tier {
            query_builder.push(", subscription_tier = ");
            query_builder.push_bind(v.clone());
        }
        if let Some(v) = update.current_period_start {
            query_builder.push(", current_period_start = ");
            query_builder.push_bind(v.map(Timestamp::into_datetime));
        }
        if let Some(v) = update.current_period_end {
            query_builder.push(", current_period_end = ");
            query_builder.push_bind(v.map(Timestamp::into_datetime));
        }
        if let Some(v) = update.cancel_at_period_end {
            query_builder.push(", cancel_at_period_end = ");
            query_builder.push_bind(v);
        }

        query_builder.push(" WHERE id = ");
        query_builder.push_bind(id.as_str().to_string());

        let result = query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_error("update subscription"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_credits(&self, id: &UserId, amount: i64) -> Result<bool, DomainError> {
        self.grant_credits_with_reset_date(id, amount, None).await
    }

    async fn grant_credits_with_reset_date(
        &self,
        id: &UserId,
        amount: i64,
        reset_date: Option<Timestamp>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET credits = COALESCE(credits, 0) + $2,
                credits_reset_date = COALESCE($3, credits_reset_date),
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(amount)
        .bind(reset_date.map(Timestamp::into_datetime))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error("grant credits"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_set_credits_used(
        &self,
        id: &UserId,
        expected_used: i64,
        new_used: i64,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET credits_used = $3, updated_at = $4
            WHERE id = $1 AND COALESCE(credits_used, 0) = $2
            "#,
        )
        .bind(id.as_str())
        .bind(expected_used)
        .bind(new_used)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error("update credits used"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &UserId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("delete user"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn rekey(&self, old: &UserId, new: &UserId, now: Timestamp) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET id = $2, legacy_user_id = $1, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(old.as_str())
        .bind(new.as_str())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return DomainError::new(
                    ErrorCode::UserAlreadyExists,
                    format!("User {} already exists", new),
                );
            }
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to migrate user: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn reassign_owned(
        &self,
        table: OwnedTable,
        from: &UserId,
        to: &UserId,
    ) -> Result<u64, DomainError> {
        // Table names come from a closed enum, never from input.
        let sql = format!("UPDATE {} SET user_id = $2 WHERE user_id = $1", table.table_name());
        let result = sqlx::query(&sql)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to reassign {}: {}", table, e),
                )
            })?;

        Ok(result.rows_affected())
    }
}
