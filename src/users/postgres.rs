//! Postgres-backed [`UserStore`].

use super::{CreateOutcome, NewUser, UpdateOutcome, UserChanges, UserRecord, UserStore};
use crate::auth::password::StoredPassword;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};

const USER_COLUMNS: &str = "id, email, first_name, last_name, password, password_hashed";

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to apply user schema migrations")
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password: StoredPassword::from_columns(row.get("password"), row.get("password_hashed")),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ping(&self) -> Result<()> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .context("failed to acquire database connection")?;
            conn.ping().await.context("failed to ping database")
        }
        .instrument(span)
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user by email")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to list users")?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome> {
        let query = format!(
            r"
            INSERT INTO users (first_name, last_name, email, password, password_hashed)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING {USER_COLUMNS}
            "
        );
        let result = sqlx::query(&query)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await;
        match result {
            Ok(row) => Ok(CreateOutcome::Created(user_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::EmailTaken),
            Err(err) => Err(anyhow::Error::new(err).context("failed to insert user")),
        }
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<UpdateOutcome> {
        let query = format!(
            r"
            UPDATE users
            SET
                first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                email = COALESCE($3, email),
                password = COALESCE($4, password),
                password_hashed = CASE WHEN $4::text IS NULL THEN password_hashed ELSE TRUE END,
                updated_at = NOW()
            WHERE id = $5
            RETURNING {USER_COLUMNS}
            "
        );
        let result = sqlx::query(&query)
            .bind(changes.first_name)
            .bind(changes.last_name)
            .bind(changes.email)
            .bind(changes.password_hash)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await;
        match result {
            Ok(Some(row)) => Ok(UpdateOutcome::Updated(user_from_row(&row))),
            Ok(None) => Ok(UpdateOutcome::NotFound),
            Err(err) if is_unique_violation(&err) => Ok(UpdateOutcome::EmailTaken),
            Err(err) => Err(anyhow::Error::new(err).context("failed to update user")),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let query = "DELETE FROM users WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn upgrade_password(&self, id: i64, hash: &str) -> Result<bool> {
        // Only the password columns are written; concurrent upgrades of the
        // same row resolve to whichever lands first.
        let query = r"
            UPDATE users
            SET password = $1, password_hashed = TRUE, updated_at = NOW()
            WHERE id = $2 AND NOT password_hashed
        ";
        let result = sqlx::query(query)
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to upgrade password")?;
        Ok(result.rows_affected() > 0)
    }

    async fn legacy_passwords(&self) -> Result<Vec<(i64, String)>> {
        let query = "SELECT id, password FROM users WHERE NOT password_hashed ORDER BY id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list legacy passwords")?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("password")))
            .collect())
    }
}
