//! PostgreSQL-backed directory over the portal's existing tables.
//!
//! The CRUD layer owns the schema. This module only reads `users`, `roles`,
//! `user_roles`, `student` and `faculty`, and writes the reset-token and
//! password columns on `users`. Reset tokens are stored as lowercase hex of
//! their SHA-256 digest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{
    directory::{Directory, OrgContext, StoredCredential},
    roles::{parse_role_names, Role},
};

#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn role_names(&self, email: &str) -> Result<Vec<String>> {
        let query = r"
            SELECT r.name
            FROM users u
            JOIN user_roles ur ON ur.user_id = u.id
            JOIN roles r ON r.id = ur.role_id
            WHERE u.email = $1
            ORDER BY r.name
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let rows = sqlx::query(query)
            .bind(email)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load user roles")?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn find_credential(&self, email: &str) -> Result<Option<StoredCredential>> {
        let query = "SELECT email, password FROM users WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load credential")?;
        let Some(row) = row else {
            return Ok(None);
        };

        let subject: String = row.try_get("email")?;
        let secret_hash: String = row.try_get("password")?;
        let roles = parse_role_names(self.role_names(email).await?);
        Ok(Some(StoredCredential {
            subject,
            secret_hash,
            roles,
        }))
    }

    async fn find_principal_organizational_context(
        &self,
        subject: &str,
    ) -> Result<Option<OrgContext>> {
        let role_names = self.role_names(subject).await?;
        let prefer_faculty = parse_role_names(&role_names).contains(&Role::Faculty);

        // Faculty principals resolve to their faculty row when both exist.
        let query = r"
            SELECT id, branch_id, 0 AS rank
            FROM faculty
            WHERE user_id = (SELECT id FROM users WHERE email = $1)
            UNION ALL
            SELECT id, branch_id, 1 AS rank
            FROM student
            WHERE user_id = (SELECT id FROM users WHERE email = $1)
            ORDER BY rank
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let rows = sqlx::query(query)
            .bind(subject)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load organizational context")?;

        let row = if prefer_faculty {
            rows.first()
        } else {
            rows.last()
        };
        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(OrgContext {
            numeric_id: row.try_get("id")?,
            role_names,
            branch_id: row.try_get("branch_id")?,
        }))
    }

    async fn store_reset_token(
        &self,
        email: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = "UPDATE users SET reset_token = $2, reset_token_expiry = $3 WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let result = sqlx::query(query)
            .bind(email)
            .bind(hex::encode(token_hash))
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to store reset token")?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let query = r"
            UPDATE users
            SET reset_token = NULL, reset_token_expiry = NULL
            WHERE reset_token = $1 AND reset_token_expiry > $2
            RETURNING email
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let row = sqlx::query(query)
            .bind(hex::encode(token_hash))
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume reset token")?;
        row.map(|row| row.try_get::<String, _>("email"))
            .transpose()
            .map_err(Into::into)
    }

    async fn update_secret_hash(&self, email: &str, secret_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password = $2 WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        sqlx::query(query)
            .bind(email)
            .bind(secret_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password")?;
        Ok(())
    }
}
