use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{DomainVerificationRepo, ListParams},
    },
    models::{
        CreateDomainVerification, DomainVerification, DomainVerificationStatus,
        UpdateDomainVerification,
    },
};

pub struct SqliteDomainVerificationRepo {
    pool: SqlitePool,
}

impl SqliteDomainVerificationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Parse a DomainVerification from a database row.
    fn parse_verification(row: &sqlx::sqlite::SqliteRow) -> DbResult<DomainVerification> {
        let status_str: String = row.get("status");
        let status = status_str
            .parse::<DomainVerificationStatus>()
            .unwrap_or_default();

        Ok(DomainVerification {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            org_sso_config_id: parse_uuid(&row.get::<String, _>("org_sso_config_id"))?,
            domain: row.get("domain"),
            verification_token: row.get("verification_token"),
            status,
            dns_txt_record: row.get("dns_txt_record"),
            verification_attempts: row.get("verification_attempts"),
            last_attempt_at: row.get("last_attempt_at"),
            verified_at: row.get("verified_at"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl DomainVerificationRepo for SqliteDomainVerificationRepo {
    async fn create(
        &self,
        org_sso_config_id: Uuid,
        input: CreateDomainVerification,
        verification_token: &str,
    ) -> DbResult<DomainVerification> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO domain_verifications (
                id, org_sso_config_id, domain, verification_token, status,
                verification_attempts, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 'pending', 0, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(org_sso_config_id.to_string())
        .bind(&input.domain)
        .bind(verification_token)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!(
                    "Domain '{}' already exists for this SSO configuration",
                    input.domain
                ))
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => DbError::NotFound,
            _ => DbError::from(e),
        })?;

        Ok(DomainVerification {
            id,
            org_sso_config_id,
            domain: input.domain,
            verification_token: verification_token.to_string(),
            status: DomainVerificationStatus::Pending,
            dns_txt_record: None,
            verification_attempts: 0,
            last_attempt_at: None,
            verified_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<DomainVerification>> {
        let result = sqlx::query(
            r#"
            SELECT id, org_sso_config_id, domain, verification_token, status,
                   dns_txt_record, verification_attempts, last_attempt_at, verified_at,
                   expires_at, created_at, updated_at
            FROM domain_verifications
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_verification(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_by_config_and_domain(
        &self,
        org_sso_config_id: Uuid,
        domain: &str,
    ) -> DbResult<Option<DomainVerification>> {
        let result = sqlx::query(
            r#"
            SELECT id, org_sso_config_id, domain, verification_token, status,
                   dns_txt_record, verification_attempts, last_attempt_at, verified_at,
                   expires_at, created_at, updated_at
            FROM domain_verifications
            WHERE org_sso_config_id = ? AND domain = ?
            "#,
        )
        .bind(org_sso_config_id.to_string())
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_verification(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_config(
        &self,
        org_sso_config_id: Uuid,
        params: ListParams,
    ) -> DbResult<Vec<DomainVerification>> {
        let limit = params.limit.unwrap_or(100);

        let rows = sqlx::query(
            r#"
            SELECT id, org_sso_config_id, domain, verification_token, status,
                   dns_txt_record, verification_attempts, last_attempt_at, verified_at,
                   expires_at, created_at, updated_at
            FROM domain_verifications
            WHERE org_sso_config_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(org_sso_config_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_verification)
            .collect::<DbResult<Vec<_>>>()
    }

    async fn count_by_config(&self, org_sso_config_id: Uuid) -> DbResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM domain_verifications WHERE org_sso_config_id = ?",
        )
        .bind(org_sso_config_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }

    async fn update(
        &self,
        id: Uuid,
        input: UpdateDomainVerification,
    ) -> DbResult<DomainVerification> {
        let now = chrono::Utc::now();

        // Fetch existing record
        let existing = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;

        sqlx::query(
            r#"
            UPDATE domain_verifications SET
                status = ?,
                dns_txt_record = ?,
                verification_attempts = ?,
                last_attempt_at = ?,
                verified_at = ?,
                expires_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input.status.unwrap_or(existing.status).to_string())
        .bind(input.dns_txt_record.unwrap_or(existing.dns_txt_record))
        .bind(
            input
                .verification_attempts
                .unwrap_or(existing.verification_attempts),
        )
        .bind(input.last_attempt_at.unwrap_or(existing.last_attempt_at))
        .bind(input.verified_at.unwrap_or(existing.verified_at))
        .bind(input.expires_at.unwrap_or(existing.expires_at))
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM domain_verifications WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn find_verified_by_domain(&self, domain: &str) -> DbResult<Option<DomainVerification>> {
        let result = sqlx::query(
            r#"
            SELECT dv.id, dv.org_sso_config_id, dv.domain, dv.verification_token, dv.status,
                   dv.dns_txt_record, dv.verification_attempts, dv.last_attempt_at, dv.verified_at,
                   dv.expires_at, dv.created_at, dv.updated_at
            FROM domain_verifications dv
            JOIN org_sso_configs osc ON dv.org_sso_config_id = osc.id
            WHERE dv.domain = ?
              AND dv.status = 'verified'
              AND osc.enabled = 1
              AND (dv.expires_at IS NULL OR dv.expires_at > datetime('now'))
            LIMIT 1
            "#,
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_verification(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_verified_by_config(
        &self,
        org_sso_config_id: Uuid,
    ) -> DbResult<Vec<DomainVerification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_sso_config_id, domain, verification_token, status,
                   dns_txt_record, verification_attempts, last_attempt_at, verified_at,
                   expires_at, created_at, updated_at
            FROM domain_verifications
            WHERE org_sso_config_id = ?
              AND status = 'verified'
              AND (expires_at IS NULL OR expires_at > datetime('now'))
            ORDER BY domain ASC
            "#,
        )
        .bind(org_sso_config_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_verification)
            .collect::<DbResult<Vec<_>>>()
    }

    async fn has_verified_domain(&self, org_sso_config_id: Uuid) -> DbResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM domain_verifications
                WHERE org_sso_config_id = ?
                  AND status = 'verified'
                  AND (expires_at IS NULL OR expires_at > datetime('now'))
            ) as has_verified
            "#,
        )
        .bind(org_sso_config_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        // SQLite returns 0 or 1 for EXISTS
        Ok(row.get::<i32, _>("has_verified") != 0)
    }

    async fn create_auto_verified(
        &self,
        org_sso_config_id: Uuid,
        input: CreateDomainVerification,
        verification_token: &str,
    ) -> DbResult<DomainVerification> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO domain_verifications (
                id, org_sso_config_id, domain, verification_token, status,
                dns_txt_record, verification_attempts, verified_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 'verified', 'AUTO_VERIFIED_BY_BOOTSTRAP', 0, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(org_sso_config_id.to_string())
        .bind(&input.domain)
        .bind(verification_token)
        .bind(now) // verified_at
        .bind(now) // created_at
        .bind(now) // updated_at
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!(
                    "Domain '{}' already exists for this SSO configuration",
                    input.domain
                ))
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => DbError::NotFound,
            _ => DbError::from(e),
        })?;

        Ok(DomainVerification {
            id,
            org_sso_config_id,
            domain: input.domain,
            verification_token: verification_token.to_string(),
            status: DomainVerificationStatus::Verified,
            dns_txt_record: Some("AUTO_VERIFIED_BY_BOOTSTRAP".to_string()),
            verification_attempts: 0,
            last_attempt_at: None,
            verified_at: Some(now),
            expires_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}
