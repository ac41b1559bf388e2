use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{
            Cursor, CursorDirection, ListParams, ListResult, PageCursors, SsoGroupMappingRepo,
            cursor_from_row,
        },
    },
    models::{CreateSsoGroupMapping, SsoGroupMapping, UpdateSsoGroupMapping},
};

pub struct SqliteSsoGroupMappingRepo {
    pool: SqlitePool,
}

impl SqliteSsoGroupMappingRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Parse an SsoGroupMapping from a database row.
    fn parse_mapping(row: &sqlx::sqlite::SqliteRow) -> DbResult<SsoGroupMapping> {
        let team_id: Option<String> = row.get("team_id");
        let team_id = team_id.map(|s| parse_uuid(&s)).transpose()?;

        Ok(SsoGroupMapping {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            sso_connection_name: row.get("sso_connection_name"),
            idp_group: row.get("idp_group"),
            org_id: parse_uuid(&row.get::<String, _>("org_id"))?,
            team_id,
            role: row.get("role"),
            priority: row.get("priority"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Helper method for cursor-based pagination.
    async fn list_with_cursor(
        &self,
        org_id: Uuid,
        sso_connection_name: Option<&str>,
        params: &ListParams,
        cursor: &Cursor,
        fetch_limit: i64,
        limit: i64,
    ) -> DbResult<ListResult<SsoGroupMapping>> {
        let (comparison, order, should_reverse) =
            params.sort_order.cursor_query_params(params.direction);

        let connection_filter = if sso_connection_name.is_some() {
            "AND sso_connection_name = ?"
        } else {
            ""
        };

        let query = format!(
            r#"
            SELECT id, sso_connection_name, idp_group, org_id, team_id, role, priority, created_at, updated_at
            FROM sso_group_mappings
            WHERE org_id = ? AND (created_at, id) {} (?, ?)
            {}
            ORDER BY created_at {}, id {}
            LIMIT ?
            "#,
            comparison, connection_filter, order, order
        );

        let mut query_builder = sqlx::query(&query)
            .bind(org_id.to_string())
            .bind(cursor.created_at)
            .bind(cursor.id.to_string());

        if let Some(name) = sso_connection_name {
            query_builder = query_builder.bind(name);
        }

        let rows = query_builder
            .bind(fetch_limit)
            .fetch_all(&self.pool)
            .await?;

        let has_more = rows.len() as i64 > limit;
        let mut items: Vec<SsoGroupMapping> = rows
            .iter()
            .take(limit as usize)
            .map(Self::parse_mapping)
            .collect::<DbResult<Vec<_>>>()?;

        if should_reverse {
            items.reverse();
        }

        let cursors =
            PageCursors::from_items(&items, has_more, params.direction, Some(cursor), |m| {
                cursor_from_row(m.created_at, m.id)
            });

        Ok(ListResult::new(items, has_more, cursors))
    }
}

#[async_trait]
impl SsoGroupMappingRepo for SqliteSsoGroupMappingRepo {
    async fn create(
        &self,
        org_id: Uuid,
        input: CreateSsoGroupMapping,
    ) -> DbResult<SsoGroupMapping> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sso_group_mappings (id, sso_connection_name, idp_group, org_id, team_id, role, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.sso_connection_name)
        .bind(&input.idp_group)
        .bind(org_id.to_string())
        .bind(input.team_id.map(|id| id.to_string()))
        .bind(&input.role)
        .bind(input.priority)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!(
                    "Mapping for IdP group '{}' already exists for this connection/org/team combination",
                    input.idp_group
                ))
            }
            _ => DbError::from(e),
        })?;

        Ok(SsoGroupMapping {
            id,
            sso_connection_name: input.sso_connection_name,
            idp_group: input.idp_group,
            org_id,
            team_id: input.team_id,
            role: input.role,
            priority: input.priority,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<SsoGroupMapping>> {
        let result = sqlx::query(
            r#"
            SELECT id, sso_connection_name, idp_group, org_id, team_id, role, priority, created_at, updated_at
            FROM sso_group_mappings
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::parse_mapping(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_org(
        &self,
        org_id: Uuid,
        params: ListParams,
    ) -> DbResult<ListResult<SsoGroupMapping>> {
        let limit = params.limit.unwrap_or(100);
        let fetch_limit = limit + 1;

        if let Some(ref cursor) = params.cursor {
            return self
                .list_with_cursor(org_id, None, &params, cursor, fetch_limit, limit)
                .await;
        }

        let rows = sqlx::query(
            r#"
            SELECT id, sso_connection_name, idp_group, org_id, team_id, role, priority, created_at, updated_at
            FROM sso_group_mappings
            WHERE org_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(org_id.to_string())
        .bind(fetch_limit)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as i64 > limit;
        let items: Vec<SsoGroupMapping> = rows
            .iter()
            .take(limit as usize)
            .map(Self::parse_mapping)
            .collect::<DbResult<Vec<_>>>()?;

        let cursors =
            PageCursors::from_items(&items, has_more, CursorDirection::Forward, None, |m| {
                cursor_from_row(m.created_at, m.id)
            });

        Ok(ListResult::new(items, has_more, cursors))
    }

    async fn list_by_connection(
        &self,
        sso_connection_name: &str,
        org_id: Uuid,
        params: ListParams,
    ) -> DbResult<ListResult<SsoGroupMapping>> {
        let limit = params.limit.unwrap_or(100);
        let fetch_limit = limit + 1;

        if let Some(ref cursor) = params.cursor {
            return self
                .list_with_cursor(
                    org_id,
                    Some(sso_connection_name),
                    &params,
                    cursor,
                    fetch_limit,
                    limit,
                )
                .await;
        }

        let rows = sqlx::query(
            r#"
            SELECT id, sso_connection_name, idp_group, org_id, team_id, role, priority, created_at, updated_at
            FROM sso_group_mappings
            WHERE sso_connection_name = ? AND org_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(sso_connection_name)
        .bind(org_id.to_string())
        .bind(fetch_limit)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as i64 > limit;
        let items: Vec<SsoGroupMapping> = rows
            .iter()
            .take(limit as usize)
            .map(Self::parse_mapping)
            .collect::<DbResult<Vec<_>>>()?;

        let cursors =
            PageCursors::from_items(&items, has_more, CursorDirection::Forward, None, |m| {
                cursor_from_row(m.created_at, m.id)
            });

        Ok(ListResult::new(items, has_more, cursors))
    }

    async fn find_mappings_for_groups(
        &self,
        sso_connection_name: &str,
        org_id: Uuid,
        idp_groups: &[String],
    ) -> DbResult<Vec<SsoGroupMapping>> {
        if idp_groups.is_empty() {
            return Ok(Vec::new());
        }

        // Build placeholders for IN clause
        let placeholders: Vec<&str> = idp_groups.iter().map(|_| "?").collect();
        let in_clause = placeholders.join(", ");

        let query = format!(
            r#"
            SELECT id, sso_connection_name, idp_group, org_id, team_id, role, priority, created_at, updated_at
            FROM sso_group_mappings
            WHERE sso_connection_name = ? AND org_id = ? AND idp_group IN ({})
            ORDER BY priority DESC, idp_group, created_at
            "#,
            in_clause
        );

        let mut query_builder = sqlx::query(&query)
            .bind(sso_connection_name)
            .bind(org_id.to_string());

        for group in idp_groups {
            query_builder = query_builder.bind(group);
        }

        let rows = query_builder.fetch_all(&self.pool).await?;

        rows.iter().map(Self::parse_mapping).collect()
    }

    async fn count_by_org(&self, org_id: Uuid) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM sso_group_mappings WHERE org_id = ?")
            .bind(org_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("count"))
    }

    async fn update(&self, id: Uuid, input: UpdateSsoGroupMapping) -> DbResult<SsoGroupMapping> {
        let has_idp_group = input.idp_group.is_some();
        let has_team_id = input.team_id.is_some();
        let has_role = input.role.is_some();
        let has_priority = input.priority.is_some();

        if !has_idp_group && !has_team_id && !has_role && !has_priority {
            return self.get_by_id(id).await?.ok_or(DbError::NotFound);
        }

        let now = chrono::Utc::now();

        let mut set_clauses = vec!["updated_at = ?"];
        if has_idp_group {
            set_clauses.push("idp_group = ?");
        }
        if has_team_id {
            set_clauses.push("team_id = ?");
        }
        if has_role {
            set_clauses.push("role = ?");
        }
        if has_priority {
            set_clauses.push("priority = ?");
        }

        let query = format!(
            "UPDATE sso_group_mappings SET {} WHERE id = ?",
            set_clauses.join(", ")
        );

        let mut query_builder = sqlx::query(&query).bind(now);

        if let Some(ref idp_group) = input.idp_group {
            query_builder = query_builder.bind(idp_group);
        }
        if let Some(ref team_id_opt) = input.team_id {
            query_builder = query_builder.bind(team_id_opt.map(|id| id.to_string()));
        }
        if let Some(ref role_opt) = input.role {
            query_builder = query_builder.bind(role_opt.as_ref());
        }
        if let Some(priority) = input.priority {
            query_builder = query_builder.bind(priority);
        }

        let result = query_builder
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    DbError::Conflict("Mapping with this combination already exists".into())
                }
                _ => DbError::from(e),
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM sso_group_mappings WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn delete_by_idp_group(
        &self,
        sso_connection_name: &str,
        org_id: Uuid,
        idp_group: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM sso_group_mappings WHERE sso_connection_name = ? AND org_id = ? AND idp_group = ?",
        )
        .bind(sso_connection_name)
        .bind(org_id.to_string())
        .bind(idp_group)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
