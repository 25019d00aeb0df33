use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::content::{
    Content, ContentScope, ContentStore, ContentType, CultureSelection, Publication,
    PublishResult, check_publishable,
};
use crate::error::{StoreError, StoreResult};

// Helper struct to map a content row joined with its type
#[derive(FromRow)]
struct ContentRow {
    name: String,
    content_type_alias: String,
    type_name: String,
    varies_by_culture: bool,
    trashed: bool,
}

#[derive(FromRow)]
struct PublicationRow {
    culture: String,
    published_values: String,
    published_by: i32,
    published_at: String,
}

impl PublicationRow {
    fn into_publication(self, content_key: Uuid) -> StoreResult<Publication> {
        let values: BTreeMap<String, String> = serde_json::from_str(&self.published_values)?;
        let published_at = DateTime::parse_from_rfc3339(&self.published_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt(format!("published_at: {}", e)))?;

        Ok(Publication {
            content_key,
            culture: self.culture,
            values,
            published_by: self.published_by,
            published_at,
        })
    }
}

/// Load a record with its type, cultures and values through `conn`.
async fn load_content(conn: &mut SqliteConnection, key: Uuid) -> StoreResult<Option<Content>> {
    let id = key.to_string();
    let row = sqlx::query_as::<_, ContentRow>(
        r#"
        SELECT
            c.name, c.content_type_alias, t.name AS type_name,
            t.varies_by_culture, c.trashed
        FROM content c
        JOIN content_types t ON t.alias = c.content_type_alias
        WHERE c.id = ?
        "#,
    )
    .bind(&id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let property_aliases: Vec<(String,)> =
        sqlx::query_as("SELECT alias FROM content_type_properties WHERE content_type_alias = ?")
            .bind(&row.content_type_alias)
            .fetch_all(&mut *conn)
            .await?;

    let cultures: Vec<(String,)> =
        sqlx::query_as("SELECT culture FROM content_cultures WHERE content_id = ?")
            .bind(&id)
            .fetch_all(&mut *conn)
            .await?;

    let values: Vec<(String, String)> =
        sqlx::query_as("SELECT alias, value FROM content_properties WHERE content_id = ?")
            .bind(&id)
            .fetch_all(&mut *conn)
            .await?;

    let content_type = ContentType {
        alias: row.content_type_alias,
        name: row.type_name,
        varies_by_culture: row.varies_by_culture,
        property_aliases: property_aliases.into_iter().map(|(a,)| a).collect(),
    };

    let mut content = Content::new(key, row.name, content_type)
        .with_cultures(cultures.into_iter().map(|(c,)| c));
    content.trashed = row.trashed;
    for (alias, value) in values {
        content.restore_value(alias, value);
    }

    Ok(Some(content))
}

/// Persistent content storage using SQLite
#[derive(Clone)]
pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a content type and its property aliases if they are missing
    pub async fn ensure_content_type(&self, content_type: &ContentType) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO content_types (alias, name, varies_by_culture)
            VALUES (?, ?, ?)
            ON CONFLICT(alias) DO NOTHING
            "#,
        )
        .bind(&content_type.alias)
        .bind(&content_type.name)
        .bind(content_type.varies_by_culture)
        .execute(&mut *tx)
        .await?;

        for alias in &content_type.property_aliases {
            sqlx::query(
                r#"
                INSERT INTO content_type_properties (content_type_alias, alias)
                VALUES (?, ?)
                ON CONFLICT(content_type_alias, alias) DO NOTHING
                "#,
            )
            .bind(&content_type.alias)
            .bind(alias)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Insert a record if no record with its key exists.
    /// Returns false when the record was already present.
    pub async fn ensure_content(&self, content: &Content) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let type_exists: Option<(String,)> =
            sqlx::query_as("SELECT alias FROM content_types WHERE alias = ?")
                .bind(&content.content_type.alias)
                .fetch_optional(&mut *tx)
                .await?;
        if type_exists.is_none() {
            return Err(StoreError::UnknownContentType(
                content.content_type.alias.clone(),
            ));
        }

        let id = content.key.to_string();
        let now = Utc::now().to_rfc3339();
        let inserted = sqlx::query(
            r#"
            INSERT INTO content (id, name, content_type_alias, trashed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&content.name)
        .bind(&content.content_type.alias)
        .bind(content.trashed)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            debug!("Content {} already exists, leaving it untouched", content.key);
            return Ok(false);
        }

        for culture in content.available_cultures() {
            sqlx::query("INSERT INTO content_cultures (content_id, culture) VALUES (?, ?)")
                .bind(&id)
                .bind(culture)
                .execute(&mut *tx)
                .await?;
        }

        for (alias, value) in content.properties() {
            sqlx::query(
                "INSERT INTO content_properties (content_id, alias, value, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(alias)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Created content '{}' ({})", content.name, content.key);
        Ok(true)
    }

    /// Move a record to or out of the recycle bin
    pub async fn set_trashed(&self, key: Uuid, trashed: bool) -> StoreResult<()> {
        let affected = sqlx::query("UPDATE content SET trashed = ?, updated_at = ? WHERE id = ?")
            .bind(trashed)
            .bind(Utc::now().to_rfc3339())
            .bind(key.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(StoreError::MissingContent(key));
        }
        Ok(())
    }

    /// Get the live snapshot of a record for one culture (`""` when invariant)
    pub async fn publication(&self, key: Uuid, culture: &str) -> StoreResult<Option<Publication>> {
        let row = sqlx::query_as::<_, PublicationRow>(
            r#"
            SELECT culture, published_values, published_by, published_at
            FROM content_publications
            WHERE content_id = ? AND culture = ?
            "#,
        )
        .bind(key.to_string())
        .bind(culture)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_publication(key)).transpose()
    }

    /// Count publication rows for a record
    pub async fn publication_count(&self, key: Uuid) -> StoreResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM content_publications WHERE content_id = ?")
                .bind(key.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }
}

impl ContentStore for SqliteContentStore {
    type Scope = SqliteScope;

    async fn get_by_id(&self, key: Uuid) -> StoreResult<Option<Content>> {
        let mut conn = self.pool.acquire().await?;
        load_content(&mut conn, key).await
    }

    async fn create_scope(&self) -> StoreResult<SqliteScope> {
        Ok(SqliteScope {
            tx: self.pool.begin().await?,
        })
    }
}

/// One database transaction; rolled back when dropped without `complete`
pub struct SqliteScope {
    tx: Transaction<'static, Sqlite>,
}

impl ContentScope for SqliteScope {
    async fn save(&mut self, content: &Content) -> StoreResult<()> {
        let id = content.key.to_string();
        let now = Utc::now().to_rfc3339();

        let affected = sqlx::query("UPDATE content SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&content.name)
            .bind(&now)
            .bind(&id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::MissingContent(content.key));
        }

        for (alias, value) in content.properties() {
            sqlx::query(
                r#"
                INSERT INTO content_properties (content_id, alias, value, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(content_id, alias)
                DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(&id)
            .bind(alias)
            .bind(value)
            .bind(&now)
            .execute(&mut *self.tx)
            .await?;
        }

        debug!("Saved content {}", content.key);
        Ok(())
    }

    async fn publish(
        &mut self,
        content: &Content,
        cultures: &CultureSelection,
        user_id: i32,
    ) -> StoreResult<PublishResult> {
        // Rules are checked against what this transaction sees, including its own saves.
        let current = load_content(&mut self.tx, content.key)
            .await?
            .ok_or(StoreError::MissingContent(content.key))?;

        if let Some(status) = check_publishable(&current, cultures) {
            return Ok(PublishResult::failed(status));
        }

        let id = current.key.to_string();
        let snapshot = serde_json::to_string(current.properties())?;
        let now = Utc::now().to_rfc3339();
        let targets = cultures.targets();

        for culture in &targets {
            sqlx::query(
                r#"
                INSERT INTO content_publications
                    (content_id, culture, published_values, published_by, published_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(content_id, culture)
                DO UPDATE SET
                    published_values = excluded.published_values,
                    published_by = excluded.published_by,
                    published_at = excluded.published_at
                "#,
            )
            .bind(&id)
            .bind(culture)
            .bind(&snapshot)
            .bind(user_id)
            .bind(&now)
            .execute(&mut *self.tx)
            .await?;
        }

        debug!("Published content {} for {}", current.key, cultures);
        Ok(PublishResult::succeeded(targets))
    }

    async fn complete(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
