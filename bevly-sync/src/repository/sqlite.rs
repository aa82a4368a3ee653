//! SQLite repository
//!
//! Tables:
//! - `providers`: one row per venue
//! - `beverages`: one row per drink, unique by `display_name`; ratings and
//!   attributes are JSON text columns
//! - `provider_beverages`: the current menu of each provider, ordered by
//!   `position`
//!
//! Timestamps are RFC 3339 text. Read-modify-write operations run inside a
//! transaction and are additionally serialized within the process by a
//! write lock, so concurrent savers of the same display name cannot lose
//! updates.

use super::{merged_record, new_record, Repository};
use crate::policy::SyncPolicy;
use async_trait::async_trait;
use bevly_common::{Beverage, BeverageId, Error, MenuProvider, Rating, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

const BEVERAGE_COLUMNS: &str = "guid, display_name, name, description, bev_type, brewer, abv, \
     link, ratings, attributes, accuracy_score, sync_time, updated_at";

/// Initialize database connection pool
///
/// Creates the file and parent directory on first run.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS providers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            menu_format TEXT NOT NULL,
            seq INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS beverages (
            guid TEXT PRIMARY KEY,
            display_name TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            bev_type TEXT NOT NULL DEFAULT '',
            brewer TEXT NOT NULL DEFAULT '',
            abv REAL NOT NULL DEFAULT 0.0,
            link TEXT NOT NULL DEFAULT '',
            ratings TEXT NOT NULL DEFAULT '[]',
            attributes TEXT NOT NULL DEFAULT '{}',
            accuracy_score INTEGER NOT NULL DEFAULT 0,
            sync_time TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_beverages (
            provider_id TEXT NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            beverage_guid TEXT NOT NULL REFERENCES beverages(guid),
            PRIMARY KEY (provider_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_provider_beverages_guid ON provider_beverages(beverage_guid)",
    )
    .execute(pool)
    .await?;

    debug!("Database tables initialized (providers, beverages, provider_beverages)");
    Ok(())
}

pub struct SqliteRepository {
    pool: SqlitePool,
    policy: SyncPolicy,
    write_lock: Mutex<()>,
}

impl SqliteRepository {
    /// Wrap an initialized pool (see [`init_database_pool`])
    pub fn new(pool: SqlitePool, policy: SyncPolicy) -> Self {
        Self {
            pool,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn open(db_path: &Path, policy: SyncPolicy) -> Result<Self> {
        let pool = init_database_pool(db_path).await?;
        Ok(Self::new(pool, policy))
    }

    /// Private in-memory database
    pub async fn in_memory(policy: SyncPolicy) -> Result<Self> {
        // One long-lived connection: the database dies with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        init_tables(&pool).await?;
        Ok(Self::new(pool, policy))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn referenced_guids(&self) -> Result<HashSet<String>> {
        let guids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT beverage_guid FROM provider_beverages")
                .fetch_all(&self.pool)
                .await?;
        Ok(guids.into_iter().collect())
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn menu_providers(&self) -> Result<Vec<MenuProvider>> {
        let rows = sqlx::query("SELECT id, name, url, menu_format FROM providers ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(provider_from_row).collect()
    }

    async fn provider_by_id(&self, id: &str) -> Result<Option<MenuProvider>> {
        let row = sqlx::query("SELECT id, name, url, menu_format FROM providers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(provider_from_row).transpose()
    }

    async fn register_provider(&self, provider: &MenuProvider) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        upsert_provider(&mut *conn, provider).await
    }

    async fn provider_beverages(&self, provider: &MenuProvider) -> Result<Vec<Beverage>> {
        let sql = format!(
            "SELECT {} FROM beverages b \
             JOIN provider_beverages pb ON pb.beverage_guid = b.guid \
             WHERE pb.provider_id = ? ORDER BY pb.position",
            prefixed_columns("b")
        );
        let rows = sqlx::query(&sql)
            .bind(&provider.id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(beverage_from_row).collect()
    }

    async fn set_beverage_menu(
        &self,
        provider: &MenuProvider,
        beverages: &[Beverage],
    ) -> Result<()> {
        let now = self.policy.now();
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut guids = Vec::with_capacity(beverages.len());
        for beverage in beverages {
            guids.push(save_in(&mut *tx, beverage, now).await?);
        }

        upsert_provider(&mut *tx, provider).await?;

        sqlx::query("DELETE FROM provider_beverages WHERE provider_id = ?")
            .bind(&provider.id)
            .execute(&mut *tx)
            .await?;
        for (position, guid) in guids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO provider_beverages (provider_id, position, beverage_guid) VALUES (?, ?, ?)",
            )
            .bind(&provider.id)
            .bind(position as i64)
            .bind(guid.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(provider = %provider.id, count = guids.len(), "Replaced menu");
        Ok(())
    }

    async fn beverages_needing_sync(&self) -> Result<Vec<Beverage>> {
        let sql = format!(
            "SELECT {} FROM beverages b \
             WHERE b.guid IN (SELECT beverage_guid FROM provider_beverages) \
             ORDER BY b.display_name",
            prefixed_columns("b")
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut due = Vec::new();
        for row in &rows {
            let beverage = beverage_from_row(row)?;
            if self.policy.needs_sync(&beverage, true) {
                due.push(beverage);
            }
        }
        info!("Found {} beverages needing sync", due.len());
        Ok(due)
    }

    async fn save_beverage(&self, beverage: &Beverage) -> Result<BeverageId> {
        let now = self.policy.now();
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let id = save_in(&mut *tx, beverage, now).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn beverage_by_name(&self, display_name: &str) -> Result<Option<Beverage>> {
        let mut conn = self.pool.acquire().await?;
        find_by_name(&mut *conn, display_name).await
    }

    async fn garbage_collect(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let referenced = self.referenced_guids().await?;

        let sql = format!("SELECT {} FROM beverages", BEVERAGE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut doomed = Vec::new();
        for row in &rows {
            let beverage = beverage_from_row(row)?;
            let Some(id) = beverage.id else { continue };
            let guid = id.to_string();
            if self
                .policy
                .eligible_for_discard(&beverage, referenced.contains(&guid))
            {
                doomed.push(guid);
            }
        }

        let mut tx = self.pool.begin().await?;
        for guid in &doomed {
            sqlx::query("DELETE FROM beverages WHERE guid = ?")
                .bind(guid)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(
            "GarbageCollect(older:{}): removed {} beverages",
            self.policy.discard_threshold_time().to_rfc3339(),
            doomed.len()
        );
        Ok(doomed.len() as u64)
    }

    async fn purge(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM provider_beverages").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM providers").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM beverages").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Find-and-fuse or insert on an open connection or transaction
async fn save_in(
    conn: &mut SqliteConnection,
    beverage: &Beverage,
    now: DateTime<Utc>,
) -> Result<BeverageId> {
    match find_by_name(conn, &beverage.display_name).await? {
        Some(stored) => {
            let record = merged_record(stored, beverage, now);
            let id = record.id.ok_or_else(|| {
                Error::Internal(format!("stored beverage {} has no id", record.display_name))
            })?;
            debug!(beverage = %record.display_name, id = %id, "Updating beverage");
            write_beverage(conn, &record, false).await?;
            Ok(id)
        }
        None => {
            let record = new_record(beverage, now);
            let id = record.id.unwrap_or_default();
            debug!(beverage = %record.display_name, id = %id, "Inserting beverage");
            write_beverage(conn, &record, true).await?;
            Ok(id)
        }
    }
}

async fn write_beverage(conn: &mut SqliteConnection, record: &Beverage, insert: bool) -> Result<()> {
    let guid = record.id.unwrap_or_default().to_string();
    let ratings = serde_json::to_string(&record.ratings)?;
    let attributes = serde_json::to_string(&record.attributes)?;
    let sync_time = record.sync_time.map(format_time);
    let updated_at = format_time(record.updated_at.unwrap_or_else(Utc::now));

    let sql = if insert {
        r#"
        INSERT INTO beverages (
            display_name, name, description, bev_type, brewer, abv, link,
            ratings, attributes, accuracy_score, sync_time, updated_at, guid
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    } else {
        r#"
        UPDATE beverages SET
            display_name = ?, name = ?, description = ?, bev_type = ?, brewer = ?,
            abv = ?, link = ?, ratings = ?, attributes = ?, accuracy_score = ?,
            sync_time = ?, updated_at = ?
        WHERE guid = ?
        "#
    };

    sqlx::query(sql)
        .bind(&record.display_name)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.bev_type)
        .bind(&record.brewer)
        .bind(record.abv)
        .bind(&record.link)
        .bind(&ratings)
        .bind(&attributes)
        .bind(i64::from(record.accuracy_score))
        .bind(&sync_time)
        .bind(&updated_at)
        .bind(&guid)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn find_by_name(conn: &mut SqliteConnection, display_name: &str) -> Result<Option<Beverage>> {
    let sql = format!("SELECT {} FROM beverages WHERE display_name = ?", BEVERAGE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(display_name)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(beverage_from_row).transpose()
}

async fn upsert_provider(conn: &mut SqliteConnection, provider: &MenuProvider) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO providers (id, name, url, menu_format, seq)
        VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM providers))
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            url = excluded.url,
            menu_format = excluded.menu_format
        "#,
    )
    .bind(&provider.id)
    .bind(&provider.name)
    .bind(&provider.url)
    .bind(&provider.menu_format)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn prefixed_columns(alias: &str) -> String {
    BEVERAGE_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Bad timestamp {:?}: {}", s, e)))
}

fn provider_from_row(row: &SqliteRow) -> Result<MenuProvider> {
    Ok(MenuProvider {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        menu_format: row.try_get("menu_format")?,
    })
}

fn beverage_from_row(row: &SqliteRow) -> Result<Beverage> {
    let guid: String = row.try_get("guid")?;
    let id: BeverageId = guid
        .parse()
        .map_err(|e| Error::Internal(format!("Bad beverage guid {:?}: {}", guid, e)))?;
    let ratings: Vec<Rating> = serde_json::from_str(&row.try_get::<String, _>("ratings")?)?;
    let attributes: BTreeMap<String, String> =
        serde_json::from_str(&row.try_get::<String, _>("attributes")?)?;
    let sync_time: Option<String> = row.try_get("sync_time")?;
    let updated_at: String = row.try_get("updated_at")?;
    let accuracy_score: i64 = row.try_get("accuracy_score")?;

    Ok(Beverage {
        id: Some(id),
        display_name: row.try_get("display_name")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        bev_type: row.try_get("bev_type")?,
        brewer: row.try_get("brewer")?,
        abv: row.try_get("abv")?,
        link: row.try_get("link")?,
        ratings,
        attributes,
        accuracy_score: accuracy_score as i32,
        sync_time: sync_time.as_deref().map(parse_time).transpose()?,
        updated_at: Some(parse_time(&updated_at)?),
        need_sync: false,
    })
}
