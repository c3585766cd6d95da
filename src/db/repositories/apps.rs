use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::{
    catalog::{defaults::default_catalog, BlockableApp},
    db::{
        connection::Database,
        helpers::{parse_category, to_u32},
    },
};

fn row_to_app(row: &Row) -> Result<BlockableApp> {
    let category: String = row.get("category")?;
    let attempt_count: i64 = row.get("attempt_count")?;

    Ok(BlockableApp {
        id: row.get("id")?,
        display_name: row.get("display_name")?,
        category: parse_category(&category)?,
        is_blocked: row.get("is_blocked")?,
        attempt_count: to_u32(attempt_count, "attempt_count")?,
    })
}

pub struct AppRepository<'a> {
    conn: &'a Connection,
}

impl<'a> AppRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Catalog in display order.
    pub fn load_all(&self) -> Result<Vec<BlockableApp>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, category, is_blocked, attempt_count
             FROM apps
             ORDER BY position ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut apps = Vec::new();
        while let Some(row) = rows.next()? {
            apps.push(row_to_app(row)?);
        }
        Ok(apps)
    }

    /// Inserts entries that are not stored yet; existing rows keep the user's choices.
    pub fn seed(&self, apps: &[BlockableApp]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let base: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(position) + 1, 0) FROM apps", [], |row| {
                row.get(0)
            })?;

        for (offset, app) in apps.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO apps (id, display_name, category, is_blocked, attempt_count, position, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    app.id,
                    app.display_name,
                    app.category.as_str(),
                    app.is_blocked,
                    i64::from(app.attempt_count),
                    base + offset as i64,
                    now,
                ],
            )?;
        }
        Ok(())
    }

    pub fn set_blocked(&self, app_id: &str, blocked: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE apps SET is_blocked = ?1, updated_at = ?2 WHERE id = ?3",
            params![blocked, Utc::now().to_rfc3339(), app_id],
        )?;
        Ok(())
    }

    pub fn set_all_blocked(&self, blocked: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE apps SET is_blocked = ?1, updated_at = ?2",
            params![blocked, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_attempt_count(&self, app_id: &str, count: u32) -> Result<()> {
        self.conn.execute(
            "UPDATE apps SET attempt_count = ?1, updated_at = ?2 WHERE id = ?3",
            params![i64::from(count), Utc::now().to_rfc3339(), app_id],
        )?;
        Ok(())
    }

    pub fn reset_attempt_counts(&self) -> Result<()> {
        self.conn.execute(
            "UPDATE apps SET attempt_count = 0, updated_at = ?1",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl Database {
    /// Loads the stored catalog, seeding the starter catalog into an empty database.
    pub async fn load_catalog(&self) -> Result<Vec<BlockableApp>> {
        self.execute(|conn| {
            let repo = AppRepository::new(conn);
            let apps = repo.load_all()?;
            if !apps.is_empty() {
                return Ok(apps);
            }
            log::info!("Seeding default app catalog");
            repo.seed(&default_catalog())?;
            repo.load_all()
        })
        .await
    }

    pub async fn get_apps(&self) -> Result<Vec<BlockableApp>> {
        self.execute(|conn| AppRepository::new(conn).load_all())
            .await
    }
}
