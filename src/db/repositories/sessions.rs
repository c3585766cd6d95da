use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, parse_optional_datetime, parse_state, to_i64, to_u64},
    },
    session::{Session, SessionState},
};

const SESSION_COLUMNS: &str =
    "id, status, total_duration_secs, remaining_secs, foreground_app_id, started_at, updated_at";

fn row_to_session(row: &Row) -> Result<Session> {
    let status: String = row.get("status")?;
    let total: i64 = row.get("total_duration_secs")?;
    let remaining: i64 = row.get("remaining_secs")?;
    let started_at: Option<String> = row.get("started_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Session {
        id: Some(row.get("id")?),
        state: parse_state(&status)?,
        total_duration_secs: to_u64(total, "total_duration_secs")?,
        remaining_secs: to_u64(remaining, "remaining_secs")?,
        active_foreground_app_id: row.get("foreground_app_id")?,
        started_at: parse_optional_datetime(started_at, "started_at")?,
        updated_at: Some(parse_datetime(&updated_at, "updated_at")?),
    })
}

pub struct SessionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SessionRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Inserts or overwrites the full checkpoint of a session.
    pub fn save(&self, session: &Session) -> Result<()> {
        let id = session
            .id
            .as_deref()
            .ok_or_else(|| anyhow!("cannot checkpoint a session without an id"))?;
        let updated_at = session.updated_at.unwrap_or_else(Utc::now);

        self.conn.execute(
            "INSERT INTO sessions (id, status, total_duration_secs, remaining_secs, foreground_app_id, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 total_duration_secs = excluded.total_duration_secs,
                 remaining_secs = excluded.remaining_secs,
                 foreground_app_id = excluded.foreground_app_id,
                 updated_at = excluded.updated_at",
            params![
                id,
                session.state.as_str(),
                to_i64(session.total_duration_secs)?,
                to_i64(session.remaining_secs)?,
                session.active_foreground_app_id,
                session.started_at.map(|dt| dt.to_rfc3339()),
                updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_progress(
        &self,
        session_id: &str,
        remaining_secs: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sessions
             SET remaining_secs = ?1,
                 updated_at = ?2
             WHERE id = ?3",
            params![to_i64(remaining_secs)?, updated_at.to_rfc3339(), session_id],
        )?;
        Ok(())
    }

    /// Changes only the status, keeping how far the mission got.
    pub fn mark_status(
        &self,
        session_id: &str,
        status: SessionState,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sessions
             SET status = ?1,
                 updated_at = ?2
             WHERE id = ?3",
            params![status.as_str(), updated_at.to_rfc3339(), session_id],
        )?;
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let session = stmt
            .query_row(params![session_id], |row| Ok(row_to_session(row)))
            .optional()?
            .transpose()?;
        Ok(session)
    }

    /// Most recent session that was running or paused when the process stopped.
    pub fn latest_incomplete(&self) -> Result<Option<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE status IN ('Running', 'Paused')
             ORDER BY updated_at DESC
             LIMIT 1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_session(row)?)),
            None => Ok(None),
        }
    }

    /// Every other unfinished session is closed out as reset.
    pub fn close_stale(&self, keep_id: &str, updated_at: DateTime<Utc>) -> Result<usize> {
        let closed = self.conn.execute(
            "UPDATE sessions
             SET status = 'Idle',
                 updated_at = ?1
             WHERE status IN ('Running', 'Paused') AND id != ?2",
            params![updated_at.to_rfc3339(), keep_id],
        )?;
        Ok(closed)
    }

    pub fn list(&self, limit: usize) -> Result<Vec<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             ORDER BY COALESCE(started_at, updated_at) DESC
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(row_to_session(row)?);
        }
        Ok(sessions)
    }
}

impl Database {
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| SessionRepository::new(conn).get(&session_id))
            .await
    }

    /// Finds the session to resume after a restart and closes out any older leftovers.
    pub async fn recover_incomplete_session(&self) -> Result<Option<Session>> {
        self.execute(|conn| {
            let repo = SessionRepository::new(conn);
            let Some(session) = repo.latest_incomplete()? else {
                return Ok(None);
            };
            if let Some(id) = session.id.as_deref() {
                let closed = repo.close_stale(id, Utc::now())?;
                if closed > 0 {
                    log::warn!("Closed {closed} stale unfinished sessions");
                }
            }
            Ok(Some(session))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    fn running(id: &str, remaining: u64) -> Session {
        let now = Utc::now();
        let mut session = Session::new(100);
        session.id = Some(id.to_string());
        session.state = SessionState::Running;
        session.remaining_secs = remaining;
        session.started_at = Some(now);
        session.updated_at = Some(now);
        session
    }

    #[test]
    fn save_then_get_round_trips() {
        let conn = conn();
        let repo = SessionRepository::new(&conn);
        let session = running("s1", 80);
        repo.save(&session).unwrap();
        let loaded = repo.get("s1").unwrap().unwrap();
        assert_eq!(loaded.state, SessionState::Running);
        assert_eq!(loaded.remaining_secs, 80);
        assert!(repo.get("missing").unwrap().is_none());
    }

    #[test]
    fn session_without_id_is_rejected() {
        let conn = conn();
        assert!(SessionRepository::new(&conn).save(&Session::new(10)).is_err());
    }

    #[test]
    fn mark_status_keeps_progress() {
        let conn = conn();
        let repo = SessionRepository::new(&conn);
        repo.save(&running("s1", 80)).unwrap();
        repo.update_progress("s1", 30, Utc::now()).unwrap();
        repo.mark_status("s1", SessionState::Idle, Utc::now()).unwrap();
        let loaded = repo.get("s1").unwrap().unwrap();
        assert_eq!(loaded.state, SessionState::Idle);
        assert_eq!(loaded.remaining_secs, 30);
        assert!(repo.latest_incomplete().unwrap().is_none());
    }

    #[test]
    fn stale_sessions_are_closed_except_latest() {
        let conn = conn();
        let repo = SessionRepository::new(&conn);
        let mut old = running("old", 50);
        old.updated_at = Some(Utc::now() - chrono::Duration::hours(2));
        repo.save(&old).unwrap();
        repo.save(&running("new", 20)).unwrap();

        let latest = repo.latest_incomplete().unwrap().unwrap();
        assert_eq!(latest.id.as_deref(), Some("new"));
        assert_eq!(repo.close_stale("new", Utc::now()).unwrap(), 1);
        assert_eq!(
            repo.get("old").unwrap().unwrap().state,
            SessionState::Idle
        );
    }
}
