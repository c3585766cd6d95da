use anyhow::Result;
use rusqlite::{params, Connection};

use crate::db::{
    connection::Database,
    helpers::to_u32,
    models::{AttemptRecord, SessionReport, TopAttemptedApp},
    repositories::sessions::SessionRepository,
};

pub struct AttemptRepository<'a> {
    conn: &'a Connection,
}

impl<'a> AttemptRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, attempt: &AttemptRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO attempts (session_id, app_id, package, occurred_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                attempt.session_id,
                attempt.app_id,
                attempt.package,
                attempt.occurred_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count_for_session(&self, session_id: &str) -> Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attempts WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        to_u32(count, "attempt count")
    }

    /// Catalog entries with the most attempts in a session, busiest first.
    pub fn top_apps(&self, session_id: &str, limit: usize) -> Result<Vec<TopAttemptedApp>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.app_id, apps.display_name, COUNT(*) AS attempts
             FROM attempts a
             LEFT JOIN apps ON apps.id = a.app_id
             WHERE a.session_id = ?1
             GROUP BY a.app_id
             ORDER BY attempts DESC, a.app_id ASC
             LIMIT ?2",
        )?;

        let mut rows = stmt.query(params![session_id, limit as i64])?;
        let mut apps = Vec::new();
        while let Some(row) = rows.next()? {
            let attempts: i64 = row.get(2)?;
            apps.push(TopAttemptedApp {
                app_id: row.get(0)?,
                display_name: row.get(1)?,
                attempts: to_u32(attempts, "attempts")?,
            });
        }
        Ok(apps)
    }
}

impl Database {
    pub async fn top_attempted_apps(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<TopAttemptedApp>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| AttemptRepository::new(conn).top_apps(&session_id, limit))
            .await
    }

    /// Recent missions with their attempt breakdown, newest first.
    pub async fn session_reports(
        &self,
        limit: usize,
        top_apps: usize,
    ) -> Result<Vec<SessionReport>> {
        self.execute(move |conn| {
            let sessions = SessionRepository::new(conn).list(limit)?;
            let attempts = AttemptRepository::new(conn);

            let mut reports = Vec::with_capacity(sessions.len());
            for session in sessions {
                let Some(id) = session.id.clone() else {
                    continue;
                };
                let total = attempts.count_for_session(&id)?;
                let top = attempts.top_apps(&id, top_apps)?;
                reports.push(SessionReport::new(session, total, top));
            }
            Ok(reports)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::defaults::default_catalog,
        db::{migrations::run_migrations, repositories::apps::AppRepository},
        session::{Session, SessionState},
    };
    use chrono::Utc;

    fn conn_with_session(id: &str) -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        AppRepository::new(&conn).seed(&default_catalog()).unwrap();
        let mut session = Session::new(60);
        session.id = Some(id.to_string());
        session.state = SessionState::Running;
        session.started_at = Some(Utc::now());
        SessionRepository::new(&conn).save(&session).unwrap();
        conn
    }

    fn attempt(session: &str, app: &str, package: &str) -> AttemptRecord {
        AttemptRecord {
            id: None,
            session_id: session.to_string(),
            app_id: app.to_string(),
            package: package.to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn top_apps_ranks_by_attempts() {
        let conn = conn_with_session("s1");
        let repo = AttemptRepository::new(&conn);
        let yt = "com.google.android.youtube";
        repo.insert(&attempt("s1", yt, yt)).unwrap();
        repo.insert(&attempt("s1", yt, yt)).unwrap();
        repo.insert(&attempt("s1", "com.games.*", "com.games.chess"))
            .unwrap();

        let top = repo.top_apps("s1", 5).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].app_id, yt);
        assert_eq!(top[0].attempts, 2);
        assert_eq!(top[0].display_name.as_deref(), Some("YouTube"));
        assert_eq!(top[1].display_name.as_deref(), Some("Mobile Games"));
        assert_eq!(repo.count_for_session("s1").unwrap(), 3);
        assert_eq!(repo.top_apps("s1", 1).unwrap().len(), 1);
    }

    #[test]
    fn attempts_require_known_session() {
        let conn = conn_with_session("s1");
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        let repo = AttemptRepository::new(&conn);
        assert!(repo.insert(&attempt("ghost", "x", "x")).is_err());
    }

    #[tokio::test]
    async fn session_reports_are_newest_first_with_progress() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(dir.path().join("detox.sqlite3")).unwrap();
        db.load_catalog().await.unwrap();

        let now = Utc::now();
        let mut older = Session::new(600);
        older.id = Some("older".into());
        older.state = SessionState::Completed;
        older.remaining_secs = 0;
        older.started_at = Some(now - chrono::Duration::hours(2));
        older.updated_at = older.started_at;

        let mut newer = Session::new(600);
        newer.id = Some("newer".into());
        newer.state = SessionState::Paused;
        newer.remaining_secs = 450;
        newer.started_at = Some(now);
        newer.updated_at = Some(now);

        let yt = "com.google.android.youtube";
        db.execute(move |conn| {
            let sessions = SessionRepository::new(conn);
            sessions.save(&older)?;
            sessions.save(&newer)?;
            let attempts = AttemptRepository::new(conn);
            attempts.insert(&attempt("newer", yt, yt))?;
            attempts.insert(&attempt("newer", "com.games.*", "com.games.chess"))?;
            attempts.insert(&attempt("newer", "com.games.*", "com.games.puzzle"))?;
            Ok(())
        })
        .await
        .unwrap();

        let reports = db.session_reports(10, 1).await.unwrap();
        assert_eq!(reports.len(), 2);

        let latest = &reports[0];
        assert_eq!(latest.session.id.as_deref(), Some("newer"));
        assert_eq!(latest.focused_secs, 150);
        assert!((latest.completion_percent - 25.0).abs() < f64::EPSILON);
        assert_eq!(latest.total_attempts, 3);
        assert_eq!(latest.top_apps.len(), 1);
        assert_eq!(latest.top_apps[0].app_id, "com.games.*");
        assert_eq!(latest.top_apps[0].attempts, 2);

        let finished = &reports[1];
        assert_eq!(finished.session.state, SessionState::Completed);
        assert_eq!(finished.focused_secs, 600);
        assert!((finished.completion_percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(finished.total_attempts, 0);
        assert!(finished.top_apps.is_empty());

        assert_eq!(db.session_reports(1, 3).await.unwrap().len(), 1);
    }
}
