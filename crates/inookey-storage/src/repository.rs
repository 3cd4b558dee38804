//! Repositories for conversation turns, visitor sessions and appointments.
//!
//! Every statement is parameterized; user text never reaches SQL as a
//! string fragment.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tracing::debug;

use inookey_core::error::InookeyError;
use inookey_core::types::{
    Appointment, AppointmentStatus, ConversationTurn, Intent, NewAppointment, NewTurn, Session,
    SessionStats,
};

use crate::db::Database;

/// Conversation store: turns plus the session rows they belong to.
pub struct ConversationRepository {
    db: Arc<Database>,
}

impl ConversationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a turn and bump the owning session's counters.
    ///
    /// Both writes share one transaction; if either fails neither is kept.
    /// Returns the store-assigned id.
    pub fn save_turn(&self, turn: &NewTurn) -> Result<i64, InookeyError> {
        let now = Utc::now().timestamp_millis();
        let id = self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| InookeyError::Storage(format!("Failed to begin transaction: {}", e)))?;
            tx.execute(
                "INSERT INTO conversations (session_id, user_message, ai_response, intent, confidence, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    turn.session_id,
                    turn.user_message,
                    turn.ai_response,
                    turn.intent.as_str(),
                    turn.confidence,
                    now,
                ],
            )
            .map_err(|e| InookeyError::Storage(format!("Failed to save conversation: {}", e)))?;
            let id = tx.last_insert_rowid();
            bump_session(&tx, &turn.session_id, now)?;
            tx.commit()
                .map_err(|e| InookeyError::Storage(format!("Failed to commit conversation: {}", e)))?;
            Ok(id)
        })?;

        debug!(session_id = %turn.session_id, id, "Conversation turn saved");
        Ok(id)
    }

    /// The most recent `limit` turns of a session, oldest first.
    pub fn get_history(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>, InookeyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, user_message, ai_response, intent, confidence, timestamp
                     FROM conversations
                     WHERE session_id = ?1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?2",
                )
                .map_err(|e| InookeyError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![session_id, limit], |row| {
                    Ok(row_to_turn(row))
                })
                .map_err(|e| InookeyError::Storage(e.to_string()))?;

            let mut turns = Vec::new();
            for row in rows {
                let turn = row.map_err(|e| InookeyError::Storage(e.to_string()))??;
                turns.push(turn);
            }
            turns.reverse();
            Ok(turns)
        })
    }

    /// Create the session row, or refresh its client metadata.
    ///
    /// `started_at` and `total_messages` survive repeated calls; a `None`
    /// user agent or address keeps the stored value.
    pub fn upsert_session(
        &self,
        session_id: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<(), InookeyError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_sessions (session_id, user_agent, ip_address, started_at, last_activity, total_messages)
                 VALUES (?1, ?2, ?3, ?4, ?4, 0)
                 ON CONFLICT(session_id) DO UPDATE SET
                     user_agent = COALESCE(excluded.user_agent, user_sessions.user_agent),
                     ip_address = COALESCE(excluded.ip_address, user_sessions.ip_address),
                     last_activity = excluded.last_activity",
                rusqlite::params![session_id, user_agent, ip_address, now],
            )
            .map_err(|e| InookeyError::Storage(format!("Failed to upsert session: {}", e)))?;
            Ok(())
        })
    }

    /// Increment `total_messages` and refresh `last_activity`.
    ///
    /// Returns false when no session row exists.
    pub fn touch_session(&self, session_id: &str) -> Result<bool, InookeyError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| bump_session(conn, session_id, now))
    }

    pub fn find_session(&self, session_id: &str) -> Result<Option<Session>, InookeyError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT session_id, user_agent, ip_address, started_at, last_activity, total_messages
                     FROM user_sessions WHERE session_id = ?1",
                    rusqlite::params![session_id],
                    |row| Ok(row_to_session(row)),
                )
                .optional()
                .map_err(|e| InookeyError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// Session row plus its stored turn count.
    pub fn session_stats(&self, session_id: &str) -> Result<Option<SessionStats>, InookeyError> {
        let Some(session) = self.find_session(session_id)? else {
            return Ok(None);
        };
        let conversation_count = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE session_id = ?1",
                rusqlite::params![session_id],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| InookeyError::Storage(e.to_string()))
        })?;
        Ok(Some(SessionStats {
            session,
            conversation_count,
        }))
    }
}

/// Appointment store.
pub struct AppointmentRepository {
    db: Arc<Database>,
}

impl AppointmentRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a booking with status `pending`. Returns the new id.
    pub fn save(&self, appointment: &NewAppointment) -> Result<i64, InookeyError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO appointments (session_id, customer_name, customer_email, customer_phone,
                                           project_description, preferred_date, preferred_time,
                                           status, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                rusqlite::params![
                    appointment.session_id,
                    appointment.customer_name,
                    appointment.customer_email,
                    appointment.customer_phone,
                    appointment.project_description,
                    appointment.preferred_date,
                    appointment.preferred_time,
                    AppointmentStatus::Pending.to_string(),
                    appointment.notes,
                    now,
                ],
            )
            .map_err(|e| InookeyError::Storage(format!("Failed to save appointment: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Appointment>, InookeyError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, session_id, customer_name, customer_email, customer_phone,
                            project_description, preferred_date, preferred_time, status, notes,
                            created_at, updated_at
                     FROM appointments WHERE id = ?1",
                    rusqlite::params![id],
                    |row| Ok(row_to_appointment(row)),
                )
                .optional()
                .map_err(|e| InookeyError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// Change the status (and optionally the notes) of a booking.
    ///
    /// Returns the number of rows affected; 0 means no such appointment.
    pub fn update_status(
        &self,
        id: i64,
        status: AppointmentStatus,
        notes: Option<&str>,
    ) -> Result<usize, InookeyError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE appointments
                 SET status = ?1, notes = COALESCE(?2, notes), updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![status.to_string(), notes, now, id],
            )
            .map_err(|e| InookeyError::Storage(format!("Failed to update appointment: {}", e)))
        })
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn bump_session(
    conn: &rusqlite::Connection,
    session_id: &str,
    now: i64,
) -> Result<bool, InookeyError> {
    let affected = conn
        .execute(
            "UPDATE user_sessions
             SET last_activity = ?1, total_messages = total_messages + 1
             WHERE session_id = ?2",
            rusqlite::params![now, session_id],
        )
        .map_err(|e| InookeyError::Storage(format!("Failed to update session: {}", e)))?;
    Ok(affected > 0)
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> Result<ConversationTurn, InookeyError> {
    let storage = |e: rusqlite::Error| InookeyError::Storage(e.to_string());
    let intent: String = row.get(4).map_err(storage)?;

    Ok(ConversationTurn {
        id: row.get(0).map_err(storage)?,
        session_id: row.get(1).map_err(storage)?,
        user_message: row.get(2).map_err(storage)?,
        ai_response: row.get(3).map_err(storage)?,
        intent: intent.parse().unwrap_or(Intent::General),
        confidence: row.get(5).map_err(storage)?,
        timestamp: from_millis(row.get(6).map_err(storage)?),
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session, InookeyError> {
    let storage = |e: rusqlite::Error| InookeyError::Storage(e.to_string());

    Ok(Session {
        session_id: row.get(0).map_err(storage)?,
        user_agent: row.get(1).map_err(storage)?,
        ip_address: row.get(2).map_err(storage)?,
        started_at: from_millis(row.get(3).map_err(storage)?),
        last_activity: from_millis(row.get(4).map_err(storage)?),
        total_messages: row.get(5).map_err(storage)?,
    })
}

fn row_to_appointment(row: &rusqlite::Row<'_>) -> Result<Appointment, InookeyError> {
    let storage = |e: rusqlite::Error| InookeyError::Storage(e.to_string());
    let status: String = row.get(8).map_err(storage)?;

    Ok(Appointment {
        id: row.get(0).map_err(storage)?,
        session_id: row.get(1).map_err(storage)?,
        customer_name: row.get(2).map_err(storage)?,
        customer_email: row.get(3).map_err(storage)?,
        customer_phone: row.get(4).map_err(storage)?,
        project_description: row.get(5).map_err(storage)?,
        preferred_date: row.get(6).map_err(storage)?,
        preferred_time: row.get(7).map_err(storage)?,
        status: status.parse().map_err(InookeyError::Storage)?,
        notes: row.get(9).map_err(storage)?,
        created_at: from_millis(row.get(10).map_err(storage)?),
        updated_at: from_millis(row.get(11).map_err(storage)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_db() -> Arc<Database> {
        Arc::new(Database::in_memory().unwrap())
    }

    fn turn(session_id: &str, user: &str) -> NewTurn {
        NewTurn {
            session_id: session_id.to_string(),
            user_message: user.to_string(),
            ai_response: format!("reply to {}", user),
            intent: Intent::Services,
            confidence: 0.25,
        }
    }

    fn booking() -> NewAppointment {
        NewAppointment {
            session_id: "s1".to_string(),
            customer_name: "Grace Hopper".to_string(),
            customer_email: "grace@example.com".to_string(),
            customer_phone: None,
            project_description: "Compiler tooling".to_string(),
            preferred_date: "2030-01-02".to_string(),
            preferred_time: "10:00 AM".to_string(),
            notes: None,
        }
    }

    #[test]
    fn test_history_is_chronological() {
        let repo = ConversationRepository::new(make_db());
        let messages = ["T1", "T2", "T3", "T4", "T5"];
        for m in messages {
            repo.save_turn(&turn("s1", m)).unwrap();
        }

        let history = repo.get_history("s1", 20).unwrap();
        let got: Vec<&str> = history.iter().map(|t| t.user_message.as_str()).collect();
        assert_eq!(got, messages);
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_history_limit_keeps_most_recent() {
        let repo = ConversationRepository::new(make_db());
        for i in 1..=7 {
            repo.save_turn(&turn("s1", &format!("T{}", i))).unwrap();
        }
        let history = repo.get_history("s1", 3).unwrap();
        let got: Vec<&str> = history.iter().map(|t| t.user_message.as_str()).collect();
        assert_eq!(got, ["T5", "T6", "T7"]);
    }

    #[test]
    fn test_history_is_scoped_to_session() {
        let repo = ConversationRepository::new(make_db());
        repo.save_turn(&turn("a", "hello")).unwrap();
        repo.save_turn(&turn("b", "other")).unwrap();

        let history = repo.get_history("a", 20).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].intent, Intent::Services);
        assert_eq!(history[0].ai_response, "reply to hello");
        assert!(repo.get_history("missing", 20).unwrap().is_empty());
    }

    #[test]
    fn test_user_text_is_stored_verbatim() {
        let repo = ConversationRepository::new(make_db());
        let nasty = "'); DROP TABLE conversations; --";
        repo.save_turn(&turn("s1", nasty)).unwrap();
        let history = repo.get_history("s1", 20).unwrap();
        assert_eq!(history[0].user_message, nasty);
    }

    #[test]
    fn test_save_turn_touches_session() {
        let repo = ConversationRepository::new(make_db());
        repo.upsert_session("s1", Some("Mozilla/5.0"), Some("10.0.0.1"))
            .unwrap();
        let before = repo.find_session("s1").unwrap().unwrap();
        assert_eq!(before.total_messages, 0);

        repo.save_turn(&turn("s1", "one")).unwrap();
        repo.save_turn(&turn("s1", "two")).unwrap();

        let after = repo.find_session("s1").unwrap().unwrap();
        assert_eq!(after.total_messages, 2);
        assert!(after.last_activity >= before.last_activity);
    }

    #[test]
    fn test_failed_session_update_rolls_back_turn() {
        let db = make_db();
        let repo = ConversationRepository::new(Arc::clone(&db));
        repo.upsert_session("s1", None, None).unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE user_sessions")
                .map_err(|e| InookeyError::Storage(e.to_string()))
        })
        .unwrap();

        assert!(repo.save_turn(&turn("s1", "lost")).is_err());
        assert!(repo.get_history("s1", 10).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_preserves_counters_and_metadata() {
        let repo = ConversationRepository::new(make_db());
        repo.upsert_session("s1", Some("agent-1"), Some("1.1.1.1"))
            .unwrap();
        repo.save_turn(&turn("s1", "hi")).unwrap();
        let first = repo.find_session("s1").unwrap().unwrap();

        repo.upsert_session("s1", None, Some("2.2.2.2")).unwrap();
        let second = repo.find_session("s1").unwrap().unwrap();

        assert_eq!(second.started_at, first.started_at);
        assert_eq!(second.total_messages, 1);
        assert_eq!(second.user_agent.as_deref(), Some("agent-1"));
        assert_eq!(second.ip_address.as_deref(), Some("2.2.2.2"));
    }

    #[test]
    fn test_touch_unknown_session() {
        let repo = ConversationRepository::new(make_db());
        assert!(!repo.touch_session("ghost").unwrap());
    }

    #[test]
    fn test_session_stats() {
        let repo = ConversationRepository::new(make_db());
        assert!(repo.session_stats("s1").unwrap().is_none());

        repo.upsert_session("s1", None, None).unwrap();
        repo.save_turn(&turn("s1", "a")).unwrap();
        repo.save_turn(&turn("s1", "b")).unwrap();

        let stats = repo.session_stats("s1").unwrap().unwrap();
        assert_eq!(stats.conversation_count, 2);
        assert_eq!(stats.session.total_messages, 2);
    }

    #[test]
    fn test_appointment_save_and_find() {
        let repo = AppointmentRepository::new(make_db());
        let id = repo.save(&booking()).unwrap();

        let appt = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(appt.status, AppointmentStatus::Pending);
        assert_eq!(appt.customer_name, "Grace Hopper");
        assert_eq!(appt.created_at, appt.updated_at);
        assert!(appt.notes.is_none());

        assert!(repo.find_by_id(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_update_status() {
        let repo = AppointmentRepository::new(make_db());
        let id = repo.save(&booking()).unwrap();

        let affected = repo
            .update_status(id, AppointmentStatus::Confirmed, Some("Call booked"))
            .unwrap();
        assert_eq!(affected, 1);

        // Notes survive a later update without notes.
        repo.update_status(id, AppointmentStatus::Completed, None)
            .unwrap();
        let appt = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(appt.status, AppointmentStatus::Completed);
        assert_eq!(appt.notes.as_deref(), Some("Call booked"));
        assert!(appt.updated_at >= appt.created_at);
    }

    #[test]
    fn test_update_status_unknown_id_affects_nothing() {
        let repo = AppointmentRepository::new(make_db());
        let affected = repo
            .update_status(9999, AppointmentStatus::Confirmed, None)
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn test_concurrent_turns_share_one_handle() {
        let db = make_db();
        let mut handles = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let repo = ConversationRepository::new(db);
                repo.save_turn(&turn("shared", &format!("m{}", i)))
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let repo = ConversationRepository::new(db);
        assert_eq!(repo.get_history("shared", 20).unwrap().len(), 8);
    }
}
