//! Notification side effect.
//!
//! Fired after a stage transition commits; delivery is best-effort and a
//! failure never rolls the transition back. The outbox implementation only
//! records the request to deliver; the transport that drains it is an
//! external system.

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::models::Stage;

/// Notification errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A pending "your queue has a new visit" message for one staff member.
#[derive(Debug, Clone, PartialEq)]
pub struct StageNotification {
    pub visit_id: String,
    pub visit_number: String,
    pub branch_id: String,
    pub stage: Stage,
    pub recipient_staff_id: String,
    pub message: String,
}

impl StageNotification {
    pub fn new(
        visit_id: &str,
        visit_number: &str,
        branch_id: &str,
        stage: Stage,
        recipient_staff_id: &str,
    ) -> Self {
        Self {
            visit_id: visit_id.to_string(),
            visit_number: visit_number.to_string(),
            branch_id: branch_id.to_string(),
            stage,
            recipient_staff_id: recipient_staff_id.to_string(),
            message: format!("Visit {} is waiting at {}", visit_number, stage),
        }
    }
}

/// Requests delivery of a stage notification.
pub trait Notifier: Send + Sync {
    fn deliver(&self, conn: &Connection, notification: &StageNotification) -> Result<(), NotifyError>;
}

/// Writes notifications to the `notifications_outbox` table.
#[derive(Debug, Default)]
pub struct OutboxNotifier;

impl Notifier for OutboxNotifier {
    fn deliver(&self, conn: &Connection, notification: &StageNotification) -> Result<(), NotifyError> {
        conn.execute(
            r#"
            INSERT INTO notifications_outbox (
                visit_id, visit_number, branch_id, stage, recipient_staff_id, message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                notification.visit_id,
                notification.visit_number,
                notification.branch_id,
                notification.stage.as_str(),
                notification.recipient_staff_id,
                notification.message,
            ],
        )?;
        Ok(())
    }
}

/// Drops every notification (for callers that bring their own transport).
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn deliver(&self, _conn: &Connection, _notification: &StageNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}
