//! Linked-appointment database operations.
//!
//! Scheduling lives in an external system; the workflow only needs to mark a
//! linked appointment completed when its visit checks out.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DbResult};

/// The slice of an appointment the workflow tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentRecord {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub scheduled_for: Option<String>,
    pub status: String,
}

impl Database {
    pub fn upsert_appointment(&self, appointment: &AppointmentRecord) -> DbResult<()> {
        upsert_appointment(&self.conn, appointment)
    }

    pub fn get_appointment(&self, appointment_id: &str) -> DbResult<Option<AppointmentRecord>> {
        get_appointment(&self.conn, appointment_id)
    }
}

pub fn upsert_appointment(conn: &Connection, appointment: &AppointmentRecord) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO appointments (appointment_id, patient_id, doctor_id, scheduled_for, status)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(appointment_id) DO UPDATE SET
            patient_id = excluded.patient_id,
            doctor_id = excluded.doctor_id,
            scheduled_for = excluded.scheduled_for,
            status = excluded.status,
            updated_at = datetime('now')
        "#,
        params![
            appointment.appointment_id,
            appointment.patient_id,
            appointment.doctor_id,
            appointment.scheduled_for,
            appointment.status,
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, appointment_id: &str) -> DbResult<Option<AppointmentRecord>> {
    conn.query_row(
        r#"
        SELECT appointment_id, patient_id, doctor_id, scheduled_for, status
        FROM appointments
        WHERE appointment_id = ?
        "#,
        [appointment_id],
        |row| {
            Ok(AppointmentRecord {
                appointment_id: row.get(0)?,
                patient_id: row.get(1)?,
                doctor_id: row.get(2)?,
                scheduled_for: row.get(3)?,
                status: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Checkout side effect. Missing appointments are ignored, the visit is the
/// source of truth.
pub fn mark_appointment_completed(conn: &Connection, appointment_id: &str) -> DbResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE appointments SET status = 'completed', updated_at = datetime('now')
        WHERE appointment_id = ? AND status != 'completed'
        "#,
        [appointment_id],
    )?;
    Ok(rows > 0)
}
