//! Visit and stage-record database operations.
//!
//! The multi-statement workflow transitions are composed from the
//! connection-level functions here inside a single transaction; each
//! function is a conditional write whose boolean result reports whether
//! this caller won the write.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{FinalClockOut, Stage, StagePayload, StageRecord, Visit, VisitStatus};

impl Database {
    /// Insert a new visit row (stage records are written separately).
    pub fn insert_visit(&self, visit: &Visit) -> DbResult<()> {
        insert_visit(&self.conn, visit)
    }

    /// Load a visit with its stage records.
    pub fn get_visit(&self, visit_id: &str) -> DbResult<Option<Visit>> {
        get_visit(&self.conn, visit_id)
    }

    /// List in-progress visits waiting at a stage, oldest first.
    pub fn list_queue(
        &self,
        stage: Option<Stage>,
        branch_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> DbResult<Vec<Visit>> {
        list_queue(&self.conn, stage, branch_id, limit, offset)
    }
}

pub fn insert_visit(conn: &Connection, visit: &Visit) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO visits (
            visit_id, visit_number, patient_id, branch_id, appointment_id,
            assigned_doctor_id, current_stage, status, visit_date,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            visit.visit_id,
            visit.visit_number,
            visit.patient_id,
            visit.branch_id,
            visit.appointment_id,
            visit.assigned_doctor_id,
            visit.current_stage.as_str(),
            visit.status.as_str(),
            visit.visit_date,
            visit.created_at,
            visit.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_visit(conn: &Connection, visit_id: &str) -> DbResult<Option<Visit>> {
    let row = conn
        .query_row(
            r#"
            SELECT visit_id, visit_number, patient_id, branch_id, appointment_id,
                   assigned_doctor_id, current_stage, status, visit_date,
                   final_clock_out, created_at, updated_at
            FROM visits
            WHERE visit_id = ?
            "#,
            [visit_id],
            map_visit_row,
        )
        .optional()?;

    match row {
        Some(row) => {
            let mut visit: Visit = row.try_into()?;
            visit.stages = load_stage_records(conn, &visit.visit_id)?;
            Ok(Some(visit))
        }
        None => Ok(None),
    }
}

/// Open a stage record with only the clock-in stamp (front desk at visit
/// creation, returned-to-front-desk after billing). Returns `false` when the
/// stage was already clocked in.
pub fn open_stage(
    conn: &Connection,
    visit_id: &str,
    stage: Stage,
    actor_id: &str,
    at: &str,
) -> DbResult<bool> {
    let rows = conn.execute(
        r#"
        INSERT INTO visit_stages (visit_id, stage, clocked_in_by, clocked_in_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(visit_id, stage) DO NOTHING
        "#,
        params![visit_id, stage.as_str(), actor_id, at],
    )?;
    Ok(rows > 0)
}

/// Write a fused clock-in/clock-out record in one insert. Returns `false`
/// when the stage was already clocked in.
pub fn insert_closed_stage(
    conn: &Connection,
    visit_id: &str,
    stage: Stage,
    actor_id: &str,
    at: &str,
    notes: Option<&str>,
    payload: Option<&StagePayload>,
) -> DbResult<bool> {
    let payload_json = payload.map(serde_json::to_string).transpose()?;
    let rows = conn.execute(
        r#"
        INSERT INTO visit_stages (
            visit_id, stage, clocked_in_by, clocked_in_at,
            clocked_out_by, clocked_out_at, notes, payload
        ) VALUES (?1, ?2, ?3, ?4, ?3, ?4, ?5, ?6)
        ON CONFLICT(visit_id, stage) DO NOTHING
        "#,
        params![visit_id, stage.as_str(), actor_id, at, notes, payload_json],
    )?;
    Ok(rows > 0)
}

/// Close an open stage record. Returns `false` when there is no open record
/// for the stage.
pub fn close_stage(
    conn: &Connection,
    visit_id: &str,
    stage: Stage,
    actor_id: &str,
    at: &str,
    notes: Option<&str>,
) -> DbResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE visit_stages SET
            clocked_out_by = ?3,
            clocked_out_at = ?4,
            notes = COALESCE(?5, notes)
        WHERE visit_id = ?1 AND stage = ?2 AND clocked_out_at IS NULL
        "#,
        params![visit_id, stage.as_str(), actor_id, at, notes],
    )?;
    Ok(rows > 0)
}

/// Attach a payload to an existing stage record.
pub fn set_stage_payload(
    conn: &Connection,
    visit_id: &str,
    stage: Stage,
    payload: &StagePayload,
) -> DbResult<bool> {
    let payload_json = serde_json::to_string(payload)?;
    let rows = conn.execute(
        "UPDATE visit_stages SET payload = ?3 WHERE visit_id = ?1 AND stage = ?2",
        params![visit_id, stage.as_str(), payload_json],
    )?;
    Ok(rows > 0)
}

/// Advance `current_stage`, conditional on the visit still sitting at the
/// expected stage. Returns `false` when another request moved it first.
pub fn advance_visit_stage(
    conn: &Connection,
    visit_id: &str,
    from: Stage,
    to: Stage,
    at: &str,
) -> DbResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE visits SET current_stage = ?3, updated_at = ?4
        WHERE visit_id = ?1 AND current_stage = ?2 AND status = 'in_progress'
        "#,
        params![visit_id, from.as_str(), to.as_str(), at],
    )?;
    Ok(rows > 0)
}

/// Terminal completion: status and stage move to `completed` together and
/// the final clock-out is recorded. Conditional on the visit still being in
/// progress.
pub fn complete_visit(
    conn: &Connection,
    visit_id: &str,
    final_clock_out: &FinalClockOut,
    at: &str,
) -> DbResult<bool> {
    let json = serde_json::to_string(final_clock_out)?;
    let rows = conn.execute(
        r#"
        UPDATE visits SET
            status = 'completed',
            current_stage = 'completed',
            final_clock_out = ?2,
            updated_at = ?3
        WHERE visit_id = ?1 AND status = 'in_progress'
        "#,
        params![visit_id, json, at],
    )?;
    Ok(rows > 0)
}

/// Terminal cancellation, conditional on the visit still being in progress.
pub fn cancel_visit(conn: &Connection, visit_id: &str, at: &str) -> DbResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE visits SET status = 'cancelled', updated_at = ?2
        WHERE visit_id = ?1 AND status = 'in_progress'
        "#,
        params![visit_id, at],
    )?;
    Ok(rows > 0)
}

pub fn list_queue(
    conn: &Connection,
    stage: Option<Stage>,
    branch_id: Option<&str>,
    limit: usize,
    offset: usize,
) -> DbResult<Vec<Visit>> {
    let stage_str = stage.map(|s| s.as_str());
    let mut stmt = conn.prepare(
        r#"
        SELECT visit_id, visit_number, patient_id, branch_id, appointment_id,
               assigned_doctor_id, current_stage, status, visit_date,
               final_clock_out, created_at, updated_at
        FROM visits
        WHERE status = 'in_progress'
          AND (?1 IS NULL OR current_stage = ?1)
          AND (?2 IS NULL OR branch_id = ?2)
        ORDER BY visit_date ASC
        LIMIT ?3 OFFSET ?4
        "#,
    )?;

    let rows = stmt.query_map(
        params![stage_str, branch_id, limit as i64, offset as i64],
        map_visit_row,
    )?;

    let mut visits = Vec::new();
    for row in rows {
        let mut visit: Visit = row?.try_into()?;
        visit.stages = load_stage_records(conn, &visit.visit_id)?;
        visits.push(visit);
    }
    Ok(visits)
}

fn load_stage_records(conn: &Connection, visit_id: &str) -> DbResult<Vec<StageRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT stage, clocked_in_by, clocked_in_at, clocked_out_by,
               clocked_out_at, notes, payload
        FROM visit_stages
        WHERE visit_id = ?
        ORDER BY clocked_in_at ASC
        "#,
    )?;

    let rows = stmt.query_map([visit_id], |row| {
        Ok(StageRow {
            stage: row.get(0)?,
            clocked_in_by: row.get(1)?,
            clocked_in_at: row.get(2)?,
            clocked_out_by: row.get(3)?,
            clocked_out_at: row.get(4)?,
            notes: row.get(5)?,
            payload: row.get(6)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.try_into()?);
    }
    Ok(records)
}

/// Intermediate row struct for database mapping.
struct VisitRow {
    visit_id: String,
    visit_number: String,
    patient_id: String,
    branch_id: String,
    appointment_id: Option<String>,
    assigned_doctor_id: Option<String>,
    current_stage: String,
    status: String,
    visit_date: String,
    final_clock_out: Option<String>,
    created_at: String,
    updated_at: String,
}

fn map_visit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VisitRow> {
    Ok(VisitRow {
        visit_id: row.get(0)?,
        visit_number: row.get(1)?,
        patient_id: row.get(2)?,
        branch_id: row.get(3)?,
        appointment_id: row.get(4)?,
        assigned_doctor_id: row.get(5)?,
        current_stage: row.get(6)?,
        status: row.get(7)?,
        visit_date: row.get(8)?,
        final_clock_out: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl TryFrom<VisitRow> for Visit {
    type Error = DbError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        let current_stage = Stage::parse(&row.current_stage)
            .ok_or_else(|| DbError::Constraint(format!("Unknown stage: {}", row.current_stage)))?;
        let status = VisitStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown status: {}", row.status)))?;
        let final_clock_out: Option<FinalClockOut> = row
            .final_clock_out
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Visit {
            visit_id: row.visit_id,
            visit_number: row.visit_number,
            patient_id: row.patient_id,
            branch_id: row.branch_id,
            appointment_id: row.appointment_id,
            assigned_doctor_id: row.assigned_doctor_id,
            current_stage,
            status,
            visit_date: row.visit_date,
            stages: Vec::new(),
            final_clock_out,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct StageRow {
    stage: String,
    clocked_in_by: String,
    clocked_in_at: String,
    clocked_out_by: Option<String>,
    clocked_out_at: Option<String>,
    notes: Option<String>,
    payload: Option<String>,
}

impl TryFrom<StageRow> for StageRecord {
    type Error = DbError;

    fn try_from(row: StageRow) -> Result<Self, Self::Error> {
        let stage = Stage::parse(&row.stage)
            .ok_or_else(|| DbError::Constraint(format!("Unknown stage: {}", row.stage)))?;
        let payload: Option<StagePayload> = row
            .payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(StageRecord {
            stage,
            clocked_in_by: row.clocked_in_by,
            clocked_in_at: row.clocked_in_at,
            clocked_out_by: row.clocked_out_by,
            clocked_out_at: row.clocked_out_at,
            notes: row.notes,
            payload,
        })
    }
}
