//! Staff directory database operations.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{StaffMember, StaffRole};

impl Database {
    /// Insert or update a staff directory entry.
    pub fn upsert_staff(&self, member: &StaffMember) -> DbResult<()> {
        upsert_staff(&self.conn, member)
    }

    pub fn get_staff(&self, staff_id: &str) -> DbResult<Option<StaffMember>> {
        get_staff(&self.conn, staff_id)
    }

    /// Active staff of a role at a branch; the notification recipients for a
    /// stage handoff.
    pub fn list_active_staff(&self, role: StaffRole, branch_id: &str) -> DbResult<Vec<StaffMember>> {
        list_active_staff(&self.conn, role, branch_id)
    }
}

pub fn upsert_staff(conn: &Connection, member: &StaffMember) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO staff (staff_id, name, role, branch_id, active, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(staff_id) DO UPDATE SET
            name = excluded.name,
            role = excluded.role,
            branch_id = excluded.branch_id,
            active = excluded.active,
            updated_at = datetime('now')
        "#,
        params![
            member.staff_id,
            member.name,
            member.role.as_str(),
            member.branch_id,
            member.active as i64,
            member.created_at,
            member.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_staff(conn: &Connection, staff_id: &str) -> DbResult<Option<StaffMember>> {
    conn.query_row(
        r#"
        SELECT staff_id, name, role, branch_id, active, created_at, updated_at
        FROM staff
        WHERE staff_id = ?
        "#,
        [staff_id],
        map_staff_row,
    )
    .optional()?
    .map(|row| row.try_into())
    .transpose()
}

pub fn list_active_staff(
    conn: &Connection,
    role: StaffRole,
    branch_id: &str,
) -> DbResult<Vec<StaffMember>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT staff_id, name, role, branch_id, active, created_at, updated_at
        FROM staff
        WHERE role = ?1 AND branch_id = ?2 AND active = 1
        ORDER BY name
        "#,
    )?;

    let rows = stmt.query_map(params![role.as_str(), branch_id], map_staff_row)?;

    let mut members = Vec::new();
    for row in rows {
        members.push(row?.try_into()?);
    }
    Ok(members)
}

struct StaffRow {
    staff_id: String,
    name: String,
    role: String,
    branch_id: String,
    active: i64,
    created_at: String,
    updated_at: String,
}

fn map_staff_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StaffRow> {
    Ok(StaffRow {
        staff_id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        branch_id: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl TryFrom<StaffRow> for StaffMember {
    type Error = DbError;

    fn try_from(row: StaffRow) -> Result<Self, Self::Error> {
        let role = StaffRole::parse(&row.role)
            .ok_or_else(|| DbError::Constraint(format!("Unknown staff role: {}", row.role)))?;

        Ok(StaffMember {
            staff_id: row.staff_id,
            name: row.name,
            role,
            branch_id: row.branch_id,
            active: row.active != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
