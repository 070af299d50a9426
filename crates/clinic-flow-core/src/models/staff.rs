//! Staff directory records and the acting-staff identity.

use serde::{Deserialize, Serialize};

use super::stage::StaffRole;

/// A staff directory entry. The directory itself is owned by an external
/// system; this is the slice the workflow needs for authorization and
/// notification fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffMember {
    pub staff_id: String,
    pub name: String,
    pub role: StaffRole,
    pub branch_id: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl StaffMember {
    pub fn new(name: String, role: StaffRole, branch_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            staff_id: uuid::Uuid::new_v4().to_string(),
            name,
            role,
            branch_id,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// The identity this member acts under.
    pub fn actor(&self) -> Actor {
        Actor {
            staff_id: self.staff_id.clone(),
            name: self.name.clone(),
            role: self.role,
            branch_id: self.branch_id.clone(),
        }
    }
}

/// The authenticated staff member performing a workflow action. Session
/// issuance is handled by an external identity provider; the engine only
/// sees the resolved identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub staff_id: String,
    pub name: String,
    pub role: StaffRole,
    pub branch_id: String,
}
