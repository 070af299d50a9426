//! Authorization guard: role vs. stage. Pure, no I/O.

use crate::models::{Stage, StaffRole};

use super::registry::StageRegistry;
use super::WorkflowError;

/// Allow iff the acting role is the stage's configured occupant, or an
/// admin override. Stages with no configured role deny everyone but admins.
pub fn authorize(
    registry: &StageRegistry,
    role: StaffRole,
    stage: Stage,
) -> Result<(), WorkflowError> {
    if role.is_admin() {
        return Ok(());
    }
    match registry.required_role(stage) {
        Some(required) if required == role => Ok(()),
        _ => Err(WorkflowError::Forbidden { role, stage }),
    }
}
