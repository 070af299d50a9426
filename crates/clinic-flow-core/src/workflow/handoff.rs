//! Visit lifecycle actions: start, generic handoff, checkout, and cancel.
//!
//! Front desk opens visits and closes them again after billing returns
//! them. The generic handoff moves a visit from the acting role's home
//! stage to its successor without a stage payload; the fused handlers in
//! `handlers.rs` are the payload-carrying variants.

use tracing::{debug, info};

use crate::db::{appointments, visits, Database};
use crate::models::{Actor, FinalClockOut, Stage, Visit, VisitStatus};

use super::registry::TransitionPolicy;
use super::{guard, now_rfc3339, WorkflowEngine, WorkflowError, WorkflowResult};

/// Input for opening a visit at the front desk.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub patient_id: String,
    pub branch_id: String,
    pub appointment_id: Option<String>,
    pub assigned_doctor_id: Option<String>,
}

enum HandoffOutcome {
    Committed,
    MovedUnderneath,
}

impl<'a> WorkflowEngine<'a> {
    /// Register a visit at the front desk. The check-in stage record is
    /// opened immediately; it stays open until the front desk hands off.
    pub fn start_visit(
        &self,
        db: &mut Database,
        new_visit: NewVisit,
        actor: &Actor,
    ) -> WorkflowResult<Visit> {
        guard::authorize(self.registry(), actor.role, Stage::FrontDesk)?;
        if new_visit.patient_id.trim().is_empty() {
            return Err(WorkflowError::Validation("patient_id".into()));
        }
        if new_visit.branch_id.trim().is_empty() {
            return Err(WorkflowError::Validation("branch_id".into()));
        }

        let mut visit = Visit::new(new_visit.patient_id, new_visit.branch_id);
        visit.appointment_id = new_visit.appointment_id;
        visit.assigned_doctor_id = new_visit.assigned_doctor_id;

        let now = now_rfc3339();
        {
            let tx = db.transaction()?;
            visits::insert_visit(&tx, &visit)?;
            visits::open_stage(&tx, &visit.visit_id, Stage::FrontDesk, &actor.staff_id, &now)?;
            tx.commit()?;
        }

        info!(visit = %visit.visit_number, branch = %visit.branch_id, "Visit started");
        self.reload(db, &visit.visit_id)
    }

    /// Move a visit from the actor's home stage to the next stage, closing
    /// the departing stage record. Admins hand off from wherever the visit
    /// currently sits.
    pub fn handoff(
        &self,
        db: &mut Database,
        visit_id: &str,
        actor: &Actor,
        notes: Option<String>,
    ) -> WorkflowResult<Visit> {
        let visit = self.load_in_progress(db, visit_id)?;

        // Returned visits leave only through checkout. The front desk owns
        // this stage, so its staff (and admins) are pointed at checkout;
        // everyone else is denied as usual.
        if visit.current_stage == Stage::ReturnedToFrontDesk {
            guard::authorize(self.registry(), actor.role, Stage::ReturnedToFrontDesk)?;
            return Err(WorkflowError::CheckoutRequired);
        }

        let expected = if actor.role.is_admin() {
            visit.current_stage
        } else {
            self.registry()
                .stage_for_role(actor.role)
                .ok_or(WorkflowError::Forbidden {
                    role: actor.role,
                    stage: visit.current_stage,
                })?
        };
        if visit.current_stage != expected {
            return Err(WorkflowError::Forbidden {
                role: actor.role,
                stage: visit.current_stage,
            });
        }
        let target = self
            .registry()
            .next_stage(expected)
            .ok_or(WorkflowError::InvalidWorkflow(expected))?;

        let now = now_rfc3339();
        let outcome = {
            let tx = db.transaction()?;
            if !visits::close_stage(
                &tx,
                visit_id,
                expected,
                &actor.staff_id,
                &now,
                notes.as_deref(),
            )? {
                // No open record at this stage: the visit was waiting in
                // queue. Record a zero-duration pass-through so the audit
                // trail stays complete.
                visits::insert_closed_stage(
                    &tx,
                    visit_id,
                    expected,
                    &actor.staff_id,
                    &now,
                    notes.as_deref(),
                    None,
                )?;
            }
            if !visits::advance_visit_stage(&tx, visit_id, expected, target, &now)? {
                HandoffOutcome::MovedUnderneath
            } else {
                tx.commit()?;
                HandoffOutcome::Committed
            }
        };

        match outcome {
            HandoffOutcome::MovedUnderneath => {
                let actual = self.reload(db, visit_id)?.current_stage;
                Err(WorkflowError::WrongStage {
                    expected,
                    actual,
                })
            }
            HandoffOutcome::Committed => {
                debug!(visit = %visit.visit_number, from = %expected, to = %target, "Handoff");
                self.notify_stage(db, &visit, target);
                self.reload(db, visit_id)
            }
        }
    }

    /// Final checkout at the front desk: closes the returned-visit record,
    /// completes the visit, and marks any linked appointment done. Checking
    /// out an already completed visit is a no-op success.
    pub fn checkout(
        &self,
        db: &mut Database,
        visit_id: &str,
        actor: &Actor,
        notes: Option<String>,
    ) -> WorkflowResult<Visit> {
        let visit = db
            .get_visit(visit_id)?
            .ok_or_else(|| WorkflowError::VisitNotFound(visit_id.to_string()))?;

        // Repeated checkout clicks should not error at the desk
        if visit.status == VisitStatus::Completed {
            return Ok(visit);
        }
        if !visit.is_in_progress() {
            return Err(WorkflowError::VisitNotInProgress(visit.status));
        }

        guard::authorize(self.registry(), actor.role, Stage::ReturnedToFrontDesk)?;
        if visit.current_stage != Stage::ReturnedToFrontDesk {
            return Err(WorkflowError::WrongStage {
                expected: Stage::ReturnedToFrontDesk,
                actual: visit.current_stage,
            });
        }

        let now = now_rfc3339();
        let final_clock_out = FinalClockOut {
            clocked_out_by: actor.staff_id.clone(),
            clocked_out_at: now.clone(),
            notes: notes.clone(),
        };
        let completed = {
            let tx = db.transaction()?;
            visits::close_stage(
                &tx,
                visit_id,
                Stage::ReturnedToFrontDesk,
                &actor.staff_id,
                &now,
                notes.as_deref(),
            )?;
            let completed = visits::complete_visit(&tx, visit_id, &final_clock_out, &now)?;
            if completed {
                if let Some(appointment_id) = &visit.appointment_id {
                    appointments::mark_appointment_completed(&tx, appointment_id)?;
                }
                tx.commit()?;
            }
            completed
        };

        if !completed {
            // Lost a race with another checkout or a cancellation
            let current = self.reload(db, visit_id)?;
            return if current.status == VisitStatus::Completed {
                Ok(current)
            } else {
                Err(WorkflowError::VisitNotInProgress(current.status))
            };
        }

        info!(visit = %visit.visit_number, "Visit completed");
        self.reload(db, visit_id)
    }

    /// Cancel an in-progress visit. Front desk (or admin) only; the open
    /// stage record, if any, is closed with the cancellation reason.
    pub fn cancel(
        &self,
        db: &mut Database,
        visit_id: &str,
        actor: &Actor,
        reason: Option<String>,
    ) -> WorkflowResult<Visit> {
        guard::authorize(self.registry(), actor.role, Stage::FrontDesk)?;
        let visit = self.load_in_progress(db, visit_id)?;

        let now = now_rfc3339();
        let cancelled = {
            let tx = db.transaction()?;
            visits::close_stage(
                &tx,
                visit_id,
                visit.current_stage,
                &actor.staff_id,
                &now,
                reason.as_deref(),
            )?;
            let cancelled = visits::cancel_visit(&tx, visit_id, &now)?;
            if cancelled {
                tx.commit()?;
            }
            cancelled
        };
        if !cancelled {
            let current = self.reload(db, visit_id)?;
            return Err(WorkflowError::VisitNotInProgress(current.status));
        }

        info!(visit = %visit.visit_number, "Visit cancelled");
        self.reload(db, visit_id)
    }
}
