//! The stage-workflow engine: guarded clock-ins, handoffs, billing, and the
//! queue read model.
//!
//! Every transition validates before it mutates, and every mutation is a
//! conditional write committed in a single transaction. Notification fan-out
//! runs after commit and never rolls a transition back.

pub mod billing;
pub mod guard;
pub mod handlers;
pub mod handoff;
pub mod queue;
pub mod registry;

pub use billing::BillingOutcome;
pub use handoff::NewVisit;
pub use queue::QueuePage;
pub use registry::{StageRegistry, TransitionPolicy};

use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{Database, DbError};
use crate::models::{FeeSchedule, Stage, StaffRole, Visit, VisitStatus};
use crate::notify::{Notifier, StageNotification};

/// Workflow errors. State-machine violations report the visit's actual
/// stage so clients can resynchronize.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Visit not found: {0}")]
    VisitNotFound(String),

    #[error("Invoice not found for visit: {0}")]
    InvoiceNotFound(String),

    #[error("Role {role} may not act on stage {stage}")]
    Forbidden { role: StaffRole, stage: Stage },

    #[error("Visit is at stage {actual}, expected {expected}")]
    WrongStage { expected: Stage, actual: Stage },

    #[error("Stage {0} is already clocked in for this visit")]
    AlreadyClockedIn(Stage),

    #[error("No next stage after {0}")]
    InvalidWorkflow(Stage),

    #[error("Visit is {0}, not in progress")]
    VisitNotInProgress(VisitStatus),

    #[error("Returned visits are completed via checkout, not handoff")]
    CheckoutRequired,

    #[error("Missing or invalid field: {0}")]
    Validation(String),

    #[error("Payment amount must be positive")]
    InvalidAmount,

    #[error("Payment of {amount} exceeds outstanding balance of {balance}")]
    PaymentExceedsBalance { amount: i64, balance: i64 },

    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(e: rusqlite::Error) -> Self {
        WorkflowError::Db(DbError::Sqlite(e))
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// The engine: immutable configuration plus the notification sink. All
/// visit state lives in the database; the engine itself is stateless and
/// cheap to construct per request.
pub struct WorkflowEngine<'a> {
    registry: &'a StageRegistry,
    fees: &'a FeeSchedule,
    notifier: &'a dyn Notifier,
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(
        registry: &'a StageRegistry,
        fees: &'a FeeSchedule,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            registry,
            fees,
            notifier,
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        self.registry
    }

    /// Load a visit that must exist and still be in progress.
    pub(crate) fn load_in_progress(&self, db: &Database, visit_id: &str) -> WorkflowResult<Visit> {
        let visit = db
            .get_visit(visit_id)?
            .ok_or_else(|| WorkflowError::VisitNotFound(visit_id.to_string()))?;
        if !visit.is_in_progress() {
            return Err(WorkflowError::VisitNotInProgress(visit.status));
        }
        Ok(visit)
    }

    /// Load a visit regardless of status.
    pub fn reload(&self, db: &Database, visit_id: &str) -> WorkflowResult<Visit> {
        db.get_visit(visit_id)?
            .ok_or_else(|| WorkflowError::VisitNotFound(visit_id.to_string()))
    }

    /// Best-effort fan-out to the staff who now own the visit. Failures are
    /// logged and swallowed; the committed transition stands.
    pub(crate) fn notify_stage(&self, db: &Database, visit: &Visit, target: Stage) {
        let Some(role) = self.registry.required_role(target) else {
            return;
        };

        let recipients = match db.list_active_staff(role, &visit.branch_id) {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(
                    visit = %visit.visit_number,
                    stage = %target,
                    "Could not look up notification recipients: {e}"
                );
                return;
            }
        };
        if recipients.is_empty() {
            debug!(visit = %visit.visit_number, stage = %target, "No active staff to notify");
            return;
        }

        for member in recipients {
            let notification = StageNotification::new(
                &visit.visit_id,
                &visit.visit_number,
                &visit.branch_id,
                target,
                &member.staff_id,
            );
            if let Err(e) = self.notifier.deliver(db.conn(), &notification) {
                warn!(
                    visit = %visit.visit_number,
                    recipient = %member.staff_id,
                    "Notification delivery failed: {e}"
                );
            }
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
