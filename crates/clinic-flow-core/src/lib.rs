//! Clinic-Flow Core Library
//!
//! Local-first patient visit workflow engine for multi-department clinics.
//!
//! # Architecture
//!
//! ```text
//! Front Desk → Nurse → Doctor → Lab → Pharmacy → Billing
//!      ▲                                            │
//!      │            invoice + payment               │
//!      └──────── Returned to Front Desk ◄───────────┘
//!                        │
//!                    Checkout
//!                        │
//!                    Completed
//! ```
//!
//! # Core Principle
//!
//! **Every transition is a guarded, conditional write.** A visit moves
//! forward only when the acting role owns the stage, the visit still sits
//! there, and the stage has not been clocked before. Races lose cleanly.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer, conditional writes for all transitions
//! - [`models`]: Domain types (Visit, StageRecord, Invoice, Payment, etc.)
//! - [`workflow`]: The stage engine (handlers, handoff, billing, queue)
//! - [`notify`]: Best-effort stage notifications

pub mod db;
pub mod models;
pub mod notify;
pub mod workflow;

// Re-export commonly used types
pub use db::Database;
pub use models::{
    Actor, DispensedItem, FeeSchedule, Invoice, InvoiceStatus, LabResultEntry, Payment,
    PaymentMethod, Stage, StaffMember, StaffRole, Visit, VisitStatus, VitalSigns,
};
pub use workflow::{
    BillingOutcome, NewVisit, QueuePage, StageRegistry, TransitionPolicy, WorkflowEngine,
    WorkflowError,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use notify::OutboxNotifier;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicFlowError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Wrong stage: {0}")]
    WrongStage(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Payment error: {0}")]
    PaymentError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<WorkflowError> for ClinicFlowError {
    fn from(e: WorkflowError) -> Self {
        let message = e.to_string();
        match e {
            WorkflowError::VisitNotFound(_) | WorkflowError::InvoiceNotFound(_) => {
                ClinicFlowError::NotFound(message)
            }
            WorkflowError::Forbidden { .. } => ClinicFlowError::Forbidden(message),
            WorkflowError::WrongStage { .. }
            | WorkflowError::InvalidWorkflow(_)
            | WorkflowError::CheckoutRequired => ClinicFlowError::WrongStage(message),
            WorkflowError::AlreadyClockedIn(_) | WorkflowError::VisitNotInProgress(_) => {
                ClinicFlowError::Conflict(message)
            }
            WorkflowError::Validation(_) => ClinicFlowError::Validation(message),
            WorkflowError::InvalidAmount | WorkflowError::PaymentExceedsBalance { .. } => {
                ClinicFlowError::PaymentError(message)
            }
            WorkflowError::Db(_) => ClinicFlowError::DatabaseError(message),
        }
    }
}

impl From<db::DbError> for ClinicFlowError {
    fn from(e: db::DbError) -> Self {
        ClinicFlowError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicFlowError {
    fn from(e: serde_json::Error) -> Self {
        ClinicFlowError::DatabaseError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicFlowError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicFlowError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicFlowCore>, ClinicFlowError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(ClinicFlowCore::with_db(db)))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicFlowCore>, ClinicFlowError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicFlowCore::with_db(db)))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe workflow engine wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicFlowCore {
    db: Arc<Mutex<Database>>,
    registry: StageRegistry,
    fees: FeeSchedule,
    notifier: OutboxNotifier,
}

impl ClinicFlowCore {
    fn with_db(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            registry: StageRegistry::new(),
            fees: FeeSchedule::default(),
            notifier: OutboxNotifier,
        }
    }

    fn engine(&self) -> WorkflowEngine<'_> {
        WorkflowEngine::new(&self.registry, &self.fees, &self.notifier)
    }
}

#[uniffi::export]
impl ClinicFlowCore {
    // =========================================================================
    // Visit Lifecycle
    // =========================================================================

    /// Register a visit at the front desk.
    pub fn start_visit(
        &self,
        new_visit: FfiNewVisit,
        actor: FfiActor,
    ) -> Result<FfiVisit, ClinicFlowError> {
        let actor = actor.try_into()?;
        let mut db = self.db.lock()?;
        let visit = self.engine().start_visit(&mut db, new_visit.into(), &actor)?;
        Ok(visit.into())
    }

    /// Get a visit with its full stage history.
    pub fn get_visit(&self, visit_id: String) -> Result<Option<FfiVisit>, ClinicFlowError> {
        let db = self.db.lock()?;
        let visit = db.get_visit(&visit_id)?;
        Ok(visit.map(|v| v.into()))
    }

    /// Hand a visit off from the actor's stage to the next department.
    pub fn handoff(
        &self,
        visit_id: String,
        actor: FfiActor,
        notes: Option<String>,
    ) -> Result<FfiVisit, ClinicFlowError> {
        let actor = actor.try_into()?;
        let mut db = self.db.lock()?;
        let visit = self.engine().handoff(&mut db, &visit_id, &actor, notes)?;
        Ok(visit.into())
    }

    /// Final checkout at the front desk.
    pub fn checkout(
        &self,
        visit_id: String,
        actor: FfiActor,
        notes: Option<String>,
    ) -> Result<FfiVisit, ClinicFlowError> {
        let actor = actor.try_into()?;
        let mut db = self.db.lock()?;
        let visit = self.engine().checkout(&mut db, &visit_id, &actor, notes)?;
        Ok(visit.into())
    }

    /// Cancel an in-progress visit.
    pub fn cancel_visit(
        &self,
        visit_id: String,
        actor: FfiActor,
        reason: Option<String>,
    ) -> Result<FfiVisit, ClinicFlowError> {
        let actor = actor.try_into()?;
        let mut db = self.db.lock()?;
        let visit = self.engine().cancel(&mut db, &visit_id, &actor, reason)?;
        Ok(visit.into())
    }

    // =========================================================================
    // Stage Handlers
    // =========================================================================

    /// Nurse: record vital signs and advance to the doctor.
    pub fn clock_in_nurse(
        &self,
        visit_id: String,
        actor: FfiActor,
        vital_signs: FfiVitalSigns,
        notes: Option<String>,
    ) -> Result<FfiVisit, ClinicFlowError> {
        let actor = actor.try_into()?;
        let mut db = self.db.lock()?;
        let visit =
            self.engine()
                .clock_in_nurse(&mut db, &visit_id, &actor, vital_signs.into(), notes)?;
        Ok(visit.into())
    }

    /// Doctor: record the consultation and advance to the lab.
    pub fn clock_in_doctor(
        &self,
        visit_id: String,
        actor: FfiActor,
        diagnosis: String,
        prescription_ids: Vec<String>,
        lab_order_ids: Vec<String>,
        notes: Option<String>,
    ) -> Result<FfiVisit, ClinicFlowError> {
        let actor = actor.try_into()?;
        let mut db = self.db.lock()?;
        let visit = self.engine().clock_in_doctor(
            &mut db,
            &visit_id,
            &actor,
            diagnosis,
            prescription_ids,
            lab_order_ids,
            notes,
        )?;
        Ok(visit.into())
    }

    /// Lab technician: enter results and advance to the pharmacy.
    pub fn clock_in_lab(
        &self,
        visit_id: String,
        actor: FfiActor,
        results: Vec<FfiLabResult>,
        notes: Option<String>,
    ) -> Result<FfiVisit, ClinicFlowError> {
        let actor = actor.try_into()?;
        let mut db = self.db.lock()?;
        let results = results.into_iter().map(|r| r.into()).collect();
        let visit = self
            .engine()
            .clock_in_lab(&mut db, &visit_id, &actor, results, notes)?;
        Ok(visit.into())
    }

    /// Pharmacist: record dispensed items and advance to billing.
    pub fn clock_in_pharmacy(
        &self,
        visit_id: String,
        actor: FfiActor,
        items: Vec<FfiDispensedItem>,
        notes: Option<String>,
    ) -> Result<FfiVisit, ClinicFlowError> {
        let actor = actor.try_into()?;
        let mut db = self.db.lock()?;
        let items = items.into_iter().map(|i| i.into()).collect();
        let visit = self
            .engine()
            .clock_in_pharmacy(&mut db, &visit_id, &actor, items, notes)?;
        Ok(visit.into())
    }

    // =========================================================================
    // Billing
    // =========================================================================

    /// Billing clerk: settle the invoice and return the visit to the front
    /// desk. `amount` is in minor currency units (cents).
    pub fn clock_in_billing(
        &self,
        visit_id: String,
        amount: i64,
        method: String,
        actor: FfiActor,
        notes: Option<String>,
    ) -> Result<FfiBillingOutcome, ClinicFlowError> {
        let actor = actor.try_into()?;
        let method = PaymentMethod::parse(&method)
            .ok_or_else(|| ClinicFlowError::Validation(format!("Unknown payment method: {}", method)))?;
        let mut db = self.db.lock()?;
        let outcome =
            self.engine()
                .clock_in_billing(&mut db, &visit_id, amount, method, &actor, notes)?;
        Ok(outcome.into())
    }

    /// Get the invoice for a visit, if billing has generated one.
    pub fn get_invoice_for_visit(
        &self,
        visit_id: String,
    ) -> Result<Option<FfiInvoice>, ClinicFlowError> {
        let db = self.db.lock()?;
        let invoice = db.get_invoice_by_visit(&visit_id)?;
        Ok(invoice.map(|i| i.into()))
    }

    /// List payments applied to an invoice, oldest first.
    pub fn list_payments(&self, invoice_id: String) -> Result<Vec<FfiPayment>, ClinicFlowError> {
        let db = self.db.lock()?;
        let payments = db.list_payments_for_invoice(&invoice_id)?;
        Ok(payments.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// List in-progress visits waiting at a stage, oldest first. `page` is
    /// 1-based.
    pub fn list_queue(
        &self,
        actor: FfiActor,
        page: u32,
        per_page: u32,
        stage_filter: Option<String>,
        branch_filter: Option<String>,
    ) -> Result<FfiQueuePage, ClinicFlowError> {
        let actor = actor.try_into()?;
        let stage = stage_filter
            .map(|s| {
                Stage::parse(&s)
                    .ok_or_else(|| ClinicFlowError::Validation(format!("Unknown stage: {}", s)))
            })
            .transpose()?;
        let db = self.db.lock()?;
        let page = self.engine().list_queue(
            &db,
            &actor,
            page as usize,
            per_page as usize,
            stage,
            branch_filter.as_deref(),
        )?;
        Ok(page.into())
    }

    // =========================================================================
    // Directory
    // =========================================================================

    /// Add or update a staff directory entry.
    pub fn upsert_staff(&self, member: FfiStaffMember) -> Result<(), ClinicFlowError> {
        let member = member.try_into()?;
        let db = self.db.lock()?;
        db.upsert_staff(&member)?;
        Ok(())
    }

    /// Add or update a linked appointment.
    pub fn upsert_appointment(
        &self,
        appointment: FfiAppointment,
    ) -> Result<(), ClinicFlowError> {
        let db = self.db.lock()?;
        db.upsert_appointment(&appointment.into())?;
        Ok(())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe acting staff identity.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActor {
    pub staff_id: String,
    pub name: String,
    pub role: String,
    pub branch_id: String,
}

impl TryFrom<FfiActor> for Actor {
    type Error = ClinicFlowError;

    fn try_from(actor: FfiActor) -> Result<Self, Self::Error> {
        let role = StaffRole::parse(&actor.role)
            .ok_or_else(|| ClinicFlowError::Validation(format!("Unknown role: {}", actor.role)))?;
        Ok(Actor {
            staff_id: actor.staff_id,
            name: actor.name,
            role,
            branch_id: actor.branch_id,
        })
    }
}

/// FFI-safe new-visit input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewVisit {
    pub patient_id: String,
    pub branch_id: String,
    pub appointment_id: Option<String>,
    pub assigned_doctor_id: Option<String>,
}

impl From<FfiNewVisit> for NewVisit {
    fn from(v: FfiNewVisit) -> Self {
        NewVisit {
            patient_id: v.patient_id,
            branch_id: v.branch_id,
            appointment_id: v.appointment_id,
            assigned_doctor_id: v.assigned_doctor_id,
        }
    }
}

/// FFI-safe vital signs.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVitalSigns {
    pub temperature_c: Option<f64>,
    pub pulse_bpm: Option<u32>,
    pub systolic_mmhg: Option<u32>,
    pub diastolic_mmhg: Option<u32>,
    pub respiratory_rate: Option<u32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
}

impl From<FfiVitalSigns> for VitalSigns {
    fn from(v: FfiVitalSigns) -> Self {
        VitalSigns {
            temperature_c: v.temperature_c,
            pulse_bpm: v.pulse_bpm,
            systolic_mmhg: v.systolic_mmhg,
            diastolic_mmhg: v.diastolic_mmhg,
            respiratory_rate: v.respiratory_rate,
            weight_kg: v.weight_kg,
            height_cm: v.height_cm,
        }
    }
}

/// FFI-safe lab result entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabResult {
    pub test_name: String,
    pub result: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

impl From<FfiLabResult> for LabResultEntry {
    fn from(r: FfiLabResult) -> Self {
        LabResultEntry {
            test_name: r.test_name,
            result: r.result,
            unit: r.unit,
            reference_range: r.reference_range,
        }
    }
}

/// FFI-safe dispensed item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDispensedItem {
    pub name: String,
    pub quantity: f64,
    pub instructions: Option<String>,
}

impl From<FfiDispensedItem> for DispensedItem {
    fn from(i: FfiDispensedItem) -> Self {
        DispensedItem {
            name: i.name,
            quantity: i.quantity,
            instructions: i.instructions,
        }
    }
}

/// FFI-safe stage audit record. The stage payload crosses the boundary as
/// JSON; clients that need it parse the tagged object.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStageRecord {
    pub stage: String,
    pub clocked_in_by: String,
    pub clocked_in_at: String,
    pub clocked_out_by: Option<String>,
    pub clocked_out_at: Option<String>,
    pub notes: Option<String>,
    pub payload_json: Option<String>,
}

impl From<models::StageRecord> for FfiStageRecord {
    fn from(record: models::StageRecord) -> Self {
        let payload_json = record
            .payload
            .as_ref()
            .and_then(|p| serde_json::to_string(p).ok());
        Self {
            stage: record.stage.as_str().to_string(),
            clocked_in_by: record.clocked_in_by,
            clocked_in_at: record.clocked_in_at,
            clocked_out_by: record.clocked_out_by,
            clocked_out_at: record.clocked_out_at,
            notes: record.notes,
            payload_json,
        }
    }
}

/// FFI-safe final checkout record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFinalClockOut {
    pub clocked_out_by: String,
    pub clocked_out_at: String,
    pub notes: Option<String>,
}

impl From<models::FinalClockOut> for FfiFinalClockOut {
    fn from(c: models::FinalClockOut) -> Self {
        Self {
            clocked_out_by: c.clocked_out_by,
            clocked_out_at: c.clocked_out_at,
            notes: c.notes,
        }
    }
}

/// FFI-safe visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub visit_id: String,
    pub visit_number: String,
    pub patient_id: String,
    pub branch_id: String,
    pub appointment_id: Option<String>,
    pub assigned_doctor_id: Option<String>,
    pub current_stage: String,
    pub status: String,
    pub visit_date: String,
    pub stages: Vec<FfiStageRecord>,
    pub final_clock_out: Option<FfiFinalClockOut>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Visit> for FfiVisit {
    fn from(visit: Visit) -> Self {
        Self {
            visit_id: visit.visit_id,
            visit_number: visit.visit_number,
            patient_id: visit.patient_id,
            branch_id: visit.branch_id,
            appointment_id: visit.appointment_id,
            assigned_doctor_id: visit.assigned_doctor_id,
            current_stage: visit.current_stage.as_str().to_string(),
            status: visit.status.as_str().to_string(),
            visit_date: visit.visit_date,
            stages: visit.stages.into_iter().map(|r| r.into()).collect(),
            final_clock_out: visit.final_clock_out.map(|c| c.into()),
            created_at: visit.created_at,
            updated_at: visit.updated_at,
        }
    }
}

/// FFI-safe invoice line item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInvoiceItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: i64,
    pub total: i64,
}

impl From<models::InvoiceItem> for FfiInvoiceItem {
    fn from(item: models::InvoiceItem) -> Self {
        Self {
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total: item.total,
        }
    }
}

/// FFI-safe invoice.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInvoice {
    pub invoice_id: String,
    pub invoice_number: String,
    pub visit_id: String,
    pub patient_id: String,
    pub branch_id: String,
    pub items: Vec<FfiInvoiceItem>,
    pub subtotal: i64,
    pub tax: i64,
    pub discount: i64,
    pub grand_total: i64,
    pub paid_amount: i64,
    pub balance: i64,
    pub status: String,
}

impl From<Invoice> for FfiInvoice {
    fn from(invoice: Invoice) -> Self {
        Self {
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number,
            visit_id: invoice.visit_id,
            patient_id: invoice.patient_id,
            branch_id: invoice.branch_id,
            items: invoice.items.into_iter().map(|i| i.into()).collect(),
            subtotal: invoice.subtotal,
            tax: invoice.tax,
            discount: invoice.discount,
            grand_total: invoice.grand_total,
            paid_amount: invoice.paid_amount,
            balance: invoice.balance,
            status: invoice.status.as_str().to_string(),
        }
    }
}

/// FFI-safe payment ledger entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPayment {
    pub payment_id: String,
    pub reference: String,
    pub invoice_id: String,
    pub visit_id: String,
    pub amount: i64,
    pub method: String,
    pub received_by: String,
    pub payment_date: String,
}

impl From<Payment> for FfiPayment {
    fn from(payment: Payment) -> Self {
        Self {
            payment_id: payment.payment_id,
            reference: payment.reference,
            invoice_id: payment.invoice_id,
            visit_id: payment.visit_id,
            amount: payment.amount,
            method: payment.method.as_str().to_string(),
            received_by: payment.received_by,
            payment_date: payment.payment_date,
        }
    }
}

/// FFI-safe billing settlement result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBillingOutcome {
    pub visit: FfiVisit,
    pub invoice: FfiInvoice,
    pub payment: FfiPayment,
}

impl From<BillingOutcome> for FfiBillingOutcome {
    fn from(outcome: BillingOutcome) -> Self {
        Self {
            visit: outcome.visit.into(),
            invoice: outcome.invoice.into(),
            payment: outcome.payment.into(),
        }
    }
}

/// FFI-safe queue page.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQueuePage {
    pub visits: Vec<FfiVisit>,
    pub page: u32,
    pub per_page: u32,
}

impl From<QueuePage> for FfiQueuePage {
    fn from(page: QueuePage) -> Self {
        Self {
            visits: page.visits.into_iter().map(|v| v.into()).collect(),
            page: page.page as u32,
            per_page: page.per_page as u32,
        }
    }
}

/// FFI-safe staff directory entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStaffMember {
    pub staff_id: String,
    pub name: String,
    pub role: String,
    pub branch_id: String,
    pub active: bool,
}

impl TryFrom<FfiStaffMember> for StaffMember {
    type Error = ClinicFlowError;

    fn try_from(member: FfiStaffMember) -> Result<Self, Self::Error> {
        let role = StaffRole::parse(&member.role)
            .ok_or_else(|| ClinicFlowError::Validation(format!("Unknown role: {}", member.role)))?;
        let now = chrono::Utc::now().to_rfc3339();
        Ok(StaffMember {
            staff_id: member.staff_id,
            name: member.name,
            role,
            branch_id: member.branch_id,
            active: member.active,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

/// FFI-safe linked appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub scheduled_for: Option<String>,
    pub status: String,
}

impl From<FfiAppointment> for db::AppointmentRecord {
    fn from(a: FfiAppointment) -> Self {
        db::AppointmentRecord {
            appointment_id: a.appointment_id,
            patient_id: a.patient_id,
            doctor_id: a.doctor_id,
            scheduled_for: a.scheduled_for,
            status: a.status,
        }
    }
}
