//! Visit aggregate: one clinical encounter for one patient at one branch.

use serde::{Deserialize, Serialize};

use super::stage::{Stage, VisitStatus};

/// A patient visit moving through the department pipeline.
///
/// `current_stage` only advances through the workflow engine; the stage
/// records are the per-department audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    /// Unique visit ID (UUID)
    pub visit_id: String,
    /// Human-readable visit number, unique per database
    pub visit_number: String,
    /// Patient reference (directory is an external collaborator)
    pub patient_id: String,
    /// Branch the visit takes place at
    pub branch_id: String,
    /// Linked appointment, if not a walk-in
    pub appointment_id: Option<String>,
    /// Doctor assigned at check-in, if any
    pub assigned_doctor_id: Option<String>,
    /// Department the visit currently sits at
    pub current_stage: Stage,
    /// Overall status; `Completed` iff `current_stage == Completed`
    pub status: VisitStatus,
    /// Date the visit started (queue ordering key)
    pub visit_date: String,
    /// Per-stage audit records, at most one per stage
    pub stages: Vec<StageRecord>,
    /// Terminal record, set only at checkout
    pub final_clock_out: Option<FinalClockOut>,
    pub created_at: String,
    pub updated_at: String,
}

impl Visit {
    /// Create a new visit sitting at the front desk.
    pub fn new(patient_id: String, branch_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            visit_id: uuid::Uuid::new_v4().to_string(),
            visit_number: generate_visit_number(),
            patient_id,
            branch_id,
            appointment_id: None,
            assigned_doctor_id: None,
            current_stage: Stage::FrontDesk,
            status: VisitStatus::InProgress,
            visit_date: now.clone(),
            stages: Vec::new(),
            final_clock_out: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == VisitStatus::InProgress
    }

    /// Audit record for a given stage, if that stage has been clocked.
    pub fn stage_record(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

/// Who handled a stage and when, plus the stage-specific data they captured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub stage: Stage,
    pub clocked_in_by: String,
    pub clocked_in_at: String,
    pub clocked_out_by: Option<String>,
    pub clocked_out_at: Option<String>,
    pub notes: Option<String>,
    pub payload: Option<StagePayload>,
}

impl StageRecord {
    pub fn is_open(&self) -> bool {
        self.clocked_out_at.is_none()
    }
}

/// Stage-specific data, tagged by the kind of work done.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Vitals {
        vital_signs: VitalSigns,
    },
    Consultation {
        diagnosis: String,
        prescription_ids: Vec<String>,
        lab_order_ids: Vec<String>,
    },
    LabResults {
        results: Vec<LabResultEntry>,
    },
    Dispense {
        items: Vec<DispensedItem>,
    },
    BillingPayment {
        invoice_id: String,
        payment_reference: String,
    },
}

/// Vital signs captured by the nurse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VitalSigns {
    pub temperature_c: Option<f64>,
    pub pulse_bpm: Option<u32>,
    pub systolic_mmhg: Option<u32>,
    pub diastolic_mmhg: Option<u32>,
    pub respiratory_rate: Option<u32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
}

impl VitalSigns {
    /// True when no measurement was recorded at all.
    pub fn is_empty(&self) -> bool {
        self.temperature_c.is_none()
            && self.pulse_bpm.is_none()
            && self.systolic_mmhg.is_none()
            && self.diastolic_mmhg.is_none()
            && self.respiratory_rate.is_none()
            && self.weight_kg.is_none()
            && self.height_cm.is_none()
    }
}

/// A single lab result entered by the lab technician.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabResultEntry {
    pub test_name: String,
    pub result: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

/// A single item dispensed by the pharmacist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispensedItem {
    pub name: String,
    pub quantity: f64,
    pub instructions: Option<String>,
}

/// Terminal record written when the front desk checks the visit out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalClockOut {
    pub clocked_out_by: String,
    pub clocked_out_at: String,
    pub notes: Option<String>,
}

/// Generate a human-readable visit number.
pub fn generate_visit_number() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("VST-{}", id[..10].to_uppercase())
}
