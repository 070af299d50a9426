//! Stage, role, and visit-status vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One department a visit passes through during a clinical encounter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FrontDesk,
    Nurse,
    Doctor,
    Lab,
    Pharmacy,
    Billing,
    ReturnedToFrontDesk,
    Completed,
}

impl Stage {
    /// Stable string code used for SQL storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FrontDesk => "front_desk",
            Stage::Nurse => "nurse",
            Stage::Doctor => "doctor",
            Stage::Lab => "lab",
            Stage::Pharmacy => "pharmacy",
            Stage::Billing => "billing",
            Stage::ReturnedToFrontDesk => "returned_to_front_desk",
            Stage::Completed => "completed",
        }
    }

    /// Parse a stored string code back to a stage.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "front_desk" => Some(Stage::FrontDesk),
            "nurse" => Some(Stage::Nurse),
            "doctor" => Some(Stage::Doctor),
            "lab" => Some(Stage::Lab),
            "pharmacy" => Some(Stage::Pharmacy),
            "billing" => Some(Stage::Billing),
            "returned_to_front_desk" => Some(Stage::ReturnedToFrontDesk),
            "completed" => Some(Stage::Completed),
            _ => None,
        }
    }

    /// All stages, in pipeline order.
    pub fn all() -> [Stage; 8] {
        [
            Stage::FrontDesk,
            Stage::Nurse,
            Stage::Doctor,
            Stage::Lab,
            Stage::Pharmacy,
            Stage::Billing,
            Stage::ReturnedToFrontDesk,
            Stage::Completed,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staff role acting on a visit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    FrontDesk,
    Nurse,
    Doctor,
    LabTechnician,
    Pharmacist,
    BillingClerk,
    Admin,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::FrontDesk => "front_desk",
            StaffRole::Nurse => "nurse",
            StaffRole::Doctor => "doctor",
            StaffRole::LabTechnician => "lab_technician",
            StaffRole::Pharmacist => "pharmacist",
            StaffRole::BillingClerk => "billing_clerk",
            StaffRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "front_desk" => Some(StaffRole::FrontDesk),
            "nurse" => Some(StaffRole::Nurse),
            "doctor" => Some(StaffRole::Doctor),
            "lab_technician" => Some(StaffRole::LabTechnician),
            "pharmacist" => Some(StaffRole::Pharmacist),
            "billing_clerk" => Some(StaffRole::BillingClerk),
            "admin" => Some(StaffRole::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, StaffRole::Admin)
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall visit status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::InProgress => "in_progress",
            VisitStatus::Completed => "completed",
            VisitStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(VisitStatus::InProgress),
            "completed" => Some(VisitStatus::Completed),
            "cancelled" => Some(VisitStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_roundtrip() {
        for stage in Stage::all() {
            assert_eq!(Stage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(Stage::parse("waiting_room"), None);
    }

    #[test]
    fn test_role_roundtrip() {
        let roles = [
            StaffRole::FrontDesk,
            StaffRole::Nurse,
            StaffRole::Doctor,
            StaffRole::LabTechnician,
            StaffRole::Pharmacist,
            StaffRole::BillingClerk,
            StaffRole::Admin,
        ];
        for role in roles {
            assert_eq!(StaffRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(VisitStatus::parse("in_progress"), Some(VisitStatus::InProgress));
        assert_eq!(VisitStatus::parse("done"), None);
    }
}
