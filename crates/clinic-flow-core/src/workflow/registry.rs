//! Stage registry: the authoritative transition table, role assignments,
//! and display metadata. Immutable, constructed once, injected into the
//! engine.

use crate::models::{Stage, StaffRole};

/// Decides which stage follows which.
pub trait TransitionPolicy {
    /// The canonical successor, or `None` for terminal stages.
    fn next_stage(&self, stage: Stage) -> Option<Stage>;

    /// Stages a visit may move to from here. With the linear pipeline this
    /// is the singleton successor set; kept separate so clients render
    /// choices from the same table the engine enforces.
    fn allowed_transitions(&self, stage: Stage) -> Vec<Stage> {
        self.next_stage(stage).into_iter().collect()
    }
}

/// The single transition policy: a strict linear pipeline. `Completed` is
/// never a handoff target; it is reached only through the checkout action.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry;

impl StageRegistry {
    pub fn new() -> Self {
        Self
    }

    /// The one role allowed to act as the occupant of a stage. Admins bypass
    /// this table. `Completed` has no occupant.
    pub fn required_role(&self, stage: Stage) -> Option<StaffRole> {
        match stage {
            Stage::FrontDesk => Some(StaffRole::FrontDesk),
            Stage::Nurse => Some(StaffRole::Nurse),
            Stage::Doctor => Some(StaffRole::Doctor),
            Stage::Lab => Some(StaffRole::LabTechnician),
            Stage::Pharmacy => Some(StaffRole::Pharmacist),
            Stage::Billing => Some(StaffRole::BillingClerk),
            // Returned visits are the front desk's to finish
            Stage::ReturnedToFrontDesk => Some(StaffRole::FrontDesk),
            Stage::Completed => None,
        }
    }

    /// The stage a role occupies. Front desk staff own the check-in stage;
    /// returned visits are found through the checkout path. Admin has no
    /// home stage.
    pub fn stage_for_role(&self, role: StaffRole) -> Option<Stage> {
        match role {
            StaffRole::FrontDesk => Some(Stage::FrontDesk),
            StaffRole::Nurse => Some(Stage::Nurse),
            StaffRole::Doctor => Some(Stage::Doctor),
            StaffRole::LabTechnician => Some(Stage::Lab),
            StaffRole::Pharmacist => Some(Stage::Pharmacy),
            StaffRole::BillingClerk => Some(Stage::Billing),
            StaffRole::Admin => None,
        }
    }

    /// Display metadata for clients.
    pub fn display_name(&self, stage: Stage) -> &'static str {
        match stage {
            Stage::FrontDesk => "Front Desk",
            Stage::Nurse => "Nursing Station",
            Stage::Doctor => "Consultation",
            Stage::Lab => "Laboratory",
            Stage::Pharmacy => "Pharmacy",
            Stage::Billing => "Billing",
            Stage::ReturnedToFrontDesk => "Returned to Front Desk",
            Stage::Completed => "Completed",
        }
    }
}

impl TransitionPolicy for StageRegistry {
    fn next_stage(&self, stage: Stage) -> Option<Stage> {
        match stage {
            Stage::FrontDesk => Some(Stage::Nurse),
            Stage::Nurse => Some(Stage::Doctor),
            Stage::Doctor => Some(Stage::Lab),
            Stage::Lab => Some(Stage::Pharmacy),
            Stage::Pharmacy => Some(Stage::Billing),
            Stage::Billing => Some(Stage::ReturnedToFrontDesk),
            Stage::ReturnedToFrontDesk => None,
            Stage::Completed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_chain_reaches_returned() {
        let registry = StageRegistry::new();

        let mut stage = Stage::FrontDesk;
        let mut hops = 0;
        while let Some(next) = registry.next_stage(stage) {
            stage = next;
            hops += 1;
        }
        assert_eq!(stage, Stage::ReturnedToFrontDesk);
        assert_eq!(hops, 6);
    }

    #[test]
    fn test_terminal_stages_have_no_successor() {
        let registry = StageRegistry::new();
        assert_eq!(registry.next_stage(Stage::ReturnedToFrontDesk), None);
        assert_eq!(registry.next_stage(Stage::Completed), None);
    }

    #[test]
    fn test_allowed_transitions_match_next() {
        let registry = StageRegistry::new();
        for stage in Stage::all() {
            let allowed = registry.allowed_transitions(stage);
            match registry.next_stage(stage) {
                Some(next) => assert_eq!(allowed, vec![next]),
                None => assert!(allowed.is_empty()),
            }
        }
    }

    #[test]
    fn test_role_stage_tables_are_inverse() {
        let registry = StageRegistry::new();
        for stage in Stage::all() {
            if let Some(role) = registry.required_role(stage) {
                // ReturnedToFrontDesk maps back to the front desk's home stage
                let home = registry.stage_for_role(role).unwrap();
                if stage != Stage::ReturnedToFrontDesk {
                    assert_eq!(home, stage);
                }
            }
        }
        assert_eq!(registry.stage_for_role(StaffRole::Admin), None);
    }

    #[test]
    fn test_returned_stage_owned_by_front_desk() {
        let registry = StageRegistry::new();
        assert_eq!(
            registry.required_role(Stage::ReturnedToFrontDesk),
            Some(StaffRole::FrontDesk)
        );
        assert_eq!(registry.required_role(Stage::Completed), None);
    }
}
