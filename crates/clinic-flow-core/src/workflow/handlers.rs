//! Stage action handlers: the fused clock-in/advance for the nurse, doctor,
//! lab, and pharmacy stages.
//!
//! Arriving at a department and completing its work is one action for the
//! occupant: the handler stamps clock-in and clock-out together, stores the
//! stage payload, and advances the visit in the same transaction. The
//! conditional insert of the stage record is the concurrency guard: of N
//! racing clock-ins, one wins and the rest get `AlreadyClockedIn`.

use tracing::debug;

use crate::db::{visits, Database};
use crate::models::{
    Actor, DispensedItem, LabResultEntry, Stage, StagePayload, Visit, VitalSigns,
};

use super::registry::TransitionPolicy;
use super::{guard, now_rfc3339, WorkflowEngine, WorkflowError, WorkflowResult};

enum FusedOutcome {
    Committed,
    AlreadyClockedIn,
    MovedUnderneath,
}

impl<'a> WorkflowEngine<'a> {
    /// Nurse captures vital signs; visit advances to the doctor.
    pub fn clock_in_nurse(
        &self,
        db: &mut Database,
        visit_id: &str,
        actor: &Actor,
        vital_signs: VitalSigns,
        notes: Option<String>,
    ) -> WorkflowResult<Visit> {
        if vital_signs.is_empty() {
            return Err(WorkflowError::Validation("vital_signs".into()));
        }
        self.fused_clock_in(
            db,
            visit_id,
            actor,
            Stage::Nurse,
            StagePayload::Vitals { vital_signs },
            notes,
        )
    }

    /// Doctor records the consultation; visit advances to the lab.
    pub fn clock_in_doctor(
        &self,
        db: &mut Database,
        visit_id: &str,
        actor: &Actor,
        diagnosis: String,
        prescription_ids: Vec<String>,
        lab_order_ids: Vec<String>,
        notes: Option<String>,
    ) -> WorkflowResult<Visit> {
        if diagnosis.trim().is_empty() {
            return Err(WorkflowError::Validation("diagnosis".into()));
        }
        self.fused_clock_in(
            db,
            visit_id,
            actor,
            Stage::Doctor,
            StagePayload::Consultation {
                diagnosis,
                prescription_ids,
                lab_order_ids,
            },
            notes,
        )
    }

    /// Lab technician enters results; visit advances to the pharmacy.
    pub fn clock_in_lab(
        &self,
        db: &mut Database,
        visit_id: &str,
        actor: &Actor,
        results: Vec<LabResultEntry>,
        notes: Option<String>,
    ) -> WorkflowResult<Visit> {
        if results.is_empty() {
            return Err(WorkflowError::Validation("results".into()));
        }
        if results.iter().any(|r| r.test_name.trim().is_empty()) {
            return Err(WorkflowError::Validation("results.test_name".into()));
        }
        self.fused_clock_in(
            db,
            visit_id,
            actor,
            Stage::Lab,
            StagePayload::LabResults { results },
            notes,
        )
    }

    /// Pharmacist dispenses; visit advances to billing.
    pub fn clock_in_pharmacy(
        &self,
        db: &mut Database,
        visit_id: &str,
        actor: &Actor,
        items: Vec<DispensedItem>,
        notes: Option<String>,
    ) -> WorkflowResult<Visit> {
        if items.is_empty() {
            return Err(WorkflowError::Validation("items".into()));
        }
        if items.iter().any(|i| i.quantity <= 0.0) {
            return Err(WorkflowError::Validation("items.quantity".into()));
        }
        self.fused_clock_in(
            db,
            visit_id,
            actor,
            Stage::Pharmacy,
            StagePayload::Dispense { items },
            notes,
        )
    }

    /// Shared precondition contract and the single fused transition.
    fn fused_clock_in(
        &self,
        db: &mut Database,
        visit_id: &str,
        actor: &Actor,
        stage: Stage,
        payload: StagePayload,
        notes: Option<String>,
    ) -> WorkflowResult<Visit> {
        guard::authorize(self.registry(), actor.role, stage)?;

        let visit = self.load_in_progress(db, visit_id)?;
        if visit.current_stage != stage {
            return Err(WorkflowError::WrongStage {
                expected: stage,
                actual: visit.current_stage,
            });
        }
        let target = self
            .registry()
            .next_stage(stage)
            .ok_or(WorkflowError::InvalidWorkflow(stage))?;

        let now = now_rfc3339();
        let outcome = {
            let tx = db.transaction()?;
            if !visits::insert_closed_stage(
                &tx,
                visit_id,
                stage,
                &actor.staff_id,
                &now,
                notes.as_deref(),
                Some(&payload),
            )? {
                FusedOutcome::AlreadyClockedIn
            } else if !visits::advance_visit_stage(&tx, visit_id, stage, target, &now)? {
                FusedOutcome::MovedUnderneath
            } else {
                tx.commit()?;
                FusedOutcome::Committed
            }
        };

        match outcome {
            FusedOutcome::AlreadyClockedIn => Err(WorkflowError::AlreadyClockedIn(stage)),
            FusedOutcome::MovedUnderneath => {
                // Another request advanced the visit between our read and
                // write; report where it actually is now.
                let actual = self.reload(db, visit_id)?.current_stage;
                Err(WorkflowError::WrongStage {
                    expected: stage,
                    actual,
                })
            }
            FusedOutcome::Committed => {
                debug!(visit = %visit.visit_number, from = %stage, to = %target, "Stage handled");
                self.notify_stage(db, &visit, target);
                self.reload(db, visit_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeeSchedule, StaffRole, VisitStatus};
    use crate::notify::NullNotifier;
    use crate::workflow::{NewVisit, StageRegistry};

    fn actor(role: StaffRole) -> Actor {
        Actor {
            staff_id: format!("{}-1", role),
            name: format!("{} one", role),
            role,
            branch_id: "branch-1".into(),
        }
    }

    fn vitals() -> VitalSigns {
        VitalSigns {
            temperature_c: Some(36.8),
            pulse_bpm: Some(72),
            ..Default::default()
        }
    }

    struct Fixture {
        db: Database,
        registry: StageRegistry,
        fees: FeeSchedule,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                db: Database::open_in_memory().unwrap(),
                registry: StageRegistry::new(),
                fees: FeeSchedule::default(),
            }
        }

        fn with_engine<T>(
            &mut self,
            f: impl FnOnce(&WorkflowEngine<'_>, &mut Database) -> T,
        ) -> T {
            let notifier = NullNotifier;
            let engine = WorkflowEngine::new(&self.registry, &self.fees, &notifier);
            f(&engine, &mut self.db)
        }

        fn start_visit(&mut self) -> Visit {
            self.with_engine(|engine, db| {
                engine
                    .start_visit(
                        db,
                        NewVisit {
                            patient_id: "patient-1".into(),
                            branch_id: "branch-1".into(),
                            appointment_id: None,
                            assigned_doctor_id: None,
                        },
                        &actor(StaffRole::FrontDesk),
                    )
                    .unwrap()
            })
        }

        /// Walk a fresh visit up to the given stage using the real actions.
        fn visit_at(&mut self, stage: Stage) -> Visit {
            let visit = self.start_visit();
            let id = visit.visit_id.clone();
            if stage == Stage::FrontDesk {
                return visit;
            }
            self.with_engine(|engine, db| {
                engine
                    .handoff(db, &id, &actor(StaffRole::FrontDesk), None)
                    .unwrap();
                if stage == Stage::Nurse {
                    return;
                }
                engine
                    .clock_in_nurse(db, &id, &actor(StaffRole::Nurse), vitals(), None)
                    .unwrap();
                if stage == Stage::Doctor {
                    return;
                }
                engine
                    .clock_in_doctor(
                        db,
                        &id,
                        &actor(StaffRole::Doctor),
                        "Malaria, uncomplicated".into(),
                        vec!["rx-1".into()],
                        vec!["lab-1".into()],
                        None,
                    )
                    .unwrap();
                if stage == Stage::Lab {
                    return;
                }
                engine
                    .clock_in_lab(
                        db,
                        &id,
                        &actor(StaffRole::LabTechnician),
                        vec![LabResultEntry {
                            test_name: "Blood smear".into(),
                            result: "Positive".into(),
                            unit: None,
                            reference_range: None,
                        }],
                        None,
                    )
                    .unwrap();
                if stage == Stage::Pharmacy {
                    return;
                }
                engine
                    .clock_in_pharmacy(
                        db,
                        &id,
                        &actor(StaffRole::Pharmacist),
                        vec![DispensedItem {
                            name: "Artemether".into(),
                            quantity: 1.0,
                            instructions: None,
                        }],
                        None,
                    )
                    .unwrap();
            });
            self.with_engine(|engine, db| engine.reload(db, &id).unwrap())
        }
    }

    #[test]
    fn test_nurse_clock_in_advances_to_doctor() {
        let mut fx = Fixture::new();
        let visit = fx.visit_at(Stage::Nurse);

        let updated = fx.with_engine(|engine, db| {
            engine
                .clock_in_nurse(db, &visit.visit_id, &actor(StaffRole::Nurse), vitals(), None)
                .unwrap()
        });

        assert_eq!(updated.current_stage, Stage::Doctor);
        let record = updated.stage_record(Stage::Nurse).unwrap();
        assert!(!record.is_open());
        assert!(matches!(
            record.payload,
            Some(StagePayload::Vitals { .. })
        ));
    }

    #[test]
    fn test_nurse_clock_in_at_front_desk_is_wrong_stage() {
        let mut fx = Fixture::new();
        let visit = fx.start_visit();

        let err = fx.with_engine(|engine, db| {
            engine
                .clock_in_nurse(db, &visit.visit_id, &actor(StaffRole::Nurse), vitals(), None)
                .unwrap_err()
        });

        assert!(matches!(
            err,
            WorkflowError::WrongStage {
                expected: Stage::Nurse,
                actual: Stage::FrontDesk
            }
        ));
    }

    #[test]
    fn test_doctor_requires_diagnosis() {
        let mut fx = Fixture::new();
        let visit = fx.visit_at(Stage::Doctor);

        let err = fx.with_engine(|engine, db| {
            engine
                .clock_in_doctor(
                    db,
                    &visit.visit_id,
                    &actor(StaffRole::Doctor),
                    "   ".into(),
                    vec![],
                    vec![],
                    None,
                )
                .unwrap_err()
        });
        assert!(matches!(err, WorkflowError::Validation(field) if field == "diagnosis"));

        // Visit untouched
        let unchanged = fx.with_engine(|engine, db| engine.reload(db, &visit.visit_id).unwrap());
        assert_eq!(unchanged.current_stage, Stage::Doctor);
        assert!(unchanged.stage_record(Stage::Doctor).is_none());
    }

    #[test]
    fn test_second_clock_in_is_rejected() {
        let mut fx = Fixture::new();
        let visit = fx.visit_at(Stage::Nurse);

        fx.with_engine(|engine, db| {
            engine
                .clock_in_nurse(db, &visit.visit_id, &actor(StaffRole::Nurse), vitals(), None)
                .unwrap();
        });

        // Retry after the visit advanced: stage no longer matches
        let err = fx.with_engine(|engine, db| {
            engine
                .clock_in_nurse(db, &visit.visit_id, &actor(StaffRole::Nurse), vitals(), None)
                .unwrap_err()
        });
        assert!(matches!(err, WorkflowError::WrongStage { .. }));
    }

    #[test]
    fn test_wrong_role_for_handler_is_forbidden() {
        let mut fx = Fixture::new();
        let visit = fx.visit_at(Stage::Nurse);

        let err = fx.with_engine(|engine, db| {
            engine
                .clock_in_nurse(
                    db,
                    &visit.visit_id,
                    &actor(StaffRole::Pharmacist),
                    vitals(),
                    None,
                )
                .unwrap_err()
        });
        assert!(matches!(err, WorkflowError::Forbidden { .. }));
    }

    #[test]
    fn test_admin_can_run_any_handler() {
        let mut fx = Fixture::new();
        let visit = fx.visit_at(Stage::Nurse);

        let updated = fx.with_engine(|engine, db| {
            engine
                .clock_in_nurse(db, &visit.visit_id, &actor(StaffRole::Admin), vitals(), None)
                .unwrap()
        });
        assert_eq!(updated.current_stage, Stage::Doctor);
    }

    #[test]
    fn test_lab_requires_results() {
        let mut fx = Fixture::new();
        let visit = fx.visit_at(Stage::Lab);

        let err = fx.with_engine(|engine, db| {
            engine
                .clock_in_lab(
                    db,
                    &visit.visit_id,
                    &actor(StaffRole::LabTechnician),
                    vec![],
                    None,
                )
                .unwrap_err()
        });
        assert!(matches!(err, WorkflowError::Validation(field) if field == "results"));
    }

    #[test]
    fn test_pharmacy_rejects_zero_quantity() {
        let mut fx = Fixture::new();
        let visit = fx.visit_at(Stage::Pharmacy);

        let err = fx.with_engine(|engine, db| {
            engine
                .clock_in_pharmacy(
                    db,
                    &visit.visit_id,
                    &actor(StaffRole::Pharmacist),
                    vec![DispensedItem {
                        name: "Paracetamol".into(),
                        quantity: 0.0,
                        instructions: None,
                    }],
                    None,
                )
                .unwrap_err()
        });
        assert!(matches!(err, WorkflowError::Validation(field) if field == "items.quantity"));
    }

    #[test]
    fn test_cancelled_visit_rejects_handlers() {
        let mut fx = Fixture::new();
        let visit = fx.visit_at(Stage::Nurse);

        fx.with_engine(|engine, db| {
            engine
                .cancel(db, &visit.visit_id, &actor(StaffRole::Admin), None)
                .unwrap();
        });

        let err = fx.with_engine(|engine, db| {
            engine
                .clock_in_nurse(db, &visit.visit_id, &actor(StaffRole::Nurse), vitals(), None)
                .unwrap_err()
        });
        assert!(matches!(
            err,
            WorkflowError::VisitNotInProgress(VisitStatus::Cancelled)
        ));
    }
}
