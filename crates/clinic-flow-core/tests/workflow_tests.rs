//! End-to-end workflow integration tests: a visit travelling the whole
//! pipeline, plus the guard and race behaviors at each transition.

use rusqlite::Connection;

use clinic_flow_core::db::Database;
use clinic_flow_core::models::{
    Actor, DispensedItem, LabResultEntry, StaffMember, VitalSigns,
};
use clinic_flow_core::notify::{Notifier, NotifyError, NullNotifier, OutboxNotifier, StageNotification};
use clinic_flow_core::workflow::{
    NewVisit, StageRegistry, WorkflowEngine, WorkflowError,
};
use clinic_flow_core::{FeeSchedule, PaymentMethod, Stage, StaffRole, Visit, VisitStatus};

fn actor(role: StaffRole) -> Actor {
    Actor {
        staff_id: format!("{}-1", role),
        name: format!("{} one", role),
        role,
        branch_id: "branch-1".into(),
    }
}

fn new_visit() -> NewVisit {
    NewVisit {
        patient_id: "patient-1".into(),
        branch_id: "branch-1".into(),
        appointment_id: None,
        assigned_doctor_id: None,
    }
}

fn vitals() -> VitalSigns {
    VitalSigns {
        temperature_c: Some(37.1),
        pulse_bpm: Some(68),
        systolic_mmhg: Some(120),
        diastolic_mmhg: Some(80),
        ..Default::default()
    }
}

fn lab_results() -> Vec<LabResultEntry> {
    vec![LabResultEntry {
        test_name: "Complete blood count".into(),
        result: "Normal".into(),
        unit: None,
        reference_range: None,
    }]
}

fn dispensed() -> Vec<DispensedItem> {
    vec![DispensedItem {
        name: "Amoxicillin 500mg".into(),
        quantity: 2.0,
        instructions: Some("Twice daily".into()),
    }]
}

fn with_engine<T>(
    db: &mut Database,
    notifier: &dyn Notifier,
    f: impl FnOnce(&WorkflowEngine<'_>, &mut Database) -> T,
) -> T {
    let registry = StageRegistry::new();
    let fees = FeeSchedule::default();
    let engine = WorkflowEngine::new(&registry, &fees, notifier);
    f(&engine, db)
}

/// Drive a visit through every department, asserting the stage after each
/// action, then check out.
#[test]
fn test_full_visit_round_trip() {
    let mut db = Database::open_in_memory().unwrap();

    let visit = with_engine(&mut db, &NullNotifier, |engine, db| {
        let visit = engine
            .start_visit(db, new_visit(), &actor(StaffRole::FrontDesk))
            .unwrap();
        assert_eq!(visit.current_stage, Stage::FrontDesk);
        let id = visit.visit_id.clone();

        let visit = engine
            .handoff(db, &id, &actor(StaffRole::FrontDesk), None)
            .unwrap();
        assert_eq!(visit.current_stage, Stage::Nurse);

        let visit = engine
            .clock_in_nurse(db, &id, &actor(StaffRole::Nurse), vitals(), None)
            .unwrap();
        assert_eq!(visit.current_stage, Stage::Doctor);

        let visit = engine
            .clock_in_doctor(
                db,
                &id,
                &actor(StaffRole::Doctor),
                "Bacterial pneumonia".into(),
                vec!["rx-1".into()],
                vec!["lab-1".into()],
                None,
            )
            .unwrap();
        assert_eq!(visit.current_stage, Stage::Lab);

        let visit = engine
            .clock_in_lab(db, &id, &actor(StaffRole::LabTechnician), lab_results(), None)
            .unwrap();
        assert_eq!(visit.current_stage, Stage::Pharmacy);

        let visit = engine
            .clock_in_pharmacy(db, &id, &actor(StaffRole::Pharmacist), dispensed(), None)
            .unwrap();
        assert_eq!(visit.current_stage, Stage::Billing);

        let outcome = engine
            .clock_in_billing(
                db,
                &id,
                5500,
                PaymentMethod::Cash,
                &actor(StaffRole::BillingClerk),
                None,
            )
            .unwrap();
        assert_eq!(outcome.visit.current_stage, Stage::ReturnedToFrontDesk);

        engine
            .checkout(db, &id, &actor(StaffRole::FrontDesk), None)
            .unwrap()
    });

    assert_eq!(visit.status, VisitStatus::Completed);
    assert_eq!(visit.current_stage, Stage::Completed);
    assert!(visit.final_clock_out.is_some());

    // Every stage except the terminal one left exactly one closed record
    // with a consistent in/out ordering
    let expected = [
        Stage::FrontDesk,
        Stage::Nurse,
        Stage::Doctor,
        Stage::Lab,
        Stage::Pharmacy,
        Stage::Billing,
        Stage::ReturnedToFrontDesk,
    ];
    assert_eq!(visit.stages.len(), expected.len());
    for stage in expected {
        let record = visit.stage_record(stage).unwrap();
        let out = record.clocked_out_at.as_ref().unwrap();
        assert!(record.clocked_in_at <= *out, "stage {} out of order", stage);
    }
}

/// The invoice derived at billing reflects what the lab and pharmacy
/// actually recorded on the visit.
#[test]
fn test_invoice_items_follow_stage_payloads() {
    let mut db = Database::open_in_memory().unwrap();

    let outcome = with_engine(&mut db, &NullNotifier, |engine, db| {
        let visit = engine
            .start_visit(db, new_visit(), &actor(StaffRole::FrontDesk))
            .unwrap();
        let id = visit.visit_id.clone();

        engine
            .handoff(db, &id, &actor(StaffRole::FrontDesk), None)
            .unwrap();
        engine
            .clock_in_nurse(db, &id, &actor(StaffRole::Nurse), vitals(), None)
            .unwrap();
        engine
            .clock_in_doctor(
                db,
                &id,
                &actor(StaffRole::Doctor),
                "Bacterial pneumonia".into(),
                vec![],
                vec![],
                None,
            )
            .unwrap();
        engine
            .clock_in_lab(db, &id, &actor(StaffRole::LabTechnician), lab_results(), None)
            .unwrap();
        engine
            .clock_in_pharmacy(db, &id, &actor(StaffRole::Pharmacist), dispensed(), None)
            .unwrap();
        engine
            .clock_in_billing(
                db,
                &id,
                1000,
                PaymentMethod::MobileMoney,
                &actor(StaffRole::BillingClerk),
                None,
            )
            .unwrap()
    });

    // Consultation 3000 + one lab test 1500 + 2x dispense item 500
    let invoice = outcome.invoice;
    assert_eq!(invoice.items.len(), 3);
    assert_eq!(invoice.subtotal, 3000 + 1500 + 1000);
    assert_eq!(invoice.grand_total, 5500);
    assert_eq!(invoice.paid_amount, 1000);
    assert_eq!(invoice.balance, 4500);
    assert!(invoice
        .items
        .iter()
        .any(|i| i.description == "Lab: Complete blood count"));
    assert!(invoice
        .items
        .iter()
        .any(|i| i.description == "Pharmacy: Amoxicillin 500mg"));
}

/// A nurse acting on a visit still sitting at the front desk gets a
/// stage error naming where the visit really is, not an authorization
/// error.
#[test]
fn test_premature_department_action_reports_actual_stage() {
    let mut db = Database::open_in_memory().unwrap();

    let err = with_engine(&mut db, &NullNotifier, |engine, db| {
        let visit = engine
            .start_visit(db, new_visit(), &actor(StaffRole::FrontDesk))
            .unwrap();
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

/// Notification fan-out writes to the outbox for the active staff of the
/// target stage, and a failing notifier never rolls the transition back.
#[test]
fn test_notifications_are_best_effort() {
    struct FailingNotifier;
    impl Notifier for FailingNotifier {
        fn deliver(
            &self,
            _conn: &Connection,
            _notification: &StageNotification,
        ) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("transport down".into()))
        }
    }

    let mut db = Database::open_in_memory().unwrap();
    let mut nurse = StaffMember::new("Amina".into(), StaffRole::Nurse, "branch-1".into());
    nurse.staff_id = "nurse-1".into();
    db.upsert_staff(&nurse).unwrap();

    // Outbox path: handing off to the nurse leaves a message for her
    let visit = with_engine(&mut db, &OutboxNotifier, |engine, db| {
        let visit = engine
            .start_visit(db, new_visit(), &actor(StaffRole::FrontDesk))
            .unwrap();
        engine
            .handoff(db, &visit.visit_id, &actor(StaffRole::FrontDesk), None)
            .unwrap()
    });
    let count: i64 = db
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM notifications_outbox WHERE recipient_staff_id = 'nurse-1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);

    // Failing path: the transition still commits
    let visit = with_engine(&mut db, &FailingNotifier, |engine, db| {
        engine
            .clock_in_nurse(db, &visit.visit_id, &actor(StaffRole::Nurse), vitals(), None)
            .unwrap()
    });
    assert_eq!(visit.current_stage, Stage::Doctor);
}

/// Admin can walk a visit through every stage alone, and the pass-through
/// records are zero-duration.
#[test]
fn test_admin_override_full_pipeline() {
    let mut db = Database::open_in_memory().unwrap();

    let visit = with_engine(&mut db, &NullNotifier, |engine, db| {
        let visit = engine
            .start_visit(db, new_visit(), &actor(StaffRole::Admin))
            .unwrap();
        for _ in 0..6 {
            engine
                .handoff(db, &visit.visit_id, &actor(StaffRole::Admin), None)
                .unwrap();
        }
        engine
            .checkout(db, &visit.visit_id, &actor(StaffRole::Admin), None)
            .unwrap()
    });

    assert_eq!(visit.status, VisitStatus::Completed);
    let nurse = visit.stage_record(Stage::Nurse).unwrap();
    assert_eq!(nurse.clocked_in_at, nurse.clocked_out_at.clone().unwrap());
}

/// Cancelling mid-pipeline freezes the visit; no further action lands.
#[test]
fn test_cancel_mid_pipeline_blocks_everything() {
    let mut db = Database::open_in_memory().unwrap();

    with_engine(&mut db, &NullNotifier, |engine, db| {
        let visit = engine
            .start_visit(db, new_visit(), &actor(StaffRole::FrontDesk))
            .unwrap();
        let id = visit.visit_id.clone();
        engine
            .handoff(db, &id, &actor(StaffRole::FrontDesk), None)
            .unwrap();

        let cancelled = engine
            .cancel(db, &id, &actor(StaffRole::FrontDesk), Some("no-show".into()))
            .unwrap();
        assert_eq!(cancelled.status, VisitStatus::Cancelled);

        let err = engine
            .clock_in_nurse(db, &id, &actor(StaffRole::Nurse), vitals(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::VisitNotInProgress(VisitStatus::Cancelled)
        ));

        let err = engine
            .checkout(db, &id, &actor(StaffRole::FrontDesk), None)
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::VisitNotInProgress(VisitStatus::Cancelled)
        ));
    });
}

/// The queue view tracks the pipeline: as a visit advances, it leaves the
/// old stage's queue and appears in the new one.
#[test]
fn test_queue_follows_the_visit() {
    let mut db = Database::open_in_memory().unwrap();

    with_engine(&mut db, &NullNotifier, |engine, db| {
        let visit = engine
            .start_visit(db, new_visit(), &actor(StaffRole::FrontDesk))
            .unwrap();
        let id = visit.visit_id.clone();

        let front_desk_queue = engine
            .list_queue(db, &actor(StaffRole::FrontDesk), 1, 20, None, None)
            .unwrap();
        assert_eq!(front_desk_queue.visits.len(), 1);

        engine
            .handoff(db, &id, &actor(StaffRole::FrontDesk), None)
            .unwrap();

        let front_desk_queue = engine
            .list_queue(db, &actor(StaffRole::FrontDesk), 1, 20, None, None)
            .unwrap();
        assert!(front_desk_queue.visits.is_empty());

        let nurse_queue = engine
            .list_queue(db, &actor(StaffRole::Nurse), 1, 20, None, None)
            .unwrap();
        assert_eq!(nurse_queue.visits.len(), 1);
        assert_eq!(nurse_queue.visits[0].visit_id, id);
    });
}

/// Completed visits drop out of every queue.
#[test]
fn test_completed_visit_leaves_queues() {
    let mut db = Database::open_in_memory().unwrap();

    with_engine(&mut db, &NullNotifier, |engine, db| {
        let visit = run_to_completed(engine, db);
        assert_eq!(visit.status, VisitStatus::Completed);

        let admin_queue = engine
            .list_queue(db, &actor(StaffRole::Admin), 1, 20, None, None)
            .unwrap();
        assert!(admin_queue.visits.is_empty());
    });
}

fn run_to_completed(engine: &WorkflowEngine<'_>, db: &mut Database) -> Visit {
    let visit = engine
        .start_visit(db, new_visit(), &actor(StaffRole::FrontDesk))
        .unwrap();
    for _ in 0..5 {
        engine
            .handoff(db, &visit.visit_id, &actor(StaffRole::Admin), None)
            .unwrap();
    }
    engine
        .clock_in_billing(
            db,
            &visit.visit_id,
            3000,
            PaymentMethod::Cash,
            &actor(StaffRole::BillingClerk),
            None,
        )
        .unwrap();
    engine
        .checkout(db, &visit.visit_id, &actor(StaffRole::FrontDesk), None)
        .unwrap()
}
