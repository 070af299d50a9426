//! Queue read model: who is waiting where.
//!
//! Non-admin staff see only the stage they occupy; the stage filter is
//! accepted when it names a stage their role owns (front desk may view both
//! check-in and returned visits). Admins filter freely.

use crate::db::Database;
use crate::models::{Actor, Stage, Visit};

use super::{guard, WorkflowEngine, WorkflowError, WorkflowResult};

const MAX_PAGE_SIZE: usize = 100;

/// One page of waiting visits, oldest first.
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub visits: Vec<Visit>,
    pub page: usize,
    pub per_page: usize,
}

impl<'a> WorkflowEngine<'a> {
    /// List in-progress visits, scoped to what the actor is allowed to see.
    /// `page` is 1-based; `per_page` is clamped to 1..=100.
    pub fn list_queue(
        &self,
        db: &Database,
        actor: &Actor,
        page: usize,
        per_page: usize,
        stage_filter: Option<Stage>,
        branch_filter: Option<&str>,
    ) -> WorkflowResult<QueuePage> {
        let stage = if actor.role.is_admin() {
            stage_filter
        } else {
            // Role picks the stage; an explicit filter must name a stage the
            // role owns
            let stage = match stage_filter {
                Some(requested) => {
                    guard::authorize(self.registry(), actor.role, requested)?;
                    requested
                }
                None => self
                    .registry()
                    .stage_for_role(actor.role)
                    .ok_or(WorkflowError::Forbidden {
                        role: actor.role,
                        stage: Stage::FrontDesk,
                    })?,
            };
            Some(stage)
        };

        // Non-admins only see their own branch
        let branch = if actor.role.is_admin() {
            branch_filter
        } else {
            Some(actor.branch_id.as_str())
        };

        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * per_page;

        let visits = db.list_queue(stage, branch, per_page, offset)?;
        Ok(QueuePage {
            visits,
            page,
            per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeeSchedule, StaffRole};
    use crate::notify::NullNotifier;
    use crate::workflow::StageRegistry;

    fn actor(role: StaffRole, branch: &str) -> Actor {
        Actor {
            staff_id: format!("{}-1", role),
            name: format!("{} one", role),
            role,
            branch_id: branch.into(),
        }
    }

    fn seed_visit(db: &Database, stage: Stage, branch: &str, date: &str) -> Visit {
        let mut visit = Visit::new("patient-1".into(), branch.into());
        visit.current_stage = stage;
        visit.visit_date = date.into();
        db.insert_visit(&visit).unwrap();
        visit
    }

    fn with_engine<T>(db: &Database, f: impl FnOnce(&WorkflowEngine<'_>, &Database) -> T) -> T {
        let registry = StageRegistry::new();
        let fees = FeeSchedule::default();
        let notifier = NullNotifier;
        let engine = WorkflowEngine::new(&registry, &fees, &notifier);
        f(&engine, db)
    }

    #[test]
    fn test_nurse_sees_own_stage_and_branch_only() {
        let db = Database::open_in_memory().unwrap();
        let mine = seed_visit(&db, Stage::Nurse, "branch-1", "2026-01-01T08:00:00+00:00");
        seed_visit(&db, Stage::Nurse, "branch-2", "2026-01-01T08:00:00+00:00");
        seed_visit(&db, Stage::Doctor, "branch-1", "2026-01-01T08:00:00+00:00");

        let page = with_engine(&db, |engine, db| {
            engine
                .list_queue(db, &actor(StaffRole::Nurse, "branch-1"), 1, 20, None, None)
                .unwrap()
        });
        assert_eq!(page.visits.len(), 1);
        assert_eq!(page.visits[0].visit_id, mine.visit_id);
    }

    #[test]
    fn test_front_desk_may_view_returned_queue() {
        let db = Database::open_in_memory().unwrap();
        let returned = seed_visit(
            &db,
            Stage::ReturnedToFrontDesk,
            "branch-1",
            "2026-01-01T08:00:00+00:00",
        );
        seed_visit(&db, Stage::FrontDesk, "branch-1", "2026-01-01T08:00:00+00:00");

        let page = with_engine(&db, |engine, db| {
            engine
                .list_queue(
                    db,
                    &actor(StaffRole::FrontDesk, "branch-1"),
                    1,
                    20,
                    Some(Stage::ReturnedToFrontDesk),
                    None,
                )
                .unwrap()
        });
        assert_eq!(page.visits.len(), 1);
        assert_eq!(page.visits[0].visit_id, returned.visit_id);
    }

    #[test]
    fn test_foreign_stage_filter_forbidden() {
        let db = Database::open_in_memory().unwrap();
        let err = with_engine(&db, |engine, db| {
            engine
                .list_queue(
                    db,
                    &actor(StaffRole::Nurse, "branch-1"),
                    1,
                    20,
                    Some(Stage::Billing),
                    None,
                )
                .unwrap_err()
        });
        assert!(matches!(err, WorkflowError::Forbidden { .. }));
    }

    #[test]
    fn test_admin_sees_everything_and_filters_freely() {
        let db = Database::open_in_memory().unwrap();
        seed_visit(&db, Stage::Nurse, "branch-1", "2026-01-01T08:00:00+00:00");
        seed_visit(&db, Stage::Doctor, "branch-2", "2026-01-01T09:00:00+00:00");

        let (all, filtered) = with_engine(&db, |engine, db| {
            let admin = actor(StaffRole::Admin, "hq");
            let all = engine.list_queue(db, &admin, 1, 20, None, None).unwrap();
            let filtered = engine
                .list_queue(db, &admin, 1, 20, Some(Stage::Doctor), Some("branch-2"))
                .unwrap();
            (all, filtered)
        });
        assert_eq!(all.visits.len(), 2);
        assert_eq!(filtered.visits.len(), 1);
        assert_eq!(filtered.visits[0].current_stage, Stage::Doctor);
    }

    #[test]
    fn test_ordering_and_pagination() {
        let db = Database::open_in_memory().unwrap();
        let first = seed_visit(&db, Stage::Nurse, "branch-1", "2026-01-01T08:00:00+00:00");
        let second = seed_visit(&db, Stage::Nurse, "branch-1", "2026-01-01T09:00:00+00:00");
        let third = seed_visit(&db, Stage::Nurse, "branch-1", "2026-01-01T10:00:00+00:00");

        let (page_one, page_two) = with_engine(&db, |engine, db| {
            let nurse = actor(StaffRole::Nurse, "branch-1");
            let one = engine.list_queue(db, &nurse, 1, 2, None, None).unwrap();
            let two = engine.list_queue(db, &nurse, 2, 2, None, None).unwrap();
            (one, two)
        });

        assert_eq!(page_one.visits.len(), 2);
        assert_eq!(page_one.visits[0].visit_id, first.visit_id);
        assert_eq!(page_one.visits[1].visit_id, second.visit_id);
        assert_eq!(page_two.visits.len(), 1);
        assert_eq!(page_two.visits[0].visit_id, third.visit_id);
    }

    #[test]
    fn test_page_size_is_clamped() {
        let db = Database::open_in_memory().unwrap();
        let page = with_engine(&db, |engine, db| {
            engine
                .list_queue(db, &actor(StaffRole::Admin, "hq"), 0, 0, None, None)
                .unwrap()
        });
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 1);
    }
}
