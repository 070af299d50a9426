//! Billing coordinator: invoice generation, payment capture, and the return
//! of the visit to the front desk, all in one transaction.
//!
//! Invoice creation is idempotent per visit, so retried billing requests
//! converge on the same invoice. The payment debit is a conditional write
//! against the outstanding balance; a rejected debit rolls everything back,
//! leaving no orphaned payment rows.

use tracing::info;

use crate::db::{invoices, visits, Database};
use crate::models::{Actor, Invoice, Payment, PaymentMethod, Stage, StagePayload, Visit};

use super::registry::TransitionPolicy;
use super::{guard, now_rfc3339, WorkflowEngine, WorkflowError, WorkflowResult};

/// Everything the billing desk needs back after settling a visit.
#[derive(Debug, Clone)]
pub struct BillingOutcome {
    pub visit: Visit,
    pub invoice: Invoice,
    pub payment: Payment,
}

enum BillingTxOutcome {
    Committed { invoice_id: String, payment: Payment },
    ExceedsBalance { balance: i64 },
    AlreadyClockedIn,
    MovedUnderneath,
}

impl<'a> WorkflowEngine<'a> {
    /// Settle a visit at the billing desk. Generates (or finds) the invoice,
    /// applies the payment, records the billing stage, and returns the visit
    /// to the front desk for checkout.
    pub fn clock_in_billing(
        &self,
        db: &mut Database,
        visit_id: &str,
        amount: i64,
        method: PaymentMethod,
        actor: &Actor,
        notes: Option<String>,
    ) -> WorkflowResult<BillingOutcome> {
        guard::authorize(self.registry(), actor.role, Stage::Billing)?;
        if amount <= 0 {
            return Err(WorkflowError::InvalidAmount);
        }

        let visit = self.load_in_progress(db, visit_id)?;
        if visit.current_stage != Stage::Billing {
            return Err(WorkflowError::WrongStage {
                expected: Stage::Billing,
                actual: visit.current_stage,
            });
        }
        if visit.stage_record(Stage::Billing).is_some() {
            return Err(WorkflowError::AlreadyClockedIn(Stage::Billing));
        }
        let target = self
            .registry()
            .next_stage(Stage::Billing)
            .ok_or(WorkflowError::InvalidWorkflow(Stage::Billing))?;

        let now = now_rfc3339();
        let outcome = {
            let tx = db.transaction()?;

            let invoice = invoices::find_or_create_invoice(&tx, &visit, self.fees)?;
            if !invoices::apply_payment_to_invoice(&tx, &invoice.invoice_id, amount)? {
                BillingTxOutcome::ExceedsBalance {
                    balance: invoice.balance,
                }
            } else {
                let payment = Payment::new(&invoice, amount, method, actor.staff_id.clone());
                invoices::insert_payment(&tx, &payment)?;

                let payload = StagePayload::BillingPayment {
                    invoice_id: invoice.invoice_id.clone(),
                    payment_reference: payment.reference.clone(),
                };
                if !visits::insert_closed_stage(
                    &tx,
                    visit_id,
                    Stage::Billing,
                    &actor.staff_id,
                    &now,
                    notes.as_deref(),
                    Some(&payload),
                )? {
                    BillingTxOutcome::AlreadyClockedIn
                } else if !visits::advance_visit_stage(&tx, visit_id, Stage::Billing, target, &now)?
                {
                    BillingTxOutcome::MovedUnderneath
                } else {
                    // The returned visit waits as an open record until checkout
                    visits::open_stage(&tx, visit_id, target, &actor.staff_id, &now)?;
                    tx.commit()?;
                    BillingTxOutcome::Committed {
                        invoice_id: invoice.invoice_id,
                        payment,
                    }
                }
            }
        };

        match outcome {
            BillingTxOutcome::ExceedsBalance { balance } => {
                Err(WorkflowError::PaymentExceedsBalance { amount, balance })
            }
            BillingTxOutcome::AlreadyClockedIn => {
                Err(WorkflowError::AlreadyClockedIn(Stage::Billing))
            }
            BillingTxOutcome::MovedUnderneath => {
                let actual = self.reload(db, visit_id)?.current_stage;
                Err(WorkflowError::WrongStage {
                    expected: Stage::Billing,
                    actual,
                })
            }
            BillingTxOutcome::Committed {
                invoice_id,
                payment,
            } => {
                info!(
                    visit = %visit.visit_number,
                    amount,
                    method = %method,
                    "Payment captured, visit returned to front desk"
                );
                self.notify_stage(db, &visit, target);

                let visit = self.reload(db, visit_id)?;
                let invoice = db
                    .get_invoice(&invoice_id)?
                    .ok_or_else(|| WorkflowError::InvoiceNotFound(visit_id.to_string()))?;
                Ok(BillingOutcome {
                    visit,
                    invoice,
                    payment,
                })
            }
        }
    }
}
