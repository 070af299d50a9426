//! Invoice and payment database operations.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{FeeSchedule, Invoice, InvoiceItem, InvoiceStatus, Payment, PaymentMethod, Visit};

impl Database {
    /// Load the invoice for a visit, if one has been generated.
    pub fn get_invoice_by_visit(&self, visit_id: &str) -> DbResult<Option<Invoice>> {
        get_invoice_by_visit(&self.conn, visit_id)
    }

    pub fn get_invoice(&self, invoice_id: &str) -> DbResult<Option<Invoice>> {
        get_invoice(&self.conn, invoice_id)
    }

    /// List payments applied to an invoice, oldest first.
    pub fn list_payments_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<Payment>> {
        list_payments_for_invoice(&self.conn, invoice_id)
    }
}

/// Idempotent find-or-create keyed by visit. Concurrent callers converge on
/// one invoice row; the unique `visit_id` column arbitrates.
pub fn find_or_create_invoice(
    conn: &Connection,
    visit: &Visit,
    fees: &FeeSchedule,
) -> DbResult<Invoice> {
    let candidate = Invoice::from_visit(visit, fees);
    let items_json = serde_json::to_string(&candidate.items)?;

    conn.execute(
        r#"
        INSERT INTO invoices (
            invoice_id, invoice_number, visit_id, patient_id, branch_id,
            items, subtotal, tax, discount, grand_total, paid_amount,
            balance, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(visit_id) DO NOTHING
        "#,
        params![
            candidate.invoice_id,
            candidate.invoice_number,
            candidate.visit_id,
            candidate.patient_id,
            candidate.branch_id,
            items_json,
            candidate.subtotal,
            candidate.tax,
            candidate.discount,
            candidate.grand_total,
            candidate.paid_amount,
            candidate.balance,
            candidate.status.as_str(),
            candidate.created_at,
            candidate.updated_at,
        ],
    )?;

    get_invoice_by_visit(conn, &visit.visit_id)?.ok_or_else(|| {
        DbError::Constraint(format!("Invoice upsert lost for visit {}", visit.visit_id))
    })
}

/// Debit the outstanding balance, conditional on the balance still covering
/// the amount. Returns `false` when the payment would overdraw the invoice.
pub fn apply_payment_to_invoice(conn: &Connection, invoice_id: &str, amount: i64) -> DbResult<bool> {
    let rows = conn.execute(
        r#"
        UPDATE invoices SET
            paid_amount = paid_amount + ?2,
            balance = balance - ?2,
            updated_at = datetime('now')
        WHERE invoice_id = ?1 AND balance >= ?2 AND status != 'cancelled'
        "#,
        params![invoice_id, amount],
    )?;
    if rows == 0 {
        return Ok(false);
    }

    // Status is a pure function of the new amounts
    conn.execute(
        r#"
        UPDATE invoices SET status = CASE
            WHEN balance = 0 AND paid_amount > 0 THEN 'paid'
            WHEN paid_amount > 0 THEN 'partially_paid'
            ELSE status
        END
        WHERE invoice_id = ?1
        "#,
        params![invoice_id],
    )?;
    Ok(true)
}

/// Append a payment ledger entry.
pub fn insert_payment(conn: &Connection, payment: &Payment) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO payments (
            payment_id, reference, invoice_id, visit_id, patient_id,
            branch_id, amount, method, received_by, payment_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            payment.payment_id,
            payment.reference,
            payment.invoice_id,
            payment.visit_id,
            payment.patient_id,
            payment.branch_id,
            payment.amount,
            payment.method.as_str(),
            payment.received_by,
            payment.payment_date,
        ],
    )?;
    Ok(())
}

pub fn get_invoice(conn: &Connection, invoice_id: &str) -> DbResult<Option<Invoice>> {
    conn.query_row(
        &format!("{} WHERE invoice_id = ?", INVOICE_SELECT),
        [invoice_id],
        map_invoice_row,
    )
    .optional()?
    .map(|row| row.try_into())
    .transpose()
}

pub fn get_invoice_by_visit(conn: &Connection, visit_id: &str) -> DbResult<Option<Invoice>> {
    conn.query_row(
        &format!("{} WHERE visit_id = ?", INVOICE_SELECT),
        [visit_id],
        map_invoice_row,
    )
    .optional()?
    .map(|row| row.try_into())
    .transpose()
}

pub fn list_payments_for_invoice(conn: &Connection, invoice_id: &str) -> DbResult<Vec<Payment>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT payment_id, reference, invoice_id, visit_id, patient_id,
               branch_id, amount, method, received_by, payment_date
        FROM payments
        WHERE invoice_id = ?
        ORDER BY payment_date ASC
        "#,
    )?;

    let rows = stmt.query_map([invoice_id], |row| {
        Ok(PaymentRow {
            payment_id: row.get(0)?,
            reference: row.get(1)?,
            invoice_id: row.get(2)?,
            visit_id: row.get(3)?,
            patient_id: row.get(4)?,
            branch_id: row.get(5)?,
            amount: row.get(6)?,
            method: row.get(7)?,
            received_by: row.get(8)?,
            payment_date: row.get(9)?,
        })
    })?;

    let mut payments = Vec::new();
    for row in rows {
        payments.push(row?.try_into()?);
    }
    Ok(payments)
}

const INVOICE_SELECT: &str = r#"
    SELECT invoice_id, invoice_number, visit_id, patient_id, branch_id,
           items, subtotal, tax, discount, grand_total, paid_amount,
           balance, status, created_at, updated_at
    FROM invoices
"#;

/// Intermediate row struct for database mapping.
struct InvoiceRow {
    invoice_id: String,
    invoice_number: String,
    visit_id: String,
    patient_id: String,
    branch_id: String,
    items: String,
    subtotal: i64,
    tax: i64,
    discount: i64,
    grand_total: i64,
    paid_amount: i64,
    balance: i64,
    status: String,
    created_at: String,
    updated_at: String,
}

fn map_invoice_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvoiceRow> {
    Ok(InvoiceRow {
        invoice_id: row.get(0)?,
        invoice_number: row.get(1)?,
        visit_id: row.get(2)?,
        patient_id: row.get(3)?,
        branch_id: row.get(4)?,
        items: row.get(5)?,
        subtotal: row.get(6)?,
        tax: row.get(7)?,
        discount: row.get(8)?,
        grand_total: row.get(9)?,
        paid_amount: row.get(10)?,
        balance: row.get(11)?,
        status: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DbError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let items: Vec<InvoiceItem> = serde_json::from_str(&row.items)?;
        let status = InvoiceStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown invoice status: {}", row.status)))?;

        Ok(Invoice {
            invoice_id: row.invoice_id,
            invoice_number: row.invoice_number,
            visit_id: row.visit_id,
            patient_id: row.patient_id,
            branch_id: row.branch_id,
            items,
            subtotal: row.subtotal,
            tax: row.tax,
            discount: row.discount,
            grand_total: row.grand_total,
            paid_amount: row.paid_amount,
            balance: row.balance,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct PaymentRow {
    payment_id: String,
    reference: String,
    invoice_id: String,
    visit_id: String,
    patient_id: String,
    branch_id: String,
    amount: i64,
    method: String,
    received_by: String,
    payment_date: String,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DbError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let method = PaymentMethod::parse(&row.method)
            .ok_or_else(|| DbError::Constraint(format!("Unknown payment method: {}", row.method)))?;

        Ok(Payment {
            payment_id: row.payment_id,
            reference: row.reference,
            invoice_id: row.invoice_id,
            visit_id: row.visit_id,
            patient_id: row.patient_id,
            branch_id: row.branch_id,
            amount: row.amount,
            method,
            received_by: row.received_by,
            payment_date: row.payment_date,
        })
    }
}
