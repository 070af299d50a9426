//! Invoice and payment models.
//!
//! Amounts are integer minor units (cents) so balance arithmetic is exact.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::stage::Stage;
use super::visit::{StagePayload, Visit};

/// Invoice status, a pure function of paid amount and balance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InvoiceStatus::Pending),
            "partially_paid" => Some(InvoiceStatus::PartiallyPaid),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }

    /// Status implied by the amounts on the invoice.
    pub fn for_amounts(paid_amount: i64, balance: i64) -> Self {
        if paid_amount > 0 && balance == 0 {
            InvoiceStatus::Paid
        } else if paid_amount > 0 {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Pending
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invoice tied 1:1 to a visit, created lazily at the billing stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub invoice_id: String,
    /// Human-readable invoice number
    pub invoice_number: String,
    /// Owning visit; unique per invoice
    pub visit_id: String,
    pub patient_id: String,
    pub branch_id: String,
    pub items: Vec<InvoiceItem>,
    pub subtotal: i64,
    pub tax: i64,
    pub discount: i64,
    pub grand_total: i64,
    pub paid_amount: i64,
    /// Always `grand_total - paid_amount`, never negative
    pub balance: i64,
    pub status: InvoiceStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Invoice {
    /// Build an invoice for a visit, deriving line items from the stage
    /// payloads recorded so far.
    pub fn from_visit(visit: &Visit, fees: &FeeSchedule) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let mut invoice = Self {
            invoice_id: uuid::Uuid::new_v4().to_string(),
            invoice_number: generate_invoice_number(),
            visit_id: visit.visit_id.clone(),
            patient_id: visit.patient_id.clone(),
            branch_id: visit.branch_id.clone(),
            items: derive_items(visit, fees),
            subtotal: 0,
            tax: 0,
            discount: 0,
            grand_total: 0,
            paid_amount: 0,
            balance: 0,
            status: InvoiceStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
        };
        invoice.recalculate();
        invoice
    }

    /// Recompute subtotal, grand total, balance, and status from items and
    /// the amounts paid so far.
    pub fn recalculate(&mut self) {
        self.subtotal = self.items.iter().map(|i| i.total).sum();
        self.grand_total = (self.subtotal + self.tax - self.discount).max(0);
        self.balance = self.grand_total - self.paid_amount;
        if self.status != InvoiceStatus::Cancelled {
            self.status = InvoiceStatus::for_amounts(self.paid_amount, self.balance);
        }
    }

    /// Apply a payment. Returns `false` without mutating when the amount is
    /// non-positive or exceeds the outstanding balance.
    pub fn apply_payment(&mut self, amount: i64) -> bool {
        if amount <= 0 || amount > self.balance {
            return false;
        }
        self.paid_amount += amount;
        self.updated_at = chrono::Utc::now().to_rfc3339();
        self.recalculate();
        true
    }
}

/// A single invoice line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: i64,
    pub total: i64,
}

impl InvoiceItem {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: i64) -> Self {
        let total = (quantity * unit_price as f64).round() as i64;
        Self {
            description: description.into(),
            quantity,
            unit_price,
            total,
        }
    }
}

/// An immutable payment ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub payment_id: String,
    /// Generated unique receipt reference
    pub reference: String,
    pub invoice_id: String,
    pub visit_id: String,
    pub patient_id: String,
    pub branch_id: String,
    pub amount: i64,
    pub method: PaymentMethod,
    pub received_by: String,
    pub payment_date: String,
}

impl Payment {
    pub fn new(
        invoice: &Invoice,
        amount: i64,
        method: PaymentMethod,
        received_by: String,
    ) -> Self {
        Self {
            payment_id: uuid::Uuid::new_v4().to_string(),
            reference: generate_payment_reference(),
            invoice_id: invoice.invoice_id.clone(),
            visit_id: invoice.visit_id.clone(),
            patient_id: invoice.patient_id.clone(),
            branch_id: invoice.branch_id.clone(),
            amount,
            method,
            received_by,
            payment_date: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    Insurance,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Insurance => "insurance",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "mobile_money" => Some(PaymentMethod::MobileMoney),
            "insurance" => Some(PaymentMethod::Insurance),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard charges used to derive invoice items from a visit.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    pub consultation_fee: i64,
    pub lab_test_fee: i64,
    pub dispense_item_fee: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            consultation_fee: 3000,
            lab_test_fee: 1500,
            dispense_item_fee: 500,
        }
    }
}

/// Build line items from the visit's stage payloads. Every invoice carries
/// the consultation charge; lab and pharmacy items are added per entry.
fn derive_items(visit: &Visit, fees: &FeeSchedule) -> Vec<InvoiceItem> {
    let mut items = vec![InvoiceItem::new("Consultation", 1.0, fees.consultation_fee)];

    if let Some(record) = visit.stage_record(Stage::Lab) {
        if let Some(StagePayload::LabResults { results }) = &record.payload {
            for entry in results {
                items.push(InvoiceItem::new(
                    format!("Lab: {}", entry.test_name),
                    1.0,
                    fees.lab_test_fee,
                ));
            }
        }
    }

    if let Some(record) = visit.stage_record(Stage::Pharmacy) {
        if let Some(StagePayload::Dispense { items: dispensed }) = &record.payload {
            for item in dispensed {
                items.push(InvoiceItem::new(
                    format!("Pharmacy: {}", item.name),
                    item.quantity,
                    fees.dispense_item_fee,
                ));
            }
        }
    }

    items
}

/// Generate a human-readable invoice number.
pub fn generate_invoice_number() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("INV-{}", id[..10].to_uppercase())
}

/// Generate a unique payment reference.
pub fn generate_payment_reference() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("PAY-{}", id[..12].to_uppercase())
}
