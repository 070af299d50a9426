//! SQLite schema definition.

/// Complete database schema for the clinic workflow.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Visits
-- ============================================================================

CREATE TABLE IF NOT EXISTS visits (
    visit_id TEXT PRIMARY KEY,
    visit_number TEXT NOT NULL UNIQUE,
    patient_id TEXT NOT NULL,
    branch_id TEXT NOT NULL,
    appointment_id TEXT,
    assigned_doctor_id TEXT,
    current_stage TEXT NOT NULL DEFAULT 'front_desk',
    status TEXT NOT NULL DEFAULT 'in_progress',   -- in_progress, completed, cancelled
    visit_date TEXT NOT NULL,
    final_clock_out TEXT,                         -- JSON FinalClockOut, checkout only
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Queue lookups filter on status + stage + branch, ordered by visit_date
CREATE INDEX IF NOT EXISTS idx_visits_queue
    ON visits(status, current_stage, branch_id, visit_date);
CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(patient_id);

-- ============================================================================
-- Visit Stage Records (one row per stage per visit)
-- ============================================================================

-- The primary key doubles as the clock-in guard: a second clock-in for the
-- same (visit, stage) conflicts instead of overwriting.
CREATE TABLE IF NOT EXISTS visit_stages (
    visit_id TEXT NOT NULL REFERENCES visits(visit_id),
    stage TEXT NOT NULL,
    clocked_in_by TEXT NOT NULL,
    clocked_in_at TEXT NOT NULL,
    clocked_out_by TEXT,
    clocked_out_at TEXT,
    notes TEXT,
    payload TEXT,                                 -- JSON StagePayload
    PRIMARY KEY (visit_id, stage)
);

-- ============================================================================
-- Invoices (at most one per visit)
-- ============================================================================

CREATE TABLE IF NOT EXISTS invoices (
    invoice_id TEXT PRIMARY KEY,
    invoice_number TEXT NOT NULL UNIQUE,
    visit_id TEXT NOT NULL UNIQUE REFERENCES visits(visit_id),
    patient_id TEXT NOT NULL,
    branch_id TEXT NOT NULL,
    items TEXT NOT NULL DEFAULT '[]',             -- JSON array of InvoiceItem
    subtotal INTEGER NOT NULL DEFAULT 0,
    tax INTEGER NOT NULL DEFAULT 0,
    discount INTEGER NOT NULL DEFAULT 0,
    grand_total INTEGER NOT NULL DEFAULT 0,
    paid_amount INTEGER NOT NULL DEFAULT 0,
    balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
    status TEXT NOT NULL DEFAULT 'pending',       -- pending, partially_paid, paid, cancelled
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Payments (append-only ledger)
-- ============================================================================

CREATE TABLE IF NOT EXISTS payments (
    payment_id TEXT PRIMARY KEY,
    reference TEXT NOT NULL UNIQUE,
    invoice_id TEXT NOT NULL REFERENCES invoices(invoice_id),
    visit_id TEXT NOT NULL,
    patient_id TEXT NOT NULL,
    branch_id TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    method TEXT NOT NULL,
    received_by TEXT NOT NULL,
    payment_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments(invoice_id);

-- ============================================================================
-- Staff Directory (external collaborator slice)
-- ============================================================================

CREATE TABLE IF NOT EXISTS staff (
    staff_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    branch_id TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_staff_role_branch ON staff(role, branch_id, active);

-- ============================================================================
-- Appointments (linked records, completed at checkout)
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    appointment_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    doctor_id TEXT,
    scheduled_for TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled',     -- scheduled, completed, cancelled
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Notification Outbox (drained by an external delivery transport)
-- ============================================================================

CREATE TABLE IF NOT EXISTS notifications_outbox (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id TEXT NOT NULL,
    visit_number TEXT NOT NULL,
    branch_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    recipient_staff_id TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_outbox_recipient ON notifications_outbox(recipient_staff_id);
"#;
