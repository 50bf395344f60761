//! SQLite schema definition.

/// Complete database schema for the clinic.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Specialties and Doctors
-- ============================================================================

CREATE TABLE IF NOT EXISTS specialties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(name) <= 100),
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS doctors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) <= 120),
    license_number TEXT NOT NULL UNIQUE CHECK (length(license_number) <= 20),
    email TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_doctors_name ON doctors(name);

-- Doctor <-> Specialty association, removed with either side
CREATE TABLE IF NOT EXISTS doctor_specialties (
    doctor_id INTEGER NOT NULL REFERENCES doctors(id) ON DELETE CASCADE,
    specialty_id INTEGER NOT NULL REFERENCES specialties(id) ON DELETE CASCADE,
    PRIMARY KEY (doctor_id, specialty_id)
);

CREATE INDEX IF NOT EXISTS idx_doctor_specialties_specialty ON doctor_specialties(specialty_id);

-- ============================================================================
-- Insurance Plans and Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS insurance_plans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(name) <= 120),
    tax_id TEXT NOT NULL UNIQUE CHECK (length(tax_id) <= 18),
    phone TEXT NOT NULL DEFAULT '' CHECK (length(phone) <= 20),
    email TEXT NOT NULL DEFAULT '',
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) <= 120),
    national_id TEXT NOT NULL UNIQUE CHECK (length(national_id) <= 14),
    email TEXT NOT NULL DEFAULT '',
    birth_date TEXT NOT NULL,
    phone TEXT NOT NULL DEFAULT '' CHECK (length(phone) <= 20),
    insurance_plan_id INTEGER REFERENCES insurance_plans(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
CREATE INDEX IF NOT EXISTS idx_patients_insurance_plan ON patients(insurance_plan_id);

-- ============================================================================
-- Encounters
-- ============================================================================

CREATE TABLE IF NOT EXISTS encounters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    doctor_id INTEGER NOT NULL REFERENCES doctors(id) ON DELETE RESTRICT,
    scheduled_at TEXT NOT NULL,
    reason TEXT NOT NULL DEFAULT '' CHECK (length(reason) <= 200),
    description TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled'
        CHECK (status IN ('scheduled', 'confirmed', 'seen', 'cancelled')),
    value_cents INTEGER NOT NULL DEFAULT 0
        CHECK (value_cents > -100000000 AND value_cents < 100000000),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_encounters_patient ON encounters(patient_id);
CREATE INDEX IF NOT EXISTS idx_encounters_doctor ON encounters(doctor_id);
CREATE INDEX IF NOT EXISTS idx_encounters_scheduled_at ON encounters(scheduled_at);
CREATE INDEX IF NOT EXISTS idx_encounters_status ON encounters(status);

-- ============================================================================
-- Prescriptions, Exams, Exam Requests
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    encounter_id INTEGER NOT NULL REFERENCES encounters(id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    issued_on TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_encounter ON prescriptions(encounter_id);

-- Issue date is fixed at creation
CREATE TRIGGER IF NOT EXISTS prescriptions_issued_on_immutable BEFORE UPDATE OF issued_on ON prescriptions
WHEN new.issued_on IS NOT old.issued_on
BEGIN
    SELECT RAISE(ABORT, 'issued_on cannot be changed');
END;

CREATE TABLE IF NOT EXISTS exams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) <= 100),
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS exam_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    encounter_id INTEGER NOT NULL REFERENCES encounters(id) ON DELETE CASCADE,
    exam_id INTEGER NOT NULL REFERENCES exams(id) ON DELETE RESTRICT,
    completed INTEGER NOT NULL DEFAULT 0,
    result TEXT NOT NULL DEFAULT '',
    requested_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_exam_requests_encounter ON exam_requests(encounter_id);
CREATE INDEX IF NOT EXISTS idx_exam_requests_exam ON exam_requests(exam_id);

CREATE TRIGGER IF NOT EXISTS exam_requests_requested_at_immutable BEFORE UPDATE OF requested_at ON exam_requests
WHEN new.requested_at IS NOT old.requested_at
BEGIN
    SELECT RAISE(ABORT, 'requested_at cannot be changed');
END;
"#;
