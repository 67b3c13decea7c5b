//! SQL schema for the SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Directory ──────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS institutions (
    institution_id             TEXT PRIMARY KEY,
    identifier                 TEXT NOT NULL UNIQUE,
    name                       TEXT NOT NULL,
    workflow                   TEXT NOT NULL,   -- 'full_cycle' | 'check_in_only'
    require_checkout_screening INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS individuals (
    individual_id  TEXT PRIMARY KEY,
    institution_id TEXT NOT NULL REFERENCES institutions(institution_id),
    first_name     TEXT NOT NULL,
    last_name      TEXT NOT NULL,
    phone_num      TEXT,
    email          TEXT,
    grp            TEXT,
    family_id      TEXT,            -- set when the individual is a guardian
    relation       TEXT
);

CREATE TABLE IF NOT EXISTS families (
    family_id      TEXT PRIMARY KEY,
    institution_id TEXT NOT NULL REFERENCES institutions(institution_id),
    guardian_id    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dependents (
    dependent_id TEXT PRIMARY KEY,
    family_id    TEXT NOT NULL REFERENCES families(family_id),
    position     INTEGER NOT NULL,  -- order within the family
    first_name   TEXT NOT NULL,
    last_name    TEXT NOT NULL,
    grp          TEXT
);

CREATE TABLE IF NOT EXISTS tags (
    tag_id         TEXT PRIMARY KEY,
    institution_id TEXT NOT NULL REFERENCES institutions(institution_id),
    tag_string     TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    UNIQUE (institution_id, tag_string)
);

-- ── Records ────────────────────────────────────────────────────────────────

-- `active` is derived from (workflow, status) on every write so that the
-- partial unique index below can enforce one active record per subject.
CREATE TABLE IF NOT EXISTS cc_records (
    record_id          TEXT PRIMARY KEY,
    institution_id     TEXT NOT NULL,
    workflow           TEXT NOT NULL,
    subject_kind       TEXT NOT NULL,   -- 'individual' | 'dependent' | 'tag'
    subject_id         TEXT NOT NULL,   -- tag string for tags
    subject_json       TEXT NOT NULL,   -- RecordSubject snapshot
    status             TEXT NOT NULL,
    active             INTEGER NOT NULL,
    scheduled_checkout TEXT,
    created_at         TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS cc_records_one_active
    ON cc_records(institution_id, subject_kind, subject_id)
    WHERE active = 1;

CREATE INDEX IF NOT EXISTS cc_records_subject_idx
    ON cc_records(institution_id, subject_kind, subject_id);
CREATE INDEX IF NOT EXISTS cc_records_created_idx ON cc_records(created_at);

-- Events are strictly append-only; seq is the position within the record.
CREATE TABLE IF NOT EXISTS scan_events (
    record_id   TEXT NOT NULL REFERENCES cc_records(record_id) ON DELETE CASCADE,
    seq         INTEGER NOT NULL,
    event_json  TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (record_id, seq)
);

PRAGMA user_version = 1;
";
