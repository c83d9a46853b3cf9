pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pipelines (
    id TEXT PRIMARY KEY,
    pipeline_number TEXT NOT NULL UNIQUE,
    customer_name TEXT NOT NULL,
    customer_phone TEXT,
    customer_email TEXT,
    current_stage TEXT NOT NULL,
    previous_stage TEXT,
    stage_entered_at TEXT NOT NULL,
    sales_rep_id TEXT,
    vehicle_interest TEXT NOT NULL,
    quote_amount TEXT,
    probability INTEGER NOT NULL DEFAULT 0 CHECK (probability BETWEEN 0 AND 100),
    priority TEXT NOT NULL DEFAULT 'medium',
    next_action TEXT,
    next_action_due TEXT,
    auto_logged_events_count INTEGER NOT NULL DEFAULT 0,
    manual_notes_count INTEGER NOT NULL DEFAULT 0,
    attachments_count INTEGER NOT NULL DEFAULT 0,
    branch_id TEXT NOT NULL,
    lead_id TEXT,
    last_activity_at TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Numbers are never reused, even after a pipeline is deleted
CREATE TABLE IF NOT EXISTS pipeline_sequences (
    year INTEGER PRIMARY KEY,
    last_value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS stage_transition_events (
    id TEXT PRIMARY KEY,
    pipeline_id TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
    from_stage TEXT NOT NULL,
    to_stage TEXT NOT NULL,
    trigger_reason TEXT NOT NULL,
    actor_kind TEXT NOT NULL CHECK (actor_kind IN ('system', 'user')),
    actor_name TEXT,
    occurred_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pipeline_notes (
    id TEXT PRIMARY KEY,
    pipeline_id TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pipeline_attachments (
    id TEXT PRIMARY KEY,
    pipeline_id TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
    file_name TEXT NOT NULL,
    content_type TEXT,
    url TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS auto_loss_runs (
    id TEXT PRIMARY KEY,
    trigger TEXT NOT NULL CHECK (trigger IN ('scheduled', 'manual')),
    as_of TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    scanned INTEGER NOT NULL,
    marked INTEGER NOT NULL,
    skipped INTEGER NOT NULL,
    failed INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pipelines_stage ON pipelines(current_stage);
CREATE INDEX IF NOT EXISTS idx_pipelines_branch ON pipelines(branch_id);
CREATE INDEX IF NOT EXISTS idx_pipelines_rep ON pipelines(sales_rep_id);
CREATE INDEX IF NOT EXISTS idx_pipelines_activity ON pipelines(last_activity_at);
CREATE INDEX IF NOT EXISTS idx_events_pipeline ON stage_transition_events(pipeline_id);
CREATE INDEX IF NOT EXISTS idx_notes_pipeline ON pipeline_notes(pipeline_id);
CREATE INDEX IF NOT EXISTS idx_attachments_pipeline ON pipeline_attachments(pipeline_id);

-- Events are append-only
CREATE TRIGGER IF NOT EXISTS stage_transition_events_no_update
    BEFORE UPDATE ON stage_transition_events
BEGIN
    SELECT RAISE(ABORT, 'stage transition events are append-only');
END;
"#;
