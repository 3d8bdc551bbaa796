//! Idempotent schema definition applied at startup
//!
//! `logs` is the primary store; `log_index` is the default search index's
//! write target and is deliberately a separate table so index writes can
//! fail without touching the store.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    project_id TEXT NOT NULL UNIQUE,
    owner_id TEXT NOT NULL,
    users JSONB NOT NULL DEFAULT '[]',
    api_keys JSONB NOT NULL DEFAULT '[]',
    alarms JSONB NOT NULL DEFAULT '[]',
    version INTEGER NOT NULL DEFAULT 1,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS logs (
    id UUID PRIMARY KEY,
    project_id TEXT NOT NULL,
    project_object_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    level TEXT NOT NULL,
    environment TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'default',
    log_type TEXT NOT NULL,
    hostname TEXT,
    message TEXT NOT NULL,
    stack_trace JSONB NOT NULL DEFAULT '[]',
    raw_stack_trace TEXT,
    details JSONB NOT NULL DEFAULT '{}',
    detail_string TEXT,
    timestamp_ms BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_logs_project_time
    ON logs(project_id, timestamp_ms DESC);

CREATE TABLE IF NOT EXISTS log_index (
    id UUID PRIMARY KEY,
    project_id TEXT NOT NULL,
    project_object_id UUID NOT NULL,
    level TEXT NOT NULL,
    environment TEXT NOT NULL,
    category TEXT NOT NULL,
    log_type TEXT NOT NULL,
    hostname TEXT,
    message TEXT NOT NULL,
    stack_trace JSONB NOT NULL DEFAULT '[]',
    raw_stack_trace TEXT,
    details JSONB NOT NULL DEFAULT '{}',
    detail_string TEXT,
    timestamp_ms BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_log_index_project_type_time
    ON log_index(project_id, log_type, timestamp_ms DESC);

CREATE INDEX IF NOT EXISTS idx_log_index_facets
    ON log_index(project_id, log_type, environment, category);

CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS subscription_plans (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name TEXT NOT NULL UNIQUE,
    log_limit BIGINT,
    project_limit INTEGER NOT NULL DEFAULT 5,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS enrollments (
    user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    plan_id UUID NOT NULL REFERENCES subscription_plans(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;
