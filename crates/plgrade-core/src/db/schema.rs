//! SQLite database schema for plgrade

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_SQL: &str = r#"
-- Zone scoring rules (best N of M, optional cap)
CREATE TABLE IF NOT EXISTS zones (
    id INTEGER PRIMARY KEY,
    number INTEGER NOT NULL DEFAULT 0,
    best_questions INTEGER,
    max_points REAL
);

CREATE TABLE IF NOT EXISTS assessment_instances (
    id INTEGER PRIMARY KEY,
    max_points REAL,
    max_bonus_points REAL,
    points REAL NOT NULL DEFAULT 0,
    score_perc REAL NOT NULL DEFAULT 0,
    modified_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rubrics (
    id INTEGER PRIMARY KEY,
    starting_points REAL NOT NULL DEFAULT 0,
    min_points REAL NOT NULL DEFAULT 0,
    max_extra_points REAL NOT NULL DEFAULT 0,
    replace_auto_points INTEGER NOT NULL DEFAULT 0,
    modified_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rubric_items (
    rubric_id INTEGER NOT NULL REFERENCES rubrics(id) ON DELETE CASCADE,
    id TEXT NOT NULL,
    number INTEGER NOT NULL,
    points REAL NOT NULL,
    description TEXT NOT NULL,
    explanation TEXT,
    grader_note TEXT,
    always_show_to_students INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (rubric_id, id)
);

CREATE TABLE IF NOT EXISTS instance_questions (
    id INTEGER PRIMARY KEY,
    assessment_instance_id INTEGER NOT NULL REFERENCES assessment_instances(id) ON DELETE CASCADE,
    zone_id INTEGER REFERENCES zones(id),
    max_points REAL,
    max_auto_points REAL,
    max_manual_points REAL,
    manual_rubric_id INTEGER REFERENCES rubrics(id),
    points REAL NOT NULL DEFAULT 0,
    score_perc REAL NOT NULL DEFAULT 0,
    auto_points REAL,
    manual_points REAL,
    grading_state TEXT NOT NULL DEFAULT 'auto_graded',
    last_grader INTEGER,
    modified_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_instance_questions_instance
    ON instance_questions(assessment_instance_id);
CREATE INDEX IF NOT EXISTS idx_instance_questions_rubric
    ON instance_questions(manual_rubric_id);

-- Rubric gradings keep the item values and settings they were computed from
CREATE TABLE IF NOT EXISTS rubric_gradings (
    id INTEGER PRIMARY KEY,
    rubric_id INTEGER NOT NULL REFERENCES rubrics(id),
    computed_points REAL NOT NULL,
    adjust_points REAL NOT NULL DEFAULT 0,
    starting_points REAL NOT NULL,
    min_points REAL NOT NULL,
    max_extra_points REAL NOT NULL,
    replace_auto_points INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rubric_grading_items (
    rubric_grading_id INTEGER NOT NULL REFERENCES rubric_gradings(id) ON DELETE CASCADE,
    rubric_item_id TEXT NOT NULL,
    score REAL NOT NULL,
    points REAL NOT NULL,
    description TEXT NOT NULL,
    PRIMARY KEY (rubric_grading_id, rubric_item_id)
);

CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY,
    instance_question_id INTEGER NOT NULL REFERENCES instance_questions(id) ON DELETE CASCADE,
    credit INTEGER,
    score REAL,
    correct INTEGER,
    partial_scores TEXT,
    feedback TEXT,
    manual_rubric_grading_id INTEGER REFERENCES rubric_gradings(id),
    date TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_submissions_question ON submissions(instance_question_id);

-- One row per grading attempt, including ones refused for a conflict
CREATE TABLE IF NOT EXISTS grading_jobs (
    id INTEGER PRIMARY KEY,
    submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    authn_user_id INTEGER,
    score REAL,
    auto_points REAL,
    manual_points REAL,
    manual_rubric_grading_id INTEGER REFERENCES rubric_gradings(id),
    feedback TEXT,
    modified_at_conflict INTEGER NOT NULL DEFAULT 0,
    graded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assessment_score_logs (
    id INTEGER PRIMARY KEY,
    assessment_instance_id INTEGER NOT NULL REFERENCES assessment_instances(id) ON DELETE CASCADE,
    action TEXT NOT NULL,
    old_points REAL,
    old_score_perc REAL,
    new_points REAL,
    new_score_perc REAL,
    credit INTEGER,
    authn_user_id INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_score_logs_instance ON assessment_score_logs(assessment_instance_id);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT
);
"#;

/// Create tables if needed and record the schema version.
///
/// Fails on a database written by a newer plgrade.
pub fn create_schema(conn: &Connection) -> crate::error::Result<()> {
    let current_version: Option<i32> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'schema_version'",
            [],
            |r| r.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .ok();

    match current_version {
        Some(v) if v > CURRENT_SCHEMA_VERSION => Err(crate::error::GradeError::Other(format!(
            "database schema version {v} is newer than supported version {CURRENT_SCHEMA_VERSION}"
        ))),
        Some(v) if v == CURRENT_SCHEMA_VERSION => Ok(()),
        _ => {
            init_tables(conn)?;
            if let Some(v) = current_version {
                tracing::info!(
                    "Database schema updated from version {} to {}",
                    v,
                    CURRENT_SCHEMA_VERSION
                );
            }
            Ok(())
        }
    }
}

fn init_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [&CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |r| {
            let s: String = r.get(0)?;
            Ok(s.parse().unwrap_or(0))
        },
    )
}
