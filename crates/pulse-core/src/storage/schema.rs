pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE,
  description TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  executed_at TEXT NOT NULL,
  run_day TEXT NOT NULL,
  total_tests INTEGER NOT NULL DEFAULT 0,
  pass_count INTEGER NOT NULL DEFAULT 0,
  fail_count INTEGER NOT NULL DEFAULT 0,
  skip_count INTEGER NOT NULL DEFAULT 0,
  total_duration REAL NOT NULL DEFAULT 0,
  ai_analysis TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_project_day ON runs(project_id, run_day);
CREATE INDEX IF NOT EXISTS idx_runs_project_executed ON runs(project_id, executed_at);

CREATE TABLE IF NOT EXISTS failures (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  failure_hash TEXT NOT NULL UNIQUE,
  message TEXT NOT NULL,
  stack_trace TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cases (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
  test_name TEXT NOT NULL,
  class_name TEXT NOT NULL,
  duration REAL NOT NULL DEFAULT 0,
  status TEXT NOT NULL,
  failure_id INTEGER REFERENCES failures(id)
);

CREATE INDEX IF NOT EXISTS idx_cases_run ON cases(run_id);
CREATE INDEX IF NOT EXISTS idx_cases_failure ON cases(failure_id);
CREATE INDEX IF NOT EXISTS idx_cases_identity ON cases(class_name, test_name);

CREATE TABLE IF NOT EXISTS flaky_management (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  class_name TEXT NOT NULL,
  test_name TEXT NOT NULL,
  acknowledged INTEGER NOT NULL DEFAULT 0,
  resolution_status TEXT NOT NULL DEFAULT 'unresolved',
  assignee TEXT,
  notes TEXT,
  updated_at TEXT NOT NULL,
  UNIQUE (class_name, test_name)
);
"#;
