use thiserror::Error;

/// A document that could not be turned into a report. Nothing is persisted
/// for a document that fails here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty document")]
    EmptyDocument,
    #[error("unsupported root element <{0}> (expected <testsuites> or <testsuite>)")]
    UnsupportedRoot(String),
    #[error("malformed xml at byte {position}: {message}")]
    Xml { position: usize, message: String },
    #[error("document ended inside <{0}>")]
    Unterminated(String),
}

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("document {index}: {source}")]
    Parse {
        index: usize,
        #[source]
        source: ParseError,
    },
    #[error("project not found: {0}")]
    ProjectNotFound(i64),
    #[error("run not found: {0}")]
    RunNotFound(i64),
    #[error("no runs found for project {project_id} on {date}")]
    NoRunsOnDate {
        project_id: i64,
        date: chrono::NaiveDate,
    },
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PulseError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PulseError::ProjectNotFound(_)
                | PulseError::RunNotFound(_)
                | PulseError::NoRunsOnDate { .. }
        )
    }
}

pub type Result<T, E = PulseError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);
