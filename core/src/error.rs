use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identifier pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Unknown grouping dimension '{value}'")]
    InvalidGroupBy { value: String },

    #[error("'{value}' is not a technician code")]
    InvalidTechnicianCode { value: String },

    #[error("Column '{column}' not found in {source_name} header")]
    MissingColumn { column: String, source_name: String },

    #[error("Roster code '{code}' already belongs to '{existing}' (rejected '{incoming}')")]
    RosterCollision {
        code: String,
        existing: String,
        incoming: String,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type KpiResult<T> = Result<T, KpiError>;
