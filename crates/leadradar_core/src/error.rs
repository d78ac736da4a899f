use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeadError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timestamp out of range: {0}")]
    Timestamp(#[from] time::error::ComponentRange),

    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("lead not found: {0}")]
    LeadNotFound(String),

    #[error("query template not found: {0}")]
    QueryNotFound(String),

    #[error("outreach template not found: {0}")]
    TemplateNotFound(String),

    #[error("daily run limit reached for this query ({limit})")]
    DailyRunLimit { limit: u32 },

    #[error("please wait {remaining_minutes} minute(s) before running another search")]
    Cooldown { remaining_minutes: i64 },

    #[error("search failed: {0}")]
    Search(String),

    #[error("at most {max} URLs may be imported at once (got {got})")]
    ImportTooLarge { max: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, LeadError>;
