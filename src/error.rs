use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required column '{column}' not found in {table} table")]
    MissingColumn { table: String, column: String },

    #[error("join key '{column}' not found in {table} table")]
    JoinKeyMismatch { table: String, column: String },

    #[error("delimiter {delimiter:?} for {table} table is not a single ASCII character")]
    InvalidDelimiter { table: String, delimiter: char },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    /// A geometry cell was present but is not valid WKT.
    GeometryParse { postal_code: u32, message: String },
    /// A filter or join stage produced no rows.
    EmptyResult { stage: String },
    InvalidPostalCode { table: String, value: String },
    InvalidValue { table: String, column: String, value: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeometryParse { postal_code, message } => {
                write!(f, "invalid WKT geometry for PLZ {postal_code}: {message}")
            }
            Self::EmptyResult { stage } => write!(f, "{stage} produced zero rows"),
            Self::InvalidPostalCode { table, value } => {
                write!(f, "non-numeric postal code '{value}' in {table} table")
            }
            Self::InvalidValue { table, column, value } => {
                write!(f, "unparseable value '{value}' in column '{column}' of {table} table")
            }
        }
    }
}

/// Collects the non-fatal warnings raised during one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    warnings: Vec<PipelineWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: PipelineWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Records an [`PipelineWarning::EmptyResult`] if `len` is zero.
    pub fn check_empty(&mut self, stage: &str, len: usize) {
        if len == 0 {
            self.push(PipelineWarning::EmptyResult {
                stage: stage.to_string(),
            });
        }
    }

    pub fn warnings(&self) -> &[PipelineWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}
