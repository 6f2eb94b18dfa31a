use thiserror::Error;

/// Errors raised while loading a gradebook or editing its categories.
#[derive(Error, Debug)]
pub enum GradeError {
    // Fatal for the pass: nothing is aggregated.
    #[error("required column `{column}` is missing from the uploaded file")]
    MissingNameColumn { column: String },

    #[error("the uploaded file has no header row")]
    EmptyTable,

    #[error(
        "CSV not recognized. Must be either:\n\
         - Long form with columns `Name, Category, raw`, OR\n\
         - Wide form with `<Category>_raw` (and optional `<Category>_maximum`) columns"
    )]
    UnrecognizedLayout,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Recoverable: the edit is rejected and the session is left unchanged.
    #[error("category name must not be empty")]
    EmptyCategoryName,

    #[error("category `{name}` already exists")]
    DuplicateCategory { name: String },

    #[error("category `{name}` is not known for this file")]
    UnknownCategory { name: String },

    #[error("weight for `{category}` must be a non-negative number, got {value}")]
    InvalidWeight { category: String, value: f64 },

    #[error("maximum for `{category}` must be a non-negative number, got {value}")]
    InvalidMaximum { category: String, value: f64 },

    #[error("expected NAME=VALUE, got `{input}`")]
    InvalidOverride { input: String },
}

impl GradeError {
    /// Whether the error aborts the whole computation pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GradeError::MissingNameColumn { .. }
                | GradeError::EmptyTable
                | GradeError::UnrecognizedLayout
                | GradeError::Csv(_)
                | GradeError::Io(_)
                | GradeError::Json(_)
        )
    }
}

pub type Result<T, E = GradeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_edits_are_recoverable() {
        assert!(!GradeError::EmptyCategoryName.is_fatal());
        assert!(!GradeError::DuplicateCategory {
            name: "HW".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn missing_name_column_is_fatal() {
        let err = GradeError::MissingNameColumn {
            column: "Name".to_string(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("`Name`"));
    }
}
