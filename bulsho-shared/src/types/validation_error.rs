use thiserror::Error;

/// Errors raised while validating loosely typed rows into domain records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowValidationError {
    #[error("Invalid UUID in field {field}: {value}")]
    InvalidUuid { field: &'static str, value: String },

    #[error("Unknown votable type: {0}")]
    UnknownVotableType(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Invalid value {value} for {kind} relation")]
    InvalidValue { kind: &'static str, value: i32 },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl RowValidationError {
    pub fn invalid_uuid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidUuid {
            field,
            value: value.into(),
        }
    }
}
