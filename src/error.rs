use thiserror::Error;

/// Errors raised by the price lookup library.
///
/// Data-quality problems in the price table (blank specs, unparsable prices)
/// are not errors; they are absorbed by the normalizer.
#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file could not be parsed: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Row {row} is out of range for table '{table}'")]
    RowOutOfRange { table: String, row: usize },

    #[error("'{0}' has no dealer price and cannot be quoted")]
    PriceOnRequest(String),

    #[error("No record is selected for quoting")]
    NoActiveQuote,

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Email '{0}' is not registered")]
    UnknownEmail(String),

    #[error("Session has expired")]
    SessionExpired,

    #[error("Password cannot be empty")]
    EmptyPassword,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Mail sender is not configured")]
    MailerNotConfigured,

    #[error("Failed to send mail: {0}")]
    Mail(String),

    #[error("Template error: {0}")]
    Template(String),
}

impl From<calamine::Error> for PriceError {
    fn from(err: calamine::Error) -> Self {
        PriceError::Workbook(err.to_string())
    }
}
