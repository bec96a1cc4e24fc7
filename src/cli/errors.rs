use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid chip size: {size}. Must be a positive integer, WIDTHxHEIGHT or 'full'")]
    InvalidChipSize { size: String },

    #[error("Chip size must be greater than 0, got: {size}")]
    ZeroChipSize { size: String },

    #[error("Invalid year span: {years}. Expected <start>to<end>, e.g. 2015to2019")]
    InvalidYears { years: String },

    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Dataset(#[from] ndvichip::Error),
}
