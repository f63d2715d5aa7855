use feedhub_core::{ConfigError, OperationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid argument: {0}")]
    Usage(String),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Usage(_) => 2,
            Self::Operation(error) if error.is_transport() => 3,
            Self::Operation(_) | Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_and_config_errors_share_exit_code() {
        assert_eq!(CliError::Usage(String::from("bad param")).exit_code(), 2);
        let config = ConfigError::Invalid {
            field: String::from("alias"),
            reason: String::from("must not be empty"),
        };
        assert_eq!(CliError::from(config).exit_code(), 2);
    }

    #[test]
    fn io_errors_exit_with_ten() {
        let error = CliError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        assert_eq!(error.exit_code(), 10);
    }
}
