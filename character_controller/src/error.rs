use std::fmt;
use std::path::PathBuf;

/// Construction-time failure. A controller that hits one of these is never built.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigurationError {
    MissingConfig,
    MissingMotor,
    Invalid {
        field: &'static str,
        message: String,
    },
    Parse {
        message: String,
    },
    Read {
        path: PathBuf,
        message: String,
    },
}

impl ConfigurationError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigurationError::Invalid {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::MissingConfig => write!(f, "controller config is missing"),
            ConfigurationError::MissingMotor => write!(f, "controller has no motor bound"),
            ConfigurationError::Invalid { field, message } => {
                write!(f, "invalid controller config [{}]: {}", field, message)
            }
            ConfigurationError::Parse { message } => {
                write!(f, "controller config parse failed: {}", message)
            }
            ConfigurationError::Read { path, message } => {
                write!(
                    f,
                    "controller config read failed ({}): {}",
                    path.display(),
                    message
                )
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}
