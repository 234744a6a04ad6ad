use thiserror::Error;

/// Classification of a failure, independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An argument value is unacceptable.
    InvalidParam,

    /// An index is out of range.
    InvalidRange,

    /// A required prerequisite is missing or a computation broke down.
    InvalidState,

    /// Construction could not obtain storage.
    BadAllocation,

    /// Anything else (parsing, serialization).
    Other,
}

/// Error types for the psrmeal library.
#[derive(Error, Debug)]
pub enum MealError {
    /// Bad argument value.
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// Index greater than or equal to the size of the addressed collection.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Operation attempted on an object that is missing a prerequisite:
    /// no model set, singular matrix, non-finite chi-squared.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage could not be reserved.
    #[error("Bad allocation: {0}")]
    BadAllocation(String),

    /// Text could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MealError {
    pub fn invalid_param(location: &str, message: impl AsRef<str>) -> Self {
        MealError::InvalidParam(format!("{} {}", location, message.as_ref()))
    }

    pub fn invalid_range(location: &str, message: impl AsRef<str>) -> Self {
        MealError::InvalidRange(format!("{} {}", location, message.as_ref()))
    }

    pub fn invalid_state(location: &str, message: impl AsRef<str>) -> Self {
        MealError::InvalidState(format!("{} {}", location, message.as_ref()))
    }

    /// The taxonomy code of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MealError::InvalidParam(_) => ErrorKind::InvalidParam,
            MealError::InvalidRange(_) => ErrorKind::InvalidRange,
            MealError::InvalidState(_) => ErrorKind::InvalidState,
            MealError::BadAllocation(_) => ErrorKind::BadAllocation,
            MealError::Parse(_) | MealError::Json(_) => ErrorKind::Other,
        }
    }

    /// Append the name of the calling method to the message trail.
    ///
    /// The original message is kept; each layer that the error passes
    /// through adds one `in <location>` line, so the final message reads
    /// from the point of failure outwards.
    pub fn context(self, location: impl AsRef<str>) -> Self {
        let location = location.as_ref();
        match self {
            MealError::InvalidParam(m) => MealError::InvalidParam(chain(m, location)),
            MealError::InvalidRange(m) => MealError::InvalidRange(chain(m, location)),
            MealError::InvalidState(m) => MealError::InvalidState(chain(m, location)),
            MealError::BadAllocation(m) => MealError::BadAllocation(chain(m, location)),
            MealError::Parse(m) => MealError::Parse(chain(m, location)),
            other => other,
        }
    }

    /// The bare message, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            MealError::InvalidParam(m)
            | MealError::InvalidRange(m)
            | MealError::InvalidState(m)
            | MealError::BadAllocation(m)
            | MealError::Parse(m) => m.clone(),
            MealError::Json(e) => e.to_string(),
        }
    }
}

fn chain(message: String, location: &str) -> String {
    format!("{}\n\tin {}", message, location)
}

/// Adds [`MealError::context`] to any `Result` carrying a [`MealError`].
pub trait ResultExt<T> {
    fn context(self, location: impl AsRef<str>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, location: impl AsRef<str>) -> Result<T> {
        self.map_err(|e| e.context(location))
    }
}

/// Result type alias for psrmeal operations.
pub type Result<T> = std::result::Result<T, MealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MealError::invalid_range("Composite::get_imap", "index=4 >= nparam=3");
        assert!(format!("{}", err).contains("index=4 >= nparam=3"));
        assert!(format!("{}", err).starts_with("Invalid range"));
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[test]
    fn test_context_chain() {
        let err = MealError::invalid_state("Congruence::calculate", "no transformation")
            .context("Product::calculate")
            .context("ModelFit::solve");

        let message = err.message();
        assert!(message.starts_with("Congruence::calculate no transformation"));
        let first = message.find("in Product::calculate").unwrap();
        let second = message.find("in ModelFit::solve").unwrap();
        assert!(first < second);
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(MealError::InvalidParam("smoothing=1.5".to_string()));
        let err = result.context("set_smoothing").unwrap_err();
        assert!(err.message().contains("in set_smoothing"));
        assert_eq!(err.kind(), ErrorKind::InvalidParam);
    }

    #[test]
    fn test_json_conversion() {
        let json_err = serde_json::from_str::<f64>("not a number").unwrap_err();
        let err: MealError = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Other);
        match err.context("load") {
            MealError::Json(_) => (),
            _ => panic!("Expected Json variant"),
        }
    }
}
