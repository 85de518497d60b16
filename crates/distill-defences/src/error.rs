use std::error::Error;
use std::fmt;

/// Which side of a distillation a classifier is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierRole {
    /// The already trained classifier whose outputs are distilled.
    Trained,
    /// The classifier being trained on the distilled outputs.
    Transformed,
}

impl ClassifierRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierRole::Trained => "trained",
            ClassifierRole::Transformed => "transformed",
        }
    }
}

/// Error type shared by the classifiers, the defences and the scorers.
#[derive(Debug)]
pub enum DefenceError {
    /// A classifier handed to a defence does not output probability vectors.
    NonProbabilityOutput(ClassifierRole),
    InvalidParameter(String),
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    EmptyInput,
    /// Failure reported by a numeric backend (candle).
    Backend(String),
    /// Malformed or unreadable data set.
    Data(String),
}

impl DefenceError {
    /// True for errors caused by the arguments of a call rather than by a backend or data source.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            DefenceError::NonProbabilityOutput(_)
                | DefenceError::InvalidParameter(_)
                | DefenceError::ShapeMismatch { .. }
                | DefenceError::EmptyInput
        )
    }
}

impl fmt::Display for DefenceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DefenceError::NonProbabilityOutput(role) => write!(
                f,
                "The input {} classifier do not produce probability outputs.",
                role.as_str()
            ),
            DefenceError::InvalidParameter(msg) => write!(f, "{}", msg),
            DefenceError::ShapeMismatch { expected, found } => write!(
                f,
                "Shape mismatch: expected {:?}, found {:?}",
                expected, found
            ),
            DefenceError::EmptyInput => write!(f, "Input must contain at least one sample"),
            DefenceError::Backend(msg) => write!(f, "Backend error: {}", msg),
            DefenceError::Data(msg) => write!(f, "Data error: {}", msg),
        }
    }
}

impl Error for DefenceError {}

impl From<candle_core::Error> for DefenceError {
    fn from(err: candle_core::Error) -> Self {
        DefenceError::Backend(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DefenceError {
    fn from(err: ndarray::ShapeError) -> Self {
        DefenceError::Data(err.to_string())
    }
}

impl From<csv::Error> for DefenceError {
    fn from(err: csv::Error) -> Self {
        DefenceError::Data(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DefenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_probability_message_matches_role() {
        let err = DefenceError::NonProbabilityOutput(ClassifierRole::Trained);
        assert_eq!(
            err.to_string(),
            "The input trained classifier do not produce probability outputs."
        );
        let err = DefenceError::NonProbabilityOutput(ClassifierRole::Transformed);
        assert!(err.to_string().contains("transformed classifier"));
    }

    #[test]
    fn backend_errors_are_not_invalid_arguments() {
        assert!(DefenceError::EmptyInput.is_invalid_argument());
        assert!(!DefenceError::Backend("oom".to_string()).is_invalid_argument());
    }
}
