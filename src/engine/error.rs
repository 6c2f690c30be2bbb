use crate::calendar::ProviderError;

#[derive(Debug)]
pub enum SchedulerError {
    /// Bad window, missing cap, or otherwise unusable request. Not retried.
    Configuration(String),
    /// Pruning left too few interviewers; `group` names the first short group.
    NoInterviewersAvailable { group: Option<usize> },
    /// A group that can never be satisfied as submitted.
    MalformedGroup { index: usize, reason: String },
    Provider(ProviderError),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            SchedulerError::NoInterviewersAvailable { group: None } => {
                write!(f, "no interviewers available")
            }
            SchedulerError::NoInterviewersAvailable { group: Some(i) } => {
                write!(f, "no interviewers available: group {i} cannot be filled")
            }
            SchedulerError::MalformedGroup { index, reason } => {
                write!(f, "malformed interviewer group {index}: {reason}")
            }
            SchedulerError::Provider(e) => write!(f, "calendar provider error: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for SchedulerError {
    fn from(e: ProviderError) -> Self {
        SchedulerError::Provider(e)
    }
}
