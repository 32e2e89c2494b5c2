use std::fmt;
use thiserror::Error;
use tokio::time::Duration;

/// The closed error taxonomy from the reconciliation design: every fallible
/// operation inside the pipeline classifies its failure as one of these kinds
/// rather than letting an unclassified error escape to the work queue.
#[derive(Error, Debug)]
pub enum StdError {
    #[error("JsonSerializationError: {0}")]
    JsonSerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("NotFound: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("ValidationFailed: {0}")]
    ValidationFailed(String),

    #[error("DependencyNotReady: {0}")]
    DependencyNotReady(String),

    #[error("TransientRemote: {0}")]
    TransientRemote(String),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("HttpError: {0}")]
    HttpError(String),
}

impl StdError {
    /// Lowercased variant name, used as a Prometheus label value.
    pub fn metric_label(&self) -> String {
        format!("{self:?}").split_whitespace().next().unwrap_or("unknown").to_lowercase()
    }
}

#[derive(Error, Debug)]
pub struct ErrorWithRequeue {
    pub duration: Duration,
    pub error: StdError,
}

impl ErrorWithRequeue {
    pub fn new(error: StdError, duration: Duration) -> ErrorWithRequeue {
        ErrorWithRequeue { error, duration }
    }

    pub fn metric_label(&self) -> String {
        self.error.metric_label()
    }
}

impl fmt::Display for ErrorWithRequeue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),

    #[error("Error With Requeue: {0}")]
    ErrorWithRequeue(#[source] ErrorWithRequeue),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
            Error::ErrorWithRequeue(e) => e.metric_label(),
        }
    }

    /// NotFound is benign everywhere in the pipeline: the object is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::StdError(StdError::NotFound(_)))
            || matches!(self, Error::StdError(StdError::KubeError(kube::Error::Api(e))) if e.code == 404)
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        if let kube::Error::Api(ref resp) = e {
            if resp.code == 404 {
                return Error::StdError(StdError::NotFound(resp.message.clone()));
            }
            if resp.code == 409 {
                return Error::StdError(StdError::Conflict(resp.message.clone()));
            }
        }
        Error::StdError(StdError::KubeError(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "whatever".to_string(),
            code,
        })
    }

    #[test]
    fn kube_404_maps_to_not_found() {
        let err: Error = api_error(404).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn kube_409_maps_to_conflict() {
        let err: Error = api_error(409).into();
        assert!(matches!(err, Error::StdError(StdError::Conflict(_))));
    }

    #[test]
    fn other_kube_errors_fall_through_to_kube_error_variant() {
        let err: Error = api_error(500).into();
        assert!(matches!(err, Error::StdError(StdError::KubeError(_))));
        assert!(!err.is_not_found());
    }

    #[test]
    fn metric_label_is_lowercase_variant_name() {
        let err = Error::StdError(StdError::Cancelled);
        assert_eq!(err.metric_label(), "cancelled");
    }
}
