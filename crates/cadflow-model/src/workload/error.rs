use thiserror::Error;

/// Reasons [`super::WorkloadSpecBuilder::build`] rejects an accumulated spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("{0} block was never initialized")]
    MissingBlock(&'static str),
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),
    #[error("invalid {field} `{value}`: must be a lowercase DNS-1123 label of at most 63 characters")]
    InvalidName { field: &'static str, value: String },
    #[error("workload has no containers")]
    NoContainers,
    #[error("duplicate container name `{0}`")]
    DuplicateContainer(String),
    #[error("container `{0}` has no image")]
    EmptyImage(String),
}
