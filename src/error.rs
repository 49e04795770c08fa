use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("port `{0}` is invalid")]
    InvalidPort(String),
    #[error("No ports selected.")]
    NoPortsSelected,
    #[error("Could not resolve {target} for {kind} addresses.")]
    Unresolved { target: String, kind: &'static str },
    #[error("timeout `{0}` must be a positive number of seconds")]
    InvalidTimeout(String),
    #[error("worker count must be at least 1")]
    InvalidConcurrency,
    #[error("failed to build worker pool: {0}")]
    WorkerPoolFailed(#[source] rayon::ThreadPoolBuildError),
}
