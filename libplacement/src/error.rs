#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("invalid target size {0:?}: must be an integer or a percentage such as \"50%\"")]
    InvalidTargetSize(String),
    #[error("cannot derive a key for pod {namespace}/{name}: empty uid")]
    PodKey { namespace: String, name: String },
    #[error(transparent)]
    Lister(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PlacementError>;
