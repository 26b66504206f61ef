use thiserror::Error;

#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("Group directory unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported role manager operation: {0}")]
    Unsupported(String),

    #[error("Group hierarchy of '{subject}' is deeper than {max_depth} levels")]
    DepthExceeded { subject: String, max_depth: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, HierarchyError>;
