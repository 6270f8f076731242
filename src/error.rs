// src/error.rs

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum PerceptionError {
    #[error("template directory not found: {0}")]
    TemplateDirNotFound(PathBuf),

    #[error("no valid templates loaded from {0}")]
    EmptyTemplateStore(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("template matching failed: {0}")]
    DetectionBackend(String),
}

impl PerceptionError {
    /// Errors that make the engine impossible to construct.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::TemplateDirNotFound(_) | Self::EmptyTemplateStore(_) | Self::InvalidConfig(_)
        )
    }
}
