// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 标注核心错误类型
//! Error taxonomy of the annotation core

use thiserror::Error;

/// 标注操作错误 (均可恢复, 失败时不修改任何状态)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("object {0} does not exist")]
    NotFound(u32),
    #[error("object {0} has already been deleted")]
    AlreadyDeleted(u32),
    #[error("object {0} has not been deleted")]
    NotDeleted(u32),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("id remap chain starting at {0} loops")]
    CycleDetected(u32),
}

impl AnnotationError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type AnnotationResult<T> = Result<T, AnnotationError>;
