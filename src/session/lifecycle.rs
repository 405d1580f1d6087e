//! 会话描述与生命周期错误定义。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

/// 会话的用户可见描述；两个字段去除首尾空白后都不得为空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub title: String,
    pub description: String,
}

impl SessionDescriptor {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// 校验标题与描述；失败时调用方不得产生任何副作用。
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.title.trim().is_empty() {
            return Err(SessionError::Validation { field: "title" });
        }
        if self.description.trim().is_empty() {
            return Err(SessionError::Validation { field: "description" });
        }
        Ok(())
    }

    /// 返回去除首尾空白后的副本；线上消息始终携带规整后的字段。
    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {field} must not be empty")]
    Validation { field: &'static str },
    #[error("a session is already active")]
    AlreadyActive,
    #[error("failed to connect to backend: {0}")]
    Connect(#[from] TransportError),
}
