//! 摄像头与对端媒体协作者接口。

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 媒体采集约束；默认同时请求视频与音频。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media permission denied: {reason}")]
    PermissionDenied { reason: String },
    #[error("no capture device available")]
    DeviceUnavailable,
    #[error("media backend failure: {0}")]
    Backend(String),
}

/// 一路已经打开的媒体流。
#[async_trait]
pub trait MediaStream: Send + Sync {
    /// 停止所有媒体轨道；重复调用必须安全。
    async fn release(&self);
}

pub type MediaStreamHandle = Arc<dyn MediaStream>;

/// 摄像头/麦克风采集协作者。采集失败只会降级会话，不会中止。
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<MediaStreamHandle, MediaError>;
}

/// WebRTC 对端协作者；核心只负责转交 answer 描述，不参与协商。
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn apply_answer(&self, sdp: &str) -> anyhow::Result<()>;
}

/// 无媒体后端环境下的占位实现。
#[derive(Debug, Default)]
pub struct NullMediaSource;

#[async_trait]
impl MediaSource for NullMediaSource {
    async fn acquire(
        &self,
        _constraints: MediaConstraints,
    ) -> Result<MediaStreamHandle, MediaError> {
        Err(MediaError::DeviceUnavailable)
    }
}
