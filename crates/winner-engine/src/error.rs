//! 中奖引擎错误类型
//!
//! 区分可重试的瞬时故障与重试无意义的永久错误，调用方据此决定重新投递或丢弃事件。

use giveaway_shared::error::CampaignError;
use thiserror::Error;

/// 中奖引擎错误类型
#[derive(Debug, Error)]
pub enum EngineError {
    // === 活动相关 ===
    #[error("活动未注册: campaign_id={0}")]
    CampaignNotRegistered(i64),

    #[error("活动策略无效: {0}")]
    InvalidPolicy(String),

    // === 事件相关 ===
    #[error("事件无效: {0}")]
    InvalidEvent(String),

    // === 存储相关 ===
    #[error("存储调用超时: operation={operation}, campaign_id={campaign_id}")]
    StoreTimeout {
        operation: &'static str,
        campaign_id: i64,
    },

    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("脚本返回值异常: {0}")]
    UnexpectedReply(String),

    #[error(transparent)]
    Shared(#[from] CampaignError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreTimeout { .. } | Self::Redis(_) | Self::Database(_) => true,
            Self::Shared(e) => e.is_retryable(),
            Self::CampaignNotRegistered(_)
            | Self::InvalidPolicy(_)
            | Self::InvalidEvent(_)
            | Self::UnexpectedReply(_) => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::CampaignNotRegistered(_) => "CAMPAIGN_NOT_REGISTERED",
            Self::InvalidPolicy(_) => "INVALID_POLICY",
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::StoreTimeout { .. } => "STORE_TIMEOUT",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::UnexpectedReply(_) => "UNEXPECTED_REPLY",
            Self::Shared(e) => e.code(),
        }
    }
}
