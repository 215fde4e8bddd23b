//! 订单事件服务错误类型
//!
//! 透传引擎与共享库错误，并按是否可重试、是否为坏消息分类，
//! 消费循环据此决定重新投递、写入死信队列或直接提交位点。

use giveaway_shared::error::CampaignError;
use thiserror::Error;
use winner_engine::EngineError;

#[derive(Debug, Error)]
pub enum OrderEventError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Shared(#[from] CampaignError),
}

impl OrderEventError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(e) => e.is_retryable(),
            Self::Shared(e) => e.is_retryable(),
        }
    }

    /// 负载本身有问题，重投不会改变结果
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Shared(CampaignError::MalformedEvent(_))
                | Self::Engine(EngineError::InvalidEvent(_))
                | Self::Engine(EngineError::Shared(CampaignError::MalformedEvent(_)))
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(e) => e.code(),
            Self::Shared(e) => e.code(),
        }
    }

    /// 转换为消费循环使用的共享错误，保留可重试语义
    pub fn into_shared(self) -> CampaignError {
        match self {
            Self::Shared(e) | Self::Engine(EngineError::Shared(e)) => e,
            Self::Engine(EngineError::Redis(e)) => CampaignError::Redis(e),
            Self::Engine(EngineError::Database(e)) => CampaignError::Database(e),
            Self::Engine(EngineError::StoreTimeout {
                operation,
                campaign_id,
            }) => CampaignError::StoreTimeout {
                operation: format!("{operation} (campaign_id={campaign_id})"),
            },
            Self::Engine(EngineError::InvalidEvent(msg)) => CampaignError::MalformedEvent(msg),
            Self::Engine(e) => CampaignError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = OrderEventError::from(EngineError::StoreTimeout {
            operation: "resolve_and_drain",
            campaign_id: 3,
        });
        assert!(err.is_retryable());
        assert!(!err.is_malformed());
        assert_eq!(err.code(), "STORE_TIMEOUT");

        let err = OrderEventError::from(CampaignError::MalformedEvent("bad json".to_string()));
        assert!(!err.is_retryable());
        assert!(err.is_malformed());

        let err = OrderEventError::from(EngineError::CampaignNotRegistered(9));
        assert!(!err.is_retryable());
        assert!(!err.is_malformed());
    }

    #[test]
    fn test_into_shared_keeps_retryability() {
        let shared = OrderEventError::from(EngineError::StoreTimeout {
            operation: "admit_pending",
            campaign_id: 1,
        })
        .into_shared();
        assert!(shared.is_retryable());
        assert_eq!(shared.to_string(), "存储调用超时: admit_pending (campaign_id=1)");

        let shared = OrderEventError::from(EngineError::InvalidEvent("empty".to_string()))
            .into_shared();
        assert!(matches!(shared, CampaignError::MalformedEvent(_)));

        let shared = OrderEventError::from(EngineError::CampaignNotRegistered(2)).into_shared();
        assert!(!shared.is_retryable());
        assert_eq!(shared.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_display_is_transparent() {
        let err = OrderEventError::from(EngineError::CampaignNotRegistered(7));
        assert_eq!(err.to_string(), "活动未注册: campaign_id=7");
    }
}
