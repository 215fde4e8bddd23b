//! 订单事件处理器
//!
//! 把线上订单事件转换为引擎输入：新建事件进入待定队列，状态事件触发结算。

use std::sync::Arc;

use async_trait::async_trait;
use giveaway_shared::error::CampaignError;
use giveaway_shared::events::{OrderEvent, OrderStatus};
use winner_engine::{AdmitOutcome, DrainOutcome, PendingOrder, StatusUpdate, WinnerEngine};

use crate::error::OrderEventError;

/// 订单事件处理接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderEventHandler: Send + Sync {
    async fn on_order_created(&self, event: &OrderEvent) -> Result<AdmitOutcome, OrderEventError>;

    async fn on_order_status(&self, event: &OrderEvent) -> Result<DrainOutcome, OrderEventError>;
}

/// 单个活动的订单事件处理器
pub struct OrderEventProcessor {
    engine: Arc<WinnerEngine>,
    campaign_id: i64,
}

impl OrderEventProcessor {
    pub fn new(engine: Arc<WinnerEngine>, campaign_id: i64) -> Self {
        Self {
            engine,
            campaign_id,
        }
    }
}

#[async_trait]
impl OrderEventHandler for OrderEventProcessor {
    async fn on_order_created(&self, event: &OrderEvent) -> Result<AdmitOutcome, OrderEventError> {
        let order = pending_order_from(event);
        Ok(self.engine.admit_pending(self.campaign_id, &order).await?)
    }

    async fn on_order_status(&self, event: &OrderEvent) -> Result<DrainOutcome, OrderEventError> {
        let update = status_update_from(event)?;
        Ok(self
            .engine
            .resolve_and_drain(self.campaign_id, &update)
            .await?)
    }
}

/// 新建事件只关心创建时间，状态字段不参与排序
pub fn pending_order_from(event: &OrderEvent) -> PendingOrder {
    PendingOrder {
        order_id: event.id.clone(),
        customer_id: event.customer_id.clone(),
        amount: event.total_amount,
        created_at: event.created_at,
    }
}

pub fn status_update_from(event: &OrderEvent) -> Result<StatusUpdate, OrderEventError> {
    if event.status == OrderStatus::Pending {
        return Err(CampaignError::MalformedEvent(format!(
            "状态 topic 上的订单 {} 状态为 PENDING",
            event.id
        ))
        .into());
    }

    Ok(StatusUpdate {
        order_id: event.id.clone(),
        customer_id: event.customer_id.clone(),
        status: event.status,
        amount: event.total_amount,
        event_time: event.event_time(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use giveaway_shared::test_utils::TestDataGenerator;

    fn created() -> OrderEvent {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        TestDataGenerator::pending_order("O1", "A", 250.0, base, 1_000)
    }

    #[test]
    fn test_pending_order_from_event() {
        let event = created();
        let order = pending_order_from(&event);
        assert_eq!(order.order_id, "O1");
        assert_eq!(order.customer_id, "A");
        assert_eq!(order.amount, 250.0);
        assert_eq!(order.created_at, event.created_at);
    }

    #[test]
    fn test_status_update_uses_event_time() {
        let event = TestDataGenerator::status_update(&created(), OrderStatus::Success);
        let update = status_update_from(&event).unwrap();
        assert_eq!(update.status, OrderStatus::Success);
        assert_eq!(Some(update.event_time), event.updated_at);
    }

    #[test]
    fn test_pending_on_status_topic_is_malformed() {
        let err = status_update_from(&created()).unwrap_err();
        assert!(err.is_malformed());
        assert!(!err.is_retryable());
    }
}
