//! 活动与订单领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub use giveaway_shared::events::OrderStatus;

// ---------------------------------------------------------------------------
// 活动
// ---------------------------------------------------------------------------

/// 活动策略：前 N 名、最低金额、追踪上限
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CampaignPolicy {
    /// 中奖名额
    pub reward_count: u32,
    /// 单笔成功订单需达到的最低金额（含等于）
    pub min_amount: f64,
    /// 合格集合最多追踪的不同客户数
    pub max_tracked_customers: u32,
}

/// 活动定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub campaign_type: String,
    pub start_time: DateTime<Utc>,
    /// 不含结束时刻
    pub end_time: DateTime<Utc>,
    pub policy: CampaignPolicy,
}

impl Campaign {
    /// 创建时间是否落在 `[start_time, end_time)` 内
    pub fn contains(&self, created_at: DateTime<Utc>) -> bool {
        created_at >= self.start_time && created_at < self.end_time
    }

    /// 待定队列排序键：相对活动开始的微秒数
    pub fn sort_key(&self, created_at: DateTime<Utc>) -> i64 {
        (created_at - self.start_time)
            .num_microseconds()
            .unwrap_or(i64::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_time >= self.end_time {
            return Err(EngineError::InvalidPolicy(format!(
                "活动 {} 时间窗口为空: {} >= {}",
                self.id, self.start_time, self.end_time
            )));
        }
        if !self.policy.min_amount.is_finite() || self.policy.min_amount < 0.0 {
            return Err(EngineError::InvalidPolicy(format!(
                "活动 {} 最低金额非法: {}",
                self.id, self.policy.min_amount
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 事件输入
// ---------------------------------------------------------------------------

/// 新建订单（入队输入）
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

impl PendingOrder {
    pub fn validate(&self) -> Result<()> {
        validate_identity(&self.order_id, &self.customer_id)?;
        validate_amount(&self.order_id, self.amount)
    }
}

/// 订单状态变更（结算输入）
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub order_id: String,
    pub customer_id: String,
    pub status: OrderStatus,
    pub amount: f64,
    pub event_time: DateTime<Utc>,
}

impl StatusUpdate {
    /// PENDING 只能由入队产生，不能作为状态变更出现
    pub fn validate(&self) -> Result<()> {
        validate_identity(&self.order_id, &self.customer_id)?;
        validate_amount(&self.order_id, self.amount)?;
        if self.status == OrderStatus::Pending {
            return Err(EngineError::InvalidEvent(format!(
                "订单 {} 的状态变更不能为 PENDING",
                self.order_id
            )));
        }
        Ok(())
    }
}

fn validate_identity(order_id: &str, customer_id: &str) -> Result<()> {
    if order_id.is_empty() {
        return Err(EngineError::InvalidEvent("订单 id 为空".to_string()));
    }
    if customer_id.is_empty() {
        return Err(EngineError::InvalidEvent(format!(
            "订单 {order_id} 缺少客户 id"
        )));
    }
    Ok(())
}

fn validate_amount(order_id: &str, amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(EngineError::InvalidEvent(format!(
            "订单 {order_id} 金额非法: {amount}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 结果
// ---------------------------------------------------------------------------

/// 入队结果
///
/// 除 `Admitted` 外都不改变任何状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    /// 订单已在待定队列中
    AlreadyAdmitted,
    /// 订单已被队首推进处理过
    AlreadySettled,
    OutsideWindow,
    CampaignFinished,
}

impl AdmitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::AlreadyAdmitted => "already_admitted",
            Self::AlreadySettled => "already_settled",
            Self::OutsideWindow => "outside_window",
            Self::CampaignFinished => "campaign_finished",
        }
    }
}

/// 结算结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainOutcome {
    /// 本次调用是否产生了新的中奖者
    pub new_winner: bool,
    /// 调用结束时名额是否已满
    pub finished: bool,
}

impl DrainOutcome {
    /// 恰好在本次调用中满额，需要触发中奖名单落库
    pub fn should_finalize(&self) -> bool {
        self.new_winner && self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn campaign() -> Campaign {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        Campaign {
            id: 1,
            name: "iPhone giveaway".to_string(),
            campaign_type: "iphone".to_string(),
            start_time: start,
            end_time: start + Duration::hours(1),
            policy: CampaignPolicy {
                reward_count: 2,
                min_amount: 200.0,
                max_tracked_customers: 3,
            },
        }
    }

    #[test]
    fn test_window_is_half_open() {
        let c = campaign();
        assert!(c.contains(c.start_time));
        assert!(c.contains(c.end_time - Duration::microseconds(1)));
        assert!(!c.contains(c.end_time));
        assert!(!c.contains(c.start_time - Duration::microseconds(1)));
    }

    #[test]
    fn test_sort_key_in_microseconds() {
        let c = campaign();
        assert_eq!(c.sort_key(c.start_time), 0);
        assert_eq!(c.sort_key(c.start_time + Duration::milliseconds(3)), 3_000);
    }

    #[test]
    fn test_validate_campaign() {
        assert!(campaign().validate().is_ok());

        let mut empty_window = campaign();
        empty_window.end_time = empty_window.start_time;
        assert!(matches!(
            empty_window.validate(),
            Err(EngineError::InvalidPolicy(_))
        ));

        let mut negative = campaign();
        negative.policy.min_amount = -0.5;
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_status_update_rejects_pending() {
        let update = StatusUpdate {
            order_id: "o-1".to_string(),
            customer_id: "c-1".to_string(),
            status: OrderStatus::Pending,
            amount: 10.0,
            event_time: Utc::now(),
        };
        assert!(matches!(
            update.validate(),
            Err(EngineError::InvalidEvent(_))
        ));

        let ok = StatusUpdate {
            status: OrderStatus::Processing,
            ..update
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_pending_order_validation() {
        let order = PendingOrder {
            order_id: String::new(),
            customer_id: "c".to_string(),
            amount: 1.0,
            created_at: Utc::now(),
        };
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_should_finalize() {
        assert!(
            DrainOutcome {
                new_winner: true,
                finished: true
            }
            .should_finalize()
        );
        assert!(
            !DrainOutcome {
                new_winner: false,
                finished: true
            }
            .should_finalize()
        );
    }
}
