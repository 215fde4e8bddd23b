//! 订单事件模型
//!
//! 订单服务通过 Kafka 发布订单创建与状态变更事件，活动服务据此驱动中奖判定。
//! 两个 topic 共用同一负载格式。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CampaignError;

// ---------------------------------------------------------------------------
// OrderStatus - 订单状态
// ---------------------------------------------------------------------------

/// 订单状态
///
/// PENDING 与 PROCESSING 为未决状态，SUCCESS 与 FAILED 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl OrderStatus {
    /// 终态订单不会再变化，可以在待定队列中被越过
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(CampaignError::MalformedEvent(format!(
                "未知的订单状态: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderEvent - 订单事件负载
// ---------------------------------------------------------------------------

/// 订单事件负载
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderEvent {
    /// 订单 ID，全局唯一
    pub id: String,
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    pub total_amount: f64,
    pub status: OrderStatus,
    /// 订单创建时间，决定排队先后
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderEvent {
    /// 校验必填字段
    ///
    /// 失败返回 `MalformedEvent`，这类事件重试无意义，直接进入死信队列
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.id.trim().is_empty() {
            return Err(CampaignError::MalformedEvent("订单 id 为空".to_string()));
        }
        if self.customer_id.trim().is_empty() {
            return Err(CampaignError::MalformedEvent(format!(
                "订单 {} 缺少 customer_id",
                self.id
            )));
        }
        if !self.total_amount.is_finite() || self.total_amount < 0.0 {
            return Err(CampaignError::MalformedEvent(format!(
                "订单 {} 金额非法: {}",
                self.id, self.total_amount
            )));
        }
        Ok(())
    }

    /// 状态事件的发生时间，缺省时退回创建时间
    pub fn event_time(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}
