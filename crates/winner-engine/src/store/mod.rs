//! 活动状态存储
//!
//! 每个活动的入队与结算必须作为不可分割的步骤串行执行。
//! 内存实现用每个活动一把异步锁保证这一点，Redis 实现把整个步骤放进一次 Lua 脚本调用。

mod memory;
mod redis_store;

pub use self::memory::InMemoryCampaignStore;
pub use self::redis_store::RedisCampaignStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AdmitOutcome, DrainOutcome, PendingOrder, StatusUpdate};

/// 活动状态存储接口
///
/// 所有方法都在单个原子步骤内读取最新的活动策略。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn admit_pending(&self, campaign_id: i64, order: &PendingOrder) -> Result<AdmitOutcome>;

    async fn resolve_and_drain(
        &self,
        campaign_id: i64,
        update: &StatusUpdate,
    ) -> Result<DrainOutcome>;

    /// 当前中奖者列表
    async fn winners(&self, campaign_id: i64) -> Result<Vec<String>>;

    async fn is_finished(&self, campaign_id: i64) -> Result<bool>;
}
