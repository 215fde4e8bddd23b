//! Redis 存储：多实例共享状态
//!
//! 入队与结算各是一段 Lua 脚本，Redis 单线程执行脚本，整个步骤天然原子。
//! 所有键共享 `{campaign:<id>}` 哈希标签，脚本在 Redis Cluster 下同样有效。

use async_trait::async_trait;
use giveaway_shared::cache::{Cache, CampaignKeys};
use redis::Script;
use tracing::instrument;

use super::CampaignStore;
use crate::error::{EngineError, Result};
use crate::models::{AdmitOutcome, DrainOutcome, PendingOrder, StatusUpdate};
use crate::registry::fields;

const ADMIT_PENDING_SCRIPT: &str = include_str!("scripts/admit_pending.lua");
const RESOLVE_AND_DRAIN_SCRIPT: &str = include_str!("scripts/resolve_and_drain.lua");

pub struct RedisCampaignStore {
    cache: Cache,
    admit_pending: Script,
    resolve_and_drain: Script,
}

impl RedisCampaignStore {
    pub fn new(cache: Cache) -> Self {
        Self {
            cache,
            admit_pending: Script::new(ADMIT_PENDING_SCRIPT),
            resolve_and_drain: Script::new(RESOLVE_AND_DRAIN_SCRIPT),
        }
    }
}

#[async_trait]
impl CampaignStore for RedisCampaignStore {
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn admit_pending(&self, campaign_id: i64, order: &PendingOrder) -> Result<AdmitOutcome> {
        let keys = CampaignKeys::new(campaign_id);
        let mut conn = self.cache.connection().await?;

        // EVALSHA，脚本未缓存时自动回退到 EVAL
        let code: i64 = self
            .admit_pending
            .key(keys.policy())
            .key(keys.ledger())
            .key(keys.pending_orders())
            .key(keys.winners())
            .arg(&order.order_id)
            .arg(&order.customer_id)
            .arg(order.created_at.timestamp_micros())
            .invoke_async(&mut conn)
            .await?;

        admit_outcome_from_code(campaign_id, code)
    }

    #[instrument(skip(self, update), fields(order_id = %update.order_id, status = %update.status))]
    async fn resolve_and_drain(
        &self,
        campaign_id: i64,
        update: &StatusUpdate,
    ) -> Result<DrainOutcome> {
        let keys = CampaignKeys::new(campaign_id);
        let mut conn = self.cache.connection().await?;

        let reply: (i64, i64) = self
            .resolve_and_drain
            .key(keys.policy())
            .key(keys.ledger())
            .key(keys.pending_orders())
            .key(keys.progress())
            .key(keys.eligible())
            .key(keys.winners())
            .arg(&update.order_id)
            .arg(&update.customer_id)
            .arg(update.status.as_str())
            .arg(update.amount.to_string())
            .invoke_async(&mut conn)
            .await?;

        drain_outcome_from_reply(campaign_id, reply)
    }

    async fn winners(&self, campaign_id: i64) -> Result<Vec<String>> {
        let keys = CampaignKeys::new(campaign_id);
        let mut conn = self.cache.connection().await?;

        let mut winners: Vec<String> = redis::cmd("SMEMBERS")
            .arg(keys.winners())
            .query_async(&mut conn)
            .await?;
        winners.sort();
        Ok(winners)
    }

    async fn is_finished(&self, campaign_id: i64) -> Result<bool> {
        let keys = CampaignKeys::new(campaign_id);
        let mut conn = self.cache.connection().await?;

        let (count, reward): (u64, Option<u64>) = redis::pipe()
            .atomic()
            .cmd("SCARD")
            .arg(keys.winners())
            .cmd("HGET")
            .arg(keys.policy())
            .arg(fields::TOTAL_REWARD)
            .query_async(&mut conn)
            .await?;

        let reward = reward.ok_or(EngineError::CampaignNotRegistered(campaign_id))?;
        Ok(count >= reward)
    }
}

fn admit_outcome_from_code(campaign_id: i64, code: i64) -> Result<AdmitOutcome> {
    match code {
        -1 => Err(EngineError::CampaignNotRegistered(campaign_id)),
        0 => Ok(AdmitOutcome::OutsideWindow),
        1 => Ok(AdmitOutcome::CampaignFinished),
        2 => Ok(AdmitOutcome::Admitted),
        3 => Ok(AdmitOutcome::AlreadyAdmitted),
        4 => Ok(AdmitOutcome::AlreadySettled),
        other => Err(EngineError::UnexpectedReply(format!(
            "入队脚本返回未知结果: {other}"
        ))),
    }
}

fn drain_outcome_from_reply(campaign_id: i64, reply: (i64, i64)) -> Result<DrainOutcome> {
    match reply {
        (-1, -1) => Err(EngineError::CampaignNotRegistered(campaign_id)),
        (new_winner @ 0..=1, finished @ 0..=1) => Ok(DrainOutcome {
            new_winner: new_winner == 1,
            finished: finished == 1,
        }),
        other => Err(EngineError::UnexpectedReply(format!(
            "结算脚本返回未知结果: {other:?}"
        ))),
    }
}
