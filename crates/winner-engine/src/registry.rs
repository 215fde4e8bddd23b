//! 活动注册表
//!
//! 保存引擎在每个事件中读取的活动策略。Redis 实现与原子脚本共用同一个策略哈希，
//! 脚本在原子步骤内部直接读取，策略变更对下一个事件立即生效。

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use giveaway_shared::cache::{Cache, CampaignKeys};
use tracing::{info, instrument};

use crate::error::{EngineError, Result};
use crate::models::{Campaign, CampaignPolicy};

/// 活动注册表接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRegistry: Send + Sync {
    /// 发布（创建或覆盖）活动策略
    async fn publish(&self, campaign: &Campaign) -> Result<()>;

    async fn get(&self, campaign_id: i64) -> Result<Option<Campaign>>;
}

// ---------------------------------------------------------------------------
// 内存实现
// ---------------------------------------------------------------------------

/// 单实例部署与测试使用的内存注册表
#[derive(Default)]
pub struct InMemoryCampaignRegistry {
    campaigns: DashMap<i64, Campaign>,
}

impl InMemoryCampaignRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignRegistry for InMemoryCampaignRegistry {
    async fn publish(&self, campaign: &Campaign) -> Result<()> {
        campaign.validate()?;
        self.campaigns.insert(campaign.id, campaign.clone());
        info!(campaign_id = campaign.id, "活动策略已发布");
        Ok(())
    }

    async fn get(&self, campaign_id: i64) -> Result<Option<Campaign>> {
        Ok(self.campaigns.get(&campaign_id).map(|c| c.clone()))
    }
}

// ---------------------------------------------------------------------------
// Redis 实现
// ---------------------------------------------------------------------------

pub(crate) mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const START_TIME_MICRO: &str = "start_time_micro";
    pub const END_TIME_MICRO: &str = "end_time_micro";
    pub const TOTAL_REWARD: &str = "policy_total_reward";
    pub const MIN_ORDER_AMOUNT: &str = "policy_min_order_amount";
    pub const MAX_TRACKED_ORDERS: &str = "policy_max_tracked_orders";
}

/// Redis 注册表，策略保存在 `{campaign:<id>}:policy` 哈希中
#[derive(Clone)]
pub struct RedisCampaignRegistry {
    cache: Cache,
}

impl RedisCampaignRegistry {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CampaignRegistry for RedisCampaignRegistry {
    #[instrument(skip(self, campaign), fields(campaign_id = campaign.id))]
    async fn publish(&self, campaign: &Campaign) -> Result<()> {
        campaign.validate()?;

        let key = CampaignKeys::new(campaign.id).policy();
        let mut conn = self.cache.connection().await?;

        let _: () = redis::cmd("HSET")
            .arg(&key)
            .arg(fields::ID)
            .arg(campaign.id)
            .arg(fields::NAME)
            .arg(&campaign.name)
            .arg(fields::TYPE)
            .arg(&campaign.campaign_type)
            .arg(fields::START_TIME_MICRO)
            .arg(campaign.start_time.timestamp_micros())
            .arg(fields::END_TIME_MICRO)
            .arg(campaign.end_time.timestamp_micros())
            .arg(fields::TOTAL_REWARD)
            .arg(campaign.policy.reward_count)
            .arg(fields::MIN_ORDER_AMOUNT)
            .arg(campaign.policy.min_amount.to_string())
            .arg(fields::MAX_TRACKED_ORDERS)
            .arg(campaign.policy.max_tracked_customers)
            .query_async(&mut conn)
            .await?;

        info!(key = %key, "活动策略已发布到 Redis");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, campaign_id: i64) -> Result<Option<Campaign>> {
        let key = CampaignKeys::new(campaign_id).policy();
        let mut conn = self.cache.connection().await?;

        let hash: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        if hash.is_empty() {
            return Ok(None);
        }
        campaign_from_hash(&hash).map(Some)
    }
}

/// 从策略哈希还原活动
pub(crate) fn campaign_from_hash(hash: &HashMap<String, String>) -> Result<Campaign> {
    Ok(Campaign {
        id: parse_field(hash, fields::ID)?,
        name: hash.get(fields::NAME).cloned().unwrap_or_default(),
        campaign_type: hash.get(fields::TYPE).cloned().unwrap_or_default(),
        start_time: parse_micros(hash, fields::START_TIME_MICRO)?,
        end_time: parse_micros(hash, fields::END_TIME_MICRO)?,
        policy: CampaignPolicy {
            reward_count: parse_field(hash, fields::TOTAL_REWARD)?,
            min_amount: parse_field(hash, fields::MIN_ORDER_AMOUNT)?,
            max_tracked_customers: parse_field(hash, fields::MAX_TRACKED_ORDERS)?,
        },
    })
}

fn parse_field<T: FromStr>(hash: &HashMap<String, String>, field: &str) -> Result<T> {
    hash.get(field)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| EngineError::InvalidPolicy(format!("策略字段缺失或无法解析: {field}")))
}

fn parse_micros(hash: &HashMap<String, String>, field: &str) -> Result<DateTime<Utc>> {
    let micros: i64 = parse_field(hash, field)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| EngineError::InvalidPolicy(format!("时间戳越界: {field}={micros}")))
}
