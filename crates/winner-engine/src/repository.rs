//! PostgreSQL 仓储
//!
//! 活动定义从 `campaigns` 表加载，中奖名单写入 `campaign_winners` 表。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use crate::error::{EngineError, Result};
use crate::models::{Campaign, CampaignPolicy};

/// 活动定义仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get_campaign_by_type(&self, campaign_type: &str) -> Result<Option<Campaign>>;
}

/// 中奖名单仓储接口
///
/// 同一客户重复写入必须是幂等的，落库可能被重复触发。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WinnerRepository: Send + Sync {
    async fn save_winner(&self, campaign_id: i64, customer_id: &str) -> Result<()>;

    async fn list_winners(&self, campaign_id: i64) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// 活动定义
// ---------------------------------------------------------------------------

/// `campaigns.policy` 列的 JSON 结构
#[derive(Debug, Deserialize)]
struct PolicyJson {
    total_reward: i64,
    min_order_amount: f64,
    max_tracked_orders: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: i64,
    name: String,
    #[sqlx(rename = "type")]
    campaign_type: String,
    policy: Json<PolicyJson>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = EngineError;

    fn try_from(row: CampaignRow) -> Result<Self> {
        let policy = row.policy.0;
        let reward_count = u32::try_from(policy.total_reward).map_err(|_| {
            EngineError::InvalidPolicy(format!("total_reward 非法: {}", policy.total_reward))
        })?;
        let max_tracked_customers = u32::try_from(policy.max_tracked_orders).map_err(|_| {
            EngineError::InvalidPolicy(format!(
                "max_tracked_orders 非法: {}",
                policy.max_tracked_orders
            ))
        })?;

        let campaign = Campaign {
            id: row.id,
            name: row.name,
            campaign_type: row.campaign_type,
            start_time: row.start_time,
            end_time: row.end_time,
            policy: CampaignPolicy {
                reward_count,
                min_amount: policy.min_order_amount,
                max_tracked_customers,
            },
        };
        campaign.validate()?;
        Ok(campaign)
    }
}

pub struct PgCampaignRepository {
    pool: PgPool,
}

impl PgCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for PgCampaignRepository {
    #[instrument(skip(self))]
    async fn get_campaign_by_type(&self, campaign_type: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, name, type, policy, start_time, end_time
            FROM campaigns
            WHERE type = $1
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(campaign_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Campaign::try_from).transpose()
    }
}

// ---------------------------------------------------------------------------
// 中奖名单
// ---------------------------------------------------------------------------

pub struct PgWinnerRepository {
    pool: PgPool,
}

impl PgWinnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WinnerRepository for PgWinnerRepository {
    #[instrument(skip(self))]
    async fn save_winner(&self, campaign_id: i64, customer_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaign_winners (campaign_id, customer_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (campaign_id, customer_id) DO NOTHING
            "#,
        )
        .bind(campaign_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_winners(&self, campaign_id: i64) -> Result<Vec<String>> {
        let winners = sqlx::query_scalar::<_, String>(
            r#"
            SELECT customer_id
            FROM campaign_winners
            WHERE campaign_id = $1
            ORDER BY created_at ASC, customer_id ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(winners)
    }
}
