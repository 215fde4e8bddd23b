//! Redis 连接管理模块
//!
//! 提供 Redis 连接管理以及活动状态的键空间约定。

use crate::config::RedisConfig;
use crate::error::{CampaignError, Result};
use redis::Client;
use redis::aio::MultiplexedConnection;
use tracing::info;

/// Redis 客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    /// 获取多路复用连接
    ///
    /// 连接可廉价克隆，脚本执行与普通命令共用
    pub async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(CampaignError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(CampaignError::from)
    }
}

/// 活动键空间
///
/// 所有键共享 `{campaign:<id>}` 哈希标签，保证在 Redis Cluster 下落在同一个槽，
/// 原子脚本可以在一次调用中访问全部键。
#[derive(Debug, Clone)]
pub struct CampaignKeys {
    prefix: String,
}

impl CampaignKeys {
    pub fn new(campaign_id: i64) -> Self {
        Self {
            prefix: format!("{{campaign:{}}}", campaign_id),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 活动策略哈希（时间窗口、奖励数量、最低金额、追踪上限）
    pub fn policy(&self) -> String {
        format!("{}:policy", self.prefix)
    }

    /// 订单台账哈希，字段为 `<order_id>:customer`、`<order_id>:status`、`<order_id>:drained`
    pub fn ledger(&self) -> String {
        format!("{}:ledger", self.prefix)
    }

    /// 待定订单有序集合，分数为相对活动开始的微秒数
    pub fn pending_orders(&self) -> String {
        format!("{}:pending_orders", self.prefix)
    }

    /// 客户成功订单的最大金额
    pub fn progress(&self) -> String {
        format!("{}:progress", self.prefix)
    }

    pub fn eligible(&self) -> String {
        format!("{}:eligible", self.prefix)
    }

    pub fn winners(&self) -> String {
        format!("{}:winners", self.prefix)
    }
}
