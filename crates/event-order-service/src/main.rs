//! 订单事件服务
//!
//! 加载当前活动并发布策略，启动时补偿落库，然后消费订单事件直到收到关闭信号。

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use giveaway_shared::{
    cache::Cache, config::AppConfig, database::Database, dlq::DlqProducer, kafka::KafkaProducer,
    observability,
};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use winner_engine::{
    Campaign, CampaignRegistry, CampaignRepository, CampaignStore, InMemoryCampaignRegistry,
    InMemoryCampaignStore, PgCampaignRepository, PgWinnerRepository, RedisCampaignRegistry,
    RedisCampaignStore, WinnerEngine, WinnerFinalizer,
};

use event_order_service::{OrderEventConsumer, OrderEventProcessor};

const SERVICE_NAME: &str = "event-order-service";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置并初始化可观测性
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });
    let _guard = observability::init(&config.observability).await?;

    info!("Starting event-order-service...");
    info!(
        environment = %config.environment,
        campaign_type = %config.campaign.campaign_type,
        store_backend = %config.campaign.store_backend,
        "Configuration loaded"
    );

    // 2. 数据库与当前活动
    let db = Database::connect(&config.database).await?;
    let pool = db.pool().clone();
    info!("Database connection established");

    let campaign = PgCampaignRepository::new(pool.clone())
        .get_campaign_by_type(&config.campaign.campaign_type)
        .await?
        .ok_or_else(|| anyhow!("活动不存在: type={}", config.campaign.campaign_type))?;
    info!(
        campaign_id = campaign.id,
        reward_count = campaign.policy.reward_count,
        min_amount = campaign.policy.min_amount,
        "Campaign loaded"
    );

    // 3. 发布策略并选择状态存储
    let store = build_store(&config, &campaign).await?;

    // 4. 引擎与启动补偿
    let finalizer = WinnerFinalizer::new(
        Arc::new(PgWinnerRepository::new(pool.clone())),
        config.campaign.retry.to_policy(),
    );
    let engine = Arc::new(WinnerEngine::new(
        store,
        finalizer,
        config.campaign.store_timeout(),
    ));

    if let Some(report) = engine
        .finalize_if_finished(campaign.id)
        .await
        .context("启动补偿落库失败")?
    {
        info!(
            campaign_id = campaign.id,
            saved = report.saved.len(),
            failed = report.failed.len(),
            "活动已满额，已补偿落库中奖名单"
        );
    }

    // 5. Kafka 消费
    let producer = KafkaProducer::new(&config.kafka)?;
    let dead_letters = Arc::new(DlqProducer::new(producer, SERVICE_NAME));
    let processor = Arc::new(OrderEventProcessor::new(engine, campaign.id));
    let consumer = OrderEventConsumer::new(&config, processor, dead_letters)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await?;

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 按配置构建状态存储，并把活动策略发布到对应的注册表
async fn build_store(config: &AppConfig, campaign: &Campaign) -> Result<Arc<dyn CampaignStore>> {
    match config.campaign.store_backend.as_str() {
        "redis" => {
            let cache = Cache::new(&config.redis)?;
            cache.health_check().await?;
            info!("Redis connection established");

            RedisCampaignRegistry::new(cache.clone())
                .publish(campaign)
                .await?;
            Ok(Arc::new(RedisCampaignStore::new(cache)))
        }
        "memory" => {
            let registry = Arc::new(InMemoryCampaignRegistry::new());
            registry.publish(campaign).await?;
            info!("Using in-memory campaign store (single instance only)");
            Ok(Arc::new(InMemoryCampaignStore::new(registry)))
        }
        other => bail!("未知的存储后端: {other}"),
    }
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
