//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 未安装 recorder 时（单元测试）所有记录函数都是空操作。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "campaign_admissions_total",
        "Pending orders offered to a campaign, by outcome"
    );
    metrics::describe_counter!(
        "campaign_resolutions_total",
        "Order status updates applied, by status"
    );
    metrics::describe_counter!(
        "campaign_promotions_total",
        "Customers promoted to winners"
    );
    metrics::describe_counter!(
        "campaign_finished_total",
        "Campaigns that reached their winner cap"
    );
    metrics::describe_counter!(
        "campaign_finalizations_total",
        "Winner records persisted at finalization, by status"
    );
    metrics::describe_histogram!(
        "campaign_store_duration_seconds",
        "Latency of one atomic state-store step"
    );
    metrics::describe_counter!(
        "kafka_messages_total",
        "Kafka messages consumed, by topic and outcome"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录候选订单入队结果
#[inline]
pub fn record_admission(campaign_id: i64, outcome: &str) {
    metrics::counter!(
        "campaign_admissions_total",
        "campaign_id" => campaign_id.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 记录订单状态结算
#[inline]
pub fn record_resolution(campaign_id: i64, status: &str) {
    metrics::counter!(
        "campaign_resolutions_total",
        "campaign_id" => campaign_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录新增中奖者
#[inline]
pub fn record_promotion(campaign_id: i64) {
    metrics::counter!(
        "campaign_promotions_total",
        "campaign_id" => campaign_id.to_string()
    )
    .increment(1);
}

/// 记录活动名额满
#[inline]
pub fn record_campaign_finished(campaign_id: i64) {
    metrics::counter!(
        "campaign_finished_total",
        "campaign_id" => campaign_id.to_string()
    )
    .increment(1);
}

/// 记录单个中奖记录的落库结果
#[inline]
pub fn record_finalization(campaign_id: i64, status: &str) {
    metrics::counter!(
        "campaign_finalizations_total",
        "campaign_id" => campaign_id.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录一次原子存储调用的耗时
#[inline]
pub fn record_store_call(operation: &str, status: &str, duration_secs: f64) {
    metrics::histogram!(
        "campaign_store_duration_seconds",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .record(duration_secs);
}

/// 记录 Kafka 消息处理结果
#[inline]
pub fn record_kafka_message(topic: &str, outcome: &str) {
    metrics::counter!(
        "kafka_messages_total",
        "topic" => topic.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
