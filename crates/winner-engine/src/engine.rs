//! 中奖引擎门面
//!
//! 对外暴露入队与结算两个入口：校验输入、为每次存储调用加超时、记录日志与指标，
//! 并在名额恰好填满的那次结算后触发中奖名单落库。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use giveaway_shared::observability::metrics;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{EngineError, Result};
use crate::finalizer::{FinalizationReport, WinnerFinalizer};
use crate::models::{AdmitOutcome, DrainOutcome, PendingOrder, StatusUpdate};
use crate::store::CampaignStore;

pub struct WinnerEngine {
    store: Arc<dyn CampaignStore>,
    finalizer: WinnerFinalizer,
    store_timeout: Duration,
}

impl WinnerEngine {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        finalizer: WinnerFinalizer,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            finalizer,
            store_timeout,
        }
    }

    /// 登记新建订单
    #[instrument(skip(self, order), fields(order_id = %order.order_id, customer_id = %order.customer_id))]
    pub async fn admit_pending(&self, campaign_id: i64, order: &PendingOrder) -> Result<AdmitOutcome> {
        order.validate()?;

        let outcome = self
            .timed(
                "admit_pending",
                campaign_id,
                self.store.admit_pending(campaign_id, order),
            )
            .await?;

        metrics::record_admission(campaign_id, outcome.as_str());
        match outcome {
            AdmitOutcome::Admitted => info!(campaign_id, "订单已进入待定队列"),
            other => debug!(campaign_id, outcome = other.as_str(), "订单未入队"),
        }
        Ok(outcome)
    }

    /// 应用状态变更并推进队列；名额恰好填满时落库中奖名单
    #[instrument(skip(self, update), fields(order_id = %update.order_id, customer_id = %update.customer_id, status = %update.status))]
    pub async fn resolve_and_drain(
        &self,
        campaign_id: i64,
        update: &StatusUpdate,
    ) -> Result<DrainOutcome> {
        update.validate()?;

        let outcome = self
            .timed(
                "resolve_and_drain",
                campaign_id,
                self.store.resolve_and_drain(campaign_id, update),
            )
            .await?;

        metrics::record_resolution(campaign_id, update.status.as_str());
        if outcome.new_winner {
            metrics::record_promotion(campaign_id);
        }
        info!(
            campaign_id,
            new_winner = outcome.new_winner,
            finished = outcome.finished,
            "订单状态已结算"
        );

        if outcome.should_finalize() {
            metrics::record_campaign_finished(campaign_id);
            info!(campaign_id, "中奖名额已满，开始落库");
            // 状态已经提交，落库失败不能让事件重投；启动时的补偿会再次尝试
            if let Err(e) = self.finalize(campaign_id).await {
                error!(campaign_id, error = %e, "读取中奖名单失败，等待补偿落库");
            }
        }

        Ok(outcome)
    }

    /// 活动已满额时重新落库中奖名单，用于进程重启后的补偿
    pub async fn finalize_if_finished(&self, campaign_id: i64) -> Result<Option<FinalizationReport>> {
        let finished = self
            .timed(
                "is_finished",
                campaign_id,
                self.store.is_finished(campaign_id),
            )
            .await?;

        if !finished {
            return Ok(None);
        }
        self.finalize(campaign_id).await.map(Some)
    }

    pub async fn winners(&self, campaign_id: i64) -> Result<Vec<String>> {
        self.timed("winners", campaign_id, self.store.winners(campaign_id))
            .await
    }

    async fn finalize(&self, campaign_id: i64) -> Result<FinalizationReport> {
        let winners = self.winners(campaign_id).await?;
        let report = self.finalizer.finalize(campaign_id, &winners).await;
        if !report.is_complete() {
            warn!(
                campaign_id,
                failed = ?report.failed,
                "部分中奖者落库失败"
            );
        }
        Ok(report)
    }

    /// 为一次存储调用加超时并记录耗时，超时视为可重试
    async fn timed<T, F>(&self, operation: &'static str, campaign_id: i64, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::StoreTimeout {
                operation,
                campaign_id,
            }),
        };

        let status = match &result {
            Ok(_) => "ok",
            Err(EngineError::StoreTimeout { .. }) => "timeout",
            Err(_) => "error",
        };
        metrics::record_store_call(operation, status, start.elapsed().as_secs_f64());
        result
    }
}
