//! 中奖名单落库
//!
//! 名额满时把中奖集合逐个写入持久化存储。单个客户写入失败只记录日志，
//! 不影响其余客户；仓储写入是幂等的，整个落库过程可以安全地重复触发。

use std::sync::Arc;

use giveaway_shared::observability::metrics;
use giveaway_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::{error, info};

use crate::error::EngineError;
use crate::repository::WinnerRepository;

/// 落库结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizationReport {
    pub saved: Vec<String>,
    pub failed: Vec<String>,
}

impl FinalizationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct WinnerFinalizer {
    repository: Arc<dyn WinnerRepository>,
    retry_policy: RetryPolicy,
}

impl WinnerFinalizer {
    pub fn new(repository: Arc<dyn WinnerRepository>, retry_policy: RetryPolicy) -> Self {
        Self {
            repository,
            retry_policy,
        }
    }

    /// 持久化全部中奖者，可重试错误按退避策略重试
    pub async fn finalize(&self, campaign_id: i64, winners: &[String]) -> FinalizationReport {
        let mut report = FinalizationReport::default();

        for customer_id in winners {
            let result = retry_with_policy(
                &self.retry_policy,
                "save_winner",
                EngineError::is_retryable,
                || self.repository.save_winner(campaign_id, customer_id),
            )
            .await;

            match result {
                Ok(()) => {
                    metrics::record_finalization(campaign_id, "saved");
                    report.saved.push(customer_id.clone());
                }
                Err(e) => {
                    error!(
                        campaign_id,
                        customer_id = %customer_id,
                        error = %e,
                        "中奖者落库失败，跳过"
                    );
                    metrics::record_finalization(campaign_id, "failed");
                    report.failed.push(customer_id.clone());
                }
            }
        }

        info!(
            campaign_id,
            saved = report.saved.len(),
            failed = report.failed.len(),
            "中奖名单落库完成"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockWinnerRepository;
    use mockall::predicate::*;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    fn winners(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_saves_every_winner() {
        let mut repo = MockWinnerRepository::new();
        repo.expect_save_winner()
            .with(eq(5), always())
            .times(2)
            .returning(|_, _| Ok(()));

        let finalizer = WinnerFinalizer::new(Arc::new(repo), fast_retry());
        let report = finalizer.finalize(5, &winners(&["A", "C"])).await;

        assert_eq!(report.saved, winners(&["A", "C"]));
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_permanent_failure_does_not_block_others() {
        let mut repo = MockWinnerRepository::new();
        repo.expect_save_winner()
            .with(eq(5), eq("A"))
            .times(1)
            .returning(|_, _| Err(EngineError::InvalidEvent("rejected".to_string())));
        repo.expect_save_winner()
            .with(eq(5), eq("C"))
            .times(1)
            .returning(|_, _| Ok(()));

        let finalizer = WinnerFinalizer::new(Arc::new(repo), fast_retry());
        let report = finalizer.finalize(5, &winners(&["A", "C"])).await;

        assert_eq!(report.saved, winners(&["C"]));
        assert_eq!(report.failed, winners(&["A"]));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mut repo = MockWinnerRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_save_winner()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(EngineError::Database(sqlx::Error::PoolTimedOut)));
        repo.expect_save_winner()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let finalizer = WinnerFinalizer::new(Arc::new(repo), fast_retry());
        let report = finalizer.finalize(5, &winners(&["A"])).await;

        assert_eq!(report.saved, winners(&["A"]));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let mut repo = MockWinnerRepository::new();
        repo.expect_save_winner()
            .times(3)
            .returning(|_, _| Err(EngineError::Database(sqlx::Error::PoolTimedOut)));

        let finalizer = WinnerFinalizer::new(Arc::new(repo), fast_retry());
        let report = finalizer.finalize(5, &winners(&["A"])).await;

        assert_eq!(report.failed, winners(&["A"]));
        assert!(!report.is_complete());
    }
}
