//! 内存存储：单实例部署与测试使用

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::CampaignStore;
use crate::error::{EngineError, Result};
use crate::models::{AdmitOutcome, Campaign, DrainOutcome, PendingOrder, StatusUpdate};
use crate::registry::CampaignRegistry;
use crate::state::CampaignState;

pub struct InMemoryCampaignStore {
    registry: Arc<dyn CampaignRegistry>,
    states: DashMap<i64, Arc<Mutex<CampaignState>>>,
}

impl InMemoryCampaignStore {
    pub fn new(registry: Arc<dyn CampaignRegistry>) -> Self {
        Self {
            registry,
            states: DashMap::new(),
        }
    }

    /// 取出活动状态的句柄，不在 DashMap 的分片锁内等待
    fn state(&self, campaign_id: i64) -> Arc<Mutex<CampaignState>> {
        self.states.entry(campaign_id).or_default().clone()
    }

    async fn campaign(&self, campaign_id: i64) -> Result<Campaign> {
        self.registry
            .get(campaign_id)
            .await?
            .ok_or(EngineError::CampaignNotRegistered(campaign_id))
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn admit_pending(&self, campaign_id: i64, order: &PendingOrder) -> Result<AdmitOutcome> {
        let state = self.state(campaign_id);
        let mut state = state.lock().await;
        let campaign = self.campaign(campaign_id).await?;
        Ok(state.admit_pending(&campaign, order))
    }

    async fn resolve_and_drain(
        &self,
        campaign_id: i64,
        update: &StatusUpdate,
    ) -> Result<DrainOutcome> {
        let state = self.state(campaign_id);
        let mut state = state.lock().await;
        let campaign = self.campaign(campaign_id).await?;
        Ok(state.resolve_and_drain(&campaign.policy, update))
    }

    async fn winners(&self, campaign_id: i64) -> Result<Vec<String>> {
        let state = self.state(campaign_id);
        let state = state.lock().await;
        Ok(state.winners().to_vec())
    }

    async fn is_finished(&self, campaign_id: i64) -> Result<bool> {
        let state = self.state(campaign_id);
        let state = state.lock().await;
        let campaign = self.campaign(campaign_id).await?;
        Ok(state.is_finished(&campaign.policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignPolicy, OrderStatus};
    use crate::registry::InMemoryCampaignRegistry;
    use chrono::{Duration, TimeZone, Utc};

    fn campaign(id: i64) -> Campaign {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        Campaign {
            id,
            name: "test".to_string(),
            campaign_type: "iphone".to_string(),
            start_time: start,
            end_time: start + Duration::hours(1),
            policy: CampaignPolicy {
                reward_count: 1,
                min_amount: 0.0,
                max_tracked_customers: 10,
            },
        }
    }

    async fn store_with(campaigns: &[Campaign]) -> InMemoryCampaignStore {
        let registry = Arc::new(InMemoryCampaignRegistry::new());
        for c in campaigns {
            registry.publish(c).await.unwrap();
        }
        InMemoryCampaignStore::new(registry)
    }

    fn order(c: &Campaign, id: &str, customer: &str) -> PendingOrder {
        PendingOrder {
            order_id: id.to_string(),
            customer_id: customer.to_string(),
            amount: 10.0,
            created_at: c.start_time + Duration::seconds(1),
        }
    }

    fn success(o: &PendingOrder) -> StatusUpdate {
        StatusUpdate {
            order_id: o.order_id.clone(),
            customer_id: o.customer_id.clone(),
            status: OrderStatus::Success,
            amount: o.amount,
            event_time: o.created_at,
        }
    }

    #[tokio::test]
    async fn test_unregistered_campaign() {
        let store = store_with(&[]).await;
        let c = campaign(99);
        let err = store.admit_pending(99, &order(&c, "o", "c")).await.unwrap_err();
        assert!(matches!(err, EngineError::CampaignNotRegistered(99)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_campaigns_are_isolated() {
        let (a, b) = (campaign(1), campaign(2));
        let store = store_with(&[a.clone(), b.clone()]).await;

        let o = order(&a, "o-1", "alice");
        store.admit_pending(1, &o).await.unwrap();
        let out = store.resolve_and_drain(1, &success(&o)).await.unwrap();
        assert!(out.should_finalize());

        assert!(store.is_finished(1).await.unwrap());
        assert!(!store.is_finished(2).await.unwrap());
        assert_eq!(store.winners(1).await.unwrap(), vec!["alice".to_string()]);
        assert!(store.winners(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_policy_is_read_fresh() {
        let mut c = campaign(3);
        c.policy.reward_count = 2;
        let registry = Arc::new(InMemoryCampaignRegistry::new());
        registry.publish(&c).await.unwrap();
        let store = InMemoryCampaignStore::new(registry.clone());

        let o = order(&c, "o-1", "alice");
        store.admit_pending(3, &o).await.unwrap();
        let out = store.resolve_and_drain(3, &success(&o)).await.unwrap();
        assert!(!out.finished);

        c.policy.reward_count = 1;
        registry.publish(&c).await.unwrap();
        assert!(store.is_finished(3).await.unwrap());
    }
}
