//! 单个活动的中奖判定状态机
//!
//! `CampaignState` 持有一个活动的全部状态（台账、待定队列、客户进度、合格集合、
//! 中奖集合），只通过 `admit_pending` 与 `resolve_and_drain` 两个操作修改。
//! 本身不做同步，由存储层保证同一活动的调用串行执行。
//!
//! 公平性的核心在队首阻塞：最早创建且尚无结果的订单挡住整个队列，
//! 更晚创建的订单即使先成功也不能越过它。

use tracing::{debug, info, warn};

use crate::backlog::PendingBacklog;
use crate::ledger::OrderLedger;
use crate::membership::MembershipSet;
use crate::models::{
    AdmitOutcome, Campaign, CampaignPolicy, DrainOutcome, OrderStatus, PendingOrder, StatusUpdate,
};
use crate::progress::CustomerProgress;

#[derive(Debug, Default)]
pub struct CampaignState {
    ledger: OrderLedger,
    backlog: PendingBacklog,
    progress: CustomerProgress,
    eligible: MembershipSet,
    winners: MembershipSet,
}

impl CampaignState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新建订单
    ///
    /// 窗口外或名额已满的订单被忽略；重复投递与已推进过的订单不产生任何变化。
    pub fn admit_pending(&mut self, campaign: &Campaign, order: &PendingOrder) -> AdmitOutcome {
        if !campaign.contains(order.created_at) {
            return AdmitOutcome::OutsideWindow;
        }
        if self.is_finished(&campaign.policy) {
            return AdmitOutcome::CampaignFinished;
        }
        if self.backlog.contains(&order.order_id) {
            return AdmitOutcome::AlreadyAdmitted;
        }
        if self
            .ledger
            .get(&order.order_id)
            .is_some_and(|entry| entry.drained)
        {
            return AdmitOutcome::AlreadySettled;
        }

        self.ledger
            .record_pending(&order.order_id, &order.customer_id);
        self.backlog
            .insert(&order.order_id, campaign.sort_key(order.created_at));
        AdmitOutcome::Admitted
    }

    /// 应用状态变更并从队首推进
    pub fn resolve_and_drain(
        &mut self,
        policy: &CampaignPolicy,
        update: &StatusUpdate,
    ) -> DrainOutcome {
        if self.is_finished(policy) {
            return DrainOutcome {
                new_winner: false,
                finished: true,
            };
        }

        let status = self
            .ledger
            .apply_status(&update.order_id, &update.customer_id, update.status);

        // PROCESSING 只刷新台账
        if update.status == OrderStatus::Processing {
            return DrainOutcome {
                new_winner: false,
                finished: false,
            };
        }

        let mut new_winner = false;
        if status == OrderStatus::Success {
            self.progress
                .record_success(&update.customer_id, update.amount);

            // 客户已通过更早的订单进入合格集合，这笔成功订单可能让其达到门槛
            if !self.winners.contains(&update.customer_id)
                && self.eligible.contains(&update.customer_id)
                && self
                    .progress
                    .qualifies(&update.customer_id, policy.min_amount)
                && self
                    .winners
                    .insert_bounded(&update.customer_id, policy.reward_count)
            {
                info!(
                    customer_id = %update.customer_id,
                    order_id = %update.order_id,
                    "合格客户达到金额门槛，晋升为中奖者"
                );
                new_winner = true;
            }
        }

        if self.drain(policy) {
            new_winner = true;
        }

        DrainOutcome {
            new_winner,
            finished: self.is_finished(policy),
        }
    }

    /// 从队首依次处理已有结果的订单，返回是否产生了新中奖者
    ///
    /// 停止条件：名额已满、队列为空、队首订单仍未决。
    fn drain(&mut self, policy: &CampaignPolicy) -> bool {
        let mut promoted = false;

        while !self.is_finished(policy) {
            let Some(head) = self.backlog.peek() else {
                break;
            };

            let Some(entry) = self.ledger.get(head).cloned() else {
                warn!(order_id = head, "待定队列中的订单缺少台账记录，丢弃");
                self.backlog.pop_front();
                continue;
            };

            if !entry.status.is_terminal() {
                debug!(order_id = head, status = %entry.status, "队首订单未决，停止推进");
                break;
            }

            let Some(order_id) = self.backlog.pop_front() else {
                break;
            };
            self.ledger.mark_drained(&order_id);

            if entry.status == OrderStatus::Failed {
                continue;
            }
            if self.winners.contains(&entry.customer_id) {
                continue;
            }
            if !self
                .eligible
                .insert_bounded(&entry.customer_id, policy.max_tracked_customers)
            {
                debug!(
                    customer_id = %entry.customer_id,
                    order_id = %order_id,
                    "合格集合已满，客户未能进入追踪"
                );
                continue;
            }

            if self
                .progress
                .qualifies(&entry.customer_id, policy.min_amount)
                && self
                    .winners
                    .insert_bounded(&entry.customer_id, policy.reward_count)
            {
                info!(
                    customer_id = %entry.customer_id,
                    order_id = %order_id,
                    winners = self.winners.len(),
                    "队首推进产生中奖者"
                );
                promoted = true;
            }
        }

        promoted
    }

    /// 中奖人数是否已达到名额（名额在活动中途被调低时同样视为已满）
    pub fn is_finished(&self, policy: &CampaignPolicy) -> bool {
        self.winners.is_full(policy.reward_count)
    }

    /// 中奖者，按晋升顺序
    pub fn winners(&self) -> &[String] {
        self.winners.members()
    }

    pub fn eligible(&self) -> &[String] {
        self.eligible.members()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn ledger_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.ledger.get(order_id).map(|entry| entry.status)
    }

    pub fn max_amount(&self, customer_id: &str) -> Option<f64> {
        self.progress.max_amount(customer_id)
    }
}
