//! 订单台账
//!
//! 记录每个订单的客户与最近一次已知状态，队首推进时据此判断订单是否已有结果。

use std::collections::HashMap;

use crate::models::OrderStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub customer_id: String,
    pub status: OrderStatus,
    /// 是否已被队首推进移出待定队列
    pub drained: bool,
}

#[derive(Debug, Default)]
pub struct OrderLedger {
    entries: HashMap<String, LedgerEntry>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, order_id: &str) -> Option<&LedgerEntry> {
        self.entries.get(order_id)
    }

    /// 以 PENDING 登记订单
    ///
    /// 已存在的条目保持不变：状态事件可能先于创建事件到达，不能被降级回 PENDING。
    pub fn record_pending(&mut self, order_id: &str, customer_id: &str) {
        self.entries
            .entry(order_id.to_string())
            .or_insert_with(|| LedgerEntry {
                customer_id: customer_id.to_string(),
                status: OrderStatus::Pending,
                drained: false,
            });
    }

    /// 写入状态变更，返回写入后的实际状态
    ///
    /// PROCESSING 不会覆盖终态。
    pub fn apply_status(
        &mut self,
        order_id: &str,
        customer_id: &str,
        status: OrderStatus,
    ) -> OrderStatus {
        let entry = self
            .entries
            .entry(order_id.to_string())
            .or_insert_with(|| LedgerEntry {
                customer_id: customer_id.to_string(),
                status,
                drained: false,
            });

        if status == OrderStatus::Processing && entry.status.is_terminal() {
            return entry.status;
        }
        entry.customer_id = customer_id.to_string();
        entry.status = status;
        status
    }

    pub fn mark_drained(&mut self, order_id: &str) {
        if let Some(entry) = self.entries.get_mut(order_id) {
            entry.drained = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_does_not_downgrade() {
        let mut ledger = OrderLedger::new();
        ledger.apply_status("o-1", "c-1", OrderStatus::Success);
        ledger.record_pending("o-1", "c-1");
        assert_eq!(ledger.get("o-1").unwrap().status, OrderStatus::Success);
    }

    #[test]
    fn test_processing_never_overwrites_terminal() {
        let mut ledger = OrderLedger::new();
        ledger.record_pending("o-1", "c-1");
        assert_eq!(
            ledger.apply_status("o-1", "c-1", OrderStatus::Processing),
            OrderStatus::Processing
        );
        ledger.apply_status("o-1", "c-1", OrderStatus::Failed);
        assert_eq!(
            ledger.apply_status("o-1", "c-1", OrderStatus::Processing),
            OrderStatus::Failed
        );
    }

    #[test]
    fn test_terminal_status_can_be_corrected() {
        let mut ledger = OrderLedger::new();
        ledger.apply_status("o-1", "c-1", OrderStatus::Failed);
        ledger.apply_status("o-1", "c-1", OrderStatus::Success);
        assert_eq!(ledger.get("o-1").unwrap().status, OrderStatus::Success);
    }

    #[test]
    fn test_mark_drained() {
        let mut ledger = OrderLedger::new();
        ledger.record_pending("o-1", "c-1");
        assert!(!ledger.get("o-1").unwrap().drained);
        ledger.mark_drained("o-1");
        assert!(ledger.get("o-1").unwrap().drained);
        ledger.mark_drained("missing");
        assert_eq!(ledger.len(), 1);
    }
}
