//! 客户进度：每个客户成功订单中的最大金额

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CustomerProgress {
    max_amount: HashMap<String, f64>,
}

impl CustomerProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一笔成功订单，返回更新后的最大金额
    pub fn record_success(&mut self, customer_id: &str, amount: f64) -> f64 {
        let max = self
            .max_amount
            .entry(customer_id.to_string())
            .or_insert(amount);
        if amount > *max {
            *max = amount;
        }
        *max
    }

    pub fn max_amount(&self, customer_id: &str) -> Option<f64> {
        self.max_amount.get(customer_id).copied()
    }

    /// 是否已有成功订单达到最低金额
    pub fn qualifies(&self, customer_id: &str, min_amount: f64) -> bool {
        self.max_amount(customer_id)
            .is_some_and(|max| max >= min_amount)
    }
}
