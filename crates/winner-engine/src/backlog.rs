//! 待定队列
//!
//! 按订单创建时间排序的未决订单集合。订单只能被插入一次，只能从队首移除。
//! 排序键相同时按订单 ID 字典序，与 Redis 有序集合的同分排序一致。

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct PendingBacklog {
    queue: BTreeSet<(i64, String)>,
    index: HashMap<String, i64>,
}

impl PendingBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入订单，已存在时保留原排序键并返回 false
    pub fn insert(&mut self, order_id: &str, sort_key: i64) -> bool {
        if self.index.contains_key(order_id) {
            return false;
        }
        self.index.insert(order_id.to_string(), sort_key);
        self.queue.insert((sort_key, order_id.to_string()));
        true
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.index.contains_key(order_id)
    }

    /// 队首（最早创建）的订单
    pub fn peek(&self) -> Option<&str> {
        self.queue.first().map(|(_, id)| id.as_str())
    }

    pub fn pop_front(&mut self) -> Option<String> {
        let (_, order_id) = self.queue.pop_first()?;
        self.index.remove(&order_id);
        Some(order_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
