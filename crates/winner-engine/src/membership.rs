//! 有界成员集合，用于合格集合与中奖集合
//!
//! 容量不保存在集合内：活动策略在每次事件中重新读取，调用方传入当前上限。

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct MembershipSet {
    index: HashSet<String>,
    /// 按加入顺序
    members: Vec<String>,
}

impl MembershipSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, customer_id: &str) -> bool {
        self.index.contains(customer_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 是否已达到给定容量
    pub fn is_full(&self, capacity: u32) -> bool {
        self.members.len() >= capacity as usize
    }

    /// 容量未满或已是成员时返回 true，已是成员时不重复插入
    pub fn insert_bounded(&mut self, customer_id: &str, capacity: u32) -> bool {
        if self.contains(customer_id) {
            return true;
        }
        if self.is_full(capacity) {
            return false;
        }
        self.index.insert(customer_id.to_string());
        self.members.push(customer_id.to_string());
        true
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }
}
