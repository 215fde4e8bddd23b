//! 订单事件服务
//!
//! 消费订单新建与订单状态两个 Kafka topic，把事件交给中奖引擎处理。

pub mod consumer;
pub mod error;
pub mod processor;

pub use consumer::{DeadLetterSink, OrderEventConsumer, handle_message};
pub use error::OrderEventError;
pub use processor::{OrderEventHandler, OrderEventProcessor};
