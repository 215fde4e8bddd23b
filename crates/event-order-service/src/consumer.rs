//! Kafka 消费者与事件分发
//!
//! 按 topic 把订单事件路由到处理器：
//! - `campaign.order.created` -> 入队
//! - `campaign.order.status` -> 结算并推进队列
//!
//! 坏消息写入死信队列后提交位点；可重试错误先在进程内退避重试，
//! 仍失败则交给消费循环回滚位点重新投递。

use std::sync::Arc;

use async_trait::async_trait;
use giveaway_shared::config::AppConfig;
use giveaway_shared::dlq::DlqProducer;
use giveaway_shared::error::CampaignError;
use giveaway_shared::events::OrderEvent;
use giveaway_shared::kafka::{ConsumerMessage, KafkaConsumer, topics};
use giveaway_shared::observability::metrics;
use giveaway_shared::observability::tracing::link_span_to_headers;
use giveaway_shared::retry::{RetryPolicy, retry_with_policy};
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::OrderEventError;
use crate::processor::OrderEventHandler;

/// 死信投递接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(
        &self,
        message_id: &str,
        source_topic: &str,
        payload: &[u8],
        error: &CampaignError,
    ) -> Result<(), CampaignError>;
}

#[async_trait]
impl DeadLetterSink for DlqProducer {
    async fn dead_letter(
        &self,
        message_id: &str,
        source_topic: &str,
        payload: &[u8],
        error: &CampaignError,
    ) -> Result<(), CampaignError> {
        self.send_to_dlq(message_id, source_topic, payload, error)
            .await
    }
}

/// 订单事件消费者
pub struct OrderEventConsumer {
    consumer: KafkaConsumer,
    handler: Arc<dyn OrderEventHandler>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry_policy: RetryPolicy,
}

impl OrderEventConsumer {
    pub fn new(
        config: &AppConfig,
        handler: Arc<dyn OrderEventHandler>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Result<Self, OrderEventError> {
        let consumer = KafkaConsumer::new(&config.kafka, None)?;
        Ok(Self {
            consumer,
            handler,
            dead_letters,
            retry_policy: config.campaign.retry.to_policy(),
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), OrderEventError> {
        self.consumer
            .subscribe(&[topics::ORDER_CREATED, topics::ORDER_STATUS])?;

        info!(
            created = topics::ORDER_CREATED,
            status = topics::ORDER_STATUS,
            "订单事件消费者已启动"
        );

        let handler = self.handler;
        let dead_letters = self.dead_letters;
        let retry_policy = self.retry_policy;

        self.consumer
            .start(shutdown, |msg| {
                let handler = handler.as_ref();
                let dead_letters = dead_letters.as_ref();
                let retry_policy = &retry_policy;
                async move {
                    handle_message(handler, dead_letters, retry_policy, &msg)
                        .await
                        .map_err(OrderEventError::into_shared)
                }
            })
            .await;

        info!("订单事件消费者已停止");
        Ok(())
    }
}

/// 处理单条 Kafka 消息
///
/// 返回 `Ok` 表示位点可以提交（包括已写入死信队列与永久丢弃的事件），
/// 返回的错误一定是可重试的。
pub async fn handle_message(
    handler: &dyn OrderEventHandler,
    dead_letters: &dyn DeadLetterSink,
    retry_policy: &RetryPolicy,
    msg: &ConsumerMessage,
) -> Result<(), OrderEventError> {
    let span = info_span!(
        "order_event",
        topic = %msg.topic,
        partition = msg.partition,
        offset = msg.offset
    );
    link_span_to_headers(&span, &msg.headers);

    async {
        let event = match decode(msg) {
            Ok(event) => event,
            Err(e) => return dead_letter(dead_letters, msg, None, e.into()).await,
        };

        let result = match msg.topic.as_str() {
            topics::ORDER_CREATED => retry_with_policy(
                retry_policy,
                "admit_pending",
                OrderEventError::is_retryable,
                || handler.on_order_created(&event),
            )
            .await
            .map(|_| ()),
            topics::ORDER_STATUS => retry_with_policy(
                retry_policy,
                "resolve_and_drain",
                OrderEventError::is_retryable,
                || handler.on_order_status(&event),
            )
            .await
            .map(|_| ()),
            other => {
                warn!(topic = other, order_id = %event.id, "未订阅的 topic，忽略");
                metrics::record_kafka_message(other, "ignored");
                return Ok(());
            }
        };

        match result {
            Ok(()) => {
                metrics::record_kafka_message(&msg.topic, "processed");
                Ok(())
            }
            Err(e) if e.is_malformed() => dead_letter(dead_letters, msg, Some(&event.id), e).await,
            Err(e) if e.is_retryable() => {
                error!(order_id = %event.id, error = %e, "重试后仍失败，等待重新投递");
                metrics::record_kafka_message(&msg.topic, "redelivered");
                Err(e)
            }
            Err(e) => {
                warn!(
                    order_id = %event.id,
                    code = e.code(),
                    error = %e,
                    "事件无法处理，丢弃"
                );
                metrics::record_kafka_message(&msg.topic, "dropped");
                Ok(())
            }
        }
    }
    .instrument(span)
    .await
}

fn decode(msg: &ConsumerMessage) -> Result<OrderEvent, CampaignError> {
    let event: OrderEvent = msg.deserialize_payload()?;
    event.validate()?;
    Ok(event)
}

/// 写入死信队列；死信发送失败按可重试处理，消息会被重新投递
async fn dead_letter(
    dead_letters: &dyn DeadLetterSink,
    msg: &ConsumerMessage,
    order_id: Option<&str>,
    error: OrderEventError,
) -> Result<(), OrderEventError> {
    let message_id = order_id
        .map(str::to_string)
        .or_else(|| msg.key.clone())
        .unwrap_or_else(|| format!("{}/{}/{}", msg.topic, msg.partition, msg.offset));
    let error = error.into_shared();

    warn!(message_id = %message_id, error = %error, "坏消息写入死信队列");
    dead_letters
        .dead_letter(&message_id, &msg.topic, &msg.payload, &error)
        .await?;

    metrics::record_kafka_message(&msg.topic, "dead_lettered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::MockOrderEventHandler;
    use chrono::{TimeZone, Utc};
    use giveaway_shared::events::OrderStatus;
    use giveaway_shared::test_utils::TestDataGenerator;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};
    use winner_engine::{AdmitOutcome, DrainOutcome, EngineError};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    fn created_event() -> OrderEvent {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        TestDataGenerator::pending_order("O1", "A", 250.0, base, 1_000)
    }

    fn message(topic: &str, payload: Vec<u8>) -> ConsumerMessage {
        ConsumerMessage {
            topic: topic.to_string(),
            partition: 0,
            offset: 42,
            key: Some("O1".to_string()),
            payload,
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    fn event_message(topic: &str, event: &OrderEvent) -> ConsumerMessage {
        message(topic, serde_json::to_vec(event).unwrap())
    }

    #[tokio::test]
    async fn test_created_event_is_admitted() {
        let mut handler = MockOrderEventHandler::new();
        handler
            .expect_on_order_created()
            .withf(|event| event.id == "O1" && event.customer_id == "A")
            .times(1)
            .returning(|_| Ok(AdmitOutcome::Admitted));
        handler.expect_on_order_status().never();

        let mut dlq = MockDeadLetterSink::new();
        dlq.expect_dead_letter().never();

        let msg = event_message(topics::ORDER_CREATED, &created_event());
        handle_message(&handler, &dlq, &fast_retry(), &msg)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_event_is_resolved() {
        let mut handler = MockOrderEventHandler::new();
        handler
            .expect_on_order_status()
            .withf(|event| event.status == OrderStatus::Success)
            .times(1)
            .returning(|_| {
                Ok(DrainOutcome {
                    new_winner: true,
                    finished: false,
                })
            });

        let dlq = MockDeadLetterSink::new();
        let event = TestDataGenerator::status_update(&created_event(), OrderStatus::Success);
        let msg = event_message(topics::ORDER_STATUS, &event);

        assert_ok!(handle_message(&handler, &dlq, &fast_retry(), &msg).await);
    }

    #[tokio::test]
    async fn test_invalid_json_goes_to_dlq() {
        let mut handler = MockOrderEventHandler::new();
        handler.expect_on_order_created().never();

        let mut dlq = MockDeadLetterSink::new();
        dlq.expect_dead_letter()
            .withf(|id, topic, payload, err| {
                id == "O1"
                    && topic == topics::ORDER_CREATED
                    && payload == b"{not json"
                    && err.code() == "MALFORMED_EVENT"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let msg = message(topics::ORDER_CREATED, b"{not json".to_vec());
        assert_ok!(handle_message(&handler, &dlq, &fast_retry(), &msg).await);
    }

    #[tokio::test]
    async fn test_negative_amount_goes_to_dlq() {
        let handler = MockOrderEventHandler::new();
        let mut dlq = MockDeadLetterSink::new();
        dlq.expect_dead_letter()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut event = created_event();
        event.total_amount = -1.0;
        let msg = event_message(topics::ORDER_CREATED, &event);

        assert_ok!(handle_message(&handler, &dlq, &fast_retry(), &msg).await);
    }

    #[tokio::test]
    async fn test_pending_on_status_topic_goes_to_dlq() {
        let mut handler = MockOrderEventHandler::new();
        handler.expect_on_order_status().times(1).returning(|_| {
            Err(CampaignError::MalformedEvent("PENDING".to_string()).into())
        });

        let mut dlq = MockDeadLetterSink::new();
        dlq.expect_dead_letter()
            .withf(|id, _, _, _| id == "O1")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let msg = event_message(topics::ORDER_STATUS, &created_event());
        assert_ok!(handle_message(&handler, &dlq, &fast_retry(), &msg).await);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried_then_redelivered() {
        let mut handler = MockOrderEventHandler::new();
        handler.expect_on_order_created().times(3).returning(|_| {
            Err(EngineError::StoreTimeout {
                operation: "admit_pending",
                campaign_id: 1,
            }
            .into())
        });

        let mut dlq = MockDeadLetterSink::new();
        dlq.expect_dead_letter().never();

        let msg = event_message(topics::ORDER_CREATED, &created_event());
        let err = handle_message(&handler, &dlq, &fast_retry(), &msg)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.into_shared().is_retryable());
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_in_process() {
        let mut handler = MockOrderEventHandler::new();
        let mut seq = mockall::Sequence::new();
        handler
            .expect_on_order_created()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(EngineError::StoreTimeout {
                    operation: "admit_pending",
                    campaign_id: 1,
                }
                .into())
            });
        handler
            .expect_on_order_created()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(AdmitOutcome::AlreadyAdmitted));

        let dlq = MockDeadLetterSink::new();
        let msg = event_message(topics::ORDER_CREATED, &created_event());
        assert_ok!(handle_message(&handler, &dlq, &fast_retry(), &msg).await);
    }

    #[tokio::test]
    async fn test_unregistered_campaign_is_dropped() {
        let mut handler = MockOrderEventHandler::new();
        handler
            .expect_on_order_created()
            .times(1)
            .returning(|_| Err(EngineError::CampaignNotRegistered(1).into()));

        let mut dlq = MockDeadLetterSink::new();
        dlq.expect_dead_letter().never();

        let msg = event_message(topics::ORDER_CREATED, &created_event());
        assert_ok!(handle_message(&handler, &dlq, &fast_retry(), &msg).await);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_ignored() {
        let mut handler = MockOrderEventHandler::new();
        handler.expect_on_order_created().never();
        handler.expect_on_order_status().never();

        let dlq = MockDeadLetterSink::new();
        let msg = event_message("campaign.order.refund", &created_event());
        assert_ok!(handle_message(&handler, &dlq, &fast_retry(), &msg).await);
    }

    #[tokio::test]
    async fn test_dlq_failure_forces_redelivery() {
        let handler = MockOrderEventHandler::new();
        let mut dlq = MockDeadLetterSink::new();
        dlq.expect_dead_letter()
            .returning(|_, _, _, _| Err(CampaignError::Kafka("broker down".to_string())));

        let msg = message(topics::ORDER_STATUS, b"[]".to_vec());
        let err = assert_err!(handle_message(&handler, &dlq, &fast_retry(), &msg).await);
        assert!(err.is_retryable());
    }
}
