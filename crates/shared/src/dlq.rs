//! 死信队列
//!
//! 格式错误的事件无法被处理，写入死信队列留档，等待人工排查。
//! 位点随后正常提交，坏消息不会阻塞分区。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CampaignError;
use crate::kafka::{KafkaProducer, topics};

/// 死信消息信封
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    /// 原始消息标识（订单 ID，无法解析时为 topic/partition/offset）
    pub message_id: String,
    pub source_topic: String,
    /// 原始负载（按 UTF-8 有损解码）
    pub payload: String,
    /// 失败原因
    pub error: String,
    /// 错误码，与 `CampaignError::code` 一致
    pub error_code: String,
    pub failed_at: DateTime<Utc>,
    pub source_service: String,
}

impl DeadLetterMessage {
    pub fn new(
        message_id: impl Into<String>,
        source_topic: impl Into<String>,
        payload: impl Into<String>,
        error: &CampaignError,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            source_topic: source_topic.into(),
            payload: payload.into(),
            error: error.to_string(),
            error_code: error.code().to_string(),
            failed_at: Utc::now(),
            source_service: source_service.into(),
        }
    }
}

/// DLQ 生产者
#[derive(Clone)]
pub struct DlqProducer {
    producer: KafkaProducer,
    source_service: String,
}

impl DlqProducer {
    pub fn new(producer: KafkaProducer, source_service: &str) -> Self {
        Self {
            producer,
            source_service: source_service.to_string(),
        }
    }

    /// 将失败消息发送到死信队列
    pub async fn send_to_dlq(
        &self,
        message_id: &str,
        source_topic: &str,
        payload: &[u8],
        error: &CampaignError,
    ) -> Result<(), CampaignError> {
        let dlq_msg = DeadLetterMessage::new(
            message_id,
            source_topic,
            String::from_utf8_lossy(payload),
            error,
            &self.source_service,
        );

        self.producer
            .send_json(topics::DEAD_LETTER_QUEUE, message_id, &dlq_msg)
            .await?;

        warn!(message_id, source_topic, error = %error, "消息已发送到死信队列");

        Ok(())
    }
}
