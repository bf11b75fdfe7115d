//! Relay queue records to the notification service
//!
//! Each record is parsed, sent, and only then deleted from its queue.
//! A record that fails at any step stays on the queue so the event source
//! redelivers it; the report lists it under `failed`.

use crate::error::{MailerError, Result};
use crate::event::{EmailMessage, QueueEvent, QueueRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outbound email delivery
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send one message; returns the service's message id
    async fn send(&self, email: &EmailMessage) -> Result<String>;
}

/// Removes processed messages from their queue
#[async_trait]
pub trait QueueAcknowledger: Send + Sync {
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<()>;
}

/// Step a record failed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Send,
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub message_id: String,
    /// Id assigned by the notification service, once sent
    pub delivery_id: Option<String>,
    pub failed_at: Option<Stage>,
    pub error: Option<String>,
}

/// What happened to every record of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub delivered: Vec<RecordOutcome>,
    pub failed: Vec<RecordOutcome>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_delivered(&mut self, message_id: String, delivery_id: String) {
        self.delivered.push(RecordOutcome {
            message_id,
            delivery_id: Some(delivery_id),
            failed_at: None,
            error: None,
        });
    }

    pub fn add_failure(
        &mut self,
        message_id: String,
        delivery_id: Option<String>,
        stage: Stage,
        error: String,
    ) {
        self.failed.push(RecordOutcome {
            message_id,
            delivery_id,
            failed_at: Some(stage),
            error: Some(error),
        });
    }

    /// Partial batch response: the records the event source should retry
    pub fn batch_item_failures(&self) -> BatchItemFailures {
        BatchItemFailures {
            batch_item_failures: self
                .failed
                .iter()
                .map(|o| BatchItemFailure {
                    item_identifier: o.message_id.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailures {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

pub struct EmailRelay<S, A> {
    sender: S,
    acknowledger: A,
}

impl<S: NotificationSender, A: QueueAcknowledger> EmailRelay<S, A> {
    pub fn new(sender: S, acknowledger: A) -> Self {
        Self {
            sender,
            acknowledger,
        }
    }

    /// Process a batch in record order
    pub async fn handle(&self, event: &QueueEvent) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::new();

        for record in &event.records {
            match self.relay(record).await {
                Ok(delivery_id) => {
                    debug!(message_id = %record.message_id, delivery_id = %delivery_id, "Relayed record");
                    report.add_delivered(record.message_id.clone(), delivery_id);
                }
                Err((stage, delivery_id, error)) => {
                    warn!(
                        message_id = %record.message_id,
                        stage = ?stage,
                        error = %error,
                        "Record left on queue for redelivery"
                    );
                    report.add_failure(
                        record.message_id.clone(),
                        delivery_id,
                        stage,
                        error.to_string(),
                    );
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            duration_ms = report.duration_ms,
            "Batch processed"
        );
        report
    }

    async fn relay(
        &self,
        record: &QueueRecord,
    ) -> std::result::Result<String, (Stage, Option<String>, MailerError)> {
        let email = record.email().map_err(|e| (Stage::Parse, None, e))?;
        if email.destination.is_empty() {
            return Err((
                Stage::Parse,
                None,
                MailerError::InvalidMessage {
                    message_id: record.message_id.clone(),
                    reason: "destination has no addresses".to_string(),
                },
            ));
        }
        let queue_url = record.queue_url().map_err(|e| (Stage::Parse, None, e))?;

        let delivery_id = self
            .sender
            .send(&email.outgoing())
            .await
            .map_err(|e| (Stage::Send, None, e))?;

        self.acknowledger
            .delete(&queue_url, &record.receipt_handle)
            .await
            .map_err(|e| (Stage::Acknowledge, Some(delivery_id.clone()), e))?;

        Ok(delivery_id)
    }
}
