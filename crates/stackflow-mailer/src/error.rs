//! Mailer error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("Invalid queue event: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    #[error("Invalid message body in record {message_id}: {reason}")]
    InvalidMessage { message_id: String, reason: String },

    #[error("Invalid queue ARN: {0} (expected arn:<partition>:sqs:<region>:<account>:<name>)")]
    InvalidArn(String),

    #[error("Sending failed: {0}")]
    SendFailed(String),

    #[error("Deleting message from {queue_url} failed: {reason}")]
    AcknowledgeFailed { queue_url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MailerError>;
