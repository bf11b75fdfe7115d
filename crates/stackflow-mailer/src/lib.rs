//! Queue-to-email relay run by the backend's processing function
//!
//! The notification service and the queue sit behind [`NotificationSender`]
//! and [`QueueAcknowledger`], so the batch logic runs without a provider SDK.

pub mod error;
pub mod event;
pub mod relay;

pub use error::{MailerError, Result};
pub use event::{
    Body, CHARSET, Content, Destination, EmailMessage, MessageContent, QueueEvent, QueueRecord,
    queue_url_from_arn,
};
pub use relay::{
    BatchItemFailure, BatchItemFailures, BatchReport, EmailRelay, NotificationSender,
    QueueAcknowledger, RecordOutcome, Stage,
};
