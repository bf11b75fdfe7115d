//! Queue event payloads and the email messages they carry

use crate::error::{MailerError, Result};
use serde::{Deserialize, Serialize};

/// Character set every outgoing email part is sent with
pub const CHARSET: &str = "UTF-8";

/// Batch of queue records delivered to the processing function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

impl QueueEvent {
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    #[serde(rename = "eventSourceARN")]
    pub event_source_arn: String,
}

impl QueueRecord {
    /// Parse the record body as an email message
    pub fn email(&self) -> Result<EmailMessage> {
        serde_json::from_str(&self.body).map_err(|e| MailerError::InvalidMessage {
            message_id: self.message_id.clone(),
            reason: e.to_string(),
        })
    }

    pub fn queue_url(&self) -> Result<String> {
        queue_url_from_arn(&self.event_source_arn)
    }
}

/// Email request as producers put it on the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmailMessage {
    pub source: String,
    pub destination: Destination,
    pub message: MessageContent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Destination {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc_addresses: Vec<String>,
}

impl Destination {
    pub fn is_empty(&self) -> bool {
        self.to_addresses.is_empty() && self.cc_addresses.is_empty() && self.bcc_addresses.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageContent {
    pub subject: Content,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Body {
    pub html: Content,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Content {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
}

impl Content {
    fn with_charset(data: &str) -> Self {
        Self {
            data: data.to_string(),
            charset: Some(CHARSET.to_string()),
        }
    }
}

impl EmailMessage {
    /// The message as handed to the notification service
    pub fn outgoing(&self) -> EmailMessage {
        EmailMessage {
            source: self.source.clone(),
            destination: self.destination.clone(),
            message: MessageContent {
                subject: Content::with_charset(&self.message.subject.data),
                body: Body {
                    html: Content::with_charset(&self.message.body.html.data),
                },
            },
        }
    }
}

/// `arn:aws:sqs:<region>:<account>:<name>` to the queue's HTTPS endpoint
pub fn queue_url_from_arn(arn: &str) -> Result<String> {
    let parts: Vec<&str> = arn.split(':').collect();
    match parts.as_slice() {
        ["arn", _, "sqs", region, account, name]
            if !region.is_empty() && !account.is_empty() && !name.is_empty() =>
        {
            Ok(format!(
                "https://sqs.{}.amazonaws.com/{}/{}",
                region, account, name
            ))
        }
        _ => Err(MailerError::InvalidArn(arn.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = r#"{
        "Records": [
            {
                "messageId": "059f36b4-87a3-44ab-83d2-661975830a7d",
                "receiptHandle": "AQEBwJnKyrHigUMZj6rYigCgxlaS3SLy0a",
                "body": "{\"Source\":\"noreply@example.com\",\"Destination\":{\"ToAddresses\":[\"user@example.com\"]},\"Message\":{\"Subject\":{\"Data\":\"Welcome\"},\"Body\":{\"Html\":{\"Data\":\"<p>Hello</p>\"}}}}",
                "attributes": { "ApproximateReceiveCount": "1" },
                "eventSource": "aws:sqs",
                "eventSourceARN": "arn:aws:sqs:us-east-1:445362076974:cdk-demo--dev",
                "awsRegion": "us-east-1"
            }
        ]
    }"#;

    #[test]
    fn test_parse_event() {
        let event = QueueEvent::from_json(EVENT).unwrap();
        assert_eq!(event.records.len(), 1);

        let record = &event.records[0];
        assert_eq!(record.message_id, "059f36b4-87a3-44ab-83d2-661975830a7d");
        assert_eq!(
            record.queue_url().unwrap(),
            "https://sqs.us-east-1.amazonaws.com/445362076974/cdk-demo--dev"
        );

        let email = record.email().unwrap();
        assert_eq!(email.source, "noreply@example.com");
        assert_eq!(email.destination.to_addresses, ["user@example.com"]);
        assert_eq!(email.message.subject.data, "Welcome");
        assert_eq!(email.message.body.html.data, "<p>Hello</p>");
    }

    #[test]
    fn test_outgoing_sets_charset() {
        let event = QueueEvent::from_json(EVENT).unwrap();
        let outgoing = event.records[0].email().unwrap().outgoing();

        assert_eq!(outgoing.message.subject.charset.as_deref(), Some(CHARSET));
        assert_eq!(outgoing.message.body.html.charset.as_deref(), Some(CHARSET));

        let json = serde_json::to_value(&outgoing).unwrap();
        assert_eq!(json["Message"]["Body"]["Html"]["Charset"], "UTF-8");
        assert!(json["Destination"].get("CcAddresses").is_none());
    }

    #[test]
    fn test_invalid_body() {
        let record = QueueRecord {
            message_id: "m-1".to_string(),
            receipt_handle: "r-1".to_string(),
            body: "{\"Source\":\"a@example.com\"}".to_string(),
            event_source_arn: "arn:aws:sqs:us-east-1:1:q".to_string(),
        };
        let err = record.email().unwrap_err();
        assert!(matches!(err, MailerError::InvalidMessage { ref message_id, .. } if message_id == "m-1"));
    }

    #[test]
    fn test_queue_url_from_arn() {
        assert_eq!(
            queue_url_from_arn("arn:aws:sqs:eu-west-1:123456789012:jobs").unwrap(),
            "https://sqs.eu-west-1.amazonaws.com/123456789012/jobs"
        );
        assert!(queue_url_from_arn("arn:aws:sns:us-east-1:1:topic").is_err());
        assert!(queue_url_from_arn("arn:aws:sqs:us-east-1:1").is_err());
        assert!(queue_url_from_arn("arn:aws:sqs::1:q").is_err());
    }

    #[test]
    fn test_empty_event() {
        let event = QueueEvent::from_json("{}").unwrap();
        assert!(event.records.is_empty());
    }
}
