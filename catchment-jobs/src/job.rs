use std::collections::BTreeMap;

use catchment_common::config::JobsConfig;
use serde::{Deserialize, Serialize};

use crate::{error::EncodeError, payload::EmailData};

pub const JOB_NAME: &str = "smtp.email";
pub const PAYLOAD_CLASS: &str = "smtp:handler";

/// Routing options, copied from configuration when the job is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub queue: String,
    pub priority: i64,
    pub delay: i64,
    pub auto_ack: bool,
}

impl From<&JobsConfig> for JobOptions {
    fn from(config: &JobsConfig) -> Self {
        Self {
            queue: config.queue.clone(),
            priority: config.priority,
            delay: config.delay,
            auto_ack: config.auto_ack,
        }
    }
}

/// A queue-ready unit of work. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedJob {
    id: String,
    name: String,
    /// JSON of an [`EmailData`].
    payload: String,
    headers: BTreeMap<String, Vec<String>>,
    options: JobOptions,
}

impl EncodedJob {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, Vec<String>> {
        &self.headers
    }

    #[must_use]
    pub const fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Decode the payload back into the email record.
    ///
    /// # Errors
    ///
    /// If the payload is not a valid [`EmailData`] document.
    pub fn email(&self) -> Result<EmailData, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Wrap an email record in a job. Every call produces a fresh job id.
///
/// # Errors
///
/// [`EncodeError::Serialization`] if the record cannot be serialized.
pub fn encode(email: &EmailData, config: &JobsConfig) -> Result<EncodedJob, EncodeError> {
    let payload = serde_json::to_string(email)?;

    let mut headers = BTreeMap::new();
    headers.insert("uuid".to_string(), vec![email.uuid.clone()]);
    headers.insert("payload_class".to_string(), vec![PAYLOAD_CLASS.to_string()]);

    Ok(EncodedJob {
        id: ulid::Ulid::new().to_string(),
        name: JOB_NAME.to_string(),
        payload,
        headers,
        options: JobOptions::from(config),
    })
}

#[cfg(test)]
mod tests {
    use catchment_mime::ParsedMessage;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::payload::{AuthData, EnvelopeData};

    fn email() -> EmailData {
        EmailData::new(
            "test-uuid-123",
            "127.0.0.1:12345",
            EnvelopeData {
                from: "sender@example.com".into(),
                to: vec!["recipient@example.com".into()],
                helo: "localhost".into(),
            },
            AuthData {
                attempted: true,
                mechanism: "PLAIN".into(),
                username: "user".into(),
                password: "secret".into(),
            },
            ParsedMessage {
                subject: "Test Subject".into(),
                text_body: "Test body".into(),
                ..ParsedMessage::default()
            },
            Utc::now(),
        )
    }

    fn config() -> JobsConfig {
        JobsConfig {
            queue: "smtp-emails".into(),
            priority: 5,
            delay: 30,
            auto_ack: true,
        }
    }

    #[test]
    fn encode_copies_routing_options() {
        let job = encode(&email(), &config()).unwrap();

        assert_eq!(job.name(), "smtp.email");
        assert!(!job.id().is_empty());
        assert_eq!(job.headers()["uuid"], vec!["test-uuid-123".to_string()]);
        assert_eq!(job.headers()["payload_class"], vec!["smtp:handler".to_string()]);
        assert_eq!(
            job.options(),
            &JobOptions {
                queue: "smtp-emails".into(),
                priority: 5,
                delay: 30,
                auto_ack: true,
            }
        );
    }

    #[test]
    fn payload_recovers_the_record() {
        let email = email();
        let job = encode(&email, &config()).unwrap();

        let decoded = job.email().unwrap();
        assert_eq!(decoded, email);
        assert_eq!(decoded.subject(), Some("Test Subject"));
        assert_eq!(decoded.authentication.password, "secret");
    }

    #[test]
    fn job_ids_are_unique() {
        let email = email();
        let first = encode(&email, &config()).unwrap();
        let second = encode(&email, &config()).unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.payload(), second.payload());
    }
}
