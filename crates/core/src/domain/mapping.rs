// Queue Mapping Domain Model

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

use super::error::{DomainError, Result};

/// Queue identifier
pub type QueueName = String;

/// One configured pairing of a queue to the HTTP endpoint that handles its messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMapping {
    #[serde(rename = "queueName", alias = "QueueName")]
    pub queue_name: QueueName,
    #[serde(rename = "apiEndpoint", alias = "ApiEndpoint")]
    pub api_endpoint: String,
}

impl QueueMapping {
    pub fn new(queue_name: impl Into<String>, api_endpoint: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            api_endpoint: api_endpoint.into(),
        }
    }

    /// Parse the endpoint as an absolute http(s) URL
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api_endpoint).map_err(|e| DomainError::InvalidEndpoint {
            queue: self.queue_name.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(DomainError::InvalidEndpoint {
                queue: self.queue_name.clone(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

/// The full queue -> endpoint mapping, fixed for the process lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(alias = "Queues")]
    pub queues: Vec<QueueMapping>,
}

impl ConsumerConfig {
    pub fn new(queues: Vec<QueueMapping>) -> Self {
        Self { queues }
    }

    pub fn from_json(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Read, parse and validate a mapping file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation: at least one queue, no blank or repeated names.
    ///
    /// Endpoints are checked per loop so one bad URL cannot stop the rest.
    pub fn validate(&self) -> Result<()> {
        if self.queues.is_empty() {
            return Err(DomainError::Validation(
                "no queues configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for mapping in &self.queues {
            if mapping.queue_name.trim().is_empty() {
                return Err(DomainError::Validation(
                    "queue name must not be empty".to_string(),
                ));
            }
            if !seen.insert(mapping.queue_name.as_str()) {
                return Err(DomainError::DuplicateQueue(mapping.queue_name.clone()));
            }
        }
        Ok(())
    }

    pub fn queue_names(&self) -> impl Iterator<Item = &str> {
        self.queues.iter().map(|m| m.queue_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_file_shapes() {
        let camel = ConsumerConfig::from_json(
            r#"{"queues":[{"queueName":"orders","apiEndpoint":"http://svc/orders"}]}"#,
        )
        .unwrap();
        let pascal = ConsumerConfig::from_json(
            r#"{"Queues":[{"QueueName":"orders","ApiEndpoint":"http://svc/orders"}]}"#,
        )
        .unwrap();

        assert_eq!(camel, pascal);
        assert_eq!(camel.queues[0], QueueMapping::new("orders", "http://svc/orders"));
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        assert!(ConsumerConfig::from_json("{\"queues\": [").is_err());
        assert!(ConsumerConfig::from_json(r#"{"queues":[{"queueName":"a"}]}"#).is_err());
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let result = ConsumerConfig::from_file(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(crate::AppError::Io(_))));
    }

    #[test]
    fn test_validate_duplicates_and_empty() {
        let config = ConsumerConfig::new(vec![
            QueueMapping::new("orders", "http://svc/orders"),
            QueueMapping::new("orders", "http://svc/other"),
        ]);
        assert_eq!(
            config.validate(),
            Err(DomainError::DuplicateQueue("orders".to_string()))
        );

        assert!(ConsumerConfig::default().validate().is_err());
        assert!(ConsumerConfig::new(vec![QueueMapping::new("", "http://svc")])
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_ignores_endpoint_shape() {
        let config = ConsumerConfig::new(vec![
            QueueMapping::new("orders", "http://svc/orders"),
            QueueMapping::new("invoices", "not a url"),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_url() {
        let ok = QueueMapping::new("orders", "https://svc.example/orders?v=1");
        assert_eq!(ok.endpoint_url().unwrap().host_str(), Some("svc.example"));

        let relative = QueueMapping::new("orders", "/orders");
        assert!(matches!(
            relative.endpoint_url(),
            Err(DomainError::InvalidEndpoint { .. })
        ));

        let ftp = QueueMapping::new("orders", "ftp://svc/orders");
        assert!(matches!(
            ftp.endpoint_url(),
            Err(DomainError::InvalidEndpoint { .. })
        ));
    }
}
