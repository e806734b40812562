//! Kafka implementation of the broker port.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use tracing::debug;

use crate::error::BrokerError;
use crate::record::{BrokerAck, BrokerRecord};
use crate::BrokerClient;

/// Producer settings the outbox contract depends on:
/// `enable.idempotence=true` (no duplicates from producer-side retries),
/// `acks=all` (durability), `max.in.flight.requests.per.connection=5`
/// (the maximum idempotence supports).
pub fn idempotent_producer_config(brokers: &str) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", brokers)
        .set("enable.idempotence", "true")
        .set("acks", "all")
        .set("max.in.flight.requests.per.connection", "5");
    config
}

/// [`BrokerClient`] over an rdkafka [`FutureProducer`].
///
/// The producer future resolves with the delivery report, so a returned
/// `Ok` means the broker acknowledged the record.
pub struct KafkaBrokerClient {
    producer: FutureProducer,
}

impl KafkaBrokerClient {
    pub fn new(producer: FutureProducer) -> Self {
        Self { producer }
    }

    pub fn from_brokers(brokers: &str) -> Result<Self, KafkaError> {
        Ok(Self::new(idempotent_producer_config(brokers).create()?))
    }
}

#[async_trait]
impl BrokerClient for KafkaBrokerClient {
    async fn send(
        &self,
        record: BrokerRecord,
        timeout: Duration,
    ) -> Result<BrokerAck, BrokerError> {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &record.headers {
            headers = headers.insert(Header {
                key,
                value: Some(value.as_bytes()),
            });
        }

        let future_record = FutureRecord::to(&record.topic)
            .key(&record.key)
            .payload(&record.payload)
            .headers(headers);

        match self.producer.send(future_record, timeout).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %record.topic,
                    key = %record.key,
                    partition,
                    offset,
                    "record acknowledged by broker"
                );
                Ok(BrokerAck { partition, offset })
            }
            Err((err, _)) => Err(classify(err, timeout)),
        }
    }
}

fn classify(err: KafkaError, timeout: Duration) -> BrokerError {
    match err {
        KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut) => {
            BrokerError::Timeout(timeout)
        }
        KafkaError::MessageProduction(code) => match code {
            RDKafkaErrorCode::MessageSizeTooLarge | RDKafkaErrorCode::InvalidMessage => {
                BrokerError::Rejected(code.to_string())
            }
            // Remaining production errors are broker-side weather; the relay
            // reschedules and the breaker tracks the failure rate.
            other => BrokerError::Delivery {
                message: other.to_string(),
                retryable: true,
            },
        },
        other => BrokerError::Delivery {
            message: other.to_string(),
            retryable: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_production_maps_to_timeout() {
        let err = classify(
            KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut),
            Duration::from_secs(30),
        );
        assert!(matches!(err, BrokerError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn oversized_records_are_rejected_permanently() {
        let err = classify(
            KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge),
            Duration::from_secs(30),
        );
        assert!(matches!(err, BrokerError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_failures_stay_retryable() {
        let err = classify(
            KafkaError::MessageProduction(RDKafkaErrorCode::BrokerTransportFailure),
            Duration::from_secs(30),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn idempotent_config_carries_required_settings() {
        let config = idempotent_producer_config("localhost:9092");
        assert_eq!(config.get("enable.idempotence"), Some("true"));
        assert_eq!(config.get("acks"), Some("all"));
        assert_eq!(
            config.get("max.in.flight.requests.per.connection"),
            Some("5")
        );
    }
}
