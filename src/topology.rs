// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Topology Schema
//!
//! A declarative broker topology: a JSON document with three ordered sections
//! (`exchanges`, `queues`, `bindings`) applied to the broker in that order.
//! The applier declares what the schema describes; it does not diff against
//! or migrate existing topology.

use crate::errors::AmqpError;
use lapin::options::{ExchangeBindOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{Channel, ExchangeKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Declarative description of exchanges, queues and bindings.
///
/// The document shape matches RabbitMQ's definitions export for these three
/// sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinitions {
    #[serde(default)]
    pub exchanges: Vec<ExchangeDefinition>,
    #[serde(default)]
    pub queues: Vec<QueueDefinition>,
    #[serde(default)]
    pub bindings: Vec<BindingDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeDefinition {
    pub name: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(rename = "type", default = "direct_exchange_type")]
    pub kind: String,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueDefinition {
    pub name: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindingDefinition {
    pub source: String,
    #[serde(default)]
    pub vhost: String,
    pub destination: String,
    #[serde(default = "queue_destination_type")]
    pub destination_type: String,
    #[serde(default)]
    pub routing_key: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

fn direct_exchange_type() -> String {
    "direct".to_owned()
}

fn queue_destination_type() -> String {
    "queue".to_owned()
}

impl SchemaDefinitions {
    /// Parses a schema document from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<SchemaDefinitions, AmqpError> {
        serde_json::from_slice(bytes).map_err(|err| {
            error!(
                component = "topology",
                error = err.to_string(),
                "failure to parse schema definitions"
            );
            AmqpError::SchemaParseError
        })
    }

    /// Parses a schema document from a JSON string.
    pub fn from_json(json: &str) -> Result<SchemaDefinitions, AmqpError> {
        SchemaDefinitions::from_slice(json.as_bytes())
    }

    /// Declares the exchanges, queues and bindings in order on the channel.
    pub async fn apply(&self, channel: &Channel) -> Result<(), AmqpError> {
        for exchange in &self.exchanges {
            if let Err(err) = channel
                .exchange_declare(
                    &exchange.name,
                    exchange_kind(&exchange.kind),
                    ExchangeDeclareOptions {
                        passive: false,
                        durable: exchange.durable,
                        auto_delete: exchange.auto_delete,
                        internal: exchange.internal,
                        nowait: false,
                    },
                    field_table(&exchange.arguments),
                )
                .await
            {
                error!(
                    component = "topology",
                    exchange = exchange.name.as_str(),
                    error = err.to_string(),
                    "failure to declare exchange"
                );
                return Err(AmqpError::DeclareExchangeError(exchange.name.clone()));
            }
            debug!(
                component = "topology",
                exchange = exchange.name.as_str(),
                "exchange declared"
            );
        }

        for queue in &self.queues {
            if let Err(err) = channel
                .queue_declare(
                    &queue.name,
                    QueueDeclareOptions {
                        passive: false,
                        durable: queue.durable,
                        exclusive: queue.exclusive,
                        auto_delete: queue.auto_delete,
                        nowait: false,
                    },
                    field_table(&queue.arguments),
                )
                .await
            {
                error!(
                    component = "topology",
                    queue = queue.name.as_str(),
                    error = err.to_string(),
                    "failure to declare queue"
                );
                return Err(AmqpError::DeclareQueueError(queue.name.clone()));
            }
            debug!(
                component = "topology",
                queue = queue.name.as_str(),
                "queue declared"
            );
        }

        for binding in &self.bindings {
            self.apply_binding(channel, binding).await?;
        }

        info!(
            component = "topology",
            exchanges = self.exchanges.len(),
            queues = self.queues.len(),
            bindings = self.bindings.len(),
            "schema applied"
        );

        Ok(())
    }

    async fn apply_binding(
        &self,
        channel: &Channel,
        binding: &BindingDefinition,
    ) -> Result<(), AmqpError> {
        let result = if binding.destination_type == "exchange" {
            channel
                .exchange_bind(
                    &binding.destination,
                    &binding.source,
                    &binding.routing_key,
                    ExchangeBindOptions::default(),
                    field_table(&binding.arguments),
                )
                .await
        } else {
            channel
                .queue_bind(
                    &binding.destination,
                    &binding.source,
                    &binding.routing_key,
                    QueueBindOptions::default(),
                    field_table(&binding.arguments),
                )
                .await
        };

        if let Err(err) = result {
            error!(
                component = "topology",
                source = binding.source.as_str(),
                destination = binding.destination.as_str(),
                error = err.to_string(),
                "failure to declare binding"
            );
            return Err(AmqpError::BindingQueueError(
                binding.destination.clone(),
                binding.source.clone(),
            ));
        }

        debug!(
            component = "topology",
            source = binding.source.as_str(),
            destination = binding.destination.as_str(),
            "binding declared"
        );

        Ok(())
    }
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        custom => ExchangeKind::Custom(custom.to_owned()),
    }
}

fn field_table(arguments: &Map<String, Value>) -> FieldTable {
    let mut table = BTreeMap::<ShortString, AMQPValue>::new();

    for (key, value) in arguments {
        let amqp_value = match value {
            Value::Bool(flag) => AMQPValue::Boolean(*flag),
            Value::String(text) => AMQPValue::LongString(text.as_str().into()),
            Value::Number(number) => match number.as_i64() {
                Some(int) => AMQPValue::LongLongInt(int),
                None => AMQPValue::Double(number.as_f64().unwrap_or_default()),
            },
            other => {
                debug!(
                    component = "topology",
                    key = key.as_str(),
                    value = other.to_string(),
                    "skipping unsupported argument value"
                );
                continue;
            }
        };

        table.insert(ShortString::from(key.as_str()), amqp_value);
    }

    FieldTable::from(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "exchanges": [
            {
                "name": "orders-exchange",
                "vhost": "/",
                "type": "topic",
                "durable": true,
                "auto_delete": false,
                "internal": false,
                "arguments": {}
            }
        ],
        "queues": [
            {
                "name": "orders",
                "vhost": "/",
                "durable": true,
                "auto_delete": false,
                "arguments": {"x-max-priority": 9}
            }
        ],
        "bindings": [
            {
                "source": "orders-exchange",
                "vhost": "/",
                "destination": "orders",
                "destination_type": "queue",
                "routing_key": "order.*",
                "arguments": {}
            }
        ]
    }"#;

    #[test]
    fn parses_the_three_sections() {
        let schema = SchemaDefinitions::from_json(SCHEMA).unwrap();

        assert_eq!(schema.exchanges.len(), 1);
        assert_eq!(schema.exchanges[0].kind, "topic");
        assert!(schema.exchanges[0].durable);

        assert_eq!(schema.queues.len(), 1);
        assert_eq!(schema.queues[0].name, "orders");
        assert_eq!(
            schema.queues[0].arguments.get("x-max-priority"),
            Some(&serde_json::json!(9))
        );

        assert_eq!(schema.bindings.len(), 1);
        assert_eq!(schema.bindings[0].destination_type, "queue");
        assert_eq!(schema.bindings[0].routing_key, "order.*");
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let schema = SchemaDefinitions::from_json("{}").unwrap();
        assert!(schema.exchanges.is_empty());
        assert!(schema.queues.is_empty());
        assert!(schema.bindings.is_empty());
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let err = SchemaDefinitions::from_json("not json").unwrap_err();
        assert_eq!(err, AmqpError::SchemaParseError);
    }

    #[test]
    fn exchange_kinds_map_onto_amqp_kinds() {
        assert_eq!(exchange_kind("direct"), ExchangeKind::Direct);
        assert_eq!(exchange_kind("fanout"), ExchangeKind::Fanout);
        assert_eq!(exchange_kind("topic"), ExchangeKind::Topic);
        assert_eq!(exchange_kind("headers"), ExchangeKind::Headers);
        assert_eq!(
            exchange_kind("x-delayed-message"),
            ExchangeKind::Custom("x-delayed-message".to_owned())
        );
    }

    #[test]
    fn arguments_convert_to_field_table_values() {
        let mut arguments = Map::new();
        arguments.insert("x-max-priority".to_owned(), serde_json::json!(9));
        arguments.insert("x-queue-mode".to_owned(), serde_json::json!("lazy"));
        arguments.insert("x-internal".to_owned(), serde_json::json!(true));

        let table = field_table(&arguments);
        let inner = table.inner();

        assert_eq!(
            inner.get(&ShortString::from("x-max-priority")),
            Some(&AMQPValue::LongLongInt(9))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-queue-mode")),
            Some(&AMQPValue::LongString("lazy".into()))
        );
        assert_eq!(
            inner.get(&ShortString::from("x-internal")),
            Some(&AMQPValue::Boolean(true))
        );
    }
}
