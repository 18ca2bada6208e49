// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Delivery Dispatch
//!
//! This module defines the consumer-side dispatch surface: the
//! `ConsumerHandler` trait implemented by applications, the `HandlerRegistry`
//! mapping routing keys to handlers, and the `MessageConsumer` descriptor a
//! connection turns into a consumer channel.
//!
//! Routing keys are literal strings at this layer; wildcard matching is the
//! broker's job through queue bindings.

use crate::errors::{AmqpError, HandlerError};
use crate::queue::QueueConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An inbound delivery as handlers see it.
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    /// The queue the delivery was consumed from.
    pub queue: String,
    /// The routing key the message was published with.
    pub routing_key: String,
    /// Whether the broker redelivered this message.
    pub redelivered: bool,
    /// The message id, when the publisher set one.
    pub message_id: Option<String>,
    /// The content type, when the publisher set one.
    pub content_type: Option<String>,
    /// The raw message body; decoding is the handler's concern.
    pub data: Vec<u8>,
}

/// Processes deliveries for one routing key.
///
/// The returned verdict drives the acknowledgement: `Ok` acks,
/// `HandlerError::Transient` nack-requeues, `HandlerError::Permanent`
/// nack-discards.
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError>;
}

/// Maps routing keys to delivery handlers.
///
/// # Example
/// ```no_run
/// use durabbit::dispatcher::HandlerRegistry;
/// # use durabbit::dispatcher::{ConsumerHandler, ConsumerMessage};
/// # use durabbit::errors::HandlerError;
/// # use std::sync::Arc;
/// # struct OrderCreated;
/// # #[async_trait::async_trait]
/// # impl ConsumerHandler for OrderCreated {
/// #     async fn handle(&self, _: &ConsumerMessage) -> Result<(), HandlerError> { Ok(()) }
/// # }
///
/// let handlers = HandlerRegistry::new().register("order.created", Arc::new(OrderCreated));
/// ```
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ConsumerHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> HandlerRegistry {
        HandlerRegistry::default()
    }

    /// Registers a handler for a routing key, replacing any previous one.
    pub fn register(mut self, routing_key: &str, handler: Arc<dyn ConsumerHandler>) -> Self {
        self.handlers.insert(routing_key.to_owned(), handler);
        self
    }

    /// Validates the registry: at least one handler, no empty routing key.
    pub fn validate(&self) -> Result<(), AmqpError> {
        if self.handlers.is_empty() {
            return Err(AmqpError::EmptyHandlerRegistry);
        }

        if self.handlers.keys().any(|key| key.is_empty()) {
            return Err(AmqpError::EmptyRoutingKey);
        }

        Ok(())
    }

    pub(crate) fn get(&self, routing_key: &str) -> Option<&Arc<dyn ConsumerHandler>> {
        self.handlers.get(routing_key)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("routing_keys", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Describes a consumer a connection should keep subscribed.
#[derive(Debug, Clone)]
pub struct MessageConsumer {
    pub(crate) name: String,
    pub(crate) queue: QueueConfig,
    pub(crate) auto_ack: bool,
    pub(crate) exclusive: bool,
    pub(crate) prefetch: u16,
    pub(crate) handlers: HandlerRegistry,
}

impl MessageConsumer {
    /// Creates a consumer descriptor with the given name, queue and handlers.
    ///
    /// Defaults: manual acknowledgement, non-exclusive, prefetch of 1.
    pub fn new(name: &str, queue: QueueConfig, handlers: HandlerRegistry) -> MessageConsumer {
        MessageConsumer {
            name: name.to_owned(),
            queue,
            auto_ack: false,
            exclusive: false,
            prefetch: 1,
            handlers,
        }
    }

    /// Lets the broker consider deliveries acknowledged on send.
    pub fn auto_ack(mut self) -> Self {
        self.auto_ack = true;
        self
    }

    /// Requests exclusive consumption of the queue.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Sets the prefetch count applied when subscribing.
    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// The consumer name, used as the consumer tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the queue this consumer reads from.
    pub fn queue_name(&self) -> &str {
        &self.queue.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl ConsumerHandler for NoopHandler {
        async fn handle(&self, _message: &ConsumerMessage) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn empty_registry_fails_validation() {
        assert_eq!(
            HandlerRegistry::new().validate(),
            Err(AmqpError::EmptyHandlerRegistry)
        );
    }

    #[test]
    fn empty_routing_key_fails_validation() {
        let registry = HandlerRegistry::new().register("", Arc::new(NoopHandler));
        assert_eq!(registry.validate(), Err(AmqpError::EmptyRoutingKey));
    }

    #[test]
    fn populated_registry_validates_and_resolves() {
        let registry = HandlerRegistry::new().register("order.created", Arc::new(NoopHandler));

        assert_eq!(registry.validate(), Ok(()));
        assert!(registry.get("order.created").is_some());
        assert!(registry.get("order.deleted").is_none());
    }

    #[test]
    fn consumer_defaults() {
        let consumer = MessageConsumer::new(
            "orders-consumer",
            QueueConfig::new("orders"),
            HandlerRegistry::new().register("order.created", Arc::new(NoopHandler)),
        );

        assert!(!consumer.auto_ack);
        assert!(!consumer.exclusive);
        assert_eq!(consumer.prefetch, 1);
        assert_eq!(consumer.queue_name(), "orders");
    }
}
