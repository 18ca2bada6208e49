// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Queue Configuration
//!
//! Builder types describing the queue a consumer reads from and the bindings
//! the subscribe path applies. When a queue configuration carries bindings,
//! the consumer channel declares the queue and binds it before consuming;
//! without bindings the queue is consumed as-is and topology is left to the
//! schema applier.

/// Configuration of a queue a consumer subscribes to.
///
/// # Example
/// ```
/// use durabbit::queue::{QueueBinding, QueueConfig};
///
/// let queue = QueueConfig::new("orders")
///     .durable()
///     .binding(QueueBinding::new("orders-exchange").routing_key("order.created"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) exclusive: bool,
    pub(crate) auto_delete: bool,
    pub(crate) bindings: Vec<QueueBinding>,
}

impl QueueConfig {
    /// Creates a queue configuration with the given name and default flags.
    pub fn new(name: &str) -> QueueConfig {
        QueueConfig {
            name: name.to_owned(),
            ..QueueConfig::default()
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Deletes the queue when the last consumer disconnects.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Adds a binding applied when the consumer subscribes.
    pub fn binding(mut self, binding: QueueBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// The queue name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A queue-to-exchange binding.
#[derive(Debug, Clone, Default)]
pub struct QueueBinding {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a binding to the given exchange with an empty routing key.
    pub fn new(exchange: &str) -> QueueBinding {
        QueueBinding {
            exchange: exchange.to_owned(),
            routing_key: String::new(),
        }
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_flags_and_bindings() {
        let queue = QueueConfig::new("orders")
            .durable()
            .auto_delete()
            .binding(QueueBinding::new("ex").routing_key("order.created"))
            .binding(QueueBinding::new("ex").routing_key("order.deleted"));

        assert_eq!(queue.name(), "orders");
        assert!(queue.durable);
        assert!(queue.auto_delete);
        assert!(!queue.exclusive);
        assert_eq!(queue.bindings.len(), 2);
        assert_eq!(queue.bindings[0].routing_key, "order.created");
    }
}
