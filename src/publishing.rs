// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Publishing Records and Options
//!
//! This module defines the caller-facing publishing options (priority and
//! delivery mode, both optional with broker-sensible defaults) and the
//! internal publishing record that travels through the publisher channel and
//! its cache.

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Message priority, mapped onto the AMQP 0..9 priority range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessagePriority {
    Lowest,
    Low,
    #[default]
    Medium,
    High,
    Highest,
}

impl MessagePriority {
    /// The wire value for this priority.
    pub fn as_u8(self) -> u8 {
        match self {
            MessagePriority::Lowest => 0,
            MessagePriority::Low => 2,
            MessagePriority::Medium => 5,
            MessagePriority::High => 7,
            MessagePriority::Highest => 9,
        }
    }
}

/// AMQP delivery mode.
///
/// `Transient` messages may be lost on broker restart; `Persistent` messages
/// are written to disk by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    Transient,
    #[default]
    Persistent,
}

impl DeliveryMode {
    /// The wire value for this delivery mode.
    pub fn as_u8(self) -> u8 {
        match self {
            DeliveryMode::Transient => 1,
            DeliveryMode::Persistent => 2,
        }
    }
}

/// Per-publish options.
///
/// Omitted fields resolve to `MessagePriority::Medium` and
/// `DeliveryMode::Persistent`.
///
/// # Example
/// ```
/// use durabbit::publishing::{DeliveryMode, MessagePriority, PublishingOptions};
///
/// let opts = PublishingOptions::new()
///     .priority(MessagePriority::High)
///     .delivery_mode(DeliveryMode::Transient);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishingOptions {
    pub(crate) message_priority: Option<MessagePriority>,
    pub(crate) mode: Option<DeliveryMode>,
}

impl PublishingOptions {
    /// Creates empty options; every field resolves to its default.
    pub fn new() -> PublishingOptions {
        PublishingOptions::default()
    }

    /// Sets the message priority.
    pub fn priority(mut self, priority: MessagePriority) -> Self {
        self.message_priority = Some(priority);
        self
    }

    /// Sets the delivery mode.
    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub(crate) fn resolved_priority(&self) -> u8 {
        self.message_priority.unwrap_or_default().as_u8()
    }

    pub(crate) fn resolved_mode(&self) -> u8 {
        self.mode.unwrap_or_default().as_u8()
    }
}

/// An outgoing message as the publisher channel sees it.
///
/// Identity (and cache identity) is the message id. The timestamp is the
/// enqueue moment, not the moment of any given broker attempt.
#[derive(Debug, Clone)]
pub(crate) struct Publishing {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) mandatory: bool,
    pub(crate) immediate: bool,
    pub(crate) body: Vec<u8>,
    pub(crate) content_type: &'static str,
    pub(crate) priority: u8,
    pub(crate) delivery_mode: u8,
    pub(crate) message_id: Uuid,
    pub(crate) timestamp: u64,
    pub(crate) retries_left: u8,
}

impl Publishing {
    pub(crate) fn new(
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        content_type: &'static str,
        options: &PublishingOptions,
        max_retry: u8,
    ) -> Publishing {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        Publishing {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            mandatory: false,
            immediate: false,
            body,
            content_type,
            priority: options.resolved_priority(),
            delivery_mode: options.resolved_mode(),
            message_id: Uuid::new_v4(),
            timestamp,
            retries_left: max_retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JSON_CONTENT_TYPE;

    #[test]
    fn omitted_options_resolve_to_medium_persistent() {
        let opts = PublishingOptions::new();
        assert_eq!(opts.resolved_priority(), 5);
        assert_eq!(opts.resolved_mode(), 2);
    }

    #[test]
    fn explicit_options_override_defaults() {
        let opts = PublishingOptions::new()
            .priority(MessagePriority::Highest)
            .delivery_mode(DeliveryMode::Transient);
        assert_eq!(opts.resolved_priority(), 9);
        assert_eq!(opts.resolved_mode(), 1);
    }

    #[test]
    fn records_get_a_fresh_message_id() {
        let opts = PublishingOptions::new();
        let first = Publishing::new("ex", "rk", vec![], JSON_CONTENT_TYPE, &opts, 3);
        let second = Publishing::new("ex", "rk", vec![], JSON_CONTENT_TYPE, &opts, 3);

        assert_ne!(first.message_id, second.message_id);
        assert!(!first.mandatory);
        assert!(!first.immediate);
        assert_eq!(first.retries_left, 3);
        assert!(first.timestamp > 0);
    }
}
