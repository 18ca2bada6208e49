// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Durabbit
//!
//! Durable, self-healing publish/consume primitives on top of a RabbitMQ
//! broker. Consumers stay subscribed and publishes are cached and replayed
//! across broker failures; an explicit close is final.

mod cache;
mod channel;
mod connection;
mod consumer;
mod publisher;

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod publishing;
pub mod queue;
pub mod topology;

pub use client::{ClientOptions, RabbitClient};
pub use codec::{Codec, JsonCodec, Payload, TextCodec};
pub use config::RabbitMqConfig;
pub use dispatcher::{ConsumerHandler, ConsumerMessage, HandlerRegistry, MessageConsumer};
pub use errors::{AmqpError, HandlerError};
pub use publishing::{DeliveryMode, MessagePriority, PublishingOptions};
pub use queue::{QueueBinding, QueueConfig};
pub use topology::SchemaDefinitions;
