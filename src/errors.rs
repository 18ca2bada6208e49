// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Error Types
//!
//! This module provides the error taxonomy for the whole crate. The
//! `AmqpError` enum covers configuration mistakes, transport failures and
//! publishing outcomes; `HandlerError` is the verdict a consumer handler
//! returns and maps directly onto the acknowledgement sent to the broker.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Configuration errors (`EmptyUri`, `ConsumerAlreadyExists`,
/// `EmptyHandlerRegistry`, `EmptyRoutingKey`) are never retried. Transport
/// errors (`DialError`, `ChannelUnavailable`) are absorbed by the keep-alive
/// machinery where possible. `ConnectionClosed` is returned by any operation
/// attempted after an explicit close.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// The connection string is empty.
    #[error("empty connection uri")]
    EmptyUri,

    /// Error establishing a connection to the RabbitMQ server.
    #[error("failure to connect")]
    DialError,

    /// The connection was explicitly closed and will never reconnect.
    #[error("connection is closed")]
    ConnectionClosed,

    /// No usable channel is available for the operation.
    #[error("channel unavailable")]
    ChannelUnavailable,

    /// Error creating a channel from an established connection.
    #[error("failure to create a channel")]
    ChannelError,

    /// A consumer is already registered on the queue.
    #[error("a consumer already exists for queue `{0}`")]
    ConsumerAlreadyExists(String),

    /// A consumer was registered without any handler.
    #[error("handler registry is empty")]
    EmptyHandlerRegistry,

    /// A handler was registered under an empty routing key.
    #[error("handler registered with an empty routing key")]
    EmptyRoutingKey,

    /// Error declaring an exchange with the given name.
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name.
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange.
    #[error("failure to bind queue `{0}` to exchange `{1}`")]
    BindingQueueError(String, String),

    /// Error binding a consumer to a queue.
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error configuring Quality of Service parameters.
    #[error("failure to configure qos for queue `{0}`")]
    QoSDeclarationError(String),

    /// Error publishing a message.
    #[error("failure to publish")]
    PublishingError,

    /// All publishing retries for a message were consumed.
    #[error("publishing retries exhausted")]
    PublishExhausted,

    /// The payload cannot be encoded with the selected codec.
    #[error("cannot encode payload as `{0}`")]
    EncodingUnsupported(&'static str),

    /// The payload could not be serialized.
    #[error("failure to encode payload")]
    EncodingError,

    /// The topology schema document could not be parsed.
    #[error("failure to parse schema definitions")]
    SchemaParseError,

    /// Error acknowledging a message.
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message.
    #[error("failure to nack message")]
    NackMessageError,

    /// Error closing the native connection.
    #[error("failure to close connection")]
    CloseConnectionError,
}

/// The verdict a consumer handler returns for a delivery.
///
/// `Transient` failures are requeued by the broker and will be redelivered;
/// `Permanent` failures are discarded (routed to a DLX when the broker is
/// configured with one).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HandlerError {
    /// The delivery could not be processed right now; requeue it.
    #[error("transient handler failure: {0}")]
    Transient(String),

    /// The delivery can never be processed; discard it.
    #[error("permanent handler failure: {0}")]
    Permanent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_entity() {
        assert_eq!(
            AmqpError::ConsumerAlreadyExists("orders".to_owned()).to_string(),
            "a consumer already exists for queue `orders`"
        );
        assert_eq!(
            AmqpError::BindingQueueError("q".to_owned(), "ex".to_owned()).to_string(),
            "failure to bind queue `q` to exchange `ex`"
        );
        assert_eq!(
            AmqpError::EncodingUnsupported("text/plain").to_string(),
            "cannot encode payload as `text/plain`"
        );
    }

    #[test]
    fn handler_errors_carry_their_reason() {
        let err = HandlerError::Transient("db down".to_owned());
        assert_eq!(err.to_string(), "transient handler failure: db down");
    }
}
