// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Consumer Channel
//!
//! The consumer side of the lifecycle core. A single guard task per channel
//! subscribes the consumer, serially dispatches deliveries to the handler
//! registry and, whenever the subscription dies, re-derives the channel from
//! the parent connection at a fixed cadence until it is resurrected, the
//! channel is closed, or keep-alive is off.
//!
//! Acknowledgement policy: handler success acks; a transient handler failure
//! nack-requeues; a permanent handler failure nack-discards (the broker
//! routes to a DLX when one is configured). Unknown routing keys are
//! discarded with a warning.

use crate::channel::{AmqpChannel, ChannelState};
use crate::dispatcher::{ConsumerMessage, MessageConsumer};
use crate::errors::{AmqpError, HandlerError};
use crate::queue::QueueConfig;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::Channel;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub(crate) fn spawn_guard(channel: Arc<AmqpChannel>) -> JoinHandle<()> {
    tokio::spawn(async move { run_guard(channel).await })
}

/// Keeps one consumer subscribed for the lifetime of the channel.
async fn run_guard(channel: Arc<AmqpChannel>) {
    let Some(descriptor) = channel.consumer_descriptor() else {
        return;
    };

    // A channel that never went active is still opening, not reopening.
    let mut was_active = false;

    loop {
        if channel.cancel.is_cancelled() {
            return;
        }

        let next = if was_active {
            ChannelState::Reopening
        } else {
            ChannelState::Opening
        };
        channel.set_state(next);

        match subscribe(&channel, descriptor).await {
            Ok(deliveries) => {
                was_active = true;
                channel.set_state(ChannelState::Active);
                deliver(&channel, descriptor, deliveries).await;
                if channel.cancel.is_cancelled() {
                    return;
                }
                channel.set_state(ChannelState::Degraded);
            }
            Err(err) => {
                debug!(
                    component = "channel",
                    connection_type = "consumer",
                    queue = descriptor.queue_name(),
                    error = err.to_string(),
                    "could not subscribe consumer, retrying"
                );
            }
        }

        if !channel.keep_alive {
            return;
        }

        tokio::select! {
            _ = channel.cancel.cancelled() => return,
            _ = tokio::time::sleep(channel.retry_delay) => {}
            _ = channel.wake.notified() => {}
        }
    }
}

/// Registers the consumer on the broker: derives a fresh handle, declares and
/// binds the queue when bindings are configured, applies prefetch and starts
/// consuming.
async fn subscribe(
    channel: &AmqpChannel,
    descriptor: &MessageConsumer,
) -> Result<lapin::Consumer, AmqpError> {
    let handle = channel.derive_handle().await?;

    if !descriptor.queue.bindings.is_empty() {
        declare_and_bind(&handle, &descriptor.queue).await?;
    }

    if descriptor.prefetch > 0 {
        if let Err(err) = handle
            .basic_qos(descriptor.prefetch, BasicQosOptions::default())
            .await
        {
            error!(
                component = "channel",
                queue = descriptor.queue_name(),
                error = err.to_string(),
                "failure to configure qos"
            );
            return Err(AmqpError::QoSDeclarationError(
                descriptor.queue_name().to_owned(),
            ));
        }
    }

    let deliveries = match handle
        .basic_consume(
            descriptor.queue_name(),
            descriptor.name(),
            BasicConsumeOptions {
                no_local: false,
                no_ack: descriptor.auto_ack,
                exclusive: descriptor.exclusive,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Ok(deliveries) => deliveries,
        Err(err) => {
            error!(
                component = "channel",
                queue = descriptor.queue_name(),
                error = err.to_string(),
                "error to create the consumer"
            );
            return Err(AmqpError::BindingConsumerError(descriptor.name().to_owned()));
        }
    };

    *channel.handle.write().await = Some(handle);

    info!(
        component = "channel",
        connection_type = "consumer",
        queue = descriptor.queue_name(),
        consumer = descriptor.name(),
        "consumer subscribed"
    );

    Ok(deliveries)
}

async fn declare_and_bind(handle: &Channel, queue: &QueueConfig) -> Result<(), AmqpError> {
    if let Err(err) = handle
        .queue_declare(
            &queue.name,
            QueueDeclareOptions {
                passive: false,
                durable: queue.durable,
                exclusive: queue.exclusive,
                auto_delete: queue.auto_delete,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        error!(
            component = "channel",
            queue = queue.name.as_str(),
            error = err.to_string(),
            "failure to declare queue"
        );
        return Err(AmqpError::DeclareQueueError(queue.name.clone()));
    }

    for binding in &queue.bindings {
        if let Err(err) = handle
            .queue_bind(
                &queue.name,
                &binding.exchange,
                &binding.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
        {
            error!(
                component = "channel",
                queue = queue.name.as_str(),
                exchange = binding.exchange.as_str(),
                error = err.to_string(),
                "failure to bind queue"
            );
            return Err(AmqpError::BindingQueueError(
                queue.name.clone(),
                binding.exchange.clone(),
            ));
        }
    }

    Ok(())
}

/// Consumes deliveries one at a time until the stream dies or the channel is
/// cancelled. Serial handling keeps acknowledgements in delivery-tag order.
async fn deliver(
    channel: &AmqpChannel,
    descriptor: &MessageConsumer,
    mut deliveries: lapin::Consumer,
) {
    loop {
        let next = tokio::select! {
            _ = channel.cancel.cancelled() => return,
            next = deliveries.next() => next,
        };

        let Some(result) = next else {
            warn!(
                component = "channel",
                queue = descriptor.queue_name(),
                "delivery stream ended"
            );
            return;
        };

        match result {
            Ok(delivery) => {
                if let Err(err) = handle_delivery(descriptor, &delivery).await {
                    error!(
                        component = "channel",
                        queue = descriptor.queue_name(),
                        error = err.to_string(),
                        "acknowledgement failed, reopening channel"
                    );
                    return;
                }
            }
            Err(err) => {
                warn!(
                    component = "channel",
                    queue = descriptor.queue_name(),
                    error = err.to_string(),
                    "error while consuming"
                );
                return;
            }
        }
    }
}

/// Dispatches one delivery and acknowledges it according to the handler
/// verdict.
async fn handle_delivery(
    descriptor: &MessageConsumer,
    delivery: &Delivery,
) -> Result<(), AmqpError> {
    let routing_key = delivery.routing_key.as_str();
    let message_id = delivery
        .properties
        .message_id()
        .as_ref()
        .map(|id| id.to_string());

    debug!(
        component = "channel",
        queue = descriptor.queue_name(),
        routing_key = routing_key,
        message_id = message_id.as_deref().unwrap_or(""),
        "delivery received"
    );

    let Some(handler) = descriptor.handlers.get(routing_key) else {
        warn!(
            component = "channel",
            queue = descriptor.queue_name(),
            routing_key = routing_key,
            "no handler for routing key, discarding message"
        );
        return nack(descriptor, delivery, false).await;
    };

    let message = ConsumerMessage {
        queue: descriptor.queue_name().to_owned(),
        routing_key: routing_key.to_owned(),
        redelivered: delivery.redelivered,
        message_id,
        content_type: delivery
            .properties
            .content_type()
            .as_ref()
            .map(|value| value.to_string()),
        data: delivery.data.clone(),
    };

    match handler.handle(&message).await {
        Ok(()) => {
            debug!(
                component = "channel",
                queue = descriptor.queue_name(),
                "message successfully processed"
            );
            ack(descriptor, delivery).await
        }
        Err(HandlerError::Transient(reason)) => {
            warn!(
                component = "channel",
                queue = descriptor.queue_name(),
                reason = reason,
                "transient handler failure, requeuing message"
            );
            nack(descriptor, delivery, true).await
        }
        Err(HandlerError::Permanent(reason)) => {
            warn!(
                component = "channel",
                queue = descriptor.queue_name(),
                reason = reason,
                "permanent handler failure, discarding message"
            );
            nack(descriptor, delivery, false).await
        }
    }
}

async fn ack(descriptor: &MessageConsumer, delivery: &Delivery) -> Result<(), AmqpError> {
    if descriptor.auto_ack {
        return Ok(());
    }

    delivery
        .ack(BasicAckOptions { multiple: false })
        .await
        .map_err(|err| {
            error!(
                component = "channel",
                error = err.to_string(),
                "failure to ack message"
            );
            AmqpError::AckMessageError
        })
}

async fn nack(
    descriptor: &MessageConsumer,
    delivery: &Delivery,
    requeue: bool,
) -> Result<(), AmqpError> {
    if descriptor.auto_ack {
        return Ok(());
    }

    delivery
        .nack(BasicNackOptions {
            multiple: false,
            requeue,
        })
        .await
        .map_err(|err| {
            error!(
                component = "channel",
                error = err.to_string(),
                "failure to nack message"
            );
            AmqpError::NackMessageError
        })
}
