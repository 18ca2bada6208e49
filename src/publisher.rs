// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Publisher Channel
//!
//! The publisher side of the lifecycle core. All publishes and every cache
//! drain are serialized through one async mutex over the publisher state, so
//! the broker observes cached records in insertion order followed by live
//! publishes in call order, and two drains can never overlap.
//!
//! A publish that cannot reach the broker is cached and reported as success;
//! durability from that point on is the cache's job. With a max-retry of
//! zero nothing is ever cached and failures surface immediately.

use crate::cache::PublishingCache;
use crate::channel::{AmqpChannel, ChannelPurpose, ChannelState};
use crate::errors::AmqpError;
use crate::publishing::{Publishing, PublishingOptions};
use lapin::options::BasicPublishOptions;
use lapin::types::ShortString;
use lapin::{BasicProperties, Channel};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Publisher-role settings a connection hands to its publisher channel.
#[derive(Debug, Clone)]
pub(crate) struct PublishingSettings {
    pub(crate) max_retry: u8,
    pub(crate) cache_size: usize,
    pub(crate) cache_ttl: Duration,
}

/// State owned by exactly one publisher channel.
pub(crate) struct PublisherState {
    pub(crate) cache: PublishingCache,
    pub(crate) max_retry: u8,
}

impl PublisherState {
    pub(crate) fn new(settings: &PublishingSettings) -> PublisherState {
        PublisherState {
            cache: PublishingCache::new(settings.cache_size, settings.cache_ttl),
            max_retry: settings.max_retry,
        }
    }
}

/// Publishes one message through the channel, caching it when the broker is
/// unreachable.
pub(crate) async fn publish(
    channel: &Arc<AmqpChannel>,
    exchange: &str,
    routing_key: &str,
    body: Vec<u8>,
    content_type: &'static str,
    options: &PublishingOptions,
) -> Result<(), AmqpError> {
    let ChannelPurpose::Publisher(state) = &channel.purpose else {
        return Err(AmqpError::ChannelUnavailable);
    };

    // Queues behind any in-flight drain.
    let mut state = state.lock().await;

    let record = Publishing::new(
        exchange,
        routing_key,
        body,
        content_type,
        options,
        state.max_retry,
    );

    if !channel.is_active().await && reactivate(channel).await.is_ok() {
        drain(channel, &mut state).await;
    }

    if !channel.is_active().await {
        if state.max_retry == 0 {
            debug!(
                component = "channel",
                connection_type = "publisher",
                message_id = record.message_id.to_string(),
                "channel unavailable and retries disabled, dropping publish"
            );
            return Err(AmqpError::ChannelUnavailable);
        }

        debug!(
            component = "channel",
            connection_type = "publisher",
            message_id = record.message_id.to_string(),
            "channel unavailable, caching publish"
        );
        state.cache.put(record);
        return Ok(());
    }

    let handle = channel.handle.read().await.clone();
    let Some(handle) = handle else {
        state.cache.put(record);
        return Ok(());
    };

    match publish_once(&handle, &record).await {
        Ok(()) => Ok(()),
        Err(_) => {
            channel.set_state(ChannelState::Degraded);

            let retries_left = state.max_retry.saturating_sub(1);
            if retries_left == 0 {
                error!(
                    component = "channel",
                    connection_type = "publisher",
                    message_id = record.message_id.to_string(),
                    "publishing retries exhausted"
                );
                return Err(AmqpError::PublishExhausted);
            }

            debug!(
                component = "channel",
                connection_type = "publisher",
                message_id = record.message_id.to_string(),
                retries_left = retries_left,
                "publish failed, caching for retry"
            );
            let mut record = record;
            record.retries_left = retries_left;
            state.cache.put(record);
            Ok(())
        }
    }
}

/// Re-derives the handle and drains the cache after a connection refresh.
///
/// The returned task handle is tracked by the channel so close() can join it.
pub(crate) fn spawn_reactivation(channel: Arc<AmqpChannel>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ChannelPurpose::Publisher(state) = &channel.purpose else {
            return;
        };

        let mut state = tokio::select! {
            _ = channel.cancel.cancelled() => return,
            state = state.lock() => state,
        };

        if channel.cancel.is_cancelled() {
            return;
        }

        if reactivate(&channel).await.is_ok() {
            drain(&channel, &mut state).await;
        }
    })
}

/// Derives a fresh native channel when the current one is gone.
async fn reactivate(channel: &Arc<AmqpChannel>) -> Result<(), AmqpError> {
    if channel.is_active().await {
        return Ok(());
    }

    // A channel that never went active is still opening, not reopening.
    let next = match channel.state() {
        ChannelState::Init | ChannelState::Opening => ChannelState::Opening,
        _ => ChannelState::Reopening,
    };
    channel.set_state(next);

    let handle = channel.derive_handle().await?;

    // The channel may have been closed while we were deriving the handle;
    // a closed channel must never flip back to active.
    if channel.cancel.is_cancelled() {
        return Err(AmqpError::ChannelUnavailable);
    }

    *channel.handle.write().await = Some(handle);
    channel.set_state(ChannelState::Active);

    Ok(())
}

/// Replays the cache in insertion order after pruning expired entries.
///
/// Stops at the first transport failure; the remaining records wait for the
/// next activation. Exhausted records are dropped with an error log; expired
/// or evicted ones are not an exhaustion.
async fn drain(channel: &Arc<AmqpChannel>, state: &mut PublisherState) {
    state.cache.prune(Instant::now());
    if state.cache.is_empty() {
        return;
    }

    let handle = channel.handle.read().await.clone();
    let Some(handle) = handle else {
        return;
    };

    info!(
        component = "channel",
        connection_type = "publisher",
        pending = state.cache.len(),
        "draining publishing cache"
    );

    for id in state.cache.ids() {
        if channel.cancel.is_cancelled() {
            return;
        }

        let Some(record) = state.cache.get_mut(&id) else {
            continue;
        };

        match publish_once(&handle, &*record).await {
            Ok(()) => {
                debug!(
                    component = "channel",
                    connection_type = "publisher",
                    message_id = id.to_string(),
                    "cached publish replayed"
                );
                state.cache.remove(&id);
            }
            Err(_) => {
                record.retries_left = record.retries_left.saturating_sub(1);
                let exhausted = record.retries_left == 0;
                if exhausted {
                    error!(
                        component = "channel",
                        connection_type = "publisher",
                        message_id = id.to_string(),
                        "publishing retries exhausted"
                    );
                    state.cache.remove(&id);
                }

                channel.set_state(ChannelState::Degraded);
                return;
            }
        }
    }
}

/// One attempt against the broker.
async fn publish_once(handle: &Channel, record: &Publishing) -> Result<(), AmqpError> {
    let properties = BasicProperties::default()
        .with_content_type(ShortString::from(record.content_type))
        .with_message_id(ShortString::from(record.message_id.to_string()))
        .with_priority(record.priority)
        .with_delivery_mode(record.delivery_mode)
        .with_timestamp(record.timestamp);

    match handle
        .basic_publish(
            &record.exchange,
            &record.routing_key,
            BasicPublishOptions {
                mandatory: record.mandatory,
                immediate: record.immediate,
            },
            &record.body,
            properties,
        )
        .await
    {
        Ok(_) => Ok(()),
        Err(err) => {
            error!(
                component = "channel",
                connection_type = "publisher",
                error = err.to_string(),
                "error publishing message"
            );
            Err(AmqpError::PublishingError)
        }
    }
}
