// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! A channel record owns one native AMQP channel for a single purpose:
//! consuming one queue or publishing. The native handle is re-derived from
//! the parent connection after every failure, never reused; the parent is
//! held through a weak reference that the connection refreshes on reconnect,
//! so the ownership tree stays acyclic.

use crate::dispatcher::MessageConsumer;
use crate::errors::AmqpError;
use crate::{consumer, publisher};
use lapin::Channel;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Lifecycle states of a channel.
///
/// `Degraded` is entered on a per-delivery transport error; `Reopening` while
/// the channel waits for (or works on) a fresh handle. No deliveries are
/// consumed and no live publishes happen outside `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelState {
    Init,
    Opening,
    Active,
    Degraded,
    Reopening,
    Closed,
}

/// What a channel exists for.
pub(crate) enum ChannelPurpose {
    Consumer(MessageConsumer),
    Publisher(Mutex<publisher::PublisherState>),
}

/// One AMQP channel and the machinery keeping it alive.
pub(crate) struct AmqpChannel {
    pub(crate) cancel: CancellationToken,
    pub(crate) keep_alive: bool,
    pub(crate) retry_delay: Duration,
    // Non-owning reference to the parent transport, refreshed on reconnect.
    transport: StdRwLock<Weak<lapin::Connection>>,
    pub(crate) handle: RwLock<Option<Channel>>,
    state: watch::Sender<ChannelState>,
    pub(crate) wake: Notify,
    // The consumer guard and any in-flight publisher reactivation; close()
    // joins every entry before tearing down the handle.
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    pub(crate) purpose: ChannelPurpose,
}

impl AmqpChannel {
    /// Creates a consumer channel and spawns its keep-alive guard.
    pub(crate) fn consumer(
        cancel: CancellationToken,
        transport: Weak<lapin::Connection>,
        keep_alive: bool,
        retry_delay: Duration,
        descriptor: MessageConsumer,
    ) -> Arc<AmqpChannel> {
        let (state, _) = watch::channel(ChannelState::Init);
        let channel = Arc::new(AmqpChannel {
            cancel,
            keep_alive,
            retry_delay,
            transport: StdRwLock::new(transport),
            handle: RwLock::new(None),
            state,
            wake: Notify::new(),
            tasks: StdMutex::new(Vec::new()),
            purpose: ChannelPurpose::Consumer(descriptor),
        });

        let guard = consumer::spawn_guard(Arc::clone(&channel));
        channel.tasks.lock().unwrap().push(guard);

        channel
    }

    /// Creates a publisher channel. Activation is lazy: the first publish or
    /// the next connection refresh derives the handle and drains the cache.
    pub(crate) fn publisher(
        cancel: CancellationToken,
        transport: Weak<lapin::Connection>,
        keep_alive: bool,
        retry_delay: Duration,
        settings: &publisher::PublishingSettings,
    ) -> Arc<AmqpChannel> {
        let (state, _) = watch::channel(ChannelState::Init);
        Arc::new(AmqpChannel {
            cancel,
            keep_alive,
            retry_delay,
            transport: StdRwLock::new(transport),
            handle: RwLock::new(None),
            state,
            wake: Notify::new(),
            tasks: StdMutex::new(Vec::new()),
            purpose: ChannelPurpose::Publisher(Mutex::new(publisher::PublisherState::new(
                settings,
            ))),
        })
    }

    /// Swaps the weak transport reference after a reconnect and nudges the
    /// channel into re-deriving its handle.
    pub(crate) fn refresh(self: &Arc<Self>, transport: Weak<lapin::Connection>) {
        if self.cancel.is_cancelled() {
            return;
        }

        *self.transport.write().unwrap() = transport;

        match &self.purpose {
            ChannelPurpose::Consumer(_) => self.wake.notify_one(),
            ChannelPurpose::Publisher(_) => {
                let task = publisher::spawn_reactivation(Arc::clone(self));
                self.tasks.lock().unwrap().push(task);
            }
        }
    }

    /// Derives a fresh native channel from the parent transport.
    pub(crate) async fn derive_handle(&self) -> Result<Channel, AmqpError> {
        let transport = self.transport.read().unwrap().clone();

        let Some(connection) = transport.upgrade() else {
            return Err(AmqpError::ChannelUnavailable);
        };
        if !connection.status().connected() {
            return Err(AmqpError::ChannelUnavailable);
        }

        match connection.create_channel().await {
            Ok(channel) => Ok(channel),
            Err(err) => {
                error!(
                    component = "channel",
                    error = err.to_string(),
                    "error to create the channel"
                );
                Err(AmqpError::ChannelError)
            }
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, next: ChannelState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(
                component = "channel",
                connection_type = self.purpose_label(),
                queue = self.queue_label(),
                from = ?previous,
                to = ?next,
                "channel state changed"
            );
        }
    }

    /// Active with a live native handle.
    pub(crate) async fn is_active(&self) -> bool {
        if self.state() != ChannelState::Active {
            return false;
        }

        self.handle
            .read()
            .await
            .as_ref()
            .map(|handle| handle.status().connected())
            .unwrap_or(false)
    }

    pub(crate) async fn healthy(&self) -> bool {
        self.is_active().await
    }

    /// Closes the channel: cancels and joins the guard and any in-flight
    /// reactivation, then closes the native handle. The parent connection is
    /// left untouched.
    pub(crate) async fn close(&self) -> Result<(), AmqpError> {
        self.set_state(ChannelState::Closed);
        self.cancel.cancel();

        // Drain in a loop; a refresh may race one more task in.
        loop {
            let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                let _ = task.await;
            }
        }

        let handle = self.handle.write().await.take();
        if let Some(handle) = handle {
            if handle.status().connected() {
                if let Err(err) = handle.close(200, "channel closed").await {
                    error!(
                        component = "channel",
                        error = err.to_string(),
                        "could not close channel"
                    );
                    return Err(AmqpError::ChannelError);
                }
            }
        }

        Ok(())
    }

    pub(crate) fn consumer_descriptor(&self) -> Option<&MessageConsumer> {
        match &self.purpose {
            ChannelPurpose::Consumer(descriptor) => Some(descriptor),
            ChannelPurpose::Publisher(_) => None,
        }
    }

    pub(crate) fn is_publisher(&self) -> bool {
        matches!(self.purpose, ChannelPurpose::Publisher(_))
    }

    fn purpose_label(&self) -> &'static str {
        match self.purpose {
            ChannelPurpose::Consumer(_) => "consumer",
            ChannelPurpose::Publisher(_) => "publisher",
        }
    }

    fn queue_label(&self) -> &str {
        self.consumer_descriptor()
            .map(|descriptor| descriptor.queue_name())
            .unwrap_or("")
    }
}
