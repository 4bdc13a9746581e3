//! Applying [`MediatorConfig`] to a sender/receiver pair.

use std::sync::Arc;

use {
    missive_common::Result,
    missive_config::{MediatorConfig, SideConfig},
    tracing::info,
};

use crate::{
    Receiver, Sender,
    interception::{Delay, Retry, Timeout},
    transport::ChannelDirectory,
};

impl Sender {
    /// Wrap every message in the interceptors `config` asks for, outermost
    /// first: delay, retry, timeout.
    pub fn apply_settings(&self, config: &SideConfig) -> &Self {
        if let Some(ms) = config.delay_ms {
            self.intercept_all(Delay::from_millis(ms));
        }
        if let Some(retry) = config.retry {
            self.intercept_all(Retry::new(retry.attempts));
        }
        if let Some(ms) = config.timeout_ms {
            self.intercept_all(Timeout::from_millis(ms));
        }
        self
    }
}

impl Receiver {
    /// Wrap every handler in the interceptors `config` asks for, outermost
    /// first: delay, retry, timeout.
    pub fn apply_settings(&self, config: &SideConfig) -> &Self {
        if let Some(ms) = config.delay_ms {
            self.intercept_all(Delay::from_millis(ms));
        }
        if let Some(retry) = config.retry {
            self.intercept_all(Retry::new(retry.attempts));
        }
        if let Some(ms) = config.timeout_ms {
            self.intercept_all(Timeout::from_millis(ms));
        }
        self
    }
}

/// Build a receiver listening on the configured channel of `directory` and
/// a sender dispatching to it, both set up from `config`.
pub fn connect(
    config: &MediatorConfig,
    directory: &Arc<ChannelDirectory>,
) -> Result<(Sender, Receiver)> {
    let receiver = crate::event_receiver(config.channel.clone(), directory)?;
    receiver.apply_settings(&config.receiver);

    let sender = crate::event_sender(config.channel.clone(), directory);
    sender.apply_settings(&config.sender);

    if let Some(namespace) = config.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        sender.namespace(namespace);
        receiver.namespace(namespace);
    }

    info!(
        channel = %config.channel,
        sender_settings = !config.sender.is_empty(),
        receiver_settings = !config.receiver.is_empty(),
        "mediator connected"
    );
    Ok((sender, receiver))
}
