//! In-process request/response mediator.
//!
//! A [`Sender`] submits typed messages; a [`Receiver`] routes each inbound
//! request to the handler registered for its [`Type`]. Both sides wrap the
//! work in a chain of interceptors assembled from three tiers, outermost
//! first:
//!
//! 1. mediator-wide interceptors (`intercept_all`),
//! 2. interceptors attached through a configurator,
//! 3. interceptors declared by the message (sender) or handler (receiver)
//!    type itself.
//!
//! ```ignore
//! let directory = Arc::new(ChannelDirectory::new());
//! let receiver = event_receiver("greetings", &directory)?;
//! receiver.configure(&Configurator::receiver().message::<Hello>().handle_with(HelloHandler));
//!
//! let sender = event_sender("greetings", &directory);
//! let reply = sender.submit(Hello { subject: "world".into() }).await?;
//! ```

pub mod configurator;
pub mod interception;
pub mod message;
pub mod receiver;
pub mod sender;
pub mod settings;
pub mod transport;

use std::sync::Arc;

pub use {
    configurator::{
        Configurator, HandledMessageConfig, HandlerConfigurator, MessageConfig,
        MessageConfigurator, MessageOptions, ReceiverConfiguration, ReceiverConfigurator,
        SenderConfiguration, SenderConfigurator,
    },
    interception::{
        Delay, InterceptionContext, Next, ReceiverInterceptor, Retry, RetryFilter, Return,
        SenderInterceptor, Throw, Timeout,
    },
    message::{Handler, HandlerBinding, Message, ServedMessages, ServesMessages, SharedFactory},
    missive_common::{Error, Headers, Request, Response, Result, Type},
    receiver::Receiver,
    sender::Sender,
    settings::connect,
    transport::{ChannelDirectory, Dispatcher, EventDispatcher, EventObserver, Listener, Observer},
};

/// A sender dispatching over `channel` of the in-memory transport.
pub fn event_sender(channel: impl Into<String>, directory: &Arc<ChannelDirectory>) -> Sender {
    Sender::new(Arc::new(EventDispatcher::new(channel, Arc::clone(directory))))
}

/// A receiver listening on `channel` of the in-memory transport.
///
/// Fails when the channel already has a listener.
pub fn event_receiver(
    channel: impl Into<String>,
    directory: &Arc<ChannelDirectory>,
) -> Result<Receiver> {
    Receiver::new(&EventObserver::new(channel, Arc::clone(directory)))
}
