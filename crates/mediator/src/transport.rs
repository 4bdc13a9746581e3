//! In-memory transport.
//!
//! A [`ChannelDirectory`] maps channel names to exactly one [`Listener`].
//! An [`EventObserver`] installs a receiver's callback on a channel and an
//! [`EventDispatcher`] calls whatever listener the channel has at dispatch
//! time. The directory is an ordinary value: build one at the composition
//! root and hand it to both sides.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    futures::future::BoxFuture,
    missive_common::{Error, Request, Response, Result},
    tracing::{debug, info},
};

/// Callback handling one inbound request. Never fails: errors travel back
/// inside the [`Response`].
pub type Listener = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Outbound side of a transport, used by the sender's terminal action.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: Request) -> Result<Response>;

    /// Called when the submission of `request` was canceled. Best effort.
    fn forget(&self, _request: &Request) {}
}

/// Inbound side of a transport.
pub trait Observer {
    /// Install the callback for every inbound request.
    fn on_message(&self, listener: Listener) -> Result<()>;
}

// ── Channel directory ───────────────────────────────────────────────────────

/// Registry of listeners keyed by channel name.
#[derive(Default)]
pub struct ChannelDirectory {
    listeners: RwLock<HashMap<String, Listener>>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the listener for `channel`. A channel has at most one.
    pub fn add(&self, channel: impl Into<String>, listener: Listener) -> Result<()> {
        let channel = channel.into();
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        if listeners.contains_key(&channel) {
            return Err(Error::ListenerExists { channel });
        }
        info!(channel = %channel, "listener registered");
        listeners.insert(channel, listener);
        Ok(())
    }

    pub fn get(&self, channel: &str) -> Result<Listener> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel)
            .cloned()
            .ok_or_else(|| Error::NoListener {
                channel: channel.to_string(),
            })
    }

    /// Drop the listener for `channel`. Returns whether one was set.
    pub fn remove(&self, channel: &str) -> bool {
        let removed = self
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(channel)
            .is_some();
        if removed {
            info!(channel, "listener removed");
        }
        removed
    }

    /// Channel names with a listener, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        channels.sort();
        channels
    }
}

impl std::fmt::Debug for ChannelDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDirectory")
            .field("channels", &self.list())
            .finish()
    }
}

// ── Event dispatcher / observer ─────────────────────────────────────────────

/// Dispatches to the listener currently registered for a channel.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    channel: String,
    directory: Arc<ChannelDirectory>,
}

impl EventDispatcher {
    pub fn new(channel: impl Into<String>, directory: Arc<ChannelDirectory>) -> Self {
        Self {
            channel: channel.into(),
            directory,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl Dispatcher for EventDispatcher {
    async fn dispatch(&self, request: Request) -> Result<Response> {
        // Looked up per call so a receiver registered later is still found.
        let listener = self.directory.get(&self.channel)?;
        Ok(listener(request).await)
    }

    fn forget(&self, request: &Request) {
        debug!(
            channel = %self.channel,
            request_id = %request.id,
            "submission canceled"
        );
    }
}

/// Installs a listener on a channel.
#[derive(Debug, Clone)]
pub struct EventObserver {
    channel: String,
    directory: Arc<ChannelDirectory>,
}

impl EventObserver {
    pub fn new(channel: impl Into<String>, directory: Arc<ChannelDirectory>) -> Self {
        Self {
            channel: channel.into(),
            directory,
        }
    }
}

impl Observer for EventObserver {
    fn on_message(&self, listener: Listener) -> Result<()> {
        self.directory.add(self.channel.clone(), listener)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        futures::FutureExt,
        missive_common::Type,
        serde_json::{Value, json},
    };

    fn echo() -> Listener {
        Arc::new(|request: Request| {
            async move { Response::ok(request.id, request.data) }.boxed()
        })
    }

    #[test]
    fn one_listener_per_channel() {
        let directory = ChannelDirectory::new();
        directory.add("a", echo()).unwrap();
        let err = directory.add("a", echo()).unwrap_err();
        assert_eq!(err, Error::ListenerExists {
            channel: "a".into()
        });
        assert_eq!(
            err.to_string(),
            "A listener has already been set for events: a."
        );

        directory.add("b", echo()).unwrap();
        assert_eq!(directory.list(), ["a", "b"]);
        assert!(directory.remove("a"));
        assert!(!directory.remove("a"));
        assert_eq!(directory.list(), ["b"]);
    }

    #[test]
    fn unknown_channel_fails() {
        let directory = ChannelDirectory::new();
        let err = directory.get("nowhere").err().unwrap();
        assert_eq!(err.to_string(), "No listener was set for events: nowhere.");
    }

    #[tokio::test]
    async fn dispatcher_reaches_observer() {
        let directory = Arc::new(ChannelDirectory::new());
        let dispatcher = EventDispatcher::new("ch", Arc::clone(&directory));

        let request = Request::new(Type::new("Echo"), json!("hi"));
        let err = dispatcher.dispatch(request.clone()).await.unwrap_err();
        assert!(matches!(err, Error::NoListener { .. }));

        EventObserver::new("ch", Arc::clone(&directory))
            .on_message(echo())
            .unwrap();
        let response = dispatcher.dispatch(request.clone()).await.unwrap();
        assert_eq!(response.id, request.id);
        assert_eq!(response.data, Some(Value::from("hi")));
    }
}
