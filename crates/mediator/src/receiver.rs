//! Inbound side of the mediator.

use std::{
    any::TypeId,
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use {
    futures::FutureExt,
    missive_chain::{ChainBuilder, ChainRegistry, Resolver, action},
    missive_common::{Error, Request, Response, Result, Type},
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    configurator::{HandledMessageConfig, ReceiverConfiguration, with_default_namespace},
    interception::{InterceptionContext, ReceiverInterceptor, receiver_step},
    transport::{Listener, Observer},
};

#[derive(Default)]
struct State {
    default_namespace: Option<String>,
    interceptors: Vec<Arc<dyn ReceiverInterceptor>>,
    types: HashMap<TypeId, HandledMessageConfig>,
    /// Configured types, least recently configured first.
    order: Vec<TypeId>,
    /// Qualified routing name -> configured message type.
    names: HashMap<String, TypeId>,
}

impl State {
    fn message_type(&self, config: &HandledMessageConfig) -> Type {
        with_default_namespace(config.message_type(), self.default_namespace.as_deref())
    }

    fn index(&mut self, id: TypeId) {
        let Some(config) = self.types.get(&id) else {
            return;
        };
        let name = self.message_type(config).qualified_name();
        self.names.retain(|_, existing| *existing != id);
        if let Some(previous) = self.names.insert(name.clone(), id)
            && previous != id
        {
            warn!(message_type = %name, "message type name reassigned to another type");
        }
    }

    fn touch(&mut self, id: TypeId) {
        self.order.retain(|existing| *existing != id);
        self.order.push(id);
    }

    /// Rebuild the name index in configuration order, so that of two types
    /// sharing a name the most recently configured one keeps it.
    fn reindex(&mut self) {
        let order = self.order.clone();
        self.names.clear();
        for id in order {
            self.index(id);
        }
    }
}

struct Inner {
    state: Arc<RwLock<State>>,
    chains: ChainRegistry<TypeId, Request, Response>,
}

/// Routes inbound requests to the handler configured for their type.
///
/// Only message types made known through [`configure`](Self::configure)
/// are routable. Failures never escape: every outcome, including a
/// missing handler, comes back as a [`Response`] carrying the request id.
#[derive(Clone)]
pub struct Receiver {
    inner: Arc<Inner>,
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interceptors = self.read().interceptors.len();
        f.debug_struct("Receiver")
            .field("interceptors", &interceptors)
            .field("types", &self.message_types())
            .field("chains", &self.inner.chains)
            .finish()
    }
}

impl Receiver {
    /// Create a receiver and install it as `observer`'s listener.
    pub fn new(observer: &dyn Observer) -> Result<Self> {
        let receiver = Self::detached();
        let listener: Listener = {
            let receiver = receiver.clone();
            Arc::new(move |request: Request| {
                let receiver = receiver.clone();
                async move { receiver.receive(request).await }.boxed()
            })
        };
        observer.on_message(listener)?;
        Ok(receiver)
    }

    /// A receiver not attached to any transport; feed it with
    /// [`receive`](Self::receive).
    pub fn detached() -> Self {
        let state = Arc::new(RwLock::new(State::default()));
        let chains = ChainRegistry::new({
            let state = Arc::clone(&state);
            move |id: &TypeId| compile(&state, *id)
        });
        Self {
            inner: Arc::new(Inner { state, chains }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Handle one request. Never fails; errors are carried in the response.
    pub async fn receive(&self, request: Request) -> Response {
        let request_id = request.id.clone();
        let outcome = match self.route(&request.message_type) {
            Ok(id) => {
                let chain = self.inner.chains.get(&id);
                chain(request).await
            },
            Err(error) => Err(error),
        };
        match outcome {
            Ok(response) => response,
            Err(error) => {
                debug!(request_id = %request_id, error = %error, "request failed");
                Response::failed(request_id, error)
            },
        }
    }

    /// Handle a request that has not been decoded yet.
    ///
    /// A JSON `null` fails with [`Error::NullRequest`], anything that is not
    /// a request with [`Error::Codec`].
    pub async fn receive_value(&self, raw: Value) -> Response {
        if raw.is_null() {
            return Response::failed(String::new(), Error::NullRequest);
        }
        let request_id = raw
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<Request>(raw) {
            Ok(request) => self.receive(request).await,
            Err(e) => Response::failed(request_id, Error::codec(e)),
        }
    }

    fn route(&self, message_type: &Type) -> Result<TypeId> {
        let name = message_type.qualified_name();
        self.read()
            .names
            .get(&name)
            .copied()
            .ok_or_else(|| missing_handler(&name))
    }

    /// Merge a configuration into this receiver. Later configurations
    /// override names, namespaces and handlers, and append interceptors.
    pub fn configure(&self, configuration: &impl ReceiverConfiguration) -> &Self {
        let entries = configuration.build();
        {
            let mut state = self.write();
            for (id, config) in entries {
                let merged = match state.types.remove(&id) {
                    Some(existing) => existing.merge(config),
                    None => config,
                };
                debug!(
                    message_type = %merged.message_type(),
                    handled = merged.handler.is_some(),
                    "configured message type"
                );
                state.types.insert(id, merged);
                state.touch(id);
                state.index(id);
            }
        }
        self.inner.chains.clear();
        self
    }

    /// Add an interceptor wrapping every handler.
    pub fn intercept_all(&self, interceptor: impl ReceiverInterceptor + 'static) -> &Self {
        self.write().interceptors.push(Arc::new(interceptor));
        self.inner.chains.clear();
        self
    }

    /// Namespace for message types that end up without one.
    pub fn namespace(&self, namespace: impl Into<String>) -> &Self {
        {
            let mut state = self.write();
            state.default_namespace = Some(namespace.into());
            state.reindex();
        }
        self.inner.chains.clear();
        self
    }

    /// Qualified names of every routable message type, sorted.
    pub fn message_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().names.keys().cloned().collect();
        names.sort();
        names
    }
}

fn missing_handler(type_name: &str) -> Error {
    Error::missing_handler(format!(
        "No handler has been registered for messages of type [{type_name}]."
    ))
}

fn compile(state: &RwLock<State>, id: TypeId) -> Resolver<Request, Response> {
    let state = state.read().unwrap_or_else(|e| e.into_inner());
    let Some(config) = state.types.get(&id) else {
        // Configuration changed between routing and compiling.
        let error = Error::missing_handler("The message type is no longer configured.");
        return ChainBuilder::new().build(
            action(move |_context: InterceptionContext| {
                let error = error.clone();
                async move { Err(error) }
            }),
            Vec::new(),
        );
    };

    let type_name = state.message_type(config).qualified_name();
    let declared = config
        .handler
        .as_ref()
        .map(|binding| binding.interceptors.clone())
        .unwrap_or_default();
    let interceptors = state
        .interceptors
        .iter()
        .chain(&config.message.interceptors)
        .cloned()
        .chain(declared)
        .map(receiver_step)
        .collect();

    let binding = config.handler.clone();
    let terminal = action(move |context: InterceptionContext| {
        let binding = binding.clone();
        let type_name = type_name.clone();
        async move {
            let Some(binding) = binding else {
                return Err(missing_handler(&type_name));
            };
            let Some(handler) = binding.resolve() else {
                return Err(Error::missing_handler(format!(
                    "The handler factory returned no instance for messages of type [{type_name}]."
                )));
            };
            let request = context.data();
            let data = handler.handle(request.data).await?;
            Ok(Response::ok(request.id, data))
        }
    });

    ChainBuilder::new().build(terminal, interceptors)
}
