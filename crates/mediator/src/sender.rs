//! Outbound side of the mediator.

use std::{
    any::TypeId,
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use {
    missive_chain::{ChainBuilder, ChainRegistry, Resolver, action},
    missive_common::{Request, Response, Result, Type},
    tracing::debug,
};

use crate::{
    configurator::{MessageConfig, SenderConfiguration, with_default_namespace},
    interception::{InterceptionContext, SenderInterceptor, sender_step},
    message::{Message, MessageDescriptor},
    transport::Dispatcher,
};

#[derive(Default)]
struct State {
    default_namespace: Option<String>,
    interceptors: Vec<Arc<dyn SenderInterceptor>>,
    types: HashMap<TypeId, MessageConfig>,
    descriptors: HashMap<TypeId, MessageDescriptor>,
}

impl State {
    fn message_type(&self, id: TypeId) -> Option<Type> {
        let declared = match self.types.get(&id) {
            Some(config) => config.message_type(),
            None => (self.descriptors.get(&id)?.message_type)(),
        };
        Some(with_default_namespace(declared, self.default_namespace.as_deref()))
    }
}

struct Inner {
    state: Arc<RwLock<State>>,
    chains: ChainRegistry<TypeId, Request, Response>,
}

/// Submits typed messages through a [`Dispatcher`].
///
/// Every submission runs through the chain compiled for its message type:
/// mediator-wide interceptors, then configured ones, then the ones the
/// message type declares, then dispatch. Cloning is cheap and clones share
/// all configuration.
#[derive(Clone)]
pub struct Sender {
    inner: Arc<Inner>,
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (interceptors, configured_types) = {
            let state = self.read();
            (state.interceptors.len(), state.types.len())
        };
        f.debug_struct("Sender")
            .field("interceptors", &interceptors)
            .field("configured_types", &configured_types)
            .field("chains", &self.inner.chains)
            .finish()
    }
}

impl Sender {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        let state = Arc::new(RwLock::new(State::default()));
        let chains = ChainRegistry::new({
            let state = Arc::clone(&state);
            move |id: &TypeId| compile(&state, &dispatcher, *id)
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

    /// Submit `message` and wait for its result.
    ///
    /// Fails with whatever error the failing layer produced: an interceptor,
    /// the transport, or the remote handler.
    pub async fn submit<M: Message>(&self, message: M) -> Result<M::Output> {
        let id = TypeId::of::<M>();
        let message_type = self.describe::<M>();
        let request = Request::new(message_type, serde_json::to_value(&message)?);
        debug!(
            request_id = %request.id,
            message_type = %request.message_type,
            "submitting message"
        );

        let chain = self.inner.chains.get(&id);
        let data = chain(request).await?.into_result()?;
        Ok(serde_json::from_value(data)?)
    }

    /// The routing type `M` is currently sent with.
    pub fn message_type<M: Message>(&self) -> Type {
        self.describe::<M>()
    }

    fn describe<M: Message>(&self) -> Type {
        let id = TypeId::of::<M>();
        if !self.read().descriptors.contains_key(&id) {
            let (id, descriptor) = MessageDescriptor::of::<M>();
            self.write().descriptors.entry(id).or_insert(descriptor);
        }
        self.read().message_type(id).unwrap_or_else(M::message_type)
    }

    /// Merge a configuration into this sender. Later configurations override
    /// names and namespaces and append interceptors.
    pub fn configure(&self, configuration: &impl SenderConfiguration) -> &Self {
        let entries = configuration.build();
        {
            let mut state = self.write();
            for (id, config) in entries {
                let merged = match state.types.remove(&id) {
                    Some(existing) => existing.merge(config),
                    None => config,
                };
                debug!(message_type = %merged.message_type(), "configured message type");
                state.types.insert(id, merged);
            }
        }
        self.inner.chains.clear();
        self
    }

    /// Add an interceptor wrapping every message type.
    pub fn intercept_all(&self, interceptor: impl SenderInterceptor + 'static) -> &Self {
        self.write().interceptors.push(Arc::new(interceptor));
        self.inner.chains.clear();
        self
    }

    /// Namespace for message types that end up without one.
    pub fn namespace(&self, namespace: impl Into<String>) -> &Self {
        self.write().default_namespace = Some(namespace.into());
        self
    }
}

fn compile(
    state: &RwLock<State>,
    dispatcher: &Arc<dyn Dispatcher>,
    id: TypeId,
) -> Resolver<Request, Response> {
    let interceptors = {
        let state = state.read().unwrap_or_else(|e| e.into_inner());
        let configured = state.types.get(&id).map(|c| c.interceptors.as_slice());
        let declared = state
            .descriptors
            .get(&id)
            .map(|d| (d.interceptors)())
            .unwrap_or_default();
        state
            .interceptors
            .iter()
            .chain(configured.unwrap_or_default())
            .cloned()
            .chain(declared)
            .map(sender_step)
            .collect()
    };

    let dispatcher = Arc::clone(dispatcher);
    let terminal = action(move |context: InterceptionContext| {
        let dispatcher = Arc::clone(&dispatcher);
        let request = context.data();
        context.on_cancel({
            let dispatcher = Arc::clone(&dispatcher);
            let request = request.clone();
            move || dispatcher.forget(&request)
        });
        async move { dispatcher.dispatch(request).await }
    });

    ChainBuilder::new().build(terminal, interceptors)
}
