//! Fluent configuration of message types.
//!
//! A configurator collects, per message type, name/namespace overrides and
//! interceptors (plus the handler on the receiving side) and hands them to a
//! [`Sender`](crate::Sender) or [`Receiver`](crate::Receiver) through
//! [`SenderConfiguration::build`] / [`ReceiverConfiguration::build`].
//!
//! ```ignore
//! let config = Configurator::receiver()
//!     .namespace("shop")
//!     .message::<PlaceOrder>()
//!     .intercept(Timeout::from_millis(500))
//!     .handle_with(PlaceOrderHandler::default());
//! receiver.configure(&config);
//! ```

use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use {missive_common::Type, tracing::warn};

use crate::{
    interception::{ReceiverInterceptor, SenderInterceptor},
    message::{
        Handler, HandlerBinding, Message, ServedMessage, ServedMessages, ServesMessages,
        SharedFactory,
    },
};

// ── Entries ─────────────────────────────────────────────────────────────────

/// Name and namespace overrides for a message type. Unset fields keep the
/// type's own values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageOptions {
    pub name: Option<String>,
    pub namespace: Option<String>,
}

impl MessageOptions {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Configuration of one message type on the sending side (or the message
/// part of a [`HandledMessageConfig`]).
pub struct MessageConfig<I: ?Sized = dyn SenderInterceptor> {
    defaults: Type,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub interceptors: Vec<Arc<I>>,
}

impl<I: ?Sized> MessageConfig<I> {
    pub fn new(defaults: Type) -> Self {
        Self {
            defaults,
            name: None,
            namespace: None,
            interceptors: Vec::new(),
        }
    }

    pub fn of<M: Message>() -> Self {
        Self::new(M::message_type())
    }

    /// The type declared by the message itself.
    pub fn defaults(&self) -> &Type {
        &self.defaults
    }

    /// The routing type after overrides.
    pub fn message_type(&self) -> Type {
        Type {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| self.defaults.name.clone()),
            namespace: self
                .namespace
                .clone()
                .or_else(|| self.defaults.namespace.clone()),
        }
    }

    pub fn apply(&mut self, options: MessageOptions) {
        if let Some(name) = options.name {
            self.name = Some(name);
        }
        if let Some(namespace) = options.namespace {
            self.namespace = Some(namespace);
        }
    }

    /// Combine with a configuration made later: `later`'s overrides win,
    /// interceptor lists are concatenated (earlier first).
    #[must_use]
    pub fn merge(mut self, later: Self) -> Self {
        self.name = later.name.or(self.name);
        self.namespace = later.namespace.or(self.namespace);
        self.interceptors.extend(later.interceptors);
        self
    }
}

impl<I: ?Sized> Clone for MessageConfig<I> {
    fn clone(&self) -> Self {
        Self {
            defaults: self.defaults.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            interceptors: self.interceptors.clone(),
        }
    }
}

impl<I: ?Sized> fmt::Debug for MessageConfig<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageConfig")
            .field("type", &self.message_type())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Configuration of one message type on the receiving side.
#[derive(Debug, Clone)]
pub struct HandledMessageConfig {
    pub message: MessageConfig<dyn ReceiverInterceptor>,
    /// `None` leaves the message type unhandled.
    pub handler: Option<HandlerBinding>,
}

impl HandledMessageConfig {
    pub fn new(defaults: Type) -> Self {
        Self {
            message: MessageConfig::new(defaults),
            handler: None,
        }
    }

    pub fn of<M: Message>() -> Self {
        Self::new(M::message_type())
    }

    pub fn message_type(&self) -> Type {
        self.message.message_type()
    }

    /// Like [`MessageConfig::merge`]; a later handler replaces an earlier one.
    #[must_use]
    pub fn merge(self, later: Self) -> Self {
        Self {
            message: self.message.merge(later.message),
            handler: later.handler.or(self.handler),
        }
    }
}

/// Fill in `namespace` when `ty` has none.
pub(crate) fn with_default_namespace(mut ty: Type, namespace: Option<&str>) -> Type {
    if ty.namespace.as_deref().is_none_or(str::is_empty)
        && let Some(namespace) = namespace
    {
        ty.namespace = Some(namespace.to_string());
    }
    ty
}

/// Produces sender-side configuration.
pub trait SenderConfiguration {
    fn build(&self) -> HashMap<TypeId, MessageConfig>;
}

/// Produces receiver-side configuration.
pub trait ReceiverConfiguration {
    fn build(&self) -> HashMap<TypeId, HandledMessageConfig>;
}

impl SenderConfiguration for HashMap<TypeId, MessageConfig> {
    fn build(&self) -> HashMap<TypeId, MessageConfig> {
        self.clone()
    }
}

impl ReceiverConfiguration for HashMap<TypeId, HandledMessageConfig> {
    fn build(&self) -> HashMap<TypeId, HandledMessageConfig> {
        self.clone()
    }
}

// ── Shared builder state ────────────────────────────────────────────────────

trait Entry: Clone {
    type Interceptor: ?Sized;

    fn create(defaults: Type) -> Self;
    fn message_mut(&mut self) -> &mut MessageConfig<Self::Interceptor>;
}

impl Entry for MessageConfig {
    type Interceptor = dyn SenderInterceptor;

    fn create(defaults: Type) -> Self {
        Self::new(defaults)
    }

    fn message_mut(&mut self) -> &mut MessageConfig<Self::Interceptor> {
        self
    }
}

impl Entry for HandledMessageConfig {
    type Interceptor = dyn ReceiverInterceptor;

    fn create(defaults: Type) -> Self {
        Self::new(defaults)
    }

    fn message_mut(&mut self) -> &mut MessageConfig<Self::Interceptor> {
        &mut self.message
    }
}

struct State<E: Entry> {
    default_namespace: Option<String>,
    interceptors: Vec<Arc<E::Interceptor>>,
    entries: HashMap<TypeId, E>,
    selection: Vec<TypeId>,
}

impl<E: Entry> Default for State<E> {
    fn default() -> Self {
        Self {
            default_namespace: None,
            interceptors: Vec::new(),
            entries: HashMap::new(),
            selection: Vec::new(),
        }
    }
}

impl<E: Entry> State<E> {
    fn select<M: Message>(&mut self, options: Option<MessageOptions>) {
        let id = TypeId::of::<M>();
        let entry = self.entry(id, M::message_type);
        if let Some(options) = options {
            entry.message_mut().apply(options);
        }
        self.selection = vec![id];
    }

    fn entry(&mut self, id: TypeId, message_type: fn() -> Type) -> &mut E {
        self.entries
            .entry(id)
            .or_insert_with(|| E::create(message_type()))
    }

    fn intercept(&mut self, interceptor: Arc<E::Interceptor>) {
        for id in &self.selection {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.message_mut().interceptors.push(Arc::clone(&interceptor));
            }
        }
    }

    fn intercept_all(&mut self, interceptor: Arc<E::Interceptor>) {
        self.interceptors.push(interceptor);
        self.selection.clear();
    }

    fn selected(&mut self) -> impl Iterator<Item = &mut E> {
        let selection = &self.selection;
        self.entries
            .iter_mut()
            .filter(move |(id, _)| selection.contains(id))
            .map(|(_, entry)| entry)
    }

    fn build(&self) -> HashMap<TypeId, E> {
        self.entries
            .iter()
            .map(|(id, entry)| {
                let mut entry = entry.clone();
                let message = entry.message_mut();

                let mut interceptors = self.interceptors.clone();
                interceptors.append(&mut message.interceptors);
                message.interceptors = interceptors;

                if let Some(ns) = &self.default_namespace
                    && message.namespace.is_none()
                    && message.defaults.namespace.is_none()
                {
                    message.namespace = Some(ns.clone());
                }
                (*id, entry)
            })
            .collect()
    }
}

/// Entry point for fluent configuration.
pub struct Configurator;

impl Configurator {
    pub fn sender() -> SenderConfigurator {
        SenderConfigurator::default()
    }

    pub fn receiver() -> ReceiverConfigurator {
        ReceiverConfigurator::default()
    }
}

// ── Sender ──────────────────────────────────────────────────────────────────

/// Fluent sender-side configuration.
#[derive(Default)]
pub struct SenderConfigurator {
    state: State<MessageConfig>,
}

impl SenderConfigurator {
    /// Namespace for message types that declare none and get none here.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.state.default_namespace = Some(namespace.into());
        self
    }

    /// Select `M`; following [`intercept`](Self::intercept) calls apply to it.
    #[must_use]
    pub fn message<M: Message>(mut self) -> Self {
        self.state.select::<M>(None);
        self
    }

    /// Select `M` and override its name and/or namespace.
    #[must_use]
    pub fn message_with<M: Message>(mut self, options: MessageOptions) -> Self {
        self.state.select::<M>(Some(options));
        self
    }

    /// Append an interceptor to the selected message type.
    #[must_use]
    pub fn intercept(mut self, interceptor: impl SenderInterceptor + 'static) -> Self {
        self.state.intercept(Arc::new(interceptor));
        self
    }

    /// Add an interceptor ahead of every message type's own list, and clear
    /// the selection.
    #[must_use]
    pub fn intercept_all(mut self, interceptor: impl SenderInterceptor + 'static) -> Self {
        self.state.intercept_all(Arc::new(interceptor));
        self
    }
}

impl SenderConfiguration for SenderConfigurator {
    fn build(&self) -> HashMap<TypeId, MessageConfig> {
        self.state.build()
    }
}

// ── Receiver ────────────────────────────────────────────────────────────────

/// Fluent receiver-side configuration.
#[derive(Default)]
pub struct ReceiverConfigurator {
    state: State<HandledMessageConfig>,
}

impl ReceiverConfigurator {
    /// Namespace for message types that declare none and get none here.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.state.default_namespace = Some(namespace.into());
        self
    }

    /// Select `M` for interceptors and a handler.
    pub fn message<M: Message>(mut self) -> MessageConfigurator<M> {
        self.state.select::<M>(None);
        MessageConfigurator::new(self)
    }

    /// Select `M` and override its name and/or namespace.
    pub fn message_with<M: Message>(mut self, options: MessageOptions) -> MessageConfigurator<M> {
        self.state.select::<M>(Some(options));
        MessageConfigurator::new(self)
    }

    /// Register `handler` for `M`, same as `message::<M>().handle_with(handler)`.
    pub fn handler<M, H>(self, handler: H) -> MessageConfigurator<M>
    where
        M: Message,
        H: Handler<M>,
    {
        self.message::<M>().handle_with(handler)
    }

    /// Register `handler` for every message type it serves and select them
    /// all.
    pub fn serve<H: ServesMessages>(self, handler: H) -> HandlerConfigurator<H> {
        let handler = Arc::new(handler);
        self.bind_served(|served| (served.instance)(Arc::clone(&handler)))
    }

    /// Like [`serve`](Self::serve), with a fresh instance per request.
    pub fn serve_with_factory<H, F>(self, factory: F) -> HandlerConfigurator<H>
    where
        H: ServesMessages,
        F: Fn() -> Option<H> + Send + Sync + 'static,
    {
        let factory: SharedFactory<H> = Arc::new(factory);
        self.bind_served(|served| (served.factory)(Arc::clone(&factory)))
    }

    fn bind_served<H: ServesMessages>(
        mut self,
        bind: impl Fn(&ServedMessage<H>) -> HandlerBinding,
    ) -> HandlerConfigurator<H> {
        let served = ServedMessages::<H>::declared();
        if served.is_empty() {
            warn!(
                handler = type_name::<H>(),
                "handler serves no message types, nothing configured"
            );
        }
        for message in served.iter() {
            self.state.entry(message.id, message.message_type).handler = Some(bind(message));
        }
        self.state.selection = served.iter().map(|message| message.id).collect();
        HandlerConfigurator {
            inner: self,
            _handler: PhantomData,
        }
    }

    /// Add an interceptor ahead of every message type's own list, and clear
    /// the selection.
    #[must_use]
    pub fn intercept_all(mut self, interceptor: impl ReceiverInterceptor + 'static) -> Self {
        self.state.intercept_all(Arc::new(interceptor));
        self
    }
}

impl ReceiverConfiguration for ReceiverConfigurator {
    fn build(&self) -> HashMap<TypeId, HandledMessageConfig> {
        self.state.build()
    }
}

/// A [`ReceiverConfigurator`] with message type `M` selected.
pub struct MessageConfigurator<M> {
    inner: ReceiverConfigurator,
    _message: PhantomData<fn() -> M>,
}

impl<M: Message> MessageConfigurator<M> {
    fn new(inner: ReceiverConfigurator) -> Self {
        Self {
            inner,
            _message: PhantomData,
        }
    }

    /// Append an interceptor to `M`.
    #[must_use]
    pub fn intercept(mut self, interceptor: impl ReceiverInterceptor + 'static) -> Self {
        self.inner.state.intercept(Arc::new(interceptor));
        self
    }

    /// Handle `M` with one shared instance.
    #[must_use]
    pub fn handle_with<H: Handler<M>>(self, handler: H) -> Self {
        self.bind(HandlerBinding::instance::<M, H>(handler))
    }

    /// Handle `M` with a fresh instance per request. A factory returning
    /// `None` fails that request with a missing-handler error.
    #[must_use]
    pub fn handle_with_factory<H, F>(self, factory: F) -> Self
    where
        H: Handler<M>,
        F: Fn() -> Option<H> + Send + Sync + 'static,
    {
        self.bind(HandlerBinding::factory::<M, H, F>(factory))
    }

    fn bind(mut self, binding: HandlerBinding) -> Self {
        for entry in self.inner.state.selected() {
            entry.handler = Some(binding.clone());
        }
        self
    }

    pub fn message<N: Message>(self) -> MessageConfigurator<N> {
        self.inner.message::<N>()
    }

    pub fn message_with<N: Message>(self, options: MessageOptions) -> MessageConfigurator<N> {
        self.inner.message_with::<N>(options)
    }

    pub fn handler<N, H>(self, handler: H) -> MessageConfigurator<N>
    where
        N: Message,
        H: Handler<N>,
    {
        self.inner.handler::<N, H>(handler)
    }

    pub fn serve<H: ServesMessages>(self, handler: H) -> HandlerConfigurator<H> {
        self.inner.serve(handler)
    }

    pub fn serve_with_factory<H, F>(self, factory: F) -> HandlerConfigurator<H>
    where
        H: ServesMessages,
        F: Fn() -> Option<H> + Send + Sync + 'static,
    {
        self.inner.serve_with_factory(factory)
    }

    pub fn intercept_all(
        self,
        interceptor: impl ReceiverInterceptor + 'static,
    ) -> ReceiverConfigurator {
        self.inner.intercept_all(interceptor)
    }

    pub fn namespace(self, namespace: impl Into<String>) -> ReceiverConfigurator {
        self.inner.namespace(namespace)
    }

    /// Back to the untyped configurator.
    pub fn done(self) -> ReceiverConfigurator {
        self.inner
    }
}

impl<M> ReceiverConfiguration for MessageConfigurator<M> {
    fn build(&self) -> HashMap<TypeId, HandledMessageConfig> {
        self.inner.build()
    }
}

/// A [`ReceiverConfigurator`] with every message type served by `H`
/// selected.
pub struct HandlerConfigurator<H> {
    inner: ReceiverConfigurator,
    _handler: PhantomData<fn() -> H>,
}

impl<H> HandlerConfigurator<H> {
    /// Append an interceptor to every message type `H` serves.
    #[must_use]
    pub fn intercept(mut self, interceptor: impl ReceiverInterceptor + 'static) -> Self {
        self.inner.state.intercept(Arc::new(interceptor));
        self
    }

    pub fn message<N: Message>(self) -> MessageConfigurator<N> {
        self.inner.message::<N>()
    }

    pub fn message_with<N: Message>(self, options: MessageOptions) -> MessageConfigurator<N> {
        self.inner.message_with::<N>(options)
    }

    pub fn handler<N, G>(self, handler: G) -> MessageConfigurator<N>
    where
        N: Message,
        G: Handler<N>,
    {
        self.inner.handler::<N, G>(handler)
    }

    pub fn serve<G: ServesMessages>(self, handler: G) -> HandlerConfigurator<G> {
        self.inner.serve(handler)
    }

    pub fn serve_with_factory<G, F>(self, factory: F) -> HandlerConfigurator<G>
    where
        G: ServesMessages,
        F: Fn() -> Option<G> + Send + Sync + 'static,
    {
        self.inner.serve_with_factory(factory)
    }

    pub fn namespace(self, namespace: impl Into<String>) -> ReceiverConfigurator {
        self.inner.namespace(namespace)
    }

    pub fn intercept_all(
        self,
        interceptor: impl ReceiverInterceptor + 'static,
    ) -> ReceiverConfigurator {
        self.inner.intercept_all(interceptor)
    }

    /// Back to the untyped configurator.
    pub fn done(self) -> ReceiverConfigurator {
        self.inner
    }
}

impl<H> ReceiverConfiguration for HandlerConfigurator<H> {
    fn build(&self) -> HashMap<TypeId, HandledMessageConfig> {
        self.inner.build()
    }
}
