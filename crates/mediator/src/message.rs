//! Message and handler declarations.
//!
//! A message type declares its routing [`Type`] and the interceptors it
//! always travels with by implementing [`Message`]; a handler type declares
//! the interceptors that wrap it through [`Handler::interceptors`].

use std::{
    any::{TypeId, type_name},
    marker::PhantomData,
    sync::Arc,
};

use {
    async_trait::async_trait,
    missive_common::{Error, Result, Type},
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
};

use crate::interception::{ReceiverInterceptor, SenderInterceptor};

/// A message that can be submitted through a [`Sender`](crate::Sender).
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The result a handler produces for this message.
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Routing identity. Defaults to the type's name without a namespace.
    fn message_type() -> Type {
        Type::new(short_type_name::<Self>())
    }

    /// Interceptors wrapping every submission of this message, innermost
    /// tier on the sender side.
    fn interceptors() -> Vec<Arc<dyn SenderInterceptor>> {
        Vec::new()
    }
}

/// Handles messages of type `M` on the receiving side.
#[async_trait]
pub trait Handler<M: Message>: Send + Sync + 'static {
    async fn handle(&self, message: M) -> anyhow::Result<M::Output>;

    /// Interceptors wrapping this handler, innermost tier on the receiver
    /// side.
    fn interceptors() -> Vec<Arc<dyn ReceiverInterceptor>>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

/// `my_crate::module::Ping<u8>` -> `Ping`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Static metadata of a message type, recorded the first time it is used.
#[derive(Clone, Copy)]
pub(crate) struct MessageDescriptor {
    pub message_type: fn() -> Type,
    pub interceptors: fn() -> Vec<Arc<dyn SenderInterceptor>>,
}

impl MessageDescriptor {
    pub fn of<M: Message>() -> (TypeId, Self) {
        (TypeId::of::<M>(), Self {
            message_type: M::message_type,
            interceptors: M::interceptors,
        })
    }
}

// ── Type-erased handlers ────────────────────────────────────────────────────

/// A handler that accepts and produces JSON payloads.
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn handle(&self, data: Value) -> Result<Value>;
}

struct TypedHandler<M, H> {
    handler: Arc<H>,
    _message: PhantomData<fn() -> M>,
}

impl<M, H> TypedHandler<M, H> {
    fn erased(handler: Arc<H>) -> Arc<dyn ErasedHandler>
    where
        M: Message,
        H: Handler<M>,
    {
        Arc::new(Self {
            handler,
            _message: PhantomData,
        })
    }
}

#[async_trait]
impl<M, H> ErasedHandler for TypedHandler<M, H>
where
    M: Message,
    H: Handler<M>,
{
    async fn handle(&self, data: Value) -> Result<Value> {
        // Inbound payloads arrive untyped; decode into the registered type.
        let message: M = serde_json::from_value(data)?;
        let output = self.handler.handle(message).await.map_err(into_error)?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Handler errors pass through unchanged when they already are a
/// messaging [`Error`]; anything else becomes [`Error::Application`].
pub(crate) fn into_error(err: anyhow::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(error) => error,
        Err(other) => Error::application(other),
    }
}

type HandlerFactory = Arc<dyn Fn() -> Option<Arc<dyn ErasedHandler>> + Send + Sync>;

/// Factory shared by every message a handler type serves.
pub type SharedFactory<H> = Arc<dyn Fn() -> Option<H> + Send + Sync>;

#[derive(Clone)]
enum HandlerSource {
    Instance(Arc<dyn ErasedHandler>),
    Factory(HandlerFactory),
}

/// A configured handler: a shared instance or a factory, plus the
/// interceptors the handler type declares.
#[derive(Clone)]
pub struct HandlerBinding {
    source: HandlerSource,
    pub(crate) interceptors: Vec<Arc<dyn ReceiverInterceptor>>,
}

impl HandlerBinding {
    pub fn instance<M, H>(handler: H) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        Self::shared::<M, H>(Arc::new(handler))
    }

    /// An instance that may also be bound to other message types.
    pub fn shared<M, H>(handler: Arc<H>) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        Self {
            source: HandlerSource::Instance(TypedHandler::<M, H>::erased(handler)),
            interceptors: <H as Handler<M>>::interceptors(),
        }
    }

    /// A factory invoked for every request. Returning `None` fails the
    /// request with a missing-handler error.
    pub fn factory<M, H, F>(factory: F) -> Self
    where
        M: Message,
        H: Handler<M>,
        F: Fn() -> Option<H> + Send + Sync + 'static,
    {
        Self::shared_factory::<M, H>(Arc::new(factory))
    }

    /// A factory that may also be bound to other message types.
    pub fn shared_factory<M, H>(factory: SharedFactory<H>) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        let erased: HandlerFactory = Arc::new(move || {
            factory().map(|handler| TypedHandler::<M, H>::erased(Arc::new(handler)))
        });
        Self {
            source: HandlerSource::Factory(erased),
            interceptors: <H as Handler<M>>::interceptors(),
        }
    }

    pub(crate) fn resolve(&self) -> Option<Arc<dyn ErasedHandler>> {
        match &self.source {
            HandlerSource::Instance(handler) => Some(Arc::clone(handler)),
            HandlerSource::Factory(factory) => factory(),
        }
    }
}

impl std::fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            HandlerSource::Instance(_) => "instance",
            HandlerSource::Factory(_) => "factory",
        };
        f.debug_struct("HandlerBinding")
            .field("source", &source)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

// ── Handlers serving several messages ───────────────────────────────────────

/// A handler type responsible for a fixed list of message types.
///
/// Registering such a handler through
/// [`ReceiverConfigurator::serve`](crate::ReceiverConfigurator::serve) binds
/// it to every message it lists, in order.
///
/// ```ignore
/// impl ServesMessages for Calculator {
///     fn messages(served: &mut ServedMessages<Self>) {
///         served.message::<Add>().message::<Negate>();
///     }
/// }
/// ```
pub trait ServesMessages: Sized + Send + Sync + 'static {
    fn messages(served: &mut ServedMessages<Self>);
}

/// The message types a [`ServesMessages`] handler declared.
pub struct ServedMessages<H> {
    entries: Vec<ServedMessage<H>>,
}

pub(crate) struct ServedMessage<H> {
    pub id: TypeId,
    pub message_type: fn() -> Type,
    pub instance: fn(Arc<H>) -> HandlerBinding,
    pub factory: fn(SharedFactory<H>) -> HandlerBinding,
}

impl<H: ServesMessages> ServedMessages<H> {
    pub(crate) fn declared() -> Self {
        let mut served = Self {
            entries: Vec::new(),
        };
        H::messages(&mut served);
        served
    }

    /// Declare `M`. Declaring a type twice keeps its first position.
    pub fn message<M>(&mut self) -> &mut Self
    where
        M: Message,
        H: Handler<M>,
    {
        let id = TypeId::of::<M>();
        if !self.entries.iter().any(|entry| entry.id == id) {
            self.entries.push(ServedMessage {
                id,
                message_type: M::message_type,
                instance: HandlerBinding::shared::<M, H>,
                factory: HandlerBinding::shared_factory::<M, H>,
            });
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ServedMessage<H>> {
        self.entries.iter()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        serde::Deserialize,
        serde_json::json,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    impl Message for Ping {
        type Output = u32;
    }

    #[derive(Serialize, Deserialize)]
    struct Wrapped<T> {
        inner: T,
    }

    impl Message for Wrapped<u8> {
        type Output = ();

        fn message_type() -> Type {
            Type::new("wrapped").with_namespace("test")
        }
    }

    struct Doubler;

    #[async_trait]
    impl Handler<Ping> for Doubler {
        async fn handle(&self, message: Ping) -> anyhow::Result<u32> {
            if message.n == 0 {
                anyhow::bail!("zero");
            }
            Ok(message.n * 2)
        }
    }

    #[test]
    fn default_type_is_the_short_name() {
        assert_eq!(Ping::message_type(), Type::new("Ping"));
        assert_eq!(short_type_name::<Wrapped<Ping>>(), "Wrapped");
        assert_eq!(
            Wrapped::<u8>::message_type().qualified_name(),
            "test.wrapped"
        );
    }

    #[tokio::test]
    async fn instance_binding_decodes_and_encodes() {
        let binding = HandlerBinding::instance::<Ping, _>(Doubler);
        let handler = binding.resolve().unwrap();
        assert_eq!(handler.handle(json!({"n": 21})).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn handler_errors_become_application_errors() {
        let handler = HandlerBinding::instance::<Ping, _>(Doubler).resolve().unwrap();
        let err = handler.handle(json!({"n": 0})).await.unwrap_err();
        assert_eq!(err, Error::application("zero"));
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_codec_error() {
        let handler = HandlerBinding::instance::<Ping, _>(Doubler).resolve().unwrap();
        let err = handler.handle(json!("nope")).await.unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));
    }

    #[test]
    fn factory_binding_runs_factory_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let binding = HandlerBinding::factory::<Ping, Doubler, _>(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Doubler)
        });
        binding.resolve().unwrap();
        binding.resolve().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let empty = HandlerBinding::factory::<Ping, Doubler, _>(|| None);
        assert!(empty.resolve().is_none());
    }

    #[test]
    fn messaging_errors_pass_through_anyhow() {
        let err = into_error(anyhow::Error::new(Error::timeout("late")));
        assert!(err.is_timeout());
    }

    #[derive(Serialize, Deserialize)]
    struct Pong;

    impl Message for Pong {
        type Output = String;
    }

    #[async_trait]
    impl Handler<Pong> for Doubler {
        async fn handle(&self, _message: Pong) -> anyhow::Result<String> {
            Ok("pong".into())
        }
    }

    impl ServesMessages for Doubler {
        fn messages(served: &mut ServedMessages<Self>) {
            served.message::<Pong>().message::<Ping>().message::<Pong>();
        }
    }

    #[tokio::test]
    async fn served_messages_keep_declaration_order() {
        let served = ServedMessages::<Doubler>::declared();
        assert_eq!(served.len(), 2);

        let types: Vec<Type> = served.iter().map(|m| (m.message_type)()).collect();
        assert_eq!(types, [Type::new("Pong"), Type::new("Ping")]);

        let shared = Arc::new(Doubler);
        let handlers: Vec<_> = served
            .iter()
            .map(|m| (m.instance)(Arc::clone(&shared)).resolve().unwrap())
            .collect();
        assert_eq!(handlers[0].handle(Value::Null).await.unwrap(), json!("pong"));
        assert_eq!(handlers[1].handle(json!({"n": 4})).await.unwrap(), json!(8));
    }
}
