//! Interceptor traits and the standard interceptors.
//!
//! Every standard interceptor works on both sides of the mediator: it
//! implements [`SenderInterceptor`] and [`ReceiverInterceptor`] by delegating
//! to one shared `intercept` method.

use std::sync::Arc;

use {
    async_trait::async_trait,
    futures::FutureExt,
    missive_chain::Interceptor,
    missive_common::{Request, Response, Result},
};

/// Implement both interceptor traits on a type exposing
/// `async fn intercept(&self, Request, Next, InterceptionContext)`.
macro_rules! both_sides {
    ($ty:ty) => {
        #[async_trait::async_trait]
        impl $crate::interception::SenderInterceptor for $ty {
            async fn submit(
                &self,
                request: missive_common::Request,
                next: $crate::interception::Next,
                context: $crate::interception::InterceptionContext,
            ) -> missive_common::Result<missive_common::Response> {
                self.intercept(request, next, context).await
            }
        }

        #[async_trait::async_trait]
        impl $crate::interception::ReceiverInterceptor for $ty {
            async fn handle(
                &self,
                request: missive_common::Request,
                next: $crate::interception::Next,
                context: $crate::interception::InterceptionContext,
            ) -> missive_common::Result<missive_common::Response> {
                self.intercept(request, next, context).await
            }
        }
    };
}

pub mod delay;
pub mod retry;
pub mod return_value;
pub mod throw;
pub mod timeout;

pub use {
    delay::Delay,
    retry::{Retry, RetryFilter},
    return_value::Return,
    throw::Throw,
    timeout::Timeout,
};

/// Continuation that runs the rest of the chain.
pub type Next = missive_chain::Next<Request, Response>;

/// The context of the interceptor currently running.
pub type InterceptionContext = missive_chain::InterceptionContext<Request>;

/// Wraps outbound submissions.
#[async_trait]
pub trait SenderInterceptor: Send + Sync {
    async fn submit(
        &self,
        request: Request,
        next: Next,
        context: InterceptionContext,
    ) -> Result<Response>;
}

/// Wraps inbound handling.
#[async_trait]
pub trait ReceiverInterceptor: Send + Sync {
    async fn handle(
        &self,
        request: Request,
        next: Next,
        context: InterceptionContext,
    ) -> Result<Response>;
}

pub(crate) fn sender_step(
    interceptor: Arc<dyn SenderInterceptor>,
) -> Interceptor<Request, Response> {
    Arc::new(move |context: InterceptionContext, next: Next| {
        let interceptor = Arc::clone(&interceptor);
        async move {
            let request = context.data();
            interceptor.submit(request, next, context).await
        }
        .boxed()
    })
}

pub(crate) fn receiver_step(
    interceptor: Arc<dyn ReceiverInterceptor>,
) -> Interceptor<Request, Response> {
    Arc::new(move |context: InterceptionContext, next: Next| {
        let interceptor = Arc::clone(&interceptor);
        async move {
            let request = context.data();
            interceptor.handle(request, next, context).await
        }
        .boxed()
    })
}
