//! Chain compilation.
//!
//! [`ChainBuilder::build`] folds a terminal action and an ordered list of
//! interceptors, right to left, into one [`Resolver`]. The first interceptor
//! is outermost. Every step runs behind the same cancellation guard:
//!
//! - if the step's context is already canceled, the step is not invoked and
//!   its future never settles;
//! - once the step settles, the context is checked again and a canceled
//!   step's outcome is swallowed the same way.
//!
//! A canceled branch can therefore never deliver a stale result to whoever
//! is still waiting upstream.

use std::{
    any::Any,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use {
    futures::{FutureExt, future::BoxFuture},
    missive_common::{Error, Result},
    tracing::trace,
};

use crate::context::InterceptionContext;

/// Future returned by every step of a chain.
pub type ChainFuture<T> = BoxFuture<'static, Result<T>>;

/// A compiled chain: feed it an input, get the settled output.
pub type Resolver<TIn, TOut> = Arc<dyn Fn(TIn) -> ChainFuture<TOut> + Send + Sync>;

/// The innermost step of a chain.
pub type Action<TIn, TOut> =
    Arc<dyn Fn(InterceptionContext<TIn>) -> ChainFuture<TOut> + Send + Sync>;

/// A step wrapping everything downstream of it.
pub type Interceptor<TIn, TOut> =
    Arc<dyn Fn(InterceptionContext<TIn>, Next<TIn, TOut>) -> ChainFuture<TOut> + Send + Sync>;

/// Wrap an async closure as an [`Action`].
pub fn action<TIn, TOut, F, Fut>(f: F) -> Action<TIn, TOut>
where
    F: Fn(InterceptionContext<TIn>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TOut>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Wrap an async closure as an [`Interceptor`].
pub fn interceptor<TIn, TOut, F, Fut>(f: F) -> Interceptor<TIn, TOut>
where
    F: Fn(InterceptionContext<TIn>, Next<TIn, TOut>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TOut>> + Send + 'static,
{
    Arc::new(move |ctx, next| f(ctx, next).boxed())
}

/// Continuation handed to an interceptor.
///
/// Each [`run`](Self::run) creates a fresh child of the interceptor's
/// context (orphaning the previous one) and invokes the rest of the chain
/// against it. Not calling it short-circuits the chain.
pub struct Next<TIn, TOut> {
    context: InterceptionContext<TIn>,
    downstream: Action<TIn, TOut>,
}

impl<TIn, TOut> Clone for Next<TIn, TOut> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            downstream: Arc::clone(&self.downstream),
        }
    }
}

impl<TIn, TOut> Next<TIn, TOut> {
    pub fn run(&self, data: TIn) -> ChainFuture<TOut> {
        let child = self.context.next(data);
        (self.downstream)(child)
    }
}

/// Composes interceptors and a terminal action into a [`Resolver`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ChainBuilder;

impl ChainBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build<TIn, TOut>(
        &self,
        action: Action<TIn, TOut>,
        interceptors: Vec<Interceptor<TIn, TOut>>,
    ) -> Resolver<TIn, TOut>
    where
        TIn: Send + 'static,
        TOut: Send + 'static,
    {
        let terminal: Action<TIn, TOut> = Arc::new(move |ctx| {
            let action = Arc::clone(&action);
            guarded(ctx, move |ctx| action(ctx))
        });

        let chain = interceptors
            .into_iter()
            .rev()
            .fold(terminal, |downstream, intercept| -> Action<TIn, TOut> {
                Arc::new(move |ctx: InterceptionContext<TIn>| {
                    let next = Next {
                        context: ctx.clone(),
                        downstream: Arc::clone(&downstream),
                    };
                    let intercept = Arc::clone(&intercept);
                    guarded(ctx, move |ctx| intercept(ctx, next))
                })
            });

        Arc::new(move |input| chain(InterceptionContext::start(input)))
    }
}

fn guarded<TIn, TOut>(
    context: InterceptionContext<TIn>,
    invoke: impl FnOnce(InterceptionContext<TIn>) -> ChainFuture<TOut>,
) -> ChainFuture<TOut>
where
    TIn: Send + 'static,
    TOut: Send + 'static,
{
    if context.is_canceled() {
        trace!(context = ?context.id(), "context canceled, skipping step");
        return never();
    }

    let started = panic::catch_unwind(AssertUnwindSafe(|| invoke(context.clone())));

    async move {
        let settled = match started {
            Ok(step) => AssertUnwindSafe(step)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panicked(payload))),
            Err(payload) => Err(panicked(payload)),
        };

        if context.is_canceled() {
            trace!(context = ?context.id(), "context canceled, suppressing settlement");
            return never::<TOut>().await;
        }
        settled
    }
    .boxed()
}

/// A future that deliberately never settles.
fn never<T: Send + 'static>() -> ChainFuture<T> {
    futures::future::pending().boxed()
}

fn panicked(payload: Box<dyn Any + Send>) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    Error::Panicked { message }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::{
                Mutex,
                atomic::{AtomicUsize, Ordering},
            },
            time::Duration,
        },
        tokio::time::timeout,
    };

    fn doubling() -> Action<i32, i32> {
        action(|ctx: InterceptionContext<i32>| async move { Ok(ctx.data() * 2) })
    }

    fn counting(calls: Arc<AtomicUsize>) -> Action<i32, i32> {
        action(move |ctx: InterceptionContext<i32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(ctx.data() * 2) }
        })
    }

    fn passthrough() -> Interceptor<i32, i32> {
        interceptor(|ctx: InterceptionContext<i32>, next: Next<i32, i32>| next.run(ctx.data()))
    }

    fn tagging(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> Interceptor<i32, i32> {
        interceptor(move |ctx: InterceptionContext<i32>, next: Next<i32, i32>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{tag}:in"));
                let out = next.run(ctx.data()).await;
                log.lock().unwrap().push(format!("{tag}:out"));
                out
            }
        })
    }

    async fn settles<T>(future: ChainFuture<T>) -> Option<Result<T>> {
        timeout(Duration::from_millis(50), future).await.ok()
    }

    #[tokio::test]
    async fn empty_chain_is_the_terminal_action() {
        let chain = ChainBuilder::new().build(doubling(), vec![]);
        assert_eq!(chain(21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn passthrough_interceptors_invoke_terminal_once() {
        for n in 0..6 {
            let calls = Arc::new(AtomicUsize::new(0));
            let interceptors = (0..n).map(|_| passthrough()).collect();
            let chain = ChainBuilder::new().build(counting(Arc::clone(&calls)), interceptors);
            assert_eq!(chain(5).await.unwrap(), 10);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn first_interceptor_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ChainBuilder::new().build(doubling(), vec![
            tagging(Arc::clone(&log), "a"),
            tagging(Arc::clone(&log), "b"),
        ]);

        chain(1).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a:in", "b:in", "b:out", "a:out"]);
    }

    #[tokio::test]
    async fn interceptors_can_transform_payload_and_result() {
        let add_one = interceptor(|ctx: InterceptionContext<i32>, next: Next<i32, i32>| async move {
            let out = next.run(ctx.data() + 1).await?;
            Ok(out + 100)
        });
        let chain = ChainBuilder::new().build(doubling(), vec![add_one]);
        assert_eq!(chain(1).await.unwrap(), 104);
    }

    #[tokio::test]
    async fn skipping_next_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let short = interceptor(|_ctx: InterceptionContext<i32>, _next: Next<i32, i32>| async {
            Ok(-1)
        });
        let chain = ChainBuilder::new().build(counting(Arc::clone(&calls)), vec![short]);
        assert_eq!(chain(1).await.unwrap(), -1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn errors_propagate_unchanged() {
        let failing = action(|_ctx: InterceptionContext<i32>| async {
            Err::<i32, _>(Error::application("x"))
        });
        let chain = ChainBuilder::new().build(failing, vec![passthrough()]);
        assert_eq!(chain(1).await.unwrap_err(), Error::application("x"));
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let sync_panic: Interceptor<i32, i32> = Arc::new(|_ctx, _next| panic!("sync"));
        let chain = ChainBuilder::new().build(doubling(), vec![sync_panic]);
        assert_eq!(chain(1).await.unwrap_err(), Error::Panicked {
            message: "sync".into()
        });

        let async_panic = action(|_ctx: InterceptionContext<i32>| async {
            if true {
                panic!("async");
            }
            Ok(0)
        });
        let chain = ChainBuilder::new().build(async_panic, vec![]);
        assert_eq!(chain(1).await.unwrap_err(), Error::Panicked {
            message: "async".into()
        });
    }

    #[tokio::test]
    async fn canceled_branch_never_settles() {
        // Cancels the attempt it just awaited, then reports back.
        let abandon = interceptor(|ctx: InterceptionContext<i32>, next: Next<i32, i32>| async move {
            let pending = next.run(ctx.data());
            ctx.cancel();
            pending.await
        });
        let chain = ChainBuilder::new().build(doubling(), vec![passthrough(), abandon]);
        assert!(settles(chain(1)).await.is_none());
    }

    #[tokio::test]
    async fn settlement_after_cancel_is_suppressed() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = Arc::new(Mutex::new(Some(rx)));
        let cancel_mid_flight = interceptor(move |ctx: InterceptionContext<i32>, next: Next<i32, i32>| {
            let rx = rx.lock().unwrap().take();
            async move {
                let downstream = tokio::spawn(next.run(ctx.data()));
                if let Some(rx) = rx {
                    rx.await.ok();
                }
                ctx.cancel();
                Ok(downstream.await.is_ok() as i32)
            }
        });
        let slow = action(|ctx: InterceptionContext<i32>| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(ctx.data())
        });
        let outer = ChainBuilder::new().build(slow, vec![cancel_mid_flight]);

        let call = tokio::spawn(outer(1));
        tx.send(()).unwrap();
        // The downstream task never completes, so neither does the interceptor.
        assert!(timeout(Duration::from_millis(100), call).await.is_err());
    }

    #[tokio::test]
    async fn next_may_run_repeatedly() {
        let calls = Arc::new(AtomicUsize::new(0));
        let twice = interceptor(|ctx: InterceptionContext<i32>, next: Next<i32, i32>| async move {
            let first = next.run(ctx.data()).await?;
            let second = next.run(first).await?;
            Ok(second)
        });
        let chain = ChainBuilder::new().build(counting(Arc::clone(&calls)), vec![twice]);
        assert_eq!(chain(3).await.unwrap(), 12);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_before_next_leaves_downstream_untouched() {
        let fired = Arc::new(AtomicUsize::new(0));
        let early_cancel = interceptor(|ctx: InterceptionContext<i32>, next: Next<i32, i32>| async move {
            ctx.cancel();
            next.run(ctx.data()).await
        });
        let counter = Arc::clone(&fired);
        let watched = action(move |ctx: InterceptionContext<i32>| {
            let counter = Arc::clone(&counter);
            ctx.on_cancel(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            async move { Ok(ctx.data()) }
        });
        let chain = ChainBuilder::new().build(watched, vec![early_cancel]);

        assert_eq!(chain(9).await.unwrap(), 9);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn each_invocation_gets_a_fresh_root() {
        let cancel_after = interceptor(|ctx: InterceptionContext<i32>, next: Next<i32, i32>| async move {
            let out = next.run(ctx.data()).await;
            ctx.cancel();
            out
        });
        let chain = ChainBuilder::new().build(doubling(), vec![cancel_after]);
        assert_eq!(chain(1).await.unwrap(), 2);
        assert_eq!(chain(2).await.unwrap(), 4);
    }
}
