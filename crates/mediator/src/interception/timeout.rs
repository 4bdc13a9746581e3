use std::time::Duration;

use {
    missive_common::{Error, Request, Response, Result},
    tokio_util::sync::CancellationToken,
    tracing::warn,
};

use super::{InterceptionContext, Next};

/// Races the rest of the chain against a timer.
///
/// When the timer wins, everything downstream is canceled and the request
/// fails with a timeout error. When the downstream settles first its
/// outcome passes through untouched. The timer is released on both paths,
/// and also when an outer layer cancels this one.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    async fn intercept(
        &self,
        request: Request,
        next: Next,
        context: InterceptionContext,
    ) -> Result<Response> {
        let disarmed = CancellationToken::new();
        context.on_cancel({
            let disarmed = disarmed.clone();
            move || disarmed.cancel()
        });

        let request_id = request.id.clone();
        let mut downstream = next.run(request);
        let timer = async {
            tokio::select! {
                () = tokio::time::sleep(self.duration) => true,
                () = disarmed.cancelled() => false,
            }
        };

        tokio::select! {
            outcome = &mut downstream => outcome,
            expired = timer => {
                if !expired {
                    // Canceled from outside; this layer's outcome is already
                    // unobservable, so just let the downstream finish.
                    return downstream.await;
                }
                warn!(
                    request_id = %request_id,
                    timeout_ms = self.duration.as_millis() as u64,
                    "request timed out"
                );
                context.cancel();
                Err(Error::timeout(format!(
                    "No response within {} ms.",
                    self.duration.as_millis()
                )))
            },
        }
    }
}

both_sides!(Timeout);

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::interception::testing::{run_receiver, run_sender},
        missive_chain::action,
        serde_json::json,
        std::sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        tokio::time::Instant,
    };

    #[tokio::test(start_paused = true)]
    async fn never_settling_downstream_times_out() {
        let canceled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&canceled);
        let hanging = action(move |ctx: InterceptionContext| {
            let flag = Arc::clone(&flag);
            ctx.on_cancel(move || flag.store(true, Ordering::SeqCst));
            async move {
                futures::future::pending::<()>().await;
                Ok(Response::ok(ctx.data().id, json!("never")))
            }
        });

        let started = Instant::now();
        let err = run_sender(Timeout::from_millis(100), hanging)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.reason(), Some(missive_common::error::TIMEOUT));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(canceled.load(Ordering::SeqCst), "downstream was not canceled");
    }

    #[tokio::test(start_paused = true)]
    async fn fast_downstream_passes_through() {
        let quick = action(|ctx: InterceptionContext| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Response::ok(ctx.data().id, json!("quick")))
        });

        let response = run_receiver(Timeout::from_millis(100), quick)
            .await
            .unwrap();
        assert_eq!(response.data, Some(json!("quick")));

        // Nothing fires after the fact.
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn downstream_errors_pass_through() {
        let failing = action(|_ctx: InterceptionContext| async move {
            Err::<Response, _>(Error::application("boom"))
        });

        let err = run_sender(Timeout::from_millis(100), failing)
            .await
            .unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "boom");
    }
}
