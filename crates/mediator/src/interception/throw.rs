use missive_common::{Error, Request, Response, Result};

use super::{InterceptionContext, Next};

/// Fails every request with a fixed error without running the rest of the
/// chain.
#[derive(Debug, Clone)]
pub struct Throw {
    error: Error,
}

impl Throw {
    pub fn new(error: Error) -> Self {
        Self { error }
    }

    /// Fail with an application error carrying `message`.
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::new(Error::application(message))
    }

    async fn intercept(
        &self,
        _request: Request,
        _next: Next,
        _context: InterceptionContext,
    ) -> Result<Response> {
        Err(self.error.clone())
    }
}

both_sides!(Throw);

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::interception::testing::{run_receiver, run_sender},
        missive_chain::action,
        std::sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    #[tokio::test]
    async fn fails_with_configured_error() {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let terminal = action(move |ctx: InterceptionContext| {
            flag.store(true, Ordering::SeqCst);
            async move { Ok(Response::ok(ctx.data().id, serde_json::Value::Null)) }
        });

        let err = run_sender(Throw::message("x"), terminal.clone())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "x");

        let err = run_receiver(Throw::new(Error::timeout("mocked")), terminal)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(!reached.load(Ordering::SeqCst));
    }
}
