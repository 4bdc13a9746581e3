use {
    missive_common::{Request, Response, Result},
    serde_json::Value,
};

use super::{InterceptionContext, Next};

/// Resolves every request with a fixed value without running the rest of
/// the chain. Useful for mocking results.
#[derive(Debug, Clone)]
pub struct Return {
    value: Value,
}

impl Return {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    async fn intercept(
        &self,
        request: Request,
        _next: Next,
        _context: InterceptionContext,
    ) -> Result<Response> {
        Ok(Response::ok(request.id, self.value.clone()))
    }
}

both_sides!(Return);

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
            atomic::{AtomicUsize, Ordering},
        },
    };

    #[tokio::test]
    async fn returns_value_without_calling_next() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let terminal = action(move |ctx: InterceptionContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Response::ok(ctx.data().id, json!("terminal"))) }
        });

        let response = run_sender(Return::new(42), terminal.clone()).await.unwrap();
        assert_eq!(response.data, Some(json!(42)));
        assert!(response.error.is_none());

        let response = run_receiver(Return::new(json!({"ok": true})), terminal)
            .await
            .unwrap();
        assert_eq!(response.data, Some(json!({"ok": true})));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
