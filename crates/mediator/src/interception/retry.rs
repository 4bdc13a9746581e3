use std::{fmt, sync::Arc};

use {
    missive_common::{Error, Request, Response, Result},
    tracing::debug,
};

use super::{InterceptionContext, Next};

/// Decides whether a failed attempt is worth retrying. Receives the
/// attempt's error, or `None` when the attempt produced no result at all.
pub type RetryFilter = Arc<dyn Fn(Option<&Error>) -> bool + Send + Sync>;

/// Re-runs the rest of the chain while attempts fail.
///
/// An attempt fails when it errors, when its response carries an error, or
/// when its response carries neither data nor error. Before each retry the
/// current context is canceled, which reaches into the subtree of the
/// attempt that just finished so anything it left pending (a timeout's
/// timer, for instance) is released. The last attempt's outcome is returned
/// as is.
#[derive(Clone)]
pub struct Retry {
    attempts: u32,
    filter: Option<RetryFilter>,
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("attempts", &self.attempts)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl Retry {
    /// Allow up to `attempts` retries, `attempts + 1` runs in total.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_filter(
        mut self,
        filter: impl Fn(Option<&Error>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn should_retry(&self, outcome: &Result<Response>) -> bool {
        let error = match outcome {
            Err(error) => Some(error),
            Ok(response) if response.error.is_some() => response.error.as_ref(),
            Ok(response) if response.is_empty() => None,
            Ok(_) => return false,
        };
        self.filter.as_ref().is_none_or(|filter| filter(error))
    }

    async fn intercept(
        &self,
        request: Request,
        next: Next,
        context: InterceptionContext,
    ) -> Result<Response> {
        let mut outcome = next.run(request.clone()).await;
        let mut attempt = 0;
        while attempt < self.attempts && self.should_retry(&outcome) {
            attempt += 1;
            debug!(
                request_id = %request.id,
                attempt,
                max_attempts = self.attempts,
                "retrying request"
            );
            context.cancel();
            outcome = next.run(request.clone()).await;
        }
        outcome
    }
}

both_sides!(Retry);
