use std::time::Duration;

use missive_common::{Request, Response, Result};

use super::{InterceptionContext, Next};

/// Waits before passing the request on unchanged.
#[derive(Debug, Clone, Copy)]
pub struct Delay {
    duration: Duration,
}

impl Delay {
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
        _context: InterceptionContext,
    ) -> Result<Response> {
        tokio::time::sleep(self.duration).await;
        next.run(request).await
    }
}

both_sides!(Delay);
