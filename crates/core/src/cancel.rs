use tokio_util::sync::CancellationToken as Token;

/// Asks running steps to stop.
///
/// Clones observe the same token. Once cancelled, a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Token,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.is_cancelled() {
            tracing::info!("cancellation requested");
        }
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

impl From<Token> for CancellationToken {
    fn from(inner: Token) -> Self {
        Self { inner }
    }
}
