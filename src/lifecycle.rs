use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter used to abandon in-flight work. Results obtained under
/// a [`Token`] are applied only while no newer generation was started.
#[derive(Clone, Debug, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Token {
        Token {
            current: Arc::clone(&self.0),
            issued: self.0.load(Ordering::SeqCst),
        }
    }

    /// Invalidates every outstanding token and returns a fresh one.
    pub fn advance(&self) -> Token {
        let issued = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        Token {
            current: Arc::clone(&self.0),
            issued,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Token {
    current: Arc<AtomicU64>,
    issued: u64,
}

impl Token {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.issued
    }
}
