use std::sync::atomic::{AtomicBool, Ordering};

/// Token bucket backed by a tokio semaphore. Disabled until `setup` is called with a non-zero
/// token count; a disabled bucket never blocks.
pub struct TokenBucket {
    enabled: AtomicBool,
    sem: tokio::sync::Semaphore,
}

impl TokenBucket {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            sem: tokio::sync::Semaphore::const_new(0),
        }
    }

    pub fn setup(&self, tokens: usize) {
        self.enabled.store(tokens > 0, Ordering::Release);
        self.sem.forget_permits(self.sem.available_permits());
        if tokens > 0 {
            self.sem.add_permits(tokens);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub async fn consume(&self, tokens: u32) {
        if !self.is_enabled() {
            return;
        }
        // the semaphore is never closed, acquiring can only fail after close()
        if let Ok(permit) = self.sem.acquire_many(tokens).await {
            permit.forget();
        }
    }

    /// Tops the bucket back up to `replenish` tokens every `interval`. Returns immediately when
    /// the bucket is disabled.
    pub async fn run_replenish(&self, replenish: usize, interval: std::time::Duration) {
        if !self.is_enabled() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let curr = self.sem.available_permits();
            if curr < replenish {
                self.sem.add_permits(replenish - curr);
            }
        }
    }
}
