use std::time::Duration;
use tokio::time::Instant;

/// Idle timer for the connection. The transport calls [Keepalive::update]
/// once per pump step and sends a keepalive packet whenever it returns
/// `true`. Any real traffic should call [Keepalive::reset].
#[derive(Debug)]
pub struct Keepalive {
    interval: Duration,
    started: Instant,
}

impl Keepalive {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2000);

    pub fn new(interval: Duration) -> Self {
        Keepalive {
            interval,
            started: Instant::now(),
        }
    }

    /// Returns `true` (and restarts the clock) once the interval has been
    /// exceeded.
    pub fn update(&mut self) -> bool {
        if self.started.elapsed() <= self.interval {
            return false;
        }
        self.reset();
        true
    }

    pub fn reset(&mut self) {
        self.started = Instant::now();
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for Keepalive {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_interval() {
        let mut keepalive = Keepalive::default();

        advance(Duration::from_millis(2000)).await;
        assert!(!keepalive.update(), "must exceed, not just reach, the interval");

        advance(Duration::from_millis(1)).await;
        assert!(keepalive.update());
        // clock restarted
        assert!(!keepalive.update());

        advance(Duration::from_millis(1999)).await;
        assert!(!keepalive.update());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_postpones() {
        let mut keepalive = Keepalive::default();

        advance(Duration::from_millis(1500)).await;
        keepalive.reset();
        advance(Duration::from_millis(1500)).await;
        assert!(!keepalive.update());

        advance(Duration::from_millis(501)).await;
        assert!(keepalive.update());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_interval() {
        let mut keepalive = Keepalive::new(Duration::from_millis(50));
        assert_eq!(keepalive.interval(), Duration::from_millis(50));

        advance(Duration::from_millis(51)).await;
        assert!(keepalive.update());
    }
}
