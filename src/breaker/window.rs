//! Rolling error-rate window made of one-second buckets

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    /// Second (relative to the window origin) this bucket currently counts
    second: u64,
    successes: u32,
    failures: u32,
}

#[derive(Debug)]
pub struct RollingWindow {
    origin: Instant,
    buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounts {
    pub requests: u32,
    pub failures: u32,
}

impl WindowCounts {
    pub fn error_percent(&self) -> u32 {
        if self.requests == 0 {
            0
        } else {
            ((self.failures as u64 * 100) / self.requests as u64) as u32
        }
    }
}

impl RollingWindow {
    pub fn new(seconds: u64) -> Self {
        Self {
            origin: Instant::now(),
            buckets: vec![Bucket::default(); seconds.max(1) as usize],
        }
    }

    pub fn record(&mut self, success: bool) {
        let second = self.origin.elapsed().as_secs();
        let len = self.buckets.len() as u64;
        let bucket = &mut self.buckets[(second % len) as usize];
        if bucket.second != second {
            *bucket = Bucket {
                second,
                ..Bucket::default()
            };
        }
        if success {
            bucket.successes += 1;
        } else {
            bucket.failures += 1;
        }
    }

    pub fn counts(&self) -> WindowCounts {
        let now = self.origin.elapsed().as_secs();
        let len = self.buckets.len() as u64;
        let mut counts = WindowCounts {
            requests: 0,
            failures: 0,
        };
        for bucket in &self.buckets {
            if now.saturating_sub(bucket.second) < len {
                counts.requests += bucket.successes + bucket.failures;
                counts.failures += bucket.failures;
            }
        }
        counts
    }

    pub fn reset(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = Bucket::default();
        }
        self.origin = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn old_buckets_age_out() {
        let mut window = RollingWindow::new(10);
        window.record(false);
        window.record(true);
        assert_eq!(
            window.counts(),
            WindowCounts {
                requests: 2,
                failures: 1
            }
        );
        assert_eq!(window.counts().error_percent(), 50);

        tokio::time::advance(Duration::from_secs(5)).await;
        window.record(false);
        assert_eq!(window.counts().requests, 3);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(
            window.counts(),
            WindowCounts {
                requests: 1,
                failures: 1
            }
        );
    }
}
