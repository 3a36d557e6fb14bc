use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Receives byte counts from concurrent part uploads.
pub trait ProgressObserver: Send + Sync {
    fn on_bytes(&self, n: u64);
}

/// Discards progress reports.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_bytes(&self, _n: u64) {}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_uploaded as f32 / self.total_bytes as f32) * 100.0
    }
}

/// Atomic byte counter that optionally publishes a completion percentage.
pub struct ByteCounter {
    transferred: AtomicU64,
    total: u64,
    percent_tx: Option<watch::Sender<f32>>,
}

impl ByteCounter {
    pub fn new(total: u64) -> Self {
        Self {
            transferred: AtomicU64::new(0),
            total,
            percent_tx: None,
        }
    }

    pub fn with_percent_channel(total: u64, percent_tx: watch::Sender<f32>) -> Self {
        Self {
            percent_tx: Some(percent_tx),
            ..Self::new(total)
        }
    }

    pub fn snapshot(&self) -> UploadProgress {
        UploadProgress {
            bytes_uploaded: self.transferred.load(Ordering::Acquire),
            total_bytes: self.total,
        }
    }
}

impl ProgressObserver for ByteCounter {
    fn on_bytes(&self, n: u64) {
        let bytes_uploaded = self.transferred.fetch_add(n, Ordering::AcqRel) + n;
        if let Some(tx) = &self.percent_tx {
            let progress = UploadProgress {
                bytes_uploaded,
                total_bytes: self.total,
            };
            let _ = tx.send(progress.percent());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_concurrent_increments() {
        let counter = Arc::new(ByteCounter::new(8 * 1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.on_bytes(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = counter.snapshot();
        assert_eq!(snapshot.bytes_uploaded, 8000);
        assert_eq!(snapshot.percent(), 100.0);
    }

    #[test]
    fn publishes_percent_to_watchers() {
        let (tx, rx) = watch::channel(0.0);
        let counter = ByteCounter::with_percent_channel(400, tx);
        counter.on_bytes(100);
        assert_eq!(*rx.borrow(), 25.0);
        counter.on_bytes(300);
        assert_eq!(*rx.borrow(), 100.0);
    }

    #[test]
    fn empty_total_reports_zero_percent() {
        assert_eq!(UploadProgress::default().percent(), 0.0);
    }
}
