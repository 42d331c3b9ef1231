use std::sync::Arc;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::{Lsn, Result, INVALID_LSN, MAX_LSN};

/// The buffer pool's view of the write-ahead log.
///
/// A dirty page may only be written to the database file once every log record
/// up to the page's LSN is durable. The buffer pool calls [`wait_for`] with the
/// page LSN before each such write and never holds its own latch while waiting.
///
/// [`wait_for`]: LogDurability::wait_for
pub trait LogDurability: Send + Sync {
    /// Highest LSN guaranteed to be on stable storage.
    fn durable_lsn(&self) -> Lsn;

    /// Blocks until `durable_lsn() >= lsn`. May ask the log to flush.
    fn wait_for(&self, lsn: Lsn) -> Result<()>;
}

/// A log that is always durable. Used when no log manager is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogDurability;

impl LogDurability for NoopLogDurability {
    fn durable_lsn(&self) -> Lsn {
        MAX_LSN
    }

    fn wait_for(&self, _lsn: Lsn) -> Result<()> {
        Ok(())
    }
}

/// A durable watermark advanced by whoever flushes the log.
///
/// `wait_for` parks the caller until [`advance`](LogWatermark::advance) moves
/// the watermark far enough.
#[derive(Debug, Default)]
pub struct LogWatermark {
    durable: Mutex<Lsn>,
    advanced: Condvar,
}

impl LogWatermark {
    pub fn new(initial: Lsn) -> Arc<Self> {
        Arc::new(Self {
            durable: Mutex::new(initial),
            advanced: Condvar::new(),
        })
    }

    /// Moves the watermark forward. Never moves it back.
    pub fn advance(&self, lsn: Lsn) {
        let mut durable = self.durable.lock();
        if lsn > *durable {
            *durable = lsn;
            self.advanced.notify_all();
        }
    }
}

impl LogDurability for LogWatermark {
    fn durable_lsn(&self) -> Lsn {
        *self.durable.lock()
    }

    fn wait_for(&self, lsn: Lsn) -> Result<()> {
        if lsn == INVALID_LSN {
            return Ok(());
        }
        let mut durable = self.durable.lock();
        if *durable < lsn {
            debug!("waiting for log to become durable up to {} (now {})", lsn, *durable);
        }
        while *durable < lsn {
            self.advanced.wait(&mut durable);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_noop_is_always_durable() {
        let log = NoopLogDurability;
        assert_eq!(log.durable_lsn(), MAX_LSN);
        log.wait_for(12345).unwrap();
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let log = LogWatermark::new(10);
        log.advance(5);
        assert_eq!(log.durable_lsn(), 10);
        log.advance(20);
        assert_eq!(log.durable_lsn(), 20);
        log.wait_for(20).unwrap();
        log.wait_for(INVALID_LSN).unwrap();
    }

    #[test]
    fn test_watermark_blocks_until_advanced() {
        let log = LogWatermark::new(0);
        let done = Arc::new(AtomicBool::new(false));

        let waiter = {
            let log = Arc::clone(&log);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                log.wait_for(7).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));

        log.advance(7);
        waiter.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }
}
