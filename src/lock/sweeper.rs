//! Background lock sweeping.
//!
//! Sweeps normally run when a part list is opened. A long-lived client can
//! also run one on a timer in a `may` coroutine. Stopping is signalled over
//! a channel; the coroutine checks it between short sleeps so it never
//! blocks a scheduler thread for a whole interval.

use crate::gateway::LockGateway;
use crossbeam_channel::{bounded, Sender, TryRecvError};
use may::coroutine::JoinHandle;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

const MAX_TICK: Duration = Duration::from_millis(50);

/// Handle to a running sweep coroutine. Dropping it stops the coroutine.
pub struct LockSweeper {
    stop: Sender<()>,
    handle: Option<JoinHandle<u64>>,
}

impl LockSweeper {
    /// Sweep locks older than `older_than` every `interval`
    pub fn spawn<G>(gateway: G, older_than: Duration, interval: Duration) -> Self
    where
        G: LockGateway + Send + 'static,
    {
        let (stop, stop_rx) = bounded::<()>(1);
        let tick = interval.min(MAX_TICK);

        let handle = may::go!(move || {
            let mut passes = 0u64;
            let mut last = Instant::now();
            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }
                if last.elapsed() >= interval {
                    last = Instant::now();
                    passes += 1;
                    match gateway.sweep_locks(older_than) {
                        Ok(0) => {}
                        Ok(cleared) => {
                            log::info!("Background sweep cleared {cleared} stale edit lock(s)");
                            #[cfg(feature = "metrics")]
                            METRICS.record_locks_swept(cleared);
                        }
                        Err(e) => {
                            log::warn!("Background lock sweep failed: {e}");
                            #[cfg(feature = "metrics")]
                            METRICS.record_gateway_failure("sweep_locks");
                        }
                    }
                }
                may::coroutine::sleep(tick);
            }
            passes
        });

        log::debug!("Started background lock sweeper every {interval:?}");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the coroutine and wait for it; returns how many sweeps ran
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        let _ = self.stop.try_send(());
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(passes)) => passes,
            Some(Err(_)) => {
                log::warn!("Background lock sweeper panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for LockSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entity::{Part, UnitOfQuantity};
    use crate::session::SessionId;
    use crate::store::memory::{MemoryTable, Operation};
    use std::sync::Arc;

    #[test]
    fn test_background_sweep_clears_stale_locks() {
        let clock = ManualClock::default();
        let table = MemoryTable::<Part>::with_clock(Arc::new(clock.clone()));
        let id = table.seed(vec![
            Part::new("P-1", "Bolt", "", UnitOfQuantity::Pieces, "").unwrap(),
        ])[0];
        table.acquire_lock(id, Some(&SessionId::from("idle"))).unwrap();
        clock.advance(chrono::Duration::hours(1));

        let sweeper = LockSweeper::spawn(
            table.clone(),
            Duration::from_secs(60),
            Duration::from_millis(5),
        );
        let deadline = Instant::now() + Duration::from_secs(5);
        while table.query_lock(id).unwrap().is_some() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let passes = sweeper.stop();

        assert!(table.query_lock(id).unwrap().is_none());
        assert!(passes >= 1);
        assert!(table.calls(Operation::SweepLocks) >= 1);
    }

    #[test]
    fn test_drop_stops_the_coroutine() {
        let table = MemoryTable::<Part>::new();
        let sweeper = LockSweeper::spawn(
            table.clone(),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        );
        drop(sweeper);
        assert_eq!(table.calls(Operation::SweepLocks), 0);
    }
}
