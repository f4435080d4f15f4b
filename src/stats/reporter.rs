// src/stats/reporter.rs
use crate::stats::hashrate::HashrateSnapshot;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Consumer of periodic hashrate snapshots
///
/// Called on the scheduler's controller thread: `on_tick` after every
/// sample, `on_report` on the slower report period. Implementations must
/// return quickly.
pub trait ReportSink: Send {
    /// A fresh snapshot after a tick
    fn on_tick(&mut self, _snapshot: &Arc<HashrateSnapshot>) {}

    /// The report period elapsed
    fn on_report(&mut self, snapshot: &Arc<HashrateSnapshot>);
}

/// Writes reports to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter {
    /// Also print one line per worker
    pub detail: bool,
}

impl LogReporter {
    /// Creates a log reporter
    pub fn new(detail: bool) -> Self {
        LogReporter { detail }
    }
}

impl ReportSink for LogReporter {
    fn on_report(&mut self, snapshot: &Arc<HashrateSnapshot>) {
        if self.detail {
            for worker in 0..snapshot.workers.len() {
                snapshot.print_worker(worker);
            }
        }
        snapshot.print();
    }
}

/// Forwards every tick snapshot over a channel, dropping when the reader lags
///
/// Useful for a display or API layer running on its own thread.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: Sender<Arc<HashrateSnapshot>>,
    log: LogReporter,
}

impl ChannelReporter {
    /// Creates the reporter and the receiving end, holding up to `capacity` snapshots
    pub fn new(capacity: usize, detail: bool) -> (Self, Receiver<Arc<HashrateSnapshot>>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        (
            ChannelReporter {
                sender,
                log: LogReporter::new(detail),
            },
            receiver,
        )
    }
}

impl ReportSink for ChannelReporter {
    fn on_tick(&mut self, snapshot: &Arc<HashrateSnapshot>) {
        match self.sender.try_send(Arc::clone(snapshot)) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Hashrate receiver dropped");
            }
        }
    }

    fn on_report(&mut self, snapshot: &Arc<HashrateSnapshot>) {
        self.log.on_report(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::hashrate::RateSet;

    #[test]
    fn channel_reporter_drops_when_full() {
        let (mut reporter, receiver) = ChannelReporter::new(1, false);
        let first = Arc::new(HashrateSnapshot {
            highest: Some(1.0),
            ..HashrateSnapshot::default()
        });

        reporter.on_tick(&first);
        reporter.on_tick(&Arc::new(HashrateSnapshot::default()));

        assert_eq!(receiver.try_recv().unwrap().highest, Some(1.0));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn log_reporter_reads_every_worker() {
        let snapshot = Arc::new(HashrateSnapshot {
            workers: vec![RateSet::default(); 2],
            highest: Some(10.0),
            ..HashrateSnapshot::default()
        });
        let before = (*snapshot).clone();

        LogReporter::new(true).on_report(&snapshot);
        LogReporter::default().on_report(&snapshot);
        assert_eq!(*snapshot, before);
    }

    #[test]
    fn disconnected_receiver_is_harmless() {
        let (mut reporter, receiver) = ChannelReporter::new(1, true);
        drop(receiver);

        let snapshot = Arc::new(HashrateSnapshot::default());
        reporter.on_tick(&snapshot);
        reporter.on_report(&snapshot);
    }
}
