use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    Sent,
    HoneypotAbsorbed,
    OriginRejected,
    RateLimited,
    MethodNotAllowed,
    Invalid,
    Misconfigured,
    DispatchFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub total_requests: u64,
    pub sent: u64,
    pub honeypot_absorbed: u64,
    pub origin_rejected: u64,
    pub rate_limited: u64,
    pub method_not_allowed: u64,
    pub invalid: u64,
    pub misconfigured: u64,
    pub dispatch_failed: u64,
}

impl GatewayStats {
    fn record(&mut self, event: StatEvent) {
        self.total_requests += 1;
        let counter = match event {
            StatEvent::Sent => &mut self.sent,
            StatEvent::HoneypotAbsorbed => &mut self.honeypot_absorbed,
            StatEvent::OriginRejected => &mut self.origin_rejected,
            StatEvent::RateLimited => &mut self.rate_limited,
            StatEvent::MethodNotAllowed => &mut self.method_not_allowed,
            StatEvent::Invalid => &mut self.invalid,
            StatEvent::Misconfigured => &mut self.misconfigured,
            StatEvent::DispatchFailed => &mut self.dispatch_failed,
        };
        *counter += 1;
    }

    fn log_summary(&self) {
        log::info!(
            "Gateway statistics: {} requests, {} sent, {} honeypot, {} origin rejected, \
             {} rate limited, {} bad method, {} invalid, {} misconfigured, {} dispatch failures",
            self.total_requests,
            self.sent,
            self.honeypot_absorbed,
            self.origin_rejected,
            self.rate_limited,
            self.method_not_allowed,
            self.invalid,
            self.misconfigured,
            self.dispatch_failed
        );
    }
}

/// Cheap handle the gateway uses to report outcomes.
#[derive(Debug, Clone)]
pub struct StatsRecorder {
    sender: mpsc::UnboundedSender<StatEvent>,
}

impl StatsRecorder {
    pub fn record_event(&self, event: StatEvent) {
        if let Err(e) = self.sender.send(event) {
            log::warn!("Failed to send statistics event: {e}");
        }
    }
}

/// Counts pipeline outcomes off the request path.
///
/// Counters live in memory only and reset with the process.
pub struct StatisticsCollector {
    sender: mpsc::UnboundedSender<StatEvent>,
    stats: Arc<Mutex<GatewayStats>>,
    stop: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl StatisticsCollector {
    /// Spawns the worker; must be called inside a tokio runtime.
    pub fn new(flush_interval: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (stop, stop_receiver) = oneshot::channel();
        let stats = Arc::new(Mutex::new(GatewayStats::default()));

        let handle = tokio::spawn(Self::stats_worker(
            receiver,
            stop_receiver,
            stats.clone(),
            flush_interval,
        ));

        Self {
            sender,
            stats,
            stop,
            handle,
        }
    }

    pub fn recorder(&self) -> StatsRecorder {
        StatsRecorder {
            sender: self.sender.clone(),
        }
    }

    /// Drains queued events, logs a final summary and stops the worker.
    pub async fn shutdown(self) -> GatewayStats {
        // Err only means the worker has already exited.
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            log::error!("Statistics worker ended abnormally: {e}");
        }
        current(&self.stats)
    }

    async fn stats_worker(
        mut receiver: mpsc::UnboundedReceiver<StatEvent>,
        mut stop: oneshot::Receiver<()>,
        stats: Arc<Mutex<GatewayStats>>,
        flush_interval: Duration,
    ) {
        let mut flush_timer = interval(flush_interval);
        // The first tick fires immediately.
        flush_timer.tick().await;
        let mut dirty = false;

        loop {
            tokio::select! {
                event = receiver.recv() => {
                    match event {
                        Some(event) => {
                            lock(&stats).record(event);
                            dirty = true;
                        }
                        None => break,
                    }
                }
                _ = &mut stop => {
                    while let Ok(event) = receiver.try_recv() {
                        lock(&stats).record(event);
                    }
                    break;
                }
                _ = flush_timer.tick() => {
                    if dirty {
                        current(&stats).log_summary();
                        dirty = false;
                    }
                }
            }
        }

        current(&stats).log_summary();
    }
}

fn lock(stats: &Mutex<GatewayStats>) -> MutexGuard<'_, GatewayStats> {
    stats
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn current(stats: &Mutex<GatewayStats>) -> GatewayStats {
    lock(stats).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_counted() {
        let collector = StatisticsCollector::new(Duration::from_secs(60));
        let recorder = collector.recorder();
        recorder.record_event(StatEvent::Sent);
        recorder.record_event(StatEvent::Sent);
        recorder.record_event(StatEvent::HoneypotAbsorbed);
        recorder.record_event(StatEvent::RateLimited);

        let stats = collector.shutdown().await;
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.honeypot_absorbed, 1);
        assert_eq!(stats.rate_limited, 1);
        assert_eq!(stats.dispatch_failed, 0);
    }

    #[test]
    fn test_record_maps_each_event() {
        let mut stats = GatewayStats::default();
        for event in [
            StatEvent::OriginRejected,
            StatEvent::MethodNotAllowed,
            StatEvent::Invalid,
            StatEvent::Misconfigured,
            StatEvent::DispatchFailed,
        ] {
            stats.record(event);
        }
        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.origin_rejected, 1);
        assert_eq!(stats.method_not_allowed, 1);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.misconfigured, 1);
        assert_eq!(stats.dispatch_failed, 1);
    }
}
