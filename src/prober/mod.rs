//! Reachability probing.
//!
//! The engine splits the record set into batches. Each batch is pushed onto a
//! job queue that a fixed number of workers drain; results travel back to the
//! engine, which writes them onto the records once the whole batch is done.

mod client;
mod config;

use std::{
    fmt::{Display, Formatter},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

pub use client::{Prober, TcpProber};
#[cfg(feature = "progress_bar")]
use colored::Colorize;
pub use config::{Config, ProbeMode};
use tokio::{task::JoinHandle, time};

use crate::proxy::models::{ProbeFailure, ProbeStatus, ProxyConfig};

/// Live counters for a probe run, safe to read from another task.
#[derive(Debug, Default)]
pub struct ProbeProgress {
    total: AtomicUsize,
    done: AtomicUsize,
    reachable: AtomicUsize,
    batch: AtomicUsize,
    batches: AtomicUsize,
}

impl ProbeProgress {
    fn reset(&self, total: usize, batches: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.batches.store(batches, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        self.reachable.store(0, Ordering::Relaxed);
        self.batch.store(0, Ordering::Relaxed);
    }

    /// Records probed so far.
    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn reachable(&self) -> usize {
        self.reachable.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}

impl Display for ProbeProgress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let total = self.total().max(1);
        let percent = self.done() as f64 / total as f64 * 100.0;

        #[cfg(feature = "progress_bar")]
        return write!(
            f,
            "{} {} Probing batch {}/{}: {}/{} ({:.1}%), {} reachable",
            format!("{}:", module_path!()).bright_blue(),
            "INFO".bright_blue(),
            self.batch.load(Ordering::Relaxed),
            self.batches.load(Ordering::Relaxed),
            self.done(),
            self.total(),
            percent,
            self.reachable().to_string().bright_green()
        );

        #[cfg(not(feature = "progress_bar"))]
        write!(
            f,
            "batch {}/{}: {}/{} ({:.1}%), {} reachable",
            self.batch.load(Ordering::Relaxed),
            self.batches.load(Ordering::Relaxed),
            self.done(),
            self.total(),
            percent,
            self.reachable()
        )
    }
}

/// Totals for one call to [`ProbeEngine::probe_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProbeStats {
    pub probed: usize,
    pub reachable: usize,
    pub elapsed: Duration,
}

impl ProbeStats {
    /// Records probed per second, `0.0` for an empty run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.probed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Bounded-concurrency, batched driver around a [`Prober`].
pub struct ProbeEngine {
    prober: Arc<dyn Prober>,
    config: Config,
    progress: Arc<ProbeProgress>,
}

type Job = (usize, ProxyConfig);

/// Drains the job queue until it is empty.
async fn do_work(
    prober: Arc<dyn Prober>,
    queue: kanal::AsyncReceiver<Job>,
    progress: Arc<ProbeProgress>,
) -> Vec<(usize, ProbeStatus)> {
    let mut results = vec![];
    while let Ok(Some((index, proxy))) = queue.try_recv() {
        let status = ProbeStatus::from(prober.probe(&proxy).await);

        #[cfg(feature = "log")]
        match &status {
            ProbeStatus::Reachable { latency_ms } => {
                log::trace!("{}: reachable in {:.0}ms", proxy.endpoint(), latency_ms)
            }
            ProbeStatus::Unreachable { reason } => {
                log::trace!("{}: unreachable, {}", proxy.endpoint(), reason)
            }
            ProbeStatus::Untested => {}
        }

        if let ProbeStatus::Reachable { .. } = status {
            progress.reachable.fetch_add(1, Ordering::Relaxed);
        }
        progress.done.fetch_add(1, Ordering::Relaxed);
        results.push((index, status));
    }
    results
}

impl ProbeEngine {
    pub fn new(prober: Arc<dyn Prober>, config: Config) -> Self {
        Self {
            prober,
            config,
            progress: Arc::new(ProbeProgress::default()),
        }
    }

    /// Counters updated while [`ProbeEngine::probe_all`] runs.
    pub fn progress(&self) -> Arc<ProbeProgress> {
        Arc::clone(&self.progress)
    }

    /// Probes every record and stores the outcome in its `status`.
    ///
    /// Records are handled `batch_size` at a time with at most
    /// `concurrency_limit` probes in flight, pausing `batch_pause` between
    /// batches. Each record is probed exactly once.
    pub async fn probe_all(&self, proxies: &mut [ProxyConfig]) -> ProbeStats {
        let timer = time::Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let batches = proxies.len().div_ceil(batch_size);
        self.progress.reset(proxies.len(), batches);

        #[cfg(feature = "log")]
        log::debug!(
            "Probing {} records in {} batches, {} workers, {:?} timeout",
            proxies.len(),
            batches,
            self.config.concurrency_limit,
            self.config.timeout()
        );

        for (number, batch) in proxies.chunks_mut(batch_size).enumerate() {
            if number > 0 && !self.config.batch_pause.is_zero() {
                time::sleep(self.config.batch_pause).await;
            }
            self.progress.batch.store(number + 1, Ordering::Relaxed);
            self.probe_batch(batch).await;

            #[cfg(feature = "log")]
            log::debug!(
                "Batch {}/{} done, {} of {} reachable so far",
                number + 1,
                batches,
                self.progress.reachable(),
                self.progress.done()
            );
        }

        ProbeStats {
            probed: proxies.len(),
            reachable: proxies.iter().filter(|proxy| proxy.is_reachable()).count(),
            elapsed: timer.elapsed(),
        }
    }

    async fn probe_batch(&self, batch: &mut [ProxyConfig]) {
        let (sender, receiver) = kanal::unbounded_async::<Job>();
        for (index, proxy) in batch.iter().enumerate() {
            if sender.send((index, proxy.clone())).await.is_err() {
                break;
            }
        }

        let workers = self.config.concurrency_limit.max(1).min(batch.len());
        let handlers: Vec<JoinHandle<Vec<(usize, ProbeStatus)>>> = (0..workers)
            .map(|_| {
                tokio::spawn(do_work(
                    Arc::clone(&self.prober),
                    receiver.clone(),
                    Arc::clone(&self.progress),
                ))
            })
            .collect();

        for handler in handlers {
            match handler.await {
                Ok(results) => {
                    for (index, status) in results {
                        batch[index].status = status;
                    }
                }
                Err(_e) => {
                    #[cfg(feature = "log")]
                    log::warn!("Probe worker stopped unexpectedly: {}", _e);
                }
            }
        }
        drop(sender);

        for proxy in batch.iter_mut() {
            if proxy.status == ProbeStatus::Untested {
                proxy.status = ProbeStatus::Unreachable {
                    reason: ProbeFailure::Connect("probe task aborted".into()),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::decoder::decode;

    /// Reachable for even ports, tracking the peak number of concurrent probes.
    #[derive(Default)]
    struct EvenPorts {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for EvenPorts {
        async fn probe(&self, proxy: &ProxyConfig) -> Result<Duration, ProbeFailure> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if proxy.port % 2 == 0 {
                Ok(Duration::from_millis(proxy.port as u64 % 1000))
            } else {
                Err(ProbeFailure::Connect("refused".into()))
            }
        }
    }

    fn records(count: u16) -> Vec<ProxyConfig> {
        (0..count)
            .map(|i| decode(&format!("trojan://password-{}@203.0.113.1:{}", i, 2000 + i)).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn every_record_is_probed_once_and_annotated() {
        let prober = Arc::new(EvenPorts::default());
        let engine = ProbeEngine::new(
            prober.clone(),
            Config {
                concurrency_limit: 4,
                batch_size: 7,
                batch_pause: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let mut proxies = records(30);

        let stats = engine.probe_all(&mut proxies).await;

        assert_eq!(prober.calls.load(Ordering::SeqCst), 30);
        assert!(prober.peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(stats.probed, 30);
        assert_eq!(stats.reachable, 15);
        for proxy in &proxies {
            assert_eq!(proxy.is_reachable(), proxy.port % 2 == 0);
            assert_ne!(proxy.status, ProbeStatus::Untested);
        }
        assert_eq!(engine.progress().done(), 30);
        assert_eq!(engine.progress().reachable(), 15);
    }

    #[tokio::test]
    async fn zero_latency_does_not_mean_unreachable() {
        let engine = ProbeEngine::new(Arc::new(EvenPorts::default()), Config::default());
        let mut proxies = records(2);
        engine.probe_all(&mut proxies).await;

        assert_eq!(proxies[0].latency_ms(), 0.0);
        assert!(proxies[0].is_reachable());
        assert!(!proxies[1].is_reachable());
        assert_eq!(proxies[1].latency_ms(), 0.0);
        assert!(matches!(proxies[1].status, ProbeStatus::Unreachable { .. }));
    }

    #[tokio::test]
    async fn batches_are_separated_by_the_pause() {
        let engine = ProbeEngine::new(
            Arc::new(EvenPorts::default()),
            Config {
                concurrency_limit: 10,
                batch_size: 2,
                batch_pause: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let mut proxies = records(6);

        let stats = engine.probe_all(&mut proxies).await;

        assert_eq!(stats.probed, 6);
        assert!(stats.elapsed >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let engine = ProbeEngine::new(Arc::new(EvenPorts::default()), Config::default());
        let stats = engine.probe_all(&mut []).await;
        assert_eq!(stats.probed, 0);
        assert_eq!(stats.throughput(), 0.0);
    }
}
