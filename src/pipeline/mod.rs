//! Runs the stages in order:
//! collect, dedupe, parse, filter, probe, classify, emit.
//!
//! Every stage consumes the complete output of the previous one. Individual
//! records and sources may drop out along the way; the only run-level
//! failure is ending the filter stage with nothing left to probe.

mod config;
mod summary;

use std::{fmt::Display, sync::Arc};

pub use config::Config;
pub use summary::{LatencyGrade, ProtocolStats, StageCounts, Summary};

use crate::{
    classifier::{Classification, Classifier},
    decoder, dedup,
    emitter::Sink,
    fetcher::{self, Source},
    filter::SmartFilter,
    geolookup::GeoLookup,
    prober::{ProbeEngine, ProbeProgress, Prober, TcpProber},
};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Collected,
    Deduplicated,
    Parsed,
    Filtered,
    Probed,
    Classified,
    Emitted,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Collected => "collected",
            Self::Deduplicated => "deduplicated",
            Self::Parsed => "parsed",
            Self::Filtered => "filtered",
            Self::Probed => "probed",
            Self::Classified => "classified",
            Self::Emitted => "emitted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Nothing survived parsing and filtering; the summary shows where records were lost.
    #[error("no valid configs survived filtering ({} candidates collected)", .0.stages.collected)]
    NoValidConfigs(Box<Summary>),
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: Summary,
    pub classification: Classification,
}

pub struct Pipeline {
    config: Config,
    filter: SmartFilter,
    engine: ProbeEngine,
    classifier: Classifier,
}

fn enter(_stage: Stage, _count: usize) {
    #[cfg(feature = "log")]
    log::info!("Stage {}: {} records", _stage, _count);
}

impl Pipeline {
    /// Creates a pipeline that probes with `prober`.
    pub fn new(config: Config, prober: Arc<dyn Prober>) -> Self {
        Self {
            filter: SmartFilter::new(config.filter.clone()),
            engine: ProbeEngine::new(prober, config.prober.clone()),
            classifier: Classifier::new(config.classifier.clone()),
            config,
        }
    }

    /// Creates a pipeline that probes with a [`TcpProber`] built from `config.prober`.
    pub fn with_tcp_prober(config: Config) -> anyhow::Result<Self> {
        let prober = TcpProber::new(&config.prober)?;
        Ok(Self::new(config, Arc::new(prober)))
    }

    /// Enables GeoIP as the last country inference step.
    pub fn with_geolookup(mut self, geolookup: Arc<GeoLookup>) -> Self {
        self.classifier = self.classifier.with_geolookup(geolookup);
        self
    }

    /// Live probe counters, for progress display.
    pub fn progress(&self) -> Arc<ProbeProgress> {
        self.engine.progress()
    }

    /// Runs every stage from deduplication through classification.
    ///
    /// # Arguments
    ///
    /// * `raws`: Link candidates, typically the output of [`fetcher::collect_all`].
    ///
    /// # Returns
    ///
    /// The summary and the classified records, or
    /// [`PipelineError::NoValidConfigs`] if no record survived filtering.
    pub async fn process(&self, raws: Vec<String>) -> Result<RunReport, PipelineError> {
        let mut summary = Summary::default();
        summary.stages.collected = raws.len();
        enter(Stage::Collected, raws.len());

        let unique = dedup::dedupe(raws);
        summary.stages.deduplicated = unique.len();
        enter(Stage::Deduplicated, unique.len());

        let (parsed, parse_failed) = decoder::decode_all(&unique);
        summary.stages.parsed = parsed.len();
        summary.parse_failed = parse_failed;
        enter(Stage::Parsed, parsed.len());

        let mut filtered = self.filter.filter(parsed);
        summary.stages.filtered = filtered.len();
        enter(Stage::Filtered, filtered.len());
        if filtered.is_empty() {
            return Err(PipelineError::NoValidConfigs(Box::new(summary)));
        }

        let stats = self.engine.probe_all(&mut filtered).await;
        summary.record_probe(&filtered, &stats);
        enter(Stage::Probed, stats.reachable);

        let classification = self.classifier.classify(filtered);
        summary.stages.classified = classification.len();
        summary.dropped_by_capacity = classification.dropped;
        summary.countries = classification
            .by_country
            .iter()
            .map(|(country, proxies)| (country.clone(), proxies.len()))
            .collect();
        enter(Stage::Classified, classification.len());

        Ok(RunReport {
            summary,
            classification,
        })
    }

    /// Collects from `sources`, processes the links and hands the buckets to `sink`.
    ///
    /// A failing sink is logged and leaves `stages.emitted` at zero; it does
    /// not fail the run.
    pub async fn run(
        &self,
        sources: Vec<Arc<dyn Source>>,
        sink: &dyn Sink,
    ) -> Result<RunReport, PipelineError> {
        let raws = fetcher::collect_all(sources, &self.config.fetcher).await;
        let mut report = self.process(raws).await?;

        match sink.emit(&report.classification.buckets()).await {
            Ok(written) => {
                report.summary.stages.emitted = written;
                enter(Stage::Emitted, written);
            }
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("Failed to emit buckets: {}", _e);
            }
        }
        Ok(report)
    }
}
