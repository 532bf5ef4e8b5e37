use std::{collections::BTreeMap, fmt::Display};

use serde::Serialize;

use crate::{prober::ProbeStats, proxy::models::ProxyConfig};

/// Coarse latency band of a reachable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyGrade {
    /// Under 100 ms.
    Excellent,
    /// Under 300 ms.
    Good,
    /// Under 500 ms.
    Acceptable,
    Poor,
}

impl LatencyGrade {
    pub fn from_latency(latency_ms: f64) -> Self {
        match latency_ms {
            l if l < 100.0 => Self::Excellent,
            l if l < 300.0 => Self::Good,
            l if l < 500.0 => Self::Acceptable,
            _ => Self::Poor,
        }
    }
}

/// Record counts after each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub collected: usize,
    pub deduplicated: usize,
    pub parsed: usize,
    pub filtered: usize,
    pub probed: usize,
    pub reachable: usize,
    pub classified: usize,
    /// Files written by the sink.
    pub emitted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProtocolStats {
    pub count: usize,
    pub avg_latency_ms: f64,
}

/// Statistics of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub stages: StageCounts,
    /// Candidates that no decoder accepted.
    pub parse_failed: usize,
    /// Reachable share of probed records, in percent.
    pub success_rate: f64,
    /// Reachable records per protocol.
    pub protocols: BTreeMap<String, ProtocolStats>,
    /// Reachable records per country, unknown included.
    pub countries: BTreeMap<String, usize>,
    pub latency_grades: BTreeMap<LatencyGrade, usize>,
    /// Records cut from protocol buckets by the capacity limit.
    pub dropped_by_capacity: usize,
    pub probe_elapsed_secs: f64,
    /// Records probed per second.
    pub throughput: f64,
}

impl Summary {
    /// Fills in the probe related fields from the annotated records.
    pub(crate) fn record_probe(&mut self, proxies: &[ProxyConfig], stats: &ProbeStats) {
        self.stages.probed = stats.probed;
        self.stages.reachable = stats.reachable;
        self.success_rate = if stats.probed > 0 {
            stats.reachable as f64 / stats.probed as f64 * 100.0
        } else {
            0.0
        };
        self.probe_elapsed_secs = stats.elapsed.as_secs_f64();
        self.throughput = stats.throughput();

        let mut latency_sums: BTreeMap<String, f64> = BTreeMap::new();
        for proxy in proxies.iter().filter(|proxy| proxy.is_reachable()) {
            let name = proxy.protocol.to_string();
            self.protocols.entry(name.clone()).or_default().count += 1;
            *latency_sums.entry(name).or_default() += proxy.latency_ms();
            *self
                .latency_grades
                .entry(LatencyGrade::from_latency(proxy.latency_ms()))
                .or_default() += 1;
        }
        for (name, stats) in self.protocols.iter_mut() {
            stats.avg_latency_ms = latency_sums[name] / stats.count as f64;
        }
    }

    /// Serializes the summary as pretty printed JSON.
    pub fn as_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages = &self.stages;
        writeln!(
            f,
            "collected {} -> unique {} -> parsed {} ({} failed) -> filtered {}",
            stages.collected, stages.deduplicated, stages.parsed, self.parse_failed, stages.filtered
        )?;
        writeln!(
            f,
            "probed {} in {:.1}s ({:.1}/s): {} reachable ({:.1}%)",
            stages.probed,
            self.probe_elapsed_secs,
            self.throughput,
            stages.reachable,
            self.success_rate
        )?;
        for (protocol, stats) in &self.protocols {
            writeln!(
                f,
                "  {:<10} {:>6}  avg {:.1}ms",
                protocol, stats.count, stats.avg_latency_ms
            )?;
        }
        write!(
            f,
            "classified {}, {} dropped by capacity, {} files written",
            stages.classified, self.dropped_by_capacity, stages.emitted
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        decoder::decode,
        proxy::models::{ProbeFailure, ProbeStatus},
    };

    #[test]
    fn grades_latency() {
        assert_eq!(LatencyGrade::from_latency(0.5), LatencyGrade::Excellent);
        assert_eq!(LatencyGrade::from_latency(100.0), LatencyGrade::Good);
        assert_eq!(LatencyGrade::from_latency(499.9), LatencyGrade::Acceptable);
        assert_eq!(LatencyGrade::from_latency(2500.0), LatencyGrade::Poor);
    }

    #[test]
    fn aggregates_probe_results() {
        let mut proxies: Vec<ProxyConfig> = [
            "trojan://password-a@203.0.113.1:2001",
            "trojan://password-b@203.0.113.1:2002",
            "vless://aaaaaaaaaaaa@203.0.113.1:2003",
            "vless://bbbbbbbbbbbb@203.0.113.1:2004",
        ]
        .iter()
        .map(|raw| decode(raw).unwrap())
        .collect();
        proxies[0].status = ProbeStatus::Reachable { latency_ms: 50.0 };
        proxies[1].status = ProbeStatus::Reachable { latency_ms: 250.0 };
        proxies[2].status = ProbeStatus::Reachable { latency_ms: 700.0 };
        proxies[3].status = ProbeStatus::Unreachable {
            reason: ProbeFailure::Timeout,
        };

        let mut summary = Summary::default();
        summary.record_probe(
            &proxies,
            &ProbeStats {
                probed: 4,
                reachable: 3,
                elapsed: Duration::from_secs(2),
            },
        );

        assert_eq!(summary.success_rate, 75.0);
        assert_eq!(summary.throughput, 2.0);
        assert_eq!(summary.protocols["trojan"].count, 2);
        assert_eq!(summary.protocols["trojan"].avg_latency_ms, 150.0);
        assert_eq!(summary.protocols["vless"].count, 1);
        assert_eq!(summary.latency_grades[&LatencyGrade::Poor], 1);

        let json: serde_json::Value = serde_json::from_str(&summary.as_json()).unwrap();
        assert_eq!(json["latency_grades"]["excellent"], 1);
        assert_eq!(json["stages"]["reachable"], 3);
    }
}
