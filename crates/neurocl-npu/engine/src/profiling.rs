// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Profiling context
//!
//! A [`Profiler`] is handed to [`ExecutionDag::call_n_times`]; while running
//! it accumulates call counts and execution time per plan position.
//! [`Profiler::report`] turns the counters into a [`ProfileReport`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::dag::ExecutionDag;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PlanStats {
    n_calls: u64,
    runtime: Duration,
}

/// Per-plan call counters with an explicit start/stop lifecycle
#[derive(Debug, Default)]
pub struct Profiler {
    running: bool,
    stats: Vec<PlanStats>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Clear all counters (keeps the running state)
    pub fn reset(&mut self) {
        self.stats.clear();
    }

    /// Account one call of the plan at `position`
    pub fn record(&mut self, position: usize, elapsed: Duration) {
        if !self.running {
            return;
        }
        if self.stats.len() <= position {
            self.stats.resize(position + 1, PlanStats::default());
        }
        let stats = &mut self.stats[position];
        stats.n_calls += 1;
        stats.runtime += elapsed;
    }

    pub fn n_calls(&self, position: usize) -> u64 {
        self.stats.get(position).map_or(0, |s| s.n_calls)
    }

    pub fn runtime(&self, position: usize) -> Duration {
        self.stats.get(position).map_or(Duration::ZERO, |s| s.runtime)
    }

    /// Summarise the counters for the plans of `dag`
    pub fn report(&self, dag: &ExecutionDag, sort: Option<ReportSort>) -> ProfileReport {
        let mut rows: Vec<ProfileRow> = dag
            .order()
            .iter()
            .enumerate()
            .map(|(position, plan)| {
                let n_calls = self.n_calls(position);
                let runtime = self.runtime(position).as_secs_f64();
                let cost = plan.cost();
                let rate = |per_call: u64| {
                    if runtime > 0.0 {
                        n_calls as f64 * per_call as f64 / (runtime * 1.0e9)
                    } else {
                        0.0
                    }
                };
                ProfileRow {
                    n_calls,
                    runtime,
                    gflops_per_sec: rate(cost.flops_per_call),
                    gbytes_per_sec: rate(cost.bytes_per_call),
                    name: plan.name().to_string(),
                    tag: plan.tag().map(str::to_string),
                }
            })
            .collect();
        if let Some(sort) = sort {
            rows.sort_by(|a, b| {
                let ordering = sort.column.compare(a, b);
                if sort.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        ProfileReport { rows }
    }
}

/// One plan's line of a profile report
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub n_calls: u64,
    /// Accumulated execution time in seconds
    pub runtime: f64,
    pub gflops_per_sec: f64,
    pub gbytes_per_sec: f64,
    pub name: String,
    pub tag: Option<String>,
}

/// Report column usable as a sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportColumn {
    Calls,
    Runtime,
    GflopsPerSec,
    GbytesPerSec,
    Name,
}

impl ReportColumn {
    fn compare(&self, a: &ProfileRow, b: &ProfileRow) -> std::cmp::Ordering {
        match self {
            ReportColumn::Calls => a.n_calls.cmp(&b.n_calls),
            ReportColumn::Runtime => a.runtime.total_cmp(&b.runtime),
            ReportColumn::GflopsPerSec => a.gflops_per_sec.total_cmp(&b.gflops_per_sec),
            ReportColumn::GbytesPerSec => a.gbytes_per_sec.total_cmp(&b.gbytes_per_sec),
            ReportColumn::Name => a.name.cmp(&b.name),
        }
    }
}

impl FromStr for ReportColumn {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n_calls" | "calls" => Ok(ReportColumn::Calls),
            "runtime" | "time" => Ok(ReportColumn::Runtime),
            "gflops" | "gf/s" => Ok(ReportColumn::GflopsPerSec),
            "gbytes" | "gb/s" => Ok(ReportColumn::GbytesPerSec),
            "name" => Ok(ReportColumn::Name),
            other => Err(EngineError::Configuration(format!(
                "unknown profile column '{}'",
                other
            ))),
        }
    }
}

/// Sort order of a report; descending unless `ascending`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSort {
    pub column: ReportColumn,
    pub ascending: bool,
}

impl FromStr for ReportSort {
    type Err = EngineError;

    /// `"runtime"` sorts descending, `"-runtime"` ascending
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ascending, column) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        Ok(Self {
            column: column.parse()?,
            ascending,
        })
    }
}

/// Table of per-plan throughput
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileReport {
    pub rows: Vec<ProfileRow>,
}

impl ProfileReport {
    /// Column sums of runtime, GF/s and GB/s
    pub fn totals(&self) -> (f64, f64, f64) {
        self.rows.iter().fold((0.0, 0.0, 0.0), |acc, r| {
            (
                acc.0 + r.runtime,
                acc.1 + r.gflops_per_sec,
                acc.2 + r.gbytes_per_sec,
            )
        })
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(80);
        writeln!(f, "{}", rule)?;
        writeln!(f, "n_calls\truntime\tGF/s\tGB/s")?;
        for r in &self.rows {
            writeln!(
                f,
                "{}\t{:.3}\t{:.3}\t{:.3}\t<{}, tag={}>",
                r.n_calls,
                r.runtime,
                r.gflops_per_sec,
                r.gbytes_per_sec,
                r.name,
                r.tag.as_deref().unwrap_or("None")
            )?;
        }
        writeln!(f, "{}", rule)?;
        let (runtime, gflops, gbytes) = self.totals();
        write!(f, "totals:\t{:.3}\t{:.3}\t{:.3}", runtime, gflops, gbytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DagBuilder;
    use crate::plan::{HostPlan, Marker};
    use std::sync::Arc;

    #[test]
    fn test_stopped_profiler_ignores_calls() {
        let mut profiler = Profiler::new();
        profiler.record(0, Duration::from_millis(1));
        assert_eq!(profiler.n_calls(0), 0);
        profiler.start();
        profiler.record(0, Duration::from_millis(1));
        profiler.record(0, Duration::from_millis(2));
        assert_eq!(profiler.n_calls(0), 2);
        assert_eq!(profiler.runtime(0), Duration::from_millis(3));
        profiler.reset();
        assert_eq!(profiler.n_calls(0), 0);
    }

    #[test]
    fn test_report_counts_every_node() {
        let mut builder = DagBuilder::new();
        let first = builder
            .add(Arc::new(HostPlan::new("work", || Ok(())).with_tag(Some("t".into()))), &[])
            .unwrap();
        builder.add(Arc::new(Marker::new()), &[first]).unwrap();
        let dag = builder.build().unwrap();

        let mut profiler = Profiler::new();
        profiler.start();
        dag.call_n_times(5, Some(&mut profiler)).unwrap();
        let report = profiler.report(&dag, None);
        assert_eq!(report.rows.len(), 2);
        assert!(report.rows.iter().all(|r| r.n_calls == 5));
        assert_eq!(report.rows[0].tag.as_deref(), Some("t"));
        let text = report.to_string();
        assert!(text.contains("<step_marker, tag=None>"));
        assert!(text.contains("totals:"));
    }

    #[test]
    fn test_sort_spec_parsing() {
        let sort: ReportSort = "-runtime".parse().unwrap();
        assert_eq!(sort.column, ReportColumn::Runtime);
        assert!(sort.ascending);
        assert!("bogus".parse::<ReportSort>().is_err());
    }
}
