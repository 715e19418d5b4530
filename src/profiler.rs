use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::graph::StageKind;

/// Per-render record of which stages ran, which degraded, and how long each took.
#[derive(Debug, Default, Clone)]
pub struct RenderTrace {
    stages: Vec<StageTiming>,
    degraded: Vec<StageKind>,
    current: Option<(StageKind, Instant)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTiming {
    pub stage: StageKind,
    pub elapsed: Duration,
}

impl RenderTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_stage(&mut self, stage: StageKind) {
        tracing::trace!(stage = stage.name(), "start_stage");
        self.current = Some((stage, Instant::now()));
    }

    pub fn end_stage(&mut self) {
        if let Some((stage, start)) = self.current.take() {
            let elapsed = start.elapsed();
            tracing::debug!(stage = stage.name(), elapsed_us = elapsed.as_micros() as u64, "stage done");
            self.stages.push(StageTiming { stage, elapsed });
        }
    }

    /// Marks the running stage as having passed its input through unchanged.
    pub fn mark_degraded(&mut self, stage: StageKind) {
        self.degraded.push(stage);
    }

    /// Stages that actually ran, in execution order.
    pub fn executed(&self) -> Vec<StageKind> {
        self.stages.iter().map(|t| t.stage).collect()
    }

    pub fn degraded(&self) -> &[StageKind] {
        &self.degraded
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.stages
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|t| t.elapsed).sum()
    }
}

/// Rolling timing statistics across many renders, keyed by stage name
#[derive(Debug, Default)]
pub struct Profiler {
    measurements: HashMap<&'static str, Vec<Duration>>,
    counters: HashMap<&'static str, u64>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trace: &RenderTrace) {
        for timing in trace.timings() {
            self.measurements.entry(timing.stage.name()).or_default().push(timing.elapsed);
        }
        for stage in trace.degraded() {
            self.increment_counter(stage.name());
        }
        self.increment_counter("renders");
    }

    pub fn increment_counter(&mut self, name: &'static str) {
        *self.counters.entry(name).or_insert(0) += 1;
    }

    pub fn get_stats(&self) -> ProfilerStats {
        let mut stats = HashMap::new();

        for (name, measurements) in &self.measurements {
            let (Some(min), Some(max)) = (measurements.iter().min(), measurements.iter().max()) else {
                continue;
            };
            let total: Duration = measurements.iter().sum();
            stats.insert(
                *name,
                MeasurementStats {
                    count: measurements.len(),
                    total_time: total,
                    average_time: total / measurements.len() as u32,
                    min_time: *min,
                    max_time: *max,
                },
            );
        }

        ProfilerStats {
            measurements: stats,
            counters: self.counters.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.measurements.clear();
        self.counters.clear();
    }
}

#[derive(Debug, Clone)]
pub struct MeasurementStats {
    pub count: usize,
    pub total_time: Duration,
    pub average_time: Duration,
    pub min_time: Duration,
    pub max_time: Duration,
}

#[derive(Debug, Clone)]
pub struct ProfilerStats {
    pub measurements: HashMap<&'static str, MeasurementStats>,
    pub counters: HashMap<&'static str, u64>,
}
