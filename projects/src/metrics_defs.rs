//! Metrics definitions for the project service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SNAPSHOT_LOAD_DURATION: MetricDef = MetricDef {
    name: "snapshot.load.duration",
    metric_type: MetricType::Histogram,
    description: "Time to load a complete project snapshot in seconds",
};

pub const SNAPSHOT_LOAD_FAILURE: MetricDef = MetricDef {
    name: "snapshot.load.failure",
    metric_type: MetricType::Counter,
    description: "Number of snapshot loads that failed",
};

pub const SNAPSHOT_PROJECTS: MetricDef = MetricDef {
    name: "snapshot.projects",
    metric_type: MetricType::Gauge,
    description: "Number of projects in the current snapshot",
};

pub const CONTENT_RATE_LIMITED: MetricDef = MetricDef {
    name: "content.rate_limited",
    metric_type: MetricType::Counter,
    description: "Number of content backend calls rejected by rate limiting",
};

pub const CONTENT_RETRIES_EXHAUSTED: MetricDef = MetricDef {
    name: "content.retries_exhausted",
    metric_type: MetricType::Counter,
    description: "Number of content backend calls that ran out of retry budget",
};

pub const ALL_METRICS: &[MetricDef] = &[
    SNAPSHOT_LOAD_DURATION,
    SNAPSHOT_LOAD_FAILURE,
    SNAPSHOT_PROJECTS,
    CONTENT_RATE_LIMITED,
    CONTENT_RETRIES_EXHAUSTED,
];
