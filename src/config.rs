use std::env;

use serde::{Deserialize, Serialize};

use crate::store::CutoffMode;

pub const DEFAULT_WINDOWS: [usize; 3] = [3, 5, 10];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rolling window sizes, in matches.
    pub windows: Vec<usize>,
    pub cutoff: CutoffMode,
    /// Fraction of a cohort that must have a metric defined for it to stay in the vector space.
    pub min_metric_coverage: f64,
    pub cluster_k: usize,
    pub kmeans_max_iterations: usize,
    pub similarity_min_minutes: u32,
    pub similarity_top_n: usize,
    pub profile_last_n: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS.to_vec(),
            cutoff: CutoffMode::Exclusive,
            min_metric_coverage: 0.5,
            cluster_k: 5,
            kmeans_max_iterations: 100,
            similarity_min_minutes: 900,
            similarity_top_n: 5,
            profile_last_n: 10,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `ASOF_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        let windows = opt_env("ASOF_WINDOWS")
            .map(|raw| parse_windows(&raw))
            .filter(|w| !w.is_empty())
            .unwrap_or(d.windows);
        let cutoff = match opt_env("ASOF_CUTOFF").as_deref().map(str::to_ascii_lowercase) {
            Some(s) if s == "inclusive" => CutoffMode::Inclusive,
            _ => d.cutoff,
        };
        Self {
            windows,
            cutoff,
            min_metric_coverage: env_parse("ASOF_MIN_METRIC_COVERAGE", d.min_metric_coverage)
                .clamp(0.0, 1.0),
            cluster_k: env_parse("ASOF_CLUSTER_K", d.cluster_k).max(1),
            kmeans_max_iterations: env_parse("ASOF_KMEANS_MAX_ITER", d.kmeans_max_iterations).max(1),
            similarity_min_minutes: env_parse("ASOF_SIMILARITY_MIN_MINUTES", d.similarity_min_minutes),
            similarity_top_n: env_parse("ASOF_SIMILARITY_TOP_N", d.similarity_top_n).max(1),
            profile_last_n: env_parse("ASOF_PROFILE_LAST_N", d.profile_last_n).max(1),
        }
    }
}

fn parse_windows(raw: &str) -> Vec<usize> {
    let mut out: Vec<usize> = raw
        .split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|val| {
        if val.trim().is_empty() {
            None
        } else {
            Some(val)
        }
    })
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    opt_env(key)
        .and_then(|val| val.trim().parse::<T>().ok())
        .unwrap_or(default)
}
