//! Cohort z-score standardisation with explicit handling of undefined metrics.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::records::EntityRef;
use crate::rolling::FeatureVector;

const MIN_STD: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub name: String,
    pub mean: f64,
    pub std: f64,
    /// Fraction of the cohort with a defined value.
    pub coverage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    LowCoverage,
    NoVariance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedRow {
    pub entity: EntityRef,
    /// Aligned with `Standardized::metrics`; `None` where the entity's value is undefined.
    pub values: Vec<Option<f64>>,
}

impl StandardizedRow {
    pub fn is_fully_defined(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    pub fn has_any_defined(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }

    /// Undefined entries read as the cohort mean (zero after standardisation).
    pub fn imputed(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.unwrap_or(0.0)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardized {
    pub metrics: Vec<MetricStats>,
    pub dropped: Vec<(String, DropReason)>,
    pub rows: Vec<StandardizedRow>,
}

impl Standardized {
    pub fn metric_index(&self, name: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m.name == name)
    }

    pub fn row(&self, entity: EntityRef) -> Option<&StandardizedRow> {
        self.rows.iter().find(|r| r.entity == entity)
    }
}

/// Mean and population standard deviation over the defined values of `name`.
pub fn cohort_distribution(vectors: &[&FeatureVector], name: &str) -> Option<(f64, f64, usize)> {
    let values: Vec<f64> = vectors.iter().filter_map(|v| v.get(name)).collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Some((mean, var.sqrt(), values.len()))
}

/// Standardise `vectors` over `metric_names`. A metric is kept only when at
/// least `min_coverage` of the cohort has it defined and it varies across the
/// cohort; entities missing a kept metric get `None` in that slot.
pub fn standardize(vectors: &[&FeatureVector], metric_names: &[String], min_coverage: f64) -> Standardized {
    let cohort = vectors.len();
    let mut metrics = Vec::new();
    let mut dropped = Vec::new();

    for name in metric_names {
        let Some((mean, std, defined)) = cohort_distribution(vectors, name) else {
            dropped.push((name.clone(), DropReason::LowCoverage));
            continue;
        };
        let coverage = defined as f64 / cohort as f64;
        if coverage < min_coverage {
            dropped.push((name.clone(), DropReason::LowCoverage));
            continue;
        }
        if std <= MIN_STD {
            dropped.push((name.clone(), DropReason::NoVariance));
            continue;
        }
        metrics.push(MetricStats {
            name: name.clone(),
            mean,
            std,
            coverage,
        });
    }

    let rows = vectors
        .iter()
        .map(|v| StandardizedRow {
            entity: v.entity,
            values: metrics
                .iter()
                .map(|m| v.get(&m.name).map(|x| (x - m.mean) / m.std))
                .collect(),
        })
        .collect();

    if !dropped.is_empty() {
        debug!(cohort, dropped = ?dropped, "metrics dropped from vector space");
    }
    Standardized {
        metrics,
        dropped,
        rows,
    }
}
