//! Tactical style clustering of team vectors.
//!
//! K-means over standardised team vectors with deterministic farthest-point
//! initialisation, followed by table-driven labelling of the centroids.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::normalize::standardize;
use crate::records::{EntityRef, TeamId};
use crate::rolling::{rolling_name, BaseMetric, FeatureVector, WindowSet, SEASON_PRESSING, SEASON_SHOT_QUALITY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub team: TeamId,
    pub cluster: usize,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: usize,
    pub label: String,
    pub size: usize,
    /// Centroid in standardised units, keyed by metric name.
    pub centroid: BTreeMap<String, f64>,
}

/// Fewer fully-defined teams than requested clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedClustering {
    pub k_requested: usize,
    pub k_used: usize,
    pub eligible_teams: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub as_of: NaiveDate,
    pub metrics: Vec<String>,
    pub assignments: Vec<ClusterAssignment>,
    pub clusters: Vec<ClusterSummary>,
    /// Teams left out because a kept metric was undefined for them.
    pub unassigned: Vec<TeamId>,
    pub k_requested: usize,
    pub k_used: usize,
    pub warning: Option<DegradedClustering>,
    pub iterations: usize,
    pub converged: bool,
    pub source_max_date: Option<NaiveDate>,
}

impl ClusterReport {
    pub fn assignment(&self, team: TeamId) -> Option<&ClusterAssignment> {
        self.assignments.iter().find(|a| a.team == team)
    }

    pub fn label_of(&self, team: TeamId) -> Option<&str> {
        let cluster = self.assignment(team)?.cluster;
        self.clusters
            .iter()
            .find(|c| c.id == cluster)
            .map(|c| c.label.as_str())
    }
}

/// Style metrics derived from the largest rolling window.
pub fn style_metric_names(windows: &WindowSet) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(w) = windows.largest() {
        for metric in [
            BaseMetric::XgFor,
            BaseMetric::XgAgainst,
            BaseMetric::ShotsFor,
            BaseMetric::ShotsAgainst,
            BaseMetric::Points,
        ] {
            out.push(rolling_name(w, metric));
        }
    }
    out.push(SEASON_SHOT_QUALITY.to_string());
    out.push(SEASON_PRESSING.to_string());
    out
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub k: usize,
    pub max_iterations: usize,
    pub min_metric_coverage: f64,
}

/// Cluster one snapshot of team vectors. Never fails: a cohort smaller than
/// `k` reduces `k` and attaches a warning.
pub fn cluster_teams(
    vectors: &[FeatureVector],
    as_of: NaiveDate,
    windows: &WindowSet,
    params: ClusterParams,
) -> ClusterReport {
    let mut sorted: Vec<&FeatureVector> = vectors.iter().collect();
    sorted.sort_by_key(|v| v.entity);
    let names = style_metric_names(windows);
    let snapshot = standardize(&sorted, &names, params.min_metric_coverage);
    let metrics: Vec<String> = snapshot.metrics.iter().map(|m| m.name.clone()).collect();

    let mut teams = Vec::new();
    let mut points = Vec::new();
    let mut unassigned = Vec::new();
    for row in &snapshot.rows {
        let EntityRef::Team(team) = row.entity else { continue };
        if !metrics.is_empty() && row.is_fully_defined() {
            teams.push(team);
            points.push(row.imputed());
        } else {
            unassigned.push(team);
        }
    }

    let k_requested = params.k.max(1);
    let k_used = k_requested.min(points.len());
    let warning = if k_used < k_requested {
        warn!(
            %as_of,
            k_requested,
            k_used,
            eligible = points.len(),
            "degraded clustering: fewer eligible teams than clusters"
        );
        Some(DegradedClustering {
            k_requested,
            k_used,
            eligible_teams: points.len(),
        })
    } else {
        None
    };

    let source_max_date = sorted.iter().filter_map(|v| v.source_max_date).max();
    if k_used == 0 {
        return ClusterReport {
            as_of,
            metrics,
            assignments: Vec::new(),
            clusters: Vec::new(),
            unassigned,
            k_requested,
            k_used,
            warning,
            iterations: 0,
            converged: true,
            source_max_date,
        };
    }

    let km = kmeans(&points, k_used, params.max_iterations);
    let assignments: Vec<ClusterAssignment> = teams
        .iter()
        .zip(&points)
        .zip(&km.assignments)
        .map(|((team, p), &c)| ClusterAssignment {
            team: *team,
            cluster: c,
            distance: euclidean(p, &km.centroids[c]),
        })
        .collect();

    let labels = label_centroids(&metrics, &km.centroids, windows);
    let clusters = km
        .centroids
        .iter()
        .enumerate()
        .map(|(id, c)| ClusterSummary {
            id,
            label: labels[id].to_string(),
            size: km.assignments.iter().filter(|&&a| a == id).count(),
            centroid: metrics.iter().cloned().zip(c.iter().copied()).collect(),
        })
        .collect();

    debug!(
        %as_of,
        k = k_used,
        iterations = km.iterations,
        converged = km.converged,
        "team styles clustered"
    );
    ClusterReport {
        as_of,
        metrics,
        assignments,
        clusters,
        unassigned,
        k_requested,
        k_used,
        warning,
        iterations: km.iterations,
        converged: km.converged,
        source_max_date,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
    pub converged: bool,
}

/// Lloyd's k-means. Requires `1 <= k <= points.len()`; identical input always
/// yields identical output.
pub fn kmeans(points: &[Vec<f64>], k: usize, max_iterations: usize) -> KMeansResult {
    let mut centroids = farthest_point_init(points, k);
    let mut assignments = vec![usize::MAX; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations.max(1) {
        iterations += 1;
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let nearest = nearest_centroid(p, &centroids);
            if nearest != assignments[i] {
                assignments[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }
        // Reported centroids must be the ones the final assignment used.
        if iterations == max_iterations.max(1) {
            break;
        }
        recompute_centroids(points, &assignments, &mut centroids);
    }

    KMeansResult {
        assignments,
        centroids,
        iterations,
        converged,
    }
}

/// First centroid: the point farthest from the origin (the cohort mean).
/// Each next one maximises the distance to its closest chosen centroid.
/// Ties go to the lower index.
fn farthest_point_init(points: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let origin = vec![0.0; points.first().map_or(0, Vec::len)];
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    let first = argmax(points.iter().map(|p| euclidean(p, &origin)));
    chosen.push(first);

    while chosen.len() < k {
        let next = argmax(points.iter().enumerate().map(|(i, p)| {
            if chosen.contains(&i) {
                f64::NEG_INFINITY
            } else {
                chosen
                    .iter()
                    .map(|&c| euclidean(p, &points[c]))
                    .fold(f64::INFINITY, f64::min)
            }
        }));
        chosen.push(next);
    }
    chosen.into_iter().map(|i| points[i].clone()).collect()
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_v = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_v {
            best = i;
            best_v = v;
        }
    }
    best
}

fn nearest_centroid(p: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = euclidean(p, c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Empty clusters keep their previous centroid.
fn recompute_centroids(points: &[Vec<f64>], assignments: &[usize], centroids: &mut [Vec<f64>]) {
    for (id, centroid) in centroids.iter_mut().enumerate() {
        let members: Vec<&Vec<f64>> = points
            .iter()
            .zip(assignments)
            .filter(|&(_, &a)| a == id)
            .map(|(p, _)| p)
            .collect();
        if members.is_empty() {
            continue;
        }
        for (d, slot) in centroid.iter_mut().enumerate() {
            *slot = members.iter().map(|m| m[d]).sum::<f64>() / members.len() as f64;
        }
    }
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Whether a centroid sits in the upper half of the centroids on each style axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleTiers {
    pub attack: bool,
    pub defense: bool,
    pub pressing: bool,
}

pub struct StyleRule {
    /// Lower wins; equal priorities fall back to label order.
    pub priority: u8,
    pub label: &'static str,
    pub applies: fn(&StyleTiers) -> bool,
}

fn dominant(t: &StyleTiers) -> bool {
    t.attack && t.defense
}

fn attacking_pressing(t: &StyleTiers) -> bool {
    t.attack && t.pressing
}

fn compact_pressing(t: &StyleTiers) -> bool {
    t.defense && t.pressing
}

fn attacking(t: &StyleTiers) -> bool {
    t.attack
}

fn defensive(t: &StyleTiers) -> bool {
    t.defense
}

fn pressing(t: &StyleTiers) -> bool {
    t.pressing
}

fn any(_: &StyleTiers) -> bool {
    true
}

pub const STYLE_RULES: &[StyleRule] = &[
    StyleRule { priority: 0, label: "Dominant", applies: dominant },
    StyleRule { priority: 1, label: "Attacking Pressing", applies: attacking_pressing },
    StyleRule { priority: 1, label: "Compact Pressing", applies: compact_pressing },
    StyleRule { priority: 2, label: "Attacking Open", applies: attacking },
    StyleRule { priority: 2, label: "Low Block", applies: defensive },
    StyleRule { priority: 3, label: "High Energy", applies: pressing },
    StyleRule { priority: 4, label: "Reactive", applies: any },
];

pub fn label_for(tiers: &StyleTiers) -> &'static str {
    STYLE_RULES
        .iter()
        .filter(|r| (r.applies)(tiers))
        .min_by(|a, b| a.priority.cmp(&b.priority).then(a.label.cmp(b.label)))
        .map_or("Reactive", |r| r.label)
}

/// An axis with no kept metric yields `None`; no centroid is "high" on it.
fn label_centroids(metrics: &[String], centroids: &[Vec<f64>], windows: &WindowSet) -> Vec<&'static str> {
    let w = windows.largest().unwrap_or(0);
    let axis = |names: &[String], sign: f64| -> Option<Vec<f64>> {
        let idx: Vec<usize> = names
            .iter()
            .filter_map(|n| metrics.iter().position(|m| m == n))
            .collect();
        if idx.is_empty() {
            return None;
        }
        Some(
            centroids
                .iter()
                .map(|c| sign * idx.iter().map(|&i| c[i]).sum::<f64>() / idx.len() as f64)
                .collect(),
        )
    };
    let attack = axis(
        &[rolling_name(w, BaseMetric::XgFor), rolling_name(w, BaseMetric::ShotsFor)],
        1.0,
    );
    let defense = axis(
        &[rolling_name(w, BaseMetric::XgAgainst), rolling_name(w, BaseMetric::ShotsAgainst)],
        -1.0,
    );
    let press = axis(&[SEASON_PRESSING.to_string()], 1.0);

    let k = centroids.len();
    let upper_half = |scores: &Option<Vec<f64>>, i: usize| {
        scores.as_ref().is_some_and(|scores| {
            let higher = scores.iter().filter(|&&s| s > scores[i]).count();
            higher * 2 < k
        })
    };
    (0..k)
        .map(|i| {
            label_for(&StyleTiers {
                attack: upper_half(&attack, i),
                defense: upper_half(&defense, i),
                pressing: upper_half(&press, i),
            })
        })
        .collect()
}
