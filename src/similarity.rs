//! Nearest-neighbour search over standardised player vectors.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::normalize::{standardize, StandardizedRow};
use crate::rankings::position_metrics;
use crate::records::{EntityRef, PlayerId, PositionGroup, TeamId};
use crate::rolling::{FeatureVector, PlayerFeatures};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPlayer {
    pub player: PlayerId,
    pub name: String,
    pub team: TeamId,
    pub position: PositionGroup,
    pub minutes: u32,
    /// Cosine similarity in [-1, 1].
    pub similarity: f64,
    /// Metrics both players had defined.
    pub shared_metrics: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityParams {
    pub min_minutes: u32,
    pub min_metric_coverage: f64,
    pub top_n: usize,
}

/// Players most similar to `query` within its position group.
///
/// `players` is the full visible cohort for `as_of`. The query must itself
/// meet `min_minutes` and have at least one defined comparison metric.
pub fn find_similar_players(
    players: &[PlayerFeatures],
    query: PlayerId,
    as_of: NaiveDate,
    params: SimilarityParams,
) -> Result<Vec<SimilarPlayer>> {
    let Some(target) = players.iter().find(|p| p.player == query) else {
        return Err(EngineError::MissingEntity {
            entity: EntityRef::Player(query),
            as_of,
        });
    };
    if target.minutes < params.min_minutes {
        return Err(EngineError::EntityNotEligible {
            player: query,
            as_of,
            reason: format!(
                "{} minutes played, {} required",
                target.minutes, params.min_minutes
            ),
        });
    }

    let cohort: Vec<&PlayerFeatures> = players
        .iter()
        .filter(|p| p.position == target.position && p.minutes >= params.min_minutes)
        .collect();
    let vectors: Vec<&FeatureVector> = cohort.iter().map(|p| &p.vector).collect();
    let space = standardize(
        &vectors,
        &position_metrics(target.position),
        params.min_metric_coverage,
    );

    let query_row = space
        .row(EntityRef::Player(query))
        .filter(|r| r.has_any_defined())
        .ok_or_else(|| EngineError::EntityNotEligible {
            player: query,
            as_of,
            reason: format!("no defined {} comparison metrics", target.position),
        })?;
    let query_vec = query_row.imputed();

    let mut out: Vec<SimilarPlayer> = cohort
        .iter()
        .zip(&space.rows)
        .filter(|(p, _)| p.player != query)
        .filter_map(|(p, row)| {
            let similarity = cosine(&query_vec, &row.imputed())?;
            Some(SimilarPlayer {
                player: p.player,
                name: p.name.clone(),
                team: p.team,
                position: p.position,
                minutes: p.minutes,
                similarity,
                shared_metrics: shared_defined(query_row, row),
            })
        })
        .collect();

    out.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then(b.minutes.cmp(&a.minutes))
            .then(a.player.cmp(&b.player))
    });
    out.truncate(params.top_n);

    debug!(
        %query,
        %as_of,
        cohort = cohort.len(),
        metrics = space.metrics.len(),
        returned = out.len(),
        "similar players ranked"
    );
    Ok(out)
}

/// Cosine similarity of two vectors in the same standardised space. Undefined
/// metrics enter as zero (the cohort mean), so they add nothing to the dot
/// product but a sparse vector is not inflated. `None` for a zero vector.
pub fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f64 = a.iter().map(|x| x * x).sum();
    let nb: f64 = b.iter().map(|y| y * y).sum();
    if na <= 0.0 || nb <= 0.0 {
        return None;
    }
    Some((dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0))
}

fn shared_defined(a: &StandardizedRow, b: &StandardizedRow) -> usize {
    a.values
        .iter()
        .zip(&b.values)
        .filter(|(x, y)| x.is_some() && y.is_some())
        .count()
}
