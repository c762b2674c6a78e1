//! Percentiles, leaderboards and scouting reports over a player cohort.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::records::{EntityRef, PlayerId, PositionGroup, TeamId};
use crate::rolling::{
    per90_name, MetricValue, PlayerFeatures, PlayerStat, CLEAN_SHEET_RATE, GOALS_CONCEDED_PER90,
    GOALS_MINUS_XG, GOALS_PREVENTED_PER90, GOALS_TOTAL, SAVES_PER90, SAVE_RATE, SHOT_EFFICIENCY,
    XGA_PER90,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    HigherBetter,
    LowerBetter,
}

pub fn metric_direction(name: &str) -> Direction {
    const LOWER_BETTER_PARTS: [&str; 3] = ["goals_against", "xg_against", "shots_against"];
    if name == GOALS_CONCEDED_PER90
        || name == XGA_PER90
        || LOWER_BETTER_PARTS.iter().any(|s| name.contains(s))
    {
        Direction::LowerBetter
    } else {
        Direction::HigherBetter
    }
}

fn apply_dir(v: f64, dir: Direction) -> f64 {
    match dir {
        Direction::HigherBetter => v,
        Direction::LowerBetter => -v,
    }
}

/// Metrics used to compare players of a position group.
pub fn position_metrics(group: PositionGroup) -> Vec<String> {
    let per90 = |stats: &[PlayerStat]| stats.iter().map(|s| per90_name(*s)).collect::<Vec<_>>();
    match group {
        PositionGroup::Forward => per90(&[
            PlayerStat::Goals,
            PlayerStat::Xg,
            PlayerStat::Shots,
            PlayerStat::Assists,
            PlayerStat::KeyPasses,
            PlayerStat::Xa,
        ]),
        PositionGroup::Midfielder => per90(&[
            PlayerStat::Assists,
            PlayerStat::Xa,
            PlayerStat::KeyPasses,
            PlayerStat::Goals,
            PlayerStat::Xg,
            PlayerStat::Shots,
        ]),
        PositionGroup::Defender => {
            let mut out = vec![
                CLEAN_SHEET_RATE.to_string(),
                GOALS_CONCEDED_PER90.to_string(),
                XGA_PER90.to_string(),
            ];
            out.extend(per90(&[PlayerStat::Assists, PlayerStat::KeyPasses]));
            out
        }
        PositionGroup::Goalkeeper => vec![
            CLEAN_SHEET_RATE.to_string(),
            GOALS_CONCEDED_PER90.to_string(),
            XGA_PER90.to_string(),
            GOALS_PREVENTED_PER90.to_string(),
        ],
    }
}

/// Percentile (0-100) of each defined value: the share of defined values at or
/// below it after applying the metric's direction. Equal values share a percentile.
pub fn percentile_ranks<K: Ord + Copy>(values: &[(K, Option<f64>)], dir: Direction) -> BTreeMap<K, f64> {
    let defined: Vec<(K, f64)> = values
        .iter()
        .filter_map(|(k, v)| v.map(|x| (*k, apply_dir(x, dir))))
        .collect();
    let n = defined.len() as f64;
    defined
        .iter()
        .map(|(k, v)| {
            let at_or_below = defined.iter().filter(|(_, o)| *o <= *v).count() as f64;
            (*k, 100.0 * at_or_below / n)
        })
        .collect()
}

/// Percentiles of `metric` for every player meeting `min_minutes`, computed
/// within each player's position group.
pub fn grouped_percentiles(
    players: &[PlayerFeatures],
    metric: &str,
    min_minutes: u32,
) -> BTreeMap<PlayerId, f64> {
    let dir = metric_direction(metric);
    let mut by_group: HashMap<PositionGroup, Vec<(PlayerId, Option<f64>)>> = HashMap::new();
    for p in players.iter().filter(|p| p.minutes >= min_minutes) {
        by_group
            .entry(p.position)
            .or_default()
            .push((p.player, p.vector.get(metric)));
    }
    let mut out = BTreeMap::new();
    for values in by_group.values() {
        out.extend(percentile_ranks(values, dir));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player: PlayerId,
    pub name: String,
    pub team: TeamId,
    pub position: PositionGroup,
    pub minutes: u32,
    pub value: f64,
    pub percentile: f64,
}

/// Best `n` players on `metric` (direction-aware), optionally restricted to one
/// position group. Undefined values never appear. Ties go to more minutes, then lower id.
pub fn top_players_by_metric(
    players: &[PlayerFeatures],
    metric: &str,
    group: Option<PositionGroup>,
    min_minutes: u32,
    n: usize,
) -> Vec<LeaderboardEntry> {
    let dir = metric_direction(metric);
    let percentiles = grouped_percentiles(players, metric, min_minutes);
    let mut rows: Vec<LeaderboardEntry> = players
        .iter()
        .filter(|p| p.minutes >= min_minutes)
        .filter(|p| group.is_none_or(|g| g == p.position))
        .filter_map(|p| {
            let value = p.vector.get(metric)?;
            Some(LeaderboardEntry {
                player: p.player,
                name: p.name.clone(),
                team: p.team,
                position: p.position,
                minutes: p.minutes,
                value,
                percentile: percentiles.get(&p.player).copied().unwrap_or(0.0),
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        apply_dir(b.value, dir)
            .total_cmp(&apply_dir(a.value, dir))
            .then(b.minutes.cmp(&a.minutes))
            .then(a.player.cmp(&b.player))
    });
    rows.truncate(n);
    rows
}

/// Team-derived defensive numbers shown for goalkeepers and defenders.
/// Save figures are only filled in for goalkeepers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefensiveSummary {
    pub clean_sheet_rate: MetricValue,
    pub goals_conceded_per90: MetricValue,
    pub xga_per90: MetricValue,
    pub goals_prevented_per90: MetricValue,
    pub saves_per90: MetricValue,
    pub save_rate: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerReport {
    pub player: PlayerId,
    pub name: String,
    pub team: TeamId,
    pub position: PositionGroup,
    pub appearances: usize,
    pub minutes: u32,
    pub minutes_per_match: f64,
    pub goals: MetricValue,
    pub goals_per90: MetricValue,
    pub assists_per90: MetricValue,
    /// Goals plus assists per 90.
    pub goal_involvement_per90: MetricValue,
    pub key_passes_per90: MetricValue,
    pub shots_per90: MetricValue,
    pub xg_per90: MetricValue,
    pub xa_per90: MetricValue,
    pub xg_involvement_per90: MetricValue,
    pub goals_minus_xg: MetricValue,
    pub shot_efficiency: MetricValue,
    /// Percentile within the position group for each comparison metric the
    /// player has defined. Empty when the player is under `min_minutes`.
    pub percentiles: BTreeMap<String, f64>,
    pub defensive: Option<DefensiveSummary>,
}

fn sum_defined(a: MetricValue, b: MetricValue) -> MetricValue {
    Some(a? + b?)
}

/// Scouting report for one player of the visible cohort `players`.
pub fn player_report(
    players: &[PlayerFeatures],
    player: PlayerId,
    as_of: NaiveDate,
    min_minutes: u32,
) -> Result<PlayerReport> {
    let p = players
        .iter()
        .find(|p| p.player == player)
        .ok_or(EngineError::MissingEntity {
            entity: EntityRef::Player(player),
            as_of,
        })?;
    let v = &p.vector;
    let stat = |s: PlayerStat| v.get(&per90_name(s));

    let mut percentiles = BTreeMap::new();
    if p.minutes >= min_minutes {
        for metric in position_metrics(p.position) {
            if let Some(pct) = grouped_percentiles(players, &metric, min_minutes).get(&player) {
                percentiles.insert(metric, *pct);
            }
        }
    }

    let defensive = match p.position {
        PositionGroup::Goalkeeper | PositionGroup::Defender => {
            let keeper = p.position == PositionGroup::Goalkeeper;
            Some(DefensiveSummary {
                clean_sheet_rate: v.get(CLEAN_SHEET_RATE),
                goals_conceded_per90: v.get(GOALS_CONCEDED_PER90),
                xga_per90: v.get(XGA_PER90),
                goals_prevented_per90: v.get(GOALS_PREVENTED_PER90),
                saves_per90: v.get(SAVES_PER90).filter(|_| keeper),
                save_rate: v.get(SAVE_RATE).filter(|_| keeper),
            })
        }
        PositionGroup::Midfielder | PositionGroup::Forward => None,
    };

    Ok(PlayerReport {
        player,
        name: p.name.clone(),
        team: p.team,
        position: p.position,
        appearances: p.appearances,
        minutes: p.minutes,
        minutes_per_match: p.minutes as f64 / p.appearances.max(1) as f64,
        goals: v.get(GOALS_TOTAL),
        goals_per90: stat(PlayerStat::Goals),
        assists_per90: stat(PlayerStat::Assists),
        goal_involvement_per90: sum_defined(stat(PlayerStat::Goals), stat(PlayerStat::Assists)),
        key_passes_per90: stat(PlayerStat::KeyPasses),
        shots_per90: stat(PlayerStat::Shots),
        xg_per90: stat(PlayerStat::Xg),
        xa_per90: stat(PlayerStat::Xa),
        xg_involvement_per90: sum_defined(stat(PlayerStat::Xg), stat(PlayerStat::Xa)),
        goals_minus_xg: v.get(GOALS_MINUS_XG),
        shot_efficiency: v.get(SHOT_EFFICIENCY),
        percentiles,
        defensive,
    })
}
