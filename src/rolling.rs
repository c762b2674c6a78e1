//! Windowed, cumulative and per-90 features derived from visible records only.
//!
//! Undefined values are carried as `None` all the way through; nothing here
//! substitutes zero for a metric that cannot be computed.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::SimulationContext;
use crate::error::{EngineError, Result};
use crate::records::{EntityRef, PlayerAppearance, PlayerId, PositionGroup, TeamId, TeamMatchRow};
use crate::store::TemporalStore;

/// `None` marks a metric that is undefined for the entity at this date.
pub type MetricValue = Option<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub entity: EntityRef,
    pub as_of: NaiveDate,
    pub metrics: BTreeMap<String, MetricValue>,
    /// Number of records that contributed.
    pub source_records: usize,
    /// Latest date among contributing records.
    pub source_max_date: Option<NaiveDate>,
}

impl FeatureVector {
    fn new(entity: EntityRef, as_of: NaiveDate) -> Self {
        Self {
            entity,
            as_of,
            metrics: BTreeMap::new(),
            source_records: 0,
            source_max_date: None,
        }
    }

    /// Defined value of `name`; `None` if undefined or absent.
    pub fn get(&self, name: &str) -> MetricValue {
        self.metrics.get(name).copied().flatten()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn set(&mut self, name: impl Into<String>, value: MetricValue) {
        let value = value.filter(|v| v.is_finite());
        self.metrics.insert(name.into(), value);
    }
}

/// Canonical (sorted, deduplicated, non-zero) set of rolling window sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSet(Vec<usize>);

impl WindowSet {
    pub fn new(windows: &[usize]) -> Self {
        let mut w: Vec<usize> = windows.iter().copied().filter(|n| *n > 0).collect();
        w.sort_unstable();
        w.dedup();
        Self(w)
    }

    pub fn sizes(&self) -> &[usize] {
        &self.0
    }

    pub fn largest(&self) -> Option<usize> {
        self.0.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseMetric {
    GoalsFor,
    GoalsAgainst,
    XgFor,
    XgAgainst,
    ShotsFor,
    ShotsAgainst,
    Points,
}

impl BaseMetric {
    pub const ALL: [BaseMetric; 7] = [
        BaseMetric::GoalsFor,
        BaseMetric::GoalsAgainst,
        BaseMetric::XgFor,
        BaseMetric::XgAgainst,
        BaseMetric::ShotsFor,
        BaseMetric::ShotsAgainst,
        BaseMetric::Points,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BaseMetric::GoalsFor => "goals_for",
            BaseMetric::GoalsAgainst => "goals_against",
            BaseMetric::XgFor => "xg_for",
            BaseMetric::XgAgainst => "xg_against",
            BaseMetric::ShotsFor => "shots_for",
            BaseMetric::ShotsAgainst => "shots_against",
            BaseMetric::Points => "points",
        }
    }

    pub fn value(&self, row: &TeamMatchRow) -> f64 {
        match self {
            BaseMetric::GoalsFor => row.goals_for as f64,
            BaseMetric::GoalsAgainst => row.goals_against as f64,
            BaseMetric::XgFor => row.xg_for,
            BaseMetric::XgAgainst => row.xg_against,
            BaseMetric::ShotsFor => row.shots_for as f64,
            BaseMetric::ShotsAgainst => row.shots_against as f64,
            BaseMetric::Points => row.points as f64,
        }
    }
}

pub fn rolling_name(window: usize, metric: BaseMetric) -> String {
    format!("roll{window}_{}", metric.name())
}

pub fn rolling_xg_diff_name(window: usize) -> String {
    format!("roll{window}_xg_diff")
}

pub fn season_total_name(metric: BaseMetric) -> String {
    format!("season_{}_total", metric.name())
}

pub fn season_mean_name(metric: BaseMetric) -> String {
    format!("season_{}_mean", metric.name())
}

pub const SEASON_MATCHES: &str = "season_matches";
pub const SEASON_XG_DIFF: &str = "season_xg_diff";
pub const SEASON_SHOT_QUALITY: &str = "season_shot_quality";
pub const SEASON_CONVERSION_RATE: &str = "season_conversion_rate";
pub const SEASON_PRESSING: &str = "season_pressing";

/// Mean of `metric` over the `window` most recent rows. `rows` must be
/// ordered most recent first. Uses however many rows exist when fewer than
/// `window`; undefined when there are none.
pub fn rolling_mean(rows: &[TeamMatchRow], window: usize, metric: BaseMetric) -> MetricValue {
    let take = window.min(rows.len());
    if take == 0 {
        return None;
    }
    let sum: f64 = rows[..take].iter().map(|r| metric.value(r)).sum();
    Some(sum / take as f64)
}

/// Team features as of `ctx`. Fails with `MissingEntity` when the team has no
/// visible matches.
pub fn team_features(
    store: &TemporalStore,
    team: TeamId,
    ctx: &SimulationContext,
    windows: &WindowSet,
) -> Result<FeatureVector> {
    let rows = store.team_rows_for(team, ctx);
    if rows.is_empty() {
        return Err(EngineError::MissingEntity {
            entity: EntityRef::Team(team),
            as_of: ctx.as_of,
        });
    }
    Ok(team_features_from_rows(team, ctx, &rows, windows))
}

/// Features for every team with a visible match, ordered by team id.
pub fn team_features_for_all(
    store: &TemporalStore,
    ctx: &SimulationContext,
    windows: &WindowSet,
) -> Vec<FeatureVector> {
    let mut by_team: BTreeMap<TeamId, Vec<TeamMatchRow>> = BTreeMap::new();
    // Grouping keeps the recent-first order of `team_rows_as_of`.
    for row in store.team_rows_as_of(ctx) {
        by_team.entry(row.team).or_default().push(row);
    }
    let groups: Vec<(TeamId, Vec<TeamMatchRow>)> = by_team.into_iter().collect();
    let out: Vec<FeatureVector> = groups
        .par_iter()
        .map(|(team, rows)| team_features_from_rows(*team, ctx, rows, windows))
        .collect();
    debug!(as_of = %ctx.as_of, teams = out.len(), "team cohort features computed");
    out
}

/// `rows` are one team's visible matches, most recent first.
pub fn team_features_from_rows(
    team: TeamId,
    ctx: &SimulationContext,
    rows: &[TeamMatchRow],
    windows: &WindowSet,
) -> FeatureVector {
    let mut fv = FeatureVector::new(EntityRef::Team(team), ctx.as_of);
    fv.source_records = rows.len();
    fv.source_max_date = rows.iter().map(|r| r.date).max();

    for &w in windows.sizes() {
        for metric in BaseMetric::ALL {
            fv.set(rolling_name(w, metric), rolling_mean(rows, w, metric));
        }
        let xg_diff = match (
            rolling_mean(rows, w, BaseMetric::XgFor),
            rolling_mean(rows, w, BaseMetric::XgAgainst),
        ) {
            (Some(f), Some(a)) => Some(f - a),
            _ => None,
        };
        fv.set(rolling_xg_diff_name(w), xg_diff);
    }

    let season = rows.first().map(|r| r.season);
    let season_rows: Vec<&TeamMatchRow> = rows
        .iter()
        .filter(|r| Some(r.season) == season)
        .collect();
    let n = season_rows.len();
    fv.set(SEASON_MATCHES, Some(n as f64));

    let mut totals: HashMap<BaseMetric, f64> = HashMap::new();
    for metric in BaseMetric::ALL {
        let total: f64 = season_rows.iter().map(|r| metric.value(r)).sum();
        totals.insert(metric, total);
        fv.set(season_total_name(metric), if n == 0 { None } else { Some(total) });
        fv.set(season_mean_name(metric), mean_of(total, n));
    }

    let xg_for = totals[&BaseMetric::XgFor];
    let xg_against = totals[&BaseMetric::XgAgainst];
    let shots_for = totals[&BaseMetric::ShotsFor];
    let goals_for = totals[&BaseMetric::GoalsFor];
    fv.set(
        SEASON_XG_DIFF,
        mean_of(xg_for, n).zip(mean_of(xg_against, n)).map(|(f, a)| f - a),
    );
    let shot_quality = if n == 0 {
        None
    } else if shots_for <= 0.0 {
        Some(0.0)
    } else {
        Some(xg_for / shots_for)
    };
    fv.set(SEASON_SHOT_QUALITY, shot_quality);
    fv.set(
        SEASON_CONVERSION_RATE,
        if xg_for > 0.0 { Some(goals_for / xg_for) } else { None },
    );

    let pressing: Vec<f64> = season_rows.iter().filter_map(|r| r.pressing).collect();
    fv.set(
        SEASON_PRESSING,
        mean_of(pressing.iter().sum(), pressing.len()),
    );

    fv
}

fn mean_of(total: f64, n: usize) -> MetricValue {
    if n == 0 { None } else { Some(total / n as f64) }
}

/// Counting stats that get per-90 treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStat {
    Goals,
    Assists,
    Xg,
    Xa,
    Shots,
    KeyPasses,
}

impl PlayerStat {
    pub const ALL: [PlayerStat; 6] = [
        PlayerStat::Goals,
        PlayerStat::Assists,
        PlayerStat::Xg,
        PlayerStat::Xa,
        PlayerStat::Shots,
        PlayerStat::KeyPasses,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PlayerStat::Goals => "goals",
            PlayerStat::Assists => "assists",
            PlayerStat::Xg => "xg",
            PlayerStat::Xa => "xa",
            PlayerStat::Shots => "shots",
            PlayerStat::KeyPasses => "key_passes",
        }
    }

    pub fn value(&self, a: &PlayerAppearance) -> f64 {
        match self {
            PlayerStat::Goals => a.goals as f64,
            PlayerStat::Assists => a.assists as f64,
            PlayerStat::Xg => a.xg,
            PlayerStat::Xa => a.xa,
            PlayerStat::Shots => a.shots as f64,
            PlayerStat::KeyPasses => a.key_passes as f64,
        }
    }
}

pub fn per90_name(stat: PlayerStat) -> String {
    format!("{}_per90", stat.name())
}

pub fn season_per90_name(stat: PlayerStat) -> String {
    format!("season_{}_per90", stat.name())
}

pub const MINUTES: &str = "minutes";
pub const APPEARANCES: &str = "appearances";
pub const GOALS_MINUS_XG: &str = "goals_minus_xg";
pub const SHOT_EFFICIENCY: &str = "shot_efficiency";
pub const CLEAN_SHEET_RATE: &str = "clean_sheet_rate";
pub const GOALS_CONCEDED_PER90: &str = "goals_conceded_per90";
pub const XGA_PER90: &str = "xga_per90";
pub const GOALS_PREVENTED_PER90: &str = "goals_prevented_per90";
pub const GOALS_TOTAL: &str = "goals_total";
pub const XG_TOTAL: &str = "xg_total";
/// Shots on target faced minus goals conceded, over matches reporting shots on target.
pub const SAVES_PER90: &str = "saves_per90";
pub const SAVE_RATE: &str = "save_rate";

/// `stat_total * 90 / minutes`, undefined for zero minutes.
pub fn per90(stat_total: f64, minutes: f64) -> MetricValue {
    if minutes > 0.0 {
        Some(stat_total * 90.0 / minutes)
    } else {
        None
    }
}

/// A player's features plus the cohort attributes used for comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerFeatures {
    pub player: PlayerId,
    pub name: String,
    /// Team of the most recent visible appearance.
    pub team: TeamId,
    pub position: PositionGroup,
    pub minutes: u32,
    pub appearances: usize,
    pub vector: FeatureVector,
}

pub fn player_features(
    store: &TemporalStore,
    player: PlayerId,
    ctx: &SimulationContext,
) -> Result<PlayerFeatures> {
    let apps = store.player_appearances(player, ctx);
    if apps.is_empty() {
        return Err(EngineError::MissingEntity {
            entity: EntityRef::Player(player),
            as_of: ctx.as_of,
        });
    }
    Ok(player_features_from(store, player, ctx, &apps))
}

/// Features for every player with a visible appearance, ordered by player id.
pub fn player_features_for_all(store: &TemporalStore, ctx: &SimulationContext) -> Vec<PlayerFeatures> {
    let mut by_player: BTreeMap<PlayerId, Vec<&PlayerAppearance>> = BTreeMap::new();
    for a in store.appearances_as_of(ctx) {
        by_player.entry(a.player).or_default().push(a);
    }
    let groups: Vec<(PlayerId, Vec<&PlayerAppearance>)> = by_player.into_iter().collect();
    let out: Vec<PlayerFeatures> = groups
        .par_iter()
        .map(|(player, apps)| player_features_from(store, *player, ctx, apps))
        .collect();
    debug!(as_of = %ctx.as_of, players = out.len(), "player cohort features computed");
    out
}

/// `apps` are one player's visible appearances in chronological order.
fn player_features_from(
    store: &TemporalStore,
    player: PlayerId,
    ctx: &SimulationContext,
    apps: &[&PlayerAppearance],
) -> PlayerFeatures {
    let mut fv = FeatureVector::new(EntityRef::Player(player), ctx.as_of);
    fv.source_records = apps.len();
    fv.source_max_date = apps.iter().map(|a| a.date).max();

    let latest = apps
        .iter()
        .max_by(|a, b| a.date.cmp(&b.date).then(a.match_id.cmp(&b.match_id)));
    let season = latest.map(|a| a.season);
    let team = latest.map(|a| a.team).unwrap_or(TeamId(0));
    let name = latest.map(|a| a.player_name.clone()).unwrap_or_default();

    let minutes: u32 = apps.iter().map(|a| a.minutes as u32).sum();
    let season_apps: Vec<&PlayerAppearance> = apps
        .iter()
        .copied()
        .filter(|a| Some(a.season) == season)
        .collect();
    let season_minutes: u32 = season_apps.iter().map(|a| a.minutes as u32).sum();

    fv.set(MINUTES, Some(minutes as f64));
    fv.set(APPEARANCES, Some(apps.len() as f64));

    for stat in PlayerStat::ALL {
        let total: f64 = apps.iter().map(|a| stat.value(a)).sum();
        fv.set(per90_name(stat), per90(total, minutes as f64));
        let season_total: f64 = season_apps.iter().map(|a| stat.value(a)).sum();
        fv.set(season_per90_name(stat), per90(season_total, season_minutes as f64));
    }

    let goals: f64 = apps.iter().map(|a| a.goals as f64).sum();
    let xg: f64 = apps.iter().map(|a| a.xg).sum();
    let shots: f64 = apps.iter().map(|a| a.shots as f64).sum();
    fv.set(GOALS_TOTAL, Some(goals));
    fv.set(XG_TOTAL, Some(xg));
    fv.set(GOALS_MINUS_XG, Some(goals - xg));
    fv.set(
        SHOT_EFFICIENCY,
        if shots > 0.0 { Some(goals / shots) } else { None },
    );

    // Defensive context comes from the team's result in matches the player featured in.
    let mut played = 0usize;
    let mut clean_sheets = 0usize;
    let mut conceded = 0.0;
    let mut xga = 0.0;
    let mut on_target_faced: Option<(f64, f64)> = None;
    for a in apps.iter().filter(|a| a.minutes > 0) {
        let Some(row) = store.match_by_id(a.match_id).and_then(|m| m.row_for(a.team)) else {
            continue;
        };
        played += 1;
        if row.goals_against == 0 {
            clean_sheets += 1;
        }
        conceded += row.goals_against as f64;
        xga += row.xg_against;
        if let Some(sot) = row.shots_on_target_against {
            let (faced, let_in) = on_target_faced.get_or_insert((0.0, 0.0));
            *faced += sot as f64;
            *let_in += row.goals_against as f64;
        }
    }
    fv.set(
        CLEAN_SHEET_RATE,
        if played > 0 { Some(clean_sheets as f64 / played as f64) } else { None },
    );
    fv.set(GOALS_CONCEDED_PER90, per90(conceded, minutes as f64));
    fv.set(XGA_PER90, per90(xga, minutes as f64));
    fv.set(GOALS_PREVENTED_PER90, per90(xga - conceded, minutes as f64));
    let saves = on_target_faced.map(|(faced, let_in)| (faced, (faced - let_in).max(0.0)));
    fv.set(
        SAVES_PER90,
        saves.and_then(|(_, saved)| per90(saved, minutes as f64)),
    );
    fv.set(
        SAVE_RATE,
        saves.and_then(|(faced, saved)| if faced > 0.0 { Some(saved / faced) } else { None }),
    );

    PlayerFeatures {
        player,
        name,
        team,
        position: dominant_position(apps),
        minutes,
        appearances: apps.len(),
        vector: fv,
    }
}

/// Position group with the most minutes; ties go to the earlier variant.
fn dominant_position(apps: &[&PlayerAppearance]) -> PositionGroup {
    let mut minutes: HashMap<PositionGroup, u32> = HashMap::new();
    for a in apps {
        *minutes.entry(a.position).or_insert(0) += a.minutes as u32;
    }
    PositionGroup::ALL
        .iter()
        .copied()
        .filter(|p| minutes.contains_key(p))
        .max_by(|a, b| minutes[a].cmp(&minutes[b]).then(b.cmp(a)))
        .or_else(|| apps.last().map(|a| a.position))
        .unwrap_or(PositionGroup::Midfielder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{MatchId, MatchResult, Venue};

    fn row(day: u32, id: u64, goals_for: u8) -> TeamMatchRow {
        TeamMatchRow {
            match_id: MatchId(id),
            date: NaiveDate::from_ymd_opt(2024, 8, day).unwrap(),
            season: 2024,
            team: TeamId(1),
            opponent: TeamId(2),
            venue: Venue::Home,
            goals_for,
            goals_against: 0,
            xg_for: 1.0,
            xg_against: 0.5,
            shots_for: 10,
            shots_against: 5,
            shots_on_target_for: None,
            shots_on_target_against: None,
            pressing: None,
            result: MatchResult::Win,
            points: 3,
        }
    }

    #[test]
    fn rolling_mean_uses_available_rows() {
        let rows = vec![row(20, 3, 3), row(13, 2, 1)];
        assert_eq!(rolling_mean(&rows, 5, BaseMetric::GoalsFor), Some(2.0));
        assert_eq!(rolling_mean(&rows, 1, BaseMetric::GoalsFor), Some(3.0));
        assert_eq!(rolling_mean(&[], 3, BaseMetric::GoalsFor), None);
    }

    #[test]
    fn per90_is_undefined_without_minutes() {
        assert_eq!(per90(2.0, 0.0), None);
        assert_eq!(per90(1.0, 45.0), Some(2.0));
    }

    #[test]
    fn window_set_is_canonical() {
        let w = WindowSet::new(&[10, 3, 0, 5, 3]);
        assert_eq!(w.sizes(), &[3, 5, 10]);
        assert_eq!(w.largest(), Some(10));
    }

    #[test]
    fn non_finite_values_are_stored_as_undefined() {
        let mut fv = FeatureVector::new(EntityRef::Team(TeamId(1)), NaiveDate::from_ymd_opt(2024, 8, 1).unwrap());
        fv.set("x", Some(f64::NAN));
        assert!(fv.metrics.contains_key("x"));
        assert_eq!(fv.get("x"), None);
    }
}
