//! Immutable record store with date-bounded views.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::SimulationContext;
use crate::error::{EngineError, Result};
use crate::records::{
    MatchId, MatchRecord, PlayerAppearance, PlayerId, TeamId, TeamMatchRow, MAX_MINUTES,
};

/// Whether a record dated exactly on the as-of date is visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CutoffMode {
    /// Only records strictly before the as-of date.
    #[default]
    Exclusive,
    /// Records on or before the as-of date.
    Inclusive,
}

impl CutoffMode {
    pub fn admits(&self, record_date: NaiveDate, as_of: NaiveDate) -> bool {
        match self {
            CutoffMode::Exclusive => record_date < as_of,
            CutoffMode::Inclusive => record_date <= as_of,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchweek {
    pub number: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub matches: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TemporalStore {
    // Sorted by (date, id).
    matches: Vec<MatchRecord>,
    by_id: HashMap<MatchId, usize>,
    // Sorted by (date, match id, player).
    appearances: Vec<PlayerAppearance>,
}

impl TemporalStore {
    pub fn new(mut matches: Vec<MatchRecord>, mut appearances: Vec<PlayerAppearance>) -> Result<Self> {
        matches.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

        let mut by_id = HashMap::with_capacity(matches.len());
        for (idx, m) in matches.iter().enumerate() {
            if m.home_team == m.away_team {
                return Err(EngineError::InvalidRecord(format!(
                    "{} has {} on both sides",
                    m.id, m.home_team
                )));
            }
            if !(m.home_xg.is_finite() && m.away_xg.is_finite()) || m.home_xg < 0.0 || m.away_xg < 0.0 {
                return Err(EngineError::InvalidRecord(format!("{} has invalid xG", m.id)));
            }
            if by_id.insert(m.id, idx).is_some() {
                return Err(EngineError::InvalidRecord(format!("duplicate {}", m.id)));
            }
        }

        for a in &appearances {
            if a.minutes > MAX_MINUTES {
                return Err(EngineError::InvalidRecord(format!(
                    "{} in {} played {} minutes (max {MAX_MINUTES})",
                    a.player, a.match_id, a.minutes
                )));
            }
            let Some(m) = by_id.get(&a.match_id).map(|&i| &matches[i]) else {
                return Err(EngineError::InvalidRecord(format!(
                    "{} references unknown {}",
                    a.player, a.match_id
                )));
            };
            if m.date != a.date {
                return Err(EngineError::InvalidRecord(format!(
                    "{} in {} dated {} but match dated {}",
                    a.player, a.match_id, a.date, m.date
                )));
            }
            if !m.involves(a.team) {
                return Err(EngineError::InvalidRecord(format!(
                    "{} listed for {} which did not play in {}",
                    a.player, a.team, a.match_id
                )));
            }
        }
        appearances.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.match_id.cmp(&b.match_id))
                .then(a.player.cmp(&b.player))
        });

        debug!(
            matches = matches.len(),
            appearances = appearances.len(),
            "temporal store loaded"
        );
        Ok(Self {
            matches,
            by_id,
            appearances,
        })
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn appearance_count(&self) -> usize {
        self.appearances.len()
    }

    pub fn match_by_id(&self, id: MatchId) -> Option<&MatchRecord> {
        self.by_id.get(&id).map(|&i| &self.matches[i])
    }

    /// Earliest and latest record dates across the store.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.matches.first()?.date;
        let last = self.matches.last()?.date;
        Some((first, last))
    }

    /// Matches visible at `ctx`. Empty when the date precedes every record.
    pub fn records_as_of(&self, ctx: &SimulationContext) -> &[MatchRecord] {
        let end = self
            .matches
            .partition_point(|m| ctx.cutoff.admits(m.date, ctx.as_of));
        &self.matches[..end]
    }

    /// Appearances belonging to matches visible at `ctx`.
    pub fn appearances_as_of(&self, ctx: &SimulationContext) -> Vec<&PlayerAppearance> {
        let end = self
            .appearances
            .partition_point(|a| ctx.cutoff.admits(a.date, ctx.as_of));
        self.appearances[..end]
            .iter()
            .filter(|a| {
                self.match_by_id(a.match_id)
                    .is_some_and(|m| ctx.cutoff.admits(m.date, ctx.as_of))
            })
            .collect()
    }

    /// Mirrored team rows of every visible match, most recent first (ties by match id).
    pub fn team_rows_as_of(&self, ctx: &SimulationContext) -> Vec<TeamMatchRow> {
        let mut rows: Vec<TeamMatchRow> = self
            .records_as_of(ctx)
            .iter()
            .flat_map(|m| m.team_rows())
            .collect();
        sort_recent_first(&mut rows);
        rows
    }

    /// One team's visible rows, most recent first (ties by match id).
    pub fn team_rows_for(&self, team: TeamId, ctx: &SimulationContext) -> Vec<TeamMatchRow> {
        let mut rows: Vec<TeamMatchRow> = self
            .records_as_of(ctx)
            .iter()
            .filter_map(|m| m.row_for(team))
            .collect();
        sort_recent_first(&mut rows);
        rows
    }

    /// One player's visible appearances, oldest first.
    pub fn player_appearances(&self, player: PlayerId, ctx: &SimulationContext) -> Vec<&PlayerAppearance> {
        self.appearances_as_of(ctx)
            .into_iter()
            .filter(|a| a.player == player)
            .collect()
    }

    pub fn seasons_as_of(&self, ctx: &SimulationContext) -> Vec<u16> {
        let seasons: BTreeSet<u16> = self.records_as_of(ctx).iter().map(|m| m.season).collect();
        seasons.into_iter().collect()
    }

    pub fn teams_as_of(&self, ctx: &SimulationContext, season: Option<u16>) -> Vec<TeamId> {
        let mut teams = BTreeSet::new();
        for m in self.records_as_of(ctx) {
            if season.is_some_and(|s| s != m.season) {
                continue;
            }
            teams.insert(m.home_team);
            teams.insert(m.away_team);
        }
        teams.into_iter().collect()
    }

    pub fn players_as_of(&self, ctx: &SimulationContext) -> Vec<PlayerId> {
        let players: BTreeSet<PlayerId> = self
            .appearances_as_of(ctx)
            .into_iter()
            .map(|a| a.player)
            .collect();
        players.into_iter().collect()
    }

    /// Seven-day buckets counted from the season's first match. Covers the whole
    /// loaded schedule: only dates are exposed, never outcomes.
    pub fn matchweeks(&self, season: u16) -> Vec<Matchweek> {
        let season_matches: Vec<&MatchRecord> =
            self.matches.iter().filter(|m| m.season == season).collect();
        let Some(first) = season_matches.first().map(|m| m.date) else {
            return Vec::new();
        };
        let mut weeks: BTreeMap<i64, Matchweek> = BTreeMap::new();
        for m in season_matches {
            let week = (m.date - first).num_days() / 7;
            let entry = weeks.entry(week).or_insert(Matchweek {
                number: 0,
                start: m.date,
                end: m.date,
                matches: 0,
            });
            entry.start = entry.start.min(m.date);
            entry.end = entry.end.max(m.date);
            entry.matches += 1;
        }
        weeks
            .into_values()
            .enumerate()
            .map(|(i, mut w)| {
                w.number = i + 1;
                w
            })
            .collect()
    }
}

fn sort_recent_first(rows: &mut [TeamMatchRow]) {
    rows.sort_by(|a, b| b.date.cmp(&a.date).then(a.match_id.cmp(&b.match_id)));
}

/// Parse `YYYY-MM-DD`, tolerating a trailing time component.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    let day = match s.char_indices().nth(10) {
        Some((idx, c)) if c == ' ' || c == 'T' => &s[..idx],
        _ => s,
    };
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| EngineError::InvalidDate(raw.to_string()))
}
