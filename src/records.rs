//! Typed raw records and the per-team projection of a match.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Match({})", self.0)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team({})", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player({})", self.0)
    }
}

/// Subject of a feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Team(TeamId),
    Player(PlayerId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Team(id) => id.fmt(f),
            EntityRef::Player(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PositionGroup {
    Forward,
    Midfielder,
    Defender,
    Goalkeeper,
}

impl PositionGroup {
    pub const ALL: [PositionGroup; 4] = [
        PositionGroup::Forward,
        PositionGroup::Midfielder,
        PositionGroup::Defender,
        PositionGroup::Goalkeeper,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PositionGroup::Forward => "Forward",
            PositionGroup::Midfielder => "Midfielder",
            PositionGroup::Defender => "Defender",
            PositionGroup::Goalkeeper => "Goalkeeper",
        }
    }
}

impl fmt::Display for PositionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a provider position string ("GK", "D C", "AM R", "Forward", ...) onto a group.
/// Anything unrecognised is treated as a midfielder.
pub fn position_group_from_text(raw: &str) -> PositionGroup {
    let s = raw.trim().to_ascii_uppercase();
    if s.contains("GK") || s.contains("GOALKEEPER") || s.contains("KEEPER") {
        return PositionGroup::Goalkeeper;
    }
    if s.contains("FORWARD") || s.contains("STRIKER") || s.contains("ATTACKER") {
        return PositionGroup::Forward;
    }
    if s.contains("MIDFIELD") {
        return PositionGroup::Midfielder;
    }
    if s.contains("DEFENDER") || s.contains("BACK") {
        return PositionGroup::Defender;
    }
    let tokens: Vec<&str> = s.split(|c: char| !c.is_ascii_alphanumeric()).collect();
    let has = |needle: &str| tokens.iter().any(|t| *t == needle);
    if has("FW") || has("ST") || has("CF") || has("F") {
        return PositionGroup::Forward;
    }
    if has("MF") || has("AM") || has("DM") || has("M") || has("DMC") || has("AMC") {
        return PositionGroup::Midfielder;
    }
    if has("DF") || has("CB") || has("FB") || has("WB") || has("D") || has("DC") {
        return PositionGroup::Defender;
    }
    PositionGroup::Midfielder
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Win,
    Draw,
    Loss,
}

impl MatchResult {
    pub fn points(&self) -> u8 {
        match self {
            MatchResult::Win => 3,
            MatchResult::Draw => 1,
            MatchResult::Loss => 0,
        }
    }
}

/// A finished match. Immutable once loaded into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub date: NaiveDate,
    pub season: u16,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_goals: u8,
    pub away_goals: u8,
    pub home_xg: f64,
    pub away_xg: f64,
    pub home_shots: u16,
    pub away_shots: u16,
    pub home_shots_on_target: Option<u16>,
    pub away_shots_on_target: Option<u16>,
    pub home_pressing: Option<f64>,
    pub away_pressing: Option<f64>,
}

impl MatchRecord {
    pub fn involves(&self, team: TeamId) -> bool {
        self.home_team == team || self.away_team == team
    }

    /// Both venue perspectives of this match, home first.
    pub fn team_rows(&self) -> [TeamMatchRow; 2] {
        [self.project(Venue::Home), self.project(Venue::Away)]
    }

    /// Row from `team`'s perspective, or None if it did not play.
    pub fn row_for(&self, team: TeamId) -> Option<TeamMatchRow> {
        if team == self.home_team {
            Some(self.project(Venue::Home))
        } else if team == self.away_team {
            Some(self.project(Venue::Away))
        } else {
            None
        }
    }

    fn project(&self, venue: Venue) -> TeamMatchRow {
        let (team, opponent, gf, ga, xf, xa, sf, sa, sot, sot_against, pressing) = match venue {
            Venue::Home => (
                self.home_team,
                self.away_team,
                self.home_goals,
                self.away_goals,
                self.home_xg,
                self.away_xg,
                self.home_shots,
                self.away_shots,
                self.home_shots_on_target,
                self.away_shots_on_target,
                self.home_pressing,
            ),
            Venue::Away => (
                self.away_team,
                self.home_team,
                self.away_goals,
                self.home_goals,
                self.away_xg,
                self.home_xg,
                self.away_shots,
                self.home_shots,
                self.away_shots_on_target,
                self.home_shots_on_target,
                self.away_pressing,
            ),
        };
        let result = match gf.cmp(&ga) {
            std::cmp::Ordering::Greater => MatchResult::Win,
            std::cmp::Ordering::Less => MatchResult::Loss,
            std::cmp::Ordering::Equal => MatchResult::Draw,
        };
        TeamMatchRow {
            match_id: self.id,
            date: self.date,
            season: self.season,
            team,
            opponent,
            venue,
            goals_for: gf,
            goals_against: ga,
            xg_for: xf,
            xg_against: xa,
            shots_for: sf,
            shots_against: sa,
            shots_on_target_for: sot,
            shots_on_target_against: sot_against,
            pressing,
            result,
            points: result.points(),
        }
    }
}

/// One team's view of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMatchRow {
    pub match_id: MatchId,
    pub date: NaiveDate,
    pub season: u16,
    pub team: TeamId,
    pub opponent: TeamId,
    pub venue: Venue,
    pub goals_for: u8,
    pub goals_against: u8,
    pub xg_for: f64,
    pub xg_against: f64,
    pub shots_for: u16,
    pub shots_against: u16,
    pub shots_on_target_for: Option<u16>,
    pub shots_on_target_against: Option<u16>,
    pub pressing: Option<f64>,
    pub result: MatchResult,
    pub points: u8,
}

/// A single player's involvement in one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAppearance {
    pub player: PlayerId,
    pub player_name: String,
    pub team: TeamId,
    pub match_id: MatchId,
    pub date: NaiveDate,
    pub season: u16,
    pub minutes: u8,
    pub position: PositionGroup,
    pub goals: u8,
    pub assists: u8,
    pub xg: f64,
    pub xa: f64,
    pub shots: u8,
    pub key_passes: u8,
}

pub const MAX_MINUTES: u8 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_strings_map_to_groups() {
        assert_eq!(position_group_from_text("GK"), PositionGroup::Goalkeeper);
        assert_eq!(position_group_from_text("D C"), PositionGroup::Defender);
        assert_eq!(position_group_from_text("AM R"), PositionGroup::Midfielder);
        assert_eq!(position_group_from_text("FW"), PositionGroup::Forward);
        assert_eq!(position_group_from_text("Centre-Back"), PositionGroup::Defender);
        assert_eq!(position_group_from_text("Sub"), PositionGroup::Midfielder);
    }

    #[test]
    fn draw_awards_one_point_each() {
        let m = MatchRecord {
            id: MatchId(1),
            date: NaiveDate::from_ymd_opt(2024, 8, 10).unwrap(),
            season: 2024,
            home_team: TeamId(1),
            away_team: TeamId(2),
            home_goals: 1,
            away_goals: 1,
            home_xg: 0.8,
            away_xg: 1.4,
            home_shots: 9,
            away_shots: 12,
            home_shots_on_target: None,
            away_shots_on_target: None,
            home_pressing: None,
            away_pressing: None,
        };
        let [home, away] = m.team_rows();
        assert_eq!(home.points, 1);
        assert_eq!(away.points, 1);
        assert_eq!(home.venue, Venue::Home);
        assert_eq!(away.opponent, TeamId(1));
    }
}
