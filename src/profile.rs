//! Recent-form profile of a single team, for match preparation.

use serde::{Deserialize, Serialize};

use crate::controller::SimulationContext;
use crate::error::{EngineError, Result};
use crate::records::{EntityRef, MatchResult, TeamId, TeamMatchRow, Venue};
use crate::rolling::MetricValue;
use crate::store::TemporalStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    pub team: TeamId,
    pub matches_analyzed: usize,
    pub first_date: chrono::NaiveDate,
    pub last_date: chrono::NaiveDate,
    pub form: FormSummary,
    pub attack: AttackSummary,
    pub defense: DefenseSummary,
    pub pressing: MetricValue,
    pub home_ppg: MetricValue,
    pub away_ppg: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSummary {
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub ppg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackSummary {
    pub goals_per_game: f64,
    pub xg_per_game: f64,
    pub shots_per_game: f64,
    /// xG per shot; 0 when no shots were taken.
    pub shot_quality: f64,
    /// Shots on target / shots, over matches that reported shots on target.
    pub shot_accuracy: MetricValue,
    pub goals_minus_xg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseSummary {
    pub conceded_per_game: f64,
    pub xga_per_game: f64,
    pub shots_against_per_game: f64,
    pub clean_sheets: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrengthsWeaknesses {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

pub fn team_profile(
    store: &TemporalStore,
    team: TeamId,
    ctx: &SimulationContext,
    last_n: usize,
) -> Result<TeamProfile> {
    let rows = store.team_rows_for(team, ctx);
    let recent: Vec<&TeamMatchRow> = rows.iter().take(last_n.max(1)).collect();
    let (Some(last), Some(first)) = (recent.first(), recent.last()) else {
        return Err(EngineError::MissingEntity {
            entity: EntityRef::Team(team),
            as_of: ctx.as_of,
        });
    };
    let n = recent.len() as f64;
    let avg = |f: fn(&TeamMatchRow) -> f64| recent.iter().map(|r| f(r)).sum::<f64>() / n;

    let count = |res: MatchResult| recent.iter().filter(|r| r.result == res).count();
    let form = FormSummary {
        wins: count(MatchResult::Win),
        draws: count(MatchResult::Draw),
        losses: count(MatchResult::Loss),
        ppg: avg(|r| r.points as f64),
    };

    let (sot, shots_with_sot) = recent
        .iter()
        .filter_map(|r| r.shots_on_target_for.map(|s| (s as f64, r.shots_for as f64)))
        .fold((0.0, 0.0), |(a, b), (s, t)| (a + s, b + t));
    let total_xg: f64 = recent.iter().map(|r| r.xg_for).sum();
    let total_shots: f64 = recent.iter().map(|r| r.shots_for as f64).sum();
    let attack = AttackSummary {
        goals_per_game: avg(|r| r.goals_for as f64),
        xg_per_game: avg(|r| r.xg_for),
        shots_per_game: avg(|r| r.shots_for as f64),
        shot_quality: if total_shots > 0.0 { total_xg / total_shots } else { 0.0 },
        shot_accuracy: if shots_with_sot > 0.0 { Some(sot / shots_with_sot) } else { None },
        goals_minus_xg: avg(|r| r.goals_for as f64 - r.xg_for),
    };

    let defense = DefenseSummary {
        conceded_per_game: avg(|r| r.goals_against as f64),
        xga_per_game: avg(|r| r.xg_against),
        shots_against_per_game: avg(|r| r.shots_against as f64),
        clean_sheets: recent.iter().filter(|r| r.goals_against == 0).count(),
    };

    let pressing: Vec<f64> = recent.iter().filter_map(|r| r.pressing).collect();
    let venue_ppg = |venue: Venue| {
        let pts: Vec<f64> = recent
            .iter()
            .filter(|r| r.venue == venue)
            .map(|r| r.points as f64)
            .collect();
        if pts.is_empty() {
            None
        } else {
            Some(pts.iter().sum::<f64>() / pts.len() as f64)
        }
    };

    Ok(TeamProfile {
        team,
        matches_analyzed: recent.len(),
        first_date: first.date,
        last_date: last.date,
        form,
        attack,
        defense,
        pressing: if pressing.is_empty() {
            None
        } else {
            Some(pressing.iter().sum::<f64>() / pressing.len() as f64)
        },
        home_ppg: venue_ppg(Venue::Home),
        away_ppg: venue_ppg(Venue::Away),
    })
}

pub fn strengths_and_weaknesses(profile: &TeamProfile) -> StrengthsWeaknesses {
    let mut out = StrengthsWeaknesses::default();
    let a = &profile.attack;
    let d = &profile.defense;

    if a.goals_per_game > 1.5 {
        out.strengths.push(format!("Strong attack ({:.1} goals/game)", a.goals_per_game));
    } else if a.goals_per_game < 1.0 {
        out.weaknesses.push(format!("Weak attack ({:.1} goals/game)", a.goals_per_game));
    }

    if let Some(acc) = a.shot_accuracy {
        if acc > 0.40 {
            out.strengths.push(format!("High shot accuracy ({:.0}%)", acc * 100.0));
        } else if acc < 0.30 {
            out.weaknesses.push(format!("Low shot accuracy ({:.0}%)", acc * 100.0));
        }
    }

    if d.conceded_per_game < 1.0 {
        out.strengths.push(format!("Solid defense ({:.1} conceded/game)", d.conceded_per_game));
    } else if d.conceded_per_game > 1.5 {
        out.weaknesses.push(format!("Vulnerable defense ({:.1} conceded/game)", d.conceded_per_game));
    }

    if d.clean_sheets >= 3 {
        out.strengths.push(format!(
            "Good at keeping clean sheets ({} in last {})",
            d.clean_sheets, profile.matches_analyzed
        ));
    }

    if profile.form.ppg >= 2.0 {
        out.strengths.push(format!("Excellent form ({:.2} PPG)", profile.form.ppg));
    } else if profile.form.ppg < 1.0 {
        out.weaknesses.push(format!("Poor form ({:.2} PPG)", profile.form.ppg));
    }

    if a.goals_minus_xg > 0.2 {
        out.strengths.push(format!("Overperforming xG (+{:.1})", a.goals_minus_xg));
    } else if a.goals_minus_xg < -0.2 {
        out.weaknesses.push(format!("Underperforming xG ({:.1})", a.goals_minus_xg));
    }

    out
}

/// Opponent concedes more than this per game: attack them.
const LEAKY_DEFENSE: f64 = 1.3;
/// Pressing proxy below this reads as a deep, passive block.
const LOW_PRESSING: f64 = 0.08;
const DANGEROUS_ATTACK: f64 = 1.5;
const HIGH_CHANCE_QUALITY: f64 = 0.15;
const POOR_FORM_PPG: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanArea {
    Attack,
    BuildUp,
    Defense,
    StyleMatchup,
    Form,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub area: PlanArea,
    pub insight: String,
    pub recommendation: String,
}

/// One side's xG output against the other side's xG allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub own: f64,
    pub opponent: f64,
    pub advantage: TeamId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePlan {
    pub own: TeamProfile,
    pub opponent: TeamProfile,
    pub own_notes: StrengthsWeaknesses,
    pub opponent_notes: StrengthsWeaknesses,
    pub recommendations: Vec<Recommendation>,
    /// Own xG per game against the opponent's xGA per game.
    pub attack_vs_defense: Matchup,
    /// Own xGA per game against the opponent's xG per game.
    pub defense_vs_attack: Matchup,
}

/// Recommendations for facing `opponent`, built from both teams' profiles at
/// the same date.
pub fn game_plan(own: TeamProfile, opponent: TeamProfile) -> GamePlan {
    let mut recs = Vec::new();
    let mut push = |area, insight: String, recommendation: &str| {
        recs.push(Recommendation {
            area,
            insight,
            recommendation: recommendation.to_string(),
        })
    };

    let opp_conceded = opponent.defense.conceded_per_game;
    if opp_conceded > LEAKY_DEFENSE {
        push(
            PlanArea::Attack,
            format!("Opponent concedes {opp_conceded:.1} goals/game"),
            "Press high and attack with intensity. Exploit defensive vulnerabilities.",
        );
    }
    if opponent.pressing.is_some_and(|p| p < LOW_PRESSING) {
        push(
            PlanArea::BuildUp,
            "Opponent sits deep with low pressing".to_string(),
            "Patient build-up play. Use possession to draw them out.",
        );
    }
    let opp_scored = opponent.attack.goals_per_game;
    if opp_scored > DANGEROUS_ATTACK {
        push(
            PlanArea::Defense,
            format!("Opponent scores {opp_scored:.1} goals/game"),
            "Stay compact defensively. Avoid leaving spaces in behind.",
        );
    }
    if opponent.attack.shot_quality > HIGH_CHANCE_QUALITY {
        push(
            PlanArea::Defense,
            "Opponent creates high-quality chances".to_string(),
            "Block passing lanes to prevent dangerous chances.",
        );
    }
    if let (Some(mine), Some(theirs)) = (own.pressing, opponent.pressing) {
        if mine > theirs {
            push(
                PlanArea::StyleMatchup,
                "You have higher pressing intensity".to_string(),
                "Use your pressing advantage to force errors and win the ball high.",
            );
        }
    }
    let opp_ppg = opponent.form.ppg;
    if opp_ppg < POOR_FORM_PPG {
        push(
            PlanArea::Form,
            format!("Opponent in poor form ({opp_ppg:.2} PPG)"),
            "Take advantage of low confidence. Play with aggression.",
        );
    }

    let attack_vs_defense = Matchup {
        own: own.attack.xg_per_game,
        opponent: opponent.defense.xga_per_game,
        advantage: if own.attack.xg_per_game > opponent.defense.xga_per_game {
            own.team
        } else {
            opponent.team
        },
    };
    let defense_vs_attack = Matchup {
        own: own.defense.xga_per_game,
        opponent: opponent.attack.xg_per_game,
        advantage: if own.defense.xga_per_game < opponent.attack.xg_per_game {
            own.team
        } else {
            opponent.team
        },
    };

    GamePlan {
        own_notes: strengths_and_weaknesses(&own),
        opponent_notes: strengths_and_weaknesses(&opponent),
        own,
        opponent,
        recommendations: recs,
        attack_vs_defense,
        defense_vs_attack,
    }
}

/// Visible meetings between `team` and `opponent`, oldest first, from
/// `team`'s side.
pub fn head_to_head(
    store: &TemporalStore,
    team: TeamId,
    opponent: TeamId,
    ctx: &SimulationContext,
) -> Vec<TeamMatchRow> {
    let mut rows: Vec<TeamMatchRow> = store
        .team_rows_for(team, ctx)
        .into_iter()
        .filter(|r| r.opponent == opponent)
        .collect();
    rows.reverse();
    rows
}
