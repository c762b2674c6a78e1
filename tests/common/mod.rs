#![allow(dead_code)]

use chrono::{Duration, NaiveDate};

use asof_scout::{
    Engine, EngineConfig, MatchId, MatchRecord, PlayerAppearance, PlayerId, PositionGroup, TeamId,
    TemporalStore,
};

pub const TEAMS: u32 = 10;
pub const BENCH_PLAYER: PlayerId = PlayerId(15);
pub const CAMEO_PLAYER: PlayerId = PlayerId(16);

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid calendar date")
}

pub fn league_start() -> NaiveDate {
    day(2024, 8, 10)
}

pub fn round_date(round: usize) -> NaiveDate {
    league_start() + Duration::days(7 * round as i64)
}

pub fn simple_match(id: u64, date: NaiveDate, home: u32, away: u32, goals: (u8, u8), xg: (f64, f64)) -> MatchRecord {
    MatchRecord {
        id: MatchId(id),
        date,
        season: 2024,
        home_team: TeamId(home),
        away_team: TeamId(away),
        home_goals: goals.0,
        away_goals: goals.1,
        home_xg: xg.0,
        away_xg: xg.1,
        home_shots: 10,
        away_shots: 8,
        home_shots_on_target: None,
        away_shots_on_target: None,
        home_pressing: None,
        away_pressing: None,
    }
}

/// Circle-method pairings: every team plays once per round.
fn round_pairs(round: usize) -> Vec<(u32, u32)> {
    let mut others: Vec<u32> = (2..=TEAMS).collect();
    let len = others.len();
    others.rotate_left(round % len);
    let mut ring = vec![1];
    ring.extend(others);
    let n = ring.len();
    (0..n / 2)
        .map(|i| {
            if round % 2 == 0 {
                (ring[i], ring[n - 1 - i])
            } else {
                (ring[n - 1 - i], ring[i])
            }
        })
        .collect()
}

fn league_match(id: u64, round: usize, home: u32, away: u32) -> MatchRecord {
    let r = round as u32;
    MatchRecord {
        id: MatchId(id),
        date: round_date(round),
        season: 2024,
        home_team: TeamId(home),
        away_team: TeamId(away),
        home_goals: ((home * 3 + away + r) % 4) as u8,
        away_goals: ((away * 2 + home + r) % 3) as u8,
        home_xg: 0.4 + 0.15 * home as f64 + 0.05 * r as f64,
        away_xg: 0.3 + 0.12 * away as f64,
        home_shots: 6 + home as u16,
        away_shots: 5 + away as u16,
        home_shots_on_target: Some(2 + (home % 4) as u16),
        away_shots_on_target: Some(1 + (away % 3) as u16),
        home_pressing: Some(8.0 + 0.5 * home as f64),
        away_pressing: Some(9.0 + 0.3 * away as f64),
    }
}

fn appearance(
    player: u32,
    name: &str,
    m: &MatchRecord,
    team: u32,
    minutes: u8,
    position: PositionGroup,
    round: usize,
) -> PlayerAppearance {
    let t = team as usize;
    let (goals, assists, xg, xa, shots, key_passes) = match position {
        PositionGroup::Forward => (
            ((t + round) % 3) as u8,
            ((t * round) % 2) as u8,
            0.2 + 0.05 * t as f64 + 0.1 * (round % 2) as f64,
            0.05 * t as f64 + 0.02 * round as f64,
            (1 + (t + round) % 5) as u8,
            (1 + t % 4) as u8,
        ),
        PositionGroup::Midfielder => (
            ((t + round) % 2) as u8,
            ((t + 2 * round) % 3) as u8,
            0.1 + 0.02 * t as f64,
            0.1 + 0.04 * t as f64 + 0.01 * round as f64,
            (t % 3) as u8,
            (2 + (t + round) % 4) as u8,
        ),
        PositionGroup::Defender => (
            0,
            ((t + round) % 4 == 0) as u8,
            0.02 * t as f64,
            0.03 * (t % 3) as f64,
            (t % 2) as u8,
            ((t + round) % 3) as u8,
        ),
        PositionGroup::Goalkeeper => (0, 0, 0.0, 0.0, 0, 0),
    };
    PlayerAppearance {
        player: PlayerId(player),
        player_name: name.to_string(),
        team: TeamId(team),
        match_id: m.id,
        date: m.date,
        season: m.season,
        minutes,
        position,
        goals: if minutes == 0 { 0 } else { goals },
        assists: if minutes == 0 { 0 } else { assists },
        xg: if minutes == 0 { 0.0 } else { xg },
        xa: if minutes == 0 { 0.0 } else { xa },
        shots: if minutes == 0 { 0 } else { shots },
        key_passes: if minutes == 0 { 0 } else { key_passes },
    }
}

/// Ten teams playing `rounds` weekly rounds from 2024-08-10. Each team fields
/// a forward (id `t*10+1`), midfielder (`+2`), defender (`+3`) and goalkeeper
/// (`+4`) for 90 minutes; team 1 also has an unused substitute
/// ([`BENCH_PLAYER`]) and a 20-minute forward ([`CAMEO_PLAYER`]).
pub fn league(rounds: usize) -> (Vec<MatchRecord>, Vec<PlayerAppearance>) {
    let mut matches = Vec::new();
    let mut apps = Vec::new();
    for round in 0..rounds {
        for (i, (home, away)) in round_pairs(round).into_iter().enumerate() {
            let m = league_match((round * 100 + i + 1) as u64, round, home, away);
            for team in [home, away] {
                let base = team * 10;
                for (offset, pos) in [
                    (1, PositionGroup::Forward),
                    (2, PositionGroup::Midfielder),
                    (3, PositionGroup::Defender),
                    (4, PositionGroup::Goalkeeper),
                ] {
                    let name = format!("{pos} {team}");
                    apps.push(appearance(base + offset, &name, &m, team, 90, pos, round));
                }
                if team == 1 {
                    apps.push(appearance(BENCH_PLAYER.0, "Bench", &m, team, 0, PositionGroup::Forward, round));
                    apps.push(appearance(CAMEO_PLAYER.0, "Cameo", &m, team, 20, PositionGroup::Forward, round));
                }
            }
            matches.push(m);
        }
    }
    (matches, apps)
}

pub fn league_store(rounds: usize) -> TemporalStore {
    let (matches, apps) = league(rounds);
    TemporalStore::new(matches, apps).expect("league fixture is valid")
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        similarity_min_minutes: 300,
        ..EngineConfig::default()
    }
}

pub fn league_engine(rounds: usize) -> Engine {
    Engine::new(league_store(rounds), test_config())
}
