use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use asof_scout::clustering::ClusterReport;
use asof_scout::controller::{LeakageReport, SessionInfo};
use asof_scout::profile::{StrengthsWeaknesses, TeamProfile};
use asof_scout::records::position_group_from_text;
use asof_scout::similarity::SimilarPlayer;
use asof_scout::store::parse_date;
use asof_scout::{
    Engine, EngineConfig, MatchId, MatchRecord, PlayerAppearance, PlayerId, Session, TeamId,
    TemporalStore,
};

#[derive(Debug, Deserialize)]
struct MatchRow {
    match_id: u64,
    date: String,
    season: u16,
    home_team: u32,
    away_team: u32,
    home_goals: u8,
    away_goals: u8,
    home_xg: f64,
    away_xg: f64,
    home_shots: u16,
    away_shots: u16,
    #[serde(default)]
    home_shots_on_target: Option<u16>,
    #[serde(default)]
    away_shots_on_target: Option<u16>,
    #[serde(default)]
    home_pressing: Option<f64>,
    #[serde(default)]
    away_pressing: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AppearanceRow {
    player_id: u32,
    player_name: String,
    team_id: u32,
    match_id: u64,
    date: String,
    season: u16,
    minutes: u8,
    position: String,
    goals: u8,
    assists: u8,
    xg: f64,
    xa: f64,
    shots: u8,
    key_passes: u8,
}

#[derive(Debug, Serialize)]
struct Snapshot {
    info: SessionInfo,
    clusters: ClusterReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    team: Option<TeamSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    similar: Option<Vec<SimilarPlayer>>,
    leakage: LeakageReport,
}

#[derive(Debug, Serialize)]
struct TeamSnapshot {
    profile: TeamProfile,
    notes: StrengthsWeaknesses,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let matches_path = arg_value(&args, "matches")
        .map(PathBuf::from)
        .context("missing --matches <csv>")?;
    let appearances_path = arg_value(&args, "appearances").map(PathBuf::from);
    let Some(date) = arg_value(&args, "date") else {
        bail!("missing --date YYYY-MM-DD");
    };
    let k = arg_value(&args, "k")
        .map(|v| v.parse::<usize>())
        .transpose()
        .context("--k must be a positive integer")?;
    let team = arg_value(&args, "team")
        .map(|v| v.parse::<u32>().map(TeamId))
        .transpose()
        .context("--team must be a numeric id")?;
    let player = arg_value(&args, "player")
        .map(|v| v.parse::<u32>().map(PlayerId))
        .transpose()
        .context("--player must be a numeric id")?;

    let matches = load_matches(&matches_path)?;
    let appearances = match appearances_path.as_deref() {
        Some(path) => load_appearances(path)?,
        None => Vec::new(),
    };
    let store = TemporalStore::new(matches, appearances).context("invalid input records")?;
    info!(
        matches = store.match_count(),
        appearances = store.appearance_count(),
        "records loaded"
    );

    let mut session = Session::new(Engine::new(store, EngineConfig::from_env()));
    session.set_date_str(&date)?;

    let clusters = session.team_clusters(k)?;
    let team = match team {
        Some(team) => {
            let profile = session.team_profile(team)?;
            let notes = asof_scout::profile::strengths_and_weaknesses(&profile);
            Some(TeamSnapshot { profile, notes })
        }
        None => None,
    };
    let similar = player
        .map(|player| session.find_similar_players(player, None))
        .transpose()?;

    let snapshot = Snapshot {
        info: session.info()?,
        clusters,
        team,
        similar,
        leakage: session.validate_no_leakage()?,
    };
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn load_matches(path: &Path) -> Result<Vec<MatchRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut out = Vec::new();
    for (idx, row) in reader.deserialize::<MatchRow>().enumerate() {
        let row = row.with_context(|| format!("{} line {}", path.display(), idx + 2))?;
        out.push(MatchRecord {
            id: MatchId(row.match_id),
            date: parse_date(&row.date)?,
            season: row.season,
            home_team: TeamId(row.home_team),
            away_team: TeamId(row.away_team),
            home_goals: row.home_goals,
            away_goals: row.away_goals,
            home_xg: row.home_xg,
            away_xg: row.away_xg,
            home_shots: row.home_shots,
            away_shots: row.away_shots,
            home_shots_on_target: row.home_shots_on_target,
            away_shots_on_target: row.away_shots_on_target,
            home_pressing: row.home_pressing,
            away_pressing: row.away_pressing,
        });
    }
    Ok(out)
}

fn load_appearances(path: &Path) -> Result<Vec<PlayerAppearance>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut out = Vec::new();
    for (idx, row) in reader.deserialize::<AppearanceRow>().enumerate() {
        let row = row.with_context(|| format!("{} line {}", path.display(), idx + 2))?;
        out.push(PlayerAppearance {
            player: PlayerId(row.player_id),
            player_name: row.player_name,
            team: TeamId(row.team_id),
            match_id: MatchId(row.match_id),
            date: parse_date(&row.date)?,
            season: row.season,
            minutes: row.minutes,
            position: position_group_from_text(&row.position),
            goals: row.goals,
            assists: row.assists,
            xg: row.xg,
            xa: row.xa,
            shots: row.shots,
            key_passes: row.key_passes,
        });
    }
    Ok(out)
}

/// Accepts both `--name value` and `--name=value`.
fn arg_value(args: &[String], name: &str) -> Option<String> {
    let flag = format!("--{name}");
    let prefix = format!("--{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if *arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
