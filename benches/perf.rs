use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::{Duration, NaiveDate};

use asof_scout::clustering::{ClusterParams, cluster_teams};
use asof_scout::rolling::{WindowSet, player_features_for_all, team_features_for_all};
use asof_scout::{
    Engine, EngineConfig, MatchId, MatchRecord, PlayerAppearance, PlayerId, PositionGroup,
    SimulationContext, TeamId, TemporalStore,
};

const TEAMS: u32 = 20;
const ROUNDS: usize = 38;

/// A 20-team double round robin with eleven starters per side.
fn season() -> TemporalStore {
    let start = NaiveDate::from_ymd_opt(2024, 8, 10).unwrap();
    let mut matches = Vec::new();
    let mut apps = Vec::new();
    for round in 0..ROUNDS {
        let mut others: Vec<u32> = (2..=TEAMS).collect();
        let len = others.len();
        others.rotate_left(round % len);
        let mut ring = vec![1];
        ring.extend(others);
        let date = start + Duration::days(7 * round as i64);
        for i in 0..ring.len() / 2 {
            let (home, away) = (ring[i], ring[ring.len() - 1 - i]);
            let seed = (round as u32 * 31 + home * 7 + away * 3) % 17;
            let m = MatchRecord {
                id: MatchId((round * 100 + i) as u64),
                date,
                season: 2024,
                home_team: TeamId(home),
                away_team: TeamId(away),
                home_goals: (seed % 4) as u8,
                away_goals: (seed % 3) as u8,
                home_xg: 0.5 + seed as f64 * 0.1,
                away_xg: 0.4 + (16 - seed) as f64 * 0.08,
                home_shots: 8 + (seed % 9) as u16,
                away_shots: 6 + (seed % 7) as u16,
                home_shots_on_target: Some(3),
                away_shots_on_target: Some(2),
                home_pressing: Some(9.0 + (home % 5) as f64),
                away_pressing: Some(10.0 + (away % 4) as f64),
            };
            for team in [home, away] {
                for slot in 0..11u32 {
                    let position = match slot {
                        0 => PositionGroup::Goalkeeper,
                        1..=4 => PositionGroup::Defender,
                        5..=7 => PositionGroup::Midfielder,
                        _ => PositionGroup::Forward,
                    };
                    apps.push(PlayerAppearance {
                        player: PlayerId(team * 100 + slot),
                        player_name: format!("P{team}-{slot}"),
                        team: TeamId(team),
                        match_id: m.id,
                        date,
                        season: 2024,
                        minutes: if slot == 10 { 70 } else { 90 },
                        position,
                        goals: ((seed + slot) % 5 == 0) as u8,
                        assists: ((seed + slot) % 7 == 0) as u8,
                        xg: 0.03 * slot as f64,
                        xa: 0.02 * ((seed + slot) % 6) as f64,
                        shots: (slot % 4) as u8,
                        key_passes: ((seed + slot) % 3) as u8,
                    });
                }
            }
            matches.push(m);
        }
    }
    TemporalStore::new(matches, apps).unwrap()
}

fn mid_season() -> SimulationContext {
    SimulationContext::new(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
}

fn bench_team_features(c: &mut Criterion) {
    let store = season();
    let ctx = mid_season();
    let windows = WindowSet::new(&[3, 5, 10]);
    c.bench_function("team_features_for_all", |b| {
        b.iter(|| {
            let out = team_features_for_all(black_box(&store), &ctx, &windows);
            black_box(out.len());
        })
    });
}

fn bench_player_features(c: &mut Criterion) {
    let store = season();
    let ctx = mid_season();
    c.bench_function("player_features_for_all", |b| {
        b.iter(|| {
            let out = player_features_for_all(black_box(&store), &ctx);
            black_box(out.len());
        })
    });
}

fn bench_clustering(c: &mut Criterion) {
    let store = season();
    let ctx = mid_season();
    let windows = WindowSet::new(&[3, 5, 10]);
    let vectors = team_features_for_all(&store, &ctx, &windows);
    let params = ClusterParams {
        k: 5,
        max_iterations: 100,
        min_metric_coverage: 0.5,
    };
    c.bench_function("cluster_teams", |b| {
        b.iter(|| {
            let report = cluster_teams(black_box(&vectors), ctx.as_of, &windows, params);
            black_box(report.iterations);
        })
    });
}

fn bench_similarity_uncached(c: &mut Criterion) {
    let store = std::sync::Arc::new(season());
    let ctx = mid_season();
    c.bench_function("find_similar_players_cold", |b| {
        b.iter(|| {
            let engine = Engine::from_shared(store.clone(), EngineConfig::default());
            let hits = engine
                .find_similar_players(black_box(PlayerId(109)), &ctx, Some(5))
                .unwrap();
            black_box(hits.len());
        })
    });
}

criterion_group!(
    perf,
    bench_team_features,
    bench_player_features,
    bench_clustering,
    bench_similarity_uncached
);
criterion_main!(perf);
