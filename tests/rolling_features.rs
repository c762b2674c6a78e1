mod common;

use chrono::Duration;

use asof_scout::records::EntityRef;
use asof_scout::rolling::{
    player_features, rolling_name, team_features, team_features_for_all, BaseMetric, WindowSet,
    CLEAN_SHEET_RATE, GOALS_CONCEDED_PER90, GOALS_TOTAL, SAVES_PER90, SAVE_RATE,
    SEASON_CONVERSION_RATE, SEASON_MATCHES, SEASON_PRESSING, SEASON_SHOT_QUALITY,
    SHOT_EFFICIENCY,
};
use asof_scout::{
    EngineError, MatchId, MatchRecord, PlayerAppearance, PlayerId, PositionGroup,
    SimulationContext, TeamId, TemporalStore,
};
use common::{BENCH_PLAYER, day, league_store, round_date, simple_match};

fn windows() -> WindowSet {
    WindowSet::new(&[3, 5, 10])
}

fn close(a: Option<f64>, b: f64) -> bool {
    a.is_some_and(|a| (a - b).abs() < 1e-9)
}

/// Team 1 plays on August 1..=12, scoring `d % 4` with `0.1 * d` xG.
fn daily_store() -> TemporalStore {
    let matches: Vec<MatchRecord> = (1..=12u32)
        .map(|d| {
            simple_match(
                d as u64,
                day(2024, 8, d),
                1,
                2 + d % 3,
                ((d % 4) as u8, 1),
                (0.1 * d as f64, 0.5),
            )
        })
        .collect();
    TemporalStore::new(matches, Vec::new()).unwrap()
}

#[test]
fn window_means_match_hand_computed_values() {
    let store = daily_store();
    let ctx = SimulationContext::new(day(2024, 8, 13));
    let fv = team_features(&store, TeamId(1), &ctx, &windows()).unwrap();
    for n in [3u32, 5, 10] {
        let days: Vec<u32> = (13 - n..=12).collect();
        let goals = days.iter().map(|d| (d % 4) as f64).sum::<f64>() / n as f64;
        let xg = days.iter().map(|d| 0.1 * *d as f64).sum::<f64>() / n as f64;
        assert!(close(fv.get(&rolling_name(n as usize, BaseMetric::GoalsFor)), goals), "goals window {n}");
        assert!(close(fv.get(&rolling_name(n as usize, BaseMetric::XgFor)), xg), "xg window {n}");
        assert!(close(fv.get(&rolling_name(n as usize, BaseMetric::GoalsAgainst)), 1.0));
    }
    assert_eq!(fv.source_records, 12);
    assert_eq!(fv.source_max_date, Some(day(2024, 8, 12)));
}

#[test]
fn short_history_uses_what_exists() {
    let store = daily_store();
    let ctx = SimulationContext::new(day(2024, 8, 3));
    let fv = team_features(&store, TeamId(1), &ctx, &windows()).unwrap();
    // Days 1 and 2 score 1 and 2.
    assert!(close(fv.get(&rolling_name(10, BaseMetric::GoalsFor)), 1.5));
    assert!(close(fv.get(&rolling_name(3, BaseMetric::GoalsFor)), 1.5));
    assert!(close(fv.get(SEASON_MATCHES), 2.0));
}

#[test]
fn team_without_visible_matches_is_missing() {
    let store = daily_store();
    let ctx = SimulationContext::new(day(2024, 8, 1));
    let err = team_features(&store, TeamId(1), &ctx, &windows()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::MissingEntity { entity: EntityRef::Team(TeamId(1)), .. }
    ));
}

#[test]
fn three_match_form_scenario() {
    let matches = vec![
        simple_match(1, day(2024, 8, 10), 1, 2, (2, 0), (1.8, 0.4)),
        simple_match(2, day(2024, 8, 17), 3, 1, (1, 0), (1.2, 0.9)),
        simple_match(3, day(2024, 8, 24), 1, 4, (1, 1), (1.1, 0.7)),
    ];
    let store = TemporalStore::new(matches, Vec::new()).unwrap();
    let w = WindowSet::new(&[3]);

    let fv = team_features(&store, TeamId(1), &SimulationContext::new(day(2024, 8, 25)), &w).unwrap();
    assert!(close(fv.get(&rolling_name(3, BaseMetric::GoalsFor)), 1.0));
    assert!(close(fv.get(&rolling_name(3, BaseMetric::XgFor)), 3.8 / 3.0));
    assert!((fv.get(&rolling_name(3, BaseMetric::XgFor)).unwrap() - 1.267).abs() < 1e-3);
    assert!(close(fv.get(&rolling_name(3, BaseMetric::Points)), 4.0 / 3.0));

    // The 24th is not yet played at the start of the 24th.
    let fv = team_features(&store, TeamId(1), &SimulationContext::new(day(2024, 8, 24)), &w).unwrap();
    assert!(close(fv.get(&rolling_name(3, BaseMetric::GoalsFor)), 1.0));
    assert!(close(fv.get(&rolling_name(3, BaseMetric::XgFor)), 1.35));
    assert_eq!(fv.source_max_date, Some(day(2024, 8, 17)));
}

#[test]
fn same_day_matches_order_by_match_id() {
    let matches = vec![
        simple_match(7, day(2024, 8, 10), 1, 2, (4, 0), (2.0, 0.1)),
        simple_match(5, day(2024, 8, 10), 1, 3, (1, 0), (1.0, 0.1)),
    ];
    let store = TemporalStore::new(matches, Vec::new()).unwrap();
    let fv = team_features(&store, TeamId(1), &SimulationContext::new(day(2024, 8, 11)), &WindowSet::new(&[1])).unwrap();
    assert!(close(fv.get(&rolling_name(1, BaseMetric::GoalsFor)), 1.0));
}

#[test]
fn season_stats_only_cover_the_current_season() {
    let mut old = simple_match(1, day(2024, 5, 1), 1, 2, (5, 0), (3.0, 0.2));
    old.season = 2023;
    let mut new = simple_match(2, day(2024, 8, 10), 1, 2, (1, 1), (0.0, 0.8));
    new.home_shots = 0;
    new.home_pressing = Some(9.5);
    let store = TemporalStore::new(vec![old, new], Vec::new()).unwrap();
    let fv = team_features(&store, TeamId(1), &SimulationContext::new(day(2024, 9, 1)), &windows()).unwrap();

    assert!(close(fv.get(SEASON_MATCHES), 1.0));
    assert!(close(fv.get("season_goals_for_total"), 1.0));
    // No shots: shot quality is zero, but a zero-xG conversion rate is undefined.
    assert!(close(fv.get(SEASON_SHOT_QUALITY), 0.0));
    assert!(fv.metrics.contains_key(SEASON_CONVERSION_RATE));
    assert_eq!(fv.get(SEASON_CONVERSION_RATE), None);
    assert!(close(fv.get(SEASON_PRESSING), 9.5));
    // Rolling windows still span both seasons.
    assert!(close(fv.get(&rolling_name(3, BaseMetric::GoalsFor)), 3.0));
}

#[test]
fn pressing_is_undefined_when_never_reported() {
    let store = daily_store();
    let fv = team_features(&store, TeamId(1), &SimulationContext::new(day(2024, 8, 13)), &windows()).unwrap();
    assert!(fv.metrics.contains_key(SEASON_PRESSING));
    assert_eq!(fv.get(SEASON_PRESSING), None);
}

#[test]
fn zero_minute_player_has_undefined_per90() {
    let store = league_store(2);
    let ctx = SimulationContext::new(round_date(2));
    let p = player_features(&store, BENCH_PLAYER, &ctx).unwrap();
    assert_eq!(p.minutes, 0);
    assert_eq!(p.appearances, 2);
    for name in ["goals_per90", "xg_per90", "season_assists_per90", GOALS_CONCEDED_PER90] {
        assert!(p.vector.metrics.contains_key(name), "{name} present");
        assert_eq!(p.vector.get(name), None, "{name} undefined");
    }
    assert_eq!(p.vector.get(CLEAN_SHEET_RATE), None);
    assert_eq!(p.vector.get(SHOT_EFFICIENCY), None);
}

#[test]
fn per90_scales_by_minutes() {
    let m = simple_match(1, day(2024, 8, 10), 1, 2, (1, 0), (1.0, 0.3));
    let app = PlayerAppearance {
        player: PlayerId(9),
        player_name: "Sub".to_string(),
        team: TeamId(1),
        match_id: MatchId(1),
        date: m.date,
        season: 2024,
        minutes: 45,
        position: PositionGroup::Forward,
        goals: 1,
        assists: 0,
        xg: 0.6,
        xa: 0.0,
        shots: 2,
        key_passes: 1,
    };
    let store = TemporalStore::new(vec![m], vec![app]).unwrap();
    let p = player_features(&store, PlayerId(9), &SimulationContext::new(day(2024, 8, 11))).unwrap();
    assert!(close(p.vector.get("goals_per90"), 2.0));
    assert!(close(p.vector.get("xg_per90"), 1.2));
    assert!(close(p.vector.get("key_passes_per90"), 2.0));
    assert!(close(p.vector.get(SHOT_EFFICIENCY), 0.5));
    assert!(close(p.vector.get(CLEAN_SHEET_RATE), 1.0));
    assert!(close(p.vector.get(GOALS_CONCEDED_PER90), 0.0));
    assert_eq!(p.position, PositionGroup::Forward);

    let before = player_features(&store, PlayerId(9), &SimulationContext::new(day(2024, 8, 10)));
    assert!(matches!(before, Err(EngineError::MissingEntity { .. })));
}

#[test]
fn cohort_features_are_ordered_and_repeatable() {
    let store = league_store(4);
    let ctx = SimulationContext::new(round_date(3) + Duration::days(1));
    let a = team_features_for_all(&store, &ctx, &windows());
    let b = team_features_for_all(&store, &ctx, &windows());
    assert_eq!(a, b);
    assert_eq!(a.len(), 10);
    let ids: Vec<_> = a.iter().map(|fv| fv.entity).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
    for fv in &a {
        let EntityRef::Team(team) = fv.entity else { panic!("team cohort") };
        let single = team_features(&store, team, &ctx, &windows()).unwrap();
        assert_eq!(&single, fv);
    }
}

#[test]
fn goalkeeper_saves_come_from_shots_on_target_faced() {
    let store = league_store(4);
    let ctx = SimulationContext::new(round_date(3) + Duration::days(1));
    let keeper = player_features(&store, PlayerId(14), &ctx).unwrap();
    let rows = store.team_rows_for(TeamId(1), &ctx);
    assert_eq!(rows.len(), 4);
    let faced: f64 = rows.iter().map(|r| r.shots_on_target_against.unwrap() as f64).sum();
    let conceded: f64 = rows.iter().map(|r| r.goals_against as f64).sum();
    let saved = (faced - conceded).max(0.0);
    assert!(close(keeper.vector.get(SAVE_RATE), saved / faced));
    assert!(close(keeper.vector.get(SAVES_PER90), saved * 90.0 / 360.0));
    assert!(close(keeper.vector.get(GOALS_TOTAL), 0.0));
}

#[test]
fn saves_are_undefined_without_shots_on_target() {
    let m = simple_match(1, day(2024, 8, 10), 1, 2, (1, 0), (1.0, 0.3));
    let keeper = PlayerAppearance {
        player: PlayerId(9),
        player_name: "Keeper".into(),
        team: TeamId(2),
        match_id: MatchId(1),
        date: m.date,
        season: 2024,
        minutes: 90,
        position: PositionGroup::Goalkeeper,
        goals: 0,
        assists: 0,
        xg: 0.0,
        xa: 0.0,
        shots: 0,
        key_passes: 0,
    };
    let store = TemporalStore::new(vec![m], vec![keeper]).unwrap();
    let p = player_features(&store, PlayerId(9), &SimulationContext::new(day(2024, 8, 11))).unwrap();
    assert_eq!(p.vector.get(SAVE_RATE), None);
    assert_eq!(p.vector.get(SAVES_PER90), None);
    assert!(close(p.vector.get(GOALS_CONCEDED_PER90), 1.0));
}
