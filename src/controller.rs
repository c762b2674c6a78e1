//! Simulation date handling, the cached query engine and the interactive session.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::clustering::{cluster_teams, ClusterParams, ClusterReport};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::profile::{
    game_plan, head_to_head, strengths_and_weaknesses, team_profile, GamePlan, StrengthsWeaknesses,
    TeamProfile,
};
use crate::rankings::{
    grouped_percentiles, player_report, top_players_by_metric, LeaderboardEntry, PlayerReport,
};
use crate::records::{EntityRef, PlayerId, PositionGroup, TeamId, TeamMatchRow};
use crate::rolling::{
    player_features_for_all, team_features, team_features_for_all, FeatureVector, PlayerFeatures,
    WindowSet,
};
use crate::similarity::{find_similar_players, SimilarPlayer, SimilarityParams};
use crate::store::{parse_date, CutoffMode, TemporalStore};

/// The as-of date every query is answered relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationContext {
    pub as_of: NaiveDate,
    pub cutoff: CutoffMode,
}

impl SimulationContext {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            cutoff: CutoffMode::Exclusive,
        }
    }

    pub fn with_cutoff(self, cutoff: CutoffMode) -> Self {
        Self { cutoff, ..self }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        parse_date(raw).map(Self::new)
    }

    pub fn admits(&self, record_date: NaiveDate) -> bool {
        self.cutoff.admits(record_date, self.as_of)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageReport {
    pub as_of: NaiveDate,
    pub cutoff: CutoffMode,
    /// Cached outputs inspected for this context.
    pub outputs_checked: usize,
    /// Raw records re-checked through the store's visible views.
    pub records_checked: usize,
    pub latest_visible_record: Option<NaiveDate>,
}

type TeamKey = (SimulationContext, WindowSet, TeamId);
type ClusterKey = (SimulationContext, usize, WindowSet);
type SimilarKey = (SimulationContext, PlayerId, usize);

#[derive(Debug, Default)]
struct Cache {
    team_features: HashMap<TeamKey, FeatureVector>,
    clusters: HashMap<ClusterKey, ClusterReport>,
    player_cohorts: HashMap<SimulationContext, Arc<Vec<PlayerFeatures>>>,
    similar: HashMap<SimilarKey, (Vec<SimilarPlayer>, Option<NaiveDate>)>,
}

/// Date-stateless query engine over a shared store. Safe to use from many
/// threads with different contexts; results are memoised per context.
#[derive(Debug)]
pub struct Engine {
    store: Arc<TemporalStore>,
    config: EngineConfig,
    windows: WindowSet,
    cache: RwLock<Cache>,
}

impl Engine {
    pub fn new(store: TemporalStore, config: EngineConfig) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    pub fn from_shared(store: Arc<TemporalStore>, config: EngineConfig) -> Self {
        let windows = WindowSet::new(&config.windows);
        Self {
            store,
            config,
            windows,
            cache: RwLock::new(Cache::default()),
        }
    }

    pub fn store(&self) -> &TemporalStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn windows(&self) -> &WindowSet {
        &self.windows
    }

    pub fn context(&self, as_of: NaiveDate) -> SimulationContext {
        SimulationContext::new(as_of).with_cutoff(self.config.cutoff)
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Cache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Cache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear_cache(&self) {
        *self.write_cache() = Cache::default();
    }

    /// Drop every cached output computed for a context other than `ctx`.
    pub fn retain_context(&self, ctx: &SimulationContext) {
        let mut cache = self.write_cache();
        cache.team_features.retain(|(key_ctx, _, _), _| key_ctx == ctx);
        cache.clusters.retain(|(key_ctx, _, _), _| key_ctx == ctx);
        cache.player_cohorts.retain(|key_ctx, _| key_ctx == ctx);
        cache.similar.retain(|(key_ctx, _, _), _| key_ctx == ctx);
    }

    /// Team features over the configured windows.
    pub fn team_features(&self, team: TeamId, ctx: &SimulationContext) -> Result<FeatureVector> {
        self.team_features_with(team, ctx, &self.windows)
    }

    pub fn team_features_with(
        &self,
        team: TeamId,
        ctx: &SimulationContext,
        windows: &WindowSet,
    ) -> Result<FeatureVector> {
        let key = (*ctx, windows.clone(), team);
        if let Some(fv) = self.read_cache().team_features.get(&key) {
            return Ok(fv.clone());
        }
        let fv = team_features(&self.store, team, ctx, windows)?;
        ensure_visible(ctx, &format!("team features for {team}"), fv.source_max_date)?;
        self.write_cache().team_features.entry(key).or_insert_with(|| fv.clone());
        Ok(fv)
    }

    /// Features for every team with a visible match, ordered by team id.
    pub fn team_features_all(&self, ctx: &SimulationContext) -> Result<Vec<FeatureVector>> {
        let all = team_features_for_all(&self.store, ctx, &self.windows);
        for fv in &all {
            ensure_visible(ctx, &format!("team features for {}", fv.entity), fv.source_max_date)?;
        }
        let mut cache = self.write_cache();
        for fv in &all {
            if let EntityRef::Team(team) = fv.entity {
                cache
                    .team_features
                    .entry((*ctx, self.windows.clone(), team))
                    .or_insert_with(|| fv.clone());
            }
        }
        Ok(all)
    }

    /// Every visible player's features, computed once per context.
    pub fn player_cohort(&self, ctx: &SimulationContext) -> Result<Arc<Vec<PlayerFeatures>>> {
        if let Some(cohort) = self.read_cache().player_cohorts.get(ctx) {
            return Ok(Arc::clone(cohort));
        }
        let cohort = player_features_for_all(&self.store, ctx);
        for p in &cohort {
            ensure_visible(
                ctx,
                &format!("player features for {}", p.player),
                p.vector.source_max_date,
            )?;
        }
        let cohort = Arc::new(cohort);
        let mut cache = self.write_cache();
        Ok(Arc::clone(cache.player_cohorts.entry(*ctx).or_insert(cohort)))
    }

    pub fn player_features(&self, player: PlayerId, ctx: &SimulationContext) -> Result<PlayerFeatures> {
        self.player_cohort(ctx)?
            .iter()
            .find(|p| p.player == player)
            .cloned()
            .ok_or(EngineError::MissingEntity {
                entity: EntityRef::Player(player),
                as_of: ctx.as_of,
            })
    }

    /// Style clusters; `k` defaults to the configured cluster count.
    pub fn team_clusters(&self, ctx: &SimulationContext, k: Option<usize>) -> Result<ClusterReport> {
        let k = k.unwrap_or(self.config.cluster_k).max(1);
        let key = (*ctx, k, self.windows.clone());
        if let Some(report) = self.read_cache().clusters.get(&key) {
            return Ok(report.clone());
        }
        let vectors = self.team_features_all(ctx)?;
        let report = cluster_teams(
            &vectors,
            ctx.as_of,
            &self.windows,
            ClusterParams {
                k,
                max_iterations: self.config.kmeans_max_iterations,
                min_metric_coverage: self.config.min_metric_coverage,
            },
        );
        ensure_visible(ctx, "team clusters", report.source_max_date)?;
        self.write_cache().clusters.entry(key).or_insert_with(|| report.clone());
        Ok(report)
    }

    /// Nearest players in the query's position group; `top_n` defaults to the configured count.
    pub fn find_similar_players(
        &self,
        player: PlayerId,
        ctx: &SimulationContext,
        top_n: Option<usize>,
    ) -> Result<Vec<SimilarPlayer>> {
        let top_n = top_n.unwrap_or(self.config.similarity_top_n);
        let key = (*ctx, player, top_n);
        if let Some((hits, _)) = self.read_cache().similar.get(&key) {
            return Ok(hits.clone());
        }
        let cohort = self.player_cohort(ctx)?;
        let hits = find_similar_players(
            &cohort,
            player,
            ctx.as_of,
            SimilarityParams {
                min_minutes: self.config.similarity_min_minutes,
                min_metric_coverage: self.config.min_metric_coverage,
                top_n,
            },
        )?;
        let source_max = cohort.iter().filter_map(|p| p.vector.source_max_date).max();
        ensure_visible(ctx, &format!("similar players for {player}"), source_max)?;
        self.write_cache()
            .similar
            .entry(key)
            .or_insert_with(|| (hits.clone(), source_max));
        Ok(hits)
    }

    pub fn team_profile(&self, team: TeamId, ctx: &SimulationContext) -> Result<TeamProfile> {
        let profile = team_profile(&self.store, team, ctx, self.config.profile_last_n)?;
        ensure_visible(ctx, &format!("profile for {team}"), Some(profile.last_date))?;
        Ok(profile)
    }

    pub fn team_report(
        &self,
        team: TeamId,
        ctx: &SimulationContext,
    ) -> Result<(TeamProfile, StrengthsWeaknesses)> {
        let profile = self.team_profile(team, ctx)?;
        let notes = strengths_and_weaknesses(&profile);
        Ok((profile, notes))
    }

    /// Both profiles are taken at the same context.
    pub fn game_plan(&self, own: TeamId, opponent: TeamId, ctx: &SimulationContext) -> Result<GamePlan> {
        let own = self.team_profile(own, ctx)?;
        let opponent = self.team_profile(opponent, ctx)?;
        Ok(game_plan(own, opponent))
    }

    /// Visible meetings of `team` with `opponent`, oldest first. Empty when
    /// they have not met yet.
    pub fn head_to_head(
        &self,
        team: TeamId,
        opponent: TeamId,
        ctx: &SimulationContext,
    ) -> Result<Vec<TeamMatchRow>> {
        let rows = head_to_head(&self.store, team, opponent, ctx);
        let latest = rows.last().map(|r| r.date);
        ensure_visible(ctx, &format!("head to head {team} v {opponent}"), latest)?;
        Ok(rows)
    }

    /// Percentiles use the configured similarity minutes threshold.
    pub fn player_report(&self, player: PlayerId, ctx: &SimulationContext) -> Result<PlayerReport> {
        let cohort = self.player_cohort(ctx)?;
        player_report(&cohort, player, ctx.as_of, self.config.similarity_min_minutes)
    }

    pub fn top_players_by_metric(
        &self,
        ctx: &SimulationContext,
        metric: &str,
        group: Option<PositionGroup>,
        min_minutes: u32,
        n: usize,
    ) -> Result<Vec<LeaderboardEntry>> {
        let cohort = self.player_cohort(ctx)?;
        Ok(top_players_by_metric(&cohort, metric, group, min_minutes, n))
    }

    /// Percentile of `metric` for each qualifying player within their position group.
    pub fn player_percentiles(
        &self,
        ctx: &SimulationContext,
        metric: &str,
        min_minutes: u32,
    ) -> Result<BTreeMap<PlayerId, f64>> {
        let cohort = self.player_cohort(ctx)?;
        Ok(grouped_percentiles(&cohort, metric, min_minutes))
    }

    /// Re-check that nothing cached for `ctx`, and nothing the store exposes
    /// for it, is dated outside the visible window.
    pub fn validate_no_leakage(&self, ctx: &SimulationContext) -> Result<LeakageReport> {
        let mut outputs_checked = 0;
        {
            let cache = self.read_cache();
            for ((key_ctx, _, team), fv) in &cache.team_features {
                if key_ctx == ctx {
                    ensure_visible(ctx, &format!("cached team features for {team}"), fv.source_max_date)?;
                    outputs_checked += 1;
                }
            }
            for ((key_ctx, k, _), report) in &cache.clusters {
                if key_ctx == ctx {
                    ensure_visible(ctx, &format!("cached team clusters (k={k})"), report.source_max_date)?;
                    outputs_checked += 1;
                }
            }
            if let Some(cohort) = cache.player_cohorts.get(ctx) {
                for p in cohort.iter() {
                    ensure_visible(
                        ctx,
                        &format!("cached player features for {}", p.player),
                        p.vector.source_max_date,
                    )?;
                    outputs_checked += 1;
                }
            }
            for ((key_ctx, player, _), (_, source_max)) in &cache.similar {
                if key_ctx == ctx {
                    ensure_visible(ctx, &format!("cached similar players for {player}"), *source_max)?;
                    outputs_checked += 1;
                }
            }
        }

        let matches = self.store.records_as_of(ctx);
        for m in matches {
            ensure_visible(ctx, &format!("visible {}", m.id), Some(m.date))?;
        }
        let appearances = self.store.appearances_as_of(ctx);
        for a in &appearances {
            ensure_visible(ctx, &format!("visible appearance in {}", a.match_id), Some(a.date))?;
        }

        let report = LeakageReport {
            as_of: ctx.as_of,
            cutoff: ctx.cutoff,
            outputs_checked,
            records_checked: matches.len() + appearances.len(),
            latest_visible_record: matches.last().map(|m| m.date),
        };
        debug!(
            as_of = %ctx.as_of,
            outputs = report.outputs_checked,
            records = report.records_checked,
            "leakage check passed"
        );
        Ok(report)
    }
}

fn ensure_visible(ctx: &SimulationContext, output: &str, source_max: Option<NaiveDate>) -> Result<()> {
    match source_max {
        Some(record_date) if !ctx.admits(record_date) => {
            error!(
                output,
                %record_date,
                as_of = %ctx.as_of,
                "record from outside the visible window reached an output"
            );
            Err(EngineError::LeakageDetected {
                output: output.to_string(),
                record_date,
                as_of: ctx.as_of,
            })
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Unset,
    Set(SimulationContext),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub as_of: NaiveDate,
    pub cutoff: CutoffMode,
    pub data_range: Option<(NaiveDate, NaiveDate)>,
    pub visible_matches: usize,
    pub total_matches: usize,
    pub visible_appearances: usize,
    pub total_appearances: usize,
    pub seasons: Vec<u16>,
    pub teams: usize,
}

/// Interactive wrapper holding the one "currently selected" date.
#[derive(Debug)]
pub struct Session {
    engine: Engine,
    state: SessionState,
}

impl Session {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            state: SessionState::Unset,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> Result<SimulationContext> {
        match self.state {
            SessionState::Set(ctx) => Ok(ctx),
            SessionState::Unset => Err(EngineError::NoSimulationDate),
        }
    }

    pub fn set_date(&mut self, as_of: NaiveDate) -> SimulationContext {
        let ctx = self.engine.context(as_of);
        if let Some((first, last)) = self.engine.store().date_range() {
            if as_of < first || as_of > last {
                warn!(%as_of, %first, %last, "simulation date outside the loaded data range");
            }
        }
        if self.state != SessionState::Set(ctx) {
            self.engine.retain_context(&ctx);
        }
        info!(%as_of, cutoff = ?ctx.cutoff, "simulation date set");
        self.state = SessionState::Set(ctx);
        ctx
    }

    pub fn set_date_str(&mut self, raw: &str) -> Result<SimulationContext> {
        let as_of = parse_date(raw)?;
        Ok(self.set_date(as_of))
    }

    /// Move to the day after matchweek `n` (1-indexed) of `season`, so that
    /// week's results are visible.
    pub fn advance_to_matchweek(&mut self, season: u16, n: usize) -> Result<SimulationContext> {
        let weeks = self.engine.store().matchweeks(season);
        let week = n
            .checked_sub(1)
            .and_then(|i| weeks.get(i))
            .ok_or_else(|| EngineError::InvalidDate(format!("season {season} has no matchweek {n}")))?;
        let next = week
            .end
            .succ_opt()
            .ok_or_else(|| EngineError::InvalidDate(format!("no day after {}", week.end)))?;
        Ok(self.set_date(next))
    }

    pub fn info(&self) -> Result<SessionInfo> {
        let ctx = self.context()?;
        let store = self.engine.store();
        Ok(SessionInfo {
            as_of: ctx.as_of,
            cutoff: ctx.cutoff,
            data_range: store.date_range(),
            visible_matches: store.records_as_of(&ctx).len(),
            total_matches: store.match_count(),
            visible_appearances: store.appearances_as_of(&ctx).len(),
            total_appearances: store.appearance_count(),
            seasons: store.seasons_as_of(&ctx),
            teams: store.teams_as_of(&ctx, None).len(),
        })
    }

    pub fn team_features(&self, team: TeamId) -> Result<FeatureVector> {
        self.engine.team_features(team, &self.context()?)
    }

    pub fn team_features_with(&self, team: TeamId, windows: &WindowSet) -> Result<FeatureVector> {
        self.engine.team_features_with(team, &self.context()?, windows)
    }

    pub fn player_features(&self, player: PlayerId) -> Result<PlayerFeatures> {
        self.engine.player_features(player, &self.context()?)
    }

    pub fn team_clusters(&self, k: Option<usize>) -> Result<ClusterReport> {
        self.engine.team_clusters(&self.context()?, k)
    }

    pub fn find_similar_players(&self, player: PlayerId, top_n: Option<usize>) -> Result<Vec<SimilarPlayer>> {
        self.engine.find_similar_players(player, &self.context()?, top_n)
    }

    pub fn team_profile(&self, team: TeamId) -> Result<TeamProfile> {
        self.engine.team_profile(team, &self.context()?)
    }

    pub fn game_plan(&self, own: TeamId, opponent: TeamId) -> Result<GamePlan> {
        self.engine.game_plan(own, opponent, &self.context()?)
    }

    pub fn head_to_head(&self, team: TeamId, opponent: TeamId) -> Result<Vec<TeamMatchRow>> {
        self.engine.head_to_head(team, opponent, &self.context()?)
    }

    pub fn player_report(&self, player: PlayerId) -> Result<PlayerReport> {
        self.engine.player_report(player, &self.context()?)
    }

    pub fn top_players_by_metric(
        &self,
        metric: &str,
        group: Option<PositionGroup>,
        n: usize,
    ) -> Result<Vec<LeaderboardEntry>> {
        let min_minutes = self.engine.config().similarity_min_minutes;
        self.engine
            .top_players_by_metric(&self.context()?, metric, group, min_minutes, n)
    }

    pub fn validate_no_leakage(&self) -> Result<LeakageReport> {
        self.engine.validate_no_leakage(&self.context()?)
    }
}
