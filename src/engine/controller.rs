use super::aggregator::{self, DayBatch};
use super::SeasonContext;
use crate::db::StatDepot;
use crate::errors::{EngineError, EngineResult};
use crate::state::*;
use crate::stats::composite::CompositeConfig;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SeasonSummary {
    pub season: String,
    pub days: u64,
    pub records: u64,
    pub rolling_flushes: u64,
    pub forced_flushes: u64,
}

/// Drives the engine across seasons. Season metadata is loaded once up front
/// so an unknown season fails before any processing starts.
pub struct AnalyticsController<D: StatDepot> {
    depot: Arc<D>,
    seasons: BTreeMap<String, SeasonDates>,
    composite: CompositeConfig,
    counters: Arc<RunCounters>,
}

impl<D: StatDepot + 'static> AnalyticsController<D> {
    pub fn new(depot: Arc<D>, composite: CompositeConfig, counters: Arc<RunCounters>) -> EngineResult<Self> {
        let seasons = depot
            .seasons()?
            .into_iter()
            .map(|s| (s.season.clone(), s))
            .collect();
        Ok(Self {
            depot,
            seasons,
            composite,
            counters,
        })
    }

    pub fn resolve(&self, season: &str) -> EngineResult<&SeasonDates> {
        self.seasons.get(season).ok_or_else(|| {
            EngineError::Config(format!(
                "season {season} not found, known: {:?}",
                self.seasons.keys().collect::<Vec<_>>()
            ))
        })
    }

    pub fn season_ids(&self) -> Vec<String> {
        self.seasons.keys().cloned().collect()
    }

    pub fn run_season(&self, season: &str) -> EngineResult<SeasonSummary> {
        let dates = self.resolve(season)?;
        run_season(self.depot.as_ref(), dates, self.composite, &self.counters)
    }

    /// Run several seasons in parallel. Seasons share no engine state; each
    /// one runs on its own blocking thread with strictly sequential days.
    pub async fn run_seasons(self: Arc<Self>, seasons: Vec<String>) -> EngineResult<Vec<SeasonSummary>> {
        for season in &seasons {
            self.resolve(season)?;
        }

        let tasks = seasons.into_iter().map(|season| {
            let controller = self.clone();
            async move {
                tokio::task::spawn_blocking(move || controller.run_season(&season))
                    .await
                    .map_err(EngineError::from)
                    .and_then(std::convert::identity)
            }
        });

        futures_util::future::try_join_all(tasks).await
    }
}

/// AwaitingSeason -> ProcessingDay(start) -> ... -> ProcessingDay(end) -> Done,
/// then force-flush whatever is still accumulated.
pub fn run_season<D: StatDepot + ?Sized>(
    depot: &D,
    season: &SeasonDates,
    composite: CompositeConfig,
    counters: &RunCounters,
) -> EngineResult<SeasonSummary> {
    let span = tracing::info_span!("season_run", run_id = %uuid::Uuid::new_v4(), season = %season.season);
    let _guard = span.enter();

    let mut ctx = SeasonContext::new(season.clone(), composite);
    let mut summary = SeasonSummary {
        season: season.season.clone(),
        ..SeasonSummary::default()
    };
    let mut state = ControllerState::AwaitingSeason;

    loop {
        state = match state {
            ControllerState::AwaitingSeason => {
                tracing::info!(start = %season.start, end = %season.end, "season run starting");
                ControllerState::ProcessingDay(season.start)
            }
            ControllerState::ProcessingDay(date) if date > season.end => ControllerState::Done,
            ControllerState::ProcessingDay(date) => {
                process_date(depot, &mut ctx, date, counters, &mut summary)?;
                date.succ_opt().map_or(ControllerState::Done, ControllerState::ProcessingDay)
            }
            ControllerState::Done => break,
        };
    }

    let rows = aggregator::force_flush(&ctx, Utc::now())?;
    for (horizon, rows) in rows.iter() {
        depot.upsert_averages(horizon, rows)?;
        summary.forced_flushes += rows.len() as u64;
        RunCounters::add(&counters.rows_upserted, rows.len() as u64);
    }
    RunCounters::add(&counters.forced_flushes, summary.forced_flushes);
    RunCounters::add(&counters.seasons_completed, 1);

    tracing::info!(
        days = summary.days,
        records = summary.records,
        rolling_flushes = summary.rolling_flushes,
        forced_flushes = summary.forced_flushes,
        "season run finished"
    );
    Ok(summary)
}

/// One calendar day: fetch, aggregate, persist, then advance the flush
/// reference and reset counters of every horizon that flushed.
pub(crate) fn process_date<D: StatDepot + ?Sized>(
    depot: &D,
    ctx: &mut SeasonContext,
    date: NaiveDate,
    counters: &RunCounters,
    summary: &mut SeasonSummary,
) -> EngineResult<()> {
    // An empty day is valid: no games were played.
    let records = depot.game_stats_between(date, date)?;
    let records: Vec<_> = records.into_iter().filter(|r| r.season == ctx.season.season).collect();

    let batch = aggregator::process_day(ctx, &records, Utc::now())?;
    persist(depot, &batch, counters, summary)?;
    finish_day(ctx, &batch, date);

    summary.days += 1;
    summary.records += batch.records as u64;
    RunCounters::add(&counters.days_processed, 1);
    RunCounters::add(&counters.records_processed, batch.records as u64);

    tracing::debug!(
        date = %date,
        records = batch.records,
        flushed = ?batch.flushed,
        "day processed"
    );
    Ok(())
}

fn persist<D: StatDepot + ?Sized>(
    depot: &D,
    batch: &DayBatch,
    counters: &RunCounters,
    summary: &mut SeasonSummary,
) -> EngineResult<()> {
    for (horizon, rows) in batch.rows.iter() {
        if rows.is_empty() {
            continue;
        }
        depot.upsert_averages(horizon, rows)?;
        summary.rolling_flushes += rows.len() as u64;
        RunCounters::add(&counters.rolling_flushes, rows.len() as u64);
        RunCounters::add(&counters.rows_upserted, rows.len() as u64);
    }
    Ok(())
}

fn finish_day(ctx: &mut SeasonContext, batch: &DayBatch, date: NaiveDate) {
    let next = date.succ_opt().unwrap_or(date);
    for &horizon in &batch.flushed {
        ctx.tracker.advance(horizon, next);
        ctx.cache[horizon].reset_games_played();
        tracing::debug!(
            horizon = %horizon,
            next_reference = %next,
            buffered = ctx.cache[horizon].buffered(),
            "horizon flushed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, SqliteDepot};
    use crate::stats::normalize::normalize;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 10, n).unwrap()
    }

    fn season(days: u32) -> SeasonDates {
        SeasonDates { season: "2019-20".into(), start: day(1), end: day(days) }
    }

    fn points_record(player: &str, d: u32) -> RawGameStatRecord {
        RawGameStatRecord {
            game_date: day(d),
            season: "2019-20".into(),
            player: player.into(),
            points_scored: 10,
            ..RawGameStatRecord::default()
        }
    }

    fn depot_with(records: &[RawGameStatRecord], season: &SeasonDates) -> SqliteDepot {
        let pool = db::init_memory_db().unwrap();
        db::upsert_season(&pool, season).unwrap();
        db::insert_game_stats(&pool, records).unwrap();
        SqliteDepot::new(pool)
    }

    #[test]
    fn test_ten_day_season_one_week_horizon() {
        let s = season(10);
        let records: Vec<_> = (1..=10).map(|d| points_record("A", d)).collect();
        let depot = depot_with(&records, &s);
        let counters = RunCounters::new();

        let summary = run_season(&depot, &s, CompositeConfig::default(), &counters).unwrap();
        assert_eq!(summary.days, 10);
        assert_eq!(summary.records, 10);
        // one rolling flush (1-week, day 8) plus one forced row per horizon
        assert_eq!(summary.rolling_flushes, 1);
        assert_eq!(summary.forced_flushes, 3);

        let rows = db::get_averages(depot.pool(), Horizon::OneWeek, Some("2019-20"), Some("A"), 10).unwrap();
        assert_eq!(rows.len(), 2);
        let rolling = rows.iter().find(|r| r.game_date == day(7)).unwrap();
        assert!((rolling.points_scored - normalize(10.0)).abs() < 1e-12);
        assert_eq!(rolling.games_played, 7);
        assert_eq!(rolling.assists, 0.0);

        let three = db::get_averages(depot.pool(), Horizon::ThreeWeek, None, None, 10).unwrap();
        assert_eq!(three.len(), 1);
        assert_eq!(three[0].game_date, day(10));
        assert_eq!(three[0].games_played, 10);
        assert!((three[0].points_scored - normalize(10.0)).abs() < 1e-12);
    }

    #[test]
    fn test_short_season_force_flushes_nine_week() {
        let s = season(3);
        let records: Vec<_> = (1..=3).map(|d| points_record("A", d)).collect();
        let depot = depot_with(&records, &s);

        let summary = run_season(&depot, &s, CompositeConfig::default(), &RunCounters::new()).unwrap();
        assert_eq!(summary.rolling_flushes, 0);

        let rows = db::get_averages(depot.pool(), Horizon::NineWeek, None, None, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].game_date, day(3));
        assert_eq!(rows[0].games_played, 3);
    }

    #[test]
    fn test_horizon_wide_games_played_reset() {
        let s = season(20);
        let mut records: Vec<_> = (1..=8).map(|d| points_record("P1", d)).collect();
        records.push(points_record("P2", 3));
        let depot = depot_with(&records, &s);
        let counters = RunCounters::new();
        let mut ctx = SeasonContext::new(s.clone(), CompositeConfig::default());
        let mut summary = SeasonSummary::default();

        for d in 1..=7 {
            process_date(&depot, &mut ctx, day(d), &counters, &mut summary).unwrap();
        }
        assert_eq!(ctx.cache[Horizon::OneWeek].games_played("P2"), 1);
        assert_eq!(ctx.tracker.reference(Horizon::OneWeek), day(1));

        // P1's flush resets every player's 1-week counter, P2 included
        process_date(&depot, &mut ctx, day(8), &counters, &mut summary).unwrap();
        assert_eq!(ctx.cache[Horizon::OneWeek].games_played("P1"), 0);
        assert_eq!(ctx.cache[Horizon::OneWeek].games_played("P2"), 0);
        assert_eq!(ctx.tracker.reference(Horizon::OneWeek), day(9));

        // horizons that did not flush are untouched
        assert_eq!(ctx.cache[Horizon::ThreeWeek].games_played("P2"), 1);
        assert_eq!(ctx.tracker.reference(Horizon::ThreeWeek), day(1));
    }

    #[test]
    fn test_reference_realigns_after_flush() {
        let s = season(30);
        let records: Vec<_> = (1..=30).map(|d| points_record("A", d)).collect();
        let depot = depot_with(&records, &s);

        run_season(&depot, &s, CompositeConfig::default(), &RunCounters::new()).unwrap();
        let mut dates: Vec<NaiveDate> = db::get_averages(depot.pool(), Horizon::OneWeek, None, None, 100)
            .unwrap()
            .into_iter()
            .map(|r| r.game_date)
            .collect();
        dates.sort();
        // flush on days 8, 16, 24 (each a week after the day following the
        // previous flush), rows dated the day before; then the forced row
        assert_eq!(dates, vec![day(7), day(15), day(23), day(30)]);
    }

    #[test]
    fn test_empty_days_are_valid() {
        let s = season(5);
        let depot = depot_with(&[points_record("A", 4)], &s);
        let summary = run_season(&depot, &s, CompositeConfig::default(), &RunCounters::new()).unwrap();
        assert_eq!(summary.days, 5);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.forced_flushes, 3);
    }

    #[test]
    fn test_unknown_season_fails_fast() {
        let s = season(5);
        let depot = Arc::new(depot_with(&[], &s));
        let controller =
            AnalyticsController::new(depot, CompositeConfig::default(), Arc::new(RunCounters::new())).unwrap();
        assert!(matches!(controller.run_season("1999-00"), Err(EngineError::Config(_))));
        assert_eq!(controller.season_ids(), vec!["2019-20".to_string()]);
    }

    struct FailingDepot;

    impl StatDepot for FailingDepot {
        fn seasons(&self) -> EngineResult<Vec<SeasonDates>> {
            Ok(vec![season(10)])
        }

        fn game_stats_between(&self, from: NaiveDate, _to: NaiveDate) -> EngineResult<Vec<RawGameStatRecord>> {
            let d = (from - day(1)).num_days() as u32 + 1;
            Ok(vec![points_record("A", d)])
        }

        fn upsert_averages(&self, _horizon: Horizon, _rows: &[AverageSnapshot]) -> EngineResult<()> {
            Err(EngineError::Database("constraint violation".into()))
        }
    }

    #[test]
    fn test_storage_failure_aborts_season() {
        let counters = RunCounters::new();
        let err = run_season(&FailingDepot, &season(10), CompositeConfig::default(), &counters).unwrap_err();
        assert!(matches!(err, EngineError::Database(_)));
        // aborted on day 8, the first flush
        assert_eq!(counters.days_processed.load(portable_atomic::Ordering::Relaxed), 7);
    }

    #[tokio::test]
    async fn test_parallel_seasons() {
        let pool = db::init_memory_db().unwrap();
        let first = season(10);
        let second = SeasonDates { season: "2020-21".into(), start: day(11), end: day(20) };
        db::upsert_season(&pool, &first).unwrap();
        db::upsert_season(&pool, &second).unwrap();
        let mut records: Vec<_> = (1..=10).map(|d| points_record("A", d)).collect();
        records.extend((11..=20).map(|d| RawGameStatRecord { season: "2020-21".into(), ..points_record("A", d) }));
        db::insert_game_stats(&pool, &records).unwrap();

        let counters = Arc::new(RunCounters::new());
        let controller = Arc::new(
            AnalyticsController::new(Arc::new(SqliteDepot::new(pool)), CompositeConfig::default(), counters.clone())
                .unwrap(),
        );
        let summaries = controller.run_seasons(vec!["2019-20".into(), "2020-21".into()]).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.records == 10));
        assert_eq!(counters.seasons_completed.load(portable_atomic::Ordering::Relaxed), 2);
    }
}
