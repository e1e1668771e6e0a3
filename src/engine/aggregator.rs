use super::cache::PlayerHorizonAccumulator;
use super::SeasonContext;
use crate::errors::{EngineError, EngineResult};
use crate::state::*;
use crate::stats::composite::{self, CompositeConfig};
use crate::stats::normalize::normalize_record;
use chrono::{DateTime, NaiveDate, Utc};
use smallvec::SmallVec;

/// Rows produced by one day's batch. Persisting them is the caller's job.
#[derive(Debug, Default)]
pub struct DayBatch {
    pub rows: PerHorizon<Vec<AverageSnapshot>>,
    /// Horizons with at least one flush this day, in first-flush order.
    pub flushed: SmallVec<[Horizon; 3]>,
    pub records: usize,
}

/// Whole weeks from `reference` to `game_date`, floored.
#[inline]
pub fn elapsed_weeks(reference: NaiveDate, game_date: NaiveDate) -> i64 {
    (game_date - reference).num_days().div_euclid(7)
}

/// 1-based week of the season a game falls in.
#[inline]
pub fn season_week(season_start: NaiveDate, game_date: NaiveDate) -> i64 {
    elapsed_weeks(season_start, game_date) + 1
}

/// Flush at every positive multiple of the horizon length, never at week 0.
#[inline]
pub fn flush_due(elapsed: i64, horizon_weeks: i64) -> bool {
    elapsed > 0 && elapsed % horizon_weeks == 0
}

/// Run one day's records through every horizon.
///
/// Per record: normalize once, then per horizon stamp games played, check the
/// flush boundary against the horizon's last flush, average the stored
/// snapshots if due, append the new snapshot, and evict the oldest entry if
/// a flush happened.
pub fn process_day(
    ctx: &mut SeasonContext,
    records: &[RawGameStatRecord],
    now: DateTime<Utc>,
) -> EngineResult<DayBatch> {
    let mut batch = DayBatch::default();

    for record in records {
        let week_id = season_week(ctx.season.start, record.game_date);
        let base = normalize_record(record, week_id);

        for horizon in Horizon::ALL {
            if let Some(row) = accumulate(ctx, horizon, &base, now)? {
                tracing::debug!(
                    season = %ctx.season.season,
                    horizon = %horizon,
                    player = %row.player,
                    game_date = %row.game_date,
                    games_played = row.games_played,
                    "rolling flush"
                );
                if !batch.flushed.contains(&horizon) {
                    batch.flushed.push(horizon);
                }
                batch.rows[horizon].push(row);
            }
        }
        batch.records += 1;
    }

    Ok(batch)
}

fn accumulate(
    ctx: &mut SeasonContext,
    horizon: Horizon,
    base: &NormalizedStatSnapshot,
    now: DateTime<Utc>,
) -> EngineResult<Option<AverageSnapshot>> {
    let reference = ctx.tracker.reference(horizon);
    let state = &mut ctx.cache[horizon];

    let mut snapshot = base.clone();
    snapshot.games_played = state.increment_games_played(&snapshot.player);

    let acc = state.get_or_create_accumulator(&snapshot.player);
    let due = !acc.is_empty() && flush_due(elapsed_weeks(reference, snapshot.game_date), horizon.weeks());

    let row = if due {
        Some(compute_average(acc, ctx.composite, now)?)
    } else {
        None
    };

    acc.push(snapshot);
    if row.is_some() {
        acc.evict_oldest();
    }
    Ok(row)
}

/// Mean of every stored snapshot.
///
/// The divisor is the largest games-played stamp among the entries, not the
/// entry count. The row is dated with the latest stored game and carries
/// that game's season week.
pub fn compute_average(
    acc: &PlayerHorizonAccumulator,
    cfg: CompositeConfig,
    now: DateTime<Utc>,
) -> EngineResult<AverageSnapshot> {
    let mut entries = acc.entries();
    let Some(first) = entries.next() else {
        return Err(EngineError::StateCorruption(
            "flush requested on an empty accumulator".into(),
        ));
    };

    let mut sum = first.stats;
    let mut raw_minutes = first.raw_minutes;
    let mut max_games = first.games_played;
    let mut latest = first;

    for entry in entries {
        sum.add_assign(&entry.stats);
        raw_minutes += entry.raw_minutes;
        max_games = max_games.max(entry.games_played);
        if entry.game_date >= latest.game_date {
            latest = entry;
        }
    }

    let divisor = f64::from(max_games.max(1));
    let stats = sum.divided_by(divisor);
    let minutes_per_game = raw_minutes / divisor;

    Ok(AverageSnapshot {
        game_date: latest.game_date,
        season: latest.season.clone(),
        week_id: latest.week_id,
        player: latest.player.clone(),
        scores: composite::compute_scores(&stats, minutes_per_game, cfg),
        stats,
        games_played: max_games,
        minutes_per_game,
        created_timestamp: now,
    })
}

/// Season end: one row per (horizon, player) with anything accumulated,
/// whether or not the week boundary was reached.
pub fn force_flush(ctx: &SeasonContext, now: DateTime<Utc>) -> EngineResult<PerHorizon<Vec<AverageSnapshot>>> {
    let mut out: PerHorizon<Vec<AverageSnapshot>> = PerHorizon::default();

    for (horizon, state) in ctx.cache.iter() {
        let mut players: Vec<_> = state.players().filter(|(_, acc)| !acc.is_empty()).collect();
        players.sort_by(|a, b| a.0.cmp(b.0));
        for (_, acc) in players {
            out[horizon].push(compute_average(acc, ctx.composite, now)?);
        }
    }

    Ok(out)
}
