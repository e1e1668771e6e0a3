use crate::errors::{EngineError, EngineResult};
use crate::state::{AverageSnapshot, Horizon, PerHorizon, RawGameStatRecord, SeasonDates};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type DbPool = Arc<Mutex<Connection>>;

/// Storage seen by the engine: semantic reads plus an idempotent batch upsert.
/// Implementations must resolve upsert conflicts on (game_date, player, season)
/// with a full overwrite of the remaining columns.
pub trait StatDepot: Send + Sync {
    fn seasons(&self) -> EngineResult<Vec<SeasonDates>>;

    /// All raw rows with `from <= game_date <= to`, ordered by date then player.
    fn game_stats_between(&self, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<RawGameStatRecord>>;

    fn upsert_averages(&self, horizon: Horizon, rows: &[AverageSnapshot]) -> EngineResult<()>;
}

pub fn init_db(db_path: &Path) -> EngineResult<DbPool> {
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| EngineError::Database(format!("create dir: {e}")))?;
    }
    let conn = Connection::open(db_path)?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA cache_size=-64000;")?;
    apply_schema(&conn)?;

    tracing::info!("database initialized at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

#[cfg(test)]
pub fn init_memory_db() -> EngineResult<DbPool> {
    let conn = Connection::open_in_memory()?;
    apply_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn apply_schema(conn: &Connection) -> EngineResult<()> {
    let schema = include_str!("../migrations/001_init.sql");
    conn.execute_batch(schema)?;
    Ok(())
}

fn lock(db: &DbPool) -> EngineResult<std::sync::MutexGuard<'_, Connection>> {
    db.lock().map_err(|e| EngineError::Database(format!("lock poisoned: {e}")))
}

// ── SQLite depot ──

#[derive(Clone)]
pub struct SqliteDepot {
    db: DbPool,
}

impl SqliteDepot {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }
}

const GAME_STATS_COLUMNS: &str = "game_date, season, player, team, opponent, home_game, minutes_played, \
     field_goals, field_goal_attempts, three_points, three_point_attempts, free_throws, free_throw_attempts, \
     offensive_rebounds, defensive_rebounds, assists, steals, blocks, turnovers, personal_fouls, \
     points_scored, plus_minus, game_rating_score";

const AVERAGE_COLUMNS: &str = "game_date, season, week_id, player, minutes_played, field_goals, three_points, \
     free_throws, offensive_rebounds, defensive_rebounds, total_rebounds, assists, steals, blocks, turnovers, \
     points_scored, plus_minus, game_rating_score, field_goal_pct, three_point_pct, free_throw_pct, \
     overall_efficiency, games_played, minutes_per_game, center_score, guard_score, forward_score, \
     created_timestamp";

impl StatDepot for SqliteDepot {
    fn seasons(&self) -> EngineResult<Vec<SeasonDates>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare("SELECT season, season_start, season_end FROM seasons ORDER BY season_start")?;
        let rows = stmt.query_map([], |row| {
            Ok(SeasonDates {
                season: row.get(0)?,
                start: row.get(1)?,
                end: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn game_stats_between(&self, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<RawGameStatRecord>> {
        let conn = lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {GAME_STATS_COLUMNS} FROM game_stats WHERE game_date BETWEEN ?1 AND ?2 ORDER BY game_date, player"
        ))?;
        // Missing numeric cells read as zero.
        let rows = stmt.query_map(rusqlite::params![from, to], |row| {
            let int = |i: usize| -> rusqlite::Result<i64> { Ok(row.get::<_, Option<i64>>(i)?.unwrap_or(0)) };
            let real = |i: usize| -> rusqlite::Result<f64> { Ok(row.get::<_, Option<f64>>(i)?.unwrap_or(0.0)) };
            Ok(RawGameStatRecord {
                game_date: row.get(0)?,
                season: row.get(1)?,
                player: row.get(2)?,
                team: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                opponent: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                home_game: row.get::<_, Option<bool>>(5)?.unwrap_or(false),
                minutes_played: real(6)?,
                field_goals: int(7)?,
                field_goal_attempts: int(8)?,
                three_points: int(9)?,
                three_point_attempts: int(10)?,
                free_throws: int(11)?,
                free_throw_attempts: int(12)?,
                offensive_rebounds: int(13)?,
                defensive_rebounds: int(14)?,
                assists: int(15)?,
                steals: int(16)?,
                blocks: int(17)?,
                turnovers: int(18)?,
                personal_fouls: int(19)?,
                points_scored: int(20)?,
                plus_minus: int(21)?,
                game_rating_score: real(22)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn upsert_averages(&self, horizon: Horizon, rows: &[AverageSnapshot]) -> EngineResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = lock(&self.db)?;
        let tx = conn.transaction()?;
        {
            let placeholders = (1..=28).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} ({AVERAGE_COLUMNS}) VALUES ({placeholders})
                 ON CONFLICT (game_date, player, season) DO UPDATE SET
                   week_id = excluded.week_id,
                   minutes_played = excluded.minutes_played,
                   field_goals = excluded.field_goals,
                   three_points = excluded.three_points,
                   free_throws = excluded.free_throws,
                   offensive_rebounds = excluded.offensive_rebounds,
                   defensive_rebounds = excluded.defensive_rebounds,
                   total_rebounds = excluded.total_rebounds,
                   assists = excluded.assists,
                   steals = excluded.steals,
                   blocks = excluded.blocks,
                   turnovers = excluded.turnovers,
                   points_scored = excluded.points_scored,
                   plus_minus = excluded.plus_minus,
                   game_rating_score = excluded.game_rating_score,
                   field_goal_pct = excluded.field_goal_pct,
                   three_point_pct = excluded.three_point_pct,
                   free_throw_pct = excluded.free_throw_pct,
                   overall_efficiency = excluded.overall_efficiency,
                   games_played = excluded.games_played,
                   minutes_per_game = excluded.minutes_per_game,
                   center_score = excluded.center_score,
                   guard_score = excluded.guard_score,
                   forward_score = excluded.forward_score,
                   created_timestamp = excluded.created_timestamp",
                table = horizon.table(),
            ))?;
            for r in rows {
                let s = &r.stats;
                stmt.execute(rusqlite::params![
                    r.game_date,
                    r.season,
                    r.week_id,
                    r.player,
                    s.minutes_played,
                    s.field_goals,
                    s.three_points,
                    s.free_throws,
                    s.offensive_rebounds,
                    s.defensive_rebounds,
                    s.total_rebounds,
                    s.assists,
                    s.steals,
                    s.blocks,
                    s.turnovers,
                    s.points_scored,
                    s.plus_minus,
                    s.game_rating_score,
                    s.field_goal_pct,
                    s.three_point_pct,
                    s.free_throw_pct,
                    r.scores.overall_efficiency,
                    r.games_played,
                    r.minutes_per_game,
                    r.scores.center_score,
                    r.scores.guard_score,
                    r.scores.forward_score,
                    r.created_timestamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

// ── Season metadata and raw ingestion ──

pub fn upsert_season(db: &DbPool, season: &SeasonDates) -> EngineResult<()> {
    let conn = lock(db)?;
    conn.execute(
        "INSERT OR REPLACE INTO seasons (season, season_start, season_end) VALUES (?1, ?2, ?3)",
        rusqlite::params![season.season, season.start, season.end],
    )?;
    Ok(())
}

pub fn has_date_been_loaded(db: &DbPool, game_date: NaiveDate) -> EngineResult<bool> {
    let conn = lock(db)?;
    let found = conn
        .query_row(
            "SELECT 1 FROM game_stats WHERE game_date = ?1 LIMIT 1",
            rusqlite::params![game_date],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_game_stats(db: &DbPool, records: &[RawGameStatRecord]) -> EngineResult<usize> {
    let mut conn = lock(db)?;
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let placeholders = (1..=23).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let mut stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO game_stats ({GAME_STATS_COLUMNS}) VALUES ({placeholders})"
        ))?;
        for r in records {
            inserted += stmt.execute(rusqlite::params![
                r.game_date,
                r.season,
                r.player,
                r.team,
                r.opponent,
                r.home_game,
                r.minutes_played,
                r.field_goals,
                r.field_goal_attempts,
                r.three_points,
                r.three_point_attempts,
                r.free_throws,
                r.free_throw_attempts,
                r.offensive_rebounds,
                r.defensive_rebounds,
                r.assists,
                r.steals,
                r.blocks,
                r.turnovers,
                r.personal_fouls,
                r.points_scored,
                r.plus_minus,
                r.game_rating_score,
            ])?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

// ── Query helpers for the read API ──

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AverageRow {
    pub game_date: NaiveDate,
    pub season: String,
    pub week_id: i64,
    pub player: String,
    pub minutes_played: f64,
    pub field_goals: f64,
    pub three_points: f64,
    pub free_throws: f64,
    pub offensive_rebounds: f64,
    pub defensive_rebounds: f64,
    pub total_rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turnovers: f64,
    pub points_scored: f64,
    pub plus_minus: f64,
    pub game_rating_score: f64,
    pub field_goal_pct: f64,
    pub three_point_pct: f64,
    pub free_throw_pct: f64,
    pub overall_efficiency: f64,
    pub games_played: i64,
    pub minutes_per_game: f64,
    pub center_score: f64,
    pub guard_score: f64,
    pub forward_score: f64,
    pub created_timestamp: String,
}

pub fn get_averages(
    db: &DbPool,
    horizon: Horizon,
    season: Option<&str>,
    player: Option<&str>,
    limit: usize,
) -> EngineResult<Vec<AverageRow>> {
    let conn = lock(db)?;
    let sql = format!(
        "SELECT {AVERAGE_COLUMNS} FROM {table}
         WHERE (?1 IS NULL OR season = ?1) AND (?2 IS NULL OR player = ?2)
         ORDER BY game_date DESC, player LIMIT ?3",
        table = horizon.table(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params![season, player, limit as i64], |row| {
        Ok(AverageRow {
            game_date: row.get(0)?,
            season: row.get(1)?,
            week_id: row.get(2)?,
            player: row.get(3)?,
            minutes_played: row.get(4)?,
            field_goals: row.get(5)?,
            three_points: row.get(6)?,
            free_throws: row.get(7)?,
            offensive_rebounds: row.get(8)?,
            defensive_rebounds: row.get(9)?,
            total_rebounds: row.get(10)?,
            assists: row.get(11)?,
            steals: row.get(12)?,
            blocks: row.get(13)?,
            turnovers: row.get(14)?,
            points_scored: row.get(15)?,
            plus_minus: row.get(16)?,
            game_rating_score: row.get(17)?,
            field_goal_pct: row.get(18)?,
            three_point_pct: row.get(19)?,
            free_throw_pct: row.get(20)?,
            overall_efficiency: row.get(21)?,
            games_played: row.get(22)?,
            minutes_per_game: row.get(23)?,
            center_score: row.get(24)?,
            guard_score: row.get(25)?,
            forward_score: row.get(26)?,
            created_timestamp: row.get(27)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// What one horizon's table holds right now.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HorizonTotals {
    pub horizon: Horizon,
    pub rows: i64,
    pub players: i64,
    pub latest_game_date: Option<NaiveDate>,
    pub last_written: Option<String>,
}

pub fn horizon_totals(db: &DbPool, season: Option<&str>) -> EngineResult<Vec<HorizonTotals>> {
    let conn = lock(db)?;
    Horizon::ALL
        .into_iter()
        .map(|horizon| {
            let sql = format!(
                "SELECT COUNT(*), COUNT(DISTINCT player), MAX(game_date), MAX(created_timestamp)
                 FROM {table} WHERE (?1 IS NULL OR season = ?1)",
                table = horizon.table(),
            );
            let totals = conn.query_row(&sql, [season], |row| {
                Ok(HorizonTotals {
                    horizon,
                    rows: row.get(0)?,
                    players: row.get(1)?,
                    latest_game_date: row.get(2)?,
                    last_written: row.get(3)?,
                })
            })?;
            Ok(totals)
        })
        .collect()
}

/// Feature sets read by the classification consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixAxis {
    All,
    Center,
    Guard,
    Forward,
}

impl MatrixAxis {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::All => &["overall_efficiency", "field_goals", "free_throws", "points_scored"],
            Self::Center => &["overall_efficiency", "game_rating_score", "center_score"],
            Self::Guard => &["overall_efficiency", "game_rating_score", "guard_score"],
            Self::Forward => &["overall_efficiency", "game_rating_score", "forward_score"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MatrixRow {
    pub player: String,
    /// Axis column sums, one block per horizon in horizon order.
    pub features: Vec<f64>,
}

pub fn get_matrix(db: &DbPool, from_season: &str, to_season: &str, axis: MatrixAxis) -> EngineResult<Vec<MatrixRow>> {
    let columns = axis.columns();
    let sums = columns
        .iter()
        .map(|c| format!("COALESCE(SUM({c}), 0.0)"))
        .collect::<Vec<_>>()
        .join(", ");

    let conn = lock(db)?;
    let mut by_player: BTreeMap<String, PerHorizon<Option<Vec<f64>>>> = BTreeMap::new();

    for horizon in Horizon::ALL {
        let mut stmt = conn.prepare(&format!(
            "SELECT player, {sums} FROM {table} WHERE season BETWEEN ?1 AND ?2 GROUP BY player",
            table = horizon.table(),
        ))?;
        let rows = stmt.query_map(rusqlite::params![from_season, to_season], |row| {
            let player: String = row.get(0)?;
            let values = (1..=columns.len())
                .map(|i| row.get::<_, f64>(i))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((player, values))
        })?;
        for row in rows {
            let (player, values) = row?;
            by_player.entry(player).or_default()[horizon] = Some(values);
        }
    }

    // Players absent from a horizon get zeros so rows stay aligned.
    Ok(by_player
        .into_iter()
        .map(|(player, per)| {
            let mut features = Vec::with_capacity(columns.len() * Horizon::ALL.len());
            for (_, values) in per.iter() {
                match values {
                    Some(v) => features.extend_from_slice(v),
                    None => features.extend(std::iter::repeat(0.0).take(columns.len())),
                }
            }
            MatrixRow { player, features }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CompositeScores, StatLine};
    use chrono::{TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn snapshot(player: &str, points: f64) -> AverageSnapshot {
        AverageSnapshot {
            game_date: date(8),
            season: "2019-20".into(),
            week_id: 2,
            player: player.into(),
            stats: StatLine { points_scored: points, ..StatLine::default() },
            games_played: 7,
            minutes_per_game: 31.0,
            scores: CompositeScores {
                overall_efficiency: 1.0,
                center_score: 0.5,
                guard_score: 0.25,
                forward_score: 0.125,
            },
            created_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let depot = SqliteDepot::new(init_memory_db().unwrap());
        let row = snapshot("Jane Doe", 1.5);
        depot.upsert_averages(Horizon::OneWeek, &[row.clone()]).unwrap();
        let first = get_averages(depot.pool(), Horizon::OneWeek, None, None, 10).unwrap();
        depot.upsert_averages(Horizon::OneWeek, &[row]).unwrap();
        let second = get_averages(depot.pool(), Horizon::OneWeek, None, None, 10).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_upsert_last_write_wins() {
        let depot = SqliteDepot::new(init_memory_db().unwrap());
        depot.upsert_averages(Horizon::NineWeek, &[snapshot("Jane Doe", 1.5)]).unwrap();
        depot.upsert_averages(Horizon::NineWeek, &[snapshot("Jane Doe", 2.5)]).unwrap();
        let rows = get_averages(depot.pool(), Horizon::NineWeek, Some("2019-20"), Some("Jane Doe"), 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].points_scored, 2.5);
        // other horizons untouched
        assert!(get_averages(depot.pool(), Horizon::OneWeek, None, None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_game_stats_missing_numbers_read_as_zero() {
        let db = init_memory_db().unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO game_stats (game_date, season, player, points_scored) VALUES (?1, '2019-20', 'A', 12)",
                rusqlite::params![date(3)],
            )
            .unwrap();
        }
        let depot = SqliteDepot::new(db);
        let rows = depot.game_stats_between(date(1), date(5)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].points_scored, 12);
        assert_eq!(rows[0].assists, 0);
        assert_eq!(rows[0].minutes_played, 0.0);
        assert!(depot.game_stats_between(date(4), date(5)).unwrap().is_empty());
    }

    #[test]
    fn test_seasons_and_loaded_dates() {
        let db = init_memory_db().unwrap();
        upsert_season(&db, &SeasonDates { season: "2019-20".into(), start: date(1), end: date(20) }).unwrap();
        let depot = SqliteDepot::new(db.clone());
        let seasons = depot.seasons().unwrap();
        assert_eq!(seasons.len(), 1);
        assert_eq!(seasons[0].end, date(20));

        assert!(!has_date_been_loaded(&db, date(2)).unwrap());
        let record = RawGameStatRecord {
            game_date: date(2),
            season: "2019-20".into(),
            player: "A".into(),
            ..RawGameStatRecord::default()
        };
        assert_eq!(insert_game_stats(&db, &[record]).unwrap(), 1);
        assert!(has_date_been_loaded(&db, date(2)).unwrap());
    }

    #[test]
    fn test_horizon_totals() {
        let depot = SqliteDepot::new(init_memory_db().unwrap());
        let empty = horizon_totals(depot.pool(), None).unwrap();
        assert_eq!(empty.len(), 3);
        assert!(empty.iter().all(|t| t.rows == 0 && t.latest_game_date.is_none()));

        let mut later = snapshot("A", 2.0);
        later.game_date = date(15);
        depot.upsert_averages(Horizon::OneWeek, &[snapshot("A", 1.0), later, snapshot("B", 1.0)]).unwrap();

        let totals = horizon_totals(depot.pool(), Some("2019-20")).unwrap();
        assert_eq!(totals[0].horizon, Horizon::OneWeek);
        assert_eq!(totals[0].rows, 3);
        assert_eq!(totals[0].players, 2);
        assert_eq!(totals[0].latest_game_date, Some(date(15)));
        assert!(totals[0].last_written.as_deref().unwrap().starts_with("2024-03-01"));
        assert_eq!(totals[2].rows, 0);

        let other = horizon_totals(depot.pool(), Some("2018-19")).unwrap();
        assert_eq!(other[0].rows, 0);
    }

    #[test]
    fn test_matrix_zero_fills_missing_horizons() {
        let depot = SqliteDepot::new(init_memory_db().unwrap());
        depot.upsert_averages(Horizon::OneWeek, &[snapshot("A", 2.0)]).unwrap();
        depot.upsert_averages(Horizon::NineWeek, &[snapshot("A", 3.0), snapshot("B", 4.0)]).unwrap();

        let matrix = get_matrix(depot.pool(), "2019-20", "2019-20", MatrixAxis::All).unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0].player, "A");
        assert_eq!(matrix[0].features, vec![1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 3.0]);
        assert_eq!(matrix[1].features[..8], [0.0; 8]);
        assert_eq!(matrix[1].features[11], 4.0);
    }
}
