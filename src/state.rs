use chrono::{DateTime, NaiveDate, Utc};
use portable_atomic::{AtomicU64, Ordering};
use std::ops::{Index, IndexMut};

// ── Rolling horizons ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    OneWeek,
    ThreeWeek,
    NineWeek,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::OneWeek, Horizon::ThreeWeek, Horizon::NineWeek];

    /// Window length in units of 7 calendar days.
    #[inline]
    pub fn weeks(self) -> i64 {
        match self {
            Self::OneWeek => 1,
            Self::ThreeWeek => 3,
            Self::NineWeek => 9,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::OneWeek => 0,
            Self::ThreeWeek => 1,
            Self::NineWeek => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneWeek => "one_week",
            Self::ThreeWeek => "three_week",
            Self::NineWeek => "nine_week",
        }
    }

    /// Persisted table holding this horizon's averages.
    pub fn table(self) -> &'static str {
        match self {
            Self::OneWeek => "running_player_averages_one_week",
            Self::ThreeWeek => "running_player_averages_three_week",
            Self::NineWeek => "running_player_averages_nine_week",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown horizon {0}")]
pub struct ParseHorizonError(pub String);

impl std::str::FromStr for Horizon {
    type Err = ParseHorizonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_week" | "1w" => Ok(Self::OneWeek),
            "three_week" | "3w" => Ok(Self::ThreeWeek),
            "nine_week" | "9w" => Ok(Self::NineWeek),
            _ => Err(ParseHorizonError(s.to_string())),
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per horizon. The horizon set is closed, so this is a plain array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerHorizon<T>([T; 3]);

impl<T> PerHorizon<T> {
    pub fn from_fn(mut f: impl FnMut(Horizon) -> T) -> Self {
        Self([
            f(Horizon::OneWeek),
            f(Horizon::ThreeWeek),
            f(Horizon::NineWeek),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Horizon, &T)> {
        Horizon::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<Horizon> for PerHorizon<T> {
    type Output = T;

    #[inline]
    fn index(&self, horizon: Horizon) -> &T {
        &self.0[horizon.index()]
    }
}

impl<T> IndexMut<Horizon> for PerHorizon<T> {
    #[inline]
    fn index_mut(&mut self, horizon: Horizon) -> &mut T {
        &mut self.0[horizon.index()]
    }
}

// ── Seasons ──

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SeasonDates {
    pub season: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

// ── Raw box-score line (immutable once collected) ──

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct RawGameStatRecord {
    pub game_date: NaiveDate,
    pub season: String,
    pub player: String,
    pub team: String,
    pub opponent: String,
    pub home_game: bool,
    /// Fractional minutes.
    pub minutes_played: f64,
    pub field_goals: i64,
    pub field_goal_attempts: i64,
    pub three_points: i64,
    pub three_point_attempts: i64,
    pub free_throws: i64,
    pub free_throw_attempts: i64,
    pub offensive_rebounds: i64,
    pub defensive_rebounds: i64,
    pub assists: i64,
    pub steals: i64,
    pub blocks: i64,
    pub turnovers: i64,
    pub personal_fouls: i64,
    pub points_scored: i64,
    pub plus_minus: i64,
    pub game_rating_score: f64,
}

// ── Averaged numeric fields ──

/// Every numeric field that is normalized and then averaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct StatLine {
    pub minutes_played: f64,
    pub field_goals: f64,
    pub field_goal_attempts: f64,
    pub three_points: f64,
    pub three_point_attempts: f64,
    pub free_throws: f64,
    pub free_throw_attempts: f64,
    pub offensive_rebounds: f64,
    pub defensive_rebounds: f64,
    pub total_rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turnovers: f64,
    pub personal_fouls: f64,
    pub points_scored: f64,
    pub plus_minus: f64,
    pub game_rating_score: f64,
    pub field_goal_pct: f64,
    pub three_point_pct: f64,
    pub free_throw_pct: f64,
}

impl StatLine {
    #[inline]
    pub fn add_assign(&mut self, o: &StatLine) {
        self.minutes_played += o.minutes_played;
        self.field_goals += o.field_goals;
        self.field_goal_attempts += o.field_goal_attempts;
        self.three_points += o.three_points;
        self.three_point_attempts += o.three_point_attempts;
        self.free_throws += o.free_throws;
        self.free_throw_attempts += o.free_throw_attempts;
        self.offensive_rebounds += o.offensive_rebounds;
        self.defensive_rebounds += o.defensive_rebounds;
        self.total_rebounds += o.total_rebounds;
        self.assists += o.assists;
        self.steals += o.steals;
        self.blocks += o.blocks;
        self.turnovers += o.turnovers;
        self.personal_fouls += o.personal_fouls;
        self.points_scored += o.points_scored;
        self.plus_minus += o.plus_minus;
        self.game_rating_score += o.game_rating_score;
        self.field_goal_pct += o.field_goal_pct;
        self.three_point_pct += o.three_point_pct;
        self.free_throw_pct += o.free_throw_pct;
    }

    #[inline]
    pub fn divided_by(mut self, divisor: f64) -> StatLine {
        self.minutes_played /= divisor;
        self.field_goals /= divisor;
        self.field_goal_attempts /= divisor;
        self.three_points /= divisor;
        self.three_point_attempts /= divisor;
        self.free_throws /= divisor;
        self.free_throw_attempts /= divisor;
        self.offensive_rebounds /= divisor;
        self.defensive_rebounds /= divisor;
        self.total_rebounds /= divisor;
        self.assists /= divisor;
        self.steals /= divisor;
        self.blocks /= divisor;
        self.turnovers /= divisor;
        self.personal_fouls /= divisor;
        self.points_scored /= divisor;
        self.plus_minus /= divisor;
        self.game_rating_score /= divisor;
        self.field_goal_pct /= divisor;
        self.three_point_pct /= divisor;
        self.free_throw_pct /= divisor;
        self
    }
}

/// Normalized copy of one raw record. Lives only inside an accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedStatSnapshot {
    pub player: String,
    pub season: String,
    pub game_date: NaiveDate,
    /// Week of the season the game fell in, 1-based.
    pub week_id: i64,
    pub games_played: u32,
    /// Un-normalized minutes, kept for minutes-per-game.
    pub raw_minutes: f64,
    pub stats: StatLine,
}

// ── Persisted output row ──

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CompositeScores {
    pub overall_efficiency: f64,
    pub center_score: f64,
    pub guard_score: f64,
    pub forward_score: f64,
}

/// Keyed by (game_date, player, season).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AverageSnapshot {
    pub game_date: NaiveDate,
    pub season: String,
    pub week_id: i64,
    pub player: String,
    pub stats: StatLine,
    pub games_played: u32,
    pub minutes_per_game: f64,
    pub scores: CompositeScores,
    pub created_timestamp: DateTime<Utc>,
}

// ── Controller state machine ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    AwaitingSeason,
    ProcessingDay(NaiveDate),
    Done,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingSeason => write!(f, "awaiting_season"),
            Self::ProcessingDay(d) => write!(f, "processing_day({d})"),
            Self::Done => write!(f, "done"),
        }
    }
}

// ── Lock-free run counters (shared by parallel season runs) ──

#[derive(Debug, Default)]
pub struct RunCounters {
    pub seasons_completed: AtomicU64,
    pub days_processed: AtomicU64,
    pub records_processed: AtomicU64,
    pub rolling_flushes: AtomicU64,
    pub forced_flushes: AtomicU64,
    pub rows_upserted: AtomicU64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn to_json(&self) -> serde_json::Value {
        use Ordering::Relaxed;
        serde_json::json!({
            "seasons_completed": self.seasons_completed.load(Relaxed),
            "days_processed": self.days_processed.load(Relaxed),
            "records_processed": self.records_processed.load(Relaxed),
            "rolling_flushes": self.rolling_flushes.load(Relaxed),
            "forced_flushes": self.forced_flushes.load(Relaxed),
            "rows_upserted": self.rows_upserted.load(Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_horizon_indexing() {
        let mut p = PerHorizon::from_fn(|h| h.weeks());
        assert_eq!(p[Horizon::OneWeek], 1);
        assert_eq!(p[Horizon::NineWeek], 9);
        p[Horizon::ThreeWeek] = 30;
        let collected: Vec<_> = p.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(
            collected,
            vec![(Horizon::OneWeek, 1), (Horizon::ThreeWeek, 30), (Horizon::NineWeek, 9)]
        );
    }

    #[test]
    fn test_horizon_names_round_trip() {
        for h in Horizon::ALL {
            assert_eq!(h.as_str().parse::<Horizon>(), Ok(h));
            assert!(h.table().ends_with(h.as_str()));
        }
        assert_eq!("9w".parse::<Horizon>(), Ok(Horizon::NineWeek));
        let err = "two_week".parse::<Horizon>().unwrap_err();
        assert_eq!(err.to_string(), "unknown horizon two_week");
    }

    #[test]
    fn test_stat_line_mean() {
        let mut sum = StatLine::default();
        let one = StatLine { points_scored: 3.0, assists: 1.0, ..StatLine::default() };
        sum.add_assign(&one);
        sum.add_assign(&one);
        let mean = sum.divided_by(2.0);
        assert_eq!(mean, one);
    }
}
