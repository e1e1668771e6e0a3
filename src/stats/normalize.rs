//! Stat normalization.
//!
//! normalize(x) = asinh(x / 2) / ln(10)
//!
//! Behaves like log10(x) for large x, is near-linear around zero and odd,
//! so it is defined for the zero and negative values that plus-minus and
//! game ratings produce. Apply exactly once per field.

use crate::state::{NormalizedStatSnapshot, RawGameStatRecord, StatLine};

#[inline]
pub fn normalize(value: f64) -> f64 {
    (value / 2.0).asinh() / std::f64::consts::LN_10
}

/// made / attempted, with zero attempts defined as a zero ratio.
#[inline]
pub fn ratio(made: i64, attempted: i64) -> f64 {
    if attempted == 0 {
        0.0
    } else {
        made as f64 / attempted as f64
    }
}

/// Build the normalized snapshot for one raw line.
/// `games_played` is left at 0; each horizon stamps its own counter.
pub fn normalize_record(record: &RawGameStatRecord, week_id: i64) -> NormalizedStatSnapshot {
    let n = |v: i64| normalize(v as f64);

    let stats = StatLine {
        minutes_played: normalize(record.minutes_played),
        field_goals: n(record.field_goals),
        field_goal_attempts: n(record.field_goal_attempts),
        three_points: n(record.three_points),
        three_point_attempts: n(record.three_point_attempts),
        free_throws: n(record.free_throws),
        free_throw_attempts: n(record.free_throw_attempts),
        offensive_rebounds: n(record.offensive_rebounds),
        defensive_rebounds: n(record.defensive_rebounds),
        total_rebounds: n(record.offensive_rebounds + record.defensive_rebounds),
        assists: n(record.assists),
        steals: n(record.steals),
        blocks: n(record.blocks),
        turnovers: n(record.turnovers),
        personal_fouls: n(record.personal_fouls),
        points_scored: n(record.points_scored),
        plus_minus: n(record.plus_minus),
        game_rating_score: normalize(record.game_rating_score),
        field_goal_pct: normalize(ratio(record.field_goals, record.field_goal_attempts)),
        three_point_pct: normalize(ratio(record.three_points, record.three_point_attempts)),
        free_throw_pct: normalize(ratio(record.free_throws, record.free_throw_attempts)),
    };

    NormalizedStatSnapshot {
        player: record.player.trim().to_string(),
        season: record.season.clone(),
        game_date: record.game_date,
        week_id,
        games_played: 0,
        raw_minutes: record.minutes_played,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_fixed_point() {
        assert_eq!(normalize(0.0), 0.0);
    }

    #[test]
    fn test_odd_symmetry() {
        for x in [0.5, 1.0, 7.0, 42.0, 1e4] {
            assert!((normalize(-x) + normalize(x)).abs() < 1e-12, "x={x}");
        }
    }

    #[test]
    fn test_monotonic() {
        let mut prev = normalize(-100.0);
        let mut x = -100.0;
        while x < 100.0 {
            x += 0.25;
            let cur = normalize(x);
            assert!(cur > prev, "not increasing at {x}");
            prev = cur;
        }
    }

    #[test]
    fn test_large_values_behave_like_log10() {
        // asinh(x/2) ~ ln(x) for large x
        let x = 1e6;
        assert!((normalize(x) - x.log10()).abs() < 1e-6);
    }

    #[test]
    fn test_ratio_zero_attempts() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(3, 4), 0.75);
    }

    #[test]
    fn test_normalize_record_fields() {
        let record = RawGameStatRecord {
            player: "  Jane Doe ".into(),
            season: "2019-20".into(),
            minutes_played: 30.5,
            field_goals: 4,
            field_goal_attempts: 8,
            offensive_rebounds: 2,
            defensive_rebounds: 5,
            plus_minus: -6,
            ..RawGameStatRecord::default()
        };
        let snap = normalize_record(&record, 3);
        assert_eq!(snap.player, "Jane Doe");
        assert_eq!(snap.week_id, 3);
        assert_eq!(snap.raw_minutes, 30.5);
        assert_eq!(snap.stats.total_rebounds, normalize(7.0));
        assert_eq!(snap.stats.field_goal_pct, normalize(0.5));
        assert_eq!(snap.stats.three_point_pct, 0.0);
        assert!(snap.stats.plus_minus < 0.0);
    }
}
