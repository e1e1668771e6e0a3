//! Position-oriented composite scores.
//!
//! Inputs are normalized, averaged fields; every score is wrapped in
//! `normalize` once more. The weights are calibration parameters.

use super::normalize::normalize;
use crate::state::{CompositeScores, StatLine};

#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeConfig {
    /// Divide the overall-efficiency sum by minutes per game.
    pub efficiency_per_minute: bool,
}

pub fn compute_scores(s: &StatLine, minutes_per_game: f64, cfg: CompositeConfig) -> CompositeScores {
    let mut efficiency = efficiency_sum(s);
    if cfg.efficiency_per_minute && minutes_per_game > 0.0 {
        efficiency /= minutes_per_game;
    }

    CompositeScores {
        overall_efficiency: normalize(efficiency),
        center_score: normalize(center_sum(s)),
        guard_score: normalize(guard_sum(s)),
        forward_score: normalize(forward_sum(s)),
    }
}

#[inline]
fn efficiency_sum(s: &StatLine) -> f64 {
    s.points_scored
        + 0.4 * s.field_goals
        + 0.4 * s.three_points
        + 0.7 * s.offensive_rebounds
        + 0.3 * s.defensive_rebounds
        + s.steals
        + 0.7 * s.assists
        + 0.7 * s.blocks
        - 0.7 * s.field_goal_attempts
        - 0.4 * (s.free_throw_attempts - s.free_throws)
        - 0.4 * (s.three_point_attempts - s.three_points)
        - 0.4 * s.personal_fouls
        + 0.7 * s.minutes_played
        - s.turnovers
}

#[inline]
fn center_sum(s: &StatLine) -> f64 {
    0.8 * (s.offensive_rebounds + s.defensive_rebounds) + s.blocks + 0.6 * s.field_goals + s.minutes_played
}

#[inline]
fn guard_sum(s: &StatLine) -> f64 {
    0.8 * (s.assists + s.steals) + s.three_points * s.points_scored - s.turnovers + s.minutes_played
}

#[inline]
fn forward_sum(s: &StatLine) -> f64 {
    s.field_goals * s.points_scored + 0.4 * s.three_point_attempts - s.three_points + s.minutes_played
}
