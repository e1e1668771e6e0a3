//! Ingestion boundary for collector output.
//!
//! The collector emits one JSON object per box-score line, keyed by the
//! source table's `data-stat` names with text cells. Cells are converted into
//! a `RawGameStatRecord` here; nothing past this point sees string-keyed rows.

use crate::db::{self, DbPool, StatDepot};
use crate::errors::{EngineError, EngineResult};
use crate::state::RawGameStatRecord;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;

pub type CollectedRow = HashMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ImportSummary {
    pub game_date: NaiveDate,
    pub inserted: usize,
    pub skipped_rows: usize,
    pub already_loaded: bool,
}

/// Load one day of collector rows. Dates already present are left alone.
pub fn import_day(
    db: &DbPool,
    depot: &impl StatDepot,
    season: &str,
    game_date: NaiveDate,
    json: &str,
) -> EngineResult<ImportSummary> {
    if !depot.seasons()?.iter().any(|s| s.season == season) {
        return Err(EngineError::Config(format!("incorrect season key {season}")));
    }

    let mut summary = ImportSummary { game_date, ..ImportSummary::default() };
    if db::has_date_been_loaded(db, game_date)? {
        tracing::info!(date = %game_date, "date already loaded, skipping");
        summary.already_loaded = true;
        return Ok(summary);
    }

    let rows: Vec<CollectedRow> = serde_json::from_str(json)?;
    let (records, skipped) = convert_rows(&rows, game_date, season);
    summary.skipped_rows = skipped;
    summary.inserted = if records.is_empty() { 0 } else { db::insert_game_stats(db, &records)? };

    tracing::info!(
        date = %game_date,
        inserted = summary.inserted,
        skipped = summary.skipped_rows,
        "collector rows imported"
    );
    Ok(summary)
}

/// Convert every row; rows that fail conversion are logged and skipped.
pub fn convert_rows(rows: &[CollectedRow], game_date: NaiveDate, season: &str) -> (Vec<RawGameStatRecord>, usize) {
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0;
    for row in rows {
        match convert_row(row, game_date, season) {
            Ok(r) => records.push(r),
            Err(e) => {
                tracing::warn!(error = %e, row = ?row, "skipping collector row");
                skipped += 1;
            }
        }
    }
    (records, skipped)
}

pub fn convert_row(row: &CollectedRow, game_date: NaiveDate, season: &str) -> EngineResult<RawGameStatRecord> {
    let player = cell(row, "player").trim().to_string();
    if player.is_empty() {
        return Err(EngineError::Parse("row without player".into()));
    }

    let int = |key: &str| parse_int(&cell(row, key)).map_err(|e| EngineError::Parse(format!("{key}: {e}")));

    Ok(RawGameStatRecord {
        game_date,
        season: season.to_string(),
        player,
        team: cell(row, "team_id").trim().to_string(),
        opponent: cell(row, "opp_id").trim().to_string(),
        // "@" marks an away game
        home_game: cell(row, "game_location").trim() != "@",
        minutes_played: parse_minutes(&cell(row, "mp")).map_err(|e| EngineError::Parse(format!("mp: {e}")))?,
        field_goals: int("fg")?,
        field_goal_attempts: int("fga")?,
        three_points: int("fg3")?,
        three_point_attempts: int("fg3a")?,
        free_throws: int("ft")?,
        free_throw_attempts: int("fta")?,
        offensive_rebounds: int("orb")?,
        defensive_rebounds: int("drb")?,
        assists: int("ast")?,
        steals: int("stl")?,
        blocks: int("blk")?,
        turnovers: int("tov")?,
        personal_fouls: int("pf")?,
        points_scored: int("pts")?,
        plus_minus: int("plus_minus")?,
        game_rating_score: parse_real(&cell(row, "game_score"))
            .map_err(|e| EngineError::Parse(format!("game_score: {e}")))?,
    })
}

/// Cell text; missing keys and nulls read as blank. Numeric cells with no
/// fractional part are printed as integers so counting columns still parse.
fn cell(row: &CollectedRow, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn parse_int(text: &str) -> Result<i64, std::num::ParseIntError> {
    let t = text.trim();
    if t.is_empty() {
        return Ok(0);
    }
    // "+5" is how plus-minus is printed
    t.trim_start_matches('+').parse()
}

fn parse_real(text: &str) -> Result<f64, std::num::ParseFloatError> {
    let t = text.trim();
    if t.is_empty() {
        return Ok(0.0);
    }
    t.parse()
}

/// "MM:SS" to fractional minutes. A bare number is taken as minutes.
pub fn parse_minutes(text: &str) -> Result<f64, String> {
    let t = text.trim();
    if t.is_empty() {
        return Ok(0.0);
    }
    let Some((min, sec)) = t.split_once(':') else {
        return match t.parse::<f64>() {
            Ok(m) if m >= 0.0 => Ok(m),
            _ => Err(format!("{t}: not a minutes value")),
        };
    };
    let min: u32 = min.trim().parse().map_err(|e| format!("{t}: {e}"))?;
    let sec: u32 = sec.trim().parse().map_err(|e| format!("{t}: {e}"))?;
    if sec >= 60 {
        return Err(format!("{t}: seconds out of range"));
    }
    Ok(f64::from(min) + f64::from(sec) / 60.0)
}
