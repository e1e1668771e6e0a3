use crate::state::{Horizon, NormalizedStatSnapshot, PerHorizon};
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};

/// Per (horizon, player) buffer of normalized snapshots, oldest first.
#[derive(Debug, Clone, Default)]
pub struct PlayerHorizonAccumulator {
    entries: VecDeque<NormalizedStatSnapshot>,
    games_played: u32,
}

impl PlayerHorizonAccumulator {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &NormalizedStatSnapshot> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn oldest(&self) -> Option<&NormalizedStatSnapshot> {
        self.entries.front()
    }

    pub(super) fn push(&mut self, snapshot: NormalizedStatSnapshot) {
        self.entries.push_back(snapshot);
    }

    /// Drop exactly the oldest entry. The window slides instead of resetting.
    pub(super) fn evict_oldest(&mut self) -> Option<NormalizedStatSnapshot> {
        self.entries.pop_front()
    }
}

/// All accumulators of one horizon.
#[derive(Debug, Clone, Default)]
pub struct HorizonState {
    accumulators: HashMap<String, PlayerHorizonAccumulator>,
}

impl HorizonState {
    pub fn get_or_create_accumulator(&mut self, player: &str) -> &mut PlayerHorizonAccumulator {
        self.accumulators.entry(player.to_string()).or_default()
    }

    #[cfg(test)]
    pub fn accumulator(&self, player: &str) -> Option<&PlayerHorizonAccumulator> {
        self.accumulators.get(player)
    }

    /// Post-increment games-played counter for `player` under this horizon.
    pub fn increment_games_played(&mut self, player: &str) -> u32 {
        let acc = self.get_or_create_accumulator(player);
        acc.games_played += 1;
        acc.games_played
    }

    /// Horizon-wide reset: every player's counter goes back to zero together,
    /// so "games played in this window" follows the roster's shared cadence
    /// rather than each player's own flush boundary.
    pub fn reset_games_played(&mut self) {
        for acc in self.accumulators.values_mut() {
            acc.games_played = 0;
        }
    }

    #[cfg(test)]
    pub fn games_played(&self, player: &str) -> u32 {
        self.accumulators.get(player).map_or(0, |a| a.games_played)
    }

    /// Snapshots held across all players of this horizon.
    pub fn buffered(&self) -> usize {
        self.accumulators.values().map(PlayerHorizonAccumulator::len).sum()
    }

    pub fn players(&self) -> impl Iterator<Item = (&String, &PlayerHorizonAccumulator)> {
        self.accumulators.iter()
    }
}

/// Last-flush reference date per horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonFlushTracker {
    dates: PerHorizon<NaiveDate>,
}

impl HorizonFlushTracker {
    pub fn new(season_start: NaiveDate) -> Self {
        Self {
            dates: PerHorizon::from_fn(|_| season_start),
        }
    }

    #[inline]
    pub fn reference(&self, horizon: Horizon) -> NaiveDate {
        self.dates[horizon]
    }

    pub(super) fn advance(&mut self, horizon: Horizon, next_date: NaiveDate) {
        self.dates[horizon] = next_date;
    }
}
