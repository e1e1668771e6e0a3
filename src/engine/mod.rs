pub mod aggregator;
pub mod cache;
pub mod controller;

use crate::state::{PerHorizon, SeasonDates};
use crate::stats::composite::CompositeConfig;
use cache::{HorizonFlushTracker, HorizonState};

/// All mutable state of one season run. Owned by the controller for the
/// lifetime of the run and passed explicitly to every engine call; nothing
/// is shared between seasons.
#[derive(Debug, Clone)]
pub struct SeasonContext {
    pub season: SeasonDates,
    pub cache: PerHorizon<HorizonState>,
    pub tracker: HorizonFlushTracker,
    pub composite: CompositeConfig,
}

impl SeasonContext {
    pub fn new(season: SeasonDates, composite: CompositeConfig) -> Self {
        let tracker = HorizonFlushTracker::new(season.start);
        Self {
            season,
            cache: PerHorizon::default(),
            tracker,
            composite,
        }
    }
}
