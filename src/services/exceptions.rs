//! Exception resolver: approved time off and availability overrides

use chrono::{DateTime, Utc};

use crate::models::{AvailabilityOverride, OverrideEffect, TimeOff, TimeWindow};

/// Exceptions loaded for one staff member over a range
#[derive(Debug, Clone, Default)]
pub struct ExceptionResolver {
    time_off: Vec<TimeOff>,
    overrides: Vec<AvailabilityOverride>,
}

impl ExceptionResolver {
    pub fn new(time_off: Vec<TimeOff>, overrides: Vec<AvailabilityOverride>) -> Self {
        Self { time_off, overrides }
    }

    /// First approved time off strictly overlapping the window
    pub fn time_off_conflict(&self, window: &TimeWindow) -> Option<&TimeOff> {
        self.time_off.iter().find(|t| t.blocks(window))
    }

    pub fn has_time_off_conflict(&self, window: &TimeWindow) -> bool {
        self.time_off_conflict(window).is_some()
    }

    /// Override deciding the effect at `instant`: the most recently created
    /// active override covering it
    pub fn governing_override(&self, instant: DateTime<Utc>) -> Option<&AvailabilityOverride> {
        self.overrides
            .iter()
            .filter(|o| o.covers(instant))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
    }

    pub fn override_effect(&self, instant: DateTime<Utc>) -> OverrideEffect {
        self.governing_override(instant)
            .map_or(OverrideEffect::None, |o| o.effect())
    }
}
