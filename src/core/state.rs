use std::time::Duration;

use crate::core::ServoRole;

/// Progress through one firing cycle. Rebuilt from scratch on every run.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default)]
pub enum FiringState {
    #[default]
    Idle,
    TriggerClosed,
    ElasticsStretched,
    TriggerOpen,
    ElasticsReleased,
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum RangeEnd {
    Min,
    Max,
}

/// One servo command followed by a hold before the next step.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct FiringStep {
    pub state: FiringState,
    pub servo: ServoRole,
    pub end: RangeEnd,
    pub hold: Duration,
}

impl FiringStep {
    pub fn close_trigger(hold: Duration) -> Self {
        FiringStep {
            state: FiringState::TriggerClosed,
            servo: ServoRole::Trigger,
            end: RangeEnd::Max,
            hold,
        }
    }

    pub fn stretch_elastics(hold: Duration) -> Self {
        FiringStep {
            state: FiringState::ElasticsStretched,
            servo: ServoRole::Elastics,
            end: RangeEnd::Max,
            hold,
        }
    }

    pub fn open_trigger(hold: Duration) -> Self {
        FiringStep {
            state: FiringState::TriggerOpen,
            servo: ServoRole::Trigger,
            end: RangeEnd::Min,
            hold,
        }
    }

    pub fn release_elastics(hold: Duration) -> Self {
        FiringStep {
            state: FiringState::ElasticsReleased,
            servo: ServoRole::Elastics,
            end: RangeEnd::Min,
            hold,
        }
    }
}

/// Hold durations between the steps of a firing cycle and of the rest pass
/// run once at start.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct FiringTimings {
    pub after_close: Duration,
    pub after_stretch: Duration,
    pub after_open: Duration,
    pub after_release: Duration,
    pub rest_after_close: Duration,
    pub rest_after_release: Duration,
}

impl Default for FiringTimings {
    fn default() -> Self {
        Self {
            after_close: Duration::from_millis(1000),
            after_stretch: Duration::from_millis(1000),
            after_open: Duration::from_millis(1000),
            after_release: Duration::from_millis(2000),
            rest_after_close: Duration::from_millis(1000),
            rest_after_release: Duration::from_millis(2000),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct FiringPlan {
    steps: Vec<FiringStep>,
}

impl FiringPlan {
    /// close trigger, stretch elastics, open trigger, release elastics,
    /// close trigger.
    pub fn fire(timings: &FiringTimings) -> Self {
        FiringPlan {
            steps: vec![
                FiringStep::close_trigger(timings.after_close),
                FiringStep::stretch_elastics(timings.after_stretch),
                FiringStep::open_trigger(timings.after_open),
                FiringStep::release_elastics(timings.after_release),
                FiringStep::close_trigger(Duration::ZERO),
            ],
        }
    }

    /// Brings the mechanism to its blocked rest position.
    pub fn rest(timings: &FiringTimings) -> Self {
        FiringPlan {
            steps: vec![
                FiringStep::close_trigger(timings.rest_after_close),
                FiringStep::release_elastics(timings.rest_after_release),
                FiringStep::close_trigger(Duration::ZERO),
            ],
        }
    }

    pub fn steps(&self) -> &[FiringStep] {
        &self.steps
    }

    pub fn total_hold(&self) -> Duration {
        self.steps.iter().map(|step| step.hold).sum()
    }
}
