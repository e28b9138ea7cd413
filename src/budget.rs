use crate::config::BudgetConfig;
use crate::error::{PipelineError, PipelineResult};
use tracing::{info, warn};

/// Anything with a realized length in seconds.
pub trait Timed {
    fn duration(&self) -> f64;
}

impl Timed for f64 {
    fn duration(&self) -> f64 {
        *self
    }
}

/// Duration policy applied to one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetPolicy {
    pub min_duration: f64,
    pub max_duration: f64,
    /// Length of the transition sound charged after every accepted segment.
    pub transition: f64,
}

impl BudgetPolicy {
    pub fn new(config: &BudgetConfig, transition: f64) -> Self {
        Self {
            min_duration: config.min_duration,
            max_duration: config.max_duration,
            transition: transition.max(0.0),
        }
    }
}

/// An accepted segment placed on the global timeline.
#[derive(Debug, Clone)]
pub struct TimelineSlot<T> {
    pub segment: T,
    /// Seconds from the start of the narration track.
    pub offset: f64,
    /// Candidate position, which picks the caption color.
    pub color_index: usize,
}

/// Result of packing candidates under the ceiling.
#[derive(Debug, Clone)]
pub struct Allocation<T> {
    pub title: Option<TimelineSlot<T>>,
    pub slots: Vec<TimelineSlot<T>>,
    /// Running total after the title and after every accepted comment.
    pub running_totals: Vec<f64>,
    pub total: f64,
    /// Candidates left out once the ceiling was reached.
    pub dropped: usize,
}

impl<T> Allocation<T> {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.slots.is_empty()
    }

    /// Reject the run if the packed narration is below the floor.
    pub fn check(&self, policy: &BudgetPolicy) -> PipelineResult<()> {
        if self.is_empty() {
            return Err(PipelineError::NoNarration);
        }
        if self.total < policy.min_duration {
            return Err(PipelineError::BelowMinimumDuration {
                actual: self.total,
                minimum: policy.min_duration,
            });
        }
        Ok(())
    }
}

/// Greedy first-fit packer: keeps input order, never looks ahead.
pub struct BudgetAllocator {
    policy: BudgetPolicy,
}

impl BudgetAllocator {
    pub fn new(policy: BudgetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Pack the title and comment candidates without judging the floor.
    pub fn allocate<T: Timed>(&self, title: Option<T>, candidates: Vec<T>) -> Allocation<T> {
        let transition = self.policy.transition;
        let mut total = 0.0;
        let mut running_totals = Vec::with_capacity(candidates.len() + 1);

        let title = match title {
            Some(segment) if segment.duration() + transition <= self.policy.max_duration => {
                total = segment.duration() + transition;
                running_totals.push(total);
                Some(TimelineSlot {
                    segment,
                    offset: 0.0,
                    color_index: 0,
                })
            }
            Some(segment) => {
                warn!(
                    duration = segment.duration(),
                    "Title narration alone exceeds the ceiling, leaving it out"
                );
                None
            }
            None => None,
        };

        let candidate_count = candidates.len();
        let mut slots = Vec::with_capacity(candidate_count);
        for (index, segment) in candidates.into_iter().enumerate() {
            let projected = total + segment.duration() + transition;
            if projected > self.policy.max_duration {
                info!(
                    projected,
                    ceiling = self.policy.max_duration,
                    "Ceiling reached, dropping remaining comments"
                );
                break;
            }
            slots.push(TimelineSlot {
                segment,
                offset: total,
                color_index: index,
            });
            total = projected;
            running_totals.push(total);
        }

        let dropped = candidate_count - slots.len();
        Allocation {
            title,
            slots,
            running_totals,
            total,
            dropped,
        }
    }

    /// Pack and apply the floor.
    pub fn admit<T: Timed>(
        &self,
        title: Option<T>,
        candidates: Vec<T>,
    ) -> PipelineResult<Allocation<T>> {
        let allocation = self.allocate(title, candidates);
        allocation.check(&self.policy)?;
        Ok(allocation)
    }
}
