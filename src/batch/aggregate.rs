use super::job::BatchOutcome;

/// One result slot per job, addressed by the job's original index.
#[derive(Debug)]
pub struct ResultArena {
    slots: Vec<Option<BatchOutcome>>,
}

impl ResultArena {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Store the outcome for `index`. Each index is written once; a second write is ignored.
    pub fn place(&mut self, index: usize, outcome: BatchOutcome) {
        let len = self.slots.len();
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(outcome),
            Some(_) => tracing::warn!(index, "result slot written twice; keeping first"),
            None => tracing::warn!(index, len, "result index out of range"),
        }
    }

    /// Every slot resolved; jobs no worker ever claimed become `Cancelled`.
    pub fn into_outcomes(self) -> Vec<BatchOutcome> {
        self.into_outcomes_or(BatchOutcome::Cancelled)
    }

    /// Every slot resolved, filling empty ones with `missing`.
    pub fn into_outcomes_or(self, missing: BatchOutcome) -> Vec<BatchOutcome> {
        self.slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| missing.clone()))
            .collect()
    }
}

/// Ordered texts of the jobs that produced something, in original input order.
///
/// Failed, cancelled and blank results are dropped without a placeholder.
pub fn finalize(outcomes: &[BatchOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            BatchOutcome::Text(text) if !text.trim().is_empty() => Some(text.clone()),
            _ => None,
        })
        .collect()
}
