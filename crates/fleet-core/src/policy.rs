/// What to do when a task ends in `Failed`, `Lost` or `Killed`.
///
/// The default (`max_retries = 0`) aborts the whole run on the first such task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra launches allowed per work unit.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn never() -> Self {
        Self { max_retries: 0 }
    }

    pub fn retries(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Whether a task that just failed on attempt `attempt` (1-based) gets another launch.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}
