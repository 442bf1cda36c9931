//! Explicit deadlines carried into I/O calls
//!
//! A `Deadline` is created once per operation and every await inside that
//! operation is bounded by the same instant, so the total time spent never
//! exceeds the budget no matter how many reads or writes it takes.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in for "never" when a budget does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Absolute point in time an operation must finish by
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

/// The deadline passed before the future completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub budget: Duration,
}

impl std::fmt::Display for Expired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deadline of {:?} exceeded", self.budget)
    }
}

impl std::error::Error for Expired {}

impl Deadline {
    /// Deadline `budget` from now; budgets past the clock's range saturate
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(budget)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at, budget }
    }

    /// Total budget this deadline was created with
    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Drive `fut` until it completes or the deadline passes
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Expired>
    where
        F: Future,
    {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| Expired {
                budget: self.budget,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_future_within_budget_completes() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let value = deadline
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                42
            })
            .await;
        assert_eq!(value, Ok(42));
        assert!(!deadline.is_expired());
    }

    #[tokio::test]
    async fn test_budget_shared_across_calls() {
        let deadline = Deadline::after(Duration::from_millis(300));

        let first = deadline.run(tokio::time::sleep(Duration::from_millis(200))).await;
        assert!(first.is_ok());

        // About 100ms left even though this call alone would fit in 300ms
        let second = deadline.run(tokio::time::sleep(Duration::from_millis(200))).await;
        assert_eq!(
            second,
            Err(Expired {
                budget: Duration::from_millis(300)
            })
        );
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_huge_budget_saturates() {
        let deadline = Deadline::after(Duration::MAX);
        assert_eq!(deadline.budget(), Duration::MAX);
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(86_400 * 365));

        let value = deadline.run(async { 7 }).await;
        assert_eq!(value, Ok(7));
    }
}
