use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff schedule: attempt `k` waits `base * multiplier^k` before polling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Backoff {
    /// Schedule used while an image generation job is processing.
    pub const fn image_poll() -> Self {
        Self {
            base: Duration::from_millis(3000),
            multiplier: 1.5,
            max_attempts: 10,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.mul_f64(self.multiplier.powi(attempt as i32))
    }

    pub fn total_delay(&self) -> Duration {
        (0..self.max_attempts).map(|attempt| self.delay(attempt)).sum()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::image_poll()
    }
}

/// What a single poll response means for the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T, E> {
    Done(T),
    Fail(E),
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    Failed(E),
    Exhausted { attempts: u32 },
}

/// Polls until `classify` yields `Done` or `Fail`, sleeping per `backoff` before every attempt.
///
/// An error from `poll` itself ends the loop immediately.
pub async fn poll_with_backoff<R, T, E, P, Fut, C>(
    backoff: &Backoff,
    mut poll: P,
    mut classify: C,
) -> Result<T, PollError<E>>
where
    P: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    C: FnMut(R) -> Verdict<T, E>,
{
    for attempt in 0..backoff.max_attempts {
        tokio::time::sleep(backoff.delay(attempt)).await;

        let response = poll(attempt).await.map_err(PollError::Failed)?;
        match classify(response) {
            Verdict::Done(value) => return Ok(value),
            Verdict::Fail(err) => return Err(PollError::Failed(err)),
            Verdict::Continue => {
                debug!("poll attempt {}/{} still pending", attempt + 1, backoff.max_attempts);
            }
        }
    }

    Err(PollError::Exhausted {
        attempts: backoff.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[test]
    fn image_poll_delays_follow_the_schedule() {
        let backoff = Backoff::image_poll();
        for attempt in 0..10 {
            let expected_ms = 3000.0 * 1.5_f64.powi(attempt as i32);
            let actual_ms = backoff.delay(attempt).as_secs_f64() * 1000.0;
            assert!(
                (actual_ms - expected_ms).abs() < 1e-6,
                "attempt {attempt}: {actual_ms} != {expected_ms}"
            );
        }
        assert_eq!(backoff.delay(0), Duration::from_millis(3000));
        assert_eq!(backoff.delay(1), Duration::from_millis(4500));
        assert_eq!(backoff.delay(2), Duration::from_millis(6750));
    }

    #[test]
    fn total_delay_sums_every_attempt() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            multiplier: 2.0,
            max_attempts: 4,
        };
        assert_eq!(backoff.total_delay(), Duration::from_millis(100 + 200 + 400 + 800));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success_regardless_of_budget() {
        let polls = Cell::new(0_u32);
        let started = Instant::now();

        let result: Result<&str, PollError<String>> = poll_with_backoff(
            &Backoff::image_poll(),
            |_| {
                polls.set(polls.get() + 1);
                let n = polls.get();
                async move { Ok::<u32, String>(n) }
            },
            |n| if n == 1 { Verdict::Done("ready") } else { Verdict::Continue },
        )
        .await;

        assert_eq!(result, Ok("ready"));
        assert_eq!(polls.get(), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_verdict_ends_the_loop() {
        let polls = Cell::new(0_u32);

        let result: Result<(), PollError<String>> = poll_with_backoff(
            &Backoff::image_poll(),
            |_| {
                polls.set(polls.get() + 1);
                async { Ok::<(), String>(()) }
            },
            |_| Verdict::Fail("rejected".to_owned()),
        )
        .await;

        assert_eq!(result, Err(PollError::Failed("rejected".to_owned())));
        assert_eq!(polls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_are_not_retried() {
        let polls = Cell::new(0_u32);

        let result: Result<(), PollError<String>> = poll_with_backoff(
            &Backoff::image_poll(),
            |_| {
                polls.set(polls.get() + 1);
                async { Err::<(), String>("connection reset".to_owned()) }
            },
            |_| Verdict::Continue,
        )
        .await;

        assert_eq!(result, Err(PollError::Failed("connection reset".to_owned())));
        assert_eq!(polls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_exactly_max_attempts() {
        let backoff = Backoff::image_poll();
        let attempts_seen = Cell::new(Vec::new());
        let started = Instant::now();

        let result: Result<(), PollError<String>> = poll_with_backoff(
            &backoff,
            |attempt| {
                let mut seen = attempts_seen.take();
                seen.push(attempt);
                attempts_seen.set(seen);
                async { Ok::<(), String>(()) }
            },
            |_| Verdict::Continue,
        )
        .await;

        assert_eq!(result, Err(PollError::Exhausted { attempts: 10 }));
        assert_eq!(attempts_seen.take(), (0..10).collect::<Vec<_>>());

        // the paused clock advances in whole milliseconds
        let elapsed = started.elapsed();
        assert!(elapsed >= backoff.total_delay());
        assert!(elapsed < backoff.total_delay() + Duration::from_millis(10));
    }
}
