use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    bus::{BusError, FanBus},
    fan_curve::FanSpeed,
};

const MAX_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    // Total number of write attempts, at least one
    pub attempts: u32,
    // Delay before the second attempt, doubled for each further attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    // Delay to wait after the given failed attempt (counted from 1)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);

        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    // The value was sent to the device
    Written,
    // The device already holds the value from the last successful write
    Skipped,
}

// Write fan speeds to the fan controller register, retrying failed
// writes and skipping writes that would not change the device
pub struct FanWriter<B: FanBus> {
    bus: B,
    register: u8,
    retry: RetryPolicy,

    // Value set by the last successful write, forgotten
    // as soon as a write fails
    last_written: Option<FanSpeed>,
}

impl<B: FanBus> FanWriter<B> {
    pub fn new(bus: B, register: u8, retry: RetryPolicy) -> Self {
        Self {
            bus,
            register,
            retry,
            last_written: None,
        }
    }

    pub async fn write_speed(
        &mut self,
        speed: FanSpeed,
    ) -> Result<WriteOutcome, BusError> {
        if self.last_written == Some(speed) {
            debug!("Fan already at {speed}, skipping write");
            return Ok(WriteOutcome::Skipped);
        }

        self.write_with_retry(speed).await?;

        Ok(WriteOutcome::Written)
    }

    async fn write_with_retry(&mut self, speed: FanSpeed) -> Result<(), BusError> {
        let mut attempt = 1;

        loop {
            match self.bus.write_byte_data(self.register, speed.get()) {
                Ok(()) => {
                    self.last_written = Some(speed);
                    return Ok(());
                }
                Err(err) if attempt < self.retry.attempts => {
                    // The device may or may not have taken the value,
                    // and the retries may be cut short by the caller
                    self.last_written = None;

                    let delay = self.retry.backoff_delay(attempt);

                    warn!(
                        "Fan speed write attempt {}/{} failed: {err}, retrying in {:?}",
                        attempt, self.retry.attempts, delay
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.last_written = None;

                    return Err(BusError::WriteFailed {
                        value: speed.get(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    pub fn last_written(&self) -> Option<FanSpeed> {
        self.last_written
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, io};

    use super::*;

    // Records every write and fails the ones queued in `failures`
    #[derive(Default)]
    struct FakeBus {
        writes: Vec<(u8, u8)>,
        failures: VecDeque<io::ErrorKind>,
        register: Option<u8>,
    }

    impl FakeBus {
        fn failing(count: usize) -> Self {
            Self {
                failures: std::iter::repeat(io::ErrorKind::TimedOut)
                    .take(count)
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl FanBus for FakeBus {
        fn write_byte_data(&mut self, register: u8, value: u8) -> io::Result<()> {
            self.writes.push((register, value));

            if let Some(kind) = self.failures.pop_front() {
                return Err(io::Error::new(kind, "nack"));
            }

            self.register = Some(value);
            Ok(())
        }
    }

    fn writer(bus: FakeBus) -> FanWriter<FakeBus> {
        FanWriter::new(bus, 0x30, RetryPolicy::default())
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50));

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(6), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(40), MAX_BACKOFF);
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_register_value() {
        let mut writer = writer(FakeBus::default());

        let outcome = writer.write_speed(FanSpeed::new(70)).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(writer.bus().writes, vec![(0x30, 70)]);
        assert_eq!(writer.last_written(), Some(FanSpeed::new(70)));
    }

    #[tokio::test(start_paused = true)]
    async fn identical_write_is_skipped() {
        let mut writer = writer(FakeBus::default());

        writer.write_speed(FanSpeed::new(70)).await.unwrap();
        let outcome = writer.write_speed(FanSpeed::new(70)).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Skipped);
        assert_eq!(writer.bus().writes.len(), 1);
        assert_eq!(writer.bus().register, Some(70));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let mut writer = writer(FakeBus::failing(2));

        let start = tokio::time::Instant::now();
        let outcome = writer.write_speed(FanSpeed::new(150)).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(writer.bus().writes.len(), 3);
        assert_eq!(writer.bus().register, Some(150));
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_bounded_attempts() {
        let mut writer = writer(FakeBus::failing(3));

        let err = writer.write_speed(FanSpeed::new(150)).await.unwrap_err();

        assert!(matches!(
            err,
            BusError::WriteFailed { value: 150, attempts: 3, .. }
        ));
        assert_eq!(writer.bus().writes.len(), 3);
        assert_eq!(writer.last_written(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_retry_disables_coalescing() {
        let mut writer = writer(FakeBus::default());
        writer.write_speed(FanSpeed::new(70)).await.unwrap();

        writer.bus_mut().failures.extend([io::ErrorKind::Other; 3]);

        // Give up on a write to another value while it is backing off
        let interrupted = tokio::time::timeout(
            Duration::from_millis(10),
            writer.write_speed(FanSpeed::new(150)),
        )
        .await;
        assert!(interrupted.is_err());
        assert_eq!(writer.last_written(), None);

        // The device state is unknown so 70 is written again
        writer.bus_mut().failures.clear();
        let outcome = writer.write_speed(FanSpeed::new(70)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_disables_coalescing() {
        let mut bus = FakeBus::default();
        bus.failures.extend([io::ErrorKind::Other; 3]);
        let mut writer = writer(bus);

        // First value fails on all attempts, the same value
        // must be written again rather than skipped
        assert!(writer.write_speed(FanSpeed::new(70)).await.is_err());
        let outcome = writer.write_speed(FanSpeed::new(70)).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(writer.bus().writes.len(), 4);
    }
}
