//! Jacobson/Karels RTT estimation for [`super::transport::Rdt::send`].
//!
//! Formulas:
//! ```text
//! estimated_RTT = 0.875 * estimated_RTT + 0.125 * sample_RTT
//! dev_RTT       = 0.75  * dev_RTT       + 0.25  * |sample_RTT - estimated_RTT|
//! timeout_interval = estimated_RTT + 4 * dev_RTT
//! ```
//! only applied when a fragment is acknowledged on its first transmission
//! attempt. A failed attempt instead doubles `timeout_interval` directly
//! (Karn's algorithm), leaving `estimated_RTT`/`dev_RTT` untouched.

use std::time::Duration;

const INITIAL_ESTIMATED_RTT_SECS: f64 = 0.1;
const INITIAL_DEV_RTT_SECS: f64 = 0.0;
const INITIAL_TIMEOUT_SECS: f64 = 1.0;

pub struct RttEstimator {
    estimated_rtt: f64,
    dev_rtt: f64,
    timeout_interval: f64,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            estimated_rtt: INITIAL_ESTIMATED_RTT_SECS,
            dev_rtt: INITIAL_DEV_RTT_SECS,
            timeout_interval: INITIAL_TIMEOUT_SECS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_interval.max(0.0))
    }

    /// Called only when a fragment is acked on its very first attempt.
    pub fn on_first_try_success(&mut self, sample_rtt: Duration) {
        let sample = sample_rtt.as_secs_f64();
        self.estimated_rtt = 0.875 * self.estimated_rtt + 0.125 * sample;
        self.dev_rtt = 0.75 * self.dev_rtt + 0.25 * (sample - self.estimated_rtt).abs();
        self.timeout_interval = self.estimated_rtt + 4.0 * self.dev_rtt;
    }

    /// Called on every timed-out attempt; doubles the timeout until the
    /// next clean first-try success resets it.
    pub fn on_timeout(&mut self) {
        self.timeout_interval *= 2.0;
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_spec_initial_values() {
        let r = RttEstimator::new();
        assert_eq!(r.timeout(), Duration::from_secs_f64(1.0));
    }

    #[test]
    fn timeout_doubles_on_each_failure() {
        let mut r = RttEstimator::new();
        r.on_timeout();
        assert_eq!(r.timeout(), Duration::from_secs_f64(2.0));
        r.on_timeout();
        assert_eq!(r.timeout(), Duration::from_secs_f64(4.0));
    }

    #[test]
    fn first_try_success_resets_via_jacobson_update() {
        let mut r = RttEstimator::new();
        r.on_timeout(); // interval now 2.0, estimate still untouched
        r.on_first_try_success(Duration::from_millis(50));
        // estimated_RTT = 0.875*0.1 + 0.125*0.05 = 0.09375
        // dev_RTT = 0.75*0 + 0.25*|0.05 - 0.09375| = 0.0109375
        // timeout = 0.09375 + 4*0.0109375 = 0.1375
        let expected = 0.09375 + 4.0 * 0.0109375;
        assert!((r.timeout().as_secs_f64() - expected).abs() < 1e-9);
    }

    #[test]
    fn remains_non_negative_under_churn() {
        let mut r = RttEstimator::new();
        for i in 0..50 {
            if i % 3 == 0 {
                r.on_timeout();
            } else {
                r.on_first_try_success(Duration::from_millis(1 + i));
            }
            assert!(r.timeout().as_secs_f64() >= 0.0);
        }
    }
}
