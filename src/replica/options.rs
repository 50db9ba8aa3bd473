use rand::Rng;
use std::convert::TryFrom;
use std::time::Duration;

/// Tunable timers, all optional. Anything left unset gets the protocol
/// default; the two election timers are sampled per replica so that clusters
/// desynchronize naturally.
#[derive(Clone, Default)]
pub struct ReplicaOptions {
    /// Follower patience before starting an election. Default: sampled once
    /// from [1.0, 1.2) seconds.
    pub election_timeout: Option<Duration>,
    /// Candidate patience before restarting an unresolved election. Default:
    /// sampled once from [0.2, 1.2) seconds.
    pub election_window: Option<Duration>,
    /// Leader's idle heartbeat cadence. Default: 0.3 seconds.
    pub heartbeat_interval: Option<Duration>,
    /// Age at which an unacknowledged proposal is retransmitted. Default:
    /// 0.4 seconds.
    pub consensus_timeout: Option<Duration>,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TimingConfig {
    pub election_timeout: Duration,
    pub election_window: Duration,
    pub heartbeat_interval: Duration,
    pub consensus_timeout: Duration,
}

impl TimingConfig {
    fn validate(&self) -> Result<(), &'static str> {
        if self.heartbeat_interval >= self.election_timeout {
            return Err("heartbeat interval must be less than the election timeout");
        }
        if self.election_window.is_zero() {
            return Err("election window must be non-zero");
        }
        if self.consensus_timeout.is_zero() {
            return Err("consensus timeout must be non-zero");
        }

        Ok(())
    }
}

impl TryFrom<ReplicaOptions> for TimingConfig {
    type Error = &'static str;

    fn try_from(options: ReplicaOptions) -> Result<Self, Self::Error> {
        let mut rng = rand::thread_rng();
        let values = TimingConfig {
            election_timeout: options
                .election_timeout
                .unwrap_or_else(|| Duration::from_secs_f64(rng.gen_range(1.0..1.2))),
            election_window: options
                .election_window
                .unwrap_or_else(|| Duration::from_secs_f64(rng.gen_range(0.2..1.2))),
            heartbeat_interval: options.heartbeat_interval.unwrap_or(Duration::from_millis(300)),
            consensus_timeout: options.consensus_timeout.unwrap_or(Duration::from_millis(400)),
        };

        values.validate()?;
        Ok(values)
    }
}
