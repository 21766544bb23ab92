// ============================================================================
// File: src/topology/shaping.rs
// ----------------------------------------------------------------------------
// Traffic shaping policy attached to a link.
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

/// Bandwidth, latency and loss constraints for one link.
///
/// Zero values mean "unconstrained". The policy applies to each direction of
/// the link independently.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShapingPolicy {
    /// Rate cap in Mbit/s; 0 disables the cap
    #[serde(default)]
    pub bandwidth_mbit: f64,

    /// Fixed one-way delay
    #[serde(default, with = "humantime_serde")]
    pub delay: Duration,

    /// Delay variation around `delay`
    #[serde(default, with = "humantime_serde")]
    pub jitter: Duration,

    /// Packet loss probability in [0, 1)
    #[serde(default)]
    pub loss: f64,

    /// Queue limit in packets for the emulation qdisc
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue: Option<u32>,
}

impl ShapingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bandwidth_mbit(mut self, mbit: f64) -> Self {
        self.bandwidth_mbit = mbit;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_max_queue(mut self, packets: u32) -> Self {
        self.max_queue = Some(packets);
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.bandwidth_mbit.is_finite() || self.bandwidth_mbit < 0.0 {
            return Err(ValidationError::InvalidShaping {
                reason: format!("bandwidth must be >= 0, got {}", self.bandwidth_mbit),
            });
        }
        if !(0.0..1.0).contains(&self.loss) {
            return Err(ValidationError::InvalidShaping {
                reason: format!("loss must be in [0, 1), got {}", self.loss),
            });
        }
        if !self.jitter.is_zero() && self.delay.is_zero() {
            return Err(ValidationError::InvalidShaping {
                reason: "jitter requires a non-zero delay".to_string(),
            });
        }
        if self.max_queue == Some(0) {
            return Err(ValidationError::InvalidShaping {
                reason: "queue limit must be at least one packet".to_string(),
            });
        }
        Ok(())
    }

    pub fn has_rate_limit(&self) -> bool {
        self.bandwidth_mbit > 0.0
    }

    /// True if any delay/loss emulation is requested.
    pub fn has_emulation(&self) -> bool {
        !self.delay.is_zero() || self.loss > 0.0 || self.max_queue.is_some()
    }

    /// True if applying this policy is the same as clearing shaping.
    pub fn is_unconstrained(&self) -> bool {
        !self.has_rate_limit() && !self.has_emulation()
    }
}
