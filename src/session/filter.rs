//! Change thresholds gating location, heading and attitude emission

use crate::core::constants::{
    DEFAULT_ATTITUDE_FILTER_DEG, DEFAULT_DISTANCE_FILTER_M, DEFAULT_HEADING_FILTER_DEG,
};
use crate::utils::config::{validate_threshold, ConfigError};
use serde::{Deserialize, Serialize};

/// Minimum change required before a new sample is reported
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterThresholds {
    /// Horizontal movement (m)
    pub distance_m: f64,
    /// Heading change (degrees)
    pub heading_deg: f64,
    /// Orientation change (degrees)
    pub attitude_deg: f64,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            distance_m: DEFAULT_DISTANCE_FILTER_M,
            heading_deg: DEFAULT_HEADING_FILTER_DEG,
            attitude_deg: DEFAULT_ATTITUDE_FILTER_DEG,
        }
    }
}

impl FilterThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold("distance_filter_m", self.distance_m)?;
        validate_threshold("heading_filter_deg", self.heading_deg)?;
        validate_threshold("attitude_filter_deg", self.attitude_deg)
    }
}

/// Gate for one sample stream.
///
/// The reference is the last admitted sample. While armed, the next sample is
/// admitted unconditionally.
#[derive(Debug, Clone)]
pub(crate) struct EmissionGate<T> {
    reference: Option<T>,
    armed: bool,
}

impl<T> Default for EmissionGate<T> {
    fn default() -> Self {
        Self {
            reference: None,
            armed: false,
        }
    }
}

impl<T: Clone> EmissionGate<T> {
    /// Guarantees the next sample passes
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn reference(&self) -> Option<&T> {
        self.reference.as_ref()
    }

    /// Admits the sample when armed or when it differs from the reference by at
    /// least `threshold`; admitted samples become the new reference.
    pub fn admit<F>(&mut self, sample: &T, threshold: f64, delta: F) -> bool
    where
        F: Fn(&T, &T) -> f64,
    {
        let pass = self.armed
            || match &self.reference {
                Some(reference) => delta(reference, sample) >= threshold,
                None => true,
            };
        if pass {
            self.reference = Some(sample.clone());
            self.armed = false;
        }
        pass
    }
}
