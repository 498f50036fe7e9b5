//! Fan speed policy: humidity difference to actuator speed.
//!
//! The decision has three regions around the outdoor reading. At or above
//! `outdoor + hysteresis` the fan runs; at or below `outdoor` it stops; in
//! the band between, the previous speed is held so the fan does not chatter
//! around equilibrium.

use serde::{Deserialize, Serialize};

/// Speed mapping strategies, selected from the `fan.actuation` config key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeedPolicy {
    /// Speed grows linearly with the humidity excess over the threshold,
    /// reaching full speed at `proportional_scale` RH % above it.
    Proportional,
    /// Plain on/off actuation with the same thresholds.
    #[default]
    Binary,
}

impl SpeedPolicy {
    /// Computes the required fan speed in [0.0, 1.0] for a humidity pair.
    ///
    /// Returns `None` inside the hysteresis band, meaning the caller must
    /// leave the previous speed unchanged.
    pub fn required_speed(
        &self,
        indoor: f64,
        outdoor: f64,
        hysteresis: f64,
        scale: f64,
    ) -> Option<f64> {
        if indoor >= outdoor + hysteresis {
            let excess = indoor - (outdoor + hysteresis);
            Some(match self {
                Self::Binary => 1.0,
                Self::Proportional => (excess / scale).clamp(0.0, 1.0),
            })
        } else if indoor <= outdoor {
            Some(0.0)
        } else {
            None
        }
    }
}
