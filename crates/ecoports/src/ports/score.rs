//! Green score computation.
//!
//! The score grades a port's environmental footprint on a 0-100 scale, 100
//! meaning every tracked metric sits at zero. Each metric contributes an
//! equally weighted term that decays linearly until the metric reaches its
//! cap, after which the term bottoms out at zero.

/// Air quality index value at which the air term reaches zero.
pub const AIR_QUALITY_CAP: f64 = 50.0;
/// Water pollution index value at which the water term reaches zero.
pub const WATER_QUALITY_CAP: f64 = 30.0;
/// Annual CO2 tonnage at which the emissions term reaches zero.
pub const CO2_EMISSIONS_CAP: f64 = 1000.0;
/// Incident count at which the incident term reaches zero.
pub const INCIDENTS_CAP: f64 = 5.0;

const TERM_WEIGHT: f64 = 25.0;

/// Computes the green score from raw metric readings.
///
/// Inputs are expected to be non-negative; validation upstream rejects
/// negative readings before they reach storage.
pub fn green_score(air_quality: f64, water_quality: f64, co2_emissions: f64, incidents: u32) -> f64 {
    let score = term(air_quality, AIR_QUALITY_CAP)
        + term(water_quality, WATER_QUALITY_CAP)
        + term(co2_emissions, CO2_EMISSIONS_CAP)
        + term(f64::from(incidents), INCIDENTS_CAP);

    round2(score)
}

fn term(metric: f64, cap: f64) -> f64 {
    (1.0 - (metric / cap).min(1.0)) * TERM_WEIGHT
}

/// Rounds to two decimal places, the precision reported to clients.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
