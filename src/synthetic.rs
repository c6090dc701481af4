//! Synthetic lap generator for stress testing and benchmarking.
//!
//! Generates repeated, noisy recordings of one loop so that conflation has
//! something realistic to merge: every lap follows the same ground-truth
//! polyline with independent GPS noise and speed jitter.
//!
//! Feature-gated behind `synthetic`, not included in production builds.
//!
//! # Example
//!
//! ```rust
//! use trackgraph::synthetic::LapScenario;
//!
//! let scenario = LapScenario::park_loop();
//! let tracks = scenario.generate();
//! assert_eq!(tracks.len(), scenario.lap_count);
//! ```

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo_utils::offset_meters;
use crate::source::Track;
use crate::{Coordinate, TrackPoint};

/// Zurich origin, a representative mid-European latitude.
pub const ZURICH: Coordinate = Coordinate {
    longitude: 8.55,
    latitude: 47.37,
};

/// Scenario configuration for generating synthetic laps.
#[derive(Debug, Clone)]
pub struct LapScenario {
    /// Center of the loop.
    pub origin: Coordinate,
    /// Loop radius in meters.
    pub loop_radius_meters: f64,
    /// Number of recorded laps (tracks) to generate.
    pub lap_count: usize,
    /// Distance between consecutive samples in meters.
    pub point_spacing_meters: f64,
    /// GPS noise standard deviation in meters.
    pub gps_noise_sigma_meters: f64,
    /// Mean moving speed in m/s.
    pub base_speed: f64,
    /// RNG seed for deterministic reproduction.
    pub seed: u64,
}

impl LapScenario {
    /// 20 laps of a 1.2 km park loop at running pace.
    pub fn park_loop() -> Self {
        Self {
            origin: ZURICH,
            loop_radius_meters: 200.0,
            lap_count: 20,
            point_spacing_meters: 10.0,
            gps_noise_sigma_meters: 3.0,
            base_speed: 3.0,
            seed: 42,
        }
    }

    /// Same shape with more laps, for benchmarks.
    pub fn with_lap_count(lap_count: usize) -> Self {
        Self {
            lap_count,
            ..Self::park_loop()
        }
    }

    /// Number of samples per lap.
    pub fn points_per_lap(&self) -> usize {
        let circumference = 2.0 * PI * self.loop_radius_meters;
        (circumference / self.point_spacing_meters).ceil().max(1.0) as usize
    }

    /// Generate one track per lap.
    pub fn generate(&self) -> Vec<Track> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = self.points_per_lap();
        let mut clock: i64 = 1_700_000_000;

        (0..self.lap_count)
            .map(|lap| {
                let mut points = Vec::with_capacity(n);
                for i in 0..n {
                    let angle = 2.0 * PI * i as f64 / n as f64;
                    let on_loop = offset_meters(
                        &self.origin,
                        self.loop_radius_meters * angle.cos(),
                        self.loop_radius_meters * angle.sin(),
                    );
                    let (east, north) = gaussian_pair(&mut rng, self.gps_noise_sigma_meters);
                    let observed = offset_meters(&on_loop, east, north);
                    let speed = (self.base_speed + rng.gen_range(-0.5..0.5)).max(0.0);

                    points.push(TrackPoint::new(
                        observed.longitude,
                        observed.latitude,
                        clock,
                        speed,
                    ));
                    clock += (self.point_spacing_meters / self.base_speed.max(0.1)).ceil() as i64;
                }
                Track::new(format!("lap-{:03}", lap), points)
            })
            .collect()
    }
}

/// Two independent Gaussian samples (Box-Muller transform).
fn gaussian_pair(rng: &mut StdRng, sigma: f64) -> (f64, f64) {
    if sigma <= 0.0 {
        return (0.0, 0.0);
    }
    let u1: f64 = rng.gen_range(0.0001..1.0);
    let u2: f64 = rng.r#gen();
    let r = (-2.0 * u1.ln()).sqrt() * sigma;
    (r * (2.0 * PI * u2).cos(), r * (2.0 * PI * u2).sin())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;

    #[test]
    fn test_park_loop_generation() {
        let scenario = LapScenario::park_loop();
        let tracks = scenario.generate();

        assert_eq!(tracks.len(), 20);
        for track in &tracks {
            assert_eq!(track.points.len(), scenario.points_per_lap());
        }
    }

    #[test]
    fn test_deterministic_generation() {
        let scenario = LapScenario::park_loop();
        assert_eq!(scenario.generate(), scenario.generate());
    }

    #[test]
    fn test_points_stay_near_loop() {
        let scenario = LapScenario::park_loop();
        for track in scenario.generate() {
            for p in &track.points {
                let d = haversine_distance(&scenario.origin, &p.coordinate());
                // Noise sigma is 3m, so 20m is far outside its tail
                assert!((d - 200.0).abs() < 20.0, "point {}m from center", d);
            }
        }
    }

    #[test]
    fn test_timestamps_increase() {
        let tracks = LapScenario::with_lap_count(3).generate();
        let all: Vec<i64> = tracks
            .iter()
            .flat_map(|t| t.points.iter().map(|p| p.timestamp))
            .collect();
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }
}
