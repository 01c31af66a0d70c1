//! Soft movement bounds for untrusted position reports
//!
//! Owners' position streams are trusted by design; rejecting out-of-range
//! reports would cause visible freezing and snapping under normal network
//! jitter. Instead, reports are clamped to a radius around the agent's
//! spawn point, bounding the blast radius of a misbehaving or lagging
//! owner without ever dropping the update.

use glam::Vec3;

/// Clamp a reported position to the wander radius around spawn.
///
/// Distance is measured in the horizontal plane; a report inside the
/// radius passes through untouched, one outside is pulled back to the
/// boundary along the same bearing. The reported vertical component is
/// preserved in both cases. Pure and total: never errors, never blocks.
pub fn clamp_to_wander_radius(reported: Vec3, spawn: Vec3, max_radius: f32) -> Vec3 {
    let dx = reported.x - spawn.x;
    let dz = reported.z - spawn.z;
    let dist_sq = dx * dx + dz * dz;

    if dist_sq <= max_radius * max_radius {
        return reported;
    }

    // dist > 0 here, since dist_sq exceeded a non-negative bound
    let dist = dist_sq.sqrt();
    let scale = max_radius.max(0.0) / dist;
    Vec3::new(spawn.x + dx * scale, reported.y, spawn.z + dz * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::planar_distance;
    use proptest::prelude::*;

    #[test]
    fn test_inside_radius_passes_through() {
        let spawn = Vec3::new(10.0, 5.0, -20.0);
        let reported = Vec3::new(30.0, 80.0, -20.0);
        let result = clamp_to_wander_radius(reported, spawn, 50.0);
        assert_eq!(result, reported);
    }

    #[test]
    fn test_outside_radius_clamped_to_boundary() {
        let spawn = Vec3::ZERO;
        let reported = Vec3::new(1000.0, 0.0, 0.0);
        let result = clamp_to_wander_radius(reported, spawn, 50.0);
        assert!((result.x - 50.0).abs() < 1e-4);
        assert!(result.z.abs() < 1e-4);
    }

    #[test]
    fn test_vertical_component_preserved_when_clamped() {
        let spawn = Vec3::ZERO;
        let reported = Vec3::new(200.0, 33.0, 0.0);
        let result = clamp_to_wander_radius(reported, spawn, 50.0);
        assert_eq!(result.y, 33.0);
    }

    #[test]
    fn test_bearing_preserved() {
        let spawn = Vec3::ZERO;
        let reported = Vec3::new(300.0, 0.0, 400.0);
        let result = clamp_to_wander_radius(reported, spawn, 50.0);
        // Same 3:4 bearing, scaled onto the boundary
        assert!((result.x - 30.0).abs() < 1e-3);
        assert!((result.z - 40.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_radius_pins_to_spawn() {
        let spawn = Vec3::new(7.0, 1.0, 7.0);
        let reported = Vec3::new(100.0, 9.0, 100.0);
        let result = clamp_to_wander_radius(reported, spawn, 0.0);
        assert!((result.x - 7.0).abs() < 1e-4);
        assert!((result.z - 7.0).abs() < 1e-4);
        assert_eq!(result.y, 9.0);
    }

    proptest! {
        /// Clamping a clamped point changes nothing (within float noise)
        #[test]
        fn prop_clamp_is_idempotent(
            px in -5000.0f32..5000.0,
            py in -500.0f32..500.0,
            pz in -5000.0f32..5000.0,
            sx in -100.0f32..100.0,
            sz in -100.0f32..100.0,
            radius in 0.1f32..500.0,
        ) {
            let spawn = Vec3::new(sx, 0.0, sz);
            let reported = Vec3::new(px, py, pz);
            let once = clamp_to_wander_radius(reported, spawn, radius);
            let twice = clamp_to_wander_radius(once, spawn, radius);
            prop_assert!(once.distance(twice) < 1e-2);
        }

        /// Output never lies outside the radius (plus float noise)
        #[test]
        fn prop_clamp_respects_radius(
            px in -5000.0f32..5000.0,
            pz in -5000.0f32..5000.0,
            radius in 0.1f32..500.0,
        ) {
            let spawn = Vec3::ZERO;
            let result = clamp_to_wander_radius(Vec3::new(px, 0.0, pz), spawn, radius);
            prop_assert!(planar_distance(result, spawn) <= radius * 1.001);
        }
    }
}
