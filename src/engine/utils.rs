use rand::Rng;

use crate::geometry::Vec3;
use crate::world::normalize_xz;

/// Where a carried player hangs: `distance` in front of the carrier's view
/// direction at an absolute `height`.
pub fn carry_position(carrier: Vec3, yaw: f32, distance: f32, height: f32) -> Vec3 {
    Vec3::new(
        carrier.x - yaw.sin() * distance,
        height,
        carrier.z - yaw.cos() * distance,
    )
}

pub(super) fn random_unit_xz<R: Rng>(rng: &mut R) -> (f32, f32) {
    let dx = rng.random_range(-1.0f32..1.0);
    let dz = rng.random_range(-1.0f32..1.0);
    normalize_xz(dx, dz)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn carry_position_faces_negative_z_at_zero_yaw() {
        let p = carry_position(Vec3::new(1.0, 9.0, 2.0), 0.0, 6.0, 5.0);
        assert!((p.x - 1.0).abs() < 1e-6);
        assert_eq!(p.y, 5.0);
        assert!((p.z - -4.0).abs() < 1e-6);
    }

    #[test]
    fn carry_position_follows_yaw() {
        let p = carry_position(Vec3::ZERO, std::f32::consts::FRAC_PI_2, 2.0, 1.0);
        assert!((p.x - -2.0).abs() < 1e-5);
        assert!(p.z.abs() < 1e-5);
    }

    #[test]
    fn random_directions_are_unit_length() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let (x, z) = random_unit_xz(&mut rng);
            assert!(((x * x + z * z).sqrt() - 1.0).abs() < 1e-4);
        }
    }
}
