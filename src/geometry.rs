//! Axis-aligned box helpers shared by every collision check.

use std::ops::{Add, AddAssign, Mul, MulAssign, Sub};

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl MulAssign<f32> for Vec3 {
    fn mul_assign(&mut self, rhs: f32) {
        *self = *self * rhs;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Builds a box around `center` extending `half` along each axis.
    pub fn from_center(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Inclusive on every face: boxes that merely touch intersect.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Penetration depth along each axis, assuming the boxes intersect.
    pub fn overlap(&self, other: &Aabb) -> Vec3 {
        Vec3::new(
            (self.max.x - other.min.x).min(other.max.x - self.min.x),
            (self.max.y - other.min.y).min(other.max.y - self.min.y),
            (self.max.z - other.min.z).min(other.max.z - self.min.z),
        )
    }
}

/// Minimum-translation axis. Y wins any tie it is part of, then X over Z.
pub fn separation_axis(overlap: Vec3) -> Axis {
    if overlap.y <= overlap.x && overlap.y <= overlap.z {
        Axis::Y
    } else if overlap.x <= overlap.z {
        Axis::X
    } else {
        Axis::Z
    }
}

/// Ground-plane variant used for walkers: X only when strictly smaller.
pub fn separation_axis_xz(overlap: Vec3) -> Axis {
    if overlap.x < overlap.z {
        Axis::X
    } else {
        Axis::Z
    }
}

/// Signed push that moves `position` away from `obstacle` along `axis`.
pub fn push_out(position: f32, obstacle_min: f32, obstacle_max: f32, depth: f32) -> f32 {
    if position > (obstacle_min + obstacle_max) * 0.5 {
        depth
    } else {
        -depth
    }
}
