#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for 2D point-agent kinematics."]
#![doc = ""]
#![doc = "This crate provides a planar vector type, explicit Euler position updates"]
#![doc = "and a continuous swept-circle collision test for pairs of moving disks."]

use core::fmt;
use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use libm::sqrt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub mod swept;

pub use error::KinematicsError;
pub use swept::{SweptDisc, SweptHit, swept_circle};

/// A 2‑D vector `(x, y)` in world units.
///
/// Used both for positions and for velocities (world units per second).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    /// World‑frame x component.
    pub x: f64,
    /// World‑frame y component.
    pub y: f64,
}

impl Vec2 {
    /// The zero vector.
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    /// Construct a new vector.
    ///
    /// # Arguments
    ///
    /// * `x`: World-frame x component.
    /// * `y`: World-frame y component.
    pub const fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    /// Dot product with `other`.
    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (determinant) `self.x * other.y - self.y * other.x`.
    pub fn det(self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Squared Euclidean length.
    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    /// Euclidean length.
    pub fn length(self) -> f64 {
        sqrt(self.length_squared())
    }

    /// Distance to `other`.
    pub fn distance(self, other: Vec2) -> f64 {
        (self - other).length()
    }

    /// Returns the unit vector in the same direction, or zero for a zero vector.
    pub fn normalize_or_zero(self) -> Vec2 {
        let len = self.length();
        if len > 0.0 { self / len } else { Vec2::ZERO }
    }

    /// Scales the vector down so its length does not exceed `max`.
    ///
    /// # Arguments
    ///
    /// * `max`: The largest allowed length. Must be non-negative.
    ///
    /// # Returns
    ///
    /// The clamped vector. Vectors already shorter than `max` are returned unchanged.
    pub fn clamp_length(self, max: f64) -> Vec2 {
        let len_sq = self.length_squared();
        if len_sq > max * max && len_sq > 0.0 {
            self * (max / sqrt(len_sq))
        } else {
            self
        }
    }

    /// Linear interpolation: `self + (other - self) * t`.
    pub fn lerp(self, other: Vec2, t: f64) -> Vec2 {
        self + (other - self) * t
    }

    /// The vector rotated a quarter turn counter-clockwise.
    pub fn perp(self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Mul<Vec2> for f64 {
    type Output = Vec2;
    fn mul(self, rhs: Vec2) -> Vec2 {
        rhs * self
    }
}

impl Div<f64> for Vec2 {
    type Output = Vec2;
    fn div(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Advances a position by one explicit Euler step.
///
/// # Arguments
///
/// * `position`: The current position.
/// * `velocity`: The velocity applied over the whole step.
/// * `dt`: The time step in seconds.
///
/// # Errors
///
/// Returns `KinematicsError::NegativeTimeDelta` if `dt` is negative.
///
/// # Returns
///
/// The new position `position + velocity * dt`.
pub fn integrate_position(position: Vec2, velocity: Vec2, dt: f64) -> Result<Vec2, KinematicsError> {
    if dt < 0.0 {
        return Err(KinematicsError::NegativeTimeDelta("must be non-negative"));
    }
    Ok(position + velocity * dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn assert_vec_eq(a: Vec2, b: Vec2) {
        assert!((a.x - b.x).abs() < EPSILON, "x: {} != {}", a.x, b.x);
        assert!((a.y - b.y).abs() < EPSILON, "y: {} != {}", a.y, b.y);
    }

    #[test]
    fn test_vector_arithmetic() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, -1.0);
        assert_vec_eq(a + b, Vec2::new(4.0, 1.0));
        assert_vec_eq(a - b, Vec2::new(-2.0, 3.0));
        assert_vec_eq(a * 2.0, Vec2::new(2.0, 4.0));
        assert_vec_eq(-a, Vec2::new(-1.0, -2.0));
        assert!((a.dot(b) - 1.0).abs() < EPSILON);
        assert!((a.det(b) + 7.0).abs() < EPSILON);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2::ZERO.normalize_or_zero(), Vec2::ZERO);
        let n = Vec2::new(3.0, 4.0).normalize_or_zero();
        assert!((n.length() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec2::new(30.0, 40.0).clamp_length(5.0);
        assert_vec_eq(v, Vec2::new(3.0, 4.0));
        let short = Vec2::new(1.0, 0.0).clamp_length(5.0);
        assert_vec_eq(short, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, -4.0);
        assert_vec_eq(a.lerp(b, 0.0), a);
        assert_vec_eq(a.lerp(b, 1.0), b);
        assert_vec_eq(a.lerp(b, 0.5), Vec2::new(5.0, -2.0));
    }

    #[test]
    fn test_integrate_position() {
        let p = integrate_position(Vec2::new(1.0, 1.0), Vec2::new(2.0, -1.0), 0.5).unwrap();
        assert_vec_eq(p, Vec2::new(2.0, 0.5));
    }

    #[test]
    fn test_integrate_negative_dt() {
        let result = integrate_position(Vec2::ZERO, Vec2::new(1.0, 0.0), -0.1);
        assert!(matches!(result, Err(KinematicsError::NegativeTimeDelta(_))));
    }
}
