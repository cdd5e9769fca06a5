//! Continuous collision test for two disks moving linearly over a window.
//!
//! Time is normalized: `t = 0` is the start of the window and `t = 1` its end.
//! Each disk moves from `start` to `end` at constant velocity, so the relative
//! motion is a ray and contact is the smaller root of
//! `|rel_pos + rel_vel * t|^2 = (ra + rb)^2`.

use crate::{KinematicsError, Vec2};
use libm::{fabs, sqrt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Leading coefficient below which the relative motion is treated as zero.
const RELATIVE_MOTION_EPSILON: f64 = 1e-6;

/// A disk moving linearly from `start` to `end` during the test window.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweptDisc {
    /// Center at the start of the window.
    pub start: Vec2,
    /// Center at the end of the window.
    pub end: Vec2,
    /// Disk radius.
    pub radius: f64,
}

impl SweptDisc {
    /// Construct a new swept disk.
    ///
    /// # Errors
    ///
    /// Returns `KinematicsError::InvalidRadius` if `radius` is negative, NaN or infinite.
    pub fn new(start: Vec2, end: Vec2, radius: f64) -> Result<Self, KinematicsError> {
        if !(radius >= 0.0) || !radius.is_finite() {
            return Err(KinematicsError::InvalidRadius("must be non-negative and finite"));
        }
        Ok(SweptDisc { start, end, radius })
    }

    /// Displacement over the window.
    pub fn displacement(&self) -> Vec2 {
        self.end - self.start
    }
}

/// Result of a swept-circle test.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweptHit {
    /// Whether the disks touch inside the window.
    pub collides: bool,
    /// Normalized time of first contact in `[0, 1]`. Zero when there is no contact.
    pub t: f64,
}

impl SweptHit {
    const MISS: SweptHit = SweptHit { collides: false, t: 0.0 };

    const fn at(t: f64) -> Self {
        SweptHit { collides: true, t }
    }
}

/// Tests two moving disks for contact inside the normalized window `[0, 1]`.
///
/// Disks that already overlap at the start of the window collide at `t = 0`.
/// Disks without relative motion never come into contact.
///
/// # Arguments
///
/// * `a`: First disk.
/// * `b`: Second disk.
///
/// # Returns
///
/// A `SweptHit` with the earliest contact time, if any.
pub fn swept_circle(a: &SweptDisc, b: &SweptDisc) -> SweptHit {
    let rel_pos = a.start - b.start;
    let rel_vel = a.displacement() - b.displacement();
    let combined = a.radius + b.radius;

    let qa = rel_vel.dot(rel_vel);
    let qb = 2.0 * rel_pos.dot(rel_vel);
    let qc = rel_pos.dot(rel_pos) - combined * combined;

    if qc <= 0.0 {
        return SweptHit::at(0.0);
    }
    if fabs(qa) < RELATIVE_MOTION_EPSILON {
        return SweptHit::MISS;
    }

    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return SweptHit::MISS;
    }

    let t = (-qb - sqrt(disc)) / (2.0 * qa);
    if (0.0..=1.0).contains(&t) {
        SweptHit::at(t)
    } else {
        SweptHit::MISS
    }
}
