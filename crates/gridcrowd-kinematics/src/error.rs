#![warn(missing_docs)]

//! Error types for the kinematics library.
//!
//! This module defines error types that can occur while integrating agent
//! motion or testing moving disks for contact.

use core::fmt;

/// Errors that can occur in kinematic calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Error for negative time delta.
    /// This variant is returned when a negative time delta is used for position updates.
    NegativeTimeDelta(&'static str),
    /// Error for invalid disk radius.
    /// This variant is returned when a radius is negative or not finite.
    InvalidRadius(&'static str),
}

impl core::fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::NegativeTimeDelta(msg) => write!(f, "Negative time delta: {}", msg),
            KinematicsError::InvalidRadius(msg) => write!(f, "Invalid radius: {}", msg),
        }
    }
}

impl core::error::Error for KinematicsError {}
