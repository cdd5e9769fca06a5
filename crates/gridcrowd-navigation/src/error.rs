//! This module defines the error types used by the `gridcrowd-navigation` crate.

#![warn(missing_docs)]

/// Error type for navigation operations.
///
/// This enum encapsulates all possible errors that can occur while allocating
/// grids, planning paths or evaluating path handles.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationError {
    /// Error for invalid grid dimensions.
    /// This variant is returned when the row or column count is zero or too large.
    InvalidDimensions(&'static str),
    /// Error for an invalid world area.
    /// This variant is returned when the grid area is degenerate or not finite.
    InvalidArea(&'static str),
    /// Error for an unknown grid topology.
    /// This variant is returned when a topology index has no factory.
    UnknownTopology(usize),
    /// Error for out-of-bounds access.
    /// This variant is returned when a coordinate lies outside the grid.
    OutOfBounds(&'static str),
    /// Error for operations that need an allocated grid.
    NotAllocated,
    /// Error for a non-positive path velocity.
    /// This variant is returned by `PathManager::request_path`.
    InvalidVelocity(&'static str),
    /// Error for a negative or non-finite agent radius.
    InvalidRadius(&'static str),
    /// Error for a handle that is no longer registered with its manager.
    StaleHandle,
}

impl core::fmt::Display for NavigationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NavigationError::InvalidDimensions(msg) => write!(f, "Invalid grid dimensions: {}", msg),
            NavigationError::InvalidArea(msg) => write!(f, "Invalid grid area: {}", msg),
            NavigationError::UnknownTopology(index) => {
                write!(f, "Unknown grid topology index: {}", index)
            }
            NavigationError::OutOfBounds(msg) => write!(f, "Grid access out of bounds: {}", msg),
            NavigationError::NotAllocated => write!(f, "Grid is not allocated"),
            NavigationError::InvalidVelocity(msg) => write!(f, "Invalid path velocity: {}", msg),
            NavigationError::InvalidRadius(msg) => write!(f, "Invalid agent radius: {}", msg),
            NavigationError::StaleHandle => write!(f, "Path handle is no longer registered"),
        }
    }
}

impl core::error::Error for NavigationError {}
