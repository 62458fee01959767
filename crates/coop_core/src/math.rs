//! Pose math shared by the sync systems and the interpolation engine.
//!
//! Poses are sampled and rendered, never simulated here, so plain `f32`
//! is used throughout. Interpolation helpers are written so that the
//! endpoints are reproduced bit-exactly (`lerp(a, b, 0.0) == a`,
//! `lerp(a, b, 1.0) == b`).

use std::f32::consts::{PI, TAU};
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// 2D vector in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Vec2 {
    /// Zero vector.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared distance (avoids sqrt for range checks).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    #[must_use]
    pub fn normalize_or_zero(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Linearly interpolate between two vectors.
    ///
    /// Uses the two-term form so both endpoints are exact.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            x: lerp(self.x, other.x, t),
            y: lerp(self.y, other.y, t),
        }
    }

    /// Whether both components are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Position plus facing angle (radians).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// World position.
    pub position: Vec2,
    /// Facing angle in radians.
    pub rotation: f32,
}

impl Pose {
    /// Create a pose.
    #[must_use]
    pub const fn new(position: Vec2, rotation: f32) -> Self {
        Self { position, rotation }
    }

    /// Pose at a position with zero rotation.
    #[must_use]
    pub const fn at(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            rotation: 0.0,
        }
    }

    /// Interpolate position linearly and rotation along the shortest arc.
    #[must_use]
    pub fn interpolate(self, target: Self, t: f32) -> Self {
        Self {
            position: self.position.lerp(target.position, t),
            rotation: lerp_angle(self.rotation, target.rotation, t),
        }
    }
}

/// Scalar lerp, exact at both endpoints.
#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Hermite smoothstep of `t`, clamped to `[0, 1]`.
///
/// Monotonically non-decreasing, `smoothstep(0) == 0`, `smoothstep(1) == 1`.
#[must_use]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Interpolate between two angles along the shorter arc.
#[must_use]
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    if t >= 1.0 {
        return to;
    }
    let mut delta = (to - from).rem_euclid(TAU);
    if delta > PI {
        delta -= TAU;
    }
    from + delta * t
}
