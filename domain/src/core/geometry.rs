//! Geometry value objects shared by the safety engine and the wire surface.

use serde::{Deserialize, Serialize};

/// A point in 3D space, meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position3D) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl From<[f64; 3]> for Position3D {
    fn from(p: [f64; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

impl From<Position3D> for [f64; 3] {
    fn from(p: Position3D) -> Self {
        [p.x, p.y, p.z]
    }
}

/// Unit quaternion orientation. Identity by default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Position plus optional orientation in a named coordinate frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position3D,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Quaternion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

impl Pose {
    pub fn at(position: Position3D) -> Self {
        Self {
            position,
            orientation: None,
            frame: None,
        }
    }

    pub fn in_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }
}

/// Axis-aligned box, min/max corners as `[x, y, z]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
    #[serde(default = "default_frame")]
    pub frame: String,
}

fn default_frame() -> String {
    "world".to_string()
}

impl BoundingBox {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self {
            min,
            max,
            frame: default_frame(),
        }
    }

    /// Whether the point lies inside the box (inclusive on both faces).
    pub fn contains(&self, point: &[f64; 3]) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    /// Nearest point inside the box, componentwise clamp.
    pub fn clamp(&self, point: &[f64; 3]) -> [f64; 3] {
        let mut clamped = *point;
        for i in 0..3 {
            clamped[i] = clamped[i].clamp(self.min[i], self.max[i]);
        }
        clamped
    }
}

/// Spherical keep-out region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionZone {
    #[serde(default)]
    pub name: String,
    pub center: [f64; 3],
    pub radius: f64,
}

impl CollisionZone {
    /// Whether the point lies strictly inside the zone (distance < radius).
    pub fn intersects(&self, point: &[f64; 3]) -> bool {
        Position3D::from(*point).distance_to(&Position3D::from(self.center)) < self.radius
    }

    /// Push the point radially out to the zone surface. A point exactly at
    /// the center is pushed along +x.
    pub fn push_out(&self, point: &[f64; 3]) -> [f64; 3] {
        let center = Position3D::from(self.center);
        let p = Position3D::from(*point);
        let dist = p.distance_to(&center);
        if dist >= self.radius {
            return *point;
        }
        if dist == 0.0 {
            return [center.x + self.radius, center.y, center.z];
        }
        let scale = self.radius / dist;
        [
            center.x + (p.x - center.x) * scale,
            center.y + (p.y - center.y) * scale,
            center.z + (p.z - center.z) * scale,
        ]
    }
}
