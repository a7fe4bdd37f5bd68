//! 2D shape primitives used for hit testing and collision queries.
//!
//! Shapes carry a position plus a normalized origin pivot (0..1 per axis);
//! `offset` converts the pivot into the translation that places the shape's
//! local geometry relative to its position. Rectangles may be authored with
//! negative width or height; every query canonicalizes extents first so
//! callers never need to care about authoring direction.

use glam::Vec2;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Deserialize)]
struct Vec2Json {
    x: f32,
    y: f32,
}

impl From<Vec2Json> for Vec2 {
    fn from(v: Vec2Json) -> Self {
        Vec2::new(v.x, v.y)
    }
}

#[derive(Debug, Deserialize)]
struct RectangleJson {
    width: Option<f32>,
    height: Option<f32>,
    position: Option<Vec2Json>,
    origin: Option<Vec2Json>,
}

#[derive(Debug, Deserialize)]
struct CircleJson {
    radius: Option<f32>,
    position: Option<Vec2Json>,
    origin: Option<Vec2Json>,
}

/// One-method contract the engine ticks each frame. The engine does not care
/// what the system does, only that it runs between the zone update and
/// rendering.
pub trait CollisionSystem {
    fn update(&mut self, dt: f64);
}

/// Placeholder system for games that do their own hit testing.
pub struct NoCollision;

impl CollisionSystem for NoCollision {
    fn update(&mut self, _dt: f64) {}
}

#[derive(Debug, Clone, Copy)]
pub struct Rectangle2D {
    pub position: Vec2,
    pub origin: Vec2,
    pub width: f32,
    pub height: f32,
}

impl Default for Rectangle2D {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            origin: Vec2::ZERO,
            width: 0.0,
            height: 0.0,
        }
    }
}

impl Rectangle2D {
    pub fn new(position: Vec2, width: f32, height: f32) -> Self {
        Self {
            position,
            origin: Vec2::ZERO,
            width,
            height,
        }
    }

    /// Pivot translation: an origin of (0.5, 0.5) centers the rectangle on
    /// its position.
    pub fn offset(&self) -> Vec2 {
        Vec2::new(-(self.width * self.origin.x), -(self.height * self.origin.y))
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        let raw: RectangleJson = serde_json::from_value(value.clone())
            .map_err(|e| format!("Rectangle JSON error: {e}"))?;
        Ok(Self {
            width: raw
                .width
                .ok_or_else(|| "Rectangle requires a numeric 'width'.".to_string())?,
            height: raw
                .height
                .ok_or_else(|| "Rectangle requires a numeric 'height'.".to_string())?,
            position: raw.position.map(Vec2::from).unwrap_or(Vec2::ZERO),
            origin: raw.origin.map(Vec2::from).unwrap_or(Vec2::ZERO),
        })
    }

    /// Canonical (min, max) corners with the pivot applied and negative
    /// extents flipped.
    fn bounds(&self) -> (Vec2, Vec2) {
        let anchored = self.position + self.offset();
        let corner = anchored + Vec2::new(self.width, self.height);
        (anchored.min(corner), anchored.max(corner))
    }

    pub fn intersects_rect(&self, other: &Rectangle2D) -> bool {
        let (a_min, a_max) = self.bounds();
        let (b_min, b_max) = other.bounds();
        a_min.x <= b_max.x && a_max.x >= b_min.x && a_min.y <= b_max.y && a_max.y >= b_min.y
    }

    /// Clamp the circle center into the rectangle and compare the squared
    /// distance against the squared radius. A circle whose edge exactly
    /// touches the rectangle counts as intersecting.
    pub fn intersects_circle(&self, circle: &Circle2D) -> bool {
        let (min, max) = self.bounds();
        let center = circle.center();
        let closest = center.clamp(min, max);
        let delta = center - closest;
        delta.length_squared() <= circle.radius * circle.radius
    }

    /// Inclusive containment test, boundary points count.
    pub fn point_in_shape(&self, point: Vec2) -> bool {
        let (min, max) = self.bounds();
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Circle2D {
    pub position: Vec2,
    pub origin: Vec2,
    pub radius: f32,
}

impl Default for Circle2D {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            origin: Vec2::ZERO,
            radius: 0.0,
        }
    }
}

impl Circle2D {
    pub fn new(position: Vec2, radius: f32) -> Self {
        Self {
            position,
            origin: Vec2::ZERO,
            radius,
        }
    }

    pub fn offset(&self) -> Vec2 {
        Vec2::new(-(self.radius * self.origin.x), -(self.radius * self.origin.y))
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        let raw: CircleJson = serde_json::from_value(value.clone())
            .map_err(|e| format!("Circle JSON error: {e}"))?;
        Ok(Self {
            radius: raw
                .radius
                .ok_or_else(|| "Circle requires a numeric 'radius'.".to_string())?,
            position: raw.position.map(Vec2::from).unwrap_or(Vec2::ZERO),
            origin: raw.origin.map(Vec2::from).unwrap_or(Vec2::ZERO),
        })
    }

    pub fn center(&self) -> Vec2 {
        self.position + self.offset()
    }

    pub fn intersects_circle(&self, other: &Circle2D) -> bool {
        let distance_sq = (other.center() - self.center()).length_squared();
        let reach = self.radius + other.radius;
        distance_sq <= reach * reach
    }

    pub fn intersects_rect(&self, rect: &Rectangle2D) -> bool {
        rect.intersects_circle(self)
    }

    /// Inclusive containment test, boundary points count.
    pub fn point_in_shape(&self, point: Vec2) -> bool {
        (point - self.center()).length_squared() <= self.radius * self.radius
    }
}
