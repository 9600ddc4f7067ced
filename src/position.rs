//! Rigid 2-D transforms used to place track pieces.
//!
//! A `Position` is both a pose (where a piece or anchor sits) and a transform
//! (the offset from one pose to another). `a + b` applies `b` in `a`'s frame,
//! `a - b` is the offset that takes `b` to `a`.

use nalgebra_glm as glm;
use serde::{Serialize, Deserialize};
use std::f64::consts::{PI, TAU};
use std::ops::{Add, Sub};

/// Tolerance used when checking that two anchors face each other.
pub const ANGLE_EPSILON :f64 = 0.001;

pub fn normalize_angle(angle :f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid rounds tiny negative angles up to TAU
    if a >= TAU { 0.0 } else { a }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct Position {
    pub x :f64,
    pub y :f64,
    /// Radians, always in `[0, τ)`.
    pub angle :f64,
}

impl Position {
    pub fn new(x :f64, y :f64, angle :f64) -> Self {
        Position { x, y, angle: normalize_angle(angle) }
    }

    pub fn origin() -> Self { Position::new(0.0, 0.0, 0.0) }

    pub fn vec(&self) -> glm::DVec2 { glm::vec2(self.x, self.y) }

    fn from_vec(v :glm::DVec2, angle :f64) -> Self {
        Position::new(v.x, v.y, angle)
    }

    pub fn inverse(&self) -> Position {
        Position::from_vec(glm::rotate_vec2(&(-self.vec()), -self.angle), -self.angle)
    }

    /// Same point, facing the other way.
    pub fn opposite(&self) -> Position {
        Position::new(self.x, self.y, self.angle + PI)
    }

    pub fn angle_is_opposite(&self, other :&Position, epsilon :f64) -> bool {
        let mut r = normalize_angle(self.angle - other.angle - PI);
        if r >= PI { r -= TAU; }
        r.abs() < epsilon
    }

    pub fn approx_eq(&self, other :&Position, epsilon :f64) -> bool {
        let mut r = normalize_angle(self.angle - other.angle);
        if r >= PI { r -= TAU; }
        (self.x - other.x).abs() < epsilon
            && (self.y - other.y).abs() < epsilon
            && r.abs() < epsilon
    }

    /// Axis-aligned box around `bounds` after moving it into this frame.
    pub fn transform_bounds(&self, bounds :&Bounds) -> Bounds {
        let corners = bounds.corners().iter()
            .map(|c| self.vec() + glm::rotate_vec2(c, self.angle))
            .collect::<Vec<_>>();
        Bounds::from_points(&corners)
    }
}

impl Add for Position {
    type Output = Position;
    fn add(self, other :Position) -> Position {
        let v = self.vec() + glm::rotate_vec2(&other.vec(), self.angle);
        Position::from_vec(v, self.angle + other.angle)
    }
}

impl Sub for Position {
    type Output = Position;
    fn sub(self, other :Position) -> Position {
        other.inverse() + self
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct Bounds {
    pub x :f64,
    pub y :f64,
    pub width :f64,
    pub height :f64,
}

impl Bounds {
    pub fn corners(&self) -> [glm::DVec2; 4] {
        [glm::vec2(self.x, self.y),
         glm::vec2(self.x + self.width, self.y),
         glm::vec2(self.x, self.y + self.height),
         glm::vec2(self.x + self.width, self.y + self.height)]
    }

    pub fn from_points(pts :&[glm::DVec2]) -> Bounds {
        let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
        let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in pts {
            x0 = x0.min(p.x); y0 = y0.min(p.y);
            x1 = x1.max(p.x); y1 = y1.max(p.y);
        }
        Bounds { x: x0, y: y0, width: x1 - x0, height: y1 - y0 }
    }

    pub fn union(&self, other :&Bounds) -> Bounds {
        let mut pts = self.corners().to_vec();
        pts.extend_from_slice(&other.corners());
        Bounds::from_points(&pts)
    }

    pub fn contains(&self, x :f64, y :f64) -> bool {
        self.x <= x && x <= self.x + self.width && self.y <= y && y <= self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, AbsDiffEq};

    impl AbsDiffEq for Position {
        type Epsilon = f64;
        fn default_epsilon() -> f64 { 1e-9 }
        fn abs_diff_eq(&self, other :&Self, epsilon :f64) -> bool {
            self.approx_eq(other, epsilon)
        }
    }

    fn samples() -> Vec<Position> {
        vec![
            Position::new(0.0, 0.0, 0.0),
            Position::new(16.0, 0.0, 0.0),
            Position::new(3.0, -4.0, 1.2),
            Position::new(-10.5, 7.25, 5.9),
            Position::new(40.0, 40.0, PI / 2.0),
            Position::new(0.0, 0.0, PI),
        ]
    }

    #[test]
    fn angle_is_normalized() {
        let p = Position::new(1.0, 2.0, -PI / 2.0);
        assert_abs_diff_eq!(p.angle, 3.0 * PI / 2.0, epsilon = 1e-12);
        let p = Position::new(1.0, 2.0, 5.0 * TAU + 0.5);
        assert_abs_diff_eq!(p.angle, 0.5, epsilon = 1e-9);
        assert!(Position::new(0.0, 0.0, -1e-18).angle < TAU);
    }

    #[test]
    fn compose_translates_in_frame() {
        let a = Position::new(10.0, 0.0, PI / 2.0);
        let b = Position::new(5.0, 0.0, 0.0);
        assert_abs_diff_eq!(a + b, Position::new(10.0, 5.0, PI / 2.0), epsilon = 1e-9);
        // not commutative
        assert!(!(b + a).approx_eq(&(a + b), 1e-6));
    }

    #[test]
    fn difference_is_inverse_of_compose() {
        for a in samples() {
            for b in samples() {
                assert_abs_diff_eq!((a + b) - a, b, epsilon = 1e-9);
                assert_abs_diff_eq!(a + ((a + b) - a), a + b, epsilon = 1e-9);
                assert_abs_diff_eq!(b + (a - b), a, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn compose_is_associative() {
        for a in samples() {
            for b in samples() {
                for c in samples() {
                    assert_abs_diff_eq!((a + b) + c, a + (b + c), epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn opposite_angles() {
        let a = Position::new(1.0, 1.0, 0.3);
        assert!(a.angle_is_opposite(&a.opposite(), ANGLE_EPSILON));
        assert!(!a.angle_is_opposite(&a, ANGLE_EPSILON));
        let b = Position::new(0.0, 0.0, 0.0);
        let c = Position::new(0.0, 0.0, PI + 0.0005);
        assert!(b.angle_is_opposite(&c, ANGLE_EPSILON));
    }

    #[test]
    fn transformed_bounds() {
        let b = Bounds { x: 0.0, y: -4.0, width: 16.0, height: 8.0 };
        let moved = Position::new(100.0, 50.0, PI / 2.0).transform_bounds(&b);
        assert_abs_diff_eq!(moved.x, 96.0, epsilon = 1e-9);
        assert_abs_diff_eq!(moved.y, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(moved.width, 8.0, epsilon = 1e-9);
        assert_abs_diff_eq!(moved.height, 16.0, epsilon = 1e-9);
        assert!(moved.contains(100.0, 60.0));
    }
}
