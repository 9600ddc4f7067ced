//! Track piece variants.
//!
//! The set of piece types is closed: straights, curves, points (switches)
//! and crossovers. Each variant knows its anchor names, where its anchors
//! sit relative to the piece's own position, and which anchors can be
//! reached from a given entry anchor.

use crate::position::{Bounds, Position};
use lazy_static::lazy_static;
use nalgebra_glm as glm;
use serde::{Serialize, Deserialize};
use smallvec::{smallvec, SmallVec};
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

/// Length of the straight road through a set of points.
pub const POINTS_LENGTH :f64 = 32.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorName { In, Out, Branch, Left, Right }

impl AnchorName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorName::In => "in",
            AnchorName::Out => "out",
            AnchorName::Branch => "branch",
            AnchorName::Left => "left",
            AnchorName::Right => "right",
        }
    }
}

impl fmt::Display for AnchorName {
    fn fmt(&self, f :&mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnchorName {
    type Err = String;
    fn from_str(s :&str) -> Result<Self, String> {
        match s {
            "in" => Ok(AnchorName::In),
            "out" => Ok(AnchorName::Out),
            "branch" => Ok(AnchorName::Branch),
            "left" => Ok(AnchorName::Left),
            "right" => Ok(AnchorName::Right),
            x => Err(format!("Unknown anchor name {:?}", x)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side { Left, Right }

impl Side {
    pub fn other(&self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Left-hand geometry mirrors the y axis.
    pub fn factor(&self) -> f64 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointsState { Out, Branch }

impl PointsState {
    pub fn other(&self) -> Self {
        match self {
            PointsState::Out => PointsState::Branch,
            PointsState::Branch => PointsState::Out,
        }
    }

    pub fn anchor(&self) -> AnchorName {
        match self {
            PointsState::Out => AnchorName::Out,
            PointsState::Branch => AnchorName::Branch,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Traversal {
    pub to :AnchorName,
    pub distance :f64,
    pub available :bool,
}

pub type Traversals = SmallVec<[Traversal; 2]>;

#[derive(Copy, Clone, Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Straight { length :f64 },
    Curve { radius :f64, per_circle :u32, direction :Side },
    Points { hand :Side, state :PointsState },
    Crossover { length :f64 },
}

/// Named piece types, looked up by `PieceKind::from_name`.
pub const CATALOGUE :&[(&str, PieceKind)] = &[
    ("straight", PieceKind::Straight { length: 16.0 }),
    ("half-straight", PieceKind::Straight { length: 8.0 }),
    ("quarter-straight", PieceKind::Straight { length: 4.0 }),
    ("curve", PieceKind::Curve { radius: 40.0, per_circle: 16, direction: Side::Left }),
    ("half-curve", PieceKind::Curve { radius: 40.0, per_circle: 32, direction: Side::Left }),
    ("r24-curve", PieceKind::Curve { radius: 24.0, per_circle: 16, direction: Side::Left }),
    ("r32-curve", PieceKind::Curve { radius: 32.0, per_circle: 16, direction: Side::Left }),
    ("r56-curve", PieceKind::Curve { radius: 56.0, per_circle: 16, direction: Side::Left }),
    ("r72-curve", PieceKind::Curve { radius: 72.0, per_circle: 32, direction: Side::Left }),
    ("r88-curve", PieceKind::Curve { radius: 88.0, per_circle: 32, direction: Side::Left }),
    ("r104-curve", PieceKind::Curve { radius: 104.0, per_circle: 32, direction: Side::Left }),
    ("r120-curve", PieceKind::Curve { radius: 120.0, per_circle: 32, direction: Side::Left }),
    ("left-points", PieceKind::Points { hand: Side::Left, state: PointsState::Out }),
    ("right-points", PieceKind::Points { hand: Side::Right, state: PointsState::Out }),
    ("crossover", PieceKind::Crossover { length: 16.0 }),
    ("short-crossover", PieceKind::Crossover { length: 8.0 }),
];

const TWO_ANCHORS :&[AnchorName] = &[AnchorName::In, AnchorName::Out];
const POINTS_ANCHORS :&[AnchorName] = &[AnchorName::In, AnchorName::Out, AnchorName::Branch];
const CROSSOVER_ANCHORS :&[AnchorName] =
    &[AnchorName::In, AnchorName::Left, AnchorName::Right, AnchorName::Out];

impl PieceKind {
    pub fn from_name(name :&str) -> Option<PieceKind> {
        CATALOGUE.iter().find(|(n,_)| *n == name).map(|(_,k)| *k)
    }

    /// Catalogue name of this piece's shape (handedness and switch state ignored).
    pub fn name(&self) -> Option<&'static str> {
        CATALOGUE.iter().find(|(_,k)| match (k, self) {
            (PieceKind::Straight { length: a }, PieceKind::Straight { length: b }) => a == b,
            (PieceKind::Curve { radius: r1, per_circle: p1, .. },
             PieceKind::Curve { radius: r2, per_circle: p2, .. }) => r1 == r2 && p1 == p2,
            (PieceKind::Points { hand: a, .. }, PieceKind::Points { hand: b, .. }) => a == b,
            (PieceKind::Crossover { length: a }, PieceKind::Crossover { length: b }) => a == b,
            _ => false,
        }).map(|(n,_)| *n)
    }

    pub fn anchor_names(&self) -> &'static [AnchorName] {
        match self {
            PieceKind::Straight { .. } | PieceKind::Curve { .. } => TWO_ANCHORS,
            PieceKind::Points { .. } => POINTS_ANCHORS,
            PieceKind::Crossover { .. } => CROSSOVER_ANCHORS,
        }
    }

    pub fn has_anchor(&self, name :AnchorName) -> bool {
        self.anchor_names().contains(&name)
    }

    pub fn is_points(&self) -> bool {
        matches!(self, PieceKind::Points { .. })
    }

    /// Anchors reachable from `from`, in preference order, with the
    /// distance through the piece and whether the route is currently set.
    pub fn traversals(&self, from :AnchorName) -> Traversals {
        use AnchorName::*;
        let t = |to, distance, available| Traversal { to, distance, available };
        match (self, from) {
            (PieceKind::Straight { length }, In) => smallvec![t(Out, *length, true)],
            (PieceKind::Straight { length }, Out) => smallvec![t(In, *length, true)],
            (PieceKind::Curve { .. }, In) => smallvec![t(Out, self.curve_length(), true)],
            (PieceKind::Curve { .. }, Out) => smallvec![t(In, self.curve_length(), true)],
            (PieceKind::Points { hand, state }, In) => smallvec![
                t(Out, POINTS_LENGTH, *state == PointsState::Out),
                t(Branch, branch_geometry(*hand).length, *state == PointsState::Branch),
            ],
            (PieceKind::Points { .. }, Out) => smallvec![t(In, POINTS_LENGTH, true)],
            (PieceKind::Points { hand, .. }, Branch) =>
                smallvec![t(In, branch_geometry(*hand).length, true)],
            (PieceKind::Crossover { length }, In) => smallvec![t(Out, *length, true)],
            (PieceKind::Crossover { length }, Out) => smallvec![t(In, *length, true)],
            (PieceKind::Crossover { length }, Left) => smallvec![t(Right, *length, true)],
            (PieceKind::Crossover { length }, Right) => smallvec![t(Left, *length, true)],
            _ => SmallVec::new(),
        }
    }

    pub fn available_traversal(&self, from :AnchorName) -> Option<(AnchorName, f64)> {
        self.traversals(from).into_iter()
            .find(|t| t.available)
            .map(|t| (t.to, t.distance))
    }

    /// Distance through the piece from `from` to `to`, ignoring switch state.
    pub fn traversal_distance(&self, from :AnchorName, to :AnchorName) -> Option<f64> {
        self.traversals(from).into_iter().find(|t| t.to == to).map(|t| t.distance)
    }

    fn curve_length(&self) -> f64 {
        match self {
            PieceKind::Curve { radius, per_circle, .. } => TAU * radius / (*per_circle as f64),
            _ => 0.0,
        }
    }

    /// Offset of each anchor from the piece position. Anchors face outwards,
    /// so the first anchor is always `(0, 0, π)`.
    pub fn relative_positions(&self) -> SmallVec<[(AnchorName, Position); 4]> {
        let first = (self.anchor_names()[0], Position::new(0.0, 0.0, PI));
        match self {
            PieceKind::Straight { length } => smallvec![
                first, (AnchorName::Out, Position::new(*length, 0.0, 0.0))],
            PieceKind::Curve { radius, per_circle, direction } => {
                let theta = TAU / (*per_circle as f64);
                let flip = direction.factor();
                smallvec![first, (AnchorName::Out, Position::new(
                    radius * theta.sin(), flip * (radius - radius * theta.cos()), flip * theta))]
            },
            PieceKind::Points { hand, .. } => {
                let end = branch_geometry(*hand).end();
                smallvec![first,
                    (AnchorName::Out, Position::new(POINTS_LENGTH, 0.0, 0.0)),
                    (AnchorName::Branch, Position::new(end.x, end.y, hand.factor() * TAU / 16.0))]
            },
            PieceKind::Crossover { length } => smallvec![
                first,
                (AnchorName::Left, Position::new(length / 2.0, -length / 2.0, -PI / 2.0)),
                (AnchorName::Right, Position::new(length / 2.0, length / 2.0, PI / 2.0)),
                (AnchorName::Out, Position::new(*length, 0.0, 0.0))],
        }
    }

    pub fn relative_position(&self, name :AnchorName) -> Option<Position> {
        self.relative_positions().into_iter().find(|(n,_)| *n == name).map(|(_,p)| p)
    }

    /// Pose of a point `offset` along the traversal `from -> to`, in the
    /// piece's own frame, heading in the direction of travel.
    pub fn point_position(&self, from :AnchorName, to :AnchorName, offset :f64) -> Option<Position> {
        use AnchorName::*;
        let len = self.traversal_distance(from, to)?;
        let offset = offset.max(0.0).min(len);
        match (self, from, to) {
            (PieceKind::Straight { .. }, In, _) |
            (PieceKind::Crossover { .. }, In, _) |
            (PieceKind::Points { .. }, In, Out) =>
                Some(Position::new(offset, 0.0, 0.0)),
            (PieceKind::Straight { .. }, Out, _) |
            (PieceKind::Crossover { .. }, Out, _) |
            (PieceKind::Points { .. }, Out, _) =>
                Some(Position::new(len - offset, 0.0, PI)),
            (PieceKind::Crossover { length }, Left, _) =>
                Some(Position::new(length / 2.0, -length / 2.0 + offset, PI / 2.0)),
            (PieceKind::Crossover { length }, Right, _) =>
                Some(Position::new(length / 2.0, length / 2.0 - offset, -PI / 2.0)),
            (PieceKind::Curve { radius, direction, .. }, _, _) => {
                let along = if from == In { offset } else { len - offset };
                let theta = along / radius;
                let flip = direction.factor();
                let heading = if from == In { flip * theta } else { flip * theta + PI };
                Some(Position::new(radius * theta.sin(),
                                   flip * (radius - radius * theta.cos()), heading))
            },
            (PieceKind::Points { hand, .. }, In, Branch) =>
                Some(branch_geometry(*hand).position_at(offset, false)),
            (PieceKind::Points { hand, .. }, Branch, _) =>
                Some(branch_geometry(*hand).position_at(len - offset, true)),
            _ => None,
        }
    }

    /// Bounding box in the piece's own frame, including rail width.
    pub fn bounds(&self) -> Bounds {
        match self {
            PieceKind::Straight { length } =>
                Bounds { x: 0.0, y: -4.0, width: *length, height: 8.0 },
            PieceKind::Curve { radius, per_circle, direction } => {
                let sweep = TAU / (*per_circle as f64);
                let flip = direction.factor();
                let mut pts = Vec::new();
                for i in 0..=8 {
                    let theta = sweep * (i as f64) / 8.0;
                    for r in &[radius - 4.0, radius + 4.0] {
                        pts.push(glm::vec2(r * theta.sin(), flip * (radius - r * theta.cos())));
                    }
                }
                Bounds::from_points(&pts)
            },
            PieceKind::Points { hand, .. } => {
                let end = branch_geometry(*hand).end();
                let width = end.x + 4.0 * (PI / 8.0).sin();
                let height = end.y.abs() + 4.0 * (PI / 8.0).cos() + 4.0;
                Bounds {
                    x: 0.0,
                    y: if *hand == Side::Left { 4.0 - height } else { -4.0 },
                    width, height,
                }
            },
            PieceKind::Crossover { length } =>
                Bounds { x: 0.0, y: -length / 2.0, width: *length, height: *length },
        }
    }

    /// Mirror image of a handed piece; `None` for symmetric pieces.
    pub fn flipped(&self) -> Option<PieceKind> {
        match self {
            PieceKind::Curve { radius, per_circle, direction } =>
                Some(PieceKind::Curve { radius: *radius, per_circle: *per_circle,
                                        direction: direction.other() }),
            PieceKind::Points { hand, state } =>
                Some(PieceKind::Points { hand: hand.other(), state: *state }),
            _ => None,
        }
    }
}

const BRANCH_SAMPLES :usize = 1000;
const ARC_TABLE_STEPS :usize = 100;

/// Cubic Bézier branch rail of a set of points, starting at the origin.
#[derive(Debug)]
pub struct BranchGeometry {
    control :[glm::DVec2; 3],
    pub length :f64,
    /// Bézier parameter at each percent of the arc length.
    arc_table :Vec<f64>,
}

lazy_static! {
    static ref LEFT_BRANCH :BranchGeometry = BranchGeometry::new(Side::Left);
    static ref RIGHT_BRANCH :BranchGeometry = BranchGeometry::new(Side::Right);
}

pub fn branch_geometry(hand :Side) -> &'static BranchGeometry {
    match hand {
        Side::Left => &LEFT_BRANCH,
        Side::Right => &RIGHT_BRANCH,
    }
}

impl BranchGeometry {
    fn new(hand :Side) -> Self {
        let flip = hand.factor();
        let a = TAU * 5.0 / 16.0;
        let end = glm::vec2(48.0 + 40.0 * a.cos(), flip * (-24.0 + 40.0 * a.sin()));
        let control = [
            glm::vec2(16.0, 0.0),
            glm::vec2(end.x - a.sin() * 16.0, end.y + a.cos() * 16.0 * flip),
            end,
        ];

        let mut cumulative = Vec::with_capacity(BRANCH_SAMPLES + 1);
        cumulative.push(0.0);
        let mut prev = glm::vec2(0.0, 0.0);
        for i in 1..=BRANCH_SAMPLES {
            let p = bezier(&control, i as f64 / BRANCH_SAMPLES as f64);
            let l = cumulative[i - 1] + glm::distance(&prev, &p);
            cumulative.push(l);
            prev = p;
        }
        let length = cumulative[BRANCH_SAMPLES];

        let mut arc_table = Vec::with_capacity(ARC_TABLE_STEPS + 1);
        let mut i = 0;
        for step in 0..=ARC_TABLE_STEPS {
            let target = length * step as f64 / ARC_TABLE_STEPS as f64;
            while i < BRANCH_SAMPLES && cumulative[i + 1] < target { i += 1; }
            let t = if i >= BRANCH_SAMPLES { 1.0 } else {
                let seg = cumulative[i + 1] - cumulative[i];
                let frac = if seg > 0.0 { (target - cumulative[i]) / seg } else { 0.0 };
                (i as f64 + frac.max(0.0).min(1.0)) / BRANCH_SAMPLES as f64
            };
            arc_table.push(t);
        }

        BranchGeometry { control, length, arc_table }
    }

    pub fn end(&self) -> glm::DVec2 { self.control[2] }

    fn parameter_at(&self, distance :f64) -> f64 {
        let x = (distance / self.length).max(0.0).min(1.0) * ARC_TABLE_STEPS as f64;
        let i = (x.floor() as usize).min(ARC_TABLE_STEPS - 1);
        let frac = x - i as f64;
        self.arc_table[i] + (self.arc_table[i + 1] - self.arc_table[i]) * frac
    }

    /// Pose `distance` along the branch from the points' origin.
    fn position_at(&self, distance :f64, reversed :bool) -> Position {
        let t = self.parameter_at(distance);
        let p = bezier(&self.control, t);
        let d = bezier_derivative(&self.control, t);
        let heading = d.y.atan2(d.x);
        Position::new(p.x, p.y, if reversed { heading + PI } else { heading })
    }
}

fn bezier(c :&[glm::DVec2; 3], t :f64) -> glm::DVec2 {
    let u = 1.0 - t;
    c[0] * (3.0 * u * u * t) + c[1] * (3.0 * u * t * t) + c[2] * (t * t * t)
}

fn bezier_derivative(c :&[glm::DVec2; 3], t :f64) -> glm::DVec2 {
    let u = 1.0 - t;
    c[0] * (3.0 * u * u) + (c[1] - c[0]) * (6.0 * u * t) + (c[2] - c[1]) * (3.0 * t * t)
}
