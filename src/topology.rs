//! The track graph.
//!
//! Pieces are nodes, anchors are the connectors between them. Both live in
//! arenas owned by the `Layout`; a joint between two pieces is a single
//! anchor entry whose index is stored by both pieces.

use crate::events::{Event, EventBus};
use crate::interlocking::Reservation;
use crate::pieces::*;
use crate::position::{Bounds, Position, ANGLE_EPSILON};
use crate::sensors::Sensor;
use crate::train::{Train, TrainId};
use generational_arena::{Arena, Index};
use log::*;
use serde::{Serialize, Deserialize};
use smallvec::{smallvec, SmallVec};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Serialize, Deserialize)]
#[derive(Copy,Clone,PartialEq, Eq, Hash, Debug,PartialOrd,Ord)]
pub struct PieceId(pub(crate) Index);
#[derive(Serialize, Deserialize)]
#[derive(Copy,Clone,PartialEq, Eq, Hash, Debug,PartialOrd,Ord)]
pub struct AnchorId(pub(crate) Index);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("anchor {0:?} is already connected")]
    AlreadyConnected(AnchorId),
    #[error("cannot connect piece {0:?} to itself")]
    SelfConnection(PieceId),
    #[error("piece {0:?} not found")]
    UnknownPiece(PieceId),
    #[error("anchor {0:?} not found")]
    UnknownAnchor(AnchorId),
    #[error("piece {0:?} has no anchor named `{1}`")]
    NoSuchAnchor(PieceId, AnchorName),
    #[error("piece {0:?} is not a set of points")]
    NotPoints(PieceId),
    #[error("piece {0:?} has no handedness")]
    NotFlippable(PieceId),
}

#[derive(Debug, Clone)]
pub struct Piece {
    pub kind :PieceKind,
    pub anchors :SmallVec<[(AnchorName, AnchorId); 4]>,
    /// Explicit absolute position. At most one piece per connected subset has one.
    pub placement :Option<Position>,
    pub position :Option<Position>,
    pub placement_origin :Option<PieceId>,
    pub claimed_by :Option<TrainId>,
    pub reservations :BTreeMap<TrainId, Reservation>,
}

impl Piece {
    pub fn anchor(&self, name :AnchorName) -> Option<AnchorId> {
        self.anchors.iter().find(|(n,_)| *n == name).map(|(_,a)| *a)
    }
}

#[derive(Debug, Clone)]
pub struct Anchor {
    pub members :SmallVec<[(PieceId, AnchorName); 2]>,
    pub position :Option<Position>,
}

impl Anchor {
    pub fn is_dangling(&self) -> bool { self.members.len() < 2 }

    /// The member on the other side of `piece`.
    pub fn other(&self, piece :PieceId) -> Option<(PieceId, AnchorName)> {
        self.members.iter().find(|(p,_)| *p != piece).cloned()
    }
}

#[derive(Debug, Default)]
pub struct Layout {
    pub(crate) pieces :Arena<Piece>,
    pub(crate) anchors :Arena<Anchor>,
    pub(crate) trains :Arena<Train>,
    pub(crate) sensors :Arena<Sensor>,
    pub events :EventBus,
}

impl Layout {
    pub fn new() -> Self { Default::default() }

    pub fn piece(&self, id :PieceId) -> Option<&Piece> { self.pieces.get(id.0) }
    pub(crate) fn piece_mut(&mut self, id :PieceId) -> Option<&mut Piece> { self.pieces.get_mut(id.0) }
    pub fn anchor(&self, id :AnchorId) -> Option<&Anchor> { self.anchors.get(id.0) }

    pub fn iter_pieces(&self) -> impl Iterator<Item = (PieceId, &Piece)> {
        self.pieces.iter().map(|(k,v)| (PieceId(k), v))
    }
    pub fn iter_anchors(&self) -> impl Iterator<Item = (AnchorId, &Anchor)> {
        self.anchors.iter().map(|(k,v)| (AnchorId(k), v))
    }
    pub fn num_pieces(&self) -> usize { self.pieces.len() }

    pub fn piece_anchor(&self, piece :PieceId, name :AnchorName) -> Result<AnchorId, TopologyError> {
        self.piece(piece).ok_or(TopologyError::UnknownPiece(piece))?
            .anchor(name).ok_or(TopologyError::NoSuchAnchor(piece, name))
    }

    pub fn add_piece(&mut self, kind :PieceKind, placement :Option<Position>) -> PieceId {
        let id = PieceId(self.pieces.insert(Piece {
            kind,
            anchors: SmallVec::new(),
            placement: None,
            position: None,
            placement_origin: None,
            claimed_by: None,
            reservations: BTreeMap::new(),
        }));
        for name in kind.anchor_names() {
            let anchor = AnchorId(self.anchors.insert(Anchor {
                members: smallvec![(id, *name)],
                position: None,
            }));
            self.pieces[id.0].anchors.push((*name, anchor));
        }
        debug!("Added {:?} {:?}", id, kind);
        self.events.emit(Event::PieceAdded(id));
        if placement.is_some() {
            self.propagate_positions(id, placement);
        }
        id
    }

    /// Joins two dangling anchors. `b` survives and `a` is dropped from the
    /// arena. If both sides were placed, `b`'s side keeps its placement.
    pub fn connect(&mut self, a :AnchorId, b :AnchorId) -> Result<AnchorId, TopologyError> {
        let result = self.try_connect(a, b);
        if let Err(e) = &result {
            error!("Could not connect {:?} to {:?}: {}", a, b, e);
        }
        result
    }

    fn try_connect(&mut self, a :AnchorId, b :AnchorId) -> Result<AnchorId, TopologyError> {
        let anchor_a = self.anchor(a).ok_or(TopologyError::UnknownAnchor(a))?;
        let anchor_b = self.anchor(b).ok_or(TopologyError::UnknownAnchor(b))?;
        if anchor_a.members.len() != 1 { return Err(TopologyError::AlreadyConnected(a)); }
        if anchor_b.members.len() != 1 { return Err(TopologyError::AlreadyConnected(b)); }
        let (piece_a, name_a) = anchor_a.members[0];
        let (piece_b, _) = anchor_b.members[0];
        if piece_a == piece_b { return Err(TopologyError::SelfConnection(piece_a)); }

        let origin_a = self.pieces[piece_a.0].placement_origin;
        let origin_b = self.pieces[piece_b.0].placement_origin;

        self.anchors.remove(a.0);
        self.anchors[b.0].members.push((piece_a, name_a));
        for (n, id) in self.pieces[piece_a.0].anchors.iter_mut() {
            if *n == name_a { *id = b; }
        }
        debug!("Connected {:?}.{} to {:?}", piece_a, name_a, piece_b);
        self.events.emit(Event::AnchorConnected(b));

        match origin_b.or(origin_a) {
            Some(origin) => {
                let placement = self.pieces[origin.0].placement;
                self.propagate_positions(origin, placement);
            },
            None => {
                warn!("Connected two unplaced subsets at {:?}", b);
                self.propagate_positions(piece_b, None);
            },
        }
        self.events.emit(Event::LayoutChanged);
        Ok(b)
    }

    /// Detaches `side_piece` from a joint, returning its new anchor.
    /// Both resulting subsets keep their current positions.
    pub fn split(&mut self, anchor :AnchorId, side_piece :PieceId) -> Result<AnchorId, TopologyError> {
        let a = self.anchor(anchor).ok_or(TopologyError::UnknownAnchor(anchor))?;
        if a.members.len() < 2 { return Ok(anchor); }
        let idx = a.members.iter().position(|(p,_)| *p == side_piece)
            .ok_or(TopologyError::UnknownPiece(side_piece))?;
        let other_piece = a.members[1 - idx].0;
        let origin = self.pieces[side_piece.0].placement_origin;

        let (_, name) = self.anchors[anchor.0].members.remove(idx);
        let position = self.anchors[anchor.0].position;
        let new_anchor = AnchorId(self.anchors.insert(Anchor {
            members: smallvec![(side_piece, name)],
            position,
        }));
        for (n, id) in self.pieces[side_piece.0].anchors.iter_mut() {
            if *n == name { *id = new_anchor; }
        }
        debug!("Split {:?}.{} from {:?}", side_piece, name, anchor);
        self.events.emit(Event::AnchorSplit(anchor, new_anchor));

        for piece in [other_piece, side_piece].iter().cloned() {
            let subset = self.connected_subset(piece);
            match origin {
                Some(o) if subset.contains(&o) => {
                    let placement = self.pieces[o.0].placement;
                    self.propagate_positions(o, placement);
                },
                _ => {
                    let frozen = self.pieces[piece.0].position;
                    self.propagate_positions(piece, frozen);
                },
            }
        }
        self.events.emit(Event::LayoutChanged);
        Ok(new_anchor)
    }

    /// Positions every piece reachable from `from`, with `from` placed at
    /// `placement`. Other pieces in the subset lose their own placement.
    pub fn propagate_positions(&mut self, from :PieceId, placement :Option<Position>) {
        if self.piece(from).is_none() { return; }
        let origin = placement.map(|_| from);
        let mut visited = BTreeSet::new();
        let mut stack = vec![(from, placement)];
        while let Some((id, position)) = stack.pop() {
            if !visited.insert(id) { continue; }
            let piece = &mut self.pieces[id.0];
            piece.placement = if id == from { placement } else { None };
            piece.placement_origin = origin;
            let changed = piece.position != position;
            piece.position = position;
            let kind = piece.kind;
            let anchors = piece.anchors.clone();
            if changed {
                self.events.emit(Event::PiecePositioned(id));
            }

            for (name, anchor_id) in anchors {
                let anchor_position = match (position, kind.relative_position(name)) {
                    (Some(p), Some(rel)) => Some(p + rel),
                    _ => None,
                };
                let anchor = &mut self.anchors[anchor_id.0];
                anchor.position = anchor_position;
                if let Some((next, next_name)) = anchor.other(id) {
                    if visited.contains(&next) { continue; }
                    let next_rel = self.pieces[next.0].kind.relative_position(next_name);
                    let next_position = match (anchor_position, next_rel) {
                        (Some(a), Some(rel)) => Some(a + Position::new(0.0, 0.0, PI) + rel.inverse()),
                        _ => None,
                    };
                    stack.push((next, next_position));
                }
            }
        }
        trace!("Propagated positions from {:?} over {} pieces", from, visited.len());
    }

    pub fn set_placement(&mut self, piece :PieceId, placement :Option<Position>) -> Result<(), TopologyError> {
        self.piece(piece).ok_or(TopologyError::UnknownPiece(piece))?;
        self.propagate_positions(piece, placement);
        Ok(())
    }

    fn repropagate(&mut self, piece :PieceId) {
        let origin = self.pieces[piece.0].placement_origin.unwrap_or(piece);
        let placement = self.pieces[origin.0].placement;
        self.propagate_positions(origin, placement);
    }

    pub fn remove_piece(&mut self, id :PieceId) -> Result<(), TopologyError> {
        let anchors = self.piece(id).ok_or(TopologyError::UnknownPiece(id))?.anchors.clone();
        for (_, anchor) in anchors {
            self.split(anchor, id)?;
        }
        if let Some(piece) = self.pieces.remove(id.0) {
            for (_, own) in piece.anchors {
                self.anchors.remove(own.0);
            }
        }

        let sensors = self.sensors.iter()
            .filter(|(_,s)| s.track_point.piece == id)
            .map(|(k,_)| k).collect::<Vec<_>>();
        for s in sensors { self.sensors.remove(s); }

        let trains = self.trains.iter()
            .filter(|(_,t)| t.position.iter().chain(t.rear_position.iter()).any(|p| p.piece == id))
            .map(|(k,_)| TrainId(k)).collect::<Vec<_>>();
        for t in trains {
            warn!("Train {:?} was on removed piece {:?}", t, id);
            self.unplace_train(t);
        }

        debug!("Removed {:?}", id);
        self.events.emit(Event::PieceRemoved(id));
        self.events.emit(Event::LayoutChanged);
        Ok(())
    }

    pub fn set_points_state(&mut self, id :PieceId, state :PointsState) -> Result<(), TopologyError> {
        let piece = self.piece_mut(id).ok_or(TopologyError::UnknownPiece(id))?;
        match &mut piece.kind {
            PieceKind::Points { state: current, .. } => {
                if *current == state { return Ok(()); }
                *current = state;
            },
            _ => return Err(TopologyError::NotPoints(id)),
        }
        debug!("Points {:?} set to {:?}", id, state);
        self.events.emit(Event::PointsChanged(id, state));
        Ok(())
    }

    pub fn toggle_points(&mut self, id :PieceId) -> Result<PointsState, TopologyError> {
        let state = match self.piece(id).ok_or(TopologyError::UnknownPiece(id))?.kind {
            PieceKind::Points { state, .. } => state.other(),
            _ => return Err(TopologyError::NotPoints(id)),
        };
        self.set_points_state(id, state)?;
        Ok(state)
    }

    /// Mirrors a curve or a set of points and repositions its subset.
    pub fn flip_piece(&mut self, id :PieceId) -> Result<(), TopologyError> {
        let piece = self.piece_mut(id).ok_or(TopologyError::UnknownPiece(id))?;
        piece.kind = piece.kind.flipped().ok_or(TopologyError::NotFlippable(id))?;
        self.repropagate(id);
        self.events.emit(Event::LayoutChanged);
        Ok(())
    }

    pub fn traversals(&self, piece :PieceId, from :AnchorName) -> Traversals {
        self.piece(piece).map(|p| p.kind.traversals(from)).unwrap_or_default()
    }

    pub fn available_traversal(&self, piece :PieceId, from :AnchorName) -> Option<(AnchorName, f64)> {
        self.piece(piece)?.kind.available_traversal(from)
    }

    pub fn relative_positions(&self, piece :PieceId) -> SmallVec<[(AnchorName, Position); 4]> {
        self.piece(piece).map(|p| p.kind.relative_positions()).unwrap_or_default()
    }

    /// The piece and anchor name on the far side of `piece`'s anchor `name`.
    pub fn next(&self, piece :PieceId, name :AnchorName) -> Option<(PieceId, AnchorName)> {
        let anchor = self.piece(piece)?.anchor(name)?;
        self.anchor(anchor)?.other(piece)
    }

    pub fn connected_subset(&self, piece :PieceId) -> BTreeSet<PieceId> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![piece];
        while let Some(id) = stack.pop() {
            let p = match self.piece(id) { Some(p) => p, None => continue };
            if !visited.insert(id) { continue; }
            for (_, anchor) in p.anchors.iter() {
                if let Some((next, _)) = self.anchor(*anchor).and_then(|a| a.other(id)) {
                    if !visited.contains(&next) { stack.push(next); }
                }
            }
        }
        visited
    }

    /// Absolute bounding box, or `None` if the piece is not positioned.
    pub fn bounds(&self, piece :PieceId) -> Option<Bounds> {
        let p = self.piece(piece)?;
        Some(p.position?.transform_bounds(&p.kind.bounds()))
    }

    pub fn anchor_position(&self, anchor :AnchorId) -> Option<Position> {
        self.anchor(anchor)?.position
    }

    /// Joints whose two sides do not line up, e.g. a loop that does not close.
    pub fn misaligned_anchors(&self, epsilon :f64) -> Vec<AnchorId> {
        self.iter_anchors().filter(|(_, a)| {
            if a.members.len() != 2 { return false; }
            let ends = a.members.iter().filter_map(|(p, n)| {
                let piece = self.piece(*p)?;
                Some(piece.position? + piece.kind.relative_position(*n)?)
            }).collect::<Vec<_>>();
            ends.len() == 2 && !(
                (ends[0].x - ends[1].x).abs() < epsilon &&
                (ends[0].y - ends[1].y).abs() < epsilon &&
                ends[0].angle_is_opposite(&ends[1], ANGLE_EPSILON))
        }).map(|(id,_)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn kind(name :&str) -> PieceKind { PieceKind::from_name(name).unwrap() }

    fn line(layout :&mut Layout, n :usize) -> Vec<PieceId> {
        let mut pieces = vec![layout.add_piece(kind("straight"), Some(Position::origin()))];
        for _ in 1..n {
            let prev = *pieces.last().unwrap();
            let next = layout.add_piece(kind("straight"), None);
            let a = layout.piece_anchor(prev, AnchorName::Out).unwrap();
            let b = layout.piece_anchor(next, AnchorName::In).unwrap();
            layout.connect(b, a).unwrap();
            pieces.push(next);
        }
        pieces
    }

    #[test]
    fn connect_shares_one_anchor() {
        let mut layout = Layout::new();
        let p1 = layout.add_piece(kind("straight"), None);
        let p2 = layout.add_piece(kind("curve"), None);
        let a = layout.piece_anchor(p1, AnchorName::Out).unwrap();
        let b = layout.piece_anchor(p2, AnchorName::In).unwrap();
        let joint = layout.connect(a, b).unwrap();
        assert_eq!(layout.piece_anchor(p1, AnchorName::Out).unwrap(), joint);
        assert_eq!(layout.piece_anchor(p2, AnchorName::In).unwrap(), joint);
        assert_eq!(layout.anchor(joint).unwrap().members.len(), 2);
        assert!(layout.anchor(a).is_none());
        assert_eq!(layout.next(p1, AnchorName::Out), Some((p2, AnchorName::In)));

        let new = layout.split(joint, p1).unwrap();
        assert_ne!(new, joint);
        let members = layout.anchor(joint).unwrap().members.iter()
            .chain(layout.anchor(new).unwrap().members.iter())
            .cloned().collect::<BTreeSet<_>>();
        assert_eq!(members, vec![(p1, AnchorName::Out), (p2, AnchorName::In)].into_iter().collect::<BTreeSet<_>>());
        assert!(layout.anchor(joint).unwrap().is_dangling());
        assert!(layout.anchor(new).unwrap().is_dangling());
        assert_eq!(layout.next(p1, AnchorName::Out), None);
        // splitting a dangling anchor does nothing
        assert_eq!(layout.split(new, p1), Ok(new));
    }

    #[test]
    fn connection_discipline() {
        let mut layout = Layout::new();
        let p1 = layout.add_piece(kind("straight"), None);
        let p2 = layout.add_piece(kind("straight"), None);
        let p3 = layout.add_piece(kind("straight"), None);
        let p1_in = layout.piece_anchor(p1, AnchorName::In).unwrap();
        let p1_out = layout.piece_anchor(p1, AnchorName::Out).unwrap();
        let p2_in = layout.piece_anchor(p2, AnchorName::In).unwrap();
        let p3_in = layout.piece_anchor(p3, AnchorName::In).unwrap();
        assert_eq!(layout.connect(p1_in, p1_out), Err(TopologyError::SelfConnection(p1)));
        let joint = layout.connect(p1_out, p2_in).unwrap();
        assert_eq!(layout.connect(p3_in, joint), Err(TopologyError::AlreadyConnected(joint)));
        assert_eq!(layout.connect(p1_out, p3_in), Err(TopologyError::UnknownAnchor(p1_out)));
        assert_eq!(layout.anchor(p3_in).unwrap().members.len(), 1);
    }

    #[test]
    fn placement_propagates_along_line() {
        let mut layout = Layout::new();
        let pieces = line(&mut layout, 3);
        let last = layout.piece(pieces[2]).unwrap();
        assert_abs_diff_eq!(last.position.unwrap(), Position::new(32.0, 0.0, 0.0), epsilon = 1e-9);
        assert_eq!(last.placement_origin, Some(pieces[0]));
        assert!(last.placement.is_none());
        let b = layout.bounds(pieces[2]).unwrap();
        assert_abs_diff_eq!(b.x, 32.0, epsilon = 1e-9);

        layout.set_placement(pieces[1], Some(Position::new(0.0, 0.0, PI / 2.0))).unwrap();
        let first = layout.piece(pieces[0]).unwrap();
        assert!(first.placement.is_none());
        assert_eq!(first.placement_origin, Some(pieces[1]));
        assert_abs_diff_eq!(first.position.unwrap(), Position::new(0.0, -16.0, PI / 2.0), epsilon = 1e-9);
    }

    #[test]
    fn unplaced_pieces_have_no_bounds() {
        let mut layout = Layout::new();
        let p = layout.add_piece(kind("straight"), None);
        assert!(layout.piece(p).unwrap().position.is_none());
        assert!(layout.bounds(p).is_none());
        assert!(layout.anchor_position(layout.piece_anchor(p, AnchorName::In).unwrap()).is_none());
    }

    #[test]
    fn ring_of_curves_closes() {
        let mut layout = Layout::new();
        let start = Position::new(10.0, 20.0, 0.3);
        let mut pieces = vec![layout.add_piece(kind("curve"), Some(start))];
        for _ in 1..16 {
            let prev = *pieces.last().unwrap();
            let next = layout.add_piece(kind("curve"), None);
            let a = layout.piece_anchor(prev, AnchorName::Out).unwrap();
            let b = layout.piece_anchor(next, AnchorName::In).unwrap();
            layout.connect(b, a).unwrap();
            pieces.push(next);
        }
        let a = layout.piece_anchor(pieces[15], AnchorName::Out).unwrap();
        let b = layout.piece_anchor(pieces[0], AnchorName::In).unwrap();
        layout.connect(a, b).unwrap();

        assert_abs_diff_eq!(layout.piece(pieces[0]).unwrap().position.unwrap(), start, epsilon = 1e-9);
        let first = layout.piece(pieces[0]).unwrap();
        let last = layout.piece(pieces[15]).unwrap();
        let entry = first.position.unwrap() + first.kind.relative_position(AnchorName::In).unwrap();
        let exit = last.position.unwrap() + last.kind.relative_position(AnchorName::Out).unwrap();
        assert_abs_diff_eq!(entry.x, exit.x, epsilon = 1e-6);
        assert_abs_diff_eq!(entry.y, exit.y, epsilon = 1e-6);
        assert!(entry.angle_is_opposite(&exit, ANGLE_EPSILON));
        assert!(layout.misaligned_anchors(1e-6).is_empty());
        assert_eq!(layout.connected_subset(pieces[7]).len(), 16);
    }

    #[test]
    fn split_keeps_both_sides_positioned() {
        let mut layout = Layout::new();
        let pieces = line(&mut layout, 4);
        let before = layout.piece(pieces[3]).unwrap().position;
        let joint = layout.piece_anchor(pieces[1], AnchorName::Out).unwrap();
        layout.split(joint, pieces[2]).unwrap();
        assert_eq!(layout.connected_subset(pieces[0]).len(), 2);
        assert_eq!(layout.connected_subset(pieces[3]).len(), 2);
        assert_eq!(layout.piece(pieces[3]).unwrap().position, before);
        assert_eq!(layout.piece(pieces[0]).unwrap().placement_origin, Some(pieces[0]));
        assert_eq!(layout.piece(pieces[3]).unwrap().placement_origin, Some(pieces[2]));
        assert!(layout.piece(pieces[2]).unwrap().placement.is_some());
    }

    #[test]
    fn remove_piece_splits_neighbours() {
        let mut layout = Layout::new();
        let pieces = line(&mut layout, 3);
        let anchors_before = layout.iter_anchors().count();
        layout.remove_piece(pieces[1]).unwrap();
        assert!(layout.piece(pieces[1]).is_none());
        assert_eq!(layout.next(pieces[0], AnchorName::Out), None);
        assert_eq!(layout.next(pieces[2], AnchorName::In), None);
        assert!(layout.piece(pieces[2]).unwrap().position.is_some());
        // two joints become four dangling ends, the removed piece takes two
        assert_eq!(layout.iter_anchors().count(), anchors_before);
        assert_eq!(layout.remove_piece(pieces[1]), Err(TopologyError::UnknownPiece(pieces[1])));
    }

    #[test]
    fn removing_points_from_junction() {
        let mut layout = Layout::new();
        let j = crate::testing::junction(&mut layout);
        layout.remove_piece(j.points).unwrap();
        assert!(layout.piece(j.points).is_none());
        assert_eq!(layout.num_pieces(), 3);
        assert_eq!(layout.next(j.approach, AnchorName::Out), None);
        assert_eq!(layout.next(j.main, AnchorName::In), None);
        assert_eq!(layout.next(j.branch, AnchorName::In), None);
        for leg in [j.main, j.branch].iter() {
            let anchor = layout.piece_anchor(*leg, AnchorName::In).unwrap();
            assert!(layout.anchor(anchor).unwrap().is_dangling());
            assert!(layout.piece(*leg).unwrap().position.is_some());
        }
        // approach, main and branch keep two ends each
        assert_eq!(layout.iter_anchors().count(), 6);
    }

    #[test]
    fn points_toggle_is_visible_immediately() {
        let mut layout = Layout::new();
        let rx = layout.events.subscribe();
        let p = layout.add_piece(kind("right-points"), None);
        assert_eq!(layout.available_traversal(p, AnchorName::In).unwrap().0, AnchorName::Out);
        assert_eq!(layout.toggle_points(p), Ok(PointsState::Branch));
        assert_eq!(layout.available_traversal(p, AnchorName::In).unwrap().0, AnchorName::Branch);
        layout.set_points_state(p, PointsState::Branch).unwrap();
        let changes = rx.try_iter().filter(|e| matches!(e, Event::PointsChanged(..))).count();
        assert_eq!(changes, 1);
        let s = layout.add_piece(kind("straight"), None);
        assert_eq!(layout.toggle_points(s), Err(TopologyError::NotPoints(s)));
    }

    #[test]
    fn flipping_repositions_subset() {
        let mut layout = Layout::new();
        let c = layout.add_piece(kind("curve"), Some(Position::origin()));
        let s = layout.add_piece(kind("straight"), None);
        let a = layout.piece_anchor(c, AnchorName::Out).unwrap();
        let b = layout.piece_anchor(s, AnchorName::In).unwrap();
        layout.connect(b, a).unwrap();
        let y = layout.piece(s).unwrap().position.unwrap().y;
        assert!(y < 0.0);
        layout.flip_piece(c).unwrap();
        assert_abs_diff_eq!(layout.piece(s).unwrap().position.unwrap().y, -y, epsilon = 1e-9);
        assert_eq!(layout.flip_piece(s), Err(TopologyError::NotFlippable(s)));
    }

    #[test]
    fn second_anchor_keeps_placement() {
        let mut layout = Layout::new();
        let p1 = layout.add_piece(kind("straight"), Some(Position::new(100.0, 0.0, 0.0)));
        let p2 = layout.add_piece(kind("straight"), Some(Position::new(0.0, 0.0, 0.0)));
        let a = layout.piece_anchor(p1, AnchorName::In).unwrap();
        let b = layout.piece_anchor(p2, AnchorName::Out).unwrap();
        layout.connect(a, b).unwrap();
        assert_eq!(layout.piece(p1).unwrap().placement, None);
        assert_eq!(layout.piece(p1).unwrap().placement_origin, Some(p2));
        assert_abs_diff_eq!(layout.piece(p1).unwrap().position.unwrap(),
                            Position::new(16.0, 0.0, 0.0), epsilon = 1e-9);
    }
}
