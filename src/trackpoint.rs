//! Cursors moving along the track graph.

use crate::pieces::AnchorName;
use crate::position::Position;
use crate::routing::RouteChoices;
use crate::topology::{Layout, PieceId};
use crate::train::TrainId;
use log::*;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Motion ran off a dangling anchor. The cursor did not move.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("end of the line at {piece:?}.{final_anchor} with {remaining_distance} left to go")]
pub struct EndOfTheLine {
    pub piece :PieceId,
    pub final_anchor :AnchorName,
    pub remaining_distance :f64,
}

pub type BranchDecisions = BTreeMap<(PieceId, AnchorName), (AnchorName, f64)>;

/// A point on the track: the piece it is on, the anchor it entered that
/// piece through, and how far it has come since.
#[derive(Debug, Clone, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct TrackPoint {
    pub piece :PieceId,
    pub anchor :AnchorName,
    pub offset :f64,
    /// Exit to take from `(piece, entry)`, ahead of the live points state.
    /// Holds route choices and the way through the current piece.
    #[serde(skip)]
    pub branch_decisions :BranchDecisions,
    /// The way back over ground already covered. Becomes the branch
    /// decisions when the point is reversed.
    #[serde(skip)]
    pub trail :BranchDecisions,
    #[serde(skip)]
    pub train :Option<TrainId>,
}

impl TrackPoint {
    pub fn new(piece :PieceId, anchor :AnchorName, offset :f64) -> Self {
        TrackPoint { piece, anchor, offset, branch_decisions: BTreeMap::new(), trail: BTreeMap::new(), train: None }
    }

    pub fn with_train(mut self, train :Option<TrainId>) -> Self {
        self.train = train;
        self
    }

    fn traversal(&self, layout :&Layout, piece :PieceId, entry :AnchorName) -> Option<(AnchorName, f64)> {
        self.branch_decisions.get(&(piece, entry)).cloned()
            .or_else(|| layout.available_traversal(piece, entry))
    }

    /// Exit anchor and length of the traversal this point is on.
    pub fn current_traversal(&self, layout :&Layout) -> Option<(AnchorName, f64)> {
        self.traversal(layout, self.piece, self.anchor)
    }

    /// Fixes the way through the current piece in both directions.
    fn pin(&mut self, exit :AnchorName, distance :f64) {
        self.branch_decisions.insert((self.piece, self.anchor), (exit, distance));
        self.branch_decisions.insert((self.piece, exit), (self.anchor, distance));
    }

    /// Leaving the current piece by `exit`: the decisions for it are used up,
    /// the way back goes on the trail.
    fn leave(&mut self, exit :AnchorName, distance :f64) {
        self.branch_decisions.remove(&(self.piece, self.anchor));
        self.branch_decisions.remove(&(self.piece, exit));
        self.trail.insert((self.piece, exit), (self.anchor, distance));
    }

    /// Moves as far as possible, stopping at a dead end if one is reached.
    pub fn advanced_clamped(&self, layout :&Layout, distance :f64) -> (TrackPoint, Option<EndOfTheLine>) {
        if distance < 0.0 {
            let (tp, end) = self.reversed(layout).advanced_clamped(layout, -distance);
            return (tp.reversed(layout), end);
        }
        let mut tp = self.clone();
        tp.offset += distance;
        loop {
            let (exit, length) = match tp.current_traversal(layout) {
                Some(t) => t,
                None => {
                    error!("No way through {:?} from {}", tp.piece, tp.anchor);
                    let end = EndOfTheLine {
                        piece: tp.piece, final_anchor: tp.anchor, remaining_distance: distance,
                    };
                    return (self.clone(), Some(end));
                },
            };
            if tp.offset <= length {
                tp.pin(exit, length);
                return (tp, None);
            }
            match layout.next(tp.piece, exit) {
                Some((piece, anchor)) => {
                    tp.leave(exit, length);
                    tp.offset -= length;
                    tp.piece = piece;
                    tp.anchor = anchor;
                },
                None => {
                    let end = EndOfTheLine {
                        piece: tp.piece, final_anchor: exit,
                        remaining_distance: tp.offset - length,
                    };
                    tp.pin(exit, length);
                    tp.offset = length;
                    return (tp, Some(end));
                },
            }
        }
    }

    pub fn advanced(&self, layout :&Layout, distance :f64) -> Result<TrackPoint, EndOfTheLine> {
        match self.advanced_clamped(layout, distance) {
            (tp, None) => Ok(tp),
            (_, Some(end)) => Err(end),
        }
    }

    pub fn advance(&mut self, layout :&Layout, distance :f64) -> Result<(), EndOfTheLine> {
        *self = self.advanced(layout, distance)?;
        Ok(())
    }

    pub fn retreated(&self, layout :&Layout, distance :f64) -> Result<TrackPoint, EndOfTheLine> {
        self.advanced(layout, -distance)
    }

    pub fn retreat(&mut self, layout :&Layout, distance :f64) -> Result<(), EndOfTheLine> {
        *self = self.retreated(layout, distance)?;
        Ok(())
    }

    /// Same place, facing the other way.
    pub fn reversed(&self, layout :&Layout) -> TrackPoint {
        let mut tp = self.clone();
        match self.current_traversal(layout) {
            Some((exit, length)) => {
                std::mem::swap(&mut tp.branch_decisions, &mut tp.trail);
                tp.anchor = exit;
                tp.offset = length - self.offset;
                tp.pin(self.anchor, length);
            },
            None => warn!("Cannot reverse at {:?}.{}", self.piece, self.anchor),
        }
        tp
    }

    /// Entry of the next piece along, and the distance to it.
    pub fn next_piece(&self, layout :&Layout) -> Result<(TrackPoint, f64), EndOfTheLine> {
        let (exit, length) = self.current_traversal(layout).ok_or(EndOfTheLine {
            piece: self.piece, final_anchor: self.anchor, remaining_distance: 0.0,
        })?;
        let distance = length - self.offset;
        match layout.next(self.piece, exit) {
            Some((piece, anchor)) => {
                let mut tp = self.clone();
                tp.leave(exit, length);
                tp.piece = piece;
                tp.anchor = anchor;
                tp.offset = 0.0;
                Ok((tp, distance))
            },
            None => Err(EndOfTheLine { piece: self.piece, final_anchor: exit, remaining_distance: distance }),
        }
    }

    /// Distance walking forward to `other`, if it is closer than `maximum`.
    pub fn distance_to(&self, layout :&Layout, other :&TrackPoint, maximum :f64) -> Option<f64> {
        let mut tp = self.clone();
        let mut distance = 0.0;
        while !(tp.piece == other.piece && tp.anchor == other.anchor) {
            if distance >= maximum { return None; }
            let (next, d) = tp.next_piece(layout).ok()?;
            tp = next;
            distance += d;
        }
        distance += other.offset - tp.offset;
        if distance < maximum { Some(distance) } else { None }
    }

    /// Absolute pose, heading in the direction of travel.
    pub fn position(&self, layout :&Layout) -> Option<Position> {
        let piece = layout.piece(self.piece)?;
        let (exit, _) = self.current_traversal(layout)?;
        let local = piece.kind.point_position(self.anchor, exit, self.offset)?;
        Some(piece.position? + local)
    }

    /// Seeds branch memory so that advancing follows a planned route.
    pub fn follow_route(&mut self, layout :&Layout, choices :&RouteChoices) {
        for (piece, exits) in choices {
            let exit = match exits.iter().next() {
                Some(exit) if exits.len() == 1 => *exit,
                _ => {
                    debug!("Route leaves {:?} by {} ways, not pinning it", piece, exits.len());
                    continue;
                },
            };
            let p = match layout.piece(*piece) { Some(p) => p, None => continue };
            for entry in p.kind.anchor_names() {
                let traversals = p.kind.traversals(*entry);
                if traversals.len() < 2 { continue; }
                if let Some(t) = traversals.iter().find(|t| t.to == exit) {
                    self.branch_decisions.insert((*piece, *entry), (exit, t.distance));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pieces::{PieceKind, PointsState};
    use crate::position::Position;
    use crate::testing::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn advance_within_piece() {
        let mut layout = Layout::new();
        let s = layout.add_piece(PieceKind::from_name("straight").unwrap(), None);
        let tp = TrackPoint::new(s, AnchorName::In, 3.0);
        let moved = tp.advanced(&layout, 5.0).unwrap();
        assert_eq!(moved.piece, s);
        assert_eq!(moved.anchor, AnchorName::In);
        assert_abs_diff_eq!(moved.offset, 8.0);
    }

    #[test]
    fn advance_off_the_end() {
        let mut layout = Layout::new();
        let s = layout.add_piece(PieceKind::from_name("straight").unwrap(), None);
        let tp = TrackPoint::new(s, AnchorName::In, 3.0);
        let end = tp.advanced(&layout, 20.0).unwrap_err();
        assert_eq!(end.piece, s);
        assert_eq!(end.final_anchor, AnchorName::Out);
        assert_abs_diff_eq!(end.remaining_distance, 7.0);

        let mut unchanged = tp.clone();
        assert!(unchanged.advance(&layout, 20.0).is_err());
        assert_eq!(unchanged, tp);

        let (clamped, end) = tp.advanced_clamped(&layout, 20.0);
        assert!(end.is_some());
        assert_abs_diff_eq!(clamped.offset, 16.0);
    }

    #[test]
    fn advance_across_pieces_and_back() {
        let mut layout = Layout::new();
        let pieces = straight_line(&mut layout, 3);
        let tp = TrackPoint::new(pieces[0], AnchorName::In, 4.0);
        let moved = tp.advanced(&layout, 30.0).unwrap();
        assert_eq!(moved.piece, pieces[2]);
        assert_abs_diff_eq!(moved.offset, 2.0);
        let back = moved.retreated(&layout, 30.0).unwrap();
        assert_eq!(back.piece, pieces[0]);
        assert_eq!(back.anchor, AnchorName::In);
        assert_abs_diff_eq!(back.offset, 4.0, epsilon = 1e-9);
        // negative distances go the other way
        let back = moved.advanced(&layout, -30.0).unwrap();
        assert_eq!(back.piece, pieces[0]);
    }

    #[test]
    fn retreat_within_piece() {
        let mut layout = Layout::new();
        let s = layout.add_piece(PieceKind::from_name("straight").unwrap(), None);
        let mut tp = TrackPoint::new(s, AnchorName::In, 3.0);
        tp.retreat(&layout, 2.0).unwrap();
        assert_eq!(tp.anchor, AnchorName::In);
        assert_abs_diff_eq!(tp.offset, 1.0);
        assert!(tp.retreated(&layout, 2.0).is_err());
    }

    #[test]
    fn reversed_measures_from_other_end() {
        let mut layout = Layout::new();
        let s = layout.add_piece(PieceKind::from_name("straight").unwrap(), None);
        let tp = TrackPoint::new(s, AnchorName::In, 3.0);
        let r = tp.reversed(&layout);
        assert_eq!(r.anchor, AnchorName::Out);
        assert_abs_diff_eq!(r.offset, 13.0);
        let rr = r.reversed(&layout);
        assert_eq!(rr.anchor, AnchorName::In);
        assert_abs_diff_eq!(rr.offset, 3.0);
    }

    #[test]
    fn branch_memory_beats_live_state() {
        let mut layout = Layout::new();
        let j = junction(&mut layout);
        layout.set_points_state(j.points, PointsState::Branch).unwrap();
        let tp = TrackPoint::new(j.approach, AnchorName::In, 8.0);
        let on_branch = tp.advanced(&layout, 20.0).unwrap();
        assert_eq!(on_branch.piece, j.points);
        // throw the points under the train, then back out and in again
        layout.set_points_state(j.points, PointsState::Out).unwrap();
        let backed = on_branch.retreated(&layout, 10.0).unwrap();
        let again = backed.advanced(&layout, 40.0).unwrap();
        assert_eq!(again.piece, j.branch);
        // a fresh point follows the live state
        let fresh = TrackPoint::new(j.points, AnchorName::In, 0.0);
        assert_eq!(fresh.advanced(&layout, 40.0).unwrap().piece, j.main);
    }

    #[test]
    fn reversing_on_trailing_leg_keeps_leg() {
        let mut layout = Layout::new();
        let j = junction(&mut layout);
        let tp = TrackPoint::new(j.branch, AnchorName::In, 4.0).reversed(&layout);
        // entering the points from the branch side, then reversing on them
        let on_points = tp.advanced(&layout, 20.0).unwrap();
        assert_eq!(on_points.anchor, AnchorName::Branch);
        let turned = on_points.reversed(&layout);
        assert_eq!(turned.anchor, AnchorName::In);
        let out = turned.advanced(&layout, 20.0).unwrap();
        assert_eq!(out.piece, j.branch);
    }

    #[test]
    fn trail_only_applies_after_reversing() {
        let mut layout = Layout::new();
        let j = junction(&mut layout);
        let leg = crate::pieces::branch_geometry(crate::pieces::Side::Left).length;
        let tp = TrackPoint::new(j.branch, AnchorName::In, 4.0).reversed(&layout);
        let passed = tp.advanced(&layout, 4.0 + leg + 4.0).unwrap();
        assert_eq!(passed.piece, j.approach);
        assert!(passed.trail.contains_key(&(j.points, AnchorName::In)));

        let back = passed.reversed(&layout).advanced(&layout, 20.0).unwrap();
        assert_eq!(back.piece, j.points);
        assert_eq!(back.anchor, AnchorName::In);
        assert_eq!(back.current_traversal(&layout).unwrap().0, AnchorName::Branch);

        // coming round again the same way, the points decide
        let mut lap = passed.clone();
        lap.anchor = AnchorName::In;
        lap.offset = 0.0;
        assert_eq!(lap.advanced(&layout, 16.0 + 32.0 + 4.0).unwrap().piece, j.main);
    }

    #[test]
    fn route_pins_only_single_exits() {
        let mut layout = Layout::new();
        let j = junction(&mut layout);
        let start = TrackPoint::new(j.approach, AnchorName::In, 8.0);

        let mut either = start.clone();
        let choices :RouteChoices = vec![(j.points, vec![AnchorName::Out, AnchorName::Branch].into_iter().collect())]
            .into_iter().collect();
        either.follow_route(&layout, &choices);
        assert!(either.branch_decisions.is_empty());
        assert_eq!(either.advanced(&layout, 8.0 + 32.0 + 4.0).unwrap().piece, j.main);

        let mut routed = start;
        let choices :RouteChoices = vec![(j.points, vec![AnchorName::Branch].into_iter().collect())]
            .into_iter().collect();
        routed.follow_route(&layout, &choices);
        assert_eq!(routed.branch_decisions.len(), 1);
        assert_eq!(routed.branch_decisions[&(j.points, AnchorName::In)].0, AnchorName::Branch);
        let leg = crate::pieces::branch_geometry(crate::pieces::Side::Left).length;
        assert_eq!(routed.advanced(&layout, 8.0 + leg + 4.0).unwrap().piece, j.branch);
    }

    #[test]
    fn next_piece_and_distance_to() {
        let mut layout = Layout::new();
        let pieces = straight_line(&mut layout, 4);
        let tp = TrackPoint::new(pieces[0], AnchorName::In, 6.0);
        let (next, d) = tp.next_piece(&layout).unwrap();
        assert_eq!(next.piece, pieces[1]);
        assert_abs_diff_eq!(d, 10.0);
        let target = TrackPoint::new(pieces[3], AnchorName::In, 5.0);
        assert_abs_diff_eq!(tp.distance_to(&layout, &target, 1000.0).unwrap(), 10.0 + 32.0 + 5.0);
        assert_eq!(tp.distance_to(&layout, &target, 20.0), None);
        assert_eq!(target.distance_to(&layout, &tp, 1000.0), None);
        let behind = TrackPoint::new(pieces[0], AnchorName::In, 2.0);
        assert_abs_diff_eq!(tp.distance_to(&layout, &behind, 1000.0).unwrap(), -4.0);
        let end = TrackPoint::new(pieces[3], AnchorName::In, 1.0).next_piece(&layout).unwrap_err();
        assert_abs_diff_eq!(end.remaining_distance, 15.0);
    }

    #[test]
    fn absolute_position() {
        let mut layout = Layout::new();
        let pieces = straight_line(&mut layout, 2);
        let tp = TrackPoint::new(pieces[1], AnchorName::In, 4.0);
        assert_abs_diff_eq!(tp.position(&layout).unwrap(), Position::new(20.0, 0.0, 0.0), epsilon = 1e-9);
        let r = tp.reversed(&layout);
        assert_abs_diff_eq!(r.position(&layout).unwrap(),
                            Position::new(20.0, 0.0, std::f64::consts::PI), epsilon = 1e-9);
    }
}
