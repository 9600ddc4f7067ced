//! Automatic train protection.
//!
//! Each tick every train reserves the track ahead of it up to the next
//! decision point, and gets a braking-curve speed limit for anything in its
//! way: the end of the line, a piece claimed by another train, or an
//! oncoming train that has nowhere to go.

use crate::events::Event;
use crate::pieces::AnchorName;
use crate::topology::{Layout, PieceId};
use crate::trackpoint::TrackPoint;
use crate::train::{Authority, TrainError, TrainId};
use log::*;
use serde::{Serialize, Deserialize};
use std::collections::HashSet;
use thiserror::Error;

/// A train's interest in a piece ahead of it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct Reservation {
    /// Distance from the train's front when the piece was reserved.
    pub distance :f64,
    /// Anchor the train will enter the piece through.
    pub anchor :AnchorName,
    pub can_hide_behind_decision_point :bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// How far before an obstacle trains come to a stand.
    pub stop_margin :f64,
    /// Length of the braking curve from full speed.
    pub brake_distance :f64,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        ProtectionConfig { stop_margin: 16.0, brake_distance: 64.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtectionError {
    #[error("piece {0:?} has no way through from `{1}`")]
    NoTraversals(PieceId, AnchorName),
    #[error("piece {0:?} disappeared during the walk")]
    UnknownPiece(PieceId),
    #[error(transparent)]
    Train(#[from] TrainError),
}

#[derive(Debug, Clone, Default)]
pub struct TrainProtection {
    pub config :ProtectionConfig,
}

impl TrainProtection {
    pub fn new(config :ProtectionConfig) -> Self {
        TrainProtection { config }
    }

    /// Fraction of full speed that still allows stopping `distance` ahead.
    pub fn braking_limit(&self, distance :f64) -> f64 {
        ((distance - self.config.stop_margin) / self.config.brake_distance).max(0.0).sqrt()
    }

    fn in_reach(&self, distance :f64) -> bool {
        distance - self.config.stop_margin < self.config.brake_distance
    }

    pub fn tick(&self, layout :&mut Layout) {
        for id in layout.train_ids() {
            if let Err(e) = self.protect_train(layout, id) {
                error!("Skipping protection for train {:?} this tick: {}", id, e);
            }
        }
    }

    pub fn protect_train(&self, layout :&mut Layout, id :TrainId) -> Result<(), ProtectionError> {
        let train = layout.train(id).ok_or(TrainError::UnknownTrain(id))?;
        let front = match &train.position {
            Some(p) => p.clone(),
            None => return Ok(()),
        };
        let rear = train.rear_position.clone();
        let moving = train.speed != 0.0;

        if !moving {
            self.release_ahead(layout, id, &front)?;
        }

        let (limit, can_hide) = self.reserve_ahead(layout, id, &front, moving)?;
        let limit = if limit >= 1.0 { None } else { Some(limit) };
        layout.set_speed_limit(id, Authority::Protection, limit)?;
        trace!("Train {:?} protection limit {:?}", id, limit);

        let train = layout.train_mut(id)?;
        let motor_speed = format!("{:.2}", train.motor_speed);
        train.meta.insert("can_hide_behind_decision_point".to_string(), can_hide.to_string());
        train.meta.insert("motor_speed".to_string(), motor_speed);

        if let Some(rear) = rear {
            self.release_behind(layout, id, &rear)?;
        }
        Ok(())
    }

    /// A stopped train gives back the claims it made while moving.
    fn release_ahead(&self, layout :&mut Layout, id :TrainId, front :&TrackPoint) -> Result<(), ProtectionError> {
        let mut position = front.clone();
        while let Ok((next, _)) = position.next_piece(layout) {
            position = next;
            let piece = layout.piece_mut(position.piece).ok_or(ProtectionError::UnknownPiece(position.piece))?;
            if piece.claimed_by != Some(id) { break; }
            piece.claimed_by = None;
            debug!("Train {:?} released {:?} ahead", id, position.piece);
            layout.events.emit(Event::ReservationChanged(position.piece));
        }
        Ok(())
    }

    /// Frees pieces the rear of the train has cleared.
    fn release_behind(&self, layout :&mut Layout, id :TrainId, rear :&TrackPoint) -> Result<(), ProtectionError> {
        let mut position = rear.reversed(layout);
        while let Ok((next, _)) = position.next_piece(layout) {
            position = next;
            let piece = layout.piece_mut(position.piece).ok_or(ProtectionError::UnknownPiece(position.piece))?;
            if piece.claimed_by != Some(id) { break; }
            piece.claimed_by = None;
            piece.reservations.remove(&id);
            debug!("Train {:?} released {:?} behind", id, position.piece);
            layout.events.emit(Event::ReservationChanged(position.piece));
        }
        Ok(())
    }

    /// Walks ahead of the train claiming and reserving pieces, and returns
    /// the lowest braking limit found on the way, and whether the train
    /// passed a place where it could let an oncoming train by.
    fn reserve_ahead(&self, layout :&mut Layout, id :TrainId, front :&TrackPoint, moving :bool) -> Result<(f64, bool), ProtectionError> {
        let mut position = front.clone();
        let mut distance = 0.0;
        let mut limit = f64::INFINITY;
        let mut can_hide = false;
        let mut seen = HashSet::new();

        while seen.insert(position.piece) {
            match position.next_piece(layout) {
                Ok((next, d)) => {
                    position = next;
                    distance += d;
                },
                Err(end) => {
                    limit = limit.min(self.braking_limit(distance + end.remaining_distance));
                    break;
                },
            }

            let piece_id = position.piece;
            let piece = layout.piece(piece_id).ok_or(ProtectionError::UnknownPiece(piece_id))?;
            let mut claim = false;
            match piece.claimed_by {
                Some(owner) if owner == id => {},
                Some(_) => limit = limit.min(self.braking_limit(distance)),
                None => claim = moving && self.in_reach(distance),
            }

            let traversals = piece.kind.traversals(position.anchor);
            let first = traversals.first().ok_or(ProtectionError::NoTraversals(piece_id, position.anchor))?;
            if piece.kind.traversals(first.to).len() > 1 {
                can_hide = true;
            }
            let decision_point = traversals.len() > 1;
            let reserve = piece.reservations.get(&id).map(|r| r.distance > distance).unwrap_or(true);
            let oncoming_trapped = piece.reservations.iter().any(|(other, r)| {
                *other != id && r.anchor != position.anchor && !r.can_hide_behind_decision_point
            });

            if claim || reserve {
                let piece = layout.piece_mut(piece_id).ok_or(ProtectionError::UnknownPiece(piece_id))?;
                if claim {
                    trace!("Train {:?} claims {:?} at {:.1}", id, piece_id, distance);
                    piece.claimed_by = Some(id);
                }
                if reserve {
                    piece.reservations.insert(id, Reservation {
                        distance,
                        anchor: position.anchor,
                        can_hide_behind_decision_point: can_hide,
                    });
                }
                layout.events.emit(Event::ReservationChanged(piece_id));
            }

            // token block: reserve no further than the next point of choice
            if decision_point { break; }

            if can_hide && oncoming_trapped {
                limit = limit.min(self.braking_limit(distance));
            }
        }
        Ok((limit, can_hide))
    }
}
