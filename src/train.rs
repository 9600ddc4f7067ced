//! Trains, their cars and the speed-limit slots that cap their motors.

use crate::events::Event;
use crate::topology::{Layout, PieceId};
use crate::trackpoint::{EndOfTheLine, TrackPoint};
use generational_arena::Index;
use log::*;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Gap between coupled cars.
pub const CAR_GAP :f64 = 2.0;

#[derive(Serialize, Deserialize)]
#[derive(Copy,Clone,PartialEq, Eq, Hash, Debug,PartialOrd,Ord)]
pub struct TrainId(pub(crate) Index);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    #[error("train {0:?} not found")]
    UnknownTrain(TrainId),
    #[error("train {0:?} is not on the track")]
    NotOnTrack(TrainId),
    #[error(transparent)]
    EndOfTheLine(#[from] EndOfTheLine),
}

#[derive(Debug, Clone)]
#[derive(Serialize, Deserialize)]
pub struct Car {
    pub length :f64,
    /// Distance from the front of the car to its magnet.
    pub magnet_offset :Option<f64>,
}

/// Who is limiting a train's speed.
#[derive(Serialize, Deserialize)]
#[derive(Copy,Clone,PartialEq, Eq, Hash, Debug,PartialOrd,Ord)]
pub enum Authority {
    Protection,
    Operator,
}

/// Speed caps in `(0, 1]`, one slot per authority.
#[derive(Debug, Clone, Default)]
pub struct SpeedLimits {
    slots :BTreeMap<Authority, f64>,
}

impl SpeedLimits {
    pub fn get(&self, authority :Authority) -> Option<f64> {
        self.slots.get(&authority).cloned()
    }

    /// Effective limit, `None` meaning unlimited.
    pub fn limit(&self) -> Option<f64> {
        self.slots.values().cloned().fold(None, |acc :Option<f64>, v| {
            Some(acc.map(|a| a.min(v)).unwrap_or(v))
        })
    }

    /// Sets or clears a slot. Values above 1 clear it. Returns whether the
    /// slot changed.
    pub fn set(&mut self, authority :Authority, value :Option<f64>) -> bool {
        match value.filter(|v| *v <= 1.0) {
            Some(v) => self.slots.insert(authority, v.max(0.0)) != Some(v.max(0.0)),
            None => self.slots.remove(&authority).is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Train {
    pub name :String,
    pub cars :Vec<Car>,
    pub position :Option<TrackPoint>,
    pub rear_position :Option<TrackPoint>,
    /// Track speed supplied from outside, in distance units per second.
    pub speed :f64,
    pub maximum_motor_speed :f64,
    pub motor_speed :f64,
    pub speed_limits :SpeedLimits,
    /// Free-form notes, written by train protection each tick.
    pub meta :BTreeMap<String, String>,
}

impl Train {
    pub fn new(name :&str, cars :Vec<Car>) -> Self {
        Train {
            name: name.to_string(),
            cars,
            position: None,
            rear_position: None,
            speed: 0.0,
            maximum_motor_speed: 0.0,
            motor_speed: 0.0,
            speed_limits: Default::default(),
            meta: BTreeMap::new(),
        }
    }

    pub fn length(&self) -> f64 {
        let cars :f64 = self.cars.iter().map(|c| c.length).sum();
        cars + CAR_GAP * (self.cars.len().max(1) - 1) as f64
    }

    fn target_motor_speed(&self) -> f64 {
        match self.speed_limits.limit() {
            Some(limit) => limit.min(self.maximum_motor_speed),
            None => self.maximum_motor_speed,
        }
    }
}

impl Layout {
    pub fn train(&self, id :TrainId) -> Option<&Train> { self.trains.get(id.0) }

    pub(crate) fn train_mut(&mut self, id :TrainId) -> Result<&mut Train, TrainError> {
        self.trains.get_mut(id.0).ok_or(TrainError::UnknownTrain(id))
    }

    pub fn iter_trains(&self) -> impl Iterator<Item = (TrainId, &Train)> {
        self.trains.iter().map(|(k,v)| (TrainId(k), v))
    }

    pub fn train_ids(&self) -> Vec<TrainId> {
        self.trains.iter().map(|(k,_)| TrainId(k)).collect()
    }

    pub fn add_train(&mut self, train :Train) -> TrainId {
        let name = train.name.clone();
        let id = TrainId(self.trains.insert(train));
        info!("Added train {:?} {:?}", id, name);
        self.events.emit(Event::TrainAdded(id));
        id
    }

    pub fn remove_train(&mut self, id :TrainId) -> Result<Train, TrainError> {
        let train = self.trains.remove(id.0).ok_or(TrainError::UnknownTrain(id))?;
        self.release_all(id);
        self.events.emit(Event::TrainRemoved(id));
        Ok(train)
    }

    /// Drops every claim and reservation held by `id`.
    pub(crate) fn release_all(&mut self, id :TrainId) {
        let mut changed = Vec::new();
        for (k, piece) in self.pieces.iter_mut() {
            let claimed = piece.claimed_by == Some(id);
            if claimed { piece.claimed_by = None; }
            if piece.reservations.remove(&id).is_some() || claimed {
                changed.push(k);
            }
        }
        for k in changed {
            self.events.emit(Event::ReservationChanged(PieceId(k)));
        }
    }

    /// Puts the front of the train at `front`; the rear follows one train
    /// length behind.
    pub fn place_train(&mut self, id :TrainId, front :TrackPoint) -> Result<(), TrainError> {
        let length = self.train(id).ok_or(TrainError::UnknownTrain(id))?.length();
        let front = front.with_train(Some(id));
        let rear = front.retreated(self, length)?;
        let train = self.train_mut(id)?;
        train.position = Some(front);
        train.rear_position = Some(rear);
        debug!("Placed train {:?}", id);
        self.events.emit(Event::TrainMoved(id));
        Ok(())
    }

    pub(crate) fn unplace_train(&mut self, id :TrainId) {
        if let Ok(train) = self.train_mut(id) {
            train.position = None;
            train.rear_position = None;
            self.release_all(id);
            self.events.emit(Event::TrainMoved(id));
        }
    }

    /// Moves a train along the track. Running into a dead end stops it there
    /// and returns the end that was hit.
    pub fn move_train(&mut self, id :TrainId, distance :f64) -> Result<Option<EndOfTheLine>, TrainError> {
        let train = self.train(id).ok_or(TrainError::UnknownTrain(id))?;
        let front = train.position.as_ref().ok_or(TrainError::NotOnTrack(id))?;
        let rear = train.rear_position.as_ref().ok_or(TrainError::NotOnTrack(id))?;
        let length = train.length();

        let (front, rear, end) = if distance >= 0.0 {
            let (front, end) = front.advanced_clamped(self, distance);
            let rear = front.retreated(self, length)?;
            (front, rear, end)
        } else {
            let (rear, end) = rear.advanced_clamped(self, distance);
            let front = rear.advanced(self, length)?;
            (front, rear, end)
        };
        if let Some(e) = &end {
            warn!("Train {:?} reached the end of the line at {:?}", id, e.piece);
        }
        let train = self.train_mut(id)?;
        train.position = Some(front);
        train.rear_position = Some(rear);
        self.events.emit(Event::TrainMoved(id));
        Ok(end)
    }

    pub fn set_train_speed(&mut self, id :TrainId, speed :f64) -> Result<(), TrainError> {
        self.train_mut(id)?.speed = speed;
        Ok(())
    }

    pub fn set_maximum_motor_speed(&mut self, id :TrainId, value :f64) -> Result<(), TrainError> {
        self.train_mut(id)?.maximum_motor_speed = value.max(0.0).min(1.0);
        self.update_motor_speed(id)
    }

    /// Sets one authority's limit slot, recomputing the motor speed if the
    /// effective limit changed.
    pub fn set_speed_limit(&mut self, id :TrainId, authority :Authority, value :Option<f64>) -> Result<(), TrainError> {
        let train = self.train_mut(id)?;
        let before = train.speed_limits.limit();
        if !train.speed_limits.set(authority, value) { return Ok(()); }
        let after = train.speed_limits.limit();
        if before != after {
            trace!("Speed limit of {:?} now {:?}", id, after);
            self.events.emit(Event::SpeedLimitChanged(id, after));
            self.update_motor_speed(id)?;
        }
        Ok(())
    }

    fn update_motor_speed(&mut self, id :TrainId) -> Result<(), TrainError> {
        let train = self.train_mut(id)?;
        let target = train.target_motor_speed();
        if train.motor_speed != target {
            train.motor_speed = target;
            self.events.emit(Event::MotorSpeedChanged(id, target));
        }
        Ok(())
    }
}
