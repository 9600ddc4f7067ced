//! Trackside sensors that spot the magnets under passing cars and pull the
//! tracked train position back in line with reality.

use crate::events::Event;
use crate::topology::Layout;
use crate::trackpoint::{EndOfTheLine, TrackPoint};
use crate::train::{TrainId, CAR_GAP};
use generational_arena::Index;
use log::*;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// How far a tracked magnet may have drifted from a sensor and still be
/// matched to it.
pub const SPOTTING_RANGE :f64 = 1000.0;

/// Seconds during which a sensor ignores the magnet it saw last.
pub const DEBOUNCE_TIME :f64 = 2.0;

#[derive(Serialize, Deserialize)]
#[derive(Copy,Clone,PartialEq, Eq, Hash, Debug,PartialOrd,Ord)]
pub struct SensorId(pub(crate) Index);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("sensor {0:?} not found")]
    UnknownSensor(SensorId),
    #[error("cannot put spotted train back on the track: {0}")]
    EndOfTheLine(#[from] EndOfTheLine),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub train :TrainId,
    pub car :usize,
    pub when :f64,
}

#[derive(Debug, Clone)]
pub struct Sensor {
    pub name :String,
    pub track_point :TrackPoint,
    /// Only trains passing in the direction of `track_point` are spotted.
    pub single_direction :bool,
    pub activated :bool,
    pub last_seen :Option<Sighting>,
}

impl Sensor {
    pub fn new(name :&str, track_point :TrackPoint) -> Self {
        Sensor {
            name: name.to_string(),
            track_point,
            single_direction: false,
            activated: false,
            last_seen: None,
        }
    }
}

struct Match {
    train :TrainId,
    car :usize,
    magnet_offset :f64,
    view :TrackPoint,
}

impl Layout {
    pub fn sensor(&self, id :SensorId) -> Option<&Sensor> { self.sensors.get(id.0) }

    pub fn iter_sensors(&self) -> impl Iterator<Item = (SensorId, &Sensor)> {
        self.sensors.iter().map(|(k,v)| (SensorId(k), v))
    }

    pub fn add_sensor(&mut self, sensor :Sensor) -> SensorId {
        let id = SensorId(self.sensors.insert(sensor));
        debug!("Added sensor {:?}", id);
        id
    }

    pub fn remove_sensor(&mut self, id :SensorId) -> Result<Sensor, SensorError> {
        self.sensors.remove(id.0).ok_or(SensorError::UnknownSensor(id))
    }

    /// Feeds a sensor state change from the hardware. An activation that
    /// matches a moving train's magnet re-anchors that train at the sensor.
    pub fn set_sensor_activated(&mut self, id :SensorId, activated :bool, when :f64) -> Result<Option<TrainId>, SensorError> {
        let sensor = self.sensors.get_mut(id.0).ok_or(SensorError::UnknownSensor(id))?;
        if sensor.activated == activated { return Ok(None); }
        sensor.activated = activated;
        self.events.emit(Event::SensorActivity(id, activated));
        if !activated { return Ok(None); }

        let found = match self.match_magnet(id, when) {
            Some(m) => m,
            None => {
                debug!("Sensor {:?} activated with no train nearby", id);
                return Ok(None);
            },
        };

        let train = &self.trains[found.train.0];
        let length = train.length();
        let mut front = found.view.with_train(Some(found.train));
        if let Some(old) = &train.position {
            front.branch_decisions = old.branch_decisions.clone();
            front.trail = old.trail.clone();
        }
        let front = front.advanced(self, found.magnet_offset)?;
        let rear = front.retreated(self, length)?;

        info!("Sensor {:?} spotted car {} of train {:?}", id, found.car, found.train);
        let train = &mut self.trains[found.train.0];
        train.position = Some(front);
        train.rear_position = Some(rear);
        self.sensors[id.0].last_seen = Some(Sighting { train: found.train, car: found.car, when });
        self.events.emit(Event::TrainMoved(found.train));
        self.events.emit(Event::TrainSpotted(found.train, id));
        Ok(Some(found.train))
    }

    /// Nearest expected magnet position to the sensor, looking both ways.
    fn match_magnet(&self, id :SensorId, when :f64) -> Option<Match> {
        let sensor = self.sensor(id)?;
        let mut views = vec![sensor.track_point.clone()];
        if !sensor.single_direction {
            views.push(sensor.track_point.reversed(self));
        }

        let mut maximum = SPOTTING_RANGE;
        let mut best = None;
        for (train_id, train) in self.iter_trains() {
            if train.speed == 0.0 { continue; }
            let front = match &train.position { Some(p) => p, None => continue };
            let mut car_offset = 0.0;
            for (i, car) in train.cars.iter().enumerate() {
                let offset = car_offset;
                car_offset += car.length + CAR_GAP;
                let magnet_offset = match car.magnet_offset {
                    Some(m) => offset + m,
                    None => continue,
                };
                let recent = sensor.last_seen
                    .map(|s| s.train == train_id && s.car == i && when < s.when + DEBOUNCE_TIME)
                    .unwrap_or(false);
                if recent { continue; }

                let expected = match front.retreated(self, magnet_offset) {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                for view in &views {
                    let lagging = expected.distance_to(self, view, maximum);
                    let leading = view.distance_to(self, &expected, maximum);
                    for distance in lagging.into_iter().chain(leading) {
                        if distance < 0.0 || distance >= maximum { continue; }
                        maximum = distance;
                        best = Some(Match { train: train_id, car: i, magnet_offset, view: view.clone() });
                    }
                }
            }
        }
        best
    }
}
