//! The tick driver. Each tick moves every placed train by the distance its
//! current speed covers, then runs train protection over all of them.

use crate::interlocking::TrainProtection;
use crate::topology::Layout;
use crate::train::TrainId;
use log::*;

/// Source of the actual track speed of a train, in distance units per
/// second. Hardware-backed implementations would read a controller.
pub trait SpeedProvider {
    fn speed(&mut self, layout :&Layout, train :TrainId) -> f64;
}

/// Speed proportional to the commanded motor speed.
#[derive(Debug, Clone, Copy)]
pub struct LinearSpeed {
    pub top_speed :f64,
}

impl SpeedProvider for LinearSpeed {
    fn speed(&mut self, layout :&Layout, train :TrainId) -> f64 {
        layout.train(train).map(|t| t.motor_speed * self.top_speed).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    pub protection :TrainProtection,
    /// Seconds simulated so far.
    pub time :f64,
}

impl Dispatcher {
    pub fn new(protection :TrainProtection) -> Self {
        Dispatcher { protection, time: 0.0 }
    }

    pub fn tick(&mut self, layout :&mut Layout, speeds :&mut impl SpeedProvider, elapsed :f64) {
        self.time += elapsed;
        for id in layout.train_ids() {
            if layout.train(id).map(|t| t.position.is_none()).unwrap_or(true) { continue; }
            let speed = speeds.speed(layout, id);
            if let Err(e) = layout.set_train_speed(id, speed) {
                error!("Could not set speed of train {:?}: {}", id, e);
                continue;
            }
            if speed == 0.0 { continue; }

            match layout.move_train(id, speed * elapsed) {
                Ok(None) => {},
                Ok(Some(end)) => {
                    info!("Cutting power to train {:?} at {:?}.{}", id, end.piece, end.final_anchor);
                    if let Err(e) = layout.set_maximum_motor_speed(id, 0.0) {
                        error!("Could not stop train {:?}: {}", id, e);
                    }
                },
                Err(e) => error!("Could not move train {:?}: {}", id, e),
            }
        }
        self.protection.tick(layout);
    }
}
