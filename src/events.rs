use crate::pieces::PointsState;
use crate::sensors::SensorId;
use crate::topology::{AnchorId, PieceId};
use crate::train::TrainId;
use log::*;
use std::sync::mpsc;

/// Notifications pushed to observers (drawing, hardware control) after
/// each effective change to the layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    LayoutChanged,
    PieceAdded(PieceId),
    PieceRemoved(PieceId),
    PiecePositioned(PieceId),
    AnchorConnected(AnchorId),
    AnchorSplit(AnchorId, AnchorId),
    PointsChanged(PieceId, PointsState),
    TrainAdded(TrainId),
    TrainRemoved(TrainId),
    TrainMoved(TrainId),
    ReservationChanged(PieceId),
    SpeedLimitChanged(TrainId, Option<f64>),
    MotorSpeedChanged(TrainId, f64),
    SensorActivity(SensorId, bool),
    TrainSpotted(TrainId, SensorId),
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers :Vec<mpsc::Sender<Event>>,
}

impl EventBus {
    pub fn new() -> Self { Default::default() }

    pub fn subscribe(&mut self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event :Event) {
        trace!("Event {:?}", event);
        let before = self.subscribers.len();
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if self.subscribers.len() < before {
            debug!("Dropped {} closed event subscriber(s)", before - self.subscribers.len());
        }
    }

    pub fn num_subscribers(&self) -> usize { self.subscribers.len() }
}
