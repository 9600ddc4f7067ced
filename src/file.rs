//! Layout files. A layout is stored as a `LayoutSnapshot` in RON: one record
//! per piece, with joints expressed as anchor keys shared by both ends.

use crate::pieces::{AnchorName, PieceKind};
use crate::position::Position;
use crate::sensors::Sensor;
use crate::topology::{AnchorId, Layout, PieceId, TopologyError};
use crate::trackpoint::TrackPoint;
use log::*;
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use thiserror::Error;

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct PieceRecord {
    pub index :usize,
    pub kind :PieceKind,
    #[serde(default)]
    pub placement :Option<Position>,
    /// Connected anchors only. Two records sharing a key are joined there.
    #[serde(default)]
    pub anchors :BTreeMap<AnchorName, usize>,
}

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub name :String,
    pub piece :usize,
    pub anchor :AnchorName,
    pub offset :f64,
    #[serde(default)]
    pub single_direction :bool,
}

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutSnapshot {
    pub pieces :Vec<PieceRecord>,
    #[serde(default)]
    pub sensors :Vec<SensorRecord>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("piece index {0} used twice")]
    DuplicatePiece(usize),
    #[error("no piece with index {0}")]
    UnknownPiece(usize),
    #[error("piece {0} has no anchor `{1}`")]
    NoSuchAnchor(usize, AnchorName),
    #[error("anchor key {0} joins {1} anchors")]
    OverusedAnchorKey(usize, usize),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

impl Layout {
    pub fn snapshot(&self) -> LayoutSnapshot {
        let index :HashMap<PieceId, usize> = self.iter_pieces().enumerate()
            .map(|(i, (id, _))| (id, i)).collect();
        let mut keys :HashMap<AnchorId, usize> = HashMap::new();
        let mut pieces = Vec::new();
        for (i, (_, piece)) in self.iter_pieces().enumerate() {
            let mut anchors = BTreeMap::new();
            for (name, anchor) in piece.anchors.iter() {
                if self.anchors[anchor.0].is_dangling() { continue; }
                let next = keys.len();
                anchors.insert(*name, *keys.entry(*anchor).or_insert(next));
            }
            pieces.push(PieceRecord { index: i, kind: piece.kind, placement: piece.placement, anchors });
        }

        let sensors = self.iter_sensors().filter_map(|(_, s)| Some(SensorRecord {
            name: s.name.clone(),
            piece: *index.get(&s.track_point.piece)?,
            anchor: s.track_point.anchor,
            offset: s.track_point.offset,
            single_direction: s.single_direction,
        })).collect();

        LayoutSnapshot { pieces, sensors }
    }

    pub fn from_snapshot(snapshot :&LayoutSnapshot) -> Result<Layout, SnapshotError> {
        let mut layout = Layout::new();
        let mut ids = HashMap::new();
        for record in &snapshot.pieces {
            let id = layout.add_piece(record.kind, record.placement);
            if ids.insert(record.index, id).is_some() {
                return Err(SnapshotError::DuplicatePiece(record.index));
            }
        }

        let mut joints :BTreeMap<usize, Vec<(PieceId, AnchorName)>> = BTreeMap::new();
        for record in &snapshot.pieces {
            for (name, key) in record.anchors.iter() {
                if !record.kind.has_anchor(*name) {
                    return Err(SnapshotError::NoSuchAnchor(record.index, *name));
                }
                joints.entry(*key).or_insert_with(Vec::new).push((ids[&record.index], *name));
            }
        }
        for (key, ends) in joints {
            match ends.as_slice() {
                [(a, a_name), (b, b_name)] => {
                    let a = layout.piece_anchor(*a, *a_name)?;
                    let b = layout.piece_anchor(*b, *b_name)?;
                    layout.connect(a, b)?;
                },
                [_] => warn!("Anchor key {} has only one end", key),
                _ => return Err(SnapshotError::OverusedAnchorKey(key, ends.len())),
            }
        }

        for record in &snapshot.sensors {
            let piece = *ids.get(&record.piece).ok_or(SnapshotError::UnknownPiece(record.piece))?;
            let mut sensor = Sensor::new(&record.name, TrackPoint::new(piece, record.anchor, record.offset));
            sensor.single_direction = record.single_direction;
            layout.add_sensor(sensor);
        }

        info!("Loaded layout with {} pieces", layout.num_pieces());
        Ok(layout)
    }
}

pub fn load(filename :&str) -> Result<Layout, io::Error> {
    info!("Loading file from {:?}", filename);
    let snapshot :LayoutSnapshot = ron::de::from_reader(File::open(filename)?)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Layout::from_snapshot(&snapshot)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn save(filename :&str, layout :&Layout) -> Result<(), io::Error> {
    info!("Will save file to file name {:?}", filename);
    let text = ron::ser::to_string_pretty(&layout.snapshot(), Default::default())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    std::fs::write(filename, text)
}
