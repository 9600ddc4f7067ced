use log::*;
use tracklayout::config::Config;
use tracklayout::dispatch::{Dispatcher, LinearSpeed};
use tracklayout::file;
use tracklayout::interlocking::TrainProtection;
use tracklayout::pieces::{AnchorName, PieceKind, Side};
use tracklayout::position::Position;
use tracklayout::routing::Router;
use tracklayout::topology::{Layout, PieceId, TopologyError};
use tracklayout::trackpoint::TrackPoint;
use tracklayout::train::{Car, Train};

/// Two straights, a half circle, two straights and another half circle.
fn oval() -> Result<(Layout, Vec<PieceId>), TopologyError> {
    let straight = PieceKind::Straight { length: 16.0 };
    let curve = PieceKind::Curve { radius: 40.0, per_circle: 16, direction: Side::Left };
    let mut layout = Layout::new();
    let mut pieces = vec![layout.add_piece(straight, Some(Position::origin()))];
    for i in 1..20 {
        let kind = if i % 10 < 2 { straight } else { curve };
        let piece = layout.add_piece(kind, None);
        let prev = layout.piece_anchor(pieces[i - 1], AnchorName::Out)?;
        let next = layout.piece_anchor(piece, AnchorName::In)?;
        layout.connect(next, prev)?;
        pieces.push(piece);
    }
    let last = layout.piece_anchor(pieces[19], AnchorName::Out)?;
    let first = layout.piece_anchor(pieces[0], AnchorName::In)?;
    layout.connect(last, first)?;
    Ok((layout, pieces))
}

fn main() {
    env_logger::init();
    info!("Starting {} v{}.", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::load();

    let loaded = match std::env::args().nth(1) {
        Some(filename) => file::load(&filename).map(|layout| {
            let pieces = layout.iter_pieces().map(|(id, _)| id).collect::<Vec<_>>();
            (layout, pieces)
        }).map_err(|e| e.to_string()),
        None => oval().map_err(|e| e.to_string()),
    };
    let (mut layout, pieces) = match loaded {
        Ok(x) => x,
        Err(e) => {
            error!("Could not set up layout: {}", e);
            std::process::exit(1);
        }
    };
    if pieces.is_empty() {
        warn!("Layout is empty, nothing to run.");
        return;
    }
    let misaligned = layout.misaligned_anchors(1e-3);
    if !misaligned.is_empty() {
        warn!("{} joints do not line up", misaligned.len());
    }
    let events = layout.events.subscribe();

    let starts = [pieces[0], pieces[pieces.len() / 2]];
    for (i, piece) in starts.iter().enumerate() {
        let cars = vec![
            Car { length: 12.0, magnet_offset: Some(2.0) },
            Car { length: 10.0, magnet_offset: None },
        ];
        let train = layout.add_train(Train::new(&format!("train {}", i + 1), cars));
        let front = TrackPoint::new(*piece, AnchorName::In, 0.0);
        if let Err(e) = layout.place_train(train, front) {
            warn!("Could not place {:?}: {}", train, e);
            continue;
        }
        if let Err(e) = layout.set_maximum_motor_speed(train, 1.0 - 0.25 * i as f64) {
            error!("{}", e);
        }
    }

    let fronts = layout.iter_trains().filter_map(|(_, t)| t.position.clone()).collect::<Vec<_>>();
    if let [a, b] = fronts.as_slice() {
        match Router::new(&layout).plan(a, b) {
            Some(plan) => info!("Shortest route between the trains is {:.1} long", plan.distance),
            None => info!("The trains cannot reach each other"),
        }
    }

    let mut dispatcher = Dispatcher::new(TrainProtection::new(config.protection));
    let mut speeds = LinearSpeed { top_speed: config.simulation.top_speed };
    for tick in 0..config.simulation.ticks {
        dispatcher.tick(&mut layout, &mut speeds, config.simulation.tick_interval);
        if tick % 50 == 0 {
            for (id, train) in layout.iter_trains() {
                if let Some(p) = &train.position {
                    debug!("t={:.1} {:?} {} on {:?} at {:.1}, motor {:.2}",
                           dispatcher.time, id, train.name, p.piece, p.offset, train.motor_speed);
                }
            }
        }
    }

    info!("Simulated {:.1}s, {} events.", dispatcher.time, events.try_iter().count());
    for (id, train) in layout.iter_trains() {
        let position = train.position.as_ref().and_then(|p| p.position(&layout));
        info!("{:?} {} ended at {:?}", id, train.name, position);
    }
}
