//! Small layouts shared by the unit tests.

use crate::pieces::{AnchorName, PieceKind};
use crate::position::Position;
use crate::topology::{Layout, PieceId};

pub fn kind(name :&str) -> PieceKind {
    PieceKind::from_name(name).unwrap()
}

pub fn join(layout :&mut Layout, a :PieceId, a_name :AnchorName, b :PieceId, b_name :AnchorName) {
    let a = layout.piece_anchor(a, a_name).unwrap();
    let b = layout.piece_anchor(b, b_name).unwrap();
    layout.connect(b, a).unwrap();
}

/// `n` straights in a row along the x axis, the first one placed at the origin.
pub fn straight_line(layout :&mut Layout, n :usize) -> Vec<PieceId> {
    let mut pieces = vec![layout.add_piece(kind("straight"), Some(Position::origin()))];
    for _ in 1..n {
        let prev = *pieces.last().unwrap();
        let next = layout.add_piece(kind("straight"), None);
        join(layout, prev, AnchorName::Out, next, AnchorName::In);
        pieces.push(next);
    }
    pieces
}

pub struct Junction {
    pub approach :PieceId,
    pub points :PieceId,
    pub main :PieceId,
    pub branch :PieceId,
}

/// approach -> left points -> {main, branch}, one straight on each leg.
pub fn junction(layout :&mut Layout) -> Junction {
    let approach = layout.add_piece(kind("straight"), Some(Position::origin()));
    let points = layout.add_piece(kind("left-points"), None);
    let main = layout.add_piece(kind("straight"), None);
    let branch = layout.add_piece(kind("straight"), None);
    join(layout, approach, AnchorName::Out, points, AnchorName::In);
    join(layout, points, AnchorName::Out, main, AnchorName::In);
    join(layout, points, AnchorName::Branch, branch, AnchorName::In);
    Junction { approach, points, main, branch }
}
