//! Shortest routes between track points.
//!
//! The search ignores the current state of points: every traversal is a
//! candidate. The result lists, for each piece where the route has a choice
//! to make, the exits that lie on some shortest path.

use crate::pieces::AnchorName;
use crate::topology::{Layout, PieceId};
use crate::trackpoint::TrackPoint;
use log::*;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, BTreeMap, BTreeSet, HashMap};

pub type RouteChoices = BTreeMap<PieceId, BTreeSet<AnchorName>>;

/// Paths within this distance of the shortest one count as equally short.
pub const ROUTE_EPSILON :f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub distance :f64,
    pub choices :RouteChoices,
}

#[derive(Debug, Clone)]
struct Candidate {
    /// `None` once the destination has been reached.
    state :Option<(PieceId, AnchorName)>,
    choices :Vec<(PieceId, AnchorName)>,
}

pub struct Router<'a> {
    layout :&'a Layout,
}

impl<'a> Router<'a> {
    pub fn new(layout :&'a Layout) -> Self { Router { layout } }

    pub fn plan(&self, origin :&TrackPoint, destination :&TrackPoint) -> Option<Plan> {
        if origin.piece == destination.piece && origin.anchor == destination.anchor
            && destination.offset >= origin.offset {
            return Some(Plan { distance: destination.offset - origin.offset, choices: BTreeMap::new() });
        }

        let mut candidates = vec![Candidate {
            state: Some((origin.piece, origin.anchor)),
            choices: Vec::new(),
        }];
        let mut best :HashMap<(PieceId, AnchorName), f64> = HashMap::new();
        best.insert((origin.piece, origin.anchor), -origin.offset);
        let mut queue = BinaryHeap::new();
        queue.push((Reverse(OrderedFloat(-origin.offset)), 0usize));

        let mut arrival :Option<f64> = None;
        let mut choices = RouteChoices::new();

        while let Some((Reverse(OrderedFloat(distance)), idx)) = queue.pop() {
            if let Some(shortest) = arrival {
                if distance > shortest + ROUTE_EPSILON { break; }
            }
            let candidate = candidates[idx].clone();
            let (piece, anchor) = match candidate.state {
                Some(s) => s,
                None => {
                    arrival.get_or_insert(distance);
                    for (p, a) in candidate.choices {
                        choices.entry(p).or_insert_with(BTreeSet::new).insert(a);
                    }
                    continue;
                },
            };
            if best.get(&(piece, anchor)).map(|b| distance > *b + ROUTE_EPSILON).unwrap_or(false) {
                continue;
            }

            let traversals = self.layout.traversals(piece, anchor);
            for t in traversals.iter() {
                let mut path = candidate.choices.clone();
                if traversals.len() > 1 { path.push((piece, t.to)); }
                let d = distance + t.distance;
                let next = match self.layout.next(piece, t.to) {
                    Some(n) => n,
                    None => continue,
                };
                if next == (destination.piece, destination.anchor) {
                    candidates.push(Candidate { state: None, choices: path });
                    queue.push((Reverse(OrderedFloat(d + destination.offset)), candidates.len() - 1));
                } else {
                    let b = best.entry(next).or_insert(f64::INFINITY);
                    if d > *b + ROUTE_EPSILON { continue; }
                    if d < *b { *b = d; }
                    candidates.push(Candidate { state: Some(next), choices: path });
                    queue.push((Reverse(OrderedFloat(d)), candidates.len() - 1));
                }
            }
        }

        trace!("Route search expanded {} candidates", candidates.len());
        arrival.map(|distance| Plan { distance, choices })
    }

    /// Decision pieces on the shortest routes and the exits to take there.
    /// Empty if the destination cannot be reached.
    pub fn route(&self, origin :&TrackPoint, destination :&TrackPoint) -> RouteChoices {
        match self.plan(origin, destination) {
            Some(plan) => {
                debug!("Route of length {:.1} with {} decision(s)", plan.distance, plan.choices.len());
                plan.choices
            },
            None => {
                debug!("No route from {:?} to {:?}", origin.piece, destination.piece);
                RouteChoices::new()
            },
        }
    }
}
