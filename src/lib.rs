pub mod position;
pub mod pieces;
pub mod topology;
pub mod trackpoint;
pub mod routing;
pub mod train;
pub mod interlocking;
pub mod dispatch;
pub mod sensors;
pub mod events;
pub mod config;
pub mod file;

#[cfg(test)]
mod testing;
