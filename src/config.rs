use confy;
use log::*;
use serde::{Serialize, Deserialize};
use crate::interlocking::ProtectionConfig;

/// Settings for the demo simulation loop.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seconds per tick.
    pub tick_interval :f64,
    pub ticks :usize,
    /// Track speed of a train at full motor speed.
    pub top_speed :f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_interval: 0.1,
            ticks: 600,
            top_speed: 40.0,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub protection :ProtectionConfig,
    pub simulation :SimulationConfig,
}

impl Config {
    pub fn load() -> Self {
        confy::load(env!("CARGO_PKG_NAME")).
            unwrap_or_else(|e| {
                error!("Could not load config file: {}", e);
                Default::default()
            })
    }

    pub fn save(&self) {
        if let Err(e) = confy::store(env!("CARGO_PKG_NAME"), self) {
            error!("Could not save config file: {}", e);
        }
    }
}
