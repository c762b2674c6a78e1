//! Point-in-time football analytics.
//!
//! Every computation is parameterised by a [`SimulationContext`]: records
//! dated on or after its as-of date never contribute to a derived output.

pub mod clustering;
pub mod config;
pub mod controller;
pub mod error;
pub mod normalize;
pub mod profile;
pub mod rankings;
pub mod records;
pub mod rolling;
pub mod similarity;
pub mod store;

pub use config::EngineConfig;
pub use controller::{Engine, Session, SimulationContext};
pub use error::{EngineError, Result};
pub use records::{MatchId, MatchRecord, PlayerAppearance, PlayerId, PositionGroup, TeamId};
pub use store::{CutoffMode, TemporalStore};
