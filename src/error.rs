use chrono::NaiveDate;
use thiserror::Error;

use crate::records::{EntityRef, PlayerId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no simulation date set - call set_date first")]
    NoSimulationDate,

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("{entity} has no visible records as of {as_of}")]
    MissingEntity { entity: EntityRef, as_of: NaiveDate },

    #[error("player {player} not eligible as of {as_of}: {reason}")]
    EntityNotEligible {
        player: PlayerId,
        as_of: NaiveDate,
        reason: String,
    },

    #[error("leakage detected in {output}: used record dated {record_date} with as-of {as_of}")]
    LeakageDetected {
        output: String,
        record_date: NaiveDate,
        as_of: NaiveDate,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
