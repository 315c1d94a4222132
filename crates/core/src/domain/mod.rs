//! Domain entities and filter chain rules

pub mod chain;
pub mod config;
pub mod cut;
pub mod dsp;
pub mod error;
pub mod params;
pub mod stereo;
pub mod store;
pub mod update;

// Re-export specific items to avoid ambiguous glob imports (both `error`
// and `config` define a `Result` alias)
pub use chain::{ChainPosition, ChainStage, ChannelChain, StageFilter, CHAIN_LENGTH};
pub use config::{ConfigError, EngineConfig, EqConfig, PresetManager};
pub use cut::CutFilterBank;
pub use dsp::{butterworth, db_to_gain, gain_to_db, BiquadCoeffs, BiquadFilter, CutCoefficients, CutType};
pub use error::{EqError, Result};
pub use params::{Band, BandLayout, EqLayout, ParamRange, ParameterSnapshot, PeakSettings, Slope, PEAK_BAND_COUNT};
pub use stereo::{ProcessorState, StereoEqualizer};
pub use store::{ParamId, ParameterStore, SnapshotSource, PARAM_COUNT, STATE_VERSION};
pub use update::ChainCoefficients;
