//! Host parameter store
//!
//! Every host parameter lives in an atomic slot so the control thread can
//! write while the audio thread reads. A generation counter is bumped on
//! each change; the audio side compares it to decide whether a new
//! snapshot needs to be designed. Writers also hold an in-flight count
//! for the duration of a write so snapshot reads can tell when they
//! overlapped one.

use crate::domain::chain::{ChainPosition, CHAIN_LENGTH};
use crate::domain::error::{EqError, Result};
use crate::domain::params::{Band, EqLayout, ParamRange, ParameterSnapshot, PeakSettings, Slope, PEAK_BAND_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::{debug, instrument, warn};

/// Number of host parameters
pub const PARAM_COUNT: usize = 26;

/// Version written into saved state blobs
pub const STATE_VERSION: u32 = 1;

const SNAPSHOT_ATTEMPTS: usize = 4;

/// Identifier of one host parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    LowCutFreq,
    HighCutFreq,
    LowCutSlope,
    HighCutSlope,
    PeakFreq(Band),
    PeakGain(Band),
    PeakQuality(Band),
    Bypassed(ChainPosition),
}

impl ParamId {
    /// Every parameter, in slot order
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::LowCutFreq,
        ParamId::HighCutFreq,
        ParamId::LowCutSlope,
        ParamId::HighCutSlope,
        ParamId::PeakFreq(Band::Low),
        ParamId::PeakGain(Band::Low),
        ParamId::PeakQuality(Band::Low),
        ParamId::PeakFreq(Band::MidLow),
        ParamId::PeakGain(Band::MidLow),
        ParamId::PeakQuality(Band::MidLow),
        ParamId::PeakFreq(Band::Mid),
        ParamId::PeakGain(Band::Mid),
        ParamId::PeakQuality(Band::Mid),
        ParamId::PeakFreq(Band::MidHigh),
        ParamId::PeakGain(Band::MidHigh),
        ParamId::PeakQuality(Band::MidHigh),
        ParamId::PeakFreq(Band::High),
        ParamId::PeakGain(Band::High),
        ParamId::PeakQuality(Band::High),
        ParamId::Bypassed(ChainPosition::LowCut),
        ParamId::Bypassed(ChainPosition::LowPeak),
        ParamId::Bypassed(ChainPosition::MidLowPeak),
        ParamId::Bypassed(ChainPosition::MidPeak),
        ParamId::Bypassed(ChainPosition::MidHighPeak),
        ParamId::Bypassed(ChainPosition::HighPeak),
        ParamId::Bypassed(ChainPosition::HighCut),
    ];

    /// Slot index, matching the order of `ParamId::ALL`
    pub fn index(self) -> usize {
        match self {
            ParamId::LowCutFreq => 0,
            ParamId::HighCutFreq => 1,
            ParamId::LowCutSlope => 2,
            ParamId::HighCutSlope => 3,
            ParamId::PeakFreq(band) => 4 + band.index() * 3,
            ParamId::PeakGain(band) => 5 + band.index() * 3,
            ParamId::PeakQuality(band) => 6 + band.index() * 3,
            ParamId::Bypassed(position) => 4 + PEAK_BAND_COUNT * 3 + position.index(),
        }
    }

    /// Stable string id used by hosts and saved state
    pub fn host_id(self) -> String {
        match self {
            ParamId::LowCutFreq => "LowCut Freq".to_string(),
            ParamId::HighCutFreq => "HighCut Freq".to_string(),
            ParamId::LowCutSlope => "LowCut Slope".to_string(),
            ParamId::HighCutSlope => "HighCut Slope".to_string(),
            ParamId::PeakFreq(band) => format!("{} Freq", band.position().name()),
            ParamId::PeakGain(band) => format!("{} Gain", band.position().name()),
            ParamId::PeakQuality(band) => format!("{} Quality", band.position().name()),
            ParamId::Bypassed(position) => format!("{} Bypassed", position.name()),
        }
    }

    /// Look a parameter up by its host id
    pub fn from_host_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|param| param.host_id() == id)
    }
}

/// Anything that can produce a consistent parameter snapshot
///
/// The audio side only needs this, which keeps it independent of how the
/// host stores parameters.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> ParameterSnapshot;

    /// Monotonic counter that changes whenever a parameter changes
    fn generation(&self) -> u64;
}

#[derive(Debug, Serialize, Deserialize)]
struct StateBlob {
    version: u32,
    params: BTreeMap<String, f32>,
}

/// Lock-free store of every host parameter
#[derive(Debug)]
pub struct ParameterStore {
    layout: EqLayout,
    values: [AtomicU32; PARAM_COUNT],
    generation: AtomicU64,
    writers: AtomicU32,
}

impl ParameterStore {
    /// Create a store holding every parameter's default
    pub fn new(layout: EqLayout) -> Result<Self> {
        layout.validate()?;
        let store = Self {
            layout,
            values: std::array::from_fn(|_| AtomicU32::new(0)),
            generation: AtomicU64::new(0),
            writers: AtomicU32::new(0),
        };
        store.write_defaults();
        Ok(store)
    }

    pub fn layout(&self) -> &EqLayout {
        &self.layout
    }

    /// Declared range of a parameter
    ///
    /// Slopes are exposed as a stepped 0..=3 choice and bypass flags as a
    /// stepped 0..=1 toggle.
    pub fn range(&self, id: ParamId) -> ParamRange {
        match id {
            ParamId::LowCutFreq => self.layout.low_cut_freq,
            ParamId::HighCutFreq => self.layout.high_cut_freq,
            ParamId::LowCutSlope => slope_range(self.layout.low_cut_slope),
            ParamId::HighCutSlope => slope_range(self.layout.high_cut_slope),
            ParamId::PeakFreq(band) => self.layout.band(band).freq,
            ParamId::PeakGain(band) => self.layout.band(band).gain,
            ParamId::PeakQuality(band) => self.layout.band(band).quality,
            ParamId::Bypassed(_) => ParamRange::new(0.0, 1.0, 1.0, 1.0, 0.0),
        }
    }

    pub fn get(&self, id: ParamId) -> f32 {
        f32::from_bits(self.values[id.index()].load(Ordering::SeqCst))
    }

    /// Set a parameter, returning the clamped value actually stored
    pub fn set(&self, id: ParamId, value: f32) -> f32 {
        self.write(|| self.store_clamped(id, value))
    }

    pub fn get_normalised(&self, id: ParamId) -> f32 {
        self.range(id).to_normalised(self.get(id))
    }

    pub fn set_normalised(&self, id: ParamId, normalised: f32) -> f32 {
        let value = self.range(id).from_normalised(normalised);
        self.set(id, value)
    }

    pub fn get_by_name(&self, host_id: &str) -> Result<f32> {
        let id = ParamId::from_host_id(host_id).ok_or_else(|| EqError::UnknownParameter(host_id.to_string()))?;
        Ok(self.get(id))
    }

    pub fn set_by_name(&self, host_id: &str, value: f32) -> Result<f32> {
        let id = ParamId::from_host_id(host_id).ok_or_else(|| EqError::UnknownParameter(host_id.to_string()))?;
        Ok(self.set(id, value))
    }

    pub fn set_bypassed(&self, position: ChainPosition, bypassed: bool) {
        self.set(ParamId::Bypassed(position), if bypassed { 1.0 } else { 0.0 });
    }

    pub fn set_slope(&self, id: ParamId, slope: Slope) {
        self.set(id, slope.index() as f32);
    }

    /// Write every value of a snapshot (a loaded preset, say), clamped
    pub fn apply_snapshot(&self, snapshot: &ParameterSnapshot) {
        self.write(|| self.store_snapshot(snapshot));
    }

    fn store_snapshot(&self, snapshot: &ParameterSnapshot) {
        for band in Band::ALL {
            let peak = snapshot.peak(band);
            self.store_clamped(ParamId::PeakFreq(band), peak.freq);
            self.store_clamped(ParamId::PeakGain(band), peak.gain_db);
            self.store_clamped(ParamId::PeakQuality(band), peak.quality);
        }
        self.store_clamped(ParamId::LowCutFreq, snapshot.low_cut_freq);
        self.store_clamped(ParamId::HighCutFreq, snapshot.high_cut_freq);
        self.store_clamped(ParamId::LowCutSlope, snapshot.low_cut_slope.index() as f32);
        self.store_clamped(ParamId::HighCutSlope, snapshot.high_cut_slope.index() as f32);
        for position in ChainPosition::ALL {
            let flag = if snapshot.is_bypassed(position) { 1.0 } else { 0.0 };
            self.store_clamped(ParamId::Bypassed(position), flag);
        }
    }

    /// Put every parameter back to its default
    pub fn reset_to_defaults(&self) {
        self.write(|| self.write_defaults());
    }

    /// Serialize all parameters as a versioned JSON blob
    #[instrument(skip(self))]
    pub fn save_state(&self) -> Result<Vec<u8>> {
        let params = ParamId::ALL
            .iter()
            .map(|id| (id.host_id(), self.get(*id)))
            .collect();
        let blob = StateBlob {
            version: STATE_VERSION,
            params,
        };
        let bytes = serde_json::to_vec(&blob)?;
        debug!("Saved {} parameters ({} bytes)", PARAM_COUNT, bytes.len());
        Ok(bytes)
    }

    /// Restore parameters from a blob written by `save_state`
    ///
    /// The whole blob is parsed before anything is written, so a malformed
    /// blob leaves the store untouched. Unknown ids are skipped, missing
    /// ids keep their current value and every value is clamped.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn load_state(&self, bytes: &[u8]) -> Result<()> {
        let blob: StateBlob = serde_json::from_slice(bytes)?;
        if blob.version > STATE_VERSION {
            return Err(EqError::InvalidConfiguration(format!(
                "state version {} is newer than supported version {}",
                blob.version, STATE_VERSION
            )));
        }

        let known: Vec<(ParamId, f32)> = blob
            .params
            .iter()
            .filter_map(|(host_id, value)| match ParamId::from_host_id(host_id) {
                Some(id) => Some((id, *value)),
                None => {
                    warn!("Ignoring unknown parameter in saved state: {}", host_id);
                    None
                }
            })
            .collect();

        self.write(|| {
            for (id, value) in &known {
                self.store_clamped(*id, *value);
            }
        });
        let restored = known.len();
        debug!("Restored {} parameters", restored);
        Ok(())
    }

    /// Run one logical write: marked in flight, then published
    ///
    /// The generation moves before the in-flight count drops, so a reader
    /// overlapping the write sees at least one of the two.
    fn write<T>(&self, store: impl FnOnce() -> T) -> T {
        self.writers.fetch_add(1, Ordering::SeqCst);
        let result = store();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.writers.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn store_clamped(&self, id: ParamId, value: f32) -> f32 {
        let clamped = self.range(id).clamp(value);
        self.values[id.index()].store(clamped.to_bits(), Ordering::SeqCst);
        clamped
    }

    /// A snapshot no write overlapped, if one turns up within a few tries
    pub fn try_snapshot(&self) -> Option<ParameterSnapshot> {
        for _ in 0..SNAPSHOT_ATTEMPTS {
            let before = self.generation.load(Ordering::SeqCst);
            if self.writers.load(Ordering::SeqCst) != 0 {
                std::hint::spin_loop();
                continue;
            }
            let snapshot = self.read_snapshot();
            if self.writers.load(Ordering::SeqCst) == 0 && self.generation.load(Ordering::SeqCst) == before {
                return Some(snapshot);
            }
        }
        None
    }

    fn write_defaults(&self) {
        for id in ParamId::ALL {
            let default = self.range(id).default;
            self.values[id.index()].store(default.to_bits(), Ordering::SeqCst);
        }
    }

    fn read_snapshot(&self) -> ParameterSnapshot {
        let mut peaks = [PeakSettings {
            freq: 0.0,
            gain_db: 0.0,
            quality: 1.0,
        }; PEAK_BAND_COUNT];
        for band in Band::ALL {
            peaks[band.index()] = PeakSettings {
                freq: self.get(ParamId::PeakFreq(band)),
                gain_db: self.get(ParamId::PeakGain(band)),
                quality: self.get(ParamId::PeakQuality(band)),
            };
        }

        let mut bypassed = [false; CHAIN_LENGTH];
        for position in ChainPosition::ALL {
            bypassed[position.index()] = self.get(ParamId::Bypassed(position)) >= 0.5;
        }

        ParameterSnapshot {
            peaks,
            low_cut_freq: self.get(ParamId::LowCutFreq),
            high_cut_freq: self.get(ParamId::HighCutFreq),
            low_cut_slope: slope_from_value(self.get(ParamId::LowCutSlope)),
            high_cut_slope: slope_from_value(self.get(ParamId::HighCutSlope)),
            bypassed,
        }
    }
}

impl SnapshotSource for ParameterStore {
    /// Read every parameter, retrying while a write is in flight
    ///
    /// If writes keep landing past the retry budget a plain read is
    /// returned. It may mix values from two writes; the generation has
    /// moved by then, so the next poll designs again.
    fn snapshot(&self) -> ParameterSnapshot {
        self.try_snapshot().unwrap_or_else(|| self.read_snapshot())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

fn slope_range(default: Slope) -> ParamRange {
    ParamRange::new(0.0, 3.0, 1.0, 1.0, default.index() as f32)
}

fn slope_from_value(value: f32) -> Slope {
    // Stored values are already clamped to 0..=3
    Slope::ALL[(value.round().clamp(0.0, 3.0)) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn store() -> ParameterStore {
        ParameterStore::new(EqLayout::default()).unwrap()
    }

    // ========================================================================
    // IDS
    // ========================================================================

    #[test]
    fn test_param_slots_match_order() {
        for (slot, id) in ParamId::ALL.iter().enumerate() {
            assert_eq!(id.index(), slot, "{id:?}");
        }
    }

    #[test]
    fn test_host_ids() {
        assert_eq!(ParamId::LowCutFreq.host_id(), "LowCut Freq");
        assert_eq!(ParamId::HighCutSlope.host_id(), "HighCut Slope");
        assert_eq!(ParamId::PeakGain(Band::Low).host_id(), "LowPeak Gain");
        assert_eq!(ParamId::PeakQuality(Band::MidHigh).host_id(), "MidHighPeak Quality");
        assert_eq!(ParamId::Bypassed(ChainPosition::MidPeak).host_id(), "MidPeak Bypassed");

        for id in ParamId::ALL {
            assert_eq!(ParamId::from_host_id(&id.host_id()), Some(id));
        }
        assert_eq!(ParamId::from_host_id("Volume"), None);
    }

    // ========================================================================
    // VALUES
    // ========================================================================

    #[test]
    fn test_defaults() {
        let store = store();
        assert_eq!(store.snapshot(), ParameterSnapshot::default());
        assert_eq!(store.get(ParamId::PeakFreq(Band::Mid)), 1000.0);
        assert_eq!(store.get(ParamId::HighCutFreq), 20000.0);
    }

    #[test]
    fn test_set_clamps_to_range() {
        let store = store();
        assert_eq!(store.set(ParamId::PeakGain(Band::Mid), 30.0), 12.0);
        assert_eq!(store.set(ParamId::PeakFreq(Band::Low), 5.0), 20.0);
        assert_eq!(store.set(ParamId::LowCutSlope, 7.0), 3.0);
        assert_eq!(store.get(ParamId::PeakGain(Band::Mid)), 12.0);
    }

    #[test]
    fn test_generation_bumps_on_change() {
        let store = store();
        let start = store.generation();
        store.set(ParamId::LowCutFreq, 100.0);
        assert!(store.generation() > start);

        let after_set = store.generation();
        store.reset_to_defaults();
        assert!(store.generation() > after_set);
        assert_eq!(store.get(ParamId::LowCutFreq), 20.0);
    }

    #[test]
    fn test_snapshot_reflects_store() {
        let store = store();
        store.set(ParamId::PeakGain(Band::High), -4.0);
        store.set_slope(ParamId::HighCutSlope, Slope::Db18);
        store.set_bypassed(ChainPosition::LowPeak, true);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.peak(Band::High).gain_db, -4.0);
        assert_eq!(snapshot.high_cut_slope, Slope::Db18);
        assert!(snapshot.is_bypassed(ChainPosition::LowPeak));
        assert!(!snapshot.is_bypassed(ChainPosition::MidPeak));
    }

    #[test]
    fn test_apply_snapshot() {
        let store = store();
        let mut snapshot = ParameterSnapshot::default();
        snapshot.peak_mut(Band::Low).gain_db = 40.0;
        snapshot.high_cut_freq = 6000.0;
        snapshot.low_cut_slope = Slope::Db12;
        snapshot.set_bypassed(ChainPosition::MidHighPeak, true);

        let generation = store.generation();
        store.apply_snapshot(&snapshot);
        assert!(store.generation() > generation);

        let applied = store.snapshot();
        assert_eq!(applied.peak(Band::Low).gain_db, 12.0);
        assert_eq!(applied.high_cut_freq, 6000.0);
        assert_eq!(applied.low_cut_slope, Slope::Db12);
        assert!(applied.is_bypassed(ChainPosition::MidHighPeak));
    }

    #[test]
    fn test_named_access() {
        let store = store();
        assert_eq!(store.set_by_name("MidPeak Quality", 2.0).unwrap(), 2.0);
        assert_eq!(store.get_by_name("MidPeak Quality").unwrap(), 2.0);
        assert!(matches!(
            store.set_by_name("Master Volume", 1.0),
            Err(EqError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_normalised_access() {
        let store = store();
        store.set_normalised(ParamId::PeakGain(Band::Mid), 1.0);
        assert_eq!(store.get(ParamId::PeakGain(Band::Mid)), 12.0);
        assert_eq!(store.get_normalised(ParamId::PeakGain(Band::Mid)), 1.0);

        store.set_normalised(ParamId::Bypassed(ChainPosition::HighCut), 0.8);
        assert!(store.snapshot().is_bypassed(ChainPosition::HighCut));
    }

    #[test]
    fn test_concurrent_writes_and_snapshots() {
        let store = Arc::new(store());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..1000 {
                    store.set(ParamId::PeakGain(Band::Mid), (i % 24) as f32 - 12.0);
                }
            })
        };

        for _ in 0..1000 {
            let snapshot = store.snapshot();
            let gain = snapshot.peak(Band::Mid).gain_db;
            assert!((-12.0..=12.0).contains(&gain));
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_coherent_snapshots_never_mix_writes() {
        let store = Arc::new(store());
        let mut quiet = ParameterSnapshot::default();
        let mut loud = ParameterSnapshot::default();
        for band in Band::ALL {
            quiet.peak_mut(band).gain_db = -6.0;
            loud.peak_mut(band).gain_db = 6.0;
        }
        loud.low_cut_freq = 120.0;
        loud.low_cut_slope = Slope::Db18;

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..2000 {
                    store.apply_snapshot(if i % 2 == 0 { &quiet } else { &loud });
                }
            })
        };

        while !writer.is_finished() {
            if let Some(snapshot) = store.try_snapshot() {
                assert!(snapshot == quiet || snapshot == loud, "{snapshot:?}");
            }
        }
        writer.join().unwrap();
        assert_eq!(store.try_snapshot(), Some(loud));
    }

    #[test]
    fn test_try_snapshot_when_idle() {
        let store = store();
        store.set(ParamId::PeakGain(Band::High), 3.0);
        assert_eq!(store.try_snapshot(), Some(store.snapshot()));
    }

    // ========================================================================
    // STATE
    // ========================================================================

    #[test]
    fn test_state_round_trip() {
        let source = store();
        source.set(ParamId::LowCutFreq, 120.0);
        source.set_slope(ParamId::LowCutSlope, Slope::Db24);
        source.set(ParamId::PeakGain(Band::MidLow), -7.5);
        source.set_bypassed(ChainPosition::HighPeak, true);
        let blob = source.save_state().unwrap();

        let target = store();
        target.load_state(&blob).unwrap();
        assert_eq!(target.snapshot(), source.snapshot());
    }

    #[test]
    fn test_load_skips_unknown_and_keeps_missing() {
        let store = store();
        store.set(ParamId::PeakFreq(Band::High), 5000.0);
        let blob = br#"{"version":1,"params":{"LowPeak Gain":3.0,"Ghost Param":1.0}}"#;
        store.load_state(blob).unwrap();

        assert_eq!(store.get(ParamId::PeakGain(Band::Low)), 3.0);
        assert_eq!(store.get(ParamId::PeakFreq(Band::High)), 5000.0);
    }

    #[test]
    fn test_load_clamps_values() {
        let store = store();
        store
            .load_state(br#"{"version":1,"params":{"MidPeak Gain":99.0,"LowCut Slope":-3.0}}"#)
            .unwrap();
        assert_eq!(store.get(ParamId::PeakGain(Band::Mid)), 12.0);
        assert_eq!(store.snapshot().low_cut_slope, Slope::Db6);
    }

    #[test]
    fn test_malformed_state_leaves_store_unchanged() {
        let store = store();
        store.set(ParamId::HighCutFreq, 8000.0);
        let before = store.snapshot();
        let generation = store.generation();

        assert!(matches!(store.load_state(b"{not json"), Err(EqError::State(_))));
        assert!(store.load_state(br#"{"version":1,"params":{"MidPeak Gain":"loud"}}"#).is_err());
        assert!(matches!(
            store.load_state(br#"{"version":99,"params":{}}"#),
            Err(EqError::InvalidConfiguration(_))
        ));

        assert_eq!(store.snapshot(), before);
        assert_eq!(store.generation(), generation);
    }

    #[test]
    fn test_load_bumps_generation() {
        let store = store();
        let blob = store.save_state().unwrap();
        let generation = store.generation();
        store.load_state(&blob).unwrap();
        assert!(store.generation() > generation);
    }
}
