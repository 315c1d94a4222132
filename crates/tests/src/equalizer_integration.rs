//! Integration tests for the equalizer pipeline
//!
//! These tests drive the parameter store, the controller/processor split and
//! the stereo chains together, the way a host would.

use paraeq_core::{
    Band, ChainPosition, EqConfig, EqLayout, ParamId, ParameterSnapshot, ParameterStore, PresetManager,
    SnapshotSource, Slope, StereoEqualizer,
};
use paraeq_infra::split;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 256;

fn generate_sine_wave(frequency: f32, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| 2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32)
        .map(|phase| phase.sin() * 0.25)
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn to_db(ratio: f32) -> f64 {
    20.0 * f64::from(ratio).log10()
}

fn store(layout: EqLayout) -> Arc<ParameterStore> {
    Arc::new(ParameterStore::new(layout).unwrap())
}

/// Run `input` through the processor in host-sized blocks
fn run_blocks<S: SnapshotSource>(
    processor: &mut paraeq_infra::EqProcessor<S>,
    left: &mut [f32],
    right: &mut [f32],
) {
    for (l, r) in left.chunks_mut(BLOCK).zip(right.chunks_mut(BLOCK)) {
        processor.process_block(l, r).unwrap();
    }
}

// ============================================================================
// SIGNAL TESTS
// ============================================================================

#[test]
fn test_default_parameters_are_nearly_transparent() {
    let store = store(EqLayout::default());
    let (_controller, mut processor) = split(store, 4).unwrap();
    processor.prepare(SAMPLE_RATE, BLOCK).unwrap();

    let input = generate_sine_wave(1000.0, SAMPLE_RATE, 8192);
    let mut left = input.clone();
    let mut right = input.clone();
    run_blocks(&mut processor, &mut left, &mut right);

    let gain_db = to_db(rms(&left[4096..]) / rms(&input[4096..]));
    assert!(gain_db.abs() < 0.1, "{gain_db}");
    assert_eq!(left, right);
}

#[test]
fn test_measured_gain_matches_reported_response() {
    let store = store(EqLayout::default());
    store.set(ParamId::PeakFreq(Band::Mid), 2000.0);
    store.set(ParamId::PeakGain(Band::Mid), -9.0);
    store.set(ParamId::PeakQuality(Band::Mid), 2.0);
    store.set(ParamId::HighCutFreq, 8000.0);
    store.set_slope(ParamId::HighCutSlope, Slope::Db12);

    let (mut controller, mut processor) = split(store, 4).unwrap();
    processor.prepare(SAMPLE_RATE, BLOCK).unwrap();
    controller.update_now().unwrap();

    for freq in [500.0f32, 2000.0, 9000.0] {
        let input = generate_sine_wave(freq, SAMPLE_RATE, 16384);
        let (mut left, mut right) = (input.clone(), input.clone());
        run_blocks(&mut processor, &mut left, &mut right);

        let measured = to_db(rms(&left[8192..]) / rms(&input[8192..]));
        let reported = controller.magnitude_response_db(f64::from(freq)).unwrap();
        assert!((measured - reported).abs() < 0.3, "{freq} Hz: measured {measured}, reported {reported}");
    }
}

#[test]
fn test_low_cut_removes_rumble() {
    let store = store(EqLayout::default());
    store.set(ParamId::LowCutFreq, 120.0);
    store.set_slope(ParamId::LowCutSlope, Slope::Db24);

    let (_controller, mut processor) = split(store, 4).unwrap();
    processor.prepare(SAMPLE_RATE, BLOCK).unwrap();

    let rumble = generate_sine_wave(30.0, SAMPLE_RATE, 48000);
    let voice = generate_sine_wave(1000.0, SAMPLE_RATE, 48000);
    let (mut left, mut right) = (rumble.clone(), voice.clone());
    run_blocks(&mut processor, &mut left, &mut right);

    let rumble_db = to_db(rms(&left[24000..]) / rms(&rumble[24000..]));
    let voice_db = to_db(rms(&right[24000..]) / rms(&voice[24000..]));
    assert!(rumble_db < -60.0, "{rumble_db}");
    assert!(voice_db.abs() < 0.1, "{voice_db}");
}

#[test]
fn test_bypass_passes_signal_bit_exact() {
    let store = store(EqLayout::default());
    for position in ChainPosition::ALL {
        store.set_bypassed(position, true);
    }
    store.set(ParamId::PeakGain(Band::Low), 12.0);

    let (_controller, mut processor) = split(store, 4).unwrap();
    processor.prepare(SAMPLE_RATE, BLOCK).unwrap();

    let input = generate_sine_wave(250.0, SAMPLE_RATE, 4096);
    let (mut left, mut right) = (input.clone(), input.clone());
    run_blocks(&mut processor, &mut left, &mut right);
    assert_eq!(left, input);
    assert_eq!(right, input);
}

// ============================================================================
// CONTROL PATH TESTS
// ============================================================================

#[test]
fn test_wide_gain_layout_from_config() {
    let config = EqConfig::from_toml_str(&EqConfig {
        layout: EqLayout::wide_gain(),
        ..Default::default()
    }
    .to_toml_string()
    .unwrap())
    .unwrap();

    let wide = store(config.layout);
    assert_eq!(wide.set(ParamId::PeakGain(Band::High), 20.0), 20.0);

    let narrow = store(EqLayout::default());
    assert_eq!(narrow.set(ParamId::PeakGain(Band::High), 20.0), 12.0);
}

#[test]
fn test_state_restore_applies_before_next_block() {
    let source = store(EqLayout::default());
    source.set(ParamId::PeakGain(Band::MidLow), -12.0);
    source.set_bypassed(ChainPosition::HighCut, true);
    let blob = source.save_state().unwrap();

    let (mut controller, mut processor) = split(store(EqLayout::default()), 4).unwrap();
    processor.prepare(SAMPLE_RATE, BLOCK).unwrap();
    controller.load_state(&blob).unwrap();

    let (mut left, mut right) = (vec![0.0; BLOCK], vec![0.0; BLOCK]);
    processor.process_block(&mut left, &mut right).unwrap();

    let eq = processor.equalizer();
    assert_eq!(eq.snapshot(), &source.snapshot());
    assert!(eq.is_bypassed(ChainPosition::HighCut));
}

#[tokio::test]
async fn test_preset_drives_processing() {
    let temp_dir = TempDir::new().unwrap();
    let presets = PresetManager::new(temp_dir.path().to_path_buf());

    let mut snapshot = ParameterSnapshot::default();
    snapshot.peak_mut(Band::Mid).gain_db = 6.0;
    snapshot.low_cut_freq = 80.0;
    presets.save_preset("warm", &snapshot).await.unwrap();

    let store = store(EqLayout::default());
    store.apply_snapshot(&presets.load_preset("warm").await.unwrap());

    let (mut controller, mut processor) = split(store, 4).unwrap();
    processor.prepare(SAMPLE_RATE, BLOCK).unwrap();
    controller.update_now().unwrap();

    let db = controller.magnitude_response_db(1000.0).unwrap();
    assert!((db - 6.0).abs() < 0.1, "{db}");

    // The standalone equalizer agrees with the split pipeline
    let mut reference = StereoEqualizer::new(snapshot);
    reference.prepare(SAMPLE_RATE, BLOCK).unwrap();
    assert!((reference.magnitude_response_db(1000.0).unwrap() - db).abs() < 1e-9);
}

#[test]
fn test_control_and_audio_threads_converge() {
    let store = store(EqLayout::default());
    let (mut controller, mut processor) = split(Arc::clone(&store), 2).unwrap();
    processor.prepare(SAMPLE_RATE, BLOCK).unwrap();

    let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
    let audio = std::thread::spawn(move || {
        let input = generate_sine_wave(440.0, SAMPLE_RATE, BLOCK);
        let (mut left, mut right) = (input.clone(), input.clone());
        loop {
            left.copy_from_slice(&input);
            right.copy_from_slice(&input);
            processor.process_block(&mut left, &mut right).unwrap();
            assert!(left.iter().all(|s| s.is_finite()));
            if done_rx.try_recv().is_ok() {
                // One last block to pick up the final set
                processor.process_block(&mut left, &mut right).unwrap();
                return processor;
            }
        }
    });

    for i in 0..500 {
        store.set(ParamId::PeakGain(Band::Low), (i % 49) as f32 * 0.5 - 12.0);
        store.set_slope(ParamId::HighCutSlope, Slope::ALL[i % 4]);
        store.set(ParamId::HighCutFreq, 2000.0 + (i * 13 % 15000) as f32);
        controller.poll().unwrap();
    }
    done_tx.send(()).unwrap();

    let processor = audio.join().unwrap();
    let expected = controller.current().copied().unwrap();
    assert_eq!(processor.equalizer().snapshot(), expected.snapshot());
    for freq in [100.0, 1000.0, 10000.0] {
        let actual = processor.equalizer().magnitude_response_db(freq).unwrap();
        assert!((actual - expected.magnitude_response_db(freq)).abs() < 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_tone_at_center_gets_band_gain(
        freq in 200.0f32..5000.0,
        gain in -12.0f32..12.0,
        quality in 0.5f32..4.0,
    ) {
        let store = store(EqLayout::default());
        for position in ChainPosition::ALL {
            store.set_bypassed(position, position != ChainPosition::MidPeak);
        }
        let freq = store.set(ParamId::PeakFreq(Band::Mid), freq);
        let gain = store.set(ParamId::PeakGain(Band::Mid), gain);
        store.set(ParamId::PeakQuality(Band::Mid), quality);

        let (_controller, mut processor) = split(store, 4).unwrap();
        processor.prepare(SAMPLE_RATE, BLOCK).unwrap();

        let input = generate_sine_wave(freq, SAMPLE_RATE, 24576);
        let (mut left, mut right) = (input.clone(), input.clone());
        run_blocks(&mut processor, &mut left, &mut right);

        let measured = to_db(rms(&left[12288..]) / rms(&input[12288..]));
        prop_assert!((measured - f64::from(gain)).abs() < 0.5, "measured {}, expected {}", measured, gain);
    }
}
