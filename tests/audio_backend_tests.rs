// Tests for the audio types and the frame codec
//
// These tests verify the codec properties the realtime pipeline relies on:
// bounded quantization error, sign/order preservation and exact wire round trips.

use site_voice::audio::codec::{self, SAMPLE_RATE};
use site_voice::audio::{AudioBackendConfig, AudioFrame, FrameBlocker};

const STEP: f32 = 1.0 / 32_767.0;

#[test]
fn test_audio_backend_config_default() {
    let config = AudioBackendConfig::default();

    assert_eq!(config.target_sample_rate, 24000, "Default should be 24kHz pcm16");
    assert_eq!(config.block_size, 4096);
    assert!(config.input_device.is_none());
    assert!(config.output_device.is_none());
}

#[test]
fn test_audio_frame_duration() {
    let frame = AudioFrame {
        samples: vec![0; 4800],
        sample_rate: SAMPLE_RATE,
        timestamp_ms: 1000,
    };

    assert_eq!(frame.duration_ms(), 200);
}

#[test]
fn test_decode_encode_error_bounded() {
    let samples: Vec<f32> = (-1000..=1000).map(|i| i as f32 / 1000.0).collect();
    let restored = codec::decode(&codec::encode(&samples));

    for (original, back) in samples.iter().zip(&restored) {
        assert!(
            (original - back).abs() <= STEP,
            "{original} -> {back} exceeds one quantization step"
        );
    }
}

#[test]
fn test_decode_encode_preserves_sign_and_order() {
    let samples = [-0.9f32, -0.25, -0.001, 0.0, 0.001, 0.3, 0.75];
    let restored = codec::decode(&codec::encode(&samples));

    for (original, back) in samples.iter().zip(&restored) {
        assert_eq!(original.signum() == -1.0, *back < 0.0);
    }
    assert!(restored.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_out_of_range_clamps_to_extremes() {
    let pcm = codec::encode(&[3.0, -3.0]);
    assert_eq!(pcm, vec![i16::MAX, i16::MIN]);
    assert_eq!(codec::decode(&pcm), vec![1.0, -1.0]);
}

#[test]
fn test_wire_round_trip_is_identity() {
    let empty: Vec<u8> = Vec::new();
    assert_eq!(codec::from_wire(&codec::to_wire(&empty)).unwrap(), empty);

    let every_byte: Vec<u8> = (0..=255u8).collect();
    assert_eq!(codec::from_wire(&codec::to_wire(&every_byte)).unwrap(), every_byte);

    // One minute of 24kHz PCM16
    let large: Vec<u8> = (0..SAMPLE_RATE as usize * 60 * 2).map(|i| (i * 31 % 251) as u8).collect();
    assert_eq!(codec::from_wire(&codec::to_wire(&large)).unwrap(), large);
}

#[test]
fn test_from_wire_rejects_garbage() {
    assert!(codec::from_wire("not*base64").is_err());
}

#[test]
fn test_pcm_bytes_round_trip() {
    let pcm = vec![i16::MIN, -1, 0, 1, i16::MAX];
    assert_eq!(codec::pcm_from_bytes(&codec::pcm_to_bytes(&pcm)), pcm);
}

#[test]
fn test_blocker_frames_are_capture_ordered() {
    let mut blocker = FrameBlocker::new(4096, SAMPLE_RATE);
    let ramp: Vec<f32> = (0..4096 * 2).map(|i| i as f32 / 8192.0).collect();

    let mut frames = blocker.push(&ramp[..5000]);
    frames.extend(blocker.push(&ramp[5000..]));

    assert_eq!(frames.len(), 2);
    assert!(frames[0].timestamp_ms < frames[1].timestamp_ms);
    assert!(frames[0].samples.last() < frames[1].samples.first());
}
