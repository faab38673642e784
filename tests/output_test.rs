//! Integration tests for the encoder output channels

mod common;

use avclip::codec::pcm::PcmEncoder;
use avclip::codec::{Capabilities, Codec, CodecId};
use avclip::format::{ChannelLayout, MediaType, SampleFormat};
use avclip::generator::{AudioSweep, Generator};
use avclip::output::{AudioOutput, VideoOutput};
use avclip::{ContainerWriter, Dictionary, Error, OutputFormat, Rational};
use common::*;
use std::io::Cursor;
use tempfile::TempDir;

/// PCM encoder that only accepts two rates and stereo
static RESTRICTED_PCM: Codec = Codec {
    name: "pcm_restricted",
    long_name: "PCM restricted to 44.1/48 kHz stereo",
    id: CodecId::PcmS16le,
    media_type: MediaType::Audio,
    sample_formats: Some(&[SampleFormat::S16]),
    pixel_formats: None,
    supported_sample_rates: Some(&[44100, 48000]),
    channel_layouts: Some(&[ChannelLayout::STEREO]),
    capabilities: Capabilities {
        variable_frame_size: true,
        delay: false,
    },
    factory: PcmEncoder::create,
};

fn matroska() -> ContainerWriter {
    ContainerWriter::with_writer(OutputFormat::Matroska, Cursor::new(Vec::new())).unwrap()
}

/// A sweep written frame by frame keeps its timestamps and reaches the file intact
#[test]
fn test_audio_time_stamps_and_flush() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("sweep.mkv");

    let mut container = ContainerWriter::create(OutputFormat::Matroska, &output_path).unwrap();
    let mut audio =
        AudioOutput::new(&mut container, &mut Dictionary::new(), mono_audio_options(44100)).unwrap();
    container.initialize(&Dictionary::new()).unwrap();

    let mut sweep = AudioSweep::new(44100, ChannelLayout::MONO, 20.0, 40.0, 400.0);
    let mut stamps = Vec::new();
    let mut second_frame = Vec::new();
    for index in 0..4 {
        stamps.push(audio.time_stamp().count());
        let frame = audio.next_frame().unwrap();
        sweep.fill_frame(frame).unwrap();
        if index == 1 {
            second_frame = frame.plane(0)[..64].to_vec();
        }
        audio.write_frame(&mut container).unwrap();
    }

    assert_eq!(stamps, vec![0, 10000, 20000, 30000]);
    assert_eq!(audio.time_stamp().time_base(), Rational::per(44100).unwrap());

    // PCM holds nothing back, so one drain iteration reaches end of stream
    assert_eq!(audio.flush(&mut container).unwrap(), 1);
    assert!(audio.write_frame(&mut container).is_err());

    container.finalize().unwrap();
    assert_eq!(container.stream(0).unwrap().packets_written, 4);

    // The tone is audible and stored as little-endian samples
    let expected: Vec<u8> = second_frame
        .chunks_exact(2)
        .flat_map(|bytes| i16::from_ne_bytes([bytes[0], bytes[1]]).to_le_bytes())
        .collect();
    assert!(expected.iter().any(|&byte| byte != 0));

    let data = std::fs::read(&output_path).unwrap();
    assert!(data.windows(expected.len()).any(|window| window == expected.as_slice()));
}

/// Asking twice for the next frame returns the same buffer
#[test]
fn test_next_frame_is_idempotent() {
    let mut container = matroska();
    let mut audio =
        AudioOutput::new(&mut container, &mut Dictionary::new(), mono_audio_options(8000)).unwrap();

    let first = audio.next_frame().unwrap().plane(0).as_ptr();
    let second = audio.next_frame().unwrap().plane(0).as_ptr();
    assert_eq!(first, second);
}

/// A buffer still referenced elsewhere is copied before it is handed out again
#[test]
fn test_next_frame_copies_shared_buffer() {
    let mut container = matroska();
    let mut video =
        VideoOutput::new(&mut container, &mut Dictionary::new(), small_video_options(16, 8, 10))
            .unwrap();

    let held = video.next_frame().unwrap().clone();
    let frame = video.next_frame().unwrap();
    assert!(!frame.shares_buffer(&held));

    frame.plane_mut(0)[0] = 0xFF;
    assert_eq!(held.plane(0)[0], 0);
}

/// Supported rates open, unsupported ones fail before the encoder opens
#[test]
fn test_sample_rate_boundary() {
    let mut container = matroska();
    let mut options = mono_audio_options(44100);
    options.channel_layout = ChannelLayout::STEREO;
    options.codec = Some(&RESTRICTED_PCM);
    assert!(AudioOutput::new(&mut container, &mut Dictionary::new(), options).is_ok());

    let mut container = matroska();
    options.sample_rate = 44099;
    match AudioOutput::new(&mut container, &mut Dictionary::new(), options) {
        Err(Error::Configuration(message)) => {
            assert!(message.starts_with("Sample rate not supported"), "{}", message)
        }
        Err(other) => panic!("Unexpected error: {}", other),
        Ok(_) => panic!("44099 Hz should be rejected"),
    }

    let mut container = matroska();
    options.sample_rate = 48000;
    options.channel_layout = ChannelLayout::MONO;
    let result = AudioOutput::new(&mut container, &mut Dictionary::new(), options);
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_odd_dimensions_are_rejected() {
    let mut container = matroska();
    let result = VideoOutput::new(
        &mut container,
        &mut Dictionary::new(),
        small_video_options(17, 8, 10),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));

    let result = VideoOutput::new(
        &mut container,
        &mut Dictionary::new(),
        small_video_options(16, 9, 10),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

/// Channels cannot join a container after its header is written
#[test]
fn test_add_stream_after_initialize() {
    let mut container = matroska();
    let _audio =
        AudioOutput::new(&mut container, &mut Dictionary::new(), mono_audio_options(8000)).unwrap();
    container.initialize(&Dictionary::new()).unwrap();

    let result = VideoOutput::new(
        &mut container,
        &mut Dictionary::new(),
        small_video_options(16, 8, 10),
    );
    assert!(matches!(result, Err(Error::Container(_))));
}

/// Planar input is converted to the codec's interleaved format
#[test]
fn test_converted_audio_is_written() {
    let mut container = matroska();
    let mut options = mono_audio_options(8000);
    options.sample_format = SampleFormat::Fltp;
    options.channel_layout = ChannelLayout::STEREO;

    let mut audio = AudioOutput::new(&mut container, &mut Dictionary::new(), options).unwrap();
    container.initialize(&Dictionary::new()).unwrap();

    let frame = audio.next_frame().unwrap();
    assert_eq!(frame.sample_format(), Some(SampleFormat::Fltp));
    for plane in frame.planes_mut() {
        for sample in plane.chunks_mut(4) {
            sample.copy_from_slice(&0.5f32.to_ne_bytes());
        }
    }

    audio.write_frame(&mut container).unwrap();
    audio.flush(&mut container).unwrap();
    container.finalize().unwrap();
    assert_eq!(container.stream(0).unwrap().packets_written, 1);
}
