//! Common test utilities

#![allow(dead_code)]

use avclip::codec::raw::RAW_VIDEO;
use avclip::format::{ChannelLayout, SampleFormat};
use avclip::{AudioOptions, ClipOptions, OutputFormat, VideoOptions};
use std::path::Path;

/// Small, fast video settings encoded as raw frames
pub fn small_video_options(width: u32, height: u32, frames_per_second: u32) -> VideoOptions {
    VideoOptions {
        width,
        height,
        frames_per_second,
        codec: Some(&RAW_VIDEO),
        ..VideoOptions::make_default()
    }
}

/// Mono 16-bit audio in the codec's own format
pub fn mono_audio_options(sample_rate: u32) -> AudioOptions {
    AudioOptions::new(SampleFormat::S16, sample_rate, ChannelLayout::MONO)
}

/// A clip that encodes quickly: raw 32x16 video, one second
pub fn quick_clip<P: AsRef<Path>>(path: P, container: OutputFormat) -> ClipOptions {
    let mut options = ClipOptions::new(path.as_ref().to_string_lossy(), container);
    options.video = small_video_options(32, 16, 10);
    options.audio.sample_rate = 8000;
    options.duration_seconds = 1;
    options
}

/// Verify that a file exists and has non-zero size
pub fn verify_file_exists_with_size<P: AsRef<Path>>(path: P) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() > 0,
        Err(_) => false,
    }
}

/// Parse the EBML header to verify it's a Matroska file
pub fn verify_matroska_header<P: AsRef<Path>>(path: P) -> bool {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(_) => return false,
    };

    // EBML magic, then the DocType somewhere in the header
    data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])
        && data[..data.len().min(64)]
            .windows(8)
            .any(|window| window == b"matroska")
}

/// Parse the MP4 header to verify it's an ISO-BMFF file with the given brand
pub fn verify_mp4_header<P: AsRef<Path>>(path: P, brand: &[u8; 4]) -> bool {
    use std::io::Read;

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut header = [0u8; 12];
    if file.read_exact(&mut header).is_err() {
        return false;
    }

    // 'ftyp' box at offset 4, major brand right after
    &header[4..8] == b"ftyp" && &header[8..12] == brand
}

/// Top-level ISO-BMFF box types in file order
pub fn mp4_top_level_boxes<P: AsRef<Path>>(path: P) -> Vec<String> {
    let data = std::fs::read(path).unwrap_or_default();
    let mut boxes = Vec::new();
    let mut offset = 0usize;

    while offset + 8 <= data.len() {
        let mut size = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as u64;
        boxes.push(String::from_utf8_lossy(&data[offset + 4..offset + 8]).to_string());

        if size == 1 && offset + 16 <= data.len() {
            let mut large = [0u8; 8];
            large.copy_from_slice(&data[offset + 8..offset + 16]);
            size = u64::from_be_bytes(large);
        }
        if size < 8 {
            break;
        }
        offset += size as usize;
    }

    boxes
}

/// Get file size in bytes
pub fn get_file_size<P: AsRef<Path>>(path: P) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
