//! FFI (Foreign Function Interface) for C/Go interoperability

use crate::container::OutputFormat;
use crate::error::ErrorCode;
use crate::format::ChannelLayout;
use crate::{available, make_audio_and_video, make_video, ClipOptions, Error};
use libc::c_char;
use std::ffi::{CStr, CString};
use std::ptr;

/// FFI result structure
#[repr(C)]
#[derive(Debug)]
pub struct FfiResult {
    pub code: ErrorCode,
    pub message: *mut c_char,
}

impl FfiResult {
    fn ok() -> Self {
        Self {
            code: ErrorCode::Ok,
            message: ptr::null_mut(),
        }
    }

    fn error(code: ErrorCode, message: &str) -> Self {
        let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
        Self {
            code,
            message: message.into_raw(),
        }
    }

    fn from_error(err: &Error) -> Self {
        Self::error(ErrorCode::from(err), &err.to_string())
    }
}

/// FFI clip options. Zero fields keep the library defaults; so does a
/// negative `quality`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfiClipOptions {
    pub width: u32,
    pub height: u32,
    pub frames_per_second: u32,
    pub duration_seconds: u32,
    pub sample_rate: u32,
    /// 1 for mono, 2 for stereo
    pub channels: u32,
    /// Constant rate factor; negative keeps the default
    pub quality: i32,
}

/// Build clip options from C strings
///
/// # Safety
/// - `output_path` must be a valid null-terminated string
/// - `container` must be a valid null-terminated string or null
/// - `options` must point to a valid `FfiClipOptions` or be null
unsafe fn clip_options(
    output_path: *const c_char,
    container: *const c_char,
    options: *const FfiClipOptions,
) -> Result<ClipOptions, FfiResult> {
    if output_path.is_null() {
        return Err(FfiResult::error(ErrorCode::InvalidInput, "Output path is null"));
    }

    let output_path = CStr::from_ptr(output_path)
        .to_str()
        .map_err(|_| FfiResult::error(ErrorCode::InvalidInput, "Invalid output path"))?;

    // Guess from the extension when no container is named
    let format = if container.is_null() {
        OutputFormat::guess(output_path)
    } else {
        let name = CStr::from_ptr(container)
            .to_str()
            .map_err(|_| FfiResult::error(ErrorCode::InvalidInput, "Invalid container name"))?;
        OutputFormat::require(name)
    };
    let format = format.map_err(|e| FfiResult::from_error(&e))?;

    let mut clip = ClipOptions::new(output_path, format);
    if options.is_null() {
        return Ok(clip);
    }

    let options = &*options;
    if options.width > 0 {
        clip.video.width = options.width;
    }
    if options.height > 0 {
        clip.video.height = options.height;
    }
    if options.frames_per_second > 0 {
        clip.video.frames_per_second = options.frames_per_second;
    }
    if options.duration_seconds > 0 {
        clip.duration_seconds = options.duration_seconds;
    }
    if options.sample_rate > 0 {
        clip.audio.sample_rate = options.sample_rate;
    }
    match options.channels {
        0 => {}
        1 => clip.audio.channel_layout = ChannelLayout::MONO,
        2 => clip.audio.channel_layout = ChannelLayout::STEREO,
        other => {
            return Err(FfiResult::error(
                ErrorCode::InvalidInput,
                &format!("Unsupported channel count: {}", other),
            ))
        }
    }
    if options.quality >= 0 {
        clip.video.quality_factor = Some(options.quality as u32);
    }

    Ok(clip)
}

/// Check if an encoder is available
///
/// # Safety
/// - `codec` must be a valid null-terminated string
#[no_mangle]
pub unsafe extern "C" fn avclip_available(codec: *const c_char) -> FfiResult {
    if codec.is_null() {
        return FfiResult::error(ErrorCode::InvalidInput, "Codec name is null");
    }

    let codec = match CStr::from_ptr(codec).to_str() {
        Ok(s) => s,
        Err(_) => return FfiResult::error(ErrorCode::InvalidInput, "Invalid codec name"),
    };

    match available(codec) {
        Ok(_) => FfiResult::ok(),
        Err(e) => FfiResult::from_error(&e),
    }
}

/// Write a gradient video with an audio sweep
///
/// # Safety
/// - `output_path` must be a valid null-terminated string
/// - `container` can be null (guessed from the extension)
/// - `options` can be null (defaults)
#[no_mangle]
pub unsafe extern "C" fn avclip_audio_and_video(
    output_path: *const c_char,
    container: *const c_char,
    options: *const FfiClipOptions,
) -> FfiResult {
    let clip = match clip_options(output_path, container, options) {
        Ok(clip) => clip,
        Err(result) => return result,
    };

    match make_audio_and_video(&clip) {
        Ok(_) => FfiResult::ok(),
        Err(e) => FfiResult::from_error(&e),
    }
}

/// Write a gradient video without audio
///
/// # Safety
/// - `output_path` must be a valid null-terminated string
/// - `container` can be null (guessed from the extension)
/// - `options` can be null (defaults)
#[no_mangle]
pub unsafe extern "C" fn avclip_video(
    output_path: *const c_char,
    container: *const c_char,
    options: *const FfiClipOptions,
) -> FfiResult {
    let clip = match clip_options(output_path, container, options) {
        Ok(clip) => clip,
        Err(result) => return result,
    };

    match make_video(&clip) {
        Ok(_) => FfiResult::ok(),
        Err(e) => FfiResult::from_error(&e),
    }
}

/// Free a result's message string
///
/// # Safety
/// - `result` must point to a valid `FfiResult` that was returned by an avclip function
#[no_mangle]
pub unsafe extern "C" fn avclip_free_result(result: *mut FfiResult) {
    if result.is_null() {
        return;
    }

    let result = &mut *result;
    if !result.message.is_null() {
        // Reclaim the CString and let it drop
        let _ = CString::from_raw(result.message);
        result.message = ptr::null_mut();
    }
}

/// Get version string
#[no_mangle]
pub extern "C" fn avclip_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
