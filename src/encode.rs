//! JPEG encoding for snapshots and the MJPEG stream, plus the no-signal
//! placeholder served while the frame store is empty.

use base64::Engine;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, Rgb, RgbImage};

use crate::error::EncodeError;
use crate::frame::Frame;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;
pub const PLACEHOLDER_CAPTION: &str = "No Signal";

const BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);
const CAPTION_COLOR: Rgb<u8> = Rgb([100, 100, 100]);
const ERROR_COLOR: Rgb<u8> = Rgb([80, 80, 80]);
const CAPTION_SCALE: u32 = 4;
const ERROR_SCALE: u32 = 1;
const ERROR_GAP: u32 = 40;
const GLYPH: u32 = 8;

/// Encode an RGB frame as a baseline JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    encode_rgb(frame.pixels(), frame.width, frame.height, quality)
}

fn encode_rgb(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if !(1..=100).contains(&quality) {
        return Err(EncodeError::InvalidQuality(quality));
    }
    let mut out = Vec::with_capacity(pixels.len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(pixels, width, height, ExtendedColorType::Rgb8)
        .map_err(EncodeError::Encode)?;
    Ok(out)
}

/// Decode JPEG bytes (as delivered by HTTP cameras) into an RGB frame.
pub fn decode_jpeg(bytes: &[u8]) -> Result<Frame, EncodeError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(EncodeError::Decode)?;
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::from_rgb(width, height, rgb.into_raw())
}

pub fn to_base64(jpeg: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(jpeg)
}

/// Synthesize the 640x480 "No Signal" placeholder.
///
/// The last recorded error, when present, is drawn as a smaller secondary
/// caption below the main one, truncated to fit the width.
pub fn no_signal_placeholder(last_error: Option<&str>) -> Result<Vec<u8>, EncodeError> {
    let mut canvas = RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, BACKGROUND);

    let caption_h = GLYPH * CAPTION_SCALE;
    let caption_y = (PLACEHOLDER_HEIGHT - caption_h) / 2;
    draw_centered(&mut canvas, PLACEHOLDER_CAPTION, caption_y, CAPTION_SCALE, CAPTION_COLOR);

    if let Some(err) = last_error.map(str::trim).filter(|e| !e.is_empty()) {
        let max_chars = (PLACEHOLDER_WIDTH / (GLYPH * ERROR_SCALE)) as usize - 2;
        let text = truncate_chars(err, max_chars);
        let error_y = caption_y + caption_h + ERROR_GAP;
        draw_centered(&mut canvas, &text, error_y, ERROR_SCALE, ERROR_COLOR);
    }

    encode_rgb(
        canvas.as_raw(),
        PLACEHOLDER_WIDTH,
        PLACEHOLDER_HEIGHT,
        DEFAULT_JPEG_QUALITY,
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn draw_centered(canvas: &mut RgbImage, text: &str, top: u32, scale: u32, color: Rgb<u8>) {
    let advance = GLYPH * scale;
    let width = advance * text.chars().count() as u32;
    let left = canvas.width().saturating_sub(width) / 2;
    for (i, ch) in text.chars().enumerate() {
        draw_glyph(canvas, ch, left + i as u32 * advance, top, scale, color);
    }
}

fn draw_glyph(canvas: &mut RgbImage, ch: char, left: u32, top: u32, scale: u32, color: Rgb<u8>) {
    let rows = BASIC_FONTS
        .get(ch)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0u8; 8]);
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH {
            // bit 0 is the leftmost pixel
            if bits & (1 << col) == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let x = left + col * scale + dx;
                    let y = top + row as u32 * scale + dy;
                    if x < canvas.width() && y < canvas.height() {
                        canvas.put_pixel(x, y, color);
                    }
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
