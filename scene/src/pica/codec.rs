//! Texture pixel formats and the codec boundary.
//!
//! Raw texture payloads are stored in the GPU's native layout: 8x8 tiles in
//! Morton order, rows bottom-up, multi-byte pixels in reversed channel order.
//! [`TextureCodec`] converts between that layout and flat RGBA8, top-down.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported texture format: {0:?}")]
    UnsupportedFormat(TextureFormat),

    #[error("Texture buffer too small: expected {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Texture dimensions {width}x{height} are not multiples of 8")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Unknown texture format value: {0}")]
    UnknownFormat(u32),
}

/// Pixel formats, numbered as stored in the texture TYPE register.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    Rgba8 = 0,
    Rgb8 = 1,
    Rgba5551 = 2,
    Rgb565 = 3,
    Rgba4 = 4,
    La8 = 5,
    HiLo8 = 6,
    L8 = 7,
    A8 = 8,
    La4 = 9,
    L4 = 10,
    A4 = 11,
    Etc1 = 12,
    Etc1A4 = 13,
}

impl TryFrom<u32> for TextureFormat {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Rgba8,
            1 => Self::Rgb8,
            2 => Self::Rgba5551,
            3 => Self::Rgb565,
            4 => Self::Rgba4,
            5 => Self::La8,
            6 => Self::HiLo8,
            7 => Self::L8,
            8 => Self::A8,
            9 => Self::La4,
            10 => Self::L4,
            11 => Self::A4,
            12 => Self::Etc1,
            13 => Self::Etc1A4,
            _ => return Err(CodecError::UnknownFormat(value)),
        })
    }
}

pub fn bits_per_pixel(format: TextureFormat) -> usize {
    match format {
        TextureFormat::Rgba8 => 32,
        TextureFormat::Rgb8 => 24,
        TextureFormat::Rgba5551
        | TextureFormat::Rgb565
        | TextureFormat::Rgba4
        | TextureFormat::La8
        | TextureFormat::HiLo8 => 16,
        TextureFormat::L8 | TextureFormat::A8 | TextureFormat::La4 | TextureFormat::Etc1A4 => 8,
        TextureFormat::L4 | TextureFormat::A4 | TextureFormat::Etc1 => 4,
    }
}

/// Size in bytes of one image level.
pub fn buffer_length(width: u32, height: u32, format: TextureFormat) -> usize {
    width as usize * height as usize * bits_per_pixel(format) / 8
}

/// Size in bytes of a full mip chain. Levels never shrink below one 8x8 tile.
pub fn mip_chain_length(width: u32, height: u32, mip_count: u8, format: TextureFormat) -> usize {
    (0..mip_count.max(1) as u32)
        .map(|level| {
            let width = width.checked_shr(level).unwrap_or(0).max(8);
            let height = height.checked_shr(level).unwrap_or(0).max(8);
            buffer_length(width, height, format)
        })
        .sum()
}

/// Converts between native texture payloads and flat RGBA8.
///
/// Implementations are trusted: they are handed buffers already checked
/// against [`buffer_length`].
pub trait TextureCodec {
    fn decode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Vec<u8>, CodecError>;

    fn encode(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Built-in codec for the byte-aligned uncompressed formats.
///
/// Block-compressed and 4-bit formats report [`CodecError::UnsupportedFormat`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PicaCodec;

/// Morton order of the 64 pixels in an 8x8 tile, as `y * 8 + x`.
const SWIZZLE_LUT: [u8; 64] = [
    0, 1, 8, 9, 2, 3, 10, 11, 16, 17, 24, 25, 18, 19, 26, 27, 4, 5, 12, 13, 6, 7, 14, 15, 20, 21,
    28, 29, 22, 23, 30, 31, 32, 33, 40, 41, 34, 35, 42, 43, 48, 49, 56, 57, 50, 51, 58, 59, 36,
    37, 44, 45, 38, 39, 46, 47, 52, 53, 60, 61, 54, 55, 62, 63,
];

impl PicaCodec {
    fn check(width: u32, height: u32, format: TextureFormat) -> Result<usize, CodecError> {
        if bits_per_pixel(format) % 8 != 0 || matches!(format, TextureFormat::Etc1A4) {
            return Err(CodecError::UnsupportedFormat(format));
        }
        if width % 8 != 0 || height % 8 != 0 {
            return Err(CodecError::InvalidDimensions { width, height });
        }
        Ok(bits_per_pixel(format) / 8)
    }

    /// Visits every pixel in storage order with its offset into the flat
    /// top-down RGBA buffer.
    fn for_each_tiled(width: u32, height: u32, mut f: impl FnMut(usize)) {
        let (w, h) = (width as usize, height as usize);
        for ty in (0..h).step_by(8) {
            for tx in (0..w).step_by(8) {
                for &morton in &SWIZZLE_LUT {
                    let x = (morton & 7) as usize;
                    let y = (morton >> 3) as usize;
                    f((tx + x + (h - 1 - (ty + y)) * w) * 4);
                }
            }
        }
    }
}

impl TextureCodec for PicaCodec {
    fn decode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Vec<u8>, CodecError> {
        let bpp = Self::check(width, height, format)?;
        let expected = buffer_length(width, height, format);
        if data.len() < expected {
            return Err(CodecError::BufferTooSmall {
                expected,
                actual: data.len(),
            });
        }

        let mut output = vec![0u8; width as usize * height as usize * 4];
        let mut pixels = data.chunks_exact(bpp);
        Self::for_each_tiled(width, height, |offset| {
            if let Some(pixel) = pixels.next() {
                output[offset..offset + 4].copy_from_slice(&decode_pixel(format, pixel));
            }
        });
        Ok(output)
    }

    fn encode(
        &self,
        rgba: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Vec<u8>, CodecError> {
        let bpp = Self::check(width, height, format)?;
        let expected = width as usize * height as usize * 4;
        if rgba.len() < expected {
            return Err(CodecError::BufferTooSmall {
                expected,
                actual: rgba.len(),
            });
        }

        let mut output = Vec::with_capacity(buffer_length(width, height, format));
        Self::for_each_tiled(width, height, |offset| {
            let pixel = [rgba[offset], rgba[offset + 1], rgba[offset + 2], rgba[offset + 3]];
            output.extend_from_slice(&encode_pixel(format, pixel)[..bpp]);
        });
        Ok(output)
    }
}

// ============================================================================
// Pixel conversion
// ============================================================================

fn expand5(v: u16) -> u8 {
    let v = (v & 0x1F) as u8;
    (v << 3) | (v >> 2)
}

fn expand6(v: u16) -> u8 {
    let v = (v & 0x3F) as u8;
    (v << 2) | (v >> 4)
}

fn expand4(v: u16) -> u8 {
    (v & 0xF) as u8 * 0x11
}

fn decode_pixel(format: TextureFormat, p: &[u8]) -> [u8; 4] {
    let word = || u16::from_le_bytes([p[0], p[1]]);
    match format {
        TextureFormat::Rgba8 => [p[3], p[2], p[1], p[0]],
        TextureFormat::Rgb8 => [p[2], p[1], p[0], 0xFF],
        TextureFormat::Rgba5551 => {
            let v = word();
            let a = if v & 1 != 0 { 0xFF } else { 0 };
            [expand5(v >> 11), expand5(v >> 6), expand5(v >> 1), a]
        }
        TextureFormat::Rgb565 => {
            let v = word();
            [expand5(v >> 11), expand6(v >> 5), expand5(v), 0xFF]
        }
        TextureFormat::Rgba4 => {
            let v = word();
            [expand4(v >> 12), expand4(v >> 8), expand4(v >> 4), expand4(v)]
        }
        TextureFormat::La8 => [p[1], p[1], p[1], p[0]],
        TextureFormat::HiLo8 => [p[1], p[0], 0, 0xFF],
        TextureFormat::L8 => [p[0], p[0], p[0], 0xFF],
        TextureFormat::A8 => [0xFF, 0xFF, 0xFF, p[0]],
        TextureFormat::La4 => {
            let l = expand4(p[0] as u16 >> 4);
            [l, l, l, expand4(p[0] as u16)]
        }
        // Rejected by `PicaCodec::check`.
        TextureFormat::L4 | TextureFormat::A4 | TextureFormat::Etc1 | TextureFormat::Etc1A4 => {
            [0; 4]
        }
    }
}

/// Encodes one pixel; only the first `bits_per_pixel / 8` bytes are meaningful.
fn encode_pixel(format: TextureFormat, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let pack = |v: u16| {
        let [lo, hi] = v.to_le_bytes();
        [lo, hi, 0, 0]
    };
    let (r16, g16, b16, a16) = (r as u16, g as u16, b as u16, a as u16);
    let luma = ((r16 * 77 + g16 * 150 + b16 * 29) >> 8) as u8;
    match format {
        TextureFormat::Rgba8 => [a, b, g, r],
        TextureFormat::Rgb8 => [b, g, r, 0],
        TextureFormat::Rgba5551 => {
            pack((r16 >> 3) << 11 | (g16 >> 3) << 6 | (b16 >> 3) << 1 | (a16 >> 7))
        }
        TextureFormat::Rgb565 => pack((r16 >> 3) << 11 | (g16 >> 2) << 5 | (b16 >> 3)),
        TextureFormat::Rgba4 => pack((r16 >> 4) << 12 | (g16 >> 4) << 8 | (b16 >> 4) << 4 | (a16 >> 4)),
        TextureFormat::La8 => [a, luma, 0, 0],
        TextureFormat::HiLo8 => [g, r, 0, 0],
        TextureFormat::L8 => [luma, 0, 0, 0],
        TextureFormat::A8 => [a, 0, 0, 0],
        TextureFormat::La4 => [(luma >> 4) << 4 | (a >> 4), 0, 0, 0],
        TextureFormat::L4 | TextureFormat::A4 | TextureFormat::Etc1 | TextureFormat::Etc1A4 => {
            [0; 4]
        }
    }
}
