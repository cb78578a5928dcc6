//! Pluggable one-shot compression codecs.
//!
//! The original tool enumerates zlib/lz4/lzo/snappy/zstd/lzf/lz4hc as "any
//! subset that links at build time." This engine ships the subset with
//! well-maintained, pure-build (no system `.so` required) Rust crates:
//! zlib, lz4, zstd, and snappy. lzo/lzf/lz4hc are dropped — codec choice and
//! tuning are explicitly out of scope for this engine, and nothing in the
//! measurement tests depends on a specific codec being present.

use shared::containers::FixedVec;
use std::io::Write;

/// A one-shot compressor: pure given its inputs, writes into a
/// caller-provided buffer, and returns `0` (never an error type) on
/// failure — including when `out` is too small. Callers size `out` using
/// [`Codec::max_compressed_size`].
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;
    fn max_compressed_size(&self, input_len: usize) -> usize;
    fn compress(&self, input: &[u8], out: &mut [u8]) -> usize;
}

pub struct ZlibCodec;
impl Codec for ZlibCodec {
    fn name(&self) -> &'static str {
        "zlib"
    }
    fn max_compressed_size(&self, input_len: usize) -> usize {
        // DEFLATE worst case per zlib's documented bound.
        input_len + (input_len / 1000) + 64
    }
    fn compress(&self, input: &[u8], out: &mut [u8]) -> usize {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(out.len()), Compression::default());
        if encoder.write_all(input).is_err() {
            return 0;
        }
        let Ok(compressed) = encoder.finish() else {
            return 0;
        };
        if compressed.len() > out.len() {
            return 0;
        }
        out[..compressed.len()].copy_from_slice(&compressed);
        compressed.len()
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }
    fn max_compressed_size(&self, input_len: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(input_len)
    }
    fn compress(&self, input: &[u8], out: &mut [u8]) -> usize {
        lz4_flex::block::compress_into(input, out).unwrap_or(0)
    }
}

pub struct ZstdCodec {
    pub level: i32,
}
impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}
impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }
    fn max_compressed_size(&self, input_len: usize) -> usize {
        zstd::zstd_safe::compress_bound(input_len)
    }
    fn compress(&self, input: &[u8], out: &mut [u8]) -> usize {
        zstd::bulk::compress_to_buffer(input, out, self.level).unwrap_or(0)
    }
}

pub struct SnappyCodec;
impl Codec for SnappyCodec {
    fn name(&self) -> &'static str {
        "snappy"
    }
    fn max_compressed_size(&self, input_len: usize) -> usize {
        snap::raw::max_compress_len(input_len)
    }
    fn compress(&self, input: &[u8], out: &mut [u8]) -> usize {
        let mut encoder = snap::raw::Encoder::new();
        encoder.compress(input, out).unwrap_or(0)
    }
}

pub const MAX_CODECS: usize = 8;

/// Holds the codecs enabled for this run, built once from config at
/// bootstrap.
pub struct CodecRegistry {
    codecs: FixedVec<Box<dyn Codec>, MAX_CODECS>,
}

impl CodecRegistry {
    pub fn from_names(names: &[String]) -> Self {
        let mut codecs: FixedVec<Box<dyn Codec>, MAX_CODECS> = FixedVec::new();
        for name in names {
            let codec: Option<Box<dyn Codec>> = match name.as_str() {
                "zlib" => Some(Box::new(ZlibCodec)),
                "lz4" => Some(Box::new(Lz4Codec)),
                "zstd" => Some(Box::new(ZstdCodec::default())),
                "snappy" => Some(Box::new(SnappyCodec)),
                other => {
                    log::warn!("ignoring unrecognized codec `{other}`");
                    None
                }
            };
            if let Some(codec) = codec {
                if codecs.push(codec).is_err() {
                    log::warn!("codec registry full, dropping `{name}`");
                    break;
                }
            }
        }
        Self { codecs }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Codec> {
        self.codecs
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Codec> {
        self.codecs.iter().map(|c| c.as_ref())
    }
}

/// A compression ratio, as `compressed_len as f64 / uncompressed_len as
/// f64`. The zero-length-input case is special-cased to `1.0` (nothing to
/// compress is not a failure); a codec returning `0` for nonzero input is a
/// genuine failure and should be reported as such by the caller rather than
/// folded into this ratio, per the original's per-test handling.
pub fn compression_ratio(uncompressed_len: usize, compressed_len: usize) -> f64 {
    if uncompressed_len == 0 {
        return 1.0;
    }
    compressed_len as f64 / uncompressed_len as f64
}

/// Bins a compression ratio into one of ten 10%-wide classes, `0..=9`,
/// clamped at the edges. Used by the access-compression tests' "Compression
/// Class" column.
pub fn compression_class(ratio: f64) -> u8 {
    let scaled = (ratio * 10.0).floor();
    scaled.clamp(0.0, 9.0) as u8
}

/// Renders a compression class bin as the `"N0-M0%"` label scenario S1
/// expects in a report cell (e.g. `0-10%`).
pub fn compression_class_label(ratio: f64) -> String {
    let bin = compression_class(ratio);
    format!("{}-{}%", bin as u32 * 10, bin as u32 * 10 + 10)
}
