//! Codec registry for workbook payloads.
//!
//! # Identity rules
//! Containers never declare which codec compressed a payload.  The only
//! signal is the first byte: `0x78` is the zlib CMF byte for a 32 KiB window,
//! which is what every observed payload carries.  Everything else is probed
//! (see [`fallback`]).
//!
//! # Output limit
//! Every `decompress` call takes a byte limit.  A codec that would produce
//! more than `limit` bytes fails with [`CodecError::OutputLimit`] instead of
//! allocating without bound.

use std::io::{self, Read, Write};
use thiserror::Error;

pub mod fallback;

pub use fallback::{CodecOptions, DecodedPayload, Decompressor};

// ── Magic bytes ─────────────────────────────────────────────────────────────

/// zlib CMF byte (deflate, 32 KiB window).
pub const ZLIB_MAGIC: u8 = 0x78;
/// gzip member header (RFC 1952 §2.3.1).
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// ── CodecId enum ─────────────────────────────────────────────────────────────

/// Runtime codec discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Zlib,
    RawDeflate,
    Gzip,
    Brotli,
}

impl CodecId {
    /// Human-readable name (for diagnostics only).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Zlib       => "zlib",
            CodecId::RawDeflate => "raw-deflate",
            CodecId::Gzip       => "gzip",
            CodecId::Brotli     => "brotli",
        }
    }

    /// `true` when `data` starts with this codec's magic bytes.
    /// Raw deflate and brotli have no magic and always return `false`.
    pub fn sniff(self, data: &[u8]) -> bool {
        match self {
            CodecId::Zlib => data.first() == Some(&ZLIB_MAGIC),
            CodecId::Gzip => data.starts_with(&GZIP_MAGIC),
            CodecId::RawDeflate | CodecId::Brotli => false,
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Decompressed output exceeds the {0} byte limit")]
    OutputLimit(usize),
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError>;
}

/// Drain `reader` into a Vec, failing once more than `limit` bytes appear.
fn read_limited<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;
    if out.len() > limit {
        return Err(CodecError::OutputLimit(limit));
    }
    Ok(out)
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct ZlibCodec;
impl Codec for ZlibCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zlib }
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        let level = flate2::Compression::new(level.min(9));
        let mut w = flate2::write::ZlibEncoder::new(Vec::new(), level);
        w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        w.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
        read_limited(flate2::read::ZlibDecoder::new(data), limit)
    }
}

pub struct RawDeflateCodec;
impl Codec for RawDeflateCodec {
    fn codec_id(&self) -> CodecId { CodecId::RawDeflate }
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        let level = flate2::Compression::new(level.min(9));
        let mut w = flate2::write::DeflateEncoder::new(Vec::new(), level);
        w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        w.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
        read_limited(flate2::read::DeflateDecoder::new(data), limit)
    }
}

pub struct GzipCodec;
impl Codec for GzipCodec {
    fn codec_id(&self) -> CodecId { CodecId::Gzip }
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        let level = flate2::Compression::new(level.min(9));
        let mut w = flate2::write::GzEncoder::new(Vec::new(), level);
        w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        w.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
        read_limited(flate2::read::GzDecoder::new(data), limit)
    }
}

pub struct BrotliCodec;
impl Codec for BrotliCodec {
    fn codec_id(&self) -> CodecId { CodecId::Brotli }
    fn compress(&self, data: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        let quality = level.min(11);
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, quality, 22);
            w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
        read_limited(brotli::Decompressor::new(data, 4096), limit)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a CodecId to a built-in codec.
pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Zlib       => Box::new(ZlibCodec),
        CodecId::RawDeflate => Box::new(RawDeflateCodec),
        CodecId::Gzip       => Box::new(GzipCodec),
        CodecId::Brotli     => Box::new(BrotliCodec),
    }
}
