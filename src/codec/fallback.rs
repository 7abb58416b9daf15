//! Payload decompressor: base64 → magic sniff → ordered fallback chain.
//!
//! The chain is fixed: the primary codec (zlib) is tried first only when the
//! payload starts with its magic byte, then raw deflate, gzip and brotli in
//! that order.  The first attempt that yields non-empty output within the
//! byte limit wins.  When every attempt fails the raw bytes are passed
//! through unchanged, so extraction can still run over them.

use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

use super::{get_codec, Codec, CodecError, CodecId};
use crate::budget::Deadline;

/// Default cap on decompressed payload size: 256 MiB.
pub const DEFAULT_MAX_OUTPUT: usize = 256 * 1024 * 1024;

const LOG_TARGET: &str = "ejs::codec";

/// Standard alphabet, padding optional.
const PAYLOAD_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ── CodecOptions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CodecOptions {
    /// Upper bound on the bytes any single codec attempt may produce.
    pub max_output:  usize,
    /// Wall-clock budget for the whole fallback chain of one payload.
    pub time_budget: Option<Duration>,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            max_output:  DEFAULT_MAX_OUTPUT,
            time_budget: None,
        }
    }
}

// ── DecodedPayload ────────────────────────────────────────────────────────────

/// Result of base64-decoding and decompressing one envelope field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Decompressed bytes, or the raw base64-decoded bytes on pass-through.
    pub bytes:        Vec<u8>,
    /// The codec that succeeded; `None` when the raw bytes were passed through.
    pub codec:        Option<CodecId>,
    /// Size of the base64-decoded (still compressed) buffer.
    pub encoded_size: usize,
    /// First bytes of the compressed buffer, for diagnostics.
    pub head:         Vec<u8>,
}

impl DecodedPayload {
    pub fn is_passthrough(&self) -> bool {
        self.codec.is_none()
    }

    pub fn head_hex(&self) -> String {
        hex::encode(&self.head)
    }
}

// ── Decompressor ──────────────────────────────────────────────────────────────

pub struct Decompressor {
    primary:   Box<dyn Codec>,
    fallbacks: Vec<Box<dyn Codec>>,
    options:   CodecOptions,
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new(CodecOptions::default())
    }
}

impl Decompressor {
    /// The built-in chain: zlib (sniffed), then raw deflate, gzip, brotli.
    pub fn new(options: CodecOptions) -> Self {
        Self::with_chain(
            get_codec(CodecId::Zlib),
            vec![
                get_codec(CodecId::RawDeflate),
                get_codec(CodecId::Gzip),
                get_codec(CodecId::Brotli),
            ],
            options,
        )
    }

    /// Build a decompressor from an explicit chain.  `primary` is only tried
    /// when the payload starts with its magic bytes.
    pub fn with_chain(
        primary:   Box<dyn Codec>,
        fallbacks: Vec<Box<dyn Codec>>,
        options:   CodecOptions,
    ) -> Self {
        Self { primary, fallbacks, options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Base64-decode `payload` then run the fallback chain.
    ///
    /// Only base64 failure is an error; decompression failures degrade to a
    /// pass-through [`DecodedPayload`].
    pub fn decompress(&self, payload: &str) -> Result<DecodedPayload, CodecError> {
        let bytes = decode_base64(payload)?;
        log::debug!(
            target: LOG_TARGET,
            "base64 decoded {} chars -> {} bytes",
            payload.len(), bytes.len(),
        );
        Ok(self.decompress_bytes(&bytes))
    }

    /// Run the fallback chain over already-decoded bytes.  Never fails.
    pub fn decompress_bytes(&self, bytes: &[u8]) -> DecodedPayload {
        let head = bytes[..bytes.len().min(4)].to_vec();
        log::debug!(target: LOG_TARGET, "payload head {}", hex::encode(&head));

        let deadline = Deadline::after(self.options.time_budget);
        let sniffed  = self.primary.codec_id().sniff(bytes);

        let attempts = sniffed
            .then_some(&self.primary)
            .into_iter()
            .chain(self.fallbacks.iter());

        for codec in attempts {
            if deadline.expired() {
                log::warn!(
                    target: LOG_TARGET,
                    "time budget exhausted before trying {}; passing {} raw bytes through",
                    codec.codec_id(), bytes.len(),
                );
                break;
            }
            match self.attempt(&**codec, bytes) {
                Some(out) => {
                    return DecodedPayload {
                        bytes:        out,
                        codec:        Some(codec.codec_id()),
                        encoded_size: bytes.len(),
                        head,
                    };
                }
                None => continue,
            }
        }

        log::info!(
            target: LOG_TARGET,
            "no codec accepted the payload; using {} raw bytes",
            bytes.len(),
        );
        DecodedPayload {
            bytes:        bytes.to_vec(),
            codec:        None,
            encoded_size: bytes.len(),
            head,
        }
    }

    fn attempt(&self, codec: &dyn Codec, bytes: &[u8]) -> Option<Vec<u8>> {
        let id = codec.codec_id();
        match codec.decompress(bytes, self.options.max_output) {
            Ok(out) if !out.is_empty() => {
                log::info!(
                    target: LOG_TARGET,
                    "{id} succeeded: {} -> {} bytes",
                    bytes.len(), out.len(),
                );
                Some(out)
            }
            Ok(_) => {
                log::debug!(target: LOG_TARGET, "{id} produced no output");
                None
            }
            Err(e) => {
                log::debug!(target: LOG_TARGET, "{id} failed: {e}");
                None
            }
        }
    }
}

/// Decode a base64 payload.
///
/// ASCII whitespace is ignored and URL-safe characters are accepted, since
/// payloads are sometimes line-wrapped or re-encoded by the transport.  A
/// non-empty input that decodes to nothing is rejected.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, CodecError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    let cleaned: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let bytes = PAYLOAD_B64
        .decode(cleaned.as_bytes())
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))?;
    if bytes.is_empty() {
        return Err(CodecError::InvalidBase64(format!(
            "{} input chars decoded to zero bytes",
            payload.len()
        )));
    }
    Ok(bytes)
}
