//! Byte-to-text decoding with an ordered codec fallback list.

use encoding_rs::Encoding;
use tracing::debug;

use crate::error::PipelineError;

/// Decode `bytes` with the first codec in `codecs` that accepts them without errors.
///
/// A leading UTF-8 BOM is stripped. Replacement characters are never accepted:
/// a codec that hits a malformed sequence is skipped.
pub fn decode_text(bytes: &[u8], codecs: &[String]) -> Result<String, PipelineError> {
    for label in codecs {
        let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
            debug!(codec = %label, "unknown codec label, skipping");
            continue;
        };
        let bytes = if encoding == encoding_rs::UTF_8 {
            bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
        } else {
            bytes
        };
        match encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            Some(text) => {
                debug!(codec = encoding.name(), "decoded payload");
                return Ok(text.into_owned());
            }
            None => debug!(codec = encoding.name(), "codec rejected payload"),
        }
    }
    Err(PipelineError::Decode {
        codecs: codecs.join(", "),
    })
}
