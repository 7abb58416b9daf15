//! Synthetic container writer for fixtures and benchmarks.
//!
//! ```
//! use ejs_decoder::container::{frame, ContainerBuilder};
//!
//! let text = ContainerBuilder::new()
//!     .metadata(&serde_json::json!({"bodyData": {"initialTitle": "Plan"}}))
//!     .workbook_text("HELLO WORLD")?
//!     .build();
//! let framed = frame(&text)?;
//! assert_eq!(framed.title(), Some("Plan"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Value};

use crate::codec::{get_codec, CodecError, CodecId};

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-').remove(b'_').remove(b'.').remove(b'!')
    .remove(b'~').remove(b'*').remove(b'\'').remove(b'(').remove(b')');

/// Percent-encode `s` the way the container producer does.
pub fn percent_encode_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    head:          Option<String>,
    metadata:      Option<String>,
    text:          Vec<String>,
    workbook:      Option<String>,
    related_sheet: Option<String>,
    max_row:       u64,
    max_col:       u64,
}

fn section(out: &mut Vec<String>, tag: &str, payload: &str) {
    out.push(tag.to_owned());
    out.push(payload.encode_utf16().count().to_string());
    out.push(payload.to_owned());
}

fn pack(data: &[u8], codec: CodecId) -> Result<String, CodecError> {
    Ok(STANDARD.encode(get_codec(codec).compress(data, 6)?))
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(mut self, head: &str) -> Self {
        self.head = Some(head.to_owned());
        self
    }

    pub fn metadata(mut self, doc: &Value) -> Self {
        self.metadata = Some(doc.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text.push(text.to_owned());
        self
    }

    pub fn dimensions(mut self, max_row: u64, max_col: u64) -> Self {
        self.max_row = max_row;
        self.max_col = max_col;
        self
    }

    /// Workbook payload as already-encoded base64.
    pub fn workbook_base64(mut self, b64: &str) -> Self {
        self.workbook = Some(b64.to_owned());
        self
    }

    /// zlib-compress `text` and use it as the workbook payload.
    pub fn workbook_text(self, text: &str) -> Result<Self, CodecError> {
        self.workbook_bytes(text.as_bytes(), CodecId::Zlib)
    }

    pub fn workbook_bytes(mut self, data: &[u8], codec: CodecId) -> Result<Self, CodecError> {
        self.workbook = Some(pack(data, codec)?);
        Ok(self)
    }

    pub fn related_sheet_bytes(mut self, data: &[u8], codec: CodecId) -> Result<Self, CodecError> {
        self.related_sheet = Some(pack(data, codec)?);
        Ok(self)
    }

    /// The envelope line alone, percent-encoded.  `workbook` is always the
    /// first key so the line carries the canonical prefix.
    pub fn envelope_line(&self) -> Option<String> {
        let workbook = self.workbook.as_ref()?;
        let mut doc = format!("{{\"workbook\":{}", Value::String(workbook.clone()));
        if let Some(related) = &self.related_sheet {
            doc.push_str(&format!(",\"related_sheet\":{}", Value::String(related.clone())));
        }
        let dims = json!({
            "max_row": self.max_row,
            "max_col": self.max_col,
            "end_row_index": self.max_row.saturating_sub(1),
            "end_col_index": self.max_col.saturating_sub(1),
        });
        if let Value::Object(fields) = dims {
            for (k, v) in fields {
                doc.push_str(&format!(",{}:{v}", Value::String(k)));
            }
        }
        doc.push('}');
        Some(percent_encode_component(&doc))
    }

    pub fn build(&self) -> String {
        let mut out = Vec::new();
        if let Some(head) = &self.head {
            section(&mut out, "head", head);
        }
        if let Some(meta) = &self.metadata {
            section(&mut out, "json", meta);
        }
        for t in &self.text {
            section(&mut out, "text", t);
        }
        if let Some(env) = self.envelope_line() {
            out.push(env.encode_utf16().count().to_string());
            out.push(env);
        }
        let mut text = out.join("\n");
        text.push('\n');
        text
    }
}
