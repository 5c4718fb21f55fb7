//! Script source text and encoding detection.

use crate::error::{EngineError, EngineResult};
use std::path::{Path, PathBuf};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];

/// Text encoding a script file was stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl SourceEncoding {
    /// Encode `text` back into this encoding, without a byte-order mark.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            SourceEncoding::Utf8 => text.as_bytes().to_vec(),
            SourceEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            SourceEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }
}

/// Script text plus where it came from.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    text: String,
    path: Option<PathBuf>,
    encoding: Option<SourceEncoding>,
}

impl ScriptSource {
    /// In-memory source with no backing file.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            path: None,
            encoding: None,
        }
    }

    /// Decode raw file bytes, honouring a leading byte-order mark.
    pub fn from_bytes(bytes: &[u8], path: Option<PathBuf>) -> EngineResult<Self> {
        let origin = origin_of(path.as_deref());
        let (encoding, decoded) = if let Some(rest) = bytes.strip_prefix(&UTF8_BOM) {
            (Some(SourceEncoding::Utf8), decode_utf8(rest))
        } else if let Some(rest) = bytes.strip_prefix(&UTF16_LE_BOM) {
            (
                Some(SourceEncoding::Utf16Le),
                decode_utf16(rest, u16::from_le_bytes),
            )
        } else if let Some(rest) = bytes.strip_prefix(&UTF16_BE_BOM) {
            (
                Some(SourceEncoding::Utf16Be),
                decode_utf16(rest, u16::from_be_bytes),
            )
        } else {
            (None, decode_utf8(bytes))
        };

        let text = decoded.map_err(|reason| EngineError::Encoding { origin, reason })?;
        Ok(Self {
            text,
            path,
            encoding,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Resolved path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Encoding announced by the file's byte-order mark; `None` when the
    /// source is in-memory or the file carries no mark.
    pub fn detect_encoding(&self) -> Option<SourceEncoding> {
        self.encoding
    }

    /// Human-readable origin used in diagnostics.
    pub fn origin(&self) -> String {
        origin_of(self.path.as_deref())
    }
}

fn origin_of(path: Option<&Path>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "<inline>".to_string(),
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String, String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, String> {
    if bytes.len() % 2 != 0 {
        return Err(format!("odd byte count {} for UTF-16 text", bytes.len()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| e.to_string())
}
