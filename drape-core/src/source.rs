/// Image references for decal layers
///
/// Layers may point at a remote URL or carry the image inline as a `data:`
/// URI. Both are normalized into one [`ImageSource`] whose [`TextureKey`]
/// identifies the texture across render passes.
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use nom::{
    bytes::complete::{tag_no_case, take_till},
    character::complete::char,
    multi::many0,
    sequence::preceded,
    IResult,
};

use crate::error::SourceError;

/// Identity of a loaded texture: the normalized image reference.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureKey(Arc<str>);

impl TextureKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 48;
        match self.0.char_indices().nth(SHOWN) {
            Some((cut, _)) => write!(f, "{}… ({} bytes)", &self.0[..cut], self.0.len()),
            None => f.write_str(&self.0),
        }
    }
}

impl fmt::Debug for TextureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextureKey({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Url,
    Inline {
        mime: String,
        base64: bool,
        payload_start: usize,
    },
    /// A reference that can never load; it fails in the loader like any
    /// other bad image instead of rejecting the whole design.
    Invalid(SourceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    key: TextureKey,
    kind: SourceKind,
}

impl ImageSource {
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SourceError::Empty);
        }

        if !input.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("data:")) {
            return Ok(Self {
                key: TextureKey(Arc::from(input)),
                kind: SourceKind::Url,
            });
        }

        let (mime, params, payload) = data_uri(input)
            .map(|(_, parts)| parts)
            .map_err(|_| SourceError::MalformedDataUri)?;

        let mime = match mime.trim() {
            "" => "text/plain".to_string(),
            mime => mime.to_ascii_lowercase(),
        };
        let base64 = params
            .last()
            .is_some_and(|p| p.trim().eq_ignore_ascii_case("base64"));

        let payload: String = if base64 {
            payload.chars().filter(|c| !c.is_ascii_whitespace()).collect()
        } else {
            payload.to_string()
        };

        let header = if base64 {
            format!("data:{mime};base64,")
        } else {
            format!("data:{mime},")
        };
        let payload_start = header.len();
        let normalized = header + &payload;

        let source = Self {
            key: TextureKey(Arc::from(normalized)),
            kind: SourceKind::Inline {
                mime,
                base64,
                payload_start,
            },
        };

        // Reject payloads that can never decode before anything is queued
        source.inline_bytes().transpose()?;
        Ok(source)
    }

    /// Keep an unusable reference so its layer can report the failure.
    pub fn invalid(reference: &str, error: SourceError) -> Self {
        Self {
            key: TextureKey(Arc::from(reference.trim())),
            kind: SourceKind::Invalid(error),
        }
    }

    pub fn key(&self) -> &TextureKey {
        &self.key
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.kind, SourceKind::Inline { .. })
    }

    /// The URL to fetch, for remote sources.
    pub fn url(&self) -> Option<&str> {
        match self.kind {
            SourceKind::Url => Some(self.key.as_str()),
            SourceKind::Inline { .. } | SourceKind::Invalid(_) => None,
        }
    }

    /// Decoded bytes of an inline image; `None` for remote sources. Invalid
    /// sources yield their error so no fetch is ever attempted for them.
    pub fn inline_bytes(&self) -> Option<Result<Vec<u8>, SourceError>> {
        let (base64, payload_start) = match &self.kind {
            SourceKind::Url => return None,
            SourceKind::Invalid(err) => return Some(Err(err.clone())),
            SourceKind::Inline {
                base64,
                payload_start,
                ..
            } => (*base64, *payload_start),
        };

        let payload = &self.key.as_str()[payload_start..];
        Some(if base64 {
            base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map_err(|_| SourceError::InvalidBase64)
        } else {
            Ok(percent_decode(payload))
        })
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

/// `data:<mime>[;param]*,<payload>`
fn data_uri(input: &str) -> IResult<&str, (&str, Vec<&str>, &str)> {
    let (input, _) = tag_no_case("data:")(input)?;
    let (input, mime) = take_till(|c| c == ';' || c == ',')(input)?;
    let (input, params) = many0(preceded(char(';'), take_till(|c| c == ';' || c == ',')))(input)?;
    let (payload, _) = char(',')(input)?;
    Ok(("", (mime, params, payload)))
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}
