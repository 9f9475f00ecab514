//! Core Protocol Types and Domain-Specific Newtypes
//!
//! Validated newtypes and small shared structures used throughout the
//! runtime. All newtypes keep their field private and validate at
//! construction, so an invalid protocol value cannot be built by
//! accident.
//!
//! # Examples
//!
//! ```rust
//! use conduit_mcp::protocol::{ProtocolVersion, Uri};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let uri = Uri::new("file:///notes/today.md")?;
//! assert_eq!(uri.scheme(), Some("file"));
//!
//! let version = ProtocolVersion::current();
//! assert_eq!(version.as_str(), "2025-06-18");
//! # Ok(())
//! # }
//! ```

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use super::errors::{ProtocolError, ProtocolResult};

/// MCP protocol version in `YYYY-MM-DD` form
///
/// Negotiation walks [`ProtocolVersion::SUPPORTED`] newest-first: an
/// exact match echoes the requested version, otherwise the newest
/// supported version not newer than the request is offered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion(String);

impl ProtocolVersion {
    /// Latest protocol version this runtime speaks
    pub const CURRENT: &'static str = "2025-06-18";

    /// Versions this runtime can negotiate, newest first
    pub const SUPPORTED: &'static [&'static str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

    /// Create a protocol version with format validation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidProtocolVersion` if the string is
    /// not `YYYY-MM-DD`.
    pub fn new(version: impl Into<String>) -> ProtocolResult<Self> {
        let version = version.into();
        if Self::is_valid_version(&version) {
            Ok(Self(version))
        } else {
            Err(ProtocolError::InvalidProtocolVersion(version))
        }
    }

    /// The latest supported version; always valid
    pub fn current() -> Self {
        Self(Self::CURRENT.to_string())
    }

    /// Get the version string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this exact version is in the supported set
    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(&self.0.as_str())
    }

    /// Negotiate against a requested version
    ///
    /// Returns the version the server should answer with, or `None` if
    /// no supported version is acceptable (every supported version is
    /// newer than the request).
    pub fn negotiate(requested: &ProtocolVersion) -> Option<ProtocolVersion> {
        if requested.is_supported() {
            return Some(requested.clone());
        }
        // Dates in YYYY-MM-DD order compare lexicographically.
        Self::SUPPORTED
            .iter()
            .find(|candidate| **candidate <= requested.0.as_str())
            .map(|candidate| Self((*candidate).to_string()))
    }

    fn is_valid_version(version: &str) -> bool {
        let bytes = version.as_bytes();
        bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && version
                .bytes()
                .enumerate()
                .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// URI with lightweight validation
///
/// Accepts any scheme-prefixed identifier. Full RFC 3986 parsing is the
/// job of the `url` crate at transport boundaries; inside the protocol a
/// URI only needs a scheme and a body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Uri(String);

impl Uri {
    /// Create a new URI with validation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidUri` for strings without a scheme.
    pub fn new(uri: impl Into<String>) -> ProtocolResult<Self> {
        let uri = uri.into();
        if Self::is_valid_uri(&uri) {
            Ok(Self(uri))
        } else {
            Err(ProtocolError::InvalidUri(uri))
        }
    }

    /// Create a URI without validation, for trusted internal values
    pub fn new_unchecked(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Get the URI string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the scheme (the part before the first `:`)
    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once(':').map(|(scheme, _)| scheme)
    }

    fn is_valid_uri(uri: &str) -> bool {
        !uri.is_empty() && uri.contains(':') && !uri.starts_with(':')
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MIME type of the form `type/subtype`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MimeType(String);

impl MimeType {
    /// Create a new MIME type with validation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidMimeType` if the value is not
    /// `type/subtype`.
    pub fn new(mime_type: impl Into<String>) -> ProtocolResult<Self> {
        let mime_type = mime_type.into();
        match mime_type.split_once('/') {
            Some((main, sub)) if !main.is_empty() && !sub.is_empty() && !sub.contains('/') => {
                Ok(Self(mime_type))
            }
            _ => Err(ProtocolError::InvalidMimeType(mime_type)),
        }
    }

    /// Get the MIME type string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The main type, e.g. `text` in `text/plain`
    pub fn main_type(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base64-encoded binary payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Base64Data(String);

impl Base64Data {
    /// Create base64 data with validation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidBase64Data` if the payload does
    /// not decode.
    pub fn new(data: impl Into<String>) -> ProtocolResult<Self> {
        let data = data.into();
        base64::engine::general_purpose::STANDARD
            .decode(&data)
            .map_err(|_| ProtocolError::InvalidBase64Data)?;
        Ok(Self(data))
    }

    /// Encode raw bytes into base64 data
    pub fn encode(bytes: &[u8]) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Get the base64 string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back into raw bytes
    pub fn decode(&self) -> Vec<u8> {
        // Validated at construction; a failure here would be a logic error.
        base64::engine::general_purpose::STANDARD
            .decode(&self.0)
            .unwrap_or_default()
    }
}

/// Progress correlation token, string- or integer-typed
///
/// Opaque to the runtime; carried verbatim between the request's
/// `_meta.progressToken` and each `notifications/progress` it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// Numeric token
    Number(i64),
    /// String token
    String(String),
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressToken::Number(n) => write!(f, "{n}"),
            ProgressToken::String(s) => write!(f, "{s}"),
        }
    }
}

/// Opaque pagination cursor
///
/// Encodes the start index of the next page as base64 so that clients
/// treat it as an opaque token. Decoding a foreign or corrupted cursor
/// fails with `ProtocolError::InvalidCursor` rather than corrupting the
/// listing stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    /// Encode a start index into an opaque cursor
    pub fn from_index(index: usize) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(index.to_string()))
    }

    /// Decode the start index out of a cursor
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidCursor` if the token was not
    /// produced by [`Cursor::from_index`].
    pub fn to_index(&self) -> ProtocolResult<usize> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.0)
            .map_err(|_| ProtocolError::InvalidCursor(self.0.clone()))?;
        let text =
            String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidCursor(self.0.clone()))?;
        text.parse()
            .map_err(|_| ProtocolError::InvalidCursor(self.0.clone()))
    }

    /// Get the opaque token string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Client identification exchanged during initialization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientInfo {
    /// Name of the client application
    pub name: String,
    /// Version of the client application
    pub version: String,
}

/// Server identification exchanged during initialization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerInfo {
    /// Name of the server application
    pub name: String,
    /// Version of the server application
    pub version: String,
}

/// Multi-modal content block carried by tool results and prompt messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Content {
    /// Plain text content
    #[serde(rename = "text")]
    Text {
        /// The text payload
        text: String,
    },

    /// Binary content with base64 encoded data
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded payload
        data: Base64Data,
        /// MIME type of the payload
        #[serde(rename = "mimeType")]
        mime_type: MimeType,
    },

    /// Embedded resource contents
    #[serde(rename = "resource")]
    Resource {
        /// The embedded resource
        resource: ResourceContents,
    },
}

impl Content {
    /// Create a text content block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image content block from raw bytes
    pub fn image(bytes: &[u8], mime_type: MimeType) -> Self {
        Self::Image {
            data: Base64Data::encode(bytes),
            mime_type,
        }
    }

    /// Create an embedded-resource content block
    pub fn resource(resource: ResourceContents) -> Self {
        Self::Resource { resource }
    }

    /// Extract text if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Contents of a read resource: text or binary, tagged by which of
/// `text` / `blob` is present
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceContents {
    /// URI the contents were read from
    pub uri: Uri,
    /// MIME type of the contents
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,
    /// Textual contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded binary contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<Base64Data>,
}

impl ResourceContents {
    /// Textual resource contents
    pub fn text(uri: Uri, text: impl Into<String>) -> Self {
        Self {
            uri,
            mime_type: None,
            text: Some(text.into()),
            blob: None,
        }
    }

    /// Binary resource contents
    pub fn blob(uri: Uri, bytes: &[u8], mime_type: MimeType) -> Self {
        Self {
            uri,
            mime_type: Some(mime_type),
            text: None,
            blob: Some(Base64Data::encode(bytes)),
        }
    }

    /// Attach a MIME type
    pub fn with_mime_type(mut self, mime_type: MimeType) -> Self {
        self.mime_type = Some(mime_type);
        self
    }
}

/// Key-value metadata attached to a primitive descriptor's `_meta` map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetaEntry {
    /// Metadata key
    pub name: String,
    /// Metadata value
    pub value: Value,
}

impl MetaEntry {
    /// Create a metadata entry
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Collect metadata entries into a `_meta` JSON object, or `None` when empty
pub(crate) fn meta_object(entries: &[MetaEntry]) -> Option<Value> {
    if entries.is_empty() {
        return None;
    }
    let map: serde_json::Map<String, Value> = entries
        .iter()
        .map(|entry| (entry.name.clone(), entry.value.clone()))
        .collect();
    Some(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_version_validation() {
        assert!(ProtocolVersion::new("2024-11-05").is_ok());
        assert!(ProtocolVersion::new("not-a-date").is_err());
        assert!(ProtocolVersion::new("2024-1-05").is_err());
        assert!(ProtocolVersion::current().is_supported());
    }

    #[test]
    fn protocol_version_negotiation() {
        // Exact supported match echoes the request.
        let requested = ProtocolVersion::new("2024-11-05").unwrap();
        assert_eq!(ProtocolVersion::negotiate(&requested), Some(requested));

        // Unknown-but-newer request gets the newest supported version.
        let future = ProtocolVersion::new("2099-01-01").unwrap();
        assert_eq!(
            ProtocolVersion::negotiate(&future).unwrap().as_str(),
            ProtocolVersion::CURRENT
        );

        // A request predating every supported version cannot negotiate.
        let ancient = ProtocolVersion::new("2020-01-01").unwrap();
        assert_eq!(ProtocolVersion::negotiate(&ancient), None);
    }

    #[test]
    fn uri_validation() {
        let uri = Uri::new("file:///tmp/data.txt").unwrap();
        assert_eq!(uri.scheme(), Some("file"));
        assert!(Uri::new("no-scheme-here").is_err());
        assert!(Uri::new(":leading-colon").is_err());
    }

    #[test]
    fn mime_type_validation() {
        assert!(MimeType::new("text/plain").is_ok());
        assert!(MimeType::new("application/octet-stream").is_ok());
        assert!(MimeType::new("plain").is_err());
        assert!(MimeType::new("a/b/c").is_err());
    }

    #[test]
    fn base64_round_trip() {
        let data = Base64Data::encode(b"hello");
        assert_eq!(data.decode(), b"hello");
        assert!(Base64Data::new("!!!not base64!!!").is_err());
    }

    #[test]
    fn cursor_round_trip() {
        let cursor = Cursor::from_index(150);
        assert_eq!(cursor.to_index().unwrap(), 150);

        let garbage = Cursor("???".to_string());
        assert!(garbage.to_index().is_err());
    }

    #[test]
    fn progress_token_wire_variants() {
        let string_token: ProgressToken = serde_json::from_str(r#""tok""#).unwrap();
        let numeric_token: ProgressToken = serde_json::from_str("5").unwrap();
        assert_eq!(string_token, ProgressToken::String("tok".to_string()));
        assert_eq!(numeric_token, ProgressToken::Number(5));
    }

    #[test]
    fn content_serialization_shape() {
        let content = Content::text("hi");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn meta_object_shape() {
        assert!(meta_object(&[]).is_none());
        let meta = meta_object(&[MetaEntry::new("origin", serde_json::json!("generated"))]);
        assert_eq!(meta.unwrap()["origin"], "generated");
    }
}
