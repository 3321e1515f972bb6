// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for channel framing.
//!
//! Each channel carries a sequence of frames with the following layout:
//! - 4 bytes: message length (big-endian)
//! - N bytes: JSON-encoded message envelope
//!
//! The envelope is UTF-8 JSON with PascalCase field names; binary payloads
//! travel base64-encoded in the `Data` field. Unknown fields are ignored on
//! decode and missing optionals take their defaults, so peers of different
//! versions can interoperate.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame header size (4 bytes length)
pub const HEADER_SIZE: usize = 4;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("status code out of range: {0} (expected 100..=599)")]
    InvalidStatusCode(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Kind of a message frame.
///
/// Unrecognized values decode as `Unknown` so newer peers can add kinds
/// without breaking older ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum FrameKind {
    #[default]
    Unknown,
    Heartbeat,
    Request,
    Response,
}

impl From<String> for FrameKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Heartbeat" => Self::Heartbeat,
            "Request" => Self::Request,
            "Response" => Self::Response,
            _ => Self::Unknown,
        }
    }
}

/// URL details carried by request frames.
///
/// Only the absolute URI travels on the wire; path, query and segments are
/// derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlDetails {
    #[serde(rename = "Uri")]
    pub uri: String,
}

impl UrlDetails {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// The path component, query excluded. Absolute URIs have their
    /// scheme/authority stripped; a URI with no path yields "/".
    pub fn path(&self) -> &str {
        let after_authority = match self.uri.find("://") {
            Some(idx) => {
                let rest = &self.uri[idx + 3..];
                match rest.find('/') {
                    Some(slash) => &rest[slash..],
                    None => "/",
                }
            }
            None => self.uri.as_str(),
        };
        match after_authority.find('?') {
            Some(q) => &after_authority[..q],
            None => after_authority,
        }
    }

    /// The query string without the leading '?', if any.
    pub fn query(&self) -> Option<&str> {
        self.uri.find('?').map(|idx| &self.uri[idx + 1..])
    }

    /// Non-empty path segments.
    pub fn segments(&self) -> Vec<&str> {
        self.path().split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// Case-insensitive multimap of header names to values.
///
/// Names are canonicalized to lowercase on insert and decode; a name may
/// carry several values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct HeaderMultimap {
    entries: BTreeMap<String, Vec<String>>,
}

impl HeaderMultimap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under the given name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Replace all values under the given name.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(name.to_ascii_lowercase(), vec![value.into()]);
    }

    /// All values under the given name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_slice())
    }

    /// The first value under the given name, case-insensitively.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, Vec<String>>> for HeaderMultimap {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        let mut map = Self::new();
        for (name, values) in raw {
            for value in values {
                map.insert(&name, value);
            }
        }
        map
    }
}

impl From<HeaderMultimap> for BTreeMap<String, Vec<String>> {
    fn from(map: HeaderMultimap) -> Self {
        map.entries
    }
}

/// A message frame exchanged between controller and worker.
///
/// Requests carry method, URL, headers and payload; responses carry status
/// code, content type, headers and payload. Heartbeat frames carry the
/// worker id in `guid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MessageFrame {
    #[serde(rename = "GUID")]
    pub guid: Uuid,
    #[serde(rename = "Type")]
    pub kind: FrameKind,
    pub timestamp_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_utc: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<UrlDetails>,
    pub headers: HeaderMultimap,
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
}

impl Default for MessageFrame {
    fn default() -> Self {
        Self {
            guid: Uuid::nil(),
            kind: FrameKind::Unknown,
            timestamp_utc: Utc::now(),
            expiration_utc: None,
            status_code: None,
            method: None,
            content_type: None,
            url: None,
            headers: HeaderMultimap::new(),
            data: Vec::new(),
        }
    }
}

impl MessageFrame {
    /// Create a heartbeat frame carrying the worker id.
    pub fn heartbeat(worker_id: Uuid) -> Self {
        Self {
            guid: worker_id,
            kind: FrameKind::Heartbeat,
            ..Default::default()
        }
    }

    /// Create a request frame with a fresh correlation id.
    pub fn request(
        method: impl Into<String>,
        url: UrlDetails,
        headers: HeaderMultimap,
        data: Vec<u8>,
    ) -> Self {
        Self {
            guid: Uuid::new_v4(),
            kind: FrameKind::Request,
            method: Some(method.into()),
            url: Some(url),
            headers,
            data,
            ..Default::default()
        }
    }

    /// Create a response frame. The correlation id must be set by the caller
    /// to match the originating request.
    pub fn response(
        status_code: u16,
        content_type: Option<&str>,
        headers: HeaderMultimap,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if !(100..=599).contains(&status_code) {
            return Err(FrameError::InvalidStatusCode(status_code));
        }
        Ok(Self {
            guid: Uuid::nil(),
            kind: FrameKind::Response,
            status_code: Some(status_code),
            content_type: content_type.map(str::to_string),
            headers,
            data,
            ..Default::default()
        })
    }

    /// Enforce envelope invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), FrameError> {
        if let Some(code) = self.status_code
            && !(100..=599).contains(&code)
        {
            return Err(FrameError::InvalidStatusCode(code));
        }
        Ok(())
    }

    /// Encode the frame to bytes for wire transmission.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        self.validate()?;
        let payload = serde_json::to_vec(self)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(payload.len()));
        }
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.put(payload.as_slice());
        Ok(buf.freeze())
    }

    /// Decode a frame from bytes.
    pub fn decode_from_bytes(mut bytes: Bytes) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame header",
            )));
        }
        let length = bytes.get_u32() as usize;
        if length > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(length));
        }
        if bytes.len() < length {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame payload",
            )));
        }
        let payload = bytes.split_to(length);
        let frame: Self = serde_json::from_slice(&payload)?;
        frame.validate()?;
        Ok(frame)
    }
}

mod base64_data {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

/// Write a frame to an async writer
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &MessageFrame,
) -> Result<(), FrameError> {
    let encoded = frame.encode()?;
    writer.write_all(&encoded).await?;
    Ok(())
}

/// Read a frame from an async reader
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<MessageFrame, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_be_bytes(header) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let frame: MessageFrame = serde_json::from_slice(&payload)?;
    frame.validate()?;
    Ok(frame)
}
