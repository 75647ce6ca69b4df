//! Content record types
//!
//! A [`ContentRecord`] is the typed form of one piece of feed content as
//! produced by a source. Identity is the [`ContentId`]; the rest is payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Globally unique, stable content identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(String);

impl ContentId {
    /// Create a new content identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of the account that published a record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new owner identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One unit of feed content
///
/// Cheap to clone: the raw event body is a reference-counted `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    /// Stable identity
    pub id: ContentId,
    /// Publishing account
    pub owner_id: OwnerId,
    /// Logical creation time, unix seconds
    pub created_at: i64,
    /// Engagement (loops) if the source tracks it
    pub loop_count: Option<u64>,
    /// Display title
    pub title: String,
    /// Playback locator (URL or local path)
    pub media_locator: String,
    /// Hashtags, lowercase, without `#`
    pub tags: Vec<String>,
    /// Original encoded event as delivered by the source
    pub raw: Bytes,
}

impl ContentRecord {
    /// Create a record with the required fields and an empty payload
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        created_at: i64,
        media_locator: impl Into<String>,
    ) -> Self {
        Self {
            id: ContentId::new(id),
            owner_id: OwnerId::new(owner_id),
            created_at,
            loop_count: None,
            title: String::new(),
            media_locator: media_locator.into(),
            tags: Vec::new(),
            raw: Bytes::new(),
        }
    }

    /// Set the loop count
    pub fn with_loops(mut self, loops: u64) -> Self {
        self.loop_count = Some(loops);
        self
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Add a tag (normalized to lowercase, leading `#` stripped)
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags
            .push(tag.trim_start_matches('#').to_ascii_lowercase());
        self
    }

    /// Attach the original event body
    pub fn with_raw(mut self, raw: Bytes) -> Self {
        self.raw = raw;
        self
    }

    /// Encode the record as a tab-separated event line
    ///
    /// Field order: id, owner, created_at, loops (empty if untracked),
    /// locator, title, comma-joined tags.
    pub fn encode_event(&self) -> Bytes {
        let loops = self.loop_count.map(|l| l.to_string()).unwrap_or_default();
        let created_at = self.created_at.to_string();
        let tags = self.tags.join(",");
        let fields: [&str; 7] = [
            self.id.as_str(),
            self.owner_id.as_str(),
            created_at.as_str(),
            loops.as_str(),
            self.media_locator.as_str(),
            self.title.as_str(),
            tags.as_str(),
        ];

        let mut buf = BytesMut::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                buf.put_u8(b'\t');
            }
            buf.put_slice(field.as_bytes());
        }
        buf.freeze()
    }

    /// Loop count with "not tracked" treated as zero
    pub fn loops(&self) -> u64 {
        self.loop_count.unwrap_or(0)
    }

    /// Whether the record carries the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim_start_matches('#');
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Check that the record can be interpreted
    pub fn validate(&self) -> Result<()> {
        let reason = if self.id.as_str().is_empty() {
            "empty id"
        } else if self.owner_id.as_str().is_empty() {
            "empty owner"
        } else if self.created_at < 0 {
            "negative timestamp"
        } else if self.media_locator.trim().is_empty() {
            "missing media locator"
        } else {
            return Ok(());
        };

        Err(Error::MalformedRecord {
            id: self.id.to_string(),
            reason,
        })
    }
}
