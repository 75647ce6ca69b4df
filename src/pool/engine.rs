//! Playback capabilities the pool depends on
//!
//! The pool never touches a media framework directly. It asks a
//! [`PlaybackEngine`] for a resource, drives [`PlaybackResource::initialize`]
//! under a timeout, and disposes the resource exactly once. Durable media
//! artifacts (an on-disk segment cache, for example) are reached through
//! [`ArtifactStore`] so that a corrupted entry can be dropped before
//! construction is re-dispatched.

use crate::content::ContentId;

/// Classification of a construction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceErrorKind {
    /// Network, timeout or connection class; worth retrying
    Transient,
    /// Durable artifact for the locator is unreadable
    CorruptedArtifact,
    /// Anything else (unsupported format, decoder refusal, ...)
    Fatal,
}

/// Construction failure reported by a playback engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceError {
    /// Classification
    pub kind: ResourceErrorKind,
    /// Engine message
    pub message: String,
}

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "connection",
    "unreachable",
    "reset by peer",
    "temporarily unavailable",
];

const CORRUPTION_MARKERS: &[&str] = &["corrupt", "malformed cache", "checksum"];

impl ResourceError {
    /// Retryable failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ResourceErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Corrupted durable artifact
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self {
            kind: ResourceErrorKind::CorruptedArtifact,
            message: message.into(),
        }
    }

    /// Non-retryable failure
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ResourceErrorKind::Fatal,
            message: message.into(),
        }
    }

    /// Classify a free-form engine message
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();

        let kind = if CORRUPTION_MARKERS.iter().any(|m| lower.contains(m)) {
            ResourceErrorKind::CorruptedArtifact
        } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            ResourceErrorKind::Transient
        } else {
            ResourceErrorKind::Fatal
        };

        Self { kind, message }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        self.kind == ResourceErrorKind::Transient
    }

    /// Whether the durable artifact should be removed
    pub fn is_corrupted_artifact(&self) -> bool {
        self.kind == ResourceErrorKind::CorruptedArtifact
    }
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ResourceErrorKind::Transient => write!(f, "transient: {}", self.message),
            ResourceErrorKind::CorruptedArtifact => write!(f, "corrupted artifact: {}", self.message),
            ResourceErrorKind::Fatal => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ResourceError {}

/// A heavyweight playback object (decoder, player, surface)
#[async_trait::async_trait]
pub trait PlaybackResource: Send + Sync {
    /// Prepare for playback; may download manifests or open decoders
    async fn initialize(&mut self) -> Result<(), ResourceError>;

    /// Release everything the resource holds
    ///
    /// The pool calls this exactly once per resource.
    async fn dispose(&mut self);

    /// Approximate memory footprint
    fn estimated_bytes(&self) -> usize {
        0
    }
}

/// Factory for playback resources
pub trait PlaybackEngine: Send + Sync {
    /// Create an uninitialized resource for a locator
    fn create(
        &self,
        content_id: &ContentId,
        locator: &str,
    ) -> Result<Box<dyn PlaybackResource>, ResourceError>;
}

/// Durable media artifact cache
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Remove the artifact for a locator; returns whether one existed
    async fn remove(&self, locator: &str) -> bool;
}
