//! Evidence chunk types shared across the retrieval and generation layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chunk identifiers
// ---------------------------------------------------------------------------

/// Stable identifier of one evidence chunk.
///
/// Ids are opaque strings minted at ingest time; the canonical scheme is
/// `<doc_id>:<12 hex chars>` (see [`ChunkId::mint`]), but any unique string
/// is accepted. Lexicographic order on ids is the final tie-break wherever
/// ranked output must be deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint the canonical id for the `ordinal`-th chunk of a document: the
    /// doc id joined with the first 12 hex chars of sha256(doc_id, ordinal).
    pub fn mint(doc_id: &str, ordinal: usize) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(ordinal.to_string().as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("{doc_id}:{}", &digest[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Source metadata
// ---------------------------------------------------------------------------

/// Redistribution license of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LicenseTag {
    CcBy,
    CcBySa,
    Cc0,
    PublicDomain,
    Proprietary,
}

impl fmt::Display for LicenseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CcBy => "cc-by",
            Self::CcBySa => "cc-by-sa",
            Self::Cc0 => "cc0",
            Self::PublicDomain => "public-domain",
            Self::Proprietary => "proprietary",
        };
        f.write_str(s)
    }
}

impl FromStr for LicenseTag {
    type Err = LicenseTagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cc-by" => Ok(Self::CcBy),
            "cc-by-sa" => Ok(Self::CcBySa),
            "cc0" => Ok(Self::Cc0),
            "public-domain" => Ok(Self::PublicDomain),
            "proprietary" => Ok(Self::Proprietary),
            other => Err(LicenseTagParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`LicenseTag`] string.
#[derive(Debug, Clone)]
pub struct LicenseTagParseError(pub String);

impl fmt::Display for LicenseTagParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid license tag: {:?}", self.0)
    }
}

impl std::error::Error for LicenseTagParseError {}

/// Provenance of a chunk: the document it was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub doc_id: String,
    pub title: String,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub license: LicenseTag,
}

/// One retrievable unit of evidence text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub source: SourceMeta,
}

// ---------------------------------------------------------------------------
// Index naming and versioning
// ---------------------------------------------------------------------------

/// The two evidence corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexName {
    /// Peer-reviewed exercise and nutrition science.
    Science,
    /// Curated program templates written by coaches.
    Plans,
}

impl IndexName {
    pub const ALL: [IndexName; 2] = [IndexName::Science, IndexName::Plans];
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Science => "science",
            Self::Plans => "plans",
        };
        f.write_str(s)
    }
}

impl FromStr for IndexName {
    type Err = IndexNameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "science" => Ok(Self::Science),
            "plans" => Ok(Self::Plans),
            other => Err(IndexNameParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`IndexName`] string.
#[derive(Debug, Clone)]
pub struct IndexNameParseError(pub String);

impl fmt::Display for IndexNameParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid index name: {:?}", self.0)
    }
}

impl std::error::Error for IndexNameParseError {}

/// Monotonically increasing build number of an index.
///
/// Rebuilds bump the version; a request pins one version per index for its
/// whole lifetime and reports which versions it saw.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SnapshotVersion(pub u64);

impl SnapshotVersion {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
