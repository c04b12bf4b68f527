//! crates/scripture_reader_core/src/domain.rs
//!
//! Defines the pure, core data structures for the reader.
//! These structs are independent of any database or transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type BookId = i64;
pub type ChapterId = i64;
pub type VerseId = i64;

/// Version code used when a new panel is opened.
pub const DEFAULT_VERSION: &str = "ACF";

/// A book of the Bible. Reference data, listed in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub name: String,
    pub alternate_name: Option<String>,
}

/// One chapter row. `chapter_number` is 1-based and gapless per book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub book_id: BookId,
    pub chapter_number: u32,
}

/// A single verse of one translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    pub id: VerseId,
    pub chapter_id: ChapterId,
    pub version: String,
    pub verse_number: u32,
    pub text: String,
}

/// The six colors a verse can be highlighted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Yellow,
    Green,
    Blue,
    Pink,
    Purple,
    Orange,
}

impl HighlightColor {
    pub const ALL: [HighlightColor; 6] = [
        HighlightColor::Yellow,
        HighlightColor::Green,
        HighlightColor::Blue,
        HighlightColor::Pink,
        HighlightColor::Purple,
        HighlightColor::Orange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Purple => "purple",
            HighlightColor::Orange => "orange",
        }
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown highlight color: {0}")]
pub struct UnknownColor(pub String);

impl FromStr for HighlightColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        HighlightColor::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}

/// A user-scoped color annotation on one verse.
///
/// The store does not enforce one row per (verse, user); any row counts
/// as "highlighted".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: i64,
    pub verse_id: VerseId,
    pub user_id: Uuid,
    pub color: HighlightColor,
    pub created_at: DateTime<Utc>,
}

// Represents a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// A translation offered by the version selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BibleVersion {
    pub code: &'static str,
    pub display_name: &'static str,
}

pub const KNOWN_VERSIONS: &[BibleVersion] = &[
    BibleVersion { code: "ACF", display_name: "Almeida Corrigida Fiel" },
    BibleVersion { code: "ARA", display_name: "Almeida Revista e Atualizada" },
    BibleVersion { code: "ARC", display_name: "Almeida Revista e Corrigida" },
    BibleVersion { code: "NVI", display_name: "Nova Versão Internacional" },
    BibleVersion { code: "NAA", display_name: "Nova Almeida Atualizada" },
    BibleVersion { code: "KJV", display_name: "King James Version" },
];

/// Display name for a version code. Codes outside the catalog are shown as-is.
pub fn version_display_name(code: &str) -> String {
    KNOWN_VERSIONS
        .iter()
        .find(|v| v.code.eq_ignore_ascii_case(code))
        .map(|v| v.display_name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Opaque key of a version panel, unique within one reader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// One reading column. Lives only in the reader's in-memory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSlot {
    pub id: SlotId,
    pub version_code: String,
    pub display_name: String,
}

impl VersionSlot {
    pub fn new(id: SlotId, version_code: &str) -> Self {
        Self {
            id,
            version_code: version_code.to_string(),
            display_name: version_display_name(version_code),
        }
    }
}
