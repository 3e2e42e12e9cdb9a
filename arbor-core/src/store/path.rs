//! Dotted Paths
//!
//! Paths address a location inside an entity's value: `"user.friends.0.name"`.
//! The empty path and the reserved `__self__` token both address the whole
//! value; purely numeric segments address sequence indices.

use std::fmt;

use smallvec::SmallVec;

/// Reserved segment meaning "the entity itself".
pub const SELF_SEGMENT: &str = "__self__";

/// A parsed, normalized path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path {
    segments: SmallVec<[String; 4]>,
}

impl Path {
    /// Parse a dotted path. Empty segments and `__self__` are dropped.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|segment| !segment.is_empty() && *segment != SELF_SEGMENT)
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True for the whole-value path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The canonical dotted form, `""` for the root.
    pub fn key(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(SELF_SEGMENT)
        } else {
            f.write_str(&self.key())
        }
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Path::parse(path)
    }
}

/// Parse a sequence index segment (`^\d+$`).
pub fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Join segments into the dotted form used as a subscription key.
pub(crate) fn join(segments: &[String]) -> String {
    segments.join(".")
}
