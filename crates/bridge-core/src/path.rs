//! Flat PLC variable paths.
//!
//! A PLC exposes its variables through symbol names such as
//! `Program.myArray[2].myVar`: dot-separated segments, each optionally followed
//! by one or more bracketed, non-negative indices. Plain segments address map
//! members, bracketed indices address sequence elements.
//!
//! ```rust
//! use bridge_core::path::VariablePath;
//!
//! let path: VariablePath = "MAIN.axes[1].limits[0][3]".parse().unwrap();
//! assert_eq!(path.segments().len(), 3);
//! assert_eq!(path.segments()[1].indices(), &[1]);
//! assert_eq!(path.segments()[2].indices(), &[0, 3]);
//! assert_eq!(path.to_string(), "MAIN.axes[1].limits[0][3]");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest accepted array index. Anything above is rejected at parse time so
/// a merged tree never pads a sequence beyond this many holes.
pub const MAX_INDEX: usize = 1_000_000;

/// A flat variable path failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path string was empty.
    #[error("variable path is empty")]
    Empty,

    /// Two dots in a row, or a leading/trailing dot.
    #[error("empty segment at position {position} in '{path}'")]
    EmptySegment {
        /// Full path as given.
        path: String,
        /// Zero-based position of the empty segment.
        position: usize,
    },

    /// `[` without a matching `]`.
    #[error("unterminated index in segment '{segment}' of '{path}'")]
    UnterminatedIndex {
        /// Full path as given.
        path: String,
        /// Offending segment.
        segment: String,
    },

    /// Index that is empty, not a decimal number, or above [`MAX_INDEX`].
    #[error("invalid index '[{index}]' in '{path}'")]
    InvalidIndex {
        /// Full path as given.
        path: String,
        /// Text between the brackets.
        index: String,
    },

    /// Characters after a closing bracket that do not open another index,
    /// or a stray `]` inside a name.
    #[error("unexpected characters in segment '{segment}' of '{path}'")]
    UnexpectedCharacters {
        /// Full path as given.
        path: String,
        /// Offending segment.
        segment: String,
    },
}

/// One dot-separated component of a [`VariablePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    name: String,
    indices: Vec<usize>,
}

impl Segment {
    /// Member name (everything before the first `[`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bracketed indices, outermost first. Empty for plain members.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Whether the segment addresses a sequence element.
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// Parsed flat variable path.
///
/// Keeps the original text so it can be handed back to the driver unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariablePath {
    raw: String,
    segments: Vec<Segment>,
}

impl VariablePath {
    /// Parse a flat path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        raw.parse()
    }

    /// The path exactly as the PLC names it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments, root first. Never empty.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl FromStr for VariablePath {
    type Err = PathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        let segments = raw
            .split('.')
            .enumerate()
            .map(|(position, part)| parse_segment(raw, position, part))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

fn parse_segment(path: &str, position: usize, part: &str) -> Result<Segment, PathError> {
    let (name, mut rest) = match part.find('[') {
        Some(open) => (&part[..open], &part[open..]),
        None => (part, ""),
    };

    if name.is_empty() {
        return Err(PathError::EmptySegment {
            path: path.to_string(),
            position,
        });
    }
    if name.contains(']') {
        return Err(PathError::UnexpectedCharacters {
            path: path.to_string(),
            segment: part.to_string(),
        });
    }

    let mut indices = Vec::new();
    while !rest.is_empty() {
        let Some(body) = rest.strip_prefix('[') else {
            return Err(PathError::UnexpectedCharacters {
                path: path.to_string(),
                segment: part.to_string(),
            });
        };
        let Some(close) = body.find(']') else {
            return Err(PathError::UnterminatedIndex {
                path: path.to_string(),
                segment: part.to_string(),
            });
        };

        let digits = &body[..close];
        let invalid = || PathError::InvalidIndex {
            path: path.to_string(),
            index: digits.to_string(),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let index = digits.parse::<usize>().map_err(|_| invalid())?;
        if index > MAX_INDEX {
            return Err(invalid());
        }
        indices.push(index);

        rest = &body[close + 1..];
    }

    Ok(Segment {
        name: name.to_string(),
        indices,
    })
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for VariablePath {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Serialize for VariablePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VariablePath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
