//! Errors that abort a compile.

use std::path::PathBuf;

use thiserror::Error;
use write_fonts::BuilderError;

/// Any failure in any stage of the pipeline.
///
/// There is no partial-success mode: each of these stops the compile before
/// anything is written.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed font source: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Glyph '{0}' is listed in the glyph order but not defined")]
    MissingGlyph(String),

    #[error("Glyph '{glyph}' references missing component '{component}'")]
    MissingComponent { glyph: String, component: String },

    #[error("Component cycle: {}", .0.join(" -> "))]
    ComponentCycle(Vec<String>),

    #[error("Glyph '{glyph}' has a malformed assembly part '{part}': {reason}")]
    AssemblyPart {
        glyph: String,
        part: String,
        reason: String,
    },

    #[error("Base glyph '{0}' has no outline to derive a line from")]
    EmptyBase(String),

    #[error("Simplifying '{glyph}' failed: {reason}")]
    Simplify { glyph: String, reason: String },

    #[error("Hinting '{glyph}' failed: {reason}")]
    Hinting { glyph: String, reason: String },

    #[error("Invalid version '{0}', expected 'major.minor'")]
    Version(String),

    #[error("Feature file line {line}: {message}")]
    Feature { line: usize, message: String },

    #[error("Preprocessing line {line}: {message}")]
    Preprocess { line: usize, message: String },

    #[error("Building the character map failed: {0}")]
    Cmap(String),

    #[error("Invalid layout tables: {0}")]
    Layout(String),

    #[error("Too many glyphs ({0}), at most 65535 are supported")]
    TooManyGlyphs(usize),

    #[error("Compiling table failed: {0}")]
    Build(#[from] BuilderError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn feature(line: usize, message: impl Into<String>) -> Self {
        Error::Feature {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_glyph() {
        let err = Error::Hinting {
            glyph: "A".into(),
            reason: "no stems".into(),
        };
        assert_eq!(err.to_string(), "Hinting 'A' failed: no stems");
        let err = Error::ComponentCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Component cycle: a -> b -> a");
    }
}
