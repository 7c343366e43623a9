//! Compiling glyph sources into hinted OpenType CFF fonts.
//!
//! The input is a [`Font`]: glyph outlines in glyph order, the feature file
//! text and global metadata. [`compile`] runs every stage of the build and
//! returns the bytes of the font file:
//!
//! 1. `.notdef` is made the first glyph, and over/underline glyphs are
//!    synthesized along with the rules that select them ([`synth`]);
//! 2. components are flattened and outlines cleaned up ([`outline`]);
//! 3. each glyph is hinted and encoded as a Type 2 charstring ([`hint`]),
//!    and the table set is built ([`compile`](mod@compile));
//! 4. the MATH table is built from glyph metadata ([`math`]);
//! 5. mark classes are fixed up and unreachable glyphs pruned
//!    ([`finalize`]).
//!
//! ```no_run
//! # fn main() -> Result<(), smida::Error> {
//! let font = smida::Font::load("Libertinus-Regular.json")?;
//! let bytes = smida::compile(&font, &Default::default())?;
//! std::fs::write("Libertinus-Regular.otf", bytes)
//!     .map_err(|e| smida::Error::io("Libertinus-Regular.otf", e))?;
//! # Ok(())
//! # }
//! ```

pub mod compile;
mod error;
pub mod fea;
pub mod finalize;
pub mod font;
pub mod hint;
pub mod math;
pub mod outline;
pub mod preprocess;
pub mod synth;
pub mod tables;

pub use compile::Options;
pub use error::Error;
pub use font::Font;

use indexmap::IndexMap;

use font::{Glyph, NOTDEF};

/// Build a font file from a source.
///
/// The source is not modified; every stage works on a copy.
pub fn compile(font: &Font, options: &Options) -> Result<Vec<u8>, Error> {
    let mut font = font.clone();
    ensure_notdef(&mut font);
    synth::make_over_under_lines(&mut font)?;
    if font.num_glyphs() > u16::MAX as usize {
        return Err(Error::TooManyGlyphs(font.num_glyphs()));
    }

    let glyphs = font
        .glyphs
        .values()
        .map(|glyph| {
            let normalized = outline::normalize(&font, glyph, options.simplifier.as_ref())?;
            Ok((normalized.name.clone(), normalized))
        })
        .collect::<Result<IndexMap<_, _>, Error>>()?;
    log::info!("normalized {} glyphs", glyphs.len());
    let normalized = Font { glyphs, ..font };

    let mut compiled = compile::compile_tables(&normalized, options)?;
    compiled.math = math::build(&normalized)?;
    finalize::fix_mark_classes(&normalized, &mut compiled);
    if options.prune {
        finalize::prune(&mut compiled);
    }
    compiled.to_bytes()
}

/// Make `.notdef` the first glyph, adding an empty one if it is missing.
fn ensure_notdef(font: &mut Font) {
    match font.glyphs.get_index_of(NOTDEF) {
        Some(0) => (),
        Some(_) => {
            log::debug!("moving {NOTDEF} to the front of the glyph order");
            let glyphs = std::mem::take(&mut font.glyphs);
            let (notdef, rest): (Vec<_>, Vec<_>) =
                glyphs.into_iter().partition(|(name, _)| name == NOTDEF);
            font.glyphs = notdef.into_iter().chain(rest).collect();
        }
        None => {
            log::warn!("font has no {NOTDEF}, adding an empty one");
            let width = i32::from(font.info.units_per_em / 2);
            let glyphs = std::mem::take(&mut font.glyphs);
            font.glyphs = std::iter::once((NOTDEF.to_string(), Glyph::new(NOTDEF, width)))
                .chain(glyphs)
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::font::FontInfo;

    fn font_with(names: &[&str]) -> Font {
        let mut font = Font::new(FontInfo::default());
        for name in names {
            font.insert_glyph(Glyph::new(*name, 300));
        }
        font
    }

    #[test]
    fn notdef_is_moved_first() {
        let mut font = font_with(&["a", "b", NOTDEF, "c"]);
        ensure_notdef(&mut font);
        let order: Vec<_> = font.glyph_order().collect();
        assert_eq!(order, [NOTDEF, "a", "b", "c"]);
        assert_eq!(font.glyphs[0].width, 300);
    }

    #[test]
    fn missing_notdef_is_added() {
        let mut font = font_with(&["a"]);
        ensure_notdef(&mut font);
        let order: Vec<_> = font.glyph_order().collect();
        assert_eq!(order, [NOTDEF, "a"]);
        assert_eq!(font.glyphs[0].width, 500);
        assert!(font.glyphs[0].is_empty());
    }

    #[test]
    fn too_many_glyphs() {
        let names: Vec<String> = (0..=u16::MAX as u32).map(|i| format!("g{i}")).collect();
        let mut font = font_with(&[NOTDEF]);
        for name in names {
            font.insert_glyph(Glyph::new(name, 0));
        }
        let result = compile(&font, &Options::default());
        assert!(matches!(result, Err(Error::TooManyGlyphs(65537))));
    }
}
