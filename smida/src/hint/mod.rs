//! Turning normalized outlines into hinted Type 2 charstrings.
//!
//! An outline is first written as a [bez](bez) program, which is handed to
//! an [`Autohinter`]. The (possibly hinted) program that comes back is then
//! encoded as a Type 2 charstring.

pub mod bez;
pub mod charstring;

use std::collections::BTreeMap;

use kurbo::BezPath;

use crate::{font::Font, outline, outline::EngineError, Error};

use bez::BezPen;

/// An engine that adds hints to a bez program.
///
/// The returned program must describe the same outline; it may add stem
/// hints, hint replacement and flex.
pub trait Autohinter {
    fn hint(&self, glyph_name: &str, program: &str) -> Result<String, EngineError>;
}

/// An [`Autohinter`] that returns programs unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThrough;

impl Autohinter for PassThrough {
    fn hint(&self, _glyph_name: &str, program: &str) -> Result<String, EngineError> {
        Ok(program.to_string())
    }
}

/// An encoded Type 2 charstring.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Charstring(Vec<u8>);

impl Charstring {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Charstring(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The per-font values that decide how advance widths are encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HintContext {
    pub default_width_x: i32,
    pub nominal_width_x: i32,
}

impl HintContext {
    pub fn new(default_width_x: i32, nominal_width_x: i32) -> Self {
        HintContext {
            default_width_x,
            nominal_width_x,
        }
    }

    /// The context for a font, using the values set in its info when
    /// present and optimized values otherwise.
    pub fn for_font(font: &Font) -> Self {
        let optimized = Self::from_widths(font.glyphs.values().map(|glyph| glyph.width));
        HintContext {
            default_width_x: font
                .info
                .default_width_x
                .unwrap_or(optimized.default_width_x),
            nominal_width_x: font
                .info
                .nominal_width_x
                .unwrap_or(optimized.nominal_width_x),
        }
    }

    /// Choose the values that minimize the total size of the width operands.
    ///
    /// `defaultWidthX` is the most common advance (the smallest one, on a
    /// tie). `nominalWidthX` is the value that encodes the remaining widths
    /// in the fewest bytes.
    pub fn from_widths(widths: impl IntoIterator<Item = i32>) -> Self {
        let mut counts = BTreeMap::new();
        for width in widths {
            *counts.entry(width).or_insert(0usize) += 1;
        }
        let Some((&default, _)) = counts
            .iter()
            .max_by(|(a_width, a), (b_width, b)| a.cmp(b).then(b_width.cmp(a_width)))
        else {
            return HintContext::new(0, 0);
        };
        counts.remove(&default);
        let (Some(&min), Some(&max)) = (counts.keys().next(), counts.keys().next_back()) else {
            return HintContext::new(default, default);
        };
        let cost = |nominal: i32| -> usize {
            counts
                .iter()
                .map(|(width, count)| operand_size(width - nominal) * count)
                .sum()
        };
        let mut best = (cost(min), min);
        for nominal in min + 1..=max {
            let size = cost(nominal);
            if size < best.0 {
                best = (size, nominal);
            }
        }
        HintContext::new(default, best.1)
    }

    /// The explicit width operand for a glyph with this advance, if any.
    pub fn width_operand(&self, advance: i32) -> Option<i32> {
        (advance != self.default_width_x).then_some(advance - self.nominal_width_x)
    }
}

/// The size in bytes of an integer operand.
fn operand_size(value: i32) -> usize {
    match value {
        -107..=107 => 1,
        -1131..=1131 => 2,
        _ => 3,
    }
}

/// The bez program for an outline.
pub fn bez_program(glyph_name: &str, path: &BezPath) -> String {
    let mut pen = BezPen::new(glyph_name);
    outline::draw(path, &mut pen);
    pen.finish()
}

/// Hint and encode one glyph.
///
/// An engine failure, a hinted program that can't be parsed, or an operand
/// a charstring can't hold aborts with [`Error::Hinting`].
pub fn compile_glyph(
    glyph_name: &str,
    advance: i32,
    path: &BezPath,
    context: &HintContext,
    hinter: &dyn Autohinter,
) -> Result<Charstring, Error> {
    let hinting_error = |reason: String| Error::Hinting {
        glyph: glyph_name.to_string(),
        reason,
    };
    let program = bez_program(glyph_name, path);
    let hinted = hinter
        .hint(glyph_name, &program)
        .map_err(|e| hinting_error(e.to_string()))?;
    let commands = bez::parse(&hinted).map_err(hinting_error)?;
    log::trace!("{glyph_name}: {} commands", commands.len());
    charstring::encode(&commands, context.width_operand(advance))
        .map(Charstring)
        .map_err(hinting_error)
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;
    use kurbo::Shape;
    use pretty_assertions::assert_eq;

    use super::*;

    struct Rejecting;

    impl Autohinter for Rejecting {
        fn hint(&self, _glyph_name: &str, _program: &str) -> Result<String, EngineError> {
            Err("self-intersecting outline".into())
        }
    }

    struct Stemming;

    impl Autohinter for Stemming {
        fn hint(&self, _glyph_name: &str, program: &str) -> Result<String, EngineError> {
            Ok(program.replacen("sc\n", "sc\n0 100 rb\n", 1))
        }
    }

    fn square() -> BezPath {
        Rect::new(0.0, 0.0, 100.0, 100.0).to_path(0.1)
    }

    #[test]
    fn default_width_is_omitted() {
        let context = HintContext::new(500, 400);
        let charstring = compile_glyph("A", 500, &square(), &context, &PassThrough).unwrap();
        // rmoveto is avoided for the origin: 0 vmoveto
        assert_eq!(&charstring.as_bytes()[..2], &[139, 4]);
    }

    #[test]
    fn other_widths_lead_with_delta() {
        let context = HintContext::new(500, 400);
        let charstring = compile_glyph("B", 450, &square(), &context, &PassThrough).unwrap();
        // 50, then the same 0 vmoveto
        assert_eq!(&charstring.as_bytes()[..3], &[189, 139, 4]);
    }

    #[test]
    fn empty_glyph_is_just_endchar() {
        let context = HintContext::new(500, 400);
        let charstring =
            compile_glyph("space", 250, &BezPath::new(), &context, &PassThrough).unwrap();
        // -150 endchar
        assert_eq!(charstring.as_bytes(), &[251, 42, 14]);
    }

    #[test]
    fn engine_errors_name_the_glyph() {
        let context = HintContext::new(0, 0);
        let err = compile_glyph("C", 0, &square(), &context, &Rejecting).unwrap_err();
        assert!(
            matches!(&err, Error::Hinting { glyph, reason } if glyph == "C" && reason.contains("self-intersecting")),
            "{err}"
        );
    }

    #[test]
    fn hinted_programs_are_encoded() {
        let context = HintContext::new(500, 500);
        let charstring = compile_glyph("D", 500, &square(), &context, &Stemming).unwrap();
        // 0 100 hstem
        assert_eq!(&charstring.as_bytes()[..3], &[139, 239, 1]);
    }

    #[test]
    fn bez_program_for_square() {
        let program = bez_program("sq", &square());
        assert!(program.starts_with("% sq\nsc\n0 0 mt\n"), "{program}");
        assert!(program.ends_with("cp\ned\n"), "{program}");
    }

    #[test]
    fn most_common_width_is_default() {
        let context = HintContext::from_widths([500, 500, 500, 600, 450]);
        assert_eq!(context.default_width_x, 500);
        // everything else fits in one byte
        assert_eq!(context.nominal_width_x, 493);
        assert_eq!(context.width_operand(600).map(operand_size), Some(1));
        assert_eq!(context.width_operand(450).map(operand_size), Some(1));
        assert_eq!(context.width_operand(500), None);
    }

    #[test]
    fn ties_pick_the_smallest_width() {
        let context = HintContext::from_widths([600, 300, 600, 300]);
        assert_eq!(context.default_width_x, 300);
        assert_eq!(context.nominal_width_x, 600);
    }

    #[test]
    fn single_width() {
        assert_eq!(HintContext::from_widths([700, 700]), HintContext::new(700, 700));
        assert_eq!(HintContext::from_widths(Vec::new()), HintContext::new(0, 0));
    }
}
