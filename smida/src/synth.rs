//! Synthesized over- and underline marks.
//!
//! Combining overline (U+0305) and low line (U+0332) look best when they
//! are as wide as the glyph they follow. For every width bucket found in
//! the font we draw a bar of that width, and append contextual
//! substitutions that pick it after glyphs of the bucket.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::{
    font::{Contour, ContourPoint, Font, Glyph, GlyphClass},
    outline, Error,
};

/// The combining line glyphs that get width variants.
pub const LINE_BASES: [&str; 2] = ["uni0305", "uni0332"];

/// The granularity of width buckets, and the narrowest bucket.
pub const BUCKET_SIZE: i32 = 50;

/// How far a synthesized bar extends past each side of its bucket width.
const OVERHANG: f64 = 25.0;

/// The bucket an advance width falls into.
pub fn bucket(width: i32) -> i32 {
    let rounded = (width as f64 / BUCKET_SIZE as f64).round_ties_even() as i32 * BUCKET_SIZE;
    rounded.max(BUCKET_SIZE)
}

/// Add width-specific line glyphs and the rules that select them.
///
/// Does nothing if the font has none of the base glyphs, or if all of its
/// spacing glyphs fall into a single bucket.
pub fn make_over_under_lines(font: &mut Font) -> Result<(), Error> {
    let bases: Vec<&str> = LINE_BASES
        .into_iter()
        .filter(|name| font.contains(name))
        .collect();
    if bases.is_empty() {
        return Ok(());
    }

    let mut buckets: BTreeMap<i32, Vec<String>> = BTreeMap::new();
    for glyph in font.glyphs.values() {
        if !glyph.is_mark() && glyph.width > 0 {
            buckets
                .entry(bucket(glyph.width))
                .or_default()
                .push(glyph.name.clone());
        }
    }
    if buckets.len() <= 1 {
        log::info!("all glyphs share one width bucket, not synthesizing lines");
        return Ok(());
    }

    let mut bars = Vec::with_capacity(bases.len());
    for base in &bases {
        let glyph = font
            .glyph(base)
            .ok_or_else(|| Error::MissingGlyph(base.to_string()))?;
        let bbox = outline::bounds(font, glyph)?
            .filter(|bbox| bbox.height() > 0.0)
            .ok_or_else(|| Error::EmptyBase(base.to_string()))?;
        bars.push((*base, bbox.y0, bbox.height()));
    }

    // all widths of one base, then the next base
    let mut new_glyphs = Vec::new();
    for &(base, y_min, height) in &bars {
        for &width in buckets.keys() {
            new_glyphs.push(line_glyph(base, width, y_min, height));
        }
    }
    log::info!(
        "synthesized {} line glyphs for {} width buckets",
        new_glyphs.len(),
        buckets.len()
    );
    for glyph in new_glyphs {
        font.insert_glyph(glyph);
    }

    let fea = line_features(&bases, &buckets);
    if !font.features.is_empty() && !font.features.ends_with('\n') {
        font.features.push('\n');
    }
    font.features.push_str(&fea);
    Ok(())
}

fn line_glyph(base: &str, width: i32, y_min: f64, height: f64) -> Glyph {
    let left = -OVERHANG - width as f64;
    let mut glyph = Glyph::new(format!("{base}.{width}"), 0);
    glyph.class = Some(GlyphClass::Mark);
    glyph.contours.push(Contour::new(vec![
        ContourPoint::on(left, y_min),
        ContourPoint::on(left, y_min + height),
        ContourPoint::on(OVERHANG, y_min + height),
        ContourPoint::on(OVERHANG, y_min),
    ]));
    glyph
}

fn line_features(bases: &[&str], buckets: &BTreeMap<i32, Vec<String>>) -> String {
    let bases_list = bases.join(" ");
    let mut fea = String::new();
    fea.push_str("feature mark {\n");
    let _ = writeln!(fea, "  @OverSet = [{bases_list}];");
    fea.push_str("  lookupflag UseMarkFilteringSet @OverSet;\n");
    for (width, members) in buckets {
        let replacements: Vec<String> = bases.iter().map(|base| format!("{base}.{width}")).collect();
        let _ = writeln!(
            fea,
            "  sub [{}] [{bases_list}]' by [{}];",
            members.join(" "),
            replacements.join(" ")
        );
    }
    fea.push_str("} mark;\n");
    fea
}
