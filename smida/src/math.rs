//! Building the MATH table from per-glyph metadata.
//!
//! Each glyph can carry a [`MathGlyphInfo`]: loosely structured keys as they
//! appear in the font source. [`build`] gathers them into the typed
//! [`Math`] table, keyed by glyph id so every coverage table and its
//! parallel arrays come out in glyph id order.

use serde::{Deserialize, Serialize};

use crate::{
    font::{Font, Glyph},
    outline,
    tables::math::{GlyphAssembly, GlyphConstruction, GlyphPart, GlyphVariant, Math, Variants},
    Error,
};

pub use crate::tables::math::MathConstants;

/// The math metadata of one glyph, as it appears in the source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MathGlyphInfo {
    pub is_extended_shape: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic_correction: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_accent_horizontal: Option<i16>,
    #[serde(rename = "GlyphVariantsVertical", skip_serializing_if = "Option::is_none")]
    pub variants_vertical: Option<Vec<String>>,
    #[serde(rename = "GlyphVariantsHorizontal", skip_serializing_if = "Option::is_none")]
    pub variants_horizontal: Option<Vec<String>>,
    /// Assembly parts, bottom to top, as `(glyph, "flags,start,end,advance")`.
    #[serde(rename = "GlyphCompositionVertical", skip_serializing_if = "Option::is_none")]
    pub composition_vertical: Option<Vec<(String, String)>>,
    /// Assembly parts, left to right.
    #[serde(rename = "GlyphCompositionHorizontal", skip_serializing_if = "Option::is_none")]
    pub composition_horizontal: Option<Vec<(String, String)>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    Vertical,
    Horizontal,
}

/// Build the MATH table.
///
/// Returns `None` unless the font has MATH constants and at least one glyph
/// with math metadata.
pub fn build(font: &Font) -> Result<Option<Math>, Error> {
    let has_glyph_info = font.glyphs.values().any(|glyph| glyph.math.is_some());
    // Both halves are required: constants alone give a table with no glyph
    // records, and glyph data alone a table whose constants are all zero.
    let constants = match (&font.math_constants, has_glyph_info) {
        (Some(constants), true) => constants.clone(),
        (None, false) => {
            log::info!("no math metadata, skipping MATH");
            return Ok(None);
        }
        (Some(_), false) => {
            log::warn!("font has MATH constants but no glyph math data, skipping MATH");
            return Ok(None);
        }
        (None, true) => {
            log::warn!("glyphs have math data but the font has no MATH constants, skipping MATH");
            return Ok(None);
        }
    };
    let mut math = Math {
        variants: Variants {
            min_connector_overlap: constants.min_connector_overlap,
            ..Default::default()
        },
        constants,
        ..Default::default()
    };

    let mut extended_shapes = Vec::new();
    for glyph in font.glyphs.values() {
        let Some(info) = &glyph.math else {
            continue;
        };
        let gid = glyph_id(font, &glyph.name)?;
        if let Some(value) = info.italic_correction {
            math.glyph_info.italics_correction.insert(gid, value);
        }
        if let Some(value) = info.top_accent_horizontal {
            math.glyph_info.top_accent_attachment.insert(gid, value);
        }
        if info.is_extended_shape {
            extended_shapes.push(gid);
        }
        let vertical = construction(
            font,
            glyph,
            info.variants_vertical.as_deref(),
            info.composition_vertical.as_deref(),
            Axis::Vertical,
        )?;
        if let Some(construction) = vertical {
            math.variants.vertical.insert(gid, construction);
        }
        let horizontal = construction(
            font,
            glyph,
            info.variants_horizontal.as_deref(),
            info.composition_horizontal.as_deref(),
            Axis::Horizontal,
        )?;
        if let Some(construction) = horizontal {
            math.variants.horizontal.insert(gid, construction);
        }
    }
    math.glyph_info.extended_shapes = extended_shapes.into_iter().collect();

    log::info!(
        "MATH: {} italic corrections, {} accents, {} vertical and {} horizontal constructions",
        math.glyph_info.italics_correction.len(),
        math.glyph_info.top_accent_attachment.len(),
        math.variants.vertical.len(),
        math.variants.horizontal.len(),
    );
    Ok(Some(math))
}

fn glyph_id(font: &Font, name: &str) -> Result<u16, Error> {
    font.glyph_id(name)
        .ok_or_else(|| Error::MissingGlyph(name.to_string()))
}

/// The construction of a glyph along one axis.
///
/// Parts are only used when the glyph also has variants on that axis.
fn construction(
    font: &Font,
    glyph: &Glyph,
    variants: Option<&[String]>,
    parts: Option<&[(String, String)]>,
    axis: Axis,
) -> Result<Option<GlyphConstruction>, Error> {
    let Some(variants) = variants else {
        return Ok(None);
    };
    let variants = variants
        .iter()
        .map(|name| {
            let variant = font
                .glyph(name)
                .ok_or_else(|| Error::MissingGlyph(name.clone()))?;
            Ok(GlyphVariant {
                glyph: glyph_id(font, name)?,
                advance: measure(font, variant, axis)?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let assembly = parts
        .map(|parts| {
            parts
                .iter()
                .map(|(part, record)| parse_part(font, &glyph.name, part, record))
                .collect::<Result<Vec<_>, Error>>()
        })
        .transpose()?
        .map(|parts| GlyphAssembly {
            italics_correction: 0,
            parts,
        });
    Ok(Some(GlyphConstruction { variants, assembly }))
}

/// The advance of a variant along the axis: its extent, rounded, plus one.
fn measure(font: &Font, glyph: &Glyph, axis: Axis) -> Result<u16, Error> {
    let Some(bbox) = outline::bounds(font, glyph)? else {
        return Ok(1);
    };
    let extent = match axis {
        Axis::Vertical => bbox.height(),
        Axis::Horizontal => bbox.width(),
    };
    Ok((extent.round_ties_even() + 1.0).clamp(0.0, u16::MAX as f64) as u16)
}

fn parse_part(font: &Font, glyph: &str, part: &str, record: &str) -> Result<GlyphPart, Error> {
    let err = |reason: String| Error::AssemblyPart {
        glyph: glyph.to_string(),
        part: part.to_string(),
        reason,
    };
    let fields = record
        .split(',')
        .map(|field| {
            field
                .trim()
                .parse::<u16>()
                .map_err(|e| err(format!("'{}': {e}", field.trim())))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let [flags, start, end, advance] = fields[..] else {
        return Err(err(format!("expected 4 fields, found {}", fields.len())));
    };
    let gid = font
        .glyph_id(part)
        .ok_or_else(|| err("no such glyph".to_string()))?;
    Ok(GlyphPart {
        glyph: gid,
        start_connector_length: start,
        end_connector_length: end,
        full_advance: advance,
        flags,
    })
}
