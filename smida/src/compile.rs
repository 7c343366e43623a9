//! Compiling a normalized font into its table set, and the table set into
//! a font file.
//!
//! The [`CompiledFont`] sits between the two steps so that the MATH
//! builder and the finalizer can work on compiled tables.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use kurbo::Rect;
use write_fonts::{
    read::tables::compute_checksum,
    tables::{
        cmap::Cmap,
        head::{Flags, Head, MacStyle},
        hhea::Hhea,
        hmtx::{Hmtx, LongMetric},
        maxp::Maxp,
        name::{Name, NameRecord},
        os2::Os2,
        post::Post,
    },
    types::{FWord, Fixed, GlyphId, LongDateTime, NameId, Tag, UfWord, Version16Dot16},
    validate::{Validate, ValidationReport},
    FontBuilder, OtRound,
};

use crate::{
    fea,
    font::{Font, FontInfo},
    hint::{self, Autohinter, HintContext, PassThrough},
    outline::{self, PathSimplifier, WindingFix},
    tables::{
        cff::{Cff, PrivateDict, TopDict},
        gdef::Gdef,
        gsub::Gsub,
        math::Math,
    },
    Error,
};

/// Seconds between the `LongDateTime` epoch (1904) and the Unix epoch.
const SECONDS_1904_TO_1970: i64 = 2_082_844_800;

const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

const DEFAULT_VENDOR: Tag = Tag::new(b"UKWN");

// OS/2 fsSelection bits
const FS_ITALIC: u16 = 1 << 0;
const FS_BOLD: u16 = 1 << 5;
const FS_REGULAR: u16 = 1 << 6;
const FS_USE_TYPO_METRICS: u16 = 1 << 7;

/// Compilation settings.
pub struct Options {
    /// The engine that hints each glyph.
    pub hinter: Box<dyn Autohinter>,
    /// The engine that removes overlaps and fixes contour direction.
    pub simplifier: Box<dyn PathSimplifier>,
    /// Drop glyphs that can't be reached from the character map.
    pub prune: bool,
    /// Unix time used for `head.created` and `head.modified`; the current
    /// time if unset.
    pub timestamp: Option<i64>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            hinter: Box::new(PassThrough),
            simplifier: Box::new(WindingFix),
            prune: true,
            timestamp: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("prune", &self.prune)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// The integer bounding box of a glyph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bounds {
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
}

impl Bounds {
    /// The smallest integer box that contains `rect`.
    pub fn enclosing(rect: Rect) -> Self {
        let clamp = |v: f64| v.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        Bounds {
            x_min: clamp(rect.x0.floor()),
            y_min: clamp(rect.y0.floor()),
            x_max: clamp(rect.x1.ceil()),
            y_max: clamp(rect.y1.ceil()),
        }
    }

    pub fn union(self, other: Bounds) -> Bounds {
        Bounds {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }
}

/// Every table of the output font, plus the per-glyph data the metrics
/// tables are derived from.
///
/// All per-glyph vectors are indexed by glyph id.
#[derive(Clone, Debug)]
pub struct CompiledFont {
    pub glyph_order: Vec<String>,
    pub advances: Vec<u16>,
    pub bounds: Vec<Option<Bounds>>,
    /// Code point to glyph id.
    pub mappings: BTreeMap<u32, u16>,
    pub head: Head,
    pub hhea: Hhea,
    pub maxp: Maxp,
    pub os2: Os2,
    pub post: Post,
    pub name: Name,
    pub cff: Cff,
    pub gdef: Gdef,
    pub gsub: Gsub,
    pub math: Option<Math>,
}

/// Hint every glyph and build the table set.
///
/// The font must already be normalized: components are ignored.
pub fn compile_tables(font: &Font, options: &Options) -> Result<CompiledFont, Error> {
    let num_glyphs = font.num_glyphs();
    if num_glyphs > u16::MAX as usize {
        return Err(Error::TooManyGlyphs(num_glyphs));
    }
    let info = &font.info;
    let context = HintContext::for_font(font);
    log::debug!(
        "defaultWidthX {}, nominalWidthX {}",
        context.default_width_x,
        context.nominal_width_x
    );

    let mut charstrings = Vec::with_capacity(num_glyphs);
    let mut advances = Vec::with_capacity(num_glyphs);
    let mut bounds = Vec::with_capacity(num_glyphs);
    for glyph in font.glyphs.values() {
        let path = outline::round_path(&outline::glyph_path(glyph));
        let charstring = hint::compile_glyph(
            &glyph.name,
            glyph.width,
            &path,
            &context,
            options.hinter.as_ref(),
        )?;
        log::debug!("{}: {} charstring bytes", glyph.name, charstring.as_bytes().len());
        charstrings.push(charstring);
        advances.push(glyph.width.clamp(0, u16::MAX as i32) as u16);
        bounds.push(outline::path_bounds(&path).map(Bounds::enclosing));
    }

    let glyph_order: Vec<String> = font.glyph_order().map(str::to_string).collect();
    let glyph_names: Vec<&str> = font.glyph_order().collect();
    let features = fea::compile(&font.features, &glyph_names)?;
    let mappings = character_map(font);
    let timestamp = options.timestamp.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default()
    });

    let mut compiled = CompiledFont {
        head: head(info, timestamp),
        hhea: hhea(info),
        maxp: Maxp {
            num_glyphs: num_glyphs as u16,
            ..Default::default()
        },
        os2: os2(info, &mappings, features.gsub.max_context()),
        post: post(info),
        name: name(info),
        cff: Cff {
            font_name: info.postscript_name(),
            top_dict: top_dict(info),
            private_dict: private_dict(info, &context),
            glyph_names: glyph_order.clone(),
            charstrings,
        },
        gdef: features.gdef,
        gsub: features.gsub,
        math: None,
        glyph_order,
        advances,
        bounds,
        mappings,
    };
    compiled.recalc();
    log::info!("compiled {num_glyphs} glyphs");
    Ok(compiled)
}

/// Code points to glyph ids; the first glyph in glyph order wins.
fn character_map(font: &Font) -> BTreeMap<u32, u16> {
    let mut mappings = BTreeMap::new();
    for (gid, glyph) in font.glyphs.values().enumerate() {
        for &codepoint in &glyph.unicodes {
            if char::from_u32(codepoint).is_none() {
                log::warn!("{}: U+{codepoint:04X} is not a character", glyph.name);
                continue;
            }
            if let Some(existing) = mappings.get(&codepoint) {
                log::warn!(
                    "U+{codepoint:04X} is mapped by both '{}' and '{}', keeping the first",
                    font.glyph_order().nth(*existing as usize).unwrap_or_default(),
                    glyph.name
                );
                continue;
            }
            mappings.insert(codepoint, gid as u16);
        }
    }
    mappings
}

fn is_italic(info: &FontInfo) -> bool {
    info.italic_angle != 0.0
}

fn is_bold(info: &FontInfo) -> bool {
    info.weight_class >= 700
}

fn head(info: &FontInfo, timestamp: i64) -> Head {
    let date = LongDateTime::new(timestamp + SECONDS_1904_TO_1970);
    let mut mac_style = MacStyle::empty();
    if is_bold(info) {
        mac_style |= MacStyle::BOLD;
    }
    if is_italic(info) {
        mac_style |= MacStyle::ITALIC;
    }
    Head {
        font_revision: Fixed::from_f64(info.version.revision()),
        flags: Flags::BASELINE_AT_Y_0 | Flags::LSB_AT_X_0 | Flags::FORCE_INTEGER_PPEM,
        units_per_em: info.units_per_em,
        created: date,
        modified: date,
        mac_style,
        lowest_rec_ppem: 6,
        index_to_loc_format: 0,
        ..Default::default()
    }
}

fn hhea(info: &FontInfo) -> Hhea {
    Hhea {
        ascender: FWord::new(info.ascender),
        descender: FWord::new(info.descender),
        line_gap: FWord::new(info.line_gap),
        advance_width_max: UfWord::new(0),
        min_left_side_bearing: FWord::new(0),
        min_right_side_bearing: FWord::new(0),
        x_max_extent: FWord::new(0),
        caret_slope_rise: 1,
        caret_slope_run: 0,
        caret_offset: 0,
        number_of_h_metrics: 0,
    }
}

fn os2(info: &FontInfo, mappings: &BTreeMap<u32, u16>, max_context: u16) -> Os2 {
    let upem = info.units_per_em as f64;
    let scaled = |factor: f64| -> i16 { (upem * factor).ot_round() };
    let char_index = |codepoint: Option<&u32>| codepoint.map_or(0, |cp| (*cp).min(0xFFFF) as u16);

    let mut fs_selection = FS_USE_TYPO_METRICS;
    if is_italic(info) {
        fs_selection |= FS_ITALIC;
    }
    if is_bold(info) {
        fs_selection |= FS_BOLD;
    }
    if fs_selection & (FS_ITALIC | FS_BOLD) == 0 {
        fs_selection |= FS_REGULAR;
    }
    let vendor = match &info.vendor_id {
        Some(id) => id.parse::<Tag>().unwrap_or_else(|_| {
            log::warn!("invalid vendor id '{id}', using {DEFAULT_VENDOR}");
            DEFAULT_VENDOR
        }),
        None => DEFAULT_VENDOR,
    };

    Os2 {
        us_weight_class: info.weight_class,
        us_width_class: 5,
        y_subscript_x_size: scaled(0.65),
        y_subscript_y_size: scaled(0.6),
        y_subscript_y_offset: scaled(0.075),
        y_superscript_x_size: scaled(0.65),
        y_superscript_y_size: scaled(0.6),
        y_superscript_y_offset: scaled(0.35),
        y_strikeout_size: info.underline_thickness,
        y_strikeout_position: (info.x_height as f64 * 0.6).ot_round(),
        ach_vend_id: vendor,
        fs_selection,
        us_first_char_index: char_index(mappings.keys().next()),
        us_last_char_index: char_index(mappings.keys().next_back()),
        s_typo_ascender: info.ascender,
        s_typo_decender: info.descender,
        s_typo_line_gap: info.line_gap,
        us_win_ascent: info.ascender.max(0) as u16,
        us_win_descent: info.descender.min(0).unsigned_abs(),
        ul_code_page_range_1: Some(1),
        ul_code_page_range_2: Some(0),
        sx_height: Some(info.x_height),
        s_cap_height: Some(info.cap_height),
        us_default_char: Some(0),
        us_break_char: Some(0x20),
        us_max_context: Some(max_context),
        ..Default::default()
    }
}

fn post(info: &FontInfo) -> Post {
    Post {
        version: Version16Dot16::VERSION_3_0,
        italic_angle: Fixed::from_f64(info.italic_angle),
        underline_position: FWord::new(info.underline_position),
        underline_thickness: FWord::new(info.underline_thickness),
        ..Default::default()
    }
}

fn name(info: &FontInfo) -> Name {
    let postscript_name = info.postscript_name();
    let vendor = info.vendor_id.as_deref().unwrap_or("UKWN");
    let unique_id = format!(
        "{}.{:03};{vendor};{postscript_name}",
        info.version.major, info.version.minor
    );
    let mut records = vec![
        (1, info.family_name.clone()),
        (2, info.style_name.clone()),
        (3, unique_id),
        (4, info.full_name()),
        (5, info.version.name_string()),
        (6, postscript_name),
    ];
    if let Some(copyright) = &info.copyright {
        records.push((0, copyright.clone()));
    }
    if let Some(trademark) = &info.trademark {
        records.push((7, trademark.clone()));
    }
    if let Some(url) = &info.manufacturer_url {
        records.push((11, url.clone()));
    }

    let mut name = Name::default();
    name.name_record = records
        .into_iter()
        .map(|(id, string)| NameRecord::new(3, 1, 0x409, NameId::new(id), string.into()))
        .collect();
    name.name_record.sort();
    name
}

/// The PostScript weight name for a weight class.
fn weight_name(weight_class: u16) -> &'static str {
    match weight_class {
        0..=150 => "Thin",
        151..=250 => "ExtraLight",
        251..=350 => "Light",
        351..=450 => "Regular",
        451..=550 => "Medium",
        551..=650 => "SemiBold",
        651..=750 => "Bold",
        751..=850 => "ExtraBold",
        _ => "Black",
    }
}

fn top_dict(info: &FontInfo) -> TopDict {
    TopDict {
        version: format!("{}.{:03}", info.version.major, info.version.minor),
        notice: info.trademark.clone(),
        copyright: info.copyright.clone(),
        full_name: info.full_name(),
        family_name: info.family_name.clone(),
        weight: weight_name(info.weight_class).to_string(),
        italic_angle: info.italic_angle,
        underline_position: info.underline_position as i32,
        underline_thickness: info.underline_thickness as i32,
        font_bbox: [0; 4],
    }
}

fn private_dict(info: &FontInfo, context: &HintContext) -> PrivateDict {
    let mut blue_values = info.blue_values.clone();
    if blue_values.len() % 2 == 1 {
        log::warn!("odd number of blue values, dropping the last");
        blue_values.pop();
    }
    PrivateDict {
        blue_values,
        default_width_x: context.default_width_x,
        nominal_width_x: context.nominal_width_x,
    }
}

impl CompiledFont {
    pub fn num_glyphs(&self) -> usize {
        self.glyph_order.len()
    }

    /// Recompute everything derived from the glyph set: bounding boxes,
    /// extents, the average width and the glyph count.
    pub fn recalc(&mut self) {
        let font_bounds = self
            .bounds
            .iter()
            .flatten()
            .copied()
            .reduce(Bounds::union)
            .unwrap_or_default();
        self.head.x_min = font_bounds.x_min;
        self.head.y_min = font_bounds.y_min;
        self.head.x_max = font_bounds.x_max;
        self.head.y_max = font_bounds.y_max;
        self.cff.top_dict.font_bbox = [
            font_bounds.x_min as i32,
            font_bounds.y_min as i32,
            font_bounds.x_max as i32,
            font_bounds.y_max as i32,
        ];

        let inked = || {
            self.advances
                .iter()
                .zip(&self.bounds)
                .filter_map(|(advance, bounds)| Some((*advance as i32, (*bounds)?)))
        };
        let min_lsb = inked().map(|(_, b)| b.x_min as i32).min().unwrap_or(0);
        let min_rsb = inked()
            .map(|(advance, b)| advance - b.x_max as i32)
            .min()
            .unwrap_or(0);
        let max_extent = inked().map(|(_, b)| b.x_max as i32).max().unwrap_or(0);
        let clamp = |v: i32| v.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        self.hhea.advance_width_max = UfWord::new(self.advances.iter().copied().max().unwrap_or(0));
        self.hhea.min_left_side_bearing = FWord::new(clamp(min_lsb));
        self.hhea.min_right_side_bearing = FWord::new(clamp(min_rsb));
        self.hhea.x_max_extent = FWord::new(clamp(max_extent));

        let widths: Vec<f64> = self
            .advances
            .iter()
            .filter(|advance| **advance > 0)
            .map(|advance| *advance as f64)
            .collect();
        self.os2.x_avg_char_width = if widths.is_empty() {
            0
        } else {
            (widths.iter().sum::<f64>() / widths.len() as f64).ot_round()
        };
        self.maxp.num_glyphs = self.num_glyphs() as u16;
    }

    /// The hmtx table, and the number of long metrics in it.
    fn hmtx(&self) -> (Hmtx, u16) {
        let side_bearings: Vec<i16> = self
            .bounds
            .iter()
            .map(|bounds| bounds.map_or(0, |b| b.x_min))
            .collect();
        // trailing glyphs with the same advance share the last long metric
        let mut num_long = self.advances.len();
        while num_long > 1 && self.advances[num_long - 1] == self.advances[num_long - 2] {
            num_long -= 1;
        }
        let h_metrics = self
            .advances
            .iter()
            .zip(&side_bearings)
            .take(num_long)
            .map(|(advance, side_bearing)| LongMetric {
                advance: *advance,
                side_bearing: *side_bearing,
            })
            .collect();
        let hmtx = Hmtx {
            h_metrics,
            left_side_bearings: side_bearings.get(num_long..).unwrap_or_default().to_vec(),
        };
        (hmtx, num_long as u16)
    }

    fn cmap(&self) -> Result<Cmap, Error> {
        let mappings = self.mappings.iter().filter_map(|(codepoint, gid)| {
            Some((char::from_u32(*codepoint)?, GlyphId::new(*gid as u32)))
        });
        Cmap::from_mappings(mappings).map_err(|e| Error::Cmap(e.to_string()))
    }

    /// Serialize the font, with `head.checkSumAdjustment` set.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let (hmtx, num_long_metrics) = self.hmtx();
        let mut hhea = self.hhea.clone();
        hhea.number_of_h_metrics = num_long_metrics;
        let mut head = self.head.clone();
        head.checksum_adjustment = 0;
        let cmap = self.cmap()?;

        let mut builder = FontBuilder::new();
        builder
            .add_table(&self.cff)?
            .add_table(&head)?
            .add_table(&hhea)?
            .add_table(&self.maxp)?
            .add_table(&hmtx)?
            .add_table(&cmap)?
            .add_table(&self.name)?
            .add_table(&self.os2)?
            .add_table(&self.post)?;
        // The models are checked here; the built tables are checked again
        // by the builder.
        let layout_error = |report: ValidationReport| Error::Layout(report.to_string());
        self.gdef.validate().map_err(layout_error)?;
        self.gsub.validate().map_err(layout_error)?;
        if !self.gdef.is_empty() {
            builder.add_table(&self.gdef.build())?;
        }
        if !self.gsub.is_empty() {
            builder.add_table(&self.gsub.build())?;
        }
        if let Some(math) = &self.math {
            builder.add_table(math)?;
        }
        let mut bytes = builder.build();
        set_checksum_adjustment(&mut bytes);
        Ok(bytes)
    }
}

/// Store the whole-file checksum adjustment in the head table.
fn set_checksum_adjustment(font: &mut [u8]) {
    let read_u16 = |pos: usize| font.get(pos..pos + 2).map(|b| u16::from_be_bytes([b[0], b[1]]));
    let Some(num_tables) = read_u16(4) else {
        return;
    };
    let head_offset = (0..num_tables as usize)
        .map(|i| 12 + i * 16)
        .find(|record| font.get(*record..record + 4) == Some(b"head".as_slice()))
        .and_then(|record| font.get(record + 8..record + 12))
        .map(|offset| u32::from_be_bytes([offset[0], offset[1], offset[2], offset[3]]) as usize);
    let Some(head_offset) = head_offset else {
        return;
    };
    let adjustment = CHECKSUM_MAGIC.wrapping_sub(compute_checksum(font));
    if let Some(field) = font.get_mut(head_offset + 8..head_offset + 12) {
        field.copy_from_slice(&adjustment.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use write_fonts::read::{FontRef, TableProvider};

    use super::*;
    use crate::font::{Contour, ContourPoint, Glyph};

    fn rect(name: &str, width: i32, x: f64, y: f64, w: f64, h: f64) -> Glyph {
        let mut glyph = Glyph::new(name, width);
        glyph.contours.push(Contour::new(vec![
            ContourPoint::on(x, y),
            ContourPoint::on(x, y + h),
            ContourPoint::on(x + w, y + h),
            ContourPoint::on(x + w, y),
        ]));
        glyph
    }

    fn sample_font() -> Font {
        let mut font = Font::new(FontInfo {
            family_name: "Sample".into(),
            copyright: Some("Copyright 2024".into()),
            ..Default::default()
        });
        font.insert_glyph(rect(".notdef", 500, 50.0, 0.0, 400.0, 700.0));
        let mut a = rect("a", 600, -10.0, 0.0, 500.0, 500.0);
        a.unicodes.push(0x61);
        font.insert_glyph(a);
        let mut b = rect("b", 400, 20.0, -100.0, 300.0, 800.0);
        b.unicodes.extend([0x62, 0x61]);
        font.insert_glyph(b);
        font.insert_glyph(Glyph::new("space", 400));
        font
    }

    fn options() -> Options {
        Options {
            timestamp: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn metrics() {
        let compiled = compile_tables(&sample_font(), &options()).unwrap();
        assert_eq!(
            (compiled.head.x_min, compiled.head.y_min, compiled.head.x_max, compiled.head.y_max),
            (-10, -100, 490, 700)
        );
        assert_eq!(compiled.cff.top_dict.font_bbox, [-10, -100, 490, 700]);
        assert_eq!(compiled.hhea.advance_width_max, UfWord::new(600));
        assert_eq!(compiled.hhea.min_left_side_bearing, FWord::new(-10));
        // .notdef: 500 - 450
        assert_eq!(compiled.hhea.min_right_side_bearing, FWord::new(50));
        assert_eq!(compiled.hhea.x_max_extent, FWord::new(490));
        // (500 + 600 + 400 + 400) / 4
        assert_eq!(compiled.os2.x_avg_char_width, 475);
        assert_eq!(compiled.maxp.num_glyphs, 4);
    }

    #[test]
    fn first_glyph_wins_a_code_point() {
        let compiled = compile_tables(&sample_font(), &options()).unwrap();
        let mappings: Vec<_> = compiled.mappings.into_iter().collect();
        assert_eq!(mappings, [(0x61, 1), (0x62, 2)]);
    }

    #[test]
    fn long_metrics_are_collapsed() {
        let compiled = compile_tables(&sample_font(), &options()).unwrap();
        let (hmtx, num_long) = compiled.hmtx();
        assert_eq!(num_long, 3);
        assert_eq!(hmtx.h_metrics.len(), 3);
        assert_eq!(hmtx.left_side_bearings, [0]);
        assert_eq!(hmtx.h_metrics[1].side_bearing, -10);
    }

    #[test]
    fn names() {
        let info = FontInfo {
            family_name: "Sample".into(),
            style_name: "Italic".into(),
            manufacturer_url: Some("https://example.com".into()),
            ..Default::default()
        };
        let name = name(&info);
        let ids: Vec<_> = name
            .name_record
            .iter()
            .map(|record| record.name_id.to_u16())
            .collect();
        assert_eq!(ids, [1, 2, 3, 4, 5, 6, 11]);
    }

    #[test]
    fn selection_flags() {
        let upright = os2(&FontInfo::default(), &BTreeMap::new(), 0);
        assert_eq!(upright.fs_selection, FS_REGULAR | FS_USE_TYPO_METRICS);
        let italic = os2(
            &FontInfo {
                italic_angle: -12.0,
                ..Default::default()
            },
            &BTreeMap::new(),
            0,
        );
        assert_eq!(italic.fs_selection, FS_ITALIC | FS_USE_TYPO_METRICS);
    }

    #[test]
    fn serialized_font() {
        let compiled = compile_tables(&sample_font(), &options()).unwrap();
        let bytes = compiled.to_bytes().unwrap();
        assert_eq!(compute_checksum(&bytes), CHECKSUM_MAGIC);

        let font = FontRef::new(&bytes).unwrap();
        assert_eq!(font.maxp().unwrap().num_glyphs(), 4);
        assert_eq!(font.hhea().unwrap().number_of_h_metrics(), 3);
        assert_eq!(font.head().unwrap().units_per_em(), 1000);
        assert!(font.table_data(Tag::new(b"CFF ")).is_some());
        assert!(font.table_data(Tag::new(b"GSUB")).is_none());
        assert!(font.table_data(Tag::new(b"MATH")).is_none());
    }

    #[test]
    fn invalid_layout_is_rejected() {
        let mut compiled = compile_tables(&sample_font(), &options()).unwrap();
        compiled
            .gsub
            .features
            .push((Tag::new(b"liga"), vec![3]));
        let err = compiled.to_bytes().unwrap_err();
        assert!(
            matches!(&err, Error::Layout(report) if report.contains("missing lookup")),
            "{err}"
        );
    }
}
