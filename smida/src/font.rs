//! The in-memory font source model.
//!
//! This is what the compiler consumes: an ordered set of glyphs (the order
//! defines glyph ids), the raw feature text, and some global metadata. The
//! serialized form is JSON, with UFO-style contour points.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{math::MathConstants, math::MathGlyphInfo, Error};

/// The name of the required first glyph.
pub const NOTDEF: &str = ".notdef";

/// A font source.
///
/// Glyphs are stored in glyph order; the position of a glyph in
/// [`Font::glyphs`] is its glyph id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Font {
    pub info: FontInfo,
    pub glyphs: IndexMap<String, Glyph>,
    /// Raw feature file text.
    pub features: String,
    /// Font-level MATH constants, keyed by their OpenType names.
    pub math_constants: Option<MathConstants>,
}

/// Global font metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FontInfo {
    pub family_name: String,
    pub style_name: String,
    pub postscript_name: Option<String>,
    pub copyright: Option<String>,
    pub trademark: Option<String>,
    pub manufacturer_url: Option<String>,
    pub version: FontVersion,
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
    pub cap_height: i16,
    pub x_height: i16,
    pub italic_angle: f64,
    pub underline_position: i16,
    pub underline_thickness: i16,
    pub weight_class: u16,
    pub vendor_id: Option<String>,
    pub blue_values: Vec<i32>,
    pub default_width_x: Option<i32>,
    pub nominal_width_x: Option<i32>,
}

impl Default for FontInfo {
    fn default() -> Self {
        FontInfo {
            family_name: "Untitled".into(),
            style_name: "Regular".into(),
            postscript_name: None,
            copyright: None,
            trademark: None,
            manufacturer_url: None,
            version: FontVersion::default(),
            units_per_em: 1000,
            ascender: 750,
            descender: -250,
            line_gap: 0,
            cap_height: 700,
            x_height: 500,
            italic_angle: 0.0,
            underline_position: -100,
            underline_thickness: 50,
            weight_class: 400,
            vendor_id: None,
            blue_values: Vec::new(),
            default_width_x: None,
            nominal_width_x: None,
        }
    }
}

impl FontInfo {
    /// The PostScript name, derived from family and style when not given.
    pub fn postscript_name(&self) -> String {
        self.postscript_name.clone().unwrap_or_else(|| {
            format!("{}-{}", self.family_name, self.style_name)
                .chars()
                .filter(|c| c.is_ascii_graphic() && !"[](){}<>/%".contains(*c))
                .collect()
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.family_name, self.style_name)
    }
}

/// A `major.minor` font version.
///
/// The minor number is stored exactly as it is written into the binary, so
/// a version given as `7.1` on the command line becomes `7.010`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontVersion {
    pub major: u16,
    pub minor: u16,
}

impl FontVersion {
    /// Parse a `major.minor` string, scaling the minor number by ten.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let err = || Error::Version(text.to_string());
        let (major, minor) = text.trim().split_once('.').ok_or_else(err)?;
        let major: u16 = major.parse().map_err(|_| err())?;
        let minor: u16 = minor.parse().map_err(|_| err())?;
        let minor = minor.checked_mul(10).ok_or_else(err)?;
        Ok(FontVersion { major, minor })
    }

    /// The revision as stored in `head.fontRevision`.
    pub fn revision(&self) -> f64 {
        self.major as f64 + self.minor as f64 / 1000.0
    }

    /// The name table version string, e.g. `Version 7.010`.
    pub fn name_string(&self) -> String {
        format!("Version {}.{:03}", self.major, self.minor)
    }
}

/// A single glyph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub name: String,
    #[serde(default)]
    pub width: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unicodes: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contours: Vec<Contour>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<GlyphClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub math: Option<MathGlyphInfo>,
}

impl Glyph {
    pub fn new(name: impl Into<String>, width: i32) -> Self {
        Glyph {
            name: name.into(),
            width,
            ..Default::default()
        }
    }

    pub fn is_mark(&self) -> bool {
        self.class == Some(GlyphClass::Mark)
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty() && self.components.is_empty()
    }
}

/// The shaping classification of a glyph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlyphClass {
    Base,
    Mark,
}

/// A reference to another glyph, placed with an affine transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub base: String,
    /// `[xx, xy, yx, yy, dx, dy]`, in the same order as a UFO component.
    #[serde(default = "identity")]
    pub transform: [f64; 6],
}

fn identity() -> [f64; 6] {
    [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]
}

impl Component {
    pub fn new(base: impl Into<String>) -> Self {
        Component {
            base: base.into(),
            transform: identity(),
        }
    }

    pub fn offset(mut self, dx: f64, dy: f64) -> Self {
        self.transform[4] = dx;
        self.transform[5] = dy;
        self
    }
}

/// A contour, as a list of points in UFO conventions.
///
/// A contour whose first point is a `move` is open; otherwise it is closed
/// and starts at its first on-curve point.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Contour {
    pub points: Vec<ContourPoint>,
}

impl Contour {
    pub fn new(points: Vec<ContourPoint>) -> Self {
        Contour { points }
    }

    pub fn is_closed(&self) -> bool {
        self.points
            .first()
            .is_some_and(|pt| pt.kind != PointKind::Move)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContourPoint {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type", default)]
    pub kind: PointKind,
}

impl ContourPoint {
    pub fn new(x: f64, y: f64, kind: PointKind) -> Self {
        ContourPoint { x, y, kind }
    }

    pub fn on(x: f64, y: f64) -> Self {
        Self::new(x, y, PointKind::Line)
    }

    pub fn off(x: f64, y: f64) -> Self {
        Self::new(x, y, PointKind::OffCurve)
    }
}

/// The UFO point type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Move,
    Line,
    Curve,
    #[serde(rename = "qcurve")]
    QCurve,
    #[default]
    #[serde(rename = "offcurve")]
    OffCurve,
}

impl PointKind {
    pub fn is_on_curve(self) -> bool {
        self != PointKind::OffCurve
    }
}

/// The serialized shape of a [`Font`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FontSource {
    #[serde(default)]
    info: FontInfo,
    #[serde(default)]
    glyph_order: Vec<String>,
    glyphs: Vec<Glyph>,
    #[serde(default)]
    features: String,
    #[serde(default)]
    math_constants: Option<MathConstants>,
}

impl Font {
    pub fn new(info: FontInfo) -> Self {
        Font {
            info,
            ..Default::default()
        }
    }

    /// Load a font source from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&text)
    }

    /// Parse a font source from JSON.
    ///
    /// Glyphs named in `glyphOrder` come first, in that order; any remaining
    /// glyphs follow in the order they are declared.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let source: FontSource = serde_json::from_str(text)?;
        let mut declared: IndexMap<String, Glyph> = source
            .glyphs
            .into_iter()
            .map(|glyph| (glyph.name.clone(), glyph))
            .collect();
        let mut glyphs = IndexMap::with_capacity(declared.len());
        for name in source.glyph_order {
            let glyph = declared
                .shift_remove(&name)
                .ok_or_else(|| Error::MissingGlyph(name.clone()))?;
            glyphs.insert(name, glyph);
        }
        glyphs.extend(declared);
        Ok(Font {
            info: source.info,
            glyphs,
            features: source.features,
            math_constants: source.math_constants,
        })
    }

    /// Append a glyph at the end of the glyph order, replacing any glyph
    /// of the same name in place.
    pub fn insert_glyph(&mut self, glyph: Glyph) {
        self.glyphs.insert(glyph.name.clone(), glyph);
    }

    pub fn glyph(&self, name: &str) -> Option<&Glyph> {
        self.glyphs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.glyphs.contains_key(name)
    }

    /// The glyph id for this name.
    pub fn glyph_id(&self, name: &str) -> Option<u16> {
        self.glyphs
            .get_index_of(name)
            .and_then(|idx| u16::try_from(idx).ok())
    }

    pub fn glyph_order(&self) -> impl Iterator<Item = &str> + '_ {
        self.glyphs.keys().map(String::as_str)
    }

    pub fn num_glyphs(&self) -> usize {
        self.glyphs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_order_wins_over_declaration_order() {
        let font = Font::from_json(
            r#"{
                "glyphOrder": [".notdef", "b"],
                "glyphs": [
                    {"name": "a", "width": 500},
                    {"name": "b", "width": 600},
                    {"name": ".notdef", "width": 500}
                ]
            }"#,
        )
        .unwrap();
        let order: Vec<_> = font.glyph_order().collect();
        assert_eq!(order, [".notdef", "b", "a"]);
        assert_eq!(font.glyph_id("a"), Some(2));
    }

    #[test]
    fn missing_ordered_glyph_is_an_error() {
        let err = Font::from_json(r#"{"glyphOrder": ["x"], "glyphs": []}"#).unwrap_err();
        assert!(matches!(err, Error::MissingGlyph(name) if name == "x"));
    }

    #[test]
    fn contour_points() {
        let font = Font::from_json(
            r#"{"glyphs": [{
                "name": "a",
                "class": "mark",
                "contours": [[
                    {"x": 0, "y": 0, "type": "line"},
                    {"x": 10, "y": 0},
                    {"x": 10, "y": 10, "type": "qcurve"}
                ]]
            }]}"#,
        )
        .unwrap();
        let glyph = font.glyph("a").unwrap();
        assert!(glyph.is_mark());
        assert!(glyph.contours[0].is_closed());
        assert_eq!(glyph.contours[0].points[1].kind, PointKind::OffCurve);
        assert_eq!(glyph.contours[0].points[2].kind, PointKind::QCurve);
    }

    #[test]
    fn parse_version() {
        assert_eq!(
            FontVersion::parse("7.1").unwrap(),
            FontVersion {
                major: 7,
                minor: 10
            }
        );
        assert_eq!(FontVersion::parse("7.1").unwrap().name_string(), "Version 7.010");
        assert!(matches!(FontVersion::parse("7"), Err(Error::Version(_))));
        assert!(matches!(FontVersion::parse("7.x"), Err(Error::Version(_))));
        assert!(matches!(FontVersion::parse("a.1"), Err(Error::Version(_))));
    }
}
