//! The [MATH (Mathematical Typesetting)](https://learn.microsoft.com/en-us/typography/opentype/spec/math) table

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use write_fonts::{
    read::TopLevelTable,
    types::Tag,
    validate::{Validate, ValidationCtx},
    FontWrite, TableWriter,
};

use super::{layout::Coverage, GlyphRemap};

/// A MathValueRecord without a device table.
fn write_value_record(value: i16, writer: &mut TableWriter) {
    value.write_into(writer);
    // deviceOffset
    0u16.write_into(writer);
}

/// Generates [`MathConstants`], listing its fields in table order.
///
/// Fields in `values` are written as MathValueRecords, the others as plain
/// numbers. Fields in `variants` are read from the source along with the
/// constants, but are not part of the MathConstants table.
macro_rules! math_constants {
    (
        leading { $($lead:ident: $lead_ty:ty),* $(,)? }
        values { $($value:ident),* $(,)? }
        trailing { $($trail:ident: $trail_ty:ty),* $(,)? }
        variants { $($var:ident: $var_ty:ty),* $(,)? }
    ) => {
        /// Font-wide MATH constants, keyed by their OpenType names.
        ///
        /// Constants missing from the source are zero.
        #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default, rename_all = "PascalCase")]
        pub struct MathConstants {
            $(pub $lead: $lead_ty,)*
            $(pub $value: i16,)*
            $(pub $trail: $trail_ty,)*
            $(pub $var: $var_ty,)*
        }

        impl Validate for MathConstants {
            fn validate_impl(&self, _ctx: &mut ValidationCtx) {}
        }

        impl FontWrite for MathConstants {
            fn write_into(&self, writer: &mut TableWriter) {
                $(self.$lead.write_into(writer);)*
                $(write_value_record(self.$value, writer);)*
                $(self.$trail.write_into(writer);)*
            }
        }
    };
}

math_constants! {
    leading {
        script_percent_scale_down: i16,
        script_script_percent_scale_down: i16,
        delimited_sub_formula_min_height: u16,
        display_operator_min_height: u16,
    }
    values {
        math_leading,
        axis_height,
        accent_base_height,
        flattened_accent_base_height,
        subscript_shift_down,
        subscript_top_max,
        subscript_baseline_drop_min,
        superscript_shift_up,
        superscript_shift_up_cramped,
        superscript_bottom_min,
        superscript_baseline_drop_max,
        sub_superscript_gap_min,
        superscript_bottom_max_with_subscript,
        space_after_script,
        upper_limit_gap_min,
        upper_limit_baseline_rise_min,
        lower_limit_gap_min,
        lower_limit_baseline_drop_min,
        stack_top_shift_up,
        stack_top_display_style_shift_up,
        stack_bottom_shift_down,
        stack_bottom_display_style_shift_down,
        stack_gap_min,
        stack_display_style_gap_min,
        stretch_stack_top_shift_up,
        stretch_stack_bottom_shift_down,
        stretch_stack_gap_above_min,
        stretch_stack_gap_below_min,
        fraction_numerator_shift_up,
        fraction_numerator_display_style_shift_up,
        fraction_denominator_shift_down,
        fraction_denominator_display_style_shift_down,
        fraction_numerator_gap_min,
        fraction_num_display_style_gap_min,
        fraction_rule_thickness,
        fraction_denominator_gap_min,
        fraction_denom_display_style_gap_min,
        skewed_fraction_horizontal_gap,
        skewed_fraction_vertical_gap,
        overbar_vertical_gap,
        overbar_rule_thickness,
        overbar_extra_ascender,
        underbar_vertical_gap,
        underbar_rule_thickness,
        underbar_extra_descender,
        radical_vertical_gap,
        radical_display_style_vertical_gap,
        radical_rule_thickness,
        radical_extra_ascender,
        radical_kern_before_degree,
        radical_kern_after_degree,
    }
    trailing {
        radical_degree_bottom_raise_percent: i16,
    }
    variants {
        min_connector_overlap: u16,
    }
}

/// The MATH table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Math {
    pub constants: MathConstants,
    pub glyph_info: GlyphInfo,
    pub variants: Variants,
}

/// The MathGlyphInfo subtable.
///
/// Per-glyph values are keyed by glyph id, so iteration order is coverage
/// order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlyphInfo {
    pub italics_correction: BTreeMap<u16, i16>,
    pub top_accent_attachment: BTreeMap<u16, i16>,
    pub extended_shapes: Coverage,
}

/// The MathVariants subtable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variants {
    pub min_connector_overlap: u16,
    pub vertical: BTreeMap<u16, GlyphConstruction>,
    pub horizontal: BTreeMap<u16, GlyphConstruction>,
}

/// The size variants and assembly of one glyph, along one axis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlyphConstruction {
    pub variants: Vec<GlyphVariant>,
    pub assembly: Option<GlyphAssembly>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlyphVariant {
    pub glyph: u16,
    pub advance: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlyphAssembly {
    pub italics_correction: i16,
    pub parts: Vec<GlyphPart>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlyphPart {
    pub glyph: u16,
    pub start_connector_length: u16,
    pub end_connector_length: u16,
    pub full_advance: u16,
    pub flags: u16,
}

impl GlyphPart {
    pub const EXTENDER_FLAG: u16 = 0x0001;
}

impl GlyphConstruction {
    /// Every glyph this construction can produce.
    pub fn glyphs(&self) -> impl Iterator<Item = u16> + '_ {
        self.variants.iter().map(|variant| variant.glyph).chain(
            self.assembly
                .iter()
                .flat_map(|assembly| assembly.parts.iter().map(|part| part.glyph)),
        )
    }

    fn remap(&self, remap: &GlyphRemap) -> GlyphConstruction {
        let variants = self
            .variants
            .iter()
            .filter_map(|variant| {
                Some(GlyphVariant {
                    glyph: remap.get(variant.glyph)?,
                    advance: variant.advance,
                })
            })
            .collect();
        // an assembly with a missing part can't be built at all
        let assembly = self.assembly.as_ref().and_then(|assembly| {
            Some(GlyphAssembly {
                italics_correction: assembly.italics_correction,
                parts: assembly
                    .parts
                    .iter()
                    .map(|part| {
                        Some(GlyphPart {
                            glyph: remap.get(part.glyph)?,
                            ..*part
                        })
                    })
                    .collect::<Option<_>>()?,
            })
        });
        GlyphConstruction { variants, assembly }
    }
}

fn remap_keys<T: Clone>(map: &BTreeMap<u16, T>, remap: &GlyphRemap) -> BTreeMap<u16, T> {
    map.iter()
        .filter_map(|(gid, value)| Some((remap.get(*gid)?, value.clone())))
        .collect()
}

impl Math {
    /// Renumber all glyphs, dropping records of removed glyphs.
    pub fn remap(&mut self, remap: &GlyphRemap) {
        let info = &mut self.glyph_info;
        info.italics_correction = remap_keys(&info.italics_correction, remap);
        info.top_accent_attachment = remap_keys(&info.top_accent_attachment, remap);
        info.extended_shapes.remap(remap);

        for constructions in [&mut self.variants.vertical, &mut self.variants.horizontal] {
            *constructions = constructions
                .iter()
                .filter_map(|(gid, construction)| {
                    Some((remap.get(*gid)?, construction.remap(remap)))
                })
                .collect();
        }
    }
}

impl TopLevelTable for Math {
    const TAG: Tag = Tag::new(b"MATH");
}

impl FontWrite for Math {
    fn write_into(&self, writer: &mut TableWriter) {
        1u16.write_into(writer);
        0u16.write_into(writer);
        writer.write_offset(&self.constants, 2);
        writer.write_offset(&self.glyph_info, 2);
        writer.write_offset(&self.variants, 2);
    }
}

impl Validate for Math {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        ctx.in_table("MATH", |ctx| {
            ctx.in_field("variants", |ctx| {
                let constructions = self
                    .variants
                    .vertical
                    .values()
                    .chain(self.variants.horizontal.values());
                for construction in constructions {
                    if construction.variants.len() > u16::MAX as usize {
                        ctx.report("too many glyph variants");
                    }
                    if let Some(assembly) = &construction.assembly {
                        if assembly.parts.is_empty() {
                            ctx.report("glyph assembly has no parts");
                        }
                    }
                }
            })
        })
    }
}

/// Coverage-indexed value records: MathItalicsCorrectionInfo and
/// MathTopAccentAttachment have the same layout.
struct ValueRecords<'a>(&'a BTreeMap<u16, i16>);

impl FontWrite for ValueRecords<'_> {
    fn write_into(&self, writer: &mut TableWriter) {
        let coverage: Coverage = self.0.keys().copied().collect();
        writer.write_offset(&coverage.build(), 2);
        (self.0.len() as u16).write_into(writer);
        for value in self.0.values() {
            write_value_record(*value, writer);
        }
    }
}

impl FontWrite for GlyphInfo {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write_offset(&ValueRecords(&self.italics_correction), 2);
        writer.write_offset(&ValueRecords(&self.top_accent_attachment), 2);
        writer.write_offset(&self.extended_shapes.build(), 2);
        // mathKernInfoOffset
        0u16.write_into(writer);
    }
}

impl FontWrite for Variants {
    fn write_into(&self, writer: &mut TableWriter) {
        let vertical: Coverage = self.vertical.keys().copied().collect();
        let horizontal: Coverage = self.horizontal.keys().copied().collect();
        self.min_connector_overlap.write_into(writer);
        writer.write_offset(&vertical.build(), 2);
        writer.write_offset(&horizontal.build(), 2);
        (self.vertical.len() as u16).write_into(writer);
        (self.horizontal.len() as u16).write_into(writer);
        for construction in self.vertical.values().chain(self.horizontal.values()) {
            writer.write_offset(construction, 2);
        }
    }
}

impl FontWrite for GlyphConstruction {
    fn write_into(&self, writer: &mut TableWriter) {
        match &self.assembly {
            Some(assembly) => writer.write_offset(assembly, 2),
            None => 0u16.write_into(writer),
        }
        (self.variants.len() as u16).write_into(writer);
        for variant in &self.variants {
            variant.glyph.write_into(writer);
            variant.advance.write_into(writer);
        }
    }
}

impl FontWrite for GlyphAssembly {
    fn write_into(&self, writer: &mut TableWriter) {
        write_value_record(self.italics_correction, writer);
        (self.parts.len() as u16).write_into(writer);
        for part in &self.parts {
            part.glyph.write_into(writer);
            part.start_connector_length.write_into(writer);
            part.end_connector_length.write_into(writer);
            part.full_advance.write_into(writer);
            part.flags.write_into(writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use write_fonts::{
        dump_table,
        read::{tables::math as read_math, FontData, FontRead},
        types::GlyphId16,
    };

    use super::*;

    fn sample() -> Math {
        let paren = GlyphConstruction {
            variants: vec![
                GlyphVariant {
                    glyph: 4,
                    advance: 801,
                },
                GlyphVariant {
                    glyph: 5,
                    advance: 1201,
                },
            ],
            assembly: Some(GlyphAssembly {
                italics_correction: 0,
                parts: vec![
                    GlyphPart {
                        glyph: 6,
                        start_connector_length: 0,
                        end_connector_length: 100,
                        full_advance: 500,
                        flags: 0,
                    },
                    GlyphPart {
                        glyph: 7,
                        start_connector_length: 100,
                        end_connector_length: 100,
                        full_advance: 300,
                        flags: GlyphPart::EXTENDER_FLAG,
                    },
                ],
            }),
        };
        Math {
            constants: MathConstants {
                script_percent_scale_down: 70,
                axis_height: 250,
                radical_degree_bottom_raise_percent: 65,
                min_connector_overlap: 20,
                ..Default::default()
            },
            glyph_info: GlyphInfo {
                italics_correction: BTreeMap::from([(10, 40), (3, 15)]),
                top_accent_attachment: BTreeMap::new(),
                extended_shapes: [4, 5].into_iter().collect(),
            },
            variants: Variants {
                min_connector_overlap: 20,
                vertical: BTreeMap::from([(2, paren)]),
                horizontal: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn constants_layout() {
        let constants = sample().constants;
        let bytes = dump_table(&constants).unwrap();
        // 4 leading fields, 51 value records, 1 trailing field
        assert_eq!(bytes.len(), 4 * 2 + 51 * 4 + 2);
        assert_eq!(&bytes[..2], &[0, 70]);
        // axisHeight is the second value record
        assert_eq!(&bytes[12..16], &[0, 250, 0, 0]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0, 65]);
    }

    #[test]
    fn constants_from_json() {
        let constants: MathConstants =
            serde_json::from_str(r#"{"AxisHeight": 250, "FractionNumDisplayStyleGapMin": 7}"#)
                .unwrap();
        assert_eq!(constants.axis_height, 250);
        assert_eq!(constants.fraction_num_display_style_gap_min, 7);
        assert_eq!(constants.math_leading, 0);
    }

    #[test]
    fn compiled_table_reads_back() {
        let bytes = dump_table(&sample()).unwrap();
        let math = read_math::Math::read(FontData::new(&bytes)).unwrap();

        let constants = math.math_constants().unwrap();
        assert_eq!(constants.script_percent_scale_down(), 70);
        assert_eq!(constants.axis_height().value().to_i16(), 250);
        assert_eq!(constants.radical_degree_bottom_raise_percent(), 65);

        let variants = math.math_variants().unwrap();
        assert_eq!(variants.min_connector_overlap().to_u16(), 20);
        assert_eq!(variants.vert_glyph_count(), 1);
        assert_eq!(variants.horiz_glyph_count(), 0);
        let covered: Vec<_> = variants.vert_glyph_coverage().unwrap().iter().collect();
        assert_eq!(covered, [GlyphId16::new(2)]);
    }

    #[test]
    fn remap_drops_missing_parts() {
        let mut math = sample();
        // drop glyph 7, an assembly part
        math.remap(&GlyphRemap::new(20, |gid| gid != 7));
        let paren = &math.variants.vertical[&2];
        assert_eq!(paren.variants.len(), 2);
        assert_eq!(paren.assembly, None);
        assert_eq!(
            math.glyph_info.italics_correction,
            BTreeMap::from([(3, 15), (9, 40)])
        );
    }

    #[test]
    fn construction_glyphs() {
        let math = sample();
        let glyphs: Vec<_> = math.variants.vertical[&2].glyphs().collect();
        assert_eq!(glyphs, [4, 5, 6, 7]);
    }
}
