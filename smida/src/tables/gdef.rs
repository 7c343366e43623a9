//! The [GDEF (Glyph Definition)](https://learn.microsoft.com/en-us/typography/opentype/spec/gdef) table

use write_fonts::{
    tables::gdef::{self as write_gdef, MarkGlyphSets},
    validate::{Validate, ValidationCtx},
};

use super::{
    layout::{ClassDef, Coverage},
    GlyphRemap,
};

/// The glyph class of a base glyph.
pub const BASE_CLASS: u16 = 1;
/// The glyph class of a ligature glyph.
pub const LIGATURE_CLASS: u16 = 2;
/// The glyph class of a mark glyph.
pub const MARK_CLASS: u16 = 3;
/// The glyph class of a component glyph.
pub const COMPONENT_CLASS: u16 = 4;

/// The glyph classes and mark glyph sets of a font.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gdef {
    pub glyph_classes: ClassDef,
    /// Referenced by index from lookups that use a mark filtering set.
    pub mark_glyph_sets: Vec<Coverage>,
}

impl Gdef {
    /// Renumber all glyphs.
    ///
    /// Mark glyph sets are kept even when they become empty, since lookups
    /// refer to them by index.
    pub fn remap(&mut self, remap: &GlyphRemap) {
        self.glyph_classes.remap(remap);
        for set in &mut self.mark_glyph_sets {
            set.remap(remap);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.glyph_classes.is_empty() && self.mark_glyph_sets.is_empty()
    }

    /// Build the table to serialize; the version follows from the fields
    /// that are present.
    pub fn build(&self) -> write_gdef::Gdef {
        let mut gdef = write_gdef::Gdef::default();
        if !self.glyph_classes.is_empty() {
            gdef.glyph_class_def.set(self.glyph_classes.build());
        }
        if !self.mark_glyph_sets.is_empty() {
            gdef.mark_glyph_sets_def.set(MarkGlyphSets::new(
                self.mark_glyph_sets.iter().map(Coverage::build).collect(),
            ));
        }
        gdef
    }
}

impl Validate for Gdef {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        ctx.in_table("GDEF", |ctx| {
            ctx.in_field("mark_glyph_sets", |ctx| {
                if self.mark_glyph_sets.len() > u16::MAX as usize {
                    ctx.report("too many mark glyph sets");
                }
            });
            ctx.in_field("glyph_classes", |ctx| {
                if self.glyph_classes.iter().any(|(_, class)| class > COMPONENT_CLASS) {
                    ctx.report("glyph class must be between 1 and 4");
                }
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use write_fonts::{
        dump_table,
        read::{tables::gdef as read_gdef, FontData, FontRead},
        types::{GlyphId16, MajorMinor},
    };

    use super::*;

    #[test]
    fn version_follows_mark_sets() {
        let mut gdef = Gdef {
            glyph_classes: [(1, BASE_CLASS), (2, MARK_CLASS)].into_iter().collect(),
            mark_glyph_sets: Vec::new(),
        };
        let bytes = dump_table(&gdef.build()).unwrap();
        let read = read_gdef::Gdef::read(FontData::new(&bytes)).unwrap();
        assert_eq!(read.version(), MajorMinor::VERSION_1_0);
        assert!(read.mark_glyph_sets_def().is_none());

        gdef.mark_glyph_sets.push([2, 5].into_iter().collect());
        let bytes = dump_table(&gdef.build()).unwrap();
        let read = read_gdef::Gdef::read(FontData::new(&bytes)).unwrap();
        assert_eq!(read.version(), MajorMinor::VERSION_1_2);
        let classes = read.glyph_class_def().unwrap().unwrap();
        assert_eq!(classes.get(GlyphId16::new(2)), MARK_CLASS);
        let sets = read.mark_glyph_sets_def().unwrap().unwrap();
        assert_eq!(sets.mark_glyph_set_count(), 1);
        let glyphs: Vec<u16> = sets
            .coverages()
            .get(0)
            .unwrap()
            .iter()
            .map(|gid| gid.to_u16())
            .collect();
        assert_eq!(glyphs, [2, 5]);
    }

    #[test]
    fn invalid_class() {
        let gdef = Gdef {
            glyph_classes: [(1, 7)].into_iter().collect(),
            mark_glyph_sets: Vec::new(),
        };
        assert!(gdef.validate().is_err());
    }
}
