//! Glyph sets and class maps shared by the layout tables.
//!
//! These are the editable forms that the feature compiler fills in and the
//! finalizer renumbers. `build` turns each into the `write-fonts` table
//! that gets serialized; the format is chosen there.

use std::collections::BTreeMap;

use write_fonts::{
    tables::layout::{
        builders::{ClassDefBuilder, CoverageTableBuilder},
        ClassDef as ClassDefTable, CoverageTable,
    },
    types::GlyphId16,
};

pub use write_fonts::tables::layout::LookupFlag;

use super::GlyphRemap;

/// The glyphs of a [coverage table](https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#coverage-table).
///
/// Glyph ids are kept sorted and unique; the coverage index of a glyph is
/// its position in [`Coverage::glyphs`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coverage {
    glyphs: Vec<u16>,
}

impl Coverage {
    pub fn glyphs(&self) -> &[u16] {
        &self.glyphs
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn contains(&self, gid: u16) -> bool {
        self.glyphs.binary_search(&gid).is_ok()
    }

    pub fn index_of(&self, gid: u16) -> Option<usize> {
        self.glyphs.binary_search(&gid).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.glyphs.iter().copied()
    }

    /// Renumber the covered glyphs, dropping any that were removed.
    pub fn remap(&mut self, remap: &GlyphRemap) {
        self.glyphs = self.glyphs.iter().filter_map(|gid| remap.get(*gid)).collect();
    }

    pub fn build(&self) -> CoverageTable {
        CoverageTableBuilder::from_glyphs(self.iter().map(GlyphId16::new).collect()).build()
    }
}

impl FromIterator<u16> for Coverage {
    fn from_iter<T: IntoIterator<Item = u16>>(iter: T) -> Self {
        let mut glyphs: Vec<u16> = iter.into_iter().collect();
        glyphs.sort_unstable();
        glyphs.dedup();
        Coverage { glyphs }
    }
}

/// The classes of a [class definition table](https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#class-definition-table).
///
/// Glyphs that are not listed are in class 0.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassDef {
    classes: BTreeMap<u16, u16>,
}

impl ClassDef {
    pub fn set(&mut self, gid: u16, class: u16) {
        if class == 0 {
            self.classes.remove(&gid);
        } else {
            self.classes.insert(gid, class);
        }
    }

    pub fn get(&self, gid: u16) -> u16 {
        self.classes.get(&gid).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.classes.iter().map(|(gid, class)| (*gid, *class))
    }

    pub fn remap(&mut self, remap: &GlyphRemap) {
        self.classes = self
            .classes
            .iter()
            .filter_map(|(gid, class)| remap.get(*gid).map(|gid| (gid, *class)))
            .collect();
    }

    pub fn build(&self) -> ClassDefTable {
        self.iter()
            .map(|(gid, class)| (GlyphId16::new(gid), class))
            .collect::<ClassDefBuilder>()
            .build()
    }
}

impl FromIterator<(u16, u16)> for ClassDef {
    fn from_iter<T: IntoIterator<Item = (u16, u16)>>(iter: T) -> Self {
        let mut classdef = ClassDef::default();
        for (gid, class) in iter {
            classdef.set(gid, class);
        }
        classdef
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use write_fonts::{
        dump_table,
        read::{
            tables::layout::{ClassDef as ReadClassDef, CoverageTable as ReadCoverage},
            FontData, FontRead,
        },
    };

    use super::*;

    #[test]
    fn coverage_is_sorted_and_unique() {
        let coverage: Coverage = [10, 3, 10, 7].into_iter().collect();
        assert_eq!(coverage.glyphs(), &[3, 7, 10]);
        assert_eq!(coverage.index_of(7), Some(1));
        assert!(!coverage.contains(4));
    }

    #[test]
    fn coverage_format_follows_density() {
        let sparse: Coverage = [3, 10].into_iter().collect();
        let bytes = dump_table(&sparse.build()).unwrap();
        assert_eq!(bytes, [0, 1, 0, 2, 0, 3, 0, 10]);

        let dense: Coverage = (5..=20).chain([30]).collect();
        let bytes = dump_table(&dense.build()).unwrap();
        let read = ReadCoverage::read(FontData::new(&bytes)).unwrap();
        assert!(matches!(read, ReadCoverage::Format2(_)));
        let glyphs: Vec<u16> = read.iter().map(|gid| gid.to_u16()).collect();
        assert_eq!(glyphs, dense.glyphs());
    }

    #[test]
    fn coverage_remap() {
        let mut coverage: Coverage = [1, 2, 4].into_iter().collect();
        coverage.remap(&GlyphRemap::new(5, |gid| gid != 2));
        assert_eq!(coverage.glyphs(), &[1, 3]);
    }

    #[test]
    fn classdef_formats() {
        let dense: ClassDef = [(4, 1), (5, 1), (6, 3)].into_iter().collect();
        let bytes = dump_table(&dense.build()).unwrap();
        assert_eq!(bytes, [0, 1, 0, 4, 0, 3, 0, 1, 0, 1, 0, 3]);

        let sparse: ClassDef = (100..200).map(|gid| (gid, 1)).chain([(1, 2)]).collect();
        let bytes = dump_table(&sparse.build()).unwrap();
        let read = ReadClassDef::read(FontData::new(&bytes)).unwrap();
        assert!(matches!(read, ReadClassDef::Format2(_)));
        assert_eq!(read.get(GlyphId16::new(1)), 2);
        assert_eq!(read.get(GlyphId16::new(150)), 1);
        assert_eq!(read.get(GlyphId16::new(2)), 0);
    }

    #[test]
    fn class_zero_is_implicit() {
        let mut classdef: ClassDef = [(1, 3)].into_iter().collect();
        classdef.set(1, 0);
        assert!(classdef.is_empty());
        assert_eq!(classdef.get(1), 0);
    }
}
