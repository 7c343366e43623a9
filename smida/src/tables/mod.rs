//! The tables that the later pipeline stages edit.
//!
//! `cff` and `math` are serialized here, implementing
//! [`FontWrite`](write_fonts::FontWrite) and
//! [`TopLevelTable`](write_fonts::read::TopLevelTable) so they can be handed
//! to a [`FontBuilder`](write_fonts::FontBuilder) like any other table. The
//! layout tables (`gsub`, `gdef` and their shared `layout` types) are kept
//! in an editable form and built into `write-fonts` tables when the font is
//! written.

pub mod cff;
pub mod gdef;
pub mod gsub;
pub mod layout;
pub mod math;

/// A mapping from old to new glyph ids, produced when glyphs are dropped.
///
/// Kept glyphs keep their relative order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlyphRemap {
    new_ids: Vec<Option<u16>>,
}

impl GlyphRemap {
    /// Create a mapping that keeps the glyphs for which `keep` is true.
    pub fn new(num_glyphs: usize, keep: impl Fn(u16) -> bool) -> Self {
        let mut next = 0u16;
        let new_ids = (0..num_glyphs)
            .map(|gid| {
                u16::try_from(gid).is_ok_and(&keep).then(|| {
                    let new = next;
                    next = next.saturating_add(1);
                    new
                })
            })
            .collect();
        GlyphRemap { new_ids }
    }

    /// The new id of a glyph, or `None` if it was dropped.
    pub fn get(&self, old: u16) -> Option<u16> {
        self.new_ids.get(old as usize).copied().flatten()
    }

    /// The old ids of the kept glyphs, in order.
    pub fn kept(&self) -> impl Iterator<Item = u16> + '_ {
        self.new_ids
            .iter()
            .enumerate()
            .filter(|(_, new)| new.is_some())
            .map(|(old, _)| old as u16)
    }

    pub fn num_kept(&self) -> usize {
        self.new_ids.iter().filter(|new| new.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kept_glyphs_are_renumbered_in_order() {
        let remap = GlyphRemap::new(5, |gid| gid != 1 && gid != 3);
        assert_eq!(remap.get(0), Some(0));
        assert_eq!(remap.get(1), None);
        assert_eq!(remap.get(2), Some(1));
        assert_eq!(remap.get(4), Some(2));
        assert_eq!(remap.get(9), None);
        assert_eq!(remap.kept().collect::<Vec<_>>(), [0, 2, 4]);
        assert_eq!(remap.num_kept(), 3);
    }
}
