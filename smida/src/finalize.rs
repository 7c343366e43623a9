//! The last pass over a compiled font: glyph classes and glyph pruning.

use std::collections::BTreeSet;

use crate::{
    compile::CompiledFont,
    font::Font,
    tables::{
        gdef::MARK_CLASS,
        gsub::{ChainRule, Gsub, LookupKind},
        math::Math,
        GlyphRemap,
    },
};

/// Contextual rules can nest lookups; stop following them past this depth.
const MAX_NESTING_LEVEL: u8 = 6;

/// Give every glyph tagged as a mark the GDEF mark class.
///
/// This overrides whatever class the feature text assigned.
pub fn fix_mark_classes(font: &Font, compiled: &mut CompiledFont) {
    let mut count = 0;
    for (gid, glyph) in font.glyphs.values().enumerate() {
        if !glyph.is_mark() {
            continue;
        }
        if let Ok(gid) = u16::try_from(gid) {
            compiled.gdef.glyph_classes.set(gid, MARK_CLASS);
            count += 1;
        }
    }
    log::debug!("{count} glyphs classified as marks");
}

/// Drop every glyph that can't be reached from the character map, and
/// renumber the rest.
pub fn prune(compiled: &mut CompiledFont) {
    let num_glyphs = compiled.num_glyphs();
    let keep = glyph_closure(compiled);
    if keep.len() == num_glyphs {
        log::info!("nothing to prune");
        return;
    }
    let remap = GlyphRemap::new(num_glyphs, |gid| keep.contains(&gid));
    let kept: Vec<usize> = remap.kept().map(usize::from).collect();
    let select = |len: usize| kept.iter().copied().filter(move |gid| *gid < len);

    compiled.glyph_order = select(compiled.glyph_order.len())
        .map(|gid| compiled.glyph_order[gid].clone())
        .collect();
    compiled.advances = select(compiled.advances.len())
        .map(|gid| compiled.advances[gid])
        .collect();
    compiled.bounds = select(compiled.bounds.len())
        .map(|gid| compiled.bounds[gid])
        .collect();
    compiled.mappings = compiled
        .mappings
        .iter()
        .filter_map(|(codepoint, gid)| Some((*codepoint, remap.get(*gid)?)))
        .collect();
    compiled.cff.remap(&remap);
    compiled.gdef.remap(&remap);
    compiled.gsub.remap(&remap);
    if let Some(math) = compiled.math.as_mut() {
        math.remap(&remap);
    }
    compiled.recalc();
    log::info!(
        "pruned {} of {num_glyphs} glyphs",
        num_glyphs - remap.num_kept()
    );
}

/// The ids of every glyph reachable from the character map and `.notdef`,
/// through substitutions and math constructions.
pub fn glyph_closure(compiled: &CompiledFont) -> BTreeSet<u16> {
    let mut keep: BTreeSet<u16> = compiled.mappings.values().copied().collect();
    keep.insert(0);
    let feature_lookups: BTreeSet<u16> = compiled
        .gsub
        .features
        .iter()
        .flat_map(|(_, lookups)| lookups.iter().copied())
        .collect();

    loop {
        let mut added = Vec::new();
        for lookup_index in &feature_lookups {
            gsub_closure(&compiled.gsub, *lookup_index, &keep, None, 0, &mut added);
        }
        if let Some(math) = &compiled.math {
            math_closure(math, &keep, &mut added);
        }
        let before = keep.len();
        keep.extend(added);
        if keep.len() == before {
            return keep;
        }
    }
}

/// Collect the glyphs one lookup can produce from `keep`.
///
/// When `filter` is set, the lookup only applies to those glyphs.
fn gsub_closure(
    gsub: &Gsub,
    lookup_index: u16,
    keep: &BTreeSet<u16>,
    filter: Option<&BTreeSet<u16>>,
    depth: u8,
    added: &mut Vec<u16>,
) {
    let Some(lookup) = gsub.lookups.get(lookup_index as usize) else {
        return;
    };
    let applies = |gid: &u16| keep.contains(gid) && filter.is_none_or(|f| f.contains(gid));
    match &lookup.kind {
        LookupKind::Single(map) => {
            added.extend(
                map.iter()
                    .filter(|(from, _)| applies(*from))
                    .map(|(_, to)| *to),
            );
        }
        LookupKind::Ligature(sets) => {
            for (first, ligatures) in sets.iter().filter(|(first, _)| applies(*first)) {
                log::trace!("ligatures starting with glyph {first}");
                added.extend(
                    ligatures
                        .iter()
                        .filter(|lig| lig.components.iter().all(|gid| keep.contains(gid)))
                        .map(|lig| lig.glyph),
                );
            }
        }
        LookupKind::ChainContext(rules) => {
            if depth >= MAX_NESTING_LEVEL {
                return;
            }
            let reachable = |rule: &&ChainRule| {
                rule.backtrack
                    .iter()
                    .chain(&rule.input)
                    .chain(&rule.lookahead)
                    .all(|coverage| coverage.iter().any(|gid| keep.contains(&gid)))
            };
            for rule in rules.iter().filter(reachable) {
                for (seq_idx, nested) in &rule.lookups {
                    let Some(input) = rule.input.get(*seq_idx as usize) else {
                        continue;
                    };
                    let position: BTreeSet<u16> =
                        input.iter().filter(|gid| applies(gid)).collect();
                    gsub_closure(gsub, *nested, keep, Some(&position), depth + 1, added);
                }
            }
        }
    }
}

fn math_closure(math: &Math, keep: &BTreeSet<u16>, added: &mut Vec<u16>) {
    let variants = &math.variants;
    for (gid, construction) in variants.vertical.iter().chain(&variants.horizontal) {
        if keep.contains(gid) {
            added.extend(construction.glyphs());
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        compile::{compile_tables, Options},
        font::{FontInfo, Glyph, GlyphClass},
        tables::math::{GlyphConstruction, GlyphVariant},
    };

    fn font(glyphs: &[(&str, Option<u32>)], features: &str) -> Font {
        let mut font = Font::new(FontInfo::default());
        for (name, unicode) in glyphs {
            let mut glyph = Glyph::new(*name, 500);
            glyph.unicodes.extend(*unicode);
            font.insert_glyph(glyph);
        }
        font.features = features.to_string();
        font
    }

    fn compiled(font: &Font) -> CompiledFont {
        compile_tables(
            font,
            &Options {
                timestamp: Some(0),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn marks_override_feature_classes() {
        let mut font = font(
            &[(".notdef", None), ("a", Some(0x61)), ("acute", None)],
            "table GDEF { GlyphClassDef [a acute], , , ; } GDEF;",
        );
        font.glyphs[2].class = Some(GlyphClass::Mark);
        let mut compiled = compiled(&font);
        assert_eq!(compiled.gdef.glyph_classes.get(2), 1);
        fix_mark_classes(&font, &mut compiled);
        assert_eq!(compiled.gdef.glyph_classes.get(1), 1);
        assert_eq!(compiled.gdef.glyph_classes.get(2), MARK_CLASS);
    }

    #[test]
    fn substitutions_keep_glyphs() {
        let font = font(
            &[
                (".notdef", None),
                ("a", Some(0x61)),
                ("unused", None),
                ("a.alt", None),
                ("f", Some(0x66)),
                ("i", Some(0x69)),
                ("f_i", None),
                ("l", None),
                ("f_l", None),
            ],
            "feature ss01 { sub a by a.alt; } ss01;
feature liga { sub f i by f_i; sub f l by f_l; } liga;
",
        );
        let mut compiled = compiled(&font);
        prune(&mut compiled);
        assert_eq!(compiled.glyph_order, [".notdef", "a", "a.alt", "f", "i", "f_i"]);
        assert_eq!(compiled.cff.glyph_names, compiled.glyph_order);
        assert_eq!(compiled.cff.charstrings.len(), 6);
        assert_eq!(compiled.advances.len(), 6);
        let mappings: Vec<_> = compiled.mappings.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(mappings, [(0x61, 1), (0x66, 3), (0x69, 4)]);
        assert_eq!(
            compiled.gsub.lookups[0].kind,
            LookupKind::Single([(1, 2)].into_iter().collect())
        );
        assert_eq!(compiled.maxp.num_glyphs, 6);
    }

    #[test]
    fn contextual_substitutions_keep_glyphs() {
        let font = font(
            &[
                (".notdef", None),
                ("a", Some(0x61)),
                ("b", Some(0x62)),
                ("b.after_a", None),
                ("b.after_c", None),
                ("c", None),
            ],
            "feature calt {
  sub [a] [b]' by [b.after_a];
  sub [c] [b]' by [b.after_c];
} calt;
",
        );
        let compiled = compiled(&font);
        let keep: Vec<_> = glyph_closure(&compiled).into_iter().collect();
        assert_eq!(keep, [0, 1, 2, 3]);
    }

    #[test]
    fn math_variants_keep_glyphs() {
        let font = font(
            &[
                (".notdef", None),
                ("parenleft", Some(0x28)),
                ("parenleft.size1", None),
                ("parenleft.top", None),
                ("stray", None),
            ],
            "",
        );
        let mut compiled = compiled(&font);
        let mut math = Math::default();
        math.variants.vertical.insert(
            1,
            GlyphConstruction {
                variants: vec![GlyphVariant {
                    glyph: 2,
                    advance: 1200,
                }],
                assembly: None,
            },
        );
        math.variants.horizontal.insert(
            2,
            GlyphConstruction {
                variants: vec![GlyphVariant {
                    glyph: 3,
                    advance: 800,
                }],
                assembly: None,
            },
        );
        compiled.math = Some(math);
        prune(&mut compiled);
        assert_eq!(
            compiled.glyph_order,
            [".notdef", "parenleft", "parenleft.size1", "parenleft.top"]
        );
    }

    #[test]
    fn nothing_to_prune() {
        let font = font(&[(".notdef", None), ("a", Some(0x61))], "");
        let mut compiled = compiled(&font);
        let before = compiled.clone();
        prune(&mut compiled);
        assert_eq!(compiled.glyph_order, before.glyph_order);
        assert_eq!(compiled.mappings, before.mappings);
    }
}
