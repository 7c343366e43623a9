//! The [GSUB (Glyph Substitution)](https://learn.microsoft.com/en-us/typography/opentype/spec/gsub) table
//!
//! Lookups are kept in an editable form so that the finalizer can walk and
//! renumber them; [`Gsub::build`] produces the `write-fonts` table.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};

use write_fonts::{
    tables::{
        gsub::{
            self as write_gsub, LigatureSet, LigatureSubstFormat1, SingleSubst,
            SubstitutionChainContext, SubstitutionLookup, SubstitutionLookupList,
        },
        layout::{
            ChainedSequenceContext, ChainedSequenceContextFormat3, Feature, FeatureList,
            FeatureRecord, LangSys, LangSysRecord, Lookup as LookupTable, Script, ScriptList,
            ScriptRecord, SequenceLookupRecord,
        },
    },
    types::{GlyphId16, Tag},
    validate::{Validate, ValidationCtx},
};

use super::{
    layout::{Coverage, LookupFlag},
    GlyphRemap,
};

pub const DFLT_SCRIPT: Tag = Tag::new(b"DFLT");
pub const DFLT_LANGUAGE: Tag = Tag::new(b"dflt");

/// The GSUB table.
///
/// Every feature is registered for every language system.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gsub {
    /// `(script, language)` pairs, in declaration order.
    pub language_systems: Vec<(Tag, Tag)>,
    /// Feature tags and the lookups they reference, in declaration order.
    ///
    /// A tag may appear more than once; all its lookups end up in a single
    /// feature record.
    pub features: Vec<(Tag, Vec<u16>)>,
    pub lookups: Vec<Lookup>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lookup {
    pub flag: LookupFlag,
    /// The index of the mark glyph set in GDEF, when the flag uses one.
    pub mark_filtering_set: Option<u16>,
    pub kind: LookupKind,
}

/// The substitutions of a lookup; each kind is written as one lookup type.
#[derive(Clone, Debug, PartialEq)]
pub enum LookupKind {
    /// Lookup type 1: one glyph replaced by another.
    Single(BTreeMap<u16, u16>),
    /// Lookup type 4: a sequence replaced by a ligature, keyed by the first
    /// glyph of the sequence.
    Ligature(BTreeMap<u16, Vec<Ligature>>),
    /// Lookup type 6, format 3: one subtable per rule.
    ChainContext(Vec<ChainRule>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ligature {
    /// The components after the first.
    pub components: Vec<u16>,
    pub glyph: u16,
}

/// A coverage-based chained context rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainRule {
    /// In reading order: the glyph right before the input is last.
    pub backtrack: Vec<Coverage>,
    pub input: Vec<Coverage>,
    pub lookahead: Vec<Coverage>,
    /// `(sequence index, lookup index)` pairs.
    pub lookups: Vec<(u16, u16)>,
}

impl ChainRule {
    fn coverages(&self) -> impl Iterator<Item = &Coverage> + '_ {
        self.backtrack
            .iter()
            .chain(&self.input)
            .chain(&self.lookahead)
    }

    /// Whether any coverage of the rule is empty, so that it can never match.
    pub fn is_dead(&self) -> bool {
        self.input.is_empty() || self.coverages().any(Coverage::is_empty)
    }

    fn build(&self) -> SubstitutionChainContext {
        // the table stores backtrack glyphs nearest first
        let backtrack = self.backtrack.iter().rev().map(Coverage::build).collect();
        let records = self
            .lookups
            .iter()
            .map(|(seq_idx, lookup_idx)| SequenceLookupRecord::new(*seq_idx, *lookup_idx))
            .collect();
        ChainedSequenceContext::Format3(ChainedSequenceContextFormat3::new(
            backtrack,
            self.input.iter().map(Coverage::build).collect(),
            self.lookahead.iter().map(Coverage::build).collect(),
            records,
        ))
        .into()
    }
}

impl LookupKind {
    /// The number of glyphs of context this lookup looks at.
    fn max_context(&self) -> usize {
        match self {
            LookupKind::Single(map) if map.is_empty() => 0,
            LookupKind::Single(_) => 1,
            LookupKind::Ligature(sets) => sets
                .values()
                .flatten()
                .map(|lig| lig.components.len() + 1)
                .max()
                .unwrap_or(0),
            LookupKind::ChainContext(rules) => rules
                .iter()
                .map(|rule| rule.input.len() + rule.lookahead.len())
                .max()
                .unwrap_or(0),
        }
    }

    fn remap(&mut self, remap: &GlyphRemap) {
        match self {
            LookupKind::Single(map) => {
                *map = map
                    .iter()
                    .filter_map(|(target, replacement)| {
                        Some((remap.get(*target)?, remap.get(*replacement)?))
                    })
                    .collect();
            }
            LookupKind::Ligature(sets) => {
                let mut remapped: BTreeMap<u16, Vec<Ligature>> = BTreeMap::new();
                for (first, ligatures) in sets.iter() {
                    let Some(first) = remap.get(*first) else {
                        continue;
                    };
                    let kept: Vec<_> = ligatures
                        .iter()
                        .filter_map(|lig| {
                            Some(Ligature {
                                components: lig
                                    .components
                                    .iter()
                                    .map(|gid| remap.get(*gid))
                                    .collect::<Option<_>>()?,
                                glyph: remap.get(lig.glyph)?,
                            })
                        })
                        .collect();
                    if !kept.is_empty() {
                        remapped.insert(first, kept);
                    }
                }
                *sets = remapped;
            }
            LookupKind::ChainContext(rules) => {
                for rule in rules.iter_mut() {
                    rule.backtrack
                        .iter_mut()
                        .chain(rule.input.iter_mut())
                        .chain(rule.lookahead.iter_mut())
                        .for_each(|coverage| coverage.remap(remap));
                }
                rules.retain(|rule| !rule.is_dead());
            }
        }
    }
}

impl Lookup {
    /// The lookup table; a lookup whose rules were all pruned keeps its
    /// place with no subtables.
    fn build(&self) -> SubstitutionLookup {
        macro_rules! lookup {
            ($variant:ident, $subtables:expr) => {{
                let mut lookup = LookupTable::new(self.flag, $subtables);
                lookup.mark_filtering_set = self.mark_filtering_set;
                SubstitutionLookup::$variant(lookup)
            }};
        }
        match &self.kind {
            LookupKind::Single(map) => lookup!(Single, single_subst(map).into_iter().collect()),
            LookupKind::Ligature(sets) => {
                lookup!(Ligature, ligature_subst(sets).into_iter().collect())
            }
            LookupKind::ChainContext(rules) => {
                lookup!(ChainContextual, rules.iter().map(ChainRule::build).collect())
            }
        }
    }
}

/// Format 1 when every pair shares one delta, format 2 otherwise.
fn single_subst(map: &BTreeMap<u16, u16>) -> Option<SingleSubst> {
    if map.is_empty() {
        return None;
    }
    let coverage = map.keys().copied().collect::<Coverage>().build();
    let delta = map
        .iter()
        .map(|(target, replacement)| *replacement as i32 - *target as i32)
        .reduce(|acc, delta| if acc == delta { acc } else { i32::MAX })
        .and_then(|delta| i16::try_from(delta).ok());
    Some(match delta {
        Some(delta) => SingleSubst::format_1(coverage, delta),
        None => SingleSubst::format_2(coverage, map.values().copied().map(GlyphId16::new).collect()),
    })
}

fn ligature_subst(sets: &BTreeMap<u16, Vec<Ligature>>) -> Option<LigatureSubstFormat1> {
    if sets.is_empty() {
        return None;
    }
    let coverage = sets.keys().copied().collect::<Coverage>().build();
    let ligature_sets = sets
        .values()
        .map(|ligatures| {
            // longest match first
            let mut ligatures: Vec<_> = ligatures.iter().collect();
            ligatures.sort_by_key(|lig| Reverse(lig.components.len()));
            LigatureSet::new(
                ligatures
                    .into_iter()
                    .map(|lig| {
                        write_gsub::Ligature::new(
                            GlyphId16::new(lig.glyph),
                            lig.components.iter().copied().map(GlyphId16::new).collect(),
                        )
                    })
                    .collect(),
            )
        })
        .collect();
    Some(LigatureSubstFormat1::new(coverage, ligature_sets))
}

impl Gsub {
    /// The feature records to write: one per tag, sorted by tag.
    fn feature_records(&self) -> Vec<(Tag, Vec<u16>)> {
        let mut merged: BTreeMap<Tag, Vec<u16>> = BTreeMap::new();
        for (tag, lookups) in &self.features {
            let entry = merged.entry(*tag).or_default();
            for lookup in lookups {
                if !entry.contains(lookup) {
                    entry.push(*lookup);
                }
            }
        }
        merged
            .into_iter()
            .map(|(tag, mut lookups)| {
                lookups.sort_unstable();
                (tag, lookups)
            })
            .collect()
    }

    fn language_systems(&self) -> Vec<(Tag, Tag)> {
        if self.language_systems.is_empty() {
            vec![(DFLT_SCRIPT, DFLT_LANGUAGE)]
        } else {
            self.language_systems.clone()
        }
    }

    /// Script records, sorted by tag, each listing every feature.
    fn script_records(&self, num_features: u16) -> Vec<ScriptRecord> {
        let mut scripts: BTreeMap<Tag, BTreeSet<Tag>> = BTreeMap::new();
        for (script, language) in self.language_systems() {
            scripts.entry(script).or_default().insert(language);
        }
        let lang_sys = || LangSys {
            required_feature_index: 0xFFFF,
            feature_indices: (0..num_features).collect(),
        };
        scripts
            .into_iter()
            .map(|(script, languages)| {
                let default = languages.contains(&DFLT_LANGUAGE).then(lang_sys);
                let records = languages
                    .iter()
                    .filter(|lang| **lang != DFLT_LANGUAGE)
                    .map(|lang| LangSysRecord::new(*lang, lang_sys()))
                    .collect();
                ScriptRecord::new(script, Script::new(default, records))
            })
            .collect()
    }

    /// The `usMaxContext` value for OS/2.
    pub fn max_context(&self) -> u16 {
        self.lookups
            .iter()
            .map(|lookup| lookup.kind.max_context())
            .max()
            .unwrap_or(0)
            .min(u16::MAX as usize) as u16
    }

    /// Renumber all glyphs, dropping rules that can no longer apply.
    ///
    /// Lookups and features are kept even if they end up empty.
    pub fn remap(&mut self, remap: &GlyphRemap) {
        for lookup in &mut self.lookups {
            lookup.kind.remap(remap);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty() && self.features.is_empty()
    }

    /// Build the table to serialize.
    pub fn build(&self) -> write_gsub::Gsub {
        let features = self.feature_records();
        let script_list = ScriptList::new(self.script_records(features.len() as u16));
        let feature_list = FeatureList::new(
            features
                .into_iter()
                .map(|(tag, lookups)| FeatureRecord::new(tag, Feature::new(None, lookups)))
                .collect(),
        );
        let lookup_list = SubstitutionLookupList::new(self.lookups.iter().map(Lookup::build).collect());
        write_gsub::Gsub::new(script_list, feature_list, lookup_list)
    }
}

impl Validate for Gsub {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        ctx.in_table("GSUB", |ctx| {
            let num_lookups = self.lookups.len();
            if num_lookups > u16::MAX as usize {
                ctx.report("too many lookups");
            }
            ctx.in_field("features", |ctx| {
                for (tag, lookups) in &self.features {
                    if lookups.iter().any(|idx| *idx as usize >= num_lookups) {
                        ctx.report(format!("feature '{tag}' references a missing lookup"));
                    }
                }
            });
            ctx.in_field("lookups", |ctx| {
                for lookup in &self.lookups {
                    lookup.validate_impl(ctx);
                    if let LookupKind::ChainContext(rules) = &lookup.kind {
                        let nested = rules.iter().flat_map(|rule| &rule.lookups);
                        if nested.into_iter().any(|(_, idx)| *idx as usize >= num_lookups) {
                            ctx.report("contextual rule references a missing lookup");
                        }
                    }
                }
            });
        })
    }
}

impl Validate for Lookup {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        ctx.in_table("Lookup", |ctx| {
            let uses_set = self.flag.contains(LookupFlag::USE_MARK_FILTERING_SET);
            if uses_set != self.mark_filtering_set.is_some() {
                ctx.report("mark filtering set does not match lookup flag");
            }
            if let LookupKind::ChainContext(rules) = &self.kind {
                for rule in rules {
                    if rule.lookups.iter().any(|(seq_idx, _)| *seq_idx as usize >= rule.input.len()) {
                        ctx.report("sequence index is past the input sequence");
                    }
                }
            }
        })
    }
}
