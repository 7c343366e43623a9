//! A compiler for the substitution subset of the OpenType feature syntax.
//!
//! This covers what the font sources and the line synthesizer use: glyph
//! classes, language systems, feature and named lookup blocks, lookup
//! flags with mark filtering sets, single and ligature substitutions,
//! chained contextual single substitutions, and GDEF glyph classes.
//! Anything else is reported as an error with its line number.

use std::collections::{BTreeMap, HashMap};
use std::mem::discriminant;

use write_fonts::types::Tag;

use crate::{
    tables::{
        gdef::Gdef,
        gsub::{ChainRule, Gsub, Ligature, Lookup, LookupKind},
        layout::{Coverage, LookupFlag},
    },
    Error,
};

/// The layout tables compiled from feature text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Features {
    pub gsub: Gsub,
    pub gdef: Gdef,
}

/// Compile feature text against a glyph order.
pub fn compile(text: &str, glyph_order: &[&str]) -> Result<Features, Error> {
    let tokens = tokenize(text)?;
    let mut compiler = Compiler {
        tokens,
        pos: 0,
        glyphs: glyph_order
            .iter()
            .enumerate()
            .filter_map(|(gid, name)| Some((name.to_string(), u16::try_from(gid).ok()?)))
            .collect(),
        classes: HashMap::new(),
        named_lookups: HashMap::new(),
        gsub: Gsub::default(),
        gdef: Gdef::default(),
        anonymous: Vec::new(),
    };
    while compiler.peek().is_some() {
        compiler.top_level_statement()?;
    }
    Ok(compiler.finish())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token<'a> {
    /// Glyph names, keywords, tags and numbers
    Name(&'a str),
    /// Glyph class references, without the leading @
    Class(&'a str),
    /// Single character punctuation
    Punct(char),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '\\')
}

fn tokenize(text: &str) -> Result<Vec<(Token<'_>, usize)>, Error> {
    let mut tokens = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        // comments run to the end of the line
        let line = line.split_once('#').map_or(line, |(code, _)| code);
        let mut rest = line;
        loop {
            rest = rest.trim_start();
            let Some(c) = rest.chars().next() else {
                break;
            };
            let (token, len) = match c {
                '{' | '}' | '[' | ']' | ';' | '=' | '\'' | ',' => (Token::Punct(c), 1),
                '@' => {
                    let len = rest[1..]
                        .find(|c| !is_name_char(c))
                        .unwrap_or(rest.len() - 1);
                    if len == 0 {
                        return Err(Error::feature(line_no, "expected a class name after '@'"));
                    }
                    (Token::Class(&rest[1..1 + len]), len + 1)
                }
                c if is_name_char(c) => {
                    let len = rest.find(|c| !is_name_char(c)).unwrap_or(rest.len());
                    let name = &rest[..len];
                    (Token::Name(name.strip_prefix('\\').unwrap_or(name)), len)
                }
                _ => {
                    return Err(Error::feature(
                        line_no,
                        format!("unexpected character '{c}'"),
                    ))
                }
            };
            tokens.push((token, line_no));
            rest = &rest[len..];
        }
    }
    Ok(tokens)
}

/// The lookup state of a feature or lookup block.
#[derive(Default)]
struct Block {
    /// Set for named lookup blocks, which hold exactly one lookup.
    name: Option<String>,
    flag: LookupFlag,
    mark_filtering_set: Option<u16>,
    /// The lookup that the next rule may be added to.
    open: Option<usize>,
    /// Every lookup created or referenced in the block, in order.
    lookups: Vec<u16>,
    num_rules: usize,
}

/// A parsed substitution, before it is placed in a lookup.
enum Rule {
    Single(Vec<(u16, u16)>),
    Ligature(Vec<(u16, Ligature)>),
    Contextual {
        rule: ChainRule,
        substitutions: Vec<(u16, u16)>,
    },
}

impl Rule {
    fn empty_kind(&self) -> LookupKind {
        match self {
            Rule::Single(_) => LookupKind::Single(BTreeMap::new()),
            Rule::Ligature(_) => LookupKind::Ligature(BTreeMap::new()),
            Rule::Contextual { .. } => LookupKind::ChainContext(Vec::new()),
        }
    }
}

struct Compiler<'a> {
    tokens: Vec<(Token<'a>, usize)>,
    pos: usize,
    glyphs: HashMap<String, u16>,
    classes: HashMap<String, Vec<u16>>,
    named_lookups: HashMap<String, u16>,
    gsub: Gsub,
    gdef: Gdef,
    /// Lookups referenced from contextual rules; these go after all others.
    anonymous: Vec<Lookup>,
}

impl<'a> Compiler<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).map(|(token, _)| *token)
    }

    /// The line of the next token, or of the last one at the end of input.
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map(|(_, line)| *line)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Result<Token<'a>, Error> {
        let token = self
            .peek()
            .ok_or_else(|| Error::feature(self.line(), "unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::feature(self.line(), message)
    }

    fn expect_punct(&mut self, expected: char) -> Result<(), Error> {
        match self.next()? {
            Token::Punct(c) if c == expected => Ok(()),
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected '{expected}', found {}", describe(other))))
            }
        }
    }

    fn expect_name(&mut self) -> Result<&'a str, Error> {
        match self.next()? {
            Token::Name(name) => Ok(name),
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected a name, found {}", describe(other))))
            }
        }
    }

    fn expect_tag(&mut self) -> Result<Tag, Error> {
        let name = self.expect_name()?;
        name.parse::<Tag>()
            .map_err(|_| Error::feature(self.tokens[self.pos - 1].1, format!("invalid tag '{name}'")))
    }

    /// Consume the closing `} name;` of a block.
    fn close_block(&mut self, name: &str) -> Result<(), Error> {
        self.expect_punct('}')?;
        let closing = self.expect_name()?;
        if closing != name {
            return Err(Error::feature(
                self.tokens[self.pos - 1].1,
                format!("block '{name}' closed as '{closing}'"),
            ));
        }
        self.expect_punct(';')
    }

    fn top_level_statement(&mut self) -> Result<(), Error> {
        match self.next()? {
            Token::Name("languagesystem") => {
                let script = self.expect_tag()?;
                let language = self.expect_tag()?;
                self.expect_punct(';')?;
                if !self.gsub.language_systems.contains(&(script, language)) {
                    self.gsub.language_systems.push((script, language));
                }
                Ok(())
            }
            Token::Class(name) => self.class_definition(name),
            Token::Name("feature") => self.feature_block(),
            Token::Name("lookup") => self.lookup_block(None).map(|_| ()),
            Token::Name("table") => self.table_block(),
            other => {
                self.pos -= 1;
                Err(self.error(format!("unsupported statement {}", describe(other))))
            }
        }
    }

    fn class_definition(&mut self, name: &str) -> Result<(), Error> {
        self.expect_punct('=')?;
        let glyphs = self.glyph_set()?;
        self.expect_punct(';')?;
        self.classes.insert(name.to_string(), glyphs);
        Ok(())
    }

    fn feature_block(&mut self) -> Result<(), Error> {
        let tag_name = self.expect_name()?;
        self.pos -= 1;
        let tag = self.expect_tag()?;
        self.expect_punct('{')?;
        let mut block = Block::default();
        while self.peek() != Some(Token::Punct('}')) {
            match self.peek() {
                Some(Token::Name("lookup")) => {
                    self.pos += 1;
                    let idx = self.lookup_block(Some(&mut block))?;
                    block.lookups.push(idx);
                    block.open = None;
                }
                _ => self.block_statement(&mut block)?,
            }
        }
        self.close_block(tag_name)?;
        log::debug!("feature '{tag}' has {} lookups", block.lookups.len());
        self.gsub.features.push((tag, block.lookups));
        Ok(())
    }

    /// Parse a named lookup block, or a reference to one when inside a
    /// feature. Returns the index of the lookup.
    fn lookup_block(&mut self, feature: Option<&mut Block>) -> Result<u16, Error> {
        let name = self.expect_name()?;
        let name_line = self.tokens[self.pos - 1].1;
        if self.peek() == Some(Token::Punct(';')) {
            if feature.is_none() {
                return Err(Error::feature(name_line, "lookup references are only allowed in features"));
            }
            self.pos += 1;
            return self
                .named_lookups
                .get(name)
                .copied()
                .ok_or_else(|| Error::feature(name_line, format!("unknown lookup '{name}'")));
        }
        if self.named_lookups.contains_key(name) {
            return Err(Error::feature(name_line, format!("lookup '{name}' is already defined")));
        }
        self.expect_punct('{')?;

        let mut block = Block {
            name: Some(name.to_string()),
            ..Default::default()
        };
        if let Some(feature) = feature {
            block.flag = feature.flag;
            block.mark_filtering_set = feature.mark_filtering_set;
        }
        let idx = self.push_lookup(&block, LookupKind::Single(BTreeMap::new()))?;
        block.open = Some(idx);
        while self.peek() != Some(Token::Punct('}')) {
            if self.peek() == Some(Token::Name("lookup")) {
                return Err(self.error("lookups can't be nested"));
            }
            self.block_statement(&mut block)?;
        }
        self.close_block(name)?;
        let idx = idx as u16;
        self.named_lookups.insert(name.to_string(), idx);
        Ok(idx)
    }

    fn block_statement(&mut self, block: &mut Block) -> Result<(), Error> {
        match self.next()? {
            Token::Class(name) => self.class_definition(name),
            Token::Name("lookupflag") => self.lookup_flag(block),
            Token::Name("sub" | "substitute") => {
                let line = self.tokens[self.pos - 1].1;
                let rule = self.substitution(line)?;
                self.add_rule(block, rule, line)
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("unsupported statement {}", describe(other))))
            }
        }
    }

    fn lookup_flag(&mut self, block: &mut Block) -> Result<(), Error> {
        let mut flag = LookupFlag::empty();
        let mut mark_filtering_set = None;
        loop {
            match self.next()? {
                Token::Punct(';') => break,
                Token::Name("0") => (),
                Token::Name("IgnoreBaseGlyphs") => flag |= LookupFlag::IGNORE_BASE_GLYPHS,
                Token::Name("IgnoreLigatures") => flag |= LookupFlag::IGNORE_LIGATURES,
                Token::Name("IgnoreMarks") => flag |= LookupFlag::IGNORE_MARKS,
                Token::Name("UseMarkFilteringSet") => {
                    let glyphs = self.glyph_set()?;
                    flag |= LookupFlag::USE_MARK_FILTERING_SET;
                    mark_filtering_set = Some(self.mark_filtering_set(glyphs.into_iter().collect())?);
                }
                other => {
                    self.pos -= 1;
                    return Err(self.error(format!("unsupported lookup flag {}", describe(other))));
                }
            }
        }
        block.flag = flag;
        block.mark_filtering_set = mark_filtering_set;
        Ok(())
    }

    /// The index of a mark glyph set, adding it to GDEF if it is new.
    fn mark_filtering_set(&mut self, set: Coverage) -> Result<u16, Error> {
        let sets = &mut self.gdef.mark_glyph_sets;
        let idx = match sets.iter().position(|existing| *existing == set) {
            Some(idx) => idx,
            None => {
                sets.push(set);
                sets.len() - 1
            }
        };
        u16::try_from(idx).map_err(|_| self.error("too many mark filtering sets"))
    }

    /// A glyph name, a class reference, or a bracketed list of either.
    fn glyph_set(&mut self) -> Result<Vec<u16>, Error> {
        match self.next()? {
            Token::Punct('[') => {
                let mut glyphs = Vec::new();
                loop {
                    match self.next()? {
                        Token::Punct(']') => break,
                        Token::Name(name) => glyphs.push(self.glyph_id(name)?),
                        Token::Class(name) => glyphs.extend(self.class(name)?),
                        other => {
                            self.pos -= 1;
                            return Err(self.error(format!(
                                "expected a glyph or class, found {}",
                                describe(other)
                            )));
                        }
                    }
                }
                Ok(glyphs)
            }
            Token::Name(name) => Ok(vec![self.glyph_id(name)?]),
            Token::Class(name) => self.class(name),
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected a glyph or class, found {}", describe(other))))
            }
        }
    }

    fn glyph_id(&self, name: &str) -> Result<u16, Error> {
        self.glyphs.get(name).copied().ok_or_else(|| {
            Error::feature(self.tokens[self.pos - 1].1, format!("unknown glyph '{name}'"))
        })
    }

    fn class(&self, name: &str) -> Result<Vec<u16>, Error> {
        self.classes.get(name).cloned().ok_or_else(|| {
            Error::feature(self.tokens[self.pos - 1].1, format!("unknown class '@{name}'"))
        })
    }

    fn substitution(&mut self, line: usize) -> Result<Rule, Error> {
        let mut sequence: Vec<(Vec<u16>, bool)> = Vec::new();
        while self.peek() != Some(Token::Name("by")) {
            let glyphs = self.glyph_set()?;
            let marked = self.peek() == Some(Token::Punct('\''));
            if marked {
                self.pos += 1;
            }
            sequence.push((glyphs, marked));
        }
        self.pos += 1;
        let mut replacement = Vec::new();
        while self.peek() != Some(Token::Punct(';')) {
            replacement.push(self.glyph_set()?);
        }
        self.pos += 1;

        let [replacement] = replacement.as_slice() else {
            return Err(Error::feature(line, "only single and ligature substitutions are supported"));
        };
        let first_marked = sequence.iter().position(|(_, marked)| *marked);
        let Some(first_marked) = first_marked else {
            return match sequence.as_slice() {
                [] => Err(Error::feature(line, "empty substitution")),
                [(input, _)] => Ok(Rule::Single(single_pairs(input, replacement, line)?)),
                components => ligatures(components, replacement, line).map(Rule::Ligature),
            };
        };

        let num_marked = sequence.iter().filter(|(_, marked)| *marked).count();
        if num_marked != 1 {
            return Err(Error::feature(
                line,
                "contextual rules must mark exactly one glyph",
            ));
        }
        let coverage = |glyphs: &Vec<u16>| glyphs.iter().copied().collect::<Coverage>();
        let (input, _) = &sequence[first_marked];
        let substitutions = single_pairs(input, replacement, line)?;
        let rule = ChainRule {
            backtrack: sequence[..first_marked]
                .iter()
                .map(|(glyphs, _)| coverage(glyphs))
                .collect(),
            input: vec![coverage(input)],
            lookahead: sequence[first_marked + 1..]
                .iter()
                .map(|(glyphs, _)| coverage(glyphs))
                .collect(),
            lookups: Vec::new(),
        };
        Ok(Rule::Contextual {
            rule,
            substitutions,
        })
    }

    fn push_lookup(&mut self, block: &Block, kind: LookupKind) -> Result<usize, Error> {
        if self.gsub.lookups.len() >= u16::MAX as usize {
            return Err(self.error("too many lookups"));
        }
        self.gsub.lookups.push(Lookup {
            flag: block.flag,
            mark_filtering_set: block.mark_filtering_set,
            kind,
        });
        Ok(self.gsub.lookups.len() - 1)
    }

    /// The lookup a rule goes into: the block's open lookup if it has the
    /// same type and flags, or a new one.
    fn target_lookup(&mut self, block: &mut Block, kind: LookupKind, line: usize) -> Result<usize, Error> {
        if let Some(idx) = block.open {
            let lookup = &mut self.gsub.lookups[idx];
            let same_kind = discriminant(&lookup.kind) == discriminant(&kind);
            let same_flags =
                lookup.flag == block.flag && lookup.mark_filtering_set == block.mark_filtering_set;
            if same_kind && same_flags {
                return Ok(idx);
            }
            if let Some(name) = &block.name {
                if block.num_rules > 0 {
                    return Err(Error::feature(
                        line,
                        format!("lookup '{name}' mixes rule types or flags"),
                    ));
                }
                lookup.kind = kind;
                lookup.flag = block.flag;
                lookup.mark_filtering_set = block.mark_filtering_set;
                return Ok(idx);
            }
        }
        let idx = self.push_lookup(block, kind)?;
        block.open = Some(idx);
        block.lookups.push(idx as u16);
        Ok(idx)
    }

    fn add_rule(&mut self, block: &mut Block, rule: Rule, line: usize) -> Result<(), Error> {
        let idx = self.target_lookup(block, rule.empty_kind(), line)?;
        let anonymous_idx = self.anonymous.len();
        if let Rule::Contextual { substitutions, .. } = &rule {
            self.anonymous.push(Lookup {
                flag: block.flag,
                mark_filtering_set: block.mark_filtering_set,
                kind: LookupKind::Single(substitutions.iter().copied().collect()),
            });
        }
        match (&mut self.gsub.lookups[idx].kind, rule) {
            (LookupKind::Single(map), Rule::Single(pairs)) => {
                for (target, replacement) in pairs {
                    let existing = *map.entry(target).or_insert(replacement);
                    if existing != replacement {
                        log::warn!("line {line}: glyph {target} is already substituted in this lookup");
                    }
                }
            }
            (LookupKind::Ligature(sets), Rule::Ligature(ligatures)) => {
                for (first, ligature) in ligatures {
                    let set = sets.entry(first).or_default();
                    if set.iter().any(|lig| lig.components == ligature.components) {
                        log::warn!("line {line}: duplicate ligature for glyph {first}");
                    } else {
                        set.push(ligature);
                    }
                }
            }
            (LookupKind::ChainContext(rules), Rule::Contextual { mut rule, .. }) => {
                // resolved to a real index once all lookups are known
                rule.lookups.push((0, anonymous_idx as u16));
                rules.push(rule);
            }
            _ => return Err(Error::feature(line, "rule does not match its lookup type")),
        }
        block.num_rules += 1;
        Ok(())
    }

    fn table_block(&mut self) -> Result<(), Error> {
        let name = self.expect_name()?;
        if name != "GDEF" {
            self.pos -= 1;
            return Err(self.error(format!("unsupported table '{name}'")));
        }
        self.expect_punct('{')?;
        while self.peek() != Some(Token::Punct('}')) {
            match self.next()? {
                Token::Name("GlyphClassDef") => self.glyph_class_def()?,
                other => {
                    self.pos -= 1;
                    return Err(self.error(format!(
                        "unsupported GDEF statement {}",
                        describe(other)
                    )));
                }
            }
        }
        self.close_block(name)
    }

    /// `GlyphClassDef base, ligature, mark, component;` where any of the
    /// four may be left empty.
    fn glyph_class_def(&mut self) -> Result<(), Error> {
        let mut class = 1;
        loop {
            match self.peek() {
                Some(Token::Punct(',')) => {
                    self.pos += 1;
                    class += 1;
                    if class > 4 {
                        return Err(self.error("GlyphClassDef takes four classes"));
                    }
                }
                Some(Token::Punct(';')) => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => {
                    for gid in self.glyph_set()? {
                        self.gdef.glyph_classes.set(gid, class);
                    }
                }
            }
        }
    }

    fn finish(mut self) -> Features {
        let offset = self.gsub.lookups.len() as u16;
        for lookup in &mut self.gsub.lookups {
            if let LookupKind::ChainContext(rules) = &mut lookup.kind {
                for (_, idx) in rules.iter_mut().flat_map(|rule| rule.lookups.iter_mut()) {
                    *idx += offset;
                }
            }
        }
        self.gsub.lookups.extend(self.anonymous);
        log::info!(
            "compiled {} features with {} lookups",
            self.gsub.features.len(),
            self.gsub.lookups.len()
        );
        Features {
            gsub: self.gsub,
            gdef: self.gdef,
        }
    }
}

fn describe(token: Token) -> String {
    match token {
        Token::Name(name) => format!("'{name}'"),
        Token::Class(name) => format!("'@{name}'"),
        Token::Punct(c) => format!("'{c}'"),
    }
}

/// Pair up the glyphs of a single substitution: class to class, or class
/// to one glyph.
fn single_pairs(input: &[u16], replacement: &[u16], line: usize) -> Result<Vec<(u16, u16)>, Error> {
    match replacement {
        [glyph] => Ok(input.iter().map(|gid| (*gid, *glyph)).collect()),
        _ if replacement.len() == input.len() => {
            Ok(input.iter().copied().zip(replacement.iter().copied()).collect())
        }
        _ => Err(Error::feature(
            line,
            format!(
                "cannot substitute {} glyphs by {} glyphs",
                input.len(),
                replacement.len()
            ),
        )),
    }
}

/// Every ligature a sequence of classes describes.
fn ligatures(
    components: &[(Vec<u16>, bool)],
    replacement: &[u16],
    line: usize,
) -> Result<Vec<(u16, Ligature)>, Error> {
    let [glyph] = replacement else {
        return Err(Error::feature(line, "a ligature must be replaced by one glyph"));
    };
    let mut sequences: Vec<Vec<u16>> = vec![Vec::new()];
    for (glyphs, _) in components {
        sequences = sequences
            .iter()
            .flat_map(|prefix| {
                glyphs.iter().map(move |gid| {
                    let mut sequence = prefix.clone();
                    sequence.push(*gid);
                    sequence
                })
            })
            .collect();
    }
    Ok(sequences
        .into_iter()
        .filter_map(|sequence| {
            let (first, rest) = sequence.split_first()?;
            Some((
                *first,
                Ligature {
                    components: rest.to_vec(),
                    glyph: *glyph,
                },
            ))
        })
        .collect())
}
