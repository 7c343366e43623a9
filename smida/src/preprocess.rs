//! Conditional preprocessing of feature files.
//!
//! Feature sources shared between the styles of a family use C-style
//! directives to select the rules for one style:
//!
//! ```text
//! #ifdef ITALIC
//! sub a by a.ss01;
//! #else
//! sub a by a.ss02;
//! #endif
//! ```
//!
//! Directives and lines in disabled branches are replaced by empty lines,
//! so line numbers in the output match the input. Any other line starting
//! with `#` is a feature file comment and is kept.

use std::collections::HashMap;

use crate::Error;

#[derive(Clone, Debug, Default)]
pub struct Preprocessor {
    macros: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug)]
struct Branch {
    /// The line of the opening `#ifdef`/`#ifndef`.
    line: usize,
    parent_active: bool,
    taken: bool,
    seen_else: bool,
}

impl Branch {
    fn active(&self) -> bool {
        self.parent_active && self.taken
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a macro with an empty expansion.
    pub fn define(&mut self, name: impl Into<String>) {
        self.macros.insert(name.into(), String::new());
    }

    pub fn define_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.macros.insert(name.into(), value.into());
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Expand `text`.
    ///
    /// Definitions made by the text itself stay in effect afterwards.
    pub fn run(&mut self, text: &str) -> Result<String, Error> {
        let mut out = String::with_capacity(text.len());
        let mut branches: Vec<Branch> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let active = branches.last().map_or(true, Branch::active);
            match Directive::parse(raw) {
                Some((directive, rest)) => {
                    let name = rest.split_whitespace().next();
                    let need_name = || {
                        name.ok_or_else(|| Error::Preprocess {
                            line,
                            message: format!("{directive:?} needs a macro name"),
                        })
                    };
                    match directive {
                        Directive::Define if active => {
                            let name = need_name()?;
                            let value = rest.trim_start()[name.len()..].trim();
                            self.define_value(name, value);
                        }
                        Directive::Undef if active => {
                            self.macros.remove(need_name()?);
                        }
                        Directive::Define | Directive::Undef => (),
                        Directive::IfDef | Directive::IfNDef => {
                            let defined = self.is_defined(need_name()?);
                            branches.push(Branch {
                                line,
                                parent_active: active,
                                taken: defined == (directive == Directive::IfDef),
                                seen_else: false,
                            });
                        }
                        Directive::Else => {
                            let branch = branches.last_mut().ok_or_else(|| Error::Preprocess {
                                line,
                                message: "#else without #ifdef".into(),
                            })?;
                            if branch.seen_else {
                                return Err(Error::Preprocess {
                                    line,
                                    message: format!(
                                        "second #else for the conditional on line {}",
                                        branch.line
                                    ),
                                });
                            }
                            branch.seen_else = true;
                            branch.taken = !branch.taken;
                        }
                        Directive::EndIf => {
                            branches.pop().ok_or_else(|| Error::Preprocess {
                                line,
                                message: "#endif without #ifdef".into(),
                            })?;
                        }
                    }
                }
                None if active => out.push_str(&self.expand(raw)),
                None => (),
            }
            out.push('\n');
        }

        if let Some(branch) = branches.first() {
            return Err(Error::Preprocess {
                line: branch.line,
                message: "unterminated conditional".into(),
            });
        }
        Ok(out)
    }

    /// Replace macro names with their values, outside of comments.
    fn expand(&self, line: &str) -> String {
        if self.macros.is_empty() {
            return line.to_string();
        }
        let (code, comment) = match line.find('#') {
            Some(pos) => line.split_at(pos),
            None => (line, ""),
        };
        let mut out = String::with_capacity(line.len());
        let mut word = String::new();
        let flush = |word: &mut String, out: &mut String| {
            match self.macros.get(word.as_str()) {
                Some(value) => out.push_str(value),
                None => out.push_str(word),
            }
            word.clear();
        };
        for c in code.chars() {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.') {
                word.push(c);
            } else {
                flush(&mut word, &mut out);
                out.push(c);
            }
        }
        flush(&mut word, &mut out);
        out.push_str(comment);
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Directive {
    Define,
    Undef,
    IfDef,
    IfNDef,
    Else,
    EndIf,
}

impl Directive {
    /// Split a directive line into its directive and the rest of the line.
    fn parse(line: &str) -> Option<(Self, &str)> {
        let body = line.trim_start().strip_prefix('#')?;
        let end = body
            .find(|c: char| c.is_whitespace())
            .unwrap_or(body.len());
        let directive = match &body[..end] {
            "define" => Directive::Define,
            "undef" => Directive::Undef,
            "ifdef" => Directive::IfDef,
            "ifndef" => Directive::IfNDef,
            "else" => Directive::Else,
            "endif" => Directive::EndIf,
            _ => return None,
        };
        Some((directive, &body[end..]))
    }
}
