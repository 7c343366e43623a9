//! The [CFF (Compact Font Format)](https://adobe-type-tools.github.io/font-tech-notes/pdfs/5176.CFF.pdf) table
//!
//! Offsets inside CFF are relative to the start of the table, so unlike the
//! other tables here the whole table is compiled to bytes up front.

use indexmap::IndexSet;
use write_fonts::{
    read::TopLevelTable,
    types::Tag,
    validate::{Validate, ValidationCtx},
    FontWrite, TableWriter,
};

use super::GlyphRemap;
use crate::{font::NOTDEF, hint::Charstring};

/// The number of predefined strings; custom strings start at this SID.
const STANDARD_STRINGS: usize = 391;

mod op {
    pub const VERSION: u16 = 0;
    pub const NOTICE: u16 = 1;
    pub const FULL_NAME: u16 = 2;
    pub const FAMILY_NAME: u16 = 3;
    pub const WEIGHT: u16 = 4;
    pub const FONT_BBOX: u16 = 5;
    pub const BLUE_VALUES: u16 = 6;
    pub const CHARSET: u16 = 15;
    pub const CHAR_STRINGS: u16 = 17;
    pub const PRIVATE: u16 = 18;
    pub const DEFAULT_WIDTH_X: u16 = 20;
    pub const NOMINAL_WIDTH_X: u16 = 21;
    // two byte operators, as 12 << 8 | op
    pub const COPYRIGHT: u16 = 0x0c00;
    pub const ITALIC_ANGLE: u16 = 0x0c02;
    pub const UNDERLINE_POSITION: u16 = 0x0c03;
    pub const UNDERLINE_THICKNESS: u16 = 0x0c04;
}

/// The Top DICT values that aren't offsets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopDict {
    pub version: String,
    pub notice: Option<String>,
    pub copyright: Option<String>,
    pub full_name: String,
    pub family_name: String,
    pub weight: String,
    pub italic_angle: f64,
    pub underline_position: i32,
    pub underline_thickness: i32,
    /// `[xMin, yMin, xMax, yMax]`
    pub font_bbox: [i32; 4],
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrivateDict {
    /// Alignment zone pairs, as absolute values.
    pub blue_values: Vec<i32>,
    pub default_width_x: i32,
    pub nominal_width_x: i32,
}

/// A single-font CFF table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cff {
    pub font_name: String,
    pub top_dict: TopDict,
    pub private_dict: PrivateDict,
    /// Glyph names in glyph order, starting with `.notdef`.
    pub glyph_names: Vec<String>,
    pub charstrings: Vec<Charstring>,
}

impl Cff {
    /// Keep only the glyphs that survive the remap.
    pub fn remap(&mut self, remap: &GlyphRemap) {
        let kept: Vec<_> = remap.kept().map(usize::from).collect();
        self.glyph_names = kept
            .iter()
            .filter_map(|gid| self.glyph_names.get(*gid).cloned())
            .collect();
        self.charstrings = kept
            .iter()
            .filter_map(|gid| self.charstrings.get(*gid).cloned())
            .collect();
    }

    /// Compile the table.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut strings = IndexSet::new();
        let mut sid = |s: &str| -> i32 {
            let (idx, _) = strings.insert_full(s.to_string());
            (STANDARD_STRINGS + idx) as i32
        };

        // Top DICT operands that don't depend on layout
        let mut head = DictWriter::default();
        head.op(&[Operand::Int(sid(&self.top_dict.version))], op::VERSION);
        if let Some(notice) = &self.top_dict.notice {
            head.op(&[Operand::Int(sid(notice))], op::NOTICE);
        }
        if let Some(copyright) = &self.top_dict.copyright {
            head.op(&[Operand::Int(sid(copyright))], op::COPYRIGHT);
        }
        head.op(&[Operand::Int(sid(&self.top_dict.full_name))], op::FULL_NAME);
        head.op(&[Operand::Int(sid(&self.top_dict.family_name))], op::FAMILY_NAME);
        head.op(&[Operand::Int(sid(&self.top_dict.weight))], op::WEIGHT);
        if self.top_dict.italic_angle != 0.0 {
            head.op(&[Operand::Real(self.top_dict.italic_angle)], op::ITALIC_ANGLE);
        }
        head.op(
            &[Operand::Int(self.top_dict.underline_position)],
            op::UNDERLINE_POSITION,
        );
        head.op(
            &[Operand::Int(self.top_dict.underline_thickness)],
            op::UNDERLINE_THICKNESS,
        );
        head.op(
            &self.top_dict.font_bbox.map(Operand::Int),
            op::FONT_BBOX,
        );

        let mut charset = vec![0u8];
        for name in self.glyph_names.iter().skip(1) {
            charset.extend((sid(name) as u16).to_be_bytes());
        }

        let mut private = DictWriter::default();
        if !self.private_dict.blue_values.is_empty() {
            let mut last = 0;
            let deltas: Vec<Operand> = self
                .private_dict
                .blue_values
                .iter()
                .map(|value| {
                    let delta = value - last;
                    last = *value;
                    Operand::Int(delta)
                })
                .collect();
            private.op(&deltas, op::BLUE_VALUES);
        }
        private.op(&[Operand::Int(self.private_dict.default_width_x)], op::DEFAULT_WIDTH_X);
        private.op(&[Operand::Int(self.private_dict.nominal_width_x)], op::NOMINAL_WIDTH_X);
        let private = private.finish();

        let name_index = index([self.font_name.as_bytes()]);
        let string_index = index(strings.iter().map(String::as_bytes));
        let global_subrs = index(std::iter::empty::<&[u8]>());
        let charstrings = index(self.charstrings.iter().map(Charstring::as_bytes));

        // offsets are 5 byte integers, so the size of the Top DICT is known
        // before the offsets are
        let top_dict_len = head.len() + 4 * 5 + 3;
        let top_index_len = index_len(&[top_dict_len]);
        let header_len = 4;
        let charset_offset =
            header_len + name_index.len() + top_index_len + string_index.len() + global_subrs.len();
        let charstrings_offset = charset_offset + charset.len();
        let private_offset = charstrings_offset + charstrings.len();

        let mut top = head;
        top.op(&[Operand::Offset(charset_offset as i32)], op::CHARSET);
        top.op(
            &[Operand::Offset(charstrings_offset as i32)],
            op::CHAR_STRINGS,
        );
        top.op(
            &[
                Operand::Offset(private.len() as i32),
                Operand::Offset(private_offset as i32),
            ],
            op::PRIVATE,
        );
        let top = top.finish();
        debug_assert_eq!(top.len(), top_dict_len);

        let mut out = Vec::with_capacity(private_offset + private.len());
        // major, minor, hdrSize, offSize
        out.extend([1, 0, header_len as u8, 4]);
        out.extend(name_index);
        out.extend(index([top.as_slice()]));
        out.extend(string_index);
        out.extend(global_subrs);
        out.extend(charset);
        out.extend(charstrings);
        out.extend(private);
        out
    }
}

impl TopLevelTable for Cff {
    const TAG: Tag = Tag::new(b"CFF ");
}

impl FontWrite for Cff {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write_slice(&self.to_bytes())
    }
}

impl Validate for Cff {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        ctx.in_table("CFF", |ctx| {
            if self.glyph_names.len() != self.charstrings.len() {
                ctx.report("glyph names and charstrings differ in length");
            }
            if self.glyph_names.first().map(String::as_str) != Some(NOTDEF) {
                ctx.report("the first glyph must be .notdef");
            }
            if self.glyph_names.len() > u16::MAX as usize {
                ctx.report("too many glyphs");
            }
            if self.font_name.is_empty() || self.font_name.len() > 127 {
                ctx.report("font name must be 1 to 127 bytes");
            }
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Operand {
    Int(i32),
    Real(f64),
    /// Always five bytes.
    Offset(i32),
}

#[derive(Default)]
struct DictWriter {
    bytes: Vec<u8>,
}

impl DictWriter {
    fn op(&mut self, operands: &[Operand], op: u16) {
        for operand in operands {
            match *operand {
                Operand::Int(value) => encode_int(value, &mut self.bytes),
                Operand::Real(value) if value.fract() == 0.0 && value.abs() < 1e9 => {
                    encode_int(value as i32, &mut self.bytes)
                }
                Operand::Real(value) => encode_real(value, &mut self.bytes),
                Operand::Offset(value) => {
                    self.bytes.push(29);
                    self.bytes.extend(value.to_be_bytes());
                }
            }
        }
        if op > 0xff {
            self.bytes.extend(op.to_be_bytes());
        } else {
            self.bytes.push(op as u8);
        }
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// DICT integers; anything wider than 16 bits takes the 5-byte form.
fn encode_int(value: i32, out: &mut Vec<u8>) {
    match i16::try_from(value) {
        Ok(value) => encode_short_int(value, out),
        Err(_) => {
            out.push(29);
            out.extend(value.to_be_bytes());
        }
    }
}

/// The 1, 2 and 3 byte integer forms, which DICTs and Type 2 charstrings
/// share.
pub(crate) fn encode_short_int(value: i16, out: &mut Vec<u8>) {
    match value {
        -107..=107 => out.push((value + 139) as u8),
        108..=1131 => {
            let v = value - 108;
            out.extend([((v >> 8) + 247) as u8, (v & 0xff) as u8]);
        }
        -1131..=-108 => {
            let v = -value - 108;
            out.extend([((v >> 8) + 251) as u8, (v & 0xff) as u8]);
        }
        _ => {
            out.push(28);
            out.extend(value.to_be_bytes());
        }
    }
}

/// The BCD real number encoding.
fn encode_real(value: f64, out: &mut Vec<u8>) {
    let text = format!("{value}");
    let mut nibbles = Vec::with_capacity(text.len() + 2);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '0'..='9' => nibbles.push(c as u8 - b'0'),
            '.' => nibbles.push(0xa),
            '-' => nibbles.push(0xe),
            'e' | 'E' => {
                if chars.peek() == Some(&'-') {
                    chars.next();
                    nibbles.push(0xc);
                } else {
                    nibbles.push(0xb);
                }
            }
            _ => (),
        }
    }
    nibbles.push(0xf);
    if nibbles.len() % 2 == 1 {
        nibbles.push(0xf);
    }
    out.push(30);
    out.extend(nibbles.chunks(2).map(|pair| pair[0] << 4 | pair[1]));
}

/// The smallest offset size that can hold `max_offset`.
fn off_size(max_offset: usize) -> u8 {
    match max_offset {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x10000..=0xff_ffff => 3,
        _ => 4,
    }
}

fn index_len(item_lens: &[usize]) -> usize {
    if item_lens.is_empty() {
        return 2;
    }
    let data_len: usize = item_lens.iter().sum();
    let off_size = off_size(data_len + 1) as usize;
    2 + 1 + (item_lens.len() + 1) * off_size + data_len
}

/// An INDEX of the given items.
fn index<'a>(items: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let items: Vec<&[u8]> = items.into_iter().collect();
    let mut out = Vec::new();
    out.extend((items.len() as u16).to_be_bytes());
    if items.is_empty() {
        return out;
    }
    let data_len: usize = items.iter().map(|item| item.len()).sum();
    let off_size = off_size(data_len + 1);
    out.push(off_size);
    let mut offset = 1u32;
    let write_offset = |offset: u32, out: &mut Vec<u8>| {
        out.extend(&offset.to_be_bytes()[4 - off_size as usize..]);
    };
    write_offset(offset, &mut out);
    for item in &items {
        offset += item.len() as u32;
        write_offset(offset, &mut out);
    }
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    /// Read an INDEX, returning its items and the position after it.
    fn read_index(data: &[u8], pos: usize) -> (Vec<&[u8]>, usize) {
        let count = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        if count == 0 {
            return (Vec::new(), pos + 2);
        }
        let off_size = data[pos + 2] as usize;
        let read_offset = |i: usize| {
            let start = pos + 3 + i * off_size;
            data[start..start + off_size]
                .iter()
                .fold(0usize, |acc, b| acc << 8 | *b as usize)
        };
        let data_start = pos + 3 + (count + 1) * off_size - 1;
        let items = (0..count)
            .map(|i| &data[data_start + read_offset(i)..data_start + read_offset(i + 1)])
            .collect();
        (items, data_start + read_offset(count))
    }

    /// Decode a DICT into `(operator, operands)` pairs, ignoring reals.
    fn read_dict(data: &[u8]) -> Vec<(u16, Vec<i32>)> {
        let mut entries = Vec::new();
        let mut operands = Vec::new();
        let mut i = 0;
        while i < data.len() {
            let b0 = data[i];
            match b0 {
                0..=21 => {
                    let op = if b0 == 12 {
                        i += 1;
                        0x0c00 | data[i] as u16
                    } else {
                        b0 as u16
                    };
                    entries.push((op, std::mem::take(&mut operands)));
                    i += 1;
                }
                28 => {
                    operands.push(i16::from_be_bytes([data[i + 1], data[i + 2]]) as i32);
                    i += 3;
                }
                29 => {
                    operands.push(i32::from_be_bytes([
                        data[i + 1],
                        data[i + 2],
                        data[i + 3],
                        data[i + 4],
                    ]));
                    i += 5;
                }
                30 => {
                    while data[i] & 0x0f != 0x0f && data[i] >> 4 != 0x0f {
                        i += 1;
                    }
                    operands.push(i32::MIN);
                    i += 1;
                }
                32..=246 => {
                    operands.push(b0 as i32 - 139);
                    i += 1;
                }
                247..=250 => {
                    operands.push((b0 as i32 - 247) * 256 + data[i + 1] as i32 + 108);
                    i += 2;
                }
                251..=254 => {
                    operands.push(-(b0 as i32 - 251) * 256 - data[i + 1] as i32 - 108);
                    i += 2;
                }
                _ => panic!("unexpected DICT byte {b0}"),
            }
        }
        entries
    }

    fn operand(dict: &[(u16, Vec<i32>)], op: u16) -> Vec<i32> {
        dict.iter()
            .find(|(o, _)| *o == op)
            .map(|(_, operands)| operands.clone())
            .unwrap_or_else(|| panic!("missing operator {op}"))
    }

    fn sample() -> Cff {
        Cff {
            font_name: "Test-Regular".into(),
            top_dict: TopDict {
                version: "1.000".into(),
                notice: None,
                copyright: Some("Copyright".into()),
                full_name: "Test Regular".into(),
                family_name: "Test".into(),
                weight: "Regular".into(),
                italic_angle: -12.5,
                underline_position: -100,
                underline_thickness: 50,
                font_bbox: [-20, -250, 1000, 900],
            },
            private_dict: PrivateDict {
                blue_values: vec![-10, 0, 500, 510],
                default_width_x: 500,
                nominal_width_x: 600,
            },
            glyph_names: vec![NOTDEF.into(), "A".into()],
            charstrings: vec![
                Charstring::from_bytes(vec![14]),
                Charstring::from_bytes(vec![189, 14]),
            ],
        }
    }

    #[test]
    fn table_structure() {
        let cff = sample();
        let data = cff.to_bytes();
        assert_eq!(&data[..4], &[1, 0, 4, 4]);

        let (names, pos) = read_index(&data, 4);
        assert_eq!(names, [b"Test-Regular".as_slice()]);
        let (top_dicts, pos) = read_index(&data, pos);
        assert_eq!(top_dicts.len(), 1);
        let (strings, pos) = read_index(&data, pos);
        let strings: Vec<_> = strings
            .iter()
            .map(|s| std::str::from_utf8(s).unwrap())
            .collect();
        assert_eq!(
            strings,
            ["1.000", "Copyright", "Test Regular", "Test", "Regular", "A"]
        );
        let (global_subrs, _) = read_index(&data, pos);
        assert!(global_subrs.is_empty());

        let top = read_dict(top_dicts[0]);
        assert_eq!(operand(&top, op::VERSION), [391]);
        assert_eq!(operand(&top, op::FONT_BBOX), [-20, -250, 1000, 900]);
        assert_eq!(operand(&top, op::UNDERLINE_POSITION), [-100]);

        // charset format 0, then the SID of "A"
        let charset = operand(&top, op::CHARSET)[0] as usize;
        assert_eq!(&data[charset..charset + 3], &[0, 1, 140]);

        let charstrings_offset = operand(&top, op::CHAR_STRINGS)[0] as usize;
        let (charstrings, _) = read_index(&data, charstrings_offset);
        assert_eq!(charstrings, [[14].as_slice(), [189, 14].as_slice()]);

        let private = operand(&top, op::PRIVATE);
        let (size, offset) = (private[0] as usize, private[1] as usize);
        assert_eq!(offset + size, data.len());
        let private = read_dict(&data[offset..offset + size]);
        assert_eq!(operand(&private, op::BLUE_VALUES), [-10, 10, 500, 10]);
        assert_eq!(operand(&private, op::DEFAULT_WIDTH_X), [500]);
        assert_eq!(operand(&private, op::NOMINAL_WIDTH_X), [600]);
    }

    #[test]
    fn upright_fonts_have_no_italic_angle() {
        let mut cff = sample();
        cff.top_dict.italic_angle = 0.0;
        let data = cff.to_bytes();
        let (_, pos) = read_index(&data, 4);
        let (top_dicts, _) = read_index(&data, pos);
        let top = read_dict(top_dicts[0]);
        assert!(top.iter().all(|(op, _)| *op != op::ITALIC_ANGLE));
    }

    #[test]
    fn remap_keeps_names_and_charstrings_together() {
        let mut cff = sample();
        cff.remap(&GlyphRemap::new(2, |gid| gid == 0));
        assert_eq!(cff.glyph_names, [NOTDEF]);
        assert_eq!(cff.charstrings.len(), 1);
        assert!(cff.validate().is_ok());
    }

    #[rstest]
    #[case(-12.5, &[30, 0xe1, 0x2a, 0x5f])]
    #[case(0.25, &[30, 0x0a, 0x25, 0xff])]
    #[case(-1.0e-7, &[30, 0xe0, 0xa0, 0x00, 0x00, 0x01, 0xff])]
    fn real_numbers(#[case] value: f64, #[case] expected: &[u8]) {
        let mut out = Vec::new();
        encode_real(value, &mut out);
        assert_eq!(out, expected);
    }

    #[rstest]
    #[case(0, &[139])]
    #[case(-1131, &[254, 255])]
    #[case(32767, &[28, 0x7f, 0xff])]
    #[case(-32769, &[29, 0xff, 0xff, 0x7f, 0xff])]
    #[case(100000, &[29, 0, 1, 0x86, 0xa0])]
    fn integers(#[case] value: i32, #[case] expected: &[u8]) {
        let mut out = Vec::new();
        encode_int(value, &mut out);
        assert_eq!(out, expected);
    }

    #[test]
    fn empty_index() {
        assert_eq!(index(std::iter::empty::<&[u8]>()), [0, 0]);
        assert_eq!(index([b"ab".as_slice()]), [0, 1, 1, 1, 3, b'a', b'b']);
    }
}
