//! Encoding bez commands as Type 2 charstrings.
//!
//! See the [Type 2 Charstring Format](https://adobe-type-tools.github.io/font-tech-notes/pdfs/5177.Type2.pdf).

use super::bez::{BezPoint, Command, Stem};
use crate::tables::cff::encode_short_int;

/// The maximum number of operands on the Type 2 argument stack.
const MAX_STACK: usize = 48;

mod op {
    pub const HSTEM: u8 = 1;
    pub const VSTEM: u8 = 3;
    pub const VMOVETO: u8 = 4;
    pub const RLINETO: u8 = 5;
    pub const HLINETO: u8 = 6;
    pub const VLINETO: u8 = 7;
    pub const RRCURVETO: u8 = 8;
    pub const ENDCHAR: u8 = 14;
    pub const HSTEMHM: u8 = 18;
    pub const HINTMASK: u8 = 19;
    pub const RMOVETO: u8 = 21;
    pub const HMOVETO: u8 = 22;
    pub const VSTEMHM: u8 = 23;
    pub const ESCAPE: u8 = 12;
    pub const FLEX: u8 = 35;
}

/// The default flex depth, in hundredths of a device pixel.
const FLEX_DEPTH: f64 = 50.0;

/// Append a Type 2 number operand.
///
/// Integers use the short forms and anything else the 16.16 form, so every
/// operand must be within the 16.16 range.
pub fn push_number(out: &mut Vec<u8>, value: f64) -> Result<(), String> {
    if !(-32768.0..32768.0).contains(&value) {
        return Err(format!("operand {value} is out of the charstring number range"));
    }
    if value.fract() == 0.0 {
        encode_short_int(value as i16, out);
    } else {
        out.push(255);
        out.extend(((value * 65536.0).round() as i32).to_be_bytes());
    }
    Ok(())
}

/// Accumulates operands and operators, prepending the width to the first
/// stack-clearing operator.
struct Writer {
    out: Vec<u8>,
    width: Option<i32>,
}

impl Writer {
    fn op(&mut self, args: &[f64], op: u8) -> Result<(), String> {
        if let Some(width) = self.width.take() {
            push_number(&mut self.out, width as f64)
                .map_err(|_| format!("width operand {width} does not fit in 16 bits"))?;
        }
        for arg in args {
            push_number(&mut self.out, *arg)?;
        }
        self.out.push(op);
        Ok(())
    }

    fn escaped_op(&mut self, args: &[f64], op: u8) -> Result<(), String> {
        self.op(args, op::ESCAPE)?;
        self.out.push(op);
        Ok(())
    }

    fn hintmask(&mut self, mask: &[u8]) -> Result<(), String> {
        self.op(&[], op::HINTMASK)?;
        self.out.extend_from_slice(mask);
        Ok(())
    }
}

#[derive(Default)]
struct Stems {
    horizontal: Vec<(f64, f64)>,
    vertical: Vec<(f64, f64)>,
}

impl Stems {
    fn add(&mut self, stem: &Stem) {
        let list = if stem.horizontal {
            &mut self.horizontal
        } else {
            &mut self.vertical
        };
        if !list.contains(&(stem.position, stem.width)) {
            list.push((stem.position, stem.width));
        }
    }

    fn sort(&mut self) {
        let by_pos = |a: &(f64, f64), b: &(f64, f64)| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1));
        self.horizontal.sort_by(by_pos);
        self.vertical.sort_by(by_pos);
    }

    fn len(&self) -> usize {
        self.horizontal.len() + self.vertical.len()
    }

    /// The hintmask bytes selecting `active`.
    fn mask(&self, active: &[Stem]) -> Vec<u8> {
        let mut mask = vec![0u8; self.len().div_ceil(8)];
        for stem in active {
            let key = (stem.position, stem.width);
            let idx = if stem.horizontal {
                self.horizontal.iter().position(|s| *s == key)
            } else {
                self.vertical
                    .iter()
                    .position(|s| *s == key)
                    .map(|i| i + self.horizontal.len())
            };
            if let Some(idx) = idx {
                mask[idx / 8] |= 0x80 >> (idx % 8);
            }
        }
        mask
    }
}

/// Stem arguments are relative to the end of the previous stem.
fn stem_args(stems: &[(f64, f64)]) -> Vec<f64> {
    let mut args = Vec::with_capacity(stems.len() * 2);
    let mut last = 0.0;
    for (pos, width) in stems {
        args.push(pos - last);
        args.push(*width);
        last = pos + width;
    }
    args
}

/// Pending path segments, merged into as few operators as possible.
enum Run {
    None,
    Lines(Vec<(f64, f64)>),
    Curves(Vec<[f64; 6]>),
}

fn flush(run: &mut Run, writer: &mut Writer) -> Result<(), String> {
    match std::mem::replace(run, Run::None) {
        Run::None => Ok(()),
        Run::Lines(deltas) => write_lines(&deltas, writer),
        Run::Curves(curves) => {
            for chunk in curves.chunks(MAX_STACK / 6) {
                let args: Vec<f64> = chunk.iter().flatten().copied().collect();
                writer.op(&args, op::RRCURVETO)?;
            }
            Ok(())
        }
    }
}

fn write_lines(deltas: &[(f64, f64)], writer: &mut Writer) -> Result<(), String> {
    // an alternating run of horizontal and vertical lines
    let alternating = |starts_horizontal: bool| {
        deltas.iter().enumerate().all(|(i, (dx, dy))| {
            if (i % 2 == 0) == starts_horizontal {
                *dy == 0.0
            } else {
                *dx == 0.0
            }
        })
    };
    for starts_horizontal in [true, false] {
        if alternating(starts_horizontal) {
            let args: Vec<f64> = deltas
                .iter()
                .enumerate()
                .map(|(i, (dx, dy))| {
                    if (i % 2 == 0) == starts_horizontal {
                        *dx
                    } else {
                        *dy
                    }
                })
                .collect();
            let mut horizontal = starts_horizontal;
            for chunk in args.chunks(MAX_STACK) {
                writer.op(chunk, if horizontal { op::HLINETO } else { op::VLINETO })?;
                // an even chunk keeps the alternation phase
                if chunk.len() % 2 == 1 {
                    horizontal = !horizontal;
                }
            }
            return Ok(());
        }
    }
    for chunk in deltas.chunks(MAX_STACK / 2) {
        let args: Vec<f64> = chunk.iter().flat_map(|(dx, dy)| [*dx, *dy]).collect();
        writer.op(&args, op::RLINETO)?;
    }
    Ok(())
}

/// Encode a parsed bez program.
///
/// `width` is the explicit width operand, if any. Fails when an operand is
/// out of the range a charstring number can hold.
pub fn encode(commands: &[Command], width: Option<i32>) -> Result<Vec<u8>, String> {
    let mut writer = Writer {
        out: Vec::new(),
        width,
    };

    let mut stems = Stems::default();
    let mut initial = Vec::new();
    let mut has_replacement = false;
    for command in commands {
        match command {
            Command::Stem(stem) => {
                stems.add(stem);
                initial.push(*stem);
            }
            Command::HintSet(set) => {
                has_replacement = true;
                set.iter().for_each(|stem| stems.add(stem));
            }
            _ => (),
        }
    }
    stems.sort();

    let (hstem, vstem) = if has_replacement {
        (op::HSTEMHM, op::VSTEMHM)
    } else {
        (op::HSTEM, op::VSTEM)
    };
    if !stems.horizontal.is_empty() {
        writer.op(&stem_args(&stems.horizontal), hstem)?;
    }
    if !stems.vertical.is_empty() {
        writer.op(&stem_args(&stems.vertical), vstem)?;
    }
    let mut pending_mask = has_replacement.then(|| stems.mask(&initial));

    let mut current = BezPoint::new(0.0, 0.0);
    let mut run = Run::None;
    let mut ended = false;
    for command in commands {
        let is_path = matches!(
            command,
            Command::MoveTo(_) | Command::LineTo(_) | Command::CurveTo(..) | Command::Flex(_)
        );
        if is_path {
            if let Some(mask) = pending_mask.take() {
                flush(&mut run, &mut writer)?;
                writer.hintmask(&mask)?;
            }
        }
        match command {
            Command::Stem(_) | Command::ClosePath => (),
            Command::HintSet(set) => pending_mask = Some(stems.mask(set)),
            Command::MoveTo(pt) => {
                flush(&mut run, &mut writer)?;
                let (dx, dy) = (pt.x - current.x, pt.y - current.y);
                if dx == 0.0 {
                    writer.op(&[dy], op::VMOVETO)?;
                } else if dy == 0.0 {
                    writer.op(&[dx], op::HMOVETO)?;
                } else {
                    writer.op(&[dx, dy], op::RMOVETO)?;
                }
                current = *pt;
            }
            Command::LineTo(pt) => {
                let delta = (pt.x - current.x, pt.y - current.y);
                match &mut run {
                    Run::Lines(deltas) => deltas.push(delta),
                    _ => {
                        flush(&mut run, &mut writer)?;
                        run = Run::Lines(vec![delta]);
                    }
                }
                current = *pt;
            }
            Command::CurveTo(c0, c1, pt) => {
                let args = [
                    c0.x - current.x,
                    c0.y - current.y,
                    c1.x - c0.x,
                    c1.y - c0.y,
                    pt.x - c1.x,
                    pt.y - c1.y,
                ];
                match &mut run {
                    Run::Curves(curves) => curves.push(args),
                    _ => {
                        flush(&mut run, &mut writer)?;
                        run = Run::Curves(vec![args]);
                    }
                }
                current = *pt;
            }
            Command::Flex(points) => {
                flush(&mut run, &mut writer)?;
                let mut args = Vec::with_capacity(13);
                for pt in points {
                    args.push(pt.x - current.x);
                    args.push(pt.y - current.y);
                    current = *pt;
                }
                args.push(FLEX_DEPTH);
                writer.escaped_op(&args, op::FLEX)?;
            }
            Command::EndChar => {
                flush(&mut run, &mut writer)?;
                writer.op(&[], op::ENDCHAR)?;
                ended = true;
                break;
            }
        }
    }
    if !ended {
        flush(&mut run, &mut writer)?;
        writer.op(&[], op::ENDCHAR)?;
    }
    Ok(writer.out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::hint::bez::parse;

    #[rstest]
    #[case(0.0, &[139])]
    #[case(107.0, &[246])]
    #[case(-107.0, &[32])]
    #[case(108.0, &[247, 0])]
    #[case(1131.0, &[250, 255])]
    #[case(-108.0, &[251, 0])]
    #[case(-1131.0, &[254, 255])]
    #[case(1132.0, &[28, 0x04, 0x6c])]
    #[case(-32768.0, &[28, 0x80, 0x00])]
    #[case(0.5, &[255, 0, 0, 0x80, 0])]
    fn number_encoding(#[case] value: f64, #[case] expected: &[u8]) {
        let mut out = Vec::new();
        push_number(&mut out, value).unwrap();
        assert_eq!(out, expected);
    }

    #[rstest]
    #[case(32768.0)]
    #[case(-32768.5)]
    #[case(f64::NAN)]
    fn numbers_out_of_range(#[case] value: f64) {
        let mut out = Vec::new();
        assert!(push_number(&mut out, value).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn wide_width_operand_is_an_error() {
        let commands = parse("sc ed").unwrap();
        assert_eq!(encode(&commands, Some(32767)).unwrap(), vec![28, 0x7f, 0xff, 14]);
        let err = encode(&commands, Some(40000)).unwrap_err();
        assert!(err.contains("40000"), "{err}");
    }

    #[test]
    fn rectangle() {
        let commands = parse("sc 10 0 mt 10 100 dt 90 100 dt 90 0 dt cp ed").unwrap();
        let bytes = encode(&commands, None).unwrap();
        // 10 hmoveto; 100 80 -100 vlineto; endchar
        assert_eq!(bytes, vec![149, 22, 239, 219, 39, 7, 14]);
    }

    #[test]
    fn width_goes_before_the_first_operator() {
        let commands = parse("sc 10 20 mt 30 40 dt ed").unwrap();
        let bytes = encode(&commands, Some(50)).unwrap();
        // 50 10 20 rmoveto; 20 20 rlineto; endchar
        assert_eq!(bytes, vec![189, 149, 159, 21, 159, 159, 5, 14]);
    }

    #[test]
    fn width_only_glyph() {
        let bytes = encode(&parse("sc ed").unwrap(), Some(-20)).unwrap();
        assert_eq!(bytes, vec![119, 14]);
    }

    #[test]
    fn consecutive_curves_are_merged() {
        let commands =
            parse("sc 0 0 mt 0 10 10 20 20 20 ct 30 20 40 10 40 0 ct cp ed").unwrap();
        let bytes = encode(&commands, None).unwrap();
        assert_eq!(bytes.iter().filter(|b| **b == op::RRCURVETO).count(), 1);
        assert_eq!(bytes.last(), Some(&op::ENDCHAR));
    }

    #[test]
    fn stems_are_relative() {
        assert_eq!(
            stem_args(&[(0.0, 20.0), (100.0, 30.0)]),
            vec![0.0, 20.0, 80.0, 30.0]
        );
    }

    #[test]
    fn hint_replacement_uses_hintmask() {
        let commands = parse(
            "sc 0 20 rb 0 0 mt 100 0 dt snc 500 20 rb enc newcolors 100 500 dt ed",
        )
        .unwrap();
        let bytes = encode(&commands, None).unwrap();
        // 0 20 480 20 hstemhm
        assert_eq!(&bytes[..5], &[139, 159, 248, 116, 159]);
        assert_eq!(bytes[5], op::HSTEMHM);
        // initial mask selects the first stem only
        assert_eq!(&bytes[6..8], &[op::HINTMASK, 0x80]);
        let second_mask = bytes
            .windows(2)
            .skip(8)
            .position(|w| w == [op::HINTMASK, 0x40]);
        assert!(second_mask.is_some(), "{bytes:?}");
    }

    #[test]
    fn flex_uses_escape() {
        let commands =
            parse("sc 0 0 mt 10 0 20 5 30 5 40 5 50 0 60 0 flx ed").unwrap();
        let bytes = encode(&commands, None).unwrap();
        let n = bytes.len();
        assert_eq!(&bytes[n - 3..], &[op::ESCAPE, op::FLEX, op::ENDCHAR]);
    }
}
