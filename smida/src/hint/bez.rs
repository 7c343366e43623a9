//! The textual "bez" outline language exchanged with the autohinter.
//!
//! A program is a sequence of whitespace separated tokens in postfix form:
//! operands come first, then the operator. Coordinates are absolute.
//!
//! ```text
//! % a
//! sc
//! 0 0 mt
//! 0 100 dt
//! 10 110 20 120 30 130 ct
//! cp
//! ed
//! ```
//!
//! Hinted programs may also contain stem hints (`y dy rb` for horizontal
//! stems and `x dx ry` for vertical ones), hint replacement blocks
//! (`beginsubr snc ... endsubr enc newcolors`) and flex curves
//! (`x1 y1 ... x6 y6 flx`, optionally bracketed by `preflx1`/`preflx2`).

use std::fmt::Write;

use write_fonts::types::Pen;

/// A point in font units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BezPoint {
    pub x: f64,
    pub y: f64,
}

impl BezPoint {
    pub fn new(x: f64, y: f64) -> Self {
        BezPoint { x, y }
    }
}

/// A stem hint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stem {
    pub horizontal: bool,
    pub position: f64,
    pub width: f64,
}

/// One parsed command of a bez program.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A stem hint in effect from the start of the glyph.
    Stem(Stem),
    /// A replacement hint set, in effect from the next path command.
    HintSet(Vec<Stem>),
    MoveTo(BezPoint),
    LineTo(BezPoint),
    CurveTo(BezPoint, BezPoint, BezPoint),
    /// Two curves that may be rendered as one straight segment.
    Flex([BezPoint; 6]),
    ClosePath,
    EndChar,
}

/// A pen that writes an unhinted bez program.
#[derive(Clone, Debug)]
pub struct BezPen {
    program: String,
    current: (f32, f32),
    done: bool,
}

impl BezPen {
    pub fn new(glyph_name: &str) -> Self {
        BezPen {
            program: format!("% {glyph_name}\nsc\n"),
            current: (0.0, 0.0),
            done: false,
        }
    }

    fn push(&mut self, coords: &[f32], op: &str) {
        for coord in coords {
            // writing into a String can't fail
            let _ = write!(self.program, "{} ", coord.round_ties_even() as i64);
        }
        self.program.push_str(op);
        self.program.push('\n');
    }

    pub fn end_path(&mut self) {
        self.push(&[], "ed");
        self.done = true;
    }

    /// The finished program, terminated with `ed`.
    pub fn finish(mut self) -> String {
        if !self.done {
            self.end_path();
        }
        self.program
    }
}

impl Pen for BezPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.push(&[x, y], "mt");
        self.current = (x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.push(&[x, y], "dt");
        self.current = (x, y);
    }

    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        let (x0, y0) = self.current;
        let c1x = x0 + 2.0 / 3.0 * (cx0 - x0);
        let c1y = y0 + 2.0 / 3.0 * (cy0 - y0);
        let c2x = x + 2.0 / 3.0 * (cx0 - x);
        let c2y = y + 2.0 / 3.0 * (cy0 - y);
        self.curve_to(c1x, c1y, c2x, c2y, x, y);
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        self.push(&[cx0, cy0, cx1, cy1, x, y], "ct");
        self.current = (x, y);
    }

    fn close(&mut self) {
        self.push(&[], "cp");
    }
}

/// Parse a (possibly hinted) bez program.
pub fn parse(program: &str) -> Result<Vec<Command>, String> {
    let mut commands = Vec::new();
    let mut operands: Vec<f64> = Vec::new();
    // stems collected inside a replacement block
    let mut replacement: Option<Vec<Stem>> = None;
    let mut pending: Option<Vec<Stem>> = None;

    for token in program
        .lines()
        .filter(|line| !line.trim_start().starts_with('%'))
        .flat_map(str::split_whitespace)
    {
        if let Ok(value) = token.parse::<f64>() {
            operands.push(value);
            continue;
        }
        let expect = |n: usize, operands: &[f64]| {
            if operands.len() == n {
                Ok(())
            } else {
                Err(format!(
                    "'{token}' takes {n} operands, found {}",
                    operands.len()
                ))
            }
        };
        let point = |i: usize| BezPoint::new(operands[i * 2], operands[i * 2 + 1]);
        match token {
            "sc" | "beginsubr" | "endsubr" | "preflx1" | "preflx2" => expect(0, &operands)?,
            "mt" | "dt" => {
                expect(2, &operands)?;
                if let Some(set) = pending.take() {
                    commands.push(Command::HintSet(set));
                }
                commands.push(if token == "mt" {
                    Command::MoveTo(point(0))
                } else {
                    Command::LineTo(point(0))
                });
            }
            "ct" => {
                expect(6, &operands)?;
                if let Some(set) = pending.take() {
                    commands.push(Command::HintSet(set));
                }
                commands.push(Command::CurveTo(point(0), point(1), point(2)));
            }
            "flx" => {
                expect(12, &operands)?;
                if let Some(set) = pending.take() {
                    commands.push(Command::HintSet(set));
                }
                let points = [0, 1, 2, 3, 4, 5].map(point);
                commands.push(Command::Flex(points));
            }
            "cp" => {
                expect(0, &operands)?;
                commands.push(Command::ClosePath);
            }
            "ed" => {
                expect(0, &operands)?;
                commands.push(Command::EndChar);
            }
            "rb" | "ry" => {
                expect(2, &operands)?;
                let stem = Stem {
                    horizontal: token == "rb",
                    position: operands[0],
                    width: operands[1],
                };
                match replacement.as_mut() {
                    Some(set) => set.push(stem),
                    None => commands.push(Command::Stem(stem)),
                }
            }
            "snc" => {
                expect(0, &operands)?;
                replacement = Some(Vec::new());
            }
            "enc" => {
                expect(0, &operands)?;
                pending = Some(
                    replacement
                        .take()
                        .ok_or_else(|| "'enc' without 'snc'".to_string())?,
                );
            }
            "newcolors" => expect(0, &operands)?,
            other => return Err(format!("unknown operator '{other}'")),
        }
        operands.clear();
    }
    if !operands.is_empty() {
        return Err(format!("{} trailing operands", operands.len()));
    }
    if replacement.is_some() {
        return Err("unterminated hint replacement block".into());
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pen_writes_rounded_program() {
        let mut pen = BezPen::new("a");
        pen.move_to(0.5, 1.5);
        pen.line_to(100.4, 2.5);
        pen.curve_to(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        pen.close();
        assert_eq!(
            pen.finish(),
            "% a\nsc\n0 2 mt\n100 2 dt\n1 2 3 4 5 6 ct\ncp\ned\n"
        );
    }

    #[test]
    fn end_path_is_written_once() {
        let mut pen = BezPen::new("a");
        pen.move_to(0.0, 0.0);
        pen.line_to(10.0, 0.0);
        pen.end_path();
        assert_eq!(pen.finish().matches("ed").count(), 1);
    }

    #[test]
    fn quads_are_elevated() {
        let mut pen = BezPen::new("q");
        pen.move_to(0.0, 0.0);
        pen.quad_to(150.0, 300.0, 300.0, 0.0);
        assert!(pen.finish().contains("100 200 200 200 300 0 ct"));
    }

    #[test]
    fn parse_hinted_program() {
        let program = "% a\nsc\n0 20 rb\n10 30 ry\n0 0 mt\n100 0 dt\n\
                       beginsubr snc\n50 20 rb\nendsubr enc\nnewcolors\n100 100 dt\ncp\ned\n";
        let commands = parse(program).unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Stem(Stem {
                    horizontal: true,
                    position: 0.0,
                    width: 20.0
                }),
                Command::Stem(Stem {
                    horizontal: false,
                    position: 10.0,
                    width: 30.0
                }),
                Command::MoveTo(BezPoint::new(0.0, 0.0)),
                Command::LineTo(BezPoint::new(100.0, 0.0)),
                Command::HintSet(vec![Stem {
                    horizontal: true,
                    position: 50.0,
                    width: 20.0
                }]),
                Command::LineTo(BezPoint::new(100.0, 100.0)),
                Command::ClosePath,
                Command::EndChar,
            ]
        );
    }

    #[test]
    fn malformed_programs_are_rejected() {
        assert!(parse("0 mt").unwrap_err().contains("takes 2 operands"));
        assert!(parse("0 0 zz").unwrap_err().contains("unknown operator"));
        assert!(parse("snc 0 1 rb").is_err());
        assert!(parse("0 0 mt 5").is_err());
    }
}
