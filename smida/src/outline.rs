//! Outline normalization.
//!
//! Composite glyphs are flattened into plain contours, and the resulting
//! contour set is passed through a [`PathSimplifier`] that fixes winding
//! direction. Each contour keeps its starting point, which the hinting
//! engine relies on to find segment boundaries.

use std::collections::HashSet;

use kurbo::{Affine, BezPath, PathEl, Point, Rect, Shape};
use write_fonts::{
    pens::{BezPathPen, ReverseContourPen, TransformPen},
    types::Pen,
};

use crate::{
    font::{Contour, ContourPoint, Font, Glyph, PointKind},
    Error,
};

/// The error type returned by external geometry and hinting engines.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Removes overlaps from a glyph's contour set and fixes its winding.
///
/// Implementations must keep the starting point of every contour they
/// return unchanged.
pub trait PathSimplifier {
    fn simplify(&self, path: &BezPath) -> Result<BezPath, EngineError>;
}

/// The built-in simplifier.
///
/// This orients outer contours counter-clockwise and holes clockwise (in a
/// y-up coordinate system) and drops degenerate contours. It does not
/// compute boolean unions: overlapping contours are kept as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindingFix;

impl PathSimplifier for WindingFix {
    fn simplify(&self, path: &BezPath) -> Result<BezPath, EngineError> {
        let contours: Vec<_> = subpaths(path)
            .into_iter()
            .map(canonical_contour)
            .filter(|contour| contour.area().abs() > f64::EPSILON)
            .collect();

        let mut result = BezPath::new();
        for (i, contour) in contours.iter().enumerate() {
            let Some(start) = start_point(contour) else {
                continue;
            };
            let depth = contours
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && other.winding(start) != 0)
                .count();
            let want_ccw = depth % 2 == 0;
            let is_ccw = contour.area() > 0.0;
            if want_ccw == is_ccw {
                result.extend(contour.elements().iter().copied());
            } else {
                result.extend(reverse_contour(contour)?.elements().iter().copied());
            }
        }
        Ok(result)
    }
}

/// Resolve all components of a glyph into a single path.
///
/// Component transforms are composed through every level of nesting. A
/// glyph that (indirectly) references itself is an error.
pub fn flatten(font: &Font, glyph: &Glyph) -> Result<BezPath, Error> {
    let mut pen = BezPathPen::new();
    let mut chain = vec![glyph.name.clone()];
    let mut visiting = HashSet::from([glyph.name.clone()]);
    flatten_into(
        font,
        glyph,
        Affine::IDENTITY,
        &mut chain,
        &mut visiting,
        &mut pen,
    )?;
    Ok(pen.into_inner())
}

fn flatten_into(
    font: &Font,
    glyph: &Glyph,
    transform: Affine,
    chain: &mut Vec<String>,
    visiting: &mut HashSet<String>,
    out: &mut BezPathPen,
) -> Result<(), Error> {
    for contour in &glyph.contours {
        draw(&contour_to_path(contour), &mut TransformPen::new(&mut *out, transform));
    }
    for component in &glyph.components {
        let base = font
            .glyph(&component.base)
            .ok_or_else(|| Error::MissingComponent {
                glyph: glyph.name.clone(),
                component: component.base.clone(),
            })?;
        chain.push(base.name.clone());
        if !visiting.insert(base.name.clone()) {
            return Err(Error::ComponentCycle(chain.clone()));
        }
        let transform = transform * Affine::new(component.transform);
        flatten_into(font, base, transform, chain, visiting, out)?;
        visiting.remove(&base.name);
        chain.pop();
    }
    Ok(())
}

/// Produce a glyph with no components and a winding-consistent outline.
pub fn normalize(
    font: &Font,
    glyph: &Glyph,
    simplifier: &dyn PathSimplifier,
) -> Result<Glyph, Error> {
    let mut path = flatten(font, glyph)?;
    if !path.elements().is_empty() {
        path = simplifier
            .simplify(&path)
            .map_err(|e| Error::Simplify {
                glyph: glyph.name.clone(),
                reason: e.to_string(),
            })?;
    }
    let mut normalized = glyph.clone();
    normalized.components.clear();
    normalized.contours = path_to_contours(&path);
    log::trace!(
        "{}: {} components flattened, {} contours",
        glyph.name,
        glyph.components.len(),
        normalized.contours.len()
    );
    Ok(normalized)
}

/// The exact bounds of a glyph, with components resolved.
///
/// Returns `None` for glyphs with no outline.
pub fn bounds(font: &Font, glyph: &Glyph) -> Result<Option<Rect>, Error> {
    flatten(font, glyph).map(|path| path_bounds(&path))
}

pub fn path_bounds(path: &BezPath) -> Option<Rect> {
    path.elements()
        .iter()
        .any(|el| !matches!(el, PathEl::ClosePath))
        .then(|| path.bounding_box())
}

/// Round every coordinate to the nearest integer, ties to even.
///
/// This is the grid the charstrings are written on.
pub fn round_path(path: &BezPath) -> BezPath {
    let round = |pt: Point| Point::new(pt.x.round_ties_even(), pt.y.round_ties_even());
    path.elements()
        .iter()
        .map(|el| match *el {
            PathEl::MoveTo(p) => PathEl::MoveTo(round(p)),
            PathEl::LineTo(p) => PathEl::LineTo(round(p)),
            PathEl::QuadTo(p1, p2) => PathEl::QuadTo(round(p1), round(p2)),
            PathEl::CurveTo(p1, p2, p3) => PathEl::CurveTo(round(p1), round(p2), round(p3)),
            PathEl::ClosePath => PathEl::ClosePath,
        })
        .collect()
}

/// Draw a path into a pen.
pub fn draw(path: &BezPath, pen: &mut impl Pen) {
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pen.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pen.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => pen.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c0, c1, p) => pen.curve_to(
                c0.x as f32,
                c0.y as f32,
                c1.x as f32,
                c1.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => pen.close(),
        }
    }
}

/// The outline of a glyph that has no components.
pub fn glyph_path(glyph: &Glyph) -> BezPath {
    let mut path = BezPath::new();
    for contour in &glyph.contours {
        path.extend(contour_to_path(contour).elements().iter().copied());
    }
    path
}

/// Convert UFO contour points into path elements.
///
/// Closed contours start at their first on-curve point, and the implied
/// closing line is not emitted. Curve segments with more than two
/// off-curve points are split into cubics; quadratic segments with several
/// off-curve points get implied on-curve points between them.
pub fn contour_to_path(contour: &Contour) -> BezPath {
    let mut path = BezPath::new();
    let points = &contour.points;
    if points.is_empty() {
        return path;
    }
    let closed = contour.is_closed();

    let Some(first_on) = points.iter().position(|pt| pt.kind.is_on_curve()) else {
        // a closed quadratic contour made only of off-curve points
        let offs: Vec<_> = points.iter().map(to_point).collect();
        let Some(last) = offs.last().copied() else {
            return path;
        };
        let start = last.midpoint(offs[0]);
        path.move_to(start);
        let mut with_end = offs.clone();
        with_end.push(start);
        push_qcurve(&mut path, &with_end);
        path.close_path();
        return path;
    };

    // rotate so that the starting on-curve point comes last; every segment
    // is then a run of off-curve points followed by its on-curve point.
    let ordered: Vec<&ContourPoint> = if closed {
        points[first_on + 1..]
            .iter()
            .chain(points[..=first_on].iter())
            .collect()
    } else {
        points[1..].iter().collect()
    };
    let start = to_point(&points[if closed { first_on } else { 0 }]);
    path.move_to(start);

    let n_segments = ordered.iter().filter(|pt| pt.kind.is_on_curve()).count();
    let mut offs = Vec::new();
    let mut seg_idx = 0;
    for pt in ordered {
        if !pt.kind.is_on_curve() {
            offs.push(to_point(pt));
            continue;
        }
        seg_idx += 1;
        let end = to_point(pt);
        match pt.kind {
            PointKind::Curve => push_curve(&mut path, &offs, end),
            PointKind::QCurve => {
                offs.push(end);
                push_qcurve(&mut path, &offs);
            }
            // the closing line of a closed contour is implied
            _ if closed && seg_idx == n_segments => (),
            _ => path.line_to(end),
        }
        offs.clear();
    }
    if closed {
        path.close_path();
    }
    path
}

fn to_point(pt: &ContourPoint) -> Point {
    Point::new(pt.x, pt.y)
}

fn push_curve(path: &mut BezPath, offs: &[Point], end: Point) {
    match offs {
        [] => path.line_to(end),
        [c] => path.quad_to(*c, end),
        [c0, c1] => path.curve_to(*c0, *c1, end),
        _ => {
            let mut all = offs.to_vec();
            all.push(end);
            for (c0, c1, p) in decompose_super_bezier(&all) {
                path.curve_to(c0, c1, p);
            }
        }
    }
}

/// `points` is the off-curve points followed by the final on-curve point.
fn push_qcurve(path: &mut BezPath, points: &[Point]) {
    let Some((end, offs)) = points.split_last() else {
        return;
    };
    if offs.is_empty() {
        path.line_to(*end);
        return;
    }
    for pair in offs.windows(2) {
        path.quad_to(pair[0], pair[0].midpoint(pair[1]));
    }
    if let Some(last) = offs.last() {
        path.quad_to(*last, *end);
    }
}

/// Split a cubic "super bezier" with more than two off-curve points into
/// plain cubic segments.
///
/// `points` is the off-curve points followed by the final on-curve point.
fn decompose_super_bezier(points: &[Point]) -> Vec<(Point, Point, Point)> {
    let n = points.len() - 1;
    let mut segments = Vec::new();
    let mut pt1 = points[0];
    let mut pt2: Option<Point> = None;
    for i in 2..=n {
        let divisions = i.min(3).min(n - i + 2);
        for j in 1..divisions {
            let factor = j as f64 / divisions as f64;
            let temp = points[i - 2].lerp(points[i - 1], factor);
            match pt2 {
                None => pt2 = Some(temp),
                Some(p2) => {
                    segments.push((pt1, p2, p2.midpoint(temp)));
                    pt1 = temp;
                    pt2 = None;
                }
            }
        }
    }
    segments.push((pt1, points[n - 1], points[n]));
    segments
}

/// Convert a path back into UFO contour points.
///
/// This is the inverse of [`contour_to_path`] for paths it produces: the
/// starting point comes first and carries the type of the closing segment.
pub fn path_to_contours(path: &BezPath) -> Vec<Contour> {
    subpaths(path)
        .iter()
        .filter_map(|sub| {
            let elements = sub.elements();
            let PathEl::MoveTo(start) = *elements.first()? else {
                return None;
            };
            let closed = matches!(elements.last(), Some(PathEl::ClosePath));
            let segments: Vec<_> = elements[1..]
                .iter()
                .filter(|el| !matches!(el, PathEl::ClosePath))
                .copied()
                .collect();
            if segments.is_empty() {
                return None;
            }

            let mut points = Vec::new();
            for el in &segments {
                match *el {
                    PathEl::LineTo(p) => points.push(on_point(p, PointKind::Line)),
                    PathEl::QuadTo(c, p) => {
                        points.push(off_point(c));
                        points.push(on_point(p, PointKind::QCurve));
                    }
                    PathEl::CurveTo(c0, c1, p) => {
                        points.push(off_point(c0));
                        points.push(off_point(c1));
                        points.push(on_point(p, PointKind::Curve));
                    }
                    PathEl::MoveTo(_) | PathEl::ClosePath => (),
                }
            }

            if !closed {
                points.insert(0, on_point(start, PointKind::Move));
                return Some(Contour::new(points));
            }
            // the last point is the start when the closing segment is
            // explicit; otherwise the closing segment is an implied line.
            let ends_at_start = points.last().is_some_and(|pt| to_point(pt) == start);
            if ends_at_start {
                let Some(last) = points.pop() else {
                    return None;
                };
                points.insert(0, last);
            } else {
                points.insert(0, on_point(start, PointKind::Line));
            }
            Some(Contour::new(points))
        })
        .collect()
}

fn on_point(pt: Point, kind: PointKind) -> ContourPoint {
    ContourPoint::new(pt.x, pt.y, kind)
}

fn off_point(pt: Point) -> ContourPoint {
    ContourPoint::off(pt.x, pt.y)
}

/// Split a path into one path per contour.
fn subpaths(path: &BezPath) -> Vec<BezPath> {
    let mut result: Vec<BezPath> = Vec::new();
    for el in path.elements() {
        match el {
            PathEl::MoveTo(_) => result.push(BezPath::from_vec(vec![*el])),
            _ => {
                if let Some(current) = result.last_mut() {
                    current.push(*el);
                }
            }
        }
    }
    result
}

fn start_point(contour: &BezPath) -> Option<Point> {
    match contour.elements().first() {
        Some(PathEl::MoveTo(pt)) => Some(*pt),
        _ => None,
    }
}

fn end_point(el: &PathEl) -> Option<Point> {
    match *el {
        PathEl::MoveTo(p) | PathEl::LineTo(p) | PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => {
            Some(p)
        }
        PathEl::ClosePath => None,
    }
}

/// Close the contour, and drop zero-length lines (including an explicit
/// closing line that duplicates the implied one).
fn canonical_contour(contour: BezPath) -> BezPath {
    let Some(start) = start_point(&contour) else {
        return contour;
    };
    let mut elements = vec![PathEl::MoveTo(start)];
    let mut current = start;
    for el in contour.elements().iter().skip(1) {
        match *el {
            PathEl::LineTo(p) if p == current => (),
            PathEl::ClosePath | PathEl::MoveTo(_) => (),
            _ => {
                elements.push(*el);
                current = end_point(el).unwrap_or(current);
            }
        }
    }
    if elements.len() > 1 && matches!(elements.last(), Some(PathEl::LineTo(p)) if *p == start) {
        elements.pop();
    }
    elements.push(PathEl::ClosePath);
    BezPath::from_vec(elements)
}

/// Reverse the direction of a closed contour, keeping its first point.
fn reverse_contour(contour: &BezPath) -> Result<BezPath, EngineError> {
    let mut out = BezPathPen::new();
    let mut reverse = ReverseContourPen::new(&mut out);
    draw(contour, &mut reverse);
    reverse
        .flush()
        .map_err(|e| format!("cannot reverse contour: {e:?}"))?;
    // the pen leaves a zero-length line behind and drops the close after a curve
    Ok(canonical_contour(out.into_inner()))
}
