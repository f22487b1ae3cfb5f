//! Rectilinear subtraction of rectangles.

use crate::rect::Rect;
use crate::span::Span;

/// Subtracts `holes` from `outer`, returning the remaining area as
/// horizontal slabs.
///
/// The decomposition slices the remainder at every hole edge, producing
/// maximal-width horizontal rectangles in bottom-to-top, left-to-right
/// order. Holes that only touch `outer` remove no area.
///
/// # Example
///
/// ```
/// # use geom::prelude::*;
/// # use geom::subtract::subtract;
/// let outer = Rect::from_sides(0, 0, 100, 100);
/// let hole = Rect::from_sides(20, 20, 80, 80);
/// assert_eq!(
///     subtract(outer, &[hole]),
///     vec![
///         Rect::from_sides(0, 0, 100, 20),
///         Rect::from_sides(0, 20, 20, 80),
///         Rect::from_sides(80, 20, 100, 80),
///         Rect::from_sides(0, 80, 100, 100),
///     ]
/// );
/// ```
pub fn subtract(outer: Rect, holes: &[Rect]) -> Vec<Rect> {
    let holes: Vec<Rect> = holes.iter().filter(|h| h.overlaps(&outer)).copied().collect();
    if holes.is_empty() {
        return vec![outer];
    }

    // slab boundaries: the outer extent plus every clipped hole edge
    let mut ys = vec![outer.bot(), outer.top()];
    for hole in &holes {
        if hole.bot() > outer.bot() {
            ys.push(hole.bot());
        }
        if hole.top() < outer.top() {
            ys.push(hole.top());
        }
    }
    ys.sort_unstable();
    ys.dedup();

    let mut out = Vec::new();
    for band in ys.windows(2) {
        let (y0, y1) = (band[0], band[1]);
        if y0 == y1 {
            continue;
        }
        let band_span = Span::new(y0, y1);

        // x-intervals blocked within this band
        let mut blocked: Vec<Span> = holes
            .iter()
            .filter(|h| h.bot() < y1 && y0 < h.top())
            .map(|h| Span::new(h.left().max(outer.left()), h.right().min(outer.right())))
            .collect();
        blocked.sort_unstable();

        let mut x = outer.left();
        for span in blocked {
            if span.lo() > x {
                out.push(Rect::from_spans(Span::new(x, span.lo()), band_span));
            }
            x = x.max(span.hi());
        }
        if x < outer.right() {
            out.push(Rect::from_spans(Span::new(x, outer.right()), band_span));
        }
    }
    out
}

/// Returns the union of `rects` as disjoint horizontal slabs.
///
/// Equivalent to subtracting the rectangles' complement from their
/// bounding box; used to turn overlapping shape bloats into channel
/// rectangles.
pub fn merge_to_slabs(rects: &[Rect]) -> Vec<Rect> {
    let Some(bbox) = Rect::union_all(rects.iter().copied()) else {
        return Vec::new();
    };

    let mut ys = vec![bbox.bot(), bbox.top()];
    for r in rects {
        ys.push(r.bot());
        ys.push(r.top());
    }
    ys.sort_unstable();
    ys.dedup();

    let mut out: Vec<Rect> = Vec::new();
    for band in ys.windows(2) {
        let (y0, y1) = (band[0], band[1]);
        if y0 == y1 {
            continue;
        }
        let mut covered: Vec<Span> = rects
            .iter()
            .filter(|r| r.bot() <= y0 && y1 <= r.top())
            .map(|r| r.hspan())
            .collect();
        covered.sort_unstable();

        let mut merged: Vec<Span> = Vec::new();
        for span in covered {
            match merged.last_mut() {
                Some(last) if span.lo() <= last.hi() => *last = last.union(span),
                _ => merged.push(span),
            }
        }
        for span in merged {
            out.push(Rect::from_spans(span, Span::new(y0, y1)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hole_covering_outer_leaves_nothing() {
        let outer = Rect::from_sides(10, 10, 20, 20);
        assert!(subtract(outer, &[Rect::from_sides(0, 0, 30, 30)]).is_empty());
    }

    #[test]
    fn touching_hole_removes_nothing() {
        let outer = Rect::from_sides(0, 0, 10, 10);
        assert_eq!(subtract(outer, &[Rect::from_sides(10, 0, 20, 10)]), vec![outer]);
    }

    #[test]
    fn subtract_preserves_area() {
        let outer = Rect::from_sides(0, 0, 100, 60);
        let holes = [Rect::from_sides(-10, 10, 30, 30), Rect::from_sides(20, 20, 70, 50)];
        let pieces = subtract(outer, &holes);
        let pieces_area: i64 = pieces.iter().map(Rect::area).sum();
        // inclusion-exclusion on the clipped holes
        let a = Rect::from_sides(0, 10, 30, 30);
        let b = Rect::from_sides(20, 20, 70, 50);
        let overlap = a.intersection(&b).map(|r| r.area()).unwrap_or(0);
        assert_eq!(pieces_area, outer.area() - a.area() - b.area() + overlap);
        // pieces are disjoint
        for (i, p) in pieces.iter().enumerate() {
            for q in &pieces[i + 1..] {
                assert!(!p.overlaps(q));
            }
        }
    }

    #[test]
    fn merge_to_slabs_unions_overlaps() {
        let rects = [Rect::from_sides(0, 0, 10, 10), Rect::from_sides(5, 0, 20, 10)];
        assert_eq!(merge_to_slabs(&rects), vec![Rect::from_sides(0, 0, 20, 10)]);
    }
}
