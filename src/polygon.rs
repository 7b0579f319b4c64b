use itertools::Itertools;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rotated rectangle as returned by [`min_area_rect`].
///
/// `angle` is expressed in degrees within `[-90, 0)`, measured as the
/// rotation of the rectangle edges relative to the x axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (Andrew's monotone chain), counter-clockwise without the
/// closing point. Collinear points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
    });
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(sorted.len() * 2);
    for p in sorted.iter() {
        while hull.len() >= 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0. {
            hull.pop();
        }
        hull.push(*p);
    }
    let lower_len = hull.len() + 1;
    for p in sorted.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0. {
            hull.pop();
        }
        hull.push(*p);
    }
    hull.pop();
    hull
}

/// Folds an edge direction (degrees) into the `[-90, 0)` range used by
/// [`RotatedRect::angle`]. Edges of a rectangle are 90 degrees apart, so any
/// of them yields the same folded angle.
fn fold_edge_angle(degrees: f64) -> f64 {
    let folded = degrees.rem_euclid(90.) - 90.;
    if folded >= 0. {
        -90.
    } else {
        folded
    }
}

/// Minimum-area enclosing rectangle, found with rotating calipers over the
/// convex hull. Returns `None` for an empty point set.
pub fn min_area_rect(points: &[Point]) -> Option<RotatedRect> {
    let hull = convex_hull(points);
    match hull.len() {
        0 => None,
        1 => Some(RotatedRect {
            center: hull[0],
            width: 0.,
            height: 0.,
            angle: -90.,
        }),
        2 => {
            let (a, b) = (hull[0], hull[1]);
            let length = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
            Some(RotatedRect {
                center: Point::new((a.x + b.x) / 2., (a.y + b.y) / 2.),
                width: length,
                height: 0.,
                angle: fold_edge_angle((b.y - a.y).atan2(b.x - a.x).to_degrees()),
            })
        }
        n => {
            let mut best: Option<(f64, RotatedRect)> = None;
            for i in 0..n {
                let origin = hull[i];
                let next = hull[(i + 1) % n];
                let (ex, ey) = (next.x - origin.x, next.y - origin.y);
                let length = (ex * ex + ey * ey).sqrt();
                if length < f64::EPSILON {
                    continue;
                }
                let (ux, uy) = (ex / length, ey / length);
                let (vx, vy) = (-uy, ux);
                let (min_u, max_u) = hull
                    .iter()
                    .map(|p| (p.x - origin.x) * ux + (p.y - origin.y) * uy)
                    .minmax()
                    .into_option()?;
                let (min_v, max_v) = hull
                    .iter()
                    .map(|p| (p.x - origin.x) * vx + (p.y - origin.y) * vy)
                    .minmax()
                    .into_option()?;
                let (width, height) = (max_u - min_u, max_v - min_v);
                let area = width * height;
                if best.as_ref().map_or(true, |(best_area, _)| area < *best_area) {
                    let mid_u = (min_u + max_u) / 2.;
                    let mid_v = (min_v + max_v) / 2.;
                    best = Some((
                        area,
                        RotatedRect {
                            center: Point::new(
                                origin.x + mid_u * ux + mid_v * vx,
                                origin.y + mid_u * uy + mid_v * vy,
                            ),
                            width,
                            height,
                            angle: fold_edge_angle(uy.atan2(ux).to_degrees()),
                        },
                    ));
                }
            }
            best.map(|(_, rect)| rect)
        }
    }
}
