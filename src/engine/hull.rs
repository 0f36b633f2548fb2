//! Concave boundary of a point cloud.
//!
//! The cloud is Delaunay-triangulated, then boundary triangles whose angles at the
//! ends of their boundary edge fall outside an acceptance window are peeled until the
//! triangle count is stable. The boundary edges left over are walked into one closed
//! loop. Geometry is planar in (lon, lat) degree space.

use std::collections::{BTreeMap, HashMap, HashSet};

use geo::{ConvexHull, Coord, LineString, MultiPoint, Point, Winding};
use serde::{Deserialize, Serialize};
use spade::{DelaunayTriangulation, Point2, Triangulation};

use crate::engine::error::RoutingError;
use crate::engine::models::Position;

/// Acceptance window for boundary triangle angles, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HullConfig {
    pub min_angle_deg: f64,
    pub max_angle_deg: f64,
}

impl Default for HullConfig {
    fn default() -> Self {
        Self { min_angle_deg: 20.0, max_angle_deg: 60.0 }
    }
}

type Triangle = [usize; 3];
type Edge = (usize, usize);

fn edge(a: usize, b: usize) -> Edge {
    if a < b { (a, b) } else { (b, a) }
}

/// Edges of a triangle, each paired with the opposite vertex.
fn edges_with_opposite(tri: &Triangle) -> [(usize, usize, usize); 3] {
    [(tri[0], tri[1], tri[2]), (tri[1], tri[2], tri[0]), (tri[2], tri[0], tri[1])]
}

fn degenerate(reason: impl Into<String>) -> RoutingError {
    RoutingError::DegenerateGeometry(reason.into())
}

fn triangulate(points: &[Position]) -> Result<(Vec<Position>, Vec<Triangle>), RoutingError> {
    let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
    for point in points {
        // Duplicate positions collapse onto the existing vertex.
        triangulation
            .insert(Point2::new(point.lon, point.lat))
            .map_err(|err| degenerate(format!("cannot triangulate ({}, {}): {:?}", point.lat, point.lon, err)))?;
    }
    if triangulation.num_vertices() < 3 {
        return Err(degenerate(format!(
            "need at least 3 distinct points, got {}",
            triangulation.num_vertices()
        )));
    }

    let vertices: Vec<Position> = triangulation
        .vertices()
        .map(|vertex| {
            let p = vertex.position();
            Position::new(p.y, p.x)
        })
        .collect();
    let triangles: Vec<Triangle> = triangulation
        .inner_faces()
        .map(|face| {
            let [a, b, c] = face.vertices();
            [a.fix().index(), b.fix().index(), c.fix().index()]
        })
        .collect();

    if triangles.is_empty() {
        return Err(degenerate(format!("all {} points are collinear", vertices.len())));
    }
    Ok((vertices, triangles))
}

/// Triangle angles at `p1` and `p2`, the endpoints of edge `p1`-`p2`, opposite `p3`.
fn edge_angles(p1: &Position, p2: &Position, p3: &Position) -> (f64, f64) {
    let a = p2.planar_distance(p3); // opposite p1
    let b = p1.planar_distance(p3); // opposite p2
    let c = p1.planar_distance(p2); // opposite p3

    if b * c == 0.0 || a * c == 0.0 {
        return (0.0, 0.0);
    }

    let angle_p1 = ((b * b + c * c - a * a) / (2.0 * b * c)).clamp(-1.0, 1.0).acos();
    let angle_p2 = ((a * a + c * c - b * b) / (2.0 * a * c)).clamp(-1.0, 1.0).acos();
    (angle_p1.to_degrees(), angle_p2.to_degrees())
}

/// Edges that belong to exactly one triangle.
fn boundary_edges(triangles: &[Triangle]) -> HashSet<Edge> {
    let mut edge_count: HashMap<Edge, usize> = HashMap::with_capacity(triangles.len() * 3);
    for tri in triangles {
        for (a, b, _) in edges_with_opposite(tri) {
            *edge_count.entry(edge(a, b)).or_default() += 1;
        }
    }
    edge_count.into_iter().filter(|&(_, count)| count == 1).map(|(e, _)| e).collect()
}

fn peel_once(vertices: &[Position], triangles: &[Triangle], config: &HullConfig) -> Vec<Triangle> {
    let boundary = boundary_edges(triangles);
    let (min, max) = (config.min_angle_deg, config.max_angle_deg);

    triangles
        .iter()
        .filter(|tri| {
            let peel = edges_with_opposite(tri).iter().any(|&(a, b, opposite)| {
                if !boundary.contains(&edge(a, b)) {
                    return false;
                }
                let (angle1, angle2) = edge_angles(&vertices[a], &vertices[b], &vertices[opposite]);
                (angle1 < min && angle2 < max) || (angle2 < min && angle1 < max)
            });
            !peel
        })
        .copied()
        .collect()
}

/// Walks the boundary edges into one closed loop starting at the smallest (lat, lon) vertex.
///
/// Every edge is used once; sub-loops meeting at a pinch vertex are spliced in.
fn order_boundary(vertices: &[Position], edges: &[Edge]) -> Result<Vec<Position>, RoutingError> {
    let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(a, b) in edges {
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }

    for (&vertex, neighbours) in &adjacency {
        if neighbours.len() < 2 || neighbours.len() % 2 != 0 {
            let p = vertices[vertex];
            return Err(degenerate(format!(
                "boundary vertex ({}, {}) has {} neighbours, cannot close the loop",
                p.lat,
                p.lon,
                neighbours.len()
            )));
        }
    }

    let start = *adjacency
        .keys()
        .min_by_key(|&&vertex| vertices[vertex].key())
        .ok_or_else(|| degenerate("empty boundary"))?;

    let mut used: HashSet<Edge> = HashSet::with_capacity(edges.len());
    let mut cursor: HashMap<usize, usize> = HashMap::new();
    let mut stack = vec![start];
    let mut circuit = Vec::with_capacity(edges.len() + 1);

    while let Some(&current) = stack.last() {
        let neighbours = &adjacency[&current];
        let next_idx = cursor.entry(current).or_insert(0);
        while *next_idx < neighbours.len() && used.contains(&edge(current, neighbours[*next_idx])) {
            *next_idx += 1;
        }
        if *next_idx < neighbours.len() {
            let next = neighbours[*next_idx];
            used.insert(edge(current, next));
            stack.push(next);
        } else {
            circuit.push(current);
            stack.pop();
        }
    }

    if used.len() != edges.len() {
        return Err(degenerate(format!(
            "boundary is disconnected: walked {} of {} edges",
            used.len(),
            edges.len()
        )));
    }

    circuit.reverse();
    let mut ring = LineString::from(circuit.iter().map(|&v| vertices[v].to_coord()).collect::<Vec<Coord<f64>>>());
    // The circuit is closed, so reversing keeps the start vertex first.
    ring.make_ccw_winding();
    let mut ordered: Vec<Position> = ring.0.into_iter().map(Position::from_coord).collect();
    ordered.pop();
    Ok(ordered)
}

/// Concave hull of `points` as an ordered closed loop (start point not repeated).
pub fn concave_hull(points: &[Position], config: &HullConfig) -> Result<Vec<Position>, RoutingError> {
    let (vertices, mut triangles) = triangulate(points)?;

    let mut count = triangles.len();
    loop {
        triangles = peel_once(&vertices, &triangles, config);
        if triangles.len() == count {
            break;
        }
        count = triangles.len();
    }
    if triangles.is_empty() {
        return Err(degenerate("every triangle was peeled"));
    }

    let mut edges: Vec<Edge> = boundary_edges(&triangles).into_iter().collect();
    edges.sort_unstable();
    order_boundary(&vertices, &edges)
}

fn cross(o: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// The two mutually farthest points, by rotating calipers over the convex hull.
pub fn farthest_pair(points: &[Position]) -> Option<(Position, Position)> {
    let multi: MultiPoint<f64> = points.iter().map(|p| Point::from(p.to_coord())).collect();
    let mut ring = multi.convex_hull().exterior().0.clone();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }

    let n = ring.len();
    if n < 2 {
        return None;
    }
    if n == 2 {
        return Some((Position::from_coord(ring[0]), Position::from_coord(ring[1])));
    }

    let mut best = (0.0, 0, 1);
    let mut j = 1;
    for i in 0..n {
        let i_next = (i + 1) % n;
        // Advance the antipodal vertex while it moves away from edge i -> i_next.
        while cross(ring[i], ring[i_next], ring[(j + 1) % n]).abs() > cross(ring[i], ring[i_next], ring[j]).abs() {
            j = (j + 1) % n;
        }
        for candidate in [i, i_next] {
            let d = coord_distance(ring[candidate], ring[j]);
            if d > best.0 {
                best = (d, candidate, j);
            }
        }
    }

    Some((Position::from_coord(ring[best.1]), Position::from_coord(ring[best.2])))
}

fn mean_distance(points: &[Position], target: &Position) -> f64 {
    points.iter().map(|p| p.planar_distance(target)).sum::<f64>() / points.len() as f64
}

/// Splits the loop at its farthest pair and keeps the arc nearer, on average, to `target`.
pub fn forward_arc(boundary: &[Position], target: &Position) -> Vec<Position> {
    let Some((p1, p2)) = farthest_pair(boundary) else {
        return boundary.to_vec();
    };
    let index_of = |p: &Position| boundary.iter().position(|q| q.nearly_equals(p));
    let (Some(a), Some(b)) = (index_of(&p1), index_of(&p2)) else {
        return boundary.to_vec();
    };
    let (n1, n2) = if a <= b { (a, b) } else { (b, a) };

    let front: Vec<Position> = boundary[n1..=n2].to_vec();
    let back: Vec<Position> = boundary[n2..].iter().chain(boundary[..=n1].iter()).copied().collect();

    if mean_distance(&front, target) <= mean_distance(&back, target) { front } else { back }
}

/// Greedy thinning: a point is kept only if no kept point lies closer than `radius`.
pub fn prune(points: &[Position], radius: f64) -> Vec<Position> {
    let mut kept: Vec<Position> = Vec::new();
    for point in points {
        if !kept.iter().any(|other| point.planar_distance(other) < radius) {
            kept.push(*point);
        }
    }
    kept
}
