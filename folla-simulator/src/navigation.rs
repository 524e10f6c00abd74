use std::{cmp::Reverse, collections::BinaryHeap};

use glam::Vec2;
use ndarray::Array2;
use ordered_float::NotNan;

use crate::field::Field;

const SQRT_2: f32 = std::f32::consts::SQRT_2;

/// 8-connected step offsets with their costs.
const NEIGHBORS: [(i32, i32, f32); 8] = [
    (-1, 0, 1.0),
    (1, 0, 1.0),
    (0, -1, 1.0),
    (0, 1, 1.0),
    (-1, -1, SQRT_2),
    (-1, 1, SQRT_2),
    (1, -1, SQRT_2),
    (1, 1, SQRT_2),
];

/// Shortest passable path from `start` to `goal`, as world waypoints.
///
/// Waypoints are cell centers with collinear runs pruned; the final
/// waypoint is the exact goal. Returns an empty path when both points
/// share a cell, and a direct `[goal]` path when the start cell is
/// blocked or no route exists.
pub fn plan(field: &Field, start: Vec2, goal: Vec2) -> Vec<Vec2> {
    let (rows, cols) = field.shape;
    if rows == 0 || cols == 0 {
        return vec![goal];
    }

    let start_cell = field.cell_of(start);
    let goal_cell = repair_goal(field, field.cell_of(goal));

    if !field.is_passable(start_cell.0 as i32, start_cell.1 as i32) {
        return vec![goal];
    }
    if start_cell == goal_cell {
        return Vec::new();
    }

    type Score = Reverse<NotNan<f32>>;
    let float = |x: f32| Reverse(NotNan::new(x).unwrap());
    let heuristic = |cell: (usize, usize)| {
        field.cell_center(cell.0, cell.1).distance(field.cell_center(goal_cell.0, goal_cell.1))
    };

    let mut g_score = Array2::from_elem((rows, cols), f32::MAX);
    let mut parent: Array2<Option<(usize, usize)>> = Array2::from_elem((rows, cols), None);
    let mut closed = Array2::from_elem((rows, cols), false);
    let mut open = BinaryHeap::<(Score, (usize, usize))>::new();

    g_score[start_cell] = 0.0;
    open.push((float(heuristic(start_cell)), start_cell));

    let mut found = false;
    while let Some((_, cell)) = open.pop() {
        if closed[cell] {
            continue;
        }
        closed[cell] = true;

        if cell == goal_cell {
            found = true;
            break;
        }

        for (dr, dc, cost) in NEIGHBORS {
            let r = cell.0 as i32 + dr;
            let c = cell.1 as i32 + dc;
            if !field.is_passable(r, c) {
                continue;
            }
            let next = (r as usize, c as usize);
            if closed[next] {
                continue;
            }

            let candidate = g_score[cell] + cost;
            if candidate < g_score[next] {
                g_score[next] = candidate;
                parent[next] = Some(cell);
                open.push((float(candidate + heuristic(next)), next));
            }
        }
    }

    if !found {
        return vec![goal];
    }

    let mut cells = vec![goal_cell];
    while let Some(prev) = parent[*cells.last().unwrap()] {
        cells.push(prev);
    }
    cells.reverse();

    let centers = cells
        .iter()
        .map(|&(r, c)| field.cell_center(r, c))
        .collect();
    let mut path = prune_collinear(centers);
    // the agent is already on the start cell
    path.remove(0);
    *path.last_mut().unwrap() = goal;
    path
}

/// If the goal cell is blocked, pick the nearest passable cell in a 7x7
/// window around it; the original cell is kept when the window is solid.
fn repair_goal(field: &Field, cell: (usize, usize)) -> (usize, usize) {
    if field.is_passable(cell.0 as i32, cell.1 as i32) {
        return cell;
    }

    let mut best = cell;
    let mut best_dist = i32::MAX;
    for dr in -3..=3i32 {
        for dc in -3..=3i32 {
            let r = cell.0 as i32 + dr;
            let c = cell.1 as i32 + dc;
            if !field.is_passable(r, c) {
                continue;
            }
            let dist = dr * dr + dc * dc;
            if dist < best_dist {
                best_dist = dist;
                best = (r as usize, c as usize);
            }
        }
    }
    best
}

/// Drop middle waypoints whose adjacent segments are collinear.
fn prune_collinear(path: Vec<Vec2>) -> Vec<Vec2> {
    if path.len() < 3 {
        return path;
    }

    let mut pruned = Vec::with_capacity(path.len());
    pruned.push(path[0]);
    for i in 1..path.len() - 1 {
        let a = *pruned.last().unwrap();
        let b = path[i];
        let c = path[i + 1];
        if (b - a).perp_dot(c - b).abs() > 1e-4 {
            pruned.push(b);
        }
    }
    pruned.push(*path.last().unwrap());
    pruned
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use crate::{
        field::Field,
        scenario::{VenueLayout, WallConfig},
    };

    use super::plan;

    fn open_field() -> Field {
        Field::from_layout(&VenueLayout {
            size: vec2(20.0, 20.0),
            ..Default::default()
        })
    }

    fn walled_field() -> Field {
        // vertical wall from y=0 to y=15 at x in [10, 11)
        Field::from_layout(&VenueLayout {
            size: vec2(20.0, 20.0),
            walls: vec![WallConfig {
                id: "w".into(),
                min: vec2(10.0, 0.0),
                size: vec2(0.5, 15.0),
            }],
            ..Default::default()
        })
    }

    #[test]
    fn test_same_cell_yields_empty_path() {
        let field = open_field();
        assert!(plan(&field, vec2(3.2, 3.2), vec2(3.8, 3.8)).is_empty());
    }

    #[test]
    fn test_straight_line_prunes_to_goal() {
        let field = open_field();
        let path = plan(&field, vec2(2.5, 5.5), vec2(12.0, 5.5));
        assert_eq!(path, vec![vec2(12.0, 5.5)]);
    }

    #[test]
    fn test_path_ends_at_exact_goal() {
        let field = walled_field();
        let goal = vec2(17.3, 2.6);
        let path = plan(&field, vec2(2.5, 2.5), goal);
        assert_eq!(*path.last().unwrap(), goal);
    }

    #[test]
    fn test_path_routes_around_wall() {
        let field = walled_field();
        let path = plan(&field, vec2(5.5, 5.5), vec2(15.5, 5.5));
        assert!(path.len() > 1, "detour expected, got {path:?}");

        // every intermediate waypoint sits on a passable cell
        for wp in &path[..path.len() - 1] {
            let (r, c) = field.cell_of(*wp);
            assert!(field.passable[(r, c)], "waypoint {wp} in a wall");
        }
        // the detour passes over the wall's open end at y > 15
        assert!(path.iter().any(|wp| wp.y > 15.0));
    }

    #[test]
    fn test_blocked_goal_is_repaired() {
        let field = walled_field();
        // goal inside the wall; nearest passable cell is right next to it
        let path = plan(&field, vec2(2.5, 2.5), vec2(10.2, 5.5));
        assert!(path.len() > 1);
        let before_last = path[path.len() - 2];
        let (r, c) = field.cell_of(before_last);
        assert!(field.passable[(r, c)]);
    }

    #[test]
    fn test_blocked_start_falls_back_to_direct_path() {
        let field = walled_field();
        let goal = vec2(15.0, 5.0);
        assert_eq!(plan(&field, vec2(10.2, 5.5), goal), vec![goal]);
    }

    #[test]
    fn test_unreachable_goal_falls_back_to_direct_path() {
        // a fully enclosed pocket
        let field = Field::from_layout(&VenueLayout {
            size: vec2(10.0, 10.0),
            walls: vec![
                WallConfig {
                    id: "l".into(),
                    min: vec2(4.0, 4.0),
                    size: vec2(0.1, 2.9),
                },
                WallConfig {
                    id: "r".into(),
                    min: vec2(7.0, 4.0),
                    size: vec2(0.1, 2.9),
                },
                WallConfig {
                    id: "t".into(),
                    min: vec2(4.0, 4.0),
                    size: vec2(3.1, 0.1),
                },
                WallConfig {
                    id: "b".into(),
                    min: vec2(4.0, 7.0),
                    size: vec2(3.1, 0.1),
                },
            ],
            ..Default::default()
        });

        let goal = vec2(6.2, 6.2);
        // interior cells (5..=6, 5..=6) minus the repaired ring; the pocket
        // interior at (6, 6) is sealed off from (1, 1)
        assert_eq!(plan(&field, vec2(1.5, 1.5), goal), vec![goal]);
    }
}
