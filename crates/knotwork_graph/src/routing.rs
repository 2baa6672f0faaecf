// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link path routing.
//!
//! Links flow downwards: an output pin sits under its node and an input pin
//! above. Depending on where the destination lies relative to the source the
//! path is a straight segment, a short Bezier hook, a detour loop around the
//! nodes, or a vertical elbow.

use crate::geometry::{bezier_path, Aabb, Vec2};

const LOOP_CORNER_SIZE: f32 = 8.0;
const EXTEND: f32 = 16.0;

fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Route a link from `start` (leaving in `start_dir`) to `end` (entering against `end_dir`)
pub fn route_link(
    start: Vec2,
    end: Vec2,
    start_dir: Vec2,
    end_dir: Vec2,
    start_bound: Aabb,
    end_bound: Aabb,
) -> Vec<Vec2> {
    let mut xcenter = (start.x + end.x) * 0.5;
    let ycenter = (start.y + end.y) * 0.5;
    let dx = end.x - start.x;
    let dy = end.y - start.y;

    // Nearly vertical and going down.
    if dy > 0.0 && dx.abs() / dy < 0.01 {
        return vec![start, end];
    }

    let narrow = dx.abs() < start_bound.width().max(LOOP_CORNER_SIZE * 4.0)
        && dx.abs() < end_bound.width().max(LOOP_CORNER_SIZE * 4.0);
    if narrow && dy - EXTEND * 2.0 < LOOP_CORNER_SIZE * 2.0 && dy >= 0.0 {
        return bezier_path(
            start,
            start + start_dir * EXTEND,
            end + end_dir * EXTEND,
            end,
            8,
        );
    }

    let mut path = Vec::new();
    if dy < EXTEND * 2.0 + LOOP_CORNER_SIZE * 2.0 {
        // Destination is above the source: loop around.
        if dx.abs() <= dy.abs() * 2.0 {
            xcenter = start.x - sign(dx) * start_bound.width().max(end_bound.width());
        }
        let end_extend = end + Vec2::new(0.0, -EXTEND);
        let rest_dy = dy - EXTEND * 2.0;

        path.push(start);
        path.push(start + Vec2::new(0.0, EXTEND));
        let last_y = |p: &Vec<Vec2>| p.last().map_or(start.y, |v| v.y);

        if dx.abs() > rest_dy.abs() * 2.0 + LOOP_CORNER_SIZE * 8.0 {
            let y = last_y(&path) + LOOP_CORNER_SIZE;
            path.push(Vec2::new(start.x + sign(dx) * LOOP_CORNER_SIZE, y));
            path.push(Vec2::new(
                xcenter - sign(dx * rest_dy) * rest_dy / 2.0 - sign(dx) * LOOP_CORNER_SIZE,
                y,
            ));
            path.push(Vec2::new(
                xcenter + sign(dx * rest_dy) * rest_dy / 2.0 + sign(dx) * LOOP_CORNER_SIZE,
                end_extend.y - LOOP_CORNER_SIZE,
            ));
            path.push(Vec2::new(
                end.x - sign(dx) * LOOP_CORNER_SIZE,
                end_extend.y - LOOP_CORNER_SIZE,
            ));
        } else if rest_dy.abs() > EXTEND * 2.0 && dy.abs() > EXTEND {
            let side = sign(xcenter - start.x);
            let y = start.y + EXTEND + LOOP_CORNER_SIZE;
            path.push(Vec2::new(start.x + side * LOOP_CORNER_SIZE, y));
            path.push(Vec2::new(xcenter - side * LOOP_CORNER_SIZE, y));
            path.push(Vec2::new(xcenter, y - LOOP_CORNER_SIZE));
            path.push(Vec2::new(xcenter, end_extend.y));
            let back = sign(end.x - xcenter);
            path.push(Vec2::new(
                xcenter + back * LOOP_CORNER_SIZE,
                end_extend.y - LOOP_CORNER_SIZE,
            ));
            path.push(Vec2::new(
                end.x - back * LOOP_CORNER_SIZE,
                end.y - EXTEND - LOOP_CORNER_SIZE,
            ));
        } else {
            let from = start + Vec2::new(0.0, EXTEND);
            let curve = bezier_path(
                from,
                from + start_dir * EXTEND,
                end_extend + end_dir * EXTEND,
                end_extend,
                14,
            );
            path.extend_from_slice(&curve[1..curve.len() - 1]);
        }
        path.push(end_extend);
        path.push(end);
    } else {
        path.push(start);
        if dx.abs() >= 0.33 {
            if dy > dx.abs() + 42.0 {
                if dy < 80.0 {
                    path.push(Vec2::new(start.x, ycenter - dx.abs() / 2.0));
                    path.push(Vec2::new(end.x, ycenter + dx.abs() / 2.0));
                } else {
                    path.push(Vec2::new(start.x, end.y - dx.abs() - 20.0));
                    path.push(Vec2::new(end.x, end.y - 20.0));
                }
            } else if dy > 40.0 {
                path.push(Vec2::new(start.x, start.y + 20.0));
                if dy < dx.abs() + 40.0 {
                    path.push(Vec2::new(start.x + sign(dx) * (dy - 40.0) / 2.0, ycenter));
                    path.push(Vec2::new(end.x - sign(dx) * (dy - 40.0) / 2.0, ycenter));
                }
                path.push(Vec2::new(end.x, end.y - 20.0));
            }
        }
        path.push(end);
    }
    path
}

/// Bounding box of a routed path, padded for hit testing
pub fn path_bounds(path: &[Vec2]) -> Aabb {
    let Some(first) = path.first() else {
        return Aabb::default();
    };
    let mut bounds = Aabb::point(*first);
    for p in &path[1..] {
        bounds.merge_point(*p);
    }
    bounds.expand(2.0);
    bounds
}
