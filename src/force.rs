use macroquad::prelude::*;

use crate::canvas::Canvas;
use crate::circle::Circle;

/// Impulses on `(a, b)` from an inverse-square push between two bodies.
///
/// The lighter body takes the larger share: `a` is scaled down and `b` scaled
/// up by the squared radius ratio. Coincident centres have no direction and
/// yield `None`.
pub fn pair_impulse(
    a_pos: Vec2,
    a_radius: f32,
    b_pos: Vec2,
    b_radius: f32,
    magnitude: f32,
) -> Option<(Vec2, Vec2)> {
    let delta = a_pos - b_pos;
    let dist_sq = delta.length_squared();
    if dist_sq == 0.0 || !dist_sq.is_finite() {
        return None;
    }
    let dir = delta / dist_sq.sqrt();
    let push = a_radius.sqrt() * magnitude / dist_sq;
    let size_ratio = if b_radius > 0.0 {
        (a_radius / b_radius).powi(2)
    } else {
        1.0
    };
    Some((dir * (push / size_ratio), -dir * (push * size_ratio)))
}

/// Push two tangible circles apart. Intangible participants are ignored.
pub fn repel(a: &mut Circle, b: &mut Circle, magnitude: f32) {
    if !a.tangible || !b.tangible {
        return;
    }
    if let Some((on_a, on_b)) = pair_impulse(a.pos, a.radius, b.pos, b.radius, magnitude) {
        a.push(on_a);
        b.push(on_b);
    }
}

/// Push a circle away from an immovable point (the pointer).
pub fn repel_from_point(circle: &mut Circle, point: Vec2, magnitude: f32) {
    if !circle.tangible {
        return;
    }
    let delta = circle.pos - point;
    let dist_sq = delta.length_squared();
    if dist_sq == 0.0 || !dist_sq.is_finite() {
        return;
    }
    let dir = delta / dist_sq.sqrt();
    circle.push(dir * (circle.radius.sqrt() * magnitude / dist_sq));
}

/// Short-range push of a foreign circle out of a group bubble.
///
/// Active only inside `reach * group.radius`; strength grows with the cube of
/// the overlap depth. The group recoils by `recoil` of the reaction.
pub fn repel_overlap(
    group: &mut Circle,
    other: &mut Circle,
    reach: f32,
    falloff: f32,
    recoil: f32,
) {
    if !other.tangible {
        return;
    }
    let limit = group.radius * reach;
    let delta = other.pos - group.pos;
    let dist = delta.length();
    if dist == 0.0 || dist >= limit || !dist.is_finite() {
        return;
    }
    let dir = delta / dist;
    let push = (limit - dist).powi(3) * falloff;
    other.push(dir * push);
    group.push(-dir * (push * recoil));
}

/// Soft boundary: a restoring push toward the canvas centre.
///
/// Each axis uses `(offset / extent)^exponent`; with an odd exponent the sign
/// always points inward and the push is negligible away from the edges.
pub fn repel_from_walls(circle: &mut Circle, canvas: &Canvas, exponent: i32, scale: f32) {
    let offset = (canvas.center() - circle.pos) / canvas.extent();
    let push = vec2(offset.x.powi(exponent), offset.y.powi(exponent));
    circle.push(push * circle.radius * scale);
}

/// Pairwise repulsion over a set of circles plus an optional pointer repeller.
pub fn repel_all(circles: &mut [&mut Circle], pointer: Option<Vec2>, magnitude: f32) {
    for i in 0..circles.len() {
        let (head, tail) = circles.split_at_mut(i + 1);
        let a = &mut *head[i];
        if !a.tangible {
            continue;
        }
        for b in tail.iter_mut() {
            repel(a, &mut **b, magnitude);
        }
        if let Some(point) = pointer {
            repel_from_point(a, point, magnitude);
        }
    }
}

/// Apply this tick's forces, clamp and move, then bleed energy.
///
/// Velocity is clamped before the position update so a single near-contact
/// impulse can never throw a circle across the canvas.
pub fn integrate(circle: &mut Circle, limit: f32, damping: f32) {
    circle.take_forces();
    if !circle.velocity.is_finite() {
        circle.velocity = Vec2::ZERO;
    }
    circle.velocity = circle
        .velocity
        .clamp(Vec2::splat(-limit), Vec2::splat(limit));
    circle.prev_pos = circle.pos;
    circle.pos += circle.velocity;
    circle.velocity *= damping;
}
