use std::f32::consts::TAU;

use macroquad::prelude::*;

use crate::cluster::Group;
use crate::pal::{DisplayStatus, Pal};
use crate::textures::TextureCache;
use crate::viewport::Viewport;
use crate::world::SimulationWorld;

const BG_COLOR: Color = Color::new(0.02, 0.03, 0.08, 1.0);
const CANVAS_COLOR: Color = Color::new(0.05, 0.06, 0.11, 1.0);
const BORDER_COLOR: Color = Color::new(0.15, 0.18, 0.25, 1.0);
const GROUP_PLACEHOLDER: Color = Color::new(0.35, 0.37, 0.42, 0.55);
const DISC_SEGMENTS: u16 = 40;

/// Draw one frame. `alpha` interpolates between the previous and current tick.
pub fn draw(
    world: &SimulationWorld,
    textures: &TextureCache,
    viewport: &Viewport,
    alpha: f32,
    feed_label: &str,
) {
    clear_background(BG_COLOR);
    set_camera(&viewport.to_camera());

    let canvas = world.canvas;
    draw_rectangle(0.0, 0.0, canvas.width, canvas.height, CANVAS_COLOR);
    draw_rectangle_lines(0.0, 0.0, canvas.width, canvas.height, 2.0, BORDER_COLOR);

    // Bubbles first so their members ride on top.
    for (_, group) in world.clusters.groups.iter() {
        draw_group(group, textures, alpha);
    }
    for (_, pal) in world.pals.iter() {
        draw_pal(pal, textures, alpha);
    }

    set_default_camera();
    for (_, group) in world.clusters.groups.iter() {
        let name = world
            .clusters
            .activities
            .get(&group.activity)
            .map_or(group.activity.as_str(), |a| a.name.as_str());
        let center = group.circle.prev_pos.lerp(group.circle.pos, alpha);
        let top = viewport.canvas_to_screen(center - vec2(0.0, group.circle.radius));
        draw_label(name, top - vec2(0.0, 8.0 * viewport.scale), 16.0);
    }
    for (_, pal) in world.pals.iter() {
        if pal.is_member() {
            continue;
        }
        let center = pal.circle.prev_pos.lerp(pal.circle.pos, alpha);
        let bottom = viewport.canvas_to_screen(center + vec2(0.0, pal.circle.radius));
        draw_label(&pal.identity, bottom + vec2(0.0, 14.0), 13.0);
    }

    draw_hud(world, textures, feed_label);
}

fn draw_group(group: &Group, textures: &TextureCache, alpha: f32) {
    let pos = group.circle.prev_pos.lerp(group.circle.pos, alpha);
    let radius = group.circle.radius;
    match group.background_url.as_deref().and_then(|url| textures.get(url)) {
        Some(texture) => draw_textured_disc(pos, radius, texture, Color::new(1.0, 1.0, 1.0, 0.8)),
        None => draw_circle(pos.x, pos.y, radius, GROUP_PLACEHOLDER),
    }
    draw_circle_lines(pos.x, pos.y, radius, 1.5, Color::new(0.7, 0.75, 0.85, 0.5));
}

fn draw_pal(pal: &Pal, textures: &TextureCache, alpha: f32) {
    let pos = pal.circle.prev_pos.lerp(pal.circle.pos, alpha);
    let radius = pal.circle.radius;
    let tint = status_tint(pal.status);

    match pal.avatar_url.as_deref().and_then(|url| textures.get(url)) {
        Some(texture) => draw_textured_disc(pos, radius, texture, tint),
        None => {
            let base = placeholder_color(&pal.identity);
            let color = Color::new(base.r * tint.r, base.g * tint.g, base.b * tint.b, tint.a);
            draw_circle(pos.x, pos.y, radius, color);
            if let Some(initial) = pal.identity.chars().next() {
                let text = initial.to_uppercase().to_string();
                let size = (radius * 1.2).max(8.0);
                let dims = measure_text(&text, None, size as u16, 1.0);
                draw_text(
                    &text,
                    pos.x - dims.width * 0.5,
                    pos.y + dims.offset_y * 0.5,
                    size,
                    Color::new(1.0, 1.0, 1.0, 0.85 * tint.a),
                );
            }
        }
    }

    let ring = match pal.status {
        DisplayStatus::Online => Color::new(0.35, 0.85, 0.45, 0.9),
        DisplayStatus::Idle => Color::new(0.95, 0.75, 0.25, 0.8),
        DisplayStatus::Offline => Color::new(0.45, 0.45, 0.5, 0.6),
    };
    draw_circle_lines(pos.x, pos.y, radius, 1.5, ring);
}

/// Disc with the texture mapped across its bounding square.
fn draw_textured_disc(center: Vec2, radius: f32, texture: &Texture2D, tint: Color) {
    let mut vertices = Vec::with_capacity(DISC_SEGMENTS as usize + 2);
    vertices.push(Vertex::new(center.x, center.y, 0.0, 0.5, 0.5, tint));
    for i in 0..=DISC_SEGMENTS {
        let dir = Vec2::from_angle(TAU * i as f32 / DISC_SEGMENTS as f32);
        let p = center + dir * radius;
        vertices.push(Vertex::new(p.x, p.y, 0.0, 0.5 + dir.x * 0.5, 0.5 + dir.y * 0.5, tint));
    }
    let indices = (1..=DISC_SEGMENTS).flat_map(|i| [0, i, i + 1]).collect();
    draw_mesh(&Mesh {
        vertices,
        indices,
        texture: Some(texture.clone()),
    });
}

fn status_tint(status: DisplayStatus) -> Color {
    match status {
        DisplayStatus::Online => Color::new(1.0, 1.0, 1.0, 1.0),
        DisplayStatus::Idle => Color::new(0.8, 0.8, 0.8, 1.0),
        DisplayStatus::Offline => Color::new(0.5, 0.5, 0.5, 0.6),
    }
}

/// Stable per-name hue so a pal keeps its colour across sessions.
fn placeholder_color(identity: &str) -> Color {
    let hash = identity
        .bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    let hue = (hash % 360) as f32 / 360.0;
    macroquad::color::hsl_to_rgb(hue, 0.55, 0.5)
}

fn draw_label(text: &str, anchor: Vec2, size: f32) {
    let tc = Color::new(0.8, 0.85, 0.9, 0.9);
    let sh = Color::new(0.0, 0.0, 0.0, 0.5);
    let w = measure_text(text, None, size as u16, 1.0).width;
    let x = anchor.x - w * 0.5;
    draw_text(text, x + 1.0, anchor.y + 1.0, size, sh);
    draw_text(text, x, anchor.y, size, tc);
}

fn draw_hud(world: &SimulationWorld, textures: &TextureCache, feed_label: &str) {
    let tc = Color::new(0.7, 0.75, 0.8, 1.0);
    let sh = Color::new(0.0, 0.0, 0.0, 0.5);

    let lines = [
        format!("FPS: {}", get_fps()),
        format!("Pals: {}", world.pals.len()),
        format!("Groups: {}", world.clusters.groups.len()),
        format!("Tick: {}", world.tick_count),
        format!("Images: {}", textures.loaded()),
        format!("Feed: {feed_label}"),
    ];
    for (i, line) in lines.iter().enumerate() {
        let y = 20.0 + i as f32 * 20.0;
        draw_text(line, 11.0, y + 1.0, 18.0, sh);
        draw_text(line, 10.0, y, 18.0, tc);
    }

    if world.paused {
        let pause_text = "PAUSED (Space to resume)";
        let tw = measure_text(pause_text, None, 24, 1.0).width;
        let x = screen_width() * 0.5 - tw * 0.5;
        draw_text(pause_text, x + 1.0, 31.0, 24.0, sh);
        draw_text(pause_text, x, 30.0, 24.0, Color::new(1.0, 0.8, 0.2, 0.9));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_colour_is_stable_per_name() {
        let a = placeholder_color("ana");
        assert_eq!(a, placeholder_color("ana"));
        assert_ne!(a, placeholder_color("bo"));
    }
}
