use macroquad::prelude::*;

use crate::canvas::Canvas;

/// Maps the logical canvas onto the window: uniform scale, centred.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub target: Vec2,
    pub scale: f32,
    pub screen: Vec2,
}

impl Viewport {
    /// Largest scale that fits the whole canvas plus `margin` pixels on each side.
    pub fn fit(canvas: &Canvas, screen: Vec2, margin: f32) -> Self {
        let usable = (screen - Vec2::splat(margin * 2.0)).max(Vec2::ONE);
        let scale = (usable.x / canvas.width).min(usable.y / canvas.height).max(1e-3);
        Self {
            target: canvas.center(),
            scale,
            screen,
        }
    }

    pub fn screen_to_canvas(&self, screen_pos: Vec2) -> Vec2 {
        self.target + (screen_pos - self.screen * 0.5) / self.scale
    }

    pub fn canvas_to_screen(&self, canvas_pos: Vec2) -> Vec2 {
        (canvas_pos - self.target) * self.scale + self.screen * 0.5
    }

    /// Pointer position on the canvas, or `None` when it is outside.
    pub fn canvas_pointer(&self, canvas: &Canvas, screen_pos: Vec2) -> Option<Vec2> {
        let pos = self.screen_to_canvas(screen_pos);
        canvas.contains(pos).then_some(pos)
    }

    pub fn to_camera(&self) -> Camera2D {
        Camera2D {
            target: self.target,
            zoom: vec2(
                self.scale / self.screen.x * 2.0,
                -self.scale / self.screen.y * 2.0,
            ),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_uses_the_tighter_axis() {
        let canvas = Canvas::new(600.0, 600.0);
        let vp = Viewport::fit(&canvas, vec2(1280.0, 800.0), 20.0);
        assert!((vp.scale - 760.0 / 600.0).abs() < 1e-5);
        assert_eq!(vp.target, vec2(300.0, 300.0));
    }

    #[test]
    fn screen_and_canvas_coordinates_invert() {
        let canvas = Canvas::new(600.0, 600.0);
        let vp = Viewport::fit(&canvas, vec2(1000.0, 700.0), 10.0);
        let p = vec2(123.0, 456.0);
        let back = vp.screen_to_canvas(vp.canvas_to_screen(p));
        assert!((back - p).length() < 1e-3);
        assert!((vp.screen_to_canvas(vec2(500.0, 350.0)) - canvas.center()).length() < 1e-3);
    }

    #[test]
    fn pointer_outside_canvas_is_none() {
        let canvas = Canvas::new(600.0, 600.0);
        let vp = Viewport::fit(&canvas, vec2(1280.0, 800.0), 20.0);
        assert!(vp.canvas_pointer(&canvas, vec2(5.0, 400.0)).is_none());
        assert!(vp.canvas_pointer(&canvas, vec2(640.0, 400.0)).is_some());
    }
}
