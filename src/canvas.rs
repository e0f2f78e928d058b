use macroquad::prelude::*;

/// The fixed drawing extent every circle lives in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
}

impl Canvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        vec2(self.width * 0.5, self.height * 0.5)
    }

    pub fn extent(&self) -> Vec2 {
        vec2(self.width, self.height)
    }

    pub fn contains(&self, pos: Vec2) -> bool {
        pos.x >= 0.0 && pos.x <= self.width && pos.y >= 0.0 && pos.y <= self.height
    }

    /// Uniform point at least `margin` away from every edge (center if the margin doesn't fit).
    pub fn random_interior(&self, margin: f32, rng: &mut impl ::rand::Rng) -> Vec2 {
        let span_x = self.width - 2.0 * margin;
        let span_y = self.height - 2.0 * margin;
        if span_x <= 0.0 || span_y <= 0.0 {
            return self.center();
        }
        vec2(
            margin + rng.gen::<f32>() * span_x,
            margin + rng.gen::<f32>() * span_y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn random_interior_respects_margin() {
        let canvas = Canvas::new(600.0, 400.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let p = canvas.random_interior(70.0, &mut rng);
            assert!(p.x >= 70.0 && p.x <= 530.0);
            assert!(p.y >= 70.0 && p.y <= 330.0);
        }
    }

    #[test]
    fn oversized_margin_falls_back_to_center() {
        let canvas = Canvas::new(100.0, 100.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(canvas.random_interior(80.0, &mut rng), vec2(50.0, 50.0));
    }
}
