use macroquad::prelude::*;

/// A 2D physical body shared by pals and group bubbles.
///
/// Forces are collected into a pending accumulator during a tick and only
/// applied by [`crate::force::integrate`], so the order in which pairs are
/// visited never changes the outcome. A servo velocity, when set, replaces
/// whatever velocity the accumulated forces would have produced.
#[derive(Clone, Debug)]
pub struct Circle {
    pub pos: Vec2,
    pub prev_pos: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub tangible: bool,
    pending: Vec2,
    servo: Option<Vec2>,
}

impl Circle {
    pub fn new(pos: Vec2, radius: f32) -> Self {
        debug_assert!(radius > 0.0);
        Self {
            pos,
            prev_pos: pos,
            velocity: Vec2::ZERO,
            radius,
            tangible: true,
            pending: Vec2::ZERO,
            servo: None,
        }
    }

    /// Queue a velocity delta for this tick.
    pub fn push(&mut self, delta: Vec2) {
        self.pending += delta;
    }

    pub fn pending(&self) -> Vec2 {
        self.pending
    }

    /// Drive the circle at `velocity` this tick, ignoring accumulated forces.
    pub fn set_servo(&mut self, velocity: Vec2) {
        self.servo = Some(velocity);
    }

    #[cfg(test)]
    pub fn servo(&self) -> Option<Vec2> {
        self.servo
    }

    /// Fold the pending delta (or the servo override) into the velocity and reset both.
    pub(crate) fn take_forces(&mut self) {
        match self.servo.take() {
            Some(v) => self.velocity = v,
            None => self.velocity += self.pending,
        }
        self.pending = Vec2::ZERO;
    }

    /// Restore a circle from persisted parts.
    pub fn restored(pos: Vec2, velocity: Vec2, radius: f32, tangible: bool) -> Self {
        Self {
            velocity,
            tangible,
            ..Self::new(pos, radius)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_deltas_accumulate_until_taken() {
        let mut c = Circle::new(vec2(10.0, 10.0), 5.0);
        c.velocity = vec2(1.0, 0.0);
        c.push(vec2(0.5, 0.0));
        c.push(vec2(0.0, -0.25));
        assert_eq!(c.velocity, vec2(1.0, 0.0));

        c.take_forces();
        assert_eq!(c.velocity, vec2(1.5, -0.25));
        assert_eq!(c.pending(), Vec2::ZERO);
    }

    #[test]
    fn servo_overrides_accumulated_forces() {
        let mut c = Circle::new(Vec2::ZERO, 5.0);
        c.velocity = vec2(2.0, 2.0);
        c.push(vec2(3.0, 3.0));
        c.set_servo(vec2(-0.1, 0.2));

        c.take_forces();
        assert_eq!(c.velocity, vec2(-0.1, 0.2));
        assert!(c.servo().is_none());
        assert_eq!(c.pending(), Vec2::ZERO);
    }
}
