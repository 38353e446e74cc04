//! Movement and aim from client input

use super::{body_of, SystemContext};
use crate::game::constants::{direction, player};
use crate::util::vec2::Vec2;

/// Unit movement vector for a direction bitmask; zero when idle or cancelled out
pub fn direction_vector(bits: u8) -> Vec2 {
    let mut v = Vec2::ZERO;
    if bits & direction::UP != 0 {
        v += Vec2::UP;
    }
    if bits & direction::LEFT != 0 {
        v += Vec2::LEFT;
    }
    if bits & direction::DOWN != 0 {
        v += Vec2::DOWN;
    }
    if bits & direction::RIGHT != 0 {
        v += Vec2::RIGHT;
    }
    v.normalize()
}

pub fn run(ctx: &mut SystemContext<'_>) {
    for (entity, input) in ctx.store.inputs.iter() {
        let body = body_of(ctx.store, entity);
        let position = ctx.physics.position(body);
        ctx.physics
            .set_velocity(body, direction_vector(input.direction) * player::SPEED);
        ctx.physics.set_transform(body, position, input.angle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::PhysicsEngine;
    use crate::game::systems::test_support::Harness;

    #[test]
    fn test_direction_bits() {
        assert_eq!(direction_vector(0), Vec2::ZERO);
        assert_eq!(direction_vector(direction::UP), Vec2::new(0.0, -1.0));
        assert_eq!(direction_vector(direction::LEFT | direction::RIGHT), Vec2::ZERO);

        let diagonal = direction_vector(direction::DOWN | direction::RIGHT);
        assert!((diagonal.length() - 1.0).abs() < 1e-6);
        assert!(diagonal.x > 0.0 && diagonal.y > 0.0);
    }

    #[test]
    fn test_applies_velocity_and_rotation() {
        let mut h = Harness::new();
        let p = h.player(Vec2::new(50.0, 50.0));
        {
            let input = h.store.inputs.get_mut(p).unwrap();
            input.direction = direction::UP;
            input.angle = 1.25;
        }

        h.run(run, 0.1);
        let body = h.store.bases.get(p).unwrap().body.unwrap();
        assert_eq!(h.physics.rotation(body), 1.25);

        h.physics.step(1.0);
        assert_eq!(h.position(p), Vec2::new(50.0, 50.0 - player::SPEED));
    }
}
