use super::SystemContext;

/// Every entity starts the tick idle
pub fn run(ctx: &mut SystemContext<'_>) {
    for (_, state) in ctx.store.states.iter_mut() {
        state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::components::State;
    use crate::game::systems::test_support::Harness;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_clears_all_flags() {
        let mut h = Harness::new();
        let a = h.player(Vec2::ZERO);
        let b = h.player(Vec2::new(200.0, 0.0));
        h.store.states.get_mut(a).unwrap().insert(State::MELEE);
        h.store.states.get_mut(b).unwrap().insert(State::SHOOTING);

        h.run(run, 0.1);

        assert!(h.store.states.get(a).unwrap().is_idle());
        assert!(h.store.states.get(b).unwrap().is_idle());
    }
}
