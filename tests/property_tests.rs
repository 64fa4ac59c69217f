#[cfg(test)]
mod property_tests {
    use fds_core::{Action, Curriculum, Experience, Outcome, ReplayBuffer, RewardFunction, TrainingPhase};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    proptest! {
        #[test]
        fn amount_weight_is_monotone_and_at_least_one(
            a in 0.0f64..1e12,
            b in 0.0f64..1e12,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let w_lo = RewardFunction::amount_weight(lo).unwrap();
            let w_hi = RewardFunction::amount_weight(hi).unwrap();
            prop_assert!(w_lo >= 1.0);
            prop_assert!(w_lo <= w_hi);
        }

        #[test]
        fn normal_outcomes_are_never_weighted(
            action in 0i64..3,
            amount in 0.0f64..1e10,
        ) {
            let rf = RewardFunction::default();
            let a = Action::from_index(action).unwrap();
            prop_assert_eq!(
                rf.reward(a, Outcome::Normal, amount).unwrap(),
                rf.base_reward(action, 0).unwrap()
            );
        }

        #[test]
        fn optimal_action_is_argmax_with_low_ordinal_ties(
            p in 0.0f64..=1.0,
            amount in 0.0f64..1e9,
        ) {
            let rf = RewardFunction::default();
            let expected = rf.expected_rewards(p, amount).unwrap();
            let chosen = rf.optimal_action(p, amount).unwrap();
            for other in Action::ALL {
                let (c, o) = (expected[chosen.index()], expected[other.index()]);
                prop_assert!(c >= o);
                if other < chosen {
                    prop_assert!(c > o);
                }
            }
        }

        #[test]
        fn certain_outcomes_pick_extreme_actions(amount in 1.0f64..1e9) {
            let rf = RewardFunction::default();
            prop_assert_eq!(rf.optimal_action(0.0, amount).unwrap(), Action::Approve);
            prop_assert_eq!(rf.optimal_action(1.0, amount).unwrap(), Action::Block);
        }

        #[test]
        fn buffer_evicts_in_fifo_order(capacity in 1usize..64, extra in 1usize..64) {
            let mut buffer = ReplayBuffer::new(capacity);
            for i in 0..capacity + extra {
                buffer.push(Experience::terminal(vec![i as f64], Action::Approve, i as f64));
            }
            prop_assert_eq!(buffer.size(), capacity);
            let kept: Vec<usize> = buffer.iter().map(|e| e.reward as usize).collect();
            let expected: Vec<usize> = (extra..capacity + extra).collect();
            prop_assert_eq!(kept, expected);
        }

        #[test]
        fn sampling_is_distinct_or_fails(size in 0usize..40, batch in 1usize..40, seed in any::<u64>()) {
            let mut buffer = ReplayBuffer::new(64);
            for i in 0..size {
                buffer.push(Experience::terminal(vec![i as f64], Action::Block, i as f64));
            }
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            match buffer.sample(batch, &mut rng) {
                Ok(items) => {
                    prop_assert!(size >= batch);
                    let mut ids: Vec<usize> = items.iter().map(|e| e.reward as usize).collect();
                    ids.sort_unstable();
                    ids.dedup();
                    prop_assert_eq!(ids.len(), batch);
                }
                Err(_) => prop_assert!(size < batch),
            }
        }

        #[test]
        fn epsilon_stays_between_endpoints(
            epochs in 0u64..200,
            start in 0.0f64..=1.0,
            end in 0.0f64..=1.0,
            local in 0u64..250,
        ) {
            let phase = TrainingPhase::new("p", epochs, start, end);
            let eps = phase.epsilon_at(local);
            prop_assert!(eps >= start.min(end) - 1e-12 && eps <= start.max(end) + 1e-12);
            if epochs <= 1 {
                prop_assert_eq!(eps, end);
            }
        }

        #[test]
        fn global_epochs_locate_inside_curriculum(lengths in prop::collection::vec(0u64..6, 1..5)) {
            let curriculum = Curriculum::new(
                lengths.iter().enumerate().map(|(i, &n)| TrainingPhase::new(format!("p{}", i), n, 1.0, 0.0)).collect(),
            );
            let total = curriculum.total_epochs();
            for epoch in 0..total {
                let pos = curriculum.locate(epoch).unwrap();
                prop_assert!(pos.local_epoch < curriculum.phases()[pos.phase_index].epochs);
                prop_assert_eq!(curriculum.epochs_before(pos.phase_index) + pos.local_epoch, epoch);
            }
            prop_assert!(curriculum.locate(total).is_none());
        }
    }
}
