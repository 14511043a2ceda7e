use feed_rank::{
    oracle_ranking, solve_oracle, Event, EventLog, OracleConfig, OracleFilter, OracleScheduler,
    RankError, SimOpts, SimOptsUpdate,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const SRC: u64 = 1;

fn random_times(seed: u64, len: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut t = 0.0;
    (0..len)
        .map(|_| {
            t += rng.gen_range(0.05..2.0);
            t
        })
        .collect()
}

/// Cost of a fixed decision vector over stages `0..=n`.
fn schedule_cost(times: &[f64], end_time: f64, q: f64, s: f64, posts: &[bool]) -> f64 {
    let mut widths = Vec::new();
    let mut previous = 0.0;
    for time in times.iter().copied().chain(std::iter::once(end_time)) {
        widths.push(time - previous);
        previous = time;
    }

    let mut rank = 0usize;
    let mut cost = 0.0;
    for (width, post) in widths.iter().zip(posts) {
        if *post {
            cost += 0.5 * s;
            rank = 0;
        } else {
            let next = (rank + 1) as f64;
            cost += 0.5 * q * width * next * next;
            rank += 1;
        }
    }
    cost + (rank * rank) as f64 / 2.0
}

fn brute_force(times: &[f64], end_time: f64, q: f64, s: f64) -> f64 {
    let stages = times.len() + 1;
    (0u32..1 << stages)
        .map(|mask| {
            let posts: Vec<bool> = (0..stages).map(|k| mask & (1 << k) != 0).collect();
            schedule_cost(times, end_time, q, s, &posts)
        })
        .fold(f64::INFINITY, f64::min)
}

fn single_follower_log(times: &[f64], sink: u64) -> EventLog {
    EventLog::new(
        times
            .iter()
            .enumerate()
            .map(|(idx, t)| Event::new(idx as u64, *t, 2, sink))
            .collect(),
    )
    .unwrap()
}

#[test]
fn hand_traced_schedule() {
    let result = solve_oracle(&[1.0, 2.0, 3.0], 4.0, &[1.0], 1.0).unwrap();

    assert_eq!(result.events, vec![false, true, false, true]);
    assert_eq!(result.ranks, vec![0, 1, 0, 1]);
    assert_eq!(result.timestamps, vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(result.durations, vec![1.0, 1.0, 1.0, 1.0]);
    assert!((result.cost - 2.0).abs() < 1e-9);
    assert_eq!(result.num_events(), 2);
    assert!((result.time_in_top_k(1) - 2.0).abs() < 1e-9);
    assert!((result.time_in_top_k(2) - 4.0).abs() < 1e-9);
}

#[test]
fn matches_exhaustive_search_on_small_inputs() {
    for seed in 0..12 {
        let len = (seed % 6 + 1) as usize;
        let times = random_times(seed, len);
        let end_time = times[len - 1] + 1.5;
        for (q, s) in [(1.0, 1.0), (0.3, 2.5), (2.0, 0.4)] {
            let result = solve_oracle(&times, end_time, &[q], s).unwrap();
            let best = brute_force(&times, end_time, q, s);

            assert!(
                (result.cost - best).abs() < 1e-9,
                "seed {}: {} vs {}",
                seed,
                result.cost,
                best
            );
            let replayed = schedule_cost(&times, end_time, q, s, &result.events);
            assert!((replayed - result.cost).abs() < 1e-9);
        }
    }
}

#[test]
fn empty_wall_still_has_a_final_stage() {
    let result = solve_oracle(&[], 3.0, &[1.0], 1.0).unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.durations, vec![3.0]);
    assert!((result.cost - schedule_cost(&[], 3.0, 1.0, 1.0, &result.events)).abs() < 1e-9);
}

#[test]
fn multiple_followers_are_unsupported() {
    let err = solve_oracle(&[1.0], 2.0, &[0.5, 0.5], 1.0).unwrap_err();
    assert!(matches!(err, RankError::UnsupportedConfiguration(_)));
}

#[test]
fn event_limit_is_enforced() {
    let scheduler = OracleScheduler::new(OracleConfig {
        max_events: 3,
        ..OracleConfig::default()
    });

    let err = scheduler
        .solve(&[1.0, 2.0, 3.0, 4.0], 5.0, &[1.0], 1.0)
        .unwrap_err();
    assert_eq!(err, RankError::ScaleLimit { events: 4, limit: 3 });
    assert!(scheduler.solve(&[1.0, 2.0, 3.0], 5.0, &[1.0], 1.0).is_ok());
}

#[test]
fn invalid_inputs_are_rejected() {
    assert!(matches!(
        solve_oracle(&[2.0, 1.0], 3.0, &[1.0], 1.0),
        Err(RankError::Ordering(_))
    ));
    assert!(matches!(
        solve_oracle(&[1.0, 2.0], 1.5, &[1.0], 1.0),
        Err(RankError::Precondition(_))
    ));
    assert!(matches!(
        solve_oracle(&[1.0], 2.0, &[1.0], 0.0),
        Err(RankError::Precondition(_))
    ));
}

#[test]
fn parallel_fill_matches_sequential() {
    let times = random_times(3, 400);
    let end_time = times[399] + 1.0;
    let parallel = OracleScheduler::new(OracleConfig {
        parallel_threshold: 1,
        ..OracleConfig::default()
    });

    let expected = solve_oracle(&times, end_time, &[0.7], 3.0).unwrap();
    let actual = parallel.solve(&times, end_time, &[0.7], 3.0).unwrap();
    assert_eq!(expected, actual);
    assert_eq!(expected, solve_oracle(&times, end_time, &[0.7], 3.0).unwrap());
}

#[test]
fn posts_fewer_times_as_posting_gets_dearer() {
    let times = random_times(11, 120);
    let end_time = times[119] + 2.0;

    let counts: Vec<usize> = [0.05, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 40.0, 200.0]
        .iter()
        .map(|s| solve_oracle(&times, end_time, &[1.0], *s).unwrap().num_events())
        .collect();

    assert!(counts.windows(2).all(|pair| pair[1] <= pair[0]), "{:?}", counts);
    assert!(counts[0] > counts[counts.len() - 1]);
}

#[test]
fn ranking_uses_the_log_of_other_sources() {
    let times = [1.0, 2.0, 3.0];
    let mut events: Vec<Event> = single_follower_log(&times, 5).events().to_vec();
    events.push(Event::new(10, 3.5, SRC, 5));
    let log = EventLog::new(events).unwrap();
    let opts = SimOpts::new(SRC, vec![5], 4.0)
        .unwrap()
        .update(SimOptsUpdate::default().q_vec(vec![1.0]))
        .unwrap();
    let filter = OracleFilter {
        omit_src_ids: vec![SRC],
        follower_ids: None,
    };

    let result = oracle_ranking(&log, &opts, &filter, &OracleScheduler::default()).unwrap();
    assert_eq!(result, solve_oracle(&times, 4.0, &[1.0], 1.0).unwrap());
}

#[test]
fn ranking_restricts_to_requested_follower() {
    let mut events: Vec<Event> = single_follower_log(&[1.0, 2.0, 3.0], 5).events().to_vec();
    events.push(Event::new(7, 2.5, 3, 6));
    events.sort_by(|a, b| a.t.total_cmp(&b.t));
    let log = EventLog::new(events).unwrap();
    let opts = SimOpts::new(SRC, vec![5], 4.0).unwrap();

    let err = oracle_ranking(&log, &opts, &OracleFilter::default(), &OracleScheduler::default())
        .unwrap_err();
    assert!(matches!(err, RankError::UnsupportedConfiguration(_)));

    let filter = OracleFilter {
        omit_src_ids: Vec::new(),
        follower_ids: Some(vec![5]),
    };
    let result = oracle_ranking(&log, &opts, &filter, &OracleScheduler::default()).unwrap();
    assert_eq!(result.timestamps, vec![0.0, 1.0, 2.0, 3.0]);
}
