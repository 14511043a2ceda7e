use feed_rank::metrics::{
    average_rank, average_rank_for, quadratic_loss_assuming_rate, quadratic_loss_assuming_rate_for,
    quadratic_loss_optimal, quadratic_loss_optimal_for, rank_integral, time_in_top_k,
    time_in_top_k_for, utility_integral, utility_integral_for,
};
use feed_rank::{
    compute_rank_trajectory, compute_rank_trajectory_with, Event, EventLog, RankError, RankIndex,
    RankOptions, RankTrajectory, SimOpts, SimOptsUpdate,
};

const SRC: u64 = 1;
const RIVAL: u64 = 2;
const END: f64 = 6.0;

/// Filled ranks on rows t = 0..=5: follower 1 reads [0,1,2,3,3,0] and
/// follower 2 reads [0,0,0,0,1,0].
fn scenario_log() -> EventLog {
    EventLog::new(vec![
        Event::new(0, 0.0, SRC, 1),
        Event::new(0, 0.0, SRC, 2),
        Event::new(1, 1.0, RIVAL, 1),
        Event::new(2, 2.0, RIVAL, 1),
        Event::new(3, 3.0, RIVAL, 1),
        Event::new(4, 4.0, RIVAL, 2),
        Event::new(5, 5.0, SRC, 1),
        Event::new(5, 5.0, SRC, 2),
    ])
    .unwrap()
}

fn scenario() -> RankTrajectory {
    compute_rank_trajectory(&scenario_log(), SRC).unwrap()
}

fn assert_series(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{:?} != {:?}", actual, expected);
    }
}

#[test]
fn utility_integral_weights_each_follower() {
    // Weights sqrt(q/s) = [1, 2]: per-row utility [0, 1, 2, 3, 5, 0], unit widths.
    let value = utility_integral(&scenario(), &[1, 2], &[1.0, 4.0], 1.0, END).unwrap();
    assert!((value - 11.0).abs() < 1e-9);

    let quartered = utility_integral(&scenario(), &[1, 2], &[1.0, 4.0], 4.0, END).unwrap();
    assert!((quartered - 5.5).abs() < 1e-9);
}

#[test]
fn utility_integral_extends_last_row_to_end_time() {
    let log = EventLog::new(vec![
        Event::new(0, 0.0, RIVAL, 1),
        Event::new(1, 2.0, RIVAL, 1),
    ])
    .unwrap();
    let trajectory = compute_rank_trajectory(&log, SRC).unwrap();

    // Rank 1 for 2 time units, then rank 2 for 8.
    let value = utility_integral(&trajectory, &[1], &[1.0], 1.0, 10.0).unwrap();
    assert!((value - 18.0).abs() < 1e-9);
}

#[test]
fn utility_integral_requires_sorted_followers() {
    let err = utility_integral(&scenario(), &[2, 1], &[1.0, 1.0], 1.0, END).unwrap_err();
    assert!(matches!(err, RankError::Ordering(_)));
}

#[test]
fn utility_integral_rejects_unknown_followers_and_bad_weights() {
    let err = utility_integral(&scenario(), &[1, 9], &[1.0, 1.0], 1.0, END).unwrap_err();
    assert!(matches!(err, RankError::Precondition(_)));

    let err = utility_integral(&scenario(), &[1, 2], &[1.0], 1.0, END).unwrap_err();
    assert!(matches!(err, RankError::Precondition(_)));

    let err = utility_integral(&scenario(), &[1, 2], &[1.0, 1.0], 0.0, END).unwrap_err();
    assert!(matches!(err, RankError::Precondition(_)));
}

#[test]
fn time_in_top_k_uses_mean_rank() {
    // Mean ranks [0, 0.5, 1, 1.5, 2, 0].
    let trajectory = scenario();
    assert!((time_in_top_k(&trajectory, 1, END).unwrap() - 2.0).abs() < 1e-9);
    assert!((time_in_top_k(&trajectory, 2, END).unwrap() - 4.0).abs() < 1e-9);
    assert!((time_in_top_k(&trajectory, 3, END).unwrap() - 6.0).abs() < 1e-9);
}

#[test]
fn rank_integral_and_average_rank() {
    let trajectory = scenario();
    assert!((rank_integral(&trajectory, END).unwrap() - 5.0).abs() < 1e-9);
    assert!((average_rank(&trajectory, END).unwrap() - 5.0 / 6.0).abs() < 1e-9);
}

#[test]
fn average_rank_of_empty_trajectory_is_an_error() {
    let trajectory = compute_rank_trajectory(&EventLog::default(), SRC).unwrap();
    assert!(matches!(
        average_rank(&trajectory, END),
        Err(RankError::Precondition(_))
    ));
}

#[test]
fn constant_rate_loss_adds_posting_cost() {
    // Default weights 1/4 each; posting term 0.5 * 1 * 2².
    let series = quadratic_loss_assuming_rate(&scenario(), 2.0, &[1, 2], None, 1.0).unwrap();

    assert_eq!(series.times, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_series(&series.values, &[2.0, 2.125, 2.5, 3.125, 3.25, 2.0]);
}

#[test]
fn optimal_loss_doubles_visibility_term() {
    let series = quadratic_loss_optimal(&scenario(), &[1, 2], &[0.25, 0.25]).unwrap();

    assert_series(&series.values, &[0.0, 0.25, 1.0, 2.25, 2.5, 0.0]);
    assert!((series.integral(END) - 6.0).abs() < 1e-9);
}

#[test]
fn log_level_helpers_read_options() {
    let opts = SimOpts::new(SRC, vec![1, 2], END)
        .unwrap()
        .update(SimOptsUpdate::default().q_vec(vec![1.0, 4.0]))
        .unwrap();
    let log = scenario_log();

    assert!((utility_integral_for(&log, &opts).unwrap() - 11.0).abs() < 1e-9);
    assert!((time_in_top_k_for(&log, 1, &opts).unwrap() - 2.0).abs() < 1e-9);
    assert!((average_rank_for(&log, &opts).unwrap() - 5.0 / 6.0).abs() < 1e-9);

    let optimal = quadratic_loss_optimal_for(&log, &opts).unwrap();
    let poisson = quadratic_loss_assuming_rate_for(&log, 0.0, &opts).unwrap();
    assert_series(&optimal.values, &poisson.values.iter().map(|v| 2.0 * v).collect::<Vec<_>>());
}

#[test]
fn aggregation_is_pure() {
    let trajectory = scenario();
    let first = utility_integral(&trajectory, &[1, 2], &[0.3, 0.7], 0.9, END).unwrap();
    let second = utility_integral(&trajectory, &[1, 2], &[0.3, 0.7], 0.9, END).unwrap();
    assert_eq!(first.to_bits(), second.to_bits());

    let first = quadratic_loss_optimal(&trajectory, &[1, 2], &[0.3, 0.7]).unwrap();
    let second = quadratic_loss_optimal(&trajectory, &[1, 2], &[0.3, 0.7]).unwrap();
    assert_eq!(first, second);
    assert_eq!(trajectory, scenario());
}

#[test]
fn rows_out_of_time_order_are_rejected() {
    // Event ids run against time, so the event-indexed rows go t = 2, 1, 0.
    let log = EventLog::new(vec![
        Event::new(9, 0.0, RIVAL, 1),
        Event::new(5, 1.0, RIVAL, 1),
        Event::new(2, 2.0, SRC, 1),
    ])
    .unwrap();
    let options = RankOptions {
        index: RankIndex::Event,
        fill: true,
    };
    let trajectory = compute_rank_trajectory_with(&log, SRC, options).unwrap();
    assert_eq!(trajectory.times(), &[2.0, 1.0, 0.0]);

    assert!(matches!(
        utility_integral(&trajectory, &[1], &[1.0], 1.0, END),
        Err(RankError::Ordering(_))
    ));
    assert!(matches!(
        time_in_top_k(&trajectory, 1, END),
        Err(RankError::Ordering(_))
    ));
    assert!(matches!(
        rank_integral(&trajectory, END),
        Err(RankError::Ordering(_))
    ));
    assert!(matches!(
        average_rank(&trajectory, END),
        Err(RankError::Ordering(_))
    ));
    assert!(matches!(
        quadratic_loss_optimal(&trajectory, &[1], &[1.0]),
        Err(RankError::Ordering(_))
    ));

    let by_time = compute_rank_trajectory(&log, SRC).unwrap();
    assert!((rank_integral(&by_time, END).unwrap() - 3.0).abs() < 1e-9);
}
