//! Hot-path benchmarks: the interval recurrence (runs once per step in the
//! ISR) and full move preparation (foreground).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stepcore::profile::{next_interval, ramp_interval, VelocityState};
use stepcore::queue::Move;
use stepcore::{Position, DEFAULT_CONFIG};

fn plan_10cm_x() -> Move {
    let mut target = Position::ORIGIN;
    target.0[0] = 100_000;
    Move::plan(&DEFAULT_CONFIG, Position::ORIGIN, target, 6_000, None)
        .unwrap()
        .unwrap()
}

fn bench_ramp_recurrence(c: &mut Criterion) {
    c.bench_function("ramp_interval", |b| {
        b.iter(|| ramp_interval(black_box(40_000), black_box(17)))
    });
}

fn bench_full_profile(c: &mut Criterion) {
    let mv = plan_10cm_x();
    c.bench_function("profile_full_move", |b| {
        b.iter(|| {
            let mut vs = VelocityState::for_move(&mv);
            let mut sum = 0u64;
            for n in 1..mv.total_steps {
                sum += u64::from(next_interval(&mv, n, &mut vs));
            }
            black_box(sum)
        })
    });
}

fn bench_move_plan(c: &mut Criterion) {
    c.bench_function("move_plan", |b| {
        b.iter(|| {
            let mut target = Position::ORIGIN;
            target.0[0] = black_box(100_000);
            target.0[1] = black_box(42_000);
            Move::plan(&DEFAULT_CONFIG, Position::ORIGIN, target, 6_000, None)
        })
    });
}

criterion_group!(
    benches,
    bench_ramp_recurrence,
    bench_full_profile,
    bench_move_plan
);
criterion_main!(benches);
