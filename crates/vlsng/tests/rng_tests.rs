//! Determinism test for the process PRNG. Isolated in its own test binary:
//! the generator is process-wide, so concurrent draws from other tests would
//! perturb the stream.

use vlsng::{ProcedureKind, Program, seed_random};

fn draw() -> f32 {
    let mut program = Program::new();
    ProcedureKind::Random
        .call(vec![], &mut program)
        .expect("random")
        .as_number()
        .expect("number")
        .real
}

#[test]
fn seeding_makes_the_stream_reproducible() {
    seed_random(1234);
    let first: Vec<f32> = (0..8).map(|_| draw()).collect();
    seed_random(1234);
    let second: Vec<f32> = (0..8).map(|_| draw()).collect();
    assert_eq!(first, second);

    seed_random(99);
    let third: Vec<f32> = (0..8).map(|_| draw()).collect();
    assert_ne!(first, third);
}
