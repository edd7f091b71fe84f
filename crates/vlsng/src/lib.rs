#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "sample and count narrowing is bounds-checked")]
#![expect(clippy::cast_sign_loss, reason = "negative counts are clamped before casting")]

mod builtins;
mod error;
mod io;
mod lex;
mod objects;
mod parse;
mod program;
mod rng;
mod value;

pub use crate::{
    builtins::{ProcedureKind, Signature},
    error::{Error, ErrorKind, RunResult},
    io::{CollectLog, LogWriter, NoLog, StdLog, set_log_writer},
    objects::{AudioObject, Block, BlockIo},
    program::{ConnectionKind, DirectiveCallback, Program, add_global_directive},
    rng::seed_random,
    value::{Number, Sequence, Type, Value},
};

/// Samples carried per port per tick, fixed at build time.
pub const BLOCKSIZE: usize = 64;

/// Sample rate of the stream, exposed to programs as the `sf` symbol.
pub const SAMPLE_RATE: f32 = 44_100.0;

/// One full turn, exposed to programs as the `tau` symbol.
pub const TAU: f32 = std::f32::consts::TAU;
