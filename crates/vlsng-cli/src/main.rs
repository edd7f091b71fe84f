//! Thin host harness: parse a program file, drive the graph tick by tick,
//! and write the first output channel to disk as raw little-endian
//! `float32`.

use std::{env, fs, process::ExitCode};

use vlsng::{BLOCKSIZE, Program, SAMPLE_RATE};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(program_path) = args.get(1) else {
        eprintln!("usage: vlsng <program.vlsng> [output.raw]");
        return ExitCode::FAILURE;
    };
    let output_path = args.get(2).map_or("output.raw", String::as_str);

    let source = match fs::read_to_string(program_path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("error: could not read '{program_path}': {error}");
            return ExitCode::FAILURE;
        }
    };

    let mut program = Program::new();
    program.configure_io(0, 1);
    if program.parse(&source).is_err() {
        // The parse error has already been reported through the log sink.
        return ExitCode::FAILURE;
    }

    let samples = program.requested_length().unwrap_or(SAMPLE_RATE as u64);
    let ticks = samples.div_ceil(BLOCKSIZE as u64);
    let mut rendered: Vec<u8> = Vec::with_capacity(samples as usize * 4);
    for _ in 0..ticks {
        let output = program.run(&[]);
        let Some(block) = output.first() else { break };
        rendered.extend(block.iter().flat_map(|sample| sample.to_le_bytes()));
    }
    program.finish();
    rendered.truncate(samples as usize * 4);

    if let Err(error) = fs::write(output_path, &rendered) {
        eprintln!("error: could not write '{output_path}': {error}");
        return ExitCode::FAILURE;
    }
    println!("rendered {samples} samples to {output_path}");
    ExitCode::SUCCESS
}
