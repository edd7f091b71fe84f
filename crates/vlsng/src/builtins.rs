//! The standard procedure library.
//!
//! Every procedure is a variant of [`ProcedureKind`] with a fixed
//! `(min, max, mappable)` signature. Calls are arity-checked and, for
//! mappable procedures whose first argument is a sequence, lifted
//! elementwise. Procedures receive the current [`Program`] so that the
//! graph-aware entries (`run_subgraph`, `import_library`, `count_nodes`,
//! `implementation_of`) can reach its tables.

use std::{fs, path::PathBuf, str::FromStr};

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    BLOCKSIZE, TAU,
    error::{Error, RunResult},
    io, rng,
    program::Program,
    value::{Number, Sequence, Value},
};

/// The closed set of standard procedures, addressable by their language
/// names (`length_of`, `Arg`, `DFT`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProcedureKind {
    Random,
    #[strum(serialize = "Arg")]
    Arg,
    Abs,
    Mod,
    Sin,
    Cos,
    Ceil,
    Floor,
    Tanh,
    Atan,
    Sign,
    Clamp,
    Sqrt,
    Ln,
    Log,
    #[strum(serialize = "Re")]
    Re,
    #[strum(serialize = "Im")]
    Im,
    Conjugate,
    Reverse,
    Concatenate,
    Map,
    Sum,
    Average,
    Greatest,
    Smallest,
    Print,
    LengthOf,
    TypeOf,
    ReadFile,
    WriteFile,
    ImplementationOf,
    Repeat,
    CountNodes,
    ImportLibrary,
    RunSubgraph,
    #[strum(serialize = "DFT")]
    Dft,
    #[strum(serialize = "FFT")]
    Fft,
}

/// Declared arity and broadcast behaviour of a procedure.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub min: usize,
    /// `None` means unbounded.
    pub max: Option<usize>,
    /// Whether a sequence first argument lifts the call elementwise.
    pub mappable: bool,
}

impl Signature {
    const fn new(min: usize, max: Option<usize>, mappable: bool) -> Self {
        Self { min, max, mappable }
    }
}

impl ProcedureKind {
    /// Resolves a language name to a procedure.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        Self::from_str(name).ok()
    }

    #[must_use]
    pub fn signature(self) -> Signature {
        match self {
            Self::Random => Signature::new(0, Some(2), false),
            Self::Arg
            | Self::Abs
            | Self::Sin
            | Self::Cos
            | Self::Ceil
            | Self::Floor
            | Self::Tanh
            | Self::Atan
            | Self::Sign
            | Self::Sqrt
            | Self::Ln
            | Self::Re
            | Self::Im
            | Self::Conjugate => Signature::new(1, Some(1), true),
            Self::Mod => Signature::new(2, Some(2), true),
            Self::Clamp => Signature::new(3, Some(3), true),
            Self::Log => Signature::new(1, Some(2), true),
            Self::Reverse | Self::LengthOf | Self::TypeOf | Self::ReadFile | Self::ImplementationOf => {
                Signature::new(1, Some(1), false)
            }
            Self::Sum | Self::Average | Self::Greatest | Self::Smallest | Self::Dft | Self::Fft => {
                Signature::new(1, Some(1), false)
            }
            Self::Concatenate | Self::Map | Self::WriteFile | Self::Repeat | Self::RunSubgraph => {
                Signature::new(2, Some(2), false)
            }
            Self::Print => Signature::new(1, None, false),
            Self::CountNodes => Signature::new(0, Some(0), false),
            Self::ImportLibrary => Signature::new(1, Some(1), false),
        }
    }

    /// Invokes the procedure with arity checking and elementwise lifting.
    pub fn call(self, args: Vec<Value>, program: &mut Program) -> RunResult<Value> {
        let signature = self.signature();
        if args.len() < signature.min {
            return Err(Error::type_error(format!(
                "The '{self}' procedure expects at least {} argument(s), got {}",
                signature.min,
                args.len()
            )));
        }
        if let Some(max) = signature.max {
            if args.len() > max {
                return Err(Error::type_error(format!(
                    "The '{self}' procedure expects at most {max} argument(s), got {}",
                    args.len()
                )));
            }
        }
        if signature.mappable {
            if let Some(Value::Sequence(source)) = args.first() {
                let source = source.clone();
                let mut mapped = Sequence::new();
                for element in &source {
                    let mut lifted = args.clone();
                    lifted[0] = Value::Number(*element);
                    mapped.push(self.invoke(lifted, program)?.as_number()?);
                }
                return Ok(Value::Sequence(mapped));
            }
        }
        self.invoke(args, program)
    }

    /// Dispatch without arity checking; `map` calls through here so that its
    /// `(element, index)` argument pair reaches single-argument procedures.
    fn invoke(self, args: Vec<Value>, program: &mut Program) -> RunResult<Value> {
        match self {
            Self::Random => random(&args),
            Self::Arg => Ok(Value::from(number_arg(&args, 0, "Arg")?.angle())),
            Self::Abs => Ok(Value::from(number_arg(&args, 0, "abs")?.magnitude())),
            Self::Mod => {
                let lhs = number_arg(&args, 0, "mod")?;
                let rhs = number_arg(&args, 1, "mod")?;
                Ok(Value::from(lhs.real % rhs.real))
            }
            Self::Sin => Ok(Value::from(number_arg(&args, 0, "sin")?.real.sin())),
            Self::Cos => Ok(Value::from(number_arg(&args, 0, "cos")?.real.cos())),
            Self::Ceil => componentwise(&args, "ceil", f32::ceil),
            Self::Floor => componentwise(&args, "floor", f32::floor),
            Self::Tanh => componentwise(&args, "tanh", f32::tanh),
            Self::Atan => componentwise(&args, "atan", f32::atan),
            Self::Sign => {
                let number = number_arg(&args, 0, "sign")?;
                Ok(Value::from(if number.real >= 0.0 { 1.0 } else { -1.0 }))
            }
            Self::Clamp => {
                let value = number_arg(&args, 0, "clamp")?;
                let low = number_arg(&args, 1, "clamp")?;
                let high = number_arg(&args, 2, "clamp")?;
                Ok(Value::from(value.real.max(low.real).min(high.real)))
            }
            Self::Sqrt => Ok(Value::Number(number_arg(&args, 0, "sqrt")?.pow(Number::from(0.5)))),
            Self::Ln => Ok(Value::from(number_arg(&args, 0, "ln")?.real.ln())),
            Self::Log => {
                let value = number_arg(&args, 0, "log")?;
                let base = match args.get(1) {
                    Some(argument) => argument.as_number()?.real,
                    None => 10.0,
                };
                Ok(Value::from(value.real.ln() / base.ln()))
            }
            Self::Re => Ok(Value::from(number_arg(&args, 0, "Re")?.real)),
            Self::Im => Ok(Value::from(number_arg(&args, 0, "Im")?.imag)),
            Self::Conjugate => Ok(Value::Number(number_arg(&args, 0, "conjugate")?.conjugate())),
            Self::Reverse => {
                let source = sequence_arg(&args, 0, "reverse")?;
                Ok(Value::Sequence(source.iter().rev().copied().collect()))
            }
            Self::Concatenate => concatenate(&args),
            Self::Map => map(&args, program),
            Self::Sum => Ok(Value::Number(sum_of(sequence_arg(&args, 0, "sum")?))),
            Self::Average => {
                let sequence = sequence_arg(&args, 0, "average")?;
                let total = sum_of(sequence);
                Ok(Value::Number(total / Number::from(sequence.len() as f32)))
            }
            Self::Greatest => extremum(&args, "greatest", |candidate, best| candidate > best),
            Self::Smallest => extremum(&args, "smallest", |candidate, best| candidate < best),
            Self::Print => {
                let message: String = args.iter().map(ToString::to_string).collect();
                io::log(&message);
                Ok(Value::from(0.0))
            }
            Self::LengthOf => Ok(Value::from(sequence_arg(&args, 0, "length_of")?.len() as f32)),
            Self::TypeOf => {
                let argument = args
                    .first()
                    .ok_or_else(|| Error::type_error("The 'type_of' procedure expects an argument"))?;
                Ok(Value::Text(argument.get_type().to_string()))
            }
            Self::ReadFile => read_file(&args),
            Self::WriteFile => write_file(&args),
            Self::ImplementationOf => {
                let name = text_arg(&args, 0, "implementation_of")?;
                let Some(definition) = program.find_subgraph(name) else {
                    return Err(Error::semantic(format!(
                        "'implementation_of({name})': Sub-graph implementation not found"
                    )));
                };
                Ok(Value::Text(definition.source))
            }
            Self::Repeat => {
                let source = sequence_arg(&args, 0, "repeat")?;
                let count = number_arg(&args, 1, "repeat")?.real.max(0.0) as usize;
                let mut repeated = Sequence::new();
                for _ in 0..count {
                    for element in source {
                        repeated.push(*element);
                    }
                }
                Ok(Value::Sequence(repeated))
            }
            Self::CountNodes => Ok(Value::from(program.count_nodes() as f32)),
            Self::ImportLibrary => import_library(&args, program),
            Self::RunSubgraph => run_subgraph(&args, program),
            Self::Dft => dft(&args),
            Self::Fft => fft(&args),
        }
    }
}

// --- argument extraction ---

fn argument<'a>(args: &'a [Value], index: usize, procedure: &str) -> RunResult<&'a Value> {
    args.get(index).ok_or_else(|| {
        Error::type_error(format!(
            "The '{procedure}' procedure is missing argument {}",
            index + 1
        ))
    })
}

fn number_arg(args: &[Value], index: usize, procedure: &str) -> RunResult<Number> {
    argument(args, index, procedure)?.as_number()
}

fn sequence_arg<'a>(args: &'a [Value], index: usize, procedure: &str) -> RunResult<&'a Sequence> {
    argument(args, index, procedure)?.as_sequence()
}

fn text_arg<'a>(args: &'a [Value], index: usize, procedure: &str) -> RunResult<&'a str> {
    argument(args, index, procedure)?.as_text()
}

// --- implementations ---

/// `random()` is U(0,1); `random(a)` is U(0,a); `random(a,b)` is U(a,b).
fn random(args: &[Value]) -> RunResult<Value> {
    let mut low = 0.0;
    let mut high = 1.0;
    if let Some(argument) = args.first() {
        high = argument.as_number()?.real;
    }
    if let Some(argument) = args.get(1) {
        low = high;
        high = argument.as_number()?.real;
    }
    Ok(Value::from(rng::uniform(low, high)))
}

fn componentwise(args: &[Value], procedure: &str, function: fn(f32) -> f32) -> RunResult<Value> {
    let number = number_arg(args, 0, procedure)?;
    Ok(Value::Number(Number::new(function(number.real), function(number.imag))))
}

fn sum_of(sequence: &Sequence) -> Number {
    sequence.iter().fold(Number::from(0.0), |total, element| total + *element)
}

fn extremum(args: &[Value], procedure: &str, wins: fn(f32, f32) -> bool) -> RunResult<Value> {
    let sequence = sequence_arg(args, 0, procedure)?;
    let mut best = sequence.get(0)?;
    for element in sequence {
        if wins(element.magnitude(), best.magnitude()) {
            best = *element;
        }
    }
    Ok(Value::Number(best))
}

/// Joins two sequences or two texts.
fn concatenate(args: &[Value]) -> RunResult<Value> {
    match (argument(args, 0, "concatenate")?, argument(args, 1, "concatenate")?) {
        (Value::Sequence(first), Value::Sequence(second)) => {
            Ok(Value::Sequence(first.iter().chain(second.iter()).copied().collect()))
        }
        (Value::Text(first), Value::Text(second)) => {
            let mut joined = first.clone();
            joined.push_str(second);
            Ok(Value::Text(joined))
        }
        _ => Err(Error::type_error(
            "The 'concatenate' procedure expects two sequences or two texts",
        )),
    }
}

/// Applies a procedure over a sequence, passing `(element, index)` pairs.
fn map(args: &[Value], program: &mut Program) -> RunResult<Value> {
    let source = sequence_arg(args, 0, "map")?.clone();
    let procedure = argument(args, 1, "map")?.as_procedure()?;
    let mut mapped = Sequence::new();
    for (index, element) in source.iter().enumerate() {
        let call_args = vec![Value::Number(*element), Value::from(index as f32)];
        mapped.push(procedure.invoke(call_args, program)?.as_number()?);
    }
    Ok(Value::Sequence(mapped))
}

/// Reads a raw little-endian `float32` file into a sequence.
fn read_file(args: &[Value]) -> RunResult<Value> {
    let path = text_arg(args, 0, "read_file")?;
    let bytes = fs::read(path)
        .map_err(|_| Error::io(format!("Could not read file, not found: '{path}'")))?;
    let mut sequence = Sequence::new();
    for chunk in bytes.chunks_exact(4) {
        sequence.push(Number::from(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])));
    }
    Ok(Value::Sequence(sequence))
}

/// Writes a sequence's real parts verbatim as little-endian `float32`.
fn write_file(args: &[Value]) -> RunResult<Value> {
    let path = text_arg(args, 0, "write_file")?;
    let sequence = sequence_arg(args, 1, "write_file")?;
    let bytes: Vec<u8> = sequence
        .iter()
        .flat_map(|element| element.real.to_le_bytes())
        .collect();
    fs::write(path, bytes).map_err(|error| Error::io(format!("Could not write file '{path}': {error}")))?;
    Ok(Value::from(0.0))
}

/// Opens `<name>` under the library path, then `<name>.vlsng`, then the same
/// pair relative to the working directory, and parses the first hit into the
/// current program (additively).
fn import_library(args: &[Value], program: &mut Program) -> RunResult<Value> {
    let name = text_arg(args, 0, "import_library")?.to_owned();
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(directory) = program.library_path() {
        candidates.push(directory.join(&name));
        candidates.push(directory.join(format!("{name}.vlsng")));
    }
    candidates.push(PathBuf::from(&name));
    candidates.push(PathBuf::from(format!("{name}.vlsng")));

    for candidate in candidates {
        if let Ok(source) = fs::read_to_string(&candidate) {
            program.parse(&source)?;
            return Ok(Value::from(0.0));
        }
    }
    Err(Error::io(format!("Library not available: '{name}'")))
}

/// Instantiates a stored sub-graph as a fresh inner program, ticks it until
/// the requested sample count is covered, and returns the first `n` samples
/// of output port 0.
fn run_subgraph(args: &[Value], program: &mut Program) -> RunResult<Value> {
    let name = text_arg(args, 0, "run_subgraph")?;
    let samples = number_arg(args, 1, "run_subgraph")?.real.max(0.0) as usize;
    let Some(definition) = program.find_subgraph(name) else {
        return Err(Error::semantic(format!("Sub-graph '{name}' not found")));
    };
    if definition.outputs == 0 {
        return Err(Error::semantic(format!("Sub-graph '{name}' has no output to sample")));
    }

    let mut inner = Program::new();
    inner.set_ancestry(program.ancestry_snapshot());
    inner.configure_io(definition.inputs, definition.outputs);
    inner.parse(&definition.source)?;

    let mut rendered = Sequence::new();
    let ticks = samples.div_ceil(BLOCKSIZE);
    for _ in 0..ticks {
        let output = inner.run(&[]);
        let Some(block) = output.first() else { break };
        for sample in block {
            if rendered.len() >= samples {
                break;
            }
            rendered.push(Number::from(*sample));
        }
    }
    Ok(Value::Sequence(rendered))
}

/// The normalised discrete Fourier transform,
/// `X[n] = (1/N) Σ_s x[s]·e^(−i·τ·s·n/N)`.
///
/// The angle is reduced modulo the period and the accumulation runs in
/// double precision; without both, single-precision trigonometry drifts past
/// the FFT by far more than the transform's own rounding.
fn dft(args: &[Value]) -> RunResult<Value> {
    let data = sequence_arg(args, 0, "DFT")?;
    let length = data.len();
    let mut transformed = Sequence::new();
    for bin in 0..length {
        let mut real_sum = 0.0_f64;
        let mut imag_sum = 0.0_f64;
        for (step, element) in data.iter().enumerate() {
            let theta = std::f64::consts::TAU * ((step * bin) % length) as f64 / length as f64;
            let (sin, cos) = theta.sin_cos();
            real_sum += f64::from(element.real) * cos + f64::from(element.imag) * sin;
            imag_sum += f64::from(element.imag) * cos - f64::from(element.real) * sin;
        }
        transformed.push(Number::new(
            (real_sum / length as f64) as f32,
            (imag_sum / length as f64) as f32,
        ));
    }
    Ok(Value::Sequence(transformed))
}

/// Radix-2 Cooley–Tukey over the same definition as [`dft`]; the length must
/// be a power of two.
fn fft(args: &[Value]) -> RunResult<Value> {
    let mut data = sequence_arg(args, 0, "FFT")?.clone();
    let length = data.len();
    if !length.is_power_of_two() {
        return Err(Error::type_error("FFT size must be a power of 2"));
    }
    fft_in_place(data.data_mut());
    let scale = Number::from(length as f32);
    Ok(Value::Sequence(data.iter().map(|element| *element / scale).collect()))
}

fn fft_in_place(data: &mut [Number]) {
    let length = data.len();
    if length < 2 {
        return;
    }
    let half = length / 2;
    let evens: Vec<Number> = data.iter().step_by(2).copied().collect();
    let odds: Vec<Number> = data.iter().skip(1).step_by(2).copied().collect();
    data[..half].copy_from_slice(&evens);
    data[half..].copy_from_slice(&odds);

    let (low, high) = data.split_at_mut(half);
    fft_in_place(low);
    fft_in_place(high);

    for bin in 0..half {
        let even = low[bin];
        let theta = -TAU * bin as f32 / length as f32;
        let twiddle = Number::new(theta.cos(), theta.sin()) * high[bin];
        low[bin] = even + twiddle;
        high[bin] = even - twiddle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_with_their_original_casing() {
        assert_eq!(ProcedureKind::lookup("length_of"), Some(ProcedureKind::LengthOf));
        assert_eq!(ProcedureKind::lookup("Arg"), Some(ProcedureKind::Arg));
        assert_eq!(ProcedureKind::lookup("DFT"), Some(ProcedureKind::Dft));
        assert_eq!(ProcedureKind::lookup("arg"), None);
        assert_eq!(ProcedureKind::lookup("missing"), None);
    }

    #[test]
    fn signatures_mark_the_elementwise_procedures() {
        assert!(ProcedureKind::Sqrt.signature().mappable);
        assert!(!ProcedureKind::Reverse.signature().mappable);
        assert_eq!(ProcedureKind::Print.signature().max, None);
        assert_eq!(ProcedureKind::Random.signature().min, 0);
    }

    #[test]
    fn fft_of_an_impulse_is_flat() {
        let mut data = vec![
            Number::from(1.0),
            Number::from(0.0),
            Number::from(0.0),
            Number::from(0.0),
        ];
        fft_in_place(&mut data);
        for bin in data {
            assert!((bin.real - 1.0).abs() < 1e-6);
            assert!(bin.imag.abs() < 1e-6);
        }
    }
}
