//! The processing-node model and the standard node set.
//!
//! A node is a stateful object with fixed input and output ports; each port
//! carries one [`Block`] of samples per tick. Unconnected secondary ports
//! fall back to the node's constructor parameter, which is what makes the
//! inline-operator splicing (`-> * 0.5 ->`) work with the same node types.

use crate::{
    BLOCKSIZE, SAMPLE_RATE, TAU,
    error::{Error, RunResult},
    io, rng,
    program::{Ancestry, Program, SubgraphDef},
    value::Value,
};

/// One tick's worth of samples on a single port.
pub type Block = [f32; BLOCKSIZE];

pub(crate) const SILENT_BLOCK: Block = [0.0; BLOCKSIZE];

/// Per-tick port access handed to [`AudioObject::process`].
///
/// Input blocks already hold the sum of every incoming edge for this tick.
pub struct BlockIo<'a> {
    pub inputs: &'a [Block],
    pub outputs: &'a mut [Block],
    connected: &'a [bool],
}

impl<'a> BlockIo<'a> {
    pub(crate) fn new(inputs: &'a [Block], outputs: &'a mut [Block], connected: &'a [bool]) -> Self {
        Self {
            inputs,
            outputs,
            connected,
        }
    }

    /// Whether any edge feeds the given input port.
    #[must_use]
    pub fn connected(&self, port: usize) -> bool {
        self.connected.get(port).copied().unwrap_or(false)
    }

    /// Sample `index` of input `port` when the port is connected, otherwise
    /// the fallback parameter.
    #[must_use]
    pub fn input_or(&self, port: usize, fallback: f32, index: usize) -> f32 {
        if self.connected(port) {
            self.inputs[port][index]
        } else {
            fallback
        }
    }
}

/// Capability set shared by every processing node.
pub trait AudioObject: Send {
    /// Advances the node by one block.
    fn process(&mut self, io: &mut BlockIo<'_>);

    /// Stream-end notification, used by sinks to flush.
    fn finish(&mut self) {}
}

/// A constructed node together with its port arities.
pub(crate) struct NodeSpec {
    pub object: Box<dyn AudioObject>,
    pub inputs: usize,
    pub outputs: usize,
}

impl NodeSpec {
    fn new(object: impl AudioObject + 'static, inputs: usize, outputs: usize) -> Self {
        Self {
            object: Box::new(object),
            inputs,
            outputs,
        }
    }
}

fn numeric_param(args: &[Value], index: usize, default: f32) -> RunResult<f32> {
    match args.get(index) {
        None => Ok(default),
        Some(value) => Ok(value.as_number()?.real),
    }
}

fn text_param(args: &[Value], index: usize, object_type: &str) -> RunResult<String> {
    let Some(value) = args.get(index) else {
        return Err(Error::type_error(format!(
            "The '{object_type}~' object expects a text argument"
        )));
    };
    Ok(value.as_text()?.to_owned())
}

/// Builds a node of one of the built-in types, or `None` when the type name
/// is not a standard one (the caller then consults the sub-graph table).
pub(crate) fn create_standard_object(type_name: &str, args: &[Value]) -> RunResult<Option<NodeSpec>> {
    let spec = match type_name {
        "osc" => NodeSpec::new(OscillatorObject::new(numeric_param(args, 0, 440.0)?, Waveform::Sine), 1, 1),
        "square" => NodeSpec::new(
            OscillatorObject::new(numeric_param(args, 0, 440.0)?, Waveform::Square),
            1,
            1,
        ),
        "add" => NodeSpec::new(ArithmeticObject::new(BinaryOperation::Add, numeric_param(args, 0, 0.0)?), 2, 1),
        "sub" => NodeSpec::new(
            ArithmeticObject::new(BinaryOperation::Subtract, numeric_param(args, 0, 0.0)?),
            2,
            1,
        ),
        "mult" => NodeSpec::new(
            ArithmeticObject::new(BinaryOperation::Multiply, numeric_param(args, 0, 1.0)?),
            2,
            1,
        ),
        "div" => NodeSpec::new(
            ArithmeticObject::new(BinaryOperation::Divide, numeric_param(args, 0, 1.0)?),
            2,
            1,
        ),
        "mod" => NodeSpec::new(
            ArithmeticObject::new(BinaryOperation::Modulo, numeric_param(args, 0, 1.0)?),
            2,
            1,
        ),
        "abs" => NodeSpec::new(AbsoluteValueObject, 1, 1),
        "comp" => NodeSpec::new(ComparatorObject::new(numeric_param(args, 0, 0.0)?), 1, 1),
        "clock" => NodeSpec::new(ClockObject::new(numeric_param(args, 0, SAMPLE_RATE)?), 1, 1),
        "timer" => NodeSpec::new(TimerObject::default(), 1, 1),
        "noise" => NodeSpec::new(NoiseObject, 0, 1),
        "delay" => NodeSpec::new(DelayObject::new(numeric_param(args, 0, BLOCKSIZE as f32)?), 2, 1),
        "filter" => NodeSpec::new(FilterObject::new(numeric_param(args, 0, 100.0)?), 1, 1),
        "file" => NodeSpec::new(FileoutObject::new(text_param(args, 0, "file")?), 1, 0),
        _ => return Ok(None),
    };
    Ok(Some(spec))
}

/// Conduit exposing the host-provided input blocks; the graph writes the
/// host data straight onto this node's output ports each tick.
pub(crate) struct AudioInputObject;

impl AudioObject for AudioInputObject {
    fn process(&mut self, _io: &mut BlockIo<'_>) {}
}

/// Conduit capturing the final output; the graph re-gathers its input ports
/// after the full sweep so the host always sees the current tick.
pub(crate) struct AudioOutputObject;

impl AudioObject for AudioOutputObject {
    fn process(&mut self, _io: &mut BlockIo<'_>) {}
}

pub(crate) fn input_conduit(channels: usize) -> NodeSpec {
    NodeSpec::new(AudioInputObject, 0, channels)
}

pub(crate) fn output_conduit(channels: usize) -> NodeSpec {
    NodeSpec::new(AudioOutputObject, channels, 0)
}

enum Waveform {
    Sine,
    Square,
}

/// Phase-accumulator oscillator; input 0 overrides the frequency parameter
/// when connected.
struct OscillatorObject {
    frequency: f32,
    waveform: Waveform,
    phase: f32,
}

impl OscillatorObject {
    fn new(frequency: f32, waveform: Waveform) -> Self {
        Self {
            frequency,
            waveform,
            phase: 0.0,
        }
    }
}

impl AudioObject for OscillatorObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        for index in 0..BLOCKSIZE {
            io.outputs[0][index] = match self.waveform {
                Waveform::Sine => self.phase.sin(),
                Waveform::Square => {
                    if self.phase < std::f32::consts::PI {
                        1.0
                    } else {
                        -1.0
                    }
                }
            };
            let frequency = io.input_or(0, self.frequency, index);
            self.phase += TAU * frequency / SAMPLE_RATE;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
    }
}

#[derive(Clone, Copy)]
enum BinaryOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Two-input arithmetic node; the second input falls back to the constructor
/// parameter, which is what the inline connection operators rely on.
struct ArithmeticObject {
    operation: BinaryOperation,
    default_value: f32,
}

impl ArithmeticObject {
    fn new(operation: BinaryOperation, default_value: f32) -> Self {
        Self {
            operation,
            default_value,
        }
    }
}

impl AudioObject for ArithmeticObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        for index in 0..BLOCKSIZE {
            let lhs = io.inputs[0][index];
            let rhs = io.input_or(1, self.default_value, index);
            io.outputs[0][index] = match self.operation {
                BinaryOperation::Add => lhs + rhs,
                BinaryOperation::Subtract => lhs - rhs,
                BinaryOperation::Multiply => lhs * rhs,
                BinaryOperation::Divide => lhs / rhs,
                BinaryOperation::Modulo => lhs % rhs,
            };
        }
    }
}

struct AbsoluteValueObject;

impl AudioObject for AbsoluteValueObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        for index in 0..BLOCKSIZE {
            io.outputs[0][index] = io.inputs[0][index].abs();
        }
    }
}

struct ComparatorObject {
    threshold: f32,
}

impl ComparatorObject {
    fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl AudioObject for ComparatorObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        for index in 0..BLOCKSIZE {
            io.outputs[0][index] = if io.inputs[0][index] > self.threshold {
                1.0
            } else {
                0.0
            };
        }
    }
}

/// Emits a unit impulse every `interval` samples; input 0 overrides the
/// interval when connected.
struct ClockObject {
    interval: f32,
    countdown: f32,
}

impl ClockObject {
    fn new(interval: f32) -> Self {
        Self {
            interval,
            countdown: 0.0,
        }
    }
}

impl AudioObject for ClockObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        for index in 0..BLOCKSIZE {
            if self.countdown <= 0.0 {
                io.outputs[0][index] = 1.0;
                self.countdown += io.input_or(0, self.interval, index).max(1.0);
            } else {
                io.outputs[0][index] = 0.0;
            }
            self.countdown -= 1.0;
        }
    }
}

/// Reports elapsed stream time in seconds; a non-zero input sample resets it.
#[derive(Default)]
struct TimerObject {
    elapsed_samples: u64,
}

impl AudioObject for TimerObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        for index in 0..BLOCKSIZE {
            if io.inputs[0][index] != 0.0 {
                self.elapsed_samples = 0;
            }
            io.outputs[0][index] = self.elapsed_samples as f32 / SAMPLE_RATE;
            self.elapsed_samples += 1;
        }
    }
}

struct NoiseObject;

impl AudioObject for NoiseObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        for index in 0..BLOCKSIZE {
            io.outputs[0][index] = rng::uniform(-1.0, 1.0);
        }
    }
}

/// Sample-accurate delay line. Reading happens before writing, so with a
/// delay of one sample the node exposes the classic unit-delay behaviour and
/// qualifies as a feedback point at a delay of one block or more.
struct DelayObject {
    line: Vec<f32>,
    write_position: usize,
    delay: f32,
}

impl DelayObject {
    fn new(delay: f32) -> Self {
        let capacity = delay.max(1.0) as usize + 1;
        Self {
            line: vec![0.0; capacity],
            write_position: 0,
            delay: delay.max(1.0),
        }
    }
}

impl AudioObject for DelayObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        let capacity = self.line.len();
        for index in 0..BLOCKSIZE {
            let requested = io.input_or(1, self.delay, index);
            let delay = requested.round().clamp(1.0, (capacity - 1) as f32) as usize;
            let read_position = (self.write_position + capacity - delay) % capacity;
            io.outputs[0][index] = self.line[read_position];
            self.line[self.write_position] = io.inputs[0][index];
            self.write_position = (self.write_position + 1) % capacity;
        }
    }
}

/// One-pole lowpass.
struct FilterObject {
    feedback: f32,
    last: f32,
}

impl FilterObject {
    fn new(cutoff: f32) -> Self {
        Self {
            feedback: (-TAU * cutoff / SAMPLE_RATE).exp(),
            last: 0.0,
        }
    }
}

impl AudioObject for FilterObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        for index in 0..BLOCKSIZE {
            self.last = (1.0 - self.feedback) * io.inputs[0][index] + self.feedback * self.last;
            io.outputs[0][index] = self.last;
        }
    }
}

/// File sink: collects every input sample and writes the stream as raw
/// little-endian `float32` when the graph finishes.
struct FileoutObject {
    path: String,
    data: Vec<f32>,
    written: bool,
}

impl FileoutObject {
    fn new(path: String) -> Self {
        Self {
            path,
            data: Vec::new(),
            written: false,
        }
    }
}

impl AudioObject for FileoutObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        self.data.extend_from_slice(&io.inputs[0]);
    }

    fn finish(&mut self) {
        if self.written {
            return;
        }
        self.written = true;
        let bytes: Vec<u8> = self.data.iter().flat_map(|sample| sample.to_le_bytes()).collect();
        if let Err(error) = std::fs::write(&self.path, bytes) {
            io::log(&format!("Could not write file '{}': {error}", self.path));
        }
    }
}

/// A nested graph instantiated as a node: one inner tick per outer tick.
pub(crate) struct SubgraphObject {
    inner: Program,
}

impl SubgraphObject {
    pub fn build(definition: &SubgraphDef, ancestry: Ancestry) -> RunResult<NodeSpec> {
        let mut inner = Program::new();
        inner.set_ancestry(ancestry);
        inner.configure_io(definition.inputs, definition.outputs);
        inner.parse(&definition.source)?;
        Ok(NodeSpec::new(Self { inner }, definition.inputs, definition.outputs))
    }
}

impl AudioObject for SubgraphObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        let rendered = self.inner.run(io.inputs);
        for (port, block) in io.outputs.iter_mut().enumerate() {
            *block = rendered.get(port).copied().unwrap_or(SILENT_BLOCK);
        }
    }

    fn finish(&mut self) {
        self.inner.finish();
    }
}

/// A host-supplied processing callback wrapped as a node.
pub(crate) struct UserObject {
    callback: Box<dyn FnMut(&[Block], &mut [Block]) + Send>,
}

impl UserObject {
    pub fn build(
        inputs: usize,
        outputs: usize,
        callback: impl FnMut(&[Block], &mut [Block]) + Send + 'static,
    ) -> NodeSpec {
        NodeSpec::new(
            Self {
                callback: Box::new(callback),
            },
            inputs,
            outputs,
        )
    }
}

impl AudioObject for UserObject {
    fn process(&mut self, io: &mut BlockIo<'_>) {
        (self.callback)(io.inputs, io.outputs);
    }
}
