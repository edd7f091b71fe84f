//! End-to-end tests for the language surface: declarations, expressions,
//! connections in every cardinality, directives, and the error taxonomy.

use std::sync::{Arc, Mutex};

use vlsng::{BLOCKSIZE, Block, ErrorKind, Number, Program, Sequence, Value};

/// Builds a program with the given I/O widths and parses `source` into it,
/// panicking on errors so that tests fail with the parse diagnostic.
fn build(inputs: usize, outputs: usize, source: &str) -> Program {
    let mut program = Program::new();
    program.configure_io(inputs, outputs);
    program
        .parse(source)
        .unwrap_or_else(|error| panic!("parse failed: {error}"));
    program
}

/// Runs `ticks` blocks of silence and returns output channel 0 flattened.
fn render(program: &mut Program, ticks: usize) -> Vec<f32> {
    let mut samples = Vec::new();
    for _ in 0..ticks {
        let output = program.run(&[]);
        samples.extend_from_slice(&output[0]);
    }
    samples
}

fn block_of(value: f32) -> Block {
    [value; BLOCKSIZE]
}

fn parse_error(inputs: usize, outputs: usize, source: &str) -> vlsng::Error {
    let mut program = Program::new();
    program.configure_io(inputs, outputs);
    program.parse(source).expect_err("expected a parse error")
}

// =============================================================================
// Declarations and expressions
// =============================================================================

#[test]
fn numeric_text_and_sequence_declarations_bind_symbols() {
    let program = build(
        0,
        0,
        "freq: 440\nname: \"hello\"\nseq: {1, 2, 3, 4}\n",
    );
    assert_eq!(program.get_symbol("freq"), Some(&Value::from(440.0)));
    assert_eq!(program.get_symbol("name"), Some(&Value::Text("hello".to_owned())));
    assert_eq!(
        program.get_symbol("seq"),
        Some(&Value::Sequence(Sequence::from(vec![1.0, 2.0, 3.0, 4.0])))
    );
}

#[test]
fn expressions_fold_constants_with_precedence_and_parentheses() {
    let program = build(0, 0, "a: 2 + 3 * 4\nb: (2 + 3) * 4\nc: -a + 2\n");
    assert_eq!(program.get_symbol("a"), Some(&Value::from(14.0)));
    assert_eq!(program.get_symbol("b"), Some(&Value::from(20.0)));
    assert_eq!(program.get_symbol("c"), Some(&Value::from(-12.0)));
}

#[test]
fn sequence_broadcast_in_expressions() {
    // s * 2 + 1 over {1, 2, 3} is {3, 5, 7}.
    let program = build(0, 0, "s: {1, 2, 3}\nt: s * 2 + 1\n");
    assert_eq!(
        program.get_symbol("t"),
        Some(&Value::Sequence(Sequence::from(vec![3.0, 5.0, 7.0])))
    );
}

#[test]
fn range_shorthand_expands_to_inclusive_integers() {
    let program = build(0, 0, "r: [3, 6]\nempty: [6, 3]\n");
    assert_eq!(
        program.get_symbol("r"),
        Some(&Value::Sequence(Sequence::from(vec![3.0, 4.0, 5.0, 6.0])))
    );
    assert_eq!(program.get_symbol("empty"), Some(&Value::Sequence(Sequence::new())));
}

#[test]
fn the_sample_rate_and_tau_symbols_are_pre_seeded() {
    let program = build(0, 0, "nyquist: sf / 2\nturn: tau\n");
    assert_eq!(program.get_symbol("nyquist"), Some(&Value::from(22_050.0)));
    assert_eq!(program.get_symbol("turn"), Some(&Value::from(std::f32::consts::TAU)));
}

#[test]
fn capitalised_procedure_names_are_callable_from_source() {
    let program = build(0, 0, "spectrum: DFT({1, 0, 0, 0})\nangle: Arg(0 - 1)\n");
    let Some(Value::Sequence(spectrum)) = program.get_symbol("spectrum") else {
        panic!("expected a sequence symbol");
    };
    for bin in spectrum {
        assert!((bin.real - 0.25).abs() < 1e-6);
        assert!(bin.imag.abs() < 1e-6);
    }
    let Some(Value::Number(angle)) = program.get_symbol("angle") else {
        panic!("expected a number symbol");
    };
    assert!((angle.real - std::f32::consts::PI).abs() < 1e-6);
}

#[test]
fn mappable_procedures_lift_over_sequences_in_expressions() {
    let program = build(0, 0, "roots: sqrt({4, 9, 16})\n");
    let Some(Value::Sequence(roots)) = program.get_symbol("roots") else {
        panic!("expected a sequence symbol");
    };
    let expected = [2.0_f32, 3.0, 4.0];
    for (root, expected) in roots.iter().zip(expected) {
        assert!((root.real - expected).abs() < 1e-5);
        assert!(root.imag.abs() < 1e-5);
    }
}

// =============================================================================
// End-to-end graph scenarios
// =============================================================================

#[test]
fn constant_source_reaches_the_output_every_sample() {
    let mut program = build(0, 1, "c: add~ 5\nc{0} -> output{0}\n");
    for sample in render(&mut program, 3) {
        assert!((sample - 5.0).abs() < f32::EPSILON);
    }
}

#[test]
fn a_one_sample_delay_shifts_the_impulse() {
    let mut program = build(1, 1, "d: delay~ 1\ninput{0} -> d{0}\nd{0} -> output{0}\n");
    let mut impulse = block_of(0.0);
    impulse[0] = 1.0;
    let output = program.run(&[impulse]);
    assert!((output[0][0] - 0.0).abs() < f32::EPSILON);
    assert!((output[0][1] - 1.0).abs() < f32::EPSILON);
    assert!(output[0][2..].iter().all(|sample| *sample == 0.0));
}

#[test]
fn inline_operators_splice_arithmetic_nodes() {
    // An input of 3 through `* 2 -> + 1` yields 7 per sample.
    let mut program = build(1, 1, "input{0} -> * 2 -> + 1 -> output{0}\n");
    let output = program.run(&[block_of(3.0)]);
    for sample in output[0] {
        assert!((sample - 7.0).abs() < f32::EPSILON);
    }
}

#[test]
fn many_to_one_sums_a_group_into_a_single_port() {
    let mut bank = build(0, 1, "bank: osc~ 110 x 3\nbank{0} -> output{0}\n");
    let mut solo = build(0, 1, "solo: osc~ 110\nsolo{0} -> output{0}\n");
    let summed = render(&mut bank, 2);
    let single = render(&mut solo, 2);
    for (summed, single) in summed.iter().zip(single.iter()) {
        assert!((summed - 3.0 * single).abs() < 1e-4);
    }
}

#[test]
fn one_to_many_fans_out_to_every_member() {
    let mut program = build(
        0,
        1,
        "n: add~ 1\ng: add~ 0 x 2\nn{0} -> g{0}\ng{0} -> output{0}\n",
    );
    let output = program.run(&[]);
    assert!((output[0][0] - 2.0).abs() < f32::EPSILON);
}

#[test]
fn many_to_many_wires_members_pairwise() {
    let mut program = build(
        0,
        1,
        "a: add~ 1 x 2\nc: add~ 0 x 2\na{0} -> c{0}\nc{0} -> output{0}\n",
    );
    let output = program.run(&[]);
    assert!((output[0][0] - 2.0).abs() < f32::EPSILON);
}

#[test]
fn the_cross_arrow_wires_the_full_biclique() {
    let mut program = build(
        0,
        1,
        "a: add~ 1 x 2\nb: add~ 0 x 3\na{0} *> b{0}\nb{0} -> output{0}\n",
    );
    let output = program.run(&[]);
    // Every one of the three members receives both sources: 3 * (1 + 1).
    assert!((output[0][0] - 6.0).abs() < f32::EPSILON);
}

#[test]
fn a_statement_initial_arrow_chains_a_group_in_series() {
    let mut program = build(0, 1, "g: add~ 1 x 3\n-> g{0}\ng{0} -> output{0}\n");
    let output = program.run(&[]);
    // Members accumulate 1, 2, 3 along the chain and sum at the output.
    assert!((output[0][0] - 6.0).abs() < f32::EPSILON);
}

#[test]
fn feedback_through_a_delay_produces_decaying_echoes() {
    let mut program = build(
        1,
        1,
        "d: delay~ 64\ninput{0} -> d{0}\nd{0} -> * 0.5 -> d{0}\nd{0} -> output{0}\n",
    );
    let mut impulse = block_of(0.0);
    impulse[0] = 1.0;
    let mut first_samples = Vec::new();
    let mut blocks = vec![impulse];
    blocks.resize(6, block_of(0.0));
    for block in blocks {
        let output = program.run(&[block]);
        first_samples.push(output[0][0]);
    }
    assert_eq!(first_samples[0], 0.0);
    assert!((first_samples[1] - 1.0).abs() < f32::EPSILON);
    assert_eq!(first_samples[2], 0.0);
    assert!((first_samples[3] - 0.5).abs() < f32::EPSILON);
    assert!((first_samples[5] - 0.25).abs() < f32::EPSILON);
}

// =============================================================================
// Sub-graphs
// =============================================================================

#[test]
fn a_subgraph_type_instantiates_as_a_nested_node() {
    let source = "dc~: 0 1 {\nc: add~ 2\nc{0} -> output{0}\n}\nd: dc~\nd{0} -> output{0}\n";
    let mut program = build(0, 1, source);
    let output = program.run(&[]);
    assert!((output[0][0] - 2.0).abs() < f32::EPSILON);
}

#[test]
fn implementation_of_returns_the_stored_source() {
    let source = "dc~: 0 1 {\nc: add~ 2\nc{0} -> output{0}\n}\nsrc: implementation_of(\"dc\")\n";
    let program = build(0, 0, source);
    let Some(Value::Text(stored)) = program.get_symbol("src") else {
        panic!("expected a text symbol");
    };
    assert!(stored.contains("add~ 2"));
}

#[test]
fn run_subgraph_samples_an_inner_program_into_a_sequence() {
    let source = "dc~: 0 1 {\nc: add~ 2\nc{0} -> output{0}\n}\ns: run_subgraph(\"dc\", 100)\n";
    let program = build(0, 0, source);
    let Some(Value::Sequence(samples)) = program.get_symbol("s") else {
        panic!("expected a sequence symbol");
    };
    assert_eq!(samples.len(), 100);
    for sample in samples {
        assert!((sample.real - 2.0).abs() < f32::EPSILON);
    }
}

#[test]
fn count_nodes_is_transitive_over_the_parent_chain() {
    // The inner program sees its own conduit plus the outer output node.
    let source = "probe~: 0 1 {\nn: add~ count_nodes()\nn{0} -> output{0}\n}\ns: run_subgraph(\"probe\", 64)\n";
    let program = build(0, 1, source);
    let Some(Value::Sequence(samples)) = program.get_symbol("s") else {
        panic!("expected a sequence symbol");
    };
    assert!((samples.get(0).expect("sample").real - 2.0).abs() < f32::EPSILON);
}

// =============================================================================
// Directives
// =============================================================================

#[test]
fn the_length_directive_records_the_requested_run() {
    let program = build(0, 0, "& length 48000\n");
    assert_eq!(program.requested_length(), Some(48_000));
}

#[test]
fn custom_directives_receive_their_raw_arguments() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let mut program = Program::new();
    program.add_directive("gain", move |arguments, _program| {
        recorded.lock().expect("lock").extend(arguments.iter().cloned());
        Ok(())
    });
    program.parse("& gain 2 high\n").expect("parse");
    assert_eq!(*seen.lock().expect("lock"), vec!["2".to_owned(), "high".to_owned()]);
}

#[test]
fn unknown_directives_are_semantic_errors() {
    let error = parse_error(0, 0, "& missing 1\n");
    assert_eq!(error.kind, ErrorKind::Semantic);
}

// =============================================================================
// Error taxonomy
// =============================================================================

#[test]
fn redeclaring_a_name_is_a_semantic_error() {
    assert_eq!(parse_error(0, 0, "a: 1\na: 2\n").kind, ErrorKind::Semantic);
    assert_eq!(parse_error(0, 0, "a: 1\na: osc~\n").kind, ErrorKind::Semantic);
}

#[test]
fn unknown_object_types_and_identifiers_are_semantic_errors() {
    assert_eq!(parse_error(0, 0, "z: zap~\n").kind, ErrorKind::Semantic);
    assert_eq!(parse_error(0, 0, "q: missing + 1\n").kind, ErrorKind::Semantic);
}

#[test]
fn port_indices_out_of_range_are_type_errors() {
    let error = parse_error(0, 0, "a: osc~\nb: osc~\na{3} -> b{0}\n");
    assert_eq!(error.kind, ErrorKind::Type);
    assert_eq!(error.line, Some(3));
}

#[test]
fn sequence_length_mismatches_are_type_errors() {
    assert_eq!(parse_error(0, 0, "q: {1, 2} + {1, 2, 3}\n").kind, ErrorKind::Type);
}

#[test]
fn group_size_mismatches_under_parallel_wiring_are_type_errors() {
    let error = parse_error(0, 0, "a: add~ 0 x 2\nb: add~ 0 x 3\na{0} -> b{0}\n");
    assert_eq!(error.kind, ErrorKind::Type);
}

#[test]
fn lexical_failures_are_lexical_errors() {
    assert_eq!(parse_error(0, 0, "q: @\n").kind, ErrorKind::Lexical);
    assert_eq!(parse_error(0, 0, "n: \"never closed").kind, ErrorKind::Lexical);
}

#[test]
fn connecting_an_undeclared_object_is_a_semantic_error() {
    assert_eq!(parse_error(0, 1, "ghost{0} -> output{0}\n").kind, ErrorKind::Semantic);
}

#[test]
fn the_biclique_arrow_requires_groups_on_both_ends() {
    let error = parse_error(0, 0, "a: osc~\nb: osc~ x 2\na{0} *> b{0}\n");
    assert_eq!(error.kind, ErrorKind::Semantic);
}

#[test]
fn errors_carry_the_source_line() {
    let error = parse_error(0, 0, "fine: 1\nalso_fine: 2\nbroken: {1} + {1, 2}\n");
    assert_eq!(error.line, Some(3));
}

#[test]
fn procedure_arity_violations_are_type_errors() {
    assert_eq!(parse_error(0, 0, "a: sin(1, 2)\n").kind, ErrorKind::Type);
    assert_eq!(parse_error(0, 0, "a: clamp(1)\n").kind, ErrorKind::Type);
}

#[test]
fn number_rendering_suppresses_small_components() {
    assert_eq!(Number::new(1.5, 0.0).to_string(), "1.500");
    assert_eq!(Number::new(0.0, 0.0).to_string(), "0");
    assert_eq!(Number::new(2.0, -1.0).to_string(), "2.000 + -1.000i");
}
