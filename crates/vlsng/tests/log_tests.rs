//! Tests for the process-wide log sink. These live in their own test binary
//! because the sink is global: other suites must not observe the capture
//! writer installed here.

use vlsng::{CollectLog, Program, set_log_writer};

#[test]
fn print_output_and_diagnostics_reach_the_registered_writer() {
    let capture = CollectLog::new();
    set_log_writer(Box::new(capture.clone()));

    let mut program = Program::new();
    program.parse("print(\"hello \", 2)\n").expect("parse");

    // `print` joins the stringified arguments with no separator.
    assert!(capture.messages().contains(&"hello 2.000".to_owned()));

    // Parse failures are reported through the same sink before returning.
    assert!(program.parse("broken: zap~\n").is_err());
    assert!(capture.output().contains("No such object type"));
    assert!(capture.output().contains("semantic"));
}
