use crate::support::exit_with;
use plinth_publisher::{CliOutput, Publisher, render_value};

/// `<app> [handler...] <method> [args...]`, or help for a namespace.
pub fn run(publisher: &Publisher, tokens: &[String], json_output: bool) {
    match publisher.run_cli(tokens).unwrap_or_else(|e| exit_with(e)) {
        CliOutput::Help(text) => print!("{text}"),
        CliOutput::Value(value) => {
            let rendered = render_value(&value, json_output);
            if !rendered.is_empty() {
                println!("{rendered}");
            }
        }
    }
}
