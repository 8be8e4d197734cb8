use crate::commands::app::COMMAND_NAMES;
use crate::support::{print_json, to_json_or_exit};
use plinth_publisher::{CompletionPayload, Publisher, parse_completion_args};

/// `plinth --complete <shell> [cursor] tokens...`: print one JSON payload
/// of suggestions. Exits 0 even when the payload carries an error.
pub fn run(publisher: &Publisher, args: &[String]) {
    let payload = match parse_completion_args(args) {
        Ok((shell, cursor, tokens)) => {
            publisher.complete(&shell, cursor, tokens.as_slice(), COMMAND_NAMES)
        }
        Err(error) => CompletionPayload::failed(error),
    };
    print_json(&to_json_or_exit(&payload));
}
