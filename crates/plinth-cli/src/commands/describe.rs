use crate::support::{exit_with, print_json, to_json_or_exit};
use plinth_publisher::Publisher;

pub fn run(publisher: &Publisher, app: Option<String>) {
    let document = publisher.describe(app.as_deref()).unwrap_or_else(|e| exit_with(e));
    print_json(&to_json_or_exit(&document));
}
