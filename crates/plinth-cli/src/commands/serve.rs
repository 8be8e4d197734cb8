use crate::support::exit_with;
use plinth_publisher::Publisher;
use std::net::SocketAddr;

pub fn run(publisher: &Publisher, bind: Option<SocketAddr>) {
    if let Err(e) = publisher.serve(bind) {
        exit_with(e);
    }
}
