mod args;
mod dhcp;
mod helpers;
mod server;
mod transport;

use crate::args::Arguments;
use log::error;

pub fn init_log(verbosity: usize) {
    stderrlog::new()
        .module(module_path!())
        .verbosity(verbosity + 1)
        .init()
        .unwrap();
}

fn main() {
    let args = Arguments::parse_args();
    init_log(args.verbosity);

    if let Err(err) = server::main(args) {
        error!("{}", err);
        std::process::exit(1);
    }
}
