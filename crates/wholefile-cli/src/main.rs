//! `wholefile` binary entrypoint.

fn main() {
    std::process::exit(wholefile_cli::run());
}
