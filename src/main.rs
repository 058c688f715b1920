fn main() {
    if let Err(err) = spotcheck_lib::run() {
        log::error!("spotcheck exited: {err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
