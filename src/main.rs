fn main() {
    hostguard::logging::init();
    if let Err(e) = hostguard::cli::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
