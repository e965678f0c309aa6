fn main() {
    if let Err(err) = statecore::run() {
        eprintln!("Application error: {err}");
        std::process::exit(1);
    }
}
