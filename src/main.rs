fn main() {
    if let Err(err) = staged_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
