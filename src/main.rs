fn main() {
    if let Err(err) = table_engine::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
