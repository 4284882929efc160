fn main() {
    if let Err(err) = mentor_match_cli::run() {
        eprintln!("application error: {err}");
        std::process::exit(err.exit_code());
    }
}
