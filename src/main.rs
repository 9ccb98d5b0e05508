fn main() {
    if let Err(err) = versions_report::cli::run() {
        versions_report::ui::eprintln_error(&err);
        std::process::exit(versions_report::exit::exit_code(&err));
    }
}
