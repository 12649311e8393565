use std::process::ExitCode;

fn main() -> ExitCode {
    requesty_cli::run()
}
