use std::process::ExitCode;

fn main() -> ExitCode {
    closeflow_cli::run()
}
