use std::process::ExitCode;

fn main() -> ExitCode {
    carecall_cli::run()
}
