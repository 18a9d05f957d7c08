use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    ExitCode::from(dirsort::cli::run() as u8)
}
