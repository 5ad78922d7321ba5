use std::process::ExitCode;

fn main() -> ExitCode {
    imagesurvey::app::run()
}
