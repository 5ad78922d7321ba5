use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::model::ValidatorOutcome;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An external program run as `program <path>`; only its exit status counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub program: PathBuf,
    pub heading: String,
}

#[derive(Debug, Clone)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    timeout: Duration,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Validator>, timeout: Duration) -> Self {
        Self {
            validators,
            timeout,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Outcome per heading. A validator succeeds for a multi-file item only
    /// when it succeeds on every member.
    pub fn run_all(&self, files: &[PathBuf]) -> BTreeMap<String, ValidatorOutcome> {
        self.validators
            .iter()
            .map(|validator| {
                let passed = !files.is_empty()
                    && files
                        .iter()
                        .all(|file| validator.run(file, self.timeout) == ValidatorOutcome::Succeeded);
                let outcome = if passed {
                    ValidatorOutcome::Succeeded
                } else {
                    ValidatorOutcome::Failed
                };
                (validator.heading.clone(), outcome)
            })
            .collect()
    }
}

impl Validator {
    pub fn run(&self, path: &Path, timeout: Duration) -> ValidatorOutcome {
        let child = Command::new(&self.program)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match child {
            Ok(child) => self.wait(child, path, timeout),
            Err(err) => {
                log::debug!(
                    "{}: cannot launch {} ({err})",
                    path.display(),
                    self.program.display()
                );
                ValidatorOutcome::Failed
            }
        }
    }

    fn wait(&self, mut child: Child, path: &Path, timeout: Duration) -> ValidatorOutcome {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return ValidatorOutcome::Succeeded,
                Ok(Some(_)) => return ValidatorOutcome::Failed,
                Ok(None) if started.elapsed() >= timeout => {
                    log::warn!(
                        "{}: {} still running after {:?}, killed",
                        path.display(),
                        self.program.display(),
                        timeout
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return ValidatorOutcome::Failed;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    log::warn!(
                        "{}: lost track of {} ({err})",
                        path.display(),
                        self.program.display()
                    );
                    let _ = child.kill();
                    return ValidatorOutcome::Failed;
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn validator(program: &str, heading: &str) -> Validator {
        Validator {
            program: PathBuf::from(program),
            heading: heading.to_string(),
        }
    }

    #[test]
    fn exit_status_decides_outcome() {
        let timeout = Duration::from_secs(10);
        let file = Path::new("/dev/null");
        assert_eq!(validator("true", "ok").run(file, timeout), ValidatorOutcome::Succeeded);
        assert_eq!(validator("false", "bad").run(file, timeout), ValidatorOutcome::Failed);
        assert_eq!(
            validator("/nonexistent/validator", "missing").run(file, timeout),
            ValidatorOutcome::Failed
        );
    }

    #[test]
    fn every_member_must_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("a.dcm");
        std::fs::write(&present, b"x").expect("write");
        let absent = dir.path().join("b.dcm");

        let set = ValidatorSet::new(
            vec![validator("test", "nonempty")],
            Duration::from_secs(10),
        );
        // `test <path>` succeeds for any non-empty string argument
        let outcomes = set.run_all(&[present.clone(), absent]);
        assert_eq!(outcomes["nonempty"], ValidatorOutcome::Succeeded);

        let set = ValidatorSet::new(vec![validator("ls", "listed")], Duration::from_secs(10));
        let outcomes = set.run_all(&[present, dir.path().join("missing.dcm")]);
        assert_eq!(outcomes["listed"], ValidatorOutcome::Failed);
    }

    #[test]
    fn hung_validator_is_killed() {
        let started = Instant::now();
        // runs `sleep 30`
        let outcome = validator("sleep", "slow").run(Path::new("30"), Duration::from_millis(200));
        assert_eq!(outcome, ValidatorOutcome::Failed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
