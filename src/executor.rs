use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::progress::RunningProgress;

/// Result of one task. `Crashed` means the task panicked and produced nothing.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Crashed { input: String, reason: String },
}

/// Fixed-width worker pool; a panicking task never takes its siblings down.
pub struct ParallelExecutor {
    pool: ThreadPool,
}

impl ParallelExecutor {
    pub fn new(workers: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("imagesurvey-worker-{index}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `task` over `inputs`, ticking `progress` once per finished task.
    /// Outcomes come back in input order.
    pub fn run<I, T, D, F>(
        &self,
        inputs: &[I],
        progress: &RunningProgress,
        describe: D,
        task: F,
    ) -> Vec<TaskOutcome<T>>
    where
        I: Sync,
        T: Send,
        D: Fn(&I) -> String + Sync,
        F: Fn(&I) -> T + Sync,
    {
        self.pool.install(|| {
            inputs
                .par_iter()
                .map(|input| {
                    let outcome = match catch_unwind(AssertUnwindSafe(|| task(input))) {
                        Ok(value) => TaskOutcome::Completed(value),
                        Err(payload) => {
                            let input = describe(input);
                            let reason = panic_message(payload.as_ref());
                            log::error!("worker crashed while processing {input}: {reason}");
                            TaskOutcome::Crashed { input, reason }
                        }
                    };
                    progress.tick();
                    outcome
                })
                .collect()
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
