use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use warden_core::Cancellation;
use warden_domain::{Diagnostics, GrantArgs, ValidationResult, ValidationResults};

use crate::provider_ports::{ConfigValidationSteps, GrantValidationSteps};

/// Runs every request check concurrently and collects their diagnostics.
///
/// A failing step never stops the others. A step interrupted by `cancellation`
/// contributes no result.
pub async fn run_grant_validations(
    steps: GrantValidationSteps,
    subject: &str,
    args: &GrantArgs,
    cancellation: &Cancellation,
) -> ValidationResults {
    let jobs = steps
        .into_iter()
        .map(|(step_id, step)| {
            let future = (step.run)(subject.to_owned(), args.clone());
            let job = StepJob {
                step_id,
                display_name: step.name,
                failure_message: step.failure_message,
            };
            (job, future)
        })
        .collect();

    run_steps(jobs, cancellation).await
}

/// Runs every configuration check concurrently and collects their diagnostics.
pub async fn run_config_validations(
    steps: ConfigValidationSteps,
    cancellation: &Cancellation,
) -> ValidationResults {
    let jobs = steps
        .into_iter()
        .map(|(step_id, step)| {
            let future = (step.run)();
            let job = StepJob {
                step_id,
                display_name: step.name,
                failure_message: step.failure_message,
            };
            (job, future)
        })
        .collect();

    run_steps(jobs, cancellation).await
}

struct StepJob {
    step_id: String,
    display_name: String,
    failure_message: String,
}

async fn run_steps(
    jobs: Vec<(StepJob, futures::future::BoxFuture<'static, Diagnostics>)>,
    cancellation: &Cancellation,
) -> ValidationResults {
    let results = Arc::new(Mutex::new(ValidationResults::new()));
    let mut tasks = JoinSet::new();
    let mut spawned = HashMap::new();

    for (job, future) in jobs {
        let results = results.clone();
        let cancellation = cancellation.clone();
        let step_id = job.step_id.clone();
        let display_name = job.display_name.clone();

        let handle = tasks.spawn(async move {
            let logs = tokio::select! {
                biased;
                () = cancellation.cancelled() => return,
                logs = future => logs,
            };

            results
                .lock()
                .await
                .insert(step_id, ValidationResult { display_name, logs });
        });
        spawned.insert(handle.id(), job);
    }

    while let Some(joined) = tasks.join_next_with_id().await {
        let job = match &joined {
            Ok((task_id, ())) => spawned.get(task_id),
            Err(error) => spawned.get(&error.id()),
        };
        let Some(job) = job else {
            continue;
        };

        if let Err(error) = joined {
            if error.is_panic() {
                warn!(step = %job.step_id, "validation step panicked");
                results.lock().await.insert(
                    job.step_id.clone(),
                    ValidationResult {
                        display_name: job.display_name.clone(),
                        logs: Diagnostics::error_from("validation step faulted"),
                    },
                );
            }
        }
    }

    let results = std::mem::take(&mut *results.lock().await);
    for (step_id, result) in results.iter() {
        if result.logs.has_succeeded() {
            debug!(step = %step_id, "validation step passed");
        } else if let Some(job) = spawned.values().find(|job| &job.step_id == step_id) {
            warn!(
                step = %step_id,
                failure_message = %job.failure_message,
                "validation step failed"
            );
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::provider_ports::{ConfigValidationStep, GrantValidationStep};

    fn grant_steps() -> GrantValidationSteps {
        GrantValidationSteps::from([
            (
                "a".to_owned(),
                GrantValidationStep::new("Step A", "A failed", |_subject, _args| async {
                    Diagnostics::info("user exists")
                }),
            ),
            (
                "b".to_owned(),
                GrantValidationStep::new("Step B", "B failed", |_subject, _args| async {
                    Diagnostics::error_from("permission set missing")
                }),
            ),
        ])
    }

    #[tokio::test]
    async fn one_failing_step_fails_the_aggregate() {
        let results =
            run_grant_validations(grant_steps(), "alice", &GrantArgs::new(), &Cancellation::new())
                .await;

        assert_eq!(results.len(), 2);
        assert!(results.failed());
        assert_eq!(results.failure_message(), "Step B\n");
    }

    #[tokio::test]
    async fn steps_receive_subject_and_args() {
        let steps = GrantValidationSteps::from([(
            "echo".to_owned(),
            GrantValidationStep::new("Echo", "echo failed", |subject, args: GrantArgs| async move {
                Diagnostics::info(format!("{subject}:{}", args.len()))
            }),
        )]);
        let args = GrantArgs::from([("vault".to_owned(), "prod".to_owned())]);

        let results = run_grant_validations(steps, "bob", &args, &Cancellation::new()).await;
        let message = results
            .get("echo")
            .and_then(|result| result.logs.logs().first())
            .map(|log| log.message.clone());

        assert_eq!(message.as_deref(), Some("bob:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn steps_run_concurrently() {
        let steps: ConfigValidationSteps = (0..5)
            .map(|index| {
                (
                    format!("slow-{index}"),
                    ConfigValidationStep::new("Slow", "slow failed", &[], || async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Diagnostics::info("done")
                    }),
                )
            })
            .collect();

        let started = tokio::time::Instant::now();
        let results = run_config_validations(steps, &Cancellation::new()).await;

        assert_eq!(results.len(), 5);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_steps_contribute_no_result() {
        let steps = ConfigValidationSteps::from([
            (
                "fast".to_owned(),
                ConfigValidationStep::new("Fast", "fast failed", &[], || async {
                    Diagnostics::info("done")
                }),
            ),
            (
                "hung".to_owned(),
                ConfigValidationStep::new("Hung", "hung failed", &[], || async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Diagnostics::info("never")
                }),
            ),
        ]);
        let cancellation = Cancellation::new();
        let trigger = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let results = run_config_validations(steps, &cancellation).await;

        assert!(results.get("fast").is_some());
        assert!(results.get("hung").is_none());
    }

    #[tokio::test]
    async fn panicking_step_is_reported_as_error() {
        let steps = ConfigValidationSteps::from([(
            "faulty".to_owned(),
            ConfigValidationStep::new("Faulty", "faulty failed", &["api_url"], || async {
                let outcome: Option<Diagnostics> = None;
                outcome.unwrap_or_else(|| panic!("provider bug"))
            }),
        )]);

        let results = run_config_validations(steps, &Cancellation::new()).await;
        assert!(results.failed());
        assert_eq!(results.failure_message(), "Faulty\n");
    }
}
