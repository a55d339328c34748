//! Run command

use std::io;
use std::process::ExitStatus;

use anyhow::Result;
use camino::Utf8Path;
use steadfast_core::retry::ClosurePredicate;
use steadfast_core::{compose, Composed, Outcome, RetryError, RetryPolicy};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::cli::RunArgs;

/// Exit code after Ctrl-C, as shells report SIGINT
const EXIT_CANCELLED: i32 = 130;

/// Why one attempt of the child command failed
#[derive(Debug, thiserror::Error)]
enum ChildFailure {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit { program: String, status: ExitStatus },
}

impl ChildFailure {
    fn exit_code(&self) -> i32 {
        match self {
            ChildFailure::Spawn { .. } => 1,
            ChildFailure::Exit { status, .. } => status.code().unwrap_or(1),
        }
    }
}

pub async fn run(args: RunArgs, config: Option<&Utf8Path>) -> Result<()> {
    let policies = super::load_policies(config)?;
    let mut policy = policies.resolve(args.policy.as_deref())?.clone();
    apply_flags(&mut policy, &args);
    if let Some(program) = args.command.first() {
        policy.action_name = program.clone();
    }

    let shutdown = CancellationToken::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping retries");
            interrupt.cancel();
        }
    });

    // A failure that races Ctrl-C is the child being interrupted, not a
    // transient error
    let interrupted = shutdown.clone();
    let is_interrupt = ClosurePredicate::new(move |_: &ChildFailure| interrupted.is_cancelled());

    let composed = compose(&policy)?
        .with_service(policies.service_name.as_str())
        .with_shutdown(shutdown);

    let code = match composed {
        Composed::Propagating(retry) => {
            let result = retry
                .wrap_async(run_child)
                .cancel_when(is_interrupt)
                .call(args.command)
                .await;
            match result {
                Ok(()) => 0,
                Err(err) => failure_code(&err),
            }
        }
        Composed::Absorbing(retry) => {
            let result = retry
                .wrap_async(run_child)
                .cancel_when(is_interrupt)
                .call(args.command)
                .await;
            match result {
                Ok(Outcome::Completed(())) => 0,
                Ok(Outcome::Exhausted { attempts }) => {
                    tracing::info!(attempts, "Ignoring failure after retries");
                    0
                }
                Err(err) => failure_code(&err),
            }
        }
    };

    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

/// Override policy fields with the flags given on the command line
fn apply_flags(policy: &mut RetryPolicy, args: &RunArgs) {
    if args.unbounded {
        policy.max_attempts = None;
        policy.propagate_on_exhaustion = true;
    }
    if let Some(max_attempts) = args.max_attempts {
        policy.max_attempts = Some(max_attempts);
    }
    if let Some(multiplier) = args.multiplier {
        policy.multiplier = multiplier;
    }
    if let Some(min_wait) = args.min_wait {
        policy.min_wait = min_wait;
    }
    if let Some(max_wait) = args.max_wait {
        policy.max_wait = max_wait;
    }
    if let Some(retry_delay) = args.retry_delay {
        policy.retry_delay = retry_delay;
    }
    if args.absorb {
        policy.propagate_on_exhaustion = false;
    }
}

fn failure_code(err: &RetryError<ChildFailure>) -> i32 {
    match err {
        RetryError::Cancelled { .. } => EXIT_CANCELLED,
        RetryError::Exhausted { source, .. } => source.exit_code(),
    }
}

/// One attempt: spawn the command and wait for it
async fn run_child(argv: Vec<String>) -> Result<(), ChildFailure> {
    let Some((program, rest)) = argv.split_first() else {
        return Err(ChildFailure::Spawn {
            program: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let status = Command::new(program)
        .args(rest)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| ChildFailure::Spawn {
            program: program.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ChildFailure::Exit {
            program: program.clone(),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn run_args(flags: &[&str]) -> RunArgs {
        let mut argv = vec!["steadfast", "run"];
        argv.extend_from_slice(flags);
        argv.extend_from_slice(&["--", "true"]);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_policy() {
        let mut policy = RetryPolicy::connection("db", "connect");
        apply_flags(
            &mut policy,
            &run_args(&["--max-attempts", "2", "--max-wait", "5", "--absorb"]),
        );

        assert_eq!(policy.max_attempts, Some(2));
        assert_eq!(policy.max_wait, 5.0);
        assert!(!policy.propagate_on_exhaustion);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_unbounded_flag_forces_propagation() {
        let mut policy = RetryPolicy::function();
        apply_flags(&mut policy, &run_args(&["--unbounded", "--retry-delay", "0.5"]));

        assert!(!policy.is_bounded());
        assert!(policy.propagate_on_exhaustion);
        assert_eq!(policy.retry_delay, 0.5);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_no_flags_keep_policy() {
        let mut policy = RetryPolicy::continuous(2.0);
        let before = policy.clone();
        apply_flags(&mut policy, &run_args(&[]));
        assert_eq!(policy, before);
    }

    #[tokio::test]
    async fn test_run_child_reports_spawn_failure() {
        let err = run_child(vec!["steadfast-no-such-program".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ChildFailure::Spawn { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_child_exit_status() {
        assert!(run_child(vec!["true".to_string()]).await.is_ok());

        let err = run_child(vec!["sh".into(), "-c".into(), "exit 3".into()])
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_cancelled_exit_code() {
        let err: RetryError<ChildFailure> = RetryError::cancelled(2, None);
        assert_eq!(failure_code(&err), EXIT_CANCELLED);
    }
}
