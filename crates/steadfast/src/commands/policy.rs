//! Policy commands

use std::time::Duration;

use anyhow::Result;
use camino::Utf8Path;
use steadfast_core::retry::calculate_delay;
use steadfast_core::RetryPolicy;

use crate::cli::{PolicyCommands, PolicyScheduleArgs, PolicyShowArgs};

/// Attempts planned for an unbounded policy when none are requested
const UNBOUNDED_PREVIEW: u32 = 5;

pub fn run(cmd: PolicyCommands, config: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        PolicyCommands::Show(args) => show(args, config),
        PolicyCommands::List => list(config),
        PolicyCommands::Schedule(args) => schedule(args, config),
    }
}

fn show(args: PolicyShowArgs, config: Option<&Utf8Path>) -> Result<()> {
    let policies = super::load_policies(config)?;
    let policy = policies.resolve(args.name.as_deref())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(policy)?);
    } else {
        println!("# {}", args.name.as_deref().unwrap_or("default"));
        print!("{}", serde_yaml_ng::to_string(policy)?);
    }

    Ok(())
}

fn list(config: Option<&Utf8Path>) -> Result<()> {
    let policies = super::load_policies(config)?;

    println!("Service: {}", policies.service_name);
    println!("{:<16} {}", "default", summary(&policies.default));
    for (name, policy) in &policies.policies {
        println!("{:<16} {}", name, summary(policy));
    }

    Ok(())
}

fn schedule(args: PolicyScheduleArgs, config: Option<&Utf8Path>) -> Result<()> {
    let policies = super::load_policies(config)?;
    let policy = policies.resolve(args.name.as_deref())?;
    let attempts = args
        .attempts
        .or(policy.max_attempts)
        .unwrap_or(UNBOUNDED_PREVIEW);

    println!("attempt 1: immediately");
    for (attempt, delay) in (2u64..).zip(waits(policy, attempts)) {
        println!("attempt {}: after {:.2}s", attempt, delay.as_secs_f64());
    }
    if !policy.is_bounded() {
        println!("... until success or interrupt");
    }

    Ok(())
}

/// Wait preceding each retry when `attempts` attempts all fail, computed
/// as the caller consumes it
fn waits(policy: &RetryPolicy, attempts: u32) -> impl Iterator<Item = Duration> {
    let backoff = policy.backoff();
    (1..attempts).map(move |attempt| calculate_delay(&backoff, attempt))
}

fn summary(policy: &RetryPolicy) -> String {
    match policy.max_attempts {
        Some(max_attempts) => format!(
            "{} attempts, waits {}s..{}s x{}, {}",
            max_attempts,
            policy.min_wait,
            policy.max_wait,
            policy.multiplier,
            if policy.propagate_on_exhaustion {
                "propagates"
            } else {
                "absorbs"
            }
        ),
        None => format!("unbounded, every {}s", policy.retry_delay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_waits() {
        let policy = RetryPolicy::connection("db", "connect");
        let secs: Vec<u64> = waits(&policy, 6).map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_continuous_waits_are_fixed() {
        let policy = RetryPolicy::continuous(2.0);
        assert_eq!(
            waits(&policy, 4).collect::<Vec<_>>(),
            vec![Duration::from_secs(2); 3]
        );
    }

    #[test]
    fn test_single_attempt_has_no_waits() {
        assert_eq!(waits(&RetryPolicy::function(), 1).count(), 0);
    }

    #[test]
    fn test_max_attempt_count_is_lazy() {
        let policy = RetryPolicy::connection("db", "connect");
        let mut waits = waits(&policy, u32::MAX);

        let remaining = u32::MAX as usize - 1;
        assert_eq!(waits.size_hint(), (remaining, Some(remaining)));
        assert_eq!(waits.next(), Some(Duration::from_secs(1)));
        assert_eq!(waits.nth(10), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            summary(&RetryPolicy::function()),
            "5 attempts, waits 1s..30s x1, absorbs"
        );
        assert_eq!(summary(&RetryPolicy::continuous(1.0)), "unbounded, every 1s");
    }
}
