//! Invocation context for log correlation
//!
//! One [`InvocationContext`] exists per logical call of a wrapped operation.
//! It carries the identity fields attached to every lifecycle event.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

pub use crate::types::CorrelationMode;

/// Static labels configured at wrap-construction time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    /// Service (process role) name
    pub service: Arc<str>,
    /// Protected resource
    pub resource: Arc<str>,
    /// Operation being retried
    pub action: Arc<str>,
}

impl Labels {
    /// Create labels from owned or borrowed strings
    pub fn new(
        service: impl Into<Arc<str>>,
        resource: impl Into<Arc<str>>,
        action: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            service: service.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }
}

/// Source of correlation identifiers for one wrapped operation
#[derive(Debug, Clone)]
pub(crate) struct Correlation {
    shared: Option<Uuid>,
}

impl Correlation {
    pub(crate) fn new(mode: CorrelationMode) -> Self {
        let shared = match mode {
            CorrelationMode::PerCall => None,
            CorrelationMode::PerWrap => Some(Uuid::new_v4()),
        };
        Self { shared }
    }

    /// Identifier for the next call
    pub(crate) fn next_id(&self) -> Uuid {
        self.shared.unwrap_or_else(Uuid::new_v4)
    }

    pub(crate) fn mode(&self) -> CorrelationMode {
        if self.shared.is_some() {
            CorrelationMode::PerWrap
        } else {
            CorrelationMode::PerCall
        }
    }
}

/// Identity of one logical invocation
///
/// Process and worker identity are captured when the call starts, not when
/// the operation is wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    correlation_id: Uuid,
    pid: u32,
    worker: String,
    labels: Labels,
    attempt: u32,
}

impl InvocationContext {
    /// Start a context for a new call on the current thread
    pub fn new(labels: Labels, correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            pid: std::process::id(),
            worker: current_worker(),
            labels,
            attempt: 0,
        }
    }

    /// Correlation identifier grouping this call's events
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Process identifier
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Thread that started the call
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Service label
    pub fn service(&self) -> &str {
        &self.labels.service
    }

    /// Resource label
    pub fn resource(&self) -> &str {
        &self.labels.resource
    }

    /// Action label
    pub fn action(&self) -> &str {
        &self.labels.action
    }

    /// Current attempt number (1-indexed; 0 before the first attempt)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }
}

/// Renders `[PID-<pid>|<worker>|<service>|<resource>-<correlation id>]`
impl fmt::Display for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[PID-{}|{}|{}|{}-{}]",
            self.pid,
            self.worker,
            self.labels.service,
            self.labels.resource,
            self.correlation_id
        )
    }
}

/// Name of the running executable, used as the default service label
pub fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "steadfast".to_string())
}

fn current_worker() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => format!("THREAD-{}", name),
        None => format!("THREAD-{:?}", thread.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Labels {
        Labels::new("api", "postgres", "connect")
    }

    #[test]
    fn test_context_fields() {
        let id = Uuid::new_v4();
        let ctx = InvocationContext::new(labels(), id);

        assert_eq!(ctx.correlation_id(), id);
        assert_eq!(ctx.pid(), std::process::id());
        assert_eq!(ctx.service(), "api");
        assert_eq!(ctx.resource(), "postgres");
        assert_eq!(ctx.action(), "connect");
        assert_eq!(ctx.attempt(), 0);
    }

    #[test]
    fn test_begin_attempt_increments() {
        let mut ctx = InvocationContext::new(labels(), Uuid::new_v4());
        assert_eq!(ctx.begin_attempt(), 1);
        assert_eq!(ctx.begin_attempt(), 2);
        assert_eq!(ctx.attempt(), 2);
    }

    #[test]
    fn test_display_prefix() {
        let id = Uuid::nil();
        let ctx = InvocationContext::new(labels(), id);
        let prefix = ctx.to_string();

        assert!(prefix.starts_with(&format!("[PID-{}|THREAD-", std::process::id())));
        assert!(prefix.ends_with("|api|postgres-00000000-0000-0000-0000-000000000000]"));
    }

    #[test]
    fn test_worker_reflects_calling_thread() {
        let handle = std::thread::Builder::new()
            .name("poller".to_string())
            .spawn(|| InvocationContext::new(labels(), Uuid::new_v4()))
            .unwrap();
        let ctx = handle.join().unwrap();
        assert_eq!(ctx.worker(), "THREAD-poller");
    }

    #[test]
    fn test_process_name_not_empty() {
        assert!(!process_name().is_empty());
    }

    #[test]
    fn test_per_call_correlation_is_fresh() {
        let correlation = Correlation::new(CorrelationMode::PerCall);
        assert_ne!(correlation.next_id(), correlation.next_id());
        assert_eq!(correlation.mode(), CorrelationMode::PerCall);
    }

    #[test]
    fn test_per_wrap_correlation_is_shared() {
        let correlation = Correlation::new(CorrelationMode::PerWrap);
        assert_eq!(correlation.next_id(), correlation.next_id());
        assert_eq!(correlation.mode(), CorrelationMode::PerWrap);
    }
}
