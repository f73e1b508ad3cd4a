//! The orchestration loop.
//!
//! ```text
//! AWAITING_DECISION ──Invoke──▶ EXECUTING ──observation──▶ AWAITING_DECISION
//!        │                                                      │
//!        ├──Finish──────────▶ COMPLETED                         │
//!        ├──oracle unavailable▶ FAILED                          │
//!        └◀─────────── invocation count == cap ─▶ EXHAUSTED ◀───┘
//! ```
//!
//! Every capability-path error (unknown name, bad arguments, not found,
//! collaborator failure, timeout) is recorded as a failure observation and the
//! loop continues. Only an unreachable oracle, or an oracle that keeps failing
//! past its retry budget, ends the session early.
//!
//! A capability that overruns its deadline is abandoned, not cancelled: its
//! thread keeps running, and a write it was making can still land after the
//! timeout observation. The session therefore holds back its next invocation
//! until the abandoned call exits, waiting at most one more capability
//! timeout. If it is still running then, the next invocation fails with
//! [`AgentError::CallInFlight`] without starting. An abandoned call still
//! running when the session closes is left to finish on its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rayon::prelude::*;
use serde_json::Value;

use super::capabilities::builtin_registry;
use super::capability::{Arguments, CapabilityContract, CapabilityOutput, CapabilityRegistry};
use super::context::AuditContext;
use super::deadline::{Abandoned, DeadlineError, run_with_deadline};
use super::error::{AgentError, AgentResult};
use super::oracle::{Decision, DecisionOracle, DecisionRequest, OracleError};
use super::session::{AuditSession, FailureKind, Outcome, SessionRecord, SessionStatus};
use crate::message::{AuditMessage, MessageSink, NullSink};

/// Loop limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Maximum invocations per session.
    pub iteration_cap: usize,
    /// Deadline for one oracle decision. Zero disables it.
    pub oracle_timeout: Duration,
    /// Deadline for one capability call. Zero disables it.
    pub capability_timeout: Duration,
    /// Transient oracle failures tolerated per decision.
    pub oracle_retries: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            iteration_cap: 15,
            oracle_timeout: Duration::from_secs(120),
            capability_timeout: Duration::from_secs(30),
            oracle_retries: 2,
        }
    }
}

/// A capability call that overran its deadline and has not exited yet.
struct InFlight {
    capability: String,
    call: Abandoned,
}

/// Runs goals to completion against a frozen capability registry.
///
/// One controller can serve many sessions, sequentially or in parallel.
pub struct Controller {
    registry: Arc<CapabilityRegistry>,
    contracts: Arc<[CapabilityContract]>,
    oracle: Arc<dyn DecisionOracle>,
    ctx: AuditContext,
    config: ControllerConfig,
    sink: Arc<dyn MessageSink>,
    next_session: AtomicU64,
}

impl Controller {
    pub fn new(
        registry: CapabilityRegistry,
        oracle: Arc<dyn DecisionOracle>,
        ctx: AuditContext,
    ) -> Self {
        let contracts: Arc<[CapabilityContract]> = Arc::from(registry.contracts());
        Self {
            registry: Arc::new(registry),
            contracts,
            oracle,
            ctx,
            config: ControllerConfig::default(),
            sink: Arc::new(NullSink),
            next_session: AtomicU64::new(1),
        }
    }

    /// A controller over the builtin capabilities.
    pub fn with_builtins(oracle: Arc<dyn DecisionOracle>, ctx: AuditContext) -> AgentResult<Self> {
        Ok(Self::new(builtin_registry()?, oracle, ctx))
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn context(&self) -> &AuditContext {
        &self.ctx
    }

    /// Registered contracts, in registration order.
    pub fn list_capabilities(&self) -> impl Iterator<Item = &CapabilityContract> + Clone + '_ {
        self.registry.list()
    }

    /// Run one goal to a terminal status. Never fails; failures are in the
    /// returned session.
    pub fn run(&self, goal: &str) -> AuditSession {
        let started_at = self.ctx.clock.now();
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        let id = format!("audit-{}-{n:03}", started_at.format("%Y%m%dT%H%M%SZ"));
        let mut record = SessionRecord::open(&id, goal, started_at);

        let span = tracing::info_span!("session", session = %id, oracle = self.oracle.name());
        let _enter = span.enter();
        tracing::info!(goal, cap = self.config.iteration_cap, "session started");
        self.sink.emit(&AuditMessage::Goal {
            session: id.clone(),
            goal: goal.to_string(),
        });

        let mut in_flight = None;
        loop {
            if record.invocation_count() >= self.config.iteration_cap {
                let answer = exhausted_summary(&record, self.config.iteration_cap);
                return self.close(record, SessionStatus::Exhausted, answer);
            }

            let decision = match self.decide(&mut record) {
                Ok(d) => d,
                Err(err) => {
                    let reason = AgentError::OracleUnavailable {
                        message: err.to_string(),
                    }
                    .to_string();
                    let answer = format!(
                        "Session failed: {reason}. {} invocation(s) were recorded before the failure.",
                        record.invocation_count()
                    );
                    return self.close(record, SessionStatus::Failed { reason }, answer);
                }
            };

            match decision {
                Decision::Finish { answer } => {
                    return self.close(record, SessionStatus::Completed, answer);
                }
                Decision::Invoke {
                    capability,
                    arguments,
                    reasoning,
                } => self.step(&mut record, &mut in_flight, capability, arguments, reasoning),
            }
        }
    }

    /// Run independent goals in parallel. Results are in input order.
    pub fn run_many<S>(&self, goals: &[S]) -> Vec<AuditSession>
    where
        S: AsRef<str> + Sync,
    {
        goals.par_iter().map(|g| self.run(g.as_ref())).collect()
    }

    /// Ask the oracle, retrying transient failures within the budget.
    fn decide(&self, record: &mut SessionRecord) -> Result<Decision, OracleError> {
        let mut failures = 0;
        loop {
            let request = DecisionRequest {
                goal: record.goal().to_string(),
                contracts: Arc::clone(&self.contracts),
                history: record.steps().to_vec(),
            };
            let oracle = Arc::clone(&self.oracle);
            let timeout = self.config.oracle_timeout;
            let result = match run_with_deadline(timeout, move || oracle.decide(&request)) {
                Ok(r) => r,
                Err(DeadlineError::Elapsed(_)) => Err(OracleError::Timeout {
                    timeout_secs: timeout.as_secs(),
                }),
                Err(e) => Err(OracleError::RequestFailed {
                    message: format!("oracle call aborted ({e:?})"),
                }),
            };

            match result {
                Ok(decision) => return Ok(decision),
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "decision oracle unavailable");
                    return Err(e);
                }
                Err(e) if failures >= self.config.oracle_retries => {
                    tracing::error!(error = %e, attempts = failures + 1, "oracle retry budget spent");
                    return Err(OracleError::Unavailable {
                        message: format!("{e} (gave up after {} attempts)", failures + 1),
                    });
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, attempt = failures, "oracle failed, retrying");
                    let note = format!(
                        "before invocation {}: oracle attempt {failures} failed: {e}",
                        record.next_sequence()
                    );
                    self.sink.emit(&AuditMessage::note(record.id(), &note));
                    record.note(note);
                }
            }
        }
    }

    /// Execute one invocation and record its observation.
    fn step(
        &self,
        record: &mut SessionRecord,
        in_flight: &mut Option<InFlight>,
        capability: String,
        arguments: Arguments,
        reasoning: Option<String>,
    ) {
        let invocation = record.invoke(
            capability.clone(),
            arguments.clone(),
            reasoning.clone(),
            self.ctx.clock.now(),
        );
        let seq = invocation.sequence;
        tracing::info!(seq, capability = %capability, "invoking");
        self.sink.emit(&AuditMessage::Decision {
            session: record.id().to_string(),
            sequence: seq,
            capability: capability.clone(),
            arguments: Value::Object(arguments.clone()),
            reasoning,
        });

        let (outcome, text, data) = match self.execute(&capability, &arguments, in_flight) {
            Ok(CapabilityOutput { text, data }) => (Outcome::Success, text, data),
            Err(err) => {
                let kind = FailureKind::of(&err);
                tracing::warn!(seq, capability = %capability, %kind, error = %err, "capability failed");
                (Outcome::Failure { kind }, self.describe_failure(&err), Value::Null)
            }
        };

        let observed = record.observe(invocation, outcome, text, data).observation.clone();
        tracing::debug!(seq, success = observed.is_success(), "observed");
        self.sink.emit(&AuditMessage::Observation {
            session: record.id().to_string(),
            sequence: seq,
            capability,
            success: observed.is_success(),
            text: observed.text,
        });
    }

    /// Resolve, validate and run a capability under its deadline.
    fn execute(
        &self,
        name: &str,
        arguments: &Arguments,
        in_flight: &mut Option<InFlight>,
    ) -> AgentResult<CapabilityOutput> {
        let entry = self.registry.resolve(name)?;
        let args = entry.contract.validate(arguments)?;
        self.settle(name, in_flight)?;
        let implementation = Arc::clone(&entry.implementation);
        let ctx = self.ctx.clone();
        let timeout = self.config.capability_timeout;

        match run_with_deadline(timeout, move || implementation.execute(&ctx, args)) {
            Ok(result) => result,
            Err(DeadlineError::Elapsed(call)) => {
                *in_flight = Some(InFlight {
                    capability: name.to_string(),
                    call,
                });
                Err(AgentError::CapabilityTimeout {
                    capability: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
            Err(e) => Err(AgentError::CapabilityFailed {
                capability: name.to_string(),
                message: format!("call aborted ({e:?})"),
            }),
        }
    }

    /// Wait for an abandoned call to exit before `next` may start.
    fn settle(&self, next: &str, in_flight: &mut Option<InFlight>) -> AgentResult<()> {
        let Some(InFlight { capability, call }) = in_flight.take() else {
            return Ok(());
        };
        match call.wait(self.config.capability_timeout) {
            Ok(()) => {
                tracing::debug!(capability = %capability, "abandoned call exited");
                Ok(())
            }
            Err(call) => {
                tracing::warn!(capability = %capability, next, "abandoned call still running");
                let err = AgentError::CallInFlight {
                    capability: next.to_string(),
                    pending: capability.clone(),
                };
                *in_flight = Some(InFlight { capability, call });
                Err(err)
            }
        }
    }

    fn describe_failure(&self, err: &AgentError) -> String {
        match err {
            AgentError::UnknownCapability { .. } => {
                let names: Vec<&str> = self.registry.list().map(|c| c.name.as_str()).collect();
                format!("{err}. Available capabilities: {}", names.join(", "))
            }
            _ => err.to_string(),
        }
    }

    fn close(&self, record: SessionRecord, status: SessionStatus, answer: String) -> AuditSession {
        let session = record.close(status, answer, self.ctx.clock.now());
        tracing::info!(
            status = %session.status,
            invocations = session.steps.len(),
            "session closed"
        );
        self.sink.emit(&AuditMessage::Outcome {
            session: session.id.clone(),
            status: session.status.to_string(),
            answer: session.answer.clone(),
        });
        session
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("registry", &self.registry)
            .field("oracle", &self.oracle.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The answer for a session that hit its cap: what ran, how much failed.
fn exhausted_summary(record: &SessionRecord, cap: usize) -> String {
    let steps = record.steps();
    let failed = steps.iter().filter(|s| !s.observation.is_success()).count();

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for step in steps {
        let name = step.invocation.capability.as_str();
        match counts.iter_mut().find(|(n, _)| *n == name) {
            Some((_, c)) => *c += 1,
            None => counts.push((name, 1)),
        }
    }
    let done: Vec<String> = counts
        .iter()
        .map(|(name, c)| format!("{name} x{c}"))
        .collect();

    let mut answer = format!(
        "Incomplete: the iteration cap of {cap} was reached before the goal was completed. \
         {} invocation(s), {failed} failed: {}.",
        steps.len(),
        if done.is_empty() { "none".to_string() } else { done.join(", ") }
    );
    if let Some(last) = steps.last() {
        let line = last.observation.text.lines().next().unwrap_or("");
        answer.push_str(&format!(" Last observation: {line}"));
    }
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::capability::{Capability, CapabilityArgs, SideEffect};
    use crate::agent::context::InMemoryCollaborators;
    use crate::agent::oracle::{ScriptedOracle, WhenExhausted};
    use crate::clock::FixedClock;
    use crate::message::VecSink;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn ctx() -> AuditContext {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        InMemoryCollaborators::seeded(now).context(Arc::new(FixedClock(now)))
    }

    struct Sleepy;
    impl Capability for Sleepy {
        fn contract(&self) -> CapabilityContract {
            CapabilityContract {
                name: "sleepy".into(),
                description: "Takes too long.".into(),
                side_effect: SideEffect::Pure,
                parameters: vec![],
            }
        }
        fn execute(&self, _ctx: &AuditContext, _args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(CapabilityOutput::text("finally"))
        }
    }

    /// A write that takes `delay` and counts how many times it started.
    struct SlowWrite {
        delay: Duration,
        started: Arc<AtomicUsize>,
    }
    impl Capability for SlowWrite {
        fn contract(&self) -> CapabilityContract {
            CapabilityContract {
                name: "slow_write".into(),
                description: "Writes slowly.".into(),
                side_effect: SideEffect::WriteExternal,
                parameters: vec![],
            }
        }
        fn execute(&self, _ctx: &AuditContext, _args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(CapabilityOutput::text("written"))
        }
    }

    struct Quick;
    impl Capability for Quick {
        fn contract(&self) -> CapabilityContract {
            CapabilityContract {
                name: "quick".into(),
                description: "Returns at once.".into(),
                side_effect: SideEffect::Read,
                parameters: vec![],
            }
        }
        fn execute(&self, _ctx: &AuditContext, _args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
            Ok(CapabilityOutput::text("quick"))
        }
    }

    fn slow_write_registry(delay: Duration) -> (CapabilityRegistry, Arc<AtomicUsize>) {
        let started = Arc::new(AtomicUsize::new(0));
        let mut registry = CapabilityRegistry::new();
        registry
            .register_capability(Arc::new(SlowWrite {
                delay,
                started: Arc::clone(&started),
            }))
            .unwrap();
        registry.register_capability(Arc::new(Quick)).unwrap();
        (registry, started)
    }

    /// Answers its first request only after `delay`, later ones at once.
    struct LateOracle {
        delay: Duration,
        calls: AtomicUsize,
    }
    impl DecisionOracle for LateOracle {
        fn name(&self) -> &str {
            "late"
        }
        fn decide(&self, _request: &DecisionRequest) -> Result<Decision, OracleError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(self.delay);
                return Ok(Decision::finish("too late"));
            }
            Ok(Decision::finish("on time"))
        }
    }

    #[test]
    fn finish_first_completes_with_empty_transcript() {
        let oracle = Arc::new(ScriptedOracle::new([Decision::finish("nothing to do")]));
        let c = Controller::with_builtins(oracle, ctx()).unwrap();
        let s = c.run("say hello");
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.steps.is_empty());
        assert_eq!(s.answer, "nothing to do");
    }

    #[test]
    fn unknown_capability_is_an_observation() {
        let oracle = Arc::new(ScriptedOracle::new([Decision::invoke("teleport", json!({}))]));
        let c = Controller::with_builtins(oracle, ctx()).unwrap();
        let s = c.run("go");
        assert_eq!(s.status, SessionStatus::Completed);
        let obs = &s.steps[0].observation;
        assert_eq!(obs.failure_kind(), Some(FailureKind::UnknownCapability));
        assert!(obs.text.contains("Available capabilities: list_facilities"));
    }

    #[test]
    fn capability_timeout_is_an_observation() {
        let mut registry = CapabilityRegistry::new();
        registry.register_capability(Arc::new(Sleepy)).unwrap();
        let oracle = Arc::new(ScriptedOracle::new([Decision::invoke("sleepy", json!({}))]));
        let c = Controller::new(registry, oracle, ctx()).with_config(ControllerConfig {
            capability_timeout: Duration::from_millis(20),
            ..Default::default()
        });
        let s = c.run("wait");
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.steps[0].observation.failure_kind(), Some(FailureKind::Timeout));
    }

    #[test]
    fn abandoned_write_holds_back_the_next_call() {
        let (registry, started) = slow_write_registry(Duration::from_millis(400));
        let oracle = Arc::new(ScriptedOracle::new([
            Decision::invoke("slow_write", json!({})),
            Decision::invoke("slow_write", json!({})),
        ]));
        let c = Controller::new(registry, oracle, ctx()).with_config(ControllerConfig {
            capability_timeout: Duration::from_millis(50),
            ..Default::default()
        });
        let s = c.run("write twice");

        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.steps.len(), 2);
        assert_eq!(s.steps[0].observation.failure_kind(), Some(FailureKind::Timeout));
        let second = &s.steps[1].observation;
        assert_eq!(second.failure_kind(), Some(FailureKind::Timeout));
        assert!(second.text.contains("slow_write is still running"));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn next_call_starts_once_abandoned_call_exits() {
        let (registry, started) = slow_write_registry(Duration::from_millis(150));
        let oracle = Arc::new(ScriptedOracle::new([
            Decision::invoke("slow_write", json!({})),
            Decision::invoke("quick", json!({})),
        ]));
        let c = Controller::new(registry, oracle, ctx()).with_config(ControllerConfig {
            capability_timeout: Duration::from_millis(100),
            ..Default::default()
        });
        let s = c.run("write then read");

        assert_eq!(s.steps[0].observation.failure_kind(), Some(FailureKind::Timeout));
        assert!(s.steps[1].observation.is_success());
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn oracle_overrunning_its_deadline_is_retried() {
        let oracle = Arc::new(LateOracle {
            delay: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        });
        let c = Controller::with_builtins(oracle.clone(), ctx())
            .unwrap()
            .with_config(ControllerConfig {
                oracle_timeout: Duration::from_millis(20),
                oracle_retries: 2,
                ..Default::default()
            });
        let s = c.run("go");

        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.answer, "on time");
        assert_eq!(s.notes.len(), 1);
        assert!(s.notes[0].contains("timed out"));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn transient_oracle_failures_are_retried_and_noted() {
        let oracle = Arc::new(ScriptedOracle::with_responses(
            [
                Err(OracleError::Malformed {
                    message: "not json".into(),
                }),
                Ok(Decision::finish("done")),
            ],
            WhenExhausted::Unavailable,
        ));
        let sink = Arc::new(VecSink::new());
        let c = Controller::with_builtins(oracle.clone(), ctx())
            .unwrap()
            .with_sink(sink.clone());
        let s = c.run("go");
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.notes.len(), 1);
        assert!(s.notes[0].contains("malformed decision"));
        assert_eq!(oracle.calls(), 2);
        assert!(sink.messages().iter().any(|m| matches!(m, AuditMessage::Note { .. })));
    }

    #[test]
    fn retry_budget_exhaustion_fails_session() {
        let oracle = Arc::new(ScriptedOracle::with_responses(
            (0..5).map(|_| Err(OracleError::Timeout { timeout_secs: 1 })),
            WhenExhausted::Unavailable,
        ));
        let c = Controller::with_builtins(oracle.clone(), ctx())
            .unwrap()
            .with_config(ControllerConfig {
                oracle_retries: 2,
                ..Default::default()
            });
        let s = c.run("go");
        assert!(matches!(s.status, SessionStatus::Failed { .. }));
        assert_eq!(oracle.calls(), 3);
        assert_eq!(s.notes.len(), 2);
    }

    #[test]
    fn exhausted_summary_counts_work() {
        let oracle = Arc::new(ScriptedOracle::repeating(Decision::invoke(
            "list_facilities",
            json!({}),
        )));
        let c = Controller::with_builtins(oracle, ctx())
            .unwrap()
            .with_config(ControllerConfig {
                iteration_cap: 3,
                ..Default::default()
            });
        let s = c.run("loop");
        assert_eq!(s.status, SessionStatus::Exhausted);
        assert_eq!(s.steps.len(), 3);
        assert!(s.answer.starts_with("Incomplete"));
        assert!(s.answer.contains("list_facilities x3"));
    }

    #[test]
    fn session_ids_are_unique() {
        let oracle = Arc::new(ScriptedOracle::repeating(Decision::finish("ok")));
        let c = Controller::with_builtins(oracle, ctx()).unwrap();
        let a = c.run("one");
        let b = c.run("two");
        assert_ne!(a.id, b.id);
    }
}
