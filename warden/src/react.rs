//! The ReAct control loop.
//!
//! One run alternates model calls and tool execution until the model returns
//! a `final` action or the step budget runs out. Only iterations that execute
//! tools consume a step. The first protocol failure of a run earns one repair
//! request; any later failure aborts with an apology. When the budget is spent
//! the loop makes exactly one forced call asking for a final answer, so a run
//! makes at most `max_steps + 2` model calls.

use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::protocol::{Action, ProtocolError, parse};
use crate::core::types::{Conversation, Turn};
use crate::io::backend::ModelBackend;
use crate::io::events::{Event, EventKind, EventSink};
use crate::tools::ToolRegistry;

pub const TOOL_RESULT_PREFIX: &str = "[tool_result] ";
pub const TOOL_BLOCKED_PREFIX: &str = "[tool_blocked] reason=";
pub const REPAIR_PREFIX: &str = "Your last response was invalid";

const FORCE_FINAL_INSTRUCTION: &str = "Step budget exhausted. Respond now with a final answer as JSON: {\"type\":\"final\",\"content\":\"...\"}";

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// The model produced a `final` action within the budget.
    Final,
    /// The budget ran out; the answer comes from the forced call.
    Exhausted,
    /// A second protocol failure aborted the run.
    ProtocolFailure,
}

/// Summary of one run, including the full conversation trace.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub answer: String,
    pub stop: LoopStop,
    pub steps: usize,
    pub model_calls: usize,
    pub conversation: Conversation,
}

/// Identifiers attached to every event of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunIds<'a> {
    pub run_id: &'a str,
    pub session_id: &'a str,
}

/// Repair bookkeeping; a run gets one repair.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Repair {
    Available,
    Spent { first_raw: String },
}

impl Repair {
    fn first_raw(&self) -> Option<&str> {
        match self {
            Repair::Available => None,
            Repair::Spent { first_raw } => Some(first_raw),
        }
    }
}

pub fn repair_instruction(err: ProtocolError) -> String {
    format!(
        "{REPAIR_PREFIX} ({}). Respond again with strictly valid JSON: a single object whose \"type\" is one of final/tool_call/tool_calls.",
        err.reason()
    )
}

pub fn apology(first_raw: &str) -> String {
    format!("I'm sorry, I could not produce a well-formed response. Best-effort answer: {first_raw}")
}

pub struct ReactLoop<'a> {
    backend: &'a dyn ModelBackend,
    registry: &'a ToolRegistry,
    sink: &'a dyn EventSink,
    max_steps: NonZeroUsize,
}

/// Mutable state of a single run.
struct RunState<'r> {
    ids: RunIds<'r>,
    conversation: Conversation,
    steps: usize,
    model_calls: usize,
    repair: Repair,
}

impl<'a> ReactLoop<'a> {
    pub fn new(
        backend: &'a dyn ModelBackend,
        registry: &'a ToolRegistry,
        sink: &'a dyn EventSink,
        max_steps: NonZeroUsize,
    ) -> Self {
        Self {
            backend,
            registry,
            sink,
            max_steps,
        }
    }

    /// Run one user turn to completion.
    ///
    /// Tool and protocol failures never surface as errors; only a failing
    /// model backend does.
    #[instrument(skip_all, fields(run_id = ids.run_id, session_id = ids.session_id))]
    pub fn run(&self, system_prompt: &str, user_message: &str, ids: RunIds<'_>) -> Result<RunOutcome> {
        let mut conversation = Conversation::new();
        conversation.push(Turn::system(system_prompt));
        conversation.push(Turn::user(user_message));
        let mut state = RunState {
            ids,
            conversation,
            steps: 0,
            model_calls: 0,
            repair: Repair::Available,
        };
        self.emit(
            &state,
            EventKind::RunStarted,
            json!({"max_steps": self.max_steps.get(), "content": user_message}),
        );

        loop {
            if state.steps >= self.max_steps.get() {
                return self.force_final(state);
            }

            let raw = self.generate(&mut state)?;
            match parse(&raw) {
                Ok(Action::Final { content }) => {
                    return Ok(self.finish(state, content, LoopStop::Final));
                }
                Ok(action) => self.run_tools(&mut state, &raw, &action),
                Err(err) => {
                    self.emit(
                        &state,
                        EventKind::ProtocolError,
                        json!({"reason": err.reason(), "raw": raw}),
                    );
                    match state.repair.first_raw() {
                        None => self.request_repair(&mut state, raw, err),
                        Some(first_raw) => {
                            let answer = apology(first_raw);
                            warn!(reason = err.reason(), "second protocol failure, aborting");
                            self.emit(
                                &state,
                                EventKind::RunAborted,
                                json!({"reason": err.reason(), "model_calls": state.model_calls}),
                            );
                            return Ok(outcome(state, answer, LoopStop::ProtocolFailure));
                        }
                    }
                }
            }
        }
    }

    fn generate(&self, state: &mut RunState<'_>) -> Result<String> {
        state.model_calls += 1;
        match self.backend.generate(&state.conversation) {
            Ok(raw) => {
                debug!(call = state.model_calls, bytes = raw.len(), "model output");
                self.emit(
                    state,
                    EventKind::ModelOutput,
                    json!({"call": state.model_calls, "raw": raw}),
                );
                Ok(raw)
            }
            Err(err) => {
                self.emit(
                    state,
                    EventKind::RunAborted,
                    json!({"error": format!("{err:#}"), "model_calls": state.model_calls}),
                );
                Err(err).context("model backend failed")
            }
        }
    }

    fn request_repair(&self, state: &mut RunState<'_>, raw: String, err: ProtocolError) {
        info!(reason = err.reason(), "requesting protocol repair");
        state.conversation.push(Turn::assistant(raw.clone()));
        state.conversation.push(Turn::user(repair_instruction(err)));
        state.repair = Repair::Spent { first_raw: raw };
        self.emit(state, EventKind::RepairRequested, json!({"reason": err.reason()}));
    }

    fn run_tools(&self, state: &mut RunState<'_>, raw: &str, action: &Action) {
        state.conversation.push(Turn::assistant(raw));
        for call in action.calls() {
            self.emit(
                state,
                EventKind::ToolCall,
                json!({"tool": call.name, "args": call.args}),
            );
            let result = self.registry.execute(&call.name, &call.args);
            if result.is_blocked() {
                let reason = result.error().unwrap_or("blocked");
                state
                    .conversation
                    .push(Turn::user(format!("{TOOL_BLOCKED_PREFIX}{reason}")));
                self.emit(
                    state,
                    EventKind::ToolBlocked,
                    json!({"tool": call.name, "error": reason}),
                );
            } else {
                state
                    .conversation
                    .push(Turn::user(format!("{TOOL_RESULT_PREFIX}{}", result.normalized())));
                self.emit(
                    state,
                    EventKind::ToolResult,
                    json!({"tool": call.name, "payload": Value::Object(result.to_payload())}),
                );
            }
        }
        state.steps += 1;
        debug!(
            step = state.steps,
            kind = action.kind(),
            calls = action.calls().len(),
            "tool step complete"
        );
    }

    fn force_final(&self, mut state: RunState<'_>) -> Result<RunOutcome> {
        info!(steps = state.steps, "step budget exhausted, forcing final answer");
        self.emit(&state, EventKind::BudgetExhausted, json!({"steps": state.steps}));
        state.conversation.push(Turn::user(FORCE_FINAL_INSTRUCTION));

        let raw = self.generate(&mut state)?;
        let answer = match parse(&raw) {
            Ok(Action::Final { content }) => content,
            _ => state
                .repair
                .first_raw()
                .map_or_else(|| raw.clone(), str::to_string),
        };
        Ok(self.finish(state, answer, LoopStop::Exhausted))
    }

    fn finish(&self, state: RunState<'_>, answer: String, stop: LoopStop) -> RunOutcome {
        self.emit(
            &state,
            EventKind::FinalAnswer,
            json!({"content": answer, "model_calls": state.model_calls, "steps": state.steps}),
        );
        outcome(state, answer, stop)
    }

    fn emit(&self, state: &RunState<'_>, kind: EventKind, data: Value) {
        self.sink
            .record(&Event::new(kind, state.ids.run_id, state.ids.session_id, data));
    }
}

fn outcome(state: RunState<'_>, answer: String, stop: LoopStop) -> RunOutcome {
    RunOutcome {
        answer,
        stop,
        steps: state.steps,
        model_calls: state.model_calls,
        conversation: state.conversation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::permissions::{PermissionMode, PermissionPolicy};
    use crate::core::types::Role;
    use crate::io::events::NoopSink;
    use crate::test_support::{RecordingSink, ScriptedBackend};
    use crate::tools::EchoTool;

    const IDS: RunIds<'static> = RunIds {
        run_id: "r1",
        session_id: "s1",
    };

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new(PermissionPolicy::new(PermissionMode::Deny));
        registry
            .register(Box::new(EchoTool::new().expect("echo")))
            .expect("register");
        registry
    }

    fn steps(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero")
    }

    fn run(backend: &ScriptedBackend, max_steps: usize) -> RunOutcome {
        let registry = registry();
        ReactLoop::new(backend, &registry, &NoopSink, steps(max_steps))
            .run("system", "hello", IDS)
            .expect("run")
    }

    const ECHO_CALL: &str = r#"{"type":"tool_call","name":"echo","args":{"text":"hi"}}"#;

    #[test]
    fn final_answer_takes_one_call() {
        let backend = ScriptedBackend::new([r#"{"type":"final","content":"done"}"#]);
        let outcome = run(&backend, 4);
        assert_eq!(outcome.answer, "done");
        assert_eq!(outcome.stop, LoopStop::Final);
        assert_eq!(backend.calls(), 1);
        assert_eq!(outcome.model_calls, 1);
    }

    #[test]
    fn one_malformed_then_final_takes_two_calls() {
        let backend = ScriptedBackend::new(["not json", r#"{"type":"final","content":"fixed"}"#]);
        let outcome = run(&backend, 4);
        assert_eq!(outcome.answer, "fixed");
        assert_eq!(backend.calls(), 2);

        let second = &backend.conversations()[1];
        let last = second.last().expect("turn");
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with(REPAIR_PREFIX));
        assert!(last.content.contains("invalid_json"));
        assert!(last.content.contains("final/tool_call/tool_calls"));
    }

    #[test]
    fn repeated_malformed_output_aborts_with_first_raw_text() {
        let backend = ScriptedBackend::new(["first garbage", "[1, 2]", "never used"]);
        let outcome = run(&backend, 4);
        assert_eq!(outcome.stop, LoopStop::ProtocolFailure);
        assert_eq!(backend.calls(), 2);
        assert!(outcome.answer.contains("first garbage"));
        assert_eq!(outcome.answer, apology("first garbage"));
    }

    #[test]
    fn repair_is_not_restored_by_a_later_tool_step() {
        let backend = ScriptedBackend::new([
            "first garbage",
            ECHO_CALL,
            "second garbage",
            r#"{"type":"final","content":"never reached"}"#,
        ]);
        let outcome = run(&backend, 4);
        assert_eq!(outcome.stop, LoopStop::ProtocolFailure);
        assert_eq!(outcome.steps, 1);
        assert_eq!(backend.calls(), 3);
        assert_eq!(outcome.answer, apology("first garbage"));
    }

    #[test]
    fn tool_result_is_in_conversation_before_next_call() {
        let backend =
            ScriptedBackend::new([ECHO_CALL, r#"{"type":"final","content":"saw it"}"#]);
        let outcome = run(&backend, 4);
        assert_eq!(outcome.answer, "saw it");
        assert_eq!(outcome.steps, 1);

        let second = &backend.conversations()[1];
        let turns = second.turns();
        assert_eq!(turns[turns.len() - 2], Turn::assistant(ECHO_CALL));
        assert_eq!(
            turns[turns.len() - 1].content,
            r#"[tool_result] {"blocked":false,"echo":"hi","success":true}"#
        );
    }

    #[test]
    fn batch_calls_run_in_order() {
        let batch = r#"{"type":"tool_calls","calls":[
            {"name":"echo","args":{"text":"one"}},
            {"name":"shell","args":{"cmd":["ls"]}},
            {"name":"echo","args":{"text":"two"}}]}"#;
        let backend = ScriptedBackend::new([batch, r#"{"type":"final","content":"ok"}"#]);
        run(&backend, 4);

        let second = &backend.conversations()[1];
        let tool_turns: Vec<&str> = second
            .turns()
            .iter()
            .filter(|turn| turn.role == Role::User)
            .skip(1)
            .map(|turn| turn.content.as_str())
            .collect();
        assert_eq!(
            tool_turns,
            vec![
                r#"[tool_result] {"blocked":false,"echo":"one","success":true}"#,
                "[tool_blocked] reason=permission denied for shell",
                r#"[tool_result] {"blocked":false,"echo":"two","success":true}"#,
            ]
        );
    }

    #[test]
    fn exhausted_budget_forces_one_final_call() {
        let backend = ScriptedBackend::new([
            ECHO_CALL,
            ECHO_CALL,
            r#"{"type":"final","content":"forced"}"#,
        ]);
        let outcome = run(&backend, 2);
        assert_eq!(outcome.stop, LoopStop::Exhausted);
        assert_eq!(outcome.answer, "forced");
        assert_eq!(backend.calls(), 3);

        let last_conversation = backend.conversations().last().cloned().expect("calls");
        assert_eq!(
            last_conversation.last().expect("turn").content,
            FORCE_FINAL_INSTRUCTION
        );
    }

    #[test]
    fn forced_call_without_final_falls_back() {
        let backend = ScriptedBackend::new([ECHO_CALL, ECHO_CALL]);
        let outcome = run(&backend, 1);
        assert_eq!(outcome.stop, LoopStop::Exhausted);
        assert_eq!(outcome.answer, ECHO_CALL);

        let backend = ScriptedBackend::new(["oops", ECHO_CALL, "still not final"]);
        let outcome = run(&backend, 1);
        assert_eq!(outcome.answer, "oops");
    }

    #[test]
    fn model_calls_never_exceed_budget_plus_two() {
        for max_steps in 1..=4 {
            let mut script = vec!["bad"];
            script.extend(std::iter::repeat_n(ECHO_CALL, max_steps + 5));
            let backend = ScriptedBackend::new(script);
            let outcome = run(&backend, max_steps);
            assert_eq!(outcome.stop, LoopStop::Exhausted);
            assert_eq!(backend.calls(), max_steps + 2, "max_steps={max_steps}");
        }
    }

    #[test]
    fn backend_errors_propagate() {
        let backend = ScriptedBackend::new(Vec::<&str>::new());
        let registry = registry();
        let sink = RecordingSink::new();
        let err = ReactLoop::new(&backend, &registry, &sink, steps(2))
            .run("system", "hello", IDS)
            .unwrap_err();
        assert!(format!("{err:#}").contains("model backend failed"));
        assert_eq!(sink.kinds().last(), Some(&EventKind::RunAborted));
    }

    #[test]
    fn events_trace_the_run() {
        let backend = ScriptedBackend::new([
            "nope",
            ECHO_CALL,
            r#"{"type":"tool_call","name":"rm","args":{}}"#,
            r#"{"type":"final","content":"bye"}"#,
        ]);
        let registry = registry();
        let sink = RecordingSink::new();
        ReactLoop::new(&backend, &registry, &sink, steps(4))
            .run("system", "hello", IDS)
            .expect("run");

        use EventKind as K;
        assert_eq!(
            sink.kinds(),
            vec![
                K::RunStarted,
                K::ModelOutput,
                K::ProtocolError,
                K::RepairRequested,
                K::ModelOutput,
                K::ToolCall,
                K::ToolResult,
                K::ModelOutput,
                K::ToolCall,
                K::ToolBlocked,
                K::ModelOutput,
                K::FinalAnswer,
            ]
        );
        let events = sink.events();
        assert!(events.iter().all(|e| e.run_id == "r1" && e.session_id == "s1"));
        assert_eq!(events[9].data["error"], "unknown tool: rm");
    }
}
