use std::collections::HashSet;

use chrono::Utc;

use super::{
    AgentError, InferenceStep, LoopState, Message, PendingApproval, Session, ToolInvocation,
    ToolRegistry,
};

pub(crate) const CANCELLED_MESSAGE: &str = "Operation cancelled by user.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Approve,
    Reject,
}

/// Where control returns to the caller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TurnOutcome {
    /// Parked at the approval gate; call [`Agent::decide`] to continue.
    AwaitingApproval(Vec<ToolInvocation>),
    Completed { reply: String },
}

/// The approval-gated loop. Holds no conversation state of its own; all of it
/// lives in the [`Session`] passed to each call.
pub(crate) struct Agent<'a> {
    registry: &'a ToolRegistry,
    model: &'a dyn InferenceStep,
    system_prompt: String,
}

impl<'a> Agent<'a> {
    pub(crate) fn new(
        registry: &'a ToolRegistry,
        model: &'a dyn InferenceStep,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            model,
            system_prompt: system_prompt.into(),
        }
    }

    pub(crate) fn registry(&self) -> &ToolRegistry {
        self.registry
    }

    /// Start a turn. Runs inference until the model either answers in plain
    /// text or proposes tool calls, which parks the session at the gate.
    pub(crate) fn submit(&self, session: &mut Session, input: &str) -> Result<TurnOutcome, AgentError> {
        if !session.is_ready() {
            return Err(AgentError::Busy);
        }
        session.append(Message::human(input))?;
        tracing::debug!(session = %session.id, "turn started");
        self.inference_step(session)
    }

    /// Resolve the pending batch as a whole.
    pub(crate) fn decide(&self, session: &mut Session, decision: Decision) -> Result<TurnOutcome, AgentError> {
        if session.state != LoopState::AwaitingApproval {
            return Err(AgentError::NoPendingApproval);
        }
        let Some(pending) = session.pending.take() else {
            session.state = LoopState::Idle;
            return Err(AgentError::NoPendingApproval);
        };
        // Nothing runs unless the whole batch answers the last proposal.
        if let Err(err) = session.check_pending(&pending) {
            tracing::error!(session = %session.id, error = %err, "discarding pending batch");
            self.transition(session, LoopState::Idle);
            return Err(err.into());
        }

        match decision {
            Decision::Reject => {
                tracing::info!(
                    session = %session.id,
                    calls = pending.invocations.len(),
                    "batch rejected"
                );
                session.append(Message::assistant(CANCELLED_MESSAGE, Vec::new()))?;
                self.transition(session, LoopState::Terminated);
                Ok(TurnOutcome::Completed {
                    reply: CANCELLED_MESSAGE.to_string(),
                })
            }
            Decision::Approve => {
                self.transition(session, LoopState::Executing);
                for invocation in &pending.invocations {
                    let outcome = self.registry.execute(&invocation.name, &invocation.args);
                    if let Err(err) = session.append(Message::tool_result(invocation, &outcome)) {
                        self.transition(session, LoopState::Idle);
                        return Err(err.into());
                    }
                }
                self.inference_step(session)
            }
        }
    }

    /// History as the model sees it: the system prompt first, unless the
    /// session already opens with one.
    pub(crate) fn inference_messages(&self, session: &Session) -> Vec<Message> {
        let history = session.messages();
        let has_system = matches!(history.first(), Some(Message::System { .. }));
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !has_system && !self.system_prompt.is_empty() {
            messages.push(Message::system(self.system_prompt.clone()));
        }
        messages.extend_from_slice(history);
        messages
    }

    fn inference_step(&self, session: &mut Session) -> Result<TurnOutcome, AgentError> {
        self.transition(session, LoopState::AwaitingInference);
        let messages = self.inference_messages(session);
        let tools = self.registry.definitions();

        let reply = match self.model.infer(&messages, &tools) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(session = %session.id, error = %err, "inference failed");
                let text = format!("Error: {err}");
                session.append(Message::assistant(text.clone(), Vec::new()))?;
                self.transition(session, LoopState::Terminated);
                return Ok(TurnOutcome::Completed { reply: text });
            }
        };

        let calls = unique_call_ids(reply.tool_calls);
        session.append(Message::assistant(reply.content.clone(), calls.clone()))?;
        if calls.is_empty() {
            self.transition(session, LoopState::Terminated);
            return Ok(TurnOutcome::Completed { reply: reply.content });
        }

        session.pending = Some(PendingApproval {
            invocations: calls.clone(),
            requested_at: Utc::now(),
        });
        tracing::info!(
            session = %session.id,
            tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "awaiting approval"
        );
        self.transition(session, LoopState::AwaitingApproval);
        Ok(TurnOutcome::AwaitingApproval(calls))
    }

    fn transition(&self, session: &mut Session, next: LoopState) {
        tracing::debug!(session = %session.id, from = ?session.state, to = ?next, "state transition");
        session.state = next;
    }
}

/// Each invocation in a batch needs its own id to be answered; blank or
/// repeated ids get a fresh one.
fn unique_call_ids(calls: Vec<ToolInvocation>) -> Vec<ToolInvocation> {
    let mut seen = HashSet::new();
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() || !seen.insert(call.id.clone()) {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                seen.insert(call.id.clone());
            }
            call
        })
        .collect()
}
