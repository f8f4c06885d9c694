use std::io::{self, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use super::{
    Agent, AgentError, Decision, Message, Session, SessionArchive, SessionStatus, ToolInvocation,
    TurnOutcome, save_session, truncate_chars,
};

/// One read from the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Input {
    Line(String),
    Interrupted,
    Eof,
}

pub(crate) trait LineReader {
    fn read(&mut self, prompt: &str) -> io::Result<Input>;
    fn remember(&mut self, _line: &str) {}
}

pub(crate) struct EditorReader {
    editor: DefaultEditor,
}

impl EditorReader {
    pub(crate) fn new() -> io::Result<Self> {
        let editor = DefaultEditor::new().map_err(io::Error::other)?;
        Ok(Self { editor })
    }
}

impl LineReader for EditorReader {
    fn read(&mut self, prompt: &str) -> io::Result<Input> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Input::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(ReadlineError::Io(err)) => Err(err),
            Err(err) => Err(io::Error::other(err)),
        }
    }

    fn remember(&mut self, line: &str) {
        let _ = self.editor.add_history_entry(line);
    }
}

/// Why the loop stopped.
enum Exit {
    Quit,
    Interrupted,
}

pub(crate) struct Console<'a, W: Write> {
    agent: &'a Agent<'a>,
    archive: Option<&'a dyn SessionArchive>,
    out: W,
}

impl<'a, W: Write> Console<'a, W> {
    pub(crate) fn new(agent: &'a Agent<'a>, archive: Option<&'a dyn SessionArchive>, out: W) -> Self {
        Self { agent, archive, out }
    }

    #[cfg(test)]
    pub(crate) fn into_output(self) -> W {
        self.out
    }

    /// Drive `session` until the operator quits. A panic anywhere inside is
    /// caught so the history can still be archived as interrupted.
    pub(crate) fn run(&mut self, reader: &mut dyn LineReader, session: &mut Session) -> io::Result<SessionStatus> {
        let result = catch_unwind(AssertUnwindSafe(|| self.run_loop(reader, session)));
        match result {
            Ok(Ok(Exit::Quit)) => {
                self.finish(session, SessionStatus::Completed)?;
                writeln!(self.out, "Goodbye!")?;
                Ok(SessionStatus::Completed)
            }
            Ok(Ok(Exit::Interrupted)) => {
                self.finish(session, SessionStatus::Interrupted)?;
                writeln!(self.out, "\nSession interrupted.")?;
                Ok(SessionStatus::Interrupted)
            }
            Ok(Err(err)) => {
                self.finish_interrupted(session);
                Err(err)
            }
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                tracing::error!(session = %session.id, panic = %msg, "console loop panicked");
                self.finish_interrupted(session);
                Err(io::Error::other(format!("session aborted: {msg}")))
            }
        }
    }

    fn run_loop(&mut self, reader: &mut dyn LineReader, session: &mut Session) -> io::Result<Exit> {
        self.banner(session)?;
        if let Some(pending) = session.pending.clone() {
            writeln!(self.out, "This session was waiting for your approval.")?;
            if self.approval_round(reader, session, pending.invocations)?.is_none() {
                return Ok(Exit::Interrupted);
            }
        }

        loop {
            let line = match reader.read("You: ")? {
                Input::Line(line) => line,
                Input::Interrupted | Input::Eof => return Ok(Exit::Interrupted),
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            reader.remember(input);

            match input.to_ascii_lowercase().as_str() {
                "quit" | "exit" => return Ok(Exit::Quit),
                "new" => {
                    self.finish(session, SessionStatus::Completed)?;
                    *session = Session::new();
                    writeln!(self.out, "Started new session {}", session.id)?;
                    continue;
                }
                "history" => {
                    self.print_history(session)?;
                    continue;
                }
                _ => {}
            }

            let outcome = self.agent.submit(session, input);
            if self.drive(reader, session, outcome)?.is_none() {
                return Ok(Exit::Interrupted);
            }
        }
    }

    /// Follow a turn to completion, asking for approval at every halt.
    /// `None` means the operator bailed out at an approval prompt.
    fn drive(
        &mut self,
        reader: &mut dyn LineReader,
        session: &mut Session,
        outcome: Result<TurnOutcome, AgentError>,
    ) -> io::Result<Option<()>> {
        match outcome {
            Ok(TurnOutcome::Completed { reply }) => {
                writeln!(self.out, "Assistant: {reply}")?;
                self.checkpoint(session)?;
                Ok(Some(()))
            }
            Ok(TurnOutcome::AwaitingApproval(calls)) => self.approval_round(reader, session, calls),
            Err(err) => {
                writeln!(self.out, "Error: {err}")?;
                Ok(Some(()))
            }
        }
    }

    fn approval_round(
        &mut self,
        reader: &mut dyn LineReader,
        session: &mut Session,
        calls: Vec<ToolInvocation>,
    ) -> io::Result<Option<()>> {
        let mut calls = calls;
        loop {
            self.checkpoint(session)?;
            self.print_proposal(session, &calls)?;
            let Some(decision) = self.ask_decision(reader)? else {
                return Ok(None);
            };
            match self.agent.decide(session, decision) {
                Ok(TurnOutcome::AwaitingApproval(next)) => calls = next,
                other => return self.drive(reader, session, other),
            }
        }
    }

    fn ask_decision(&mut self, reader: &mut dyn LineReader) -> io::Result<Option<Decision>> {
        loop {
            let answer = match reader.read("Approve? (yes/no): ")? {
                Input::Line(line) => line,
                Input::Interrupted | Input::Eof => return Ok(None),
            };
            match answer.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" => return Ok(Some(Decision::Approve)),
                "no" | "n" => return Ok(Some(Decision::Reject)),
                _ => writeln!(self.out, "Please answer yes or no.")?,
            }
        }
    }

    fn print_proposal(&mut self, session: &Session, calls: &[ToolInvocation]) -> io::Result<()> {
        let intro = session
            .messages()
            .last()
            .map(Message::content)
            .filter(|c| !c.trim().is_empty());
        if let Some(text) = intro {
            writeln!(self.out, "Assistant: {text}")?;
        }
        writeln!(self.out, "Proposed actions ({}):", calls.len())?;
        for (i, call) in calls.iter().enumerate() {
            let mutating = self
                .agent
                .registry()
                .lookup(&call.name)
                .is_some_and(|tool| tool.mutating);
            let marker = if mutating { " [modifies]" } else { "" };
            writeln!(self.out, "  {}. {}{marker} {}", i + 1, call.name, call.args)?;
        }
        Ok(())
    }

    fn print_history(&mut self, session: &Session) -> io::Result<()> {
        if session.total_messages() == 0 {
            writeln!(self.out, "(no messages yet)")?;
            return Ok(());
        }
        write_transcript(&mut self.out, session.messages())
    }

    fn banner(&mut self, session: &Session) -> io::Result<()> {
        writeln!(self.out, "Deskmate session {}", session.id)?;
        writeln!(
            self.out,
            "Ask about your files or email. Commands: history, new, quit."
        )?;
        Ok(())
    }

    /// Mid-session save; the status stays active.
    fn checkpoint(&mut self, session: &Session) -> io::Result<()> {
        self.save(session)
    }

    fn finish(&mut self, session: &mut Session, status: SessionStatus) -> io::Result<()> {
        session.end(status);
        self.save(session)
    }

    /// For paths that already carry an error; a failure here is only logged.
    fn finish_interrupted(&mut self, session: &mut Session) {
        if let Err(err) = self.finish(session, SessionStatus::Interrupted) {
            tracing::error!(session = %session.id, error = %err, "failed to record interrupted session");
        }
    }

    fn save(&mut self, session: &Session) -> io::Result<()> {
        let Some(archive) = self.archive else {
            return Ok(());
        };
        if let Err(err) = save_session(archive, session) {
            tracing::warn!(session = %session.id, error = %err, "failed to archive session");
            writeln!(self.out, "Warning: could not archive session: {err}")?;
        }
        Ok(())
    }
}

pub(crate) fn write_transcript(out: &mut impl Write, messages: &[Message]) -> io::Result<()> {
    for message in messages {
        let stamp = message.timestamp().format("%H:%M:%S");
        match message {
            Message::ToolResult { tool_name, content, .. } => {
                writeln!(out, "[{stamp}] tool {tool_name}: {}", truncate_chars(content, 200))?;
            }
            other => {
                writeln!(out, "[{stamp}] {}: {}", other.kind(), other.content())?;
                for call in other.tool_calls() {
                    writeln!(out, "           -> {} {}", call.name, call.args)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{ScriptedModel, propose, registry_in, text};
    use crate::{ArchiveError, LoopState, SessionDocument, SessionSummary, SqliteArchive};
    use serde_json::json;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Input>);

    impl Scripted {
        fn lines(lines: &[&str]) -> Self {
            Self(lines.iter().map(|l| Input::Line(l.to_string())).collect())
        }

        fn then(mut self, input: Input) -> Self {
            self.0.push_back(input);
            self
        }
    }

    impl LineReader for Scripted {
        fn read(&mut self, _prompt: &str) -> io::Result<Input> {
            Ok(self.0.pop_front().unwrap_or(Input::Eof))
        }
    }

    struct BrokenReader;

    impl LineReader for BrokenReader {
        fn read(&mut self, _prompt: &str) -> io::Result<Input> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "terminal went away"))
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct ReadOnlyArchive;

    impl SessionArchive for ReadOnlyArchive {
        fn save(&self, _doc: &SessionDocument) -> Result<(), ArchiveError> {
            Err(ArchiveError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "read-only")))
        }

        fn load(&self, _session_id: &str) -> Result<Option<SessionDocument>, ArchiveError> {
            Ok(None)
        }

        fn list(&self, _limit: usize) -> Result<Vec<SessionSummary>, ArchiveError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn read_error_still_marks_session_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        let model = ScriptedModel::new(Vec::new());
        let agent = Agent::new(&registry, &model, "sys");
        let archive = ReadOnlyArchive;
        let mut session = Session::new();

        let mut console = Console::new(&agent, Some(&archive), Vec::new());
        let err = console.run(&mut BrokenReader, &mut session).unwrap_err();
        let out = String::from_utf8(console.into_output()).unwrap();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(session.status, SessionStatus::Interrupted);
        assert!(session.ended_at.is_some());
        assert!(out.contains("Warning: could not archive session"));
    }

    #[test]
    fn failed_interrupted_save_keeps_the_original_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        let model = ScriptedModel::new(Vec::new());
        let agent = Agent::new(&registry, &model, "sys");
        let archive = ReadOnlyArchive;
        let mut session = Session::new();

        // The banner write fails first; the archive warning then fails too.
        let mut console = Console::new(&agent, Some(&archive), BrokenWriter);
        let err = console.run(&mut Scripted::lines(&["hi"]), &mut session).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(session.status, SessionStatus::Interrupted);
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn approve_then_quit_archives_completed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        let model = ScriptedModel::new(vec![
            Ok(propose(vec![(
                "c1",
                "create_file_tool",
                json!({"filename": "notes.txt", "path": "desktop", "content": "hello"}),
            )])),
            Ok(text("Created notes.txt.")),
        ]);
        let agent = Agent::new(&registry, &model, "sys");
        let archive = SqliteArchive::in_memory().unwrap();
        let mut session = Session::new();
        let mut reader = Scripted::lines(&["create notes.txt on desktop", "maybe", "y", "quit"]);

        let mut console = Console::new(&agent, Some(&archive), Vec::new());
        let status = console.run(&mut reader, &mut session).unwrap();
        let out = String::from_utf8(console.into_output()).unwrap();

        assert_eq!(status, SessionStatus::Completed);
        assert!(out.contains("create_file_tool [modifies]"));
        assert!(out.contains("Please answer yes or no."));
        assert!(out.contains("Assistant: Created notes.txt."));
        assert!(dir.path().join("Desktop/notes.txt").exists());

        let doc = archive.load(&session.id).unwrap().unwrap();
        assert_eq!(doc.status, SessionStatus::Completed);
        assert_eq!(doc.total_messages, 4);
        assert!(doc.session_end.is_some());
    }

    #[test]
    fn ctrl_c_at_approval_keeps_pending_batch() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        let model = ScriptedModel::new(vec![Ok(propose(vec![(
            "c1",
            "delete_file_tool",
            json!({"file_path": "a.txt"}),
        )]))]);
        let agent = Agent::new(&registry, &model, "sys");
        let archive = SqliteArchive::in_memory().unwrap();
        let mut session = Session::new();
        let mut reader = Scripted::lines(&["delete a.txt"]).then(Input::Interrupted);

        let mut console = Console::new(&agent, Some(&archive), Vec::new());
        let status = console.run(&mut reader, &mut session).unwrap();
        assert_eq!(status, SessionStatus::Interrupted);

        let doc = archive.load(&session.id).unwrap().unwrap();
        assert_eq!(doc.status, SessionStatus::Interrupted);
        let restored = Session::from_document(doc).unwrap();
        assert_eq!(restored.state, LoopState::AwaitingApproval);
    }

    #[test]
    fn reject_prints_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        let model = ScriptedModel::new(vec![Ok(propose(vec![(
            "c1",
            "send_email_tool",
            json!({"to": "a@b.c", "subject": "hi", "body": "x"}),
        )]))]);
        let agent = Agent::new(&registry, &model, "sys");
        let mut session = Session::new();
        let mut reader = Scripted::lines(&["email a@b.c", "no", "exit"]);

        let mut console = Console::new(&agent, None, Vec::new());
        console.run(&mut reader, &mut session).unwrap();
        let out = String::from_utf8(console.into_output()).unwrap();
        assert!(out.contains("Assistant: Operation cancelled by user."));
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn new_command_archives_and_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        let model = ScriptedModel::new(vec![Ok(text("hi")), Ok(text("hello again"))]);
        let agent = Agent::new(&registry, &model, "sys");
        let archive = SqliteArchive::in_memory().unwrap();
        let mut session = Session::new();
        let first_id = session.id.clone();
        let mut reader = Scripted::lines(&["hello", "new", "hello", "history"]);

        let mut console = Console::new(&agent, Some(&archive), Vec::new());
        let status = console.run(&mut reader, &mut session).unwrap();
        let out = String::from_utf8(console.into_output()).unwrap();

        assert_eq!(status, SessionStatus::Interrupted);
        assert_ne!(session.id, first_id);
        assert_eq!(archive.count().unwrap(), 2);
        assert_eq!(
            archive.load(&first_id).unwrap().unwrap().status,
            SessionStatus::Completed
        );
        assert!(out.contains("human: hello"));
        assert!(out.contains("ai: hello again"));
    }

    #[test]
    fn resumed_session_asks_for_pending_approval_first() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        let model = ScriptedModel::new(vec![Ok(text("Made it."))]);
        let agent = Agent::new(&registry, &model, "sys");

        let mut session = Session::new();
        let mut reader = Scripted::lines(&["yes", "quit"]);
        let call = ToolInvocation {
            id: "c1".into(),
            name: "create_folder_tool".into(),
            args: json!({"folder_name": "x", "path": "desktop"}),
        };
        session.append(Message::human("make folder x")).unwrap();
        session.append(Message::assistant("", vec![call.clone()])).unwrap();
        session.pending = Some(crate::PendingApproval {
            invocations: vec![call],
            requested_at: chrono::Utc::now(),
        });
        session.state = LoopState::AwaitingApproval;

        let mut console = Console::new(&agent, None, Vec::new());
        console.run(&mut reader, &mut session).unwrap();
        assert!(dir.path().join("Desktop/x").is_dir());
        assert_eq!(session.last_assistant_text(), Some("Made it."));
    }
}
