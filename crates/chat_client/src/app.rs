use std::sync::Arc;

use chat_backend::{Chat, ChatDirectory, ChatId, Message, MessageId, RunStatus};
use chat_session::{
    LoadOutcome, NotificationQueue, Pending, RequestToken, SessionController, SessionPhase,
    SessionView, WriteOutcome,
};

use crate::commands::{parse_slash_command, SlashCommand};

pub const HELP_TEXT: &str =
    "Commands: /help, /open <id>, /close, /chats, /status, /abort, /clear, /quit";
const OPEN_USAGE: &str = "Usage: /open <chat id>";
const INPUT_DISABLED: &str = "The last run failed; input is disabled. Use /open to pick a chat.";

/// What a submitted line started.
///
/// Dropping a pending handle detaches the work; the terminal loop does, tests
/// await it.
#[derive(Debug)]
pub enum Submitted {
    Ignored,
    Printed,
    Load(Pending<LoadOutcome>),
    Write(Pending<WriteOutcome>),
    Exit,
}

/// What the terminal already shows for the current chat.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Printed {
    token: Option<RequestToken>,
    phase: Option<SessionPhase>,
    messages: Vec<MessageId>,
    status: Option<RunStatus>,
}

/// Line-oriented front end over one session.
///
/// Input goes through [`App::on_submit`]; output is pulled with
/// [`App::render`], which prints only what changed since the previous call.
pub struct App {
    session: SessionController,
    host: Arc<NotificationQueue>,
    directory: Option<Arc<dyn ChatDirectory>>,
    printed: Printed,
    outbox: Vec<String>,
    pub should_exit: bool,
}

impl App {
    pub fn new(
        session: SessionController,
        host: Arc<NotificationQueue>,
        directory: Option<Arc<dyn ChatDirectory>>,
    ) -> Self {
        Self {
            session,
            host,
            directory,
            printed: Printed::default(),
            outbox: Vec::new(),
            should_exit: false,
        }
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn on_submit(&mut self, input: &str) -> Submitted {
        let text = input.trim();
        if text.is_empty() {
            return Submitted::Ignored;
        }

        if let Some(command) = parse_slash_command(text) {
            return self.handle_command(command);
        }

        if !self.session.active_chat().is_unset() && !self.session.status().accepts_input() {
            self.print(INPUT_DISABLED);
            return Submitted::Printed;
        }

        Submitted::Write(self.session.send(text))
    }

    /// Shuts the session down and marks the app for exit.
    pub fn quit(&mut self) {
        self.session.shutdown();
        self.should_exit = true;
    }

    /// Lines to print since the previous call: command output, then
    /// notifications, then transcript and status changes.
    pub fn render(&mut self) -> Vec<String> {
        let mut lines = std::mem::take(&mut self.outbox);
        lines.extend(
            self.host
                .drain()
                .into_iter()
                .map(|notification| format!("! {notification}")),
        );

        if !self.should_exit {
            let view = self.session.view();
            self.render_view(&view, &mut lines);
        }
        lines
    }

    fn handle_command(&mut self, command: SlashCommand) -> Submitted {
        match command {
            SlashCommand::Help => {
                self.print(HELP_TEXT);
                Submitted::Printed
            }
            SlashCommand::Open(Some(chat)) => Submitted::Load(self.session.set_active_chat(chat)),
            SlashCommand::Open(None) => {
                self.print(OPEN_USAGE);
                Submitted::Printed
            }
            SlashCommand::Close => Submitted::Load(self.session.set_active_chat(ChatId::UNSET)),
            SlashCommand::Chats => {
                let lines = self.chat_list();
                self.outbox.extend(lines);
                Submitted::Printed
            }
            SlashCommand::Status => {
                let line = self.status_line();
                self.print(line);
                Submitted::Printed
            }
            SlashCommand::Abort => Submitted::Write(self.session.abort()),
            SlashCommand::Clear => Submitted::Write(self.session.clear_transcript()),
            SlashCommand::Quit => {
                self.quit();
                Submitted::Exit
            }
            SlashCommand::Unknown(command) => {
                self.print(format!("Unknown command {command}. Type /help for commands."));
                Submitted::Printed
            }
        }
    }

    fn render_view(&mut self, view: &SessionView, lines: &mut Vec<String>) {
        if self.printed.token != Some(view.token) {
            self.printed = Printed {
                token: Some(view.token),
                ..Printed::default()
            };
            lines.push(chat_header(view));
        }

        match view.phase {
            SessionPhase::Idle => {
                self.printed.phase = Some(SessionPhase::Idle);
                return;
            }
            SessionPhase::Loading => {
                if self.printed.phase != Some(SessionPhase::Loading) {
                    self.printed.phase = Some(SessionPhase::Loading);
                    lines.push("-- loading --".to_string());
                }
                return;
            }
            SessionPhase::Ready => {}
        }

        let first_ready = self.printed.phase != Some(SessionPhase::Ready);
        self.printed.phase = Some(SessionPhase::Ready);

        let extends_printed = view.messages.len() >= self.printed.messages.len()
            && view
                .messages
                .iter()
                .zip(&self.printed.messages)
                .all(|(message, printed)| &message.id == printed);
        if !extends_printed {
            lines.push("-- transcript cleared --".to_string());
            self.printed.messages.clear();
        }

        for message in &view.messages[self.printed.messages.len()..] {
            lines.push(format_message(message));
            self.printed.messages.push(message.id.clone());
        }

        if first_ready && view.messages.is_empty() && !view.sample_messages.is_empty() {
            lines.push("Try one of:".to_string());
            lines.extend(
                view.sample_messages
                    .iter()
                    .map(|sample| format!("  {sample}")),
            );
        }

        if self.printed.status.as_ref() != Some(&view.status) {
            lines.push(format!("-- status: {} --", view.status));
            self.printed.status = Some(view.status.clone());
        }
    }

    fn chat_list(&self) -> Vec<String> {
        let Some(directory) = self.directory.as_ref() else {
            return vec!["No chat catalog is available".to_string()];
        };

        let chats = directory.chats();
        if chats.is_empty() {
            return vec!["No chats yet".to_string()];
        }

        let active = self.session.active_chat();
        chats
            .iter()
            .map(|chat| format_chat_entry(chat, chat.id == active))
            .collect()
    }

    fn status_line(&self) -> String {
        let view = self.session.view();
        if view.chat.is_unset() {
            return "No chat selected".to_string();
        }

        let mut line = format!("chat {}: {}", view.chat, view.status);
        if view.loading {
            line.push_str(" (loading)");
        } else if !self.session.feeds_open() {
            line.push_str(" (live updates off)");
        }
        if view.clearing {
            line.push_str(" (clearing)");
        }
        line
    }

    fn print(&mut self, line: impl Into<String>) {
        self.outbox.push(line.into());
    }
}

fn chat_header(view: &SessionView) -> String {
    if view.chat.is_unset() {
        return "== no chat selected ==".to_string();
    }
    match &view.chat_name {
        Some(name) if !name.is_empty() => format!("== chat {}: {name} ==", view.chat),
        _ => format!("== chat {} ==", view.chat),
    }
}

pub fn format_message(message: &Message) -> String {
    match message.sender.as_deref() {
        Some(sender) if !sender.is_empty() => {
            format!("[{}] {sender}: {}", message.kind, message.content)
        }
        _ => format!("[{}] {}", message.kind, message.content),
    }
}

fn format_chat_entry(chat: &Chat, active: bool) -> String {
    let marker = if active { '*' } else { ' ' };
    let mut line = format!("{marker} {:>5}  {}", chat.id.get(), chat.name);
    if let Some(status) = &chat.status {
        line.push_str(&format!(" [{status}]"));
    }
    line
}

#[cfg(test)]
mod tests {
    use chat_backend::{ChatSource, SenderKind};

    use super::*;

    #[test]
    fn messages_print_kind_sender_and_content() {
        let message = Message::new(1, ChatId::new(4), SenderKind::Assistant, "hello")
            .with_sender("agent");
        assert_eq!(format_message(&message), "[assistant] agent: hello");

        let anonymous = Message::new(2, ChatId::new(4), SenderKind::Tool, "ran tests");
        assert_eq!(format_message(&anonymous), "[tool] ran tests");
    }

    #[test]
    fn chat_entries_mark_the_active_chat() {
        let chat = Chat {
            id: ChatId::new(7),
            name: "Chat for Helpdesk".to_string(),
            source: ChatSource::Project(1),
            status: Some(RunStatus::Running),
            created: None,
            updated: None,
        };

        assert_eq!(
            format_chat_entry(&chat, true),
            "*     7  Chat for Helpdesk [running]"
        );
        assert_eq!(
            format_chat_entry(&chat, false),
            "      7  Chat for Helpdesk [running]"
        );
    }
}
