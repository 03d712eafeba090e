use chat_backend::ChatId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    /// `None` when the argument is missing or not a chat id.
    Open(Option<ChatId>),
    Close,
    Chats,
    Status,
    Abort,
    Clear,
    Quit,
    Unknown(String),
}

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut words = trimmed.split_whitespace();
    let command = words.next().unwrap_or(trimmed).to_string();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/open" => SlashCommand::Open(
            words
                .next()
                .and_then(|value| value.parse::<i64>().ok())
                .map(ChatId::new)
                .filter(|chat| !chat.is_unset()),
        ),
        "/close" => SlashCommand::Close,
        "/chats" => SlashCommand::Chats,
        "/status" => SlashCommand::Status,
        "/abort" => SlashCommand::Abort,
        "/clear" => SlashCommand::Clear,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
