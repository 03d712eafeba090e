use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Identifier for one chat.
///
/// `-1` is the "no active chat" sentinel carried by hosts before a chat is
/// selected; every other value is treated as a real chat. Rows may carry the
/// id as a number or as its decimal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChatId(i64);

impl ChatId {
    /// Sentinel meaning no chat is selected.
    pub const UNSET: ChatId = ChatId(-1);

    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_unset(self) -> bool {
        self.0 == Self::UNSET.0
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::UNSET
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for ChatId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Integer(i64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Integer(value) => Ok(Self(value)),
            RawId::Text(text) => text
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| de::Error::custom(format!("invalid chat id '{text}'"))),
        }
    }
}

/// Identifier for one transcript row.
///
/// Rows created by the remote store carry numeric ids while optimistic rows
/// carry locally generated text ids; both collapse to the same textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub const LOCAL_PREFIX: &'static str = "local-";

    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a process-unique id for an optimistic row.
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{}{}", Self::LOCAL_PREFIX, Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(Self::LOCAL_PREFIX)
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Integer(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Integer(value) => Self(value.to_string()),
            RawId::Text(value) => Self(value),
        })
    }
}

/// Who authored a transcript row, carried as the row's `type` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SenderKind {
    User,
    Assistant,
    System,
    Tool,
    Other(String),
}

impl SenderKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
            Self::Other(value) => value,
        }
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }
}

impl From<String> for SenderKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "tool" => Self::Tool,
            _ => Self::Other(value),
        }
    }
}

impl From<SenderKind> for String {
    fn from(value: SenderKind) -> Self {
        match value {
            SenderKind::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse run status of the agent attached to a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    #[default]
    Ready,
    Running,
    WaitForHumanInput,
    Completed,
    Aborted,
    Failed,
    Other(String),
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::WaitForHumanInput => "wait_for_human_input",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
            Self::Other(value) => value,
        }
    }

    /// True while the agent is working and the input shows progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// False once the run failed; the input is disabled in that state.
    #[must_use]
    pub fn accepts_input(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ready" => Self::Ready,
            "running" => Self::Running,
            "wait_for_human_input" => Self::WaitForHumanInput,
            "completed" => Self::Completed,
            "aborted" => Self::Aborted,
            "failed" => Self::Failed,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for RunStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        match value {
            RunStatus::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transcript row as stored in `chat_messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    #[serde(rename = "type")]
    pub kind: SenderKind,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl Message {
    #[must_use]
    pub fn new(
        id: impl Into<MessageId>,
        chat_id: ChatId,
        kind: SenderKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            chat_id,
            kind,
            sender: None,
            content: content.into(),
            created: None,
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    #[must_use]
    pub fn with_created(mut self, created: impl Into<String>) -> Self {
        self.created = Some(created.into());
        self
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Where a chat was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChatSourceWire", into = "ChatSourceWire")]
pub enum ChatSource {
    Project(i64),
    Template(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatSourceWire {
    #[serde(default, alias = "source_type", skip_serializing_if = "Option::is_none")]
    from_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_project: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_template: Option<i64>,
}

impl TryFrom<ChatSourceWire> for ChatSource {
    type Error = String;

    fn try_from(wire: ChatSourceWire) -> Result<Self, Self::Error> {
        match (wire.from_type.as_deref(), wire.from_project, wire.from_template) {
            (Some("project") | None, Some(id), _) => Ok(Self::Project(id)),
            (Some("template") | None, _, Some(id)) => Ok(Self::Template(id)),
            (Some(other), _, _) if other != "project" && other != "template" => {
                Err(format!("unsupported chat source type '{other}'"))
            }
            _ => Err("chat row has no project or template source".to_string()),
        }
    }
}

impl From<ChatSource> for ChatSourceWire {
    fn from(source: ChatSource) -> Self {
        match source {
            ChatSource::Project(id) => Self {
                from_type: Some("project".to_string()),
                from_project: Some(id),
                from_template: None,
            },
            ChatSource::Template(id) => Self {
                from_type: Some("template".to_string()),
                from_project: None,
                from_template: Some(id),
            },
        }
    }
}

/// Chat metadata owned by the external CRUD collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub source: ChatSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}
