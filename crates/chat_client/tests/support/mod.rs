#![allow(dead_code)]

use std::sync::Arc;

use chat_backend::{Chat, ChatId, ChatSource, Message, SenderKind};
use chat_backend_mock::{MockFeedHub, MockRemote, StaticDirectory};
use chat_client::app::{App, Submitted};
use chat_session::{LoadOutcome, NotificationQueue, SessionConfig, SessionController, WriteOutcome};
use tokio::runtime::Handle;

pub const HELPDESK: ChatId = ChatId::new(42);
pub const RELEASES: ChatId = ChatId::new(43);

pub struct Client {
    pub remote: Arc<MockRemote>,
    pub hub: Arc<MockFeedHub>,
    pub app: App,
}

impl Client {
    pub fn new() -> Self {
        Self::build(MockRemote::new())
    }

    pub fn with_agent(prefix: &str) -> Self {
        Self::build(MockRemote::new().with_agent_reply(prefix))
    }

    fn build(remote: MockRemote) -> Self {
        let hub = Arc::new(MockFeedHub::new());
        let remote = Arc::new(remote.with_hub(Arc::clone(&hub)));
        let directory = Arc::new(
            StaticDirectory::new(vec![
                chat(HELPDESK, "Chat for Helpdesk"),
                chat(RELEASES, "Chat for Release notes"),
            ])
            .with_samples(RELEASES, vec!["Summarize the last release".to_string()]),
        );
        let host = Arc::new(NotificationQueue::new());
        let session = SessionController::new_with_directory(
            Handle::current(),
            Arc::clone(&remote) as _,
            Arc::clone(&hub) as _,
            Arc::clone(&host) as _,
            SessionConfig::default(),
            Arc::clone(&directory) as _,
        );

        Self {
            remote,
            hub,
            app: App::new(session, host, Some(directory as _)),
        }
    }

    /// Submits `line` and waits for the work it started.
    pub async fn submit(&mut self, line: &str) -> Vec<String> {
        match self.app.on_submit(line) {
            Submitted::Load(pending) => {
                let outcome = pending.wait().await;
                assert!(matches!(outcome, Some(LoadOutcome::Ready | LoadOutcome::Idle)));
            }
            Submitted::Write(pending) => {
                let _: Option<WriteOutcome> = pending.wait().await;
            }
            Submitted::Ignored | Submitted::Printed | Submitted::Exit => {}
        }
        self.app.render()
    }
}

pub fn chat(id: ChatId, name: &str) -> Chat {
    Chat {
        id,
        name: name.to_string(),
        source: ChatSource::Project(1),
        status: None,
        created: None,
        updated: None,
    }
}

pub fn agent(id: i64, chat: ChatId, content: &str) -> Message {
    Message::new(id, chat, SenderKind::Assistant, content).with_sender("agent")
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
