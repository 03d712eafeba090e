use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use catalog_store::{CatalogStore, SharedCatalog};
use chat_client::app::{App, HELP_TEXT};
use chat_client::backends;
use chat_client::ClientError;
use chat_session::logging::init_tracing;
use chat_session::{EnvConfig, NotificationQueue, SessionController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> ExitCode {
    let env = EnvConfig::from_env();
    init_tracing(env.log_filter.as_deref());

    match run(env).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("agent-chat: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(env: EnvConfig) -> Result<(), ClientError> {
    let backend = backends::backend_from_env()?;
    let home = match env.home.clone() {
        Some(home) => home,
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let catalog = Arc::new(SharedCatalog::new(CatalogStore::open_in(&home)?));
    backend.sync_catalog(&catalog).await;

    let mut config = env.session_config();
    if env.user.is_none() {
        if let Some(user) = backend.user.clone() {
            config = config.with_user_identity(user);
        }
    }
    tracing::debug!(backend = backend.id, user = %config.user_identity, "starting chat client");

    let host = Arc::new(NotificationQueue::new());
    let session = SessionController::new_with_directory(
        Handle::current(),
        Arc::clone(&backend.remote),
        Arc::clone(&backend.feeds),
        Arc::clone(&host) as _,
        config,
        Arc::clone(&catalog) as _,
    );
    let mut app = App::new(session, Arc::clone(&host), Some(catalog as _));

    let mut stdout = io::stdout();
    print_lines(&mut stdout, &[HELP_TEXT.to_string()])?;
    print_lines(&mut stdout, &app.render())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !app.should_exit {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    app.on_submit(&line);
                }
                Ok(None) => app.quit(),
                Err(error) => {
                    app.quit();
                    return Err(error.into());
                }
            },
            () = host.changed() => {}
        }
        print_lines(&mut stdout, &app.render())?;
    }

    Ok(())
}

fn print_lines(stdout: &mut io::Stdout, lines: &[String]) -> io::Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    let mut out = stdout.lock();
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}
