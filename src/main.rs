use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use sleepwell_relay::backend::{ChatBackend, HttpBackend, Registration, SessionStore};
use sleepwell_relay::common::{CallStatus, RelayEvent, SenderRole};
use sleepwell_relay::config::{self, AppConfig};
use sleepwell_relay::console::{ConsoleState, HELP, InputAction, parse_line, render};
use sleepwell_relay::relay::{
    CallRelay, MessageRepository, RelayService, UnreadCounter, group_by_user, join_url,
};
use sleepwell_relay::storage::{CallFilter, DocumentStore, MessageFilter, ensure_parent_dir};
use sleepwell_relay::{RelayError, RelayResult};

#[derive(Parser)]
#[command(
    name = "sleepwell-relay",
    version,
    about = "Support chat and video-call relay for Sleepwell"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and keep the bearer token for later commands
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Check the stored token with the backend
    Whoami,
    Logout,
    /// Write a message into a user's conversation
    Send {
        /// Conversation key (the user's id)
        #[arg(long)]
        user: String,
        /// Defaults to the logged-in user, then to --user
        #[arg(long)]
        sender: Option<String>,
        #[arg(long, default_value = "user")]
        role: SenderRole,
        text: String,
    },
    /// Follow one conversation, or all of them, until Ctrl-C
    Watch {
        #[arg(long)]
        user: Option<String>,
    },
    /// Print every thread as the operator sees it
    Threads,
    /// Delete a message by id
    Delete { id: String },
    Call {
        #[command(subcommand)]
        action: CallAction,
    },
    /// Poll the unread count once
    Unread,
    MarkRead,
    /// Interactive operator console
    Console {
        /// Id used to sign replies
        #[arg(long)]
        operator: Option<String>,
    },
}

#[derive(Subcommand)]
enum CallAction {
    Request {
        #[arg(long)]
        user: String,
        #[arg(long)]
        name: String,
    },
    Accept {
        id: String,
        /// Display name used in the conference link
        #[arg(long, default_value = "Sleepwell expert")]
        name: String,
    },
    Reject { id: String },
    /// Waiting requests, or all with --all
    List {
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config);

    match run(cli.command, app_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_auth() => {
            eprintln!("Not logged in or session rejected ({err}); run `login` again");
            ExitCode::FAILURE
        }
        Err(err) => {
            log::error!("{err}");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: AppConfig) -> RelayResult<()> {
    match command {
        Command::Login { email, password } => {
            let session = http_backend(&config)?.login(&email, &password).await?;
            println!(
                "Logged in{}",
                session
                    .user_id
                    .map(|id| format!(" as {id}"))
                    .unwrap_or_default()
            );
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            http_backend(&config)?
                .register(&Registration {
                    name,
                    email,
                    password,
                })
                .await?;
            println!("Registered; run `login` to start a session");
        }
        Command::Whoami => {
            let user = http_backend(&config)?.verify().await?;
            println!(
                "{} {} {}",
                user.id,
                user.name.unwrap_or_default(),
                user.email.unwrap_or_default()
            );
        }
        Command::Logout => {
            http_backend(&config)?.logout();
            println!("Logged out");
        }
        Command::Send {
            user,
            sender,
            role,
            text,
        } => {
            let backend = http_backend(&config)?;
            let sender = sender
                .or_else(|| backend.session().current().and_then(|s| s.user_id))
                .unwrap_or_else(|| user.clone());
            let messages = MessageRepository::new(open_store(&config)?);
            let message = messages.send(&user, &sender, role, &text)?;
            println!("Sent {}", message.id);
            backend.notify_message(&message).await?;
        }
        Command::Watch { user } => {
            let filter = user.map_or(MessageFilter::All, MessageFilter::Conversation);
            let messages = MessageRepository::new(open_store(&config)?);
            let subscription = messages.subscribe(filter, |snapshot| {
                println!("--- {} message(s)", snapshot.len());
                for message in &snapshot {
                    println!("{}", render::message_line(message));
                }
            });
            tokio::signal::ctrl_c().await?;
            subscription.release();
        }
        Command::Threads => {
            let messages = MessageRepository::new(open_store(&config)?);
            let threads = group_by_user(messages.list(&MessageFilter::All)?);
            if threads.is_empty() {
                println!("No conversations");
            }
            for thread in &threads {
                println!("{}", render::conversation_line(thread));
                for message in &thread.messages {
                    println!("    {}", render::message_line(message));
                }
            }
        }
        Command::Delete { id } => {
            MessageRepository::new(open_store(&config)?).delete(&id)?;
            println!("Deleted {id}");
        }
        Command::Call { action } => run_call(action, &config).await?,
        Command::Unread => {
            let counter = UnreadCounter::new(Arc::new(http_backend(&config)?));
            println!("{} unread", counter.poll().await?);
        }
        Command::MarkRead => {
            let counter = UnreadCounter::new(Arc::new(http_backend(&config)?));
            counter.mark_all_read().await?;
            println!("0 unread");
        }
        Command::Console { operator } => {
            let backend = http_backend(&config)?;
            let operator = operator
                .or_else(|| backend.session().current().and_then(|s| s.user_id))
                .unwrap_or_else(|| "expert".to_string());
            run_console(config.clone(), open_store(&config)?, Arc::new(backend), operator).await?;
        }
    }
    Ok(())
}

async fn run_call(action: CallAction, config: &AppConfig) -> RelayResult<()> {
    let calls = CallRelay::new(open_store(config)?, config.accept_grace(), config.reject_grace());

    match action {
        CallAction::Request { user, name } => {
            let request = calls.request_call(&user, &name)?;
            println!("Call request {} waiting", request.id);
            println!(
                "Join: {}",
                join_url(&config.conference_base_url, &request, &name)?
            );
            http_backend(config)?.notify_video_call(&request).await?;
        }
        CallAction::Accept { id, name } => {
            let request = calls.accept(&id)?;
            println!(
                "Accepted. Join: {}",
                join_url(&config.conference_base_url, &request, &name)?
            );
            log::info!("Removing request after {:?}", config.accept_grace());
            calls.drain().await;
        }
        CallAction::Reject { id } => {
            calls.reject(&id)?;
            println!("Rejected {id}");
            calls.drain().await;
        }
        CallAction::List { all } => {
            let filter = if all {
                CallFilter::All
            } else {
                CallFilter::Status(CallStatus::Waiting)
            };
            let requests = calls.list(filter)?;
            if requests.is_empty() {
                println!("No call requests");
            }
            for request in &requests {
                println!("{} [{}]", render::call_line(request), request.status);
            }
        }
    }
    Ok(())
}

async fn run_console(
    config: AppConfig,
    store: Arc<DocumentStore>,
    backend: Arc<dyn ChatBackend>,
    operator: String,
) -> RelayResult<()> {
    // 1. Kênh giao tiếp: console -> relay, relay -> console
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    let (event_tx, mut event_rx) = mpsc::channel(100);

    // 2. Relay service chạy ngầm
    let service = RelayService::new(store, backend, &config, event_tx, cmd_rx);
    let mut views = service.views();
    let service_task = tokio::spawn(service.run());

    // 3. Vòng lặp console
    let mut state = ConsoleState::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => match parse_line(&line, &operator) {
                    Ok(Some(InputAction::Command(command))) => {
                        if let Err(err) = cmd_tx.send(command).await {
                            log::error!("Relay service is gone: {err}");
                            break;
                        }
                    }
                    Ok(Some(InputAction::Help)) => println!("{HELP}"),
                    Ok(Some(InputAction::Quit)) => break,
                    Ok(None) => {}
                    Err(usage) => eprintln!("{usage}"),
                },
                None => break,
            },
            event = event_rx.recv() => match event {
                Some(event) => {
                    if let RelayEvent::CallStatusChanged(request) = &event {
                        if request.status == CallStatus::Accepted {
                            match join_url(&config.conference_base_url, request, &operator) {
                                Ok(url) => println!("Join: {url}"),
                                Err(err) => log::warn!("No join link for {}: {err}", request.id),
                            }
                        }
                    }
                    if state.apply(event) {
                        for alert in state.take_alerts() {
                            eprintln!("!! {alert}");
                        }
                        print!("{}", render::render(&state));
                    }
                }
                None => break,
            },
            changed = views.conversations.changed() => {
                if changed.is_err() {
                    break;
                }
                let conversations = views.conversations.borrow_and_update().clone();
                state.show_conversations(conversations);
                print!("{}", render::render(&state));
            },
            changed = views.waiting_calls.changed() => {
                if changed.is_err() {
                    break;
                }
                let calls = views.waiting_calls.borrow_and_update().clone();
                state.show_waiting_calls(calls);
                print!("{}", render::render(&state));
            },
        }
    }

    drop(cmd_tx);
    drop(event_rx);
    if let Err(err) = service_task.await {
        log::error!("Relay service task failed: {err}");
    }
    Ok(())
}

fn http_backend(config: &AppConfig) -> RelayResult<HttpBackend> {
    let session = Arc::new(SessionStore::load(&config.session_path));
    HttpBackend::new(&config.api_base_url, session)
}

fn open_store(config: &AppConfig) -> RelayResult<Arc<DocumentStore>> {
    let path = Path::new(&config.database_path);
    ensure_parent_dir(path)?;
    DocumentStore::open(path)
        .map(Arc::new)
        .map_err(RelayError::from)
}
