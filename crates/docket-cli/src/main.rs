use clap::{ArgAction, Parser, Subcommand};
use docket_chat::{ChatState, ConversationService, SessionError, build_intake_graph};
use docket_graph::{Checkpoint, CheckpointStatus, EngineConfig, Message};
use docket_store::{CheckpointStore, FsCheckpointStore, SharedCheckpointStore};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docket-cli")]
#[command(about = "Operator CLI for checkpointed conversations")]
struct Cli {
    /// Directory holding one checkpoint file per conversation.
    #[arg(long, env = "DOCKET_STATE_DIR", default_value = ".docket", global = true)]
    state_dir: PathBuf,
    #[arg(long, env = "DOCKET_LOG_JSON", action = ArgAction::SetTrue, global = true)]
    log_json: bool,
    #[arg(long, env = "DOCKET_MAX_STEPS", global = true)]
    max_steps: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a conversation or answer its pending question.
    Send(SendArgs),
    History(ConversationArgs),
    Status(ConversationArgs),
    /// Print the raw checkpoint record.
    Inspect(ConversationArgs),
    Delete(ConversationArgs),
    List,
}

#[derive(clap::Args, Debug)]
struct SendArgs {
    #[arg(long)]
    conversation: String,
    #[arg(long)]
    text: String,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ConversationArgs {
    #[arg(long)]
    conversation: String,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn init_tracing(json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json_output {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{0}")]
    Other(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Session(error) if error.is_client_error() => 2,
            _ => 1,
        }
    }
}

fn other<E: std::fmt::Display>(error: E) -> CliError {
    CliError::Other(error.to_string())
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    tracing::debug!(state_dir = %cli.state_dir.display(), "opening checkpoint store");
    let store: SharedCheckpointStore = Arc::new(FsCheckpointStore::new(&cli.state_dir).map_err(other)?);
    let mut engine = EngineConfig::default();
    if let Some(max_steps) = cli.max_steps {
        engine.max_steps_per_invocation = max_steps;
    }

    match cli.command {
        Commands::Send(args) => {
            let service = intake_service(Arc::clone(&store), engine)?;
            let reply = service
                .process_message(&args.conversation, &args.text)
                .await?;
            print_chat_state(&reply, args.json)?;
        }
        Commands::History(args) => {
            let service = intake_service(Arc::clone(&store), engine)?;
            let state = service.get_state(&args.conversation).await?;
            print_chat_state(&state, args.json)?;
        }
        Commands::Status(args) => {
            let service = intake_service(Arc::clone(&store), engine)?;
            let state = service.get_state(&args.conversation).await?;
            if args.json {
                println!(
                    "{}",
                    json!({
                        "conversation_id": args.conversation,
                        "is_ended": state.is_ended,
                        "is_successful": state.is_successful,
                        "messages": state.messages.len(),
                    })
                );
            } else {
                println!("conversation_id: {}", args.conversation);
                println!("ended: {}", state.is_ended);
                println!("successful: {}", state.is_successful);
                println!("messages: {}", state.messages.len());
            }
        }
        Commands::Inspect(args) => inspect(store.as_ref(), &args).await?,
        Commands::Delete(args) => {
            let removed = store.delete(&args.conversation).await.map_err(other)?;
            if !removed {
                return Err(CliError::Other(format!(
                    "no checkpoint for conversation '{}'",
                    args.conversation
                )));
            }
            println!("deleted: {}", args.conversation);
        }
        Commands::List => {
            for conversation_id in store.list_conversations().await.map_err(other)? {
                println!("{conversation_id}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn intake_service(
    store: SharedCheckpointStore,
    engine: EngineConfig,
) -> Result<ConversationService, CliError> {
    let graph = build_intake_graph().map_err(other)?;
    Ok(ConversationService::new(graph, store, engine))
}

async fn inspect(store: &dyn CheckpointStore, args: &ConversationArgs) -> Result<(), CliError> {
    let stored = store
        .load(&args.conversation)
        .await
        .map_err(other)?
        .ok_or_else(|| {
            CliError::Session(SessionError::NotFound {
                conversation_id: args.conversation.clone(),
            })
        })?;
    let content_hash = stored.content_hash.clone();
    let checkpoint = Checkpoint::from_stored(stored).map_err(other)?;

    if args.json {
        let value = json!({
            "conversation_id": checkpoint.conversation_id,
            "version": checkpoint.version,
            "created_at": checkpoint.created_at.to_rfc3339(),
            "updated_at": checkpoint.updated_at.to_rfc3339(),
            "content_hash": content_hash,
            "status": checkpoint.status,
            "state": checkpoint.state,
        });
        let text = serde_json::to_string_pretty(&value).map_err(other)?;
        println!("{text}");
        return Ok(());
    }

    println!("conversation_id: {}", checkpoint.conversation_id);
    println!("version: {}", checkpoint.version);
    println!("created_at: {}", checkpoint.created_at.to_rfc3339());
    println!("updated_at: {}", checkpoint.updated_at.to_rfc3339());
    println!("content_hash: {content_hash}");
    match &checkpoint.status {
        CheckpointStatus::Ended => println!("status: ended"),
        CheckpointStatus::Paused(position) => {
            let path = position
                .frames
                .iter()
                .map(|frame| format!("{}/{}", frame.graph, frame.step))
                .collect::<Vec<_>>()
                .join(" > ");
            println!("status: paused");
            println!("position: {path}");
            println!("resume_values: {}", position.resume_values.len());
        }
    }
    let effective = checkpoint.effective_state().map_err(other)?;
    println!("messages: {}", effective.message_count());
    println!("fields: {}", effective.fields().count());
    Ok(())
}

fn print_chat_state(state: &ChatState, json_output: bool) -> Result<(), CliError> {
    if json_output {
        let value = json!({
            "messages": state.messages,
            "is_ended": state.is_ended,
            "is_successful": state.is_successful,
        });
        println!("{}", serde_json::to_string(&value).map_err(other)?);
        return Ok(());
    }
    for message in &state.messages {
        print_message(message);
    }
    println!("ended: {}", state.is_ended);
    Ok(())
}

fn print_message(message: &Message) {
    println!("[{}] {}", message.role.as_str(), message.text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_expected_session_message_and_client_exit() {
        let error = CliError::from(SessionError::NotFound {
            conversation_id: "c-9".to_string(),
        });

        assert!(matches!(error, CliError::Session(_)));
        assert!(error.to_string().contains("c-9"));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn other_error_expected_message_verbatim_and_failure_exit() {
        let error = other("store root unreadable");

        assert_eq!(error.to_string(), "store root unreadable");
        assert_eq!(error.exit_code(), 1);
    }
}
