mod command;
mod helper;
mod terminal_view;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use rustyline::Editor;
use rustyline::history::DefaultHistory;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use confidant_client::{
    CancelResult, ClientSettings, FileStorage, HttpChatApi, SendPipeline, SubmitOutcome,
};
use command::{Command, HELP};
use helper::CliHelper;
use terminal_view::TerminalView;

#[derive(Parser, Debug)]
#[command(name = "confidant", about = "Talk to a Confidant persona from the terminal")]
struct Args {
    /// Base URL of the Confidant server
    #[arg(long, env = "CONFIDANT_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Persona (conversation) to open
    #[arg(long, default_value = "default")]
    persona: String,

    /// Where queued messages and logs are kept between runs
    #[arg(long, env = "CONFIDANT_CLIENT_DIR")]
    state_dir: Option<PathBuf>,
}

fn state_dir(args: &Args) -> PathBuf {
    args.state_dir
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("confidant")))
        .unwrap_or_else(|| PathBuf::from(".confidant"))
}

/// Logs go to a daily file; stdout belongs to the conversation.
fn init_logging(dir: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(dir.join("logs"), "confidant.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,confidant=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

async fn open(pipeline: &SendPipeline, view: &TerminalView, conversation_id: &str) {
    match pipeline.attach(conversation_id).await {
        Ok(log) => {
            println!(
                "{}",
                format!("=== {conversation_id} ({} turns) ===", log.turns.len()).bright_magenta()
            );
            view.print_transcript(conversation_id);
        }
        Err(err) => {
            eprintln!("{}", format!("Could not load {conversation_id}: {err}").red());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let dir = state_dir(&args);
    let _guard = init_logging(&dir);

    let api = Arc::new(HttpChatApi::new(&args.server)?);
    let storage = Arc::new(FileStorage::new(dir.join("client.json")));
    let view = Arc::new(TerminalView::default());
    let pipeline = SendPipeline::new(api, storage, view.clone(), ClientSettings::default());

    if let Err(err) = pipeline.refresh_config().await {
        tracing::warn!(error = %err, "using default timing settings");
        println!(
            "{}",
            format!("Server at {} did not answer: {err}", args.server).yellow()
        );
    }

    let mut rl: Editor<CliHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(CliHelper));

    println!("{}", "=== Confidant ===".bright_magenta().bold());
    println!("{}", "Type '/help' for commands, or 'quit' to exit.".bright_black());
    println!();

    let mut current = args.persona.clone();
    open(&pipeline, &view, &current).await;

    loop {
        let draft = view.take_draft(&current);
        let prompt = format!("{current}> ");
        let readline = rl.readline_with_initial(&prompt, (draft.as_str(), ""));

        match readline {
            Ok(line) => {
                let Some(command) = Command::parse(&line) else {
                    continue;
                };
                let _ = rl.add_history_entry(line.as_str());

                match command {
                    Command::Quit => break,
                    Command::Say(text) => {
                        // Busy is reported through the view.
                        if let SubmitOutcome::Busy = pipeline.submit(&current, &text) {
                            view.set_input_silently(&current, &text);
                        }
                    }
                    Command::Undo => {
                        if pipeline.undo(&current).is_none() {
                            println!("{}", "Nothing to undo.".bright_black());
                        }
                    }
                    Command::Send => {
                        let pipeline = pipeline.clone();
                        let id = current.clone();
                        tokio::spawn(async move {
                            pipeline.flush(&id).await;
                        });
                    }
                    Command::Cancel => {
                        if let CancelResult::NothingToCancel = pipeline.cancel(&current).await {
                            println!("{}", "Nothing to cancel.".bright_black());
                        }
                    }
                    Command::Log => view.print_transcript(&current),
                    Command::Persona(next) => {
                        pipeline.detach(&current);
                        current = next;
                        open(&pipeline, &view, &current).await;
                    }
                    Command::Config => match pipeline.refresh_config().await {
                        Ok(config) => println!(
                            "{}",
                            format!(
                                "memory {} turns, batch window {} ms, reveal pace {} ms",
                                config.memory_turns,
                                config.send_delay_ms,
                                config.assistant_segment_delay_ms
                            )
                            .bright_black()
                        ),
                        Err(err) => eprintln!("{}", format!("Error: {err}").red()),
                    },
                    Command::Help => println!("{}", HELP.bright_black()),
                    Command::Unknown(name) => {
                        println!("{}", format!("Unknown command {name}").bright_black());
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {err:?}").red());
                break;
            }
        }
    }

    let queued = pipeline
        .inspect(&current, |state| state.batch().len())
        .unwrap_or(0);
    if queued > 0 {
        println!(
            "{}",
            "Queued messages were kept and will be sent next time.".bright_black()
        );
    }
    println!("{}", "Goodbye!".bright_green());
    Ok(())
}
