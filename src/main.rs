use clap::{CommandFactory, Parser};
use colored::*;
use tracing_subscriber::EnvFilter;

use pixchat::cli::Args;
use pixchat::client::ChatClient;
use pixchat::config::Settings;
use pixchat::keystore::{acquire_key, KeySources};
use pixchat::repl::{self, ReplyFormat};
use pixchat::session::ChatSession;
use pixchat::transcript::TranscriptStore;
use pixchat::web;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pixchat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging();

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "pixchat", &mut std::io::stdout());
        return Ok(());
    }

    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply_args(&args)?;
    if let Some(key_file) = &args.key_file {
        settings.key_path = key_file.clone();
    }

    let mut stdout = std::io::stdout();

    if args.clear {
        TranscriptStore::new(&settings.transcript_path).clear()?;
        eprintln!("{}", "conversation cleared".dimmed());
        return Ok(());
    }
    if args.history {
        let transcript = TranscriptStore::new(&settings.transcript_path).load()?;
        repl::print_transcript(&mut stdout, &transcript)?;
        return Ok(());
    }

    let sources = KeySources::from_env(args.provider.key_env_var(), settings.key_path.clone(), args.save_key);
    let (api_key, origin) = {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut prompt_out = std::io::stderr();
        acquire_key(&sources, &mut input, &mut prompt_out)?
    };
    tracing::debug!(?origin, provider = %args.provider, "API key acquired");

    let client = ChatClient::new(api_key, settings.endpoint.clone(), settings.request_timeout())?;
    let port = settings.port;
    let mut session = ChatSession::open(client, settings)?;

    if args.web {
        web::serve(port, session).await?;
        return Ok(());
    }

    let format = if args.html { ReplyFormat::Html } else { ReplyFormat::Markdown };
    match args.prompt {
        Some(prompt) => {
            let exchange = repl::run_once(&mut session, &prompt, args.image, format, &mut stdout).await?;
            if exchange.failed {
                std::process::exit(1);
            }
        }
        None => {
            if args.image.is_some() {
                tracing::warn!("--image needs a prompt; use /image inside the session instead");
            }
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            repl::run_interactive(&mut session, stdin, &mut stdout, format).await?;
        }
    }
    Ok(())
}
