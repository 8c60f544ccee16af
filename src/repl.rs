//! Terminal front end: one-shot sends and the interactive loop.

use colored::*;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::cli::{parse_repl_line, ReplCommand, REPL_HELP};
use crate::error::{ChatError, Result};
use crate::image::ImageAttachment;
use crate::session::{ChatSession, Exchange};
use crate::transcript::{Speaker, Transcript};

/// How replies are written to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyFormat {
    /// The Markdown text as the model wrote it.
    #[default]
    Markdown,
    /// Rendered HTML.
    Html,
}

pub fn print_exchange<W: Write>(out: &mut W, exchange: &Exchange, format: ReplyFormat) -> Result<()> {
    let body = match format {
        ReplyFormat::Markdown => exchange.reply.trim_end(),
        ReplyFormat::Html => exchange.html.trim_end(),
    };
    if exchange.failed {
        writeln!(out, "{} {}", "AI:".bright_red().bold(), body.bright_red())?;
    } else {
        writeln!(out, "{} {}", "AI:".bright_green().bold(), body)?;
    }
    Ok(())
}

pub fn print_transcript<W: Write>(out: &mut W, transcript: &Transcript) -> Result<()> {
    if transcript.is_empty() {
        writeln!(out, "{}", "(no messages yet)".dimmed())?;
        return Ok(());
    }
    for entry in transcript.entries() {
        let label = format!("{}:", entry.speaker);
        let label = match entry.speaker {
            Speaker::User => label.bright_cyan().bold(),
            Speaker::Assistant if entry.is_error() => label.bright_red().bold(),
            Speaker::Assistant => label.bright_green().bold(),
        };
        writeln!(out, "{} {}", label, entry.text)?;
    }
    Ok(())
}

/// Send a single message and print the reply.
pub async fn run_once<W: Write>(
    session: &mut ChatSession,
    prompt: &str,
    image: Option<PathBuf>,
    format: ReplyFormat,
    out: &mut W,
) -> Result<Exchange> {
    let image = match image {
        Some(path) => Some(ImageAttachment::from_path(&path, session.settings().max_image_bytes)?),
        None => None,
    };
    let exchange = session.send(prompt, image.as_ref()).await?;
    print_exchange(out, &exchange, format)?;
    Ok(exchange)
}

/// Read lines from `input` until EOF or `/quit`.
///
/// An image attached with `/image` rides along with the next message only.
pub async fn run_interactive<R, W>(
    session: &mut ChatSession,
    input: R,
    out: &mut W,
    format: ReplyFormat,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut pending: Option<ImageAttachment> = None;

    writeln!(
        out,
        "{} {}",
        "pixchat".bright_blue().bold(),
        format!("model={} (type /help for commands)", session.settings().model).dimmed()
    )?;

    loop {
        write!(out, "{} ", "You:".bright_cyan().bold())?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };

        match parse_repl_line(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Help => writeln!(out, "{REPL_HELP}")?,
            ReplCommand::History => print_transcript(out, session.transcript())?,
            ReplCommand::Clear => {
                session.clear()?;
                pending = None;
                writeln!(out, "{}", "conversation cleared".dimmed())?;
            }
            ReplCommand::Attach(path) => {
                match ImageAttachment::from_path(&path, session.settings().max_image_bytes) {
                    Ok(img) => {
                        writeln!(
                            out,
                            "{}",
                            format!("attached {} ({})", path.display(), img.mime).dimmed()
                        )?;
                        pending = Some(img);
                    }
                    Err(e) => writeln!(out, "{}", e.to_string().bright_red())?,
                }
            }
            ReplCommand::Unknown(cmd) => {
                writeln!(out, "{}", format!("unknown command {cmd}, try /help").yellow())?
            }
            ReplCommand::Send(text) => match session.send(&text, pending.as_ref()).await {
                Ok(exchange) => {
                    pending = None;
                    print_exchange(out, &exchange, format)?;
                }
                Err(ChatError::EmptyMessage) => continue,
                Err(e) => return Err(e),
            },
        }
    }
    Ok(())
}
