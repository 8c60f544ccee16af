use crate::providers::Provider;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pixchat")]
#[command(version)]
#[command(about = "Chat with an OpenAI-compatible model from the terminal or a local web widget")]
pub struct Args {
    /// Message to send. Starts an interactive session when omitted.
    pub prompt: Option<String>,

    /// Attach an image (png, jpeg, gif, webp) to the message
    #[arg(long, short)]
    pub image: Option<PathBuf>,

    /// Model name (defaults to the config file, then gpt-4o-mini-2024-07-18)
    #[arg(long)]
    pub model: Option<String>,

    /// Sampling temperature, 0.0 to 2.0
    #[arg(long)]
    pub temperature: Option<f32>,

    /// LLM provider
    #[arg(long, value_enum, default_value = "openai")]
    pub provider: Provider,

    /// Settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where the conversation is persisted (JSON)
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// Read the API key from this file instead of the default key file
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Save a key entered at the prompt to the key file
    #[arg(long)]
    pub save_key: bool,

    /// Print the saved conversation and exit
    #[arg(long)]
    pub history: bool,

    /// Delete the saved conversation and exit
    #[arg(long)]
    pub clear: bool,

    /// Print the reply as rendered HTML instead of Markdown text
    #[arg(long)]
    pub html: bool,

    /// Send earlier turns of the conversation along with each message
    #[arg(long)]
    pub include_history: bool,

    /// Serve the chat widget on localhost instead of using the terminal
    #[arg(long)]
    pub web: bool,

    /// Port for the web widget
    #[arg(long)]
    pub port: Option<u16>,

    /// Print shell completions and exit
    #[arg(long, value_enum)]
    pub completions: Option<clap_complete::Shell>,
}

impl Args {
    /// Whether this invocation needs an API key at all.
    pub fn needs_api_key(&self) -> bool {
        !(self.history || self.clear || self.completions.is_some())
    }
}

/// A line typed into the interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    Attach(PathBuf),
    History,
    Clear,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_repl_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    // A doubled slash sends the rest verbatim, starting with a single `/`.
    if let Some(escaped) = line.strip_prefix("//") {
        return ReplCommand::Send(format!("/{escaped}"));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ReplCommand::Send(line.to_string());
    };
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (rest, ""),
    };
    match cmd {
        "image" | "img" if !arg.is_empty() => ReplCommand::Attach(PathBuf::from(arg)),
        "history" => ReplCommand::History,
        "clear" => ReplCommand::Clear,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line.to_string()),
    }
}

pub const REPL_HELP: &str = "\
  /image PATH   attach an image to the next message
  /history      show the conversation so far
  /clear        forget the conversation
  /quit         leave
  //text        send text that starts with a slash";

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["pixchat"]);
        assert!(args.prompt.is_none());
        assert!(args.image.is_none());
        assert!(args.model.is_none());
        assert_eq!(args.provider, Provider::Openai);
        assert!(!args.web);
        assert!(!args.html);
        assert!(args.port.is_none());
        assert!(args.needs_api_key());
    }

    #[test]
    fn test_args_parse_full() {
        let args = Args::parse_from([
            "pixchat",
            "what is in this picture?",
            "-i",
            "cat.png",
            "--model",
            "gpt-4o",
            "--temperature",
            "1.1",
            "--transcript",
            "/tmp/t.json",
            "--html",
            "--save-key",
        ]);
        assert_eq!(args.prompt.as_deref(), Some("what is in this picture?"));
        assert_eq!(args.image, Some(PathBuf::from("cat.png")));
        assert_eq!(args.model.as_deref(), Some("gpt-4o"));
        assert_eq!(args.temperature, Some(1.1));
        assert_eq!(args.transcript, Some(PathBuf::from("/tmp/t.json")));
        assert!(args.html);
        assert!(args.save_key);
    }

    #[test]
    fn test_args_web_with_port() {
        let args = Args::parse_from(["pixchat", "--web", "--port", "3000"]);
        assert!(args.web);
        assert_eq!(args.port, Some(3000));
    }

    #[rstest]
    #[case(&["pixchat", "--history"])]
    #[case(&["pixchat", "--clear"])]
    #[case(&["pixchat", "--completions", "bash"])]
    fn test_maintenance_commands_skip_key(#[case] argv: &[&str]) {
        let args = Args::parse_from(argv);
        assert!(!args.needs_api_key());
    }

    #[rstest]
    #[case("hello", ReplCommand::Send("hello".into()))]
    #[case("  spaced out  ", ReplCommand::Send("spaced out".into()))]
    #[case("", ReplCommand::Empty)]
    #[case("   ", ReplCommand::Empty)]
    #[case("/image ./a b.png", ReplCommand::Attach(PathBuf::from("./a b.png")))]
    #[case("/img x.jpg", ReplCommand::Attach(PathBuf::from("x.jpg")))]
    #[case("/history", ReplCommand::History)]
    #[case("/clear", ReplCommand::Clear)]
    #[case("/help", ReplCommand::Help)]
    #[case("/quit", ReplCommand::Quit)]
    #[case("/exit", ReplCommand::Quit)]
    #[case("/image", ReplCommand::Unknown("/image".into()))]
    #[case("/bogus arg", ReplCommand::Unknown("/bogus arg".into()))]
    #[case("//etc/hosts is what?", ReplCommand::Send("/etc/hosts is what?".into()))]
    #[case("  //help ", ReplCommand::Send("/help".into()))]
    fn test_parse_repl_line(#[case] line: &str, #[case] expected: ReplCommand) {
        assert_eq!(parse_repl_line(line), expected);
    }
}
