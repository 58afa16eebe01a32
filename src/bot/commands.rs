/// Comandos de texto que entiende el bot, ya separados de sus argumentos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Pause,
    Resume,
    Skip,
    Replay,
    Stop,
    /// Página 1-based
    Queue { page: usize },
    NowPlaying,
    Join,
    /// `None` consulta el estado actual
    Fallback(Option<bool>),
    Help,
}

impl Command {
    /// Parses `content` if it starts with `prefix` followed by a known command or alias.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "play" | "p" => Command::Play(args.to_string()),
            "pause" | "pa" => Command::Pause,
            "resume" | "r" => Command::Resume,
            "skip" | "s" => Command::Skip,
            "replay" => Command::Replay,
            "stop" | "st" => Command::Stop,
            "queue" | "q" => Command::Queue {
                page: args.parse::<usize>().unwrap_or(1).max(1),
            },
            "nowplaying" | "np" => Command::NowPlaying,
            "join" | "j" => Command::Join,
            "fallback" => Command::Fallback(parse_toggle(args)),
            "help" | "h" => Command::Help,
            _ => return None,
        };

        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Skip => "skip",
            Command::Replay => "replay",
            Command::Stop => "stop",
            Command::Queue { .. } => "queue",
            Command::NowPlaying => "nowplaying",
            Command::Join => "join",
            Command::Fallback(_) => "fallback",
            Command::Help => "help",
        }
    }
}

fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.to_lowercase().as_str() {
        "on" | "true" | "si" | "sí" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
