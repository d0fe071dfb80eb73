#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Refresh,
    ToggleAutoRefresh,
    ToggleFilterEmpty,
    Quit,
}

pub const HELP: &str = "r: refresh now  p: pause/resume sensors  f: show/hide empty sensors  q: quit";

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "refresh" => Some(Self::Refresh),
            "p" | "pause" | "resume" => Some(Self::ToggleAutoRefresh),
            "f" | "filter" => Some(Self::ToggleFilterEmpty),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}
