use colored::Colorize;
use std::collections::HashMap;

type Style = Box<dyn Fn(&str) -> String>;

pub struct Theme {
    messages: HashMap<&'static str, String>,
    pub prompt_style: Style,
    pub error_style: Style,
    pub success_style: Style,
    pub warning_style: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            messages: default_messages(),
            prompt_style: Box::new(|s: &str| s.bright_cyan().to_string()),
            error_style: Box::new(|s: &str| s.bright_red().bold().to_string()),
            success_style: Box::new(|s: &str| s.bright_green().bold().to_string()),
            warning_style: Box::new(|s: &str| s.yellow().to_string()),
        }
    }
}

impl Theme {
    pub fn load(name: &str) -> Self {
        match name {
            "dark" => Theme {
                prompt_style: Box::new(|s: &str| s.bright_purple().to_string()),
                error_style: Box::new(|s: &str| s.red().to_string()),
                success_style: Box::new(|s: &str| s.green().to_string()),
                warning_style: Box::new(|s: &str| s.bright_yellow().to_string()),
                ..Theme::default()
            },
            _ => Theme::default(),
        }
    }

    pub fn get_message(&self, key: &str) -> String {
        self.messages.get(key).cloned().unwrap_or_default()
    }
}

fn default_messages() -> HashMap<&'static str, String> {
    [
        ("welcome", "Welcome to NeoShell!"),
        ("help", "Type 'help' for commands."),
        ("exit", "Goodbye!"),
        ("eof_signal", "Goodbye!"),
        ("interrupt_signal", "(Press Ctrl+D or type 'exit' to quit)"),
        ("error_symbol", "✗"),
    ]
    .into_iter()
    .map(|(k, v)| (k, v.to_string()))
    .collect()
}
