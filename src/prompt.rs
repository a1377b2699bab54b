use std::io::{self, BufRead, Write};

/// Synchronous yes/no confirmation and post-action notices.
pub trait Prompt {
    fn confirm(&mut self, question: &str) -> bool;
    fn acknowledge(&mut self, message: &str);
}

/// Asks on stdin and answers on stdout.
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", question);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }

    fn acknowledge(&mut self, message: &str) {
        println!("{}", message);
    }
}

/// A prompt whose answer was collected up front, e.g. from a modal dialog.
/// Notices are kept for the caller to display. The default answers no.
#[derive(Debug, Default)]
pub struct Answered {
    answer: bool,
    pub notices: Vec<String>,
}

impl Answered {
    pub fn yes() -> Self {
        Self {
            answer: true,
            notices: Vec::new(),
        }
    }
}

impl Prompt for Answered {
    fn confirm(&mut self, _question: &str) -> bool {
        self.answer
    }

    fn acknowledge(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
