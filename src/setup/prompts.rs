use std::io::{self, BufRead, Write};

use super::ansi;

/// Ask for a line of input. An empty answer takes `default` when given.
pub fn ask(label: &str, default: Option<&str>) -> String {
    loop {
        match default {
            Some(d) => print!("  {label} {}: ", ansi::dim(&format!("[{d}]"))),
            None => print!("  {label}: "),
        }
        let _ = io::stdout().flush();

        let answer = read_line();
        if !answer.is_empty() {
            return answer;
        }
        if let Some(d) = default {
            return d.to_string();
        }
        println!("  {} A value is required", ansi::red("!"));
    }
}

/// Ask for an optional value; an empty answer means none.
pub fn ask_optional(label: &str) -> Option<String> {
    print!("  {label} {}: ", ansi::dim("(optional)"));
    let _ = io::stdout().flush();
    let answer = read_line();
    (!answer.is_empty()).then_some(answer)
}

/// Ask for a secret without echoing it.
pub fn ask_secret(label: &str) -> String {
    loop {
        let answer = rpassword::prompt_password(format!("  {label}: "))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if !answer.is_empty() {
            return answer;
        }
        println!("  {} A value is required", ansi::red("!"));
    }
}

/// Yes/no question, defaulting to no.
pub fn confirm(question: &str) -> bool {
    print!("  {question} {}: ", ansi::dim("[y/N]"));
    let _ = io::stdout().flush();
    matches!(read_line().to_lowercase().as_str(), "y" | "yes")
}

/// Read one trimmed line. End of input aborts the wizard.
fn read_line() -> String {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => {
            println!();
            eprintln!("  {} Setup aborted", ansi::red("\u{2717}"));
            std::process::exit(1);
        }
        Ok(_) => line.trim().to_string(),
    }
}
