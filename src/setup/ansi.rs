//! Minimal ANSI styling for the setup wizard. Honors `NO_COLOR`.

const RESET: &str = "\x1b[0m";

fn paint(code: &str, s: &str) -> String {
    if std::env::var_os("NO_COLOR").is_some() {
        s.to_string()
    } else {
        format!("{code}{s}{RESET}")
    }
}

pub fn bold(s: &str) -> String {
    paint("\x1b[1m", s)
}

pub fn dim(s: &str) -> String {
    paint("\x1b[2m", s)
}

pub fn red(s: &str) -> String {
    paint("\x1b[31m", s)
}

pub fn green(s: &str) -> String {
    paint("\x1b[32m", s)
}

pub fn yellow(s: &str) -> String {
    paint("\x1b[33m", s)
}
