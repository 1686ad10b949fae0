//! Import progress reporting.
//!
//! Emitted on **stderr** so stdout stays parseable: `import SQLiteData  importing  12 / 40 files`.

use clap::ValueEnum;
use std::io::Write;

#[derive(Clone, Debug)]
pub enum ImportProgressEvent {
    /// Walking the directory; total not known yet.
    Discovering { target: String },
    /// `n` of `total` files written.
    Importing { target: String, n: u64, total: u64 },
}

pub trait ImportProgressReporter: Send + Sync {
    fn report(&self, event: ImportProgressEvent);
}

pub struct StderrProgress;

impl ImportProgressReporter for StderrProgress {
    fn report(&self, event: ImportProgressEvent) {
        let line = match &event {
            ImportProgressEvent::Discovering { target } => {
                format!("import {}  discovering...\n", target)
            }
            ImportProgressEvent::Importing { target, n, total } => format!(
                "import {}  importing  {} / {} files\n",
                target,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    pub fn event_json(event: &ImportProgressEvent) -> serde_json::Value {
        match event {
            ImportProgressEvent::Discovering { target } => serde_json::json!({
                "event": "progress",
                "target": target,
                "phase": "discovering"
            }),
            ImportProgressEvent::Importing { target, n, total } => serde_json::json!({
                "event": "progress",
                "target": target,
                "phase": "importing",
                "n": n,
                "total": total
            }),
        }
    }
}

impl ImportProgressReporter for JsonProgress {
    fn report(&self, event: ImportProgressEvent) {
        if let Ok(line) = serde_json::to_string(&JsonProgress::event_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl ImportProgressReporter for NoProgress {
    fn report(&self, _event: ImportProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Selected with the global `--progress` flag.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ProgressMode {
    /// Human when stderr is a terminal, otherwise off.
    #[default]
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Resolve `Auto` against the terminal; explicit modes are kept.
    pub fn resolve(self) -> Self {
        match self {
            ProgressMode::Auto => Self::default_for_tty(),
            other => other,
        }
    }

    /// Human progress when stderr is a terminal, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ImportProgressReporter> {
        match self.resolve() {
            ProgressMode::Auto | ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_event_shape() {
        let event = ImportProgressEvent::Importing {
            target: "SQLiteData".to_string(),
            n: 2,
            total: 5,
        };
        let json = JsonProgress::event_json(&event);
        assert_eq!(json["event"], "progress");
        assert_eq!(json["phase"], "importing");
        assert_eq!(json["n"], 2);
        assert_eq!(json["total"], 5);
    }

    #[test]
    fn explicit_modes_resolve_to_themselves() {
        assert_eq!(ProgressMode::Json.resolve(), ProgressMode::Json);
        assert_eq!(ProgressMode::Off.resolve(), ProgressMode::Off);
        assert_ne!(ProgressMode::Auto.resolve(), ProgressMode::Auto);
        assert_eq!(
            ProgressMode::from_str("json", true).unwrap(),
            ProgressMode::Json
        );
    }
}
