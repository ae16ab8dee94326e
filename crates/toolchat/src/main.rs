//! The `toolchat` command.

#[macro_use]
extern crate tracing;

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{self, BufReader};
use toolchat::{TurnObserver, config, report_error, start};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Logs go to stderr so they never mix with the transcript.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut stdout = io::stdout();
    let result = match config::load_vars() {
        Ok(vars) => {
            start(&vars, BufReader::new(io::stdin()), stdout, Spinner::new())
                .await
        }
        Err(err) => report_error(&mut stdout, err).await,
    };
    if let Err(err) = result {
        error!("chat aborted: {err}");
    }
}

/// A spinner on stderr while a turn is in flight.
struct Spinner {
    style: ProgressStyle,
    bar: Option<ProgressBar>,
}

impl Spinner {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        Self { style, bar: None }
    }
}

impl TurnObserver for Spinner {
    fn turn_started(&mut self) {
        let bar = ProgressBar::new_spinner()
            .with_style(self.style.clone())
            .with_message("Thinking...");
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(bar);
    }

    fn turn_finished(&mut self) {
        // Clear before anything is printed.
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
