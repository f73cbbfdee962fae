use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::Parser;
use client_core::{BusError, BusSession};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
struct Args {
    /// Config file; defaults to ./desktop.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    bus_url: Option<String>,
    #[arg(long)]
    transcript_cap: Option<usize>,
    /// Retry with exponential backoff when the bus drops the connection.
    #[arg(long)]
    reconnect: bool,
    /// Also print every received message (date-time chatter excluded).
    #[arg(long)]
    show_log: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.bus_url {
            settings.session.bus_url = url.clone();
        }
        if let Some(cap) = self.transcript_cap {
            settings.session.transcript_cap = cap;
        }
        if self.reconnect {
            settings.reconnect = true;
        }
        if self.show_log {
            settings.show_message_log = true;
        }
    }
}

const STABLE_UPTIME: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Interrupted,
    BusClosed,
}

struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// A session that stayed up for [`STABLE_UPTIME`] starts the delays over.
    fn next_delay_after(&mut self, uptime: Duration) -> Duration {
        if uptime >= STABLE_UPTIME {
            self.reset();
        }
        self.next_delay()
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    args.apply(&mut settings);
    settings.validate()?;

    let mut backoff = Backoff::new(
        settings.reconnect_initial_delay(),
        settings.reconnect_max_delay(),
    );
    loop {
        let session = BusSession::websocket(settings.session.clone());
        session.activate_all()?;

        let mut opened_at = None;
        let outcome = run_session(&session, &settings, &mut opened_at).await;
        let uptime = opened_at.map_or(Duration::ZERO, |at: Instant| at.elapsed());
        let reason = match outcome {
            Ok(SessionEnd::Interrupted) => {
                info!("bus session interrupted");
                return Ok(());
            }
            Ok(SessionEnd::BusClosed) if settings.reconnect => "bus closed the connection".to_string(),
            Ok(SessionEnd::BusClosed) => {
                info!("bus session ended");
                return Ok(());
            }
            Err(BusError::Transport(reason)) if settings.reconnect => reason,
            Err(err) => return Err(err.into()),
        };

        let delay = backoff.next_delay_after(uptime);
        warn!(
            %reason,
            uptime_ms = uptime.as_millis() as u64,
            delay_ms = delay.as_millis() as u64,
            "bus: reconnecting"
        );
        println!("{}", render::connection_line(&session.connection().state()));
        tokio::time::sleep(delay).await;
    }
}

async fn run_session(
    session: &BusSession,
    settings: &Settings,
    opened_at: &mut Option<Instant>,
) -> Result<SessionEnd, BusError> {
    let mut connection = session.connection().watch_state();
    let mut status = session.status().watch();
    let mut transcript = session.transcript().watch();
    let mut panel = session.skills().watch();
    let mut message_log = session.message_log().watch();

    println!("{}", render::connection_line(&connection.borrow_and_update()));
    session.open().await?;
    *opened_at = Some(Instant::now());
    println!("{}", render::connection_line(&connection.borrow_and_update()));
    println!("{}", render::status_line(session.status().current()));

    let pump = session.run();
    tokio::pin!(pump);
    let mut interrupted = false;
    loop {
        tokio::select! {
            result = &mut pump => {
                result?;
                return Ok(if interrupted { SessionEnd::Interrupted } else { SessionEnd::BusClosed });
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("interrupted, closing bus session");
                interrupted = true;
                session.close();
            }
            Ok(()) = connection.changed() => {
                println!("{}", render::connection_line(&connection.borrow_and_update()));
            }
            Ok(()) = status.changed() => {
                println!("{}", render::status_line(*status.borrow_and_update()));
            }
            Ok(()) = transcript.changed() => {
                let entries = transcript.borrow_and_update().to_vec();
                if let Some(line) = render::transcript_lines(&entries).last() {
                    println!("{line}");
                }
            }
            Ok(()) = panel.changed() => {
                println!("{}", render::panel_line(panel.borrow_and_update().as_ref()));
            }
            Ok(()) = message_log.changed(), if settings.show_message_log => {
                let newest = message_log.borrow_and_update().newest().cloned();
                if let Some(record) = newest {
                    for line in render::log_lines(&[record]) {
                        println!("{line}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(3));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 3000, 3000]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn short_lived_sessions_keep_backing_off() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));
        let delays: Vec<_> = (0..4)
            .map(|_| backoff.next_delay_after(Duration::from_millis(50)).as_millis())
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000]);

        assert_eq!(
            backoff.next_delay_after(STABLE_UPTIME),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn cli_flags_override_settings() {
        let args = Args::parse_from([
            "desktop",
            "--bus-url",
            "ws://192.168.1.20:8181/core",
            "--transcript-cap",
            "8",
            "--reconnect",
        ]);
        let mut settings = Settings::default();
        args.apply(&mut settings);

        assert_eq!(settings.session.bus_url, "ws://192.168.1.20:8181/core");
        assert_eq!(settings.session.transcript_cap, 8);
        assert!(settings.reconnect);
        assert!(!settings.show_message_log);
    }
}
