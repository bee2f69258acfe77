pub mod commands;
pub mod config;
mod error;
pub mod loader;
pub mod tail;

pub use error::{AgentError, Result};

use std::sync::Arc;

use lookout_core::{Player, Telemetry, Tracker, now};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::commands::Command;
use crate::config::Config;
use crate::tail::{LogTail, LogWatcher};

/// Host process around the tracker: feeds it telemetry and reports what it finds.
pub struct Agent {
    tracker: Arc<Tracker>,
    config: Config,
}

impl Agent {
    /// Build an agent and load the configured rule lists.
    pub async fn new(config: Config) -> Result<Self> {
        let agent = Self {
            tracker: Arc::new(Tracker::new(config.timeouts())),
            config,
        };

        if let Some(path) = agent.config.local_list_path.as_deref() {
            if tokio::fs::try_exists(path).await? {
                let doc = loader::read_list(path).await?;
                let report = agent.tracker.restore_local(doc).await;
                info!(marks = report.steam_ids, "restored local marks");
            }
        }
        agent.reload().await;
        Ok(agent)
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Re-read every configured rule list and swap them in.
    pub async fn reload(&self) {
        let docs = loader::read_lists(&self.config.rule_lists).await;
        let report = self.tracker.reload(docs).await;
        for rejected in &report.rejected {
            warn!(error = %rejected, "rule rejected");
        }
    }

    /// Feed console log or status lines into the tracker.
    pub async fn ingest_lines(&self, lines: &[String]) -> usize {
        let now = now();
        let mut applied = 0;
        for line in lines {
            applied += self.tracker.ingest(Telemetry::LogLine(line), now).await.len();
        }
        applied
    }

    /// Read the current G15 dump, if one is configured, and apply it.
    pub async fn poll_dump(&self) -> Result<usize> {
        let Some(path) = self.config.g15_dump_path.as_deref() else {
            return Ok(0);
        };
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let players = self.tracker.ingest(Telemetry::G15Dump(&text), now()).await;
        debug!(players = players.len(), "applied g15 dump");
        Ok(players.len())
    }

    /// Evict expired players and return them.
    pub async fn sweep(&self) -> Vec<Player> {
        let evicted = self.tracker.evict(now()).await;
        for player in &evicted {
            debug!(steam_id = %player.steam_id, name = %player.name, "player expired");
        }
        evicted
    }

    /// Log every connected player that has match evidence.
    pub async fn report(&self) -> Vec<Player> {
        let matched: Vec<Player> = self
            .tracker
            .registry()
            .active(now())
            .await
            .into_iter()
            .filter(|p| p.is_matched())
            .collect();
        for player in &matched {
            let origins: Vec<&str> = player.matches.iter().map(|m| m.origin.as_str()).collect();
            let tags: Vec<&str> = player
                .matches
                .iter()
                .flat_map(|m| m.tags.iter().map(String::as_str))
                .collect();
            info!(
                steam_id = %player.steam_id,
                name = %player.name,
                team = ?player.team,
                lists = ?origins,
                tags = ?tags,
                "matched player in session"
            );
        }
        matched
    }

    /// Run one operator command.
    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Mark { steam_id, tags } => {
                self.tracker.mark(steam_id, tags).await?;
                info!(%steam_id, "marked");
                self.save_local().await?;
            }
            Command::Unmark(steam_id) => {
                let remaining = self.tracker.unmark(steam_id).await?;
                info!(%steam_id, remaining, "unmarked");
                self.save_local().await?;
            }
            Command::Whitelist(steam_id) => {
                self.tracker.whitelist(steam_id).await?;
                info!(%steam_id, "whitelisted");
            }
            Command::Unwhitelist(steam_id) => {
                self.tracker.unwhitelist(steam_id).await?;
                info!(%steam_id, "removed from whitelist");
            }
            Command::Reload => self.reload().await,
            Command::Players => {
                let now = now();
                let timeouts = self.tracker.registry().timeouts();
                for player in self.tracker.registry().all().await {
                    info!(
                        steam_id = %player.steam_id,
                        name = %player.name,
                        state = ?player.state(now, timeouts),
                        matches = player.matches.len(),
                        "player"
                    );
                }
            }
        }
        Ok(())
    }

    async fn save_local(&self) -> Result<()> {
        if let Some(path) = self.config.local_list_path.as_deref() {
            loader::write_list(path, &self.tracker.rules().export_local()).await?;
        }
        Ok(())
    }

    /// Drive every adapter loop until the command input closes or ctrl-c.
    pub async fn run<R: AsyncBufRead + Unpin>(self, commands: R) -> Result<()> {
        let (mut tail, mut watcher) = match self.config.log_path.as_ref() {
            Some(path) => (
                Some(LogTail::open_at_end(path).await?),
                Some(LogWatcher::new(path)?),
            ),
            None => (None, None),
        };
        let mut watching = watcher.is_some();
        let mut dump_tick = interval(self.config.g15_poll_interval);
        let mut evict_tick = interval(self.config.evict_interval);
        let mut report_tick = interval(self.config.report_interval);
        for tick in [&mut dump_tick, &mut evict_tick, &mut report_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        let mut lines = commands.lines();
        let mut commands_open = true;

        info!(
            log = ?self.config.log_path,
            g15 = ?self.config.g15_dump_path,
            lists = self.config.rule_lists.len(),
            "agent running"
        );

        loop {
            tokio::select! {
                changed = async {
                    match watcher.as_mut() {
                        Some(watcher) => watcher.changed().await,
                        None => None,
                    }
                }, if watching => {
                    match (changed, tail.as_mut()) {
                        (Some(()), Some(tail)) => match tail.read_new_lines().await {
                            Ok(new_lines) => { self.ingest_lines(&new_lines).await; }
                            Err(err) => warn!(error = %err, "failed to read console log"),
                        },
                        _ => {
                            warn!("console log watcher stopped");
                            watching = false;
                        }
                    }
                }
                _ = dump_tick.tick(), if self.config.g15_dump_path.is_some() => {
                    if let Err(err) = self.poll_dump().await {
                        warn!(error = %err, "failed to read g15 dump");
                    }
                }
                _ = evict_tick.tick() => {
                    self.sweep().await;
                }
                _ = report_tick.tick() => {
                    self.report().await;
                }
                line = lines.next_line(), if commands_open => {
                    match line {
                        Ok(Some(line)) if line.trim().is_empty() => {}
                        Ok(Some(line)) => {
                            let result = match Command::parse(&line) {
                                Ok(command) => self.execute(command).await,
                                Err(err) => Err(err),
                            };
                            if let Err(err) = result {
                                warn!(error = %err, "command failed");
                            }
                        }
                        Ok(None) => commands_open = false,
                        Err(err) => {
                            error!(error = %err, "command input failed");
                            commands_open = false;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        self.save_local().await?;
        Ok(())
    }
}
