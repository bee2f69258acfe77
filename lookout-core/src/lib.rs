mod error;
pub mod g15;
mod models;
pub mod normalize;
mod registry;
pub mod rules;
mod steamid;

pub use error::{CoreError, Result};
pub use models::{
  DEFAULT_AVATAR_HASH, Encounter, MatchKind, MatchResult, Player, PlayerState, PlayerUpdate,
  ProfileUpdate, ProfileVisibility, Team, Timeouts, UserNameHistory, avatar_url,
};
pub use normalize::Telemetry;
pub use registry::Registry;
pub use rules::{LoadReport, Matcher, RuleEngine, RuleListDoc, Verdict};
pub use steamid::SteamId;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Current unix time in seconds.
pub fn now() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs() as i64)
    .unwrap_or_default()
}

/// Ties the registry to the rule engine.
///
/// Every upsert re-evaluates the touched player, and every change to the
/// rule set re-evaluates every known player, so `Player::matches` always
/// reflects the lists as they are now.
pub struct Tracker {
  registry: Registry,
  rules: Arc<RuleEngine>,
}

impl Tracker {
  pub fn new(timeouts: Timeouts) -> Self {
    Self::with_rules(Arc::new(RuleEngine::new()), timeouts)
  }

  pub fn with_rules(rules: Arc<RuleEngine>, timeouts: Timeouts) -> Self {
    Self {
      registry: Registry::new(timeouts),
      rules,
    }
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  pub fn rules(&self) -> &Arc<RuleEngine> {
    &self.rules
  }

  /// Merge one normalized update and re-evaluate the player.
  pub async fn apply(&self, update: &PlayerUpdate, now: i64) -> Result<Player> {
    self.registry.upsert(update, now, &*self.rules).await
  }

  /// Normalize raw adapter output and apply every resulting update.
  /// Updates without a usable identity are dropped.
  pub async fn ingest(&self, telemetry: Telemetry<'_>, now: i64) -> Vec<Player> {
    let batch = telemetry.normalize();
    let mut players = Vec::with_capacity(batch.len());
    for update in &batch {
      match self.registry.upsert(update, now, &*self.rules).await {
        Ok(player) => players.push(player),
        Err(err) => warn!(error = %err, "dropping player update"),
      }
    }
    players
  }

  pub async fn get_or_create(&self, steam_id: SteamId, now: i64) -> Result<Player> {
    self.registry.get_or_create(steam_id, now, &*self.rules).await
  }

  pub async fn mark(&self, steam_id: SteamId, attrs: Vec<String>) -> Result<()> {
    self.rules.mark(steam_id, attrs)?;
    self.rescan().await;
    Ok(())
  }

  /// Returns how many entries remain in the local marks list.
  pub async fn unmark(&self, steam_id: SteamId) -> Result<usize> {
    let remaining = self.rules.unmark(steam_id)?;
    self.rescan().await;
    Ok(remaining)
  }

  pub async fn whitelist(&self, steam_id: SteamId) -> Result<()> {
    self.rules.whitelist(steam_id)?;
    self.rescan().await;
    Ok(())
  }

  pub async fn unwhitelist(&self, steam_id: SteamId) -> Result<()> {
    self.rules.unwhitelist(steam_id)?;
    self.rescan().await;
    Ok(())
  }

  /// Swap in a new set of loaded lists.
  pub async fn reload(&self, docs: Vec<RuleListDoc>) -> LoadReport {
    let report = self.rules.load(docs);
    self.rescan().await;
    report
  }

  pub async fn restore_local(&self, doc: RuleListDoc) -> LoadReport {
    let report = self.rules.restore_local(doc);
    self.rescan().await;
    report
  }

  pub async fn evict(&self, now: i64) -> Vec<Player> {
    self.registry.evict(now).await
  }

  /// Runs after every publish. Players are re-read under their entry lock,
  /// so an upsert racing with the publish can't leave stale matches behind.
  async fn rescan(&self) {
    self.registry.rescan(&*self.rules).await;
    debug!(players = self.registry.len(), "re-evaluated players");
  }
}

impl Default for Tracker {
  fn default() -> Self {
    Self::new(Timeouts::default())
  }
}
