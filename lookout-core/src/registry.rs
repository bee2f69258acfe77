//! Live registry of players in the current session.
//!
//! Players are kept in an `scc::HashMap` keyed by identity. Every mutation of
//! a player happens while its entry is locked, so concurrent upserts from
//! different adapters and the eviction sweep never interleave on the same
//! identity. Nothing here performs I/O while an entry is held.

use std::sync::atomic::{AtomicU64, Ordering};

use scc::HashMap;
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::models::{
  Encounter, Player, PlayerState, PlayerUpdate, ProfileUpdate, Timeouts, UserNameHistory,
};
use crate::rules::{Matcher, Verdict};
use crate::steamid::SteamId;

struct Entry {
  /// Insertion order, for stable snapshots.
  seq: u64,
  player: Player,
  names: Vec<UserNameHistory>,
}

impl Entry {
  fn observe_name(&mut self, now: i64) {
    let name = &self.player.name;
    if self.names.iter().any(|h| &h.name == name) {
      return;
    }
    if let Ok(history) = UserNameHistory::new(self.player.steam_id, name, now) {
      self.names.push(history);
    }
  }

  /// Recompute matches from scratch and sync the whitelist flag.
  ///
  /// Must run with the entry locked: a rule change published after this
  /// reads the rules is then picked up by the rescan queued behind the lock.
  fn refresh<M: Matcher + ?Sized>(&mut self, matcher: &M) {
    let steam_id = self.player.steam_id;
    let names: Vec<&str> = self.names.iter().map(|h| h.name.as_str()).collect();
    let Verdict {
      whitelisted,
      matches,
    } = matcher.verdict(steam_id, &names);
    self.player.matches = matches;

    if self.player.whitelisted != whitelisted {
      self.player.whitelisted = whitelisted;
      self.player.dirty = true;
    }
  }
}

pub struct Registry {
  players: HashMap<SteamId, Entry>,
  next_seq: AtomicU64,
  timeouts: Timeouts,
}

impl Registry {
  pub fn new(timeouts: Timeouts) -> Self {
    Self {
      players: HashMap::new(),
      next_seq: AtomicU64::new(0),
      timeouts,
    }
  }

  pub fn timeouts(&self) -> Timeouts {
    self.timeouts
  }

  fn new_entry(&self, steam_id: SteamId, now: i64) -> Entry {
    debug!(%steam_id, "tracking new player");
    Entry {
      seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
      player: Player::new(steam_id, now),
      names: Vec::new(),
    }
  }

  /// Merge a sparse update into the player, creating them on first sight.
  /// Returns the merged player as it stood when the entry was released.
  pub async fn upsert<M: Matcher + ?Sized>(
    &self,
    update: &PlayerUpdate,
    now: i64,
    matcher: &M,
  ) -> Result<Player> {
    let steam_id = update
      .steam_id
      .filter(SteamId::is_valid)
      .ok_or_else(|| CoreError::InvalidSteamId(format!("{:?}", update.steam_id)))?;

    let mut entry = self
      .players
      .entry_async(steam_id)
      .await
      .or_insert_with(|| self.new_entry(steam_id, now));
    let entry = entry.get_mut();

    if entry.player.merge(update) {
      entry.player.dirty = true;
      entry.observe_name(now);
    }
    entry.player.updated_on = entry.player.updated_on.max(now);
    entry.refresh(matcher);

    debug!(%steam_id, name = %entry.player.name, "merged player update");
    Ok(entry.player.clone())
  }

  /// Existing player, or a freshly created empty one. Never creates duplicates.
  pub async fn get_or_create<M: Matcher + ?Sized>(
    &self,
    steam_id: SteamId,
    now: i64,
    matcher: &M,
  ) -> Result<Player> {
    if !steam_id.is_valid() {
      return Err(CoreError::InvalidSteamId(steam_id.to_string()));
    }
    let mut created = false;
    let mut entry = self
      .players
      .entry_async(steam_id)
      .await
      .or_insert_with(|| {
        created = true;
        self.new_entry(steam_id, now)
      });
    let entry = entry.get_mut();
    if created {
      entry.refresh(matcher);
    }
    Ok(entry.player.clone())
  }

  pub async fn get(&self, steam_id: SteamId) -> Option<Player> {
    self
      .players
      .read_async(&steam_id, |_, entry| entry.player.clone())
      .await
  }

  /// Every distinct name seen for the identity, oldest first.
  pub async fn name_history(&self, steam_id: SteamId) -> Vec<UserNameHistory> {
    self
      .players
      .read_async(&steam_id, |_, entry| entry.names.clone())
      .await
      .unwrap_or_default()
  }

  /// Snapshot of every known player in insertion order.
  pub async fn all(&self) -> Vec<Player> {
    let mut players = Vec::new();
    self
      .players
      .iter_async(|_, entry| {
        players.push((entry.seq, entry.player.clone()));
        true
      })
      .await;
    players.sort_by_key(|(seq, _)| *seq);
    players.into_iter().map(|(_, player)| player).collect()
  }

  /// Players that are still connected, for presentation and automation.
  pub async fn active(&self, now: i64) -> Vec<Player> {
    let timeouts = self.timeouts;
    self
      .all()
      .await
      .into_iter()
      .filter(|p| p.state(now, timeouts) == PlayerState::Connected)
      .collect()
  }

  /// Write-back candidates for the persistence layer.
  pub async fn dirty(&self) -> Vec<Player> {
    self.all().await.into_iter().filter(|p| p.dirty).collect()
  }

  /// Clear the dirty flag after a successful write. Returns false if the player is gone.
  pub async fn mark_persisted(&self, steam_id: SteamId) -> bool {
    self
      .players
      .update_async(&steam_id, |_, entry| entry.player.dirty = false)
      .await
      .is_some()
  }

  pub async fn apply_profile(
    &self,
    steam_id: SteamId,
    profile: &ProfileUpdate,
    now: i64,
  ) -> Result<Player> {
    self
      .players
      .update_async(&steam_id, |_, entry| {
        entry.player.apply_profile(profile, now);
        entry.player.clone()
      })
      .await
      .ok_or(CoreError::NotFound(steam_id))
  }

  pub async fn set_notes(&self, steam_id: SteamId, notes: String) -> Result<Player> {
    self
      .players
      .update_async(&steam_id, |_, entry| {
        if entry.player.notes != notes {
          entry.player.notes = notes;
          entry.player.dirty = true;
        }
        entry.player.clone()
      })
      .await
      .ok_or(CoreError::NotFound(steam_id))
  }

  pub async fn record(&self, steam_id: SteamId, encounter: Encounter) -> Result<Player> {
    self
      .players
      .update_async(&steam_id, |_, entry| {
        entry.player.record(encounter);
        entry.player.clone()
      })
      .await
      .ok_or(CoreError::NotFound(steam_id))
  }

  /// Recompute matches for every player.
  pub async fn rescan<M: Matcher + ?Sized>(&self, matcher: &M) {
    self
      .players
      .retain_async(|_, entry| {
        entry.refresh(matcher);
        true
      })
      .await;
  }

  /// Remove every expired player and hand them back for archival.
  pub async fn evict(&self, now: i64) -> Vec<Player> {
    let timeouts = self.timeouts;
    let mut removed = Vec::new();
    self
      .players
      .retain_async(|_, entry| {
        if entry.player.state(now, timeouts) == PlayerState::Expired {
          removed.push((entry.seq, entry.player.clone()));
          false
        } else {
          true
        }
      })
      .await;

    if !removed.is_empty() {
      info!(evicted = removed.len(), "evicted expired players");
    }
    removed.sort_by_key(|(seq, _)| *seq);
    removed.into_iter().map(|(_, player)| player).collect()
  }

  pub fn len(&self) -> usize {
    self.players.len()
  }

  pub fn is_empty(&self) -> bool {
    self.players.is_empty()
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::new(Timeouts::default())
  }
}
