use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::steamid::SteamId;

/// In-game team assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
  #[default]
  Unassigned,
  Spectator,
  Red,
  Blu,
}

impl Team {
  /// Team index as networked in the G15 dump.
  pub fn from_index(index: i32) -> Self {
    match index {
      1 => Team::Spectator,
      2 => Team::Red,
      3 => Team::Blu,
      _ => Team::Unassigned,
    }
  }

  /// Team label printed in lobby debug rows.
  pub fn from_lobby_label(label: &str) -> Self {
    match label {
      "TF_GC_TEAM_DEFENDERS" => Team::Red,
      "TF_GC_TEAM_INVADERS" => Team::Blu,
      _ => Team::Unassigned,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileVisibility {
  Private,
  FriendsOnly,
  #[default]
  Public,
}

/// Lifecycle state derived from time since the last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
  Connected,
  Disconnected,
  Expired,
}

/// Idle thresholds in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
  pub disconnect: i64,
  pub expire: i64,
}

impl Default for Timeouts {
  fn default() -> Self {
    Self {
      disconnect: 6,
      expire: 20,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
  Steam,
  Name,
}

/// Outcome of evaluating a player against one rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
  /// Name of the list that produced the match
  pub origin: String,
  pub tags: Vec<String>,
  pub kind: MatchKind,
}

/// Something that happened between the local user and another player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encounter {
  /// The local user killed them
  KilledByUs,
  /// They killed the local user
  KilledUs,
  /// They left right after being killed
  RageQuit,
}

/// Shown when a profile has no avatar of its own.
pub const DEFAULT_AVATAR_HASH: &str = "fef49e7fa7e1997310d705b2a6158ff8dc1cdfeb";

const AVATAR_BASE_URL: &str = "https://steamcdn-a.akamaihd.net/steamcommunity/public/images/avatars";

/// Full size avatar URL for a profile avatar hash.
pub fn avatar_url(hash: &str) -> String {
  let hash = if hash.is_empty() {
    DEFAULT_AVATAR_HASH
  } else {
    hash
  };
  let prefix: String = hash.chars().take(2).collect();
  format!("{AVATAR_BASE_URL}/{prefix}/{hash}_full.jpg")
}

/// A live player and everything known about them.
#[derive(Debug, Clone, Serialize)]
pub struct Player {
  pub steam_id: SteamId,
  /// Current in-game name. Can differ from the profile name when name stealers are in play.
  pub name: String,
  /// Name held before the most recent change.
  pub name_previous: String,
  pub created_on: i64,
  /// Last time any telemetry mentioned this player.
  pub updated_on: i64,
  pub profile_updated_on: i64,

  // Session stats
  pub team: Team,
  /// Seconds connected to the server, as reported by status.
  pub connected: u32,
  pub user_id: i32,
  pub kills: i32,
  pub deaths: i32,
  pub ping: i32,
  pub health: i32,

  // Profile and ban metadata
  pub real_name: String,
  pub visibility: ProfileVisibility,
  pub avatar_hash: String,
  pub account_created_on: Option<i64>,
  pub community_banned: bool,
  pub vac_bans: u32,
  pub last_vac_ban_on: Option<i64>,
  pub game_bans: u32,
  pub economy_ban: bool,

  // Running history with the local user
  pub kills_on: u32,
  pub deaths_by: u32,
  pub rage_quits: u32,

  pub notes: String,
  pub whitelisted: bool,
  pub our_friend: bool,

  /// Persisted fields changed since the last successful write-back.
  #[serde(skip)]
  pub dirty: bool,

  pub matches: Vec<MatchResult>,
}

impl Player {
  pub fn new(steam_id: SteamId, now: i64) -> Self {
    Self {
      steam_id,
      name: String::new(),
      name_previous: String::new(),
      created_on: now,
      updated_on: now,
      profile_updated_on: 0,
      team: Team::Unassigned,
      connected: 0,
      user_id: 0,
      kills: 0,
      deaths: 0,
      ping: 0,
      health: 0,
      real_name: String::new(),
      visibility: ProfileVisibility::Public,
      avatar_hash: String::new(),
      account_created_on: None,
      community_banned: false,
      vac_bans: 0,
      last_vac_ban_on: None,
      game_bans: 0,
      economy_ban: false,
      kills_on: 0,
      deaths_by: 0,
      rage_quits: 0,
      notes: String::new(),
      whitelisted: false,
      our_friend: false,
      dirty: true,
      matches: Vec::new(),
    }
  }

  pub fn is_matched(&self) -> bool {
    !self.matches.is_empty()
  }

  pub fn state(&self, now: i64, timeouts: Timeouts) -> PlayerState {
    let idle = now - self.updated_on;
    if idle > timeouts.expire {
      PlayerState::Expired
    } else if idle > timeouts.disconnect {
      PlayerState::Disconnected
    } else {
      PlayerState::Connected
    }
  }

  /// Apply a sparse update. Present fields overwrite, absent fields are left alone.
  /// Returns true if a persisted field changed.
  pub fn merge(&mut self, update: &PlayerUpdate) -> bool {
    let mut changed = false;

    if let Some(name) = update.name.as_deref() {
      if !name.is_empty() && name != self.name {
        let previous = std::mem::replace(&mut self.name, name.to_string());
        if !previous.is_empty() {
          self.name_previous = previous;
        }
        changed = true;
      }
    }
    if let Some(team) = update.team {
      self.team = team;
    }
    if let Some(connected) = update.connected {
      self.connected = connected;
    }
    if let Some(user_id) = update.user_id {
      self.user_id = user_id;
    }
    if let Some(kills) = update.kills {
      self.kills = kills;
    }
    if let Some(deaths) = update.deaths {
      self.deaths = deaths;
    }
    if let Some(ping) = update.ping {
      self.ping = ping;
    }
    if let Some(health) = update.health {
      self.health = health;
    }

    changed
  }

  pub fn apply_profile(&mut self, profile: &ProfileUpdate, now: i64) {
    if let Some(real_name) = &profile.real_name {
      self.real_name = real_name.clone();
    }
    if let Some(visibility) = profile.visibility {
      self.visibility = visibility;
    }
    if let Some(avatar_hash) = &profile.avatar_hash {
      self.avatar_hash = avatar_hash.clone();
    }
    if let Some(created) = profile.account_created_on {
      self.account_created_on = Some(created);
    }
    if let Some(banned) = profile.community_banned {
      self.community_banned = banned;
    }
    if let Some(vac_bans) = profile.vac_bans {
      self.vac_bans = vac_bans;
    }
    if let Some(last) = profile.last_vac_ban_on {
      self.last_vac_ban_on = Some(last);
    }
    if let Some(game_bans) = profile.game_bans {
      self.game_bans = game_bans;
    }
    if let Some(economy_ban) = profile.economy_ban {
      self.economy_ban = economy_ban;
    }
    if let Some(our_friend) = profile.our_friend {
      self.our_friend = our_friend;
    }
    self.profile_updated_on = now;
    self.dirty = true;
  }

  pub fn record(&mut self, encounter: Encounter) {
    let counter = match encounter {
      Encounter::KilledByUs => &mut self.kills_on,
      Encounter::KilledUs => &mut self.deaths_by,
      Encounter::RageQuit => &mut self.rage_quits,
    };
    *counter = counter.saturating_add(1);
    self.dirty = true;
  }

  pub fn avatar_url(&self) -> String {
    avatar_url(&self.avatar_hash)
  }
}

/// Canonical sparse update produced by the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerUpdate {
  pub steam_id: Option<SteamId>,
  pub name: Option<String>,
  pub team: Option<Team>,
  pub connected: Option<u32>,
  pub user_id: Option<i32>,
  pub kills: Option<i32>,
  pub deaths: Option<i32>,
  pub ping: Option<i32>,
  pub health: Option<i32>,
}

impl PlayerUpdate {
  pub fn new(steam_id: SteamId) -> Self {
    Self {
      steam_id: Some(steam_id),
      ..Default::default()
    }
  }
}

/// Sparse profile and ban metadata from the profile lookup collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
  pub real_name: Option<String>,
  pub visibility: Option<ProfileVisibility>,
  pub avatar_hash: Option<String>,
  pub account_created_on: Option<i64>,
  pub community_banned: Option<bool>,
  pub vac_bans: Option<u32>,
  pub last_vac_ban_on: Option<i64>,
  pub game_bans: Option<u32>,
  pub economy_ban: Option<bool>,
  /// On the local user's friends list
  pub our_friend: Option<bool>,
}

/// A distinct name observed for an identity. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserNameHistory {
  pub steam_id: SteamId,
  pub name: String,
  pub first_seen: i64,
}

impl UserNameHistory {
  pub fn new(steam_id: SteamId, name: &str, first_seen: i64) -> Result<Self> {
    if name.is_empty() {
      return Err(CoreError::EmptyValue);
    }
    Ok(Self {
      steam_id,
      name: name.to_string(),
      first_seen,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sid() -> SteamId {
    SteamId::from_account_id(22202).unwrap()
  }

  #[test]
  fn test_state_thresholds() {
    let player = Player::new(sid(), 1000);
    let timeouts = Timeouts::default();
    assert_eq!(player.state(1000, timeouts), PlayerState::Connected);
    assert_eq!(player.state(1006, timeouts), PlayerState::Connected);
    assert_eq!(player.state(1007, timeouts), PlayerState::Disconnected);
    assert_eq!(player.state(1020, timeouts), PlayerState::Disconnected);
    assert_eq!(player.state(1021, timeouts), PlayerState::Expired);
  }

  #[test]
  fn test_merge_is_sparse() {
    let mut player = Player::new(sid(), 0);
    player.dirty = false;

    let changed = player.merge(&PlayerUpdate {
      ping: Some(45),
      kills: Some(3),
      ..PlayerUpdate::new(sid())
    });
    assert!(!changed);
    assert_eq!(player.ping, 45);
    assert_eq!(player.kills, 3);

    let changed = player.merge(&PlayerUpdate {
      name: Some("Alice".to_string()),
      ..PlayerUpdate::new(sid())
    });
    assert!(changed);
    assert_eq!(player.name, "Alice");
    assert_eq!(player.ping, 45);
    assert_eq!(player.kills, 3);

    // Empty names never clobber a known name
    assert!(!player.merge(&PlayerUpdate {
      name: Some(String::new()),
      ..PlayerUpdate::new(sid())
    }));
    assert_eq!(player.name, "Alice");
  }

  #[test]
  fn test_name_change_keeps_previous() {
    let mut player = Player::new(sid(), 0);
    player.merge(&PlayerUpdate {
      name: Some("Alice".to_string()),
      ..PlayerUpdate::new(sid())
    });
    assert!(player.name_previous.is_empty());

    player.merge(&PlayerUpdate {
      name: Some("Alice2".to_string()),
      ..PlayerUpdate::new(sid())
    });
    assert_eq!(player.name, "Alice2");
    assert_eq!(player.name_previous, "Alice");
  }

  #[test]
  fn test_record_encounters() {
    let mut player = Player::new(sid(), 0);
    player.dirty = false;
    player.record(Encounter::KilledByUs);
    player.record(Encounter::KilledByUs);
    player.record(Encounter::KilledUs);
    player.record(Encounter::RageQuit);
    assert_eq!(
      (player.kills_on, player.deaths_by, player.rage_quits),
      (2, 1, 1)
    );
    assert!(player.dirty);
  }

  #[test]
  fn test_avatar_url() {
    let mut player = Player::new(sid(), 0);
    assert_eq!(
      player.avatar_url(),
      "https://steamcdn-a.akamaihd.net/steamcommunity/public/images/avatars/fe/fef49e7fa7e1997310d705b2a6158ff8dc1cdfeb_full.jpg"
    );
    player.apply_profile(
      &ProfileUpdate {
        avatar_hash: Some("ab12".to_string()),
        our_friend: Some(true),
        ..Default::default()
      },
      10,
    );
    assert!(player.avatar_url().ends_with("/ab/ab12_full.jpg"));
    assert!(player.our_friend);
  }

  #[test]
  fn test_team_mapping() {
    assert_eq!(Team::from_index(2), Team::Red);
    assert_eq!(Team::from_index(3), Team::Blu);
    assert_eq!(Team::from_index(42), Team::Unassigned);
    assert_eq!(Team::from_lobby_label("TF_GC_TEAM_INVADERS"), Team::Blu);
  }

  #[test]
  fn test_name_history_rejects_empty() {
    assert!(matches!(
      UserNameHistory::new(sid(), "", 0),
      Err(CoreError::EmptyValue)
    ));
    assert_eq!(UserNameHistory::new(sid(), "Bob", 5).unwrap().first_seen, 5);
  }
}
