//! Decoder for the game's G15 debug dump.
//!
//! Each line of a dump has the form `FIELD[INDEX] TYPE (VALUE)`. The dump
//! routinely contains partially initialised slots, so decoding never fails:
//! lines that don't match the grammar are skipped, indices outside the slot
//! range are dropped, and values that fail their typed conversion fall back
//! to zero/false.

use std::sync::LazyLock;

use regex::Regex;

use crate::steamid::SteamId;

/// Client slot capacity of the dump.
pub const MAX_SLOTS: usize = 101;

static LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^(m_szName|m_iPing|m_iScore|m_iDeaths|m_bConnected|m_iTeam|m_bAlive|m_iHealth|m_iAccountID|m_bValid|m_iUserID)\[(\d+)\]\s(integer|bool|string)\s\((.*?)\)$",
  )
  .expect("static regex")
});

/// One poll's worth of per-slot attributes, indexed by in-game client slot.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpPlayer {
  pub names: [String; MAX_SLOTS],
  pub ping: [i32; MAX_SLOTS],
  pub score: [i32; MAX_SLOTS],
  pub deaths: [i32; MAX_SLOTS],
  pub connected: [bool; MAX_SLOTS],
  pub team: [i32; MAX_SLOTS],
  pub alive: [bool; MAX_SLOTS],
  pub health: [i32; MAX_SLOTS],
  /// Expanded community identity, `None` when the account id didn't resolve.
  pub steam_id: [Option<SteamId>; MAX_SLOTS],
  pub valid: [bool; MAX_SLOTS],
  pub user_id: [i32; MAX_SLOTS],
}

impl Default for DumpPlayer {
  fn default() -> Self {
    Self {
      names: std::array::from_fn(|_| String::new()),
      ping: [0; MAX_SLOTS],
      score: [0; MAX_SLOTS],
      deaths: [0; MAX_SLOTS],
      connected: [false; MAX_SLOTS],
      team: [0; MAX_SLOTS],
      alive: [false; MAX_SLOTS],
      health: [0; MAX_SLOTS],
      steam_id: [None; MAX_SLOTS],
      valid: [false; MAX_SLOTS],
      user_id: [0; MAX_SLOTS],
    }
  }
}

impl DumpPlayer {
  /// Slots flagged valid by the dump.
  pub fn valid_slots(&self) -> impl Iterator<Item = usize> + '_ {
    (0..MAX_SLOTS).filter(|&slot| self.valid[slot])
  }
}

/// Decode a full dump into a caller-owned snapshot.
///
/// `data` is reset before decoding so stale slots from a previous poll never
/// leak through.
pub fn parse(text: &str, data: &mut DumpPlayer) {
  *data = DumpPlayer::default();

  for line in text.lines() {
    let Some(caps) = LINE.captures(line.trim_end_matches('\r')) else {
      continue;
    };

    let Some(index) = caps[2].parse::<usize>().ok().filter(|&i| i < MAX_SLOTS) else {
      continue;
    };
    let value = caps.get(4).map_or("", |m| m.as_str());

    match &caps[1] {
      "m_szName" => data.names[index] = value.to_string(),
      "m_iPing" => data.ping[index] = int_value(value),
      "m_iScore" => data.score[index] = int_value(value),
      "m_iDeaths" => data.deaths[index] = int_value(value),
      "m_bConnected" => data.connected[index] = bool_value(value),
      "m_iTeam" => data.team[index] = int_value(value),
      "m_bAlive" => data.alive[index] = bool_value(value),
      "m_iHealth" => data.health[index] = int_value(value),
      // Account ids are printed as signed 32-bit integers
      "m_iAccountID" => data.steam_id[index] = SteamId::from_account_id(int_value(value) as u32),
      "m_bValid" => data.valid[index] = bool_value(value),
      "m_iUserID" => data.user_id[index] = int_value(value),
      _ => {}
    }
  }
}

fn int_value(s: &str) -> i32 {
  s.trim().parse().unwrap_or(0)
}

fn bool_value(s: &str) -> bool {
  matches!(s.trim(), "1" | "t" | "T" | "true" | "TRUE" | "True")
}
