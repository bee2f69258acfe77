//! Conversion of raw adapter output into canonical sparse player updates.

use std::sync::LazyLock;

use arrayvec::ArrayVec;
use regex::Regex;
use tracing::trace;

use crate::g15::{self, DumpPlayer, MAX_SLOTS};
use crate::models::{PlayerUpdate, Team};
use crate::steamid::SteamId;

/// Updates from a single telemetry event, bounded by server capacity.
pub type UpdateBatch = ArrayVec<PlayerUpdate, MAX_SLOTS>;

// #    672 "some name"   [U:1:1009818425]     22:55       67    0 active
static STATUS: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"^#\s+(\d+)\s+"(.*)"\s+(\[U:\d:\d+\])\s+(\d+(?::\d+){1,2})\s+(\d+)\s+\d+\s+\w+\s*$"#)
    .expect("static regex")
});

//   Member[0] [U:1:1136234297]  team = TF_GC_TEAM_INVADERS  type = MATCH_PLAYER
static LOBBY: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^\s*(?:Member|Pending)\[\d+\]\s+(\[U:\d:\d+\])\s+team\s=\s(\w+)\s+type\s=\s\w+")
    .expect("static regex")
});

/// Raw output of one adapter.
#[derive(Debug, Clone, Copy)]
pub enum Telemetry<'a> {
  /// A single line from the tailed console log.
  LogLine(&'a str),
  /// Full response text of a remote console `status` query.
  RconStatus(&'a str),
  /// Full text of one G15 dump.
  G15Dump(&'a str),
}

impl Telemetry<'_> {
  pub fn normalize(&self) -> UpdateBatch {
    let mut batch = UpdateBatch::new();
    match self {
      Telemetry::LogLine(line) => {
        if let Some(update) = from_log_line(line) {
          batch.push(update);
        }
      }
      Telemetry::RconStatus(text) => {
        for update in text.lines().filter_map(from_log_line) {
          if batch.try_push(update).is_err() {
            break;
          }
        }
      }
      Telemetry::G15Dump(text) => {
        let mut data = DumpPlayer::default();
        g15::parse(text, &mut data);
        batch = updates_from_dump(&data);
      }
    }
    batch
  }
}

/// Parse a status or lobby row. Every other line yields nothing.
pub fn from_log_line(line: &str) -> Option<PlayerUpdate> {
  let line = line.trim_end_matches(['\r', '\n']);

  if let Some(caps) = STATUS.captures(line) {
    let steam_id: SteamId = caps[3].parse().ok()?;
    return Some(PlayerUpdate {
      user_id: caps[1].parse().ok(),
      name: Some(caps[2].to_string()).filter(|n| !n.is_empty()),
      connected: parse_duration(&caps[4]),
      ping: caps[5].parse().ok(),
      ..PlayerUpdate::new(steam_id)
    });
  }

  if let Some(caps) = LOBBY.captures(line) {
    let steam_id: SteamId = caps[1].parse().ok()?;
    return Some(PlayerUpdate {
      team: Some(Team::from_lobby_label(&caps[2])),
      ..PlayerUpdate::new(steam_id)
    });
  }

  None
}

/// One update per valid slot whose identity resolved.
pub fn updates_from_dump(data: &DumpPlayer) -> UpdateBatch {
  let mut batch = UpdateBatch::new();
  for slot in data.valid_slots() {
    let Some(steam_id) = data.steam_id[slot] else {
      trace!(slot, "dropping dump slot without identity");
      continue;
    };
    let name = &data.names[slot];
    batch.push(PlayerUpdate {
      name: (!name.is_empty()).then(|| name.clone()),
      ping: Some(data.ping[slot]),
      kills: Some(data.score[slot]),
      deaths: Some(data.deaths[slot]),
      team: Some(Team::from_index(data.team[slot])),
      health: Some(data.health[slot]),
      user_id: Some(data.user_id[slot]),
      ..PlayerUpdate::new(steam_id)
    });
  }
  batch
}

/// `mm:ss` or `h:mm:ss` to seconds.
fn parse_duration(s: &str) -> Option<u32> {
  s.split(':')
    .try_fold(0u32, |acc, part| {
      acc.checked_mul(60)?.checked_add(part.parse().ok()?)
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sid(account: u32) -> SteamId {
    SteamId::from_account_id(account).unwrap()
  }

  #[test]
  fn test_status_row() {
    let update =
      from_log_line(r#"#    672 "some name"   [U:1:1009818425]     22:55       67    0 active"#).unwrap();
    assert_eq!(update.steam_id, Some(sid(1009818425)));
    assert_eq!(update.user_id, Some(672));
    assert_eq!(update.name.as_deref(), Some("some name"));
    assert_eq!(update.connected, Some(22 * 60 + 55));
    assert_eq!(update.ping, Some(67));
    assert_eq!(update.team, None);
    assert_eq!(update.kills, None);
  }

  #[test]
  fn test_status_row_hours() {
    let update =
      from_log_line("#      3 \"x\"  [U:1:22202]  1:02:03   50    0 spawning\r\n").unwrap();
    assert_eq!(update.connected, Some(3723));
  }

  #[test]
  fn test_lobby_row() {
    let update =
      from_log_line("  Member[0] [U:1:1136234297]  team = TF_GC_TEAM_INVADERS  type = MATCH_PLAYER")
        .unwrap();
    assert_eq!(update.steam_id, Some(sid(1136234297)));
    assert_eq!(update.team, Some(Team::Blu));
    assert_eq!(update.name, None);
  }

  #[test]
  fn test_other_lines_ignored() {
    assert!(from_log_line("Alice killed Bob with scattergun.").is_none());
    assert!(from_log_line("#      2 \"Bot\" BOT active").is_none());
    assert!(from_log_line("#    1 \"zero\" [U:1:0] 00:10 10 0 active").is_none());
    assert!(from_log_line("").is_none());
  }

  #[test]
  fn test_rcon_status_response() {
    let text = concat!(
      "hostname: Valve Matchmaking Server\n",
      "# userid name                uniqueid            connected ping loss state\n",
      "#    672 \"one\"   [U:1:100]     22:55       67    0 active\n",
      "#    673 \"two\"   [U:1:200]     01:05       30    0 active\n",
    );
    let batch = Telemetry::RconStatus(text).normalize();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1].steam_id, Some(sid(200)));
    assert_eq!(batch[1].connected, Some(65));
  }

  #[test]
  fn test_dump_updates() {
    let dump = concat!(
      "m_szName[1] string (Alice)\n",
      "m_iAccountID[1] integer (22202)\n",
      "m_bValid[1] bool (true)\n",
      "m_iScore[1] integer (9)\n",
      "m_iTeam[1] integer (2)\n",
      // valid but unresolvable identity
      "m_bValid[2] bool (true)\n",
      "m_iAccountID[2] integer (0)\n",
      // identity but not valid
      "m_iAccountID[3] integer (333)\n",
    );
    let batch = Telemetry::G15Dump(dump).normalize();
    assert_eq!(batch.len(), 1);
    let update = &batch[0];
    assert_eq!(update.steam_id, Some(sid(22202)));
    assert_eq!(update.name.as_deref(), Some("Alice"));
    assert_eq!(update.kills, Some(9));
    assert_eq!(update.team, Some(Team::Red));
    assert_eq!(update.connected, None);
  }

  #[test]
  fn test_parse_duration() {
    assert_eq!(parse_duration("00:00"), Some(0));
    assert_eq!(parse_duration("10:00"), Some(600));
    assert_eq!(parse_duration("a:00"), None);
    assert_eq!(parse_duration("71582788:16"), None);
  }

  #[test]
  fn test_status_row_with_oversized_duration() {
    let update = from_log_line("#    1 \"x\" [U:1:5] 71582788:16 10 0 active").unwrap();
    assert_eq!(update.steam_id, Some(sid(5)));
    assert_eq!(update.connected, None);
    assert_eq!(update.ping, Some(10));
  }
}
