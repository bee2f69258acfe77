use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// First SteamID64 of the individual account range in the public universe.
const BASE: u64 = 76561197960265728;

/// Stable 64-bit platform identity of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SteamId(u64);

impl SteamId {
  /// Wrap a raw SteamID64, rejecting anything outside the individual account range.
  pub fn new(id: u64) -> Option<Self> {
    let sid = Self(id);
    sid.is_valid().then_some(sid)
  }

  /// Expand a 32-bit account id into the full community identity.
  /// Account id 0 is never assigned and fails to resolve.
  pub fn from_account_id(account_id: u32) -> Option<Self> {
    if account_id == 0 {
      return None;
    }
    Some(Self(BASE + u64::from(account_id)))
  }

  pub fn is_valid(&self) -> bool {
    self.0 > BASE && self.0 - BASE <= u64::from(u32::MAX)
  }

  pub fn as_u64(&self) -> u64 {
    self.0
  }

  pub fn account_id(&self) -> u32 {
    (self.0 - BASE) as u32
  }

  /// `[U:1:<account>]` rendering used by the game console.
  pub fn steam3(&self) -> String {
    format!("[U:1:{}]", self.account_id())
  }
}

impl fmt::Display for SteamId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for SteamId {
  type Err = CoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let invalid = || CoreError::InvalidSteamId(s.to_string());

    // [U:1:22202]
    if let Some(inner) = s.strip_prefix("[U:").and_then(|r| r.strip_suffix(']')) {
      let (_, account) = inner.split_once(':').ok_or_else(invalid)?;
      let account: u32 = account.parse().map_err(|_| invalid())?;
      return Self::from_account_id(account).ok_or_else(invalid);
    }

    // STEAM_0:0:11101
    if let Some(inner) = s.strip_prefix("STEAM_") {
      let mut parts = inner.split(':').skip(1);
      let y: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
      let z: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
      if y > 1 {
        return Err(invalid());
      }
      let account = z.checked_mul(2).and_then(|a| a.checked_add(y)).ok_or_else(invalid)?;
      return Self::from_account_id(account).ok_or_else(invalid);
    }

    let id: u64 = s.parse().map_err(|_| invalid())?;
    Self::new(id).ok_or_else(invalid)
  }
}

impl TryFrom<String> for SteamId {
  type Error = CoreError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<SteamId> for String {
  fn from(sid: SteamId) -> Self {
    sid.0.to_string()
  }
}
