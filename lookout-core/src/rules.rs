//! Rule lists and the matching engine.
//!
//! The loaded list set lives behind an `Arc` snapshot. Readers clone the
//! `Arc` and evaluate without holding any lock; writers build a new
//! snapshot and publish it in one swap, so a reader never observes a half
//! reloaded set.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::models::{MatchKind, MatchResult};
use crate::steamid::SteamId;

/// Name of the in-process list that holds manual marks.
pub const LOCAL_LIST: &str = "local";

// ============================================================================
// Documents
// ============================================================================

/// A parsed rule list as handed over by the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleListDoc {
  pub name: String,
  /// Applied to entries that carry no tags of their own
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub steam_ids: Vec<SteamEntry>,
  #[serde(default)]
  pub name_patterns: Vec<NamePattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteamEntry {
  pub steam_id: SteamId,
  #[serde(default)]
  pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternMode {
  Contains,
  Equal,
  StartsWith,
  EndsWith,
  Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamePattern {
  pub mode: PatternMode,
  pub pattern: String,
  #[serde(default)]
  pub case_sensitive: bool,
  #[serde(default)]
  pub tags: Vec<String>,
}

// ============================================================================
// Compiled lists
// ============================================================================

#[derive(Debug, Clone)]
enum TextMatch {
  Contains(String),
  Equal(String),
  StartsWith(String),
  EndsWith(String),
  Regex(Regex),
}

#[derive(Debug, Clone)]
struct NameRule {
  text: TextMatch,
  case_sensitive: bool,
  tags: Vec<String>,
  /// As written in the document, for write-back
  source: NamePattern,
}

impl NameRule {
  fn compile(list: &str, pattern: &NamePattern, tags: Vec<String>) -> Result<Self> {
    let needle = if pattern.case_sensitive {
      pattern.pattern.clone()
    } else {
      pattern.pattern.to_lowercase()
    };
    let text = match pattern.mode {
      PatternMode::Contains => TextMatch::Contains(needle),
      PatternMode::Equal => TextMatch::Equal(needle),
      PatternMode::StartsWith => TextMatch::StartsWith(needle),
      PatternMode::EndsWith => TextMatch::EndsWith(needle),
      PatternMode::Regex => TextMatch::Regex(
        RegexBuilder::new(&pattern.pattern)
          .case_insensitive(!pattern.case_sensitive)
          .build()
          .map_err(|source| CoreError::InvalidPattern {
            list: list.to_string(),
            pattern: pattern.pattern.clone(),
            source,
          })?,
      ),
    };
    Ok(Self {
      text,
      case_sensitive: pattern.case_sensitive,
      tags,
      source: pattern.clone(),
    })
  }

  fn is_match(&self, name: &str) -> bool {
    // Regexes carry their own case flag
    let folded;
    let name = if self.case_sensitive || matches!(self.text, TextMatch::Regex(_)) {
      name
    } else {
      folded = name.to_lowercase();
      &folded
    };
    match &self.text {
      TextMatch::Contains(s) => name.contains(s.as_str()),
      TextMatch::Equal(s) => name == s,
      TextMatch::StartsWith(s) => name.starts_with(s.as_str()),
      TextMatch::EndsWith(s) => name.ends_with(s.as_str()),
      TextMatch::Regex(rx) => rx.is_match(name),
    }
  }
}

#[derive(Debug, Clone, Default)]
struct RuleList {
  name: String,
  tags: Vec<String>,
  steam_ids: HashMap<SteamId, Vec<String>>,
  /// Entry tags as written, empty when the entry inherits the list tags
  entry_tags: HashMap<SteamId, Vec<String>>,
  name_rules: Vec<NameRule>,
  /// Patterns that failed to compile. Never matched, but kept for write-back.
  rejected: Vec<NamePattern>,
}

impl RuleList {
  fn empty(name: &str) -> Self {
    Self {
      name: name.to_string(),
      ..Default::default()
    }
  }

  /// Compile a document. Bad patterns are skipped and returned alongside the list.
  fn compile(doc: RuleListDoc) -> (Self, Vec<CoreError>) {
    let mut rejected = Vec::new();
    let mut list = Self::empty(&doc.name);

    for entry in doc.steam_ids {
      let tags = if entry.tags.is_empty() {
        doc.tags.clone()
      } else {
        entry.tags.clone()
      };
      list.steam_ids.insert(entry.steam_id, tags);
      list.entry_tags.insert(entry.steam_id, entry.tags);
    }

    for pattern in doc.name_patterns {
      let tags = if pattern.tags.is_empty() {
        doc.tags.clone()
      } else {
        pattern.tags.clone()
      };
      match NameRule::compile(&doc.name, &pattern, tags) {
        Ok(rule) => list.name_rules.push(rule),
        Err(err) => {
          warn!(list = %doc.name, error = %err, "skipping invalid name pattern");
          rejected.push(err);
          list.rejected.push(pattern);
        }
      }
    }

    list.tags = doc.tags;
    (list, rejected)
  }

  fn match_steam(&self, steam_id: SteamId) -> Option<MatchResult> {
    self.steam_ids.get(&steam_id).map(|tags| MatchResult {
      origin: self.name.clone(),
      tags: tags.clone(),
      kind: MatchKind::Steam,
    })
  }

  fn match_name(&self, name: &str) -> Option<MatchResult> {
    self
      .name_rules
      .iter()
      .find(|rule| rule.is_match(name))
      .map(|rule| MatchResult {
        origin: self.name.clone(),
        tags: rule.tags.clone(),
        kind: MatchKind::Name,
      })
  }

  fn insert(&mut self, steam_id: SteamId, tags: Vec<String>) {
    self.entry_tags.insert(steam_id, tags.clone());
    self.steam_ids.insert(steam_id, tags);
  }

  fn remove(&mut self, steam_id: SteamId) -> bool {
    self.entry_tags.remove(&steam_id);
    self.steam_ids.remove(&steam_id).is_some()
  }

  fn to_doc(&self) -> RuleListDoc {
    let mut steam_ids: Vec<SteamEntry> = self
      .entry_tags
      .iter()
      .map(|(steam_id, tags)| SteamEntry {
        steam_id: *steam_id,
        tags: tags.clone(),
      })
      .collect();
    steam_ids.sort_by_key(|e| e.steam_id);

    // Rejected patterns are written after the valid ones
    let name_patterns = self
      .name_rules
      .iter()
      .map(|rule| rule.source.clone())
      .chain(self.rejected.iter().cloned())
      .collect();

    RuleListDoc {
      name: self.name.clone(),
      tags: self.tags.clone(),
      steam_ids,
      name_patterns,
    }
  }
}

/// Immutable view of every list the engine knows about.
#[derive(Debug, Clone)]
pub struct RuleSet {
  local: RuleList,
  lists: Arc<Vec<RuleList>>,
  whitelist: Arc<HashSet<SteamId>>,
}

impl RuleSet {
  fn lists(&self) -> impl Iterator<Item = &RuleList> {
    std::iter::once(&self.local).chain(self.lists.iter())
  }

  pub fn whitelisted(&self, steam_id: SteamId) -> bool {
    self.whitelist.contains(&steam_id)
  }

  pub fn match_steam(&self, steam_id: SteamId) -> Vec<MatchResult> {
    if self.whitelisted(steam_id) {
      return Vec::new();
    }
    self.lists().filter_map(|l| l.match_steam(steam_id)).collect()
  }

  pub fn match_name(&self, name: &str) -> Vec<MatchResult> {
    if name.is_empty() {
      return Vec::new();
    }
    self.lists().filter_map(|l| l.match_name(name)).collect()
  }

  /// Full evaluation of one identity and every name it has used.
  pub fn evaluate(&self, steam_id: SteamId, names: &[&str]) -> Vec<MatchResult> {
    if self.whitelisted(steam_id) {
      return Vec::new();
    }
    let mut results = self.match_steam(steam_id);
    for name in names {
      for result in self.match_name(name) {
        if !results
          .iter()
          .any(|r| r.origin == result.origin && r.kind == result.kind)
        {
          results.push(result);
        }
      }
    }
    results
  }

  /// Number of entries in the local marks list.
  pub fn local_len(&self) -> usize {
    self.local.steam_ids.len()
  }
}

/// Whitelist status and match evidence, taken from one view of the rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
  pub whitelisted: bool,
  pub matches: Vec<MatchResult>,
}

/// Anything that can produce match evidence for an identity and its names.
///
/// Implementations must answer from a single consistent rule view so the
/// whitelist flag and the matches never disagree.
pub trait Matcher {
  fn verdict(&self, steam_id: SteamId, names: &[&str]) -> Verdict;
}

impl Matcher for RuleSet {
  fn verdict(&self, steam_id: SteamId, names: &[&str]) -> Verdict {
    Verdict {
      whitelisted: self.whitelisted(steam_id),
      matches: self.evaluate(steam_id, names),
    }
  }
}

/// Summary of a wholesale list reload.
#[derive(Debug, Default)]
pub struct LoadReport {
  pub lists: usize,
  pub steam_ids: usize,
  pub name_rules: usize,
  pub rejected: Vec<CoreError>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct RuleEngine {
  current: RwLock<Arc<RuleSet>>,
}

impl RuleEngine {
  pub fn new() -> Self {
    Self {
      current: RwLock::new(Arc::new(RuleSet {
        local: RuleList::empty(LOCAL_LIST),
        lists: Arc::new(Vec::new()),
        whitelist: Arc::new(HashSet::new()),
      })),
    }
  }

  /// Consistent view of the current list set.
  pub fn snapshot(&self) -> Arc<RuleSet> {
    self
      .current
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Build the next snapshot from the current one and publish it.
  /// Nothing is published if `f` fails.
  fn try_publish<T>(&self, f: impl FnOnce(&mut RuleSet) -> Result<T>) -> Result<T> {
    let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
    let mut next = RuleSet::clone(&current);
    let out = f(&mut next)?;
    *current = Arc::new(next);
    Ok(out)
  }

  fn publish(&self, f: impl FnOnce(&mut RuleSet)) {
    let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
    let mut next = RuleSet::clone(&current);
    f(&mut next);
    *current = Arc::new(next);
  }

  /// Replace every loaded list. The local marks list and whitelist are kept.
  pub fn load(&self, docs: Vec<RuleListDoc>) -> LoadReport {
    let mut report = LoadReport::default();
    let mut lists = Vec::with_capacity(docs.len());

    for doc in docs {
      let (list, rejected) = RuleList::compile(doc);
      report.steam_ids += list.steam_ids.len();
      report.name_rules += list.name_rules.len();
      report.rejected.extend(rejected);
      lists.push(list);
    }
    report.lists = lists.len();

    let lists = Arc::new(lists);
    self.publish(|set| set.lists = lists);

    info!(
      lists = report.lists,
      steam_ids = report.steam_ids,
      name_rules = report.name_rules,
      rejected = report.rejected.len(),
      "loaded rule lists"
    );
    report
  }

  pub fn match_steam(&self, steam_id: SteamId) -> Vec<MatchResult> {
    self.snapshot().match_steam(steam_id)
  }

  pub fn match_name(&self, name: &str) -> Vec<MatchResult> {
    self.snapshot().match_name(name)
  }

  pub fn whitelisted(&self, steam_id: SteamId) -> bool {
    self.snapshot().whitelisted(steam_id)
  }

  pub fn evaluate(&self, steam_id: SteamId, names: &[&str]) -> Vec<MatchResult> {
    self.snapshot().evaluate(steam_id, names)
  }

  /// Add an identity to the local marks list.
  pub fn mark(&self, steam_id: SteamId, attrs: Vec<String>) -> Result<()> {
    if attrs.is_empty() {
      return Err(CoreError::EmptyAttributes);
    }
    self.try_publish(|set| {
      if set.local.steam_ids.contains_key(&steam_id) {
        return Err(CoreError::AlreadyMarked(steam_id));
      }
      set.local.insert(steam_id, attrs);
      Ok(())
    })?;
    debug!(%steam_id, "marked player");
    Ok(())
  }

  /// Remove an identity from the local marks list, returning how many entries remain.
  pub fn unmark(&self, steam_id: SteamId) -> Result<usize> {
    let remaining = self.try_publish(|set| {
      if !set.local.remove(steam_id) {
        return Err(CoreError::NotFound(steam_id));
      }
      Ok(set.local.steam_ids.len())
    })?;
    debug!(%steam_id, remaining, "unmarked player");
    Ok(remaining)
  }

  pub fn whitelist(&self, steam_id: SteamId) -> Result<()> {
    self.publish(|set| {
      let mut whitelist = HashSet::clone(&set.whitelist);
      whitelist.insert(steam_id);
      set.whitelist = Arc::new(whitelist);
    });
    Ok(())
  }

  pub fn unwhitelist(&self, steam_id: SteamId) -> Result<()> {
    self.try_publish(|set| {
      let mut whitelist = HashSet::clone(&set.whitelist);
      if !whitelist.remove(&steam_id) {
        return Err(CoreError::NotFound(steam_id));
      }
      set.whitelist = Arc::new(whitelist);
      Ok(())
    })
  }

  /// Every tag used across all lists, sorted.
  pub fn unique_tags(&self) -> Vec<String> {
    let set = self.snapshot();
    let mut tags = BTreeSet::new();
    for list in set.lists() {
      tags.extend(list.tags.iter().cloned());
      for entry_tags in list.steam_ids.values() {
        tags.extend(entry_tags.iter().cloned());
      }
      for rule in &list.name_rules {
        tags.extend(rule.tags.iter().cloned());
      }
    }
    tags.into_iter().collect()
  }

  /// The local marks list in document form, for write-back.
  pub fn export_local(&self) -> RuleListDoc {
    self.snapshot().local.to_doc()
  }

  /// Replace the local marks list, e.g. with one previously exported.
  pub fn restore_local(&self, doc: RuleListDoc) -> LoadReport {
    let (mut local, rejected) = RuleList::compile(doc);
    local.name = LOCAL_LIST.to_string();
    let report = LoadReport {
      lists: 1,
      steam_ids: local.steam_ids.len(),
      name_rules: local.name_rules.len(),
      rejected,
    };
    self.publish(|set| set.local = local);
    report
  }
}

impl Default for RuleEngine {
  fn default() -> Self {
    Self::new()
  }
}

impl Matcher for RuleEngine {
  /// Reads the snapshot that is current at the time of the call.
  fn verdict(&self, steam_id: SteamId, names: &[&str]) -> Verdict {
    self.snapshot().verdict(steam_id, names)
  }
}
