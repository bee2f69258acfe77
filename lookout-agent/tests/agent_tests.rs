use std::path::Path;
use std::time::Duration;

use lookout_agent::commands::Command;
use lookout_agent::config::Config;
use lookout_agent::tail::{LogTail, LogWatcher};
use lookout_agent::{Agent, AgentError, loader};
use lookout_core::{CoreError, SteamId};
use serde_json::json;
use tempfile::TempDir;

const ALICE: u64 = 76561197960287930; // [U:1:22202]

fn sid(id: u64) -> SteamId {
    SteamId::new(id).unwrap()
}

/// Helper to write a JSON rule list into the temp dir
fn write_json(dir: &Path, file: &str, value: serde_json::Value) -> std::path::PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    path
}

async fn agent_with(config: Config) -> Agent {
    Agent::new(config).await.expect("Failed to create agent")
}

// =============================================================================
// RULE LIST LOADING
// =============================================================================

#[tokio::test]
async fn test_lists_loaded_and_bad_file_skipped() {
    // GIVEN: one good list, one broken file, one missing file
    let dir = TempDir::new().unwrap();
    let good = write_json(
        dir.path(),
        "bots.json",
        json!({
            "name": "bots",
            "tags": ["bot"],
            "steam_ids": [{ "steam_id": ALICE.to_string() }],
            "name_patterns": [
                { "mode": "regex", "pattern": "(broken" },
                { "mode": "contains", "pattern": "omega" }
            ]
        }),
    );
    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, b"{ not json").unwrap();
    let missing = dir.path().join("missing.json");

    let config = Config {
        rule_lists: vec![good, broken, missing],
        ..Config::default()
    };

    // WHEN: the agent starts
    let agent = agent_with(config).await;

    // THEN: the good list is active, with its one valid pattern
    let rules = agent.tracker().rules();
    assert_eq!(rules.match_steam(sid(ALICE)).len(), 1);
    assert_eq!(rules.match_name("OmegaTronic")[0].origin, "bots");
    assert_eq!(rules.unique_tags(), vec!["bot".to_string()]);
}

#[tokio::test]
async fn test_read_list_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, b"[]").unwrap();

    let err = loader::read_list(&path).await.unwrap_err();
    assert!(matches!(err, AgentError::RuleList { path: p, .. } if p == path));
}

// =============================================================================
// TELEMETRY
// =============================================================================

#[tokio::test]
async fn test_ingest_status_and_lobby_lines() {
    let agent = agent_with(Config::default()).await;

    let lines = vec![
        "#    672 \"Alice\"   [U:1:22202]     02:10       67    0 active".to_string(),
        "  Member[0] [U:1:22202]  team = TF_GC_TEAM_DEFENDERS  type = MATCH_PLAYER".to_string(),
        "Alice killed Bob with tf_projectile_rocket.".to_string(),
    ];
    let applied = agent.ingest_lines(&lines).await;
    assert_eq!(applied, 2);

    let player = agent.tracker().registry().get(sid(ALICE)).await.unwrap();
    assert_eq!(player.name, "Alice");
    assert_eq!(player.connected, 130);
    assert_eq!(player.ping, 67);
    assert_eq!(player.team, lookout_core::Team::Red);
}

#[tokio::test]
async fn test_poll_dump() {
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("g15.txt");

    let config = Config {
        g15_dump_path: Some(dump.clone()),
        ..Config::default()
    };
    let agent = agent_with(config).await;

    // Missing dump is not an error
    assert_eq!(agent.poll_dump().await.unwrap(), 0);

    std::fs::write(
        &dump,
        "m_szName[2] string (Alice)\nm_iAccountID[2] integer (22202)\nm_bValid[2] bool (true)\nm_iHealth[2] integer (150)\n",
    )
    .unwrap();
    assert_eq!(agent.poll_dump().await.unwrap(), 1);

    let player = agent.tracker().registry().get(sid(ALICE)).await.unwrap();
    assert_eq!(player.health, 150);
}

#[tokio::test]
async fn test_log_tail_reads_only_new_complete_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("console.log");
    std::fs::write(&path, "old line\n").unwrap();

    let mut tail = LogTail::open_at_end(&path).await.unwrap();
    assert!(tail.read_new_lines().await.unwrap().is_empty());

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"first\r\nsecond\npart").unwrap();
    file.flush().unwrap();
    assert_eq!(tail.read_new_lines().await.unwrap(), vec!["first", "second"]);

    file.write_all(b"ial\n").unwrap();
    file.flush().unwrap();
    assert_eq!(tail.read_new_lines().await.unwrap(), vec!["partial"]);

    // Truncation restarts from the top
    std::fs::write(&path, "fresh\n").unwrap();
    assert_eq!(tail.read_new_lines().await.unwrap(), vec!["fresh"]);
}

#[tokio::test]
async fn test_log_watcher_reports_log_writes() {
    // GIVEN: a watcher on a log that doesn't exist yet
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("console.log");
    let mut watcher = LogWatcher::new(&path).unwrap();
    let mut tail = LogTail::open_at_end(&path).await.unwrap();

    // WHEN: an unrelated file changes, then the log is created
    std::fs::write(dir.path().join("other.txt"), "noise\n").unwrap();
    std::fs::write(&path, "#  1 \"Alice\" [U:1:22202] 00:30 40 0 active\n").unwrap();

    // THEN: the watcher fires for the log and the new line is readable
    let changed = tokio::time::timeout(Duration::from_secs(5), watcher.changed())
        .await
        .expect("no change reported");
    assert_eq!(changed, Some(()));
    assert_eq!(tail.read_new_lines().await.unwrap().len(), 1);
}

// =============================================================================
// COMMANDS
// =============================================================================

#[tokio::test]
async fn test_mark_persists_local_list() {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("local.json");
    let config = Config {
        local_list_path: Some(local.clone()),
        ..Config::default()
    };

    let agent = agent_with(config.clone()).await;
    agent
        .ingest_lines(&["#  1 \"Alice\" [U:1:22202] 00:30 40 0 active".to_string()])
        .await;

    agent
        .execute(Command::parse("mark [U:1:22202] cheater").unwrap())
        .await
        .unwrap();
    let player = agent.tracker().registry().get(sid(ALICE)).await.unwrap();
    assert_eq!(player.matches.len(), 1);
    assert_eq!(player.matches[0].tags, vec!["cheater".to_string()]);

    // Marking twice is a conflict, not a silent no-op
    let again = agent
        .execute(Command::parse("mark [U:1:22202] bot").unwrap())
        .await;
    assert!(matches!(
        again,
        Err(AgentError::Core(CoreError::AlreadyMarked(_)))
    ));

    // A fresh agent picks the mark back up from disk
    let restored = agent_with(config).await;
    assert_eq!(restored.tracker().rules().match_steam(sid(ALICE)).len(), 1);

    agent
        .execute(Command::Unmark(sid(ALICE)))
        .await
        .unwrap();
    let player = agent.tracker().registry().get(sid(ALICE)).await.unwrap();
    assert!(player.matches.is_empty());
    let doc = loader::read_list(&local).await.unwrap();
    assert!(doc.steam_ids.is_empty());
}

#[tokio::test]
async fn test_report_lists_only_matched_players() {
    let agent = agent_with(Config::default()).await;
    agent
        .ingest_lines(&[
            "#  1 \"Alice\" [U:1:22202] 00:30 40 0 active".to_string(),
            "#  2 \"Bob\" [U:1:33303] 00:30 40 0 active".to_string(),
        ])
        .await;
    agent
        .execute(Command::Mark {
            steam_id: sid(ALICE),
            tags: vec!["bot".to_string()],
        })
        .await
        .unwrap();

    let matched = agent.report().await;
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].steam_id, sid(ALICE));

    agent.execute(Command::Whitelist(sid(ALICE))).await.unwrap();
    assert!(agent.report().await.is_empty());
}

#[tokio::test]
async fn test_sweep_keeps_fresh_players() {
    let agent = agent_with(Config::default()).await;
    agent
        .ingest_lines(&["#  1 \"Alice\" [U:1:22202] 00:30 40 0 active".to_string()])
        .await;
    assert!(agent.sweep().await.is_empty());
    assert_eq!(agent.tracker().registry().len(), 1);
}
