//! Operator commands read from stdin.

use lookout_core::SteamId;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Mark { steam_id: SteamId, tags: Vec<String> },
    Unmark(SteamId),
    Whitelist(SteamId),
    Unwhitelist(SteamId),
    Reload,
    Players,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(AgentError::Usage("<command> [args]"));
        };

        let mut steam_id = |usage| -> Result<SteamId> {
            let raw = words.next().ok_or(AgentError::Usage(usage))?;
            Ok(raw.parse()?)
        };

        let command = match verb {
            "mark" => {
                let steam_id = steam_id("mark <steam id> <tag>...")?;
                Command::Mark {
                    steam_id,
                    tags: words.map(str::to_string).collect(),
                }
            }
            "unmark" => Command::Unmark(steam_id("unmark <steam id>")?),
            "whitelist" => Command::Whitelist(steam_id("whitelist <steam id>")?),
            "unwhitelist" => Command::Unwhitelist(steam_id("unwhitelist <steam id>")?),
            "reload" => Command::Reload,
            "players" => Command::Players,
            other => return Err(AgentError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let sid = SteamId::new(76561197960287930).unwrap();
        assert_eq!(
            Command::parse("mark [U:1:22202] cheater bot").unwrap(),
            Command::Mark {
                steam_id: sid,
                tags: vec!["cheater".to_string(), "bot".to_string()],
            }
        );
        assert_eq!(
            Command::parse("unmark 76561197960287930").unwrap(),
            Command::Unmark(sid)
        );
        assert_eq!(Command::parse("  reload ").unwrap(), Command::Reload);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Command::parse(""), Err(AgentError::Usage(_))));
        assert!(matches!(Command::parse("unmark"), Err(AgentError::Usage(_))));
        assert!(matches!(
            Command::parse("kick 1"),
            Err(AgentError::UnknownCommand(_))
        ));
        assert!(matches!(
            Command::parse("whitelist nope"),
            Err(AgentError::Core(_))
        ));
    }
}
