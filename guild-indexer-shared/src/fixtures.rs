//! Deterministic sample data.
//!
//! Four players and two guilds. Used by the `POST /manage` endpoint to seed a fresh
//! environment and by tests across the workspace.

use crate::types::guild::{Guild, Player};

/// The four sample players (`p1`..`p4`).
pub fn sample_players() -> Vec<Player> {
    vec![
        Player::new("p1", "Black Mage"),
        Player::new("p2", "White Mage"),
        Player::new("p3", "Blue Mage"),
        Player::new("p4", "Orange Mage"),
    ]
}

/// The two sample guilds. Only `guild1` mentions "midnight" in its description.
pub fn sample_guilds() -> Vec<Guild> {
    vec![
        Guild::new("guild1", vec!["p1".to_string(), "p2".to_string()])
            .with_name_and_style("cool guild", "hardcore")
            .with_description("compete with other guilds! play midnight"),
        Guild::new("guild2", vec!["p3".to_string(), "p4".to_string()])
            .with_name_and_style("chill guild", "easygoing")
            .with_description("let's have fun! play together and enjoy this game!"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_members_reference_fixture_players() {
        let player_ids: Vec<String> = sample_players().into_iter().map(|p| p.player_id).collect();

        for guild in sample_guilds() {
            for member in &guild.members {
                assert!(player_ids.contains(member), "dangling member {}", member);
            }
        }
    }

    #[test]
    fn test_only_one_guild_mentions_midnight() {
        let matching: Vec<Guild> = sample_guilds()
            .into_iter()
            .filter(|g| g.description.contains("midnight"))
            .collect();

        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].guild_id, "guild1");
    }
}
