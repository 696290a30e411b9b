//! Records browsed through the paginated lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A narrative milestone the player can unlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    /// Stable identifier.
    pub id: String,
    /// Short title.
    pub title: String,
    /// Flavour text shown under the title.
    pub description: String,
    /// Points awarded on unlock.
    pub points: u32,
    /// When the achievement was unlocked, if it was.
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// One row of a leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based rank.
    pub rank: u32,
    /// Player or crew name.
    pub player: String,
    /// Score for the run.
    pub score: u64,
    /// Chapter the run ended in.
    pub chapter: String,
}

/// A named campaign statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Machine-readable key.
    pub key: String,
    /// Human-readable label.
    pub label: String,
    /// Current value.
    pub value: f64,
}

/// Any row the browser can show.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Row of the achievements list.
    Achievement(Achievement),
    /// Row of the leaderboard.
    Leaderboard(LeaderboardEntry),
    /// Row of the statistics list.
    Stat(StatRecord),
}

impl Record {
    /// One-line rendering used by list views.
    pub fn display_line(&self) -> String {
        match self {
            Record::Achievement(achievement) => {
                let status = match achievement.unlocked_at {
                    Some(at) => format!("unlocked {}", at.format("%Y-%m-%d")),
                    None => "locked".to_string(),
                };
                format!(
                    "{:<28} {:>4} pts  {}",
                    achievement.title, achievement.points, status
                )
            }
            Record::Leaderboard(entry) => format!(
                "#{:<4} {:<20} {:>9}  {}",
                entry.rank, entry.player, entry.score, entry.chapter
            ),
            Record::Stat(stat) => format!("{:<32} {:>12.1}", stat.label, stat.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn achievement_line_shows_unlock_state() {
        let mut achievement = Achievement {
            id: "first-blood".to_string(),
            title: "First Blood".to_string(),
            description: "Win a skirmish".to_string(),
            points: 10,
            unlocked_at: None,
        };
        assert!(Record::Achievement(achievement.clone())
            .display_line()
            .ends_with("locked"));

        achievement.unlocked_at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).single();
        assert!(Record::Achievement(achievement)
            .display_line()
            .ends_with("unlocked 2024-03-09"));
    }

    #[test]
    fn leaderboard_line_leads_with_rank() {
        let line = Record::Leaderboard(LeaderboardEntry {
            rank: 3,
            player: "Vex".to_string(),
            score: 12_400,
            chapter: "The Ashen Gate".to_string(),
        })
        .display_line();
        assert!(line.starts_with("#3"));
        assert!(line.contains("12400"));
    }
}
