use serde::{Deserialize, Serialize};

/// Message type discriminators broadcast by the pick'em server.
///
/// These are the values carried in the `type` field of each inbound frame
/// and are the keys used when subscribing handlers.
pub mod kind {
    pub const CHAT_MESSAGE: &str = "chat_message";
    pub const GAME_UPDATE: &str = "game_update";
    pub const PICK_UPDATE: &str = "pick_update";
    pub const STANDINGS_UPDATE: &str = "standings_update";
}

// --- Broadcast Payloads ---

/// A chat message within a pool, either user-authored or a system notice
/// (join/leave announcements use `message_type: "system"`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub pool_id: String,
    pub user_id: String,
    pub display_name: String,
    pub message: String,
    pub message_type: String,
    pub timestamp: String,
}

/// A live scoring update for a single game.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GameUpdate {
    pub game_id: i64,
    pub week: i32,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: i32,
    pub away_score: i32,
    pub status: String,
    pub quarter: i32,
    pub time_remaining: String,
}

/// A pick created or changed by a pool member.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PickUpdate {
    pub pick_id: i64,
    pub pool_id: i64,
    pub user_id: i64,
    pub team_id: i64,
    pub points_scored: i32,
    pub is_eliminated: bool,
}

/// One row of a pool's standings table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StandingsEntry {
    pub position: i32,
    pub user_id: String,
    pub display_name: String,
    pub total_picks: i32,
    pub correct_picks: i32,
    pub incorrect_picks: i32,
    pub win_percentage: f64,
}

/// Recomputed standings for a pool, broadcast after scores settle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StandingsUpdate {
    pub pool_id: String,
    pub standings: Vec<StandingsEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<i32>,
}
