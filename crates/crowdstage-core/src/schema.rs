//! Typed views of the remote records, and the room path layout.
//!
//! Remote payloads are untrusted JSON. Decoding is deliberately lenient:
//! a malformed record degrades to defaults field by field rather than
//! failing the event that carried it; a single bad writer must never
//! wedge the screen.

use serde_json::{json, Map, Value};
use wirestore::{server_timestamp, StorePath};

use crate::input::InputState;
use crate::name::sanitize_name;

/// One controller's registered presence in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Sanitized display name.
    pub name: String,
    /// Latest full input vector.
    pub input: InputState,
    /// Server-assigned join timestamp (milliseconds); 0 when absent.
    pub joined_at: u64,
}

impl PlayerRecord {
    /// Decodes a remote value, sanitizing the name and defaulting
    /// missing or malformed fields. Never fails.
    #[must_use]
    pub fn decode(value: &Value) -> Self {
        let name = sanitize_name(value.get("name").and_then(Value::as_str).unwrap_or(""));
        let input = value
            .get("input")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let joined_at = value
            .get("joinedAt")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        Self {
            name,
            input,
            joined_at,
        }
    }

    /// Builds the value a joining controller writes, with the join
    /// timestamp left for the store to assign.
    #[must_use]
    pub fn encode_new(name: &str, input: InputState) -> Value {
        json!({
            "name": name,
            "input": input,
            "joinedAt": server_timestamp(),
        })
    }

    /// A full-object input update, as a patch.
    #[must_use]
    pub fn input_patch(input: InputState) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("input".to_string(), json!(input));
        fields
    }

    /// A name update, as a patch.
    #[must_use]
    pub fn name_patch(name: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!(name));
        fields
    }
}

/// The room's screen-ownership singleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenClaim {
    /// The claiming instance's locally generated identity.
    pub owner_id: String,
    /// Server-assigned claim timestamp (milliseconds); 0 when absent.
    pub claimed_at: u64,
}

impl ScreenClaim {
    /// Decodes a remote value. Returns `None` when there is no usable
    /// owner identity (absent, empty, or malformed).
    #[must_use]
    pub fn decode(value: &Value) -> Option<Self> {
        let owner_id = value.get("ownerId").and_then(Value::as_str)?;
        if owner_id.is_empty() {
            return None;
        }
        Some(Self {
            owner_id: owner_id.to_string(),
            claimed_at: value
                .get("claimedAt")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
        })
    }

    /// Builds the claim value written by the election transaction, with
    /// the timestamp left for the store to assign.
    #[must_use]
    pub fn encode_new(owner_id: &str) -> Value {
        json!({
            "ownerId": owner_id,
            "claimedAt": server_timestamp(),
        })
    }
}

/// Path layout for one room.
#[derive(Debug, Clone)]
pub struct RoomPaths {
    players: StorePath,
    screen: StorePath,
}

/// The room used when nothing else is specified.
pub const DEFAULT_ROOM: &str = "default";

impl RoomPaths {
    /// Builds the layout for `room`.
    ///
    /// # Panics
    ///
    /// Panics when `room` is empty or contains `/`; room ids are chosen by
    /// the embedding application, not received from the network.
    #[must_use]
    pub fn new(room: &str) -> Self {
        assert!(!room.is_empty() && !room.contains('/'), "invalid room id");
        let base = StorePath::parse("rooms")
            .unwrap_or_else(|_| unreachable!())
            .join(room);
        Self {
            players: base.join("players"),
            screen: base.join("screen"),
        }
    }

    /// `rooms/{room}/players`
    #[must_use]
    pub fn players(&self) -> &StorePath {
        &self.players
    }

    /// `rooms/{room}/players/{session_id}`
    #[must_use]
    pub fn player(&self, session_id: &str) -> StorePath {
        self.players.join(session_id)
    }

    /// `rooms/{room}/screen`
    #[must_use]
    pub fn screen(&self) -> &StorePath {
        &self.screen
    }
}

impl Default for RoomPaths {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_record_decodes_well_formed_value() {
        let record = PlayerRecord::decode(&json!({
            "name": "Alice",
            "input": { "left": true, "right": false, "jump": false },
            "joinedAt": 42,
        }));
        assert_eq!(record.name, "Alice");
        assert!(record.input.left);
        assert_eq!(record.joined_at, 42);
    }

    #[test]
    fn player_record_defaults_malformed_fields() {
        let record = PlayerRecord::decode(&json!({
            "name": 17,
            "input": "nonsense",
        }));
        assert_eq!(record.name, "PLAYER");
        assert_eq!(record.input, InputState::NEUTRAL);
        assert_eq!(record.joined_at, 0);
    }

    #[test]
    fn player_record_decode_never_panics_on_non_object() {
        let record = PlayerRecord::decode(&json!("scalar"));
        assert_eq!(record.name, "PLAYER");
    }

    #[test]
    fn screen_claim_rejects_missing_owner() {
        assert_eq!(ScreenClaim::decode(&json!({})), None);
        assert_eq!(ScreenClaim::decode(&json!({ "ownerId": "" })), None);
        let claim = ScreenClaim::decode(&json!({ "ownerId": "screen-ab12cd3" })).unwrap();
        assert_eq!(claim.owner_id, "screen-ab12cd3");
        assert_eq!(claim.claimed_at, 0);
    }

    #[test]
    fn room_paths_layout() {
        let paths = RoomPaths::new("lobby");
        assert_eq!(paths.players().to_string(), "rooms/lobby/players");
        assert_eq!(paths.player("k1").to_string(), "rooms/lobby/players/k1");
        assert_eq!(paths.screen().to_string(), "rooms/lobby/screen");
    }
}
