use crate::error::ProtocolError;
use crate::game::types::{Food, Player, PlayerUpdate, Powerup, PowerupKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TYPE_UPDATE: &str = "update";
pub const TYPE_EAT: &str = "eat";
pub const TYPE_POWERUP: &str = "powerup";
pub const TYPE_DEATH: &str = "death";
pub const TYPE_CHAT: &str = "chat";

const CLIENT_TYPES: [&str; 5] = [TYPE_UPDATE, TYPE_EAT, TYPE_POWERUP, TYPE_DEATH, TYPE_CHAT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
  Update(PlayerUpdate),
  Eat { food_id: String },
  Powerup { powerup_id: String },
  Death,
  Chat { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
  Init {
    player_id: String,
    players: Vec<Player>,
    food: Vec<Food>,
    powerups: Vec<Powerup>,
  },
  PlayerJoined {
    player: Player,
  },
  PlayerLeft {
    player_id: String,
  },
  PlayerUpdate {
    player_id: String,
    player: Player,
  },
  PlayerDeath {
    player_id: String,
    player: Player,
  },
  GameState {
    players: Vec<Player>,
    food: Vec<Food>,
    powerups: Vec<Powerup>,
  },
  FoodEaten {
    player_id: String,
    food_id: String,
    new_food: Food,
    player_score: i64,
  },
  PowerupCollected {
    player_id: String,
    powerup_id: String,
    new_powerup: Powerup,
    powerup_type: PowerupKind,
  },
  Chat {
    player_id: String,
    message: String,
  },
}

/// Decodes an inbound client frame. `Ok(None)` means a well-formed envelope of a
/// kind this server does not handle.
pub fn decode_client_message(text: &str) -> Result<Option<ClientMessage>, ProtocolError> {
  let value: Value = serde_json::from_str(text)?;
  let Some(kind) = value.get("type").and_then(Value::as_str) else {
    return Err(ProtocolError::MissingType);
  };
  if !CLIENT_TYPES.contains(&kind) {
    return Ok(None);
  }
  let kind = kind.to_string();
  serde_json::from_value(value)
    .map(Some)
    .map_err(|source| ProtocolError::Malformed { kind, source })
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
  let value: Value = serde_json::from_str(text)?;
  let Some(kind) = value.get("type").and_then(Value::as_str) else {
    return Err(ProtocolError::MissingType);
  };
  let kind = kind.to_string();
  serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { kind, source })
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
  Ok(serde_json::to_string(message)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::game::types::Point;

  #[test]
  fn decode_update_with_original_field_names() {
    let text = r#"{"type":"update","x":10.5,"y":4,"segments":[{"x":10.5,"y":4}],
      "score":30,"size":26,"powerups":[{"type":"speed","duration":4800}]}"#;
    let message = decode_client_message(text).expect("valid").expect("known");
    match message {
      ClientMessage::Update(update) => {
        assert_eq!(update.segments, vec![Point { x: 10.5, y: 4.0 }]);
        assert_eq!(update.score, 30);
        assert_eq!(update.powerups[0].kind, PowerupKind::Speed);
      }
      other => panic!("unexpected message {other:?}"),
    }
  }

  #[test]
  fn decode_eat_uses_camel_case_ids() {
    let message = decode_client_message(r#"{"type":"eat","foodId":"f-1"}"#)
      .expect("valid")
      .expect("known");
    assert_eq!(
      message,
      ClientMessage::Eat {
        food_id: "f-1".to_string()
      }
    );
    let death = decode_client_message(r#"{"type":"death","playerId":"ignored"}"#)
      .expect("valid")
      .expect("known");
    assert_eq!(death, ClientMessage::Death);
  }

  #[test]
  fn unknown_kind_is_ignored_not_an_error() {
    let message = decode_client_message(r#"{"type":"ping","timestamp":1}"#).expect("valid");
    assert!(message.is_none());
  }

  #[test]
  fn malformed_payloads_are_errors() {
    assert!(matches!(
      decode_client_message("{not json"),
      Err(ProtocolError::Json(_))
    ));
    assert!(matches!(
      decode_client_message(r#"{"foodId":"f"}"#),
      Err(ProtocolError::MissingType)
    ));
    assert!(matches!(
      decode_client_message(r#"{"type":"eat"}"#),
      Err(ProtocolError::Malformed { .. })
    ));
  }

  #[test]
  fn server_messages_carry_type_discriminator() {
    let text = encode(&ServerMessage::PlayerLeft {
      player_id: "abc".to_string(),
    })
    .expect("encode");
    let value: Value = serde_json::from_str(&text).expect("json");
    assert_eq!(value["type"], "playerLeft");
    assert_eq!(value["playerId"], "abc");
    assert_eq!(
      decode_server_message(&text).expect("decode"),
      ServerMessage::PlayerLeft {
        player_id: "abc".to_string()
      }
    );
  }
}
