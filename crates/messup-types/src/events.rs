use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{GroupMessage, MediaType, MessageStatus, PrivateMessage};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A private message addressed to this user
    PrivateMessage { message: PrivateMessage },

    /// The receiver read a message this user sent
    ReadReceipt {
        message_id: Uuid,
        status: MessageStatus,
    },

    /// A message posted to a subscribed group
    GroupMessage { message: GroupMessage },

    /// A command sent on this connection failed
    Error { kind: String, message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    SendPrivateMessage {
        receiver: String,
        #[serde(default)]
        content: String,
        media_ref: Option<String>,
        media_type: Option<MediaType>,
    },

    MarkAsRead { message_id: Uuid },

    SendGroupMessage { group_id: Uuid, content: String },

    /// Start receiving broadcasts for these groups. Groups the user is not a
    /// member of are ignored.
    Subscribe { group_ids: Vec<Uuid> },

    Unsubscribe { group_ids: Vec<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_format() {
        let raw = r#"{"type":"MarkAsRead","data":{"message_id":"00000000-0000-0000-0000-000000000007"}}"#;
        match serde_json::from_str::<GatewayCommand>(raw).unwrap() {
            GatewayCommand::MarkAsRead { message_id } => {
                assert_eq!(message_id, Uuid::from_u128(7));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn read_receipt_wire_format() {
        let event = GatewayEvent::ReadReceipt {
            message_id: Uuid::nil(),
            status: MessageStatus::Read,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ReadReceipt");
        assert_eq!(json["data"]["status"], "READ");
    }
}
