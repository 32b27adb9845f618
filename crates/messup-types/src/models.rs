use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public projection of a user. Password hashes never leave the DB crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Symmetric edge; `user1` is the original requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friendship {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    /// The member of the edge that is not `user_id`.
    pub fn other(&self, user_id: Uuid) -> Uuid {
        if self.user1_id == user_id {
            self.user2_id
        } else {
            self.user1_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

/// A post in a group. `sender_id == None` marks a system message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_username: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Text,
    Image,
    Video,
    Audio,
    None,
}

impl MediaType {
    /// Classify an upload by its MIME content hint.
    pub fn from_content_hint(hint: &str) -> Self {
        if hint.starts_with("video/") {
            Self::Video
        } else if hint.starts_with("audio/") {
            Self::Audio
        } else if hint.starts_with("image/") {
            Self::Image
        } else {
            Self::None
        }
    }
}

/// Delivery status of a private message. Ordered: a message only ever moves
/// to a greater variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub media_ref: Option<String>,
    pub media_type: MediaType,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    FriendRequest,
    Message,
    GroupInvitation,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub content: String,
    pub reference_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Storage slot for opaque key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySlot {
    Public,
    Private,
}

// -- String forms used by the DB layer --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown enum value: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(RequestStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
});

string_enum!(MediaType {
    Text => "TEXT",
    Image => "IMAGE",
    Video => "VIDEO",
    Audio => "AUDIO",
    None => "NONE",
});

string_enum!(MessageStatus {
    Sent => "SENT",
    Delivered => "DELIVERED",
    Read => "READ",
});

string_enum!(NotificationType {
    FriendRequest => "FRIEND_REQUEST",
    Message => "MESSAGE",
    GroupInvitation => "GROUP_INVITATION",
    Other => "OTHER",
});

string_enum!(KeySlot {
    Public => "public",
    Private => "private",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ordering_is_monotonic() {
        assert!(MessageStatus::Sent < MessageStatus::Delivered);
        assert!(MessageStatus::Delivered < MessageStatus::Read);
    }

    #[test]
    fn enums_match_wire_names() {
        assert_eq!(
            serde_json::to_string(&NotificationType::GroupInvitation).unwrap(),
            "\"GROUP_INVITATION\""
        );
        assert_eq!(
            "GROUP_INVITATION".parse::<NotificationType>().unwrap(),
            NotificationType::GroupInvitation
        );
        assert!("pending".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn media_type_from_hint() {
        assert_eq!(MediaType::from_content_hint("video/mp4"), MediaType::Video);
        assert_eq!(MediaType::from_content_hint("audio/ogg"), MediaType::Audio);
        assert_eq!(MediaType::from_content_hint("image/png"), MediaType::Image);
        assert_eq!(
            MediaType::from_content_hint("application/octet-stream"),
            MediaType::None
        );
    }
}
