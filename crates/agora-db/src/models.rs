//! Database row types. These map directly to SQLite rows and convert into
//! the `agora-types` API models at the edge, so the DB layer stays independent.

use agora_types::api::{
    ConversationRead, FriendRead, FriendRequestRead, GroupMemberRead, GroupPostRead, GroupRead,
    MessageRead, PostRead, UserRead,
};
use agora_types::models::FriendRequestStatus;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MembershipRow {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

/// A membership joined with the member's username.
#[derive(Debug, Clone)]
pub struct MemberRow {
    pub user_id: i64,
    pub username: String,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GroupPostRow {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: i64,
    pub user1_id: i64,
    pub user2_id: i64,
    pub created_at: DateTime<Utc>,
}

impl ConversationRow {
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<UserRow> for UserRead {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            is_active: row.is_active,
            created_at: row.created_at,
            display_name: row.display_name,
            bio: row.bio,
            avatar_url: row.avatar_url,
        }
    }
}

impl From<UserRow> for FriendRead {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
        }
    }
}

impl From<FriendRequestRow> for FriendRequestRead {
    fn from(row: FriendRequestRow) -> Self {
        Self {
            id: row.id,
            from_user_id: row.from_user_id,
            to_user_id: row.to_user_id,
            status: row.status,
            created_at: row.created_at,
            responded_at: row.responded_at,
        }
    }
}

impl From<PostRow> for PostRead {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<GroupRow> for GroupRead {
    fn from(row: GroupRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}

impl From<MemberRow> for GroupMemberRead {
    fn from(row: MemberRow) -> Self {
        Self {
            user_id: row.user_id,
            username: row.username,
            is_admin: row.is_admin,
            joined_at: row.joined_at,
        }
    }
}

impl From<GroupPostRow> for GroupPostRead {
    fn from(row: GroupPostRow) -> Self {
        Self {
            id: row.id,
            group_id: row.group_id,
            user_id: row.user_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

impl From<ConversationRow> for ConversationRead {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            user1_id: row.user1_id,
            user2_id: row.user2_id,
            created_at: row.created_at,
        }
    }
}

impl From<MessageRow> for MessageRead {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            content: row.content,
            timestamp: row.timestamp,
        }
    }
}
