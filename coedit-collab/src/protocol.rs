//! JSON wire protocol for room synchronization.
//!
//! Every WebSocket text frame carries one envelope:
//! ```text
//! {"event": "file-create", "data": {"roomId": "r1", "fileId": "f1", "name": "x.js", "kind": "file"}}
//! ```
//! Event names are kebab-case, payload fields camelCase. Optional fields may
//! be omitted or sent as `null`.

use std::fmt;

use coedit_core::{FileNode, NodeKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create with an explicit id (for testing)
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A user's presence in one room, bound to the connection currently
/// representing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub connection_id: ConnectionId,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, name: Option<String>, connection_id: ConnectionId) -> Self {
        Self {
            user_id: user_id.into(),
            name,
            connection_id,
        }
    }
}

// ─── Client → server payloads ────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoom {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetParticipants {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCreate {
    pub room_id: String,
    pub file_id: String,
    pub name: String,
    #[serde(alias = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRename {
    pub room_id: String,
    pub file_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDelete {
    pub room_id: String,
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMove {
    pub room_id: String,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_folder_id: Option<String>,
}

/// Full content of one file. Sent by the editing client and relayed to the
/// other members of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChange {
    pub room_id: String,
    pub file_id: String,
    pub code: String,
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom(JoinRoom),
    LeaveRoom(LeaveRoom),
    GetParticipants(GetParticipants),
    FileCreate(FileCreate),
    FileRename(FileRename),
    FileDelete(FileDelete),
    FileMove(FileMove),
    CodeChange(CodeChange),
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom(_) => "join-room",
            ClientMessage::LeaveRoom(_) => "leave-room",
            ClientMessage::GetParticipants(_) => "get-participants",
            ClientMessage::FileCreate(_) => "file-create",
            ClientMessage::FileRename(_) => "file-rename",
            ClientMessage::FileDelete(_) => "file-delete",
            ClientMessage::FileMove(_) => "file-move",
            ClientMessage::CodeChange(_) => "code-change",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            ClientMessage::JoinRoom(m) => &m.room_id,
            ClientMessage::LeaveRoom(m) => &m.room_id,
            ClientMessage::GetParticipants(m) => &m.room_id,
            ClientMessage::FileCreate(m) => &m.room_id,
            ClientMessage::FileRename(m) => &m.room_id,
            ClientMessage::FileDelete(m) => &m.room_id,
            ClientMessage::FileMove(m) => &m.room_id,
            ClientMessage::CodeChange(m) => &m.room_id,
        }
    }
}

// ─── Server → client payloads ────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesUpdate {
    pub room_id: String,
    pub files: Vec<FileNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsUpdate {
    pub room_id: String,
    pub users: Vec<Participant>,
}

/// Payload of `user-joined` and `user-left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    pub room_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    FilesUpdate(FilesUpdate),
    ParticipantsUpdate(ParticipantsUpdate),
    UserJoined(UserEvent),
    UserLeft(UserEvent),
    CodeChange(CodeChange),
}

impl ServerMessage {
    pub fn files_update(room_id: &str, files: &[FileNode]) -> Self {
        ServerMessage::FilesUpdate(FilesUpdate {
            room_id: room_id.to_string(),
            files: files.to_vec(),
        })
    }

    pub fn participants_update(room_id: &str, users: Vec<Participant>) -> Self {
        ServerMessage::ParticipantsUpdate(ParticipantsUpdate {
            room_id: room_id.to_string(),
            users,
        })
    }

    pub fn user_joined(room_id: &str, user_id: &str, name: Option<String>) -> Self {
        ServerMessage::UserJoined(UserEvent {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            name,
        })
    }

    pub fn user_left(room_id: &str, user_id: &str, name: Option<String>) -> Self {
        ServerMessage::UserLeft(UserEvent {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            name,
        })
    }

    pub fn code_change(room_id: &str, file_id: &str, code: &str) -> Self {
        ServerMessage::CodeChange(CodeChange {
            room_id: room_id.to_string(),
            file_id: file_id.to_string(),
            code: code.to_string(),
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::FilesUpdate(_) => "files-update",
            ServerMessage::ParticipantsUpdate(_) => "participants-update",
            ServerMessage::UserJoined(_) => "user-joined",
            ServerMessage::UserLeft(_) => "user-left",
            ServerMessage::CodeChange(_) => "code-change",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            ServerMessage::FilesUpdate(m) => &m.room_id,
            ServerMessage::ParticipantsUpdate(m) => &m.room_id,
            ServerMessage::UserJoined(m) | ServerMessage::UserLeft(m) => &m.room_id,
            ServerMessage::CodeChange(m) => &m.room_id,
        }
    }
}

/// Protocol and transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unsupported {0} frame")]
    UnsupportedFrame(&'static str),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
