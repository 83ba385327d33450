use serde::{Deserialize, Serialize};

/// Roles recognized by the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ProjectManager,
    Consultant,
    Client,
    Accountant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ProjectManager => "project_manager",
            Role::Consultant => "consultant",
            Role::Client => "client",
            Role::Accountant => "accountant",
        }
    }
}

/// Verified identity performing an operation, supplied by the external
/// identity collaborator. `client_id` is set only for client-portal users and
/// scopes what they may read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub client_id: Option<i64>,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self {
            id,
            role,
            client_id: None,
        }
    }

    /// Client-portal actor bound to one client account.
    pub fn client(id: i64, client_id: i64) -> Self {
        Self {
            id,
            role: Role::Client,
            client_id: Some(client_id),
        }
    }
}
