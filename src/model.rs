//! Typed views of the airfocus API payloads.
//!
//! Only the attributes the reports and mutators read are modelled. Payloads
//! that are written back (fields) keep every unknown attribute in a flattened
//! map so a round trip does not drop data.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// `null` and a missing key both decode to `T::default()`.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default = "Vec::new", deserialize_with = "nullable")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total_items: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Seats {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub used: i64,
    #[serde(default)]
    pub free: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamInfo {
    #[serde(default, deserialize_with = "nullable")]
    state: TeamState,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TeamState {
    #[serde(default, deserialize_with = "nullable")]
    seats: SeatPools,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SeatPools {
    #[serde(default, deserialize_with = "nullable")]
    any: Seats,
}

impl TeamInfo {
    pub fn seats(&self) -> Seats {
        self.state.seats.any
    }
}

/// Access level granted on a workspace or folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Permission {
    None,
    Read,
    Comment,
    Write,
    Full,
    Other(String),
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        match value.as_str() {
            "none" => Permission::None,
            "read" => Permission::Read,
            "comment" => Permission::Comment,
            "write" => Permission::Write,
            "full" => Permission::Full,
            _ => Permission::Other(value),
        }
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Permission::from(value.to_string())
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.as_api_str().to_string()
    }
}

impl Permission {
    pub fn as_api_str(&self) -> &str {
        match self {
            Permission::None => "none",
            Permission::Read => "read",
            Permission::Comment => "comment",
            Permission::Write => "write",
            Permission::Full => "full",
            Permission::Other(raw) => raw,
        }
    }

    /// Human label: `Read`, `Write`, ...; unknown values are shown verbatim.
    pub fn label(&self) -> &str {
        match self {
            Permission::None => "None",
            Permission::Read => "Read",
            Permission::Comment => "Comment",
            Permission::Write => "Write",
            Permission::Full => "Full",
            Permission::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Editor,
    Contributor,
    #[default]
    Unknown,
    Other(String),
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "admin" => Role::Admin,
            "editor" => Role::Editor,
            "contributor" => Role::Contributor,
            "" => Role::Unknown,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Contributor => "contributor",
            Role::Unknown => "",
            Role::Other(raw) => raw,
        }
    }

    /// Roles the team endpoint accepts on write.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Role::Admin | Role::Editor | Role::Contributor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Unknown => f.write_str("unknown"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub role: Role,
}

impl User {
    pub fn display_name(&self) -> &str {
        [self.full_name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(&self.user_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, rename = "_embedded", deserialize_with = "nullable")]
    pub embedded: GroupMembers,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembers {
    #[serde(default, deserialize_with = "nullable")]
    pub user_ids: Vec<String>,
}

impl UserGroup {
    pub fn members(&self) -> &[String] {
        &self.embedded.user_ids
    }
}

/// Direct grants by user id and by user-group id.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grants {
    #[serde(default, deserialize_with = "nullable")]
    pub permissions: BTreeMap<String, Permission>,
    #[serde(default, deserialize_with = "nullable")]
    pub user_group_permissions: BTreeMap<String, Permission>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Namespace {
    Name(String),
    Typed {
        #[serde(rename = "typeId", default)]
        type_id: String,
    },
}

impl Namespace {
    pub fn as_str(&self) -> &str {
        match self {
            Namespace::Name(name) => name,
            Namespace::Typed { type_id } => type_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<Namespace>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub item_color: Option<String>,
    #[serde(default)]
    pub default_permission: Option<Permission>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, rename = "_embedded", deserialize_with = "nullable")]
    pub embedded: Grants,
}

impl Workspace {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed")
    }

    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or("")
    }

    pub fn item_color(&self) -> &str {
        self.item_color.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRelation {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_id: Option<String>,
}

/// Folder entry from the folder search endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Folder entry from the folder list endpoint, carrying members and grants.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderDetail {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "_embedded", deserialize_with = "nullable")]
    pub embedded: FolderEmbedded,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderEmbedded {
    #[serde(default, deserialize_with = "nullable")]
    pub workspaces: Vec<WorkspaceRef>,
    #[serde(flatten)]
    pub grants: Grants,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub type_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub settings: FieldSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldSettings {
    #[serde(default, deserialize_with = "nullable")]
    pub options: Vec<FieldOption>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FieldOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldOption {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtensionApp {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
