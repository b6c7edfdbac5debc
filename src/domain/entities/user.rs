use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Role of the person behind a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Consultant,
    #[serde(alias = "user")]
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Consultant => "consultant",
            Role::Patient => "patient",
        }
    }

    /// Staff roles may accept and answer support conversations
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Consultant)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "consultant" => Ok(Role::Consultant),
            "patient" | "user" => Ok(Role::Patient),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Embedded user summary as the server returns it on populated references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_role",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Role>,
}

/// Unknown or non-string roles on an embedded summary decode as `None`
fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|role| role.parse().ok()))
}

/// A reference to a user that is either a bare identifier or a populated summary.
///
/// The chat API is inconsistent about which form it sends, so every
/// comparison goes through [`UserRef::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(String),
    Summary(UserSummary),
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::Summary(summary) => &summary.id,
        }
    }

    /// Best display label: the summary name, falling back to the identifier
    pub fn label(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::Summary(summary) => summary.name.as_deref().unwrap_or(&summary.id),
        }
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.id() == user_id
    }
}

impl From<&SessionContext> for UserRef {
    fn from(session: &SessionContext) -> Self {
        UserRef::Summary(UserSummary {
            id: session.user_id.clone(),
            name: session.display_name.clone(),
            email: None,
            role: Some(session.role),
        })
    }
}

/// Identity of the signed-in caller, injected into the coordinator and
/// permission checks at construction.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub token: Option<String>,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            role,
            token: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.user_id)
    }
}
