use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl DriverProfile {
    pub fn avatar_or_default(&self) -> &str {
        self.avatar.as_deref().unwrap_or("/default-avatar.png")
    }
}
