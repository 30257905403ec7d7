use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserProfile {
    pub full_name: Option<String>,
    pub unit_system: Option<String>,
}
