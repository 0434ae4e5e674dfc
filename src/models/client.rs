//! Request origin metadata

/// Where a request came from, as recorded in the audit log and used for
/// rate limit keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: Option<String>,
    pub method: String,
    pub path: String,
}

impl ClientMeta {
    pub const UNKNOWN_IP: &'static str = "unknown";

    pub fn new(ip: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: None,
            method: method.into(),
            path: path.into(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

impl Default for ClientMeta {
    fn default() -> Self {
        Self::new(Self::UNKNOWN_IP, "", "")
    }
}
