#[derive(Debug)]
pub struct HubUrls;

impl HubUrls {
    // Pages
    pub const HOME: &'static str = "/";
    pub const DASHBOARD: &'static str = "/dashboard";
    pub const TICKETS: &'static str = "/tickets";
    pub const TICKET_BY_ID: &'static str = "/tickets/{id}";
    pub const PROFILE: &'static str = "/profile";
    pub const PROFILE_VERIFY_EMAIL: &'static str = "/profile/verify-email";
    pub const PROFILE_REVOKE_OTHERS: &'static str = "/profile/sessions/revoke-others";
    pub const ADMIN: &'static str = "/admin";

    // Admin actions
    pub const ADMIN_TICKET_STATUS: &'static str = "/admin/tickets/{id}/status";
    pub const ADMIN_TICKET_DELETE: &'static str = "/admin/tickets/{id}/delete";
    pub const ADMIN_USER_BAN: &'static str = "/admin/users/{id}/ban";
    pub const ADMIN_USER_UNBAN: &'static str = "/admin/users/{id}/unban";

    // Auth
    pub const LOGIN: &'static str = "/login";
    pub const LOGOUT: &'static str = "/logout";
    pub const DISCORD_CALLBACK: &'static str = "/auth/callback/discord";

    // JSON APIs
    pub const SUBMIT_TICKET: &'static str = "/api/submit-ticket";

    // Health
    pub const HEALTH: &'static str = "/health";
    pub const API_HEALTH: &'static str = "/api/health";
}

/// Fill `{param}` segments of a route pattern.
pub fn with_id(pattern: &str, id: impl std::fmt::Display) -> String {
    pattern.replace("{id}", &id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_id() {
        assert_eq!(with_id(HubUrls::TICKET_BY_ID, 42), "/tickets/42");
        assert_eq!(
            with_id(HubUrls::ADMIN_USER_BAN, "abc"),
            "/admin/users/abc/ban"
        );
    }
}
