#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    // Health
    pub const HEALTH: &'static str = "/health";
    pub const API_HEALTH: &'static str = "/api/health";

    // Auth - JSON APIs
    pub const AUTH_REGISTER: &'static str = "/api/auth/register";
    pub const AUTH_LOGIN: &'static str = "/api/auth/login";
    pub const AUTH_LOGOUT: &'static str = "/api/auth/logout";
    pub const AUTH_USER: &'static str = "/api/auth/user";

    // Leads
    pub const LEADS: &'static str = "/api/leads";
    pub const LEADS_BOARD: &'static str = "/api/leads/board";
    pub const LEAD_BY_ID: &'static str = "/api/leads/:id";
    pub const LEAD_STATUS: &'static str = "/api/leads/:id/status";
    pub const LEAD_MATCHES: &'static str = "/api/leads/:id/matches";

    // Properties
    pub const PROPERTIES: &'static str = "/api/properties";
    pub const PROPERTY_BY_ID: &'static str = "/api/properties/:id";
    pub const PROPERTY_STATUS: &'static str = "/api/properties/:id/status";

    // Deals
    pub const DEALS: &'static str = "/api/deals";
    pub const DEALS_BOARD: &'static str = "/api/deals/board";
    pub const DEAL_BY_ID: &'static str = "/api/deals/:id";
    pub const DEAL_STATUS: &'static str = "/api/deals/:id/status";

    // Tasks
    pub const TASKS: &'static str = "/api/tasks";
    pub const TASKS_DUE_REMINDERS: &'static str = "/api/tasks/due-reminders";
    pub const TASK_BY_ID: &'static str = "/api/tasks/:id";
    pub const TASK_COMPLETE: &'static str = "/api/tasks/:id/complete";

    // Activities
    pub const ACTIVITIES: &'static str = "/api/activities";

    // Notifications
    pub const NOTIFICATIONS: &'static str = "/api/notifications";
    pub const NOTIFICATION_READ: &'static str = "/api/notifications/:id/read";
    pub const NOTIFICATIONS_READ_ALL: &'static str = "/api/notifications/read-all";
    pub const NOTIFICATIONS_UNREAD_COUNT: &'static str = "/api/notifications/unread-count";

    // Communications
    pub const COMMUNICATIONS: &'static str = "/api/communications";
    pub const COMMUNICATIONS_SEND_EMAIL: &'static str = "/api/communications/send-email";
    pub const COMMUNICATIONS_LOG_CALL: &'static str = "/api/communications/log-call";
    pub const COMMUNICATIONS_SCHEDULE: &'static str = "/api/communications/schedule-appointment";

    // AI assistance
    pub const AI_SCORE_LEAD: &'static str = "/api/ai/score-lead";
    pub const AI_MATCH_PROPERTY: &'static str = "/api/ai/match-property";
    pub const AI_GENERATE_MESSAGE: &'static str = "/api/ai/generate-message";
    pub const AI_LEAD_RECOMMENDATIONS: &'static str = "/api/ai/lead-recommendations";
    pub const AI_NEXT_ACTION: &'static str = "/api/ai/generate-next-action";
    pub const AI_CHAT: &'static str = "/api/ai/chat";
    pub const AI_INSIGHTS: &'static str = "/api/ai/insights";
    pub const AI_QUERY: &'static str = "/api/ai/query";

    // Dashboard
    pub const DASHBOARD_STATS: &'static str = "/api/dashboard/stats";
    pub const ANALYTICS: &'static str = "/api/analytics";

    // Objects
    pub const OBJECTS_UPLOAD: &'static str = "/api/objects/upload";
    pub const PROPERTY_IMAGES: &'static str = "/api/property-images";
    pub const OBJECTS: &'static str = "/objects/*path";
    pub const PUBLIC_OBJECTS: &'static str = "/public-objects/*path";
}

impl ApiUrls {
    pub fn with_params(url: &str, params: &[(&str, &str)]) -> String {
        let mut result = url.to_string();
        for (key, value) in params {
            result = result.replace(&format!(":{key}"), value);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_params() {
        assert_eq!(
            ApiUrls::with_params(ApiUrls::DEAL_STATUS, &[("id", "42")]),
            "/api/deals/42/status"
        );
    }
}
