use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const SERVER_UP_PATH: &str = "v1/server/up";
pub const SERVER_HEALTHY_PATH: &str = "v1/server/healthy";
pub const APPLICATIONS_PATH: &str = "v1/applications";

pub fn activity_path(task_id: &str) -> String {
    format!("v1/activities/{task_id}")
}

pub fn activity_children_path(task_id: &str) -> String {
    format!("v1/activities/{task_id}/children")
}

pub fn sensors_current_state_path(application: &str, entity: &str) -> String {
    format!("v1/applications/{application}/entities/{entity}/sensors/current-state")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub spec: ApplicationSpec,
    #[serde(default)]
    pub status: Option<String>,
}

impl ApplicationSummary {
    pub fn display_name(&self) -> &str {
        self.spec
            .name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("(unnamed)")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationSpec {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskLinks {
    #[serde(rename = "self", default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub children: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub entity_display_name: Option<String>,
    #[serde(default)]
    pub current_status: Option<String>,
    #[serde(default)]
    pub submit_time_utc: i64,
    #[serde(default)]
    pub end_time_utc: i64,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub links: TaskLinks,
}

impl TaskSummary {
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        epoch_millis(self.submit_time_utc)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        epoch_millis(self.end_time_utc)
    }
}

/// The server reports unset times as zero or negative epoch millis.
fn epoch_millis(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(value).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paths() {
        assert_eq!(activity_path("t1"), "v1/activities/t1");
        assert_eq!(activity_children_path("t1"), "v1/activities/t1/children");
        assert_eq!(
            sensors_current_state_path("app", "web"),
            "v1/applications/app/entities/web/sensors/current-state"
        );
    }

    #[test]
    fn test_parse_task_summary() {
        let task: TaskSummary = serde_json::from_value(json!({
            "id": "Xy12",
            "displayName": "start",
            "entityDisplayName": "web-cluster",
            "currentStatus": "Completed",
            "submitTimeUtc": 1_700_000_000_000i64,
            "endTimeUtc": -1,
            "isError": false,
            "links": {
                "self": "/v1/activities/Xy12",
                "children": "/v1/activities/Xy12/children"
            }
        }))
        .unwrap();

        assert_eq!(task.display_name.as_deref(), Some("start"));
        assert!(task.submitted_at().is_some());
        assert!(task.ended_at().is_none());
        assert_eq!(
            task.links.children.as_deref(),
            Some("/v1/activities/Xy12/children")
        );
    }

    #[test]
    fn test_application_display_name_falls_back_to_id() {
        let app: ApplicationSummary =
            serde_json::from_value(json!({ "id": "a1", "status": "RUNNING" })).unwrap();
        assert_eq!(app.display_name(), "a1");

        let app: ApplicationSummary = serde_json::from_value(json!({
            "id": "a1",
            "spec": { "name": "petclinic" }
        }))
        .unwrap();
        assert_eq!(app.display_name(), "petclinic");
    }
}
