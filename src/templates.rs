use crate::events::QrEvent;
use crate::store::{HttpMethod, NewWebhook};
use serde_json::{Map, Value, json};

/// A built-in webhook preset.
///
/// Pure data: the configuration UI uses these to pre-fill a new webhook
/// before the user supplies the endpoint URL.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: &'static str,
    pub description: &'static str,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    /// Static fields merged into every delivery payload.
    pub payload: Map<String, Value>,
    pub events: Vec<QrEvent>,
}

impl Template {
    /// Turn this preset into a creation spec for the given endpoint.
    pub fn to_new_webhook(&self, url: impl Into<String>) -> NewWebhook {
        NewWebhook {
            name: self.name.to_string(),
            description: Some(self.description.to_string()),
            url: url.into(),
            method: Some(self.method),
            headers: Some(self.headers.clone()),
            static_payload: (!self.payload.is_empty()).then(|| self.payload.clone()),
            events: self.events.iter().copied().collect(),
            ..Default::default()
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// The static catalog of built-in presets.
pub fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            name: "Slack Notification",
            description: "Post scan activity into a Slack channel via an incoming webhook",
            method: HttpMethod::Post,
            headers: vec![],
            payload: object(json!({
                "text": "QR code activity",
            })),
            events: vec![QrEvent::Scan, QrEvent::LimitReached],
        },
        Template {
            name: "Discord Notification",
            description: "Post scan activity into a Discord channel webhook",
            method: HttpMethod::Post,
            headers: vec![],
            payload: object(json!({
                "content": "QR code activity",
            })),
            events: vec![QrEvent::Scan, QrEvent::Expire],
        },
        Template {
            name: "Zapier Webhook",
            description: "Forward every lifecycle event to a Zapier catch hook",
            method: HttpMethod::Post,
            headers: vec![],
            payload: Map::new(),
            events: QrEvent::all().to_vec(),
        },
        Template {
            name: "Generic JSON",
            description: "Plain JSON POST with no extra fields",
            method: HttpMethod::Post,
            headers: vec![],
            payload: Map::new(),
            events: vec![QrEvent::Scan],
        },
    ]
}
