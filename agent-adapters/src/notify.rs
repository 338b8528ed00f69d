//! HTTP notification channels.

use std::fmt;
use std::sync::Arc;

use agent_config::{ChannelKind, ChannelSettings};
use agent_policy::{
    EscalationSignal, Notification, NotificationChannel, PolicyError, PolicyResult,
};
use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AdapterError, AdapterResult};
use crate::http_client::JsonClient;

/// Builds the channel described by `settings`.
///
/// # Errors
///
/// Returns [`AdapterError::Configuration`] for an invalid endpoint or a
/// direct-message channel without a recipient.
pub fn build_channel(settings: &ChannelSettings) -> AdapterResult<Arc<dyn NotificationChannel>> {
    let client = JsonClient::new(&settings.endpoint)?;
    let cap = settings.message_cap();
    Ok(match settings.kind {
        ChannelKind::DirectMessage => {
            let recipient = settings.recipient.clone().ok_or_else(|| {
                AdapterError::configuration(format!(
                    "direct-message channel `{}` needs a recipient",
                    settings.name
                ))
            })?;
            Arc::new(DirectMessageChannel {
                name: settings.name.clone(),
                recipient,
                cap,
                client,
            })
        }
        ChannelKind::Webhook => Arc::new(WebhookChannel {
            name: settings.name.clone(),
            cap,
            client,
        }),
    })
}

/// Sends `{to, message}` to a single recipient.
pub struct DirectMessageChannel {
    name: String,
    recipient: String,
    cap: usize,
    client: JsonClient,
}

impl fmt::Debug for DirectMessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectMessageChannel")
            .field("name", &self.name)
            .field("cap", &self.cap)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct DirectMessage<'a> {
    to: &'a str,
    message: &'a str,
}

#[async_trait]
impl NotificationChannel for DirectMessageChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_message_len(&self) -> usize {
        self.cap
    }

    async fn deliver(&self, notification: &Notification) -> PolicyResult<()> {
        let body = DirectMessage {
            to: &self.recipient,
            message: &notification.message,
        };
        post(&self.client, &self.name, &body).await
    }
}

/// Posts `{urgency, message, source}` to a generic escalation endpoint.
pub struct WebhookChannel {
    name: String,
    cap: usize,
    client: JsonClient,
}

impl fmt::Debug for WebhookChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookChannel")
            .field("name", &self.name)
            .field("cap", &self.cap)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    urgency: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trust_score: Option<u8>,
    message: &'a str,
    source: &'a str,
}

impl<'a> WebhookPayload<'a> {
    fn from_notification(notification: &'a Notification) -> Self {
        let (urgency, trust_score) = match notification.signal {
            EscalationSignal::Urgency(urgency) => (Some(urgency.get()), None),
            EscalationSignal::TrustScore(score) => (None, Some(score.get())),
        };
        Self {
            urgency,
            trust_score,
            message: &notification.message,
            source: &notification.source,
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_message_len(&self) -> usize {
        self.cap
    }

    async fn deliver(&self, notification: &Notification) -> PolicyResult<()> {
        post(
            &self.client,
            &self.name,
            &WebhookPayload::from_notification(notification),
        )
        .await
    }
}

async fn post<B: Serialize + Sync>(client: &JsonClient, channel: &str, body: &B) -> PolicyResult<()> {
    let uri = client
        .endpoint("", &[])
        .map_err(|err| PolicyError::delivery(channel, err.to_string()))?;
    client
        .send(hyper::Method::POST, uri, Some(body), &[])
        .await
        .map(|_| ())
        .map_err(|err| PolicyError::delivery(channel, err.to_string()))
}

#[cfg(test)]
mod tests {
    use agent_config::EndpointSettings;
    use agent_policy::{EscalationEvent, TrustScore, Urgency};
    use serde_json::json;

    use super::*;

    fn settings(kind: ChannelKind, recipient: Option<&str>) -> ChannelSettings {
        ChannelSettings {
            name: "ops".into(),
            kind,
            endpoint: EndpointSettings::new("https://notify.example.com/send"),
            recipient: recipient.map(str::to_owned),
            max_message_len: None,
        }
    }

    #[test]
    fn channels_take_kind_default_caps() {
        let sms = build_channel(&settings(ChannelKind::DirectMessage, Some("+15550100"))).unwrap();
        assert_eq!(sms.max_message_len(), 160);

        let hook = build_channel(&settings(ChannelKind::Webhook, None)).unwrap();
        assert_eq!(hook.max_message_len(), 1500);
    }

    #[test]
    fn configured_cap_overrides_default() {
        let mut custom = settings(ChannelKind::Webhook, None);
        custom.max_message_len = Some(280);
        assert_eq!(build_channel(&custom).unwrap().max_message_len(), 280);
    }

    #[test]
    fn direct_message_requires_recipient() {
        let err = build_channel(&settings(ChannelKind::DirectMessage, None))
            .err()
            .expect("recipient required");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn direct_message_body_shape() {
        let body = DirectMessage {
            to: "+15550100",
            message: "disk full",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"to": "+15550100", "message": "disk full"})
        );
    }

    #[test]
    fn webhook_body_carries_urgency_or_trust() {
        let event = EscalationEvent::urgency(Urgency::new(9).unwrap(), "outage", "health");
        let note = Notification::for_channel(&event, 1500);
        assert_eq!(
            serde_json::to_value(WebhookPayload::from_notification(&note)).unwrap(),
            json!({"urgency": 9, "message": "outage", "source": "health"})
        );

        let event = EscalationEvent::trust(TrustScore::new(60).unwrap(), "3/5 checks", "health");
        let note = Notification::for_channel(&event, 1500);
        assert_eq!(
            serde_json::to_value(WebhookPayload::from_notification(&note)).unwrap(),
            json!({"trust_score": 60, "message": "3/5 checks", "source": "health"})
        );
    }
}
