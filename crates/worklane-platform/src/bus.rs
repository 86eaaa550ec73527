use anyhow::Result;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::contracts::NotificationEvent;

pub const PAYMENTS_COMPLETED_CHANNEL: &str = "payments.completed";
pub const NOTIFICATIONS_CHANNEL: &str = "notifications";

#[derive(Clone)]
pub struct EventBus {
    client: Client,
}

impl EventBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }

    /// Fire-and-forget notification delivery. A dead notification sink must
    /// never roll back a lifecycle or payment transition, so failures are
    /// logged and swallowed here.
    pub async fn notify(&self, user_id: Uuid, kind: &str, message: &str, related_entity: Uuid) {
        let event = NotificationEvent {
            user_id,
            kind: kind.to_string(),
            message: message.to_string(),
            related_entity,
        };
        if let Err(err) = self.publish_json(NOTIFICATIONS_CHANNEL, &event).await {
            error!("failed to publish {kind} notification for {user_id}: {err:#}");
        }
    }
}
