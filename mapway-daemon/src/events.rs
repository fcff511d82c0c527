//! Change event source and publisher over Redis pub/sub.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::AsyncCommands;

use mapway_core::{ChangeRequest, Config};

use crate::deadline::with_deadline;
use crate::error::DaemonError;

/// Ordered stream of raw change payloads.
///
/// An `Err` means the subscription itself is gone; the caller treats it as fatal.
#[async_trait]
pub trait EventSource: Send {
    async fn next_payload(&mut self) -> Result<String, DaemonError>;
}

/// Subscription to the configured change channel on its own connection.
pub struct RedisSubscription {
    channel: String,
    messages: BoxStream<'static, redis::Msg>,
}

impl RedisSubscription {
    pub async fn subscribe(config: &Config) -> Result<Self, DaemonError> {
        let client = redis::Client::open(config.redis_url())?;
        let channel = config.redis_channel.clone();
        let pubsub = with_deadline("subscribe", config.op_timeout(), async {
            let mut pubsub = client.get_async_pubsub().await?;
            pubsub.subscribe(&channel).await?;
            Ok::<_, DaemonError>(pubsub)
        })
        .await?;

        tracing::info!(channel = %channel, "subscribed to change channel");
        Ok(Self {
            channel,
            messages: pubsub.into_on_message().boxed(),
        })
    }
}

#[async_trait]
impl EventSource for RedisSubscription {
    async fn next_payload(&mut self) -> Result<String, DaemonError> {
        let Some(message) = self.messages.next().await else {
            return Err(DaemonError::SubscriptionClosed {
                channel: self.channel.clone(),
            });
        };
        match message.get_payload::<String>() {
            Ok(payload) => Ok(payload),
            Err(err) => {
                // Decoded downstream as the empty event and discarded there.
                tracing::warn!(channel = %self.channel, error = %err, "change payload is not a string");
                Ok(String::new())
            }
        }
    }
}

/// Publish one change request on the configured channel.
///
/// Returns the number of subscribers that received it.
pub async fn publish(config: &Config, request: &ChangeRequest) -> Result<usize, DaemonError> {
    let payload = request.encode()?;
    let client = redis::Client::open(config.redis_url())?;
    with_deadline("publish", config.op_timeout(), async {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let receivers: usize = conn.publish(&config.redis_channel, &payload).await?;
        Ok::<_, DaemonError>(receivers)
    })
    .await
}
