use std::sync::Arc;

use amqprs::{
    callbacks::{DefaultChannelCallback, DefaultConnectionCallback},
    channel::{BasicPublishArguments, Channel, QueueDeclareArguments},
    connection::{Connection, OpenConnectionArguments},
    BasicProperties,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AmqpConfig;
use crate::models::{hhmm, Reservation};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Message published for admins whenever a reservation is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBookingMessage {
    pub reservation_id: Uuid,
    pub venue_id: i32,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    pub duration_hours: i32,
    pub customer_name: String,
    pub customer_phone: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Reservation> for NewBookingMessage {
    fn from(r: &Reservation) -> Self {
        Self {
            reservation_id: r.id,
            venue_id: r.venue_id,
            date: r.date,
            start_time: r.start_time,
            duration_hours: r.duration_hours,
            customer_name: r.customer_name.clone(),
            customer_phone: r.customer_phone.clone(),
            owner_id: r.owner_id.clone(),
            created_at: r.created_at,
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_new_booking(&self, message: &NewBookingMessage) -> Result<()>;
}

/// Fallback when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify_new_booking(&self, message: &NewBookingMessage) -> Result<()> {
        info!(
            "New booking {} at venue {} on {} {} for {}h",
            message.reservation_id,
            message.venue_id,
            message.date,
            message.start_time.format("%H:%M"),
            message.duration_hours
        );
        Ok(())
    }
}

/// Fire-and-forget: the booking has already been committed, so a failed
/// notification is logged and dropped.
pub fn notify_in_background(notifier: Arc<dyn Notifier>, reservation: &Reservation) {
    let message = NewBookingMessage::from(reservation);
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = notifier.notify_new_booking(&message).await {
                    error!("Failed to notify admins about booking {}: {:?}", message.reservation_id, e);
                }
            });
        }
        Err(_) => {
            debug!("No async runtime available; skipping notification for booking {}", message.reservation_id);
        }
    }
}

pub struct AmqpNotifier {
    config: AmqpConfig,
    connection: Option<Arc<Connection>>,
    max_retries: u32,
}

impl AmqpNotifier {
    pub fn new(config: AmqpConfig) -> Self {
        Self {
            config,
            connection: None,
            max_retries: 3,
        }
    }

    pub async fn initialize(&mut self) -> Result<()> {
        info!("Connecting to RabbitMQ at {}:{}...", self.config.host, self.config.port);

        let connection = Connection::open(&OpenConnectionArguments::new(
            &self.config.host,
            self.config.port,
            &self.config.username,
            &self.config.password,
        ))
        .await?;

        connection.register_callback(DefaultConnectionCallback).await?;

        let setup_channel = connection.open_channel(None).await?;
        setup_channel.register_callback(DefaultChannelCallback).await?;

        setup_channel
            .queue_declare(QueueDeclareArguments::new(&self.config.queue).durable(true).finish())
            .await?;

        self.connection = Some(Arc::new(connection));

        let _ = setup_channel.close().await;

        info!("Connected to RabbitMQ, notifications go to queue '{}'", self.config.queue);
        Ok(())
    }

    async fn get_fresh_channel(&self) -> Result<Channel> {
        if let Some(connection) = &self.connection {
            let channel = connection.open_channel(None).await?;
            channel.register_callback(DefaultChannelCallback).await?;
            Ok(channel)
        } else {
            Err("RabbitMQ connection not initialized".into())
        }
    }

    async fn publish_once(&self, content: Vec<u8>) -> Result<()> {
        let channel = self.get_fresh_channel().await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json")
            .with_delivery_mode(2) // persistent
            .finish();

        channel
            .basic_publish(properties, content, BasicPublishArguments::new("", &self.config.queue))
            .await?;

        let _ = channel.close().await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for AmqpNotifier {
    async fn notify_new_booking(&self, message: &NewBookingMessage) -> Result<()> {
        let content = serde_json::to_vec(message)?;
        let mut delay_ms = 25;

        for attempt in 1..=self.max_retries {
            match self.publish_once(content.clone()).await {
                Ok(()) => {
                    info!("Published new booking {} to '{}'", message.reservation_id, self.config.queue);
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    warn!(
                        "Publishing booking {} failed (attempt {}/{}), retrying: {:?}",
                        message.reservation_id, attempt, self.max_retries, e
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    delay_ms *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        Err("no publish attempts were made".into())
    }
}
