//! Turns new finds into alerts.
//!
//! For every (find, channel) pair routed by the run's [`NotificationSettings`]
//! the dispatcher decides between skipping, a misconfiguration record, a
//! cooldown suppression and an actual send. Channels are processed
//! concurrently; within a channel the check-send-record sequence holds that
//! channel's lock.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{
    AlertOutcome, AlertRecord, Channel, InventorySnapshot, KnowledgeEntry, LocationInfo, NewAlertRecord,
    ScrapedListing,
};
use crate::plugins::{AlertPayload, ChannelRegistry, DeliveryReceipt, Unavailable};
use crate::settings::NotificationSettings;
use crate::store::AlertRecordStore;
use crate::utils::error::Result;

/// A snapshot classified as a new find, with what is needed to describe it.
#[derive(Debug, Clone)]
pub struct NewFind {
    pub entry: Arc<KnowledgeEntry>,
    pub listing: Option<ScrapedListing>,
    pub snapshot: InventorySnapshot,
    pub location: LocationInfo,
}

impl NewFind {
    pub fn payload(&self) -> AlertPayload {
        AlertPayload::new(&self.entry, self.listing.as_ref(), &self.snapshot, self.location.clone())
    }
}

pub struct NotificationDispatcher {
    registry: ChannelRegistry,
    alerts: Arc<dyn AlertRecordStore>,
    channel_locks: HashMap<Channel, Mutex<()>>,
}

impl NotificationDispatcher {
    pub fn new(registry: ChannelRegistry, alerts: Arc<dyn AlertRecordStore>) -> Self {
        let channel_locks = Channel::DELIVERABLE
            .into_iter()
            .map(|c| (c, Mutex::new(())))
            .collect();

        Self {
            registry,
            alerts,
            channel_locks,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Dispatch `finds` and return every record written, grouped by channel
    /// in [`Channel::DELIVERABLE`] order. An alert store failure is returned
    /// after all channels have finished.
    pub async fn dispatch(&self, finds: &[NewFind], settings: &NotificationSettings) -> Result<Vec<AlertRecord>> {
        if finds.is_empty() {
            return Ok(Vec::new());
        }

        let mut per_channel: Vec<(Channel, Vec<&NewFind>)> = Vec::new();
        for channel in Channel::DELIVERABLE {
            if !settings.is_enabled(channel) {
                continue;
            }
            let routed: Vec<&NewFind> = finds
                .iter()
                .filter(|f| settings.channels_for(f.entry.tier).contains(&channel))
                .collect();
            if !routed.is_empty() {
                per_channel.push((channel, routed));
            }
        }

        let results = join_all(
            per_channel
                .into_iter()
                .map(|(channel, routed)| self.dispatch_channel(channel, routed, settings)),
        )
        .await;

        let mut records = Vec::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(mut channel_records) => records.append(&mut channel_records),
                Err(e) => {
                    tracing::error!("Alert dispatch aborted for a channel: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(records),
        }
    }

    async fn dispatch_channel(
        &self,
        channel: Channel,
        finds: Vec<&NewFind>,
        settings: &NotificationSettings,
    ) -> Result<Vec<AlertRecord>> {
        let _guard = match self.channel_locks.get(&channel) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let adapter = self.registry.adapter(channel).await;
        let cooldown = settings.cooldown_for(channel);
        let mut records = Vec::with_capacity(finds.len());

        for find in finds {
            let entry_id = find.entry.id.as_str();
            let location_id = find.snapshot.location_id.as_str();

            let (outcome, detail) = match &adapter {
                Err(Unavailable::Misconfigured(reason)) => (AlertOutcome::Misconfigured, Some(reason.clone())),
                Err(Unavailable::NotRegistered) => (
                    AlertOutcome::Misconfigured,
                    Some(Unavailable::NotRegistered.to_string()),
                ),
                Ok(adapter) => {
                    let since = Utc::now() - cooldown;
                    let last_attempt = self
                        .alerts
                        .recent(entry_id, location_id, channel, since)
                        .await?
                        .into_iter()
                        .find(|r| r.outcome.is_attempt());

                    match last_attempt {
                        Some(last) => {
                            tracing::debug!(channel = %channel, entry_id, location_id, "Alert cooldown active");
                            (
                                AlertOutcome::Suppressed,
                                Some(format!("cooldown active until {}", (last.sent_at + cooldown).to_rfc3339())),
                            )
                        }
                        None => match adapter.send(&find.payload()).await {
                            Ok(receipt) => {
                                tracing::info!(channel = %channel, entry_id, location_id, "Alert sent for {}", find.entry.name);
                                (AlertOutcome::Sent, Some(receipt.detail))
                            }
                            Err(e) => {
                                tracing::warn!(channel = %channel, entry_id, location_id, "Alert failed: {}", e);
                                (AlertOutcome::Failed, Some(e.to_string()))
                            }
                        },
                    }
                }
            };

            let record = AlertRecord::new(NewAlertRecord {
                entry_id: entry_id.to_string(),
                location_id: location_id.to_string(),
                channel,
                outcome,
                detail,
            });
            self.alerts.append(&record).await?;
            records.push(record);
        }

        Ok(records)
    }

    /// Send a sample alert on every enabled channel. Nothing is recorded and
    /// cooldowns do not apply.
    pub async fn send_test(&self, settings: &NotificationSettings) -> Vec<(Channel, Result<DeliveryReceipt>)> {
        let payload = AlertPayload::sample();

        let sends = settings.enabled_channels().into_iter().map(|channel| {
            let payload = &payload;
            async move {
                let result = match self.registry.adapter(channel).await {
                    Ok(adapter) => adapter.send(payload).await,
                    Err(reason) => Err(crate::utils::error::AppError::Configuration(format!(
                        "{} is not usable: {}",
                        channel, reason
                    ))),
                };
                (channel, result)
            }
        });

        join_all(sends).await
    }
}
