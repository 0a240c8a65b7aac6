use super::*;
use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bourbon_hunter::config::{DiscordConfig, NotificationsConfig, SlackConfig};
use bourbon_hunter::dispatcher::{NewFind, NotificationDispatcher};
use bourbon_hunter::models::{AlertOutcome, LocationInfo, NewAlertRecord, ScanScope, ScrapedListing};
use bourbon_hunter::settings::TIER_MAP_KEY;

fn sms_sent_hours_ago(hours: i64) -> AlertRecord {
    AlertRecord::at(
        NewAlertRecord {
            entry_id: "blantons-original".to_string(),
            location_id: CENTER_CITY.to_string(),
            channel: Channel::Sms,
            outcome: AlertOutcome::Sent,
            detail: None,
        },
        Utc::now() - Duration::hours(hours),
    )
}

fn blantons_find() -> NewFind {
    let kb = test_knowledge_base();
    let entry = kb.get("blantons-original").unwrap().clone();
    let snapshot = InventorySnapshot::new(NewSnapshot {
        entry_id: entry.id.clone(),
        sku: BLANTONS_SKU.to_string(),
        location_id: CENTER_CITY.to_string(),
        quantity: 3,
        price: Some("64.99".parse().unwrap()),
    });

    NewFind {
        entry,
        listing: Some(ScrapedListing::new(BLANTONS_SKU, BLANTONS_LISTING, "blantons")),
        snapshot,
        location: LocationInfo::unknown(CENTER_CITY),
    }
}

#[tokio::test]
async fn test_recent_sms_alert_suppresses_only_sms() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;
    AlertRecordStore::append(&*h.store, &sms_sent_hours_ago(2)).await?;

    let run = h.hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(run.summary.new_finds, 1);
    assert_eq!(run.summary.alerts_sent, 3);
    assert_eq!(run.summary.alerts_suppressed, 1);
    assert_eq!(h.notifiers.email.sent().len(), 1);
    assert_eq!(h.notifiers.discord.sent().len(), 1);
    assert_eq!(h.notifiers.slack.sent().len(), 1);
    assert!(h.notifiers.sms.sent().is_empty());

    let sms: Vec<_> = h
        .store
        .alerts()
        .into_iter()
        .filter(|a| a.channel == Channel::Sms)
        .collect();
    assert_eq!(sms.len(), 2);
    assert_eq!(sms[1].outcome, AlertOutcome::Suppressed);

    Ok(())
}

#[tokio::test]
async fn test_channel_cooldown_override() -> anyhow::Result<()> {
    let settings = all_channels_settings().with_channel_cooldown(Channel::Sms, Duration::hours(1));
    let h = create_test_hunter(stocked_retailer(), settings).await;
    AlertRecordStore::append(&*h.store, &sms_sent_hours_ago(2)).await?;

    let run = h.hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(run.summary.alerts_sent, 4);
    assert_eq!(h.notifiers.sms.sent().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_user_setting_disables_channel_for_next_run() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;
    h.store.put_setting("sms_enabled", "false").await?;

    let run = h.hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(run.summary.alerts_sent, 3);
    assert!(h.notifiers.sms.sent().is_empty());
    assert!(h.store.alerts().iter().all(|a| a.channel != Channel::Sms));

    Ok(())
}

#[tokio::test]
async fn test_user_tier_map_replaces_routing() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;
    h.store
        .put_setting(TIER_MAP_KEY, r#"{"2": ["discord", "dashboard"]}"#)
        .await?;

    let run = h.hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(run.summary.alerts_sent, 1);
    assert_eq!(h.notifiers.discord.sent().len(), 1);
    assert_eq!(h.notifiers.total_sent(), 1);

    Ok(())
}

#[tokio::test]
async fn test_unusable_channels_are_recorded_as_misconfigured() -> anyhow::Result<()> {
    let config = NotificationsConfig {
        discord: DiscordConfig {
            enabled: true,
            ..DiscordConfig::default()
        },
        slack: SlackConfig {
            enabled: true,
            webhook_url: None,
        },
        ..NotificationsConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let dispatcher = NotificationDispatcher::new(ChannelRegistry::from_config(&config), store.clone());
    let settings = all_channels_settings();

    let records = dispatcher.dispatch(&[blantons_find()], &settings).await?;

    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.outcome == AlertOutcome::Misconfigured));
    let discord = records.iter().find(|r| r.channel == Channel::Discord).unwrap();
    assert_eq!(discord.detail.as_deref(), Some("Missing webhook_url"));

    // A misconfiguration does not start a cooldown once the channel is fixed
    let notifier = RecordingNotifier::new(Channel::Discord);
    dispatcher.registry().register(notifier.clone()).await;

    let records = dispatcher.dispatch(&[blantons_find()], &settings).await?;
    let discord = records.iter().find(|r| r.channel == Channel::Discord).unwrap();
    assert_eq!(discord.outcome, AlertOutcome::Sent);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(store.alerts().len(), 8);

    Ok(())
}

#[tokio::test]
async fn test_failed_send_starts_cooldown() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let registry = ChannelRegistry::new();
    let notifier = RecordingNotifier::failing(Channel::Email);
    registry.register(notifier.clone()).await;

    let dispatcher = NotificationDispatcher::new(registry, store.clone());
    let settings = NotificationSettings::new(all_channels_settings_routing()).enable(Channel::Email);

    let first = dispatcher.dispatch(&[blantons_find()], &settings).await?;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].outcome, AlertOutcome::Failed);
    assert!(first[0].detail.as_deref().is_some_and(|d| d.contains("upstream rejected")));

    let second = dispatcher.dispatch(&[blantons_find()], &settings).await?;
    assert_eq!(second[0].outcome, AlertOutcome::Suppressed);
    assert_eq!(notifier.sent().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_discord_webhook_receives_alert() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/123/token"))
        .and(body_string_contains("Blanton's Original Single Barrel"))
        .and(body_string_contains("\"embeds\""))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = NotificationsConfig {
        discord: DiscordConfig {
            enabled: true,
            webhook_url: Some(format!("{}/api/webhooks/123/token", server.uri())),
            ..DiscordConfig::default()
        },
        ..NotificationsConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let dispatcher = NotificationDispatcher::new(ChannelRegistry::from_config(&config), store.clone());
    let settings = NotificationSettings::new(all_channels_settings_routing()).enable(Channel::Discord);

    let records = dispatcher.dispatch(&[blantons_find()], &settings).await?;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].channel, Channel::Discord);
    assert_eq!(records[0].outcome, AlertOutcome::Sent);
    assert_eq!(store.alerts().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_discord_webhook_error_is_failed_record() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let config = NotificationsConfig {
        discord: DiscordConfig {
            enabled: true,
            webhook_url: Some(format!("{}/api/webhooks/123/token", server.uri())),
            ..DiscordConfig::default()
        },
        ..NotificationsConfig::default()
    };
    let dispatcher = NotificationDispatcher::new(ChannelRegistry::from_config(&config), Arc::new(MemoryStore::new()));
    let settings = NotificationSettings::new(all_channels_settings_routing()).enable(Channel::Discord);

    let records = dispatcher.dispatch(&[blantons_find()], &settings).await?;

    assert_eq!(records[0].outcome, AlertOutcome::Failed);
    assert!(records[0].detail.as_deref().is_some_and(|d| d.contains("429")));

    Ok(())
}

fn all_channels_settings_routing() -> std::collections::BTreeMap<Tier, Vec<Channel>> {
    (1..=4)
        .map(|t| (Tier::new(t).unwrap(), Channel::DELIVERABLE.to_vec()))
        .collect()
}
