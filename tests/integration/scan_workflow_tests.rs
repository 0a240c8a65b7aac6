use super::*;
use std::sync::atomic::{AtomicBool, Ordering};

use bourbon_hunter::models::{AlertOutcome, ScanScope, ScanStatus};

#[tokio::test]
async fn test_full_scan_records_stock_and_alerts_new_find() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;

    let run = h.hunter.run_scan(ScanScope::Full).await?;
    assert_eq!(run.status, ScanStatus::Completed);
    assert!(run.completed_at.is_some());

    let s = &run.summary;
    assert_eq!(s.entries_total, 3);
    assert_eq!(s.entries_processed, 3);
    assert_eq!(s.entries_matched, 3);
    assert_eq!(s.entries_errored, 0);
    assert_eq!(s.new_finds, 1);
    assert_eq!(s.alerts_sent, 4);
    assert_eq!(s.alerts_suppressed, 0);

    // Both locations are persisted; only the one with bottles is a find
    let snapshots = h.store.snapshots();
    assert_eq!(snapshots.len(), 2);
    let center_city = snapshots.iter().find(|s| s.location_id == CENTER_CITY).unwrap();
    assert!(center_city.new_find);
    assert_eq!(center_city.quantity, 3);
    assert_eq!(center_city.entry_id, "blantons-original");
    let main_line = snapshots.iter().find(|s| s.location_id == MAIN_LINE).unwrap();
    assert!(!main_line.new_find);
    assert_eq!(main_line.quantity, 0);

    // Stock is only ever fetched for matched listings
    assert_eq!(h.retailer.stock_requests(BLANTONS_SKU), 1);
    assert_eq!(h.retailer.stock_requests("000099999"), 0);

    let payload = &h.notifiers.email.sent()[0];
    assert_eq!(payload.entry_id, "blantons-original");
    assert_eq!(payload.sku, BLANTONS_SKU);
    assert_eq!(payload.quantity, 3);
    assert_eq!(payload.price_text(), "$64.99");
    assert_eq!(payload.location.name, "Philadelphia - Center City");
    assert_eq!(payload.product_url.as_deref(), Some("https://retailer.test/en/product/12345"));

    // Dashboard is routed but never produces a record
    let alerts = h.store.alerts();
    assert_eq!(alerts.len(), 4);
    assert!(alerts.iter().all(|a| a.outcome == AlertOutcome::Sent));
    assert!(alerts.iter().all(|a| a.channel != Channel::Dashboard));

    let history = h.hunter.scan_history(10).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, run.id);
    assert_eq!(history[0].status, ScanStatus::Completed);

    let finds = h.hunter.recent_finds(10).await?;
    assert_eq!(finds.len(), 1);
    assert_eq!(
        finds[0].entry.as_ref().map(|e| e.name.as_str()),
        Some("Blanton's Original Single Barrel")
    );

    Ok(())
}

#[tokio::test]
async fn test_unchanged_stock_is_not_a_new_find() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;

    h.hunter.run_scan(ScanScope::Full).await?;
    let second = h.hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(second.status, ScanStatus::Completed);
    assert_eq!(second.summary.new_finds, 0);
    assert_eq!(second.summary.alerts_sent, 0);
    assert_eq!(h.store.snapshots().len(), 4);
    assert_eq!(h.notifiers.total_sent(), 4);

    Ok(())
}

#[tokio::test]
async fn test_restock_within_cooldown_is_suppressed() -> anyhow::Result<()> {
    let retailer = stocked_retailer();
    let h = create_test_hunter(retailer.clone(), all_channels_settings()).await;
    h.hunter.run_scan(ScanScope::Full).await?;

    retailer.on_stock(BLANTONS_SKU, stock_body(BLANTONS_SKU, &[(CENTER_CITY, 0), (MAIN_LINE, 0)]));
    let sold_out = h.hunter.run_scan(ScanScope::Full).await?;
    assert_eq!(sold_out.summary.new_finds, 0);

    retailer.on_stock(BLANTONS_SKU, stock_body(BLANTONS_SKU, &[(CENTER_CITY, 2), (MAIN_LINE, 0)]));
    let restocked = h.hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(restocked.summary.new_finds, 1);
    assert_eq!(restocked.summary.alerts_sent, 0);
    assert_eq!(restocked.summary.alerts_suppressed, 4);
    assert_eq!(h.notifiers.total_sent(), 4);

    let suppressed: Vec<_> = h
        .store
        .alerts()
        .into_iter()
        .filter(|a| a.outcome == AlertOutcome::Suppressed)
        .collect();
    assert_eq!(suppressed.len(), 4);
    assert!(suppressed
        .iter()
        .all(|a| a.detail.as_deref().is_some_and(|d| d.starts_with("cooldown active until"))));

    Ok(())
}

#[tokio::test]
async fn test_shared_search_term_is_fetched_once() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;

    let run = h.hunter.run_scan(ScanScope::Full).await?;

    // Both Weller entries search "weller"; the second is served from the run cache
    assert_eq!(h.retailer.searched_terms(), vec!["blantons", "weller"]);
    assert_eq!(run.summary.entries_matched, 3);
    assert_eq!(h.retailer.stock_requests(WELLER_12_SKU), 1);
    assert_eq!(h.retailer.stock_requests(WELLER_SR_SKU), 1);

    Ok(())
}

#[tokio::test]
async fn test_quick_scan_only_covers_rarest_tiers() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;

    let run = h
        .hunter
        .run_scan(ScanScope::Quick {
            tier: Tier::HIGHLY_ALLOCATED,
        })
        .await?;

    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.scope.to_string(), "quick_scan_tier_2");
    assert_eq!(run.summary.entries_total, 1);
    assert_eq!(h.retailer.searched_terms(), vec!["blantons"]);

    Ok(())
}

#[tokio::test]
async fn test_failed_search_is_recorded_and_scan_continues() -> anyhow::Result<()> {
    let retailer = stocked_retailer();
    retailer.on_search(
        "weller",
        HttpResponse {
            status: 503,
            body: "Service Unavailable".to_string(),
        },
    );
    let h = create_test_hunter(retailer, all_channels_settings()).await;

    let run = h.hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.summary.entries_processed, 3);
    assert_eq!(run.summary.entries_matched, 1);
    assert_eq!(run.summary.entries_errored, 2);
    assert_eq!(run.summary.new_finds, 1);

    let failed: Vec<_> = run.summary.failures.iter().map(|f| f.entry_id.as_str()).collect();
    assert_eq!(failed, vec!["weller-12", "weller-special-reserve"]);
    assert!(run.summary.failures[0].message.contains("503"));

    // A failed term is not cached, so the next entry tries again
    assert_eq!(h.retailer.searched_terms(), vec!["blantons", "weller", "weller"]);

    Ok(())
}

#[tokio::test]
async fn test_unreadable_search_page_is_an_entry_error() -> anyhow::Result<()> {
    let retailer = stocked_retailer();
    retailer.on_search(
        "blantons",
        HttpResponse::ok("<html><body><p>Please enable JavaScript</p></body></html>"),
    );
    let h = create_test_hunter(retailer, all_channels_settings()).await;

    let run = h.hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.summary.entries_errored, 1);
    assert_eq!(run.summary.failures[0].entry_id, "blantons-original");
    assert_eq!(run.summary.new_finds, 0);
    assert!(h.store.snapshots().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_store_failure_aborts_run() -> anyhow::Result<()> {
    let retailer = stocked_retailer();
    let store = Arc::new(BrokenSnapshotStore::default());
    let notifiers = Notifiers::new();

    let hunter = BourbonHunter::new(
        test_knowledge_base(),
        upstream(&retailer),
        store.clone(),
        notifiers.registry().await,
        all_channels_settings(),
    );

    let run = hunter.run_scan(ScanScope::Full).await?;

    assert_eq!(run.status, ScanStatus::Failed);
    assert!(run.error.as_deref().is_some_and(|e| e.contains("disk I/O error")));
    assert_eq!(run.summary.entries_processed, 0);
    assert_eq!(retailer.searched_terms(), vec!["blantons"]);
    assert_eq!(notifiers.total_sent(), 0);

    // The failed run is still recorded and the slot is free again
    let history = hunter.scan_history(10).await?;
    assert_eq!(history[0].status, ScanStatus::Failed);
    assert!(hunter.orchestrator().active_run().is_none());

    Ok(())
}

#[tokio::test]
async fn test_cancel_stops_before_next_entry() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;

    let orchestrator = Arc::downgrade(h.hunter.orchestrator());
    let fired = AtomicBool::new(false);
    h.retailer.on_request(move |url| {
        if url.path().ends_with("/search") && !fired.swap(true, Ordering::SeqCst) {
            if let Some(orchestrator) = orchestrator.upgrade() {
                assert!(orchestrator.cancel());
            }
        }
    });

    let run = h.hunter.run_scan(ScanScope::Full).await?;

    // The entry in flight finishes; its find is still alerted
    assert_eq!(run.status, ScanStatus::Cancelled);
    assert_eq!(run.summary.entries_processed, 1);
    assert_eq!(run.summary.new_finds, 1);
    assert_eq!(run.summary.alerts_sent, 4);
    assert_eq!(h.retailer.searched_terms(), vec!["blantons"]);

    // A fresh run is not affected by the earlier request
    let next = h.hunter.run_scan(ScanScope::Full).await?;
    assert_eq!(next.status, ScanStatus::Completed);
    assert_eq!(next.summary.entries_processed, 3);

    Ok(())
}

#[tokio::test]
async fn test_progress_reflects_finished_run() -> anyhow::Result<()> {
    let h = create_test_hunter(stocked_retailer(), all_channels_settings()).await;
    assert!(!h.hunter.status().running);

    let run = h.hunter.run_scan(ScanScope::Full).await?;
    let progress = h.hunter.status();

    assert!(!progress.running);
    assert_eq!(progress.run_id.as_deref(), Some(run.id.as_str()));
    assert_eq!(progress.processed, 3);
    assert_eq!(progress.total, 3);
    assert!(progress.current_entry.is_none());
    assert!(progress.eta.is_none());

    Ok(())
}

#[tokio::test]
async fn test_failed_secondary_term_is_a_partial_failure() -> anyhow::Result<()> {
    let retailer = stocked_retailer();
    retailer.on_search(
        "blantons gold",
        HttpResponse {
            status: 503,
            body: "Service Unavailable".to_string(),
        },
    );
    let kb = KnowledgeBase::new(vec![KnowledgeEntry::new(
        "blantons-original",
        "Blanton's Original Single Barrel",
        Tier::HIGHLY_ALLOCATED,
        &["blantons", "blantons gold"],
        &["blantons"],
    )])?;
    let notifiers = Notifiers::new();
    let hunter = BourbonHunter::new(
        kb,
        upstream(&retailer),
        Arc::new(MemoryStore::new()),
        notifiers.registry().await,
        all_channels_settings(),
    );

    let run = hunter.run_scan(ScanScope::Full).await?;

    // The entry still matched through its first term
    assert_eq!(run.status, ScanStatus::Completed);
    assert_eq!(run.summary.entries_matched, 1);
    assert_eq!(run.summary.entries_errored, 0);
    assert_eq!(run.summary.new_finds, 1);

    assert_eq!(run.summary.failures.len(), 1);
    let failure = &run.summary.failures[0];
    assert_eq!(failure.entry_id, "blantons-original");
    assert!(failure.message.contains("blantons gold"));
    assert!(failure.message.contains("503"));

    Ok(())
}
