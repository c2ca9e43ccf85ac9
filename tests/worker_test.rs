//! Regional worker behavior against in-memory repositories and fake sources

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{
    candidate, fast_timing, seed_variant, shared, worker, worker_with_timing, FailingSource,
    LockedRepository, PanickingSource, StaticSource,
};
use retrotrack::config::PacingBounds;
use retrotrack::models::{Origin, Region, RegionTag, SourceKind};
use retrotrack::storage::{create_mock_repository, SharedRepository, SqliteRepository};
use retrotrack::worker::{CycleOutcome, Pacing, WorkerState, WorkerTiming};
use tokio::sync::watch;

fn repos() -> Vec<SharedRepository> {
    let sqlite: SharedRepository = Arc::new(SqliteRepository::in_memory().unwrap());
    vec![sqlite, create_mock_repository()]
}

#[tokio::test]
async fn test_pal_variant_never_stores_ntsc_domain_listing() {
    for repo in repos() {
        let variant = seed_variant(&repo, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, None);

        let storefront = StaticSource::new(
            SourceKind::Storefront,
            vec![candidate(
                SourceKind::Storefront,
                "B00US",
                "Super Mario 64 PAL",
                30.0,
                Origin::Domain("www.amazon.com".into()),
            )],
        );
        let auction = StaticSource::new(
            SourceKind::Auction,
            vec![candidate(
                SourceKind::Auction,
                "v1|us",
                "Super Mario 64 PAL",
                30.0,
                Origin::Marketplace("EBAY_US".into()),
            )],
        );

        let mut pal = worker(
            Region::Pal,
            Region::Ntsc,
            &["www.amazon.fr", "www.amazon.de"],
            repo.clone(),
            vec![shared(storefront.clone()), shared(auction.clone())],
        );
        let summary = pal.process_variant(variant.id).await.unwrap();

        assert_eq!(storefront.calls(), 1);
        assert_eq!(auction.calls(), 1);
        assert_eq!(summary.origin_rejected, 2);
        assert_eq!(summary.written, 0);
        assert!(repo.listings_for(variant.id).unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_ntsc_worker_never_fetches_for_pal_variant() {
    for repo in repos() {
        let variant = seed_variant(&repo, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, None);
        let source = StaticSource::new(SourceKind::Auction, Vec::new());

        let mut ntsc = worker(
            Region::Ntsc,
            Region::Ntsc,
            &["www.amazon.com"],
            repo.clone(),
            vec![shared(source.clone())],
        );

        let summary = ntsc.process_variant(variant.id).await.unwrap();
        assert!(summary.skipped);
        assert_eq!(source.calls(), 0);

        let (_tx, rx) = watch::channel(false);
        assert_eq!(ntsc.run_cycle(&rx).await.unwrap(), CycleOutcome::Empty);
        assert_eq!(source.calls(), 0);

        let stored = repo.get_variant(variant.id).unwrap().unwrap();
        assert!(stored.last_acquired_at.is_none());
    }
}

#[tokio::test]
async fn test_only_fallback_worker_claims_standard_variants() {
    for repo in repos() {
        seed_variant(&repo, "Super Mario 64", "Nintendo 64", RegionTag::Standard, None);
        let source = StaticSource::new(
            SourceKind::Auction,
            vec![candidate(
                SourceKind::Auction,
                "v1|1",
                "Super Mario 64 N64",
                25.0,
                Origin::Marketplace("EBAY_US".into()),
            )],
        );
        let (_tx, rx) = watch::channel(false);

        let mut pal = worker(Region::Pal, Region::Ntsc, &["www.amazon.fr"], repo.clone(), vec![shared(source.clone())]);
        assert_eq!(pal.run_cycle(&rx).await.unwrap(), CycleOutcome::Empty);

        let mut ntsc = worker(Region::Ntsc, Region::Ntsc, &["www.amazon.com"], repo.clone(), vec![shared(source.clone())]);
        assert_eq!(ntsc.run_cycle(&rx).await.unwrap(), CycleOutcome::Processed(1));
        assert_eq!(source.calls(), 1);
    }
}

#[tokio::test]
async fn test_rescan_sweeps_stale_and_updates_in_place() {
    for repo in repos() {
        let variant = seed_variant(&repo, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, Some(40.0));
        let fr = || Origin::Marketplace("EBAY_FR".into());
        let source = StaticSource::new(
            SourceKind::Auction,
            vec![
                candidate(SourceKind::Auction, "a", "Super Mario 64 PAL", 20.0, fr()),
                candidate(SourceKind::Auction, "b", "Super Mario 64 PAL", 35.0, fr()),
            ],
        );
        let mut pal = worker(Region::Pal, Region::Ntsc, &["www.amazon.fr"], repo.clone(), vec![shared(source.clone())]);

        let first = pal.process_variant(variant.id).await.unwrap();
        assert_eq!(first.written, 2);
        assert_eq!(first.good_deals, 1);

        source.set(vec![candidate(
            SourceKind::Auction,
            "b",
            "Super Mario 64 PAL boxed",
            32.0,
            fr(),
        )]);
        let second = pal.process_variant(variant.id).await.unwrap();
        assert_eq!(second.removed, 1);

        let listings = repo.listings_for(variant.id).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].external_id, "b");
        assert_eq!(listings[0].price, 32.0);
        assert_eq!(listings[0].title, "Super Mario 64 PAL boxed");
    }
}

#[tokio::test]
async fn test_failed_source_still_rotates_variant() {
    for repo in repos() {
        let variant = seed_variant(&repo, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, None);
        let mut pal = worker(
            Region::Pal,
            Region::Ntsc,
            &["www.amazon.fr"],
            repo.clone(),
            vec![shared(Arc::new(FailingSource(SourceKind::Storefront)))],
        );

        let summary = pal.process_variant(variant.id).await.unwrap();
        assert_eq!(summary.failed_sources, vec![SourceKind::Storefront]);

        let stored = repo.get_variant(variant.id).unwrap().unwrap();
        assert!(stored.last_acquired_at.is_some());
    }
}

#[tokio::test]
async fn test_panicking_item_is_stamped_and_batch_continues() {
    for repo in repos() {
        let first = seed_variant(&repo, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, None);
        let second = seed_variant(&repo, "Wave Race 64", "PAL Nintendo 64", RegionTag::Pal, None);
        let mut pal = worker(
            Region::Pal,
            Region::Ntsc,
            &["www.amazon.fr"],
            repo.clone(),
            vec![shared(Arc::new(PanickingSource))],
        );

        let (_tx, rx) = watch::channel(false);
        assert_eq!(pal.run_cycle(&rx).await.unwrap(), CycleOutcome::Processed(0));
        assert_eq!(pal.stats().failures, 2);

        for id in [first.id, second.id] {
            let stored = repo.get_variant(id).unwrap().unwrap();
            assert!(stored.last_acquired_at.is_some());
        }
    }
}

#[tokio::test]
async fn test_batch_cools_down_before_next_fetch() {
    let repo = create_mock_repository();
    seed_variant(&repo, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, None);
    let source = StaticSource::new(SourceKind::Auction, Vec::new());

    let pause = PacingBounds {
        min_ms: 200,
        max_ms: 200,
    };
    let timing = WorkerTiming {
        pacing: Pacing::new(pause, pause),
        ..fast_timing()
    };
    let mut pal = worker_with_timing(
        Region::Pal,
        Region::Ntsc,
        &["www.amazon.fr"],
        repo,
        vec![shared(source.clone())],
        timing,
    );

    let (_tx, rx) = watch::channel(false);
    let started = Instant::now();
    assert_eq!(pal.run_cycle(&rx).await.unwrap(), CycleOutcome::Processed(1));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(pal.state(), WorkerState::Cooling);
}

#[tokio::test]
async fn test_run_loop_backs_off_on_loop_fault_and_stops_on_shutdown() {
    let inner = create_mock_repository();
    seed_variant(&inner, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, None);
    let repo: SharedRepository = Arc::new(LockedRepository { inner });
    let source = StaticSource::new(SourceKind::Auction, Vec::new());
    let pal = worker(
        Region::Pal,
        Region::Ntsc,
        &["www.amazon.fr"],
        repo,
        vec![shared(source.clone())],
    );

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(pal.run(rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert!(stats.backoffs >= 1);
    assert_eq!(stats.processed, 0);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_run_loop_keeps_going_through_panicking_items() {
    let repo = create_mock_repository();
    seed_variant(&repo, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, None);
    let pal = worker(
        Region::Pal,
        Region::Ntsc,
        &["www.amazon.fr"],
        repo.clone(),
        vec![shared(Arc::new(PanickingSource))],
    );

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(pal.run(rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert!(stats.failures >= 1);
    assert_eq!(stats.backoffs, 0);
}

#[tokio::test]
async fn test_jp_worker_never_queries_auction() {
    for repo in repos() {
        let variant = seed_variant(&repo, "Super Mario 64", "JP Nintendo 64", RegionTag::Jp, None);
        let auction = StaticSource::new(
            SourceKind::Auction,
            vec![candidate(
                SourceKind::Auction,
                "v1|us",
                "Super Mario 64 N64",
                30.0,
                Origin::Marketplace("EBAY_US".into()),
            )],
        );

        let mut jp = worker(
            Region::Jp,
            Region::Ntsc,
            &["www.amazon.co.jp"],
            repo.clone(),
            vec![shared(auction.clone())],
        );
        let summary = jp.process_variant(variant.id).await.unwrap();

        assert_eq!(auction.calls(), 0);
        assert_eq!(summary.written, 0);
        assert!(summary.failed_sources.is_empty());
        assert!(repo.listings_for(variant.id).unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_shutdown_before_start_processes_nothing() {
    let repo = create_mock_repository();
    seed_variant(&repo, "Super Mario 64", "PAL Nintendo 64", RegionTag::Pal, None);
    let source = StaticSource::new(SourceKind::Auction, Vec::new());
    let pal = worker(Region::Pal, Region::Ntsc, &["www.amazon.fr"], repo, vec![shared(source.clone())]);

    let (_tx, rx) = watch::channel(true);
    let stats = pal.run(rx).await;
    assert_eq!(stats.processed, 0);
    assert_eq!(source.calls(), 0);
}
