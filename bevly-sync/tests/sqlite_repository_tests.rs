//! SqliteRepository integration tests
//!
//! Same behaviour as the in-memory repository, plus persistence across
//! reopening a database file.

mod helpers;

use bevly_common::time::{days, Clock};
use bevly_common::{Beverage, Error, MenuProvider, Rating};
use bevly_sync::repository::{Repository, SqliteRepository};
use chrono::Duration;
use helpers::*;
use tempfile::TempDir;

async fn repo(clock: &bevly_common::time::ManualClock) -> SqliteRepository {
    SqliteRepository::in_memory(policy(clock)).await.unwrap()
}

#[tokio::test]
async fn test_save_finds_by_display_name_and_fuses() {
    let clock = manual_clock();
    let repo = repo(&clock).await;

    let mut first = Beverage::new("Anchor Porter");
    first.accuracy_score = 5;
    first.brewer = "Anchor".to_string();
    first.abv = 5.6;
    let id = repo.save_beverage(&first).await.unwrap();

    let mut second = Beverage::new("Anchor Porter");
    second.accuracy_score = 9;
    second.brewer = "Anchor Brewing".to_string();
    second.add_rating(Rating::new("BA", 91));
    let again = repo.save_beverage(&second).await.unwrap();

    assert_eq!(id, again, "same display name is the same record");
    let stored = repo.beverage_by_name("Anchor Porter").await.unwrap().unwrap();
    assert_eq!(stored.brewer, "Anchor Brewing");
    assert_eq!(stored.abv, 5.6);
    assert_eq!(stored.rating("BA"), Some(91));
    assert_eq!(stored.accuracy_score, 9);
}

#[tokio::test]
async fn test_lower_accuracy_write_only_fills_gaps() {
    let clock = manual_clock();
    let repo = repo(&clock).await;

    let mut trusted = Beverage::new("Dark Star");
    trusted.accuracy_score = 9;
    trusted.bev_type = "Stout".to_string();
    repo.save_beverage(&trusted).await.unwrap();

    let mut sloppy = Beverage::new("Dark Star");
    sloppy.accuracy_score = 5;
    sloppy.bev_type = "Porter".to_string();
    sloppy.description = "Roasty".to_string();
    repo.save_beverage(&sloppy).await.unwrap();

    let stored = repo.beverage_by_name("Dark Star").await.unwrap().unwrap();
    assert_eq!(stored.bev_type, "Stout");
    assert_eq!(stored.description, "Roasty");
    assert_eq!(stored.accuracy_score, 9);
}

#[tokio::test]
async fn test_menu_replaced_wholesale_in_order() {
    let clock = manual_clock();
    let repo = repo(&clock).await;
    let frisco = provider("frisco");

    let menu = vec![Beverage::new("Stout"), Beverage::new("Pale Ale"), Beverage::new("Bitter")];
    repo.set_beverage_menu(&frisco, &menu).await.unwrap();
    let stored = repo.provider_beverages(&frisco).await.unwrap();
    assert_eq!(names(&stored), vec!["Stout", "Pale Ale", "Bitter"]);

    repo.set_beverage_menu(&frisco, &[Beverage::new("Mild"), Beverage::new("Stout")])
        .await
        .unwrap();
    let stored = repo.provider_beverages(&frisco).await.unwrap();
    assert_eq!(names(&stored), vec!["Mild", "Stout"]);

    // Dropped from the menu, not from the knowledge base
    assert!(repo.beverage_by_name("Bitter").await.unwrap().is_some());
}

#[tokio::test]
async fn test_set_menu_registers_unknown_provider() {
    let clock = manual_clock();
    let repo = repo(&clock).await;

    repo.set_beverage_menu(&provider("ale_house"), &[Beverage::new("Mild")])
        .await
        .unwrap();

    let providers = repo.menu_providers().await.unwrap();
    assert_eq!(providers, vec![provider("ale_house")]);
}

#[tokio::test]
async fn test_providers_keep_registration_order_and_update_in_place() {
    let clock = manual_clock();
    let repo = repo(&clock).await;

    repo.register_provider(&provider("frisco")).await.unwrap();
    repo.register_provider(&provider("ale_house")).await.unwrap();
    let renamed = MenuProvider::new("frisco", "Frisco Grille", "http://frisco/v2", "json");
    repo.register_provider(&renamed).await.unwrap();

    let providers = repo.menu_providers().await.unwrap();
    let ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["frisco", "ale_house"]);
    assert_eq!(repo.provider_by_id("frisco").await.unwrap(), Some(renamed));
}

#[tokio::test]
async fn test_unknown_provider_lookup() {
    let clock = manual_clock();
    let repo = repo(&clock).await;

    assert!(repo.provider_by_id("nowhere").await.unwrap().is_none());
    assert!(matches!(
        repo.provider_beverages_by_id("nowhere").await,
        Err(Error::NotFound(_))
    ));

    repo.register_provider(&provider("frisco")).await.unwrap();
    assert!(repo.provider_beverages_by_id("frisco").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_only_referenced_stale_beverages_need_sync() {
    let clock = manual_clock();
    let repo = repo(&clock).await;
    let frisco = provider("frisco");

    let mut fresh = Beverage::new("Fresh");
    fresh.sync_time = Some(clock.now());
    let mut stale = Beverage::new("Stale");
    stale.sync_time = Some(clock.now() - days(4));
    repo.set_beverage_menu(&frisco, &[fresh, stale, Beverage::new("Never")])
        .await
        .unwrap();
    repo.save_beverage(&Beverage::new("Unreferenced")).await.unwrap();

    let due = repo.beverages_needing_sync().await.unwrap();
    assert_eq!(names(&due), vec!["Never", "Stale"]);

    clock.advance(days(3) + Duration::seconds(1));
    let due = repo.beverages_needing_sync().await.unwrap();
    assert_eq!(names(&due), vec!["Fresh", "Never", "Stale"]);
}

#[tokio::test]
async fn test_gc_respects_threshold_and_references() {
    let clock = manual_clock();
    let repo = repo(&clock).await;

    repo.set_beverage_menu(&provider("frisco"), &[Beverage::new("On Tap")])
        .await
        .unwrap();
    repo.save_beverage(&Beverage::new("Old Orphan")).await.unwrap();
    clock.advance(days(20));
    repo.save_beverage(&Beverage::new("Young Orphan")).await.unwrap();

    clock.advance(days(16));
    assert_eq!(repo.garbage_collect().await.unwrap(), 1);

    assert!(repo.beverage_by_name("Old Orphan").await.unwrap().is_none());
    assert!(repo.beverage_by_name("Young Orphan").await.unwrap().is_some());
    assert!(repo.beverage_by_name("On Tap").await.unwrap().is_some());
}

#[tokio::test]
async fn test_save_refreshes_updated_at() {
    let clock = manual_clock();
    let repo = repo(&clock).await;

    repo.save_beverage(&Beverage::new("Porter")).await.unwrap();
    clock.advance(days(30));
    repo.save_beverage(&Beverage::new("Porter")).await.unwrap();
    clock.advance(days(10));

    assert_eq!(repo.garbage_collect().await.unwrap(), 0);
    let stored = repo.beverage_by_name("Porter").await.unwrap().unwrap();
    assert_eq!(stored.updated_at, Some(start_time() + days(30)));
}

#[tokio::test]
async fn test_purge_removes_everything() {
    let clock = manual_clock();
    let repo = repo(&clock).await;
    repo.set_beverage_menu(&provider("frisco"), &[Beverage::new("Stout")])
        .await
        .unwrap();

    repo.purge().await.unwrap();

    assert!(repo.menu_providers().await.unwrap().is_empty());
    assert!(repo.beverage_by_name("Stout").await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bevly.db");
    let clock = manual_clock();

    {
        let repo = SqliteRepository::open(&db_path, policy(&clock)).await.unwrap();
        let mut bev = Beverage::with_brewer("Pale Ale", "Sierra Nevada");
        bev.abv = 5.6;
        bev.add_rating(Rating::new("BA", 87));
        bev.set_attribute("friscoMenuAt", "2024-06-01T12:00:00Z");
        bev.sync_time = Some(start_time());
        repo.set_beverage_menu(&provider("frisco"), &[bev]).await.unwrap();
        repo.pool().close().await;
    }

    let repo = SqliteRepository::open(&db_path, policy(&clock)).await.unwrap();
    let menu = repo.provider_beverages(&provider("frisco")).await.unwrap();
    assert_eq!(menu.len(), 1);
    let stored = &menu[0];
    assert_eq!(stored.brewer, "Sierra Nevada");
    assert_eq!(stored.abv, 5.6);
    assert_eq!(stored.rating("BA"), Some(87));
    assert_eq!(stored.attribute("friscoMenuAt"), "2024-06-01T12:00:00Z");
    assert_eq!(stored.sync_time, Some(start_time()));
    assert_eq!(stored.updated_at, Some(start_time()));
}

#[tokio::test]
async fn test_concurrent_saves_of_one_name_yield_one_record() {
    let clock = manual_clock();
    let temp_dir = TempDir::new().unwrap();
    let repo = std::sync::Arc::new(
        SqliteRepository::open(&temp_dir.path().join("bevly.db"), policy(&clock))
            .await
            .unwrap(),
    );

    let mut tasks = Vec::new();
    for i in 0..10u32 {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            let mut bev = Beverage::new("Racing Ale");
            bev.add_rating(Rating::new(format!("source{}", i), 50 + i));
            repo.save_beverage(&bev).await.unwrap()
        }));
    }
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let stored = repo.beverage_by_name("Racing Ale").await.unwrap().unwrap();
    assert_eq!(stored.ratings.len(), 10);
}
