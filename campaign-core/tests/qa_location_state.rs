//! QA tests for location state stored in narrative documents.
//!
//! These tests verify:
//! - Idempotent convenience updates
//! - Map-union merging of custom and NPC state
//! - Prose below the metadata block surviving every update
//! - Rejection of unsafe location ids before any filesystem access
//!
//! Run with: `cargo test -p campaign-core --test qa_location_state`

use campaign_core::testing::{assert_failed, assert_succeeded, TestCampaign};
use campaign_core::{LocationStateUpdate, StateWrite};
use serde_json::json;
use tempfile::TempDir;

const PROSE: &str = "# The Old Mill\n\nThe wheel still turns, though no grain has come in years.\r\n\n  Indented line, trailing spaces   \n\n---\n\nA horizontal rule above is prose too.\n";

fn prose_after_front_matter(document: &str) -> &str {
    let rest = document.strip_prefix("---\n").expect("front matter present");
    let end = rest.find("\n---\n").expect("front matter closed");
    &rest[end + "\n---\n".len()..]
}

#[tokio::test]
async fn test_discovered_item_twice_is_one_entry() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let test = TestCampaign::new(dir.path()).await.expect("seed campaign");
    let campaign = &test.campaign;

    for _ in 0..2 {
        assert_succeeded(
            &campaign
                .update_location_state("loc-A", LocationStateUpdate::discovered_items(["sword"]))
                .await,
        );
    }

    let state = campaign.load_location_state("loc-A").await.into_result().unwrap();
    assert_eq!(state.discovered_items.len(), 1);
}

#[tokio::test]
async fn test_convenience_wrappers_are_idempotent() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let test = TestCampaign::new(dir.path()).await.expect("seed campaign");
    let campaign = &test.campaign;

    assert_eq!(campaign.mark_visited("village").await.data, Some(StateWrite::Written));
    assert_eq!(campaign.add_discovered_item("village", "key").await.data, Some(StateWrite::Written));
    assert_eq!(campaign.complete_event("village", "fair").await.data, Some(StateWrite::Written));
    let after_first = test.read_location("village").await.unwrap();

    assert_eq!(campaign.mark_visited("village").await.data, Some(StateWrite::Unchanged));
    assert_eq!(campaign.add_discovered_item("village", "key").await.data, Some(StateWrite::Unchanged));
    assert_eq!(campaign.complete_event("village", "fair").await.data, Some(StateWrite::Unchanged));

    // no write at all, so not even last_updated moved
    assert_eq!(test.read_location("village").await.unwrap(), after_first);

    let state = campaign.load_location_state("village").await.data.unwrap();
    assert!(state.visited);
    assert_eq!(state.discovered_items.len(), 1);
    assert_eq!(state.completed_events.len(), 1);
}

#[tokio::test]
async fn test_custom_state_merges() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let test = TestCampaign::new(dir.path()).await.expect("seed campaign");
    let campaign = &test.campaign;

    campaign
        .update_location_state("loc-A", LocationStateUpdate::custom_state("a", json!(1)))
        .await;
    campaign
        .update_location_state("loc-A", LocationStateUpdate::custom_state("b", json!(2)))
        .await;
    campaign
        .update_npc_state("loc-A", "miller", json!({"mood": "grumpy"}))
        .await;
    campaign
        .update_npc_state("loc-A", "baker", json!({"mood": "cheerful"}))
        .await;

    let state = campaign.load_location_state("loc-A").await.data.unwrap();
    assert_eq!(state.custom_state.get("a"), Some(&json!(1)));
    assert_eq!(state.custom_state.get("b"), Some(&json!(2)));
    assert_eq!(state.npc_states.len(), 2);
    assert!(state.last_updated.is_some());
}

#[tokio::test]
async fn test_prose_survives_updates() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let test = TestCampaign::new(dir.path()).await.expect("seed campaign");
    let campaign = &test.campaign;
    test.write_location("forest", PROSE).await.unwrap();

    campaign.mark_visited("forest").await;
    campaign.add_discovered_item("forest", "rusty key").await;
    campaign
        .set_custom_state("forest", "weather", json!("fog"))
        .await;
    campaign
        .update_location_state(
            "forest",
            LocationStateUpdate::completed_events(["wheel-stopped", "owl-hoot"]),
        )
        .await;

    let document = test.read_location("forest").await.unwrap();
    assert_eq!(prose_after_front_matter(&document), PROSE);

    let state = campaign.load_location_state("forest").await.data.unwrap();
    assert_eq!(state.custom_state.get("weather"), Some(&json!("fog")));
    assert_eq!(state.completed_events.len(), 2);
}

#[tokio::test]
async fn test_hand_written_keys_are_kept() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let test = TestCampaign::new(dir.path()).await.expect("seed campaign");
    test.write_location("village", "---\nvisited: false\nrumour: wolves\n---\n# Village\n")
        .await
        .unwrap();

    test.campaign.mark_visited("village").await;

    let document = test.read_location("village").await.unwrap();
    assert!(document.contains("rumour: wolves"));
    assert!(document.ends_with("---\n# Village\n"));
}

#[tokio::test]
async fn test_unsafe_ids_are_rejected() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let test = TestCampaign::new(dir.path()).await.expect("seed campaign");
    let campaign = &test.campaign;

    for id in ["../village", "..\\village", "/etc", "C:\\Windows", "~/x", "village/../../x", ""] {
        assert_failed(
            &campaign
                .update_location_state(id, LocationStateUpdate::visited(true))
                .await,
            "Invalid location id",
        );
        // loading degrades to the default instead of failing
        let state = campaign.load_location_state(id).await.into_result().unwrap();
        assert!(!state.visited);
    }
    assert!(!dir.path().join("world").join("village").exists());
}

#[tokio::test]
async fn test_missing_directory_is_hard_failure() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let test = TestCampaign::new(dir.path()).await.expect("seed campaign");

    assert_failed(
        &test.campaign.mark_visited("atlantis").await,
        "does not exist",
    );
    assert!(!test.config.location_dir("atlantis").exists());
}

#[tokio::test]
async fn test_nested_location_ids() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let test = TestCampaign::new(dir.path()).await.expect("seed campaign");
    std::fs::create_dir_all(test.config.location_dir("village/tavern")).unwrap();

    assert_succeeded(&test.campaign.mark_visited("village/tavern").await);
    assert!(test.config.location_document_file("village/tavern").exists());
    assert!(!test.campaign.load_location_state("village").await.data.unwrap().visited);
}
