mod common;

use common::{FakeSite, Harness, Launch};
use sweep_core::SweepError;

fn catalog() -> FakeSite {
    FakeSite::new()
        .with_provider("All", &[5, 5])
        .with_provider("Pragmatic Play", &[4, 2])
        .with_provider("PG Soft", &[3])
}

#[tokio::test(start_paused = true)]
async fn sweeps_every_listed_provider_after_the_leading_one() {
    let harness = Harness::new(catalog());

    let report = harness.runner().run(&[]).await.unwrap();

    let names: Vec<&str> = report.providers.iter().map(|p| p.provider.as_str()).collect();
    assert_eq!(names, vec!["Pragmatic Play", "PG Soft"]);
    assert_eq!(report.items_attempted(), 9);
    assert_eq!(report.successes(), 9);
    assert_eq!(report.retried_items, 0);
    assert_eq!(report.halted_providers().count(), 0);

    let world = harness.site.world();
    assert_eq!(world.sessions_created, 1);
    assert_eq!(world.sessions_closed, 1);
    assert_eq!(world.launches_of("All", 1, 0), 0);
}

#[tokio::test(start_paused = true)]
async fn named_providers_override_the_skip_rules() {
    let mut config = common::config();
    config.policy.skip_providers = vec!["PG Soft".to_string()];
    let harness = Harness::with_config(catalog(), config);

    let report = harness
        .runner()
        .run(&["All".to_string(), "PG Soft".to_string()])
        .await
        .unwrap();

    let names: Vec<&str> = report.providers.iter().map(|p| p.provider.as_str()).collect();
    assert_eq!(names, vec!["All", "PG Soft"]);
    assert_eq!(report.items_attempted(), 13);
}

#[tokio::test(start_paused = true)]
async fn escalation_carries_across_providers() {
    let site = catalog();
    for index in 0..4 {
        site.script("Pragmatic Play", 1, index, &[Launch::Toast]);
    }
    site.script("PG Soft", 1, 0, &[Launch::Toast]);
    let harness = Harness::new(site);

    let report = harness.runner().run(&[]).await.unwrap();

    assert_eq!(report.escalation_count, 5);
    assert_eq!(report.retried_items, 5);
    assert_eq!(report.providers[0].failure_budget_used, 4);
    assert_eq!(report.providers[1].failure_budget_used, 1);
    // The fifth failure overall is the first one in PG Soft.
    assert_eq!(report.providers[0].hard_restarts, 0);
    assert_eq!(report.providers[1].hard_restarts, 1);
    assert_eq!(harness.site.world().sessions_created, 2);
}

#[tokio::test(start_paused = true)]
async fn report_serializes_for_json_output() {
    let site = catalog();
    site.script("PG Soft", 1, 2, &[Launch::Hangs]);
    let harness = Harness::new(site);

    let report = harness.runner().run(&["PG Soft".to_string()]).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    let provider = &json["providers"][0];
    assert_eq!(provider["provider"], "PG Soft");
    assert_eq!(provider["timeouts"], 1);
    let item = &provider["items"][2];
    assert_eq!(item["status"]["status"], "recovered");
    assert_eq!(item["first_failure"], "timed_out");
    assert_eq!(item["recovery"]["outcome"], "retried");
    assert_eq!(item["recovery"]["mode"], "soft");
}

#[tokio::test(start_paused = true)]
async fn lists_providers_and_closes_the_session() {
    let harness = Harness::new(catalog());

    let providers = harness.runner().list_providers().await.unwrap();

    assert_eq!(providers, vec!["All", "Pragmatic Play", "PG Soft"]);
    let world = harness.site.world();
    assert_eq!(world.sessions_created, 1);
    assert_eq!(world.sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn initial_login_failure_aborts_the_run() {
    let harness = Harness::new(catalog());
    harness.site.reject_logins(6);

    let err = harness.runner().run(&[]).await.unwrap_err();

    assert!(matches!(err, SweepError::AuthExhausted { attempts: 3 }));
    let world = harness.site.world();
    assert_eq!(world.login_submits, 6);
    assert_eq!(world.sessions_closed, 1);
    assert!(world.launches.is_empty());
}
