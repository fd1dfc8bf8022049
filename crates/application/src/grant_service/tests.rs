use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use warden_core::{AppError, Cancellation, GrantValidationError};
use warden_domain::{GrantCandidate, GrantStatus};

use crate::grant_lifecycle::GrantLifecycle;
use crate::local_runtime::LocalRuntime;
use crate::provider_ports::ConfigValues;
use crate::provider_registry::ProviderRegistry;
use crate::test_support::{
    FakeProvider, RecordingEventBus, directory_with, fake_factory, vault_args,
};

use super::{ConfigCheckStatus, GrantService};

fn service() -> GrantService {
    let directory = directory_with(FakeProvider::configured());
    let lifecycle = GrantLifecycle::new(directory.clone(), Arc::new(RecordingEventBus::default()));

    let mut registry = ProviderRegistry::new();
    let registered = registry.register(
        "commonfate/testvault",
        "v1",
        "testvault",
        "Test vault",
        fake_factory(FakeProvider::default),
    );
    assert!(registered.is_ok());

    GrantService::new(
        Arc::new(LocalRuntime::new(lifecycle)),
        directory,
        Arc::new(registry),
    )
}

fn candidate(args: BTreeMap<String, String>) -> GrantCandidate {
    let now = Utc::now();
    GrantCandidate::new(
        "testvault",
        "alice@example.com",
        args,
        now + Duration::hours(1),
        now + Duration::hours(2),
    )
}

#[tokio::test]
async fn accepted_candidate_becomes_pending_grant() {
    let service = service();
    let now = Utc::now() + Duration::hours(1);
    let mut request = candidate(vault_args("alpha"));
    request.id = "abcd".to_owned();
    request.start = now;
    request.end = now + Duration::minutes(30);

    let grant = service.create_grant_at(request, now).await;
    assert!(grant.is_ok());
    let grant = grant.unwrap_or_else(|_| unreachable!());
    assert_eq!(grant.id(), "abcd");
    assert_eq!(grant.status(), GrantStatus::Pending);

    let fetched = service.get_grant("abcd").await;
    assert_eq!(fetched.map(|grant| grant.id().to_owned()).ok(), Some("abcd".to_owned()));
}

#[tokio::test]
async fn equal_start_and_end_is_rejected() {
    let service = service();
    let mut request = candidate(vault_args("alpha"));
    request.end = request.start;

    let result = service.create_grant(request).await;
    assert!(matches!(
        &result,
        Err(AppError::InvalidGrant(GrantValidationError::StartEqualsEnd))
    ));
    assert_eq!(
        result.err().map(|error| error.to_string()),
        Some("start and end time cannot be equal".to_owned())
    );
}

#[tokio::test]
async fn unknown_provider_and_arguments_are_rejected() {
    let service = service();

    let mut request = candidate(vault_args("alpha"));
    request.provider = "okta".to_owned();
    assert!(matches!(
        service.create_grant(request).await,
        Err(AppError::ProviderNotFound(_))
    ));

    let mut args = vault_args("alpha");
    args.insert("region".to_owned(), "eu".to_owned());
    assert!(matches!(
        service.create_grant(candidate(args)).await,
        Err(AppError::InvalidArgument { argument, .. }) if argument == "region"
    ));

    assert!(matches!(
        service.create_grant(candidate(BTreeMap::new())).await,
        Err(AppError::InvalidArgument { argument, .. }) if argument == "vault"
    ));
}

#[tokio::test]
async fn arg_options_are_filtered_by_group() {
    let service = service();

    let filters = BTreeMap::from([("team".to_owned(), vec!["platform".to_owned()])]);
    let options = service
        .list_provider_arg_options("testvault", "vault", &filters)
        .await
        .unwrap_or_default();
    let values: Vec<&str> = options
        .options
        .iter()
        .map(|option| option.value.as_str())
        .collect();
    assert_eq!(values, vec!["alpha", "beta"]);

    let unfiltered = service
        .list_provider_arg_options("testvault", "vault", &BTreeMap::new())
        .await
        .unwrap_or_default();
    assert_eq!(unfiltered.options.len(), 3);
}

#[tokio::test]
async fn unknown_filters_and_arguments_are_reported() {
    let service = service();

    let filters = BTreeMap::from([("region".to_owned(), vec!["eu".to_owned()])]);
    let result = service
        .list_provider_arg_options("testvault", "vault", &filters)
        .await;
    assert!(matches!(result, Err(AppError::InvalidFilter { filter, .. }) if filter == "region"));

    let result = service
        .list_provider_arg_options("testvault", "account", &BTreeMap::new())
        .await;
    assert!(matches!(result, Err(AppError::InvalidArgument { argument, .. }) if argument == "account"));
}

#[tokio::test]
async fn request_validation_reports_failing_steps() {
    let service = service();

    let results = service
        .validate_grant_request(
            "testvault",
            "alice@example.com",
            &vault_args("missing"),
            &Cancellation::new(),
        )
        .await;
    assert!(results.is_ok());
    let results = results.unwrap_or_default();
    assert_eq!(results.len(), 2);
    assert!(results.failed());
    assert_eq!(results.failure_message(), "Vault exists\n");

    let passing = service
        .validate_grant_request(
            "testvault",
            "alice@example.com",
            &vault_args("alpha"),
            &Cancellation::new(),
        )
        .await
        .unwrap_or_default();
    assert!(!passing.failed());
}

#[tokio::test]
async fn config_validation_reports_each_check() {
    let service = service();

    let report = service
        .run_config_validation(
            "commonfate/testvault@v1",
            ConfigValues::from_pairs([("vault_prefix", "demo")]),
            &Cancellation::new(),
        )
        .await
        .unwrap_or_default();
    assert!(!report.failed());

    let check = report.checks.get("prefix-set");
    assert_eq!(check.map(|check| check.status), Some(ConfigCheckStatus::Success));
    assert_eq!(
        check.map(|check| check.fields_validated.clone()),
        Some(vec!["vault_prefix".to_owned()])
    );

    let missing = service
        .run_config_validation("commonfate/testvault", ConfigValues::new(), &Cancellation::new())
        .await;
    assert!(matches!(missing, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn cancelled_config_checks_are_marked() {
    let service = service();
    let cancellation = Cancellation::new();
    cancellation.cancel();

    let report = service
        .run_config_validation(
            "commonfate/testvault",
            ConfigValues::from_pairs([("vault_prefix", "demo")]),
            &cancellation,
        )
        .await
        .unwrap_or_default();
    assert!(report.failed());
    assert_eq!(
        report.checks.get("prefix-set").map(|check| check.status),
        Some(ConfigCheckStatus::Cancelled)
    );
}

#[tokio::test]
async fn instructions_and_operations_reach_the_provider() {
    let service = service();
    let grant = service
        .create_grant(candidate(vault_args("alpha")))
        .await
        .unwrap_or_else(|_| unreachable!());

    let instructions = service.access_instructions(grant.id()).await;
    assert_eq!(
        instructions.ok().flatten(),
        Some("alice@example.com can now open vault alpha".to_owned())
    );

    let echoed = service
        .invoke_provider_operation("testvault", "echo", json!({"ping": true}))
        .await;
    assert_eq!(echoed.ok(), Some(json!({"ping": true})));

    let unknown = service
        .invoke_provider_operation("testvault", "rotate", json!({}))
        .await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

#[test]
fn providers_are_listed_with_capabilities() {
    let service = service();

    let providers = service.list_providers();
    assert_eq!(providers.len(), 1);
    let summary = &providers[0];
    assert_eq!(summary.id, "testvault");
    assert_eq!(summary.provider_type, "commonfate/testvault");
    assert!(summary.capabilities.arg_schema);
    assert!(summary.capabilities.operations);
    assert!(!summary.capabilities.validate);
    assert!(!summary.requires_access_token);

    let types = service.list_provider_types();
    assert_eq!(types.len(), 1);
}
