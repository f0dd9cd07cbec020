use std::sync::Arc;

use notification_dispatch::{
    app,
    clients::fallback::MemoryFallbackStore,
    error::StartupError,
    verifier::ChannelVerifier,
};
use tokio_test::{assert_err, assert_ok};

use crate::common::{Behavior, CHANNEL, FakeChannelClient, drain, settings, welcome_command};

/// Test: startup aborts before the app exists when a channel is missing
#[tokio::test]
async fn test_startup_aborts_when_required_channel_is_missing() {
    let client = Arc::new(FakeChannelClient::new(Behavior::Succeed).with_channels(&["audit"]));
    let verifier = ChannelVerifier::new(true, vec![CHANNEL.to_string()]);

    let result = app::prepare(
        settings(),
        &verifier,
        client.clone(),
        Arc::new(MemoryFallbackStore::new()),
    )
    .await;

    let Err(error) = result else {
        panic!("startup must fail when a required channel is missing");
    };
    assert!(
        matches!(&error, StartupError::MissingChannels(missing) if missing == &vec![CHANNEL.to_string()]),
        "unexpected error: {error}"
    );
    assert!(client.published().is_empty());
}

/// Test: every missing channel is reported, not just the first one
#[tokio::test]
async fn test_verifier_reports_all_missing_channels() {
    let client = FakeChannelClient::new(Behavior::Succeed).with_channels(&[CHANNEL]);
    let verifier = ChannelVerifier::new(
        true,
        vec![CHANNEL.to_string(), "audit".to_string(), "sms".to_string()],
    );

    let error = assert_err!(verifier.verify(&client).await);

    match error {
        StartupError::MissingChannels(missing) => assert_eq!(missing, vec!["audit", "sms"]),
        other => panic!("unexpected error: {other}"),
    }
}

/// Test: an unreachable broker is fatal at startup
#[tokio::test]
async fn test_startup_aborts_when_broker_is_unreachable() {
    let client = FakeChannelClient::new(Behavior::Succeed).unreachable();
    let verifier = ChannelVerifier::new(true, vec![CHANNEL.to_string()]);

    let error = assert_err!(verifier.verify(&client).await);

    assert!(
        matches!(&error, StartupError::BrokerUnavailable { channel, .. } if channel == CHANNEL),
        "unexpected error: {error}"
    );
}

/// Test: verification can be switched off for isolated startups
#[tokio::test]
async fn test_disabled_verification_skips_broker() {
    let client = FakeChannelClient::new(Behavior::Succeed).unreachable();
    let verifier = ChannelVerifier::new(false, vec![CHANNEL.to_string()]);

    assert!(!verifier.is_enabled());
    assert_ok!(verifier.verify(&client).await);
}

/// Test: with all channels present the app starts and can dispatch
#[tokio::test]
async fn test_startup_succeeds_when_channels_exist() {
    let client = Arc::new(FakeChannelClient::new(Behavior::Succeed));
    let store = MemoryFallbackStore::new();
    let verifier = ChannelVerifier::new(true, vec![CHANNEL.to_string()]);

    let result = app::prepare(settings(), &verifier, client.clone(), Arc::new(store.clone())).await;
    let Ok(app) = result else {
        panic!("startup should succeed when every channel exists");
    };

    let orchestrator = app.orchestrator();
    assert_eq!(orchestrator.channel(), CHANNEL);

    orchestrator.dispatch(welcome_command(1));
    drain(&orchestrator).await;

    assert_eq!(client.published().len(), 1);
    assert!(store.is_empty());
}
