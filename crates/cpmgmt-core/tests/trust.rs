use std::sync::Arc;

use cpmgmt_core::{
    ConnectionTarget, Connector, Fingerprint, FingerprintStore, MemoryFingerprintStore,
    SessionError, TrustVerifier,
};
use cpmgmt_test_support::fixtures::{FOREIGN_FINGERPRINT, MANAGEMENT_HOST, SERVER_FINGERPRINT};
use cpmgmt_test_support::mocks::{MockServer, RecordedCall};

fn verifier() -> (TrustVerifier, Arc<MemoryFingerprintStore>) {
    let store = Arc::new(MemoryFingerprintStore::new());
    (TrustVerifier::new(store.clone()), store)
}

#[tokio::test]
async fn supplied_fingerprint_is_persisted_and_verified() -> anyhow::Result<()> {
    let server = MockServer::new(SERVER_FINGERPRINT);
    let (verifier, store) = verifier();
    let target = ConnectionTarget::new(MANAGEMENT_HOST);
    let supplied = Fingerprint::new(SERVER_FINGERPRINT.to_lowercase().replace(':', ""));

    let api = server.connector().connect(&target)?;
    let connection = verifier.verify(api, &target, Some(&supplied)).await?;

    assert_eq!(connection.fingerprint(), &Fingerprint::new(SERVER_FINGERPRINT));
    let stored = store.load(MANAGEMENT_HOST)?;
    assert_eq!(stored.map(|f| f.as_str().to_string()), Some(supplied.as_str().to_string()));
    Ok(())
}

#[tokio::test]
async fn stored_fingerprint_is_used_when_none_supplied() -> anyhow::Result<()> {
    let server = MockServer::new(SERVER_FINGERPRINT);
    let (verifier, store) = verifier();
    store.save(MANAGEMENT_HOST, &Fingerprint::new(SERVER_FINGERPRINT))?;
    let target = ConnectionTarget::new(MANAGEMENT_HOST);

    let api = server.connector().connect(&target)?;
    verifier.verify(api, &target, None).await?;
    Ok(())
}

#[tokio::test]
async fn missing_fingerprint_fails_before_contacting_server() -> anyhow::Result<()> {
    let server = MockServer::new(SERVER_FINGERPRINT);
    let (verifier, _store) = verifier();
    let target = ConnectionTarget::new(MANAGEMENT_HOST);

    let api = server.connector().connect(&target)?;
    let result = verifier.verify(api, &target, None).await;

    assert!(matches!(result, Err(SessionError::MissingFingerprint { host }) if host == MANAGEMENT_HOST));
    assert!(!server.calls().contains(&RecordedCall::ServerFingerprint));
    Ok(())
}

#[tokio::test]
async fn blank_supplied_fingerprint_counts_as_absent() -> anyhow::Result<()> {
    let server = MockServer::new(SERVER_FINGERPRINT);
    let (verifier, store) = verifier();
    let target = ConnectionTarget::new(MANAGEMENT_HOST);

    let api = server.connector().connect(&target)?;
    let result = verifier.verify(api, &target, Some(&Fingerprint::new(""))).await;

    assert!(matches!(result, Err(SessionError::MissingFingerprint { .. })));
    assert!(store.load(MANAGEMENT_HOST)?.is_none());
    Ok(())
}

#[tokio::test]
async fn mismatch_reports_live_fingerprint_and_keeps_supplied_trust() -> anyhow::Result<()> {
    let server = MockServer::new(SERVER_FINGERPRINT);
    let (verifier, store) = verifier();
    let target = ConnectionTarget::new(MANAGEMENT_HOST);

    let api = server.connector().connect(&target)?;
    let supplied = Fingerprint::new(FOREIGN_FINGERPRINT);
    let Err(err) = verifier.verify(api, &target, Some(&supplied)).await else {
        anyhow::bail!("verification should fail on mismatch");
    };

    assert!(matches!(err, SessionError::UntrustedServer { .. }));
    assert!(err.to_string().contains(SERVER_FINGERPRINT));
    assert_eq!(store.load(MANAGEMENT_HOST)?, Some(supplied));
    Ok(())
}

#[tokio::test]
async fn stored_fingerprint_mismatch_is_untrusted() -> anyhow::Result<()> {
    let server = MockServer::new(FOREIGN_FINGERPRINT);
    let (verifier, store) = verifier();
    store.save(MANAGEMENT_HOST, &Fingerprint::new(SERVER_FINGERPRINT))?;
    let target = ConnectionTarget::new(MANAGEMENT_HOST);

    let api = server.connector().connect(&target)?;
    let result = verifier.verify(api, &target, None).await;
    assert!(
        matches!(result, Err(SessionError::UntrustedServer { live, .. }) if live == Fingerprint::new(FOREIGN_FINGERPRINT))
    );
    Ok(())
}

#[tokio::test]
async fn trusted_connection_pins_calls_to_verified_fingerprint() -> anyhow::Result<()> {
    let server = MockServer::new(SERVER_FINGERPRINT);
    let (verifier, _store) = verifier();
    let target = ConnectionTarget::new(MANAGEMENT_HOST);

    let api = server.connector().connect(&target)?;
    let connection = verifier
        .verify(api, &target, Some(&Fingerprint::new(SERVER_FINGERPRINT)))
        .await?;
    connection
        .call("sid-9", "show-hosts", &serde_json::json!({}))
        .await?;

    let pinned_call = server.calls().into_iter().find_map(|call| match call {
        RecordedCall::ApiCall {
            session_id, pinned, ..
        } => Some((session_id, pinned)),
        _ => None,
    });
    assert_eq!(
        pinned_call,
        Some(("sid-9".to_string(), Fingerprint::new(SERVER_FINGERPRINT)))
    );
    Ok(())
}
