//! End-to-end pipeline tests against the in-memory mock backend.

use std::sync::Arc;

use codec::{Compact, Encode};

use fork_sandbox_core::{
    mock_signed_envelope, BatchItem, BatchSimulationRequest, BuildMode, Direction, DispatchError,
    HandleStats, MockBackend, MockProvider, SimulationLog, SimulationRequest, Simulator,
    SimulatorError,
};
use fork_sandbox_types::{public_key, to_hex};

const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
const WND: u128 = 1_000_000_000_000;
const ENDPOINT: &str = "wss://westend-rpc.polkadot.io";

fn transfer_call(dest: &str, value: u128) -> Vec<u8> {
    let mut call = vec![5u8, 0, 0];
    call.extend_from_slice(&public_key(dest).unwrap());
    Compact(value).encode_to(&mut call);
    call
}

fn simulator(template: MockBackend) -> (Simulator, Arc<HandleStats>) {
    let provider = MockProvider::new(template);
    let stats = provider.stats();
    let sim = Simulator::new(
        Arc::new(provider),
        BuildMode::Instant,
        Arc::new(SimulationLog::new()),
    );
    (sim, stats)
}

fn single_request(operation: &[u8], sender: &str) -> SimulationRequest {
    SimulationRequest {
        endpoints: vec![ENDPOINT.to_string()],
        operation_bytes: to_hex(operation),
        sender_address: sender.to_string(),
        block_hash: None,
        build_mode: BuildMode::Instant,
    }
}

fn batch_request(items: &[(Vec<u8>, &str, &str)]) -> BatchSimulationRequest {
    BatchSimulationRequest {
        endpoints: vec![ENDPOINT.to_string()],
        items: items
            .iter()
            .map(|(op, sender, desc)| BatchItem {
                operation_bytes: to_hex(op),
                sender_address: sender.to_string(),
                description: desc.to_string(),
            })
            .collect(),
        build_mode: BuildMode::Instant,
    }
}

#[tokio::test]
async fn single_transfer_succeeds_with_fee_and_send_delta() {
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
    let (sim, stats) = simulator(template);

    let request = single_request(&transfer_call(BOB, WND / 10), ALICE);
    let result = sim.simulate(&request).await.unwrap();

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert!(result.error.is_none());
    assert_ne!(result.estimated_fee, "0");
    assert_eq!(result.balance_changes.len(), 1);
    assert_eq!(result.balance_changes[0].direction, Direction::Send);
    assert!(result.events.iter().any(|e| e == "balances.Transfer"));
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn signed_envelope_input_is_unwrapped() {
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
    let (sim, stats) = simulator(template);

    let call = transfer_call(BOB, WND / 10);
    let envelope = mock_signed_envelope(&call, &public_key(ALICE).unwrap(), 0, 0, b"head");
    let result = sim.simulate(&single_request(&envelope, ALICE)).await.unwrap();

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn https_only_endpoints_rejected_before_fork() {
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
    let (sim, stats) = simulator(template);

    let mut request = single_request(&transfer_call(BOB, WND), ALICE);
    request.endpoints = vec!["https://westend-rpc.polkadot.io".to_string()];
    let err = sim.simulate(&request).await.unwrap_err();

    assert!(matches!(err, SimulatorError::NoValidEndpoints { .. }));
    assert_eq!(stats.acquired.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dry_run_is_deterministic() {
    let request = single_request(&transfer_call(BOB, WND / 4), ALICE);

    let mut observed = Vec::new();
    for _ in 0..2 {
        let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
        let (sim, _) = simulator(template);
        let result = sim.simulate(&request).await.unwrap();
        observed.push((result.success, result.estimated_fee));
    }
    assert_eq!(observed[0], observed[1]);
}

#[tokio::test]
async fn missing_fee_api_is_ignorable_fallback() {
    let template = MockBackend::westend()
        .with_account(ALICE, 10 * WND, 0)
        .unwrap()
        .failing_fee_estimation();
    let (sim, stats) = simulator(template);

    let result = sim
        .simulate(&single_request(&transfer_call(BOB, WND / 10), ALICE))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.estimated_fee, "0");
    let records = sim.log().drain();
    assert!(records.iter().any(|r| r.ignored && r.phase == "fee-estimation"));
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn sequential_partial_results_on_blocking_failure() {
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
    let (sim, stats) = simulator(template);

    let request = batch_request(&[
        (transfer_call(BOB, WND / 10), ALICE, "small transfer"),
        (transfer_call(BOB, 100 * WND), ALICE, "oversized transfer"),
    ]);
    let result = sim.simulate_sequential(&request).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.results.len(), 2);
    assert!(result.results[0].result.success);
    assert!(!result.results[1].result.success);
    let error = result.error.unwrap();
    assert!(error.contains("step 1"), "missing index qualifier: {error}");
    assert!(error.contains("oversized transfer"));
    assert!(error.contains("balances.InsufficientBalance"));
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn sequential_later_item_sees_earlier_effects() {
    // Bob starts with no account at all; his spend is only valid after
    // Alice's transfer lands in a committed block.
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
    let (sim, stats) = simulator(template);

    let request = batch_request(&[
        (transfer_call(BOB, WND / 2), ALICE, "fund bob"),
        (transfer_call(ALICE, WND / 5), BOB, "bob spends"),
    ]);
    let result = sim.simulate_sequential(&request).await.unwrap();

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.results.len(), 2);
    assert!(result.results[1].result.success);
    let bob_changes = &result.results[1].result.balance_changes;
    assert_eq!(bob_changes.len(), 1);
    assert_eq!(bob_changes[0].direction, Direction::Send);
    assert_ne!(result.total_estimated_fee, "0");
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn batch_build_mode_seals_once() {
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
    let provider = MockProvider::new(template);
    let stats = provider.stats();
    let sim = Simulator::new(
        Arc::new(provider),
        BuildMode::Batch,
        Arc::new(SimulationLog::new()),
    );

    let request = batch_request(&[
        (transfer_call(BOB, WND / 10), ALICE, "first"),
        (transfer_call(BOB, WND / 10), ALICE, "second"),
    ]);
    let result = sim.simulate_sequential(&request).await.unwrap();

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.results.len(), 2);
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn empty_batch_rejected_before_fork() {
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
    let (sim, stats) = simulator(template);

    let err = sim.simulate_sequential(&batch_request(&[])).await.unwrap_err();
    assert!(matches!(err, SimulatorError::EmptyBatch));
    assert_eq!(stats.acquired.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn handles_balance_on_forced_failure_paths() {
    // Forced dispatch error: blocking failure mid-batch still releases.
    let template = MockBackend::westend()
        .with_account(ALICE, 10 * WND, 0)
        .unwrap()
        .forcing_dispatch_error(DispatchError::BadOrigin);
    let (sim, stats) = simulator(template);

    let request = batch_request(&[(transfer_call(BOB, WND / 10), ALICE, "doomed")]);
    let result = sim.simulate_sequential(&request).await.unwrap();
    assert!(!result.success);
    assert_eq!(stats.outstanding(), 0);

    // Fork setup failure: nothing acquired, nothing leaked.
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 0).unwrap();
    let provider = MockProvider::new(template).failing_fork();
    let stats = provider.stats();
    let sim = Simulator::new(
        Arc::new(provider),
        BuildMode::Instant,
        Arc::new(SimulationLog::new()),
    );
    let err = sim
        .simulate(&single_request(&transfer_call(BOB, WND / 10), ALICE))
        .await
        .unwrap_err();
    assert!(matches!(err, SimulatorError::Infrastructure(_)));
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn dropped_extrinsics_surface_as_internal_defect() {
    // Instant mode: the per-operation seal check fires.
    let template = MockBackend::westend()
        .with_account(ALICE, 10 * WND, 0)
        .unwrap()
        .dropping_sealed_extrinsics();
    let (sim, stats) = simulator(template);

    let request = batch_request(&[(transfer_call(BOB, WND / 10), ALICE, "dropped")]);
    let err = sim.simulate_sequential(&request).await.unwrap_err();
    assert!(matches!(
        err,
        SimulatorError::BlockMissedOperations {
            expected: 1,
            included: 0
        }
    ));
    // Internal defect, not a classified operation failure.
    assert!(err.to_string().contains("defect"));
    assert_eq!(stats.outstanding(), 0);

    // Batch mode: the end-of-batch count comparison fires instead.
    let template = MockBackend::westend()
        .with_account(ALICE, 10 * WND, 0)
        .unwrap()
        .dropping_sealed_extrinsics();
    let sim = Simulator::new(
        Arc::new(MockProvider::new(template)),
        BuildMode::Batch,
        Arc::new(SimulationLog::new()),
    );
    let request = batch_request(&[
        (transfer_call(BOB, WND / 10), ALICE, "first"),
        (transfer_call(BOB, WND / 10), ALICE, "second"),
    ]);
    let err = sim.simulate_sequential(&request).await.unwrap_err();
    assert!(matches!(
        err,
        SimulatorError::BlockMissedOperations {
            expected: 2,
            included: 0
        }
    ));
}

#[tokio::test]
async fn stale_nonce_reported_with_reason() {
    let template = MockBackend::westend().with_account(ALICE, 10 * WND, 5).unwrap();
    let (sim, _) = simulator(template);

    // A pre-signed envelope pinned to nonce 0 against an account at nonce 5.
    let call = transfer_call(BOB, WND / 10);
    let envelope = mock_signed_envelope(&call, &public_key(ALICE).unwrap(), 0, 0, b"head");
    let result = sim.simulate(&single_request(&envelope, ALICE)).await.unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("stale"));
}
