/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! One-shot request fan-out/fan-in behavior: single-reply guarantees,
//! partial failure composition, timeouts and cache short-circuiting.

mod support;

use loc_fusion::{
    AccuracyLevel, ClientHandle, EngineCommand, ErrorCode, Reply, ResponseTimeLevel, StateHandler,
    MAXIMUM_AGE_ACCEPT_ANY,
};
use std::time::Duration;
use support::{
    after, assert_no_reply_for, recv_for, sample, spawn_engine, test_config, ScriptedProvider,
};

fn get_position(
    client: u64,
    accuracy: Option<AccuracyLevel>,
    response_time: Option<ResponseTimeLevel>,
) -> EngineCommand {
    EngineCommand::GetCurrentPosition {
        client: ClientHandle::new(client),
        accuracy,
        response_time,
        maximum_age: None,
    }
}

#[tokio::test]
async fn high_accuracy_low_response_time_uses_gps_only_and_replies_once() {
    let gps = ScriptedProvider::with_position_script(vec![after(
        30,
        Ok(sample(37.39, -122.08, 12.0)),
    )]);
    let network = ScriptedProvider::silent();
    let mut fixture = spawn_engine(gps.clone(), network.clone(), test_config());

    // Matches the scenario of a device with networked positioning disabled.
    fixture
        .handle
        .submit(EngineCommand::SetState {
            client: ClientHandle::new(99),
            handler: StateHandler::Network,
            enabled: false,
        })
        .unwrap();
    recv_for(&mut fixture.replies, ClientHandle::new(99)).await;

    let client = ClientHandle::new(1);
    fixture
        .handle
        .submit(get_position(
            1,
            Some(AccuracyLevel::High),
            Some(ResponseTimeLevel::Low),
        ))
        .unwrap();

    let reply = recv_for(&mut fixture.replies, client).await;
    match reply {
        Reply::Position(position) => assert_eq!(position.horizontal_accuracy, 12.0),
        other => panic!("expected position reply, got {other:?}"),
    }
    assert_eq!(gps.starts(), 1);
    assert_eq!(network.starts(), 0);

    // The 200ms deadline must not produce a second reply.
    assert_no_reply_for(&mut fixture.replies, client, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn first_success_wins_across_fanned_out_providers() {
    let gps = ScriptedProvider::with_position_script(vec![after(
        80,
        Ok(sample(37.39, -122.08, 10.0)),
    )]);
    let network = ScriptedProvider::with_position_script(vec![after(
        10,
        Ok(sample(37.40, -122.09, 400.0)),
    )]);
    let mut fixture = spawn_engine(gps, network, test_config());

    let client = ClientHandle::new(2);
    fixture.handle.submit(get_position(2, None, None)).unwrap();

    let reply = recv_for(&mut fixture.replies, client).await;
    match reply {
        Reply::Position(position) => assert_eq!(position.horizontal_accuracy, 400.0),
        other => panic!("expected network fix, got {other:?}"),
    }
    assert_no_reply_for(&mut fixture.replies, client, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn all_sources_failing_compose_into_one_pos_not_available() {
    let gps = ScriptedProvider::with_position_script(vec![after(
        10,
        Err(ErrorCode::PosNotAvailable),
    )]);
    let network = ScriptedProvider::with_position_script(vec![after(
        20,
        Err(ErrorCode::PosNotAvailable),
    )]);
    let mut fixture = spawn_engine(gps, network, test_config());

    let client = ClientHandle::new(3);
    fixture.handle.submit(get_position(3, None, None)).unwrap();

    let reply = recv_for(&mut fixture.replies, client).await;
    assert_eq!(reply, Reply::Failure(ErrorCode::PosNotAvailable));
    assert_no_reply_for(&mut fixture.replies, client, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn partial_failure_waits_for_the_remaining_provider() {
    let gps = ScriptedProvider::with_position_script(vec![after(
        120,
        Ok(sample(37.39, -122.08, 15.0)),
    )]);
    let network = ScriptedProvider::with_position_script(vec![after(
        10,
        Err(ErrorCode::PosNotAvailable),
    )]);
    let mut fixture = spawn_engine(gps, network, test_config());

    let client = ClientHandle::new(4);
    fixture.handle.submit(get_position(4, None, None)).unwrap();

    let reply = recv_for(&mut fixture.replies, client).await;
    match reply {
        Reply::Position(position) => assert_eq!(position.horizontal_accuracy, 15.0),
        other => panic!("expected gps fix after network failure, got {other:?}"),
    }
}

#[tokio::test]
async fn silent_providers_time_out_at_but_not_before_the_deadline() {
    let gps = ScriptedProvider::silent();
    let network = ScriptedProvider::silent();
    let mut fixture = spawn_engine(gps.clone(), network.clone(), test_config());

    let client = ClientHandle::new(5);
    // responseTime low maps to the 200ms test deadline.
    fixture
        .handle
        .submit(get_position(5, None, Some(ResponseTimeLevel::Low)))
        .unwrap();

    assert_no_reply_for(&mut fixture.replies, client, Duration::from_millis(150)).await;
    let reply = recv_for(&mut fixture.replies, client).await;
    assert_eq!(reply, Reply::Failure(ErrorCode::TimeOut));

    // Timed-out providers are force-stopped.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gps.stops(), 1);
    assert_eq!(network.stops(), 1);
}

#[tokio::test]
async fn two_clients_waiting_on_one_provider_each_get_exactly_one_reply() {
    // A single scripted reply: the second request rides the in-flight call.
    let gps = ScriptedProvider::with_position_script(vec![after(
        60,
        Ok(sample(37.39, -122.08, 20.0)),
    )]);
    let network = ScriptedProvider::silent();
    let mut fixture = spawn_engine(gps.clone(), network, test_config());

    fixture
        .handle
        .submit(get_position(6, Some(AccuracyLevel::High), None))
        .unwrap();
    fixture
        .handle
        .submit(get_position(7, Some(AccuracyLevel::High), None))
        .unwrap();

    let first = recv_for(&mut fixture.replies, ClientHandle::new(6)).await;
    let second = recv_for(&mut fixture.replies, ClientHandle::new(7)).await;
    assert!(matches!(first, Reply::Position(_)));
    assert!(matches!(second, Reply::Position(_)));

    // The backend saw one call, not a silent dedup of the two requests.
    assert_eq!(gps.position_requests(), 1);
    assert_no_reply_for(
        &mut fixture.replies,
        ClientHandle::new(6),
        Duration::from_millis(200),
    )
    .await;
}

#[tokio::test]
async fn cached_fix_short_circuits_fan_out() {
    let gps = ScriptedProvider::with_position_script(vec![after(
        10,
        Ok(sample(37.39, -122.08, 25.0)),
    )]);
    let network = ScriptedProvider::silent();
    let mut fixture = spawn_engine(gps.clone(), network, test_config());

    fixture
        .handle
        .submit(get_position(8, Some(AccuracyLevel::High), None))
        .unwrap();
    recv_for(&mut fixture.replies, ClientHandle::new(8)).await;
    assert_eq!(gps.starts(), 1);

    fixture
        .handle
        .submit(EngineCommand::GetCurrentPosition {
            client: ClientHandle::new(9),
            accuracy: Some(AccuracyLevel::High),
            response_time: None,
            maximum_age: Some(MAXIMUM_AGE_ACCEPT_ANY),
        })
        .unwrap();

    let reply = recv_for(&mut fixture.replies, ClientHandle::new(9)).await;
    match reply {
        Reply::Position(position) => assert_eq!(position.horizontal_accuracy, 25.0),
        other => panic!("expected cached fix, got {other:?}"),
    }
    // No second fan-out happened.
    assert_eq!(gps.starts(), 1);
    assert_eq!(gps.position_requests(), 1);
}

#[tokio::test]
async fn disabling_both_sources_rejects_with_location_off() {
    let mut fixture = spawn_engine(
        ScriptedProvider::silent(),
        ScriptedProvider::silent(),
        test_config(),
    );

    for (client, handler) in [(90, StateHandler::Gps), (91, StateHandler::Network)] {
        fixture
            .handle
            .submit(EngineCommand::SetState {
                client: ClientHandle::new(client),
                handler,
                enabled: false,
            })
            .unwrap();
        recv_for(&mut fixture.replies, ClientHandle::new(client)).await;
    }

    let client = ClientHandle::new(10);
    fixture.handle.submit(get_position(10, None, None)).unwrap();

    let reply = recv_for(&mut fixture.replies, client).await;
    assert_eq!(reply, Reply::Failure(ErrorCode::LocationOff));
}

#[tokio::test]
async fn exactly_one_reply_across_outcome_interleavings() {
    #[derive(Clone, Copy, Debug)]
    enum Behavior {
        Success(u64),
        Failure(u64),
        Silent,
    }

    // The network driver answers both the wifi and cell kinds, so its
    // script needs one reply per kind.
    fn script_for(behavior: Behavior, copies: usize) -> Vec<support::ScriptedReply> {
        let reply = match behavior {
            Behavior::Success(delay) => after(delay, Ok(sample(37.39, -122.08, 30.0))),
            Behavior::Failure(delay) => after(delay, Err(ErrorCode::PosNotAvailable)),
            Behavior::Silent => return Vec::new(),
        };
        std::iter::repeat_with(|| reply.clone()).take(copies).collect()
    }

    let behaviors = [
        Behavior::Success(10),
        Behavior::Success(90),
        Behavior::Failure(10),
        Behavior::Failure(90),
        Behavior::Silent,
    ];

    let mut case = 0u64;
    for gps_behavior in behaviors {
        for network_behavior in behaviors {
            case += 1;
            let gps = ScriptedProvider::with_position_script(script_for(gps_behavior, 1));
            let network = ScriptedProvider::with_position_script(script_for(network_behavior, 2));
            let mut fixture = spawn_engine(gps, network, test_config());

            let client = ClientHandle::new(case);
            fixture
                .handle
                .submit(EngineCommand::GetCurrentPosition {
                    client,
                    accuracy: None,
                    response_time: Some(ResponseTimeLevel::Low),
                    maximum_age: None,
                })
                .unwrap();

            // Exactly one reply per interleaving, success or composed
            // failure or timeout, and never a second one.
            let first = recv_for(&mut fixture.replies, client).await;
            match (gps_behavior, network_behavior) {
                (Behavior::Success(_), _) | (_, Behavior::Success(_)) => {
                    assert!(
                        matches!(first, Reply::Position(_)),
                        "case {case} ({gps_behavior:?}/{network_behavior:?}): {first:?}"
                    );
                }
                (Behavior::Failure(_), Behavior::Failure(_)) => {
                    assert_eq!(first, Reply::Failure(ErrorCode::PosNotAvailable));
                }
                _ => {
                    assert_eq!(first, Reply::Failure(ErrorCode::TimeOut));
                }
            }
            assert_no_reply_for(&mut fixture.replies, client, Duration::from_millis(250)).await;
        }
    }
}

#[tokio::test]
async fn start_failures_leave_their_bits_clear() {
    // GPS refuses to start; the network path still answers.
    let gps = ScriptedProvider::refusing_start();
    let network = ScriptedProvider::with_position_script(vec![after(
        10,
        Ok(sample(37.41, -122.10, 600.0)),
    )]);
    let mut fixture = spawn_engine(gps, network, test_config());

    let client = ClientHandle::new(11);
    fixture.handle.submit(get_position(11, None, None)).unwrap();

    let reply = recv_for(&mut fixture.replies, client).await;
    assert!(matches!(reply, Reply::Position(_)));
}
