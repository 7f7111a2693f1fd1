use std::sync::Arc;
use std::time::Duration;

use pay_confirm::engine::EXPIRED_MESSAGE;
use pay_confirm::gateway::{PollStep, ScriptedGateway};
use pay_confirm::{
    Amount, CorrelationId, EngineError, GenerateError, PaymentEngine, PaymentState,
    SessionConfig,
};
use tokio_stream::{Stream, StreamExt};

fn amount(text: &str) -> Amount {
    text.parse().unwrap()
}

async fn collect_until_settled(
    transitions: &mut (impl Stream<Item = PaymentState> + Unpin),
) -> Vec<PaymentState> {
    let mut seen = Vec::new();
    while let Some(state) = transitions.next().await {
        let done = state.is_terminal() || state == PaymentState::Idle;
        seen.push(state);
        if done {
            break;
        }
    }
    seen
}

fn names(states: &[PaymentState]) -> Vec<&'static str> {
    states.iter().map(PaymentState::name).collect()
}

#[tokio::test(start_paused = true)]
async fn qr_payment_confirmed_on_third_poll() {
    let gateway = Arc::new(ScriptedGateway::new("QR123", "abc").with_steps([
        PollStep::pending(),
        PollStep::pending(),
        PollStep::confirmed_for("tx-hash", amount("4.99")),
    ]));
    let engine = PaymentEngine::new(gateway.clone(), SessionConfig::default());
    let mut transitions = engine.transitions();

    let payload = engine.generate(amount("4.99")).await.unwrap();
    assert_eq!(payload.code, "QR123");
    assert_eq!(payload.correlation_id, CorrelationId::new("abc"));
    assert!(payload.image.is_some());

    let seen = collect_until_settled(&mut transitions).await;

    assert_eq!(names(&seen), vec!["loading", "code_ready", "success"]);
    match seen.last().unwrap() {
        PaymentState::Success(record) => {
            assert_eq!(record.hash, "tx-hash");
            assert_eq!(record.amount, amount("4.99"));
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(gateway.check_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_then_success() {
    let gateway = Arc::new(ScriptedGateway::new("QR123", "abc").with_steps([
        PollStep::transport("timeout"),
        PollStep::transport("timeout"),
        PollStep::transport("connection reset"),
        PollStep::confirmed_for("tx-hash", amount("10")),
    ]));
    let engine = PaymentEngine::new(gateway.clone(), SessionConfig::default());

    engine.generate(amount("10")).await.unwrap();
    let settled = engine.settled().await;

    assert!(matches!(settled, PaymentState::Success(_)));
    let instants = gateway.check_instants();
    assert_eq!(instants.len(), 4);
    for pair in instants.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(3));
    }
}

#[tokio::test(start_paused = true)]
async fn never_confirmed_expires_after_window() {
    let gateway = Arc::new(ScriptedGateway::new("QR123", "abc"));
    let engine = PaymentEngine::new(gateway.clone(), SessionConfig::default());
    let started = tokio::time::Instant::now();

    engine.generate(amount("1")).await.unwrap();
    let settled = engine.settled().await;

    assert_eq!(settled, PaymentState::Failure(EXPIRED_MESSAGE.to_string()));
    assert_eq!(started.elapsed(), Duration::from_secs(180));
    // polls at 0, 3, ..., 177 and possibly 180
    assert!((60..=61).contains(&gateway.check_calls()));
}

#[tokio::test]
async fn non_positive_amounts_never_reach_gateway() {
    let gateway = Arc::new(ScriptedGateway::new("QR123", "abc"));
    let engine = PaymentEngine::new(gateway.clone(), SessionConfig::default());

    for text in ["0", "-5", "0.0000"] {
        let result = engine.generate(amount(text)).await;
        assert!(matches!(
            result,
            Err(EngineError::Generate(GenerateError::InvalidAmount(_)))
        ));
    }

    assert_eq!(gateway.create_calls(), 0);
    assert_eq!(engine.state(), PaymentState::Idle);
}

#[tokio::test(start_paused = true)]
async fn exactly_one_terminal_state_per_session() {
    let scripts: Vec<Vec<PollStep>> = vec![
        vec![PollStep::confirmed_for("h", amount("1"))],
        vec![PollStep::rejected(3, "declined")],
        vec![PollStep::transport("down"), PollStep::rejected(9, "fraud")],
        vec![PollStep::pending(); 2],
        vec![
            PollStep::pending(),
            PollStep::pending(),
            PollStep::confirmed_for("h", amount("1")),
        ],
    ];

    for steps in scripts {
        let gateway = Arc::new(ScriptedGateway::new("QR", "id").with_steps(steps));
        // expiry lands on the same tick as the third poll
        let config = SessionConfig::default().with_expiry_secs(6);
        let engine = PaymentEngine::new(gateway, config);
        let mut transitions = engine.transitions();

        engine.generate(amount("1")).await.unwrap();
        let mut seen = collect_until_settled(&mut transitions).await;

        // nothing else may arrive once settled
        tokio::time::sleep(Duration::from_secs(20)).await;
        while let Ok(Some(state)) =
            tokio::time::timeout(Duration::from_millis(1), transitions.next()).await
        {
            seen.push(state);
        }

        let terminals = seen.iter().filter(|s| s.is_terminal()).count();
        assert_eq!(terminals, 1, "transitions: {:?}", names(&seen));
        assert_eq!(seen.last(), Some(&engine.state()));
    }
}

#[tokio::test(start_paused = true)]
async fn observers_follow_a_regenerated_session() {
    let gateway = Arc::new(ScriptedGateway::new("QR123", "abc"));
    let engine = PaymentEngine::new(gateway.clone(), SessionConfig::default());
    let mut state_rx = engine.subscribe();

    engine.generate(amount("1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60_500)).await;
    assert_eq!(engine.remaining_seconds(), 120);

    gateway.push_step(PollStep::rejected(2, "expired card"));
    engine.generate(amount("2")).await.unwrap();
    assert_eq!(engine.remaining_seconds(), 180);

    let settled = state_rx
        .wait_for(|state| state.is_terminal())
        .await
        .unwrap()
        .clone();
    assert_eq!(settled, PaymentState::Failure("expired card".to_string()));
}

/// At most one terminal state between consecutive `loading` transitions.
fn assert_single_terminal_per_session(seen: &[PaymentState]) {
    let mut terminals = 0;
    for state in seen {
        if *state == PaymentState::Loading {
            terminals = 0;
        } else if state.is_terminal() {
            terminals += 1;
            assert!(terminals <= 1, "transitions: {:?}", names(seen));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_signals_settle_once_on_parallel_workers() {
    for round in 0..200u32 {
        let step = match round % 3 {
            0 => PollStep::confirmed_for("h", amount("1")),
            1 => PollStep::rejected(3, "declined"),
            _ => PollStep::pending(),
        };
        let gateway = Arc::new(ScriptedGateway::new("QR", "id").with_steps([step]));
        // a zero window expires on the same instant as the first poll
        let config = SessionConfig::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_expiry_secs(0);
        let engine = Arc::new(PaymentEngine::new(gateway, config));
        let mut transitions = engine.transitions();

        let canceller = {
            let engine = engine.clone();
            tokio::spawn(async move {
                for _ in 0..round % 5 {
                    tokio::task::yield_now().await;
                }
                engine.cancel();
            })
        };

        match engine.generate(amount("1")).await {
            Ok(_) | Err(EngineError::Superseded) => {}
            Err(e) => panic!("unexpected generate error: {e}"),
        }
        canceller.await.unwrap();
        engine.settled().await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut seen = Vec::new();
        while let Ok(Some(state)) =
            tokio::time::timeout(Duration::from_millis(5), transitions.next()).await
        {
            seen.push(state);
        }

        assert_single_terminal_per_session(&seen);
        if let Some(last) = seen.last() {
            assert_eq!(last, &engine.state(), "round {round}");
        }
    }
}
