use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use pay_confirm::csv::{read_poll_script, write_receipt};
use pay_confirm::gateway::{PollStep, ScriptedGateway};
use pay_confirm::{Amount, PaymentEngine, PaymentState, SessionConfig};
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: pay-confirm <amount> [poll_script.csv]";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let Some(raw_amount) = args.next() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let amount: Amount = match raw_amount.parse() {
        Ok(amount) => amount,
        Err(e) => {
            eprintln!("invalid amount '{raw_amount}': {e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let steps = match args.next() {
        Some(path) => {
            if !path.ends_with(".csv") {
                warn!(path, "poll script seems to not be a csv file");
            }
            match read_poll_script(&path) {
                Ok(rows) => rows
                    .filter_map(|row| row.map_err(|e| warn!("{e}")).ok())
                    .collect(),
                Err(e) => {
                    eprintln!("{e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => vec![
            PollStep::pending(),
            PollStep::pending(),
            PollStep::confirmed_for("demo-transfer", amount),
        ],
    };

    let gateway = Arc::new(ScriptedGateway::new("QR-DEMO", "demo-correlation").with_steps(steps));
    let engine = PaymentEngine::new(gateway, SessionConfig::from_env());

    let mut transitions = engine.transitions();
    let printer = tokio::spawn(async move {
        while let Some(state) = transitions.next().await {
            eprintln!("state: {}", state.name());
        }
    });

    if let Err(e) = engine.generate(amount).await {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    info!(correlation_id = ?engine.correlation_id(), "waiting for confirmation");

    let code = match engine.settled().await {
        PaymentState::Success(record) => match write_receipt(std::io::stdout().lock(), &record) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("failed to write receipt: {e}");
                ExitCode::FAILURE
            }
        },
        PaymentState::Failure(reason) | PaymentState::Error(reason) => {
            eprintln!("payment failed: {reason}");
            ExitCode::FAILURE
        }
        PaymentState::Idle | PaymentState::Loading | PaymentState::CodeReady(_) => {
            ExitCode::FAILURE
        }
    };

    // dropping the engine closes the transition stream once every state is printed
    drop(engine);
    if let Err(e) = printer.await {
        warn!("transition printer failed: {e}");
    }
    code
}
