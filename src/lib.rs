pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod gateway;
pub mod model;

pub use amount::Amount;
pub use config::SessionConfig;
pub use engine::{EngineError, GenerateError, PaymentEngine, PaymentState};
pub use gateway::{GatewayError, PaymentGateway};
pub use model::{CodePayload, CorrelationId, TransactionRecord, TransactionStatus};
