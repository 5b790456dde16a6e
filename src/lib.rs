pub mod compose;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod rate_limit;
pub mod relay;
pub mod request;
pub mod server;
pub mod statistics;
pub mod submission;

pub use config::{Config, DeploymentMode, Environment};
pub use controller::{ContactForm, Field, HttpSubmitter, Status, SubmitOutcome};
pub use error::{GatewayError, RelayError};
pub use gateway::{Gateway, GatewayResponse};
pub use request::GatewayRequest;
pub use statistics::{StatEvent, StatisticsCollector};
pub use submission::{ContactSubmission, ResponseBody, SubmissionResult};
