//! STACKFLOW Policy
//!
//! Flow definitions and the rules deciding which flows apply to which
//! components: the match/exclude predicate, environment parsing and the
//! strict trait fulfillment check.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod environment;
pub mod flow;
pub mod fulfillment;
pub mod matcher;

pub use environment::{
    DriverOutputConfig, Environment, EnvironmentError, Environments, OutputConfig,
    DEFAULT_BUILDERS_PATH,
};
pub use flow::Flow;
pub use fulfillment::{
    check_trait_fulfillment, fulfillment_matrix, FulfillmentError, FulfillmentMatrix,
    UnmetObligation,
};
pub use matcher::{MatchError, Matcher};
