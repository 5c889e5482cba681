pub mod path_utils;
pub mod record;
pub mod store;

pub use store::{AddOutcome, Listed, SubscriptionStore};
