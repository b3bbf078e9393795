pub mod feed;
pub mod policy;
pub mod session;
pub mod store;

pub use feed::{LiveFeed, RosterAggregator, Subscription};
pub use session::{JwtSessionResolver, SessionResolver, StaticDirectory, UserDirectory};
pub use store::ThreadStore;
