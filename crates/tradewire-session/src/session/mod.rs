/*
[INPUT]:  Transport events and application operations
[OUTPUT]: Established protocol sessions with call correlation and subscriptions
[POS]:    Session layer - protocol core owned by exactly one connection
[UPDATE]: When adding session operations or changing per-session tables
*/

pub mod machine;
pub mod pending;
pub mod subscription;
pub mod topic;

pub use machine::{Disconnect, Session, SessionState, SessionTransition, WelcomeInfo};
pub use pending::{CallHandle, PendingCalls};
pub use subscription::{Listener, SubscriptionTable};
pub use topic::TopicRegistry;
