//! Graph store: authoritative snapshot, middleware pipeline, live queries.

pub mod connector;
pub mod graph;
pub mod middleware;
pub mod path;
pub mod query;

pub use connector::{AdapterConnector, Connector};
pub use graph::{
    GraphStore, PathSubscription, PathUpdate, PutReceipt, QuerySubscription, StoreError, StoreEvent,
};
pub use middleware::{MiddlewareError, MiddlewareFn, MiddlewareKind, MiddlewareToken, PutOptions};
pub use path::{PathData, PathValue};
pub use query::{QueryState, QueryUpdate, SubscriptionId};
