//! pubsync poll protocol
//!
//! Newline-delimited JSON. Each request line is one poll, each response
//! line answers the poll before it.
//!
//! ## Request
//! ```text
//! {"auth": {"sid": "..."},
//!  "changeSet": {"users": {"update": [{"_id": "u1", "patch": [...]}]}},
//!  "methods": [{"id": "1", "name": "redeemCreditCode", "opts": {"creditCode": "X"}}],
//!  "subscriptions": [{"name": "user", "opts": {}, "updatedAt": {"users": 1700000000000}}]}
//! {"ping": true}
//! ```
//!
//! ## Response
//! ```text
//! {"changeSetResults": {...}, "methodsResults": [...], "subResults": [...]}
//! {"pong": true}
//! {"error": "<CODE>", "message": "..."}
//! ```

pub mod error;
pub mod parser;
pub mod request;
pub mod response;

pub use error::{ProtocolError, ProtocolResult};
pub use parser::Parser;
pub use request::{AuthPayload, CollectionChanges, Frame, MethodCall, PollRequest, SubscriptionRequest};
pub use response::{ChangeResults, MethodReturn, PollResponse, Response, SubResult};
