//! pubsync Engine
//!
//! The reconciliation core of pubsync:
//! - Access control: deny-by-default rule chains gating every client mutation
//! - Publications: named subscriptions that return only what changed
//! - Methods: named procedures returning tagged success/error results
//!
//! All registrations live in a [`Registry`] built once at startup and shared
//! read-only with request handlers.

pub mod access;
pub mod context;
pub mod credits;
pub mod domain;
pub mod method;
pub mod mutation;
pub mod policy;
pub mod publication;
pub mod registry;

#[cfg(test)]
mod testing;

pub use access::{AccessControl, AccessRule, Decision, EvaluatorContext, Operation, ProposedChange, Rule, RuleOutcome};
pub use context::{Auth, Credentials, IdentityResolver, RequestContext, SessionResolver};
pub use credits::{CreditCode, RedeemCreditCode, RedemptionMode};
pub use domain::DomainSettings;
pub use method::{Method, MethodEngine};
pub use mutation::{evaluator_context, ChangeOutcome};
pub use policy::{IdentityScoped, OpenRead, OwnRecord, PrivilegeScoped, RecentWindow};
pub use publication::{Options, Publication, PublicationEngine, PublicationOutcome};
pub use registry::{Registry, RegistryBuilder};
