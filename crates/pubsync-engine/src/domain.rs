//! Credit-domain registrations installed at startup

use crate::access::{Operation, Rule, ACCESS_DENIED};
use crate::context::USERS_COLLECTION;
use crate::credits::{RedeemCreditCode, RedemptionMode, CREDIT_CODES_COLLECTION};
use crate::policy::{IdentityScoped, OpenRead, OwnRecord, PrivilegeScoped, RecentWindow};
use crate::registry::RegistryBuilder;
use pubsync_core::{Projection, Result, UPDATED_AT_FIELD};
use std::time::Duration;

/// User fields that are never published
pub const SENSITIVE_USER_FIELDS: [&str; 2] = ["services", "password"];

/// User fields visible to administrators browsing other accounts
pub const ADMIN_USER_PROJECTION: [&str; 5] = ["emails", "displayName", "credits", "admin", UPDATED_AT_FIELD];

/// Single user field a regular caller may patch
pub const SELF_EDITABLE_USER_FIELD: &str = "dob";

/// Tunables for the built-in registrations
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSettings {
    pub recent_horizon: Duration,
    pub recent_limit: usize,
    pub redemption: RedemptionMode,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            recent_horizon: Duration::from_secs(48 * 3600),
            recent_limit: 500,
            redemption: RedemptionMode::default(),
        }
    }
}

/// Register the credit-domain publications, methods and access rules
pub fn install(builder: RegistryBuilder, settings: &DomainSettings) -> Result<RegistryBuilder> {
    let recent = |field: &str| RecentWindow::new(field, settings.recent_horizon, settings.recent_limit);

    Ok(builder
        .publish("accounts", OpenRead::new("accounts"))?
        .publish("orders", IdentityScoped::new("orders", "userId"))?
        .publish("statsDaily", OpenRead::new("statsDaily"))?
        .publish("csends", OpenRead::new("csends").recent(recent("date")))?
        .publish("bananaRequests", OpenRead::new("bananaRequests").recent(recent("createdAt")))?
        .publish("user", OwnRecord::new(USERS_COLLECTION, SENSITIVE_USER_FIELDS))?
        .publish("allCreditCodes", PrivilegeScoped::new(CREDIT_CODES_COLLECTION))?
        .publish(
            "usersAndCredits",
            PrivilegeScoped::new(USERS_COLLECTION)
                .exclude_self()
                .project(Projection::include(ADMIN_USER_PROJECTION))
                .strip(SENSITIVE_USER_FIELDS),
        )?
        .method("redeemCreditCode", RedeemCreditCode::new(settings.redemption))?
        .allow_privileged(USERS_COLLECTION)
        .allow(USERS_COLLECTION, Operation::Update, Rule::single_field_patch(SELF_EDITABLE_USER_FIELD))
        .allow(USERS_COLLECTION, Operation::Update, Rule::deny(ACCESS_DENIED))
        .allow_privileged(CREDIT_CODES_COLLECTION))
}
