//! Startup seeding of admins, sessions and credit codes

use crate::config::Config;
use anyhow::Result;
use pubsync_core::{Document, Filter, Update, ID_FIELD};
use pubsync_engine::context::{ADMIN_FIELD, SESSIONS_COLLECTION, USERS_COLLECTION};
use pubsync_engine::credits::{CreditCode, CREDIT_CODES_COLLECTION};
use pubsync_storage::Store;
use serde_json::json;
use tracing::{debug, info};

/// Apply the seed data from `config`. Running it twice changes nothing.
pub async fn seed(store: &dyn Store, config: &Config) -> Result<()> {
    for admin in &config.access.admins {
        let filter = Filter::new().eq(ID_FIELD, admin.as_str());
        if store.find_one(USERS_COLLECTION, &filter).await?.is_some() {
            store
                .update_one(USERS_COLLECTION, &filter, &Update::new().set(ADMIN_FIELD, true))
                .await?;
        } else {
            let user = Document::from_value(json!({ ID_FIELD: admin, ADMIN_FIELD: true }))?;
            store.insert(USERS_COLLECTION, user).await?;
        }
        info!(user = %admin, "Seeded admin");
    }

    for (sid, user) in &config.access.sessions {
        let filter = Filter::new().eq(ID_FIELD, sid.as_str());
        if store.find_one(SESSIONS_COLLECTION, &filter).await?.is_some() {
            debug!(user = %user, "Session already present");
            continue;
        }
        let session = Document::from_value(json!({ ID_FIELD: sid, "userId": user }))?;
        store.insert(SESSIONS_COLLECTION, session).await?;
        debug!(user = %user, "Seeded session");
    }

    for code in &config.methods.credit_codes {
        let filter = Filter::new().eq("name", code.name.as_str());
        if store.find_one(CREDIT_CODES_COLLECTION, &filter).await?.is_some() {
            debug!(code = %code.name, "Credit code already present");
            continue;
        }
        let doc = CreditCode::new(code.name.as_str(), code.credits, code.total).to_document()?;
        store.insert(CREDIT_CODES_COLLECTION, doc).await?;
        info!(code = %code.name, credits = code.credits, total = code.total, "Seeded credit code");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsync_core::FindOptions;
    use pubsync_storage::MemoryStore;

    fn config() -> Config {
        Config::parse(
            r#"
            [[methods.credit_codes]]
            name = "WELCOME10"
            credits = 10
            total = 5

            [access]
            admins = ["root", "existing"]

            [access.sessions]
            dev = "root"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = MemoryStore::new();
        store
            .insert(
                USERS_COLLECTION,
                Document::from_value(json!({"_id": "existing", "displayName": "E"})).unwrap(),
            )
            .await
            .unwrap();

        seed(&store, &config()).await.unwrap();
        seed(&store, &config()).await.unwrap();

        let users = store
            .find(USERS_COLLECTION, &Filter::new().eq(ADMIN_FIELD, true), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(users.len(), 2);

        let existing = users.iter().find(|u| u.get("_id") == Some(&json!("existing"))).unwrap();
        assert_eq!(existing.get("displayName"), Some(&json!("E")));

        let codes = store
            .find(CREDIT_CODES_COLLECTION, &Filter::new(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(CreditCode::from_document(&codes[0]).unwrap(), CreditCode::new("WELCOME10", 10, 5));

        let session = store
            .find_one(SESSIONS_COLLECTION, &Filter::new().eq("_id", "dev"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.get("userId"), Some(&json!("root")));
    }
}
