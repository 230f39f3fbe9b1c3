//! MongoDB user store.

use async_trait::async_trait;
use chrono::Utc;
use mongodb::{bson::doc, Collection, Database};

use super::entity::{ExternalLogin, User};
use super::repository::UserStore;
use crate::shared::store::StoreResult;

pub struct MongoUserStore {
    users: Collection<User>,
    logins: Collection<ExternalLogin>,
}

impl MongoUserStore {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection("users"),
            logins: db.collection("external_logins"),
        }
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.users.find_one(doc! { "username": username }).await?)
    }

    async fn insert(&self, user: &User) -> StoreResult<()> {
        self.users.insert_one(user).await?;
        Ok(())
    }

    async fn update(&self, user: &User) -> StoreResult<()> {
        let mut user = user.clone();
        user.updated_at = Utc::now();
        self.users.replace_one(doc! { "_id": &user.id }, &user).await?;
        Ok(())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> StoreResult<bool> {
        let now = bson::DateTime::from_chrono(Utc::now());
        let result = self
            .users
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "enabled": enabled, "updatedAt": now } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn advance_otp_step(&self, id: &str, step: i64) -> StoreResult<bool> {
        let result = self
            .users
            .update_one(
                doc! {
                    "_id": id,
                    "$or": [
                        { "lastOtpStep": { "$lt": step } },
                        { "lastOtpStep": null },
                    ],
                },
                doc! { "$set": { "lastOtpStep": step } },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn find_by_external_login(&self, provider: &str, subject: &str) -> StoreResult<Option<User>> {
        let login = self
            .logins
            .find_one(doc! { "provider": provider, "subject": subject })
            .await?;
        match login {
            Some(login) => self.find_by_id(&login.user_id).await,
            None => Ok(None),
        }
    }

    async fn link_external_login(&self, login: &ExternalLogin) -> StoreResult<()> {
        self.logins.insert_one(login).await?;
        Ok(())
    }
}
