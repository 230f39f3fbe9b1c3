//! MongoDB Index Initialization
//!
//! Uniqueness constraints and lookup indexes, created at startup.

use mongodb::{bson::doc, options::IndexOptions, Database, IndexModel};
use tracing::info;

pub async fn initialize_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    info!("Initializing MongoDB indexes...");

    create_user_indexes(db).await?;
    create_client_indexes(db).await?;
    create_resource_indexes(db).await?;
    create_grant_indexes(db).await?;

    info!("MongoDB indexes initialized successfully");
    Ok(())
}

fn unique() -> IndexOptions {
    IndexOptions::builder().unique(true).build()
}

async fn create_user_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let users = db.collection::<mongodb::bson::Document>("users");
    users
        .create_index(
            IndexModel::builder()
                .keys(doc! { "username": 1 })
                .options(unique())
                .build(),
        )
        .await?;

    let logins = db.collection::<mongodb::bson::Document>("external_logins");
    logins
        .create_index(
            IndexModel::builder()
                .keys(doc! { "provider": 1, "subject": 1 })
                .options(unique())
                .build(),
        )
        .await?;
    logins
        .create_index(IndexModel::builder().keys(doc! { "userId": 1 }).build())
        .await?;
    Ok(())
}

async fn create_client_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    db.collection::<mongodb::bson::Document>("clients")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "clientId": 1 })
                .options(unique())
                .build(),
        )
        .await?;
    Ok(())
}

async fn create_resource_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    db.collection::<mongodb::bson::Document>("api_resources")
        .create_index(IndexModel::builder().keys(doc! { "scopes": 1 }).build())
        .await?;
    Ok(())
}

async fn create_grant_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let grants = db.collection::<mongodb::bson::Document>("grants");

    // Cleanup sweep
    grants
        .create_index(IndexModel::builder().keys(doc! { "expiresAt": 1 }).build())
        .await?;

    // Lineage revocation
    grants
        .create_index(IndexModel::builder().keys(doc! { "lineage": 1 }).build())
        .await?;

    grants
        .create_index(IndexModel::builder().keys(doc! { "subject": 1, "clientId": 1 }).build())
        .await?;
    Ok(())
}
