use anyhow::Context;

use storefront_infra::{StorefrontConfig, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StorefrontConfig::from_env().context("invalid configuration")?;
    storefront_observability::init(config.log_format);

    let url = config.database.url()?;
    let pool = db::connect(url, &config.database)
        .await
        .context("failed to connect to the database")?;
    db::migrate(&pool).await.context("failed to apply schema")?;

    tracing::info!("storefront schema applied");
    Ok(())
}
