use super::ServiceError;
use crate::{
    models::{Subscription, SubscriptionType},
    repository::Repository,
};

/// Every subscription of `uri`, one per type, in `SubscriptionType::ALL` order.
///
/// Missing types are created active. Lookups ignore the case of `uri`, so
/// `acct:Bob@example.com` and `acct:bob@example.com` share their rows.
pub async fn get_all(repo: &dyn Repository, uri: &str) -> Result<Vec<Subscription>, ServiceError> {
    let existing = repo.subscriptions_for_uri(uri).await?;

    let mut subscriptions = Vec::with_capacity(SubscriptionType::ALL.len());
    for subscription_type in SubscriptionType::ALL {
        let found = existing
            .iter()
            .find(|s| s.subscription_type == subscription_type)
            .cloned();
        let subscription = match found {
            Some(subscription) => subscription,
            None => repo.create_subscription(uri, subscription_type, true).await?,
        };
        subscriptions.push(subscription);
    }
    Ok(subscriptions)
}

/// Turns one subscription type of `uri` on or off.
pub async fn set_active(
    repo: &dyn Repository,
    uri: &str,
    subscription_type: SubscriptionType,
    active: bool,
) -> Result<Subscription, ServiceError> {
    let current = get_all(repo, uri).await?;
    let Some(subscription) = current
        .into_iter()
        .find(|s| s.subscription_type == subscription_type)
    else {
        return repo
            .create_subscription(uri, subscription_type, active)
            .await
            .map_err(ServiceError::from);
    };
    if subscription.active == active {
        return Ok(subscription);
    }
    match repo.set_subscription_active(subscription.id, active).await? {
        Some(updated) => Ok(updated),
        None => {
            tracing::debug!("subscription {} vanished, recreating it", subscription.id);
            Ok(repo.create_subscription(uri, subscription_type, active).await?)
        }
    }
}
