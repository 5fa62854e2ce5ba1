use std::sync::Arc;

use super::ServiceError;
use crate::{
    repository::RepositoryState,
    search::{BatchIndexer, SearchState, TransformSubscribers},
};

/// NipsaService
///
/// Maintains the NIPSA list. Flag changes reindex the user's annotations so
/// the `nipsa` marker in the search index follows the flag.
pub struct NipsaService {
    repo: RepositoryState,
    search: SearchState,
    transforms: Arc<TransformSubscribers>,
}

impl NipsaService {
    pub fn new(
        repo: RepositoryState,
        search: SearchState,
        transforms: Arc<TransformSubscribers>,
    ) -> Self {
        Self {
            repo,
            search,
            transforms,
        }
    }

    /// Fully qualified ids of every NIPSA'd user.
    pub async fn index(&self) -> Result<Vec<String>, ServiceError> {
        let users = self.repo.nipsa_users().await?;
        Ok(users.iter().map(|user| user.userid()).collect())
    }

    pub async fn add_nipsa(&self, userid: &str) -> Result<(), ServiceError> {
        self.set_nipsa(userid, true).await
    }

    pub async fn remove_nipsa(&self, userid: &str) -> Result<(), ServiceError> {
        self.set_nipsa(userid, false).await
    }

    async fn set_nipsa(&self, userid: &str, nipsa: bool) -> Result<(), ServiceError> {
        let user = self
            .repo
            .get_user_by_userid(userid)
            .await?
            .ok_or_else(|| ServiceError::NoSuchUser(userid.to_string()))?;
        self.repo.set_nipsa(user.id, nipsa).await?;

        // Annotations carry the stored spelling of the user id.
        let userid = user.userid();
        tracing::info!("set nipsa={} for {}", nipsa, userid);

        let ids = self.repo.annotation_ids_for_user(&userid).await?;
        if ids.is_empty() {
            return Ok(());
        }

        let errored = BatchIndexer::new(
            self.repo.clone(),
            self.search.clone(),
            self.transforms.clone(),
        )
        .index(Some(ids))
        .await?;
        if !errored.is_empty() {
            tracing::warn!(
                "{} annotations of {} failed to reindex after nipsa change",
                errored.len(),
                userid
            );
        }
        Ok(())
    }
}
