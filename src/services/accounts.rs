use super::ServiceError;
use crate::repository::Repository;

/// Gives `username` admin rights.
///
/// Fails with [`ServiceError::NoSuchUser`] when no such user exists in `authority`.
pub async fn make_admin(
    repo: &dyn Repository,
    username: &str,
    authority: &str,
) -> Result<(), ServiceError> {
    let user = repo
        .get_user_by_username(username, authority)
        .await?
        .ok_or_else(|| ServiceError::NoSuchUser(username.to_string()))?;
    repo.set_admin(user.id, true).await?;
    tracing::info!("made {} an admin", user.userid());
    Ok(())
}

/// Makes `username` a staff member.
pub async fn make_staff(
    repo: &dyn Repository,
    username: &str,
    authority: &str,
) -> Result<(), ServiceError> {
    let user = repo
        .get_user_by_username(username, authority)
        .await?
        .ok_or_else(|| ServiceError::NoSuchUser(username.to_string()))?;
    repo.set_staff(user.id, true).await?;
    tracing::info!("made {} a staff member", user.userid());
    Ok(())
}
