//! Data models
//!
//! Row types mapped from the Postgres schema (see `migrations/`) and the
//! request/response shapes built on top of them.

pub mod annotation;
pub mod feature;
pub mod group;
pub mod subscription;
pub mod user;

pub use annotation::Annotation;
pub use feature::{FEATURES, Feature, FeatureUpdate, feature_names, is_known_feature};
pub use group::{Group, GroupChanges, GroupType, InvalidGroupType, NewGroup, WORLD_GROUP_PUBID};
pub use subscription::{Subscription, SubscriptionType, UnknownSubscriptionType};
pub use user::{User, split_user, userid_from_username};
