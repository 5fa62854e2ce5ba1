use annotation_server::{
    AppConfig, AppState, InMemoryRepository, InMemorySearchIndex, RepositoryState, SearchState,
    TransformSubscribers,
    error::ApiError,
    handlers::admin::{
        self, AdminForm, Flash, ReindexForm, admins_add, admins_index, admins_remove,
        features_index, features_update, nipsa_add, nipsa_index, nipsa_remove, reindex, staff_add,
        staff_remove, sync_annotation,
    },
    models::{Annotation, Feature, FeatureUpdate, User},
    search::OpType,
};
use axum::{
    Form,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect},
};
use serde_json::Value;
use std::sync::Arc;
use tokio::test;

// --- Fixtures ---

struct TestApp {
    repo: Arc<InMemoryRepository>,
    search: Arc<InMemorySearchIndex>,
    state: AppState,
}

fn setup() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let search = Arc::new(InMemorySearchIndex::default());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        search: search.clone() as SearchState,
        transforms: Arc::new(TransformSubscribers::default()),
        config: AppConfig::default(),
    };
    TestApp {
        repo,
        search,
        state,
    }
}

impl TestApp {
    fn user(&self, username: &str) -> User {
        self.repo.add_user(User {
            username: username.into(),
            authority: self.state.config.auth_domain.clone(),
            ..User::default()
        })
    }

    fn admin(&self, username: &str) -> User {
        self.repo.add_user(User {
            username: username.into(),
            authority: self.state.config.auth_domain.clone(),
            admin: true,
            ..User::default()
        })
    }

    fn state(&self) -> State<AppState> {
        State(self.state.clone())
    }
}

fn add(username: &str) -> Form<AdminForm> {
    Form(AdminForm {
        add: Some(username.into()),
        remove: None,
    })
}

fn remove(username: &str) -> Form<AdminForm> {
    Form(AdminForm {
        add: None,
        remove: Some(username.into()),
    })
}

fn assert_redirects_to(redirect: Redirect, location: &str) {
    let response = redirect.into_response();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], location);
}

// --- Index ---

#[test]
async fn test_index_lists_the_console_sections() {
    let sections = admin::index().await.0.sections;

    assert_eq!(sections, vec!["nipsa", "admins", "staff", "features", "search"]);
}

// --- Admins ---

#[test]
async fn test_admins_add_promotes_the_user() {
    let app = setup();
    app.admin("root");
    let user = app.user("alice");

    let view = admins_add(app.state(), add("alice")).await.unwrap().0;

    assert_eq!(view.admin_users, vec!["alice", "root"]);
    assert!(view.flash.is_empty());
    assert!(app.repo.user(user.id).unwrap().admin);
}

#[test]
async fn test_admins_add_flashes_unknown_user() {
    let app = setup();
    app.admin("root");

    let view = admins_add(app.state(), add("nobody")).await.unwrap().0;

    assert_eq!(view.admin_users, vec!["root"]);
    assert_eq!(
        view.flash,
        vec![Flash {
            kind: "error".into(),
            message: "User nobody doesn't exist.".into()
        }]
    );
}

#[test]
async fn test_admins_add_without_param_is_not_found() {
    let app = setup();

    let result = admins_add(app.state(), Form(AdminForm::default())).await;

    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[test]
async fn test_admins_remove_demotes_when_several_admins_exist() {
    let app = setup();
    let alice = app.admin("alice");
    let root = app.admin("root");

    let redirect = admins_remove(app.state(), remove("alice")).await.unwrap();

    assert_redirects_to(redirect, "/admin/admins");
    assert!(!app.repo.user(alice.id).unwrap().admin);
    assert!(app.repo.user(root.id).unwrap().admin);
}

#[test]
async fn test_admins_remove_never_removes_the_last_admin() {
    let app = setup();
    let root = app.admin("root");

    let redirect = admins_remove(app.state(), remove("root")).await.unwrap();

    assert_redirects_to(redirect, "/admin/admins");
    assert!(app.repo.user(root.id).unwrap().admin);
}

#[test]
async fn test_concurrent_admin_removals_keep_one_admin() {
    let app = setup();
    let alice = app.admin("alice");
    let root = app.admin("root");

    let (first, second) = tokio::join!(
        admins_remove(app.state(), remove("alice")),
        admins_remove(app.state(), remove("root")),
    );

    assert_redirects_to(first.unwrap(), "/admin/admins");
    assert_redirects_to(second.unwrap(), "/admin/admins");
    let remaining = [alice.id, root.id]
        .iter()
        .filter(|id| app.repo.user(**id).unwrap().admin)
        .count();
    assert_eq!(remaining, 1);
}

#[test]
async fn test_admins_remove_ignores_non_admins() {
    let app = setup();
    app.admin("alice");
    app.admin("root");
    let bob = app.user("bob");

    let redirect = admins_remove(app.state(), remove("bob")).await.unwrap();

    assert_redirects_to(redirect, "/admin/admins");
    assert!(!app.repo.user(bob.id).unwrap().admin);
    assert_eq!(admins_index(app.state()).await.unwrap().0.admin_users.len(), 2);
}

#[test]
async fn test_admins_remove_without_param_is_not_found() {
    let app = setup();
    app.admin("alice");
    app.admin("root");

    let result = admins_remove(app.state(), Form(AdminForm::default())).await;

    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

// --- Staff ---

#[test]
async fn test_staff_add_and_remove() {
    let app = setup();
    let user = app.user("alice");

    let view = staff_add(app.state(), add("alice")).await.unwrap().0;
    assert_eq!(view.staff, vec!["alice"]);

    let redirect = staff_remove(app.state(), remove("alice")).await.unwrap();
    assert_redirects_to(redirect, "/admin/staff");
    assert!(!app.repo.user(user.id).unwrap().staff);
}

#[test]
async fn test_staff_add_flashes_unknown_user() {
    let app = setup();

    let view = staff_add(app.state(), add("nobody")).await.unwrap().0;

    assert!(view.staff.is_empty());
    assert_eq!(view.flash.len(), 1);
}

#[test]
async fn test_staff_remove_unknown_user_still_redirects() {
    let app = setup();

    let redirect = staff_remove(app.state(), remove("nobody")).await.unwrap();

    assert_redirects_to(redirect, "/admin/staff");
}

// --- NIPSA ---

#[test]
async fn test_nipsa_add_flags_the_user_and_reindexes_their_annotations() {
    let app = setup();
    let troll = app.user("troll");
    let annotation = app.repo.add_annotation(Annotation {
        userid: troll.userid(),
        ..Annotation::default()
    });

    let view = nipsa_add(app.state(), add("troll")).await.unwrap().0;

    assert_eq!(view.usernames, vec!["troll"]);
    assert!(app.repo.user(troll.id).unwrap().nipsa);
    let document = app.search.document(&annotation.id).unwrap();
    assert_eq!(document.get("nipsa"), Some(&Value::Bool(true)));
}

#[test]
async fn test_nipsa_add_without_annotations_skips_indexing() {
    let app = setup();
    app.user("quiet");

    let view = nipsa_add(app.state(), add("quiet")).await.unwrap().0;

    assert_eq!(view.usernames, vec!["quiet"]);
    assert!(app.search.bulk_requests().is_empty());
}

#[test]
async fn test_nipsa_add_matches_the_username_case_insensitively() {
    let app = setup();
    let bob = app.user("bob");
    let annotation = app.repo.add_annotation(Annotation {
        userid: bob.userid(),
        ..Annotation::default()
    });

    let view = nipsa_add(app.state(), add("Bob")).await.unwrap().0;

    assert!(view.flash.is_empty());
    assert_eq!(view.usernames, vec!["bob"]);
    assert_eq!(app.search.bulk_requests().len(), 1);
    let document = app.search.document(&annotation.id).unwrap();
    assert_eq!(document.get("nipsa"), Some(&Value::Bool(true)));
}

#[test]
async fn test_nipsa_add_flashes_unknown_user() {
    let app = setup();

    let view = nipsa_add(app.state(), add("nobody")).await.unwrap().0;

    assert!(view.usernames.is_empty());
    assert_eq!(
        view.flash[0].message,
        "User nobody doesn't exist."
    );
}

#[test]
async fn test_nipsa_remove_clears_the_flag_and_reindexes() {
    let app = setup();
    let troll = app.user("troll");
    let annotation = app.repo.add_annotation(Annotation {
        userid: troll.userid(),
        ..Annotation::default()
    });
    let flagged = nipsa_add(app.state(), add("troll")).await.unwrap().0;
    assert_eq!(flagged.usernames, vec!["troll"]);

    let redirect = nipsa_remove(app.state(), remove("troll")).await.unwrap();

    assert_redirects_to(redirect, "/admin/nipsa");
    assert!(!app.repo.user(troll.id).unwrap().nipsa);
    assert!(nipsa_index(app.state()).await.unwrap().0.usernames.is_empty());
    let document = app.search.document(&annotation.id).unwrap();
    assert!(!document.contains_key("nipsa"));
}

#[test]
async fn test_nipsa_remove_without_param_is_not_found() {
    let app = setup();

    let result = nipsa_remove(app.state(), Form(AdminForm::default())).await;

    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

// --- Features ---

#[test]
async fn test_features_update_toggles_a_known_feature() {
    let app = setup();
    Feature::seed(app.repo.as_ref()).await.unwrap();

    let features = features_update(
        app.state(),
        Form(FeatureUpdate {
            name: "at_mentions".into(),
            staff: Some(true),
            ..FeatureUpdate::default()
        }),
    )
    .await
    .unwrap()
    .0;

    let at_mentions = features.iter().find(|f| f.name == "at_mentions").unwrap();
    assert!(at_mentions.staff);
    assert!(!at_mentions.everyone);
    assert!(!at_mentions.description.is_empty());
}

#[test]
async fn test_features_update_unknown_feature_is_not_found() {
    let app = setup();
    Feature::seed(app.repo.as_ref()).await.unwrap();

    let result = features_update(
        app.state(),
        Form(FeatureUpdate {
            name: "notinfeatures".into(),
            everyone: Some(true),
            ..FeatureUpdate::default()
        }),
    )
    .await;

    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[test]
async fn test_features_index_only_shows_registered_features() {
    let app = setup();
    app.repo.add_feature("at_mentions");
    app.repo.add_feature("abouttoberemoved");

    let features = features_index(app.state()).await.unwrap().0;

    let names: Vec<&str> = features.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["at_mentions"]);
}

// --- Search ---

#[test]
async fn test_reindex_pushes_every_live_annotation() {
    let app = setup();
    let first = app.repo.add_annotation(Annotation::default());
    let second = app.repo.add_annotation(Annotation::default());
    let gone = app.repo.add_annotation(Annotation {
        deleted: true,
        ..Annotation::default()
    });

    let view = reindex(app.state(), Form(ReindexForm::default())).await.unwrap().0;

    assert_eq!(view.op_type, "index");
    assert!(view.errored.is_empty());
    assert_eq!(app.search.len(), 2);
    assert!(app.search.document(&first.id).is_some());
    assert!(app.search.document(&second.id).is_some());
    assert!(app.search.document(&gone.id).is_none());
}

#[test]
async fn test_reindex_with_create_leaves_indexed_documents_alone() {
    let app = setup();
    app.repo.add_annotation(Annotation::default());
    let form = || {
        Form(ReindexForm {
            op_type: Some(OpType::Create),
        })
    };

    let first = reindex(app.state(), form()).await.unwrap().0;
    let second = reindex(app.state(), form()).await.unwrap().0;

    assert_eq!(second.op_type, "create");
    assert!(first.errored.is_empty());
    assert!(second.errored.is_empty());
    let requests = app.search.bulk_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().flatten().all(|action| action.op_type == OpType::Create));
}

#[test]
async fn test_sync_annotation_reindexes_a_live_annotation() {
    let app = setup();
    let annotation = app.repo.add_annotation(Annotation {
        text: Some("hello".into()),
        ..Annotation::default()
    });

    let view = sync_annotation(app.state(), Path(annotation.id.clone()))
        .await
        .unwrap()
        .0;

    assert!(!view.deleted);
    let document = app.search.document(&annotation.id).unwrap();
    assert_eq!(document["text"], Value::String("hello".into()));
}

#[test]
async fn test_sync_annotation_marks_deleted_annotations() {
    let app = setup();
    let annotation = app.repo.add_annotation(Annotation {
        deleted: true,
        ..Annotation::default()
    });

    let view = sync_annotation(app.state(), Path(annotation.id.clone()))
        .await
        .unwrap()
        .0;

    assert!(view.deleted);
    let document = app.search.document(&annotation.id).unwrap();
    assert_eq!(document.get("deleted"), Some(&Value::Bool(true)));
}
