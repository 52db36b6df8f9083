mod common;

use apptx::application::dispatcher::EffectDispatcher;
use apptx::application::destruction::DestructionEngine;
use apptx::application::editor::fold_transactions;
use apptx::application::profile::EditorProfile;
use apptx::application::project::membership::MembershipIndexer;
use apptx::config::ProjectsConfig;
use apptx::domain::edge::{EdgeSpec, EdgeType};
use apptx::domain::effect::Effect;
use apptx::domain::policy::{Actor, Capability};
use apptx::domain::ports::StoreRead;
use apptx::domain::project::ProjectStatus;
use apptx::domain::transaction::{TransactionDraft, TransactionType};
use apptx::domain::value::Value;
use apptx::error::EditError;
use apptx::infrastructure::sinks::{InMemorySearchIndex, RecordingFeedSink, RecordingMailSink};
use common::{Harness, add_members, admin, draft, phid, remove_members, user};
use std::collections::BTreeSet;
use std::sync::Arc;

fn set(names: &[&str]) -> BTreeSet<apptx::domain::phid::Phid> {
    names.iter().map(|name| phid(name)).collect()
}

fn slugs(tags: &[&str]) -> Value {
    Value::List(tags.iter().map(ToString::to_string).collect())
}

fn watch(names: &[&str]) -> TransactionDraft {
    TransactionDraft::edge(
        EdgeType::ObjectWatcher,
        EdgeSpec::adding(names.iter().map(|name| phid(name))),
    )
}

fn unwatch(names: &[&str]) -> TransactionDraft {
    TransactionDraft::edge(
        EdgeType::ObjectWatcher,
        EdgeSpec::removing(names.iter().map(|name| phid(name))),
    )
}

#[tokio::test]
async fn test_create_project_persists_history_and_hashtag() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h
        .create_project(
            &alice,
            vec![draft("project.name", "  Apollo Program "), add_members(&["alice"])],
        )
        .await;

    let history = h.store.transactions(&project.phid).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history.iter().map(|x| x.sequence).collect::<Vec<_>>(),
        vec![1u64, 2]
    );
    assert!(history.iter().all(|x| x.author_phid == phid("alice")));

    let loaded = h.load_project(&project.phid).await;
    assert_eq!(loaded.name, "Apollo Program");
    assert_eq!(loaded.primary_slug.as_deref(), Some("apollo_program"));
    assert!(loaded.is_member(&phid("alice")).unwrap());
    assert_eq!(
        h.store.key_owner("project.slug", "apollo_program").await.unwrap(),
        Some(project.phid.clone())
    );
    assert_eq!(
        h.edges(&phid("alice"), EdgeType::MemberOfProject).await,
        BTreeSet::from([project.phid.clone()])
    );
}

#[tokio::test]
async fn test_project_requires_a_name() {
    let h = Harness::new();
    let editor = h.project_editor(&user("alice"));
    let err = editor
        .apply_transactions(editor.initialize(), vec![draft("project.color", "red")])
        .await
        .unwrap_err();
    let errors = err.validation_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].transaction_type.tag(), "project.name");
    assert!(errors[0].is_missing_field);
}

#[tokio::test]
async fn test_unchanged_value_is_dropped_or_rejected_in_strict_mode() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h.named_project(&alice, "Apollo").await;

    let outcome = h
        .edit_project(&alice, &project.phid, vec![draft("project.name", "Apollo")])
        .await
        .unwrap();
    assert!(outcome.is_noop());
    assert!(outcome.effects.is_empty());

    let editor = h.project_editor(&alice).continue_on_no_effect(false);
    let object = editor.load(&project.phid).await.unwrap().unwrap();
    let err = editor
        .apply_transactions(object, vec![draft("project.name", "Apollo")])
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::NoEffect(ref dropped) if dropped.len() == 1));
    assert_eq!(h.store.transactions(&project.phid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unchanged_value_with_comment_becomes_comment() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h.named_project(&alice, "Apollo").await;

    let outcome = h
        .edit_project(
            &alice,
            &project.phid,
            vec![draft("project.name", "Apollo").with_comment("Keeping the name.")],
        )
        .await
        .unwrap();
    assert_eq!(outcome.transactions.len(), 1);
    assert_eq!(outcome.transactions[0].r#type, TransactionType::Comment);
    assert_eq!(
        outcome.transactions[0].comment.as_ref().unwrap().content(),
        "Keeping the name."
    );
}

#[tokio::test]
async fn test_validation_failure_commits_nothing() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h.named_project(&alice, "Apollo").await;

    let err = h
        .edit_project(
            &alice,
            &project.phid,
            vec![draft("project.name", "Zeus"), draft("project.color", "plaid")],
        )
        .await
        .unwrap_err();
    assert_eq!(err.validation_errors().len(), 1);
    assert_eq!(err.validation_errors()[0].transaction_type.tag(), "project.color");

    let loaded = h.load_project(&project.phid).await;
    assert_eq!(loaded.name, "Apollo");
    assert_eq!(h.store.transactions(&project.phid).await.unwrap().len(), 1);
    assert_eq!(h.store.key_owner("project.name", "zeus").await.unwrap(), None);
}

#[tokio::test]
async fn test_edit_needs_edit_capability() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h
        .create_project(
            &alice,
            vec![
                draft("project.name", "Apollo"),
                draft("core.edit-policy", "PHID-USER-alice"),
            ],
        )
        .await;

    let err = h
        .edit_project(&user("bob"), &project.phid, vec![draft("project.name", "Mine")])
        .await
        .unwrap_err();
    match err {
        EditError::Authorization(auth) => {
            assert_eq!(auth.actor, phid("bob"));
            assert_eq!(auth.capability, Capability::Edit);
        }
        other => panic!("expected authorization error, got {other}"),
    }
    assert_eq!(h.load_project(&project.phid).await.name, "Apollo");
}

#[tokio::test]
async fn test_edit_policy_cannot_lock_out_the_editor() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h.named_project(&alice, "Apollo").await;
    let err = h
        .edit_project(&alice, &project.phid, vec![draft("core.edit-policy", "no-one")])
        .await
        .unwrap_err();
    assert_eq!(
        err.validation_errors()[0].transaction_type,
        TransactionType::EditPolicy
    );
}

#[tokio::test]
async fn test_join_needs_join_policy_and_is_idempotent() {
    let h = Harness::new();
    let alice = user("alice");
    let bob = user("bob");
    let closed = h
        .create_project(
            &alice,
            vec![draft("project.name", "Closed"), draft("core.join-policy", "admin")],
        )
        .await;
    let err = h
        .edit_project(&bob, &closed.phid, vec![add_members(&["bob"])])
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::Authorization(ref auth) if auth.capability == Capability::Join));

    // An editor can still add them.
    h.edit_project(&alice, &closed.phid, vec![add_members(&["bob"])])
        .await
        .unwrap();
    assert!(h.load_project(&closed.phid).await.is_member(&phid("bob")).unwrap());

    let open = h.named_project(&alice, "Open").await;
    let first = h
        .edit_project(&bob, &open.phid, vec![add_members(&["bob"])])
        .await
        .unwrap();
    assert_eq!(first.transactions.len(), 1);
    let again = h
        .edit_project(&bob, &open.phid, vec![add_members(&["bob"])])
        .await
        .unwrap();
    assert!(again.is_noop());
    assert_eq!(h.store.transactions(&open.phid).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_locked_membership() {
    let h = Harness::new();
    let alice = admin("alice");
    let bob = user("bob");
    let project = h
        .create_project(
            &alice,
            vec![
                draft("project.name", "Apollo"),
                draft("core.edit-policy", "PHID-USER-alice"),
                add_members(&["alice", "bob"]),
                draft("project.locked", true),
            ],
        )
        .await;

    let err = h
        .edit_project(&bob, &project.phid, vec![remove_members(&["bob"])])
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::Authorization(ref auth) if auth.capability == Capability::Edit));

    // Only holders of the application capability may toggle the lock.
    let open = h.named_project(&bob, "Bob's").await;
    let err = h
        .edit_project(&bob, &open.phid, vec![draft("project.locked", true)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EditError::Authorization(ref auth) if auth.capability == Capability::LockProjects
    ));

    h.edit_project(&alice, &project.phid, vec![draft("project.locked", false)])
        .await
        .unwrap();
    h.edit_project(&bob, &project.phid, vec![remove_members(&["bob"])])
        .await
        .unwrap();
    assert!(!h.load_project(&project.phid).await.is_member(&phid("bob")).unwrap());
}

#[tokio::test]
async fn test_create_members_only_project_as_member() {
    let h = Harness::new();
    let alice = user("alice");
    let bob = user("bob");
    let team = h
        .create_project(
            &alice,
            vec![
                draft("project.name", "Team"),
                add_members(&["alice"]),
                draft("core.edit-policy", "members"),
            ],
        )
        .await;

    h.edit_project(&alice, &team.phid, vec![draft("project.name", "Team Two")])
        .await
        .unwrap();
    let err = h
        .edit_project(&bob, &team.phid, vec![draft("project.name", "Bob's Team")])
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::Authorization(ref auth) if auth.capability == Capability::Edit));

    // Without the membership the same policy would lock alice out.
    let editor = h.project_editor(&alice);
    let err = editor
        .apply_transactions(
            editor.initialize(),
            vec![draft("project.name", "Solo"), draft("core.edit-policy", "members")],
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.validation_errors()[0].transaction_type,
        TransactionType::EditPolicy
    );
}

#[tokio::test]
async fn test_lock_holder_locks_without_edit() {
    let h = Harness::new();
    let bob = user("bob");
    let carol = admin("carol");
    let project = h
        .create_project(
            &bob,
            vec![draft("project.name", "Private"), draft("core.edit-policy", "PHID-USER-bob")],
        )
        .await;

    h.edit_project(&carol, &project.phid, vec![draft("project.locked", true)])
        .await
        .unwrap();
    assert!(h.load_project(&project.phid).await.is_membership_locked);

    let err = h
        .edit_project(&carol, &project.phid, vec![draft("project.name", "Carol's")])
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::Authorization(ref auth) if auth.capability == Capability::Edit));
}

#[tokio::test]
async fn test_removing_member_drops_watch_and_subscription() {
    let h = Harness::new();
    let alice = user("alice");
    let bob = user("bob");
    let project = h
        .create_project(
            &alice,
            vec![draft("project.name", "Apollo"), add_members(&["alice", "bob"])],
        )
        .await;
    h.edit_project(&bob, &project.phid, vec![watch(&["bob"])])
        .await
        .unwrap();
    assert_eq!(h.edges(&project.phid, EdgeType::ObjectWatcher).await, set(&["bob"]));
    assert_eq!(
        h.edges(&project.phid, EdgeType::ObjectSubscriber).await,
        set(&["alice", "bob"])
    );

    h.edit_project(&alice, &project.phid, vec![remove_members(&["bob"])])
        .await
        .unwrap();
    assert!(h.edges(&project.phid, EdgeType::ObjectWatcher).await.is_empty());
    assert_eq!(
        h.edges(&project.phid, EdgeType::ObjectSubscriber).await,
        set(&["alice"])
    );
    assert!(h.edges(&phid("bob"), EdgeType::WatcherForObject).await.is_empty());
    assert!(h.edges(&phid("bob"), EdgeType::MemberOfProject).await.is_empty());
}

#[tokio::test]
async fn test_unwatching_keeps_membership() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h
        .create_project(
            &alice,
            vec![draft("project.name", "Apollo"), add_members(&["alice"])],
        )
        .await;
    h.edit_project(&alice, &project.phid, vec![watch(&["alice"])])
        .await
        .unwrap();
    let outcome = h
        .edit_project(&alice, &project.phid, vec![unwatch(&["alice"])])
        .await
        .unwrap();
    assert_eq!(outcome.transactions.len(), 1);
    assert!(h.edges(&project.phid, EdgeType::ObjectWatcher).await.is_empty());
    assert_eq!(h.edges(&project.phid, EdgeType::ProjectMember).await, set(&["alice"]));
}

#[tokio::test]
async fn test_hashtag_collisions() {
    let h = Harness::new();
    let alice = user("alice");
    let apollo = h.named_project(&alice, "Apollo").await;

    // Different name, same generated hashtag.
    let editor = h.project_editor(&alice);
    let err = editor
        .apply_transactions(editor.initialize(), vec![draft("project.name", "apollo#")])
        .await
        .unwrap_err();
    let errors = err.validation_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Duplicate");

    let gemini = h.named_project(&alice, "Gemini").await;
    let err = h
        .edit_project(
            &alice,
            &gemini.phid,
            vec![draft("project.slugs", slugs(&["#Apollo"]))],
        )
        .await
        .unwrap_err();
    assert_eq!(err.validation_errors()[0].title, "Duplicate");

    h.edit_project(
        &alice,
        &gemini.phid,
        vec![draft("project.slugs", slugs(&["Twins", "twins", "Space Race"]))],
    )
    .await
    .unwrap();
    let loaded = h.load_project(&gemini.phid).await;
    let secondary: BTreeSet<String> = loaded.secondary_slugs().unwrap().into_iter().collect();
    assert_eq!(
        secondary,
        BTreeSet::from(["space_race".to_string(), "twins".to_string()])
    );
    assert_eq!(
        h.store.key_owner("project.slug", "twins").await.unwrap(),
        Some(gemini.phid.clone())
    );
    assert_eq!(
        h.store.key_owner("project.slug", "apollo").await.unwrap(),
        Some(apollo.phid)
    );
}

#[tokio::test]
async fn test_repeated_field_is_coalesced() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h.named_project(&alice, "Apollo").await;

    let outcome = h
        .edit_project(
            &alice,
            &project.phid,
            vec![draft("project.name", "Artemis"), draft("project.name", "Gemini")],
        )
        .await
        .unwrap();
    assert_eq!(outcome.transactions.len(), 1);
    assert_eq!(outcome.transactions[0].old_value.as_text(), Some("Apollo"));
    assert_eq!(outcome.transactions[0].new_value.as_text(), Some("Gemini"));

    // The old hashtag stays with the project; the old name is free again.
    assert_eq!(
        h.store.key_owner("project.slug", "apollo").await.unwrap(),
        Some(project.phid.clone())
    );
    assert_eq!(h.store.key_owner("project.name", "apollo").await.unwrap(), None);
    assert_eq!(
        h.store.key_owner("project.name", "gemini").await.unwrap(),
        Some(project.phid.clone())
    );
    assert_eq!(h.store.key_owner("project.slug", "artemis").await.unwrap(), None);
}

#[tokio::test]
async fn test_rename_with_hashtags_matches_stored_state() {
    let h = Harness::new();
    let alice = user("alice");
    let alpha = h.named_project(&alice, "Alpha").await;
    let gamma = h.named_project(&alice, "Gamma").await;

    let renamed = h
        .edit_project(
            &alice,
            &alpha.phid,
            vec![draft("project.name", "Beta"), draft("project.slugs", slugs(&["x"]))],
        )
        .await
        .unwrap();
    // Same edit, hashtags submitted first.
    let reordered = h
        .edit_project(
            &alice,
            &gamma.phid,
            vec![draft("project.slugs", slugs(&["y"])), draft("project.name", "Delta")],
        )
        .await
        .unwrap();

    assert_eq!(
        renamed.object.slugs.get(),
        Some(&vec!["beta".to_string(), "alpha".to_string(), "x".to_string()])
    );
    assert_eq!(
        reordered.object.slugs.get(),
        Some(&vec!["delta".to_string(), "gamma".to_string(), "y".to_string()])
    );
    for outcome in [&renamed, &reordered] {
        let reloaded = h.load_project(&outcome.object.phid).await;
        assert_eq!(outcome.object.slugs.get(), reloaded.slugs.get());
    }
    assert_eq!(h.search.search("alpha").await, vec![alpha.phid.clone()]);
}

#[tokio::test]
async fn test_edge_operations_compose() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h
        .create_project(
            &alice,
            vec![
                draft("project.name", "Apollo"),
                add_members(&["alice", "bob"]),
                remove_members(&["bob"]),
                add_members(&["carol"]),
            ],
        )
        .await;
    assert_eq!(
        h.edges(&project.phid, EdgeType::ProjectMember).await,
        set(&["alice", "carol"])
    );
    let member_xactions = h
        .store
        .transactions(&project.phid)
        .await
        .unwrap()
        .into_iter()
        .filter(|x| x.r#type == TransactionType::Edge(EdgeType::ProjectMember))
        .count();
    assert_eq!(member_xactions, 1);
}

#[tokio::test]
async fn test_history_folds_back_to_stored_state() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h
        .create_project(
            &alice,
            vec![draft("project.name", "Apollo"), add_members(&["alice"])],
        )
        .await;
    h.edit_project(
        &alice,
        &project.phid,
        vec![draft("project.color", "red"), draft("project.status", "archived")],
    )
    .await
    .unwrap();
    h.edit_project(
        &alice,
        &project.phid,
        vec![draft("project.name", "Artemis"), add_members(&["bob"])],
    )
    .await
    .unwrap();

    let stored = h.load_project(&project.phid).await;
    let history = h.store.transactions(&project.phid).await.unwrap();
    let folded = fold_transactions(h.projects.as_ref(), h.projects.initialize(&alice), &history)
        .unwrap();
    assert_eq!(folded.name, stored.name);
    assert_eq!(folded.color, stored.color);
    assert_eq!(folded.status, ProjectStatus::Archived);
    assert_eq!(folded.status, stored.status);
    assert_eq!(folded.edit_policy, stored.edit_policy);
    assert_eq!(folded.members.get(), stored.members.get());
}

#[tokio::test]
async fn test_hide_transaction() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h.named_project(&alice, "Apollo").await;
    let xaction = h.store.transactions(&project.phid).await.unwrap()[0].phid.clone();

    let editor = h.project_editor(&alice);
    editor.hide_transaction(&project, &xaction, true).await.unwrap();
    assert!(h.store.transactions(&project.phid).await.unwrap()[0].hidden);

    let stranger = h.named_project(&alice, "Gemini").await;
    let err = editor
        .hide_transaction(&stranger, &xaction, true)
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::InvalidTransaction(_)));
}

#[tokio::test]
async fn test_destroy_removes_everything() {
    let h = Harness::new();
    let alice = user("alice");
    let project = h
        .create_project(
            &alice,
            vec![
                draft("project.name", "Apollo"),
                add_members(&["alice"]),
                draft("project.slugs", slugs(&["moon"])),
            ],
        )
        .await;

    let engine = DestructionEngine::new(h.store.clone());
    assert!(engine.destroy(&project.phid).await.unwrap());
    assert!(!engine.destroy(&project.phid).await.unwrap());

    assert!(h.store.object(&project.phid).await.unwrap().is_none());
    assert!(h.store.transactions(&project.phid).await.unwrap().is_empty());
    assert!(h.store.keys_owned_by(&project.phid).await.unwrap().is_empty());
    assert!(h.edges(&phid("alice"), EdgeType::MemberOfProject).await.is_empty());
    assert!(h.edges(&phid("alice"), EdgeType::SubscribedToObject).await.is_empty());

    // Name and hashtags are free again.
    h.create_project(
        &alice,
        vec![
            draft("project.name", "Apollo"),
            draft("project.slugs", slugs(&["moon"])),
        ],
    )
    .await;
}

#[tokio::test]
async fn test_effects_describe_mail_feed_and_search() {
    let h = Harness::new();
    let alice = user("alice");
    let editor = h.project_editor(&alice);
    let outcome = editor
        .apply_transactions(
            editor.initialize(),
            vec![draft("project.name", "Apollo"), add_members(&["alice", "bob"])],
        )
        .await
        .unwrap();
    let names: Vec<&str> = outcome.effects.iter().map(Effect::name).collect();
    assert!(names.contains(&"rematerialize"));
    assert!(names.contains(&"mail"));
    assert!(names.contains(&"feed"));
    assert_eq!(names.last(), Some(&"reindex"));

    let report = h.dispatcher().dispatch(&outcome.effects).await;
    assert!(report.is_clean());

    let messages = h.mail.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].subject.starts_with("[Project]"));
    assert!(messages[0].subject.ends_with("Apollo"));
    assert!(messages[0].is_first_message);
    assert_eq!(messages[0].to, vec![phid("alice"), phid("bob")]);
    assert!(messages[0].body.contains("project/view/"));

    assert_eq!(h.feed.stories().await.len(), 1);
    assert_eq!(h.search.search("APOLLO").await, vec![outcome.object.phid.clone()]);
}

#[tokio::test]
async fn test_effect_failures_do_not_undo_the_edit() {
    let h = Harness::new();
    let alice = user("alice");
    let editor = h.project_editor(&alice);
    let outcome = editor
        .apply_transactions(editor.initialize(), vec![draft("project.name", "Apollo")])
        .await
        .unwrap();

    let dispatcher = EffectDispatcher::new(
        Arc::new(RecordingMailSink::failing()),
        Arc::new(RecordingFeedSink::failing()),
        Arc::new(InMemorySearchIndex::new()),
        Arc::new(MembershipIndexer::new(h.store.clone())),
    );
    let report = dispatcher.dispatch(&outcome.effects).await;
    let failed: Vec<&str> = report.failures.iter().map(|(name, _)| *name).collect();
    assert_eq!(failed, vec!["mail", "feed"]);
    assert!(report.delivered.contains(&"reindex"));
    assert!(h.store.object(&outcome.object.phid).await.unwrap().is_some());
}

#[tokio::test]
async fn test_subproject_depth_limit() {
    let h = Harness::with_projects_config(ProjectsConfig {
        depth_limit: 2,
        ..ProjectsConfig::default()
    });
    let alice = user("alice");
    let root = h.named_project(&alice, "Root").await;
    let child = h
        .create_project(
            &alice,
            vec![
                draft("project.name", "Child"),
                draft("project.parent", root.phid.to_string()),
            ],
        )
        .await;
    assert_eq!(child.project_depth, 1);
    assert!(child.project_path.starts_with(&root.project_path));
    assert_eq!(
        h.edges(&root.phid, EdgeType::ProjectChild).await,
        BTreeSet::from([child.phid.clone()])
    );

    let editor = h.project_editor(&alice);
    let err = editor
        .apply_transactions(
            editor.initialize(),
            vec![
                draft("project.name", "Grandchild"),
                draft("project.parent", child.phid.to_string()),
            ],
        )
        .await
        .unwrap_err();
    assert!(
        err.validation_errors()[0]
            .message
            .contains("maximum nesting depth of projects is 2")
    );
}

#[tokio::test]
async fn test_parent_only_at_creation() {
    let h = Harness::new();
    let alice = user("alice");
    let root = h.named_project(&alice, "Root").await;
    let other = h.named_project(&alice, "Other").await;
    let err = h
        .edit_project(
            &alice,
            &other.phid,
            vec![draft("project.parent", root.phid.to_string())],
        )
        .await
        .unwrap_err();
    assert_eq!(err.validation_errors()[0].transaction_type.tag(), "project.parent");
}

#[tokio::test]
async fn test_concurrent_milestones_get_distinct_numbers() {
    let h = Harness::new();
    let alice = user("alice");
    let parent = h.named_project(&alice, "Apollo").await;

    let milestone = || {
        let editor = h.project_editor(&alice);
        let drafts = vec![
            draft("project.parent", parent.phid.to_string()),
            draft("project.milestone", true),
        ];
        async move { editor.apply_transactions(editor.initialize(), drafts).await }
    };
    let (first, second) = tokio::join!(milestone(), milestone());
    let numbers: BTreeSet<u32> = [first.unwrap(), second.unwrap()]
        .iter()
        .map(|outcome| outcome.object.milestone_number.unwrap())
        .collect();
    assert_eq!(numbers, BTreeSet::from([1, 2]));
    assert_eq!(
        h.store.max_scoped_number("project.milestone", parent.phid.as_str()).await.unwrap(),
        Some(2)
    );

    let third = milestone().await.unwrap();
    assert_eq!(third.object.milestone_number, Some(3));
    assert_eq!(third.object.name, "");
}

#[tokio::test]
async fn test_milestones_cannot_have_members() {
    let h = Harness::new();
    let alice = user("alice");
    let parent = h.named_project(&alice, "Apollo").await;
    let editor = h.project_editor(&alice);
    let err = editor
        .apply_transactions(
            editor.initialize(),
            vec![
                draft("project.parent", parent.phid.to_string()),
                draft("project.milestone", true),
                add_members(&["bob"]),
            ],
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.validation_errors()[0].transaction_type,
        TransactionType::Edge(EdgeType::ProjectMember)
    );
}

#[tokio::test]
async fn test_materialized_members_follow_subprojects() {
    let h = Harness::new();
    let alice = user("alice");
    let root = h
        .create_project(
            &alice,
            vec![draft("project.name", "Root"), add_members(&["alice"])],
        )
        .await;
    assert_eq!(
        h.edges(&root.phid, EdgeType::ProjectMaterializedMember).await,
        set(&["alice"])
    );

    let sub = h
        .create_project(
            &alice,
            vec![
                draft("project.name", "Sub"),
                draft("project.parent", root.phid.to_string()),
                add_members(&["bob"]),
            ],
        )
        .await;
    assert_eq!(
        h.edges(&sub.phid, EdgeType::ProjectMaterializedMember).await,
        set(&["bob"])
    );
    assert_eq!(
        h.edges(&root.phid, EdgeType::ProjectMaterializedMember).await,
        set(&["bob"])
    );

    let milestone = h
        .create_project(
            &alice,
            vec![
                draft("project.parent", root.phid.to_string()),
                draft("project.milestone", true),
            ],
        )
        .await;
    assert_eq!(
        h.edges(&milestone.phid, EdgeType::ProjectMaterializedMember).await,
        set(&["bob"])
    );
}

#[tokio::test]
async fn test_draft_posts_stay_quiet_until_published() {
    let h = Harness::new();
    let blogger = user("blogger");
    let editor = h.post_editor(&blogger);
    let created = editor
        .apply_transactions(
            editor.initialize(),
            vec![draft("post.title", "Launch Day"), draft("post.body", "T-minus ten.")],
        )
        .await
        .unwrap();
    assert!(created.object.is_draft());
    assert!(
        created
            .effects
            .iter()
            .all(|effect| matches!(effect, Effect::Reindex(_)))
    );

    let published = editor
        .apply_transactions(created.object, vec![draft("post.visibility", "published")])
        .await
        .unwrap();
    assert!(published.object.date_published.is_some());
    h.dispatcher().dispatch(&published.effects).await;
    let messages = h.mail.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].subject.starts_with("[Phame]"));
    assert_eq!(messages[0].to, vec![phid("blogger")]);

    let unpublished = editor
        .apply_transactions(published.object, vec![draft("post.visibility", "draft")])
        .await
        .unwrap();
    assert!(unpublished.object.date_published.is_none());
}

#[tokio::test]
async fn test_only_the_blogger_edits_a_post() {
    let h = Harness::new();
    let blogger = user("blogger");
    let editor = h.post_editor(&blogger);
    let post = editor
        .apply_transactions(editor.initialize(), vec![draft("post.title", "Launch Day")])
        .await
        .unwrap()
        .object;

    let err = h
        .post_editor(&user("mallory"))
        .apply_transactions(post.clone(), vec![draft("post.title", "Mine now")])
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::Authorization(_)));

    let outcome = h
        .post_editor(&Actor::omnipotent())
        .apply_transactions(post, vec![draft("post.title", "Launch Day (updated)")])
        .await
        .unwrap();
    assert_eq!(outcome.object.title, "Launch Day (updated)");
}

#[tokio::test]
async fn test_post_requires_title() {
    let h = Harness::new();
    let editor = h.post_editor(&user("blogger"));
    let err = editor
        .apply_transactions(editor.initialize(), vec![draft("post.body", "No title")])
        .await
        .unwrap_err();
    assert_eq!(err.validation_errors()[0].transaction_type.tag(), "post.title");
}
