mod common;

use uuid::Uuid;

use messup_api::ApiError;
use messup_api::notifications::{get_all, get_unread, mark_read, notify};
use messup_types::models::NotificationType;

use common::{test_state, user};

#[tokio::test]
async fn unread_and_all_are_newest_first() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");

    let first = notify(&state, alice.user_id, NotificationType::Other, "first", None, None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = notify(&state, alice.user_id, NotificationType::Other, "second", None, None)
        .await
        .unwrap();

    let unread = get_unread(&state, alice.user_id).await.unwrap();
    assert_eq!(
        unread.iter().map(|n| n.id).collect::<Vec<_>>(),
        [second.id, first.id]
    );

    mark_read(&state, &alice, second.id).await.unwrap();
    // Already read stays read
    mark_read(&state, &alice, second.id).await.unwrap();

    let unread = get_unread(&state, alice.user_id).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, first.id);

    let all = get_all(&state, alice.user_id).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].is_read);
    assert!(!all[1].is_read);
}

#[tokio::test]
async fn marking_missing_or_foreign_notification_is_not_found() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let bob = user(&state, "bob");

    let err = mark_read(&state, &alice, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let for_bob = notify(&state, bob.user_id, NotificationType::Other, "psst", None, None)
        .await
        .unwrap();
    let err = mark_read(&state, &alice, for_bob.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(get_unread(&state, bob.user_id).await.unwrap().len(), 1);
}
