mod common;

use uuid::Uuid;

use messup_api::ApiError;
use messup_api::groups::{add_member, create_group, list_members};
use messup_api::messages::{
    fetch_group_history, fetch_history, mark_as_read, send_group_message, send_private_message,
};
use messup_types::api::SendPrivateMessageRequest;
use messup_types::events::GatewayEvent;
use messup_types::models::{MediaType, MessageStatus, NotificationType};

use common::{test_state, user};

fn text_to(receiver: &str, content: &str) -> SendPrivateMessageRequest {
    SendPrivateMessageRequest {
        receiver: receiver.into(),
        content: content.into(),
        media_ref: None,
        media_type: Some(MediaType::Text),
    }
}

#[tokio::test]
async fn private_message_round_trips_through_history() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let bob = user(&state, "bob");

    send_private_message(&state, &alice, text_to("bob", "hi")).await.unwrap();

    let history = fetch_history(&state, &alice, "bob").await.unwrap();
    assert_eq!(history.len(), 1);
    let m = &history[0];
    assert_eq!(m.content, "hi");
    assert_eq!(m.sender_id, alice.user_id);
    assert_eq!(m.receiver_id, bob.user_id);
    assert!(matches!(m.status, MessageStatus::Sent | MessageStatus::Delivered));

    // Same transcript from the other side
    assert_eq!(fetch_history(&state, &bob, "alice").await.unwrap(), history);
}

#[tokio::test]
async fn offline_receiver_keeps_sent_and_gets_notified() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let bob = user(&state, "bob");

    let message = send_private_message(&state, &alice, text_to("bob", "are you there?"))
        .await
        .unwrap();
    assert_eq!(message.status, MessageStatus::Sent);

    let notifications = state.db.get_notifications(bob.user_id, true).unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationType::Message);
    assert_eq!(notifications[0].reference_id, Some(message.id));
}

#[tokio::test]
async fn online_receiver_gets_push_and_message_becomes_delivered() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let bob = user(&state, "bob");
    let (_handle, mut bob_rx) = state.dispatcher.connect(bob.user_id).await;

    let message = send_private_message(&state, &alice, text_to("bob", "hello"))
        .await
        .unwrap();
    assert_eq!(message.status, MessageStatus::Delivered);

    match bob_rx.try_recv().unwrap() {
        GatewayEvent::PrivateMessage { message: pushed } => {
            assert_eq!(pushed.id, message.id);
            assert_eq!(pushed.content, "hello");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let stored = state.db.get_private_message(message.id).unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Delivered);
    assert!(state.db.get_notifications(bob.user_id, false).unwrap().is_empty());
}

#[tokio::test]
async fn read_mark_is_monotonic_and_sends_receipt() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let bob = user(&state, "bob");
    let (_handle, mut alice_rx) = state.dispatcher.connect(alice.user_id).await;

    let message = send_private_message(&state, &alice, text_to("bob", "read me"))
        .await
        .unwrap();

    // Only the receiver can mark it
    assert!(mark_as_read(&state, &alice, message.id).await.unwrap().is_none());
    assert!(alice_rx.try_recv().is_err());

    let read = mark_as_read(&state, &bob, message.id).await.unwrap().unwrap();
    assert_eq!(read.status, MessageStatus::Read);
    assert_eq!(
        alice_rx.try_recv().unwrap(),
        GatewayEvent::ReadReceipt {
            message_id: message.id,
            status: MessageStatus::Read,
        }
    );

    // Delivery bookkeeping after the fact never moves it back
    assert!(!state.db.mark_delivered(message.id).unwrap());
    mark_as_read(&state, &bob, message.id).await.unwrap();
    let stored = state.db.get_private_message(message.id).unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Read);
}

#[tokio::test]
async fn read_mark_on_unknown_message_is_a_no_op() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let (_handle, mut alice_rx) = state.dispatcher.connect(alice.user_id).await;

    let result = mark_as_read(&state, &alice, Uuid::new_v4()).await.unwrap();
    assert!(result.is_none());
    assert!(alice_rx.try_recv().is_err());
    assert!(fetch_history(&state, &alice, "alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_message_without_media_is_invalid() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    user(&state, "bob");

    let err = send_private_message(&state, &alice, text_to("bob", "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let with_media = SendPrivateMessageRequest {
        receiver: "bob".into(),
        content: String::new(),
        media_ref: Some("http://media.test/media/1".into()),
        media_type: Some(MediaType::Image),
    };
    let message = send_private_message(&state, &alice, with_media).await.unwrap();
    assert_eq!(message.media_type, MediaType::Image);

    let err = send_private_message(&state, &alice, text_to("nobody", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn non_member_cannot_post_and_member_post_reaches_subscribers() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let bob = user(&state, "bob");
    let carol = user(&state, "carol");

    let group = create_group(&state, &alice, "G", &["bob".to_string()])
        .await
        .unwrap();
    let before = state.db.get_group_messages(group.id).unwrap().len();

    let (bob_handle, mut bob_rx) = state.dispatcher.connect(bob.user_id).await;
    state.dispatcher.subscribe(group.id, &bob_handle).await;

    let err = send_group_message(&state, &carol, group.id, "hi").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
    assert_eq!(state.db.get_group_messages(group.id).unwrap().len(), before);
    assert!(bob_rx.try_recv().is_err());

    let posted = send_group_message(&state, &alice, group.id, "hi").await.unwrap();
    assert_eq!(state.db.get_group_messages(group.id).unwrap().len(), before + 1);
    assert_eq!(posted.sender_username.as_deref(), Some("alice"));

    match bob_rx.try_recv().unwrap() {
        GatewayEvent::GroupMessage { message } => assert_eq!(message, posted),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn group_creation_writes_system_message_and_invites() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let bob = user(&state, "bob");

    let group = create_group(
        &state,
        &alice,
        "  climbing  ",
        &["bob".to_string(), "bob".to_string(), "alice".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(group.name, "climbing");

    let members = list_members(&state, &alice, group.id).await.unwrap();
    assert_eq!(members.len(), 2);
    let admin = members.iter().find(|m| m.user_id == alice.user_id).unwrap();
    assert!(admin.is_admin);
    let plain = members.iter().find(|m| m.user_id == bob.user_id).unwrap();
    assert!(!plain.is_admin);

    let history = fetch_group_history(&state, &bob, group.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender_id, None);
    assert_eq!(history[0].content, "Group created by alice");

    let invites = state.db.get_notifications(bob.user_id, true).unwrap();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].kind, NotificationType::GroupInvitation);
    assert_eq!(invites[0].reference_id, Some(group.id));
    assert!(state.db.get_notifications(alice.user_id, false).unwrap().is_empty());
}

#[tokio::test]
async fn group_creation_validates_before_writing() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");

    let err = create_group(&state, &alice, "   ", &[]).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = create_group(&state, &alice, "G", &["ghost".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert!(state.db.get_groups_of_user(alice.user_id).unwrap().is_empty());
}

#[tokio::test]
async fn only_admins_add_members_and_only_once() {
    let (state, _media) = test_state();
    let alice = user(&state, "alice");
    let bob = user(&state, "bob");
    let carol = user(&state, "carol");

    let group = create_group(&state, &alice, "G", &["bob".to_string()])
        .await
        .unwrap();

    let err = add_member(&state, &bob, group.id, "carol").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));

    let member = add_member(&state, &alice, group.id, "carol").await.unwrap();
    assert_eq!(member.user_id, carol.user_id);
    assert!(!member.is_admin);

    let err = add_member(&state, &alice, group.id, "carol").await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let err = add_member(&state, &alice, Uuid::new_v4(), "carol").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    // Members only
    let outsider = user(&state, "dave");
    let err = fetch_group_history(&state, &outsider, group.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
}
