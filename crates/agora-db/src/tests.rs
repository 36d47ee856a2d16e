//! Storage tests against an in-memory database.

use agora_types::api::{GroupUpdate, UserUpdate};
use agora_types::models::FriendRequestStatus;
use rusqlite::Connection;

use crate::{Database, chat, friends, groups, is_unique_violation, posts, users};

fn db() -> Database {
    Database::open_in_memory().expect("in-memory database")
}

fn user(conn: &Connection, name: &str) -> i64 {
    users::insert(conn, name, &format!("{name}@example.com"), "hash")
        .unwrap()
        .id
}

fn befriend(conn: &Connection, a: i64, b: i64) {
    let req = friends::insert_request(conn, a, b).unwrap();
    friends::resolve(conn, req.id, FriendRequestStatus::Approved)
        .unwrap()
        .unwrap();
}

// ─── Unit of work ────────────────────────────────────────────────────────────

#[test]
fn unit_of_work_commits_on_ok() {
    let db = db();
    db.unit_of_work(|conn| users::insert(conn, "alice", "alice@example.com", "h"))
        .unwrap();
    let found = db
        .unit_of_work(|conn| users::by_username(conn, "alice"))
        .unwrap();
    assert!(found.is_some());
}

#[test]
fn unit_of_work_rolls_back_on_err() {
    let db = db();
    let result: anyhow::Result<()> = db.unit_of_work(|conn| {
        users::insert(conn, "alice", "alice@example.com", "h")?;
        anyhow::bail!("abort after insert")
    });
    assert!(result.is_err());

    let found = db
        .unit_of_work(|conn| users::by_username(conn, "alice"))
        .unwrap();
    assert!(found.is_none(), "insert must not survive a failed unit of work");
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[test]
fn duplicate_username_is_a_unique_violation() {
    let db = db();
    db.unit_of_work(|conn| {
        users::insert(conn, "alice", "a@example.com", "h")?;
        let err = users::insert(conn, "alice", "other@example.com", "h").unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(users::email_taken(conn, "a@example.com")?);
        assert!(!users::email_taken(conn, "nobody@example.com")?);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn non_constraint_errors_are_not_unique_violations() {
    let err = anyhow::anyhow!("plain failure");
    assert!(!is_unique_violation(&err));
}

#[test]
fn profile_update_only_touches_present_fields() {
    let db = db();
    db.unit_of_work(|conn| {
        let id = user(conn, "alice");
        users::update_profile(
            conn,
            id,
            &UserUpdate {
                display_name: Some("Alice".into()),
                bio: Some("hello".into()),
                avatar_url: None,
            },
        )?;
        let updated = users::update_profile(
            conn,
            id,
            &UserUpdate {
                bio: Some("changed".into()),
                ..Default::default()
            },
        )?
        .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Alice"));
        assert_eq!(updated.bio.as_deref(), Some("changed"));
        assert_eq!(updated.avatar_url, None);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn deactivation_flips_the_active_flag() {
    let db = db();
    db.unit_of_work(|conn| {
        let id = user(conn, "alice");
        assert!(users::set_active(conn, id, false)?);
        assert!(!users::by_id(conn, id)?.unwrap().is_active);
        assert!(!users::set_active(conn, 999, false)?);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

// ─── Friend requests ─────────────────────────────────────────────────────────

#[test]
fn second_pending_request_for_same_pair_is_rejected_by_schema() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        friends::insert_request(conn, a, b)?;
        let err = friends::insert_request(conn, a, b).unwrap_err();
        assert!(is_unique_violation(&err));
        // The reverse direction is a different ordered pair.
        friends::insert_request(conn, b, a)?;
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn denied_request_does_not_block_a_new_one() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        let req = friends::insert_request(conn, a, b)?;
        friends::resolve(conn, req.id, FriendRequestStatus::Denied)?.unwrap();
        friends::insert_request(conn, a, b)?;
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn resolve_only_moves_pending_requests() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        let req = friends::insert_request(conn, a, b)?;
        let approved = friends::resolve(conn, req.id, FriendRequestStatus::Approved)?.unwrap();
        assert_eq!(approved.status, FriendRequestStatus::Approved);
        assert!(approved.responded_at.is_some());
        assert!(friends::resolve(conn, req.id, FriendRequestStatus::Denied)?.is_none());
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn approved_edge_is_symmetric() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        let c = user(conn, "c");
        befriend(conn, a, b);

        assert!(friends::are_friends(conn, a, b)?);
        assert!(friends::are_friends(conn, b, a)?);
        assert!(!friends::are_friends(conn, a, c)?);

        let of_a: Vec<_> = friends::friends_of(conn, a)?.into_iter().map(|u| u.id).collect();
        let of_b: Vec<_> = friends::friends_of(conn, b)?.into_iter().map(|u| u.id).collect();
        assert_eq!(of_a, vec![b]);
        assert_eq!(of_b, vec![a]);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn incoming_lists_only_pending_requests_to_the_user() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        let c = user(conn, "c");
        friends::insert_request(conn, a, b)?;
        let handled = friends::insert_request(conn, c, b)?;
        friends::resolve(conn, handled.id, FriendRequestStatus::Denied)?;
        friends::insert_request(conn, b, c)?;

        let incoming = friends::incoming_pending(conn, b)?;
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_user_id, a);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

// ─── Posts ───────────────────────────────────────────────────────────────────

#[test]
fn feed_contains_self_and_friends_newest_first() {
    let db = db();
    db.unit_of_work(|conn| {
        let me = user(conn, "me");
        let f1 = user(conn, "f1");
        let f2 = user(conn, "f2");
        let stranger = user(conn, "stranger");
        befriend(conn, me, f1);
        befriend(conn, f2, me);
        // Pending only: not a friend yet.
        friends::insert_request(conn, stranger, me)?;

        posts::insert(conn, f1, "one")?;
        posts::insert(conn, stranger, "hidden")?;
        posts::insert(conn, me, "two")?;
        posts::insert(conn, f2, "three")?;

        let feed = posts::feed(conn, me)?;
        let contents: Vec<_> = feed.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "two", "one"]);
        assert!(feed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn wall_and_delete() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        let first = posts::insert(conn, a, "first")?;
        posts::insert(conn, a, "second")?;
        posts::insert(conn, b, "other")?;

        let wall: Vec<_> = posts::by_user(conn, a)?.into_iter().map(|p| p.content).collect();
        assert_eq!(wall, vec!["second", "first"]);

        assert!(posts::delete(conn, first.id)?);
        assert!(!posts::delete(conn, first.id)?);
        assert_eq!(posts::all(conn)?.len(), 2);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

// ─── Groups ──────────────────────────────────────────────────────────────────

#[test]
fn membership_is_unique_per_group_and_user() {
    let db = db();
    db.unit_of_work(|conn| {
        let owner = user(conn, "owner");
        let g = groups::insert_group(conn, "rustaceans", None, owner)?;
        groups::insert_membership(conn, g.id, owner, true)?;
        let err = groups::insert_membership(conn, g.id, owner, false).unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(groups::is_admin(conn, g.id, owner)?);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn concurrent_units_of_work_never_duplicate_memberships() {
    let db = db();
    let group_id = db
        .unit_of_work(|conn| {
            let owner = user(conn, "owner");
            user(conn, "joiner");
            Ok::<_, anyhow::Error>(groups::insert_group(conn, "g", None, owner)?.id)
        })
        .unwrap();
    let joiner = 2;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            std::thread::spawn(move || {
                db.unit_of_work(|conn| {
                    match groups::insert_membership(conn, group_id, joiner, false) {
                        Ok(_) => Ok(true),
                        Err(e) if is_unique_violation(&e) => Ok(false),
                        Err(e) => Err(e),
                    }
                })
            })
        })
        .collect();
    let inserted = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .filter(|inserted| *inserted)
        .count();
    assert_eq!(inserted, 1);

    let members = db.unit_of_work(|conn| groups::members(conn, group_id)).unwrap();
    assert_eq!(members.len(), 1);
}

#[test]
fn members_join_usernames_in_join_order() {
    let db = db();
    db.unit_of_work(|conn| {
        let owner = user(conn, "owner");
        let other = user(conn, "other");
        let g = groups::insert_group(conn, "g", Some("desc"), owner)?;
        groups::insert_membership(conn, g.id, owner, true)?;
        groups::insert_membership(conn, g.id, other, false)?;

        let members = groups::members(conn, g.id)?;
        let names: Vec<_> = members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["owner", "other"]);
        assert!(members[0].is_admin);
        assert!(!members[1].is_admin);

        assert!(groups::delete_membership(conn, g.id, other)?);
        assert!(!groups::delete_membership(conn, g.id, other)?);
        assert!(!groups::is_member(conn, g.id, other)?);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn group_update_is_partial() {
    let db = db();
    db.unit_of_work(|conn| {
        let owner = user(conn, "owner");
        let g = groups::insert_group(conn, "g", Some("before"), owner)?;
        let updated = groups::update(
            conn,
            g.id,
            &GroupUpdate {
                name: Some("renamed".into()),
                description: None,
            },
        )?
        .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.description.as_deref(), Some("before"));
        assert!(groups::name_taken(conn, "renamed")?);
        assert!(!groups::name_taken(conn, "g")?);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn group_posts_are_newest_first() {
    let db = db();
    db.unit_of_work(|conn| {
        let owner = user(conn, "owner");
        let g = groups::insert_group(conn, "g", None, owner)?;
        groups::insert_post(conn, g.id, owner, "older")?;
        groups::insert_post(conn, g.id, owner, "newer")?;
        let contents: Vec<_> = groups::posts(conn, g.id)?.into_iter().map(|p| p.content).collect();
        assert_eq!(contents, vec!["newer", "older"]);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

// ─── Chat ────────────────────────────────────────────────────────────────────

#[test]
fn conversation_lookup_ignores_participant_order() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        let created = chat::get_or_create_conversation(conn, b, a)?;
        assert_eq!((created.user1_id, created.user2_id), (a, b));

        let again = chat::get_or_create_conversation(conn, a, b)?;
        assert_eq!(again.id, created.id);
        assert_eq!(chat::conversation_between(conn, b, a)?.unwrap().id, created.id);
        assert_eq!(chat::conversations_for(conn, b)?.len(), 1);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn messages_keep_append_order() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        let convo = chat::get_or_create_conversation(conn, a, b)?;
        chat::insert_message(conn, convo.id, a, "first")?;
        chat::insert_message(conn, convo.id, b, "second")?;
        let contents: Vec<_> = chat::messages(conn, convo.id)?.into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["first", "second"]);
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}

#[test]
fn deleting_a_user_cascades_to_owned_rows() {
    let db = db();
    db.unit_of_work(|conn| {
        let a = user(conn, "a");
        let b = user(conn, "b");
        befriend(conn, a, b);
        posts::insert(conn, a, "bye")?;
        let g = groups::insert_group(conn, "g", None, a)?;
        groups::insert_membership(conn, g.id, a, true)?;
        let convo = chat::get_or_create_conversation(conn, a, b)?;
        chat::insert_message(conn, convo.id, a, "hi")?;

        conn.execute("DELETE FROM users WHERE id = ?1", [a])?;

        assert!(posts::all(conn)?.is_empty());
        assert!(groups::by_id(conn, g.id)?.is_none());
        assert!(!friends::are_friends(conn, a, b)?);
        assert!(chat::conversation_by_id(conn, convo.id)?.is_none());
        Ok::<_, anyhow::Error>(())
    })
    .unwrap();
}
