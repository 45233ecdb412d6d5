// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD and cursor paging operations.
//!
//! Paging compares `(created_at, id)` as a strict tuple, so a cursor is
//! stable under concurrent inserts: fixed-width RFC 3339 timestamps make
//! the TEXT comparison chronological, and the id breaks ties.

use rusqlite::{params, types::Type};

use hanashi_core::cursor::Cursor;
use hanashi_core::types::{Attachment, Message, MessageKind, PageDirection, Reaction};
use hanashi_core::HanashiError;

use crate::database::{map_tr_err, Database};

const MESSAGE_COLUMNS: &str =
    "id, room_id, sender_id, kind, content, attachments, reply_to, client_tag, created_at, edited_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
    let kind_str: String = row.get(3)?;
    let kind = kind_str
        .parse::<MessageKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let attachments_json: String = row.get(5)?;
    let attachments: Vec<Attachment> = serde_json::from_str(&attachments_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(Message {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender_id: row.get(2)?,
        kind,
        content: row.get(4)?,
        attachments,
        reply_to: row.get(6)?,
        reactions: Vec::new(),
        read_by: Vec::new(),
        created_at: row.get(8)?,
        edited_at: row.get(9)?,
        client_tag: row.get(7)?,
    })
}

/// Attach reactions and read receipts to each message in place.
fn load_decorations(
    conn: &rusqlite::Connection,
    messages: &mut [Message],
) -> Result<(), rusqlite::Error> {
    let mut react_stmt = conn.prepare(
        "SELECT user_id, emoji FROM message_reactions
         WHERE message_id = ?1 ORDER BY reacted_at, user_id",
    )?;
    let mut read_stmt = conn.prepare(
        "SELECT user_id FROM message_reads WHERE message_id = ?1 ORDER BY read_at, user_id",
    )?;

    for msg in messages.iter_mut() {
        let rows = react_stmt.query_map(params![msg.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut reactions: Vec<Reaction> = Vec::new();
        for row in rows {
            let (user_id, emoji) = row?;
            match reactions.iter_mut().find(|r| r.emoji == emoji) {
                Some(r) => r.user_ids.push(user_id),
                None => reactions.push(Reaction {
                    emoji,
                    user_ids: vec![user_id],
                }),
            }
        }
        msg.reactions = reactions;

        let readers = read_stmt.query_map(params![msg.id], |row| row.get(0))?;
        msg.read_by = readers.collect::<Result<Vec<String>, _>>()?;
    }
    Ok(())
}

/// Insert a new message and bump the room's activity timestamp atomically.
pub async fn insert_message(db: &Database, msg: &Message) -> Result<(), HanashiError> {
    let msg = msg.clone();
    let attachments_json =
        serde_json::to_string(&msg.attachments).map_err(HanashiError::storage)?;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages
                     (id, room_id, sender_id, kind, content, attachments,
                      reply_to, client_tag, created_at, edited_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    msg.id,
                    msg.room_id,
                    msg.sender_id,
                    msg.kind.to_string(),
                    msg.content,
                    attachments_json,
                    msg.reply_to,
                    msg.client_tag,
                    msg.created_at,
                    msg.edited_at,
                ],
            )?;
            tx.execute(
                "UPDATE rooms SET last_active_at = ?1 WHERE id = ?2",
                params![msg.created_at, msg.room_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a single message by id with reactions and read receipts.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, HanashiError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], row_to_message);
            match result {
                Ok(mut msg) => {
                    load_decorations(conn, std::slice::from_mut(&mut msg))?;
                    Ok(Some(msg))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// One page of room history in ascending order, plus whether more messages
/// exist beyond the page in the paged direction.
///
/// `Before` pages toward older history (no cursor means "the newest page"),
/// `After` toward newer (no cursor means "the oldest page"). Fetches one
/// row past `limit` to learn `has_more` without a second query.
pub async fn list_page(
    db: &Database,
    room_id: &str,
    cursor: Option<Cursor>,
    direction: PageDirection,
    limit: i64,
) -> Result<(Vec<Message>, bool), HanashiError> {
    let room_id = room_id.to_string();
    db.connection()
        .call(move |conn| {
            let overfetch = limit + 1;
            let mut messages = Vec::new();
            match (direction, &cursor) {
                (PageDirection::Before, Some(cur)) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages
                         WHERE room_id = ?1
                           AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
                         ORDER BY created_at DESC, id DESC LIMIT ?4"
                    ))?;
                    let rows = stmt.query_map(
                        params![room_id, cur.created_at, cur.id, overfetch],
                        row_to_message,
                    )?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                (PageDirection::Before, None) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages
                         WHERE room_id = ?1
                         ORDER BY created_at DESC, id DESC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![room_id, overfetch], row_to_message)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                (PageDirection::After, Some(cur)) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages
                         WHERE room_id = ?1
                           AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))
                         ORDER BY created_at ASC, id ASC LIMIT ?4"
                    ))?;
                    let rows = stmt.query_map(
                        params![room_id, cur.created_at, cur.id, overfetch],
                        row_to_message,
                    )?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                (PageDirection::After, None) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages
                         WHERE room_id = ?1
                         ORDER BY created_at ASC, id ASC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![room_id, overfetch], row_to_message)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
            }

            let has_more = messages.len() as i64 > limit;
            if has_more {
                // The extra row is the furthest in the paged direction.
                messages.truncate(limit as usize);
            }
            if direction == PageDirection::Before {
                messages.reverse();
            }
            load_decorations(conn, &mut messages)?;
            Ok((messages, has_more))
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite a message's content and set its edit timestamp.
/// Returns `false` if no such message exists.
pub async fn update_content(
    db: &Database,
    id: &str,
    content: &str,
    edited_at: &str,
) -> Result<bool, HanashiError> {
    let id = id.to_string();
    let content = content.to_string();
    let edited_at = edited_at.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE messages SET content = ?1, edited_at = ?2 WHERE id = ?3",
                params![content, edited_at, id],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Hard-delete a message. Reactions and read receipts cascade.
/// Returns `false` if no such message exists.
pub async fn delete_message(db: &Database, id: &str) -> Result<bool, HanashiError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Toggle one user's emoji reaction. Returns `true` if the reaction was
/// added, `false` if it was removed.
pub async fn toggle_reaction(
    db: &Database,
    message_id: &str,
    user_id: &str,
    emoji: &str,
    reacted_at: &str,
) -> Result<bool, HanashiError> {
    let message_id = message_id.to_string();
    let user_id = user_id.to_string();
    let emoji = emoji.to_string();
    let reacted_at = reacted_at.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM message_reactions
                 WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id, user_id, emoji],
            )?;
            let added = removed == 0;
            if added {
                tx.execute(
                    "INSERT INTO message_reactions (message_id, user_id, emoji, reacted_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![message_id, user_id, emoji, reacted_at],
                )?;
            }
            tx.commit()?;
            Ok(added)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark every message in the room up to and including the given position as
/// read by `user_id`. Returns how many messages were newly marked.
pub async fn mark_read(
    db: &Database,
    room_id: &str,
    user_id: &str,
    up_to_created_at: &str,
    up_to_id: &str,
    read_at: &str,
) -> Result<usize, HanashiError> {
    let room_id = room_id.to_string();
    let user_id = user_id.to_string();
    let up_to_created_at = up_to_created_at.to_string();
    let up_to_id = up_to_id.to_string();
    let read_at = read_at.to_string();
    db.connection()
        .call(move |conn| {
            let marked = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 SELECT m.id, ?2, ?3 FROM messages m
                 WHERE m.room_id = ?1
                   AND (m.created_at < ?4 OR (m.created_at = ?4 AND m.id <= ?5))",
                params![room_id, user_id, read_at, up_to_created_at, up_to_id],
            )?;
            Ok(marked)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::rooms::insert_room;
    use hanashi_core::types::{Participant, Role, Room};
    use tempfile::tempdir;

    async fn setup_db_with_room() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let room = Room {
            id: "r-1".to_string(),
            name: "general".to_string(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            last_active_at: "2026-01-01T00:00:00.000Z".to_string(),
            participants: vec![Participant {
                user_id: "alice".to_string(),
                role: Role::Admin,
                joined_at: "2026-01-01T00:00:00.000Z".to_string(),
            }],
        };
        insert_room(&db, &room).await.unwrap();
        (db, dir)
    }

    fn make_msg(id: &str, content: &str, timestamp: &str) -> Message {
        Message {
            id: id.to_string(),
            room_id: "r-1".to_string(),
            sender_id: "alice".to_string(),
            kind: MessageKind::Text,
            content: content.to_string(),
            attachments: Vec::new(),
            reply_to: None,
            reactions: Vec::new(),
            read_by: Vec::new(),
            created_at: timestamp.to_string(),
            edited_at: None,
            client_tag: None,
        }
    }

    #[tokio::test]
    async fn insert_and_page_in_order() {
        let (db, _dir) = setup_db_with_room().await;

        for i in 1..=3 {
            let msg = make_msg(
                &format!("m{i}"),
                &format!("msg {i}"),
                &format!("2026-01-01T00:00:0{i}.000Z"),
            );
            insert_message(&db, &msg).await.unwrap();
        }

        let (page, has_more) = list_page(&db, "r-1", None, PageDirection::Before, 10)
            .await
            .unwrap();
        assert!(!has_more);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].id, "m1");
        assert_eq!(page[2].id, "m3");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn before_cursor_returns_immediately_preceding() {
        let (db, _dir) = setup_db_with_room().await;

        for i in 1..=5 {
            let msg = make_msg(
                &format!("m{i}"),
                "x",
                &format!("2026-01-01T00:00:0{i}.000Z"),
            );
            insert_message(&db, &msg).await.unwrap();
        }

        let cursor = Cursor {
            created_at: "2026-01-01T00:00:04.000Z".to_string(),
            id: "m4".to_string(),
        };
        let (page, has_more) = list_page(&db, "r-1", Some(cursor), PageDirection::Before, 2)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "m2");
        assert_eq!(page[1].id, "m3");
        assert!(has_more, "m1 still lies beyond this page");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn after_cursor_returns_immediately_following() {
        let (db, _dir) = setup_db_with_room().await;

        for i in 1..=5 {
            let msg = make_msg(
                &format!("m{i}"),
                "x",
                &format!("2026-01-01T00:00:0{i}.000Z"),
            );
            insert_message(&db, &msg).await.unwrap();
        }

        let cursor = Cursor {
            created_at: "2026-01-01T00:00:02.000Z".to_string(),
            id: "m2".to_string(),
        };
        let (page, has_more) = list_page(&db, "r-1", Some(cursor), PageDirection::After, 2)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "m3");
        assert_eq!(page[1].id, "m4");
        assert!(has_more);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn identical_timestamps_break_ties_by_id() {
        let (db, _dir) = setup_db_with_room().await;

        let ts = "2026-01-01T00:00:01.000Z";
        for id in ["a", "b", "c"] {
            insert_message(&db, &make_msg(id, "x", ts)).await.unwrap();
        }

        let cursor = Cursor {
            created_at: ts.to_string(),
            id: "b".to_string(),
        };
        let (before, _) = list_page(&db, "r-1", Some(cursor.clone()), PageDirection::Before, 10)
            .await
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, "a");

        let (after, _) = list_page(&db, "r-1", Some(cursor), PageDirection::After, 10)
            .await
            .unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, "c");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn insert_bumps_room_activity() {
        let (db, _dir) = setup_db_with_room().await;

        let msg = make_msg("m1", "hi", "2026-01-02T09:30:00.000Z");
        insert_message(&db, &msg).await.unwrap();

        let last_active: String = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                let ts = conn.query_row(
                    "SELECT last_active_at FROM rooms WHERE id = 'r-1'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(ts)
            })
            .await
            .unwrap();
        assert_eq!(last_active, "2026-01-02T09:30:00.000Z");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn toggle_reaction_adds_then_removes() {
        let (db, _dir) = setup_db_with_room().await;
        let msg = make_msg("m1", "hi", "2026-01-01T00:00:01.000Z");
        insert_message(&db, &msg).await.unwrap();

        let added = toggle_reaction(&db, "m1", "alice", "👍", "2026-01-01T00:00:02.000Z")
            .await
            .unwrap();
        assert!(added);
        let loaded = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(loaded.reactions.len(), 1);
        assert_eq!(loaded.reactions[0].emoji, "👍");
        assert_eq!(loaded.reactions[0].user_ids, vec!["alice"]);

        let added = toggle_reaction(&db, "m1", "alice", "👍", "2026-01-01T00:00:03.000Z")
            .await
            .unwrap();
        assert!(!added);
        let loaded = get_message(&db, "m1").await.unwrap().unwrap();
        assert!(loaded.reactions.is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_read_counts_only_new_receipts() {
        let (db, _dir) = setup_db_with_room().await;
        for i in 1..=3 {
            let msg = make_msg(
                &format!("m{i}"),
                "x",
                &format!("2026-01-01T00:00:0{i}.000Z"),
            );
            insert_message(&db, &msg).await.unwrap();
        }

        let marked = mark_read(
            &db,
            "r-1",
            "bob",
            "2026-01-01T00:00:02.000Z",
            "m2",
            "2026-01-01T00:01:00.000Z",
        )
        .await
        .unwrap();
        assert_eq!(marked, 2);

        // Marking again up to m3 only adds the one unseen message.
        let marked = mark_read(
            &db,
            "r-1",
            "bob",
            "2026-01-01T00:00:03.000Z",
            "m3",
            "2026-01-01T00:02:00.000Z",
        )
        .await
        .unwrap();
        assert_eq!(marked, 1);

        let loaded = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(loaded.read_by, vec!["bob"]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_and_delete_report_row_presence() {
        let (db, _dir) = setup_db_with_room().await;
        let msg = make_msg("m1", "hi", "2026-01-01T00:00:01.000Z");
        insert_message(&db, &msg).await.unwrap();

        assert!(
            update_content(&db, "m1", "edited", "2026-01-01T00:00:05.000Z")
                .await
                .unwrap()
        );
        let loaded = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(loaded.content, "edited");
        assert_eq!(
            loaded.edited_at.as_deref(),
            Some("2026-01-01T00:00:05.000Z")
        );

        assert!(
            !update_content(&db, "missing", "x", "2026-01-01T00:00:05.000Z")
                .await
                .unwrap()
        );

        assert!(delete_message(&db, "m1").await.unwrap());
        assert!(!delete_message(&db, "m1").await.unwrap());
        assert!(get_message(&db, "m1").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn attachments_round_trip_through_json_column() {
        let (db, _dir) = setup_db_with_room().await;
        let mut msg = make_msg("m1", "see attached", "2026-01-01T00:00:01.000Z");
        msg.kind = MessageKind::Image;
        msg.attachments = vec![Attachment {
            url: "https://files.example/pic.png".to_string(),
            name: "pic.png".to_string(),
            size: Some(2048),
        }];
        insert_message(&db, &msg).await.unwrap();

        let loaded = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(loaded.kind, MessageKind::Image);
        assert_eq!(loaded.attachments.len(), 1);
        assert_eq!(loaded.attachments[0].name, "pic.png");
        assert_eq!(loaded.attachments[0].size, Some(2048));

        db.close().await.unwrap();
    }
}
