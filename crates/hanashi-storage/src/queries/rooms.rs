// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room and membership operations.
//!
//! Membership changes run in one transaction so the admin invariant and
//! delete-when-empty rule can never be observed half-applied.

use rusqlite::{params, types::Type};

use hanashi_core::types::{Participant, Role, Room};
use hanashi_core::HanashiError;

use crate::database::{map_tr_err, Database};

/// Result of removing a member from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Member removed; room unchanged otherwise.
    Left,
    /// Member removed and the now-empty room was deleted.
    LeftAndDeleted,
    /// Member removed; the named longest-standing member was promoted to
    /// admin to preserve the at-least-one-admin invariant.
    LeftAndPromoted(String),
    /// The user was not a member of the room.
    NotMember,
    /// No such room.
    RoomMissing,
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> Result<Participant, rusqlite::Error> {
    let role_str: String = row.get(1)?;
    let role = role_str
        .parse::<Role>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(Participant {
        user_id: row.get(0)?,
        role,
        joined_at: row.get(2)?,
    })
}

fn load_participants(
    conn: &rusqlite::Connection,
    room_id: &str,
) -> Result<Vec<Participant>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT user_id, role, joined_at FROM room_members
         WHERE room_id = ?1 ORDER BY joined_at, user_id",
    )?;
    let rows = stmt.query_map(params![room_id], row_to_participant)?;
    let mut participants = Vec::new();
    for row in rows {
        participants.push(row?);
    }
    Ok(participants)
}

/// Insert a room together with its initial participants.
pub async fn insert_room(db: &Database, room: &Room) -> Result<(), HanashiError> {
    let room = room.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO rooms (id, name, created_at, last_active_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![room.id, room.name, room.created_at, room.last_active_at],
            )?;
            for p in &room.participants {
                tx.execute(
                    "INSERT INTO room_members (room_id, user_id, role, joined_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![room.id, p.user_id, p.role.to_string(), p.joined_at],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a room with its participant list.
pub async fn get_room(db: &Database, id: &str) -> Result<Option<Room>, HanashiError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT id, name, created_at, last_active_at FROM rooms WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Room {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        last_active_at: row.get(3)?,
                        participants: Vec::new(),
                    })
                },
            );
            match result {
                Ok(mut room) => {
                    room.participants = load_participants(conn, &room.id)?;
                    Ok(Some(room))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List the rooms a user belongs to, most recently active first.
pub async fn list_rooms_for(db: &Database, user_id: &str) -> Result<Vec<Room>, HanashiError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.name, r.created_at, r.last_active_at
                 FROM rooms r
                 JOIN room_members rm ON rm.room_id = r.id
                 WHERE rm.user_id = ?1
                 ORDER BY r.last_active_at DESC, r.id",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok(Room {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                    last_active_at: row.get(3)?,
                    participants: Vec::new(),
                })
            })?;
            let mut rooms = Vec::new();
            for row in rows {
                rooms.push(row?);
            }
            for room in rooms.iter_mut() {
                room.participants = load_participants(conn, &room.id)?;
            }
            Ok(rooms)
        })
        .await
        .map_err(map_tr_err)
}

/// The caller's role in the room, or `None` if not a member.
pub async fn membership(
    db: &Database,
    room_id: &str,
    user_id: &str,
) -> Result<Option<Role>, HanashiError> {
    let room_id = room_id.to_string();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT role FROM room_members WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
                |row| row.get::<_, String>(0),
            );
            match result {
                Ok(role_str) => {
                    let role = role_str.parse::<Role>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                    })?;
                    Ok(Some(role))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Whether a room exists.
pub async fn room_exists(db: &Database, id: &str) -> Result<bool, HanashiError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM rooms WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Add a member. Returns `false` if the user was already a member
/// (idempotent join).
pub async fn add_member(
    db: &Database,
    room_id: &str,
    participant: &Participant,
) -> Result<bool, HanashiError> {
    let room_id = room_id.to_string();
    let participant = participant.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO room_members (room_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    room_id,
                    participant.user_id,
                    participant.role.to_string(),
                    participant.joined_at,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a member, maintaining the room invariants in one transaction:
/// the empty room is deleted (messages cascade), and a room left without
/// an admin promotes its longest-standing member.
pub async fn remove_member(
    db: &Database,
    room_id: &str,
    user_id: &str,
) -> Result<LeaveOutcome, HanashiError> {
    let room_id = room_id.to_string();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let room_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM rooms WHERE id = ?1",
                params![room_id],
                |row| row.get(0),
            )?;
            if room_count == 0 {
                return Ok(LeaveOutcome::RoomMissing);
            }

            let removed = tx.execute(
                "DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
            )?;
            if removed == 0 {
                return Ok(LeaveOutcome::NotMember);
            }

            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM room_members WHERE room_id = ?1",
                params![room_id],
                |row| row.get(0),
            )?;
            if remaining == 0 {
                tx.execute("DELETE FROM rooms WHERE id = ?1", params![room_id])?;
                tx.commit()?;
                return Ok(LeaveOutcome::LeftAndDeleted);
            }

            let admins: i64 = tx.query_row(
                "SELECT COUNT(*) FROM room_members WHERE room_id = ?1 AND role = 'admin'",
                params![room_id],
                |row| row.get(0),
            )?;
            if admins == 0 {
                let successor: String = tx.query_row(
                    "SELECT user_id FROM room_members WHERE room_id = ?1
                     ORDER BY joined_at, user_id LIMIT 1",
                    params![room_id],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "UPDATE room_members SET role = 'admin' WHERE room_id = ?1 AND user_id = ?2",
                    params![room_id, successor],
                )?;
                tx.commit()?;
                return Ok(LeaveOutcome::LeftAndPromoted(successor));
            }

            tx.commit()?;
            Ok(LeaveOutcome::Left)
        })
        .await
        .map_err(map_tr_err)
}

/// Bump a room's activity timestamp.
pub async fn touch(db: &Database, room_id: &str, last_active_at: &str) -> Result<(), HanashiError> {
    let room_id = room_id.to_string();
    let last_active_at = last_active_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE rooms SET last_active_at = ?1 WHERE id = ?2",
                params![last_active_at, room_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
