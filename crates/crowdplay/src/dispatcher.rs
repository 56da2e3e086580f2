//! The command dispatcher: single consumer of the work queue, sole
//! enforcer of policy.
//!
//! One command executes to completion before the next begins, so every
//! cross-user invariant — username uniqueness, one-session membership,
//! single turn holder — is maintained from a serial vantage point.
//! Failed commands are silently dropped unless the per-command policy
//! calls for a negative acknowledgment (`connect false`,
//! `username old old`, guest assignment).

use std::sync::Arc;

use crowdplay_emu::InputDevice;
use crowdplay_protocol::{
    encode, escaped_len, is_printable_ascii, CommandKind, EmuId, Field,
};
use crowdplay_transport::Connection;
use crowdplay_user::{validate_name_format, NameRejection};
use uuid::Uuid;

use crate::server::ServerHandle;
use crate::state::Shared;
use crate::Command;

/// Runs the dispatch loop until shutdown.
///
/// During shutdown the queue is drained down to a sentinel; popping
/// anything after `running` has been cleared ends the loop.
pub(crate) async fn run<C: Connection>(shared: Arc<Shared<C>>) {
    tracing::debug!("dispatcher running");
    loop {
        let cmd = shared.queue.pop().await;
        if !shared.is_running() {
            break;
        }
        dispatch(&shared, cmd).await;
    }
    tracing::info!("dispatcher stopped");
}

async fn dispatch<C: Connection>(shared: &Arc<Shared<C>>, cmd: Command) {
    eprintln!("DISPATCH ENTER kind={:?}", cmd.kind);
    match cmd.kind {
        CommandKind::List => list(shared, &cmd).await,
        CommandKind::Chat => chat(shared, &cmd).await,
        CommandKind::Username => username(shared, &cmd).await,
        CommandKind::Button => button(shared, &cmd).await,
        CommandKind::Connect => connect(shared, &cmd).await,
        CommandKind::Turn => turn(shared, &cmd).await,
        CommandKind::AddEmu => add_emu(shared, &cmd).await,
        CommandKind::Admin => admin(shared, &cmd).await,
        CommandKind::Shutdown => shutdown(shared, &cmd).await,
        CommandKind::Pong => pong(shared, &cmd).await,
        CommandKind::RemoveEmu
        | CommandKind::StopEmu
        | CommandKind::Config
        | CommandKind::Unknown => {
            tracing::trace!(kind = %cmd.kind, "reserved command ignored");
        }
    }
}

// ---------------------------------------------------------------------------
// Caller resolution
// ---------------------------------------------------------------------------

/// A snapshot of the originating user, re-resolved at dispatch time.
struct Caller<C> {
    conn: C,
    uuid: Uuid,
    username: String,
    emu: EmuId,
    has_turn: bool,
    has_admin: bool,
    requested_turn: bool,
    admin_attempts_left: bool,
}

/// Re-resolves the command's weak user reference. `None` means the user
/// disconnected (or the connection was reused) while the command sat in
/// the queue — the command is dropped.
async fn caller<C: Connection>(shared: &Shared<C>, cmd: &Command) -> Option<Caller<C>> {
    let users = shared.users.read().await;
    let entry = users.get(cmd.conn)?;
    if cmd.user != Some(entry.user.uuid()) {
        return None;
    }
    Some(Caller {
        conn: entry.conn.clone(),
        uuid: entry.user.uuid(),
        username: entry.user.username.clone(),
        emu: entry.user.connected_emu.clone(),
        has_turn: entry.user.has_turn,
        has_admin: entry.user.has_admin,
        requested_turn: entry.user.requested_turn,
        admin_attempts_left: entry.user.admin_attempts_left(),
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// `list` — reply with the usernames of everyone else in the caller's
/// session (or, for a lobby user, everyone else still in the lobby).
async fn list<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    if !cmd.params.is_empty() {
        return;
    }
    let Some(caller) = caller(shared, cmd).await else { return };

    let names: Vec<String> = {
        let users = shared.users.read().await;
        users
            .iter()
            .filter(|(_, e)| {
                e.user.connected_emu == caller.emu && e.user.uuid() != caller.uuid
            })
            .map(|(_, e)| e.user.username.clone())
            .collect()
    };

    let mut fields: Vec<Field<'_>> = Vec::with_capacity(names.len() + 1);
    fields.push("list".into());
    fields.extend(names.iter().map(Field::from));
    shared.broadcast_one(&caller.conn, &encode(&fields)).await;

    tracing::debug!(uuid = %caller.uuid, "user list requested");
}

/// `chat <msg>` — validate and fan out to every named user.
async fn chat<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    if cmd.params.len() != 1 {
        return;
    }
    let Some(caller) = caller(shared, cmd).await else { return };
    if caller.username.is_empty() {
        return;
    }

    let msg = &cmd.params[0];
    if !is_printable_ascii(msg) {
        return;
    }
    let max = shared.config.read().await.max_message_size;
    if escaped_len(msg) as u64 > max {
        return;
    }

    let payload = encode(&["chat".into(), (&caller.username).into(), msg.into()]);
    shared.broadcast_all(&payload).await;
    tracing::info!(user = %caller.username, msg = %msg, "chat");
}

/// `username <new>` — the five-clause validation ladder.
///
/// A failure either answers `username old old` (established users) or
/// assigns a guest name (just-joined users). Success answers
/// `username old new` and announces the join or rename to the caller's
/// session.
async fn username<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    if cmd.params.len() != 1 {
        return;
    }
    let Some(caller) = caller(shared, cmd).await else { return };

    let new_name = cmd.params[0].clone();
    let old = caller.username.clone();
    let just_joined = old.is_empty();

    // Re-requesting the current name is a rejected change, full stop.
    if new_name == old && !just_joined {
        tracing::info!(uuid = %caller.uuid, name = %new_name, "username unchanged, rejecting");
        shared
            .broadcast_one(
                &caller.conn,
                &encode(&["username".into(), (&old).into(), (&old).into()]),
            )
            .await;
        return;
    }

    let cfg = shared.config.read().await.clone();
    let mut rejection = validate_name_format(
        &new_name,
        cfg.min_username_length,
        cfg.max_username_length,
    )
    .err();
    if rejection.is_none()
        && shared
            .users
            .read()
            .await
            .username_taken(&new_name, caller.uuid)
    {
        rejection = Some(NameRejection::Taken);
    }

    if let Some(reason) = rejection {
        tracing::info!(
            uuid = %caller.uuid,
            name = %new_name,
            %reason,
            "username change rejected"
        );
        if just_joined {
            let assigned = shared.users.write().await.assign_guest_name(cmd.conn);
            if let Some((old, guest)) = assigned {
                shared
                    .broadcast_one(
                        &caller.conn,
                        &encode(&["username".into(), (&old).into(), (&guest).into()]),
                    )
                    .await;
            }
        } else {
            shared
                .broadcast_one(
                    &caller.conn,
                    &encode(&["username".into(), (&old).into(), (&old).into()]),
                )
                .await;
        }
        return;
    }

    {
        let mut users = shared.users.write().await;
        let Some(entry) = users.get_mut(cmd.conn) else { return };
        entry.user.username = new_name.clone();
    }

    shared
        .broadcast_one(
            &caller.conn,
            &encode(&["username".into(), (&old).into(), (&new_name).into()]),
        )
        .await;
    tracing::info!(uuid = %caller.uuid, old = %old, new = %new_name, "username set");

    if just_joined {
        shared
            .broadcast_session(&caller.emu, &encode(&["join".into(), (&new_name).into()]))
            .await;
    } else {
        shared
            .broadcast_session(
                &caller.emu,
                &encode(&["rename".into(), (&old).into(), (&new_name).into()]),
            )
            .await;
    }
}

/// `connect <emu_id>` — join a session as a viewer.
///
/// Every failure answers `connect false`. Success announces the join to
/// the session (before the caller becomes a member, so they don't hear
/// their own join), then acknowledges and sends the session's limits.
async fn connect<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    let Some(caller) = caller(shared, cmd).await else { return };
    let nack = encode(&["connect".into(), false.into()]);

    if cmd.params.len() != 1 || caller.username.is_empty() {
        shared.broadcast_one(&caller.conn, &nack).await;
        tracing::debug!(uuid = %caller.uuid, "connect rejected (no username or bad arity)");
        return;
    }

    let emu_id = EmuId::new(cmd.params[0].as_str());
    let entry = shared.emus.lock().await.lookup(&emu_id);
    let Some(entry) = entry else {
        shared.broadcast_one(&caller.conn, &nack).await;
        tracing::debug!(uuid = %caller.uuid, emu = %emu_id, "connect rejected (no such session)");
        return;
    };

    if !caller.emu.is_empty() {
        shared.broadcast_one(&caller.conn, &nack).await;
        tracing::debug!(uuid = %caller.uuid, "connect rejected (already in a session)");
        return;
    }

    shared
        .broadcast_session(&emu_id, &encode(&["join".into(), (&caller.username).into()]))
        .await;

    {
        let mut users = shared.users.write().await;
        let Some(e) = users.get_mut(cmd.conn) else { return };
        e.user.connected_emu = emu_id.clone();
    }
    entry.emulator.user_connected(caller.uuid);

    shared
        .broadcast_one(&caller.conn, &encode(&["connect".into(), true.into()]))
        .await;
    tracing::info!(user = %caller.username, emu = %emu_id, "connected to session");

    let cfg = shared.config.read().await.clone();
    shared
        .broadcast_one(
            &caller.conn,
            &encode(&[
                "emuinfo".into(),
                cfg.min_username_length.into(),
                cfg.max_username_length.into(),
                cfg.max_message_size.into(),
                emu_id.as_str().into(),
            ]),
        )
        .await;
}

/// `turn` — queue for exclusive input rights.
async fn turn<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    if !cmd.params.is_empty() {
        return;
    }
    let Some(caller) = caller(shared, cmd).await else { return };
    if caller.emu.is_empty() || caller.requested_turn {
        return;
    }

    let entry = shared.emus.lock().await.lookup(&caller.emu);
    let Some(entry) = entry else { return };

    // A current holder re-requesting is refused by the arbiter; only a
    // real enqueue flips the flag, keeping it in sync with the queue.
    if !entry.turns.request(caller.uuid) {
        return;
    }
    {
        let mut users = shared.users.write().await;
        let Some(e) = users.get_mut(cmd.conn) else { return };
        e.user.requested_turn = true;
    }
    tracing::debug!(uuid = %caller.uuid, emu = %caller.emu, "turn requested");

    if let Some(grant) = entry.turns.promote() {
        crate::state::grant_turn(shared, &entry, grant).await;
    }
}

/// `button <kind> <id> <value>` — route one joypad update.
async fn button<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    if cmd.params.len() != 3 {
        return;
    }
    let Some(caller) = caller(shared, cmd).await else { return };
    if !caller.has_turn {
        return;
    }

    let Ok(id) = cmd.params[1].parse::<i16>() else { return };
    let Ok(value) = cmd.params[2].parse::<i16>() else { return };
    if id < 0 {
        return;
    }
    let Some(device) = InputDevice::from_kind(&cmd.params[0]) else {
        return;
    };
    if !device.accepts_id(id) {
        return;
    }
    if cmd.emu.is_empty() {
        return;
    }

    let entry = shared.emus.lock().await.lookup(&cmd.emu);
    if let Some(entry) = entry {
        tracing::trace!(
            uuid = %caller.uuid,
            device = ?device,
            id,
            value,
            "input routed"
        );
        entry.emulator.set_input(device, id, value);
    }
}

/// `add <id> <core_path> <rom_path>` — spawn an emulator runtime.
///
/// Client-originated adds require `has_admin`; the startup bootstrap
/// enqueues internal adds that carry no user and skip the gate. Path
/// suitability checks are the runtime's problem.
async fn add_emu<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    if cmd.params.len() != 3 {
        return;
    }
    if let Some(uuid) = cmd.user {
        let authorized = {
            let users = shared.users.read().await;
            users
                .find_by_uuid(uuid)
                .map(|(_, e)| e.user.has_admin)
                .unwrap_or(false)
        };
        if !authorized {
            tracing::debug!(%uuid, "add rejected (admin required)");
            return;
        }
    }

    let id = EmuId::new(cmd.params[0].as_str());
    tracing::info!(
        emu = %id,
        core = %cmd.params[1],
        rom = %cmd.params[2],
        "launching emulator session"
    );
    shared.launcher.launch(
        ServerHandle::from_shared(Arc::clone(shared)),
        id,
        cmd.params[1].clone(),
        cmd.params[2].clone(),
    );
}

/// `admin <attempt>` — the salted-hash challenge, three strikes.
async fn admin<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    if cmd.params.len() != 1 {
        return;
    }
    let Some(caller) = caller(shared, cmd).await else { return };
    if !caller.admin_attempts_left {
        tracing::debug!(uuid = %caller.uuid, "admin challenge locked out");
        return;
    }

    let passed = shared
        .config
        .read()
        .await
        .admin_challenge()
        .verify(&cmd.params[0]);

    let has_admin = {
        let mut users = shared.users.write().await;
        let Some(entry) = users.get_mut(cmd.conn) else { return };
        if passed {
            entry.user.has_admin = true;
        } else {
            entry.user.record_admin_failure();
        }
        entry.user.has_admin
    };

    tracing::info!(uuid = %caller.uuid, granted = has_admin, "admin challenge");
    shared
        .broadcast_one(
            &caller.conn,
            &encode(&["admin".into(), has_admin.into()]),
        )
        .await;
}

/// `shutdown` — begin the global shutdown sequence (admin only).
///
/// Runs on its own task: the sequence joins this dispatcher, so it must
/// not run inside it.
async fn shutdown<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    if cmd.user.is_some() {
        let Some(caller) = caller(shared, cmd).await else { return };
        if !caller.has_admin {
            tracing::debug!(uuid = %caller.uuid, "shutdown rejected (admin required)");
            return;
        }
        tracing::info!(user = %caller.username, "shutdown requested by admin");
    }

    let shared = Arc::clone(shared);
    tokio::spawn(async move { crate::state::shutdown(&shared).await });
}

/// `pong` — refresh the liveness timestamp.
async fn pong<C: Connection>(shared: &Arc<Shared<C>>, cmd: &Command) {
    let mut users = shared.users.write().await;
    if let Some(entry) = users.get_mut(cmd.conn) {
        if cmd.user == Some(entry.user.uuid()) {
            entry.user.touch_pong();
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Dispatcher policy tests over in-memory connections.
    //!
    //! Commands are pushed straight into `dispatch`, the way the queue
    //! consumer would, and replies are read back off mock connections.

    use super::*;
    use crate::testutil::{
        add_session, add_user, client_cmd, test_shared,
        test_shared_with_launcher, MockConnection, RecordingLauncher,
        StubEmulator,
    };
    use crate::state::Shared;
    use crowdplay_protocol::decode;
    use crowdplay_user::admin_digest;
    use std::time::Duration;

    /// Splits a reply payload back into fields.
    fn fields(payload: &str) -> Vec<String> {
        decode(payload)
    }

    async fn send(
        shared: &Arc<Shared<MockConnection>>,
        conn: crowdplay_transport::ConnectionId,
        kind: CommandKind,
        params: &[&str],
    ) {
        let cmd = client_cmd(shared, conn, kind, params).await;
        dispatch(shared, cmd).await;
    }

    // ---------------------------------------------------------------
    // Username
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_username_too_short_assigns_guest() {
        let shared = test_shared();
        let (conn_id, conn, uuid) = add_user(&shared, 1, "").await;

        // A single space is below the minimum length of 3.
        send(&shared, conn_id, CommandKind::Username, &[" "]).await;

        let texts = conn.texts();
        assert_eq!(texts.len(), 1);
        let reply = fields(&texts[0]);
        assert_eq!(reply[0], "username");
        assert_eq!(reply[1], "", "old name must be empty");
        let guest = &reply[2];
        assert!(guest.starts_with("guest"));
        let n: u32 = guest["guest".len()..].parse().expect("numeric suffix");
        assert!(n < 100_000);

        let users = shared.users.read().await;
        assert_eq!(users.get(conn_id).unwrap().user.username, *guest);
        assert!(!users.username_taken(guest, uuid));
    }

    #[tokio::test]
    async fn test_username_collision_on_join_falls_back_to_guest() {
        let shared = test_shared();
        let (_, _, _) = add_user(&shared, 1, "alice").await;
        let (b_id, b_conn, _) = add_user(&shared, 2, "").await;

        send(&shared, b_id, CommandKind::Username, &["alice"]).await;

        let reply = fields(&b_conn.texts()[0]);
        assert_eq!(reply[1], "");
        assert!(reply[2].starts_with("guest"));

        // Alice is untouched.
        let users = shared.users.read().await;
        let (_, alice) = users
            .iter()
            .find(|(_, e)| e.user.username == "alice")
            .expect("alice still present");
        assert_eq!(alice.user.username, "alice");
    }

    #[tokio::test]
    async fn test_username_accepted_announces_join_then_rename() {
        let shared = test_shared();
        let (a_id, a_conn, _) = add_user(&shared, 1, "").await;
        let (_, lobby_conn, _) = add_user(&shared, 2, "watcher").await;

        send(&shared, a_id, CommandKind::Username, &["alice"]).await;

        // The caller gets the reply, then hears their own lobby join.
        let texts = a_conn.texts();
        assert_eq!(fields(&texts[0]), vec!["username", "", "alice"]);
        assert_eq!(fields(&texts[1]), vec!["join", "alice"]);
        // The lobby (empty session id) hears the join too.
        assert!(lobby_conn
            .texts()
            .iter()
            .any(|t| fields(t) == vec!["join", "alice"]));

        send(&shared, a_id, CommandKind::Username, &["alicia"]).await;

        let texts = a_conn.texts();
        assert_eq!(fields(&texts[2]), vec!["username", "alice", "alicia"]);
        assert_eq!(fields(&texts[3]), vec!["rename", "alice", "alicia"]);
        assert!(lobby_conn
            .texts()
            .iter()
            .any(|t| fields(t) == vec!["rename", "alice", "alicia"]));
    }

    #[tokio::test]
    async fn test_username_unchanged_is_rejected_with_old_name() {
        let shared = test_shared();
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;

        send(&shared, a_id, CommandKind::Username, &["alice"]).await;

        assert_eq!(
            fields(&a_conn.texts()[0]),
            vec!["username", "alice", "alice"]
        );
        // No join/rename went anywhere.
        assert_eq!(a_conn.texts().len(), 1);
    }

    #[tokio::test]
    async fn test_username_bad_content_rejected_for_established_user() {
        let shared = test_shared();
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;

        for bad in ["a  b", " alice", "alice ", "tab\tname", "x"] {
            send(&shared, a_id, CommandKind::Username, &[bad]).await;
        }

        let texts = a_conn.texts();
        assert_eq!(texts.len(), 5);
        for t in texts {
            assert_eq!(fields(&t), vec!["username", "alice", "alice"]);
        }
    }

    // ---------------------------------------------------------------
    // Chat
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_chat_within_limit_reaches_all_named_users() {
        let shared = test_shared();
        shared.config.write().await.max_message_size = 8;
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;
        let (_, b_conn, _) = add_user(&shared, 2, "bob").await;
        let (_, unnamed_conn, _) = add_user(&shared, 3, "").await;

        // Raw escape collapses to one character: 5 + 1 = 6 ≤ 8.
        send(&shared, a_id, CommandKind::Chat, &["hello\\u0041"]).await;

        let expected = vec!["chat", "alice", "hello\\u0041"];
        assert!(a_conn.texts().iter().any(|t| fields(t) == expected));
        assert!(b_conn.texts().iter().any(|t| fields(t) == expected));
        assert!(unnamed_conn.texts().is_empty(), "unnamed users hear nothing");
    }

    #[tokio::test]
    async fn test_chat_over_limit_is_dropped() {
        let shared = test_shared();
        shared.config.write().await.max_message_size = 8;
        let (a_id, _, _) = add_user(&shared, 1, "alice").await;
        let (_, b_conn, _) = add_user(&shared, 2, "bob").await;

        send(&shared, a_id, CommandKind::Chat, &["helloworld"]).await;

        assert!(b_conn.texts().is_empty());
    }

    #[tokio::test]
    async fn test_chat_non_printable_is_dropped() {
        let shared = test_shared();
        let (a_id, _, _) = add_user(&shared, 1, "alice").await;
        let (_, b_conn, _) = add_user(&shared, 2, "bob").await;

        send(&shared, a_id, CommandKind::Chat, &["line\nbreak"]).await;
        send(&shared, a_id, CommandKind::Chat, &["héllo"]).await;

        assert!(b_conn.texts().is_empty());
    }

    #[tokio::test]
    async fn test_chat_requires_username() {
        let shared = test_shared();
        let (a_id, _, _) = add_user(&shared, 1, "").await;
        let (_, b_conn, _) = add_user(&shared, 2, "bob").await;

        send(&shared, a_id, CommandKind::Chat, &["hi"]).await;

        assert!(b_conn.texts().is_empty());
    }

    #[tokio::test]
    async fn test_chat_spans_sessions() {
        // Chat is global: members of other sessions still hear it.
        let shared = test_shared();
        let emu = Arc::new(StubEmulator::default());
        add_session(&shared, "emu1", emu).await;
        let (a_id, _, _) = add_user(&shared, 1, "alice").await;
        let (b_id, b_conn, _) = add_user(&shared, 2, "bob").await;
        send(&shared, b_id, CommandKind::Connect, &["emu1"]).await;

        send(&shared, a_id, CommandKind::Chat, &["hi"]).await;

        assert!(b_conn
            .texts()
            .iter()
            .any(|t| fields(t) == vec!["chat", "alice", "hi"]));
    }

    // ---------------------------------------------------------------
    // Connect
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_connect_flow_acks_then_sends_limits() {
        let shared = test_shared();
        let emu = Arc::new(StubEmulator::default());
        add_session(&shared, "emu1", Arc::clone(&emu)).await;
        let (a_id, a_conn, a_uuid) = add_user(&shared, 1, "alice").await;
        let (b_id, b_conn, _) = add_user(&shared, 2, "bob").await;
        send(&shared, b_id, CommandKind::Connect, &["emu1"]).await;

        send(&shared, a_id, CommandKind::Connect, &["emu1"]).await;

        // Replies to A, in order: connect true, then emuinfo.
        let texts = a_conn.texts();
        assert_eq!(fields(&texts[0]), vec!["connect", "true"]);
        assert_eq!(
            fields(&texts[1]),
            vec!["emuinfo", "3", "16", "255", "emu1"]
        );
        // Existing members hear the join.
        assert!(b_conn
            .texts()
            .iter()
            .any(|t| fields(t) == vec!["join", "alice"]));
        // Membership and the runtime callback both recorded.
        assert_eq!(
            shared.users.read().await.get(a_id).unwrap().user.connected_emu,
            EmuId::new("emu1")
        );
        assert!(emu.joined.lock().unwrap().contains(&a_uuid));
    }

    #[tokio::test]
    async fn test_connect_without_username_is_nacked() {
        let shared = test_shared();
        add_session(&shared, "emu1", Arc::new(StubEmulator::default())).await;
        let (a_id, a_conn, _) = add_user(&shared, 1, "").await;

        send(&shared, a_id, CommandKind::Connect, &["emu1"]).await;

        assert_eq!(fields(&a_conn.texts()[0]), vec!["connect", "false"]);
    }

    #[tokio::test]
    async fn test_connect_unknown_session_is_nacked() {
        let shared = test_shared();
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;

        send(&shared, a_id, CommandKind::Connect, &["nowhere"]).await;

        assert_eq!(fields(&a_conn.texts()[0]), vec!["connect", "false"]);
    }

    #[tokio::test]
    async fn test_connect_twice_is_nacked() {
        let shared = test_shared();
        add_session(&shared, "emu1", Arc::new(StubEmulator::default())).await;
        add_session(&shared, "emu2", Arc::new(StubEmulator::default())).await;
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;
        send(&shared, a_id, CommandKind::Connect, &["emu1"]).await;

        send(&shared, a_id, CommandKind::Connect, &["emu2"]).await;

        let texts = a_conn.texts();
        assert_eq!(fields(texts.last().unwrap()), vec!["connect", "false"]);
        assert_eq!(
            shared.users.read().await.get(a_id).unwrap().user.connected_emu,
            EmuId::new("emu1")
        );
    }

    // ---------------------------------------------------------------
    // List
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_list_names_others_in_same_session_only() {
        let shared = test_shared();
        add_session(&shared, "emu1", Arc::new(StubEmulator::default())).await;
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;
        let (b_id, _, _) = add_user(&shared, 2, "bob").await;
        let (c_id, _, _) = add_user(&shared, 3, "carol").await;
        send(&shared, a_id, CommandKind::Connect, &["emu1"]).await;
        send(&shared, b_id, CommandKind::Connect, &["emu1"]).await;
        // Carol stays in the lobby.
        let _ = c_id;

        send(&shared, a_id, CommandKind::List, &[]).await;

        let texts = a_conn.texts();
        let reply = fields(texts.last().unwrap());
        assert_eq!(reply[0], "list");
        assert_eq!(&reply[1..], &["bob"], "only session peers, not the caller");
    }

    #[tokio::test]
    async fn test_list_with_params_is_dropped() {
        let shared = test_shared();
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;

        send(&shared, a_id, CommandKind::List, &["extra"]).await;

        assert!(a_conn.texts().is_empty());
    }

    // ---------------------------------------------------------------
    // Turn + Button
    // ---------------------------------------------------------------

    async fn two_users_in_session(
        shared: &Arc<Shared<MockConnection>>,
        emu: Arc<StubEmulator>,
    ) -> (
        crowdplay_transport::ConnectionId,
        crowdplay_transport::ConnectionId,
    ) {
        add_session(shared, "emu1", emu).await;
        let (a_id, _, _) = add_user(shared, 1, "alice").await;
        let (b_id, _, _) = add_user(shared, 2, "bob").await;
        send(shared, a_id, CommandKind::Connect, &["emu1"]).await;
        send(shared, b_id, CommandKind::Connect, &["emu1"]).await;
        (a_id, b_id)
    }

    #[tokio::test]
    async fn test_turn_grants_first_requester_and_queues_second() {
        let shared = test_shared();
        // Keep the grant alive for the whole test.
        shared.config.write().await.turn_length = Duration::from_secs(3600);
        let emu = Arc::new(StubEmulator::default());
        let (a_id, b_id) = two_users_in_session(&shared, Arc::clone(&emu)).await;

        send(&shared, a_id, CommandKind::Turn, &[]).await;
        send(&shared, b_id, CommandKind::Turn, &[]).await;

        let users = shared.users.read().await;
        let a = &users.get(a_id).unwrap().user;
        let b = &users.get(b_id).unwrap().user;
        assert!(a.has_turn && !a.requested_turn);
        assert!(!b.has_turn && b.requested_turn);
    }

    #[tokio::test]
    async fn test_button_routed_only_for_turn_holder() {
        let shared = test_shared();
        shared.config.write().await.turn_length = Duration::from_secs(3600);
        let emu = Arc::new(StubEmulator::default());
        let (a_id, b_id) = two_users_in_session(&shared, Arc::clone(&emu)).await;
        send(&shared, a_id, CommandKind::Turn, &[]).await;

        send(&shared, a_id, CommandKind::Button, &["button", "0", "1"]).await;
        send(&shared, b_id, CommandKind::Button, &["button", "0", "1"]).await;

        assert_eq!(emu.inputs(), vec![(InputDevice::Button, 0, 1)]);
    }

    #[tokio::test]
    async fn test_button_validation_drops_bad_input() {
        let shared = test_shared();
        shared.config.write().await.turn_length = Duration::from_secs(3600);
        let emu = Arc::new(StubEmulator::default());
        let (a_id, _) = two_users_in_session(&shared, Arc::clone(&emu)).await;
        send(&shared, a_id, CommandKind::Turn, &[]).await;

        // Out-of-range ids, bad parses, unknown device kinds.
        send(&shared, a_id, CommandKind::Button, &["button", "16", "1"]).await;
        send(&shared, a_id, CommandKind::Button, &["leftStick", "2", "1"]).await;
        send(&shared, a_id, CommandKind::Button, &["button", "-1", "1"]).await;
        send(&shared, a_id, CommandKind::Button, &["button", "zero", "1"]).await;
        send(&shared, a_id, CommandKind::Button, &["button", "0", "99999"]).await;
        send(&shared, a_id, CommandKind::Button, &["middleStick", "0", "1"]).await;
        send(&shared, a_id, CommandKind::Button, &["button", "0"]).await;

        assert!(emu.inputs().is_empty());

        // Sticks accept the full signed range on ids 0 and 1.
        send(&shared, a_id, CommandKind::Button, &["leftStick", "1", "-32768"]).await;
        assert_eq!(emu.inputs(), vec![(InputDevice::LeftStick, 1, -32768)]);
    }

    #[tokio::test]
    async fn test_turn_passes_to_next_on_holder_disconnect() {
        let shared = test_shared();
        shared.config.write().await.turn_length = Duration::from_secs(3600);
        let emu = Arc::new(StubEmulator::default());
        let (a_id, b_id) = two_users_in_session(&shared, Arc::clone(&emu)).await;
        send(&shared, a_id, CommandKind::Turn, &[]).await;
        send(&shared, b_id, CommandKind::Turn, &[]).await;

        crate::state::handle_disconnect(&shared, a_id).await;

        let users = shared.users.read().await;
        assert!(users.get(a_id).is_none());
        let b = &users.get(b_id).unwrap().user;
        assert!(b.has_turn && !b.requested_turn);
    }

    #[tokio::test]
    async fn test_turn_expires_and_rotates() {
        let shared = test_shared();
        shared.config.write().await.turn_length = Duration::from_millis(200);
        let emu = Arc::new(StubEmulator::default());
        let (a_id, b_id) = two_users_in_session(&shared, Arc::clone(&emu)).await;

        send(&shared, a_id, CommandKind::Turn, &[]).await;
        send(&shared, b_id, CommandKind::Turn, &[]).await;

        // A holds for ~200 ms, then the timer promotes B.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let users = shared.users.read().await;
        assert!(!users.get(a_id).unwrap().user.has_turn);
        assert!(users.get(b_id).unwrap().user.has_turn);
    }

    #[tokio::test]
    async fn test_turn_requires_session_membership() {
        let shared = test_shared();
        let (a_id, _, a_uuid) = add_user(&shared, 1, "alice").await;

        send(&shared, a_id, CommandKind::Turn, &[]).await;

        let users = shared.users.read().await;
        assert!(!users.get(a_id).unwrap().user.requested_turn);
        let _ = a_uuid;
    }

    // ---------------------------------------------------------------
    // Admin + AddEmu + Shutdown
    // ---------------------------------------------------------------

    async fn configure_admin(shared: &Arc<Shared<MockConnection>>) {
        let mut cfg = shared.config.write().await;
        cfg.salt = "s".into();
        cfg.admin_hash = admin_digest("pw", "s");
    }

    #[tokio::test]
    async fn test_admin_correct_attempt_grants() {
        let shared = test_shared();
        configure_admin(&shared).await;
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;

        send(&shared, a_id, CommandKind::Admin, &["pw"]).await;

        assert_eq!(fields(&a_conn.texts()[0]), vec!["admin", "true"]);
        assert!(shared.users.read().await.get(a_id).unwrap().user.has_admin);
    }

    #[tokio::test]
    async fn test_admin_lockout_after_three_failures() {
        let shared = test_shared();
        configure_admin(&shared).await;
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;

        for _ in 0..3 {
            send(&shared, a_id, CommandKind::Admin, &["wrong"]).await;
        }
        // The fourth attempt is dropped even though it is correct.
        send(&shared, a_id, CommandKind::Admin, &["pw"]).await;

        let texts = a_conn.texts();
        assert_eq!(texts.len(), 3, "locked-out attempt gets no reply");
        for t in &texts {
            assert_eq!(fields(t), vec!["admin", "false"]);
        }
        let users = shared.users.read().await;
        let user = &users.get(a_id).unwrap().user;
        assert!(!user.has_admin);
        assert_eq!(user.admin_attempts, 3);
    }

    #[tokio::test]
    async fn test_add_emu_requires_admin_for_clients() {
        let launcher = RecordingLauncher::default();
        let shared = test_shared_with_launcher(launcher.clone());
        let (a_id, _, _) = add_user(&shared, 1, "alice").await;

        send(&shared, a_id, CommandKind::AddEmu, &["emu2", "./core", "./rom"]).await;
        assert!(launcher.launched.lock().unwrap().is_empty());

        shared
            .users
            .write()
            .await
            .get_mut(a_id)
            .unwrap()
            .user
            .has_admin = true;
        send(&shared, a_id, CommandKind::AddEmu, &["emu2", "./core", "./rom"]).await;

        assert_eq!(
            launcher.launched.lock().unwrap().clone(),
            vec![(EmuId::new("emu2"), "./core".into(), "./rom".into())]
        );
    }

    #[tokio::test]
    async fn test_add_emu_internal_bootstrap_skips_admin_gate() {
        let launcher = RecordingLauncher::default();
        let shared = test_shared_with_launcher(launcher.clone());

        let cmd = Command::internal(
            CommandKind::AddEmu,
            vec!["emu1".into(), "./core".into(), "./rom".into()],
        );
        dispatch(&shared, cmd).await;

        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_requires_admin() {
        let shared = test_shared();
        let (a_id, _, _) = add_user(&shared, 1, "alice").await;

        send(&shared, a_id, CommandKind::Shutdown, &[]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(shared.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_by_admin_closes_everyone() {
        let shared = test_shared();
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;
        shared
            .users
            .write()
            .await
            .get_mut(a_id)
            .unwrap()
            .user
            .has_admin = true;

        send(&shared, a_id, CommandKind::Shutdown, &[]).await;
        tokio::time::timeout(Duration::from_secs(1), shared.wait_done())
            .await
            .expect("shutdown should complete");

        assert!(!shared.is_running());
        assert_eq!(a_conn.close_reason(), Some("Closing".into()));
        // The queue holds exactly the wake-up sentinel.
        assert_eq!(shared.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let shared = test_shared();
        crate::state::shutdown(&shared).await;
        crate::state::shutdown(&shared).await;
        assert!(!shared.is_running());
        assert_eq!(shared.queue.len(), 1);
    }

    // ---------------------------------------------------------------
    // Pong + stale references
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_pong_refreshes_liveness() {
        let shared = test_shared();
        let (a_id, _, _) = add_user(&shared, 1, "alice").await;
        {
            let mut users = shared.users.write().await;
            users.get_mut(a_id).unwrap().user.last_pong =
                std::time::Instant::now() - Duration::from_secs(1);
        }

        send(&shared, a_id, CommandKind::Pong, &[]).await;

        let users = shared.users.read().await;
        assert!(!users
            .get(a_id)
            .unwrap()
            .user
            .timed_out(Duration::from_millis(500)));
    }

    #[tokio::test]
    async fn test_command_from_disconnected_user_is_dropped() {
        let shared = test_shared();
        let (a_id, a_conn, _) = add_user(&shared, 1, "alice").await;
        let cmd = client_cmd(&shared, a_id, CommandKind::List, &[]).await;

        // The user vanishes while the command sits in the queue.
        crate::state::handle_disconnect(&shared, a_id).await;
        dispatch(&shared, cmd).await;

        assert!(a_conn.texts().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_leave_to_session() {
        let shared = test_shared();
        let emu = Arc::new(StubEmulator::default());
        let (a_id, b_id) = two_users_in_session(&shared, Arc::clone(&emu)).await;
        let b_conn = shared.users.read().await.get(b_id).unwrap().conn.clone();

        crate::state::handle_disconnect(&shared, a_id).await;

        assert!(b_conn
            .texts()
            .iter()
            .any(|t| fields(t) == vec!["leave", "alice"]));
        assert_eq!(emu.left.lock().unwrap().len(), 1);
    }
}
