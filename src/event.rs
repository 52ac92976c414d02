//! The typed event surface.
//!
//! Handlers fully apply state before queueing an event, so a
//! subscriber draining [`Session::take_events`](crate::session::Session::take_events)
//! always observes the post-transition state — except for the
//! `Old*` fields on [`Event::ChannelTopicChanged`], which carry the
//! prior snapshot by design of that event.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::modes::{ChannelStatus, ModeChange};
use crate::session::{ClientState, DisconnectReason};

/// Completion signal for a channel's first NAMES batch.
///
/// Surfaced on [`Event::ChannelJoin`] for self-joins; completes
/// after the state change for RPL_ENDOFNAMES, or fails with the
/// disconnect reason. One producer, one waiter.
#[derive(Debug)]
pub struct NamesTask {
    rx: oneshot::Receiver<Result<(), DisconnectReason>>,
}

impl NamesTask {
    pub(crate) fn pair() -> (oneshot::Sender<Result<(), DisconnectReason>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, NamesTask { rx })
    }

    /// Non-blocking poll: `Some` once the membership list is known
    /// (or the session disconnected).
    pub fn try_result(&mut self) -> Option<Result<(), DisconnectReason>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(DisconnectReason::Exception))
            }
        }
    }
}

impl Future for NamesTask {
    type Output = Result<(), DisconnectReason>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(DisconnectReason::Exception)))
    }
}

/// Notifications raised to the application layer.
#[derive(Debug)]
#[non_exhaustive]
pub enum Event {
    /// The session moved between lifecycle states.
    StateChanged {
        /// Previous state.
        old: ClientState,
        /// New state.
        new: ClientState,
    },
    /// A user (possibly this session) changed nickname. State
    /// already reads the new value when this is observed.
    NicknameChange {
        /// Nickname before the change.
        old: String,
        /// Nickname after the change.
        new: String,
        /// Whether the session's own nickname changed.
        is_self: bool,
    },
    /// A user joined a channel.
    ChannelJoin {
        /// Channel name.
        channel: String,
        /// Joining nickname.
        nick: String,
        /// Account from extended-join, when negotiated.
        account: Option<String>,
        /// NAMES completion signal; present on self-joins only.
        names: Option<NamesTask>,
    },
    /// A user parted a channel.
    ChannelPart {
        /// Channel name.
        channel: String,
        /// Parting nickname.
        nick: String,
        /// Part message.
        message: Option<String>,
    },
    /// A user was kicked from a channel.
    ChannelKick {
        /// Channel name.
        channel: String,
        /// Kicked nickname.
        nick: String,
        /// Who issued the kick.
        by: String,
        /// Kick reason.
        reason: Option<String>,
    },
    /// A user left a channel by any means (part, kick, quit).
    ChannelLeave {
        /// Channel name.
        channel: String,
        /// Leaving nickname.
        nick: String,
    },
    /// Message to a channel.
    ChannelMessage {
        /// Channel name.
        channel: String,
        /// Sender nickname.
        nick: String,
        /// Status restriction parsed from target prefixes (`@#ch`).
        status: ChannelStatus,
        /// Message body.
        text: String,
    },
    /// Notice to a channel.
    ChannelNotice {
        /// Channel name.
        channel: String,
        /// Sender nickname.
        nick: String,
        /// Status restriction parsed from target prefixes.
        status: ChannelStatus,
        /// Notice body.
        text: String,
    },
    /// CTCP to a channel.
    ChannelCtcp {
        /// Channel name.
        channel: String,
        /// Sender nickname.
        nick: String,
        /// Status restriction parsed from target prefixes.
        status: ChannelStatus,
        /// CTCP body with outer markers stripped.
        text: String,
    },
    /// Tag-only message to a channel.
    ChannelTagMsg {
        /// Channel name.
        channel: String,
        /// Sender nickname.
        nick: String,
        /// Status restriction parsed from target prefixes.
        status: ChannelStatus,
    },
    /// Direct message.
    PrivateMessage {
        /// Sender nickname.
        nick: String,
        /// Message body.
        text: String,
    },
    /// Direct notice.
    PrivateNotice {
        /// Sender nickname.
        nick: String,
        /// Notice body.
        text: String,
    },
    /// Direct CTCP.
    PrivateCtcp {
        /// Sender nickname.
        nick: String,
        /// CTCP body with outer markers stripped.
        text: String,
    },
    /// Tag-only direct message.
    PrivateTagMsg {
        /// Sender nickname.
        nick: String,
    },
    /// `$`-targeted broadcast message.
    BroadcastMessage {
        /// The `$` target mask.
        target: String,
        /// Sender nickname.
        nick: String,
        /// Message body.
        text: String,
    },
    /// `$`-targeted broadcast notice.
    BroadcastNotice {
        /// The `$` target mask.
        target: String,
        /// Sender nickname.
        nick: String,
        /// Notice body.
        text: String,
    },
    /// A user became visible to the session.
    UserAppeared {
        /// Nickname.
        nick: String,
    },
    /// A user is no longer visible to the session.
    UserDisappeared {
        /// Nickname.
        nick: String,
    },
    /// A user quit IRC.
    UserQuit {
        /// Nickname.
        nick: String,
        /// Quit reason (empty for synthetic quits).
        reason: String,
    },
    /// This session was marked away.
    AwaySet,
    /// This session's away mark was cleared.
    AwayCancelled,
    /// RPL_AWAY for a messaged target.
    AwayMessage {
        /// Away nickname.
        nick: String,
        /// Away reason.
        reason: String,
    },
    /// The session's own user modes changed.
    UserModesSet {
        /// The applied mode run.
        modes: String,
    },
    /// Channel modes changed.
    ChannelModesSet {
        /// Channel name.
        channel: String,
        /// Who changed them.
        by: String,
        /// Applied changes, in application order.
        changes: Vec<ModeChange>,
    },
    /// New capabilities advertised (CAP LS/NEW batch committed).
    CapabilitiesAdded {
        /// Newly advertised names.
        caps: Vec<String>,
    },
    /// Capabilities withdrawn (CAP DEL).
    CapabilitiesDeleted {
        /// Withdrawn names.
        caps: Vec<String>,
    },
    /// A monitored user came online.
    MonitorOnline {
        /// Nickname.
        nick: String,
    },
    /// A monitored user went offline.
    MonitorOffline {
        /// Nickname.
        nick: String,
    },
    /// A channel topic changed. The `old_*` fields carry the prior
    /// snapshot; current state holds the new topic.
    ChannelTopicChanged {
        /// Channel name.
        channel: String,
        /// Who changed it.
        by: String,
        /// Topic before the change.
        old_topic: Option<String>,
        /// Previous topic setter.
        old_setter: Option<String>,
        /// Previous topic timestamp.
        old_stamp: Option<DateTime<Utc>>,
    },
    /// The session disconnected.
    Disconnected {
        /// Why.
        reason: DisconnectReason,
        /// Server-provided or local detail, when available.
        message: Option<String>,
    },
}
