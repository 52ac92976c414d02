//! The protocol state machine.
//!
//! [`Session`] is sans-IO: the embedding transport feeds it whole
//! inbound lines ([`Session::feed_line`] / [`Session::feed_bytes`])
//! and drains queued outbound lines and events. No I/O, threads, or
//! timers live here; [`Session::tick`] drives the one core-owned
//! timeout (ping keepalive) from caller-supplied instants.
//!
//! For any single inbound line, state is fully applied before its
//! events can be observed and before the next line is processed;
//! outbound lines queue in handler order.

mod channel;
mod messaging;
mod presence;
mod registration;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::caps::CapRegistry;
use crate::error::{ProtocolError, Result};
use crate::event::Event;
use crate::isupport::{Isupport, IsupportEffect};
use crate::line::Line;
use crate::response::Response;
use crate::sasl::{Authenticator, SaslContext, SaslMechanism};
use crate::store::{Store, UserId};
use crate::util::split_text;

pub(crate) const QUIT_CASEMAPPING: &str = "Casemapping change caused a name collision";
pub(crate) const QUIT_SASL_UNSUPPORTED: &str =
    "SASL authentication is not supported by this server";
pub(crate) const QUIT_SASL_MECHANISM: &str = "SASL authentication mechanism not supported";
pub(crate) const QUIT_STARTTLS: &str = "STARTTLS is not supported by this server";
pub(crate) const QUIT_PING_TIMEOUT: &str = "Ping timeout";

/// Lifecycle state of one server session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClientState {
    /// Not connected.
    #[default]
    Offline,
    /// Transport is dialing.
    Connecting,
    /// TLS handshake in progress (initial or STARTTLS upgrade).
    SslHandshaking,
    /// CAP LS sent; negotiating capabilities and authentication.
    CapabilityNegotiating,
    /// NICK/USER sent; awaiting welcome.
    Registering,
    /// 001 received; reading server info until end of MOTD.
    ReceivingServerInfo,
    /// Fully registered.
    Online,
    /// QUIT issued or ERROR received; awaiting transport close.
    Disconnecting,
    /// Transport closed.
    Disconnected,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum DisconnectReason {
    /// This client quit.
    ClientQuit,
    /// The server terminated the session.
    ServerQuit,
    /// The keepalive went unanswered.
    PingTimeout,
    /// SASL was required and did not complete.
    SaslAuthenticationFailed,
    /// TLS was required and not available.
    TlsNotSupported,
    /// Internal failure (case-mapping collision, transport error).
    Exception,
}

/// Transport security policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TlsMode {
    /// No TLS.
    #[default]
    Plaintext,
    /// Upgrade via STARTTLS when offered.
    StartTlsOptional,
    /// Upgrade via STARTTLS; abort when not offered.
    StartTlsRequired,
    /// TLS from the first byte.
    Tls,
    /// TLS without certificate verification.
    TlsNoCertCheck,
}

/// SASL policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SaslMode {
    /// Never authenticate.
    Disabled,
    /// Authenticate when possible.
    #[default]
    Optional,
    /// Abort the session when authentication is unavailable or fails.
    Required,
}

/// The identity this session registers with. A `LocalUser` binds to
/// at most one live session at a time.
#[derive(Clone, Debug)]
pub struct LocalUser {
    nickname: String,
    ident: String,
    full_name: String,
    bound: Arc<AtomicBool>,
}

impl LocalUser {
    /// A local identity with the given nickname, ident, and realname.
    pub fn new(nickname: &str, ident: &str, full_name: &str) -> Self {
        LocalUser {
            nickname: nickname.to_owned(),
            ident: ident.to_owned(),
            full_name: full_name.to_owned(),
            bound: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The configured nickname.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }
}

/// Session configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Seconds of inbound silence before a keepalive PING; a second
    /// silent interval disconnects. `0` disables the keepalive.
    pub ping_timeout: u64,
    /// SASL policy.
    pub sasl: SaslMode,
    /// SASL username.
    pub sasl_username: Option<String>,
    /// SASL password.
    pub sasl_password: Option<String>,
    /// Permit password-bearing SASL mechanisms without TLS.
    pub allow_sasl_without_tls: bool,
    /// Transport security policy.
    pub tls: TlsMode,
    /// Server password (PASS), when required.
    pub server_password: Option<String>,
    /// Text encoding for the byte↔text boundary.
    pub encoding: &'static encoding::Encoding,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ping_timeout: 0,
            sasl: SaslMode::Optional,
            sasl_username: None,
            sasl_password: None,
            allow_sasl_without_tls: false,
            tls: TlsMode::Plaintext,
            server_password: None,
            encoding: encoding::UTF_8,
        }
    }
}

/// One IRC server session.
pub struct Session {
    local: LocalUser,
    config: Config,
    state: ClientState,
    disconnect_reason: Option<DisconnectReason>,
    nickname: String,
    server_name: Option<String>,
    network_name: Option<String>,
    supported_user_modes: Vec<char>,
    user_modes: BTreeSet<char>,
    isupport: Isupport,
    caps: CapRegistry,
    store: Store,
    sasl: Authenticator,
    monitor_list: Vec<String>,
    outbound: VecDeque<Line>,
    events: VecDeque<Event>,
    tls_active: bool,
    cap_seen: bool,
    cap_end_sent: bool,
    registration_sent: bool,
    sasl_in_progress: bool,
    names_buf: HashMap<crate::store::ChannelId, Vec<String>>,
    names_tasks: HashMap<crate::store::ChannelId, oneshot::Sender<std::result::Result<(), DisconnectReason>>>,
    watch_listed: HashSet<UserId>,
    whois_account_pinned: HashSet<UserId>,
    cap_filter: Option<Box<dyn FnMut(&[String], &mut BTreeSet<String>)>>,
    last_inbound: Option<Instant>,
    ping_sent_at: Option<Instant>,
}

impl Session {
    /// Build a session for `local`. Fails when `local` is already
    /// bound to another live session.
    pub fn new(
        local: LocalUser,
        network_name: Option<&str>,
        config: Config,
    ) -> Result<Session> {
        if local.bound.swap(true, AtomicOrdering::SeqCst) {
            return Err(ProtocolError::UserAlreadyBound);
        }
        let isupport = Isupport::default();
        let store = Store::new(isupport.case_mapping());
        Ok(Session {
            nickname: local.nickname.clone(),
            local,
            config,
            state: ClientState::Offline,
            disconnect_reason: None,
            server_name: None,
            network_name: network_name.map(str::to_owned),
            supported_user_modes: Vec::new(),
            user_modes: BTreeSet::new(),
            isupport,
            caps: CapRegistry::default(),
            store,
            sasl: Authenticator::default(),
            monitor_list: Vec::new(),
            outbound: VecDeque::new(),
            events: VecDeque::new(),
            tls_active: false,
            cap_seen: false,
            cap_end_sent: false,
            registration_sent: false,
            sasl_in_progress: false,
            names_buf: HashMap::new(),
            names_tasks: HashMap::new(),
            watch_listed: HashSet::new(),
            whois_account_pinned: HashSet::new(),
            cap_filter: None,
            last_inbound: None,
            ping_sent_at: None,
        })
    }

    // --- accessors ---

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Why the session ended, once it has.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect_reason
    }

    /// The session's current nickname (server-assigned once 001
    /// arrives).
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Server name from RPL_MYINFO.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Network name (constructor argument until NETWORK overrides it).
    pub fn network_name(&self) -> Option<&str> {
        self.network_name.as_deref()
    }

    /// The negotiated extension registry.
    pub fn isupport(&self) -> &Isupport {
        &self.isupport
    }

    /// The capability registry.
    pub fn capabilities(&self) -> &CapRegistry {
        &self.caps
    }

    /// The entity store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The session's current user modes.
    pub fn user_modes(&self) -> String {
        self.user_modes.iter().collect()
    }

    /// User mode letters advertised by RPL_MYINFO.
    pub fn supported_user_modes(&self) -> &[char] {
        &self.supported_user_modes
    }

    /// Nicknames currently in the presence subscription list.
    pub fn monitor_list(&self) -> &[String] {
        &self.monitor_list
    }

    /// Register a hook that may adjust the capability enable set
    /// after a CAP LS/NEW batch commits and before `CAP REQ` is
    /// built. Arguments: the newly advertised names and the mutable
    /// enable set.
    pub fn set_cap_filter<F>(&mut self, filter: F)
    where
        F: FnMut(&[String], &mut BTreeSet<String>) + 'static,
    {
        self.cap_filter = Some(Box::new(filter));
    }

    /// Register an additional SASL mechanism, tried after the
    /// built-ins.
    pub fn register_sasl_mechanism(&mut self, mechanism: Box<dyn SaslMechanism>) {
        self.sasl.register(mechanism);
    }

    // --- lifecycle ---

    /// Note that the transport has started dialing.
    pub fn connect(&mut self) {
        if self.state == ClientState::Offline || self.state == ClientState::Disconnected {
            self.disconnect_reason = None;
            self.set_state(ClientState::Connecting);
        }
    }

    /// The transport is connected. For `Tls`/`TlsNoCertCheck`
    /// sessions, pass `tls_active` once the handshake is done; a
    /// plaintext connection under those modes waits in
    /// `SslHandshaking` for [`Session::on_tls_started`].
    pub fn on_connected(&mut self, tls_active: bool) {
        self.tls_active = tls_active;
        self.last_inbound = Some(Instant::now());
        if !tls_active
            && matches!(self.config.tls, TlsMode::Tls | TlsMode::TlsNoCertCheck)
        {
            self.set_state(ClientState::SslHandshaking);
            return;
        }
        self.begin_negotiation();
    }

    /// The transport finished a TLS handshake (initial or STARTTLS).
    pub fn on_tls_started(&mut self) {
        self.tls_active = true;
        match self.state {
            ClientState::SslHandshaking => self.begin_negotiation(),
            // STARTTLS upgrade: renegotiate from a clean slate.
            ClientState::CapabilityNegotiating => {
                self.push_line(Line::cmd("CAP", ["LS", "302"]));
            }
            _ => {}
        }
    }

    fn begin_negotiation(&mut self) {
        if let Some(pass) = self.config.server_password.clone() {
            self.push_line(Line::cmd("PASS", [pass]));
        }
        self.push_line(Line::cmd("CAP", ["LS", "302"]));
        let nickname = self.nickname.clone();
        let id = self.store.ensure_user(&nickname);
        if let Some(user) = self.store.user_mut(id) {
            user.seen = true;
            user.ident = Some(self.local.ident.clone());
            user.set_full_name(&self.local.full_name.clone());
        }
        self.set_state(ClientState::CapabilityNegotiating);
    }

    /// The transport closed. Pending NAMES tasks fail with the
    /// disconnect reason and all channels are dropped.
    pub fn on_disconnected(&mut self, reason: Option<DisconnectReason>) {
        let reason = self
            .disconnect_reason
            .or(reason)
            .unwrap_or(DisconnectReason::Exception);
        self.disconnect_reason = Some(reason);

        for (_, tx) in self.names_tasks.drain() {
            let _ = tx.send(Err(reason));
        }
        self.names_buf.clear();

        let channel_ids: Vec<_> = self.store.channels().map(|(id, _)| id).collect();
        for id in channel_ids {
            for user in self.store.remove_channel(id) {
                self.store.release_user(user);
            }
        }

        self.sasl.reset();
        self.sasl_in_progress = false;
        self.last_inbound = None;
        self.ping_sent_at = None;
        self.set_state(ClientState::Disconnecting);
        self.set_state(ClientState::Disconnected);
        self.push_event(Event::Disconnected { reason, message: None });
    }

    /// Issue a client QUIT.
    pub fn quit(&mut self, message: Option<&str>) {
        let line = match message {
            Some(msg) => Line::cmd("QUIT", [msg]),
            None => Line::cmd("QUIT", [] as [&str; 0]),
        };
        self.push_line(line);
        if self.disconnect_reason.is_none() {
            self.disconnect_reason = Some(DisconnectReason::ClientQuit);
        }
        self.set_state(ClientState::Disconnecting);
    }

    pub(crate) fn fatal_quit(&mut self, reason: DisconnectReason, message: &str) {
        if matches!(
            self.state,
            ClientState::Disconnecting | ClientState::Disconnected
        ) {
            return;
        }
        self.push_line(Line::cmd("QUIT", [message]));
        self.disconnect_reason = Some(reason);
        self.set_state(ClientState::Disconnecting);
    }

    // --- input ---

    /// Feed one inbound line of text (without CRLF, though trailing
    /// terminators are tolerated).
    pub fn feed_line(&mut self, raw: &str) {
        self.last_inbound = Some(Instant::now());
        self.ping_sent_at = None;
        match Line::parse(raw) {
            Ok(line) => self.dispatch(line),
            Err(err) => tracing::warn!(%err, raw, "malformed line dropped"),
        }
    }

    /// Decode one inbound line with the configured encoding, then
    /// process it.
    pub fn feed_bytes(&mut self, raw: &[u8]) {
        self.last_inbound = Some(Instant::now());
        self.ping_sent_at = None;
        match Line::from_bytes(raw, self.config.encoding) {
            Ok(line) => self.dispatch(line),
            Err(err) => tracing::warn!(%err, "malformed line dropped"),
        }
    }

    fn dispatch(&mut self, line: Line) {
        let command = line.command.to_ascii_uppercase();
        if let Ok(numeric) = command.parse::<Response>() {
            self.handle_numeric(numeric, &line);
            return;
        }
        if command.bytes().all(|b| b.is_ascii_digit()) {
            tracing::debug!(%command, "unhandled numeric");
            return;
        }
        match command.as_str() {
            "PING" => {
                let payload = line.params.last().cloned().unwrap_or_default();
                self.push_line(Line::cmd("PONG", [payload]));
            }
            "PONG" => {}
            "CAP" => self.handle_cap(&line),
            "AUTHENTICATE" => self.handle_authenticate(&line),
            "ERROR" => {
                if self.disconnect_reason.is_none() {
                    self.disconnect_reason = Some(DisconnectReason::ServerQuit);
                }
                self.set_state(ClientState::Disconnecting);
            }
            "JOIN" => self.handle_join(&line),
            "PART" => self.handle_part(&line),
            "KICK" => self.handle_kick(&line),
            "QUIT" => self.handle_quit(&line),
            "NICK" => self.handle_nick(&line),
            "MODE" => self.handle_mode(&line),
            "TOPIC" => self.handle_topic(&line),
            "AWAY" => self.handle_away_notify(&line),
            "ACCOUNT" => self.handle_account(&line),
            "CHGHOST" => self.handle_chghost(&line),
            "PRIVMSG" | "NOTICE" | "TAGMSG" => self.handle_message(&command, &line),
            other => tracing::debug!(command = other, "unhandled command"),
        }
    }

    fn handle_numeric(&mut self, numeric: Response, line: &Line) {
        use Response::*;
        match numeric {
            RPL_WELCOME => self.handle_welcome(line),
            RPL_MYINFO => self.handle_myinfo(line),
            RPL_ISUPPORT => self.handle_isupport(line),
            RPL_ENDOFMOTD | ERR_NOMOTD => self.set_state(ClientState::Online),
            ERR_NONICKNAMEGIVEN | ERR_ERRONEUSNICKNAME | ERR_NICKNAMEINUSE => {
                self.handle_nick_error(line)
            }
            RPL_UMODEIS => self.handle_umodeis(line),
            RPL_AWAY => self.handle_away_reply(line),
            RPL_UNAWAY => {
                self.set_self_away(false, None);
                self.push_event(Event::AwayCancelled);
            }
            RPL_NOWAWAY => {
                self.set_self_away(true, None);
                self.push_event(Event::AwaySet);
            }
            RPL_ISON => tracing::debug!("ISON reply ignored"),
            RPL_WHOISUSER => self.handle_whois_user(line),
            RPL_WHOISOPERATOR => self.handle_whois_operator(line),
            RPL_WHOISREGNICK => self.handle_whois_regnick(line),
            RPL_WHOISACCOUNT => self.handle_whois_account(line),
            RPL_WHOISCHANNELS => self.handle_whois_channels(line),
            RPL_ENDOFWHOIS => self.handle_whois_end(line),
            RPL_CHANNELMODEIS => self.handle_channelmodeis(line),
            RPL_CREATIONTIME => self.handle_creationtime(line),
            RPL_NOTOPIC => self.handle_notopic(line),
            RPL_TOPIC => self.handle_topic_reply(line),
            RPL_TOPICWHOTIME => self.handle_topicwhotime(line),
            RPL_WHOREPLY => self.handle_who_reply(line),
            RPL_NAMREPLY => self.handle_namreply(line),
            RPL_ENDOFNAMES => self.handle_endofnames(line),
            RPL_STARTTLS => self.handle_starttls_ok(),
            ERR_STARTTLS => self.handle_starttls_failed(),
            RPL_MONONLINE => self.handle_mononline(line),
            RPL_MONOFFLINE => self.handle_monoffline(line),
            RPL_MONLIST | RPL_ENDOFMONLIST => {}
            ERR_MONLISTFULL => tracing::warn!("monitor list full"),
            RPL_LOGON | RPL_NOWON => self.handle_watch_online(line, false),
            RPL_NOWISAWAY => self.handle_watch_online(line, true),
            RPL_LOGOFF | RPL_NOWOFF => self.handle_watch_offline(line),
            RPL_WATCHOFF => self.handle_watch_removed(line),
            RPL_ENDOFWATCHLIST => self.handle_endofwatchlist(),
            RPL_GONEAWAY => self.handle_watch_away(line, true),
            RPL_NOTAWAY => self.handle_watch_away(line, false),
            RPL_LOGGEDIN => self.handle_loggedin(line),
            RPL_LOGGEDOUT => self.handle_loggedout(line),
            RPL_SASLSUCCESS => self.handle_sasl_success(),
            ERR_NICKLOCKED | ERR_SASLFAIL | ERR_SASLTOOLONG | ERR_SASLABORTED
            | ERR_SASLALREADY => self.handle_sasl_failure(line),
            RPL_SASLMECHS => {
                if let Some(list) = line.param(1) {
                    self.sasl.set_shared(list);
                }
            }
        }
    }

    // --- output ---

    /// Enqueue an outbound line. Rejects embedded line terminators.
    pub fn send(&mut self, line: Line) -> Result<()> {
        let rendered = line.to_string();
        if rendered.contains('\r') || rendered.contains('\n') {
            return Err(ProtocolError::EmbeddedNewline(rendered));
        }
        self.push_line(line);
        Ok(())
    }

    /// Send a message, splitting to fit the line byte budget.
    pub fn send_privmsg(&mut self, target: &str, text: &str) {
        self.send_split("PRIVMSG", target, text);
    }

    /// Send a notice, splitting to fit the line byte budget.
    pub fn send_notice(&mut self, target: &str, text: &str) {
        self.send_split("NOTICE", target, text);
    }

    fn send_split(&mut self, command: &str, target: &str, text: &str) {
        let budget = self.message_budget(command, target);
        for chunk in split_text(text, budget, self.config.encoding) {
            self.push_line(Line::cmd(command, [target, chunk.as_str()]));
        }
    }

    /// Bytes left for a message body: 512 minus CRLF, the command
    /// envelope, and the source prefix the server will prepend when
    /// relaying.
    fn message_budget(&self, command: &str, target: &str) -> usize {
        let own_prefix = self
            .store
            .user_id(&self.nickname)
            .and_then(|id| self.store.user(id))
            .map(|user| user.hostmask().len())
            .unwrap_or(self.nickname.len() + 2);
        let overhead = 1 + own_prefix + 1 + command.len() + 1 + target.len() + 2 + 2;
        510usize.saturating_sub(overhead).max(1)
    }

    /// Drain queued outbound lines, in send order.
    pub fn take_outbound(&mut self) -> Vec<Line> {
        self.outbound.drain(..).collect()
    }

    /// Drain queued events, in emission order.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    // --- keepalive ---

    /// Drive the ping keepalive. After `ping_timeout` seconds of
    /// inbound silence a `PING` goes out; a further silent interval
    /// disconnects with `Ping timeout`.
    pub fn tick(&mut self, now: Instant) {
        if self.config.ping_timeout == 0 {
            return;
        }
        if !matches!(
            self.state,
            ClientState::CapabilityNegotiating
                | ClientState::Registering
                | ClientState::ReceivingServerInfo
                | ClientState::Online
        ) {
            return;
        }
        let timeout = std::time::Duration::from_secs(self.config.ping_timeout);
        if let Some(sent) = self.ping_sent_at {
            if now.saturating_duration_since(sent) >= timeout {
                self.fatal_quit(DisconnectReason::PingTimeout, QUIT_PING_TIMEOUT);
            }
            return;
        }
        let Some(last) = self.last_inbound else { return };
        if now.saturating_duration_since(last) >= timeout {
            let token = self
                .server_name
                .clone()
                .unwrap_or_else(|| "keepalive".to_owned());
            self.push_line(Line::cmd("PING", [token]));
            self.ping_sent_at = Some(now);
        }
    }

    // --- internals shared across handler modules ---

    pub(crate) fn push_line(&mut self, line: Line) {
        self.outbound.push_back(line);
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub(crate) fn set_state(&mut self, new: ClientState) {
        if self.state != new {
            let old = self.state;
            self.state = new;
            self.push_event(Event::StateChanged { old, new });
        }
    }

    pub(crate) fn is_self(&self, nick: &str) -> bool {
        self.isupport.case_mapping().eq(nick, &self.nickname)
    }

    pub(crate) fn sasl_context(&self) -> SaslContext {
        SaslContext {
            tls_active: self.tls_active,
            allow_plaintext: self.config.allow_sasl_without_tls,
            username: self.config.sasl_username.clone(),
            password: self.config.sasl_password.clone(),
        }
    }

    /// Mark a user visible, raising UserAppeared on the transition.
    pub(crate) fn observe_user(&mut self, nick: &str) -> UserId {
        let id = self.store.ensure_user(nick);
        let newly_seen = self
            .store
            .user_mut(id)
            .map(|user| {
                let was = user.seen;
                user.seen = true;
                !was
            })
            .unwrap_or(false);
        if newly_seen {
            let nick = self
                .store
                .user(id)
                .map(|u| u.nickname.clone())
                .unwrap_or_else(|| nick.to_owned());
            self.push_event(Event::UserAppeared { nick });
        }
        id
    }

    /// Observe a user from a `nick!ident@host` source, updating the
    /// resolved parts.
    pub(crate) fn observe_source(&mut self, source: &str) -> UserId {
        let (nick, ident, host) = crate::line::split_hostmask(source);
        let id = self.observe_user(nick);
        if let Some(user) = self.store.user_mut(id) {
            if let Some(ident) = ident {
                user.ident = Some(ident.to_owned());
            }
            if let Some(host) = host {
                user.host = Some(host.to_owned());
            }
        }
        id
    }

    /// Apply the membership retention policy after a channel link
    /// was removed: monitored users remain; others are destroyed
    /// with UserDisappeared when that was their last link.
    pub(crate) fn apply_retention(&mut self, user: UserId) {
        if self.store.user_id(&self.nickname) == Some(user) {
            return;
        }
        let Some(entry) = self.store.user(user) else { return };
        if !entry.channels.is_empty() || entry.monitored {
            return;
        }
        self.mark_unseen(user);
        self.store.release_user(user);
    }

    /// Flip a user to not-seen, raising UserDisappeared on the
    /// transition. The caller releases the user if warranted.
    pub(crate) fn mark_unseen(&mut self, user: UserId) {
        let Some(entry) = self.store.user_mut(user) else { return };
        if !entry.seen {
            return;
        }
        entry.seen = false;
        let nick = entry.nickname.clone();
        self.push_event(Event::UserDisappeared { nick });
    }

    pub(crate) fn set_self_away(&mut self, away: bool, reason: Option<String>) {
        let nickname = self.nickname.clone();
        let id = self.store.ensure_user(&nickname);
        if let Some(user) = self.store.user_mut(id) {
            user.seen = true;
            user.away = away;
            user.away_reason = if away { reason } else { None };
            user.away_since = away.then(chrono::Utc::now);
        }
    }

    pub(crate) fn apply_isupport_effect(&mut self, effect: IsupportEffect) {
        match effect {
            IsupportEffect::CaseMappingChanged(mapping) => {
                if let Err(err) = self.store.rekey(mapping) {
                    tracing::error!(%err, "aborting on case-mapping collision");
                    self.fatal_quit(DisconnectReason::Exception, QUIT_CASEMAPPING);
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.local.bound.store(false, AtomicOrdering::SeqCst);
    }
}
