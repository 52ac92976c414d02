//! # irc-session
//!
//! A sans-IO IRC client session core. The crate tracks one server
//! session — users, channels, modes, capabilities, and
//! authentication — under the server-negotiated grammar (case
//! mapping, mode taxonomy, status prefixes, ISUPPORT limits), and
//! turns inbound protocol lines into state mutations, outbound
//! lines, and typed events.
//!
//! ## Features
//!
//! - Wire line parsing and serialization with IRCv3 message tags
//! - Runtime-negotiated case mapping with index re-keying
//! - CAP LS/ACK/NAK/NEW/DEL negotiation, STARTTLS, multi-mechanism
//!   SASL with 400-byte chunking
//! - Converging presence via NAMES/JOIN/PART/QUIT/KICK, WHO,
//!   MONITOR, legacy WATCH, away-notify and account-notify
//! - No sockets, threads, or timers: the embedding transport feeds
//!   lines in and drains lines and events out
//!
//! ## Quick start
//!
//! ```rust
//! use irc_session::{Config, LocalUser, Session};
//!
//! let user = LocalUser::new("alice", "alice", "Alice");
//! let mut session = Session::new(user, None, Config::default()).unwrap();
//!
//! session.connect();
//! session.on_connected(false);
//! // Outbound now holds CAP LS 302; hand it to the transport.
//! for line in session.take_outbound() {
//!     println!("{}", line);
//! }
//!
//! session.feed_line(":irc.example.net 001 alice :Welcome");
//! for event in session.take_events() {
//!     println!("{:?}", event);
//! }
//! ```

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod caps;
pub mod casemap;
pub mod error;
pub mod event;
pub mod isupport;
pub mod line;
pub mod modes;
pub mod response;
pub mod sasl;
pub mod session;
pub mod store;
pub mod util;

pub use self::caps::{CapRegistry, Capability};
pub use self::casemap::CaseMapping;
pub use self::error::{LineParseError, ProtocolError, Result};
pub use self::event::{Event, NamesTask};
pub use self::isupport::{Isupport, IsupportEffect};
pub use self::line::{split_hostmask, Line};
pub use self::modes::{
    format_changes, ChannelModes, ChannelStatus, ModeBag, ModeChange, ModeKind,
};
pub use self::response::Response;
pub use self::sasl::{Authenticator, SaslAttempt, SaslContext, SaslMechanism};
pub use self::session::{
    ClientState, Config, DisconnectReason, LocalUser, SaslMode, Session, TlsMode,
};
pub use self::store::{Channel, ChannelId, Gender, Membership, Store, User, UserId};
pub use self::util::split_text;
