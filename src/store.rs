//! The session entity store: users, channels, memberships.
//!
//! Channel⇔Membership⇔User form a cycle, so entities live in two
//! arenas addressed by opaque ids; memberships and back-references
//! hold ids plus case-mapped keys rather than owning references.
//! Every index key is the [`CaseMapping`]-folded form of the name,
//! and the whole store can re-key when the server changes the
//! mapping mid-session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::casemap::CaseMapping;
use crate::error::ProtocolError;
use crate::modes::{ChannelStatus, ModeBag};

/// Opaque handle to a tracked user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(u32);

/// Opaque handle to a tracked channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(u32);

/// Heuristic classification derived from the user's names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Gender {
    /// Nothing could be inferred.
    #[default]
    Unspecified,
    /// The nickname or realname marks an automaton.
    Bot,
}

fn derive_gender(nickname: &str, full_name: Option<&str>) -> Gender {
    let marked = |s: &str| {
        let lower = s.to_ascii_lowercase();
        lower.ends_with("bot") || lower.starts_with("bot")
    };
    if marked(nickname) || full_name.is_some_and(marked) {
        Gender::Bot
    } else {
        Gender::Unspecified
    }
}

/// One user visible on the session.
#[derive(Clone, Debug)]
pub struct User {
    /// Current nickname; the mutable identity key.
    pub nickname: String,
    /// Ident (username), once resolved.
    pub ident: Option<String>,
    /// Hostname, once resolved.
    pub host: Option<String>,
    /// Realname / GECOS.
    pub full_name: Option<String>,
    /// Services account, `None` when logged out or unknown.
    pub account: Option<String>,
    /// Away state.
    pub away: bool,
    /// Away reason, when known.
    pub away_reason: Option<String>,
    /// When the away state was observed.
    pub away_since: Option<DateTime<Utc>>,
    /// Whether the user is an IRC operator.
    pub is_oper: bool,
    /// Derived heuristic classification.
    pub gender: Gender,
    /// Whether the user is currently visible to this session.
    pub seen: bool,
    /// Whether a MONITOR/WATCH subscription covers this user.
    pub monitored: bool,
    /// Folded channel name → channel id for every membership.
    pub channels: HashMap<String, ChannelId>,
}

impl User {
    fn new(nickname: &str) -> Self {
        User {
            nickname: nickname.to_owned(),
            ident: None,
            host: None,
            full_name: None,
            account: None,
            away: false,
            away_reason: None,
            away_since: None,
            is_oper: false,
            gender: derive_gender(nickname, None),
            seen: false,
            monitored: false,
            channels: HashMap::new(),
        }
    }

    /// Update the realname and refresh the derived classification.
    pub fn set_full_name(&mut self, full_name: &str) {
        self.full_name = Some(full_name.to_owned());
        self.gender = derive_gender(&self.nickname, self.full_name.as_deref());
    }

    /// Whether this entry denotes the server rather than a person:
    /// no `!`/`@` in the name, and it either matches the session's
    /// server name or is unresolved (no ident, no host).
    pub fn is_server(&self, server_name: Option<&str>, mapping: CaseMapping) -> bool {
        if self.nickname.contains('!') || self.nickname.contains('@') {
            return false;
        }
        let matches_server =
            server_name.is_some_and(|name| mapping.eq(&self.nickname, name));
        matches_server || (self.ident.is_none() && self.host.is_none())
    }

    /// `nick!ident@host`, with `*` filling unresolved parts.
    pub fn hostmask(&self) -> String {
        format!(
            "{}!{}@{}",
            self.nickname,
            self.ident.as_deref().unwrap_or("*"),
            self.host.as_deref().unwrap_or("*")
        )
    }
}

/// Per-channel membership record.
#[derive(Clone, Debug)]
pub struct Membership {
    /// The member.
    pub user: UserId,
    /// Status modes held on this channel.
    pub status: ChannelStatus,
}

/// One channel the session is on (or observing).
#[derive(Clone, Debug)]
pub struct Channel {
    /// Channel name as first observed.
    pub name: String,
    /// Current topic.
    pub topic: Option<String>,
    /// Who set the topic.
    pub topic_setter: Option<String>,
    /// When the topic was set.
    pub topic_stamp: Option<DateTime<Utc>>,
    /// Channel creation time (RPL_CREATIONTIME).
    pub created: Option<DateTime<Utc>>,
    /// Current channel modes.
    pub modes: ModeBag,
    members: HashMap<String, Membership>,
    member_order: Vec<String>,
}

impl Channel {
    fn new(name: &str) -> Self {
        Channel {
            name: name.to_owned(),
            topic: None,
            topic_setter: None,
            topic_stamp: None,
            created: None,
            modes: ModeBag::default(),
            members: HashMap::new(),
            member_order: Vec::new(),
        }
    }

    /// Membership for a folded nickname key.
    pub fn member(&self, key: &str) -> Option<&Membership> {
        self.members.get(key)
    }

    /// Mutable membership for a folded nickname key.
    pub fn member_mut(&mut self, key: &str) -> Option<&mut Membership> {
        self.members.get_mut(key)
    }

    /// Memberships in join-observation order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Membership)> {
        self.member_order
            .iter()
            .filter_map(|key| self.members.get(key).map(|m| (key.as_str(), m)))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the member map is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn insert_member(&mut self, key: String, membership: Membership) {
        if self.members.insert(key.clone(), membership).is_none() {
            self.member_order.push(key);
        }
    }

    fn remove_member(&mut self, key: &str) -> Option<Membership> {
        let removed = self.members.remove(key);
        if removed.is_some() {
            self.member_order.retain(|k| k != key);
        }
        removed
    }
}

/// The arenas plus their case-mapped indexes.
#[derive(Clone, Debug, Default)]
pub struct Store {
    mapping: CaseMapping,
    users: HashMap<u32, User>,
    user_index: HashMap<String, UserId>,
    user_order: Vec<UserId>,
    next_user: u32,
    channels: HashMap<u32, Channel>,
    channel_index: HashMap<String, ChannelId>,
    next_channel: u32,
}

impl Store {
    /// A store keyed under `mapping`.
    pub fn new(mapping: CaseMapping) -> Self {
        Store { mapping, ..Store::default() }
    }

    /// The mapping the indexes are currently keyed under.
    pub fn mapping(&self) -> CaseMapping {
        self.mapping
    }

    /// The index key for a name.
    pub fn key(&self, name: &str) -> String {
        self.mapping.to_lower(name)
    }

    // --- users ---

    /// Look up a user by any equivalent nickname.
    pub fn user_id(&self, nickname: &str) -> Option<UserId> {
        self.user_index.get(&self.key(nickname)).copied()
    }

    /// The user behind an id. Ids handed out by this store are valid
    /// until the user is destroyed.
    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id.0)
    }

    /// Mutable access to a user.
    pub fn user_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.get_mut(&id.0)
    }

    /// Users in first-observation order.
    pub fn users(&self) -> impl Iterator<Item = (UserId, &User)> {
        self.user_order
            .iter()
            .filter_map(|id| self.users.get(&id.0).map(|u| (*id, u)))
    }

    /// Find or create the user for `nickname`. Creation leaves the
    /// visibility flags unset; callers mark `seen`/`monitored` per
    /// the observation that produced the user.
    pub fn ensure_user(&mut self, nickname: &str) -> UserId {
        if let Some(id) = self.user_id(nickname) {
            return id;
        }
        let id = UserId(self.next_user);
        self.next_user += 1;
        self.users.insert(id.0, User::new(nickname));
        self.user_index.insert(self.key(nickname), id);
        self.user_order.push(id);
        id
    }

    /// Drop a user that is neither seen nor monitored. Returns true
    /// when the user was destroyed.
    pub fn release_user(&mut self, id: UserId) -> bool {
        let destroy = match self.users.get(&id.0) {
            Some(user) => !user.seen && !user.monitored && user.channels.is_empty(),
            None => false,
        };
        if destroy {
            if let Some(user) = self.users.remove(&id.0) {
                self.user_index.remove(&self.mapping.to_lower(&user.nickname));
            }
            self.user_order.retain(|other| *other != id);
        }
        destroy
    }

    /// Relocate a user under a new nickname, updating the user index
    /// and every channel member map. Fails if the destination key is
    /// already taken by a different user; membership records keep
    /// their identity.
    pub fn rename_user(&mut self, id: UserId, new_nick: &str) -> Result<(), ProtocolError> {
        let old_key = match self.users.get(&id.0) {
            Some(user) => self.key(&user.nickname),
            None => return Ok(()),
        };
        let new_key = self.key(new_nick);
        if new_key != old_key {
            if let Some(existing) = self.user_index.get(&new_key) {
                if *existing != id {
                    return Err(ProtocolError::CaseMappingCollision(new_nick.to_owned()));
                }
            }
        }

        let channel_ids: Vec<ChannelId> = self
            .users
            .get(&id.0)
            .map(|u| u.channels.values().copied().collect())
            .unwrap_or_default();
        for channel_id in channel_ids {
            if let Some(channel) = self.channels.get_mut(&channel_id.0) {
                if let Some(membership) = channel.remove_member(&old_key) {
                    channel.insert_member(new_key.clone(), membership);
                }
            }
        }

        self.user_index.remove(&old_key);
        self.user_index.insert(new_key, id);
        if let Some(user) = self.users.get_mut(&id.0) {
            user.nickname = new_nick.to_owned();
            user.gender = derive_gender(new_nick, user.full_name.as_deref());
        }
        Ok(())
    }

    // --- channels ---

    /// Look up a channel by any equivalent name.
    pub fn channel_id(&self, name: &str) -> Option<ChannelId> {
        self.channel_index.get(&self.key(name)).copied()
    }

    /// The channel behind an id.
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id.0)
    }

    /// Mutable access to a channel.
    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id.0)
    }

    /// All tracked channels.
    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.channels.iter().map(|(id, ch)| (ChannelId(*id), ch))
    }

    /// Find or create a channel.
    pub fn ensure_channel(&mut self, name: &str) -> ChannelId {
        if let Some(id) = self.channel_id(name) {
            return id;
        }
        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channels.insert(id.0, Channel::new(name));
        self.channel_index.insert(self.key(name), id);
        id
    }

    /// Remove a channel, unlinking every member. Returns the former
    /// member ids so the caller can apply retention.
    pub fn remove_channel(&mut self, id: ChannelId) -> Vec<UserId> {
        let Some(channel) = self.channels.remove(&id.0) else {
            return Vec::new();
        };
        self.channel_index.remove(&self.mapping.to_lower(&channel.name));
        let mut members = Vec::new();
        for key in &channel.member_order {
            if let Some(membership) = channel.members.get(key) {
                if let Some(user) = self.users.get_mut(&membership.user.0) {
                    user.channels.retain(|_, ch| *ch != id);
                }
                members.push(membership.user);
            }
        }
        members
    }

    // --- memberships ---

    /// Bind `user` into `channel` with the given status. The user
    /// must be marked seen first (unseen users appear in no member
    /// map).
    pub fn join(&mut self, channel: ChannelId, user: UserId, status: ChannelStatus) {
        let Some(u) = self.users.get(&user.0) else { return };
        debug_assert!(u.seen, "membership for unseen user");
        let nick_key = self.key(&u.nickname.clone());
        let channel_key = match self.channels.get(&channel.0) {
            Some(ch) => self.key(&ch.name),
            None => return,
        };
        if let Some(ch) = self.channels.get_mut(&channel.0) {
            ch.insert_member(nick_key, Membership { user, status });
        }
        if let Some(u) = self.users.get_mut(&user.0) {
            u.channels.insert(channel_key, channel);
        }
    }

    /// Unbind `user` from `channel`. Returns true when a membership
    /// was actually removed.
    pub fn leave(&mut self, channel: ChannelId, user: UserId) -> bool {
        let Some(u) = self.users.get(&user.0) else { return false };
        let nick_key = self.key(&u.nickname);
        let channel_key = match self.channels.get(&channel.0) {
            Some(ch) => self.key(&ch.name),
            None => return false,
        };
        let removed = self
            .channels
            .get_mut(&channel.0)
            .and_then(|ch| ch.remove_member(&nick_key))
            .is_some();
        if removed {
            if let Some(u) = self.users.get_mut(&user.0) {
                u.channels.remove(&channel_key);
            }
        }
        removed
    }

    /// Membership of `user` on `channel`.
    pub fn membership(&self, channel: ChannelId, user: UserId) -> Option<&Membership> {
        let nick_key = self.key(&self.users.get(&user.0)?.nickname);
        self.channels.get(&channel.0)?.member(&nick_key)
    }

    /// Recompute every case-mapped key under a new mapping. On any
    /// key collision the store is left keyed as far as the scan got
    /// and the offending name is returned; the session must abort.
    pub fn rekey(&mut self, mapping: CaseMapping) -> Result<(), ProtocolError> {
        let mut user_index = HashMap::with_capacity(self.user_index.len());
        for (id, user) in &self.users {
            let key = mapping.to_lower(&user.nickname);
            if user_index.insert(key, UserId(*id)).is_some() {
                return Err(ProtocolError::CaseMappingCollision(user.nickname.clone()));
            }
        }

        let mut channel_index = HashMap::with_capacity(self.channel_index.len());
        for (id, channel) in &self.channels {
            let key = mapping.to_lower(&channel.name);
            if channel_index.insert(key, ChannelId(*id)).is_some() {
                return Err(ProtocolError::CaseMappingCollision(channel.name.clone()));
            }
        }

        for channel in self.channels.values_mut() {
            let mut members = HashMap::with_capacity(channel.members.len());
            let mut order = Vec::with_capacity(channel.member_order.len());
            for key in &channel.member_order {
                let Some(membership) = channel.members.get(key) else { continue };
                let nick = match self.users.get(&membership.user.0) {
                    Some(user) => &user.nickname,
                    None => continue,
                };
                let new_key = mapping.to_lower(nick);
                if members.insert(new_key.clone(), membership.clone()).is_some() {
                    return Err(ProtocolError::CaseMappingCollision(nick.clone()));
                }
                order.push(new_key);
            }
            channel.members = members;
            channel.member_order = order;
        }

        for user in self.users.values_mut() {
            let mut channels = HashMap::with_capacity(user.channels.len());
            for (_, channel_id) in user.channels.drain() {
                let name = match self.channels.get(&channel_id.0) {
                    Some(ch) => &ch.name,
                    None => continue,
                };
                channels.insert(mapping.to_lower(name), channel_id);
            }
            user.channels = channels;
        }

        self.user_index = user_index;
        self.channel_index = channel_index;
        self.mapping = mapping;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen_user(store: &mut Store, nick: &str) -> UserId {
        let id = store.ensure_user(nick);
        store.user_mut(id).unwrap().seen = true;
        id
    }

    #[test]
    fn lookup_is_case_mapped() {
        let mut store = Store::new(CaseMapping::Rfc1459);
        let id = store.ensure_user("Nick[1]");
        assert_eq!(store.user_id("nick{1}"), Some(id));
        assert_eq!(store.ensure_user("NICK[1]"), id);
    }

    #[test]
    fn membership_links_both_sides() {
        let mut store = Store::new(CaseMapping::Rfc1459);
        let bob = seen_user(&mut store, "Bob");
        let chan = store.ensure_channel("#w");
        store.join(chan, bob, ChannelStatus::empty());

        let channel = store.channel(chan).unwrap();
        let membership = channel.member("bob").unwrap();
        assert_eq!(membership.user, bob);
        assert_eq!(store.user(bob).unwrap().channels.get("#w"), Some(&chan));

        assert!(store.leave(chan, bob));
        assert!(store.channel(chan).unwrap().is_empty());
        assert!(store.user(bob).unwrap().channels.is_empty());
    }

    #[test]
    fn rename_relocates_everywhere() {
        let mut store = Store::new(CaseMapping::Rfc1459);
        let bob = seen_user(&mut store, "Bob");
        let chan = store.ensure_channel("#w");
        store.join(chan, bob, ChannelStatus::op());

        store.rename_user(bob, "Robert").unwrap();
        assert_eq!(store.user_id("robert"), Some(bob));
        assert!(store.user_id("bob").is_none());
        let membership = store.channel(chan).unwrap().member("robert").unwrap();
        assert_eq!(membership.status, ChannelStatus::op());
    }

    #[test]
    fn rename_to_occupied_key_fails() {
        let mut store = Store::new(CaseMapping::Rfc1459);
        let bob = seen_user(&mut store, "Bob");
        seen_user(&mut store, "Alice");
        assert!(store.rename_user(bob, "ALICE").is_err());
        // Case-change of one's own nick is fine.
        assert!(store.rename_user(bob, "BOB").is_ok());
        assert_eq!(store.user(bob).unwrap().nickname, "BOB");
    }

    #[test]
    fn release_user_requires_no_flags_or_links() {
        let mut store = Store::new(CaseMapping::Rfc1459);
        let bob = store.ensure_user("Bob");
        store.user_mut(bob).unwrap().monitored = true;
        assert!(!store.release_user(bob));
        store.user_mut(bob).unwrap().monitored = false;
        assert!(store.release_user(bob));
        assert!(store.user_id("bob").is_none());
    }

    #[test]
    fn rekey_preserves_lookups() {
        let mut store = Store::new(CaseMapping::Ascii);
        let bob = seen_user(&mut store, "[Bob]");
        let chan = store.ensure_channel("#[w]");
        store.join(chan, bob, ChannelStatus::empty());

        store.rekey(CaseMapping::Rfc1459).unwrap();
        assert_eq!(store.user_id("{bob}"), Some(bob));
        assert_eq!(store.channel_id("#{w}"), Some(chan));
        assert!(store.channel(chan).unwrap().member("{bob}").is_some());
        assert_eq!(
            store.user(bob).unwrap().channels.get("#{w}"),
            Some(&chan)
        );
    }

    #[test]
    fn rekey_collision_reports_name() {
        let mut store = Store::new(CaseMapping::Ascii);
        seen_user(&mut store, "[Bob]");
        seen_user(&mut store, "{Bob}");
        let err = store.rekey(CaseMapping::Rfc1459).unwrap_err();
        assert!(matches!(err, ProtocolError::CaseMappingCollision(_)));
    }

    #[test]
    fn users_iterate_in_observation_order() {
        let mut store = Store::new(CaseMapping::Rfc1459);
        seen_user(&mut store, "Zed");
        seen_user(&mut store, "Amy");
        let nicks: Vec<&str> = store.users().map(|(_, u)| u.nickname.as_str()).collect();
        assert_eq!(nicks, ["Zed", "Amy"]);
    }

    #[test]
    fn bot_heuristic() {
        let mut store = Store::new(CaseMapping::Rfc1459);
        let id = store.ensure_user("buildbot");
        assert_eq!(store.user(id).unwrap().gender, Gender::Bot);
        let id = store.ensure_user("Alice");
        assert_eq!(store.user(id).unwrap().gender, Gender::Unspecified);
    }

    #[test]
    fn server_detection() {
        let mut store = Store::new(CaseMapping::Rfc1459);
        let id = store.ensure_user("irc.example.net");
        let user = store.user(id).unwrap();
        assert!(user.is_server(Some("irc.example.net"), CaseMapping::Rfc1459));
        assert!(user.is_server(None, CaseMapping::Rfc1459));

        let id = store.ensure_user("Bob");
        store.user_mut(id).unwrap().ident = Some("bob".into());
        store.user_mut(id).unwrap().host = Some("host".into());
        assert!(!store.user(id).unwrap().is_server(Some("irc.example.net"), CaseMapping::Rfc1459));
    }
}
