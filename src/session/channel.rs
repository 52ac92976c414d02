//! Channel and membership handlers: JOIN/PART/KICK/QUIT/NICK,
//! MODE, TOPIC, NAMES, WHO, and the WHOIS family.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::event::{Event, NamesTask};
use crate::line::{split_hostmask, Line};
use crate::modes::{
    apply_flag_run, format_changes, parse_mode_params, ChannelStatus, ModeKind,
};
use crate::store::UserId;

use super::{ClientState, DisconnectReason, Session};

/// Timestamp for a state change: the `time` tag when the server
/// provides one, the session clock otherwise.
fn line_time(line: &Line) -> DateTime<Utc> {
    line.tags
        .get("time")
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn unix_time(value: &str) -> Option<DateTime<Utc>> {
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

impl Session {
    pub(super) fn handle_join(&mut self, line: &Line) {
        let Some(source) = line.source.clone() else { return };
        let Some(channel_name) = line.param(0).map(str::to_owned) else {
            return;
        };
        let nick = split_hostmask(&source).0.to_owned();
        let user_id = self.observe_source(&source);

        // extended-join carries account and realname.
        let account = line
            .param(1)
            .filter(|a| *a != "*")
            .map(str::to_owned);
        if line.param(1).is_some() {
            if let Some(user) = self.store.user_mut(user_id) {
                user.account = account.clone();
            }
        }
        if let Some(realname) = line.param(2) {
            let realname = realname.to_owned();
            if let Some(user) = self.store.user_mut(user_id) {
                user.set_full_name(&realname);
            }
        }

        let is_self = self.is_self(&nick);
        let channel_id = self.store.ensure_channel(&channel_name);
        self.store.join(channel_id, user_id, ChannelStatus::empty());

        let names = if is_self {
            let (tx, task) = NamesTask::pair();
            self.names_tasks.insert(channel_id, tx);
            self.names_buf.remove(&channel_id);
            Some(task)
        } else {
            None
        };
        self.push_event(Event::ChannelJoin {
            channel: channel_name,
            nick,
            account,
            names,
        });
    }

    pub(super) fn handle_part(&mut self, line: &Line) {
        let Some(nick) = line.source_nick().map(str::to_owned) else {
            return;
        };
        let Some(channel_name) = line.param(0).map(str::to_owned) else {
            return;
        };
        let message = line.param(1).map(str::to_owned);
        let Some(channel_id) = self.store.channel_id(&channel_name) else {
            tracing::debug!(channel = %channel_name, "PART for unknown channel");
            return;
        };

        if self.is_self(&nick) {
            self.names_tasks.remove(&channel_id);
            self.names_buf.remove(&channel_id);
            let members = self.store.remove_channel(channel_id);
            self.push_event(Event::ChannelPart {
                channel: channel_name.clone(),
                nick: nick.clone(),
                message,
            });
            self.push_event(Event::ChannelLeave { channel: channel_name, nick });
            for member in members {
                self.apply_retention(member);
            }
        } else {
            let Some(user_id) = self.store.user_id(&nick) else { return };
            self.store.leave(channel_id, user_id);
            self.push_event(Event::ChannelPart {
                channel: channel_name.clone(),
                nick: nick.clone(),
                message,
            });
            self.push_event(Event::ChannelLeave { channel: channel_name, nick });
            self.apply_retention(user_id);
        }
    }

    pub(super) fn handle_kick(&mut self, line: &Line) {
        let by = line.source_nick().unwrap_or("").to_owned();
        let Some(channel_name) = line.param(0).map(str::to_owned) else {
            return;
        };
        let Some(target) = line.param(1).map(str::to_owned) else { return };
        let reason = line.param(2).map(str::to_owned);
        let Some(channel_id) = self.store.channel_id(&channel_name) else {
            return;
        };

        if self.is_self(&target) {
            self.names_tasks.remove(&channel_id);
            self.names_buf.remove(&channel_id);
            let members = self.store.remove_channel(channel_id);
            self.push_event(Event::ChannelKick {
                channel: channel_name.clone(),
                nick: target.clone(),
                by,
                reason,
            });
            self.push_event(Event::ChannelLeave { channel: channel_name, nick: target });
            for member in members {
                self.apply_retention(member);
            }
        } else {
            let Some(user_id) = self.store.user_id(&target) else { return };
            self.store.leave(channel_id, user_id);
            self.push_event(Event::ChannelKick {
                channel: channel_name.clone(),
                nick: target.clone(),
                by,
                reason,
            });
            self.push_event(Event::ChannelLeave { channel: channel_name, nick: target });
            self.apply_retention(user_id);
        }
    }

    pub(super) fn handle_quit(&mut self, line: &Line) {
        let Some(nick) = line.source_nick().map(str::to_owned) else {
            return;
        };
        let reason = line.param(0).unwrap_or("").to_owned();
        let Some(user_id) = self.store.user_id(&nick) else {
            tracing::debug!(%nick, "QUIT for unknown user");
            return;
        };

        if self.is_self(&nick) {
            if self.disconnect_reason.is_none() {
                self.disconnect_reason = Some(DisconnectReason::ClientQuit);
            }
            self.set_state(ClientState::Disconnecting);
            // Our own quit takes every channel down with it.
            let channel_ids: Vec<_> = self.store.channels().map(|(id, _)| id).collect();
            for channel_id in channel_ids {
                self.names_tasks.remove(&channel_id);
                self.names_buf.remove(&channel_id);
                for member in self.store.remove_channel(channel_id) {
                    self.apply_retention(member);
                }
            }
            self.push_event(Event::UserQuit { nick, reason });
            return;
        }

        let channels: Vec<_> = self
            .store
            .user(user_id)
            .map(|u| u.channels.values().copied().collect())
            .unwrap_or_default();
        for channel_id in channels {
            let channel_name = self
                .store
                .channel(channel_id)
                .map(|ch| ch.name.clone())
                .unwrap_or_default();
            self.store.leave(channel_id, user_id);
            self.push_event(Event::ChannelLeave {
                channel: channel_name,
                nick: nick.clone(),
            });
        }

        self.push_event(Event::UserQuit { nick, reason });
        self.mark_unseen(user_id);
        self.store.release_user(user_id);
    }

    pub(super) fn handle_nick(&mut self, line: &Line) {
        let Some(old) = line.source_nick().map(str::to_owned) else { return };
        let Some(new) = line.param(0).map(str::to_owned) else { return };
        let Some(user_id) = self.store.user_id(&old) else {
            tracing::debug!(%old, "NICK for unknown user");
            return;
        };
        if let Err(err) = self.store.rename_user(user_id, &new) {
            // Servers do not legally rename onto a live nickname;
            // drop the rename rather than corrupt the indexes.
            tracing::warn!(%err, %old, %new, "NICK collision ignored");
            return;
        }
        let is_self = self.is_self(&old);
        if is_self {
            self.nickname = new.clone();
        }
        self.push_event(Event::NicknameChange { old, new, is_self });
    }

    pub(super) fn handle_mode(&mut self, line: &Line) {
        let Some(target) = line.param(0).map(str::to_owned) else { return };
        if self.isupport.is_channel_name(&target) {
            self.apply_channel_mode(&target, line);
        } else if self.is_self(&target) {
            let Some(run) = line.param(1) else { return };
            apply_flag_run(&mut self.user_modes, run);
            self.push_event(Event::UserModesSet { modes: run.to_owned() });
        } else {
            tracing::debug!(%target, "MODE for another user ignored");
        }
    }

    fn apply_channel_mode(&mut self, target: &str, line: &Line) {
        let Some(channel_id) = self.store.channel_id(target) else {
            tracing::debug!(channel = %target, "MODE for unknown channel");
            return;
        };
        let table = self.isupport.chan_modes().clone();
        let params: Vec<&str> = line.params[1..].iter().map(String::as_str).collect();
        let changes = parse_mode_params(&table, &params);

        for change in &changes {
            match table.kind(change.mode) {
                ModeKind::Status => {
                    let Some(nick) = change.param.as_deref() else { continue };
                    let key = self.store.key(nick);
                    let Some(channel) = self.store.channel_mut(channel_id) else {
                        continue;
                    };
                    match channel.member_mut(&key) {
                        Some(membership) => {
                            if change.add {
                                membership.status.insert(change.mode, &table);
                            } else {
                                membership.status.remove(change.mode);
                            }
                        }
                        None => {
                            tracing::debug!(%nick, "status mode for absent member")
                        }
                    }
                }
                kind => {
                    if let Some(channel) = self.store.channel_mut(channel_id) {
                        channel.modes.apply(change, kind);
                    }
                }
            }
        }

        let by = line.source_nick().unwrap_or("").to_owned();
        tracing::debug!(channel = %target, changes = %format_changes(&changes), "modes applied");
        self.push_event(Event::ChannelModesSet {
            channel: target.to_owned(),
            by,
            changes,
        });
    }

    // --- topic ---

    pub(super) fn handle_topic(&mut self, line: &Line) {
        let Some(channel_name) = line.param(0).map(str::to_owned) else {
            return;
        };
        let Some(channel_id) = self.store.channel_id(&channel_name) else {
            tracing::debug!(channel = %channel_name, "TOPIC for unknown channel");
            return;
        };
        let text = line.param(1).unwrap_or("");
        let setter = line.source.clone();
        let by = line.source_nick().unwrap_or("").to_owned();
        let stamp = line_time(line);

        let Some(channel) = self.store.channel_mut(channel_id) else { return };
        let old_topic = channel.topic.take();
        let old_setter = channel.topic_setter.take();
        let old_stamp = channel.topic_stamp.take();
        channel.topic = (!text.is_empty()).then(|| text.to_owned());
        channel.topic_setter = setter;
        channel.topic_stamp = Some(stamp);

        self.push_event(Event::ChannelTopicChanged {
            channel: channel_name,
            by,
            old_topic,
            old_setter,
            old_stamp,
        });
    }

    pub(super) fn handle_notopic(&mut self, line: &Line) {
        let Some(channel_id) = line.param(1).and_then(|c| self.store.channel_id(c)) else {
            return;
        };
        if let Some(channel) = self.store.channel_mut(channel_id) {
            channel.topic = None;
            channel.topic_setter = None;
            channel.topic_stamp = None;
        }
    }

    pub(super) fn handle_topic_reply(&mut self, line: &Line) {
        let Some(channel_id) = line.param(1).and_then(|c| self.store.channel_id(c)) else {
            return;
        };
        let topic = line.param(2).unwrap_or("").to_owned();
        if let Some(channel) = self.store.channel_mut(channel_id) {
            channel.topic = (!topic.is_empty()).then_some(topic);
        }
    }

    pub(super) fn handle_topicwhotime(&mut self, line: &Line) {
        let Some(channel_id) = line.param(1).and_then(|c| self.store.channel_id(c)) else {
            return;
        };
        let setter = line.param(2).map(str::to_owned);
        let stamp = line.param(3).and_then(unix_time);
        if let Some(channel) = self.store.channel_mut(channel_id) {
            channel.topic_setter = setter;
            channel.topic_stamp = stamp;
        }
    }

    // --- channel info numerics ---

    pub(super) fn handle_channelmodeis(&mut self, line: &Line) {
        let Some(channel_id) = line.param(1).and_then(|c| self.store.channel_id(c)) else {
            return;
        };
        let table = self.isupport.chan_modes().clone();
        let params: Vec<&str> = line.params[2..].iter().map(String::as_str).collect();
        let changes = parse_mode_params(&table, &params);
        if let Some(channel) = self.store.channel_mut(channel_id) {
            channel.modes.clear();
            for change in &changes {
                channel.modes.apply(change, table.kind(change.mode));
            }
        }
    }

    pub(super) fn handle_creationtime(&mut self, line: &Line) {
        let Some(channel_id) = line.param(1).and_then(|c| self.store.channel_id(c)) else {
            return;
        };
        let created = line.param(2).and_then(unix_time);
        if let Some(channel) = self.store.channel_mut(channel_id) {
            channel.created = created;
        }
    }

    // --- NAMES ---

    pub(super) fn handle_namreply(&mut self, line: &Line) {
        // Params: target, visibility symbol, channel, entries.
        let Some(channel_id) = line.param(2).and_then(|c| self.store.channel_id(c)) else {
            tracing::debug!("NAMES for unknown channel dropped");
            return;
        };
        let Some(entries) = line.param(3) else { return };
        self.names_buf
            .entry(channel_id)
            .or_default()
            .push(entries.to_owned());
    }

    pub(super) fn handle_endofnames(&mut self, line: &Line) {
        let Some(channel_id) = line.param(1).and_then(|c| self.store.channel_id(c)) else {
            return;
        };
        let batches = self.names_buf.remove(&channel_id).unwrap_or_default();
        let table = self.isupport.chan_modes().clone();
        let prefixes = self.isupport.status_prefixes().to_vec();

        let mut listed = HashSet::new();
        for batch in &batches {
            for entry in batch.split_whitespace() {
                let (status, consumed) =
                    ChannelStatus::from_prefixes(entry, &prefixes, &table);
                let rest = &entry[consumed..];
                let (nick, ident, host) = split_hostmask(rest);
                if nick.is_empty() {
                    continue;
                }
                let user_id = self.observe_user(nick);
                if let Some(user) = self.store.user_mut(user_id) {
                    if let Some(ident) = ident {
                        user.ident = Some(ident.to_owned());
                    }
                    if let Some(host) = host {
                        user.host = Some(host.to_owned());
                    }
                }
                self.store.join(channel_id, user_id, status);
                listed.insert(self.store.key(nick));
            }
        }

        // A NAMES batch replaces the previous view: members absent
        // from it have left.
        let stale: Vec<UserId> = self
            .store
            .channel(channel_id)
            .map(|channel| {
                channel
                    .members()
                    .filter(|(key, _)| !listed.contains(*key))
                    .map(|(_, membership)| membership.user)
                    .collect()
            })
            .unwrap_or_default();
        for user_id in stale {
            self.store.leave(channel_id, user_id);
            self.apply_retention(user_id);
        }

        if let Some(tx) = self.names_tasks.remove(&channel_id) {
            let _ = tx.send(Ok(()));
        }
    }

    // --- WHO / WHOIS ---

    pub(super) fn handle_who_reply(&mut self, line: &Line) {
        // Params: target, channel, ident, host, server, nick, flags,
        // "hopcount realname".
        let Some(nick) = line.param(5).map(str::to_owned) else { return };
        let user_id = self.observe_user(&nick);
        if let Some(user) = self.store.user_mut(user_id) {
            if let Some(ident) = line.param(2) {
                user.ident = Some(ident.to_owned());
            }
            if let Some(host) = line.param(3) {
                user.host = Some(host.to_owned());
            }
        }
        if let Some(trailing) = line.param(7) {
            if let Some((_, realname)) = trailing.split_once(' ') {
                let realname = realname.to_owned();
                if let Some(user) = self.store.user_mut(user_id) {
                    user.set_full_name(&realname);
                }
            }
        }

        let table = self.isupport.chan_modes().clone();
        let mut status = ChannelStatus::empty();
        if let Some(flags) = line.param(6) {
            for c in flags.chars() {
                match c {
                    'H' => {
                        if let Some(user) = self.store.user_mut(user_id) {
                            user.away = false;
                            user.away_reason = None;
                        }
                    }
                    'G' => {
                        if let Some(user) = self.store.user_mut(user_id) {
                            user.away = true;
                        }
                    }
                    '*' => {
                        if let Some(user) = self.store.user_mut(user_id) {
                            user.is_oper = true;
                        }
                    }
                    c => {
                        if let Some(mode) = self.isupport.mode_for_prefix(c) {
                            status.insert(mode, &table);
                        }
                    }
                }
            }
        }

        if let Some(channel_id) = line
            .param(1)
            .filter(|c| *c != "*")
            .and_then(|c| self.store.channel_id(c))
        {
            let key = self.store.key(&nick);
            if let Some(channel) = self.store.channel_mut(channel_id) {
                if let Some(membership) = channel.member_mut(&key) {
                    membership.status = status;
                }
            }
        }
    }

    pub(super) fn handle_whois_user(&mut self, line: &Line) {
        let Some(nick) = line.param(1).map(str::to_owned) else { return };
        let user_id = self.observe_user(&nick);
        if let Some(user) = self.store.user_mut(user_id) {
            if let Some(ident) = line.param(2) {
                user.ident = Some(ident.to_owned());
            }
            if let Some(host) = line.param(3) {
                user.host = Some(host.to_owned());
            }
        }
        if let Some(realname) = line.param(5).map(str::to_owned) {
            if let Some(user) = self.store.user_mut(user_id) {
                user.set_full_name(&realname);
            }
        }
        // Fresh WHOIS: the account numerics race below starts over.
        self.whois_account_pinned.remove(&user_id);
    }

    pub(super) fn handle_whois_operator(&mut self, line: &Line) {
        if let Some(user_id) = line.param(1).and_then(|n| self.store.user_id(n)) {
            if let Some(user) = self.store.user_mut(user_id) {
                user.is_oper = true;
            }
        }
    }

    /// RPL_WHOISACCOUNT wins over RPL_WHOISREGNICK regardless of
    /// arrival order within one WHOIS.
    pub(super) fn handle_whois_account(&mut self, line: &Line) {
        let Some(user_id) = line.param(1).and_then(|n| self.store.user_id(n)) else {
            return;
        };
        let account = line.param(2).map(str::to_owned);
        if let Some(user) = self.store.user_mut(user_id) {
            user.account = account;
        }
        self.whois_account_pinned.insert(user_id);
    }

    pub(super) fn handle_whois_regnick(&mut self, line: &Line) {
        let Some(nick) = line.param(1).map(str::to_owned) else { return };
        let Some(user_id) = self.store.user_id(&nick) else { return };
        if self.whois_account_pinned.contains(&user_id) {
            return;
        }
        if let Some(user) = self.store.user_mut(user_id) {
            user.account = Some(nick);
        }
    }

    pub(super) fn handle_whois_channels(&mut self, line: &Line) {
        let Some(user_id) = line.param(1).and_then(|n| self.store.user_id(n)) else {
            return;
        };
        let Some(entries) = line.param(2).map(str::to_owned) else { return };
        let table = self.isupport.chan_modes().clone();
        let prefixes = self.isupport.status_prefixes().to_vec();
        for entry in entries.split_whitespace() {
            let (status, consumed) = ChannelStatus::from_prefixes(entry, &prefixes, &table);
            let name = &entry[consumed..];
            // Channels this session is not in are not registered.
            let Some(channel_id) = self.store.channel_id(name) else { continue };
            let key = match self.store.user(user_id) {
                Some(user) => self.store.key(&user.nickname),
                None => continue,
            };
            if let Some(channel) = self.store.channel_mut(channel_id) {
                if let Some(membership) = channel.member_mut(&key) {
                    membership.status = status;
                }
            }
        }
    }

    pub(super) fn handle_whois_end(&mut self, line: &Line) {
        if let Some(user_id) = line.param(1).and_then(|n| self.store.user_id(n)) {
            self.whois_account_pinned.remove(&user_id);
        }
    }

    // --- away / account / host ---

    pub(super) fn handle_away_reply(&mut self, line: &Line) {
        let Some(nick) = line.param(1).map(str::to_owned) else { return };
        let reason = line.param(2).unwrap_or("").to_owned();
        let user_id = self.observe_user(&nick);
        if let Some(user) = self.store.user_mut(user_id) {
            user.away = true;
            user.away_reason = Some(reason.clone());
            user.away_since = Some(Utc::now());
        }
        self.push_event(Event::AwayMessage { nick, reason });
    }

    /// away-notify AWAY from another user; no event, state only.
    pub(super) fn handle_away_notify(&mut self, line: &Line) {
        let Some(source) = line.source.clone() else { return };
        let user_id = self.observe_source(&source);
        let reason = line.param(0).map(str::to_owned);
        if let Some(user) = self.store.user_mut(user_id) {
            match reason {
                Some(reason) => {
                    user.away = true;
                    user.away_reason = Some(reason);
                    user.away_since = Some(Utc::now());
                }
                None => {
                    user.away = false;
                    user.away_reason = None;
                    user.away_since = None;
                }
            }
        }
    }

    pub(super) fn handle_account(&mut self, line: &Line) {
        let Some(source) = line.source.clone() else { return };
        let user_id = self.observe_source(&source);
        let account = line.param(0).filter(|a| *a != "*").map(str::to_owned);
        if let Some(user) = self.store.user_mut(user_id) {
            user.account = account;
        }
    }

    pub(super) fn handle_chghost(&mut self, line: &Line) {
        let Some(source) = line.source.clone() else { return };
        let user_id = self.observe_source(&source);
        let ident = line.param(0).map(str::to_owned);
        let host = line.param(1).map(str::to_owned);
        if let Some(user) = self.store.user_mut(user_id) {
            if let Some(ident) = ident {
                user.ident = Some(ident);
            }
            if let Some(host) = host {
                user.host = Some(host);
            }
        }
    }
}
