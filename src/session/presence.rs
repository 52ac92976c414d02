//! Presence reconciliation: MONITOR and legacy WATCH.
//!
//! Both subscriptions converge on the same per-user flags. The
//! retention rule throughout: a tracked user who shares a channel
//! with this session stays seen on an offline notification (the
//! QUIT will arrive through the channel); one who does not is
//! synthetically quit.

use crate::event::Event;
use crate::line::{split_hostmask, Line};
use crate::store::UserId;

use super::Session;

impl Session {
    /// Subscribe to presence for `nicks`, preferring MONITOR over
    /// legacy WATCH.
    pub fn monitor_add(&mut self, nicks: &[&str]) {
        let fresh: Vec<&str> = nicks
            .iter()
            .copied()
            .filter(|nick| !self.monitor_contains(nick))
            .collect();
        if fresh.is_empty() {
            return;
        }
        if self.isupport.supports_watch() && !self.isupport.supports_monitor() {
            let args: Vec<String> = fresh.iter().map(|nick| format!("+{}", nick)).collect();
            self.push_line(Line::cmd("WATCH", args));
        } else {
            let list = fresh.join(",");
            self.push_line(Line::cmd("MONITOR", ["+", list.as_str()]));
        }
        for nick in fresh {
            self.monitor_list.push(nick.to_owned());
            if let Some(id) = self.store.user_id(nick) {
                if let Some(user) = self.store.user_mut(id) {
                    user.monitored = true;
                }
            }
        }
    }

    /// Drop presence subscriptions for `nicks`.
    pub fn monitor_remove(&mut self, nicks: &[&str]) {
        let tracked: Vec<String> = nicks
            .iter()
            .copied()
            .filter(|nick| self.monitor_contains(nick))
            .map(str::to_owned)
            .collect();
        if tracked.is_empty() {
            return;
        }
        if self.isupport.supports_watch() && !self.isupport.supports_monitor() {
            let args: Vec<String> = tracked.iter().map(|nick| format!("-{}", nick)).collect();
            self.push_line(Line::cmd("WATCH", args));
        } else {
            let list = tracked.join(",");
            self.push_line(Line::cmd("MONITOR", ["-", list.as_str()]));
        }
        let mapping = self.isupport.case_mapping();
        self.monitor_list
            .retain(|kept| !tracked.iter().any(|gone| mapping.eq(kept, gone)));
        for nick in tracked {
            if let Some(id) = self.store.user_id(&nick) {
                if let Some(user) = self.store.user_mut(id) {
                    user.monitored = false;
                }
                self.apply_retention(id);
            }
        }
    }

    fn monitor_contains(&self, nick: &str) -> bool {
        let mapping = self.isupport.case_mapping();
        self.monitor_list.iter().any(|kept| mapping.eq(kept, nick))
    }

    /// Shared online transition for MONITOR and WATCH entries.
    fn presence_online(&mut self, mask: &str, away: bool, from_watch: bool) {
        let (nick, ident, host) = split_hostmask(mask);
        if nick.is_empty() {
            return;
        }
        let nick = nick.to_owned();
        let user_id = self.observe_user(&nick);
        if let Some(user) = self.store.user_mut(user_id) {
            user.monitored = true;
            if let Some(ident) = ident.filter(|v| *v != "*") {
                user.ident = Some(ident.to_owned());
            }
            if let Some(host) = host.filter(|v| *v != "*") {
                user.host = Some(host.to_owned());
            }
            // Legacy servers have no away-notify: online resets the
            // away flag even when previously set.
            user.away = away;
            if !away {
                user.away_reason = None;
                user.away_since = None;
            }
        }
        if from_watch {
            self.watch_listed.insert(user_id);
        }
        self.push_event(Event::MonitorOnline { nick });
    }

    /// Shared offline transition: common-channel retention applies.
    fn presence_offline(&mut self, mask: &str, from_watch: bool) {
        let (nick, _, _) = split_hostmask(mask);
        if nick.is_empty() {
            return;
        }
        let nick = nick.to_owned();
        let user_id = self.store.ensure_user(&nick);
        if let Some(user) = self.store.user_mut(user_id) {
            user.monitored = true;
        }
        if from_watch {
            self.watch_listed.insert(user_id);
        }

        let on_common_channel = self
            .store
            .user(user_id)
            .map(|user| !user.channels.is_empty())
            .unwrap_or(false);
        self.push_event(Event::MonitorOffline { nick: nick.clone() });
        if on_common_channel {
            // Stay seen; the QUIT will arrive through the channel.
            return;
        }
        if self.store.user(user_id).is_some_and(|user| user.seen) {
            self.push_event(Event::UserQuit { nick, reason: String::new() });
            self.mark_unseen(user_id);
        }
    }

    pub(super) fn handle_mononline(&mut self, line: &Line) {
        let Some(targets) = line.params.last().cloned() else { return };
        for mask in targets.split(',') {
            self.presence_online(mask.trim(), false, false);
        }
    }

    pub(super) fn handle_monoffline(&mut self, line: &Line) {
        let Some(targets) = line.params.last().cloned() else { return };
        for mask in targets.split(',') {
            self.presence_offline(mask.trim(), false);
        }
    }

    // WATCH replies carry nick, ident, host, timestamp as separate
    // parameters.

    pub(super) fn handle_watch_online(&mut self, line: &Line, away: bool) {
        let Some(nick) = line.param(1) else { return };
        let mask = match (line.param(2), line.param(3)) {
            (Some(ident), Some(host)) => format!("{}!{}@{}", nick, ident, host),
            _ => nick.to_owned(),
        };
        self.presence_online(&mask, away, true);
    }

    pub(super) fn handle_watch_offline(&mut self, line: &Line) {
        let Some(nick) = line.param(1).map(str::to_owned) else { return };
        self.presence_offline(&nick, true);
    }

    pub(super) fn handle_watch_removed(&mut self, line: &Line) {
        let Some(nick) = line.param(1).map(str::to_owned) else { return };
        let mapping = self.isupport.case_mapping();
        self.monitor_list.retain(|kept| !mapping.eq(kept, &nick));
        let Some(user_id) = self.store.user_id(&nick) else { return };
        self.watch_listed.remove(&user_id);
        if let Some(user) = self.store.user_mut(user_id) {
            user.monitored = false;
        }
        self.apply_retention(user_id);
    }

    pub(super) fn handle_watch_away(&mut self, line: &Line, away: bool) {
        let Some(user_id) = line.param(1).and_then(|n| self.store.user_id(n)) else {
            return;
        };
        self.watch_listed.insert(user_id);
        if let Some(user) = self.store.user_mut(user_id) {
            user.away = away;
            if away {
                user.away_since = Some(chrono::Utc::now());
            } else {
                user.away_reason = None;
                user.away_since = None;
            }
        }
    }

    /// End of a WATCH list dump: tracked users the dump did not
    /// mention are no longer in the server-side list.
    pub(super) fn handle_endofwatchlist(&mut self) {
        let stale: Vec<UserId> = self
            .store
            .users()
            .filter(|(id, user)| user.monitored && !self.watch_listed.contains(id))
            .map(|(id, _)| id)
            .collect();
        for user_id in stale {
            if let Some(user) = self.store.user_mut(user_id) {
                user.monitored = false;
            }
            // On a common channel: retained as seen, just unmonitored.
            self.apply_retention(user_id);
        }
        self.watch_listed.clear();
    }
}
