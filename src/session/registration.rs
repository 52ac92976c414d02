//! Registration-phase handlers: CAP negotiation, STARTTLS, SASL,
//! welcome, and server-info numerics.

use crate::event::Event;
use crate::line::{split_hostmask, Line};
use crate::sasl::ChallengeAction;

use super::{
    ClientState, DisconnectReason, SaslMode, Session, TlsMode, QUIT_SASL_MECHANISM,
    QUIT_SASL_UNSUPPORTED, QUIT_STARTTLS,
};

/// Capabilities the default policy requests when advertised. `sasl`
/// and `tls` are gated separately.
const WANTED_CAPS: &[&str] = &[
    "multi-prefix",
    "userhost-in-names",
    "away-notify",
    "account-notify",
    "extended-join",
    "chghost",
    "cap-notify",
    "monitor",
];

impl Session {
    pub(super) fn handle_cap(&mut self, line: &Line) {
        self.cap_seen = true;
        let sub = line.param(1).unwrap_or("").to_ascii_uppercase();
        match sub.as_str() {
            "LS" | "NEW" => {
                // A `*` before the list marks a continuation line.
                let (list, is_final) = if line.param(2) == Some("*") {
                    (line.param(3).unwrap_or(""), false)
                } else {
                    (line.param(2).unwrap_or(""), true)
                };
                let committed = self.caps.accumulate(list, is_final);
                if let Some(added) = committed {
                    self.commit_cap_batch(added);
                }
            }
            "ACK" => {
                let list = line.param(2).unwrap_or("").to_owned();
                let enabled = self.caps.ack(&list);
                if enabled.iter().any(|name| name == "sasl")
                    && self.config.sasl != SaslMode::Disabled
                {
                    self.begin_sasl();
                } else if !self.sasl_in_progress {
                    self.finish_cap_negotiation();
                }
            }
            "NAK" => {
                let list = line.param(2).unwrap_or("").to_owned();
                self.caps.nak(&list);
                if !self.sasl_in_progress {
                    self.finish_cap_negotiation();
                }
            }
            "DEL" => {
                let list = line.param(2).unwrap_or("").to_owned();
                let removed = self.caps.del(&list);
                if !removed.is_empty() {
                    self.push_event(Event::CapabilitiesDeleted { caps: removed });
                }
            }
            "LIST" => {}
            other => tracing::debug!(sub = other, "unhandled CAP subcommand"),
        }
    }

    /// A CAP LS/NEW batch finished accumulating: seed the enable
    /// set, run the caller's filter, emit the event, apply the
    /// registration gates, then request or end.
    fn commit_cap_batch(&mut self, added: Vec<String>) {
        if let Some(value) = self.caps.value("sasl").map(str::to_owned) {
            self.sasl.set_shared(&value);
        }

        for name in &added {
            match name.as_str() {
                "sasl" => {
                    let ctx = self.sasl_context();
                    if self.config.sasl != SaslMode::Disabled && self.sasl.has_eligible(&ctx) {
                        self.caps.enable.insert(name.clone());
                    }
                }
                "tls" => {
                    if self.wants_starttls() {
                        self.caps.enable.insert(name.clone());
                    }
                }
                _ if WANTED_CAPS.contains(&name.as_str()) => {
                    self.caps.enable.insert(name.clone());
                }
                _ => {}
            }
        }

        if let Some(mut filter) = self.cap_filter.take() {
            filter(&added, &mut self.caps.enable);
            self.cap_filter = Some(filter);
        }
        if !added.is_empty() {
            self.push_event(Event::CapabilitiesAdded { caps: added });
        }

        if self.state == ClientState::CapabilityNegotiating {
            if self.config.tls == TlsMode::StartTlsRequired
                && !self.tls_active
                && !self.caps.is_supported("tls")
            {
                self.fatal_quit(DisconnectReason::TlsNotSupported, QUIT_STARTTLS);
                return;
            }
            if self.config.sasl == SaslMode::Required {
                if !self.caps.is_supported("sasl") {
                    self.fatal_quit(
                        DisconnectReason::SaslAuthenticationFailed,
                        QUIT_SASL_UNSUPPORTED,
                    );
                    return;
                }
                let ctx = self.sasl_context();
                if self.caps.value("sasl").is_some() && !self.sasl.has_eligible(&ctx) {
                    self.fatal_quit(
                        DisconnectReason::SaslAuthenticationFailed,
                        QUIT_SASL_MECHANISM,
                    );
                    return;
                }
            }
        }

        self.cap_request_or_end();
    }

    fn wants_starttls(&self) -> bool {
        !self.tls_active
            && matches!(
                self.config.tls,
                TlsMode::StartTlsOptional | TlsMode::StartTlsRequired
            )
    }

    pub(super) fn cap_request_or_end(&mut self) {
        if self.caps.enable.contains("tls") && self.wants_starttls() {
            self.push_line(Line::cmd("STARTTLS", [] as [&str; 0]));
            return;
        }
        let request: Vec<String> = self
            .caps
            .request_list()
            .into_iter()
            .filter(|name| name != "tls" && !self.caps.is_enabled(name))
            .collect();
        if request.is_empty() {
            self.finish_cap_negotiation();
        } else {
            let list = request.join(" ");
            self.push_line(Line::cmd("CAP", ["REQ", list.as_str()]));
            self.caps.mark_requested(&request);
        }
    }

    pub(super) fn finish_cap_negotiation(&mut self) {
        if self.state != ClientState::CapabilityNegotiating {
            return;
        }
        if !self.cap_end_sent {
            self.push_line(Line::cmd("CAP", ["END"]));
            self.cap_end_sent = true;
        }
        if !self.registration_sent {
            self.registration_sent = true;
            let nickname = self.nickname.clone();
            self.push_line(Line::cmd("NICK", [nickname]));
            self.push_line(Line::cmd(
                "USER",
                [
                    self.local.ident.clone(),
                    "0".to_owned(),
                    "*".to_owned(),
                    self.local.full_name.clone(),
                ],
            ));
        }
        self.set_state(ClientState::Registering);
    }

    // --- SASL ---

    fn begin_sasl(&mut self) {
        if let Some(value) = self.caps.value("sasl").map(str::to_owned) {
            self.sasl.set_shared(&value);
        }
        let ctx = self.sasl_context();
        match self.sasl.start_next(&ctx) {
            Some(mechanism) => {
                self.sasl_in_progress = true;
                self.push_line(Line::cmd("AUTHENTICATE", [mechanism]));
            }
            None => self.sasl_unavailable(),
        }
    }

    fn sasl_unavailable(&mut self) {
        self.sasl_in_progress = false;
        self.sasl.reset();
        if self.config.sasl == SaslMode::Required {
            self.fatal_quit(DisconnectReason::SaslAuthenticationFailed, QUIT_SASL_MECHANISM);
        } else {
            self.finish_cap_negotiation();
        }
    }

    pub(super) fn handle_authenticate(&mut self, line: &Line) {
        if !self.sasl_in_progress {
            tracing::debug!("AUTHENTICATE outside an attempt, ignored");
            return;
        }
        let arg = line.param(0).unwrap_or("+").to_owned();
        match self.sasl.handle_challenge(&arg) {
            ChallengeAction::Wait => {}
            ChallengeAction::Respond(args) => {
                for arg in args {
                    self.push_line(Line::cmd("AUTHENTICATE", [arg]));
                }
            }
        }
    }

    pub(super) fn handle_sasl_success(&mut self) {
        self.sasl.reset();
        self.sasl_in_progress = false;
        self.finish_cap_negotiation();
    }

    pub(super) fn handle_sasl_failure(&mut self, line: &Line) {
        if !self.sasl_in_progress {
            tracing::debug!(code = %line.command, "SASL numeric outside an attempt");
            return;
        }
        let ctx = self.sasl_context();
        match self.sasl.start_next(&ctx) {
            Some(mechanism) => {
                self.push_line(Line::cmd("AUTHENTICATE", [mechanism]));
            }
            None => self.sasl_unavailable(),
        }
    }

    pub(super) fn handle_loggedin(&mut self, line: &Line) {
        if let Some(mask) = line.param(1) {
            let (_, ident, host) = split_hostmask(mask);
            let nickname = self.nickname.clone();
            let id = self.store.ensure_user(&nickname);
            if let Some(user) = self.store.user_mut(id) {
                user.seen = true;
                if let Some(ident) = ident {
                    user.ident = Some(ident.to_owned());
                }
                if let Some(host) = host {
                    user.host = Some(host.to_owned());
                }
                user.account = line.param(2).map(str::to_owned);
            }
        }
    }

    pub(super) fn handle_loggedout(&mut self, line: &Line) {
        let nickname = self.nickname.clone();
        let id = self.store.ensure_user(&nickname);
        if let Some(user) = self.store.user_mut(id) {
            user.account = None;
            if let Some(mask) = line.param(1) {
                let (_, ident, host) = split_hostmask(mask);
                if let Some(ident) = ident {
                    user.ident = Some(ident.to_owned());
                }
                if let Some(host) = host {
                    user.host = Some(host.to_owned());
                }
            }
        }
    }

    // --- STARTTLS ---

    pub(super) fn handle_starttls_ok(&mut self) {
        // The transport performs the handshake and then calls
        // on_tls_started, which restarts CAP LS.
        self.set_state(ClientState::SslHandshaking);
    }

    pub(super) fn handle_starttls_failed(&mut self) {
        if self.config.tls == TlsMode::StartTlsRequired {
            self.fatal_quit(DisconnectReason::TlsNotSupported, QUIT_STARTTLS);
            return;
        }
        self.caps.enable.remove("tls");
        self.cap_request_or_end();
    }

    // --- welcome & server info ---

    pub(super) fn handle_welcome(&mut self, line: &Line) {
        if self.config.sasl == SaslMode::Required && !self.cap_seen {
            self.fatal_quit(
                DisconnectReason::SaslAuthenticationFailed,
                QUIT_SASL_UNSUPPORTED,
            );
            return;
        }
        if let Some(assigned) = line.param(0).map(str::to_owned) {
            if !self.is_self(&assigned) {
                self.adopt_nickname(&assigned);
            }
        }
        self.set_state(ClientState::ReceivingServerInfo);
    }

    /// The server assigned a different nickname than requested.
    fn adopt_nickname(&mut self, assigned: &str) {
        let old = self.nickname.clone();
        let id = self.store.ensure_user(&old);
        if let Some(user) = self.store.user_mut(id) {
            user.seen = true;
        }
        if let Err(err) = self.store.rename_user(id, assigned) {
            tracing::warn!(%err, "nickname adoption collided, dropping stale entry");
        }
        self.nickname = assigned.to_owned();
        self.push_event(Event::NicknameChange {
            old,
            new: assigned.to_owned(),
            is_self: true,
        });
    }

    pub(super) fn handle_myinfo(&mut self, line: &Line) {
        self.server_name = line.param(1).map(str::to_owned);
        self.supported_user_modes = line
            .param(3)
            .map(|modes| modes.chars().collect())
            .unwrap_or_default();
        if let Some(channel_modes) = line.param(4) {
            // Letters 004 advertises but 005 has not classified
            // default to plain flags.
            for mode in channel_modes.chars() {
                self.isupport.chan_modes_mut().ensure_flag_mode(mode);
            }
        }
    }

    pub(super) fn handle_isupport(&mut self, line: &Line) {
        if line.params.len() < 2 {
            return;
        }
        let mut tokens = &line.params[1..];
        // The trailing "are supported by this server" text is not a
        // token.
        if let Some(last) = tokens.last() {
            if last.contains(' ') {
                tokens = &tokens[..tokens.len() - 1];
            }
        }
        for token in tokens.to_vec() {
            if let Some(effect) = self.isupport.apply_token(&token) {
                self.apply_isupport_effect(effect);
            }
            if self.state == ClientState::Disconnecting {
                return;
            }
        }
        if let Some(network) = self.isupport.network() {
            self.network_name = Some(network.to_owned());
        }
    }

    pub(super) fn handle_nick_error(&mut self, line: &Line) {
        if !matches!(
            self.state,
            ClientState::CapabilityNegotiating | ClientState::Registering
        ) {
            tracing::debug!(code = %line.command, "nickname error outside registration");
            return;
        }
        let retry = format!("{}_", self.nickname);
        let id = self.store.ensure_user(&self.nickname.clone());
        if let Err(err) = self.store.rename_user(id, &retry) {
            tracing::warn!(%err, "nickname retry collided locally");
            return;
        }
        self.nickname = retry.clone();
        self.push_line(Line::cmd("NICK", [retry]));
    }

    pub(super) fn handle_umodeis(&mut self, line: &Line) {
        let Some(run) = line.param(1) else { return };
        // RPL_UMODEIS replaces; no +/- accumulation.
        self.user_modes.clear();
        crate::modes::apply_flag_run(&mut self.user_modes, run);
        self.push_event(Event::UserModesSet { modes: run.to_owned() });
    }
}
