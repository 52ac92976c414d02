//! PRIVMSG/NOTICE/TAGMSG dispatch and CTCP extraction.

use crate::event::Event;
use crate::line::{split_hostmask, Line};
use crate::modes::ChannelStatus;

use super::Session;

/// Strip CTCP framing: the leading marker always, at most one
/// trailing marker. Interior markers are part of the payload and
/// survive verbatim.
fn strip_ctcp(text: &str) -> Option<String> {
    let rest = text.strip_prefix('\u{1}')?;
    Some(rest.strip_suffix('\u{1}').unwrap_or(rest).to_owned())
}

impl Session {
    pub(super) fn handle_message(&mut self, command: &str, line: &Line) {
        let source = line.source.clone().unwrap_or_default();
        let nick = split_hostmask(&source).0.to_owned();
        if !source.is_empty() {
            self.observe_source(&source);
        }
        let Some(target) = line.param(0).map(str::to_owned) else { return };
        let text = line.param(1).unwrap_or("").to_owned();

        if target.starts_with('$') {
            match command {
                "PRIVMSG" => {
                    self.push_event(Event::BroadcastMessage { target, nick, text })
                }
                "NOTICE" => {
                    self.push_event(Event::BroadcastNotice { target, nick, text })
                }
                _ => tracing::debug!("broadcast TAGMSG ignored"),
            }
            return;
        }

        // One or more status prefixes may precede a channel target
        // (`@#ch`): the parsed status scopes the message.
        let table = self.isupport.chan_modes().clone();
        let prefixes = self.isupport.status_prefixes().to_vec();
        let (status, consumed) = ChannelStatus::from_prefixes(&target, &prefixes, &table);
        let rest = &target[consumed..];

        if self.isupport.is_channel_name(rest) {
            let channel = rest.to_owned();
            match command {
                "PRIVMSG" => match strip_ctcp(&text) {
                    Some(ctcp) => self.push_event(Event::ChannelCtcp {
                        channel,
                        nick,
                        status,
                        text: ctcp,
                    }),
                    None => self.push_event(Event::ChannelMessage {
                        channel,
                        nick,
                        status,
                        text,
                    }),
                },
                "NOTICE" => {
                    self.push_event(Event::ChannelNotice { channel, nick, status, text })
                }
                _ => self.push_event(Event::ChannelTagMsg { channel, nick, status }),
            }
        } else {
            match command {
                "PRIVMSG" => match strip_ctcp(&text) {
                    Some(ctcp) => self.push_event(Event::PrivateCtcp { nick, text: ctcp }),
                    None => self.push_event(Event::PrivateMessage { nick, text }),
                },
                "NOTICE" => self.push_event(Event::PrivateNotice { nick, text }),
                _ => self.push_event(Event::PrivateTagMsg { nick }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::strip_ctcp;

    #[test]
    fn ctcp_framing() {
        assert_eq!(strip_ctcp("\u{1}VERSION\u{1}"), Some("VERSION".to_owned()));
        // Only one trailing marker is stripped; interior markers stay.
        assert_eq!(
            strip_ctcp("\u{1}A\u{1}B\u{1}"),
            Some("A\u{1}B".to_owned())
        );
        assert_eq!(strip_ctcp("\u{1}PING 123"), Some("PING 123".to_owned()));
        assert_eq!(strip_ctcp("plain"), None);
    }
}
