//! The ISUPPORT extension registry.
//!
//! Numeric 005 (RPL_ISUPPORT) carries `NAME[=VALUE]` and `-NAME`
//! tokens that reshape the session's effective grammar at runtime:
//! case mapping, mode taxonomy, status prefixes, and assorted
//! limits. [`Isupport`] keeps the raw token map (keys are
//! case-sensitive) alongside eagerly-derived typed fields, and
//! reports the side effects the session must act on.
//!
//! # Reference
//! - <https://modern.ircdocs.horse/#rplisupport-005>
//! - draft-hardy-irc-isupport-00 for `\xHH` value escapes

use std::collections::BTreeMap;

use crate::casemap::CaseMapping;
use crate::modes::ChannelModes;

/// Side effects of applying a token that the session must handle
/// beyond the registry's own state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IsupportEffect {
    /// The comparer changed; every case-mapped index must re-key.
    CaseMappingChanged(CaseMapping),
}

/// Negotiated server extensions and limits.
#[derive(Clone, Debug)]
pub struct Isupport {
    raw: BTreeMap<String, String>,
    case_mapping: CaseMapping,
    network: Option<String>,
    chan_modes: ChannelModes,
    status_prefixes: Vec<(char, char)>,
    ban_exceptions: Option<char>,
    invite_exceptions: Option<char>,
    list_lengths: BTreeMap<char, u32>,
    maxlist_seen: bool,
    chan_limits: Vec<(String, Option<u32>)>,
    chanlimit_seen: bool,
    nick_len: u32,
    topic_len: Option<u32>,
    max_targets: Option<u32>,
    modes_per_command: Option<u32>,
    monitor: Option<Option<u32>>,
    watch: Option<Option<u32>>,
    targmax: BTreeMap<String, u32>,
    whox: bool,
    chantypes: String,
    statusmsg: String,
}

impl Default for Isupport {
    fn default() -> Self {
        Isupport {
            raw: BTreeMap::new(),
            case_mapping: CaseMapping::Rfc1459,
            network: None,
            chan_modes: ChannelModes::default_session(),
            status_prefixes: vec![('~', 'q'), ('&', 'a'), ('@', 'o'), ('%', 'h'), ('+', 'v')],
            ban_exceptions: None,
            invite_exceptions: None,
            list_lengths: BTreeMap::new(),
            maxlist_seen: false,
            chan_limits: Vec::new(),
            chanlimit_seen: false,
            nick_len: 9,
            topic_len: None,
            max_targets: None,
            modes_per_command: Some(3),
            monitor: None,
            watch: None,
            targmax: BTreeMap::new(),
            whox: false,
            chantypes: "#&".to_owned(),
            statusmsg: String::new(),
        }
    }
}

/// Decode `\xHH` escapes in a token value; a two-hex-digit escape
/// yields the character with that byte value. Malformed escapes are
/// kept verbatim.
pub fn decode_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && (bytes[i + 1] == b'x' || bytes[i + 1] == b'X')
            && bytes[i + 2].is_ascii_hexdigit()
            && bytes[i + 3].is_ascii_hexdigit()
        {
            let b = u8::from_str_radix(&raw[i + 2..i + 4], 16).unwrap_or(b'?');
            out.push(char::from(b));
            i += 4;
            continue;
        }
        let c = raw[i..].chars().next().unwrap_or('\u{FFFD}');
        out.push(c);
        i += c.len_utf8();
    }
    out
}

impl Isupport {
    /// Apply one `NAME[=VALUE]` or `-NAME` token.
    pub fn apply_token(&mut self, token: &str) -> Option<IsupportEffect> {
        if let Some(name) = token.strip_prefix('-') {
            return self.unset(name);
        }
        let (name, value) = match token.split_once('=') {
            Some((n, v)) => (n, decode_value(v)),
            None => (token, String::new()),
        };
        if name.is_empty() {
            return None;
        }
        self.raw.insert(name.to_owned(), value.clone());
        self.set(name, &value)
    }

    /// Raw value for a token, if advertised. Keys are case-sensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }

    fn set(&mut self, name: &str, value: &str) -> Option<IsupportEffect> {
        match name {
            "CASEMAPPING" => match CaseMapping::parse(value) {
                Some(mapping) if mapping != self.case_mapping => {
                    self.case_mapping = mapping;
                    return Some(IsupportEffect::CaseMappingChanged(mapping));
                }
                Some(_) => {}
                None => tracing::warn!(value, "unknown CASEMAPPING value ignored"),
            },
            "NETWORK" => self.network = Some(value.to_owned()),
            "CHANMODES" => {
                let mut groups = value.splitn(4, ',');
                let a = groups.next().unwrap_or("");
                let b = groups.next().unwrap_or("");
                let c = groups.next().unwrap_or("");
                let d = groups.next().unwrap_or("");
                self.chan_modes.replace_buckets(a, b, c, d);
                if let Some(mode) = self.ban_exceptions {
                    self.chan_modes.ensure_list_mode(mode);
                }
                if let Some(mode) = self.invite_exceptions {
                    self.chan_modes.ensure_list_mode(mode);
                }
            }
            "PREFIX" => {
                if let Some((modes, prefixes)) = parse_prefix_value(value) {
                    self.chan_modes.set_status_modes(&modes);
                    self.status_prefixes = prefixes
                        .chars()
                        .zip(modes.chars())
                        .map(|(p, m)| (p, m))
                        .collect();
                }
            }
            "EXCEPTS" => {
                let mode = value.chars().next().unwrap_or('e');
                self.ban_exceptions = Some(mode);
                self.chan_modes.ensure_list_mode(mode);
            }
            "INVEX" => {
                let mode = value.chars().next().unwrap_or('I');
                self.invite_exceptions = Some(mode);
                self.chan_modes.ensure_list_mode(mode);
            }
            "MAXLIST" => {
                self.maxlist_seen = true;
                self.list_lengths.clear();
                for part in value.split(',') {
                    let Some((modes, limit)) = part.split_once(':') else {
                        continue;
                    };
                    let Ok(limit) = limit.parse::<u32>() else {
                        continue;
                    };
                    for mode in modes.chars() {
                        self.list_lengths.insert(mode, limit);
                    }
                }
            }
            "MAXBANS" => {
                if !self.maxlist_seen {
                    if let Ok(limit) = value.parse::<u32>() {
                        self.list_lengths.insert('b', limit);
                        if let Some(mode) = self.ban_exceptions {
                            self.list_lengths.insert(mode, limit);
                        }
                    }
                }
            }
            "CHANLIMIT" => {
                self.chanlimit_seen = true;
                self.chan_limits.clear();
                for part in value.split(',') {
                    let Some((group, limit)) = part.split_once(':') else {
                        continue;
                    };
                    let limit = if limit.is_empty() {
                        None
                    } else {
                        match limit.parse::<u32>() {
                            Ok(n) => Some(n),
                            Err(_) => continue,
                        }
                    };
                    self.chan_limits.push((group.to_owned(), limit));
                }
            }
            "MAXCHANNELS" => {
                if !self.chanlimit_seen {
                    if let Ok(limit) = value.parse::<u32>() {
                        self.chan_limits = vec![(self.chantypes.clone(), Some(limit))];
                    }
                }
            }
            "CHANTYPES" => self.chantypes = value.to_owned(),
            "STATUSMSG" => self.statusmsg = value.to_owned(),
            "NICKLEN" => {
                if let Ok(len) = value.parse::<u32>() {
                    self.nick_len = len;
                }
            }
            "TOPICLEN" => {
                self.topic_len = if value.is_empty() {
                    None
                } else {
                    value.parse::<u32>().ok()
                };
            }
            "MAXTARGETS" => self.max_targets = value.parse::<u32>().ok(),
            "MODES" => {
                self.modes_per_command = if value.is_empty() {
                    None
                } else {
                    value.parse::<u32>().ok().or(Some(3))
                };
            }
            "MONITOR" => {
                self.monitor = Some(if value.is_empty() {
                    None
                } else {
                    value.parse::<u32>().ok()
                });
            }
            "WATCH" => {
                self.watch = Some(if value.is_empty() {
                    None
                } else {
                    value.parse::<u32>().ok()
                });
            }
            "TARGMAX" => {
                for part in value.split(',') {
                    let Some((cmd, max)) = part.split_once(':') else {
                        continue;
                    };
                    if cmd.is_empty() {
                        continue;
                    }
                    if max.is_empty() {
                        self.targmax.remove(cmd);
                    } else if let Ok(max) = max.parse::<u32>() {
                        self.targmax.insert(cmd.to_owned(), max);
                    }
                }
            }
            "WHOX" => self.whox = true,
            _ => {}
        }
        None
    }

    fn unset(&mut self, name: &str) -> Option<IsupportEffect> {
        self.raw.remove(name);
        match name {
            "CASEMAPPING" => {
                if self.case_mapping != CaseMapping::Rfc1459 {
                    self.case_mapping = CaseMapping::Rfc1459;
                    return Some(IsupportEffect::CaseMappingChanged(CaseMapping::Rfc1459));
                }
            }
            "NETWORK" => self.network = None,
            "EXCEPTS" => self.ban_exceptions = None,
            "INVEX" => self.invite_exceptions = None,
            "MONITOR" => self.monitor = None,
            "WATCH" => self.watch = None,
            "WHOX" => self.whox = false,
            "MAXTARGETS" => self.max_targets = None,
            "MODES" => self.modes_per_command = Some(3),
            "TOPICLEN" => self.topic_len = None,
            "NICKLEN" => self.nick_len = 9,
            _ => {}
        }
        None
    }

    /// The active identifier comparer.
    pub fn case_mapping(&self) -> CaseMapping {
        self.case_mapping
    }

    /// Advertised network name (NETWORK, `\xHH`-decoded).
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    /// The negotiated mode taxonomy.
    pub fn chan_modes(&self) -> &ChannelModes {
        &self.chan_modes
    }

    /// Mutable taxonomy access, for RPL_MYINFO's unknown-letter
    /// defaulting.
    pub fn chan_modes_mut(&mut self) -> &mut ChannelModes {
        &mut self.chan_modes
    }

    /// Status prefix pairs `(prefix, mode)` in strength order.
    pub fn status_prefixes(&self) -> &[(char, char)] {
        &self.status_prefixes
    }

    /// Mode letter for a status prefix character.
    pub fn mode_for_prefix(&self, prefix: char) -> Option<char> {
        self.status_prefixes
            .iter()
            .find(|(p, _)| *p == prefix)
            .map(|(_, m)| *m)
    }

    /// Whether ban exceptions (+e style) are advertised.
    pub fn supports_ban_exceptions(&self) -> bool {
        self.ban_exceptions.is_some()
    }

    /// The ban-exception list mode, when advertised.
    pub fn ban_exception_mode(&self) -> Option<char> {
        self.ban_exceptions
    }

    /// Whether invite exceptions (+I style) are advertised.
    pub fn supports_invite_exceptions(&self) -> bool {
        self.invite_exceptions.is_some()
    }

    /// The invite-exception list mode, when advertised.
    pub fn invite_exception_mode(&self) -> Option<char> {
        self.invite_exceptions
    }

    /// Maximum entries for one list mode (MAXLIST, legacy MAXBANS).
    pub fn list_mode_length(&self, mode: char) -> Option<u32> {
        self.list_lengths.get(&mode).copied()
    }

    /// How many channels whose name starts with `chantype` may be
    /// joined; `None` when unadvertised, `Some(None)` for no limit.
    pub fn channel_limit(&self, chantype: char) -> Option<Option<u32>> {
        self.chan_limits
            .iter()
            .find(|(group, _)| group.contains(chantype))
            .map(|(_, limit)| *limit)
    }

    /// Maximum nickname length (NICKLEN, default 9).
    pub fn nickname_length(&self) -> u32 {
        self.nick_len
    }

    /// Maximum topic length; `None` means unlimited or unadvertised.
    pub fn topic_length(&self) -> Option<u32> {
        self.topic_len
    }

    /// MAXTARGETS, when advertised.
    pub fn max_targets(&self) -> Option<u32> {
        self.max_targets
    }

    /// Maximum mode changes per MODE command; absent defaults to 3,
    /// `None` means unlimited.
    pub fn modes_per_command(&self) -> Option<u32> {
        self.modes_per_command
    }

    /// Whether any presence subscription (MONITOR or WATCH) exists.
    pub fn supports_presence_subscription(&self) -> bool {
        self.monitor.is_some() || self.watch.is_some()
    }

    /// Whether MONITOR is advertised.
    pub fn supports_monitor(&self) -> bool {
        self.monitor.is_some()
    }

    /// Whether legacy WATCH is advertised.
    pub fn supports_watch(&self) -> bool {
        self.watch.is_some()
    }

    /// Presence list size limit. MONITOR wins over WATCH regardless
    /// of token order; inner `None` means unlimited.
    pub fn monitor_limit(&self) -> Option<Option<u32>> {
        self.monitor.or(self.watch)
    }

    /// Per-command target limits (TARGMAX).
    pub fn target_max(&self, command: &str) -> Option<u32> {
        self.targmax.get(command).copied()
    }

    /// Whether WHOX requests are supported.
    pub fn supports_whox(&self) -> bool {
        self.whox
    }

    /// Channel name sigils (CHANTYPES).
    pub fn chantypes(&self) -> &str {
        &self.chantypes
    }

    /// Prefixes accepted on message targets (STATUSMSG).
    pub fn status_msg(&self) -> &str {
        &self.statusmsg
    }

    /// Whether `name` is a channel name under CHANTYPES.
    pub fn is_channel_name(&self, name: &str) -> bool {
        name.chars()
            .next()
            .is_some_and(|c| self.chantypes.contains(c))
    }
}

fn parse_prefix_value(value: &str) -> Option<(String, String)> {
    let rest = value.strip_prefix('(')?;
    let (modes, prefixes) = rest.split_once(')')?;
    if modes.is_empty() || prefixes.is_empty() || modes.chars().count() != prefixes.chars().count()
    {
        return None;
    }
    Some((modes.to_owned(), prefixes.to_owned()))
}
