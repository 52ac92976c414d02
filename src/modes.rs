//! Channel mode taxonomy, status ladders, and mode application.
//!
//! Servers advertise which mode letters take parameters through the
//! CHANMODES and PREFIX ISUPPORT tokens; everything here is driven
//! by that negotiated [`ChannelModes`] taxonomy rather than a fixed
//! letter table.
//!
//! # Reference
//! - RFC 2811 channel modes
//! - Modern IRC, CHANMODES / PREFIX: <https://modern.ircdocs.horse/#chanmodes-parameter>

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Classification of one mode letter under the current taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeKind {
    /// Type A: list mode (ban-style); parameter is a list entry.
    List,
    /// Type B: parameter on set and unset.
    ParamAlways,
    /// Type C: parameter on set only.
    ParamWhenSet,
    /// Type D: flag, never a parameter.
    Flag,
    /// Status mode (PREFIX); parameter is a nickname.
    Status,
    /// Letter not present in any bucket.
    Unknown,
}

/// The negotiated channel mode taxonomy: four RFC buckets plus the
/// status ladder.
///
/// Status letters are held strongest-first; that order defines
/// status strength for [`ChannelStatus`] comparisons. The A–D
/// buckets carry no meaningful order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelModes {
    a: Vec<char>,
    b: Vec<char>,
    c: Vec<char>,
    d: Vec<char>,
    status: Vec<char>,
}

impl ChannelModes {
    /// Parse an `"A,B,C,D"` or `"A,B,C,D,Status"` spec string.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut groups = spec.split(',');
        let a = groups.next()?.chars().collect();
        let b = groups.next()?.chars().collect();
        let c = groups.next()?.chars().collect();
        let d = groups.next()?.chars().collect();
        let status = groups.next().map(|g| g.chars().collect()).unwrap_or_default();
        if groups.next().is_some() {
            return None;
        }
        Some(ChannelModes { a, b, c, d, status })
    }

    /// The RFC 2811 taxonomy, `"Ibe,k,l,aimnpqrst,ov"`.
    pub fn rfc2811() -> Self {
        Self::parse("Ibe,k,l,aimnpqrst,ov").unwrap()
    }

    /// The taxonomy a fresh session assumes before 005 arrives.
    ///
    /// The status ladder covers the five conventional prefixes
    /// (`~&@%+` for `qaohv`) so that prefixed NAMES entries parse
    /// before PREFIX is negotiated.
    pub(crate) fn default_session() -> Self {
        Self::parse("Ibe,k,l,aimnprst,qaohv").unwrap()
    }

    /// Classify a mode letter. Status wins over the A–D buckets when
    /// a letter appears in both.
    pub fn kind(&self, mode: char) -> ModeKind {
        if self.status.contains(&mode) {
            ModeKind::Status
        } else if self.a.contains(&mode) {
            ModeKind::List
        } else if self.b.contains(&mode) {
            ModeKind::ParamAlways
        } else if self.c.contains(&mode) {
            ModeKind::ParamWhenSet
        } else if self.d.contains(&mode) {
            ModeKind::Flag
        } else {
            ModeKind::Unknown
        }
    }

    /// Replace the A–D buckets from a CHANMODES value. The status
    /// ladder is preserved: letters currently in it are skipped.
    pub fn replace_buckets(&mut self, a: &str, b: &str, c: &str, d: &str) {
        let keep = |letters: &str, status: &[char]| -> Vec<char> {
            let mut out = Vec::new();
            for ch in letters.chars() {
                if !status.contains(&ch) && !out.contains(&ch) {
                    out.push(ch);
                }
            }
            out
        };
        self.a = keep(a, &self.status);
        self.b = keep(b, &self.status);
        self.c = keep(c, &self.status);
        self.d = keep(d, &self.status);
    }

    /// Reassign the status ladder. The given order defines strength,
    /// strongest first. Letters not present in another bucket become
    /// status-only; former status letters absent from the new ladder
    /// are dropped.
    pub fn set_status_modes(&mut self, letters: &str) {
        self.status.clear();
        for ch in letters.chars() {
            if !self.status.contains(&ch) {
                self.status.push(ch);
            }
        }
    }

    /// Ensure `mode` is classified as a list mode (EXCEPTS/INVEX).
    pub fn ensure_list_mode(&mut self, mode: char) {
        if self.kind(mode) == ModeKind::Unknown {
            self.a.push(mode);
        }
    }

    /// Ensure `mode` is classified at all; unknown letters become
    /// flags (the RPL_MYINFO default).
    pub fn ensure_flag_mode(&mut self, mode: char) {
        if self.kind(mode) == ModeKind::Unknown {
            self.d.push(mode);
        }
    }

    /// Rank of a status letter: 0 is strongest, `None` if unknown.
    pub fn status_rank(&self, mode: char) -> Option<usize> {
        self.status.iter().position(|&c| c == mode)
    }

    /// The status letters, strongest first.
    pub fn status_modes(&self) -> &[char] {
        &self.status
    }

    /// The type A (list) letters.
    pub fn list_modes(&self) -> &[char] {
        &self.a
    }
}

impl fmt::Display for ChannelModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sorted = |bucket: &[char]| -> String {
            let mut letters: Vec<char> = bucket.to_vec();
            letters.sort_unstable();
            letters.into_iter().collect()
        };
        let status: String = self.status.iter().collect();
        write!(
            f,
            "{},{},{},{},{}",
            sorted(&self.a),
            sorted(&self.b),
            sorted(&self.c),
            sorted(&self.d),
            status
        )
    }
}

/// Per-membership status: the set of status mode letters a user
/// holds on one channel, ordered by ladder strength.
///
/// A just-joined user has the empty status; the empty status sorts
/// below every non-empty one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelStatus(Vec<char>);

impl ChannelStatus {
    /// The empty status.
    pub fn empty() -> Self {
        ChannelStatus(Vec::new())
    }

    /// Voice (`+v`).
    pub fn voice() -> Self {
        ChannelStatus(vec!['v'])
    }

    /// Half-operator (`+h`).
    pub fn halfop() -> Self {
        ChannelStatus(vec!['h'])
    }

    /// Operator (`+o`).
    pub fn op() -> Self {
        ChannelStatus(vec!['o'])
    }

    /// Admin / protected (`+a`).
    pub fn admin() -> Self {
        ChannelStatus(vec!['a'])
    }

    /// Owner / founder (`+q`).
    pub fn owner() -> Self {
        ChannelStatus(vec!['q'])
    }

    /// Map leading status prefix characters (e.g. `"*@"`) to their
    /// mode letters via `prefix_map` and order them by ladder
    /// strength. Returns the status and the number of prefix
    /// characters consumed.
    pub fn from_prefixes(
        s: &str,
        prefix_map: &[(char, char)],
        table: &ChannelModes,
    ) -> (Self, usize) {
        let mut status = ChannelStatus::empty();
        let mut consumed = 0;
        for ch in s.chars() {
            match prefix_map.iter().find(|(prefix, _)| *prefix == ch) {
                Some((_, mode)) => {
                    status.insert(*mode, table);
                    consumed += ch.len_utf8();
                }
                None => break,
            }
        }
        (status, consumed)
    }

    /// Whether this status contains `mode`.
    pub fn contains(&self, mode: char) -> bool {
        self.0.contains(&mode)
    }

    /// True for the empty status.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add a status letter, keeping ladder order (unknown letters
    /// sort last).
    pub fn insert(&mut self, mode: char, table: &ChannelModes) {
        if self.0.contains(&mode) {
            return;
        }
        self.0.push(mode);
        let rank = |c: char| table.status_rank(c).unwrap_or(usize::MAX);
        self.0.sort_by_key(|&c| rank(c));
    }

    /// Remove a status letter.
    pub fn remove(&mut self, mode: char) {
        self.0.retain(|&c| c != mode);
    }

    /// The strongest letter held, under the given ladder.
    pub fn strongest(&self, table: &ChannelModes) -> Option<char> {
        self.0
            .iter()
            .copied()
            .min_by_key(|&c| table.status_rank(c).unwrap_or(usize::MAX))
    }

    /// Total order by ladder strength: `Greater` means `self`
    /// outranks `other`; the empty status ranks below any non-empty.
    pub fn cmp_in(&self, other: &Self, table: &ChannelModes) -> Ordering {
        let rank = |s: &Self| {
            s.strongest(table)
                .map(|c| table.status_rank(c).unwrap_or(usize::MAX))
        };
        match (rank(self), rank(other)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            // Smaller rank index is the stronger mode.
            (Some(a), Some(b)) => b.cmp(&a),
        }
    }

    /// The letters held, strongest first.
    pub fn letters(&self) -> String {
        self.0.iter().collect()
    }
}

/// One applied mode change in normalized form.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModeChange {
    /// True for `+`, false for `-`.
    pub add: bool,
    /// The mode letter.
    pub mode: char,
    /// Parameter, when one was consumed.
    pub param: Option<String>,
}

impl fmt::Display for ModeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.add { '+' } else { '-' }, self.mode)?;
        if let Some(param) = &self.param {
            write!(f, " {}", param)?;
        }
        Ok(())
    }
}

/// Render applied changes in the normalized comma-separated form,
/// e.g. `"+l 8,+m,-t,+k hunter2"`.
pub fn format_changes(changes: &[ModeChange]) -> String {
    let rendered: Vec<String> = changes.iter().map(ModeChange::to_string).collect();
    rendered.join(",")
}

/// Walk a MODE parameter list (`["+lm-t+k", "8", "hunter2"]`)
/// left-to-right against the taxonomy.
///
/// Parameter consumption follows the bucket: type A and status both
/// signs, type B both signs (but a bare unset is tolerated — some
/// servers omit the parameter client-bound), type C on set only.
/// A missing required parameter skips that one mode and continues.
pub fn parse_mode_params(table: &ChannelModes, params: &[&str]) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let Some((letters, rest)) = params.split_first() else {
        return changes;
    };
    let mut args = rest.iter().copied();
    let mut add = true;

    for c in letters.chars() {
        match c {
            '+' => add = true,
            '-' => add = false,
            _ => {
                let kind = table.kind(c);
                let wants_arg = match kind {
                    ModeKind::List | ModeKind::Status => true,
                    ModeKind::ParamAlways => true,
                    ModeKind::ParamWhenSet => add,
                    ModeKind::Flag => false,
                    ModeKind::Unknown => {
                        tracing::debug!(mode = %c, "unclassified mode letter, treating as flag");
                        false
                    }
                };
                let param = if wants_arg {
                    match args.next() {
                        Some(arg) => Some(arg.to_owned()),
                        None if kind == ModeKind::List => None,
                        None if kind == ModeKind::ParamAlways && !add => None,
                        None => {
                            tracing::debug!(mode = %c, "mode parameter missing, skipping");
                            continue;
                        }
                    }
                } else {
                    None
                };
                changes.push(ModeChange { add, mode: c, param });
            }
        }
    }

    changes
}

/// Apply a `+x`/`-x` flag run to a user mode set. RPL_UMODEIS
/// replacement is handled by the caller clearing first.
pub fn apply_flag_run(set: &mut BTreeSet<char>, run: &str) {
    let mut add = true;
    for c in run.chars() {
        match c {
            '+' => add = true,
            '-' => add = false,
            _ => {
                if add {
                    set.insert(c);
                } else {
                    set.remove(&c);
                }
            }
        }
    }
}

/// A channel's current modes: flags, parameterized modes, and the
/// ancillary type A lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeBag {
    flags: BTreeSet<char>,
    params: BTreeMap<char, String>,
    lists: BTreeMap<char, Vec<String>>,
}

impl ModeBag {
    /// Whether a flag is set.
    pub fn has_flag(&self, mode: char) -> bool {
        self.flags.contains(&mode)
    }

    /// Parameter value for a type B/C mode.
    pub fn param(&self, mode: char) -> Option<&str> {
        self.params.get(&mode).map(String::as_str)
    }

    /// Entries recorded for a type A list mode.
    pub fn list(&self, mode: char) -> &[String] {
        self.lists.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop everything (RPL_CHANNELMODEIS replaces wholesale).
    pub fn clear(&mut self) {
        self.flags.clear();
        self.params.clear();
        self.lists.clear();
    }

    /// Apply one non-status change under its classification.
    pub fn apply(&mut self, change: &ModeChange, kind: ModeKind) {
        match kind {
            ModeKind::List => {
                let entries = self.lists.entry(change.mode).or_default();
                match (&change.param, change.add) {
                    (Some(entry), true) => {
                        if !entries.contains(entry) {
                            entries.push(entry.clone());
                        }
                    }
                    (Some(entry), false) => entries.retain(|e| e != entry),
                    // Bare list mode is a query, not a change.
                    (None, _) => {}
                }
            }
            ModeKind::ParamAlways | ModeKind::ParamWhenSet => {
                if change.add {
                    if let Some(param) = &change.param {
                        self.params.insert(change.mode, param.clone());
                    }
                } else {
                    self.params.remove(&change.mode);
                }
            }
            ModeKind::Flag | ModeKind::Unknown => {
                if change.add {
                    self.flags.insert(change.mode);
                } else {
                    self.flags.remove(&change.mode);
                }
            }
            // Status changes target memberships, not the bag.
            ModeKind::Status => {}
        }
    }
}

impl fmt::Display for ModeBag {
    /// Renders as flag letters (sorted) followed by `letter:value`
    /// pairs, e.g. `"mn k:hunter2 l:8"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if !self.flags.is_empty() {
            parts.push(self.flags.iter().collect());
        }
        for (mode, value) in &self.params {
            parts.push(format!("{}:{}", mode, value));
        }
        f.write_str(&parts.join(" "))
    }
}
