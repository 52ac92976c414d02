//! IRC numeric responses the session dispatches on.
//!
//! Trimmed to the numerics a client session actually consumes;
//! everything else is logged and dropped. WATCH numerics follow the
//! UnrealIRCd/Bahamut allocations, MONITOR and SASL follow IRCv3.
//!
//! # Reference
//! - Modern IRC numerics: <https://modern.ircdocs.horse/#numerics>

#![allow(non_camel_case_types)]

use std::str::FromStr;

/// A recognized numeric response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    /// 001 - Welcome; carries the server-assigned nickname
    RPL_WELCOME = 1,
    /// 004 - Server name, version, user and channel modes
    RPL_MYINFO = 4,
    /// 005 - ISUPPORT tokens
    RPL_ISUPPORT = 5,
    /// 221 - Current user modes
    RPL_UMODEIS = 221,
    /// 301 - Target is away
    RPL_AWAY = 301,
    /// 303 - ISON reply
    RPL_ISON = 303,
    /// 305 - No longer marked away
    RPL_UNAWAY = 305,
    /// 306 - Now marked away
    RPL_NOWAWAY = 306,
    /// 307 - WHOIS: registered nickname
    RPL_WHOISREGNICK = 307,
    /// 311 - WHOIS: user info
    RPL_WHOISUSER = 311,
    /// 313 - WHOIS: is an operator
    RPL_WHOISOPERATOR = 313,
    /// 318 - WHOIS: end of list
    RPL_ENDOFWHOIS = 318,
    /// 319 - WHOIS: channel memberships
    RPL_WHOISCHANNELS = 319,
    /// 324 - Channel modes
    RPL_CHANNELMODEIS = 324,
    /// 329 - Channel creation time
    RPL_CREATIONTIME = 329,
    /// 330 - WHOIS: logged in as
    RPL_WHOISACCOUNT = 330,
    /// 331 - No topic set
    RPL_NOTOPIC = 331,
    /// 332 - Topic
    RPL_TOPIC = 332,
    /// 333 - Topic setter and time
    RPL_TOPICWHOTIME = 333,
    /// 352 - WHO reply
    RPL_WHOREPLY = 352,
    /// 353 - NAMES entries
    RPL_NAMREPLY = 353,
    /// 366 - End of NAMES
    RPL_ENDOFNAMES = 366,
    /// 376 - End of MOTD
    RPL_ENDOFMOTD = 376,
    /// 422 - No MOTD
    ERR_NOMOTD = 422,
    /// 431 - No nickname given
    ERR_NONICKNAMEGIVEN = 431,
    /// 432 - Erroneous nickname
    ERR_ERRONEUSNICKNAME = 432,
    /// 433 - Nickname in use
    ERR_NICKNAMEINUSE = 433,
    /// 598 - WATCH: target went away
    RPL_GONEAWAY = 598,
    /// 599 - WATCH: target came back
    RPL_NOTAWAY = 599,
    /// 600 - WATCH: target logged on
    RPL_LOGON = 600,
    /// 601 - WATCH: target logged off
    RPL_LOGOFF = 601,
    /// 602 - WATCH: target removed from list
    RPL_WATCHOFF = 602,
    /// 604 - WATCH: target is online
    RPL_NOWON = 604,
    /// 605 - WATCH: target is offline
    RPL_NOWOFF = 605,
    /// 607 - WATCH: end of list
    RPL_ENDOFWATCHLIST = 607,
    /// 609 - WATCH: target is online but away
    RPL_NOWISAWAY = 609,
    /// 670 - STARTTLS accepted
    RPL_STARTTLS = 670,
    /// 691 - STARTTLS failed
    ERR_STARTTLS = 691,
    /// 730 - MONITOR: targets online
    RPL_MONONLINE = 730,
    /// 731 - MONITOR: targets offline
    RPL_MONOFFLINE = 731,
    /// 732 - MONITOR: list entry
    RPL_MONLIST = 732,
    /// 733 - MONITOR: end of list
    RPL_ENDOFMONLIST = 733,
    /// 734 - MONITOR: list full
    ERR_MONLISTFULL = 734,
    /// 900 - Logged in
    RPL_LOGGEDIN = 900,
    /// 901 - Logged out
    RPL_LOGGEDOUT = 901,
    /// 902 - SASL: nick locked
    ERR_NICKLOCKED = 902,
    /// 903 - SASL: success
    RPL_SASLSUCCESS = 903,
    /// 904 - SASL: failed
    ERR_SASLFAIL = 904,
    /// 905 - SASL: message too long
    ERR_SASLTOOLONG = 905,
    /// 906 - SASL: aborted
    ERR_SASLABORTED = 906,
    /// 907 - SASL: already authenticated
    ERR_SASLALREADY = 907,
    /// 908 - SASL: available mechanisms
    RPL_SASLMECHS = 908,
}

impl Response {
    /// Map a numeric code to a recognized response.
    pub fn from_code(code: u16) -> Option<Response> {
        use Response::*;
        Some(match code {
            1 => RPL_WELCOME,
            4 => RPL_MYINFO,
            5 => RPL_ISUPPORT,
            221 => RPL_UMODEIS,
            301 => RPL_AWAY,
            303 => RPL_ISON,
            305 => RPL_UNAWAY,
            306 => RPL_NOWAWAY,
            307 => RPL_WHOISREGNICK,
            311 => RPL_WHOISUSER,
            313 => RPL_WHOISOPERATOR,
            318 => RPL_ENDOFWHOIS,
            319 => RPL_WHOISCHANNELS,
            324 => RPL_CHANNELMODEIS,
            329 => RPL_CREATIONTIME,
            330 => RPL_WHOISACCOUNT,
            331 => RPL_NOTOPIC,
            332 => RPL_TOPIC,
            333 => RPL_TOPICWHOTIME,
            352 => RPL_WHOREPLY,
            353 => RPL_NAMREPLY,
            366 => RPL_ENDOFNAMES,
            376 => RPL_ENDOFMOTD,
            422 => ERR_NOMOTD,
            431 => ERR_NONICKNAMEGIVEN,
            432 => ERR_ERRONEUSNICKNAME,
            433 => ERR_NICKNAMEINUSE,
            598 => RPL_GONEAWAY,
            599 => RPL_NOTAWAY,
            600 => RPL_LOGON,
            601 => RPL_LOGOFF,
            602 => RPL_WATCHOFF,
            604 => RPL_NOWON,
            605 => RPL_NOWOFF,
            607 => RPL_ENDOFWATCHLIST,
            609 => RPL_NOWISAWAY,
            670 => RPL_STARTTLS,
            691 => ERR_STARTTLS,
            730 => RPL_MONONLINE,
            731 => RPL_MONOFFLINE,
            732 => RPL_MONLIST,
            733 => RPL_ENDOFMONLIST,
            734 => ERR_MONLISTFULL,
            900 => RPL_LOGGEDIN,
            901 => RPL_LOGGEDOUT,
            902 => ERR_NICKLOCKED,
            903 => RPL_SASLSUCCESS,
            904 => ERR_SASLFAIL,
            905 => ERR_SASLTOOLONG,
            906 => ERR_SASLABORTED,
            907 => ERR_SASLALREADY,
            908 => RPL_SASLMECHS,
            _ => return None,
        })
    }

    /// The numeric code.
    pub fn code(&self) -> u16 {
        *self as u16
    }
}

impl FromStr for Response {
    type Err = ();

    /// Parse a three-digit command token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        s.parse::<u16>()
            .ok()
            .and_then(Response::from_code)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_padded_numerics() {
        assert_eq!("001".parse::<Response>(), Ok(Response::RPL_WELCOME));
        assert_eq!("005".parse::<Response>(), Ok(Response::RPL_ISUPPORT));
        assert_eq!("731".parse::<Response>(), Ok(Response::RPL_MONOFFLINE));
        assert!("1".parse::<Response>().is_err());
        assert!("999".parse::<Response>().is_err());
        assert!("PRIVMSG".parse::<Response>().is_err());
    }

    #[test]
    fn code_round_trip() {
        assert_eq!(Response::RPL_ENDOFNAMES.code(), 366);
        assert_eq!(Response::from_code(366), Some(Response::RPL_ENDOFNAMES));
    }
}
