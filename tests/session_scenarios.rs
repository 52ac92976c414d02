//! End-to-end session scenarios: literal inbound lines against
//! observable state and outbound lines.

use std::time::{Duration, Instant};

use irc_session::{
    ChannelStatus, ClientState, Config, DisconnectReason, Event, LocalUser, SaslMode,
    Session,
};

fn new_session(config: Config) -> Session {
    let user = LocalUser::new("Alice", "alice", "Alice Liddell");
    Session::new(user, None, config).expect("unbound local user")
}

fn connected(config: Config) -> Session {
    let mut session = new_session(config);
    session.connect();
    session.on_connected(false);
    session.take_outbound();
    session.take_events();
    session
}

fn online(config: Config) -> Session {
    let mut session = connected(config);
    session.feed_line(":srv 001 Alice :Welcome");
    session.feed_line(":srv 376 Alice :End of /MOTD command.");
    session.take_outbound();
    session.take_events();
    session
}

fn outbound_strings(session: &mut Session) -> Vec<String> {
    session
        .take_outbound()
        .into_iter()
        .map(|line| line.to_string())
        .collect()
}

#[test]
fn welcome_overrides_nickname() {
    let mut session = connected(Config::default());
    session.feed_line(":srv 001 Alice1 :Welcome to the network, Alice1");

    assert_eq!(session.state(), ClientState::ReceivingServerInfo);
    assert_eq!(session.nickname(), "Alice1");

    let events = session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::NicknameChange { old, new, is_self: true }
            if old == "Alice" && new == "Alice1"
    )));
}

#[test]
fn isupport_escapes_and_mode_taxonomy() {
    let mut session = connected(Config::default());
    session.feed_line(
        ":srv 005 Alice NETWORK=Test\\x20Network CHANMODES=bq,k,l,n EXCEPTS=e INVEX=I \
         PREFIX=(odv)@*+ :are supported by this server",
    );

    assert_eq!(session.network_name(), Some("Test Network"));
    assert_eq!(session.isupport().chan_modes().to_string(), "Ibe,k,l,n,odv");

    let table = session.isupport().chan_modes();
    let prefixes = session.isupport().status_prefixes();
    let (status, consumed) = ChannelStatus::from_prefixes("*@", prefixes, table);
    assert_eq!(consumed, 2);
    assert_eq!(status.letters(), "od");
}

#[test]
fn monitor_offline_retained_on_common_channel() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 353 Alice = #w :Alice Bob");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");
    session.take_events();

    session.feed_line(":srv 731 Alice Bob");
    let events = session.take_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::MonitorOffline { nick } if nick == "Bob")));
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::UserQuit { .. } | Event::UserDisappeared { .. })));

    let bob = session.store().user_id("bob").expect("tracked");
    assert!(session.store().user(bob).unwrap().seen);

    session.feed_line(":Bob!bob@host QUIT :bye");
    let events = session.take_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::UserQuit { nick, reason } if nick == "Bob" && reason == "bye")));
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::UserDisappeared { nick } if nick == "Bob")));
    // Still monitored, so the entry stays but is no longer seen.
    let bob = session.store().user_id("bob").expect("retained");
    assert!(!session.store().user(bob).unwrap().seen);
}

#[test]
fn sasl_plain_exact_chunk_boundary() {
    // 1 + 5 + 1 + 293 = 300 payload bytes encode to exactly 400
    // base64 characters.
    let config = Config {
        sasl: SaslMode::Required,
        sasl_username: Some("alice".to_owned()),
        sasl_password: Some("p".repeat(293)),
        allow_sasl_without_tls: true,
        ..Config::default()
    };
    let mut session = connected(config);

    session.feed_line(":srv CAP * LS :sasl=PLAIN");
    let lines = outbound_strings(&mut session);
    assert_eq!(lines, ["CAP REQ sasl"]);

    session.feed_line(":srv CAP * ACK :sasl");
    let lines = outbound_strings(&mut session);
    assert_eq!(lines, ["AUTHENTICATE PLAIN"]);

    session.feed_line("AUTHENTICATE +");
    let lines = outbound_strings(&mut session);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("AUTHENTICATE "));
    assert_eq!(lines[0].len(), "AUTHENTICATE ".len() + 400);
    assert_eq!(lines[1], "AUTHENTICATE +");

    session.feed_line(":srv 903 Alice :SASL authentication successful");
    let lines = outbound_strings(&mut session);
    assert_eq!(lines[0], "CAP END");
    assert_eq!(lines[1], "NICK Alice");
    assert!(lines[2].starts_with("USER alice 0 *"));
    assert_eq!(session.state(), ClientState::Registering);
}

#[test]
fn composite_channel_mode_application() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 324 Alice #w +nt");
    session.take_events();

    session.feed_line(":Bob!bob@host MODE #w +lm-t+k 8 hunter2");
    let events = session.take_events();
    let rendered = events
        .iter()
        .find_map(|event| match event {
            Event::ChannelModesSet { channel, changes, .. } if channel == "#w" => {
                Some(irc_session::format_changes(changes))
            }
            _ => None,
        })
        .expect("mode event");
    assert_eq!(rendered, "+l 8,+m,-t,+k hunter2");

    let channel_id = session.store().channel_id("#w").unwrap();
    let channel = session.store().channel(channel_id).unwrap();
    assert_eq!(channel.modes.to_string(), "mn k:hunter2 l:8");
}

#[test]
fn casemapping_collision_aborts() {
    let mut session = connected(Config::default());
    session.feed_line(":srv 005 Alice CASEMAPPING=ascii :are supported by this server");
    session.feed_line(":Alice!alice@host JOIN #[wonderland]");
    session.feed_line(":srv 353 Alice = #[wonderland] :Alice [Bob] {Bob}");
    session.feed_line(":srv 366 Alice #[wonderland] :End of /NAMES list.");
    session.take_outbound();

    // Distinct under ASCII mapping.
    assert!(session.store().user_id("[Bob]").is_some());
    assert!(session.store().user_id("{Bob}").is_some());

    session.feed_line(":srv 005 Alice CASEMAPPING=rfc1459 :are supported by this server");
    let lines = outbound_strings(&mut session);
    assert!(lines
        .iter()
        .any(|line| line == "QUIT :Casemapping change caused a name collision"));
    assert_eq!(session.state(), ClientState::Disconnecting);
    assert_eq!(session.disconnect_reason(), Some(DisconnectReason::Exception));
}

#[test]
fn names_task_completes_on_endofnames() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    let mut task = session
        .take_events()
        .into_iter()
        .find_map(|event| match event {
            Event::ChannelJoin { names, .. } => names,
            _ => None,
        })
        .expect("self join carries a names task");

    assert!(task.try_result().is_none());
    session.feed_line(":srv 353 Alice = #w :Alice Bob");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");
    assert_eq!(task.try_result(), Some(Ok(())));
}

#[test]
fn names_task_fails_on_disconnect() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    let mut task = session
        .take_events()
        .into_iter()
        .find_map(|event| match event {
            Event::ChannelJoin { names, .. } => names,
            _ => None,
        })
        .expect("names task");

    session.on_disconnected(Some(DisconnectReason::ServerQuit));
    assert_eq!(task.try_result(), Some(Err(DisconnectReason::ServerQuit)));
    assert_eq!(session.state(), ClientState::Disconnected);
    assert!(session.store().channel_id("#w").is_none());
}

#[test]
fn names_batch_replaces_previous_view() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 353 Alice = #w :Alice Bob Carol");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");
    session.take_events();

    session.feed_line(":srv 353 Alice = #w :Alice Carol");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");
    let events = session.take_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::UserDisappeared { nick } if nick == "Bob")));
    assert!(session.store().user_id("bob").is_none());
    assert!(session.store().user_id("carol").is_some());
}

#[test]
fn multi_prefix_names_entries() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 353 Alice = #w :Alice @+Bob carol!c@h");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");

    let channel_id = session.store().channel_id("#w").unwrap();
    let channel = session.store().channel(channel_id).unwrap();
    let bob = channel.member("bob").expect("bob membership");
    assert_eq!(bob.status.letters(), "ov");

    // userhost-in-names resolves ident and host from the entry.
    let carol = session.store().user_id("carol").unwrap();
    let carol = session.store().user(carol).unwrap();
    assert_eq!(carol.ident.as_deref(), Some("c"));
    assert_eq!(carol.host.as_deref(), Some("h"));
}

#[test]
fn part_and_kick_lifecycle() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 353 Alice = #w :Alice Bob Carol");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");
    session.take_events();

    session.feed_line(":Bob!bob@host PART #w :off to tea");
    let events = session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::ChannelPart { channel, nick, message }
            if channel == "#w" && nick == "Bob" && message.as_deref() == Some("off to tea")
    )));
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::UserDisappeared { nick } if nick == "Bob")));
    assert!(session.store().user_id("bob").is_none());

    session.feed_line(":srv KICK #w Carol :behave");
    let events = session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::ChannelKick { channel, nick, .. } if channel == "#w" && nick == "Carol"
    )));
    assert!(session.store().user_id("carol").is_none());

    // Self-part destroys the channel.
    session.feed_line(":Alice!alice@host PART #w");
    assert!(session.store().channel_id("#w").is_none());
}

#[test]
fn nickname_change_relocates_user() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 353 Alice = #w :Alice @Bob");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");
    session.take_events();

    session.feed_line(":Bob!bob@host NICK Robert");
    let events = session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::NicknameChange { old, new, is_self: false }
            if old == "Bob" && new == "Robert"
    )));

    let channel_id = session.store().channel_id("#w").unwrap();
    let channel = session.store().channel(channel_id).unwrap();
    let membership = channel.member("robert").expect("relocated membership");
    assert_eq!(membership.status.letters(), "o");
    assert!(channel.member("bob").is_none());
}

#[test]
fn topic_change_carries_old_snapshot() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 332 Alice #w :old topic");
    session.feed_line(":srv 333 Alice #w Bob 1700000000");
    session.take_events();

    session.feed_line(":Carol!c@h TOPIC #w :new topic");
    let events = session.take_events();
    let found = events.iter().any(|event| match event {
        Event::ChannelTopicChanged { channel, by, old_topic, old_setter, old_stamp } => {
            channel == "#w"
                && by == "Carol"
                && old_topic.as_deref() == Some("old topic")
                && old_setter.as_deref() == Some("Bob")
                && old_stamp.is_some()
        }
        _ => false,
    });
    assert!(found);

    let channel_id = session.store().channel_id("#w").unwrap();
    let channel = session.store().channel(channel_id).unwrap();
    assert_eq!(channel.topic.as_deref(), Some("new topic"));
}

#[test]
fn message_dispatch_kinds() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.take_events();

    session.feed_line(":Bob!b@h PRIVMSG #w :hello channel");
    session.feed_line(":Bob!b@h PRIVMSG @#w :ops only");
    session.feed_line(":Bob!b@h PRIVMSG Alice :hello you");
    session.feed_line(":Bob!b@h PRIVMSG $$* :network blast");
    session.feed_line(":Bob!b@h NOTICE #w :channel notice");
    session.feed_line(":Bob!b@h PRIVMSG Alice :\u{1}VERSION\u{1}");
    session.feed_line("@+typing=active :Bob!b@h TAGMSG Alice");

    let events = session.take_events();
    assert!(events.iter().any(|e| matches!(e, Event::ChannelMessage { channel, text, .. }
        if channel == "#w" && text == "hello channel")));
    assert!(events.iter().any(|e| matches!(e, Event::ChannelMessage { channel, status, .. }
        if channel == "#w" && status.letters() == "o")));
    assert!(events.iter().any(|e| matches!(e, Event::PrivateMessage { nick, text }
        if nick == "Bob" && text == "hello you")));
    assert!(events.iter().any(|e| matches!(e, Event::BroadcastMessage { target, .. }
        if target == "$$*")));
    assert!(events.iter().any(|e| matches!(e, Event::ChannelNotice { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::PrivateCtcp { text, .. }
        if text == "VERSION")));
    assert!(events.iter().any(|e| matches!(e, Event::PrivateTagMsg { nick } if nick == "Bob")));
}

#[test]
fn ctcp_interior_markers_preserved() {
    let mut session = online(Config::default());
    session.feed_line(":Bob!b@h PRIVMSG Alice :\u{1}A\u{1}B\u{1}");
    let events = session.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PrivateCtcp { text, .. } if text == "A\u{1}B")));
}

#[test]
fn ping_keepalive_and_timeout() {
    let config = Config { ping_timeout: 60, ..Config::default() };
    let mut session = online(config);
    session.take_outbound();

    let start = Instant::now();
    session.tick(start + Duration::from_secs(61));
    let lines = outbound_strings(&mut session);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("PING "));

    session.tick(start + Duration::from_secs(122));
    let lines = outbound_strings(&mut session);
    assert!(lines.iter().any(|line| line == "QUIT :Ping timeout"));
    assert_eq!(session.disconnect_reason(), Some(DisconnectReason::PingTimeout));
}

#[test]
fn ping_replied_with_pong() {
    let mut session = online(Config::default());
    session.feed_line("PING :irc.example.net");
    let lines = outbound_strings(&mut session);
    assert_eq!(lines, ["PONG irc.example.net"]);
}

#[test]
fn sasl_required_without_cap_aborts_on_welcome() {
    let config = Config { sasl: SaslMode::Required, ..Config::default() };
    let mut session = connected(config);
    session.feed_line(":srv 001 Alice :Welcome");
    let lines = outbound_strings(&mut session);
    assert!(lines
        .iter()
        .any(|line| line == "QUIT :SASL authentication is not supported by this server"));
    assert_eq!(
        session.disconnect_reason(),
        Some(DisconnectReason::SaslAuthenticationFailed)
    );
}

#[test]
fn sasl_required_without_shared_mechanism_aborts() {
    let config = Config {
        sasl: SaslMode::Required,
        sasl_username: Some("alice".to_owned()),
        sasl_password: Some("secret".to_owned()),
        allow_sasl_without_tls: true,
        ..Config::default()
    };
    let mut session = connected(config);
    session.feed_line(":srv CAP * LS :sasl=SCRAM-SHA-512");
    let lines = outbound_strings(&mut session);
    assert!(lines
        .iter()
        .any(|line| line == "QUIT :SASL authentication mechanism not supported"));
}

#[test]
fn cap_multiline_ls_accumulates_before_req() {
    let mut session = connected(Config::default());
    session.feed_line(":srv CAP * LS * :multi-prefix away-notify");
    assert!(outbound_strings(&mut session).is_empty());

    session.feed_line(":srv CAP * LS :extended-join");
    let events = session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::CapabilitiesAdded { caps }
            if caps.len() == 3 && caps.contains(&"extended-join".to_owned())
    )));
    let lines = outbound_strings(&mut session);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("CAP REQ "));
    for cap in ["multi-prefix", "away-notify", "extended-join"] {
        assert!(lines[0].contains(cap));
    }
}

#[test]
fn cap_del_disables_and_notifies() {
    let mut session = connected(Config::default());
    session.feed_line(":srv CAP * LS :away-notify cap-notify");
    session.feed_line(":srv CAP * ACK :away-notify cap-notify");
    session.take_events();

    session.feed_line(":srv CAP * DEL :away-notify");
    let events = session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::CapabilitiesDeleted { caps } if caps == &["away-notify".to_owned()]
    )));
    assert!(!session.capabilities().is_supported("away-notify"));
}

#[test]
fn extended_join_populates_account() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.take_events();

    session.feed_line(":Bob!bob@host JOIN #w accountbob :Bob the Builder");
    let events = session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::ChannelJoin { nick, account, names: None, .. }
            if nick == "Bob" && account.as_deref() == Some("accountbob")
    )));
    let bob = session.store().user_id("bob").unwrap();
    let bob = session.store().user(bob).unwrap();
    assert_eq!(bob.account.as_deref(), Some("accountbob"));
    assert_eq!(bob.full_name.as_deref(), Some("Bob the Builder"));
}

#[test]
fn account_notify_updates_login_state() {
    let mut session = online(Config::default());
    session.feed_line(":Bob!b@h PRIVMSG Alice :hi");
    session.feed_line(":Bob!b@h ACCOUNT services-bob");
    let bob = session.store().user_id("bob").unwrap();
    assert_eq!(
        session.store().user(bob).unwrap().account.as_deref(),
        Some("services-bob")
    );
    session.feed_line(":Bob!b@h ACCOUNT *");
    assert!(session.store().user(bob).unwrap().account.is_none());
}

#[test]
fn whois_account_wins_over_regnick() {
    let mut session = online(Config::default());
    session.feed_line(":srv 311 Alice Bob bob host * :Bob");
    session.feed_line(":srv 330 Alice Bob trueaccount :is logged in as");
    session.feed_line(":srv 307 Alice Bob :is a registered nick");
    let bob = session.store().user_id("bob").unwrap();
    assert_eq!(
        session.store().user(bob).unwrap().account.as_deref(),
        Some("trueaccount")
    );

    // Without a preceding 330, REGNICK fills the account.
    session.feed_line(":srv 311 Alice Carol carol host * :Carol");
    session.feed_line(":srv 307 Alice Carol :is a registered nick");
    let carol = session.store().user_id("carol").unwrap();
    assert_eq!(
        session.store().user(carol).unwrap().account.as_deref(),
        Some("Carol")
    );
}

#[test]
fn who_reply_updates_flags_and_status() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 353 Alice = #w :Alice Bob");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");

    session.feed_line(":srv 352 Alice #w bob example.org srv Bob G*@ :0 Bob the Great");
    let bob = session.store().user_id("bob").unwrap();
    let user = session.store().user(bob).unwrap();
    assert!(user.away);
    assert!(user.is_oper);
    assert_eq!(user.ident.as_deref(), Some("bob"));
    assert_eq!(user.host.as_deref(), Some("example.org"));
    assert_eq!(user.full_name.as_deref(), Some("Bob the Great"));

    let channel_id = session.store().channel_id("#w").unwrap();
    let membership = session.store().channel(channel_id).unwrap().member("bob").unwrap();
    assert_eq!(membership.status.letters(), "o");
}

#[test]
fn watch_online_clears_away() {
    let mut session = online(Config::default());
    session.feed_line(":srv 005 Alice WATCH=128 :are supported by this server");
    session.feed_line(":Bob!b@h PRIVMSG Alice :hi");
    let bob = session.store().user_id("bob").unwrap();
    session.feed_line(":srv 301 Alice Bob :gone fishing");
    assert!(session.store().user(bob).unwrap().away);

    session.feed_line(":srv 604 Alice Bob bob example.org 1700000000 :is online");
    let user = session.store().user(bob).unwrap();
    assert!(!user.away);
    assert!(user.monitored);
    let events = session.take_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::MonitorOnline { nick } if nick == "Bob")));
}

#[test]
fn watch_list_sweep_on_endofwatchlist() {
    let mut session = online(Config::default());
    session.feed_line(":srv 005 Alice WATCH=128 :are supported by this server");
    // Two tracked users; only Bob shows up in the next list dump.
    session.feed_line(":srv 604 Alice Bob bob h 1700000000 :is online");
    session.feed_line(":srv 604 Alice Carol carol h 1700000000 :is online");
    session.feed_line(":srv 607 Alice :End of WATCH list");
    session.take_events();

    session.feed_line(":srv 604 Alice Bob bob h 1700000000 :is online");
    session.feed_line(":srv 607 Alice :End of WATCH list");
    let events = session.take_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::UserDisappeared { nick } if nick == "Carol")));
    assert!(session.store().user_id("carol").is_none());
    assert!(session.store().user_id("bob").is_some());
}

#[test]
fn monitor_add_prefers_monitor_over_watch() {
    let mut session = online(Config::default());
    session.feed_line(":srv 005 Alice WATCH=32 MONITOR=64 :are supported by this server");
    session.take_outbound();
    session.monitor_add(&["Bob", "Carol"]);
    let lines = outbound_strings(&mut session);
    assert_eq!(lines, ["MONITOR + Bob,Carol"]);

    session.monitor_remove(&["bob"]);
    let lines = outbound_strings(&mut session);
    assert_eq!(lines, ["MONITOR - bob"]);
    assert_eq!(session.monitor_list(), ["Carol".to_owned()]);
}

#[test]
fn split_long_privmsg_on_whitespace() {
    let mut session = online(Config::default());
    session.take_outbound();
    let word = "abcdefghi";
    let text = std::iter::repeat(word).take(60).collect::<Vec<_>>().join(" ");
    session.send_privmsg("#w", &text);
    let lines = outbound_strings(&mut session);
    assert!(lines.len() > 1);
    for line in &lines {
        assert!(line.len() <= 510);
        let body = line
            .strip_prefix("PRIVMSG #w :")
            .or_else(|| line.strip_prefix("PRIVMSG #w "))
            .expect("message envelope");
        // Whitespace splitting keeps words intact.
        for piece in body.split(' ') {
            assert_eq!(piece, word);
        }
    }
}

#[test]
fn send_rejects_embedded_newline() {
    let mut session = online(Config::default());
    let line = irc_session::Line::cmd("PRIVMSG", ["#w", "a\r\nQUIT"]);
    assert!(session.send(line).is_err());
}

#[test]
fn local_user_binds_once() {
    let user = LocalUser::new("Alice", "alice", "Alice");
    let first = Session::new(user.clone(), None, Config::default());
    assert!(first.is_ok());
    assert!(Session::new(user.clone(), None, Config::default()).is_err());
    drop(first);
    assert!(Session::new(user, None, Config::default()).is_ok());
}

#[test]
fn membership_invariants_after_churn() {
    let mut session = online(Config::default());
    session.feed_line(":Alice!alice@host JOIN #w");
    session.feed_line(":srv 353 Alice = #w :Alice @Bob +Carol");
    session.feed_line(":srv 366 Alice #w :End of /NAMES list.");
    session.feed_line(":Alice!alice@host JOIN #v");
    session.feed_line(":srv 353 Alice = #v :Alice Bob");
    session.feed_line(":srv 366 Alice #v :End of /NAMES list.");
    session.feed_line(":Dave!d@h JOIN #w");
    session.feed_line(":Carol!c@h PART #w");
    session.feed_line(":Bob!b@h QUIT :gone");

    let store = session.store();
    // I1: membership link symmetry.
    for (channel_id, channel) in store.channels() {
        for (key, membership) in channel.members() {
            let user = store.user(membership.user).expect("member resolves");
            assert!(user.seen, "I2: member {} must be seen", key);
            assert!(
                user.channels.values().any(|ch| *ch == channel_id),
                "I1: user {} links back to channel {}",
                user.nickname,
                channel.name
            );
        }
    }
    // I3: everyone in the index is seen or monitored.
    for (_, user) in store.users() {
        assert!(user.seen || user.monitored, "I3 violated for {}", user.nickname);
    }
    // Bob is fully gone; Carol left #w but was never monitored.
    assert!(store.user_id("bob").is_none());
    assert!(store.user_id("carol").is_none());
    assert!(store.user_id("dave").is_some());
}

#[test]
fn rekey_preserves_entity_identity_without_collision() {
    let mut session = connected(Config::default());
    session.feed_line(":srv 005 Alice CASEMAPPING=ascii :are supported by this server");
    session.feed_line(":Alice!alice@host JOIN #[w]");
    session.feed_line(":srv 353 Alice = #[w] :Alice [Bob]");
    session.feed_line(":srv 366 Alice #[w] :End of /NAMES list.");
    let bob = session.store().user_id("[bob]").unwrap();

    session.feed_line(":srv 005 Alice CASEMAPPING=rfc1459 :are supported by this server");
    assert_eq!(session.state(), ClientState::CapabilityNegotiating);
    // Same entity, reachable under the new mapping's equivalences.
    assert_eq!(session.store().user_id("{bob}"), Some(bob));
    assert_eq!(session.store().user_id("[BOB]"), Some(bob));
    assert!(session.store().channel_id("#{w}").is_some());
}
