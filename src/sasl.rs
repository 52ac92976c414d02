//! SASL authentication.
//!
//! Mechanisms are a fan-out seam: the built-in EXTERNAL and PLAIN
//! mechanisms are registered in priority order and callers may
//! register their own. The [`Authenticator`] owns one attempt at a
//! time, accumulates multi-line challenges, and chunks responses to
//! the 400-byte AUTHENTICATE limit.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//! - RFC 4616 (PLAIN)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Maximum length of a single AUTHENTICATE payload chunk.
pub const SASL_CHUNK_SIZE: usize = 400;

/// What the session knows when deciding whether a mechanism can run.
#[derive(Clone, Debug, Default)]
pub struct SaslContext {
    /// Whether the connection is TLS-protected.
    pub tls_active: bool,
    /// Whether password material may be sent in plaintext.
    pub allow_plaintext: bool,
    /// Configured SASL username.
    pub username: Option<String>,
    /// Configured SASL password.
    pub password: Option<String>,
}

/// One registered SASL mechanism.
pub trait SaslMechanism {
    /// Wire name, e.g. `"PLAIN"`.
    fn name(&self) -> &str;
    /// Whether this mechanism is usable under the given context.
    fn can_attempt(&self, ctx: &SaslContext) -> bool;
    /// Create the per-attempt state.
    fn begin(&self, ctx: &SaslContext) -> Box<dyn SaslAttempt>;
}

/// Per-attempt state of a mechanism.
pub trait SaslAttempt {
    /// Produce the response to a (possibly empty) server challenge.
    /// `None` yields a bare `AUTHENTICATE +`.
    fn respond(&mut self, challenge: &[u8]) -> Option<Vec<u8>>;
}

/// The PLAIN mechanism: `authzid NUL authcid NUL password`.
pub struct Plain;

struct PlainAttempt {
    payload: Option<Vec<u8>>,
}

impl SaslMechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn can_attempt(&self, ctx: &SaslContext) -> bool {
        ctx.username.is_some()
            && ctx.password.is_some()
            && (ctx.tls_active || ctx.allow_plaintext)
    }

    fn begin(&self, ctx: &SaslContext) -> Box<dyn SaslAttempt> {
        let username = ctx.username.clone().unwrap_or_default();
        let password = ctx.password.clone().unwrap_or_default();
        let mut payload = Vec::with_capacity(username.len() + password.len() + 2);
        payload.push(0);
        payload.extend_from_slice(username.as_bytes());
        payload.push(0);
        payload.extend_from_slice(password.as_bytes());
        Box::new(PlainAttempt { payload: Some(payload) })
    }
}

impl SaslAttempt for PlainAttempt {
    fn respond(&mut self, _challenge: &[u8]) -> Option<Vec<u8>> {
        self.payload.take()
    }
}

/// The EXTERNAL mechanism: identity comes from the TLS client
/// certificate; the response is empty.
pub struct External;

struct ExternalAttempt;

impl SaslMechanism for External {
    fn name(&self) -> &str {
        "EXTERNAL"
    }

    fn can_attempt(&self, ctx: &SaslContext) -> bool {
        ctx.tls_active || ctx.allow_plaintext
    }

    fn begin(&self, _ctx: &SaslContext) -> Box<dyn SaslAttempt> {
        Box::new(ExternalAttempt)
    }
}

impl SaslAttempt for ExternalAttempt {
    fn respond(&mut self, _challenge: &[u8]) -> Option<Vec<u8>> {
        Some(Vec::new())
    }
}

/// Result of feeding one inbound AUTHENTICATE argument.
#[derive(Debug, PartialEq, Eq)]
pub enum ChallengeAction {
    /// An exactly-400-byte chunk was decoded; more follows.
    Wait,
    /// Send these AUTHENTICATE arguments, in order.
    Respond(Vec<String>),
}

/// Owns the mechanism registry and the in-flight attempt.
pub struct Authenticator {
    mechanisms: Vec<Box<dyn SaslMechanism>>,
    shared: Option<Vec<String>>,
    current: Option<usize>,
    attempt: Option<Box<dyn SaslAttempt>>,
    challenge: Vec<u8>,
}

impl Default for Authenticator {
    fn default() -> Self {
        Authenticator {
            mechanisms: vec![Box::new(External), Box::new(Plain)],
            shared: None,
            current: None,
            attempt: None,
            challenge: Vec::new(),
        }
    }
}

impl Authenticator {
    /// Register an additional mechanism, tried after the built-ins.
    pub fn register(&mut self, mechanism: Box<dyn SaslMechanism>) {
        self.mechanisms.push(mechanism);
    }

    /// Record the server's advertised mechanism list (the `sasl=`
    /// capability value or numeric 908). An unknown list means every
    /// registered mechanism is assumed shared.
    pub fn set_shared(&mut self, list: &str) {
        self.shared = Some(
            list.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(|m| m.to_ascii_uppercase())
                .collect(),
        );
    }

    fn is_shared(&self, name: &str) -> bool {
        match &self.shared {
            Some(list) => list.iter().any(|m| m.eq_ignore_ascii_case(name)),
            None => true,
        }
    }

    /// Whether any mechanism could run under `ctx`.
    pub fn has_eligible(&self, ctx: &SaslContext) -> bool {
        self.mechanisms
            .iter()
            .any(|m| self.is_shared(m.name()) && m.can_attempt(ctx))
    }

    /// Name of the mechanism currently attempting, if any.
    pub fn current_mechanism(&self) -> Option<&str> {
        self.current.map(|i| self.mechanisms[i].name())
    }

    /// Begin the next eligible attempt after the current one (or the
    /// first, when none is in flight). Returns the mechanism name to
    /// announce with `AUTHENTICATE <MECH>`.
    pub fn start_next(&mut self, ctx: &SaslContext) -> Option<String> {
        let from = self.current.map_or(0, |i| i + 1);
        let next = (from..self.mechanisms.len()).find(|&i| {
            let m = &self.mechanisms[i];
            self.is_shared(m.name()) && m.can_attempt(ctx)
        })?;
        self.current = Some(next);
        self.attempt = Some(self.mechanisms[next].begin(ctx));
        self.challenge.clear();
        Some(self.mechanisms[next].name().to_owned())
    }

    /// Abandon the in-flight attempt (success, failure exhaustion,
    /// or disconnect).
    pub fn reset(&mut self) {
        self.current = None;
        self.attempt = None;
        self.challenge.clear();
    }

    /// Feed one inbound `AUTHENTICATE` argument. `+` is the empty
    /// challenge; otherwise base64, where a decoded length of
    /// exactly 400 bytes means a continuation line follows.
    pub fn handle_challenge(&mut self, arg: &str) -> ChallengeAction {
        if arg != "+" {
            match BASE64.decode(arg) {
                Ok(chunk) => {
                    let complete = chunk.len() < SASL_CHUNK_SIZE;
                    self.challenge.extend_from_slice(&chunk);
                    if !complete {
                        return ChallengeAction::Wait;
                    }
                }
                Err(err) => {
                    tracing::debug!(%err, "undecodable SASL challenge treated as empty");
                }
            }
        }

        let challenge = std::mem::take(&mut self.challenge);
        let response = self
            .attempt
            .as_mut()
            .and_then(|attempt| attempt.respond(&challenge));
        ChallengeAction::Respond(encode_response(response))
    }
}

/// Encode a mechanism response into AUTHENTICATE arguments: base64
/// in 400-byte chunks, with a trailing `+` when the encoded length
/// is a positive multiple of the chunk size. `None` and the empty
/// buffer both become a bare `+`.
fn encode_response(response: Option<Vec<u8>>) -> Vec<String> {
    let Some(data) = response else {
        return vec!["+".to_owned()];
    };
    if data.is_empty() {
        return vec!["+".to_owned()];
    }
    let encoded = BASE64.encode(&data);
    let mut out: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();
    if encoded.len() % SASL_CHUNK_SIZE == 0 {
        out.push("+".to_owned());
    }
    out
}
