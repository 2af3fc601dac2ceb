//! Login-sequence protocol handlers.
//!
//! One entry point, [`handle_packet`], dispatches a complete packet body to
//! the handler for the connection's current phase. Any [`Reject`] ends the
//! connection; there are no recoverable protocol errors.

use javelin_crypto::verify_forwarding_signature;
use javelin_proto::forwarding::{ForwardedIdentity, SIGNATURE_LEN};
use javelin_proto::packets::{
    login_plugin_request, login_success, HANDSHAKE, LOGIN_PLUGIN_RESPONSE, LOGIN_START,
    NEXT_STATE_LOGIN,
};
use javelin_proto::{PacketOut, PacketReader, ProtoError};
use rand::Rng;

use crate::connection::{Connection, Phase};
use crate::server::{ConnId, HostHandler};

const MAX_HOSTNAME_LEN: i32 = 255;
const MAX_USERNAME_LEN: i32 = 16;

/// Why a packet ended its connection.
#[derive(Debug)]
pub(crate) enum Reject {
    Malformed(ProtoError),
    UnexpectedId(i32),
    WrongNextState(i32),
    TokenMismatch,
    NotUnderstood,
    BadSignature,
    Denied,
    UnexpectedPacket(Phase),
    PlayRejected,
}

impl From<ProtoError> for Reject {
    fn from(err: ProtoError) -> Self {
        Reject::Malformed(err)
    }
}

/// Run the phase handler for one complete packet body. `Ok(Some(..))` is a
/// reply to queue; `Err` tears the connection down.
pub(crate) fn handle_packet<H: HostHandler>(
    host: &mut H,
    conn: &mut Connection<H::Player>,
    conn_id: ConnId,
    body: &[u8],
    secret: &[u8],
) -> Result<Option<PacketOut>, Reject> {
    match conn.phase {
        Phase::Handshake => handle_handshake(conn, body).map(|_| None),
        Phase::LoginStart => handle_login_start(conn, body).map(Some),
        Phase::AwaitingPluginResponse => {
            handle_plugin_response(host, conn, conn_id, body, secret).map(Some)
        }
        // The client must not speak again until Login Success has flushed.
        Phase::LoginSuccessPending => Err(Reject::UnexpectedPacket(conn.phase)),
        Phase::Play => handle_play(host, conn, conn_id, body).map(|_| None),
    }
}

fn handle_handshake<P>(conn: &mut Connection<P>, body: &[u8]) -> Result<(), Reject> {
    let mut r = PacketReader::new(body);
    let id = r.read_varint()?;
    if id != HANDSHAKE {
        return Err(Reject::UnexpectedId(id));
    }
    let _protocol_version = r.read_varint()?;
    r.skip_str(MAX_HOSTNAME_LEN)?;
    let _port = r.read_u16()?;
    let next_state = r.read_varint()?;
    if next_state != NEXT_STATE_LOGIN {
        return Err(Reject::WrongNextState(next_state));
    }
    conn.phase = Phase::LoginStart;
    Ok(())
}

fn handle_login_start<P>(conn: &mut Connection<P>, body: &[u8]) -> Result<PacketOut, Reject> {
    let mut r = PacketReader::new(body);
    let id = r.read_varint()?;
    if id != LOGIN_START {
        return Err(Reject::UnexpectedId(id));
    }
    // The claimed username is ignored; the proxy's forwarded identity is
    // authoritative. Bounds are still enforced.
    r.skip_str(MAX_USERNAME_LEN)?;

    conn.challenge = rand::thread_rng().gen_range(0..i32::MAX);
    let request = login_plugin_request(conn.challenge)?;
    // The plugin response can exceed 127 bytes, so widen the header.
    conn.header_len_limit = 2;
    conn.phase = Phase::AwaitingPluginResponse;
    Ok(request)
}

fn handle_plugin_response<H: HostHandler>(
    host: &mut H,
    conn: &mut Connection<H::Player>,
    conn_id: ConnId,
    body: &[u8],
    secret: &[u8],
) -> Result<PacketOut, Reject> {
    let mut r = PacketReader::new(body);
    let id = r.read_varint()?;
    if id != LOGIN_PLUGIN_RESPONSE {
        return Err(Reject::UnexpectedId(id));
    }
    let message_id = r.read_varint()?;
    if message_id != conn.challenge {
        return Err(Reject::TokenMismatch);
    }
    if !r.read_bool()? {
        return Err(Reject::NotUnderstood);
    }

    let signature = r.read_bytes(SIGNATURE_LEN)?;
    // The signature covers exactly the bytes that follow it.
    let signed = r.remaining();
    if !verify_forwarding_signature(secret, signed, signature) {
        return Err(Reject::BadSignature);
    }

    let identity = ForwardedIdentity::decode(&mut r)?;
    let player = host.on_login(conn_id, &identity).ok_or(Reject::Denied)?;
    let success = login_success(&identity.uuid, identity.name)?;

    conn.player = Some(player);
    conn.phase = Phase::LoginSuccessPending;
    host.on_join(conn_id, player);
    Ok(success)
}

fn handle_play<H: HostHandler>(
    host: &mut H,
    conn: &mut Connection<H::Player>,
    conn_id: ConnId,
    body: &[u8],
) -> Result<(), Reject> {
    let Some(player) = conn.player else {
        return Err(Reject::UnexpectedPacket(Phase::Play));
    };
    if host.on_play_packet(conn_id, player, body) {
        Ok(())
    } else {
        Err(Reject::PlayRejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const SECRET: &[u8] = b"test-forwarding-secret";

    /// Records callback order; accepts everyone unless `deny` is set.
    #[derive(Default)]
    struct TestHost {
        deny: bool,
        accept_play: bool,
        events: Vec<String>,
    }

    impl HostHandler for TestHost {
        type Player = u32;

        fn on_login(&mut self, _conn: ConnId, identity: &ForwardedIdentity<'_>) -> Option<u32> {
            self.events.push(format!("login:{}", identity.name));
            (!self.deny).then_some(7)
        }

        fn on_join(&mut self, _conn: ConnId, player: u32) {
            self.events.push(format!("join:{player}"));
        }

        fn on_play_packet(&mut self, _conn: ConnId, _player: u32, _body: &[u8]) -> bool {
            self.accept_play
        }
    }

    fn put_varint(out: &mut Vec<u8>, value: i32) {
        let mut v = value as u32;
        loop {
            if v & !0x7F == 0 {
                out.push(v as u8);
                return;
            }
            out.push((v & 0x7F | 0x80) as u8);
            v >>= 7;
        }
    }

    fn put_str(out: &mut Vec<u8>, s: &str) {
        put_varint(out, s.len() as i32);
        out.extend_from_slice(s.as_bytes());
    }

    fn handshake_body(next_state: i32) -> Vec<u8> {
        let mut body = vec![];
        put_varint(&mut body, HANDSHAKE);
        put_varint(&mut body, 763);
        put_str(&mut body, "mc.example.net");
        body.extend_from_slice(&25565u16.to_be_bytes());
        put_varint(&mut body, next_state);
        body
    }

    fn login_start_body(name: &str) -> Vec<u8> {
        let mut body = vec![];
        put_varint(&mut body, LOGIN_START);
        put_str(&mut body, name);
        body
    }

    fn identity_span(name: &str) -> Vec<u8> {
        let mut span = vec![];
        put_varint(&mut span, 763);
        put_str(&mut span, "127.0.0.1");
        span.extend_from_slice(&[9u8; 16]);
        put_str(&mut span, name);
        put_varint(&mut span, 0);
        span
    }

    fn plugin_response_body(message_id: i32, understood: bool, span: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET).unwrap();
        mac.update(span);
        let sig = mac.finalize().into_bytes();

        let mut body = vec![];
        put_varint(&mut body, LOGIN_PLUGIN_RESPONSE);
        put_varint(&mut body, message_id);
        body.push(understood as u8);
        body.extend_from_slice(&sig);
        body.extend_from_slice(span);
        body
    }

    /// Walk a fresh connection through handshake and login start, returning
    /// it ready for the plugin response.
    fn logged_in_conn(host: &mut TestHost) -> Connection<u32> {
        let mut conn = Connection::new(-1);
        handle_packet(host, &mut conn, ConnId(0), &handshake_body(2), SECRET).unwrap();
        assert_eq!(conn.phase, Phase::LoginStart);
        let reply = handle_packet(host, &mut conn, ConnId(0), &login_start_body("Steve"), SECRET)
            .unwrap()
            .unwrap();
        assert!(!reply.as_bytes().is_empty());
        assert_eq!(conn.phase, Phase::AwaitingPluginResponse);
        assert_eq!(conn.header_len_limit, 2);
        conn
    }

    #[test]
    fn full_login_sequence() {
        let mut host = TestHost::default();
        let mut conn = logged_in_conn(&mut host);

        let body = plugin_response_body(conn.challenge, true, &identity_span("Steve"));
        let reply = handle_packet(&mut host, &mut conn, ConnId(0), &body, SECRET)
            .unwrap()
            .unwrap();

        assert_eq!(conn.phase, Phase::LoginSuccessPending);
        assert_eq!(conn.player, Some(7));
        assert_eq!(host.events, vec!["login:Steve", "join:7"]);

        // The reply is a Login Success carrying the forwarded identity.
        let mut r = PacketReader::new(&reply.as_bytes()[1..]);
        assert_eq!(r.read_varint().unwrap(), javelin_proto::packets::LOGIN_SUCCESS);
        assert_eq!(r.read_bytes(16).unwrap(), &[9u8; 16]);
        assert_eq!(r.read_str(16).unwrap(), "Steve");
    }

    #[test]
    fn handshake_requires_login_next_state() {
        let mut host = TestHost::default();
        let mut conn = Connection::new(-1);
        let result = handle_packet(&mut host, &mut conn, ConnId(0), &handshake_body(1), SECRET);
        assert!(matches!(result, Err(Reject::WrongNextState(1))));
    }

    #[test]
    fn wrong_packet_id_rejected_per_phase() {
        let mut host = TestHost::default();
        let mut conn = Connection::new(-1);
        let mut body = vec![];
        put_varint(&mut body, 0x05);
        assert!(matches!(
            handle_packet(&mut host, &mut conn, ConnId(0), &body, SECRET),
            Err(Reject::UnexpectedId(0x05))
        ));
    }

    #[test]
    fn stale_message_id_rejected() {
        let mut host = TestHost::default();
        let mut conn = logged_in_conn(&mut host);
        let stale = conn.challenge.wrapping_add(1);
        let body = plugin_response_body(stale, true, &identity_span("Steve"));
        assert!(matches!(
            handle_packet(&mut host, &mut conn, ConnId(0), &body, SECRET),
            Err(Reject::TokenMismatch)
        ));
    }

    #[test]
    fn not_understood_rejected() {
        let mut host = TestHost::default();
        let mut conn = logged_in_conn(&mut host);
        let body = plugin_response_body(conn.challenge, false, &identity_span("Steve"));
        assert!(matches!(
            handle_packet(&mut host, &mut conn, ConnId(0), &body, SECRET),
            Err(Reject::NotUnderstood)
        ));
    }

    #[test]
    fn tampered_identity_fails_signature() {
        let mut host = TestHost::default();
        let mut conn = logged_in_conn(&mut host);
        let mut body = plugin_response_body(conn.challenge, true, &identity_span("Steve"));
        let last = body.len() - 1;
        body[last] ^= 0x01;
        assert!(matches!(
            handle_packet(&mut host, &mut conn, ConnId(0), &body, SECRET),
            Err(Reject::BadSignature)
        ));
        assert!(host.events.iter().all(|e| !e.starts_with("login")));
    }

    #[test]
    fn host_denial_stops_login() {
        let mut host = TestHost {
            deny: true,
            ..TestHost::default()
        };
        let mut conn = logged_in_conn(&mut host);
        let body = plugin_response_body(conn.challenge, true, &identity_span("Steve"));
        assert!(matches!(
            handle_packet(&mut host, &mut conn, ConnId(0), &body, SECRET),
            Err(Reject::Denied)
        ));
        // on_login ran, on_join must not have.
        assert_eq!(host.events, vec!["login:Steve"]);
        assert_eq!(conn.player, None);
    }

    #[test]
    fn packet_during_success_flush_rejected() {
        let mut host = TestHost::default();
        let mut conn = logged_in_conn(&mut host);
        let body = plugin_response_body(conn.challenge, true, &identity_span("Steve"));
        handle_packet(&mut host, &mut conn, ConnId(0), &body, SECRET).unwrap();

        assert!(matches!(
            handle_packet(&mut host, &mut conn, ConnId(0), &[0x00], SECRET),
            Err(Reject::UnexpectedPacket(Phase::LoginSuccessPending))
        ));
    }

    #[test]
    fn play_packets_delegate_to_host() {
        let mut host = TestHost {
            accept_play: true,
            ..TestHost::default()
        };
        let mut conn = logged_in_conn(&mut host);
        let body = plugin_response_body(conn.challenge, true, &identity_span("Steve"));
        handle_packet(&mut host, &mut conn, ConnId(0), &body, SECRET).unwrap();
        conn.phase = Phase::Play;

        assert!(handle_packet(&mut host, &mut conn, ConnId(0), &[0x1A, 0xFF], SECRET).is_ok());

        host.accept_play = false;
        assert!(matches!(
            handle_packet(&mut host, &mut conn, ConnId(0), &[0x1A], SECRET),
            Err(Reject::PlayRejected)
        ));
    }

    #[test]
    fn truncated_plugin_response_is_malformed() {
        let mut host = TestHost::default();
        let mut conn = logged_in_conn(&mut host);
        let body = plugin_response_body(conn.challenge, true, &identity_span("Steve"));
        assert!(matches!(
            handle_packet(&mut host, &mut conn, ConnId(0), &body[..10], SECRET),
            Err(Reject::Malformed(_))
        ));
    }
}
