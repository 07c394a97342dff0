use std::sync::Arc;

use bson::spec::BinarySubtype::Generic;
use bson::Bson::Binary;
use bson::Document;
use data_encoding::BASE64;
use hex;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use pbkdf2::pbkdf2;
use sha1::Sha1;

use mock::{self, MockServer};
use mongodb_core::apm::Listener;
use mongodb_core::auth::{self, Credential, SecurityContext, SecurityContextFactory};
use mongodb_core::connection::Connection;
use mongodb_core::pool::{ConnectionPool, PoolAuth, PoolOptions};
use mongodb_core::stream::StreamConnector;
use mongodb_core::Error;

fn hmac_sha1(key: &[u8], input: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_varkey(key).unwrap();
    mac.input(input);
    mac.result().code().to_vec()
}

fn sha1_digest(data: &[u8]) -> Vec<u8> {
    Sha1::digest(data).as_slice().to_vec()
}

fn payload_str(command: &Document) -> String {
    match command.get("payload") {
        Some(&Binary(_, ref bytes)) => String::from_utf8(bytes.clone()).unwrap(),
        _ => String::new(),
    }
}

// A server-side SCRAM-SHA-1 implementation over the mock transport. With
// `tamper` set it returns a corrupted server signature.
fn scram_responder(username: &str, password: &str, tamper: bool)
                   -> impl FnMut(&str, &Document) -> Document + Send + 'static {
    let salt: Vec<u8> = b"0123456789abcdef".to_vec();
    let iterations = 4096u32;

    let hashed = hex::encode(Md5::digest(
        format!("{}:mongo:{}", username, password).as_bytes(),
    ));
    let mut salted = vec![0u8; 20];
    pbkdf2::<Hmac<Sha1>>(hashed.as_bytes(), &salt, iterations as usize, &mut salted);

    let client_key = hmac_sha1(&salted, b"Client Key");
    let stored_key = sha1_digest(&client_key);
    let server_key = hmac_sha1(&salted, b"Server Key");

    let mut first_bare = String::new();
    let mut server_first = String::new();

    move |_db, command| {
        if command.contains_key("isMaster") {
            return mock::standalone_is_master();
        }

        if command.contains_key("saslStart") {
            let payload = payload_str(command);
            first_bare = payload.trim_start_matches("n,,").to_owned();
            let cnonce = first_bare.splitn(2, "r=").nth(1).unwrap().to_owned();
            let nonce = format!("{}serverside", cnonce);
            server_first = format!("r={},s={},i={}", nonce, BASE64.encode(&salt), iterations);

            return doc! {
                "ok": 1,
                "conversationId": 1,
                "done": false,
                "payload": Binary(Generic, server_first.clone().into_bytes())
            };
        }

        if command.contains_key("saslContinue") {
            let payload = payload_str(command);

            if payload.is_empty() {
                return doc! {
                    "ok": 1,
                    "conversationId": 1,
                    "done": true,
                    "payload": Binary(Generic, vec![])
                };
            }

            let without_proof = payload.splitn(2, ",p=").next().unwrap().to_owned();
            let proof_b64 = payload.splitn(2, ",p=").nth(1).unwrap();
            let proof = BASE64.decode(proof_b64.as_bytes()).unwrap();

            let auth_message = format!("{},{},{}", first_bare, server_first, without_proof);
            let client_signature = hmac_sha1(&stored_key, auth_message.as_bytes());
            let recovered_key: Vec<u8> = proof
                .iter()
                .zip(client_signature.iter())
                .map(|(p, s)| p ^ s)
                .collect();

            if sha1_digest(&recovered_key) != stored_key {
                return doc! { "ok": 0, "errmsg": "authentication failed", "code": 18 };
            }

            let mut signature = hmac_sha1(&server_key, auth_message.as_bytes());
            if tamper {
                signature[0] ^= 0xff;
            }
            let verifier = format!("v={}", BASE64.encode(&signature));

            return doc! {
                "ok": 1,
                "conversationId": 1,
                "done": false,
                "payload": Binary(Generic, verifier.into_bytes())
            };
        }

        doc! { "ok": 0, "errmsg": "unexpected command" }
    }
}

fn connect(server: &MockServer) -> Connection {
    Connection::connect(
        &server.host,
        &StreamConnector::default(),
        Arc::new(Listener::new()),
    ).unwrap()
}

#[test]
fn scram_handshake_succeeds_against_a_real_server_side() {
    let server = MockServer::start(scram_responder("zoe", "pencil", false));
    let mut conn = connect(&server);

    let credential = Credential::new("zoe").with_password("pencil");
    let authenticator = auth::create_authenticator("SCRAM-SHA-1", credential).unwrap();
    authenticator.auth(&mut conn).unwrap();

    let names = server.command_names();
    assert_eq!(names, vec!["saslStart", "saslContinue", "saslContinue"]);

    // The trailing round carries an empty payload.
    let commands = server.commands();
    assert!(payload_str(&commands[2].1).is_empty());
}

#[test]
fn a_wrong_password_is_rejected_by_the_server() {
    let server = MockServer::start(scram_responder("zoe", "pencil", false));
    let mut conn = connect(&server);

    let credential = Credential::new("zoe").with_password("eraser");
    let authenticator = auth::create_authenticator("SCRAM-SHA-1", credential).unwrap();

    match authenticator.auth(&mut conn) {
        Err(Error::OperationError(ref message)) => {
            assert!(message.contains("authentication failed"));
        }
        other => panic!("Expected the server to reject the proof, got {:?}", other),
    }
}

#[test]
fn a_forged_server_signature_is_rejected_by_the_client() {
    let server = MockServer::start(scram_responder("zoe", "pencil", true));
    let mut conn = connect(&server);

    let credential = Credential::new("zoe").with_password("pencil");
    let authenticator = auth::create_authenticator("SCRAM-SHA-1", credential).unwrap();

    match authenticator.auth(&mut conn) {
        Err(Error::AuthenticationError(_)) => {}
        other => panic!("Expected a signature mismatch, got {:?}", other),
    }
}

#[test]
fn pools_authenticate_each_fresh_connection_exactly_once() {
    let server = MockServer::start(scram_responder("zoe", "pencil", false));
    let pool = ConnectionPool::new(
        server.host.clone(),
        PoolOptions::default(),
        StreamConnector::default(),
        Arc::new(Listener::new()),
        Some(PoolAuth {
            mechanism: String::from("SCRAM-SHA-1"),
            credential: Credential::new("zoe").with_password("pencil"),
        }),
        Arc::new(::std::sync::Mutex::new(None)),
    );

    {
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.authenticated_mechanism.as_ref().map(|s| &s[..]), Some("SCRAM-SHA-1"));
    }
    drop(pool.acquire().unwrap());

    let names = server.command_names();
    assert_eq!(names.iter().filter(|name| *name == "saslStart").count(), 1);
}

struct ScriptedFactory;

struct ScriptedContext {
    steps: usize,
}

impl SecurityContextFactory for ScriptedFactory {
    fn create(&self, principal: &str) -> Result<Box<SecurityContext>, String> {
        assert!(principal.starts_with("mongodb/"));
        Ok(Box::new(ScriptedContext { steps: 0 }))
    }
}

impl SecurityContext for ScriptedContext {
    fn initiate(&mut self) -> Result<Vec<u8>, String> {
        Ok(b"C0".to_vec())
    }

    fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>, String> {
        self.steps += 1;
        Ok(format!("C{}", String::from_utf8_lossy(challenge)).into_bytes())
    }

    fn established(&self) -> bool {
        self.steps >= 1
    }
}

fn gssapi_responder(_db: &str, command: &Document) -> Document {
    if command.contains_key("isMaster") {
        return mock::standalone_is_master();
    }

    if command.contains_key("saslStart") {
        return doc! {
            "ok": 1,
            "conversationId": 1,
            "done": false,
            "payload": Binary(Generic, b"S1".to_vec())
        };
    }

    if command.contains_key("saslContinue") {
        let payload = payload_str(command);
        if payload.is_empty() {
            return doc! {
                "ok": 1,
                "conversationId": 1,
                "done": true,
                "payload": Binary(Generic, vec![])
            };
        }
        return doc! {
            "ok": 1,
            "conversationId": 1,
            "done": false,
            "payload": Binary(Generic, vec![])
        };
    }

    doc! { "ok": 0, "errmsg": "unexpected command" }
}

#[test]
fn gssapi_sequences_tokens_until_both_sides_are_done() {
    let server = MockServer::start(gssapi_responder);
    let mut conn = connect(&server);

    let credential =
        Credential::new("zoe@EXAMPLE.COM").with_security_context_factory(Arc::new(ScriptedFactory));
    let authenticator = auth::create_authenticator("GSSAPI", credential).unwrap();
    authenticator.auth(&mut conn).unwrap();

    let commands = server.commands();
    let names: Vec<&str> = commands.iter().map(|&(ref name, _)| &name[..]).collect();
    assert_eq!(names, vec!["saslStart", "saslContinue", "saslContinue"]);

    assert_eq!(payload_str(&commands[0].1), "C0");
    assert_eq!(payload_str(&commands[1].1), "CS1");
    assert!(payload_str(&commands[2].1).is_empty());
}
