//! The SCRAM-SHA-1 conversation (RFC 5802 over saslStart/saslContinue).
use bson::Bson::{self, Binary};
use bson::spec::BinarySubtype::Generic;
use bson::Document;
use data_encoding::BASE64;
use hex;
use hmac::{Hmac, Mac};
use md5::Md5;
use md5::Digest;
use pbkdf2::pbkdf2;
use sha1::Sha1;
use textnonce::TextNonce;

use auth::{Authenticator, Credential};
use command_type::CommandType::Suppressed;
use connection::Connection;
use error::Error::{ArgumentError, AuthenticationError, ResponseError};
use error::Result;

const SHA1_OUTPUT_LEN: usize = 20;

pub struct ScramSha1Authenticator {
    credential: Credential,
}

impl ScramSha1Authenticator {
    pub fn new(credential: Credential) -> ScramSha1Authenticator {
        ScramSha1Authenticator { credential: credential }
    }
}

impl Authenticator for ScramSha1Authenticator {
    fn auth(&self, conn: &mut Connection) -> Result<()> {
        let result = self.converse(conn);
        if result.is_err() {
            // A half-finished handshake leaves the server-side conversation
            // in an unknown state.
            conn.mark_broken();
        }
        result
    }
}

impl ScramSha1Authenticator {
    fn converse(&self, conn: &mut Connection) -> Result<()> {
        let password = match self.credential.password {
            Some(ref password) => password.clone(),
            None => return Err(ArgumentError("SCRAM-SHA-1 requires a password.".to_owned())),
        };

        let text_nonce = TextNonce::sized(64).map_err(AuthenticationError)?;
        let nonce = format!("{}", text_nonce);
        let first_bare = format!("n={},r={}", self.credential.username, nonce);
        let client_first = format!("n,,{}", first_bare).into_bytes();

        let start_doc = doc! {
            "saslStart": 1,
            "mechanism": "SCRAM-SHA-1",
            "payload": Binary(Generic, client_first),
            "autoAuthorize": 1
        };

        let reply = conn.execute_command(&self.credential.source, start_doc, false, Suppressed)?;
        let conversation_id = match reply.get("conversationId") {
            Some(bson) => bson.clone(),
            None => return Err(ResponseError("No conversationId returned.".to_owned())),
        };
        let server_first = payload_string(&reply)?;

        let (rnonce_opt, salt_opt, iterations_opt) =
            scan_fmt!(&server_first, "r={},s={},i={}", String, String, u32);

        let rnonce = rnonce_opt
            .ok_or_else(|| ResponseError("Invalid rnonce returned.".to_owned()))?;

        // The combined nonce must extend the one this side generated.
        if !rnonce.starts_with(&nonce) {
            return Err(AuthenticationError(
                "Server returned a mismatched nonce.".to_owned(),
            ));
        }

        let salt_b64 = salt_opt
            .ok_or_else(|| ResponseError("Invalid salt returned.".to_owned()))?;
        let salt = BASE64
            .decode(salt_b64.as_bytes())
            .map_err(|_| ResponseError("Invalid base64 salt returned.".to_owned()))?;
        let iterations = iterations_opt
            .ok_or_else(|| ResponseError("Invalid iteration count returned.".to_owned()))?;

        let hashed = hashed_password(&self.credential.username, &password);
        let salted = salted_password(hashed.as_bytes(), &salt, iterations);
        let keys = DerivedKeys::new(&salted)?;

        let without_proof = format!("c=biws,r={}", rnonce);
        let auth_message = format!("{},{},{}", first_bare, server_first, without_proof);

        let proof = keys.client_proof(&auth_message)?;
        let client_final = format!("{},p={}", without_proof, BASE64.encode(&proof));

        let next_doc = doc! {
            "saslContinue": 1,
            "conversationId": conversation_id.clone(),
            "payload": Binary(Generic, client_final.into_bytes())
        };

        let mut reply =
            conn.execute_command(&self.credential.source, next_doc, false, Suppressed)?;

        let expected_signature = BASE64.encode(&keys.server_signature(&auth_message)?);
        let mut verified = false;

        loop {
            if let Some(&Bson::Boolean(true)) = reply.get("done") {
                break;
            }

            if let Some(&Binary(_, ref payload)) = reply.get("payload") {
                let payload_str = String::from_utf8_lossy(payload);
                if let Some(verifier) = scan_fmt!(&payload_str, "v={}", String) {
                    if verifier != expected_signature {
                        return Err(AuthenticationError(
                            "Server returned an invalid signature.".to_owned(),
                        ));
                    }
                    verified = true;
                }
            }

            let final_doc = doc! {
                "saslContinue": 1,
                "conversationId": conversation_id.clone(),
                "payload": Binary(Generic, vec![])
            };

            reply = conn.execute_command(&self.credential.source, final_doc, false, Suppressed)?;
        }

        // The signature check is what authenticates the server; a
        // conversation that never produced one proves nothing.
        if !verified {
            return Err(AuthenticationError(
                "Server never proved possession of the password.".to_owned(),
            ));
        }

        Ok(())
    }
}

fn payload_string(doc: &Document) -> Result<String> {
    let data = match doc.get("payload") {
        Some(&Binary(_, ref payload)) => payload.to_owned(),
        _ => return Err(ResponseError("Invalid payload returned.".to_owned())),
    };

    String::from_utf8(data)
        .map_err(|_| ResponseError("Invalid UTF-8 payload returned.".to_owned()))
}

/// Hex digest of `user:mongo:password`, the form the server stores.
fn hashed_password(username: &str, password: &str) -> String {
    let mut md5 = Md5::new();
    md5.input(format!("{}:mongo:{}", username, password).as_bytes());
    hex::encode(md5.result())
}

fn salted_password(hashed_password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut salted = vec![0u8; SHA1_OUTPUT_LEN];
    pbkdf2::<Hmac<Sha1>>(hashed_password, salt, iterations as usize, &mut salted);
    salted
}

fn hmac_sha1(key: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha1>::new_varkey(key)
        .map_err(|_| AuthenticationError("Invalid HMAC key length.".to_owned()))?;
    mac.input(input);
    Ok(mac.result().code().to_vec())
}

struct DerivedKeys {
    client_key: Vec<u8>,
    stored_key: Vec<u8>,
    server_key: Vec<u8>,
}

impl DerivedKeys {
    fn new(salted_password: &[u8]) -> Result<DerivedKeys> {
        let client_key = hmac_sha1(salted_password, b"Client Key")?;
        let stored_key = Sha1::digest(&client_key).as_slice().to_vec();
        let server_key = hmac_sha1(salted_password, b"Server Key")?;

        Ok(DerivedKeys {
            client_key: client_key,
            stored_key: stored_key,
            server_key: server_key,
        })
    }

    fn client_proof(&self, auth_message: &str) -> Result<Vec<u8>> {
        let signature = hmac_sha1(&self.stored_key, auth_message.as_bytes())?;
        Ok(self.client_key
            .iter()
            .zip(signature.iter())
            .map(|(key_byte, sig_byte)| key_byte ^ sig_byte)
            .collect())
    }

    fn server_signature(&self, auth_message: &str) -> Result<Vec<u8>> {
        hmac_sha1(&self.server_key, auth_message.as_bytes())
    }
}
