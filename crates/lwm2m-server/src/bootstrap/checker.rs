//! Consistency checks run before a bootstrap session is finalized.

use tracing::warn;
use x509_cert::der::oid::{AssociatedOid, ObjectIdentifier};
use x509_cert::der::{Decode, Reader, SliceReader};
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage, KeyUsages};
use x509_cert::Certificate;

use super::config::{BootstrapConfig, OscoreObject, SecurityMode, ServerSecurity};
use crate::config::oscore::ID_NONCE_OVERHEAD;

/// id-kp-clientAuth (RFC 5280 §4.2.1.12)
const ID_KP_CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");

/// Largest valid server short id. 0 and 65535 are reserved.
const MAX_SHORT_ID: u16 = 65534;

/// Checks a bootstrap configuration before it is committed.
pub trait ConsistencyChecker: Send + Sync {
    /// Every problem found, empty if the configuration is consistent.
    fn check(&self, config: &BootstrapConfig) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConsistencyChecker;

impl ConsistencyChecker for DefaultConsistencyChecker {
    fn check(&self, config: &BootstrapConfig) -> Vec<String> {
        let mut errors = Vec::new();

        for (instance_id, security) in &config.security {
            let mut push = |message: String| {
                errors.push(format!("security instance {}: {}", instance_id, message));
            };
            if security.uri.is_empty() {
                push("server uri is mandatory".to_string());
            }
            match security.security_mode {
                SecurityMode::NoSec => check_no_sec(security, &mut push),
                SecurityMode::Psk => check_psk(security, &mut push),
                SecurityMode::Rpk => check_rpk(security, &mut push),
                SecurityMode::X509 => check_x509(security, &mut push),
            }
            if let Some(oscore_id) = security.oscore_security_mode {
                match config.oscore.get(&oscore_id) {
                    Some(oscore) => check_oscore(oscore, &mut push),
                    None => push(format!("OSCORE instance {} does not exist", oscore_id)),
                }
            }
        }

        for (instance_id, server) in &config.servers {
            let mut push = |message: String| {
                errors.push(format!("server instance {}: {}", instance_id, message));
            };
            if server.short_id == 0 || server.short_id > MAX_SHORT_ID {
                push(format!(
                    "short id {} is outside 1..={}",
                    server.short_id, MAX_SHORT_ID
                ));
            }
            match config.security_for_server(server.short_id) {
                None => push(format!(
                    "no security entry for short id {}",
                    server.short_id
                )),
                Some(security) if security.bootstrap_server => push(format!(
                    "security entry for short id {} is a bootstrap server",
                    server.short_id
                )),
                Some(_) => {}
            }
        }

        for error in &errors {
            warn!(error = %error, "Inconsistent bootstrap configuration");
        }
        errors
    }
}

fn check_no_sec(security: &ServerSecurity, push: &mut impl FnMut(String)) {
    if !security.secret_key.is_empty() {
        push("no-sec mode, secret key must be empty".to_string());
    }
    if !security.public_key_or_id.is_empty() {
        push("no-sec mode, public key or id must be empty".to_string());
    }
    if !security.server_public_key.is_empty() {
        push("no-sec mode, server public key must be empty".to_string());
    }
}

fn check_psk(security: &ServerSecurity, push: &mut impl FnMut(String)) {
    if security.secret_key.is_empty() {
        push("psk mode, secret key must not be empty".to_string());
    }
    if security.public_key_or_id.is_empty() {
        push("psk mode, identity must not be empty".to_string());
    }
}

fn check_rpk(security: &ServerSecurity, push: &mut impl FnMut(String)) {
    if security.secret_key.is_empty() {
        push("rpk mode, secret key must not be empty".to_string());
    }
    if security.public_key_or_id.is_empty() {
        push("rpk mode, public key must not be empty".to_string());
    }
    if security.server_public_key.is_empty() {
        push("rpk mode, server public key must not be empty".to_string());
    }
}

fn check_x509(security: &ServerSecurity, push: &mut impl FnMut(String)) {
    if security.secret_key.is_empty() {
        push("x509 mode, secret key must not be empty".to_string());
    }

    if security.server_public_key.is_empty() {
        push("x509 mode, server certificate must not be empty".to_string());
    } else if let Err(e) = Certificate::from_der(&security.server_public_key) {
        push(format!("x509 mode, server certificate is not DER X.509: {}", e));
    }

    if security.public_key_or_id.is_empty() {
        push("x509 mode, client certificate must not be empty".to_string());
        return;
    }
    match decode_chain(&security.public_key_or_id) {
        Err(e) => push(format!("x509 mode, client certificate is not DER X.509: {}", e)),
        Ok(chain) if chain.len() > 1 => push(format!(
            "x509 mode, client certificate chains are not supported ({} certificates)",
            chain.len()
        )),
        Ok(chain) => {
            if let Some(problem) = chain.first().and_then(client_auth_problem) {
                push(format!("x509 mode, client certificate {}", problem));
            }
        }
    }
}

/// Concatenated DER certificates.
fn decode_chain(bytes: &[u8]) -> x509_cert::der::Result<Vec<Certificate>> {
    let mut reader = SliceReader::new(bytes)?;
    let mut chain = Vec::new();
    while !reader.is_finished() {
        chain.push(Certificate::decode(&mut reader)?);
    }
    Ok(chain)
}

/// Why `cert` cannot authenticate a TLS client, if it cannot.
fn client_auth_problem(cert: &Certificate) -> Option<String> {
    let extensions = cert.tbs_certificate.extensions.as_deref().unwrap_or_default();
    for extension in extensions {
        let value = extension.extn_value.as_bytes();
        if extension.extn_id == KeyUsage::OID {
            match KeyUsage::from_der(value) {
                Ok(usage) if !usage.0.contains(KeyUsages::DigitalSignature) => {
                    return Some("key usage lacks digitalSignature".to_string());
                }
                Ok(_) => {}
                Err(e) => return Some(format!("has an invalid key usage: {}", e)),
            }
        } else if extension.extn_id == ExtendedKeyUsage::OID {
            match ExtendedKeyUsage::from_der(value) {
                Ok(usage) if !usage.0.contains(&ID_KP_CLIENT_AUTH) => {
                    return Some("extended key usage lacks clientAuth".to_string());
                }
                Ok(_) => {}
                Err(e) => return Some(format!("has an invalid extended key usage: {}", e)),
            }
        }
    }
    None
}

/// AEAD nonce length in bytes for a COSE algorithm id.
fn aead_nonce_length(algorithm: i64) -> Option<usize> {
    match algorithm {
        // AES-CCM-16-*
        10 | 11 | 30 | 31 => Some(13),
        // AES-CCM-64-*
        12 | 13 | 32 | 33 => Some(7),
        // AES-GCM
        1..=3 => Some(12),
        // ChaCha20/Poly1305
        24 => Some(12),
        _ => None,
    }
}

fn is_supported_hkdf(algorithm: i64) -> bool {
    // HKDF SHA-256, HKDF SHA-512
    matches!(algorithm, -10 | -11)
}

fn check_oscore(oscore: &OscoreObject, push: &mut impl FnMut(String)) {
    if oscore.master_secret.is_empty() {
        push("oscore master secret must not be empty".to_string());
    }
    if !is_supported_hkdf(oscore.hkdf_algorithm) {
        push(format!(
            "oscore hkdf algorithm {} is not supported",
            oscore.hkdf_algorithm
        ));
    }
    let Some(nonce_length) = aead_nonce_length(oscore.aead_algorithm) else {
        push(format!(
            "oscore aead algorithm {} is not supported",
            oscore.aead_algorithm
        ));
        return;
    };
    let max_id_length = nonce_length - ID_NONCE_OVERHEAD;
    for (name, id) in [
        ("sender", &oscore.sender_id),
        ("recipient", &oscore.recipient_id),
    ] {
        if id.len() > max_id_length {
            push(format!(
                "oscore {} id is {} bytes, at most {} allowed",
                name,
                id.len(),
                max_id_length
            ));
        }
    }
    if oscore.sender_id == oscore.recipient_id {
        push("oscore sender and recipient ids must differ".to_string());
    }
}

#[cfg(test)]
mod tests {
    use x509_cert::der::asn1::{BitString, OctetString, UtcTime};
    use x509_cert::der::Encode;
    use x509_cert::ext::Extension;
    use x509_cert::name::Name;
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
    use x509_cert::time::{Time, Validity};
    use x509_cert::{TbsCertificate, Version};

    use super::*;
    use crate::bootstrap::ServerConfig;

    /// ecdsa-with-SHA256
    const ECDSA_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
    /// id-ecPublicKey
    const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

    /// Unsigned certificate with the given extensions. Signatures are
    /// never verified by the checker.
    fn certificate(extensions: Vec<Extension>) -> Vec<u8> {
        let algorithm = AlgorithmIdentifierOwned {
            oid: ECDSA_SHA256,
            parameters: None,
        };
        let time = Time::UtcTime(
            UtcTime::from_unix_duration(std::time::Duration::from_secs(1_700_000_000)).unwrap(),
        );
        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&[1]).unwrap(),
            signature: algorithm.clone(),
            issuer: Name::default(),
            validity: Validity {
                not_before: time,
                not_after: time,
            },
            subject: Name::default(),
            subject_public_key_info: SubjectPublicKeyInfoOwned {
                algorithm: AlgorithmIdentifierOwned {
                    oid: EC_PUBLIC_KEY,
                    parameters: None,
                },
                subject_public_key: BitString::from_bytes(&[4, 1, 2, 3, 4]).unwrap(),
            },
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: if extensions.is_empty() {
                None
            } else {
                Some(extensions)
            },
        };
        Certificate {
            tbs_certificate,
            signature_algorithm: algorithm,
            signature: BitString::from_bytes(&[0]).unwrap(),
        }
        .to_der()
        .unwrap()
    }

    fn key_usage(usages: KeyUsages) -> Extension {
        Extension {
            extn_id: KeyUsage::OID,
            critical: true,
            extn_value: OctetString::new(KeyUsage(usages.into()).to_der().unwrap()).unwrap(),
        }
    }

    fn x509_security(client: Vec<u8>) -> ServerSecurity {
        ServerSecurity {
            uri: "coaps://server:5684".to_string(),
            security_mode: SecurityMode::X509,
            public_key_or_id: client,
            server_public_key: certificate(Vec::new()),
            secret_key: vec![1],
            server_id: Some(1),
            ..Default::default()
        }
    }

    fn config_with(security: ServerSecurity) -> BootstrapConfig {
        let mut config = BootstrapConfig::default();
        config.servers.insert(
            0,
            ServerConfig {
                short_id: 1,
                ..Default::default()
            },
        );
        config.security.insert(1, security);
        config
    }

    #[test]
    fn test_x509_client_certificate() {
        let checker = DefaultConsistencyChecker;

        let plain = config_with(x509_security(certificate(Vec::new())));
        assert!(checker.check(&plain).is_empty());

        let signing = certificate(vec![key_usage(KeyUsages::DigitalSignature)]);
        assert!(checker.check(&config_with(x509_security(signing))).is_empty());

        let ca_only = certificate(vec![key_usage(KeyUsages::KeyCertSign)]);
        let errors = checker.check(&config_with(x509_security(ca_only)));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("digitalSignature"));
    }

    #[test]
    fn test_x509_chain_rejected() {
        let mut chain = certificate(Vec::new());
        chain.extend(certificate(Vec::new()));
        let errors = DefaultConsistencyChecker.check(&config_with(x509_security(chain)));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("chains are not supported"));
    }

    #[test]
    fn test_x509_garbage() {
        let mut security = x509_security(vec![0x30, 0x03, 0x01]);
        security.server_public_key = vec![0xFF];
        let errors = DefaultConsistencyChecker.check(&config_with(security));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_oscore_nonce_limits() {
        // AES-CCM-16-64-128: 13 byte nonce, ids up to 7 bytes
        let oscore = OscoreObject {
            master_secret: vec![1],
            sender_id: vec![0; 7],
            recipient_id: vec![1; 8],
            ..Default::default()
        };
        let mut errors = Vec::new();
        check_oscore(&oscore, &mut |e| errors.push(e));
        assert_eq!(errors, vec!["oscore recipient id is 8 bytes, at most 7 allowed"]);

        let ccm_64 = OscoreObject {
            aead_algorithm: 12,
            sender_id: vec![0; 2],
            ..oscore.clone()
        };
        let mut errors = Vec::new();
        check_oscore(&ccm_64, &mut |e| errors.push(e));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_oscore_unsupported_algorithms() {
        let oscore = OscoreObject {
            master_secret: vec![1],
            sender_id: vec![1],
            recipient_id: vec![1],
            aead_algorithm: 99,
            hkdf_algorithm: -99,
            master_salt: None,
        };
        let mut errors = Vec::new();
        check_oscore(&oscore, &mut |e| errors.push(e));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.contains("not supported")));
    }
}
