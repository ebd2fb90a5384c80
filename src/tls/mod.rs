//! TLS material loading and client configuration.
//!
//! Key and trust material is loaded once and shared read-only: either
//! injected explicitly through [`crate::config::Config::tls_material`], or
//! resolved from the configured store paths into a process-wide cache the
//! first time any connection needs it.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};

use crate::config::{KeystorePaths, TlsLevel};
use crate::error::{Error, Result};

/// Cipher allow-list when negotiating TLS 1.3 (with 1.2 fallback suites).
fn tls13_suites() -> Vec<rustls::SupportedCipherSuite> {
    vec![
        ring::cipher_suite::TLS13_AES_128_GCM_SHA256,
        ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
        ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    ]
}

/// Cipher allow-list when capped at TLS 1.2.
fn tls12_suites() -> Vec<rustls::SupportedCipherSuite> {
    vec![
        ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    ]
}

/// Resolved trust roots and optional client-auth credentials.
///
/// Shared read-only between connections; never mutated after construction.
#[derive(Debug)]
pub struct TlsMaterial {
    roots: RootCertStore,
    client_auth: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
}

impl TlsMaterial {
    /// Load material from the given store paths.
    ///
    /// With no truststore the platform-independent webpki root bundle is
    /// used. With no keystore the client offers no certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TlsSetup`] if a configured store cannot be read or
    /// contains no usable certificates/keys.
    pub fn load(truststore: Option<&str>, keystore: Option<&KeystorePaths>) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        match truststore {
            Some(path) => {
                let certs = load_certs_from_file(Path::new(path))?;
                for cert in certs {
                    roots.add(cert).map_err(|e| {
                        Error::TlsSetup(format!("Bad CA certificate in {path}: {e}"))
                    })?;
                }
            }
            None => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
        }

        let client_auth = match keystore {
            Some(paths) => {
                let certs = load_certs_from_file(Path::new(&paths.certs))?;
                let key = load_private_key_from_file(Path::new(&paths.key))?;
                Some((certs, key))
            }
            None => None,
        };

        Ok(Self { roots, client_auth })
    }

    /// Material with the default webpki roots and no client auth.
    ///
    /// # Errors
    ///
    /// Never fails in practice; shares the [`TlsMaterial::load`] signature.
    pub fn default_roots() -> Result<Self> {
        Self::load(None, None)
    }
}

/// The process-wide material cache: populated by the first connection that
/// needs TLS without injected material, reused read-only afterwards.
static CACHED_MATERIAL: OnceLock<Arc<TlsMaterial>> = OnceLock::new();

/// Resolve material from the cache, loading it on first use.
///
/// The store paths of the first caller win; later callers with different
/// paths must inject their own material instead.
///
/// # Errors
///
/// Propagates [`TlsMaterial::load`] failures; nothing is cached on failure
/// so the next attempt retries the load.
pub fn cached_material(
    truststore: Option<&str>,
    keystore: Option<&KeystorePaths>,
) -> Result<Arc<TlsMaterial>> {
    if let Some(material) = CACHED_MATERIAL.get() {
        return Ok(Arc::clone(material));
    }
    let loaded = Arc::new(TlsMaterial::load(truststore, keystore)?);
    // A concurrent loader may have won the race; either value is valid.
    Ok(Arc::clone(CACHED_MATERIAL.get_or_init(|| loaded)))
}

/// Build a rustls client configuration for the requested protocol level.
///
/// rustls does not implement TLS 1.0/1.1; those levels get the TLS 1.2
/// configuration. [`TlsLevel::Tls13`] also enables the 1.2 fallback suites.
///
/// # Errors
///
/// Returns [`Error::TlsSetup`] for [`TlsLevel::None`] or when the provider
/// rejects the suite/version combination or the client-auth credentials.
pub fn client_config(level: TlsLevel, material: &TlsMaterial) -> Result<Arc<ClientConfig>> {
    static TLS13_VERSIONS: &[&rustls::SupportedProtocolVersion] =
        &[&rustls::version::TLS13, &rustls::version::TLS12];
    static TLS12_VERSIONS: &[&rustls::SupportedProtocolVersion] =
        &[&rustls::version::TLS12];

    let (suites, versions) = match level {
        TlsLevel::None => {
            return Err(Error::TlsSetup(
                "TLS configuration requested for an insecure connection".into(),
            ));
        }
        TlsLevel::Tls13 => (tls13_suites(), TLS13_VERSIONS),
        _ => (tls12_suites(), TLS12_VERSIONS),
    };

    let provider = CryptoProvider {
        cipher_suites: suites,
        ..ring::default_provider()
    };

    let builder = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(versions)
        .map_err(|e| Error::TlsSetup(format!("Unsupported protocol versions: {e}")))?
        .with_root_certificates(material.roots.clone());

    let config = match &material.client_auth {
        Some((certs, key)) => builder
            .with_client_auth_cert(certs.clone(), key.clone_key())
            .map_err(|e| Error::TlsSetup(format!("Bad client certificate: {e}")))?,
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

/// The SNI name for a connection: the configured override, or the dialed
/// address (hostname or IP literal both parse).
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|_| Error::TlsSetup(format!("Invalid SNI host name: {host}")))
}

fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| Error::TlsSetup(format!("Cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::TlsSetup(format!("Cannot parse {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(Error::TlsSetup(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key_from_file(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| Error::TlsSetup(format!("Cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    for item in rustls_pemfile::read_all(&mut reader) {
        let item = item
            .map_err(|e| Error::TlsSetup(format!("Cannot parse {}: {e}", path.display())))?;
        match item {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => continue,
        }
    }

    Err(Error::TlsSetup(format!(
        "No private key found in {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_roots_nonempty() {
        let material = TlsMaterial::default_roots().unwrap();
        assert!(!material.roots.is_empty());
        assert!(material.client_auth.is_none());
    }

    #[test]
    fn test_load_missing_truststore() {
        let result = TlsMaterial::load(Some("/nonexistent/ca.pem"), None);
        assert!(matches!(result, Err(Error::TlsSetup(_))));
    }

    #[test]
    fn test_load_truststore_without_certs() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"not a certificate\njust some text\n").unwrap();
        temp.flush().unwrap();

        let result = TlsMaterial::load(Some(temp.path().to_str().unwrap()), None);
        assert!(matches!(result, Err(Error::TlsSetup(_))));
    }

    #[test]
    fn test_load_missing_keystore() {
        let keystore = KeystorePaths {
            certs: "/nonexistent/client.pem".into(),
            key: "/nonexistent/client.key".into(),
        };
        let result = TlsMaterial::load(None, Some(&keystore));
        assert!(matches!(result, Err(Error::TlsSetup(_))));
    }

    #[test]
    fn test_keystore_without_key() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"no key material here\n").unwrap();
        temp.flush().unwrap();

        let result = load_private_key_from_file(temp.path());
        assert!(matches!(result, Err(Error::TlsSetup(_))));
    }

    #[test]
    fn test_client_config_levels() {
        let material = TlsMaterial::default_roots().unwrap();
        for level in [TlsLevel::Tls10, TlsLevel::Tls11, TlsLevel::Tls12, TlsLevel::Tls13] {
            assert!(client_config(level, &material).is_ok(), "config for {level:?}");
        }
        assert!(matches!(
            client_config(TlsLevel::None, &material),
            Err(Error::TlsSetup(_))
        ));
    }

    #[test]
    fn test_server_name_accepts_hostname_and_ip() {
        assert!(server_name("example.com").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("::1").is_ok());
        assert!(server_name("not a hostname").is_err());
    }
}
