//! TLS client credentials.
//!
//! The gateway authenticates providers with a client certificate, supplied
//! either as a PEM certificate + private key pair (the key optionally
//! password-protected) or as a PKCS#12 bundle.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

use crate::error::ApnsError;

/// Client credentials for the TLS handshake with the gateway
#[derive(Clone)]
pub enum Credentials {
    /// PEM certificate and private key files
    Pem {
        /// Path to the certificate file
        certificate: PathBuf,
        /// Path to the private key file
        key: PathBuf,
        /// Password for an encrypted private key
        key_password: Option<String>,
    },
    /// PKCS#12 bundle
    Pkcs12 {
        /// Path to the bundle file
        path: PathBuf,
        /// Bundle password
        password: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Pem {
                certificate, key, ..
            } => f
                .debug_struct("Pem")
                .field("certificate", certificate)
                .field("key", key)
                .finish_non_exhaustive(),
            Credentials::Pkcs12 { path, .. } => f
                .debug_struct("Pkcs12")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// Build a rustls client configuration from the stored credentials.
///
/// The root store contains the Mozilla roots plus the certificates from
/// `extra_ca`, if set. Failures map onto the credential error codes: the
/// PKCS#12 branch reports `BadPkcs12` for every defect in the bundle, the
/// PEM branch distinguishes certificate from key problems.
pub(crate) fn build_client_config(
    credentials: &Credentials,
    extra_ca: Option<&Path>,
) -> Result<ClientConfig, ApnsError> {
    crate::library_init();

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    if let Some(ca_path) = extra_ca {
        for cert in load_certs(ca_path).map_err(|_| ApnsError::BadCertificate)? {
            roots.add(cert).map_err(|_| ApnsError::BadCertificate)?;
        }
    }

    let (certs, key, key_error) = match credentials {
        Credentials::Pem {
            certificate,
            key,
            key_password,
        } => {
            let certs = load_certs(certificate).map_err(|error| {
                warn!("unable to use certificate {}: {error}", certificate.display());
                ApnsError::BadCertificate
            })?;
            let key = load_private_key(key, key_password.as_deref()).map_err(|error| {
                warn!("unable to use private key {}: {error}", key.display());
                ApnsError::BadPrivateKey
            })?;
            (certs, key, ApnsError::BadPrivateKey)
        }
        Credentials::Pkcs12 { path, password } => {
            let (certs, key) = load_pkcs12(path, password).map_err(|error| {
                warn!("unable to use PKCS#12 bundle {}: {error}", path.display());
                ApnsError::BadPkcs12
            })?;
            (certs, key, ApnsError::BadPkcs12)
        }
    };

    // with_client_auth_cert also checks that the key is usable with the
    // certificate, so a mismatched pair surfaces as a key problem.
    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|error| {
            warn!("client certificate rejected by TLS stack: {error}");
            key_error
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let data = fs::read(path).map_err(|e| e.to_string())?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut data.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;
    if certs.is_empty() {
        return Err("no certificates found".to_string());
    }
    Ok(certs)
}

fn load_private_key(
    path: &Path,
    password: Option<&str>,
) -> Result<PrivateKeyDer<'static>, String> {
    let data = fs::read(path).map_err(|e| e.to_string())?;

    if let Some(password) = password {
        let text = String::from_utf8_lossy(&data);
        if text.contains("ENCRYPTED PRIVATE KEY") {
            return decrypt_private_key(&text, password);
        }
        debug!("key password set but the key is not an encrypted PKCS#8 document");
    }

    rustls_pemfile::private_key(&mut data.as_slice())
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "no private key found".to_string())
}

/// Decrypt a PBES2-encrypted PKCS#8 private key
fn decrypt_private_key(pem: &str, password: &str) -> Result<PrivateKeyDer<'static>, String> {
    let (label, document) = pkcs8::Document::from_pem(pem).map_err(|e| e.to_string())?;
    if label != "ENCRYPTED PRIVATE KEY" {
        return Err(format!("unexpected PEM label {label:?}"));
    }
    let encrypted =
        pkcs8::EncryptedPrivateKeyInfo::try_from(document.as_bytes()).map_err(|e| e.to_string())?;
    let decrypted = encrypted.decrypt(password).map_err(|e| e.to_string())?;
    Ok(PrivateKeyDer::from(PrivatePkcs8KeyDer::from(
        decrypted.as_bytes().to_vec(),
    )))
}

fn load_pkcs12(
    path: &Path,
    password: &str,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), String> {
    let data = fs::read(path).map_err(|e| e.to_string())?;
    let pfx = p12::PFX::parse(&data).map_err(|e| format!("{e:?}"))?;
    if !pfx.verify_mac(password) {
        return Err("MAC verification failed (wrong password?)".to_string());
    }

    let keys = pfx.key_bags(password).map_err(|e| format!("{e:?}"))?;
    let key = keys
        .into_iter()
        .next()
        .map(|der| PrivateKeyDer::from(PrivatePkcs8KeyDer::from(der)))
        .ok_or_else(|| "no private key in bundle".to_string())?;

    let certs: Vec<CertificateDer<'static>> = pfx
        .cert_x509_bags(password)
        .map_err(|e| format!("{e:?}"))?
        .into_iter()
        .map(CertificateDer::from)
        .collect();
    if certs.is_empty() {
        return Err("no certificates in bundle".to_string());
    }

    Ok((certs, key))
}
