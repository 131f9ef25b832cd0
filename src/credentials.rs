//! Credential acquisition: resolves the configured auth mode into the
//! header/cookie set the HTTP client attaches to every request.
//!
//! SAML browser-based cookie extraction is a deliberate non-goal (§4.6 of
//! the design) — only the resulting already-authenticated cookie jar is
//! ever consumed, via `--cookie-string`/`--cookie-file`.

use std::fs;
use std::path::Path;

use base64::Engine;

use crate::config::Args;
use crate::error::AppError;

/// Headers and cookies resolved from the configured credential mode.
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
}

/// Resolves a static credential set once at startup.
pub trait CredentialSupplier: Send + Sync {
    fn resolve(&self) -> CredentialSet;
}

/// `--user`/`--password` → `Authorization: Basic base64(user:password)`.
pub struct BasicCredentials {
    pub user: String,
    pub password: String,
}

impl CredentialSupplier for BasicCredentials {
    fn resolve(&self) -> CredentialSet {
        let raw = format!("{}:{}", self.user, self.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        CredentialSet {
            headers: vec![("Authorization".to_string(), format!("Basic {encoded}"))],
            cookies: Vec::new(),
        }
    }
}

/// `--cookie-string` → parsed into individual `name=value` cookie entries.
pub struct CookieStringCredentials {
    pub raw: String,
}

impl CredentialSupplier for CookieStringCredentials {
    fn resolve(&self) -> CredentialSet {
        let cookies = parse_cookie_pairs(&self.raw);
        CredentialSet {
            headers: Vec::new(),
            cookies,
        }
    }
}

/// `--cookie-file`/`--cookies` → a Netscape-format cookie jar (the format
/// `curl -c` writes).
pub struct CookieFileCredentials {
    pub path: String,
}

impl CookieFileCredentials {
    /// Reads and parses the file eagerly so a bad path fails fast at
    /// startup rather than on the first write request.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let _ = fs::metadata(Path::new(path))
            .map_err(|e| AppError::Config(format!("cannot read cookie file {path}: {e}")))?;
        Ok(Self { path: path.to_string() })
    }
}

impl CredentialSupplier for CookieFileCredentials {
    fn resolve(&self) -> CredentialSet {
        let contents = fs::read_to_string(&self.path).unwrap_or_default();
        let cookies = parse_netscape_cookie_jar(&contents);
        CredentialSet {
            headers: Vec::new(),
            cookies,
        }
    }
}

/// No flags supplied at all — anonymous requests (some public OData demo
/// services, e.g. Northwind, require no auth).
pub struct NoCredentials;

impl CredentialSupplier for NoCredentials {
    fn resolve(&self) -> CredentialSet {
        CredentialSet::default()
    }
}

/// Picks the credential supplier implied by the CLI flags. At most one of
/// basic/cookie-string/cookie-file is expected; basic auth is checked first
/// since `--user`/`--password` is the most common SAP gateway mode.
pub fn from_args(args: &Args) -> Result<Box<dyn CredentialSupplier>, AppError> {
    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        return Ok(Box::new(BasicCredentials {
            user: user.clone(),
            password: password.clone(),
        }));
    }
    if args.user.is_some() || args.password.is_some() {
        return Err(AppError::Config(
            "--user and --password must both be set for basic auth".to_string(),
        ));
    }
    if let Some(raw) = &args.cookie_string {
        return Ok(Box::new(CookieStringCredentials { raw: raw.clone() }));
    }
    if let Some(path) = &args.cookie_file {
        return Ok(Box::new(CookieFileCredentials::load(path)?));
    }
    Ok(Box::new(NoCredentials))
}

fn parse_cookie_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parses the Netscape cookie-file format: tab-separated
/// `domain flag path secure expiry name value`, comments starting with `#`.
fn parse_netscape_cookie_jar(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                return None;
            }
            Some((fields[5].to_string(), fields[6].to_string()))
        })
        .collect()
}
