//! Credentials from a `.netrc` file.
//!
//! WHY: A redirect that strips `Authorization` may land on a host the user
//! keeps credentials for. When the environment is trusted those credentials
//! are re-applied from the user's netrc file.
//!
//! WHAT: [`Netrc`] parses the `machine`/`default` entries of a netrc file,
//! [`netrc_path`] locates it (`$NETRC`, then `~/.netrc`, then `~/_netrc`) and
//! [`NetrcAuthenticator`] signs follow-up requests with the entry for their
//! host. Read and parse failures mean "no credentials".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use derive_more::From;

use super::{Authenticator, PreparedRequest, AUTHORIZATION};
use crate::proxies::{basic_auth_value, Environment};

/// File names looked up in the home directory when `$NETRC` is unset.
pub const NETRC_FILES: [&str; 2] = [".netrc", "_netrc"];

#[derive(From, Debug)]
pub enum NetrcError {
    #[from]
    Io(std::io::Error),

    /// A token that is not part of the netrc grammar.
    #[from(ignore)]
    UnexpectedToken(String),

    /// A keyword at the end of the file without its value.
    #[from(ignore)]
    MissingValue(String),
}

impl std::error::Error for NetrcError {}

impl core::fmt::Display for NetrcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Failed to read netrc file: {err}"),
            Self::UnexpectedToken(token) => write!(f, "Unexpected netrc token '{token}'"),
            Self::MissingValue(keyword) => write!(f, "Missing value after netrc '{keyword}'"),
        }
    }
}

/// One `machine` or `default` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetrcEntry {
    pub login: Option<String>,
    pub account: Option<String>,
    pub password: Option<String>,
}

impl NetrcEntry {
    /// `(user, password)` for Basic auth. An empty login falls back to the
    /// account name.
    #[must_use]
    pub fn credentials(&self) -> (String, String) {
        let user = match self.login.as_deref().filter(|login| !login.is_empty()) {
            Some(login) => login,
            None => self.account.as_deref().unwrap_or_default(),
        };
        (
            user.to_string(),
            self.password.clone().unwrap_or_default(),
        )
    }
}

/// A parsed netrc file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Netrc {
    machines: BTreeMap<String, NetrcEntry>,
    default: Option<NetrcEntry>,
}

impl Netrc {
    /// Parses netrc text. `macdef` bodies are skipped up to the next blank
    /// line and `#` starts a comment running to the end of the line.
    ///
    /// # Errors
    ///
    /// Returns [`NetrcError`] for unknown tokens or keywords without values.
    pub fn parse(content: &str) -> Result<Self, NetrcError> {
        let mut netrc = Netrc::default();
        let mut current: Option<(Option<String>, NetrcEntry)> = None;
        let mut lines = content.lines();

        while let Some(line) = lines.next() {
            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                if token.starts_with('#') {
                    break;
                }
                match token {
                    "machine" | "default" | "macdef" => {
                        if let Some((name, entry)) = current.take() {
                            netrc.store(name, entry);
                        }
                        match token {
                            "machine" => {
                                let name = tokens
                                    .next()
                                    .ok_or_else(|| NetrcError::MissingValue(token.to_string()))?;
                                current = Some((Some(name.to_string()), NetrcEntry::default()));
                            }
                            "default" => current = Some((None, NetrcEntry::default())),
                            _ => {
                                for body in lines.by_ref() {
                                    if body.trim().is_empty() {
                                        break;
                                    }
                                }
                                break;
                            }
                        }
                    }
                    "login" | "user" | "account" | "password" => {
                        let Some((_, entry)) = current.as_mut() else {
                            return Err(NetrcError::UnexpectedToken(token.to_string()));
                        };
                        let value = tokens
                            .next()
                            .ok_or_else(|| NetrcError::MissingValue(token.to_string()))?
                            .to_string();
                        match token {
                            "account" => entry.account = Some(value),
                            "password" => entry.password = Some(value),
                            _ => entry.login = Some(value),
                        }
                    }
                    other => return Err(NetrcError::UnexpectedToken(other.to_string())),
                }
            }
        }

        if let Some((name, entry)) = current.take() {
            netrc.store(name, entry);
        }
        Ok(netrc)
    }

    /// # Errors
    ///
    /// Returns [`NetrcError::Io`] when the file cannot be read, or the parse
    /// error of its content.
    pub fn from_path(path: &Path) -> Result<Self, NetrcError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// The entry for `host`, falling back to the `default` entry.
    #[must_use]
    pub fn authenticators(&self, host: &str) -> Option<&NetrcEntry> {
        self.machines.get(host).or(self.default.as_ref())
    }

    fn store(&mut self, name: Option<String>, entry: NetrcEntry) {
        match name {
            Some(name) => {
                self.machines.insert(name, entry);
            }
            None => self.default = Some(entry),
        }
    }
}

/// The netrc file to read: `$NETRC` when set, otherwise the first of
/// [`NETRC_FILES`] present in the home directory.
#[must_use]
pub fn netrc_path(env: &dyn Environment) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = match env.get("NETRC") {
        Some(explicit) => vec![expand_home(&explicit, env)?],
        None => {
            let home = home_dir(env)?;
            NETRC_FILES.iter().map(|name| home.join(name)).collect()
        }
    };
    candidates.into_iter().find(|path| path.exists())
}

fn home_dir(env: &dyn Environment) -> Option<PathBuf> {
    env.get("HOME")
        .or_else(|| env.get("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn expand_home(path: &str, env: &dyn Environment) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir(env).map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}

/// Netrc credentials for the host of `url`, if any.
#[must_use]
pub fn get_netrc_auth(url: &str, env: &dyn Environment) -> Option<(String, String)> {
    let path = netrc_path(env)?;
    let parsed = ::url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;

    match Netrc::from_path(&path) {
        Ok(netrc) => netrc.authenticators(host).map(NetrcEntry::credentials),
        Err(err) => {
            tracing::debug!("Skipping netrc auth from {}: {}", path.display(), err);
            None
        }
    }
}

/// Signs requests with Basic credentials from the netrc file.
#[derive(Clone)]
pub struct NetrcAuthenticator {
    env: Arc<dyn Environment>,
}

impl NetrcAuthenticator {
    #[must_use]
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }
}

impl std::fmt::Debug for NetrcAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetrcAuthenticator").finish_non_exhaustive()
    }
}

impl Authenticator for NetrcAuthenticator {
    fn authenticate(&self, request: &mut PreparedRequest) {
        if let Some((username, password)) = get_netrc_auth(&request.url, self.env.as_ref()) {
            tracing::debug!("Applying netrc credentials for {}", request.url);
            request
                .headers
                .insert(AUTHORIZATION, basic_auth_value(&username, &password));
        }
    }
}
