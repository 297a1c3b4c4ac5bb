//! Parameter-server backing-store interface.
//!
//! The concrete backing-store client's connection pooling and command
//! pipelining live outside this crate; only the interface is specified
//! here: a `BackingStore` trait any key-value client can implement, an
//! in-memory reference implementation for tests and the CLI demo, and a
//! parser for the client's configured URL grammar.

pub mod memory;

pub use memory::InMemoryBackingStore;

use crate::error::TransformerError;

/// A key-value client a parameter server can be fetched from and evicted
/// to. Implementations own their own connection pooling and pipelining;
/// this crate only orchestrates which keys to read and write, and when
/// (`crate::glue`).
#[async_trait::async_trait]
pub trait BackingStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransformerError>;
    async fn put(&self, key: String, value: Vec<u8>) -> Result<(), TransformerError>;
}

/// A parsed `[user[:pass]@]host[:port][/param]` backing-store URL, where
/// `param` is `key=value` pairs separated by `&&`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendUrl {
    pub user: Option<String>,
    pub pass: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub num_threads: Option<u32>,
    pub db: Option<String>,
    pub prefix: String,
}

impl BackendUrl {
    /// Parses the backing-store URL grammar. Reuses `url::Url` for the
    /// `user:pass@host:port` half (by prefixing a placeholder scheme,
    /// since the grammar itself has none) and splits the `/param` tail by
    /// hand, since `&&` is not a separator `url`'s query parser knows.
    pub fn parse(raw: &str) -> Result<Self, TransformerError> {
        let with_scheme = format!("tde://{raw}");
        let url = url::Url::parse(&with_scheme).map_err(|e| {
            TransformerError::ConfigInvalid(format!("invalid backing store url {raw:?}: {e}"))
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                TransformerError::ConfigInvalid(format!("backing store url {raw:?} is missing a host"))
            })?
            .to_string();
        let port = url.port();
        let user = {
            let u = url.username();
            if u.is_empty() {
                None
            } else {
                Some(u.to_string())
            }
        };
        let pass = url.password().map(|s| s.to_string());

        let mut num_threads = None;
        let mut db = None;
        let mut prefix = String::new();
        let path = url.path().trim_start_matches('/');
        if !path.is_empty() {
            for kv in path.split("&&") {
                let mut parts = kv.splitn(2, '=');
                let key = parts.next().unwrap_or("");
                let value = parts.next().unwrap_or("");
                match key {
                    "num_threads" => num_threads = value.parse().ok(),
                    "db" => db = Some(value.to_string()),
                    "prefix" => prefix = value.to_string(),
                    _ => {}
                }
            }
        }

        Ok(Self {
            user,
            pass,
            host,
            port,
            num_threads,
            db,
            prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_params() {
        let url = BackendUrl::parse("db.internal:6379/prefix=emb&&num_threads=8&&db=0").unwrap();
        assert_eq!(url.host, "db.internal");
        assert_eq!(url.port, Some(6379));
        assert_eq!(url.prefix, "emb");
        assert_eq!(url.num_threads, Some(8));
        assert_eq!(url.db, Some("0".to_string()));
    }

    #[test]
    fn parses_credentials() {
        let url = BackendUrl::parse("alice:s3cret@db.internal/prefix=emb").unwrap();
        assert_eq!(url.user, Some("alice".to_string()));
        assert_eq!(url.pass, Some("s3cret".to_string()));
    }

    #[test]
    fn bare_host_has_no_params() {
        let url = BackendUrl::parse("db.internal").unwrap();
        assert_eq!(url.host, "db.internal");
        assert_eq!(url.prefix, "");
        assert!(url.num_threads.is_none());
    }
}
