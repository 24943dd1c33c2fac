//! Validated URL wrapper and provider types for table base paths.

use url::Url;

/// A validated base-path URL for a table's data directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreUrl(Url);

impl StoreUrl {
    /// Parses and validates a base-path URL.
    ///
    /// The URL must carry a supported object store scheme (`file://`,
    /// `s3://`, `gs://`, `az://`, `memory://`).
    pub fn parse(url: impl AsRef<str>) -> Result<Self, StoreUrlError> {
        let inner = Url::parse(url.as_ref()).map_err(|source| StoreUrlError::Parse {
            url: url.as_ref().to_string(),
            source,
        })?;
        let _: StoreProvider = StoreProvider::from_scheme(inner.scheme()).ok_or_else(|| {
            StoreUrlError::UnsupportedScheme {
                scheme: inner.scheme().to_string(),
            }
        })?;
        Ok(Self(inner))
    }

    /// Creates a `StoreUrl` without validation.
    pub fn new_unchecked(url: Url) -> Self {
        Self(url)
    }

    pub fn provider(&self) -> StoreProvider {
        // Validated at construction time.
        StoreProvider::from_scheme(self.0.scheme()).expect("scheme was validated")
    }

    /// Whether the base path denotes a remote object store rather than the
    /// local filesystem.
    pub fn is_remote(&self) -> bool {
        self.provider() != StoreProvider::Local
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn inner(&self) -> &Url {
        &self.0
    }
}

impl std::fmt::Display for StoreUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl std::ops::Deref for StoreUrl {
    type Target = Url;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::str::FromStr for StoreUrl {
    type Err = StoreUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The storage backend a [`StoreUrl`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreProvider {
    /// Local filesystem (`file://`).
    Local,
    /// AWS S3 (`s3://`).
    AmazonS3,
    /// Google Cloud Storage (`gs://`).
    GoogleCloudStorage,
    /// Azure Blob Storage (`az://`, `abfs://`, `abfss://`).
    MicrosoftAzure,
    /// Process-local in-memory store (`memory://`); stands in for a remote
    /// store in tests.
    InMemory,
}

impl StoreProvider {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "file" => Some(Self::Local),
            "s3" | "s3a" => Some(Self::AmazonS3),
            "gs" => Some(Self::GoogleCloudStorage),
            "az" | "abfs" | "abfss" => Some(Self::MicrosoftAzure),
            "memory" => Some(Self::InMemory),
            _ => None,
        }
    }
}

/// Errors that occur when parsing a [`StoreUrl`].
#[derive(Debug, thiserror::Error)]
pub enum StoreUrlError {
    /// The string is not a valid URL.
    #[error("invalid base path URL '{url}'")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The URL scheme does not map to a supported storage backend.
    #[error("unsupported object store scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_detection() {
        let cases = [
            ("file:///data/t1/", StoreProvider::Local, false),
            ("s3://bucket/t1/", StoreProvider::AmazonS3, true),
            ("gs://bucket/t1/", StoreProvider::GoogleCloudStorage, true),
            ("az://container/t1/", StoreProvider::MicrosoftAzure, true),
            ("memory:///t1/", StoreProvider::InMemory, true),
        ];
        for (url, provider, remote) in cases {
            let url = StoreUrl::parse(url).unwrap();
            assert_eq!(url.provider(), provider);
            assert_eq!(url.is_remote(), remote);
        }
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(matches!(
            StoreUrl::parse("ftp://host/t1/"),
            Err(StoreUrlError::UnsupportedScheme { .. })
        ));
    }
}
