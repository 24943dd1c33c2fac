use uuid::Uuid;

/// A validated name for columnstore data files.
///
/// Data files are content-addressed artifacts named `<uuidv4>.parquet`.
/// The randomness comes from the host's cryptographic RNG; collisions are
/// considered impossible and not checked.
#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct FileName(String);

impl FileName {
    /// Generates a fresh random data-file name.
    ///
    /// Example: `67e55044-10b1-426f-9247-bb680e5fe0c8.parquet`
    pub fn generate() -> Self {
        Self(format!("{}.parquet", Uuid::new_v4()))
    }

    /// Creates a `FileName` from a string without validation.
    ///
    /// The caller is responsible for only passing names that originate
    /// from [`FileName::generate`] (e.g. read back from the catalog).
    pub fn new_unchecked(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for FileName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq<str> for FileName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for FileName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == **other
    }
}

impl serde::Serialize for FileName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for FileName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Serialized names originate from our constructors and are stored
        // in trusted sources (catalog rows, lake registrations).
        Ok(Self::new_unchecked(String::deserialize(deserializer)?))
    }
}
