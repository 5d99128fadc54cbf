use super::error::{CouchDaoError, CouchResult};

/// Runtime configuration describing how to reach the CouchDB match database.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL without the database path.
    pub base_url: String,
    /// Database holding match and attempt documents.
    pub database: String,
    /// Basic auth user, when required.
    pub username: Option<String>,
    /// Basic auth password, when required.
    pub password: Option<String>,
}

impl CouchConfig {
    /// Construct a configuration from explicit base URL and database name.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Attach basic-auth credentials to the configuration.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Read `COUCH_*` variables.
    ///
    /// `Ok(None)` means CouchDB is not configured at all and the in-memory
    /// store should be used; a base URL without a database name is an error.
    pub fn from_env() -> CouchResult<Option<Self>> {
        let Ok(base_url) = std::env::var("COUCH_BASE_URL") else {
            return Ok(None);
        };
        let database = std::env::var("COUCH_DB")
            .map_err(|_| CouchDaoError::MissingEnvVar { var: "COUCH_DB" })?;

        let mut config = Self::new(base_url, database);

        if let (Some(username), Some(password)) = (
            std::env::var("COUCH_USERNAME").ok(),
            std::env::var("COUCH_PASSWORD").ok(),
        ) {
            config = config.with_credentials(username, password);
        }

        Ok(Some(config))
    }
}
