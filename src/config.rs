//! Session configuration.
//!
//! The configuration is read from a small TOML file:
//!
//! ```toml
//! api_url = "https://api.example.com/api"
//! login_route = "/login"
//! storage_file = "session.json"
//! lang = "pt"
//! ```
//!
//! Only `api_url` is required. Command-line arguments may override any
//! field after loading.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub app_lang: String,

    pub user_agent: String,

    /// Base URL of the storefront REST API, e.g. `https://host/api`.
    pub api_url: Url,

    /// Route to navigate to when the session ends.
    pub login_route: String,

    /// Where the session keys are persisted between runs.
    pub storage_file: PathBuf,
}

/// On-disk representation of [`Config`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_url: String,
    login_route: Option<String>,
    storage_file: Option<PathBuf>,
    lang: Option<String>,
}

impl Config {
    /// Default route of the anonymous entry point.
    pub const LOGIN_ROUTE: &'static str = "/login";

    /// Default file name for persisted session keys.
    pub const STORAGE_FILE: &'static str = "session.json";

    /// Configuration files should be small; anything larger is rejected
    /// before it is read into memory.
    const MAX_FILE_SIZE: u64 = 16 * 1024;

    /// Creates a configuration for the API at `api_url` with defaults for
    /// everything else.
    ///
    /// # Errors
    ///
    /// Will return `Err` if:
    /// - `api_url` is not a valid absolute URL
    /// - no valid `User-Agent` can be built from the package metadata
    pub fn with_api_url(api_url: &str) -> Result<Self> {
        let api_url = Self::parse_api_url(api_url)?;
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let app_lang = "en".to_owned();

        let user_agent = Self::user_agent(&app_name, &app_version, &app_lang)?;
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,
            app_lang,

            user_agent,

            api_url,
            login_route: Self::LOGIN_ROUTE.to_owned(),
            storage_file: PathBuf::from(Self::STORAGE_FILE),
        })
    }

    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if:
    /// - the file cannot be read or is too large
    /// - the file is not valid TOML or contains unknown keys
    /// - the configured values are invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parses the configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the text is not a valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)?;

        let mut config = Self::with_api_url(&file.api_url)?;
        if let Some(route) = file.login_route {
            config.login_route = route;
        }
        if let Some(storage_file) = file.storage_file {
            config.storage_file = storage_file;
        }
        if let Some(lang) = file.lang {
            config.set_lang(&lang)?;
        }

        Ok(config)
    }

    /// Points the configuration at another API.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `api_url` is not a valid http(s) URL.
    pub fn set_api_url(&mut self, api_url: &str) -> Result<()> {
        self.api_url = Self::parse_api_url(api_url)?;
        Ok(())
    }

    /// Changes the language reported in the `User-Agent` and
    /// `Accept-Language` headers.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `lang` is not a two-letter language code.
    pub fn set_lang(&mut self, lang: &str) -> Result<()> {
        self.user_agent = Self::user_agent(&self.app_name, &self.app_version, lang)?;
        lang.clone_into(&mut self.app_lang);
        Ok(())
    }

    /// Resolves `path` against the API base URL.
    ///
    /// The base URL is treated as a directory, so `https://host/api` joined
    /// with `auth/signin` yields `https://host/api/auth/signin`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the result is not a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.api_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/')).map_err(Into::into)
    }

    fn parse_api_url(api_url: &str) -> Result<Url> {
        let url = Url::parse(api_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_argument(format!(
                "api url must be http or https: {api_url}"
            )));
        }
        Ok(url)
    }

    fn user_agent(app_name: &str, app_version: &str, app_lang: &str) -> Result<String> {
        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
            || app_lang.chars().count() != 2
            || app_lang.contains(illegal_chars)
        {
            return Err(Error::invalid_argument(format!(
                "application name, version and/or language invalid (\"{app_name}\"; \"{app_version}\"; \"{app_lang}\")"
            )));
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));
        let os_version = os_version.replace(illegal_chars, "-");

        Ok(format!(
            "{app_name}/{app_version} (Rust; {os_name}/{os_version}; {app_lang})"
        ))
    }
}
